// bans.rs - ban and exempt matching
//
// ts6-pseudoserver - TS6 pseudo-server
// Copyright (C) 2022  Mateusz Szpakowski
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 2.1 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA

use super::structs::*;
use crate::matcher::match_wildcard;
use crate::utils::*;

/// Charybdis extended ban criterion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ExtBanKind {
    // $a - any logged in user
    LoggedIn,
    // $a:mask
    Account(String),
    // $c:channel
    Channel(String),
    // $o
    Oper,
    // $r:mask
    Realname(String),
    // $s:mask
    Server(String),
    // $x:mask - nick!ident@host#gecos
    Full(String),
    // $j:channel and $z are not implemented and never match.
    Join(String),
    SslClient,
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ExtBan {
    pub(crate) negated: bool,
    pub(crate) kind: ExtBanKind,
}

impl ExtBan {
    pub(crate) fn parse(token: &str) -> ExtBan {
        let body = token.strip_prefix('$').unwrap_or(token);
        let (negated, body) = match body.strip_prefix('~') {
            Some(b) => (true, b),
            None => (false, body),
        };
        let (btype, arg) = match body.split_once(':') {
            Some((t, a)) => (t, Some(a.to_string())),
            None => (body, None),
        };
        let kind = match (btype, arg) {
            ("a", None) => ExtBanKind::LoggedIn,
            ("a", Some(mask)) => ExtBanKind::Account(mask),
            ("c", Some(chan)) => ExtBanKind::Channel(chan),
            ("o", None) => ExtBanKind::Oper,
            ("r", Some(mask)) => ExtBanKind::Realname(mask),
            ("s", Some(mask)) => ExtBanKind::Server(mask),
            ("x", Some(mask)) => ExtBanKind::Full(mask),
            ("j", Some(chan)) => ExtBanKind::Join(chan),
            ("z", _) => ExtBanKind::SslClient,
            _ => ExtBanKind::Unknown(token.to_string()),
        };
        ExtBan{ negated, kind }
    }

    pub(crate) fn matches(&self, state: &NetworkState, user: &User) -> bool {
        let result = match &self.kind {
            ExtBanKind::LoggedIn => user.account.is_some(),
            ExtBanKind::Account(mask) => user.account.as_ref()
                    .map_or(false, |acc| match_wildcard(mask, acc, true)),
            ExtBanKind::Channel(chan) => user.channels.contains(&irc_to_lower(chan)),
            ExtBanKind::Oper => user.is_oper(),
            ExtBanKind::Realname(mask) => match_wildcard(mask, &user.gecos, true),
            ExtBanKind::Server(mask) => state.servers.get(&user.server)
                    .map_or(false, |s| match_wildcard(mask, &s.name, true)),
            ExtBanKind::Full(mask) => {
                let full = format!("{}!{}@{}#{}", user.nick, user.ident, user.dhost, user.gecos);
                match_wildcard(mask, &full, true)
            }
            ExtBanKind::Join(_) | ExtBanKind::SslClient | ExtBanKind::Unknown(_) => return false,
        };
        result != self.negated
    }
}

impl BanMask {
    pub(crate) fn matches(&self, state: &NetworkState, user: &User) -> bool {
        match self {
            BanMask::Mask{ nick, ident, host } => {
                match_wildcard(nick, &user.nick, true) && match_wildcard(ident, &user.ident, true) &&
                    (match_wildcard(host, &user.rhost, true) ||
                        match_wildcard(host, &user.dhost, true) ||
                        match_wildcard(host, &user.ip, true))
            }
            BanMask::Extended(token) => ExtBan::parse(token).matches(state, user),
        }
    }
}

impl NetworkState {
    // returns first ban that matches user if user is not exempt.
    pub(crate) fn find_ban_against<'a>(&'a self, channel: &'a Channel, user: &User)
                -> Option<&'a BanMask> {
        if channel.list(ListKind::Exempt).iter().any(|e| e.matches(self, user)) {
            return None;
        }
        channel.list(ListKind::Ban).iter().find(|b| b.matches(self, user))
    }

    // returns (channel name, ban) for every channel where user is banned.
    pub(crate) fn find_bans_against(&self, uid: &str) -> Vec<(&str, &BanMask)> {
        let user = match self.users.get(uid) {
            Some(user) => user,
            None => return vec![],
        };
        let mut out = self.channels.values()
            .filter_map(|c| self.find_ban_against(c, user).map(|b| (c.name.as_str(), b)))
            .collect::<Vec<_>>();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}
