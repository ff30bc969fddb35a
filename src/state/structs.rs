// structs.rs - main state structures
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

use flagset::{flags, FlagSet};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::*;

use crate::utils::*;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub(crate) enum StateError {
    #[error("Duplicate UID {0}")]
    DuplicateUid(String),
    #[error("No such user {0}")]
    NoSuchUser(String),
    #[error("No such channel {0}")]
    NoSuchChannel(String),
    #[error("Invalid ban mask {0}")]
    InvalidBanMask(String),
}

impl StateError {
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, StateError::DuplicateUid(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Server {
    pub(crate) sid: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) usercount: usize,
    // SID of server that introduced this server. None for self and uplink.
    pub(crate) parent: Option<String>,
}

flags! {
    pub(crate) enum UserMode: u8 {
        Oper = 0b1,
        Admin = 0b10,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum OperLevel {
    Oper,
    Admin,
}

impl OperLevel {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            OperLevel::Oper => "oper",
            OperLevel::Admin => "admin",
        }
    }
}

/// Parameters of user introduction (EUID or UID).
#[derive(Debug, Clone)]
pub(crate) struct UserIntro<'a> {
    pub(crate) server: &'a str,
    pub(crate) uid: &'a str,
    pub(crate) nick: &'a str,
    pub(crate) ident: &'a str,
    pub(crate) dhost: &'a str,
    pub(crate) rhost: &'a str,
    pub(crate) ip: &'a str,
    pub(crate) ts: u64,
    pub(crate) umodes: &'a str,
    pub(crate) gecos: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct User {
    pub(crate) uid: String,
    pub(crate) nick: String,
    pub(crate) ident: String,
    pub(crate) dhost: String,
    pub(crate) rhost: String,
    pub(crate) ip: String,
    pub(crate) ts: u64,
    pub(crate) gecos: String,
    pub(crate) modes: FlagSet<UserMode>,
    pub(crate) level: Option<OperLevel>,
    pub(crate) certfp: Option<String>,
    pub(crate) account: Option<String>,
    pub(crate) server: String,
    // casefolded channel names
    pub(crate) channels: HashSet<String>,
}

impl User {
    pub(crate) fn new(intro: &UserIntro<'_>) -> User {
        let rhost = if intro.rhost == "*" { intro.ip } else { intro.rhost };
        let mut user = User{ uid: intro.uid.to_string(), nick: intro.nick.to_string(),
            ident: intro.ident.to_string(), dhost: intro.dhost.to_string(),
            rhost: rhost.to_string(), ip: intro.ip.to_string(), ts: intro.ts,
            gecos: intro.gecos.to_string(), modes: FlagSet::default(), level: None,
            certfp: None, account: None, server: intro.server.to_string(),
            channels: HashSet::new() };
        if intro.umodes.contains('o') { user.modes |= UserMode::Oper; }
        if intro.umodes.contains('a') { user.modes |= UserMode::Admin; }
        user.level = if user.is_admin() { Some(OperLevel::Admin) }
            else if user.is_oper() { Some(OperLevel::Oper) } else { None };
        user
    }

    pub(crate) fn is_oper(&self) -> bool {
        self.modes.contains(UserMode::Oper)
    }

    pub(crate) fn is_admin(&self) -> bool {
        self.modes.contains(UserMode::Admin)
    }

    // apply user mode change. only 'o' and 'a' are tracked.
    pub(crate) fn apply_umodes(&mut self, modestr: &str) {
        let mut adding = true;
        for c in modestr.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                'o' => {
                    if adding {
                        self.modes |= UserMode::Oper;
                        if self.level != Some(OperLevel::Admin) {
                            self.level = Some(OperLevel::Oper);
                        }
                    } else {
                        self.modes -= UserMode::Oper;
                        self.level = None;
                    }
                }
                'a' => {
                    if adding {
                        self.modes |= UserMode::Admin;
                        self.level = Some(OperLevel::Admin);
                    } else {
                        self.modes -= UserMode::Admin;
                        self.level = None;
                    }
                }
                _ => (),
            }
        }
    }

    // nick!ident@rhost - used in notices about user.
    pub(crate) fn real_source(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.rhost)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ListKind {
    Ban,
    Exempt,
}

impl ListKind {
    pub(crate) fn from_letter(c: char) -> Option<ListKind> {
        match c {
            'b' => Some(ListKind::Ban),
            'e' => Some(ListKind::Exempt),
            _ => None,
        }
    }
}

/// Ban or exempt entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BanMask {
    Mask{ nick: String, ident: String, host: String },
    Extended(String),
}

impl BanMask {
    pub(crate) fn parse(mask: &str) -> Result<BanMask, StateError> {
        if mask.starts_with('$') && !mask.contains('!') && !mask.contains('@') {
            return Ok(BanMask::Extended(mask.to_string()));
        }
        if mask.matches('!').count() != 1 || mask.matches('@').count() != 1 {
            return Err(StateError::InvalidBanMask(mask.to_string()));
        }
        match mask.split_once('!').and_then(|(nick, rest)| rest.split_once('@')
                .map(|(ident, host)| (nick, ident, host))) {
            Some((nick, ident, host)) => Ok(BanMask::Mask{ nick: nick.to_string(),
                    ident: ident.to_string(), host: host.to_string() }),
            // '@' before '!'
            None => Err(StateError::InvalidBanMask(mask.to_string())),
        }
    }
}

impl fmt::Display for BanMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanMask::Mask{ nick, ident, host } => write!(f, "{}!{}@{}", nick, ident, host),
            BanMask::Extended(token) => f.write_str(token),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Channel {
    pub(crate) name: String,
    pub(crate) ts: u64,
    pub(crate) permanent: bool,
    // UIDs
    pub(crate) members: HashSet<String>,
    pub(crate) bans: Vec<BanMask>,
    pub(crate) exempts: Vec<BanMask>,
}

impl Channel {
    pub(crate) fn new(name: &str, ts: u64) -> Channel {
        Channel{ name: name.to_string(), ts, permanent: false, members: HashSet::new(),
            bans: vec![], exempts: vec![] }
    }

    pub(crate) fn list(&self, kind: ListKind) -> &Vec<BanMask> {
        match kind {
            ListKind::Ban => &self.bans,
            ListKind::Exempt => &self.exempts,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut Vec<BanMask> {
        match kind {
            ListKind::Ban => &mut self.bans,
            ListKind::Exempt => &mut self.exempts,
        }
    }

    // reset state that was set under newer (higher) TS.
    pub(crate) fn reset_to_ts(&mut self, ts: u64) {
        info!("Channel {} lowered TS from {} to {}", self.name, self.ts, ts);
        self.ts = ts;
        self.bans.clear();
        self.exempts.clear();
        self.permanent = false;
    }
}

/// Registries of servers, users and channels known on the network.
#[derive(Debug)]
pub(crate) struct NetworkState {
    pub(crate) self_sid: String,
    pub(crate) servers: HashMap<String, Server>,
    pub(crate) users: HashMap<String, User>,
    // casefolded nick -> UID
    pub(crate) nicks: HashMap<String, String>,
    // casefolded name -> channel
    pub(crate) channels: HashMap<String, Channel>,
}

impl NetworkState {
    pub(crate) fn new(sid: &str, name: &str, description: &str) -> NetworkState {
        let mut state = NetworkState{ self_sid: sid.to_string(), servers: HashMap::new(),
            users: HashMap::new(), nicks: HashMap::new(), channels: HashMap::new() };
        state.add_server(sid, name, description, None);
        state
    }

    // returns false if server is already known or would be its own parent.
    // existing record is kept in that case.
    pub(crate) fn add_server(&mut self, sid: &str, name: &str, description: &str,
                parent: Option<&str>) -> bool {
        if let Some(server) = self.servers.get(sid) {
            warn!("Server {} ({}) introduced again as {}, ignoring", server.name, sid, name);
            return false;
        }
        if parent == Some(sid) {
            warn!("Server {} ({}) introduced by itself, ignoring", name, sid);
            return false;
        }
        info!("Server {} ({}) introduced", name, sid);
        self.servers.insert(sid.to_string(), Server{ sid: sid.to_string(),
            name: name.to_string(), description: description.to_string(), usercount: 0,
            parent: parent.map(|p| p.to_string()) });
        true
    }

    // remove server with all servers behind it and all their users.
    // returns number of removed users.
    pub(crate) fn remove_server_tree(&mut self, sid: &str) -> usize {
        let mut removed_sids = vec![sid.to_string()];
        let mut visited = HashSet::from([sid.to_string()]);
        let mut i = 0;
        while i < removed_sids.len() {
            let parent = removed_sids[i].clone();
            for server in self.servers.values() {
                if server.parent.as_deref() == Some(parent.as_str()) &&
                        visited.insert(server.sid.clone()) {
                    removed_sids.push(server.sid.clone());
                }
            }
            i += 1;
        }
        let uids = self.users.values().filter(|u| visited.contains(&u.server))
                .map(|u| u.uid.clone()).collect::<Vec<_>>();
        for uid in &uids {
            self.quit_user(uid);
        }
        for s in &removed_sids {
            if let Some(server) = self.servers.remove(s) {
                info!("Server {} ({}) has been removed", server.name, s);
            }
        }
        uids.len()
    }

    pub(crate) fn create_user(&mut self, intro: &UserIntro<'_>) -> Result<&User, StateError> {
        if self.users.contains_key(intro.uid) {
            return Err(StateError::DuplicateUid(intro.uid.to_string()));
        }
        let user = User::new(intro);
        if let Some(server) = self.servers.get_mut(intro.server) {
            server.usercount += 1;
        }
        debug!("User {} ({}) introduced", user.nick, user.uid);
        self.nicks.insert(irc_to_lower(&user.nick), user.uid.clone());
        let uid = user.uid.clone();
        Ok(self.users.entry(uid).or_insert(user))
    }

    pub(crate) fn rename_user(&mut self, uid: &str, new_nick: &str, new_ts: u64)
                -> Result<(), StateError> {
        let user = self.users.get_mut(uid).ok_or_else(|| StateError::NoSuchUser(uid.to_string()))?;
        let old_key = irc_to_lower(&user.nick);
        // remove old key only if it still points to this user.
        if self.nicks.get(&old_key).map(|u| u.as_str()) == Some(uid) {
            self.nicks.remove(&old_key);
        }
        debug!("User {} changed nick to {}", user.nick, new_nick);
        user.nick = new_nick.to_string();
        user.ts = new_ts;
        self.nicks.insert(irc_to_lower(new_nick), uid.to_string());
        Ok(())
    }

    // remove user from registries. channels are not notified.
    pub(crate) fn delete_user(&mut self, uid: &str) -> Option<User> {
        let mut user = self.users.remove(uid)?;
        let nick_key = irc_to_lower(&user.nick);
        if self.nicks.get(&nick_key).map(|u| u.as_str()) == Some(uid) {
            self.nicks.remove(&nick_key);
        }
        if let Some(server) = self.servers.get_mut(&user.server) {
            server.usercount = server.usercount.saturating_sub(1);
        }
        user.channels.clear();
        Some(user)
    }

    // remove user from all channels (purging unused ones) and from registries.
    pub(crate) fn quit_user(&mut self, uid: &str) -> Option<User> {
        let channels = self.users.get(uid)?.channels.iter().cloned().collect::<Vec<_>>();
        for chan in channels {
            if let Some(channel) = self.channels.get_mut(&chan) {
                channel.members.remove(uid);
            }
            self.purge_channel_if_unused(&chan);
        }
        self.delete_user(uid)
    }

    pub(crate) fn resolve_uid(&self, target: &str) -> Option<&str> {
        if let Some(user) = self.users.get(target) {
            Some(user.uid.as_str())
        } else {
            self.nicks.get(&irc_to_lower(target)).map(|u| u.as_str())
        }
    }

    // find by UID or nick.
    pub(crate) fn find_user(&self, target: &str) -> Option<&User> {
        self.resolve_uid(target).and_then(|uid| self.users.get(uid))
    }

    pub(crate) fn find_user_mut(&mut self, target: &str) -> Option<&mut User> {
        let uid = self.resolve_uid(target)?.to_string();
        self.users.get_mut(&uid)
    }

    pub(crate) fn create_channel(&mut self, name: &str, ts: u64) -> &mut Channel {
        self.channels.entry(irc_to_lower(name)).or_insert_with(|| {
            info!("Channel {} has been created", name);
            Channel::new(name, ts)
        })
    }

    pub(crate) fn find_channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    pub(crate) fn find_channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&irc_to_lower(name))
    }

    pub(crate) fn delete_channel(&mut self, name: &str) {
        let key = irc_to_lower(name);
        if let Some(channel) = self.channels.get(&key) {
            assert!(channel.members.is_empty() && !channel.permanent,
                    "Deleting channel {} that is in use", name);
            info!("Channel {} has been removed", name);
            self.channels.remove(&key);
        }
    }

    // remove channel if it has no members and is not permanent.
    pub(crate) fn purge_channel_if_unused(&mut self, name: &str) -> bool {
        let unused = self.find_channel(name).map_or(false, |c| c.members.is_empty() && !c.permanent);
        if unused { self.delete_channel(name); }
        unused
    }

    pub(crate) fn add_member(&mut self, name: &str, uid: &str) -> Result<(), StateError> {
        let key = irc_to_lower(name);
        if !self.channels.contains_key(&key) {
            return Err(StateError::NoSuchChannel(name.to_string()));
        }
        let user = self.users.get_mut(uid).ok_or_else(|| StateError::NoSuchUser(uid.to_string()))?;
        user.channels.insert(key.clone());
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.members.insert(uid.to_string());
        }
        Ok(())
    }

    pub(crate) fn remove_member(&mut self, name: &str, uid: &str) -> Result<(), StateError> {
        let key = irc_to_lower(name);
        if !self.channels.contains_key(&key) {
            return Err(StateError::NoSuchChannel(name.to_string()));
        }
        let user = self.users.get_mut(uid).ok_or_else(|| StateError::NoSuchUser(uid.to_string()))?;
        user.channels.remove(&key);
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.members.remove(uid);
        }
        Ok(())
    }

    pub(crate) fn add_ban(&mut self, name: &str, kind: ListKind, mask: &str)
                -> Result<(), StateError> {
        let ban = BanMask::parse(mask)?;
        let channel = self.find_channel_mut(name)
                .ok_or_else(|| StateError::NoSuchChannel(name.to_string()))?;
        let list = channel.list_mut(kind);
        if !list.contains(&ban) { list.push(ban); }
        Ok(())
    }

    pub(crate) fn remove_ban(&mut self, name: &str, kind: ListKind, mask: &str)
                -> Result<(), StateError> {
        let ban = BanMask::parse(mask)?;
        let channel = self.find_channel_mut(name)
                .ok_or_else(|| StateError::NoSuchChannel(name.to_string()))?;
        channel.list_mut(kind).retain(|b| *b != ban);
        Ok(())
    }
}
