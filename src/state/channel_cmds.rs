// channel_cmds.rs - channel commands
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

use super::*;
use super::modes::{apply_mode_string, mode_param_count};

// strip status prefixes (@, +, ...) from SJOIN member.
fn member_uid(member: &str) -> &str {
    member.trim_start_matches(|c: char| !c.is_ascii_digit())
}

impl super::MainState {
    fn source_user_uid(&self, msg: &Message<'_>, cmd: &'static str)
                -> Result<String, ProtocolError> {
        let source = required_source(msg, cmd)?;
        self.net.resolve_uid(source).map(|u| u.to_string())
                .ok_or_else(|| ProtocolError::UnknownUser(source.to_string()))
    }

    // create channel or lower its TS. returns true if incoming TS is not newer.
    fn merge_channel_ts(&mut self, name: &str, ts: u64) -> bool {
        match self.net.find_channel_mut(name) {
            Some(chan) => {
                if ts < chan.ts {
                    chan.reset_to_ts(ts);
                }
                ts <= chan.ts
            }
            None => {
                self.net.create_channel(name, ts);
                true
            }
        }
    }

    // checks incoming TS against stored. newer TS loses.
    fn check_channel_ts(&self, name: &str, ts: u64, cmd: &str) -> Result<bool, ProtocolError> {
        let chan = self.net.find_channel(name)
            .ok_or_else(|| ProtocolError::UnknownChannel(name.to_string()))?;
        if ts > chan.ts {
            debug!("Rejected {} for {}: TS {} is newer than {}", cmd, chan.name, ts, chan.ts);
            Ok(false)
        } else {
            Ok(true)
        }
    }

    // :uid JOIN ts #chan + or :uid JOIN 0
    pub(super) fn process_join(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let uid = self.source_user_uid(msg, "JOIN")?;
        let first = required_param(msg, 0, "JOIN")?;
        if first == "0" && msg.params.len() == 1 {
            // part all channels. channels are kept even if they are empty.
            let channels = self.net.users.get(&uid).map(|u| u.channels.iter().cloned()
                    .collect::<Vec<_>>()).unwrap_or_default();
            for chan in channels {
                self.net.remove_member(&chan, &uid)?;
            }
            return Ok(());
        }
        let ts = ts_param(msg, 0, "JOIN")?;
        let name = required_param(msg, 1, "JOIN")?;
        self.merge_channel_ts(name, ts);
        self.net.add_member(name, &uid)?;
        Ok(())
    }

    pub(super) fn process_part(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let uid = self.source_user_uid(msg, "PART")?;
        let channels = required_param(msg, 0, "PART")?;
        for name in channels.split(|c| c == ',' || c == ' ').filter(|s| !s.is_empty()) {
            if self.net.find_channel(name).is_none() {
                debug!("PART from unknown channel {}", name);
                continue;
            }
            self.net.remove_member(name, &uid)?;
            self.net.purge_channel_if_unused(name);
        }
        Ok(())
    }

    // :source KICK #chan uid :reason
    pub(super) fn process_kick(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let name = required_param(msg, 0, "KICK")?;
        let target = required_param(msg, 1, "KICK")?;
        let uid = self.net.resolve_uid(target).map(|u| u.to_string())
                .ok_or_else(|| ProtocolError::UnknownUser(target.to_string()))?;
        self.net.remove_member(name, &uid)?;
        self.net.purge_channel_if_unused(name);
        Ok(())
    }

    // :sid SJOIN ts #chan modes [params ...] :members
    pub(super) fn process_sjoin(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let ts = ts_param(msg, 0, "SJOIN")?;
        let name = required_param(msg, 1, "SJOIN")?;
        let modestr = required_param(msg, 2, "SJOIN")?;
        let offset = mode_param_count(modestr);
        let mode_end = (3 + offset).min(msg.params.len());
        let members = msg.param(3 + offset).unwrap_or("");

        if !self.merge_channel_ts(name, ts) {
            debug!("Rejected SJOIN for {}: TS {} is newer", name, ts);
            return Ok(());
        }
        apply_mode_string(&mut self.net, name, &msg.params[2..mode_end])?;
        // channel can be removed by -P
        if self.net.find_channel(name).is_none() {
            self.net.create_channel(name, ts);
        }
        for member in members.split(' ').filter(|s| !s.is_empty()) {
            let uid = member_uid(member);
            if let Err(e) = self.net.add_member(name, uid) {
                warn!("SJOIN for {}: {}", name, e);
            }
        }
        self.net.purge_channel_if_unused(name);
        Ok(())
    }

    // :source TMODE ts #chan modes [params ...]
    pub(super) fn process_tmode(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let ts = ts_param(msg, 0, "TMODE")?;
        let name = required_param(msg, 1, "TMODE")?;
        required_param(msg, 2, "TMODE")?;
        if self.check_channel_ts(name, ts, "TMODE")? {
            apply_mode_string(&mut self.net, name, &msg.params[2..])?;
        }
        Ok(())
    }

    // :sid BMASK ts #chan type :masks
    pub(super) fn process_bmask(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let ts = ts_param(msg, 0, "BMASK")?;
        let name = required_param(msg, 1, "BMASK")?;
        let list_type = required_param(msg, 2, "BMASK")?;
        let masks = required_param(msg, 3, "BMASK")?;
        if !self.check_channel_ts(name, ts, "BMASK")? {
            return Ok(());
        }
        let kind = match list_type.chars().next().and_then(ListKind::from_letter) {
            Some(kind) if list_type.len() == 1 => kind,
            _ => {
                debug!("Ignoring BMASK of type {} for {}", list_type, name);
                return Ok(());
            }
        };
        for mask in masks.split(' ').filter(|s| !s.is_empty()) {
            if let Err(e) = self.net.add_ban(name, kind, mask) {
                warn!("BMASK for {}: {}", name, e);
            }
        }
        Ok(())
    }
}
