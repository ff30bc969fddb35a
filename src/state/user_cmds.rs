// user_cmds.rs - user tracking commands
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

impl super::MainState {
    // server that introduces user: message source or uplink.
    fn introducing_server(&self, msg: &Message<'_>, cmd: &'static str)
                -> Result<String, ProtocolError> {
        let sid = msg.source.map(|s| s.to_string()).or_else(|| self.uplink_sid.clone())
                .ok_or(ProtocolError::NoSource(cmd))?;
        if self.net.servers.contains_key(&sid) {
            Ok(sid)
        } else {
            Err(ProtocolError::UnknownServer(sid))
        }
    }

    // :sid EUID nick hops ts umodes ident dhost ip uid rhost account :gecos
    pub(super) fn process_euid(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        if msg.params.len() < 11 {
            return Err(ProtocolError::NeedMoreParams("EUID"));
        }
        let server = self.introducing_server(msg, "EUID")?;
        let ts = ts_param(msg, 2, "EUID")?;
        let p = &msg.params;
        let intro = UserIntro{ server: &server, uid: p[7], nick: p[0], ident: p[4],
            dhost: p[5], rhost: p[8], ip: p[6], ts, umodes: p[3], gecos: p[10] };
        self.net.create_user(&intro)?;
        if p[9] != "*" {
            if let Some(user) = self.net.users.get_mut(p[7]) {
                user.account = Some(p[9].to_string());
            }
        }
        Ok(())
    }

    // :sid UID nick hops ts umodes ident host ip uid :gecos
    pub(super) fn process_uid(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        if msg.params.len() < 9 {
            return Err(ProtocolError::NeedMoreParams("UID"));
        }
        let server = self.introducing_server(msg, "UID")?;
        let ts = ts_param(msg, 2, "UID")?;
        let p = &msg.params;
        let intro = UserIntro{ server: &server, uid: p[7], nick: p[0], ident: p[4],
            dhost: p[5], rhost: p[5], ip: p[6], ts, umodes: p[3], gecos: p[8] };
        self.net.create_user(&intro)?;
        Ok(())
    }

    fn source_uid(&self, msg: &Message<'_>, cmd: &'static str) -> Result<String, ProtocolError> {
        let source = required_source(msg, cmd)?;
        self.net.resolve_uid(source).map(|u| u.to_string())
                .ok_or_else(|| ProtocolError::UnknownUser(source.to_string()))
    }

    fn target_uid(&self, target: &str) -> Result<String, ProtocolError> {
        self.net.resolve_uid(target).map(|u| u.to_string())
                .ok_or_else(|| ProtocolError::UnknownUser(target.to_string()))
    }

    // :uid NICK newnick :ts
    pub(super) fn process_nick(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let uid = self.source_uid(msg, "NICK")?;
        let nick = required_param(msg, 0, "NICK")?;
        let ts = ts_param(msg, 1, "NICK")?;
        self.net.rename_user(&uid, nick, ts)?;
        Ok(())
    }

    pub(super) fn process_quit(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let uid = self.source_uid(msg, "QUIT")?;
        if let Some(user) = self.net.quit_user(&uid) {
            debug!("User {} quit: {}", user.nick, msg.param(0).unwrap_or(""));
        }
        Ok(())
    }

    // :source KILL uid :path (reason)
    pub(super) fn process_kill(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let target = required_param(msg, 0, "KILL")?;
        if target == self.bot_uid() {
            warn!("Bot has been killed: {}", msg.param(1).unwrap_or(""));
            self.bot_introduction();
            if self.joined_logchan {
                if let Some(logchan) = self.config.options.logchan().map(|c| c.to_string()) {
                    self.join_channel(&logchan);
                }
            }
            return Ok(());
        }
        let uid = self.target_uid(target)?;
        if let Some(user) = self.net.quit_user(&uid) {
            info!("User {} killed: {}", user.nick, msg.param(1).unwrap_or(""));
        }
        Ok(())
    }

    // :uid MODE uid :+modes
    pub(super) fn process_mode(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let target = required_param(msg, 0, "MODE")?;
        if target.starts_with('#') || target.starts_with('&') {
            // channel modes are propagated by TMODE
            debug!("Ignoring MODE for channel {}", target);
            return Ok(());
        }
        let modestr = required_param(msg, 1, "MODE")?;
        let user = self.net.find_user_mut(target)
            .ok_or_else(|| ProtocolError::UnknownUser(target.to_string()))?;
        let old_level = user.level;
        user.apply_umodes(modestr);
        if old_level != user.level {
            info!("User {} has level {}", user.nick, user.level.map_or("none", |l| l.as_str()));
        }
        Ok(())
    }

    pub(super) fn process_chghost(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let target = required_param(msg, 0, "CHGHOST")?;
        let host = required_param(msg, 1, "CHGHOST")?;
        let user = self.net.find_user_mut(target)
            .ok_or_else(|| ProtocolError::UnknownUser(target.to_string()))?;
        user.dhost = host.to_string();
        Ok(())
    }

    // :sid SAVE uid ts - nick collision, user nick becomes its UID
    pub(super) fn process_save(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let target = required_param(msg, 0, "SAVE")?;
        let ts = ts_param(msg, 1, "SAVE")?;
        let uid = self.target_uid(target)?;
        self.net.rename_user(&uid, &uid, ts)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use super::super::test::*;

    #[test]
    fn test_euid_oper_level() {
        let mut state = linked_state();
        add_user(&mut state, "43YAAAAAB", "bob", "+io");
        {
            let user = state.net.find_user("bob").unwrap();
            assert!(user.is_oper());
            assert_eq!(Some(OperLevel::Oper), user.level);
            assert_eq!("shell.example.net", user.rhost);
            assert_eq!("cloak.example.net", user.dhost);
            assert_eq!("192.0.2.1", user.ip);
            assert_eq!("Some User", user.gecos);
            assert_eq!(1000, user.ts);
            assert_eq!(None, user.account);
        }
        assert_eq!(1, state.net.servers["43Y"].usercount);
        state.process_line(":43YAAAAAB MODE 43YAAAAAB :-o");
        let user = state.net.find_user("bob").unwrap();
        assert!(!user.is_oper());
        assert_eq!(None, user.level);
    }

    #[test]
    fn test_euid_account_and_spoofed_host() {
        let mut state = linked_state();
        state.process_line(":43Y EUID ann 1 1000 +ia ann spoof.host 0 43YAAAAAC * annacc :Ann");
        let user = state.net.find_user("ANN").unwrap();
        assert_eq!(Some("annacc"), user.account.as_deref());
        assert_eq!("0", user.rhost);
        assert_eq!(Some(OperLevel::Admin), user.level);
        // unknown server
        assert!(state.process_line(":99Q EUID joe 1 1000 +i joe h 0 99QAAAAAB h * :Joe")
                .is_empty());
        assert!(state.net.find_user("joe").is_none());
        assert!(!state.is_quit());
    }

    #[test]
    fn test_uid() {
        let mut state = linked_state();
        state.process_line(":43Y UID joe 1 1000 +i joe joe.host 192.0.2.5 43YAAAAAD :Joe");
        let user = state.net.find_user("joe").unwrap();
        assert_eq!("joe.host", user.rhost);
        assert_eq!("joe.host", user.dhost);
        assert_eq!("43Y", user.server);
    }

    #[test]
    fn test_nick_and_save() {
        let mut state = linked_state();
        add_user(&mut state, "43YAAAAAB", "bob", "+i");
        state.process_line(":43YAAAAAB NICK Rob[ert] :2000");
        assert!(state.net.find_user("bob").is_none());
        let user = state.net.find_user("rob{ERT}").unwrap();
        assert_eq!("Rob[ert]", user.nick);
        assert_eq!(2000, user.ts);
        state.process_line(":43Y SAVE 43YAAAAAB 2100");
        let user = state.net.find_user("43YAAAAAB").unwrap();
        assert_eq!("43YAAAAAB", user.nick);
        assert_eq!(2100, user.ts);
        assert!(state.net.find_user("rob[ert]").is_none());
    }

    #[test]
    fn test_quit_and_kill() {
        let mut state = linked_state();
        add_user(&mut state, "43YAAAAAB", "bob", "+i");
        add_user(&mut state, "43YAAAAAC", "ann", "+i");
        state.process_line(":43YAAAAAB JOIN 100 #chan +");
        state.process_line(":43YAAAAAC JOIN 100 #other +");
        assert_eq!(2, state.net.servers["43Y"].usercount);
        state.process_line(":43YAAAAAB QUIT :Quit: bye");
        assert!(state.net.find_user("bob").is_none());
        assert!(state.net.find_channel("#chan").is_none());
        assert_eq!(1, state.net.servers["43Y"].usercount);
        state.process_line(":43YAAAAAX KILL 43YAAAAAC :irc.example.net!oper (go away)");
        assert!(state.net.find_user("ann").is_none());
        assert!(state.net.find_channel("#other").is_none());
        assert_eq!(0, state.net.servers["43Y"].usercount);
        assert!(state.net.users.is_empty());
    }

    #[test]
    fn test_kill_bot() {
        let mut state = linked_state();
        let lines = state.process_line(":43YAAAAAB KILL 42XAAAAAA :oper (bye)");
        assert_eq!(1, lines.len());
        assert!(lines[0].starts_with(":42X EUID A 1 "));
    }

    #[test]
    fn test_umodes_and_chghost() {
        let mut state = linked_state();
        add_user(&mut state, "43YAAAAAB", "bob", "+i");
        state.process_line(":43YAAAAAB MODE 43YAAAAAB :+oa");
        assert_eq!(Some(OperLevel::Admin), state.net.find_user("bob").unwrap().level);
        state.process_line(":43YAAAAAB MODE 43YAAAAAB :-a");
        assert_eq!(None, state.net.find_user("bob").unwrap().level);
        // channel MODE is ignored
        assert!(state.process_line(":43YAAAAAB MODE #chan +o bob").is_empty());
        state.process_line(":43Y CHGHOST 43YAAAAAB new.cloak");
        assert_eq!("new.cloak", state.net.find_user("bob").unwrap().dhost);
        assert!(state.process_line(":43Y CHGHOST 43YAAAAAZ new.cloak").is_empty());
        assert!(!state.is_quit());
    }
}
