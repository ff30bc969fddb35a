// server_cmds.rs - link and server commands
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

use chrono::prelude::*;
use super::*;

// capabilities that uplink must support
const REQUIRED_CAPABS: [&str; 7] = ["EX", "IE", "EUID", "SERVICES", "ENCAP", "QS", "RSFNC"];

impl super::MainState {
    pub(super) fn process_pass(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let password = required_param(msg, 0, "PASS")?;
        if password != self.config.uplink.password {
            return Err(ProtocolError::InvalidPassword);
        }
        let sid = required_param(msg, 3, "PASS")?;
        info!("Uplink authenticated as {}", sid);
        self.uplink_sid = Some(sid.to_string());
        Ok(())
    }

    pub(super) fn process_capab(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let capabs = required_param(msg, 0, "CAPAB")?.split_ascii_whitespace()
                .collect::<Vec<_>>();
        if let Some(missing) = REQUIRED_CAPABS.iter().find(|c| !capabs.contains(*c)) {
            return Err(ProtocolError::MissingCapab(missing.to_string()));
        }
        Ok(())
    }

    pub(super) fn process_server(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let name = required_param(msg, 0, "SERVER")?;
        let description = msg.param(2).unwrap_or("");
        match self.uplink_sid.clone() {
            Some(sid) if !self.net.servers.contains_key(&sid) => {
                self.net.add_server(&sid, name, description, None);
            }
            Some(_) => debug!("Ignoring SERVER {} for already known uplink", name),
            None => warn!("SERVER {} before PASS", name),
        }
        Ok(())
    }

    pub(super) fn process_sid(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let name = required_param(msg, 0, "SID")?;
        let sid = required_param(msg, 2, "SID")?;
        let description = msg.param(3).unwrap_or("");
        let parent = msg.source.map(|s| s.to_string()).or_else(|| self.uplink_sid.clone());
        self.net.add_server(sid, name, description, parent.as_deref());
        Ok(())
    }

    pub(super) fn process_svinfo(&mut self, _: &Message<'_>) -> Result<(), ProtocolError> {
        info!("Burst from uplink received, introducing bot");
        self.burst_done = true;
        self.bot_introduction();
        Ok(())
    }

    pub(super) fn process_ping(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        self.last_ping.mark();
        if self.burst_done && !self.joined_logchan {
            if let Some(logchan) = self.config.options.logchan()
                    .filter(|c| c.starts_with('#')).map(|c| c.to_string()) {
                self.join_channel(&logchan);
                self.joined_logchan = true;
            }
        }
        let token = msg.param(0).map(|t| t.to_string())
                .unwrap_or_else(|| self.config.server.name.clone());
        self.send(format!("PONG :{}", token));
        Ok(())
    }

    pub(super) fn process_error(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        error!("Uplink error: {}", msg.param(0).unwrap_or(""));
        self.quit = true;
        Ok(())
    }

    pub(super) fn process_squit(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let target = required_param(msg, 0, "SQUIT")?;
        if target == self.sid() {
            info!("SQUIT received for us: {}", msg.param(1).unwrap_or(""));
            self.send("ERROR :SQUIT received, shutting down");
            self.quit = true;
            return Ok(());
        }
        if !self.net.servers.contains_key(target) {
            return Err(ProtocolError::UnknownServer(target.to_string()));
        }
        let removed = self.net.remove_server_tree(target);
        info!("Server {} split, {} users removed", target, removed);
        Ok(())
    }

    pub(super) fn process_encap(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let subcommand = required_param(msg, 1, "ENCAP")?;
        match subcommand.to_ascii_uppercase().as_str() {
            "CERTFP" => {
                let certfp = required_param(msg, 2, "ENCAP")?;
                self.source_user_mut(msg)?.certfp = Some(certfp.to_string());
            }
            "SU" => {
                let target = required_param(msg, 2, "ENCAP")?;
                let account = msg.param(3).filter(|a| !a.is_empty() && *a != "*");
                let user = self.net.find_user_mut(target)
                    .ok_or_else(|| ProtocolError::UnknownUser(target.to_string()))?;
                user.account = account.map(|a| a.to_string());
            }
            "LOGIN" => {
                let account = required_param(msg, 2, "ENCAP")?;
                self.source_user_mut(msg)?.account = Some(account.to_string());
            }
            "REALHOST" => {
                let host = required_param(msg, 2, "ENCAP")?;
                self.source_user_mut(msg)?.rhost = host.to_string();
            }
            "CHGHOST" => {
                let target = required_param(msg, 2, "ENCAP")?;
                let host = required_param(msg, 3, "ENCAP")?;
                let user = self.net.find_user_mut(target)
                    .ok_or_else(|| ProtocolError::UnknownUser(target.to_string()))?;
                user.dhost = host.to_string();
            }
            _ => debug!("Ignoring ENCAP {}", subcommand),
        }
        Ok(())
    }

    fn source_user_mut(&mut self, msg: &Message<'_>) -> Result<&mut User, ProtocolError> {
        let source = required_source(msg, "ENCAP")?;
        self.net.find_user_mut(source).ok_or_else(|| ProtocolError::UnknownUser(source.to_string()))
    }

    // remote queries

    pub(super) fn process_admin(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "ADMIN")?;
        let server = self.config.server.name.clone();
        let info1 = self.config.bot.realname().to_string();
        let info2 = self.config.server.description.clone();
        self.send_numeric(RplAdminMe256{ client, server: &server });
        self.send_numeric(RplAdminLoc1257{ client, info: &info1 });
        self.send_numeric(RplAdminLoc2258{ client, info: &info2 });
        Ok(())
    }

    pub(super) fn process_info(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "INFO")?;
        let intro = format!("This is {}.", self.config.bot.nick);
        self.send_numeric(RplInfo371{ client, info: &intro });
        self.send_numeric(RplInfo371{ client, info: "Well, you found me. Congratulations." });
        self.send_numeric(RplEndOfInfo374{ client });
        Ok(())
    }

    pub(super) fn process_lusers(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "LUSERS")?;
        let users_num = self.net.users.len();
        let servers_num = self.net.servers.len();
        let ops_num = self.net.users.values().filter(|u| u.is_oper()).count();
        self.send_numeric(RplLUserClient251{ client, users_num, inv_users_num: 0, servers_num });
        self.send_numeric(RplLUserOp252{ client, ops_num });
        // only the bot is local
        self.send_numeric(RplLUserMe255{ client, clients_num: 1, servers_num: 1 });
        self.send_numeric(RplLocalUsers265{ client, clients_num: 1, max_clients_num: 1 });
        Ok(())
    }

    pub(super) fn process_version(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "VERSION")?;
        let server = self.config.server.name.clone();
        self.send_numeric(RplVersion351{ client,
                version: concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")),
                server: &server, comments: "TS6 pseudo-server" });
        Ok(())
    }

    pub(super) fn process_time(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "TIME")?;
        let server = self.config.server.name.clone();
        let time = Local::now();
        self.send_numeric(RplTime391{ client, server: &server,
                human_readable: time.to_rfc2822().as_str() });
        Ok(())
    }

    pub(super) fn process_motd(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "MOTD")?;
        self.send_numeric(ErrNoMotd422{ client });
        Ok(())
    }

    pub(super) fn process_whois(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "WHOIS")?;
        // :uid WHOIS <our uid> :<nick>
        let nick = required_param(msg, msg.params.len().saturating_sub(1), "WHOIS")?;
        if !irc_eq(nick, &self.config.bot.nick) {
            self.send_numeric(ErrNoSuchNick401{ client, nick });
            return Ok(());
        }
        let bot = self.config.bot.clone();
        let server = self.config.server.clone();
        self.send_numeric(RplWhoIsUser311{ client, nick: &bot.nick, username: &bot.ident,
                host: &bot.host, realname: bot.realname() });
        self.send_numeric(RplWhoIsServer312{ client, nick: &bot.nick, server: &server.name,
                server_info: &server.description });
        self.send_numeric(RplWhoIsService313{ client, nick: &bot.nick });
        self.send_numeric(RplEndOfWhoIs318{ client, nick });
        Ok(())
    }

    pub(super) fn process_stats(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "STATS")?;
        let stat = msg.param(0).unwrap_or("*");
        let is_oper = self.net.find_user(client)
            .ok_or_else(|| ProtocolError::UnknownUser(client.to_string()))?.is_oper();
        if !is_oper {
            self.send_numeric(ErrNoPrivileges481{ client });
        } else if stat == "o" || stat == "O" {
            let entries = self.config.opers().iter().map(|o| o.to_stats_string())
                    .collect::<Vec<_>>();
            for entry in &entries {
                self.send_numeric(RplStatsOLine243{ client, entry });
            }
        }
        self.send_numeric(RplEndOfStats219{ client, stat });
        Ok(())
    }

    pub(super) fn process_links(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let client = required_source(msg, "LINKS")?;
        self.send_server(format!("NOTICE {} :LINKS is not available on this server.", client));
        Ok(())
    }

    pub(super) fn process_connect(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let source = required_source(msg, "CONNECT")?;
        let who = self.net.find_user(source).map_or(source.to_string(), |u| u.nick.clone());
        warn!("{} tried to CONNECT", who);
        self.send_server(format!("WALLOPS :{} tried to CONNECT, but I am a service.", who));
        Ok(())
    }

    pub(super) fn process_ignored(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        debug!("Ignoring {}", msg.command);
        Ok(())
    }
}
