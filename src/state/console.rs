// console.rs - operator console
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
use super::modes::apply_mode_string;
use crate::help::*;
use crate::matcher::match_wildcard;

// maximal length of channel list in GETINFO reply.
const CHANNEL_LIST_LENGTH: usize = 470;

// handler gets invoker UID and arguments. returns true if command succeeded.
type ConsoleHandler = fn(&mut MainState, &str, &[&str]) -> bool;

struct ConsoleCommand {
    name: &'static str,
    flag: char,
    min_args: usize,
    handler: ConsoleHandler,
}

static COMMANDS: [ConsoleCommand; 12] = [
    ConsoleCommand{ name: "CHANLIST", flag: 'i', min_args: 1, handler: MainState::console_chanlist },
    ConsoleCommand{ name: "CHECKBAN", flag: 'c', min_args: 1, handler: MainState::console_checkban },
    ConsoleCommand{ name: "CHGHOST", flag: 'h', min_args: 2, handler: MainState::console_chghost },
    ConsoleCommand{ name: "DIE", flag: 'd', min_args: 0, handler: MainState::console_die },
    ConsoleCommand{ name: "GETINFO", flag: 'i', min_args: 1, handler: MainState::console_getinfo },
    ConsoleCommand{ name: "GLOBAL", flag: 'n', min_args: 1, handler: MainState::console_global },
    ConsoleCommand{ name: "KILL", flag: 'k', min_args: 2, handler: MainState::console_kill },
    ConsoleCommand{ name: "MODE", flag: 'm', min_args: 2, handler: MainState::console_mode },
    ConsoleCommand{ name: "REHASH", flag: 'd', min_args: 0, handler: MainState::console_rehash },
    ConsoleCommand{ name: "SET", flag: 'f', min_args: 2, handler: MainState::console_set },
    ConsoleCommand{ name: "SVSNICK", flag: 's', min_args: 2, handler: MainState::console_svsnick },
    ConsoleCommand{ name: "USERLIST", flag: 'i', min_args: 2, handler: MainState::console_userlist },
];

const USERLIST_CRITERIA: [&str; 9] = ["NICK", "IDENT", "DHOST", "RHOST", "IP", "HOST", "GECOS",
    "SERVER", "CHANNEL"];

impl super::MainState {
    // PRIVMSG and NOTICE. only messages to the bot are interesting.
    pub(super) fn process_privmsg(&mut self, msg: &Message<'_>) -> Result<(), ProtocolError> {
        let source = required_source(msg, "PRIVMSG")?;
        let target = required_param(msg, 0, "PRIVMSG")?;
        let text = required_param(msg, 1, "PRIVMSG")?;
        if target.starts_with('#') || target.starts_with('&') || target.starts_with('$') {
            return Ok(());
        }
        // nick@server form
        let target = target.split_once('@').map_or(target, |(nick, _)| nick);
        if target != self.bot_uid() && !irc_eq(target, &self.config.bot.nick) {
            debug!("Ignoring message to {}", target);
            return Ok(());
        }
        let uid = self.net.resolve_uid(source).map(|u| u.to_string())
                .ok_or_else(|| ProtocolError::UnknownUser(source.to_string()))?;
        self.run_console(&uid, text);
        Ok(())
    }

    fn run_console(&mut self, uid: &str, text: &str) {
        let user = match self.net.users.get(uid) {
            Some(user) => user.clone(),
            None => return,
        };
        if self.config.options.require_oper && !user.is_oper() {
            warn!("Non-oper {} tried to use console", user.real_source());
            self.send_server(format!("WALLOPS :Non-oper {} [{}] tried to access me!",
                    user.real_source(), user.ip));
            return;
        }
        let words = text.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>();
        let cmd_name = match words.first() {
            Some(word) => word.to_ascii_uppercase(),
            None => return,
        };
        let args = &words[1..];
        if cmd_name == "HELP" {
            self.console_help(uid, args);
            return;
        }

        let command = match COMMANDS.iter().find(|c| c.name == cmd_name) {
            Some(command) => command,
            None => {
                self.send_notice(uid, &format!("Could not find command {}.", cmd_name));
                return;
            }
        };
        if args.len() < command.min_args {
            self.send_notice(uid, &format!("{} requires {} arguments, got {}.", cmd_name,
                    command.min_args, args.len()));
            return;
        }
        if !self.config.has_flag(&user, command.flag) {
            self.send_notice(uid, &format!("You do not have the required flag {} to use {}.",
                    command.flag, cmd_name));
            return;
        }

        info!("{} used console command {}", user.nick, cmd_name);
        let success = (command.handler)(self, uid, args);
        if self.quit {
            return;
        }
        let arg_str = args.join(" ");
        if success && !self.config.options.abuse {
            self.send_bot(format!("OPERWALL :{} used {} ({})", user.nick, cmd_name, arg_str));
        }
        let command_line = if arg_str.is_empty() {
            cmd_name
        } else {
            format!("{} {}", cmd_name, arg_str)
        };
        self.send_to_logchan(&format!("{}: {}", user.real_source(), command_line));
    }

    fn console_help(&mut self, uid: &str, args: &[&str]) {
        match args.first() {
            None => {
                self.send_notice(uid, "Commands known to me:");
                for command in COMMANDS.iter() {
                    let short = find_help(command.name).map_or("", |h| h.short);
                    self.send_notice(uid, &format!(" {:<10} {}", command.name, short));
                }
                self.send_notice(uid, "End of command listing.");
            }
            Some(name) => {
                let topic = match find_help(name) {
                    Some(topic) => topic,
                    None => {
                        self.send_notice(uid, &format!("Could not find command {}.",
                                name.to_ascii_uppercase()));
                        return;
                    }
                };
                self.send_notice(uid, &format!("Help for {}:", topic.name));
                self.send_notice(uid, &format!("Syntax: {}", topic.syntax));
                self.send_notice(uid, " ");
                for line in topic.long.lines() {
                    self.send_notice(uid, if line.is_empty() { " " } else { line });
                }
                self.send_notice(uid, "End of help.");
            }
        }
    }

    // nick(uid)!ident@dhost(rhost#ip){server}/gecos
    fn user_info(&self, user: &User) -> String {
        let server = self.net.servers.get(&user.server).map_or(user.server.as_str(),
                |s| s.name.as_str());
        format!("{}({})!{}@{}({}#{}){{{}}}/{}", user.nick, user.uid, user.ident, user.dhost,
                user.rhost, user.ip, server, user.gecos)
    }

    // find target user or notify invoker.
    fn console_target(&mut self, uid: &str, target: &str) -> Option<User> {
        let user = self.net.find_user(target).cloned();
        if user.is_none() {
            self.send_notice(uid, &format!("Could not find user {}.", target));
        }
        user
    }

    fn console_chanlist(&mut self, uid: &str, args: &[&str]) -> bool {
        let (name, mut lines) = match self.net.find_channel(args[0]) {
            Some(chan) => (chan.name.clone(), chan.members.iter()
                    .filter_map(|m| self.net.users.get(m))
                    .map(|u| self.user_info(u)).collect::<Vec<_>>()),
            None => {
                self.send_notice(uid, &format!("No such channel '{}'.", args[0]));
                return false;
            }
        };
        lines.sort();
        self.send_notice(uid, &format!("Users in {}:", name));
        for line in &lines {
            self.send_notice(uid, line);
        }
        self.send_notice(uid, "End of CHANLIST.");
        true
    }

    fn console_checkban(&mut self, uid: &str, args: &[&str]) -> bool {
        let target = match self.console_target(uid, args[0]) {
            Some(target) => target,
            None => return false,
        };
        let filter = &args[1..];
        let bans = self.net.find_bans_against(&target.uid).into_iter()
            .filter(|(chan, _)| filter.is_empty() || filter.iter().any(|f| irc_eq(f, chan)))
            .map(|(chan, ban)| (chan.to_string(), ban.to_string()))
            .collect::<Vec<_>>();
        if bans.is_empty() {
            self.send_notice(uid, &format!("{} has no bans.", target.nick));
            return true;
        }
        self.send_notice(uid, &format!("Ban list for {}:", target.nick));
        for (chan, ban) in &bans {
            self.send_notice(uid, &format!("{} is banned from {} ({}).", target.nick, chan, ban));
        }
        self.send_notice(uid, &format!("End of ban list for {}.", target.nick));
        true
    }

    fn console_chghost(&mut self, uid: &str, args: &[&str]) -> bool {
        let target = match self.console_target(uid, args[0]) {
            Some(target) => target,
            None => return false,
        };
        let host = args[1];
        self.send_bot(format!("CHGHOST {} {}", target.uid, host));
        if let Some(user) = self.net.users.get_mut(&target.uid) {
            user.dhost = host.to_string();
        }
        self.send_notice(uid, &format!("Changed the host of {} to be {}.", target.nick, host));
        true
    }

    fn console_die(&mut self, uid: &str, _: &[&str]) -> bool {
        let nick = self.net.users.get(uid).map_or(uid.to_string(), |u| u.nick.clone());
        warn!("DIE used by {}", nick);
        self.send_bot(format!("QUIT :Quit: Shutting down (DIE by {})", nick));
        let uplink = self.uplink_sid.clone().unwrap_or_else(|| "*".to_string());
        self.send_server(format!("SQUIT {} :DIE by {}", uplink, nick));
        self.quit = true;
        true
    }

    fn console_getinfo(&mut self, uid: &str, args: &[&str]) -> bool {
        let target = match self.console_target(uid, args[0]) {
            Some(target) => target,
            None => return false,
        };
        let info = self.user_info(&target);
        self.send_notice(uid, &info);
        let mut names = target.channels.iter()
            .map(|c| self.net.channels.get(c).map_or(c.clone(), |chan| chan.name.clone()))
            .collect::<Vec<_>>();
        if names.is_empty() {
            self.send_notice(uid, "No channels.");
            return true;
        }
        names.sort();
        let mut chunks = vec![];
        let mut current = String::new();
        for name in names {
            if !current.is_empty() && current.len() + name.len() + 1 > CHANNEL_LIST_LENGTH {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&name);
        }
        chunks.push(current);
        for chunk in &chunks {
            self.send_notice(uid, &format!("Channels: {}", chunk));
        }
        true
    }

    fn console_global(&mut self, uid: &str, args: &[&str]) -> bool {
        let message = args.join(" ");
        let mut servers = self.net.servers.values().filter(|s| s.sid != self.sid())
            .map(|s| s.name.clone()).collect::<Vec<_>>();
        servers.sort();
        for server in &servers {
            self.send_bot(format!("NOTICE $${} :[Global Notice] {}", server, message));
        }
        self.send_notice(uid, &format!("Globaled '{}'.", message));
        true
    }

    fn console_kill(&mut self, uid: &str, args: &[&str]) -> bool {
        let target = match self.console_target(uid, args[0]) {
            Some(target) => target,
            None => return false,
        };
        if self.config.has_flag(&target, 'g') {
            let nick = self.net.users.get(uid).map_or(uid.to_string(), |u| u.nick.clone());
            self.send_notice(uid, &format!("{} is a god, refusing to kill.", target.nick));
            self.send_bot(format!("OPERWALL :{} tried to kill {}, who is a god", nick,
                    target.nick));
            return false;
        }
        let reason = args[1..].join(" ");
        let server_name = self.config.server.name.clone();
        self.send_server(format!("KILL {} :{} ({})", target.uid, server_name, reason));
        self.net.quit_user(&target.uid);
        self.send_notice(uid, &format!("Terminated {}.", target.nick));
        true
    }

    fn console_mode(&mut self, uid: &str, args: &[&str]) -> bool {
        let (name, ts) = match self.net.find_channel(args[0]) {
            Some(chan) => (chan.name.clone(), chan.ts),
            None => {
                self.send_notice(uid, &format!("No such channel '{}'.", args[0]));
                return false;
            }
        };
        self.send_server(format!("TMODE {} {} {}", ts, name, args[1..].join(" ")));
        if let Err(e) = apply_mode_string(&mut self.net, &name, &args[1..]) {
            warn!("MODE for {}: {}", name, e);
        }
        self.send_notice(uid, &format!("Changed modes of {}.", name));
        true
    }

    fn console_rehash(&mut self, uid: &str, _: &[&str]) -> bool {
        match self.config.reload() {
            Ok(()) => {
                info!("Configuration reloaded from {}", self.config.path);
                self.send_notice(uid, "Rehashed configuration.");
                true
            }
            Err(e) => {
                error!("Rehash failed: {}", e);
                self.send_notice(uid, &format!("Rehash failed: {}", e));
                false
            }
        }
    }

    fn console_set(&mut self, uid: &str, args: &[&str]) -> bool {
        let key = args[0].to_ascii_lowercase();
        let value = args[1];
        let old_logchan = self.config.options.logchan().map(|c| c.to_string());
        let old_resv = self.config.options.resv;
        if let Err(e) = self.config.options.set(&key, value) {
            self.send_notice(uid, &format!("{}.", e));
            return false;
        }
        match key.as_str() {
            "resv" if old_resv != self.config.options.resv => {
                if self.config.options.resv {
                    self.send_resv();
                } else {
                    self.send_unresv();
                }
            }
            "logchan" => {
                let new_logchan = self.config.options.logchan().map(|c| c.to_string());
                if !old_logchan.as_deref().zip(new_logchan.as_deref())
                        .map_or(false, |(o, n)| irc_eq(o, n)) {
                    if self.joined_logchan {
                        if let Some(ref old) = old_logchan {
                            self.part_channel(old);
                        }
                        self.joined_logchan = false;
                    }
                    if let Some(ref new) = new_logchan {
                        if self.burst_done && new.starts_with('#') {
                            self.join_channel(new);
                            self.joined_logchan = true;
                        }
                    }
                }
            }
            _ => (),
        }
        let shown = if Options::is_boolean(&key) {
            (value == "true").to_string()
        } else {
            value.to_string()
        };
        self.send_notice(uid, &format!("Changed {} to {}.", key, shown));
        true
    }

    fn console_svsnick(&mut self, uid: &str, args: &[&str]) -> bool {
        let target = match self.console_target(uid, args[0]) {
            Some(target) => target,
            None => return false,
        };
        let new_nick = args[1];
        if !is_valid_nick(new_nick) {
            self.send_notice(uid, &format!("'{}' is not a valid nickname!", new_nick));
            return false;
        }
        let in_use = self.net.resolve_uid(new_nick).map_or(false, |u| u != target.uid) ||
                irc_eq(new_nick, &self.config.bot.nick);
        if in_use {
            self.send_notice(uid, &format!("Someone is using {}!", new_nick));
            return false;
        }
        let server_name = self.net.servers.get(&target.server)
                .map_or(target.server.clone(), |s| s.name.clone());
        let now = unix_now();
        self.send_server(format!("ENCAP {} RSFNC {} {} {} {}", server_name, target.uid,
                new_nick, now, target.ts));
        if let Err(e) = self.net.rename_user(&target.uid, new_nick, now) {
            warn!("SVSNICK: {}", e);
        }
        self.send_notice(uid, &format!("User {}'s nick has been changed to {}.",
                target.nick, new_nick));
        true
    }

    fn user_matches(&self, user: &User, criterion: &str, pattern: &str) -> bool {
        let m = |subject: &str| match_wildcard(pattern, subject, true);
        match criterion {
            "NICK" => m(&user.nick),
            "IDENT" => m(&user.ident),
            "DHOST" => m(&user.dhost),
            "RHOST" => m(&user.rhost),
            "IP" => m(&user.ip),
            "HOST" => m(&user.dhost) || m(&user.rhost) || m(&user.ip),
            "GECOS" => m(&user.gecos),
            "SERVER" => self.net.servers.get(&user.server).map_or(false, |s| m(&s.name)),
            "CHANNEL" => user.channels.iter().any(|c| self.net.channels.get(c)
                    .map_or(false, |chan| m(&chan.name))),
            _ => false,
        }
    }

    fn console_userlist(&mut self, uid: &str, args: &[&str]) -> bool {
        let mut criteria = vec![];
        let mut i = 0;
        while i < args.len() {
            let criterion = args[i].to_ascii_uppercase();
            if !USERLIST_CRITERIA.contains(&criterion.as_str()) {
                self.send_notice(uid, &format!("Unknown criterion {}.", criterion));
                return false;
            }
            let value = if criterion == "GECOS" {
                // GECOS takes rest of arguments
                let rest = args[i+1..].join(" ");
                i = args.len();
                rest
            } else {
                let value = args.get(i+1).map(|v| v.to_string()).unwrap_or_default();
                i += 2;
                value
            };
            if value.is_empty() {
                self.send_notice(uid, &format!("Missing argument for criterion {}.",
                        criterion));
                return false;
            }
            criteria.push((criterion, value));
        }

        let total = self.net.users.len();
        let mut lines = self.net.users.values()
            .filter(|u| criteria.iter().all(|(c, p)| self.user_matches(u, c, p)))
            .map(|u| self.user_info(u))
            .collect::<Vec<_>>();
        lines.sort();
        for line in &lines {
            self.send_notice(uid, line);
        }
        if lines.is_empty() {
            self.send_notice(uid, &format!("No matches on {} users on the network.", total));
        } else {
            self.send_notice(uid, &format!("Matched {} out of {} users on the network.",
                    lines.len(), total));
        }
        true
    }
}
