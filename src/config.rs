// config.rs - configuration
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

use std::error::Error;
use std::fs::File;
use std::io::Read;
use clap;
use toml;
use serde_derive::{Serialize, Deserialize};
use thiserror::Error;
use validator::Validate;

use crate::matcher::match_wildcard;
use crate::state::structs::{OperLevel, User};
use crate::utils::*;

pub(crate) const DEFAULT_CONFIG_PATH: &str = "ts6-pseudoserver.toml";

#[derive(clap::Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub(crate) struct Cli {
    #[clap(short, long, help="Configuration file path")]
    pub(crate) config: Option<String>,
    #[clap(short='H', long, help="Uplink host")]
    uplink_host: Option<String>,
    #[clap(short='p', long, help="Uplink port")]
    uplink_port: Option<u16>,
    #[clap(short, long, help="Enable debug logging")]
    debug: bool,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate, Clone)]
pub(crate) struct ServerConfig {
    #[validate(custom = "validate_sid")]
    pub(crate) sid: String,
    #[validate(contains = ".")]
    pub(crate) name: String,
    pub(crate) description: String,
    // local address to bind before connecting to uplink
    pub(crate) vhost: Option<String>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate, Clone)]
pub(crate) struct BotConfig {
    #[validate(custom = "validate_nick")]
    pub(crate) nick: String,
    #[validate(length(min = 1))]
    pub(crate) ident: String,
    #[validate(length(min = 1))]
    pub(crate) host: String,
    pub(crate) realname: Option<String>,
}

impl BotConfig {
    pub(crate) fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or("The A Bot")
    }
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate, Clone)]
pub(crate) struct UplinkConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    #[validate(length(min = 1))]
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) tls: bool,
    pub(crate) tls_ca_file: Option<String>,
}

/// Access entry for console commands.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate, Clone)]
pub(crate) struct OperConfig {
    #[validate(custom = "validate_oper_mask")]
    pub(crate) mask: String,
    pub(crate) certfp: Option<String>,
    pub(crate) account: Option<String>,
    #[validate(length(min = 1))]
    pub(crate) flags: String,
}

// "*" or empty value means not set.
fn config_value(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty() && *s != "*")
}

impl OperConfig {
    fn ident_host(&self) -> (&str, &str) {
        self.mask.split_once('@').unwrap_or((self.mask.as_str(), "*"))
    }

    pub(crate) fn certfp(&self) -> Option<&str> {
        config_value(&self.certfp)
    }

    pub(crate) fn account(&self) -> Option<&str> {
        config_value(&self.account)
    }

    pub(crate) fn can_access(&self, user: &User) -> bool {
        let (ident, host) = self.ident_host();
        let cert_match = match (self.certfp(), user.certfp.as_deref()) {
            (Some(expected), Some(fp)) => expected == fp,
            _ => false,
        };
        let account_match = match (self.account(), user.account.as_deref()) {
            (Some(expected), Some(acc)) => expected == acc,
            _ => false,
        };
        match_wildcard(ident, &user.ident, true) &&
            (match_wildcard(host, &user.rhost, true) || match_wildcard(host, &user.ip, true)) &&
            (cert_match || account_match)
    }

    pub(crate) fn has_flag(&self, flag: char) -> bool {
        self.flags.contains(flag) || self.flags.contains('*')
    }

    pub(crate) fn to_stats_string(&self) -> String {
        format!("{} {} {} {}", self.mask, self.certfp().unwrap_or("*"),
                self.account().unwrap_or("*"), self.flags)
    }
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone)]
pub(crate) struct LevelsConfig {
    pub(crate) oper: String,
    pub(crate) admin: String,
}

impl LevelsConfig {
    pub(crate) fn flags_for(&self, level: OperLevel) -> &str {
        match level {
            OperLevel::Oper => &self.oper,
            OperLevel::Admin => &self.admin,
        }
    }
}

fn default_logchan() -> String {
    "*".to_string()
}

fn default_protocol() -> String {
    "charybdis".to_string()
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate, Clone)]
pub(crate) struct Options {
    #[serde(default = "default_logchan")]
    #[validate(custom = "validate_logchan")]
    pub(crate) logchan: String,
    #[serde(default)]
    pub(crate) require_oper: bool,
    #[serde(default)]
    pub(crate) debug: bool,
    #[serde(default)]
    pub(crate) abuse: bool,
    #[serde(default)]
    pub(crate) resv: bool,
    #[serde(default)]
    pub(crate) levels: bool,
    #[serde(default = "default_protocol")]
    #[validate(custom = "validate_protocol")]
    pub(crate) protocol: String,
}

impl Default for Options {
    fn default() -> Self {
        Options{ logchan: default_logchan(), require_oper: false, debug: false,
            abuse: false, resv: false, levels: false, protocol: default_protocol() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub(crate) enum OptionError {
    #[error("Unknown option {0}")]
    UnknownOption(String),
    #[error("Option {0} cannot be changed at runtime")]
    ReadOnly(String),
    #[error("Invalid value {1} for option {0}")]
    InvalidValue(String, String),
}

impl Options {
    pub(crate) fn is_boolean(key: &str) -> bool {
        matches!(key, "require_oper" | "debug" | "abuse" | "resv" | "levels")
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<(), OptionError> {
        let flag = value == "true";
        match key {
            "logchan" => {
                if validate_logchan(value).is_err() {
                    return Err(OptionError::InvalidValue(key.to_string(), value.to_string()));
                }
                self.logchan = value.to_string();
            }
            "require_oper" => self.require_oper = flag,
            "debug" => self.debug = flag,
            "abuse" => self.abuse = flag,
            "resv" => self.resv = flag,
            "levels" => self.levels = flag,
            "protocol" => return Err(OptionError::ReadOnly(key.to_string())),
            _ => return Err(OptionError::UnknownOption(key.to_string())),
        }
        Ok(())
    }

    pub(crate) fn logchan(&self) -> Option<&str> {
        if self.logchan == "*" { None } else { Some(&self.logchan) }
    }
}

/// Main configuration structure.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate, Clone)]
pub(crate) struct MainConfig {
    #[validate]
    pub(crate) server: ServerConfig,
    #[validate]
    pub(crate) bot: BotConfig,
    #[validate]
    pub(crate) uplink: UplinkConfig,
    #[validate]
    pub(crate) opers: Option<Vec<OperConfig>>,
    pub(crate) levels: Option<LevelsConfig>,
    #[serde(default)]
    #[validate]
    pub(crate) options: Options,
    // path of file that configuration was read from
    #[serde(skip)]
    pub(crate) path: String,
}

impl MainConfig {
    pub(crate) fn new(cli: Cli) -> Result<MainConfig, Box<dyn Error>> {
        let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
        let mut config = MainConfig::read_file(config_path)?;
        // modify configuration by CLI options
        if let Some(host) = cli.uplink_host {
            config.uplink.host = host;
        }
        if let Some(port) = cli.uplink_port {
            config.uplink.port = port;
        }
        config.options.debug = config.options.debug || cli.debug;
        Ok(config)
    }

    fn read_file(path: &str) -> Result<MainConfig, Box<dyn Error>> {
        let mut config_file = File::open(path)?;
        let mut config_str = String::new();
        config_file.read_to_string(&mut config_str)?;
        let mut config: MainConfig = toml::from_str(&config_str)?;
        config.path = path.to_string();
        config.validate()?;
        Ok(config)
    }

    /// Reread configuration file and replace access entries and options.
    /// Identity, uplink and protocol are kept.
    pub(crate) fn reload(&mut self) -> Result<(), Box<dyn Error>> {
        let new_config = MainConfig::read_file(&self.path)?;
        let protocol = std::mem::take(&mut self.options.protocol);
        self.opers = new_config.opers;
        self.levels = new_config.levels;
        self.options = new_config.options;
        self.options.protocol = protocol;
        Ok(())
    }

    pub(crate) fn opers(&self) -> &[OperConfig] {
        self.opers.as_deref().unwrap_or(&[])
    }

    // check whether user has flag by access entry or by oper level.
    pub(crate) fn has_flag(&self, user: &User, flag: char) -> bool {
        let by_entry = self.opers().iter().find(|o| o.can_access(user))
            .map_or(false, |o| o.has_flag(flag));
        if by_entry { return true; }
        if !self.options.levels { return false; }
        match (user.level, &self.levels) {
            (Some(level), Some(levels)) => levels.flags_for(level).contains(flag),
            _ => false,
        }
    }
}

impl Default for MainConfig {
    fn default() -> Self {
        MainConfig{
            server: ServerConfig{ sid: "42X".to_string(), name: "a.example.net".to_string(),
                description: "The A Bot".to_string(), vhost: None },
            bot: BotConfig{ nick: "A".to_string(), ident: "a".to_string(),
                host: "a.example.net".to_string(), realname: None },
            uplink: UplinkConfig{ host: "127.0.0.1".to_string(), port: 6667,
                password: "linkpass".to_string(), tls: false, tls_ca_file: None },
            opers: None,
            levels: None,
            options: Options::default(),
            path: DEFAULT_CONFIG_PATH.to_string() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::env::temp_dir;
    use std::fs;
    use crate::state::structs::UserIntro;

    struct TempFileHandle {
        path: String
    }

    impl TempFileHandle {
        fn new(path: &str) -> TempFileHandle {
            TempFileHandle{ path: temp_dir().join(path)
                    .to_string_lossy().to_string() }
        }
    }

    impl Drop for TempFileHandle {
        fn drop(&mut self) {
            let _ = fs::remove_file(self.path.as_str());
        }
    }

    const CONFIG_TEXT: &str = r##"
[server]
sid = "42X"
name = "a.example.net"
description = "The A Bot"

[bot]
nick = "A"
ident = "a"
host = "a.example.net"

[uplink]
host = "irc.example.net"
port = 6667
password = "linkpass"

[[opers]]
mask = "*@*.example.net"
account = "bob"
flags = "ki"

[[opers]]
mask = "root@*"
certfp = "*"
flags = "*"

[levels]
oper = "ci"
admin = "cik"

[options]
logchan = "#services"
require_oper = true
resv = true
"##;

    fn user(ident: &str, rhost: &str, umodes: &str) -> User {
        User::new(&UserIntro{ server: "42X", uid: "42XAAAAAB", nick: "foo", ident,
            dhost: "cloak", rhost, ip: "192.0.2.1", ts: 1, umodes, gecos: "Foo" })
    }

    #[test]
    fn test_mainconfig_new() {
        let file_handle = TempFileHandle::new("ts6ps_temp_config.toml");
        fs::write(file_handle.path.as_str(), CONFIG_TEXT).unwrap();
        let cli = Cli{ config: Some(file_handle.path.clone()), uplink_host: None,
            uplink_port: None, debug: false };
        let config = MainConfig::new(cli).unwrap();
        assert_eq!(MainConfig{
            server: ServerConfig{ sid: "42X".to_string(), name: "a.example.net".to_string(),
                description: "The A Bot".to_string(), vhost: None },
            bot: BotConfig{ nick: "A".to_string(), ident: "a".to_string(),
                host: "a.example.net".to_string(), realname: None },
            uplink: UplinkConfig{ host: "irc.example.net".to_string(), port: 6667,
                password: "linkpass".to_string(), tls: false, tls_ca_file: None },
            opers: Some(vec![
                OperConfig{ mask: "*@*.example.net".to_string(), certfp: None,
                    account: Some("bob".to_string()), flags: "ki".to_string() },
                OperConfig{ mask: "root@*".to_string(), certfp: Some("*".to_string()),
                    account: None, flags: "*".to_string() }]),
            levels: Some(LevelsConfig{ oper: "ci".to_string(), admin: "cik".to_string() }),
            options: Options{ logchan: "#services".to_string(), require_oper: true,
                debug: false, abuse: false, resv: true, levels: false,
                protocol: "charybdis".to_string() },
            path: file_handle.path.clone() }, config);

        let cli = Cli{ config: Some(file_handle.path.clone()),
            uplink_host: Some("10.0.0.1".to_string()), uplink_port: Some(7000), debug: true };
        let config = MainConfig::new(cli).unwrap();
        assert_eq!("10.0.0.1", config.uplink.host);
        assert_eq!(7000, config.uplink.port);
        assert!(config.options.debug);
    }

    #[test]
    fn test_mainconfig_new_invalid() {
        let file_handle = TempFileHandle::new("ts6ps_temp_config_invalid.toml");
        let cli = Cli{ config: Some(file_handle.path.clone()), uplink_host: None,
            uplink_port: None, debug: false };
        fs::write(file_handle.path.as_str(), CONFIG_TEXT.replace("\"42X\"", "\"X42\"")).unwrap();
        assert!(MainConfig::new(cli.clone()).is_err());
        fs::write(file_handle.path.as_str(), CONFIG_TEXT.replace("resv = true",
                "resv = true\nprotocol = \"inspircd\"")).unwrap();
        assert!(MainConfig::new(cli.clone()).is_err());
        fs::write(file_handle.path.as_str(), CONFIG_TEXT.replace("*@*.example.net",
                "nohost")).unwrap();
        assert!(MainConfig::new(cli.clone()).is_err());
        // missing section
        fs::write(file_handle.path.as_str(), CONFIG_TEXT.replace("[uplink]", "[uplinkx]"))
                .unwrap();
        assert!(MainConfig::new(cli.clone()).is_err());
        let cli = Cli{ config: Some("/nonexistent/ts6ps.toml".to_string()), uplink_host: None,
            uplink_port: None, debug: false };
        assert!(MainConfig::new(cli).is_err());
    }

    #[test]
    fn test_oper_can_access() {
        let entry = OperConfig{ mask: "*@*.example.net".to_string(), certfp: None,
            account: Some("bob".to_string()), flags: "ki".to_string() };
        let mut u = user("foo", "shell.example.net", "+");
        assert!(!entry.can_access(&u));
        u.account = Some("bob".to_string());
        assert!(entry.can_access(&u));
        assert!(entry.has_flag('k'));
        assert!(!entry.has_flag('x'));
        u.account = Some("alice".to_string());
        assert!(!entry.can_access(&u));

        // host matched by IP
        let entry = OperConfig{ mask: "foo@192.0.2.*".to_string(),
            certfp: Some("abcdef".to_string()), account: None, flags: "*".to_string() };
        let mut u = user("foo", "other.host", "+");
        u.certfp = Some("abcdef".to_string());
        assert!(entry.can_access(&u));
        assert!(entry.has_flag('x'));
        u.ident = "bar".to_string();
        assert!(!entry.can_access(&u));

        // neither certfp nor account: never grants
        let entry = OperConfig{ mask: "*@*".to_string(), certfp: Some("*".to_string()),
            account: Some("".to_string()), flags: "*".to_string() };
        let mut u = user("foo", "shell.example.net", "+o");
        u.certfp = Some("*".to_string());
        u.account = Some("".to_string());
        assert!(!entry.can_access(&u));
    }

    #[test]
    fn test_has_flag() {
        let mut config: MainConfig = toml::from_str(CONFIG_TEXT).unwrap();
        let mut u = user("foo", "shell.example.net", "+");
        u.account = Some("bob".to_string());
        assert!(config.has_flag(&u, 'k'));
        assert!(!config.has_flag(&u, 'x'));

        let mut oper = user("foo", "elsewhere.net", "+o");
        assert!(!config.has_flag(&oper, 'c'));
        config.options.levels = true;
        assert!(config.has_flag(&oper, 'c'));
        assert!(!config.has_flag(&oper, 'k'));
        oper.apply_umodes("+a");
        assert!(config.has_flag(&oper, 'k'));
        oper.apply_umodes("-a");
        assert!(!config.has_flag(&oper, 'c'));
    }

    #[test]
    fn test_oper_to_stats_string() {
        let entry = OperConfig{ mask: "*@*.example.net".to_string(), certfp: None,
            account: Some("bob".to_string()), flags: "ki".to_string() };
        assert_eq!("*@*.example.net * bob ki", entry.to_stats_string());
    }

    #[test]
    fn test_options_set() {
        let mut options = Options::default();
        assert_eq!(Ok(()), options.set("abuse", "true"));
        assert!(options.abuse);
        assert_eq!(Ok(()), options.set("abuse", "yes"));
        assert!(!options.abuse);
        assert_eq!(None, options.logchan());
        assert_eq!(Ok(()), options.set("logchan", "#log"));
        assert_eq!(Some("#log"), options.logchan());
        assert_eq!(Err(OptionError::InvalidValue("logchan".to_string(), "log".to_string())),
                options.set("logchan", "log"));
        assert_eq!(Err(OptionError::ReadOnly("protocol".to_string())),
                options.set("protocol", "inspircd"));
        assert_eq!(Err(OptionError::UnknownOption("color".to_string())),
                options.set("color", "red"));
        assert!(Options::is_boolean("resv"));
        assert!(!Options::is_boolean("logchan"));
    }

    #[test]
    fn test_mainconfig_reload() {
        let file_handle = TempFileHandle::new("ts6ps_temp_config_reload.toml");
        fs::write(file_handle.path.as_str(), CONFIG_TEXT).unwrap();
        let cli = Cli{ config: Some(file_handle.path.clone()), uplink_host: None,
            uplink_port: None, debug: false };
        let mut config = MainConfig::new(cli).unwrap();
        config.options.abuse = true;
        fs::write(file_handle.path.as_str(), CONFIG_TEXT.replace("flags = \"ki\"",
                "flags = \"kix\"").replace("name = \"a.example.net\"",
                "name = \"b.example.net\"")).unwrap();
        config.reload().unwrap();
        assert_eq!("kix", config.opers()[0].flags);
        assert!(!config.options.abuse);
        assert_eq!("a.example.net", config.server.name);
        assert_eq!("charybdis", config.options.protocol);

        // broken file keeps running configuration
        fs::write(file_handle.path.as_str(), "[server").unwrap();
        assert!(config.reload().is_err());
        assert_eq!("kix", config.opers()[0].flags);
    }
}
