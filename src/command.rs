// command.rs - commands and messages
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

use const_table::const_table;
use thiserror::Error;

use crate::state::structs::StateError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub(crate) enum MessageError {
    #[error("Message is empty")]
    Empty,
    #[error("No command")]
    NoCommand,
}

/// Single protocol line split to source, command and parameters.
#[derive(PartialEq, Eq, Debug)]
pub(crate) struct Message<'a> {
    pub(crate) source: Option<&'a str>,
    pub(crate) command: &'a str,
    pub(crate) params: Vec<&'a str>,
}

impl<'a> Message<'a> {
    pub(crate) fn from_shared_str(input: &'a str) -> Result<Self, MessageError> {
        let trimmed = input.trim_end_matches(|c| c == '\r' || c == '\n');
        if trimmed.trim().is_empty() {
            return Err(MessageError::Empty);
        }
        // trailing parameter starts at first " :" after first character
        // (the first character can be ':' of source).
        let first_len = trimmed.chars().next().map_or(0, |c| c.len_utf8());
        let (rest, last_param) =
            if let Some(pos) = trimmed[first_len..].find(" :") {
                let pos = pos + first_len;
                (&trimmed[..pos], Some(&trimmed[pos+2..]))
            } else { (trimmed, None) };

        let mut rest_words = rest.split_ascii_whitespace();
        let source = if rest.trim_start().starts_with(':') {
            rest_words.next().map(|s| &s[1..])
        } else { None };
        let command = if let Some(cmd) = rest_words.next() { cmd }
            else { return Err(MessageError::NoCommand); };

        let mut params = rest_words.collect::<Vec<_>>();
        if let Some(lp) = last_param {
            params.push(lp);    // add last parameter
        }
        Ok(Message{ source, command, params })
    }

    pub(crate) fn param(&self, i: usize) -> Option<&'a str> {
        self.params.get(i).copied()
    }
}

#[const_table]
pub enum CommandId {
    CommandName{ name: &'static str },
    PASSId = CommandName{ name: "PASS" },
    CAPABId = CommandName{ name: "CAPAB" },
    SERVERId = CommandName{ name: "SERVER" },
    SIDId = CommandName{ name: "SID" },
    SVINFOId = CommandName{ name: "SVINFO" },
    PINGId = CommandName{ name: "PING" },
    PONGId = CommandName{ name: "PONG" },
    ERRORId = CommandName{ name: "ERROR" },
    SQUITId = CommandName{ name: "SQUIT" },
    ENCAPId = CommandName{ name: "ENCAP" },
    EUIDId = CommandName{ name: "EUID" },
    UIDId = CommandName{ name: "UID" },
    NICKId = CommandName{ name: "NICK" },
    QUITId = CommandName{ name: "QUIT" },
    KILLId = CommandName{ name: "KILL" },
    MODEId = CommandName{ name: "MODE" },
    CHGHOSTId = CommandName{ name: "CHGHOST" },
    SAVEId = CommandName{ name: "SAVE" },
    JOINId = CommandName{ name: "JOIN" },
    PARTId = CommandName{ name: "PART" },
    KICKId = CommandName{ name: "KICK" },
    SJOINId = CommandName{ name: "SJOIN" },
    TMODEId = CommandName{ name: "TMODE" },
    BMASKId = CommandName{ name: "BMASK" },
    PRIVMSGId = CommandName{ name: "PRIVMSG" },
    NOTICEId = CommandName{ name: "NOTICE" },
    ADMINId = CommandName{ name: "ADMIN" },
    INFOId = CommandName{ name: "INFO" },
    LUSERSId = CommandName{ name: "LUSERS" },
    VERSIONId = CommandName{ name: "VERSION" },
    TIMEId = CommandName{ name: "TIME" },
    MOTDId = CommandName{ name: "MOTD" },
    WHOISId = CommandName{ name: "WHOIS" },
    STATSId = CommandName{ name: "STATS" },
    LINKSId = CommandName{ name: "LINKS" },
    CONNECTId = CommandName{ name: "CONNECT" },
    AWAYId = CommandName{ name: "AWAY" },
    BANId = CommandName{ name: "BAN" },
    DLINEId = CommandName{ name: "DLINE" },
    GLINEId = CommandName{ name: "GLINE" },
    GUNGLINEId = CommandName{ name: "GUNGLINE" },
    INVITEId = CommandName{ name: "INVITE" },
    JUPEId = CommandName{ name: "JUPE" },
    KLINEId = CommandName{ name: "KLINE" },
    KNOCKId = CommandName{ name: "KNOCK" },
    LOCOPSId = CommandName{ name: "LOCOPS" },
    MLOCKId = CommandName{ name: "MLOCK" },
    OPERWALLId = CommandName{ name: "OPERWALL" },
    RESVId = CommandName{ name: "RESV" },
    SIGNONId = CommandName{ name: "SIGNON" },
    TBId = CommandName{ name: "TB" },
    TOPICId = CommandName{ name: "TOPIC" },
    TRACEId = CommandName{ name: "TRACE" },
    UNKLINEId = CommandName{ name: "UNKLINE" },
    UNRESVId = CommandName{ name: "UNRESV" },
    UNXLINEId = CommandName{ name: "UNXLINE" },
    USERSId = CommandName{ name: "USERS" },
    WALLOPSId = CommandName{ name: "WALLOPS" },
    XLINEId = CommandName{ name: "XLINE" },
}

impl CommandId {
    pub(crate) fn as_str(&self) -> &'static str {
        self.name
    }
}

/// Outcome of protocol command handler.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub(crate) enum ProtocolError {
    #[error("Command '{0}' needs more parameters")]
    NeedMoreParams(&'static str),
    #[error("Wrong parameter {1} in command '{0}'")]
    WrongParameter(&'static str, usize),
    #[error("Missing source in command '{0}'")]
    NoSource(&'static str),
    #[error("Unknown user '{0}'")]
    UnknownUser(String),
    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("Unknown server '{0}'")]
    UnknownServer(String),
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Missing capab {0}")]
    MissingCapab(String),
    #[error(transparent)]
    State(#[from] StateError),
}

impl ProtocolError {
    /// Returns true if error must close the link.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            ProtocolError::InvalidPassword | ProtocolError::MissingCapab(_) => true,
            ProtocolError::State(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// ERROR line sent to uplink before closing link.
    pub(crate) fn error_line(&self) -> String {
        match self {
            ProtocolError::InvalidPassword =>
                "ERROR :Closing Link (Invalid password)".to_string(),
            ProtocolError::MissingCapab(capab) =>
                format!("ERROR :Closing link (Missing capab {})", capab),
            e => format!("ERROR :Closing link ({})", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_message_from_shared_str() {
        assert_eq!(Ok(Message{ source: Some("AAA"), command: "PRIVMSG",
            params: vec!["BBB", "hello world"] }),
                Message::from_shared_str(":AAA PRIVMSG BBB :hello world"));
        assert_eq!(Ok(Message{ source: None, command: "SQUIT", params: vec![] }),
                Message::from_shared_str("SQUIT"));
        assert_eq!(Ok(Message{ source: Some("42X"), command: "SID",
            params: vec!["b.example.net", "2", "43Y"] }),
                Message::from_shared_str(":42X SID b.example.net 2 43Y\r\n"));
        assert_eq!(Ok(Message{ source: None, command: "PING",
            params: vec!["irc.example.net"] }),
                Message::from_shared_str("PING :irc.example.net"));
        assert_eq!(Ok(Message{ source: None, command: "PASS",
            params: vec!["secret", "TS", "6", "42X"] }),
                Message::from_shared_str("PASS secret TS 6 :42X"));
        // colon inside middle parameter does not start trailing parameter
        assert_eq!(Ok(Message{ source: Some("42XAAAAAB"), command: "PRIVMSG",
            params: vec!["42YAAAAAA", ":-). Hello guy!"] }),
                Message::from_shared_str(":42XAAAAAB PRIVMSG 42YAAAAAA ::-). Hello guy!"));
        assert_eq!(Ok(Message{ source: Some("42X"), command: "NOTICE",
            params: vec!["*", ""] }),
                Message::from_shared_str(":42X NOTICE * :"));
        assert_eq!(Ok(Message{ source: Some("42X"), command: "SJOIN",
            params: vec!["100", "#chan", "+nt", "@42XAAAAAB 42XAAAAAC"] }),
                Message::from_shared_str(":42X SJOIN 100 #chan +nt :@42XAAAAAB 42XAAAAAC"));
        assert_eq!(Err(MessageError::Empty), Message::from_shared_str("   \r\n"));
        assert_eq!(Err(MessageError::NoCommand), Message::from_shared_str(":42X"));
    }

    #[test]
    fn test_message_param() {
        let msg = Message::from_shared_str(":42X KICK #chan 42XAAAAAB :bye").unwrap();
        assert_eq!(Some("#chan"), msg.param(0));
        assert_eq!(Some("bye"), msg.param(2));
        assert_eq!(None, msg.param(3));
    }

    #[test]
    fn test_command_id() {
        assert_eq!("EUID", CommandId::EUIDId.as_str());
        assert_eq!("SJOIN", CommandId::SJOINId.as_str());
    }

    #[test]
    fn test_protocol_error() {
        assert!(ProtocolError::InvalidPassword.is_fatal());
        assert!(ProtocolError::MissingCapab("EUID".to_string()).is_fatal());
        assert!(ProtocolError::State(StateError::DuplicateUid("42XAAAAAB".to_string()))
                .is_fatal());
        assert!(!ProtocolError::UnknownUser("42XAAAAAB".to_string()).is_fatal());
        assert!(!ProtocolError::State(StateError::InvalidBanMask("bad".to_string()))
                .is_fatal());
        assert_eq!("ERROR :Closing Link (Invalid password)",
                ProtocolError::InvalidPassword.error_line());
        assert_eq!("ERROR :Closing link (Missing capab EUID)",
                ProtocolError::MissingCapab("EUID".to_string()).error_line());
        assert_eq!("Command 'EUID' needs more parameters",
                ProtocolError::NeedMoreParams("EUID").to_string());
    }
}
