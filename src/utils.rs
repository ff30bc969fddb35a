// utils.rs - utilities
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

use bytes::{Buf, BufMut, BytesMut};
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use validator::ValidationError;

// special LinesCodec for IRC - encode with "\r\n", decode bytes that are not UTF-8
// lossily, because uplink passes through whatever clients send.
pub(crate) struct IRCLinesCodec {
    max_length: usize,
    // index in buffer where search for newline starts
    next_index: usize,
    // skipping rest of too long line
    is_discarding: bool,
}

impl IRCLinesCodec {
    pub(crate) fn new_with_max_length(max_length: usize) -> IRCLinesCodec {
        IRCLinesCodec{ max_length, next_index: 0, is_discarding: false }
    }
}

fn lossy_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

impl<T: AsRef<str>> Encoder<T> for IRCLinesCodec {
    type Error = <LinesCodec as Encoder<T>>::Error;

    fn encode(&mut self, line: T, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let line = line.as_ref();
        buf.reserve(line.len() + 2);
        buf.put(line.as_bytes());
        // put "\r\n"
        buf.put_u8(b'\r');
        buf.put_u8(b'\n');
        Ok(())
    }
}

impl Decoder for IRCLinesCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let read_to = cmp::min(self.max_length.saturating_add(1), buf.len());
            let newline = buf[self.next_index..read_to].iter().position(|b| *b == b'\n');
            match (self.is_discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.is_discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() { return Ok(None); }
                }
                (false, Some(offset)) => {
                    let line = buf.split_to(self.next_index + offset + 1);
                    self.next_index = 0;
                    return Ok(Some(lossy_line(&line[..line.len()-1])));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.is_discarding = true;
                    return Err(LinesCodecError::MaxLineLengthExceeded);
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None if buf.is_empty() || &buf[..] == b"\r" => Ok(None),
            None => {
                let line = buf.split_to(buf.len());
                self.next_index = 0;
                Ok(Some(lossy_line(&line)))
            }
        }
    }
}

// RFC1459 casemapping: ASCII lowercase and "[]\" mapped to "{}|".
pub(crate) fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        _ => c.to_ascii_lowercase(),
    }
}

pub(crate) fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

pub(crate) fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() &&
        a.chars().zip(b.chars()).all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

lazy_static! {
    static ref NICK_REGEX: Regex =
        Regex::new(r"(?i)^[a-z{}_\[\]|\\^`][a-z0-9{}_\[\]|\\^`-]*$").unwrap();
    static ref SID_REGEX: Regex = Regex::new(r"^[0-9][0-9A-Z]{2}$").unwrap();
}

pub(crate) fn is_valid_nick(nick: &str) -> bool {
    NICK_REGEX.is_match(nick)
}

pub(crate) fn validate_sid(sid: &str) -> Result<(), ValidationError> {
    if SID_REGEX.is_match(sid) {
        Ok(())
    } else {
        Err(ValidationError::new("SID must be a digit followed by two digits or uppercase letters."))
    }
}

pub(crate) fn validate_nick(nick: &str) -> Result<(), ValidationError> {
    if is_valid_nick(nick) {
        Ok(())
    } else {
        Err(ValidationError::new("Nickname contains invalid characters."))
    }
}

pub(crate) fn validate_oper_mask(mask: &str) -> Result<(), ValidationError> {
    match mask.split_once('@') {
        Some((ident, host)) if !ident.is_empty() && !host.is_empty() => Ok(()),
        _ => Err(ValidationError::new("Oper mask must have form ident@host.")),
    }
}

pub(crate) fn validate_logchan(logchan: &str) -> Result<(), ValidationError> {
    if logchan == "*" || (logchan.len() > 1 && logchan.starts_with('#') &&
            !logchan.contains(' ') && !logchan.contains(',')) {
        Ok(())
    } else {
        Err(ValidationError::new("Log channel must be '*' or a channel name starting with '#'."))
    }
}

pub(crate) fn validate_protocol(protocol: &str) -> Result<(), ValidationError> {
    if protocol.eq_ignore_ascii_case("charybdis") {
        Ok(())
    } else {
        Err(ValidationError::new("Only the charybdis protocol is supported."))
    }
}
