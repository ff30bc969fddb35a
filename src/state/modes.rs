// modes.rs - channel mode string interpreter
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

use tracing::*;

use super::structs::*;

// channel modes that consume a parameter: lists b e I q, key k, limit l, forward f,
// join throttle j and member status o v.
pub(crate) fn is_param_mode(c: char) -> bool {
    matches!(c, 'b' | 'e' | 'I' | 'q' | 'k' | 'l' | 'f' | 'j' | 'o' | 'v')
}

// number of parameters consumed by mode string.
pub(crate) fn mode_param_count(modestr: &str) -> usize {
    modestr.chars().filter(|c| is_param_mode(*c)).count()
}

/// Apply mode string to channel. First token is mode string, rest are
/// parameters in order of their mode letters. Missing parameters are skipped.
/// Returns true if channel still exists after changes.
pub(crate) fn apply_mode_string(state: &mut NetworkState, channel: &str, tokens: &[&str])
            -> Result<bool, StateError> {
    if state.find_channel(channel).is_none() {
        return Err(StateError::NoSuchChannel(channel.to_string()));
    }
    let modestr = match tokens.first() {
        Some(m) => *m,
        None => return Ok(true),
    };
    let mut params = tokens[1..].iter();
    let mut adding = true;
    for c in modestr.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            'P' => {
                if let Some(chan) = state.find_channel_mut(channel) {
                    chan.permanent = adding;
                }
                if !adding && state.purge_channel_if_unused(channel) {
                    // no more changes for removed channel
                    return Ok(false);
                }
            }
            c if is_param_mode(c) => {
                let param = match params.next() {
                    Some(p) => *p,
                    None => {
                        debug!("Missing parameter for mode {} in {}", c, channel);
                        continue;
                    }
                };
                if let Some(kind) = ListKind::from_letter(c) {
                    let result = if adding {
                        state.add_ban(channel, kind, param)
                    } else {
                        state.remove_ban(channel, kind, param)
                    };
                    if let Err(e) = result {
                        warn!("Mode {}{} in {}: {}", if adding { '+' } else { '-' }, c, channel, e);
                    }
                }
            }
            _ => (),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_state() -> NetworkState {
        let mut state = NetworkState::new("42X", "a.example.net", "The A Bot");
        state.create_channel("#chan", 100);
        state
    }

    #[test]
    fn test_mode_param_count() {
        assert_eq!(0, mode_param_count("+ntP"));
        assert_eq!(4, mode_param_count("+bkl-o"));
        assert_eq!(2, mode_param_count("+qIx"));
        assert_eq!(3, mode_param_count("+f-jv+m"));
    }

    #[test]
    fn test_apply_bans_and_offsets() {
        let mut state = new_state();
        assert_eq!(
            Ok(true),
            apply_mode_string(
                &mut state,
                "#chan",
                &["+kbvle", "key", "*!*@bad.host", "42XAAAAAB", "10", "*!*@good.host"]
            )
        );
        let chan = state.find_channel("#chan").unwrap();
        assert_eq!(vec![BanMask::parse("*!*@bad.host").unwrap()], chan.bans);
        assert_eq!(vec![BanMask::parse("*!*@good.host").unwrap()], chan.exempts);

        apply_mode_string(&mut state, "#chan", &["-b+b", "*!*@bad.host", "$a:bob"]).unwrap();
        let chan = state.find_channel("#chan").unwrap();
        assert_eq!(vec![BanMask::Extended("$a:bob".to_string())], chan.bans);
    }

    #[test]
    fn test_unknown_letters_and_invalid_masks() {
        let mut state = new_state();
        // 'x' and 'n' consume no parameter
        apply_mode_string(&mut state, "#chan", &["+xnb", "*!*@h"]).unwrap();
        assert_eq!(1, state.find_channel("#chan").unwrap().bans.len());
        // invalid mask is skipped but rest is applied
        apply_mode_string(&mut state, "#chan", &["+bb", "invalid", "a!b@c"]).unwrap();
        assert_eq!(2, state.find_channel("#chan").unwrap().bans.len());
        // missing parameters are ignored
        apply_mode_string(&mut state, "#chan", &["+bbb", "x!y@z"]).unwrap();
        assert_eq!(3, state.find_channel("#chan").unwrap().bans.len());
    }

    #[test]
    fn test_permanent() {
        let mut state = new_state();
        apply_mode_string(&mut state, "#chan", &["+P"]).unwrap();
        assert!(state.find_channel("#chan").unwrap().permanent);
        assert_eq!(Ok(false), apply_mode_string(&mut state, "#chan", &["-P+b", "a!b@c"]));
        assert!(state.find_channel("#chan").is_none());
        assert_eq!(
            Err(StateError::NoSuchChannel("#chan".to_string())),
            apply_mode_string(&mut state, "#chan", &["+b", "a!b@c"])
        );
    }

    #[test]
    fn test_permanent_with_members() {
        let mut state = new_state();
        state
            .create_user(&UserIntro {
                server: "42X",
                uid: "42XAAAAAB",
                nick: "bob",
                ident: "foo",
                dhost: "h",
                rhost: "h",
                ip: "0",
                ts: 1,
                umodes: "+",
                gecos: "Bob",
            })
            .unwrap();
        state.add_member("#chan", "42XAAAAAB").unwrap();
        apply_mode_string(&mut state, "#chan", &["+P"]).unwrap();
        assert_eq!(Ok(true), apply_mode_string(&mut state, "#chan", &["-P"]));
        assert!(!state.find_channel("#chan").unwrap().permanent);
    }
}
