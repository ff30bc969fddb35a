// help.rs - help topics
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

pub(crate) struct HelpTopic {
    pub(crate) name: &'static str,
    pub(crate) syntax: &'static str,
    pub(crate) short: &'static str,
    pub(crate) long: &'static str,
}

// help topics for console commands with its content.
pub(crate) static HELP_TOPICS: [HelpTopic; 12] = [
    HelpTopic {
        name: "CHANLIST",
        syntax: "CHANLIST #channel",
        short: "List users in a channel",
        long: "Lists the users in a channel together with their idents, hosts and servers.",
    },
    HelpTopic {
        name: "CHECKBAN",
        syntax: "CHECKBAN nick [#channel ...]",
        short: "Checks a user against banlists",
        long: r##"Checks if the given user is banned. If no channels are given,
all channels will be checked. Exempts are taken into account."##,
    },
    HelpTopic {
        name: "CHGHOST",
        syntax: "CHGHOST nick newhost",
        short: "Changes a user's host",
        long: r##"Changes the displayed host of the user.

The host is not checked here. Supply a valid host, otherwise the
uplink rejects the change and our state gets out of sync."##,
    },
    HelpTopic {
        name: "DIE",
        syntax: "DIE",
        short: "Shuts down the service",
        long: "Quits the service client and splits this server from the network.",
    },
    HelpTopic {
        name: "GETINFO",
        syntax: "GETINFO nick",
        short: "Prints info about a user",
        long: r##"Shows info about the given user: UID, nick, ident, hosts, IP,
server, GECOS and a full channel list."##,
    },
    HelpTopic {
        name: "GLOBAL",
        syntax: "GLOBAL message",
        short: "Sends a notice to all online users",
        long: r##"All users receive the given message as a notice. Global notices
are anonymous and nobody will know who sent them."##,
    },
    HelpTopic {
        name: "KILL",
        syntax: "KILL nick reason",
        short: "Kills a user anonymously",
        long: r##"Kills the given user with the given reason as this server. Your nick
is not shown to the user. Users holding flag g cannot be killed."##,
    },
    HelpTopic {
        name: "MODE",
        syntax: "MODE #channel modestr [params ...]",
        short: "Forces a channel mode",
        long: r##"Changes the mode of the channel forcibly as this server.
Make sure the mode string is valid, it is sent to the network as is."##,
    },
    HelpTopic {
        name: "REHASH",
        syntax: "REHASH",
        short: "Rehashes the configuration",
        long: "Reloads access entries, levels and options from the configuration file.",
    },
    HelpTopic {
        name: "SET",
        syntax: "SET option value",
        short: "Changes options",
        long: r##"Changes an option. Changes are temporary and are overwritten on
the next REHASH if the configuration file is not updated as well.

Known options: logchan require_oper debug abuse resv levels"##,
    },
    HelpTopic {
        name: "SVSNICK",
        syntax: "SVSNICK nick newnick",
        short: "Changes a user's nick",
        long: "Changes a user's nick. Nicks used by someone else are refused.",
    },
    HelpTopic {
        name: "USERLIST",
        syntax: "USERLIST criterion argument ...",
        short: "List online users",
        long: r##"Lists the currently online users. At least one criterion is required.
If more criteria are given, all of them must match.

Known criteria are:
  NICK    find by nick
  IDENT   find by ident
  DHOST   find by displayed host
  RHOST   find by real host
  IP      find by IP
  HOST    matches displayed host, real host or IP
  GECOS   find by GECOS; takes the rest of arguments
  SERVER  find by server name
  CHANNEL matches if the user is in a matching channel

All criteria may contain wildcards. Matching is ASCII case-insensitive."##,
    },
];

pub(crate) fn find_help(name: &str) -> Option<&'static HelpTopic> {
    HELP_TOPICS.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}
