// reply.rs - replies
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

// replies

use std::fmt;

// numeric replies sent to remote users that query this server.
pub(crate) enum Reply<'a> {
    RplEndOfStats219 {
        client: &'a str,
        stat: &'a str,
    },
    RplStatsOLine243 {
        client: &'a str,
        entry: &'a str,
    },
    RplLUserClient251 {
        client: &'a str,
        users_num: usize,
        inv_users_num: usize,
        servers_num: usize,
    },
    RplLUserOp252 {
        client: &'a str,
        ops_num: usize,
    },
    RplLUserMe255 {
        client: &'a str,
        clients_num: usize,
        servers_num: usize,
    },
    RplAdminMe256 {
        client: &'a str,
        server: &'a str,
    },
    RplAdminLoc1257 {
        client: &'a str,
        info: &'a str,
    },
    RplAdminLoc2258 {
        client: &'a str,
        info: &'a str,
    },
    RplLocalUsers265 {
        client: &'a str,
        clients_num: usize,
        max_clients_num: usize,
    },
    RplWhoIsUser311 {
        client: &'a str,
        nick: &'a str,
        username: &'a str,
        host: &'a str,
        realname: &'a str,
    },
    RplWhoIsServer312 {
        client: &'a str,
        nick: &'a str,
        server: &'a str,
        server_info: &'a str,
    },
    RplWhoIsService313 {
        client: &'a str,
        nick: &'a str,
    },
    RplEndOfWhoIs318 {
        client: &'a str,
        nick: &'a str,
    },
    RplVersion351 {
        client: &'a str,
        version: &'a str,
        server: &'a str,
        comments: &'a str,
    },
    RplInfo371 {
        client: &'a str,
        info: &'a str,
    },
    RplEndOfInfo374 {
        client: &'a str,
    },
    RplTime391 {
        client: &'a str,
        server: &'a str,
        human_readable: &'a str,
    },
    ErrNoSuchNick401 {
        client: &'a str,
        nick: &'a str,
    },
    ErrNoMotd422 {
        client: &'a str,
    },
    ErrNoPrivileges481 {
        client: &'a str,
    },
}

pub(crate) use Reply::*;

impl<'a> fmt::Display for Reply<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RplEndOfStats219 { client, stat } => {
                write!(f, "219 {} {} :End of /STATS report", client, stat)
            }
            RplStatsOLine243 { client, entry } => write!(f, "243 {} O {}", client, entry),
            RplLUserClient251 {
                client,
                users_num,
                inv_users_num,
                servers_num,
            } => {
                write!(
                    f,
                    "251 {} :There are {} users and {} invisible on {} servers",
                    client, users_num, inv_users_num, servers_num
                )
            }
            RplLUserOp252 { client, ops_num } => {
                write!(f, "252 {} {} :IRC Operators online", client, ops_num)
            }
            RplLUserMe255 {
                client,
                clients_num,
                servers_num,
            } => {
                write!(
                    f,
                    "255 {} :I have {} clients and {} servers",
                    client, clients_num, servers_num
                )
            }
            RplAdminMe256 { client, server } => {
                write!(f, "256 {} :Administrative info for {}:", client, server)
            }
            RplAdminLoc1257 { client, info } => write!(f, "257 {} :{}", client, info),
            RplAdminLoc2258 { client, info } => write!(f, "258 {} :{}", client, info),
            RplLocalUsers265 {
                client,
                clients_num,
                max_clients_num,
            } => {
                write!(
                    f,
                    "265 {} {} {} :Current local users {}, max {}",
                    client, clients_num, max_clients_num, clients_num, max_clients_num
                )
            }
            RplWhoIsUser311 {
                client,
                nick,
                username,
                host,
                realname,
            } => {
                write!(
                    f,
                    "311 {} {} {} {} * :{}",
                    client, nick, username, host, realname
                )
            }
            RplWhoIsServer312 {
                client,
                nick,
                server,
                server_info,
            } => {
                write!(f, "312 {} {} {} :{}", client, nick, server, server_info)
            }
            RplWhoIsService313 { client, nick } => {
                write!(f, "313 {} {} :is a Network Service", client, nick)
            }
            RplEndOfWhoIs318 { client, nick } => {
                write!(f, "318 {} {} :End of /WHOIS list", client, nick)
            }
            RplVersion351 {
                client,
                version,
                server,
                comments,
            } => {
                write!(f, "351 {} {} {} :{}", client, version, server, comments)
            }
            RplInfo371 { client, info } => write!(f, "371 {} :{}", client, info),
            RplEndOfInfo374 { client } => write!(f, "374 {} :End of /INFO list", client),
            RplTime391 {
                client,
                server,
                human_readable,
            } => {
                write!(f, "391 {} {} :{}", client, server, human_readable)
            }
            ErrNoSuchNick401 { client, nick } => {
                write!(f, "401 {} {} :No such nick/channel", client, nick)
            }
            ErrNoMotd422 { client } => write!(f, "422 {} :MOTD File is missing", client),
            ErrNoPrivileges481 { client } => {
                write!(
                    f,
                    "481 {} :Permission Denied - You're not an IRC operator",
                    client
                )
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_replies() {
        assert_eq!(
            "219 <client> o :End of /STATS report",
            format!("{}", RplEndOfStats219 { client: "<client>", stat: "o" })
        );
        assert_eq!(
            "243 <client> O *@* * bob ki",
            format!(
                "{}",
                RplStatsOLine243 {
                    client: "<client>",
                    entry: "*@* * bob ki"
                }
            )
        );
        assert_eq!(
            "251 <client> :There are 10 users and 0 invisible on 3 servers",
            format!(
                "{}",
                RplLUserClient251 {
                    client: "<client>",
                    users_num: 10,
                    inv_users_num: 0,
                    servers_num: 3
                }
            )
        );
        assert_eq!(
            "252 <client> 2 :IRC Operators online",
            format!("{}", RplLUserOp252 { client: "<client>", ops_num: 2 })
        );
        assert_eq!(
            "255 <client> :I have 1 clients and 1 servers",
            format!(
                "{}",
                RplLUserMe255 {
                    client: "<client>",
                    clients_num: 1,
                    servers_num: 1
                }
            )
        );
        assert_eq!(
            "256 <client> :Administrative info for <server>:",
            format!(
                "{}",
                RplAdminMe256 {
                    client: "<client>",
                    server: "<server>"
                }
            )
        );
        assert_eq!(
            "257 <client> :<info>",
            format!("{}", RplAdminLoc1257 { client: "<client>", info: "<info>" })
        );
        assert_eq!(
            "258 <client> :<info>",
            format!("{}", RplAdminLoc2258 { client: "<client>", info: "<info>" })
        );
        assert_eq!(
            "265 <client> 1 1 :Current local users 1, max 1",
            format!(
                "{}",
                RplLocalUsers265 {
                    client: "<client>",
                    clients_num: 1,
                    max_clients_num: 1
                }
            )
        );
        assert_eq!(
            "311 <client> <nick> <username> <host> * :<realname>",
            format!(
                "{}",
                RplWhoIsUser311 {
                    client: "<client>",
                    nick: "<nick>",
                    username: "<username>",
                    host: "<host>",
                    realname: "<realname>"
                }
            )
        );
        assert_eq!(
            "312 <client> <nick> <server> :<server_info>",
            format!(
                "{}",
                RplWhoIsServer312 {
                    client: "<client>",
                    nick: "<nick>",
                    server: "<server>",
                    server_info: "<server_info>"
                }
            )
        );
        assert_eq!(
            "313 <client> <nick> :is a Network Service",
            format!("{}", RplWhoIsService313 { client: "<client>", nick: "<nick>" })
        );
        assert_eq!(
            "318 <client> <nick> :End of /WHOIS list",
            format!("{}", RplEndOfWhoIs318 { client: "<client>", nick: "<nick>" })
        );
        assert_eq!(
            "351 <client> <version> <server> :<comments>",
            format!(
                "{}",
                RplVersion351 {
                    client: "<client>",
                    version: "<version>",
                    server: "<server>",
                    comments: "<comments>"
                }
            )
        );
        assert_eq!(
            "371 <client> :<info>",
            format!("{}", RplInfo371 { client: "<client>", info: "<info>" })
        );
        assert_eq!(
            "374 <client> :End of /INFO list",
            format!("{}", RplEndOfInfo374 { client: "<client>" })
        );
        assert_eq!(
            "391 <client> <server> :<human_readable>",
            format!(
                "{}",
                RplTime391 {
                    client: "<client>",
                    server: "<server>",
                    human_readable: "<human_readable>"
                }
            )
        );
        assert_eq!(
            "401 <client> <nick> :No such nick/channel",
            format!("{}", ErrNoSuchNick401 { client: "<client>", nick: "<nick>" })
        );
        assert_eq!(
            "422 <client> :MOTD File is missing",
            format!("{}", ErrNoMotd422 { client: "<client>" })
        );
        assert_eq!(
            "481 <client> :Permission Denied - You're not an IRC operator",
            format!("{}", ErrNoPrivileges481 { client: "<client>" })
        );
    }
}
