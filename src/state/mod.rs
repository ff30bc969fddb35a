// mod.rs - main state
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

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use futures::SinkExt;
use lazy_static::lazy_static;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_stream::StreamExt;
use tokio_util::codec::{Framed, LinesCodecError};
use tracing::*;

use crate::command::*;
use crate::config::*;
use crate::reply::*;
use crate::utils::*;

pub(crate) mod structs;
mod bans;
mod modes;
mod liveness;
mod server_cmds;
mod user_cmds;
mod channel_cmds;
mod console;

use structs::*;
use liveness::{LastPing, LivenessMonitor, PING_CHECK_PERIOD, PING_TIMEOUT};

const MAX_LINE_LENGTH: usize = 2000;

type Handler = fn(&mut MainState, &Message<'_>) -> Result<(), ProtocolError>;

lazy_static! {
    // protocol command name -> handler
    static ref HANDLERS: HashMap<&'static str, Handler> = {
        use CommandId::*;
        let mut m: HashMap<&'static str, Handler> = HashMap::new();
        m.insert(PASSId.as_str(), MainState::process_pass);
        m.insert(CAPABId.as_str(), MainState::process_capab);
        m.insert(SERVERId.as_str(), MainState::process_server);
        m.insert(SIDId.as_str(), MainState::process_sid);
        m.insert(SVINFOId.as_str(), MainState::process_svinfo);
        m.insert(PINGId.as_str(), MainState::process_ping);
        m.insert(ERRORId.as_str(), MainState::process_error);
        m.insert(SQUITId.as_str(), MainState::process_squit);
        m.insert(ENCAPId.as_str(), MainState::process_encap);
        m.insert(EUIDId.as_str(), MainState::process_euid);
        m.insert(UIDId.as_str(), MainState::process_uid);
        m.insert(NICKId.as_str(), MainState::process_nick);
        m.insert(QUITId.as_str(), MainState::process_quit);
        m.insert(KILLId.as_str(), MainState::process_kill);
        m.insert(MODEId.as_str(), MainState::process_mode);
        m.insert(CHGHOSTId.as_str(), MainState::process_chghost);
        m.insert(SAVEId.as_str(), MainState::process_save);
        m.insert(JOINId.as_str(), MainState::process_join);
        m.insert(PARTId.as_str(), MainState::process_part);
        m.insert(KICKId.as_str(), MainState::process_kick);
        m.insert(SJOINId.as_str(), MainState::process_sjoin);
        m.insert(TMODEId.as_str(), MainState::process_tmode);
        m.insert(BMASKId.as_str(), MainState::process_bmask);
        m.insert(PRIVMSGId.as_str(), MainState::process_privmsg);
        m.insert(NOTICEId.as_str(), MainState::process_privmsg);
        m.insert(ADMINId.as_str(), MainState::process_admin);
        m.insert(INFOId.as_str(), MainState::process_info);
        m.insert(LUSERSId.as_str(), MainState::process_lusers);
        m.insert(VERSIONId.as_str(), MainState::process_version);
        m.insert(TIMEId.as_str(), MainState::process_time);
        m.insert(MOTDId.as_str(), MainState::process_motd);
        m.insert(WHOISId.as_str(), MainState::process_whois);
        m.insert(STATSId.as_str(), MainState::process_stats);
        m.insert(LINKSId.as_str(), MainState::process_links);
        m.insert(CONNECTId.as_str(), MainState::process_connect);
        // recognized but not interesting for us
        for cmd in [PONGId, AWAYId, BANId, DLINEId, GLINEId, GUNGLINEId, INVITEId, JUPEId,
                KLINEId, KNOCKId, LOCOPSId, MLOCKId, OPERWALLId, RESVId, SIGNONId, TBId,
                TOPICId, TRACEId, UNKLINEId, UNRESVId, UNXLINEId, USERSId, WALLOPSId,
                XLINEId] {
            m.insert(cmd.as_str(), MainState::process_ignored);
        }
        m
    };
}

fn required_param<'a>(msg: &Message<'a>, i: usize, cmd: &'static str)
            -> Result<&'a str, ProtocolError> {
    msg.param(i).ok_or(ProtocolError::NeedMoreParams(cmd))
}

fn ts_param(msg: &Message<'_>, i: usize, cmd: &'static str) -> Result<u64, ProtocolError> {
    required_param(msg, i, cmd)?.parse().map_err(|_| ProtocolError::WrongParameter(cmd, i))
}

fn required_source<'a>(msg: &Message<'a>, cmd: &'static str) -> Result<&'a str, ProtocolError> {
    msg.source.ok_or(ProtocolError::NoSource(cmd))
}

/// Protocol engine for single uplink link. Owned exclusively by receive loop.
pub(crate) struct MainState {
    config: MainConfig,
    net: NetworkState,
    uplink_sid: Option<String>,
    burst_done: bool,
    joined_logchan: bool,
    last_ping: Arc<LastPing>,
    // lines to send after processing current line
    outbox: Vec<String>,
    quit: bool,
}

impl MainState {
    pub(crate) fn new(config: MainConfig) -> MainState {
        let net = NetworkState::new(&config.server.sid, &config.server.name,
                &config.server.description);
        MainState{ config, net, uplink_sid: None, burst_done: false, joined_logchan: false,
            last_ping: Arc::new(LastPing::new()), outbox: vec![], quit: false }
    }

    pub(crate) fn is_quit(&self) -> bool {
        self.quit
    }

    fn sid(&self) -> &str {
        &self.config.server.sid
    }

    fn bot_uid(&self) -> String {
        format!("{}AAAAAA", self.config.server.sid)
    }

    fn send<T: fmt::Display>(&mut self, line: T) {
        self.outbox.push(line.to_string());
    }

    // send line with our server as source.
    fn send_server<T: fmt::Display>(&mut self, t: T) {
        let line = format!(":{} {}", self.sid(), t);
        self.outbox.push(line);
    }

    // send line with our bot as source.
    fn send_bot<T: fmt::Display>(&mut self, t: T) {
        let line = format!(":{} {}", self.bot_uid(), t);
        self.outbox.push(line);
    }

    fn send_notice(&mut self, uid: &str, text: &str) {
        self.send_bot(format!("NOTICE {} :{}", uid, text));
    }

    fn send_numeric(&mut self, reply: Reply<'_>) {
        self.send_server(reply);
    }

    fn send_to_logchan(&mut self, text: &str) {
        if let Some(logchan) = self.config.options.logchan().map(|s| s.to_string()) {
            self.send_bot(format!("PRIVMSG {} :{}", logchan, text));
        }
    }

    // lines sent right after connecting to uplink.
    pub(crate) fn introduction_lines(&self) -> Vec<String> {
        vec![format!("PASS {} TS 6 :{}", self.config.uplink.password, self.sid()),
            "CAPAB :IE EX EUID ENCAP SERVICES RSFNC SAVE QS".to_string(),
            format!("SERVER {} 1 :{}", self.config.server.name,
                    self.config.server.description)]
    }

    fn bot_introduction(&mut self) {
        let bot = &self.config.bot;
        let line = format!("EUID {} 1 {} +ioS {} {} 0 {} {} * :{}", bot.nick, unix_now(),
                bot.ident, bot.host, self.bot_uid(), bot.host, bot.realname());
        self.send_server(line);
        if self.config.options.resv {
            self.send_resv();
        }
    }

    fn send_resv(&mut self) {
        let nick = self.config.bot.nick.clone();
        self.send_bot(format!("ENCAP * RESV 0 {} 0 :Reserved for {}", nick, nick));
    }

    fn send_unresv(&mut self) {
        let nick = self.config.bot.nick.clone();
        self.send_bot(format!("ENCAP * UNRESV {}", nick));
    }

    // join bot to channel with ops.
    fn join_channel(&mut self, channel: &str) {
        let (ts, name) = match self.net.find_channel(channel) {
            Some(chan) => (chan.ts, chan.name.clone()),
            None => (unix_now(), channel.to_string()),
        };
        let bot_uid = self.bot_uid();
        self.send_server(format!("SJOIN {} {} + :@{}", ts, name, bot_uid));
    }

    fn part_channel(&mut self, channel: &str) {
        self.send_bot(format!("PART {}", channel));
    }

    /// Process single line from uplink. Returns lines to send to uplink.
    pub(crate) fn process_line(&mut self, line: &str) -> Vec<String> {
        debug!(">> {}", line);
        match Message::from_shared_str(line) {
            Ok(msg) => self.dispatch(&msg),
            Err(e) => warn!("Malformed line '{}': {}", line, e),
        }
        std::mem::take(&mut self.outbox)
    }

    fn dispatch(&mut self, msg: &Message<'_>) {
        let cmd_name = msg.command.to_ascii_uppercase();
        let handler = match HANDLERS.get(cmd_name.as_str()) {
            Some(handler) => *handler,
            None => {
                warn!("Unhandled command {} from uplink", cmd_name);
                self.send_to_logchan(&format!("Command {} is not handled by me.", cmd_name));
                return;
            }
        };
        // last barrier against unexpected faults in handlers
        match catch_unwind(AssertUnwindSafe(|| handler(self, msg))) {
            Ok(Ok(())) => (),
            Ok(Err(e)) => {
                if e.is_fatal() {
                    error!("Fatal error in {}: {}", cmd_name, e);
                    self.send(e.error_line());
                    self.quit = true;
                } else {
                    warn!("Error in {}: {}", cmd_name, e);
                }
            }
            Err(_) => error!("Unexpected failure while processing {}", cmd_name),
        }
    }

    // shutdown sequence after uplink silence.
    fn ping_timeout(&mut self, elapsed: Duration) -> Vec<String> {
        let secs = elapsed.as_secs();
        error!("Uplink ping timeout ({} seconds)", secs);
        self.send_bot("QUIT :Quit: Ping timeout");
        let uplink = self.uplink_sid.clone().unwrap_or_else(|| "*".to_string());
        self.send_server(format!("SQUIT {} :Ping timeout", uplink));
        self.send(format!("ERROR :Ping timeout ({} seconds)", secs));
        self.quit = true;
        std::mem::take(&mut self.outbox)
    }

    /// Run link over stream until quit, end of stream or timeout.
    pub(crate) async fn run_link<S>(&mut self, stream: S) -> Result<(), Box<dyn Error>>
            where S: AsyncRead + AsyncWrite + Unpin {
        let mut line_stream = Framed::new(stream,
                IRCLinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        feed_lines(&mut line_stream, self.introduction_lines()).await?;
        SinkExt::<String>::flush(&mut line_stream).await?;

        let (timeout_sender, mut timeout_receiver) = unbounded_channel();
        let monitor = LivenessMonitor::start(self.last_ping.clone(), timeout_sender,
                PING_CHECK_PERIOD, PING_TIMEOUT);
        let result = self.run_link_loop(&mut line_stream, &mut timeout_receiver).await;
        // monitor must be stopped before closing stream
        monitor.stop().await;
        let close_result = SinkExt::<String>::close(&mut line_stream).await;
        result.map_err(|e| e as Box<dyn Error>)?;
        close_result?;
        info!("Link closed");
        Ok(())
    }

    async fn run_link_loop<S>(&mut self, line_stream: &mut Framed<S, IRCLinesCodec>,
            timeout_receiver: &mut UnboundedReceiver<Duration>) -> Result<(), Box<dyn Error + Send + Sync>>
            where S: AsyncRead + AsyncWrite + Unpin {
        while !self.quit {
            tokio::select! {
                Some(elapsed) = timeout_receiver.recv() => {
                    let lines = self.ping_timeout(elapsed);
                    feed_lines(line_stream, lines).await?;
                }
                line_res = line_stream.next() => {
                    match line_res {
                        Some(Ok(line)) => {
                            let lines = self.process_line(&line);
                            feed_lines(line_stream, lines).await?;
                        }
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            warn!("Too long line from uplink");
                        }
                        Some(Err(e)) => return Err(Box::new(e)),
                        // if end of stream
                        None => {
                            info!("Uplink closed connection");
                            self.quit = true;
                        }
                    }
                }
            }
            SinkExt::<String>::flush(line_stream).await?;
        }
        Ok(())
    }
}

async fn feed_lines<S>(line_stream: &mut Framed<S, IRCLinesCodec>, lines: Vec<String>)
            -> Result<(), LinesCodecError>
            where S: AsyncRead + AsyncWrite + Unpin {
    for line in lines {
        debug!("<< {}", line);
        line_stream.feed(line).await?;
    }
    Ok(())
}

async fn connect_uplink(config: &MainConfig) -> Result<TcpStream, Box<dyn Error>> {
    let uplink = &config.uplink;
    let addr = lookup_host((uplink.host.as_str(), uplink.port)).await?.next()
        .ok_or_else(|| format!("Cannot resolve uplink host {}", uplink.host))?;
    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    if let Some(ref vhost) = config.server.vhost {
        let local: IpAddr = vhost.parse()?;
        socket.bind(SocketAddr::new(local, 0))?;
    }
    info!("Connecting to uplink {}", addr);
    Ok(socket.connect(addr).await?)
}

#[cfg(feature = "tls_rustls")]
async fn connect_tls(config: &MainConfig, stream: TcpStream)
        -> Result<tokio_rustls::client::TlsStream<TcpStream>, Box<dyn Error>> {
    use std::fs::File;
    use std::io::BufReader;
    use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerName};
    use tokio_rustls::TlsConnector;

    let mut roots = RootCertStore::empty();
    if let Some(ref ca_file) = config.uplink.tls_ca_file {
        let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(ca_file)?))?;
        let (added, ignored) = roots.add_parsable_certificates(&certs);
        debug!("Loaded {} CA certificates ({} ignored)", added, ignored);
    }
    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(config.uplink.host.as_str())?;
    Ok(connector.connect(server_name, stream).await?)
}

/// Connect to uplink and run link until it is closed.
pub(crate) async fn run(config: MainConfig) -> Result<(), Box<dyn Error>> {
    let stream = connect_uplink(&config).await?;
    let mut main_state = MainState::new(config);
    if main_state.config.uplink.tls {
        #[cfg(feature = "tls_rustls")]
        {
            let tls_stream = connect_tls(&main_state.config, stream).await?;
            return main_state.run_link(tls_stream).await;
        }
        #[cfg(not(feature = "tls_rustls"))]
        {
            drop(stream);
            return Err("TLS link requested but TLS support is not compiled in".into());
        }
    }
    main_state.run_link(stream).await
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    pub(crate) const UPLINK_BURST: [&str; 4] = [
        "PASS linkpass TS 6 :43Y",
        "CAPAB :BAN CHW CLUSTER ENCAP EOPMOD EUID EX IE KLN KNOCK MLOCK QS RSFNC SAVE SERVICES TB",
        "SERVER irc.example.net 1 :Example IRC server",
        "SVINFO 6 6 0 :1650000000",
    ];

    pub(crate) fn linked_state_with_config(config: MainConfig) -> MainState {
        let mut state = MainState::new(config);
        for line in UPLINK_BURST {
            state.process_line(line);
        }
        state
    }

    pub(crate) fn linked_state() -> MainState {
        linked_state_with_config(MainConfig::default())
    }

    pub(crate) fn euid_line(uid: &str, nick: &str, umodes: &str) -> String {
        format!(":43Y EUID {} 1 1000 {} foo cloak.example.net 192.0.2.1 {} shell.example.net * \
                :Some User", nick, umodes, uid)
    }

    // introduce user with given uid, nick and umodes
    pub(crate) fn add_user(state: &mut MainState, uid: &str, nick: &str, umodes: &str) {
        state.process_line(&euid_line(uid, nick, umodes));
    }

    #[test]
    fn test_introduction_lines() {
        let state = MainState::new(MainConfig::default());
        assert_eq!(vec!["PASS linkpass TS 6 :42X".to_string(),
                "CAPAB :IE EX EUID ENCAP SERVICES RSFNC SAVE QS".to_string(),
                "SERVER a.example.net 1 :The A Bot".to_string()],
                state.introduction_lines());
    }

    #[test]
    fn test_dispatch_case_insensitive() {
        let mut state = linked_state();
        assert_eq!(vec!["PONG :irc.example.net".to_string()],
                state.process_line("ping :irc.example.net"));
        assert!(state.process_line(":43Y eUiD bob 1 1000 +i foo h 192.0.2.1 43YAAAAAB h * :B")
                .is_empty());
        assert!(state.net.find_user("bob").is_some());
    }

    #[test]
    fn test_dispatch_unknown_command() {
        let mut state = linked_state();
        assert!(state.process_line(":43Y ENCRYPT foo bar").is_empty());
        assert!(!state.is_quit());
        state.config.options.logchan = "#services".to_string();
        assert_eq!(vec![":42XAAAAAA PRIVMSG #services :Command ENCRYPT is not handled by me."
                    .to_string()], state.process_line(":43Y ENCRYPT foo bar"));
        // ignored commands are silent
        assert!(state.process_line(":43YAAAAAB AWAY :gone").is_empty());
        assert!(state.process_line(":43YAAAAAB TOPIC #chan :new topic").is_empty());
        assert!(state.process_line("").is_empty());
    }

    #[test]
    fn test_dispatch_recoverable_errors() {
        let mut state = linked_state();
        // unknown user, channel and missing parameters do not close link
        assert!(state.process_line(":43YAAAAAZ QUIT :bye").is_empty());
        assert!(state.process_line(":43Y TMODE 100 #nowhere +b a!b@c").is_empty());
        assert!(state.process_line(":43Y EUID bob 1").is_empty());
        assert!(state.process_line(":43Y KICK #nowhere 43YAAAAAB :bye").is_empty());
        assert!(!state.is_quit());
    }

    #[test]
    fn test_dispatch_fatal_errors() {
        let mut state = MainState::new(MainConfig::default());
        assert_eq!(vec!["ERROR :Closing Link (Invalid password)".to_string()],
                state.process_line("PASS badpass TS 6 :43Y"));
        assert!(state.is_quit());

        let mut state = MainState::new(MainConfig::default());
        assert!(state.process_line("PASS linkpass TS 6 :43Y").is_empty());
        assert_eq!(vec!["ERROR :Closing link (Missing capab RSFNC)".to_string()],
                state.process_line("CAPAB :EX IE EUID SERVICES ENCAP QS"));
        assert!(state.is_quit());

        let mut state = linked_state();
        add_user(&mut state, "43YAAAAAB", "bob", "+i");
        assert_eq!(vec!["ERROR :Closing link (Duplicate UID 43YAAAAAB)".to_string()],
                state.process_line(&euid_line("43YAAAAAB", "bob2", "+i")));
        assert!(state.is_quit());
    }

    #[test]
    fn test_ping_timeout_lines() {
        let mut state = linked_state();
        assert_eq!(vec![":42XAAAAAA QUIT :Quit: Ping timeout".to_string(),
                ":42X SQUIT 43Y :Ping timeout".to_string(),
                "ERROR :Ping timeout (240 seconds)".to_string()],
                state.ping_timeout(Duration::from_secs(240)));
        assert!(state.is_quit());
    }

    #[tokio::test]
    async fn test_run_link() {
        let (client, server) = duplex(16384);
        let handle = tokio::spawn(async move {
            let mut state = MainState::new(MainConfig::default());
            state.run_link(client).await.map_err(|e| e.to_string())?;
            Ok::<usize, String>(state.net.users.len())
        });
        let (reader, mut writer) = tokio::io::split(server);
        let mut lines = BufReader::new(reader).lines();
        assert_eq!(Some("PASS linkpass TS 6 :42X".to_string()),
                lines.next_line().await.unwrap());
        assert_eq!(Some("CAPAB :IE EX EUID ENCAP SERVICES RSFNC SAVE QS".to_string()),
                lines.next_line().await.unwrap());
        assert_eq!(Some("SERVER a.example.net 1 :The A Bot".to_string()),
                lines.next_line().await.unwrap());

        for line in UPLINK_BURST {
            writer.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
        }
        let bot_line = lines.next_line().await.unwrap().unwrap();
        assert!(bot_line.starts_with(":42X EUID A 1 "));
        assert!(bot_line.ends_with(" +ioS a a.example.net 0 42XAAAAAA a.example.net * \
                :The A Bot"));

        writer.write_all(format!("{}\r\n", euid_line("43YAAAAAB", "bob", "+i")).as_bytes())
                .await.unwrap();
        writer.write_all(b"PING :irc.example.net\r\n").await.unwrap();
        assert_eq!(Some("PONG :irc.example.net".to_string()),
                lines.next_line().await.unwrap());
        writer.write_all(b":43Y SQUIT 42X :bye\r\n").await.unwrap();
        assert_eq!(Some("ERROR :SQUIT received, shutting down".to_string()),
                lines.next_line().await.unwrap());
        assert_eq!(Ok(1), handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_run_link_line_not_utf8() {
        let (client, server) = duplex(16384);
        let handle = tokio::spawn(async move {
            let mut state = MainState::new(MainConfig::default());
            state.run_link(client).await.map_err(|e| e.to_string())?;
            Ok::<Option<String>, String>(state.net.find_user("jose").map(|u| u.gecos.clone()))
        });
        let (reader, mut writer) = tokio::io::split(server);
        let mut lines = BufReader::new(reader).lines();
        for _ in 0..3 {
            assert!(lines.next_line().await.unwrap().is_some());
        }
        for line in UPLINK_BURST {
            writer.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
        }
        assert!(lines.next_line().await.unwrap().unwrap().starts_with(":42X EUID A 1 "));

        writer.write_all(b":43Y EUID jose 1 1000 +i jose h.example 0 43YAAAAAJ h.example * \
                :Jos\xe9\r\n").await.unwrap();
        writer.write_all(b"PING :irc.example.net\r\n").await.unwrap();
        assert_eq!(Some("PONG :irc.example.net".to_string()),
                lines.next_line().await.unwrap());
        writer.write_all(b":43Y SQUIT 42X :bye\r\n").await.unwrap();
        assert_eq!(Some("ERROR :SQUIT received, shutting down".to_string()),
                lines.next_line().await.unwrap());
        assert_eq!(Ok(Some("Jos\u{fffd}".to_string())), handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_run_link_end_of_stream() {
        let (client, server) = duplex(16384);
        let handle = tokio::spawn(async move {
            let mut state = MainState::new(MainConfig::default());
            state.run_link(client).await.map_err(|e| e.to_string())
        });
        let mut lines = BufReader::new(server).lines();
        for _ in 0..3 {
            assert!(lines.next_line().await.unwrap().is_some());
        }
        drop(lines);
        assert_eq!(Ok(()), handle.await.unwrap());
    }
}
