//! Chat protocol adapter.
//!
//! Holds one TLS connection to the chat server. After sending credentials a
//! background reader classifies inbound lines:
//!
//! | line | effect |
//! |---|---|
//! | `001` (welcome) | `JOIN #channel`, login-success event |
//! | `PRIVMSG #channel` | message event |
//! | `NOTICE` with auth failure | login-error event |
//! | `PING` | `PONG` reply |
//! | anything else | logged or ignored |
//!
//! Lines that are not valid UTF-8 or longer than 16 KiB are dropped. A read
//! error or end of stream ends the session with an error event. Reconnecting is left to
//! the owner of the adapter.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, error, info, trace, warn};

use super::irc::IrcMessage;
use crate::config::ChatConfig;
use crate::context::Context;
use crate::events::{Event, EventBus, MessageEvent, Source};

const AUTH_FAILURE_MARKER: &str = "Login authentication failed";
const CAPABILITIES: &str = "CAP REQ :twitch.tv/tags twitch.tv/commands";
const ORIGIN: &str = "chat";
/// Longest inbound line accepted, terminator included.
const MAX_LINE_BYTES: usize = 16 * 1024;

type Writer = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Errors produced by the chat adapter.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("timed out waiting for login")]
    ConnectionTimeout,

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("line must not contain CR or LF")]
    InvalidLine,
}

/// Session state as seen by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    Connecting,
    Authenticating,
    Joined,
    Failed(String),
}

impl ChatState {
    fn is_settled(&self) -> bool {
        matches!(self, ChatState::Joined | ChatState::Failed(_))
    }
}

/// A logged-in chat session bound to one channel.
pub struct ChatClient {
    channel: String,
    writer: Writer,
    state: watch::Receiver<ChatState>,
    reader: JoinHandle<()>,
}

impl ChatClient {
    /// Connect to the configured endpoint over TLS and log in.
    ///
    /// Waits up to `config.login_timeout` for the welcome or an
    /// authentication failure.
    pub async fn connect(ctx: &Context, config: &ChatConfig) -> Result<Self, ChatError> {
        info!(host = %config.host, port = config.port, "Connecting to chat");

        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|_| ChatError::InvalidServerName(config.host.clone()))?;
        let tls = tls_connector()?.connect(server_name, tcp).await?;

        debug!("TLS established, starting chat handshake");
        Self::handshake(ctx, config, tls).await
    }

    /// Log in over an already established stream.
    pub async fn handshake<S>(ctx: &Context, config: &ChatConfig, stream: S) -> Result<Self, ChatError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write);
        let writer: Writer = Arc::new(Mutex::new(boxed));
        let (state_tx, mut state_rx) = watch::channel(ChatState::Connecting);

        write_line(&writer, CAPABILITIES).await?;
        write_line(&writer, &format!("PASS oauth:{}", config.token)).await?;
        write_line(&writer, &format!("NICK {}", config.username)).await?;
        state_tx.send_replace(ChatState::Authenticating);

        let session = Session {
            channel: config.channel.clone(),
            writer: Arc::clone(&writer),
            bus: ctx.bus.clone(),
            state: state_tx,
        };
        let reader = tokio::spawn(session.run(read));

        let settled = tokio::time::timeout(config.login_timeout, async {
            state_rx
                .wait_for(ChatState::is_settled)
                .await
                .map(|state| state.clone())
        })
        .await;

        let outcome = match settled {
            Ok(Ok(ChatState::Joined)) => Ok(()),
            Ok(Ok(ChatState::Failed(reason))) if reason.contains(AUTH_FAILURE_MARKER) => {
                Err(ChatError::LoginFailed(reason))
            }
            Ok(Ok(ChatState::Failed(reason))) => Err(ChatError::ConnectionClosed(reason)),
            Ok(Ok(_)) | Err(_) => Err(ChatError::ConnectionTimeout),
            Ok(Err(_)) => Err(ChatError::ConnectionClosed("reader stopped".to_owned())),
        };

        if let Err(e) = outcome {
            warn!(error = %e, "Chat login did not complete");
            reader.abort();
            let _ = writer.lock().await.shutdown().await;
            return Err(e);
        }

        info!(channel = %config.channel, "Chat session joined");
        Ok(Self {
            channel: config.channel.clone(),
            writer,
            state: state_rx,
            reader,
        })
    }

    /// Send a chat message to the joined channel.
    pub async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        ensure_single_line(text)?;
        write_line(&self.writer, &format!("PRIVMSG #{} :{}", self.channel, text)).await
    }

    /// Send one raw protocol line.
    pub async fn send_raw(&self, line: &str) -> Result<(), ChatError> {
        ensure_single_line(line)?;
        write_line(&self.writer, line).await
    }

    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stop the reader and close the stream.
    pub async fn stop(&self) {
        self.reader.abort();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(error = %e, "Chat stream shutdown failed");
        }
        info!(channel = %self.channel, "Chat session stopped");
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reader-side state of a session.
struct Session {
    channel: String,
    writer: Writer,
    bus: EventBus,
    state: watch::Sender<ChatState>,
}

impl Session {
    async fn run<R>(self, read: R)
    where
        R: AsyncRead + Send + Unpin,
    {
        let mut reader = BufReader::new(read);
        let mut buf = Vec::with_capacity(512);
        let mut oversized = false;
        loop {
            buf.clear();
            let read = (&mut reader)
                .take(MAX_LINE_BYTES as u64)
                .read_until(b'\n', &mut buf)
                .await;
            match read {
                Ok(0) => {
                    self.fail("connection closed by peer");
                    break;
                }
                Ok(_) if buf.last() != Some(&b'\n') => {
                    // Either the cap was hit or the peer closed mid-line.
                    if buf.len() >= MAX_LINE_BYTES && !oversized {
                        warn!(limit = MAX_LINE_BYTES, "Dropping oversized chat line");
                        oversized = true;
                    }
                }
                Ok(_) if oversized => oversized = false,
                Ok(_) => match std::str::from_utf8(&buf) {
                    Ok(line) => self.handle_line(line.trim_end_matches(['\r', '\n'])).await,
                    Err(e) => warn!(error = %e, "Dropping chat line that is not valid UTF-8"),
                },
                Err(e) => {
                    error!(error = %e, "Chat read failed");
                    self.fail(&e.to_string());
                    break;
                }
            }
        }
    }

    fn fail(&self, reason: &str) {
        self.state.send_replace(ChatState::Failed(reason.to_owned()));
        self.bus.publish(Event::error(&self.channel, ORIGIN, reason));
    }

    async fn handle_line(&self, line: &str) {
        let Some(msg) = IrcMessage::parse(line) else {
            trace!(line, "Ignoring unparsable chat line");
            return;
        };

        match msg.command.as_str() {
            "001" => {
                debug!(channel = %self.channel, "Welcome received, joining");
                if let Err(e) = write_line(&self.writer, &format!("JOIN #{}", self.channel)).await {
                    error!(error = %e, "Failed to send JOIN");
                    self.fail(&e.to_string());
                    return;
                }
                self.state.send_replace(ChatState::Joined);
                let text = msg.param(1).unwrap_or_default();
                self.bus.publish(Event::login(&self.channel, true, text));
            }
            "PRIVMSG" => self.handle_privmsg(&msg),
            "NOTICE" => {
                let text = msg.trailing().unwrap_or_default();
                if text.contains(AUTH_FAILURE_MARKER) {
                    warn!(notice = text, "Chat authentication failed");
                    self.state.send_replace(ChatState::Failed(text.to_owned()));
                    self.bus.publish(Event::login(&self.channel, false, text));
                } else {
                    debug!(notice = text, "Chat notice");
                }
            }
            "PING" => {
                let token = msg.trailing().unwrap_or("tmi.twitch.tv");
                if let Err(e) = write_line(&self.writer, &format!("PONG :{token}")).await {
                    warn!(error = %e, "Failed to answer PING");
                }
            }
            "251" => {
                if let Some(report) = msg.param(1) {
                    info!(report, "Chat user report");
                }
            }
            "RECONNECT" => warn!("Chat server requested a reconnect"),
            other => trace!(command = other, "Ignoring chat command"),
        }
    }

    fn handle_privmsg(&self, msg: &IrcMessage) {
        let target = msg.param(0).unwrap_or_default();
        if msg.params.len() < 2 || target.trim_start_matches('#') != self.channel {
            return;
        }

        let badges = msg.badges();
        let subscriber_months = badges
            .get("subscriber")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let event = MessageEvent {
            channel_id: self.channel.clone(),
            source: Source::Twitch,
            username: msg.nick().unwrap_or_default().to_owned(),
            text: msg.trailing().unwrap_or_default().to_owned(),
            avatar_url: None,
            moderator: msg.tag("mod") == Some("1"),
            subscriber: badges.contains_key("subscriber"),
            subscriber_months,
            badges,
            tags: msg.tags.clone(),
            timestamp: OffsetDateTime::now_utc(),
        };
        self.bus.publish(event.into());
    }
}

fn tls_connector() -> Result<TlsConnector, ChatError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

fn ensure_single_line(text: &str) -> Result<(), ChatError> {
    if text.contains(['\r', '\n']) {
        return Err(ChatError::InvalidLine);
    }
    Ok(())
}

async fn write_line(writer: &Writer, line: &str) -> Result<(), ChatError> {
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\r\n").await?;
    w.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::time::Duration;
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};

    type ServerLines = Lines<BufReader<ReadHalf<DuplexStream>>>;

    fn config() -> ChatConfig {
        ChatConfig::new("bot", "tok", "racerxdl")
    }

    fn server(io: DuplexStream) -> (ServerLines, WriteHalf<DuplexStream>) {
        let (read, write) = tokio::io::split(io);
        (BufReader::new(read).lines(), write)
    }

    async fn next(lines: &mut ServerLines) -> String {
        lines.next_line().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn welcome_joins_and_reports_login() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let ctx = Context::default();
        let (_, mut events) = ctx.bus.global().subscribe_channel();

        let peer = tokio::spawn(async move {
            let (mut lines, mut write) = server(server_io);
            let mut got = Vec::new();
            for _ in 0..3 {
                got.push(next(&mut lines).await);
            }
            write
                .write_all(b":tmi.twitch.tv 001 bot :Welcome, GLHF!\r\n")
                .await
                .unwrap();
            got.push(next(&mut lines).await);
            (got, lines, write)
        });

        let client = ChatClient::handshake(&ctx, &config(), client_io).await.unwrap();
        let (got, mut lines, mut write) = peer.await.unwrap();
        assert_eq!(
            got,
            vec![
                "CAP REQ :twitch.tv/tags twitch.tv/commands",
                "PASS oauth:tok",
                "NICK bot",
                "JOIN #racerxdl",
            ]
        );
        assert_eq!(client.state(), ChatState::Joined);

        let login = events.recv().await.unwrap();
        assert_eq!(login.kind(), EventKind::LoginSuccess);

        write
            .write_all(
                b"@badges=subscriber/6;mod=1;room-id=1337 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #racerxdl :hello panel\r\n",
            )
            .await
            .unwrap();
        let Event::Message(message) = events.recv().await.unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(message.username, "viewer");
        assert_eq!(message.text, "hello panel");
        assert_eq!(message.channel_id, "racerxdl");
        assert_eq!(message.tags.get("room-id").map(String::as_str), Some("1337"));
        assert!(message.moderator);
        assert!(message.subscriber);
        assert_eq!(message.subscriber_months, 6);

        write.write_all(b"PING :tmi.twitch.tv\r\n").await.unwrap();
        assert_eq!(next(&mut lines).await, "PONG :tmi.twitch.tv");

        client.send_message("hi").await.unwrap();
        assert_eq!(next(&mut lines).await, "PRIVMSG #racerxdl :hi");
        assert!(matches!(
            client.send_message("a\r\nQUIT").await,
            Err(ChatError::InvalidLine)
        ));

        client.stop().await;
    }

    #[tokio::test]
    async fn messages_for_other_channels_are_ignored() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let ctx = Context::default();
        let (_, mut events) = ctx.bus.global().subscribe_channel();

        let peer = tokio::spawn(async move {
            let (mut lines, mut write) = server(server_io);
            for _ in 0..3 {
                next(&mut lines).await;
            }
            write.write_all(b":tmi.twitch.tv 001 bot :Welcome\r\n").await.unwrap();
            next(&mut lines).await;
            write
                .write_all(b":a!a@a PRIVMSG #elsewhere :nope\r\n:b!b@b PRIVMSG #racerxdl :yes\r\n")
                .await
                .unwrap();
            (lines, write)
        });

        let _client = ChatClient::handshake(&ctx, &config(), client_io).await.unwrap();
        let _peer = peer.await.unwrap();

        assert_eq!(events.recv().await.unwrap().kind(), EventKind::LoginSuccess);
        let Event::Message(message) = events.recv().await.unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(message.text, "yes");
    }

    #[tokio::test]
    async fn invalid_utf8_lines_are_skipped() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let ctx = Context::default();
        let (_, mut events) = ctx.bus.global().subscribe_channel();

        let peer = tokio::spawn(async move {
            let (mut lines, mut write) = server(server_io);
            for _ in 0..3 {
                next(&mut lines).await;
            }
            write.write_all(b":tmi.twitch.tv NOTICE * :\xff\xfe\r\n").await.unwrap();
            write.write_all(b":tmi.twitch.tv 001 bot :Welcome\r\n").await.unwrap();
            next(&mut lines).await;
            write
                .write_all(b":a!a@a PRIVMSG #racerxdl :\xc3\x28\r\n:b!b@b PRIVMSG #racerxdl :after\r\n")
                .await
                .unwrap();
            (lines, write)
        });

        let client = ChatClient::handshake(&ctx, &config(), client_io).await.unwrap();

        assert_eq!(events.recv().await.unwrap().kind(), EventKind::LoginSuccess);
        let Event::Message(message) = events.recv().await.unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(message.text, "after");
        assert_eq!(client.state(), ChatState::Joined);
        let _peer = peer.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_line_is_dropped() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let ctx = Context::default();
        let (_, mut events) = ctx.bus.global().subscribe_channel();

        let peer = tokio::spawn(async move {
            let (mut lines, mut write) = server(server_io);
            for _ in 0..3 {
                next(&mut lines).await;
            }
            write.write_all(b":tmi.twitch.tv 001 bot :Welcome\r\n").await.unwrap();
            next(&mut lines).await;

            let mut flood = b":a!a@a PRIVMSG #racerxdl :".to_vec();
            flood.extend(std::iter::repeat_n(b'x', 3 * MAX_LINE_BYTES));
            flood.extend_from_slice(b"\r\n");
            write.write_all(&flood).await.unwrap();
            write
                .write_all(b":b!b@b PRIVMSG #racerxdl :after\r\n")
                .await
                .unwrap();
            (lines, write)
        });

        let client = ChatClient::handshake(&ctx, &config(), client_io).await.unwrap();

        assert_eq!(events.recv().await.unwrap().kind(), EventKind::LoginSuccess);
        let Event::Message(message) = events.recv().await.unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(message.text, "after");
        assert_eq!(client.state(), ChatState::Joined);
        let _peer = peer.await.unwrap();
    }

    #[tokio::test]
    async fn auth_failure_notice_fails_login() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let ctx = Context::default();
        let (_, mut events) = ctx.bus.global().subscribe_channel();

        let peer = tokio::spawn(async move {
            let (mut lines, mut write) = server(server_io);
            for _ in 0..3 {
                next(&mut lines).await;
            }
            write
                .write_all(b":tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
                .await
                .unwrap();
            (lines, write)
        });

        let result = ChatClient::handshake(&ctx, &config(), client_io).await;
        assert!(matches!(result, Err(ChatError::LoginFailed(_))));
        assert_eq!(events.recv().await.unwrap().kind(), EventKind::LoginError);
        drop(peer);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let ctx = Context::default();

        let started = tokio::time::Instant::now();
        let result = ChatClient::handshake(&ctx, &config(), client_io).await;
        assert!(matches!(result, Err(ChatError::ConnectionTimeout)));
        assert!(started.elapsed() >= Duration::from_secs(5));

        let (mut lines, _write) = server(server_io);
        for _ in 0..3 {
            next(&mut lines).await;
        }
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
