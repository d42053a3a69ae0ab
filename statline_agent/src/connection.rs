//! Collector connection: TCP setup, the banner/credential handshake, and the
//! write path used while streaming.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AgentError;
use crate::probe::IpFamily;

/// Bound on connect and on each handshake read/write.
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(30);
const READ_CHUNK: usize = 1024;

const AUTH_REQUIRED: &str = "Authentication required";
const AUTH_OK: &str = "Authentication successful";
const VIA_MARKER: &str = "You are connecting via";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingBanner,
    Authenticating,
    Ready,
    Streaming,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn set_state(state: &mut ConnectionState, next: ConnectionState) {
    if *state != next {
        debug!(from = %state, to = %next, "connection state");
        *state = next;
    }
}

async fn read_chunk<S>(stream: &mut S, what: &str) -> Result<String, AgentError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    let n = timeout(SETUP_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| AgentError::timed_out(what))??;
    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("collector closed the connection during {what}"),
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}

/// Run the handshake on an open stream. On success returns the family the
/// agent should probe, i.e. the one it is *not* connected over.
pub async fn handshake<S>(
    stream: &mut S,
    username: &str,
    password: &str,
    state: &mut ConnectionState,
) -> Result<IpFamily, AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    set_state(state, ConnectionState::AwaitingBanner);
    let banner = read_chunk(stream, "banner read").await?;
    if !banner.contains(AUTH_REQUIRED) {
        info!(banner = %banner.trim(), "collector did not ask for credentials");
        return Err(AgentError::ProtocolViolation(format!(
            "expected authentication challenge, got {:?}",
            banner.trim()
        )));
    }

    set_state(state, ConnectionState::Authenticating);
    let creds = format!("{username}:{password}\n");
    timeout(SETUP_TIMEOUT, stream.write_all(creds.as_bytes()))
        .await
        .map_err(|_| AgentError::timed_out("credential write"))??;
    let mut text = read_chunk(stream, "auth response read").await?;
    if !text.contains(AUTH_OK) {
        info!(response = %text.trim(), "authentication rejected");
        return Err(AgentError::AuthenticationFailure(text.trim().to_string()));
    }
    info!(response = %text.trim(), "authenticated");

    // the family line may arrive in a separate chunk
    if !text.contains(VIA_MARKER) {
        let more = read_chunk(stream, "family read").await?;
        info!(response = %more.trim(), "collector");
        text.push_str(&more);
    }

    let probe_family = if text.contains("IPv4") {
        IpFamily::V6
    } else if text.contains("IPv6") {
        IpFamily::V4
    } else {
        return Err(AgentError::ProtocolViolation(format!(
            "no address family in {:?}",
            text.trim()
        )));
    };
    set_state(state, ConnectionState::Ready);
    Ok(probe_family)
}

/// Owns the transport to the collector. Only the reporter writes to it, and
/// only once the manager is `Streaming`.
pub struct ConnectionManager {
    config: Config,
    stream: Option<TcpStream>,
    state: ConnectionState,
}

impl ConnectionManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stream: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect, authenticate, and enter `Streaming`. Returns the family to
    /// probe for reachability.
    pub async fn establish(&mut self) -> Result<IpFamily, AgentError> {
        self.stream = None;
        set_state(&mut self.state, ConnectionState::Connecting);
        let addr = (self.config.server.as_str(), self.config.port);
        let mut stream = timeout(SETUP_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| AgentError::timed_out("connect"))??;
        if let Ok(peer) = stream.peer_addr() {
            debug!(%peer, "tcp connected");
        }

        let family = handshake(
            &mut stream,
            &self.config.username,
            &self.config.password,
            &mut self.state,
        )
        .await?;
        self.stream = Some(stream);
        set_state(&mut self.state, ConnectionState::Streaming);
        Ok(family)
    }

    /// Write one complete update line. Blocks until the transport accepts it.
    pub async fn send_update(&mut self, line: &str) -> Result<(), AgentError> {
        let stream = match (self.state, self.stream.as_mut()) {
            (ConnectionState::Streaming, Some(s)) => s,
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    format!("cannot send update while {}", self.state),
                )
                .into())
            }
        };
        stream.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Drop the transport after an error; the next `establish` starts over.
    pub fn fail(&mut self) {
        self.stream = None;
        set_state(&mut self.state, ConnectionState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn family_line_in_separate_chunk() {
        let (mut client, server) = duplex(4096);
        let collector = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            server
                .get_mut()
                .write_all(b"Authentication required\n")
                .await
                .unwrap();
            let mut creds = String::new();
            server.read_line(&mut creds).await.unwrap();
            server
                .get_mut()
                .write_all(b"Authentication successful. Access granted.\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            server
                .get_mut()
                .write_all(b"You are connecting via: IPv6\n")
                .await
                .unwrap();
            creds
        });

        let mut state = ConnectionState::Connecting;
        let family = handshake(&mut client, "node", "pw", &mut state).await.unwrap();
        assert_eq!(family, IpFamily::V4);
        assert_eq!(state, ConnectionState::Ready);
        assert_eq!(collector.await.unwrap(), "node:pw\n");
    }

    #[tokio::test]
    async fn missing_family_is_protocol_violation() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            server.write_all(b"Authentication required\n").await.unwrap();
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await;
            server
                .write_all(b"Authentication successful\nYou are connecting via: carrier pigeon\n")
                .await
                .unwrap();
            // hold the stream open until the client is done
            let _ = server.read(&mut buf).await;
        });
        let mut state = ConnectionState::Connecting;
        let err = handshake(&mut client, "u", "p", &mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::ProtocolViolation(_)), "{err}");
        assert_ne!(state, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn eof_during_banner_is_transport() {
        let (mut client, server) = duplex(64);
        drop(server);
        let mut state = ConnectionState::Connecting;
        let err = handshake(&mut client, "u", "p", &mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn send_requires_streaming() {
        let mut mgr = ConnectionManager::new(Config::default());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        let err = mgr.send_update("update {}\n").await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
        mgr.fail();
        assert_eq!(mgr.state(), ConnectionState::Failed);
    }
}
