use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use thiserror::Error;
use tokio::{net::UdpSocket, time::timeout};
use tracing::debug;

use crate::wire::{OobCommand, decode_oob};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const MAX_REPLY: usize = 64 * 1024;
const MAX_DRAIN: usize = 64;

// -----------------------------------------------------------------------------
// ----- QueryChannel ----------------------------------------------------------

/// The poller's one socket to its game server.
///
/// `query` takes `&mut self`, so a second query cannot start while one is
/// waiting. Late replies to a query that already timed out are drained before
/// the next one goes out.
#[derive(Debug)]
pub struct QueryChannel {
    socket: UdpSocket,
    server: SocketAddr,
    buf: Vec<u8>,
}

// -----------------------------------------------------------------------------
// ----- QueryChannel: Static --------------------------------------------------

impl QueryChannel {
    /// Bind a fresh socket and connect it to `(host, port)`. Connecting filters
    /// out datagrams from anyone but the server.
    pub async fn open(host: &str, port: u16) -> Result<Self, QueryError> {
        let server = tokio::net::lookup_host((host, port))
            .await
            .map_err(QueryError::Resolve)?
            .next()
            .ok_or_else(|| {
                QueryError::Resolve(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{host}:{port} resolved to nothing"),
                ))
            })?;

        let local = if server.is_ipv6() {
            SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(local).await.map_err(QueryError::Send)?;
        socket.connect(server).await.map_err(QueryError::Send)?;

        Ok(Self {
            socket,
            server,
            buf: vec![0u8; MAX_REPLY],
        })
    }
}

// -----------------------------------------------------------------------------
// ----- QueryChannel: Public --------------------------------------------------

impl QueryChannel {
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Send one command and wait up to `wait` for the next datagram.
    pub async fn query(&mut self, command: &OobCommand, wait: Duration) -> Result<String, QueryError> {
        let stale = self.drain_stale();
        if stale > 0 {
            debug!("{}: discarded {stale} stale datagram(s)", self.server);
        }

        self.socket
            .send(&command.to_bytes())
            .await
            .map_err(QueryError::Send)?;

        match timeout(wait, self.socket.recv(&mut self.buf)).await {
            Ok(Ok(n)) => Ok(decode_oob(&self.buf[..n])),
            Ok(Err(e)) => Err(QueryError::Recv(e)),
            Err(_) => Err(QueryError::Timeout(wait)),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- QueryChannel: Private -------------------------------------------------

impl QueryChannel {
    fn drain_stale(&mut self) -> usize {
        let mut drained = 0;

        for _ in 0..MAX_DRAIN {
            match self.socket.try_recv(&mut self.buf) {
                Ok(_) => drained += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // Connected UDP sockets report earlier ICMP errors here, once.
                Err(_) => continue,
            }
        }

        drained
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("could not resolve game server: {0}")]
    Resolve(io::Error),

    #[error("send failed: {0}")]
    Send(io::Error),

    #[error("receive failed: {0}")]
    Recv(io::Error),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("reply carried challenge '{got}', expected '{expected}'")]
    StaleReply { expected: String, got: String },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    async fn fake_server() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    #[tokio::test]
    async fn resolves_with_decoded_reply() {
        let (server, port) = fake_server().await;
        let mut channel = QueryChannel::open("127.0.0.1", port).await.unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"\xFF\xFF\xFF\xFFgetstatus abc");
            server
                .send_to(b"\xFF\xFF\xFF\xFFstatusResponse\n\\r\\1\n", from)
                .await
                .unwrap();
        });

        let reply = channel
            .query(&OobCommand::get_status("abc"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, "statusResponse\n\\r\\1\n");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn times_out_without_reply() {
        let (_server, port) = fake_server().await;
        let mut channel = QueryChannel::open("127.0.0.1", port).await.unwrap();

        let err = channel
            .query(&OobCommand::get_status("x"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
    }

    #[tokio::test]
    async fn late_reply_is_not_delivered_to_next_query() {
        let (server, port) = fake_server().await;
        let mut channel = QueryChannel::open("127.0.0.1", port).await.unwrap();

        // First query times out; the server answers it afterwards.
        let err = channel
            .query(&OobCommand::get_status("one"), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));

        let mut buf = [0u8; 256];
        let (_, from) = server.recv_from(&mut buf).await.unwrap();
        server.send_to(b"\xFF\xFF\xFF\xFFlate", from).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"\xFF\xFF\xFF\xFFrcon pw status");
            server.send_to(b"\xFF\xFF\xFF\xFFprint\nfresh\n", from).await.unwrap();
        });

        let rcon = OobCommand::rcon(SecretString::new("pw".into()), "status");
        let reply = channel.query(&rcon, Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, "print\nfresh\n");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn ignores_datagrams_from_other_senders() {
        let (server, port) = fake_server().await;
        let mut channel = QueryChannel::open("127.0.0.1", port).await.unwrap();
        let local = SocketAddr::from(([127, 0, 0, 1], channel.socket.local_addr().unwrap().port()));

        let intruder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        intruder.send_to(b"\xFF\xFF\xFF\xFFspoof", local).await.unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (_, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(b"\xFF\xFF\xFF\xFFreal", from).await.unwrap();
        });

        let reply = channel
            .query(&OobCommand::get_status("z"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, "real");
        responder.await.unwrap();
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
