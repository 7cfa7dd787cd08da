use std::{io, net::SocketAddr};

use thiserror::Error;
use tokio::net::{UdpSocket, lookup_host};

use crate::listener::BridgeTarget;

// -----------------------------------------------------------------------------
// ----- LinkState -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Open,
    Closed,
}

// -----------------------------------------------------------------------------
// ----- UdpLink ---------------------------------------------------------------

/// The UDP half of a bridge. Owns its socket exclusively; once closed it stays
/// closed.
#[derive(Debug)]
pub struct UdpLink {
    socket: Option<UdpSocket>,
    target: BridgeTarget,
    resolved: Option<SocketAddr>,

    #[cfg(test)]
    injected_recv_error: Option<io::ErrorKind>,
}

// -----------------------------------------------------------------------------
// ----- UdpLink: Static -------------------------------------------------------

impl UdpLink {
    pub async fn bind(target: BridgeTarget) -> io::Result<Self> {
        let socket = UdpSocket::bind(target.local_bind_addr()).await?;

        Ok(Self {
            socket: Some(socket),
            target,
            resolved: None,
            #[cfg(test)]
            injected_recv_error: None,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- UdpLink: Public -------------------------------------------------------

impl UdpLink {
    pub fn state(&self) -> LinkState {
        if self.socket.is_some() {
            LinkState::Open
        } else {
            LinkState::Closed
        }
    }

    pub fn target(&self) -> &BridgeTarget {
        &self.target
    }

    /// One payload, one datagram.
    pub async fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        if self.socket.is_none() {
            return Err(LinkError::Closed);
        }

        let addr = self.resolve().await?;
        let socket = self.socket.as_ref().ok_or(LinkError::Closed)?;

        socket.send_to(payload, addr).await.map_err(LinkError::Send)
    }

    /// Waits for the next datagram. A closed link never yields.
    pub async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        #[cfg(test)]
        if let Some(kind) = self.injected_recv_error.take() {
            return Err(io::Error::from(kind));
        }

        match &self.socket {
            Some(socket) => socket.recv_from(buf).await.map(|(n, _from)| n),
            None => std::future::pending().await,
        }
    }

    /// Returns `true` only for the call that actually closed the socket.
    pub fn close(&mut self) -> bool {
        self.socket.take().is_some()
    }

    /// Make the next `recv` fail with `kind`, as a socket error would.
    #[cfg(test)]
    pub(crate) fn fail_next_recv(&mut self, kind: io::ErrorKind) {
        self.injected_recv_error = Some(kind);
    }
}

// -----------------------------------------------------------------------------
// ----- UdpLink: Private ------------------------------------------------------

impl UdpLink {
    async fn resolve(&mut self) -> Result<SocketAddr, LinkError> {
        if let Some(addr) = self.resolved {
            return Ok(addr);
        }

        let host = self.target.host.as_str();
        let want_v6 = self.target.local_bind_addr().is_ipv6();

        let addr = lookup_host((host, self.target.port))
            .await
            .map_err(LinkError::Resolve)?
            .find(|a| a.is_ipv6() == want_v6)
            .ok_or_else(|| {
                LinkError::Resolve(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address of the socket's family for {}", self.target),
                ))
            })?;

        self.resolved = Some(addr);
        Ok(addr)
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("udp link is closed")]
    Closed,

    #[error("could not resolve target: {0}")]
    Resolve(io::Error),

    #[error("udp send failed: {0}")]
    Send(io::Error),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut link = UdpLink::bind(BridgeTarget::new("127.0.0.1", 9)).await.unwrap();
        assert_eq!(link.state(), LinkState::Open);

        assert!(link.close());
        assert!(!link.close());
        assert!(!link.close());
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let mut link = UdpLink::bind(BridgeTarget::new("127.0.0.1", 9)).await.unwrap();
        link.close();
        assert!(matches!(link.send(b"x").await, Err(LinkError::Closed)));
    }

    #[tokio::test]
    async fn sends_and_receives_datagrams() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let mut link = UdpLink::bind(BridgeTarget::new("localhost", port)).await.unwrap();
        assert_eq!(link.send(b"\xFF\xFF\xFF\xFFgetinfo").await.unwrap(), 11);

        let mut buf = [0u8; 64];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\xFF\xFF\xFF\xFFgetinfo");

        server.send_to(b"reply", from).await.unwrap();
        let n = link.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"reply");
    }

    #[tokio::test]
    async fn injected_recv_error_fires_once() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let mut link = UdpLink::bind(BridgeTarget::new("127.0.0.1", port)).await.unwrap();
        link.fail_next_recv(io::ErrorKind::ConnectionRefused);

        let mut buf = [0u8; 16];
        let err = link.recv(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);

        link.send(b"ping").await.unwrap();
        let (_, from) = server.recv_from(&mut buf).await.unwrap();
        server.send_to(b"pong", from).await.unwrap();
        let n = link.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_send_error_not_a_close() {
        let mut link = UdpLink::bind(BridgeTarget::new("host.invalid", 27960))
            .await
            .unwrap();
        assert!(matches!(link.send(b"x").await, Err(LinkError::Resolve(_))));
        assert_eq!(link.state(), LinkState::Open);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
