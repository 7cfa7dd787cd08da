//! One WebSocket client paired with one UDP socket.
//!
//! Frames from the client leave as datagrams, datagrams from the game server
//! come back as binary frames. Nothing is buffered: a datagram that arrives
//! while the WebSocket cannot take it is dropped.

pub mod udp_link;

use std::{io, net::SocketAddr};

use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, info, warn};

use crate::analytics;
use crate::listener::BridgeTarget;

pub use udp_link::{LinkError, LinkState, UdpLink};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const MAX_DATAGRAM: usize = 64 * 1024;

// -----------------------------------------------------------------------------
// ----- ConnectionBridge ------------------------------------------------------

pub struct ConnectionBridge<S> {
    ws: WebSocketStream<S>,
    link: UdpLink,
    peer: SocketAddr,
}

/// Why and how a bridge ended, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeSummary {
    pub datagrams_to_server: u64,
    pub datagrams_to_client: u64,
    pub datagrams_dropped: u64,
    pub send_failures: u64,
    pub udp_closes: u32,
    pub ended_by: EndReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndReason {
    #[default]
    ClientClosed,
    ClientError,
}

// -----------------------------------------------------------------------------
// ----- ConnectionBridge: Static ----------------------------------------------

impl<S> ConnectionBridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Binds the bridge's UDP socket. Nothing is sent yet.
    pub async fn open(
        ws: WebSocketStream<S>,
        target: BridgeTarget,
        peer: SocketAddr,
    ) -> io::Result<Self> {
        let link = UdpLink::bind(target).await?;
        analytics::inc_bridge_opened();

        Ok(Self { ws, link, peer })
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionBridge: Public ----------------------------------------------

impl<S> ConnectionBridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Relay until the client goes away. A UDP receive error closes the socket
    /// but leaves the WebSocket for the client to close.
    pub async fn run(self) -> BridgeSummary {
        let ConnectionBridge { ws, mut link, peer } = self;
        let (mut sink, mut stream) = ws.split();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut ws_writable = true;
        let mut summary = BridgeSummary::default();

        info!("bridge {peer} -> {} open", link.target());

        loop {
            select! {

                // -- Client frames --
                frame = stream.next() => match frame {
                    Some(Ok(Message::Binary(data))) => {
                        forward_to_server(&mut link, &data, peer, &mut summary).await;
                    }

                    Some(Ok(Message::Text(text))) => {
                        forward_to_server(&mut link, text.as_bytes(), peer, &mut summary).await;
                    }

                    Some(Ok(Message::Close(_))) => {
                        // tungstenite queued our close reply; it only goes out on flush.
                        if let Err(e) = sink.close().await {
                            debug!("bridge {peer} close reply not delivered: {e}");
                        }
                        summary.ended_by = EndReason::ClientClosed;
                        break;
                    }

                    None => {
                        summary.ended_by = EndReason::ClientClosed;
                        break;
                    }

                    // Ping/Pong are answered by tungstenite itself.
                    Some(Ok(_)) => {}

                    Some(Err(e)) => {
                        debug!("bridge {peer} websocket error: {e}");
                        summary.ended_by = EndReason::ClientError;
                        break;
                    }
                },

                // -- Game server datagrams --
                recv_res = link.recv(&mut buf) => match recv_res {
                    Ok(n) => {
                        deliver_to_client(&mut sink, &buf[..n], &mut ws_writable, peer, &mut summary)
                            .await;
                    }

                    Err(e) => {
                        warn!("bridge {peer} udp receive error: {e}");
                        if link.close() {
                            summary.udp_closes += 1;
                        }
                    }
                },
            }
        }

        if link.close() {
            summary.udp_closes += 1;
        }
        analytics::inc_bridge_closed();

        info!(
            "bridge {peer} closed ({:?}): {} up, {} down, {} dropped",
            summary.ended_by,
            summary.datagrams_to_server,
            summary.datagrams_to_client,
            summary.datagrams_dropped
        );

        summary
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn forward_to_server(
    link: &mut UdpLink,
    payload: &[u8],
    peer: SocketAddr,
    summary: &mut BridgeSummary,
) {
    match link.send(payload).await {
        Ok(_) => {
            summary.datagrams_to_server += 1;
            analytics::inc_datagram_to_server();
        }

        Err(LinkError::Closed) => {
            summary.datagrams_dropped += 1;
            analytics::inc_datagram_dropped();
        }

        // The client may keep sending; a later datagram may get through.
        Err(e) => {
            warn!("bridge {peer} -> {}: {e}", link.target());
            summary.send_failures += 1;
        }
    }
}

/// One datagram, one binary frame. After the first failed write the sink is
/// never tried again and everything is dropped.
async fn deliver_to_client<K>(
    sink: &mut K,
    datagram: &[u8],
    writable: &mut bool,
    peer: SocketAddr,
    summary: &mut BridgeSummary,
) where
    K: Sink<Message, Error = WsError> + Unpin,
{
    if !*writable {
        summary.datagrams_dropped += 1;
        analytics::inc_datagram_dropped();
        return;
    }

    match sink.send(Message::Binary(Bytes::copy_from_slice(datagram))).await {
        Ok(()) => {
            summary.datagrams_to_client += 1;
            analytics::inc_datagram_to_client();
        }
        Err(e) => {
            debug!("bridge {peer} websocket no longer writable: {e}");
            *writable = false;
            summary.datagrams_dropped += 1;
            analytics::inc_datagram_dropped();
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
