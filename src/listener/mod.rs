pub mod target;

use std::{net::SocketAddr, time::Duration};

use futures_util::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, warn};

use crate::bridge::ConnectionBridge;

pub use target::{BridgeTarget, ConnectionSetupError, TargetPolicy, target_from_query};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

// How long a rejected client gets to acknowledge the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// -----------------------------------------------------------------------------
// ----- Public ----------------------------------------------------------------

/// Everything that happens to one accepted TCP connection: optional TLS, the
/// WebSocket upgrade, target resolution, then the bridge itself.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    policy: TargetPolicy,
    tls: Option<TlsAcceptor>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay for {peer} failed: {e}");
    }

    match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => serve_upgrade(tls_stream, peer, &policy).await,
            Err(e) => warn!("tls handshake with {peer} failed: {e}"),
        },
        None => serve_upgrade(stream, peer, &policy).await,
    }
}

pub async fn serve_upgrade<S>(stream: S, peer: SocketAddr, policy: &TargetPolicy)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request_uri: Option<String> = None;

    let capture_uri = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        request_uri = Some(req.uri().to_string());
        Ok(resp)
    };

    let ws = match accept_hdr_async(stream, capture_uri).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake with {peer} failed: {e}");
            return;
        }
    };

    let target = match policy.resolve(request_uri.as_deref().unwrap_or("/")) {
        Ok(target) => target,
        Err(e) => {
            warn!("rejecting {peer}: {e}");
            reject(ws, &e).await;
            return;
        }
    };

    match ConnectionBridge::open(ws, target.clone(), peer).await {
        Ok(bridge) => {
            bridge.run().await;
        }
        Err(e) => warn!("bridge {peer} -> {target}: udp bind failed: {e}"),
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn reject<S>(mut ws: WebSocketStream<S>, err: &ConnectionSetupError)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Policy,
        reason: err.close_reason().into(),
    };

    if let Err(e) = ws.close(Some(frame)).await {
        debug!("close frame not delivered: {e}");
        return;
    }

    // Let the client finish the closing handshake so it sees our code.
    let _ = timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
