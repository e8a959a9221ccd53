// ============================================================================
// Push-Channel Server
// ============================================================================
//
// Every connection starts unbound. A client binds it by sending a
// hex-encoded cleartext-signed claim naming its pubkeyhash:
//
//   {"identity": "<pubkeyhash>", "identityType": "pubkeyhash", "nonce": <n>}
//
// Malformed handshakes are logged and ignored. A well-formed handshake whose
// signature does not verify against the locally registered key closes the
// connection.
//
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use muttr_crypto::{CleartextMessage, PublicKey};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, WebSocketStream};

use super::{BusFrame, ChannelHandle};
use crate::auth::{verify_offloaded, IdentityType, SignedClaim};
use crate::context::PodContext;
use crate::metrics;
use crate::registry::stored_key;

pub type WebSocketStreamType = WebSocketStream<TcpStream>;

/// Accept push-channel connections until the listener fails
pub async fn run_bus_server(ctx: Arc<PodContext>, listener: TcpListener) {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to accept socket: {}", e);
                continue;
            }
        };

        let ctx = ctx.clone();

        tokio::spawn(async move {
            match accept_async(socket).await {
                Ok(ws_stream) => handle_channel(ws_stream, addr, ctx).await,
                Err(e) => tracing::debug!(addr = %addr, error = %e, "WebSocket upgrade failed"),
            }
        });
    }
}

/// Why a handshake message was ignored
#[derive(Debug, Error)]
enum HandshakeError {
    #[error("payload is not hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("payload is not UTF-8 text")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid signed message: {0}")]
    Armor(#[from] muttr_crypto::ArmorError),
    #[error("invalid claim: {0}")]
    Claim(#[from] crate::auth::ClaimError),
    #[error("identityType must be pubkeyhash")]
    IdentityType,
    #[error("nonce is required")]
    MissingNonce,
}

/// A structurally valid handshake, not yet verified
#[derive(Debug)]
struct Handshake {
    message: CleartextMessage,
    claim: SignedClaim,
}

fn parse_handshake(raw: &[u8]) -> Result<Handshake, HandshakeError> {
    let bytes = hex::decode(String::from_utf8_lossy(raw).trim())?;
    let text = String::from_utf8(bytes)?;
    let message = CleartextMessage::parse(&text)?;
    let claim = SignedClaim::from_text(message.text())?;

    if claim.identity_type != IdentityType::Pubkeyhash {
        return Err(HandshakeError::IdentityType);
    }
    // Presence only; the bus does not consult the nonce ledger
    if claim.nonce.is_none() {
        return Err(HandshakeError::MissingNonce);
    }

    Ok(Handshake { message, claim })
}

/// Verify a handshake against the local registry only
///
/// Returns the key that signed it, or None if the channel must be dropped.
async fn verify_handshake(ctx: &PodContext, handshake: Handshake) -> Option<PublicKey> {
    let identity = match ctx.registry.find_identity(&handshake.claim.identity).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            tracing::warn!(identity = %handshake.claim.identity, "Handshake from unknown identity");
            return None;
        }
        Err(e) => {
            e.log();
            return None;
        }
    };

    let key = match stored_key(&identity) {
        Ok(key) => key,
        Err(e) => {
            e.log();
            return None;
        }
    };

    verify_offloaded(handshake.message, key).await.then_some(key)
}

pub async fn handle_channel(ws_stream: WebSocketStreamType, addr: SocketAddr, ctx: Arc<PodContext>) {
    metrics::BUS_CONNECTIONS_TOTAL.inc();
    tracing::info!(addr = %addr, "Push channel opened");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<BusFrame>();
    let channel = ChannelHandle::new(tx.clone());

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let raw = match msg {
                    Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
                    Some(Ok(WsMessage::Binary(data))) => data,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_sender.send(WsMessage::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::debug!(addr = %addr, "Push channel closed by client");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(addr = %addr, error = %e, "Push channel error");
                        break;
                    }
                };

                let handshake = match parse_handshake(&raw) {
                    Ok(handshake) => handshake,
                    Err(e) => {
                        tracing::info!(addr = %addr, error = %e, "Ignoring invalid handshake");
                        continue;
                    }
                };

                let Some(key) = verify_handshake(&ctx, handshake).await else {
                    metrics::AUTH_FAILURES_TOTAL.with_label_values(&["handshake"]).inc();
                    tracing::warn!(addr = %addr, "Handshake verification failed, closing channel");
                    let close = CloseFrame {
                        code: CloseCode::Policy,
                        reason: Cow::Borrowed("Handshake verification failed"),
                    };
                    let _ = ws_sender.send(WsMessage::Close(Some(close))).await;
                    break;
                };

                let pubkeyhash = key.pubkeyhash();
                ctx.bus.bind(&pubkeyhash, channel.clone()).await;
                tracing::info!(addr = %addr, pubkeyhash = %pubkeyhash, "Push channel bound");
                let _ = tx.send(BusFrame::Bound { pubkeyhash });
            }

            Some(frame) = rx.recv() => {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize bus frame");
                        continue;
                    }
                };
                if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    ctx.bus.unbind(channel.id()).await;
    tracing::info!(addr = %addr, "Push channel closed");
}
