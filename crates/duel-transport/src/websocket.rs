//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The local identity is the listen address (`host:port`). Every peer
//! both listens and dials, so either side can re-establish a link after a
//! drop. The dialing side announces its own identity in a first text
//! frame, `hello <id>`, so the acceptor knows who is on the other end.

use std::sync::OnceLock;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{Endpoint, Link, LinkEvent, OpenOptions, PeerId, Transport, TransportError};

/// How long an accepted socket has to introduce itself.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the inbound link queue.
const INCOMING_CAPACITY: usize = 16;

const HELLO_PREFIX: &str = "hello ";

/// A WebSocket-based [`Transport`].
pub struct WebSocketTransport {
    bind_addr: String,
    local: OnceLock<PeerId>,
}

impl WebSocketTransport {
    /// Creates a transport that will listen on `bind_addr` once bound.
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            local: OnceLock::new(),
        }
    }
}

impl Transport for WebSocketTransport {
    async fn bind(&self) -> Result<Endpoint, TransportError> {
        if self.local.get().is_some() {
            return Err(TransportError::AlreadyBound);
        }
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let addr = listener.local_addr().map_err(TransportError::AcceptFailed)?;
        let local_id = PeerId::new(addr.to_string());
        self.local
            .set(local_id.clone())
            .map_err(|_| TransportError::AlreadyBound)?;

        let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);
        tokio::spawn(accept_loop(listener, tx));
        tracing::info!(%local_id, "WebSocket transport listening");

        Ok(Endpoint {
            local_id,
            incoming: rx,
        })
    }

    async fn open(&self, remote: &PeerId, options: OpenOptions) -> Result<Link, TransportError> {
        let local = self.local.get().ok_or(TransportError::NotBound)?;
        let url = format!("ws://{remote}");
        let (mut ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                peer: remote.clone(),
                reason: e.to_string(),
            })?;

        ws.send(Message::Text(format!("{HELLO_PREFIX}{local}").into()))
            .await
            .map_err(|e| TransportError::ConnectFailed {
                peer: remote.clone(),
                reason: e.to_string(),
            })?;

        let link = spawn_link(ws, remote.clone(), options.reliable);
        tracing::debug!(%remote, link = %link.id(), "WebSocket link opened");
        Ok(link)
    }
}

async fn accept_loop(listener: TcpListener, incoming: mpsc::Sender<Link>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                continue;
            }
        };
        if incoming.is_closed() {
            tracing::debug!("endpoint dropped, stopping accept loop");
            break;
        }

        let incoming = incoming.clone();
        tokio::spawn(async move {
            let mut ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
                    return;
                }
            };
            let remote = match tokio::time::timeout(HELLO_TIMEOUT, ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => match text.strip_prefix(HELLO_PREFIX) {
                    Some(id) if !id.is_empty() => PeerId::new(id),
                    _ => {
                        tracing::debug!(%addr, "malformed hello, dropping socket");
                        return;
                    }
                },
                _ => {
                    tracing::debug!(%addr, "no hello received, dropping socket");
                    return;
                }
            };
            let link = spawn_link(ws, remote, true);
            tracing::debug!(%addr, remote = %link.remote(), link = %link.id(), "accepted WebSocket link");
            let _ = incoming.send(link).await;
        });
    }
}

/// Splits the socket into a writer task and a reader task that service
/// the channels of a new [`Link`].
fn spawn_link<S>(ws: WebSocketStream<S>, remote: PeerId, reliable: bool) -> Link
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                tracing::debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        loop {
            let event = match stream.next().await {
                Some(Ok(Message::Binary(data))) => LinkEvent::Data(data.into()),
                Some(Ok(Message::Text(text))) => LinkEvent::Data(text.as_bytes().to_vec()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                    return;
                }
            };
            if in_tx.send(event).is_err() {
                return;
            }
        }
        let _ = in_tx.send(LinkEvent::Closed);
    });

    Link::from_channels(remote, reliable, out_tx, in_rx)
}
