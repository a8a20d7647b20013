//! Exchanges CDP messages with a single browser-level WebSocket.
//!
//! This plays the role chromiumoxide's `Connection<T>` plays for its
//! `Handler`: queue outgoing commands, correlate responses by call id, and
//! hand out events as they arrive. Where the teacher drives this by hand
//! with `Stream`/`Sink` polling, we run it as a dedicated tokio task reached
//! through channels — the same "single background read loop dispatching
//! events" the concurrency model in spec §5 asks for, expressed with the
//! actor-per-connection idiom tokio programs use instead of a hand-rolled
//! `Future`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_tungstenite::tokio::connect_async;
use async_tungstenite::tungstenite::Message as WsMessage;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::cdp::target::SessionId;
use crate::cdp::{CallId, Command, EventMessage, MethodCall, Response, WireMessage};
use crate::error::{CdpError, Result};

/// Requests have this long to come back before `execute` gives up.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

struct Outgoing {
    call: MethodCall,
    reply: oneshot::Sender<Response>,
}

/// A handle to the background task that owns the WebSocket. Cheaply
/// cloneable; every [`crate::manager::Connection`] and CDP session holds one.
#[derive(Clone)]
pub struct Transport {
    next_id: Arc<AtomicUsize>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Transport {
    /// Connects to the given CDP WebSocket endpoint and spawns the I/O loop.
    /// Returns the transport handle plus a receiver for out-of-band events.
    pub async fn connect(ws_url: &str) -> Result<(Self, mpsc::UnboundedReceiver<EventMessage>)> {
        let (ws, _response) = connect_async(ws_url).await?;
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_io_loop(ws, outgoing_rx, event_tx));

        Ok((
            Self {
                next_id: Arc::new(AtomicUsize::new(0)),
                outgoing: outgoing_tx,
            },
            event_rx,
        ))
    }

    fn next_call_id(&self) -> CallId {
        CallId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Sends `cmd` and awaits its response, optionally scoped to a CDP session
    /// (i.e. a specific attached target rather than the browser itself).
    pub async fn execute<C: Command>(
        &self,
        cmd: C,
        session_id: Option<SessionId>,
    ) -> Result<C::Response> {
        let id = self.next_call_id();
        let method = cmd.identifier();
        let params = serde_json::to_value(&cmd)?;
        let call = MethodCall {
            id,
            session_id,
            method,
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.outgoing
            .send(Outgoing { call, reply: tx })
            .map_err(|_| CdpError::Closed)?;

        let resp = tokio::time::timeout(REQUEST_TIMEOUT, rx)
            .await
            .map_err(|_| CdpError::Timeout(REQUEST_TIMEOUT))?
            .map_err(|_| CdpError::Closed)?;

        if let Some(err) = resp.error {
            return Err(CdpError::Protocol(err));
        }
        let result = resp.result.ok_or(CdpError::NoResponse)?;
        Ok(serde_json::from_value(result)?)
    }
}

#[cfg(test)]
impl Transport {
    /// A transport with no real socket behind it, for exercising
    /// connection-registry logic that never actually calls `execute`.
    pub fn test_stub() -> Self {
        let (outgoing, _unused) = mpsc::unbounded_channel();
        Self { next_id: Arc::new(AtomicUsize::new(0)), outgoing }
    }
}

async fn run_io_loop(
    ws: async_tungstenite::WebSocketStream<
        async_tungstenite::tokio::ConnectStream,
    >,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<EventMessage>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<CallId, oneshot::Sender<Response>> = HashMap::new();

    loop {
        tokio::select! {
            next = outgoing.recv() => {
                match next {
                    Some(Outgoing { call, reply }) => {
                        match serde_json::to_string(&call) {
                            Ok(text) => {
                                pending.insert(call.id, reply);
                                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                                    tracing::warn!("websocket send failed, closing connection");
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::error!("failed to serialize CDP command: {err}");
                            }
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<WireMessage>(&text) {
                            Ok(WireMessage::Response(resp)) => {
                                if let Some(tx) = pending.remove(&resp.id) {
                                    let _ = tx.send(resp);
                                }
                            }
                            Ok(WireMessage::Event(event)) => {
                                let _ = events.send(event);
                            }
                            Err(err) => {
                                tracing::warn!("failed to parse CDP message: {err}");
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!("websocket error: {err}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}
