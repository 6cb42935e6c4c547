/// WebSocket transport for mediator sessions
///
/// Each accepted socket gets its own mediator loop. This module only moves
/// frames: text frames go to the loop, envelopes from the loop go back out
/// as text frames.
use crate::errors::DaemonResult;
use crate::metrics::MetricsCollector;
use crate::pool::ConnectionRegistry;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use mediator_core::{Mediator, MediatorConfig, ServerEnvelope, Session, SharedArchitect};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Room for pong replies queued behind envelopes.
const CONTROL_BUFFER: usize = 8;

/// Shared state handed to every session task.
pub struct SessionContext {
    pub architect: SharedArchitect,
    pub mediator: MediatorConfig,
    pub outbound_buffer: usize,
    pub registry: Arc<ConnectionRegistry>,
    pub metrics: Arc<MetricsCollector>,
}

/// Serve one client connection until it closes.
pub async fn handle_session(
    stream: TcpStream,
    client_addr: SocketAddr,
    context: Arc<SessionContext>,
) -> DaemonResult<()> {
    let session_id = match context.registry.register(client_addr) {
        Ok(id) => id,
        Err(e) => {
            warn!("Refusing connection from {}: {}", client_addr, e);
            return Err(e);
        }
    };
    context.metrics.record_session_opened();
    info!(session_id = %session_id, client = %client_addr, "New WebSocket connection");

    let result = run_session(stream, session_id, &context).await;

    context.metrics.record_session_closed();
    context.registry.unregister(&session_id);
    info!(session_id = %session_id, "WebSocket connection closed");
    result
}

async fn run_session(
    stream: TcpStream,
    session_id: Uuid,
    context: &SessionContext,
) -> DaemonResult<()> {
    let ws_stream = accept_async(stream).await.map_err(|e| {
        error!(session_id = %session_id, "Failed to accept WebSocket connection: {}", e);
        e
    })?;
    let (ws_sink, mut ws_stream) = ws_stream.split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(context.outbound_buffer);
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerEnvelope>(context.outbound_buffer);
    let (control_tx, control_rx) = mpsc::channel::<WsMessage>(CONTROL_BUFFER);

    let session = Session::with_id(session_id, context.mediator.max_queue_depth);
    let mediator =
        Mediator::with_session(session, context.architect.clone(), context.mediator.clone())
            .with_observer(context.metrics.clone());
    let mediator_handle = tokio::spawn(mediator.run(inbound_rx, outbound_tx));

    // The writer drains envelopes on its own, so a full inbound channel
    // never stops outbound traffic.
    let writer_handle = tokio::spawn(write_frames(ws_sink, outbound_rx, control_rx, session_id));

    loop {
        tokio::select! {
            msg = ws_stream.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    if inbound_tx.send(text).await.is_err() {
                        debug!(session_id = %session_id, "Mediator loop ended");
                        break;
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if control_tx.send(WsMessage::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(session_id = %session_id, "Client closed WebSocket connection");
                    break;
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    warn!(session_id = %session_id, "Ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(session_id = %session_id, "WebSocket error: {}", e);
                    break;
                }
            },

            // Writer gone: the socket can no longer be written to
            _ = control_tx.closed() => {
                debug!(session_id = %session_id, "Writer stopped");
                break;
            }
        }
    }

    // Closing the inbound side ends the mediator loop; its outbound sender
    // drops with it, which in turn ends the writer.
    drop(inbound_tx);
    drop(control_tx);
    match mediator_handle.await {
        Ok(Ok(session)) => debug!(
            session_id = %session_id,
            turns = session.history().len(),
            "Mediator loop finished"
        ),
        Ok(Err(e)) => debug!(session_id = %session_id, "Mediator loop stopped: {}", e),
        Err(e) => error!(session_id = %session_id, "Mediator task failed: {}", e),
    }

    match writer_handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(session_id = %session_id, "Writer task failed: {}", e);
            Ok(())
        }
    }
}

/// Serialize envelopes and control frames onto the socket until either
/// source closes or a write fails.
async fn write_frames(
    mut ws_sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
    mut outbound_rx: mpsc::Receiver<ServerEnvelope>,
    mut control_rx: mpsc::Receiver<WsMessage>,
    session_id: Uuid,
) -> DaemonResult<()> {
    loop {
        let frame = tokio::select! {
            envelope = outbound_rx.recv() => match envelope {
                Some(envelope) => WsMessage::Text(serde_json::to_string(&envelope)?),
                None => break,
            },
            control = control_rx.recv() => match control {
                Some(frame) => frame,
                None => break,
            },
        };

        if let Err(e) = ws_sink.send(frame).await {
            debug!(session_id = %session_id, "Failed to write frame: {}", e);
            break;
        }
    }

    let _ = ws_sink.close().await;
    Ok(())
}
