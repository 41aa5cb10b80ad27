use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::{StatusCode, Uri};
use tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use crate::context::AppContext;
use crate::hub::{Connection, Hub, parse_topic};
use crate::transport::message::{
    FEED_PATH, FeedQuery, INVALID_TOKEN, INVALID_TOKEN_REASON, TEMPLATE_ID_REQUIRED,
    TEMPLATE_ID_REQUIRED_REASON,
};

/// Bind `addr` and serve the comment feed until the context shuts down.
pub async fn start_websocket_server(addr: &str, ctx: Arc<AppContext>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, ctx).await;
    Ok(())
}

/// Accept connections on an already bound listener until the context is
/// cancelled. Each connection runs on its own task.
pub async fn serve(listener: TcpListener, ctx: Arc<AppContext>) {
    let cancel = ctx.cancellation_token();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = ctx.clone();
                    tokio::spawn(async move { handle_connection(stream, peer, ctx).await });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    info!("WebSocket server stopped");
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<AppContext>) {
    let mut request_uri: Option<Uri> = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() != FEED_PATH {
            return Err(reject(StatusCode::NOT_FOUND, "Not Found"));
        }
        request_uri = Some(req.uri().clone());
        Ok(resp)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let query = FeedQuery::from_uri(request_uri.as_ref());
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection = Arc::new(Connection::new(tx));

    // Forward queued frames to the socket. Holds only a weak handle so the
    // channel closes once the hub and the reader have let go.
    let writer: JoinHandle<()> = {
        let weak: Weak<Connection> = Arc::downgrade(&connection);
        let hub: Arc<Hub> = ctx.hub.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = msg.is_close();
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(error = %e, "socket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            drop(rx);
            if let Some(connection) = weak.upgrade() {
                connection.mark_closed();
                hub.unsubscribe(&connection);
            }
        })
    };

    let topic_id = match parse_topic(query.template_id.as_deref()) {
        Ok(topic_id) => topic_id,
        Err(e) => {
            info!(%peer, error = %e, "rejecting connection");
            connection.close(TEMPLATE_ID_REQUIRED, TEMPLATE_ID_REQUIRED_REASON);
            drop(connection);
            let _ = writer.await;
            return;
        }
    };

    let principal = match query.token.as_deref() {
        None => None,
        Some(token) => match ctx.authenticator.verify(token) {
            Ok(principal) => Some(principal),
            Err(e) => {
                info!(%peer, topic = topic_id, error = %e, "rejecting connection");
                connection.close(INVALID_TOKEN, INVALID_TOKEN_REASON);
                drop(connection);
                let _ = writer.await;
                return;
            }
        },
    };

    ctx.hub
        .subscribe(topic_id, connection.clone(), principal.as_ref())
        .await;

    // No client messages are defined on this endpoint; drain until close.
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(WsMessage::Close(frame)) => {
                debug!(connection = %connection.id, ?frame, "client closed");
                break;
            }
            Ok(WsMessage::Text(text)) => {
                debug!(connection = %connection.id, len = text.len(), "ignoring client message")
            }
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %connection.id, error = %e, "socket read failed");
                break;
            }
        }
    }

    info!(connection = %connection.id, topic = topic_id, "disconnected");
    connection.mark_closed();
    ctx.hub.unsubscribe(&connection);
    drop(connection);
    let _ = writer.await;
}
