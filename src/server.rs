//! HTTP/WebSocket server: initial page, embedded assets, and the `/sock`
//! endpoint that upgrades each visitor into a [`Session`].

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path as UrlPath, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use rust_embed::Embed;
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;

use crate::command::CommandRegistry;
use crate::directive;
use crate::origin::{check_ws_origin, OriginPolicy};
use crate::protocol::ProtocolError;
use crate::session::{Session, SessionError};
use crate::users::UserStore;

/// Outbound frames queued per session before senders start waiting.
const OUTBOUND_BUFFER: usize = 64;

#[derive(Embed)]
#[folder = "assets/"]
struct Assets;

/// Shared state injected into every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CommandRegistry>,
    pub users: Arc<dyn UserStore>,
    /// WebSocket URL the initial page points browsers at.
    pub sock_url: String,
    /// Whether this listener terminates TLS (drives the SECURED/UNSECURED
    /// labels shown to the user).
    pub secured: bool,
    pub query_timeout: Duration,
}

/// Build the router for one listener.
pub fn router(state: AppState, allowed_origins: Vec<String>, policy: OriginPolicy) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/sock", get(sock))
        .route("/public/{*path}", get(asset))
        .route("/health", get(health))
        .layer(axum::middleware::from_fn(move |req, next| {
            let allowed = allowed_origins.clone();
            async move { check_ws_origin(allowed, policy, req, next).await }
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Serve the terminal page, substituting the socket URL and a
/// security-status label into the embedded template.
async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let Some(file) = Assets::get("client.html") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let status = if state.secured {
        "HTTP SECURED"
    } else {
        "HTTP UNSECURED"
    };
    let page = String::from_utf8_lossy(&file.data)
        .replace("{{sock_url}}", &state.sock_url)
        .replace("{{status}}", status);
    Html(page).into_response()
}

async fn asset(UrlPath(path): UrlPath<String>) -> impl IntoResponse {
    match Assets::get(&format!("public/{path}")) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_text_plain().to_string();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime)],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn sock(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Drive one WebSocket connection: spawn the writer, greet the client,
/// then hand the inbound stream to the session's read-dispatch loop.
async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (mut ws_tx, ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    // Writer task: the single owner of the sink half, so outbound frames
    // are transmitted strictly in the order sessions queue them.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let session = Session::new(
        addr,
        out_tx,
        state.registry.clone(),
        state.users.clone(),
        state.query_timeout,
    );

    tracing::info!(%addr, "client connected");

    let greeting = if state.secured {
        "SOCKET SECURED"
    } else {
        "SOCKET UNSECURED"
    };
    if session.append_msg(directive::OUTPUT, greeting).await.is_ok() {
        let inbound = ws_rx.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(_)) => Some(Err(SessionError::Protocol(
                    ProtocolError::NonTextFrame,
                ))),
                // Close ends the stream on the next poll; ping/pong are
                // handled by the library.
                Ok(_) => None,
                Err(e) => Some(Err(SessionError::Transport(e.to_string()))),
            }
        });
        match session.run(inbound).await {
            Ok(()) => {}
            Err(e) => tracing::warn!(%addr, error = %e, "session terminated"),
        }
    }

    // Dropping the session closes the outbound channel, letting the writer
    // flush and send its close frame.
    drop(session);
    let _ = writer.await;
    tracing::info!(%addr, "client disconnected");
}

/// Serve plain HTTP on an already-bound listener.
pub async fn serve_http(listener: TcpListener, app: Router) -> io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

/// Serve HTTPS: manual accept loop wrapping each connection in TLS before
/// handing it to hyper.
pub async fn serve_tls(
    listener: TcpListener,
    app: Router,
    acceptor: TlsAcceptor,
) -> io::Result<()> {
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use hyper_util::service::TowerToHyperService;
    use tower::Service;

    let mut make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let tower_service = match make_service.call(peer).await {
            Ok(service) => service,
            Err(infallible) => match infallible {},
        };

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };
            let hyper_service = TowerToHyperService::new(tower_service);
            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(tls_stream), hyper_service)
                .await
            {
                tracing::debug!(%peer, error = ?e, "connection error");
            }
        });
    }
}
