use crate::core::models::BuildConfig;
use crate::infrastructure::hmr::{HmrBroadcaster, HmrMessage};
use crate::infrastructure::hmr_client::{generate_client_code, CLIENT_PATH, WS_PATH};
use crate::infrastructure::output_cache::{public_url_path, OutputCache};
use crate::infrastructure::proxy::{bad_gateway, ReverseProxy};
use crate::utils::{Logger, Result};
use axum::{
    extract::{Request, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

const RESERVED_PREFIX: &str = "/__tailpack/";

#[derive(Clone)]
struct ServerState {
    cache: Arc<OutputCache>,
    hmr: HmrBroadcaster,
    proxy: Arc<ReverseProxy>,
    /// URL path assets are served under, e.g. `/static/bundles/`
    public_prefix: Arc<str>,
    client_code: Arc<str>,
}

/// HTTP front of the dev loop: assets from the current snapshot, live-reload
/// socket, everything else proxied to the backend.
pub struct DevServer {
    state: ServerState,
    address: String,
    cors: bool,
}

impl DevServer {
    pub fn new(config: &BuildConfig, cache: Arc<OutputCache>, hmr: HmrBroadcaster) -> Result<Self> {
        let dev = &config.dev_server;
        Ok(Self {
            state: ServerState {
                cache,
                hmr,
                proxy: Arc::new(ReverseProxy::new(&dev.proxy)?),
                public_prefix: public_url_path(&config.output.public_path).into(),
                client_code: generate_client_code(dev.overlay).into(),
            },
            address: format!("{}:{}", dev.host, dev.port),
            cors: dev.cors,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn router(&self) -> Router {
        let router = Router::new()
            .route(WS_PATH, get(handle_socket_upgrade))
            .route(CLIENT_PATH, get(handle_client_script))
            .fallback(handle_request)
            .with_state(self.state.clone());

        if self.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(&self.address).await?)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        Logger::info(&format!("🚀 Dev server running on http://{}", local));
        if !self.state.proxy.is_empty() {
            Logger::info("↪️  Non-asset requests are proxied to the backend");
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn handle_client_script(State(state): State<ServerState>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        state.client_code.to_string(),
    )
        .into_response()
}

async fn handle_request(State(state): State<ServerState>, request: Request) -> Response {
    let path = request.uri().path().to_string();

    if path.starts_with(&*state.public_prefix) {
        let snapshot = state.cache.load();
        return match snapshot.get(&path) {
            Some(asset) => (
                [
                    (header::CONTENT_TYPE, asset.content_type),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                asset.content.clone(),
            )
                .into_response(),
            None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        };
    }

    if path.starts_with(RESERVED_PREFIX) {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }

    match state.proxy.route_for(&path) {
        Some(route) => match state.proxy.forward(route, request).await {
            Ok(response) => response,
            Err(err) => bad_gateway(&err),
        },
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn handle_socket_upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let client_id = uuid::Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.hmr.subscribe();
    Logger::debug(&format!("Live reload client {} connected", client_id));

    let hello = HmrMessage::Connected {
        generation: state.cache.generation(),
    };
    if send_message(&mut sender, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text == "ping" => {
                        if sender.send(Message::Text("pong".to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(message) => {
                        if send_message(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    // Fell behind: the page is stale, reload it
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        let reload = HmrMessage::FullReload { reason: "missed updates".into() };
                        if send_message(&mut sender, &reload).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Logger::debug(&format!("Live reload client {} disconnected", client_id));
}

async fn send_message<S>(sender: &mut S, message: &HmrMessage) -> std::result::Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let json = serde_json::to_string(message).map_err(|_| ())?;
    sender.send(Message::Text(json)).await.map_err(|_| ())
}
