//! Message Channel Listener
//!
//! A long-lived loopback HTTP listener whose origin is the application
//! origin. Attempts subscribe for the duration of one attempt and unsubscribe
//! by dropping their [`Subscription`].
//!
//! Every POST to the message path is answered with `204 No Content`, whether
//! it was accepted, dropped for a foreign origin, or unrecognized.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Html,
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use memberhub_core::{branding, CallbackPortService, FlowOutcome};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::bridge::bridge_page;
use super::message::FlowMessage;

type Handler = Arc<dyn Fn(FlowOutcome) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to bind loopback listener: {0}")]
    Bind(#[from] std::io::Error),
}

struct Registry {
    origin: RwLock<Option<String>>,
    handlers: DashMap<u64, Handler>,
    next_id: AtomicU64,
}

impl Registry {
    fn deliver(&self, origin: Option<&str>, body: &[u8]) -> bool {
        let accepted = {
            let expected = self.origin.read();
            matches!((expected.as_deref(), origin), (Some(e), Some(o)) if e == o)
        };
        if !accepted {
            trace!("[Channel] Dropped message from foreign origin");
            return false;
        }

        let Some(outcome) = FlowMessage::parse(body).and_then(FlowMessage::into_outcome) else {
            trace!("[Channel] Ignored unrecognized message");
            return false;
        };

        // Snapshot so handlers run without holding map shards
        let handlers: Vec<Handler> = self.handlers.iter().map(|h| h.value().clone()).collect();
        if handlers.is_empty() {
            debug!("[Channel] Flow message arrived with no active attempt");
            return false;
        }

        debug!(listeners = handlers.len(), "[Channel] Dispatching flow message");
        for handler in handlers {
            handler(outcome.clone());
        }
        true
    }
}

/// Removes its handler when dropped.
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.handlers.remove(&self.id);
            trace!(subscription = self.id, "[Channel] Unsubscribed");
        }
    }
}

struct ServerState {
    port: u16,
    shutdown: Option<CancellationToken>,
}

pub struct MessageChannel {
    registry: Arc<Registry>,
    server: Mutex<Option<ServerState>>,
    ports: Option<CallbackPortService>,
    explicit_port: Option<u16>,
}

impl MessageChannel {
    /// A channel that starts its listener lazily on [`Self::ensure_started`].
    pub fn new(ports: Option<CallbackPortService>, explicit_port: Option<u16>) -> Self {
        Self {
            registry: Arc::new(Registry {
                origin: RwLock::new(None),
                handlers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
            server: Mutex::new(None),
            ports,
            explicit_port,
        }
    }

    /// A channel with a fixed origin and no HTTP listener; messages arrive
    /// only through [`Self::deliver`].
    pub fn detached(port: u16) -> Self {
        let channel = Self::new(None, Some(port));
        *channel.registry.origin.write() = Some(branding::loopback_origin(port));
        if let Ok(mut server) = channel.server.try_lock() {
            *server = Some(ServerState {
                port,
                shutdown: None,
            });
        }
        channel
    }

    /// Start the loopback listener if it is not running; returns its port.
    ///
    /// Port order: explicit, persisted, branded default, OS-assigned. The
    /// bound port is persisted for the next run.
    pub async fn ensure_started(&self) -> Result<u16, ChannelError> {
        let mut server = self.server.lock().await;
        if let Some(state) = server.as_ref() {
            return Ok(state.port);
        }

        let preferred = match (&self.ports, self.explicit_port) {
            (_, Some(port)) => port,
            (Some(ports), None) => ports.resolve(None).await.bind_port(),
            (None, None) => branding::DEFAULT_OAUTH_CALLBACK_PORT,
        };

        let listener = match TcpListener::bind(("127.0.0.1", preferred)).await {
            Ok(listener) => listener,
            Err(e) if preferred != 0 => {
                info!(
                    "[Channel] Port {} unavailable ({}), using a dynamic port",
                    preferred, e
                );
                TcpListener::bind(("127.0.0.1", 0)).await?
            }
            Err(e) => return Err(e.into()),
        };
        let port = listener.local_addr()?.port();

        if let Some(ports) = &self.ports {
            ports.remember(port).await;
        }

        let origin = branding::loopback_origin(port);
        *self.registry.origin.write() = Some(origin.clone());

        let app = Router::new()
            .route(
                branding::OAUTH_CALLBACK_PATH,
                get(|| async { Html(bridge_page()) }),
            )
            .route(branding::OAUTH_MESSAGE_PATH, post(receive_message))
            .with_state(self.registry.clone());

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await });
            if let Err(e) = serve.await {
                error!("[Channel] Loopback listener error: {}", e);
            }
        });

        info!("[Channel] Listening on {}", origin);
        *server = Some(ServerState {
            port,
            shutdown: Some(shutdown),
        });
        Ok(port)
    }

    /// The application origin, once the listener is up.
    pub fn origin(&self) -> Option<String> {
        self.registry.origin.read().clone()
    }

    pub fn redirect_uri(&self) -> Option<String> {
        self.origin()
            .map(|origin| format!("{}{}", origin, branding::OAUTH_CALLBACK_PATH))
    }

    /// Register a handler for recognized, same-origin flow messages.
    pub fn on_flow_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(FlowOutcome) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
        self.registry.handlers.insert(id, Arc::new(handler));
        trace!(subscription = id, "[Channel] Subscribed");
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.handlers.len()
    }

    /// Feed a raw message into the channel as if it had been posted.
    ///
    /// Returns whether it reached at least one handler.
    pub fn deliver(&self, origin: Option<&str>, body: &[u8]) -> bool {
        self.registry.deliver(origin, body)
    }

    pub async fn shutdown(&self) {
        if let Some(state) = self.server.lock().await.take() {
            if let Some(token) = state.shutdown {
                token.cancel();
            }
            info!("[Channel] Loopback listener stopped");
        }
    }
}

async fn receive_message(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    registry.deliver(origin, &body);
    StatusCode::NO_CONTENT
}
