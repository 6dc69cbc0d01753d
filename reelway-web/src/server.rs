//! Loopback range server
//!
//! Serves whichever file is currently bound at `GET /`. The binding is
//! swapped wholesale by the session manager through [`StreamBinder`]; request
//! handlers clone it out and never hold the lock while waiting or reading.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use parking_lot::RwLock;
use reelway_core::config::ServerConfig;
use reelway_core::session::{FileBinding, StreamBinder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::stream_bound_file;

/// State shared by request handlers.
pub struct ServerState {
    pub(crate) config: ServerConfig,
    binding: RwLock<Option<Arc<FileBinding>>>,
}

impl ServerState {
    /// The file currently being served, if any.
    pub fn current_binding(&self) -> Option<Arc<FileBinding>> {
        self.binding.read().clone()
    }
}

/// Range server and binding target for the session manager.
///
/// Clones share the same binding.
#[derive(Clone)]
pub struct RangeServer {
    state: Arc<ServerState>,
}

impl RangeServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: Arc::new(ServerState {
                config,
                binding: RwLock::new(None),
            }),
        }
    }

    pub fn current_binding(&self) -> Option<Arc<FileBinding>> {
        self.state.current_binding()
    }

    /// Router serving the bound file at `/`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(stream_bound_file))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Binds the loopback listener and serves until shut down.
    ///
    /// # Errors
    /// - `std::io::Error` - The port could not be bound
    pub async fn spawn(&self) -> Result<RunningServer, std::io::Error> {
        let requested = SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::LOCALHOST,
            self.state.config.port,
        ));
        let listener = TcpListener::bind(requested).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("Range server listening on http://{}/", addr);
        Ok(RunningServer {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

impl StreamBinder for RangeServer {
    fn bind(&self, binding: FileBinding) {
        info!(
            "Binding {} ({} bytes)",
            binding.path.display(),
            binding.total_size
        );
        *self.state.binding.write() = Some(Arc::new(binding));
    }

    fn unbind(&self) {
        if self.state.binding.write().take().is_some() {
            info!("Unbound stream");
        }
    }
}

/// A listening server task.
pub struct RunningServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL to hand to the player.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Stops accepting connections and waits for in-flight requests.
    ///
    /// # Errors
    /// - `std::io::Error` - The server task failed
    pub async fn shutdown(mut self) -> Result<(), std::io::Error> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Range server task ended abnormally: {}", e);
                Err(std::io::Error::other(e))
            }
        }
    }
}
