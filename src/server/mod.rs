//! Prediction Server Module
//!
//! HTTP surface for the model: health and readiness probes, predictions,
//! runtime stats, and static serving of the model artifacts.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::model::{ExecutionMode, ModelLoader, OnnxBackend, DEFAULT_ARTIFACT_PATH};
use crate::pipeline::open_store;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_version: String,
    /// Base address the loader fetches the artifact from; `None` means this server
    pub model_base_url: Option<String>,
    pub model_artifact: String,
    /// Directory served under `/model`
    pub model_dir: Option<String>,
    pub persist_url: Option<String>,
    pub persist_timeout_ms: u64,
    pub execution_mode: ExecutionMode,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_execution_mode(raw: Option<&str>) -> ExecutionMode {
    match raw.map(str::parse::<ExecutionMode>) {
        Some(Ok(mode)) => mode,
        Some(Err(e)) => {
            let fallback = ExecutionMode::default();
            warn!(error = %e, fallback = %fallback, "Ignoring EXECUTION_MODE");
            fallback
        }
        None => ExecutionMode::default(),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3002),
            model_version: std::env::var("MODEL_VERSION").unwrap_or_else(|_| "v1.0".to_string()),
            model_base_url: env_opt("MODEL_BASE_URL"),
            model_artifact: std::env::var("MODEL_ARTIFACT")
                .unwrap_or_else(|_| DEFAULT_ARTIFACT_PATH.to_string()),
            model_dir: Some(std::env::var("MODEL_DIR").unwrap_or_else(|_| "./model".to_string())),
            persist_url: env_opt("PERSIST_URL"),
            persist_timeout_ms: std::env::var("PERSIST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
            execution_mode: parse_execution_mode(env_opt("EXECUTION_MODE").as_deref()),
        }
    }
}

impl ServerConfig {
    /// Where the loader fetches from, given the address actually bound.
    ///
    /// A wildcard bind is reached through loopback of the same family.
    pub fn serving_base(&self, bound: SocketAddr) -> String {
        if let Some(base) = &self.model_base_url {
            return base.clone();
        }
        let ip = match bound.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!("http://{}", SocketAddr::new(ip, bound.port()))
    }
}

async fn shutdown_signal(start_time: chrono::DateTime<chrono::Utc>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    let uptime = chrono::Utc::now().signed_duration_since(start_time);
    info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
}

/// Bind the configured address and serve until ctrl-c.
///
/// Probes answer while the model loads. A load failure stops the server and
/// is returned so the process exits non-zero.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();

    let store = open_store(config.persist_url.as_deref())?;
    // Resolves names and takes bare IPv6 literals such as "::"
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let state = Arc::new(AppState::new(config, store));

    serve(state, listener, shutdown_signal(start_time)).await?;
    info!("Server shut down cleanly");
    Ok(())
}

/// Serve `state` on `listener`, then load the model through it
pub async fn serve<F>(state: Arc<AppState>, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let config = state.config.clone();
    let app = create_router(Arc::clone(&state), &config);

    let bound = listener.local_addr()?;
    info!(
        address = %bound,
        model_version = %config.model_version,
        execution_mode = %config.execution_mode,
        pid = std::process::id(),
        "Prediction service listening"
    );

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    });

    let backend = Arc::new(OnnxBackend::new(config.execution_mode));
    let loader = ModelLoader::new(backend, Arc::clone(state.registry()))
        .with_artifact_path(config.model_artifact.clone());
    if let Err(e) = loader.initialize(&config.serving_base(bound)).await {
        error!(error = %e, "Model initialization failed, shutting down");
        server.abort();
        return Err(e.into());
    }

    server.await??;
    Ok(())
}
