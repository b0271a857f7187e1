//! One-shot model initialization
//!
//! `initialize` runs the full startup sequence: backend setup, artifact fetch,
//! shape introspection, warm-up, publish. Every failure is returned as
//! [`PredictError::Init`]; the registry stays unready unless all steps pass.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{info, warn};
use url::Url;

use crate::error::{PredictError, Result};
use crate::inference::run_forward;
use super::backend::{Backend, GraphModel};
use super::registry::{ModelRegistry, ServingModel};

/// Default artifact location relative to the serving base address
pub const DEFAULT_ARTIFACT_PATH: &str = "model/model.onnx";

/// Names and dimension derived from a graph's declared signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub input_name: String,
    pub output_name: String,
    pub input_dim: usize,
}

/// Read the first declared input and output.
///
/// Axis 0 of the input is the batch axis; the feature dimension is axis 1.
pub fn introspect(graph: &dyn GraphModel) -> Result<Signature> {
    let input = graph.inputs().first();
    let output = graph.outputs().first();

    let input_name = input.map(|i| i.name.clone()).filter(|n| !n.is_empty());
    let output_name = output.map(|o| o.name.clone()).filter(|n| !n.is_empty());
    let input_dim = input
        .and_then(|i| i.shape.get(1).copied().flatten())
        .filter(|d| *d > 0);

    info!(
        input_name = ?input_name,
        output_name = ?output_name,
        input_dim = ?input_dim,
        "Introspected model signature"
    );

    match (input_name, output_name, input_dim) {
        (Some(input_name), Some(output_name), Some(input_dim)) => Ok(Signature {
            input_name,
            output_name,
            input_dim,
        }),
        _ => Err(PredictError::Init(
            "could not detect inputName/outputName/inputDim".to_string(),
        )),
    }
}

/// Resolve the artifact URL under a serving base address.
///
/// Accepts `http(s)://` and `file://` URLs as well as absolute directory paths.
pub fn artifact_url(serving_base: &str, artifact_path: &str) -> Result<Url> {
    let mut base = match Url::parse(serving_base) {
        Ok(url) => url,
        Err(_) if Path::new(serving_base).is_absolute() => Url::from_directory_path(serving_base)
            .map_err(|_| PredictError::Config(format!("Invalid model base path: {}", serving_base)))?,
        Err(e) => {
            return Err(PredictError::Config(format!(
                "Invalid model base address '{}': {}",
                serving_base, e
            )))
        }
    };
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(artifact_path.trim_start_matches('/'))
        .map_err(|e| PredictError::Config(format!("Invalid artifact path '{}': {}", artifact_path, e)))
}

async fn fetch_artifact(client: &reqwest::Client, url: &Url) -> Result<Bytes> {
    match url.scheme() {
        "http" | "https" => {
            let response = client.get(url.clone()).send().await?.error_for_status()?;
            Ok(response.bytes().await?)
        }
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| PredictError::Config(format!("Invalid file URL: {}", url)))?;
            Ok(Bytes::from(tokio::fs::read(path).await?))
        }
        scheme => Err(PredictError::Config(format!(
            "Unsupported artifact scheme '{}'. Use http, https or file.",
            scheme
        ))),
    }
}

fn fatal(step: &str, err: PredictError) -> PredictError {
    match err {
        PredictError::Init(_) => err,
        other => PredictError::Init(format!("{}: {}", step, other)),
    }
}

/// Loads the model once and publishes it into the registry
pub struct ModelLoader {
    backend: Arc<dyn Backend>,
    registry: Arc<ModelRegistry>,
    artifact_path: String,
    client: reqwest::Client,
}

impl ModelLoader {
    pub fn new(backend: Arc<dyn Backend>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            backend,
            registry,
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub async fn initialize(&self, serving_base: &str) -> Result<Arc<ServingModel>> {
        if self.registry.is_ready() {
            return Err(PredictError::Init("model already initialized".to_string()));
        }

        self.backend
            .initialize()
            .await
            .map_err(|e| fatal("backend initialization", e))?;
        info!(backend = self.backend.name(), "Backend ready");

        let url = artifact_url(serving_base, &self.artifact_path).map_err(|e| fatal("artifact location", e))?;
        info!(url = %url, "Loading model");
        let artifact = fetch_artifact(&self.client, &url)
            .await
            .map_err(|e| fatal("artifact fetch", e))?;
        let graph = self
            .backend
            .load_graph(artifact)
            .await
            .map_err(|e| fatal("graph load", e))?;

        let signature = introspect(graph.as_ref())?;

        let zeros = vec![0.0_f32; signature.input_dim];
        let warmup_start = Instant::now();
        let outputs = run_forward(graph.as_ref(), &signature.input_name, signature.input_dim, &zeros)
            .await
            .map_err(|e| fatal("warm-up", e))?;
        drop(outputs);
        let live = graph.meter().live();
        if live != 0 {
            warn!(live_tensors = live, "Tensors still live after warm-up");
        }
        info!(
            warmup_ms = warmup_start.elapsed().as_millis() as u64,
            "Warm-up inference complete"
        );

        let model = ServingModel::new(
            self.registry.version(),
            graph,
            signature.input_name,
            signature.output_name,
            signature.input_dim,
        )?;
        let model = self.registry.publish(model)?;
        info!(version = model.version(), input_dim = model.input_dim(), "Model ready");
        Ok(model)
    }
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("backend", &self.backend.name())
            .field("artifact_path", &self.artifact_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{Behaviour, FakeBackend, FixedGraph};
    use crate::model::TensorSpec;
    use std::sync::atomic::Ordering;

    fn artifact_dir() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("model")).unwrap();
        std::fs::write(dir.path().join("model/model.onnx"), b"graph").unwrap();
        let base = Url::from_directory_path(dir.path()).unwrap().to_string();
        (dir, base)
    }

    fn loader(graph: Arc<FixedGraph>) -> (ModelLoader, Arc<ModelRegistry>) {
        let registry = Arc::new(ModelRegistry::new("v1.0"));
        let backend = Arc::new(FakeBackend::new(graph));
        (ModelLoader::new(backend, Arc::clone(&registry)), registry)
    }

    #[test]
    fn test_artifact_url() {
        let url = artifact_url("http://localhost:3002", DEFAULT_ARTIFACT_PATH).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3002/model/model.onnx");

        let url = artifact_url("http://host/svc", "/model/model.onnx").unwrap();
        assert_eq!(url.as_str(), "http://host/svc/model/model.onnx");

        let url = artifact_url("/srv/predict", DEFAULT_ARTIFACT_PATH).unwrap();
        assert_eq!(url.as_str(), "file:///srv/predict/model/model.onnx");

        assert!(artifact_url("not a url", DEFAULT_ARTIFACT_PATH).is_err());
    }

    #[tokio::test]
    async fn test_initialize_publishes_after_warmup() {
        let (_dir, base) = artifact_dir();
        let graph = FixedGraph::new(3, 1.0);
        let (loader, registry) = loader(graph.clone());

        let model = loader.initialize(&base).await.unwrap();
        assert_eq!(model.input_dim(), 3);
        assert_eq!(model.input_name(), "x");
        assert_eq!(model.output_name(), "y");
        assert!(registry.is_ready());
        assert_eq!(graph.calls.load(Ordering::SeqCst), 1);
        assert_eq!(graph.meter().live(), 0);
    }

    #[tokio::test]
    async fn test_missing_dimension_is_fatal() {
        let (_dir, base) = artifact_dir();
        let graph = FixedGraph::with_specs(
            vec![TensorSpec::new("x", vec![None, None])],
            vec![TensorSpec::new("y", vec![None, Some(1)])],
            Behaviour::Value(1.0),
            false,
        );
        let (loader, registry) = loader(graph.clone());

        let err = loader.initialize(&base).await.unwrap_err();
        assert!(matches!(err, PredictError::Init(_)));
        assert!(!registry.is_ready());
        assert_eq!(graph.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_output_is_fatal() {
        let (_dir, base) = artifact_dir();
        let graph = FixedGraph::with_specs(
            vec![TensorSpec::new("x", vec![None, Some(3)])],
            Vec::new(),
            Behaviour::Value(1.0),
            false,
        );
        let (loader, registry) = loader(graph);
        assert!(loader.initialize(&base).await.is_err());
        assert!(!registry.is_ready());
    }

    #[tokio::test]
    async fn test_warmup_failure_is_fatal() {
        let (_dir, base) = artifact_dir();
        let graph = FixedGraph::with(3, Behaviour::Fail, true);
        let (loader, registry) = loader(graph.clone());

        let err = loader.initialize(&base).await.unwrap_err();
        assert!(matches!(err, PredictError::Init(msg) if msg.starts_with("warm-up")));
        assert!(!registry.is_ready());
        assert_eq!(graph.meter().live(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_fatal() {
        let (_dir, base) = artifact_dir();
        let registry = Arc::new(ModelRegistry::new("v1.0"));
        let backend = Arc::new(FakeBackend::failing(FixedGraph::new(3, 1.0)));
        let loader = ModelLoader::new(backend, Arc::clone(&registry));
        assert!(matches!(loader.initialize(&base).await, Err(PredictError::Init(_))));
        assert!(!registry.is_ready());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let base = Url::from_directory_path(dir.path()).unwrap().to_string();
        let (loader, registry) = loader(FixedGraph::new(3, 1.0));
        let err = loader.initialize(&base).await.unwrap_err();
        assert!(matches!(err, PredictError::Init(msg) if msg.starts_with("artifact fetch")));
        assert!(!registry.is_ready());
    }

    /// Serve `dir` under `/model` on an ephemeral port
    async fn http_base(dir: &Path) -> String {
        let app = axum::Router::new().nest_service("/model", tower_http::services::ServeDir::new(dir));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_initialize_over_http() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
        let base = http_base(dir.path()).await;
        let (loader, registry) = loader(FixedGraph::new(3, 1.0));

        loader.initialize(&base).await.unwrap();
        assert!(registry.is_ready());
    }

    #[tokio::test]
    async fn test_http_not_found_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let base = http_base(dir.path()).await;
        let graph = FixedGraph::new(3, 1.0);
        let (loader, registry) = loader(graph.clone());

        let err = loader.initialize(&base).await.unwrap_err();
        assert!(matches!(err, PredictError::Init(ref msg) if msg.starts_with("artifact fetch")), "{}", err);
        assert!(err.to_string().contains("404"), "{}", err);
        assert!(!registry.is_ready());
        assert_eq!(graph.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_initialize_rejected() {
        let (_dir, base) = artifact_dir();
        let (loader, _registry) = loader(FixedGraph::new(3, 1.0));
        loader.initialize(&base).await.unwrap();
        assert!(loader.initialize(&base).await.is_err());
    }
}
