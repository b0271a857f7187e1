//! Numeric backend abstraction
//!
//! A [`Backend`] turns artifact bytes into a [`GraphModel`]. Forward execution
//! returns a [`Forward`], which is either already settled or still running;
//! callers `.await` it the same way in both cases.

use std::collections::HashMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;

use crate::error::{PredictError, Result};
use super::tensor::{Tensor, TensorMeter};

/// Declared graph input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorSpec {
    pub name: String,
    /// `None` marks a dynamic axis
    pub shape: Vec<Option<usize>>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: Vec<Option<usize>>) -> Self {
        Self { name: name.into(), shape }
    }
}

/// Outcome of a forward pass
pub enum Forward {
    /// Executed on the calling task
    Immediate(Result<Vec<Tensor>>),
    /// Executing elsewhere; resolves on completion
    Deferred(BoxFuture<'static, Result<Vec<Tensor>>>),
}

impl Forward {
    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Vec<Tensor>>> + Send + 'static,
    {
        Forward::Deferred(fut.boxed())
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Forward::Deferred(_))
    }
}

impl fmt::Debug for Forward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Forward::Immediate(r) => f.debug_tuple("Immediate").field(&r.is_ok()).finish(),
            Forward::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

impl IntoFuture for Forward {
    type Output = Result<Vec<Tensor>>;
    type IntoFuture = BoxFuture<'static, Result<Vec<Tensor>>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Forward::Immediate(outcome) => future::ready(outcome).boxed(),
            Forward::Deferred(fut) => fut,
        }
    }
}

/// A loaded, executable model graph.
///
/// `forward` must be safe to call while another invocation is still pending.
pub trait GraphModel: Send + Sync {
    fn inputs(&self) -> &[TensorSpec];

    fn outputs(&self) -> &[TensorSpec];

    /// Meter that every tensor for this graph is allocated against
    fn meter(&self) -> &Arc<TensorMeter>;

    /// Run the graph. Outputs are returned in declaration order.
    fn forward(&self, inputs: HashMap<String, Tensor>) -> Forward;
}

/// Numeric execution backend
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Select and initialize the execution device. Must precede `load_graph`.
    async fn initialize(&self) -> Result<()>;

    /// Parse a model artifact into an executable graph
    async fn load_graph(&self, artifact: Bytes) -> Result<Arc<dyn GraphModel>>;
}

/// Where forward passes run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// On the request task
    Inline,
    /// On tokio's blocking thread pool
    #[default]
    Blocking,
}

impl FromStr for ExecutionMode {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(ExecutionMode::Inline),
            "blocking" | "async" => Ok(ExecutionMode::Blocking),
            other => Err(PredictError::Config(format!(
                "Unknown execution mode '{}'. Use 'inline' or 'blocking'.",
                other
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Inline => f.write_str("inline"),
            ExecutionMode::Blocking => f.write_str("blocking"),
        }
    }
}
