//! Backend-resident tensors with allocation accounting
//!
//! Every tensor is bound to the [`TensorMeter`] of the model that produced it.
//! Creation counts an allocation and `Drop` counts a release, so the live
//! count returns to its previous value on every exit path of an inference.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::error::Result;

/// Allocation counters for the tensors of one model
#[derive(Debug, Default)]
pub struct TensorMeter {
    allocated: AtomicU64,
    released: AtomicU64,
}

impl TensorMeter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Tensors allocated and not yet released
    pub fn live(&self) -> u64 {
        // Read released first so a concurrent drop can't make live go negative
        let released = self.released.load(Ordering::Acquire);
        self.allocated.load(Ordering::Acquire).saturating_sub(released)
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Acquire)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }
}

/// A dense f32 tensor owned by a model's backend
#[derive(Debug)]
pub struct Tensor {
    data: ArrayD<f32>,
    meter: Arc<TensorMeter>,
}

impl Tensor {
    pub fn new(meter: &Arc<TensorMeter>, data: ArrayD<f32>) -> Self {
        meter.allocated.fetch_add(1, Ordering::AcqRel);
        Self {
            data,
            meter: Arc::clone(meter),
        }
    }

    pub fn from_shape_vec(meter: &Arc<TensorMeter>, shape: &[usize], values: Vec<f32>) -> Result<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(meter, data))
    }

    pub fn zeros(meter: &Arc<TensorMeter>, shape: &[usize]) -> Self {
        Self::new(meter, ArrayD::zeros(IxDyn(shape)))
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    /// The element at `[0][0]` of a rank-2 tensor.
    ///
    /// Returns `None` for any other rank or an empty axis.
    pub fn first_scalar(&self) -> Option<f32> {
        if self.data.ndim() != 2 {
            return None;
        }
        self.data.get(&[0usize, 0][..]).copied()
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        self.meter.released.fetch_add(1, Ordering::AcqRel);
    }
}
