//! Pretrained weight loading by layer name.
//!
//! A [`WeightSet`] maps PyTorch-style parameter names (`conv1.weight`,
//! `layer2.0.downsample.1.running_var`, ...) to tensor data. Loading walks
//! the model, takes every entry that names an existing parameter with the
//! same shape, and reports everything else as skipped.

use std::collections::{BTreeSet, HashMap};

use burn::module::{Param, RunningState};
use burn::nn::conv::Conv2d;
use burn::nn::BatchNorm;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use stn_core::{Result, StnError};

/// Named tensors from an external checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightSet {
    tensors: HashMap<String, TensorData>,
}

impl WeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tensor under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, data: TensorData) {
        self.tensors.insert(name.into(), data);
    }

    /// Insert `f32` values with the given shape.
    ///
    /// Fails with [`StnError::ShapeMismatch`] when the number of values does
    /// not match the element count of `shape`.
    pub fn insert_floats(
        &mut self,
        name: impl Into<String>,
        values: Vec<f32>,
        shape: impl Into<Vec<usize>>,
    ) -> Result<()> {
        let shape = shape.into();
        let numel: usize = shape.iter().product();
        if values.len() != numel {
            return Err(StnError::shape_mismatch([numel], [values.len()]));
        }
        self.insert(name, TensorData::new(values, shape));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }
}

/// Outcome of applying a [`WeightSet`] to a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Keys copied into the model.
    pub applied: Vec<String>,
    /// Keys with no matching parameter, or whose shape differs.
    pub skipped: Vec<String>,
}

/// Tracks which entries of a [`WeightSet`] were consumed while visiting
/// the layers of a model.
pub(crate) struct WeightLoader<'a> {
    weights: &'a WeightSet,
    applied: BTreeSet<String>,
}

impl<'a> WeightLoader<'a> {
    pub(crate) fn new(weights: &'a WeightSet) -> Self {
        Self {
            weights,
            applied: BTreeSet::new(),
        }
    }

    /// Fetch `key` if present with shape `expected`.
    fn take<B: Backend, const D: usize>(
        &mut self,
        key: &str,
        expected: [usize; D],
        device: &B::Device,
    ) -> Option<Tensor<B, D>> {
        let data = self.weights.get(key)?;
        if data.shape.as_slice() != expected.as_slice() {
            tracing::warn!(
                "Skipping weight {}: shape {:?} does not match {:?}",
                key,
                data.shape,
                expected
            );
            return None;
        }
        self.applied.insert(key.to_string());
        Some(Tensor::from_data(data.clone().convert::<B::FloatElem>(), device))
    }

    fn param<B: Backend, const D: usize>(&mut self, param: Param<Tensor<B, D>>, key: &str) -> Param<Tensor<B, D>> {
        let current = param.val();
        match self.take::<B, D>(key, current.dims(), &current.device()) {
            Some(tensor) => Param::from_tensor(tensor),
            None => param,
        }
    }

    fn running<B: Backend>(&mut self, state: RunningState<Tensor<B, 1>>, key: &str) -> RunningState<Tensor<B, 1>> {
        let current = state.value();
        match self.take::<B, 1>(key, current.dims(), &current.device()) {
            Some(tensor) => RunningState::new(tensor),
            None => state,
        }
    }

    pub(crate) fn conv2d<B: Backend>(&mut self, mut conv: Conv2d<B>, prefix: &str) -> Conv2d<B> {
        conv.weight = self.param(conv.weight, &format!("{prefix}.weight"));
        conv.bias = conv.bias.map(|bias| self.param(bias, &format!("{prefix}.bias")));
        conv
    }

    pub(crate) fn batch_norm<B: Backend, const D: usize>(&mut self, mut bn: BatchNorm<B, D>, prefix: &str) -> BatchNorm<B, D> {
        bn.gamma = self.param(bn.gamma, &format!("{prefix}.weight"));
        bn.beta = self.param(bn.beta, &format!("{prefix}.bias"));
        bn.running_mean = self.running(bn.running_mean, &format!("{prefix}.running_mean"));
        bn.running_var = self.running(bn.running_var, &format!("{prefix}.running_var"));
        bn
    }

    pub(crate) fn finish(self) -> LoadReport {
        let mut skipped: Vec<String> = self
            .weights
            .names()
            .filter(|name| !self.applied.contains(*name))
            .map(str::to_string)
            .collect();
        skipped.sort();

        LoadReport {
            applied: self.applied.into_iter().collect(),
            skipped,
        }
    }
}
