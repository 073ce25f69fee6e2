//! Execution context threaded through a forward pass.
//!
//! The context carries the execution mode and decides on which device the
//! diagnostic reconstruction path runs. The classification path always stays
//! on the device of its input.

use burn::tensor::backend::Backend;

/// Training or evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    Train,
    #[default]
    Eval,
}

/// Where diagnostic tensors are computed.
#[derive(Debug, Clone)]
pub enum DevicePolicy<B: Backend> {
    /// Same device as the main path.
    FollowInput,
    /// A fixed device, e.g. the host.
    Fixed(B::Device),
}

impl<B: Backend> DevicePolicy<B> {
    /// Resolve the policy against the device of the main path.
    pub fn resolve(&self, main: &B::Device) -> B::Device {
        match self {
            Self::FollowInput => main.clone(),
            Self::Fixed(device) => device.clone(),
        }
    }
}

/// Per-call execution settings.
#[derive(Debug, Clone)]
pub struct ExecutionContext<B: Backend> {
    /// Current execution mode.
    pub mode: ExecutionMode,
    /// Diagnostic device policy while training.
    pub train_diagnostics: DevicePolicy<B>,
    /// Diagnostic device policy while evaluating.
    pub eval_diagnostics: DevicePolicy<B>,
    /// Whether inverse reconstructions are produced at all.
    pub diagnostics: bool,
}

impl<B: Backend> Default for ExecutionContext<B> {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Eval,
            train_diagnostics: DevicePolicy::FollowInput,
            eval_diagnostics: DevicePolicy::Fixed(B::Device::default()),
            diagnostics: true,
        }
    }
}

impl<B: Backend> ExecutionContext<B> {
    /// Context in training mode with default device policies.
    pub fn train() -> Self {
        Self {
            mode: ExecutionMode::Train,
            ..Self::default()
        }
    }

    /// Context in evaluation mode with default device policies.
    pub fn eval() -> Self {
        Self::default()
    }

    /// Set the diagnostic device policy used in training mode.
    pub fn with_train_diagnostics(mut self, policy: DevicePolicy<B>) -> Self {
        self.train_diagnostics = policy;
        self
    }

    /// Set the diagnostic device policy used in evaluation mode.
    pub fn with_eval_diagnostics(mut self, policy: DevicePolicy<B>) -> Self {
        self.eval_diagnostics = policy;
        self
    }

    /// Skip inverse reconstruction entirely.
    pub fn without_diagnostics(mut self) -> Self {
        self.diagnostics = false;
        self
    }

    /// Device for the diagnostic path given the device of the main path.
    pub fn diagnostic_device(&self, main: &B::Device) -> B::Device {
        match self.mode {
            ExecutionMode::Train => self.train_diagnostics.resolve(main),
            ExecutionMode::Eval => self.eval_diagnostics.resolve(main),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_default_policies() {
        let main = NdArrayDevice::Cpu;
        let train = ExecutionContext::<TestBackend>::train();
        let eval = ExecutionContext::<TestBackend>::eval();

        assert_eq!(train.mode, ExecutionMode::Train);
        assert_eq!(eval.mode, ExecutionMode::Eval);
        assert!(matches!(train.train_diagnostics, DevicePolicy::FollowInput));
        assert!(matches!(eval.eval_diagnostics, DevicePolicy::Fixed(_)));
        assert_eq!(train.diagnostic_device(&main), main);
        assert_eq!(eval.diagnostic_device(&main), NdArrayDevice::default());
    }

    #[test]
    fn test_policy_selected_by_mode() {
        let main = NdArrayDevice::Cpu;
        let ctx = ExecutionContext::<TestBackend>::train()
            .with_train_diagnostics(DevicePolicy::Fixed(NdArrayDevice::Cpu))
            .with_eval_diagnostics(DevicePolicy::FollowInput);
        assert_eq!(ctx.diagnostic_device(&main), NdArrayDevice::Cpu);
        assert!(!ExecutionContext::<TestBackend>::eval().without_diagnostics().diagnostics);
    }
}
