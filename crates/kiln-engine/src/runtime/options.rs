//! Interpreter configuration

/// Limits that bound a single top-level invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum nested call depth
    pub max_call_depth: usize,

    /// Maximum instructions executed per top-level call (None = unlimited)
    pub max_step_budget: Option<u64>,

    /// Maximum evaluation stack depth of one frame
    pub max_stack_depth: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_step_budget: None,
            max_stack_depth: 1024,
        }
    }
}

impl ResourceLimits {
    /// Default limits with no step budget
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Default limits with a step budget
    pub fn with_step_budget(max_step_budget: u64) -> Self {
        Self {
            max_step_budget: Some(max_step_budget),
            ..Default::default()
        }
    }

    /// Default limits with a call depth limit
    pub fn with_call_depth(max_call_depth: usize) -> Self {
        Self {
            max_call_depth,
            ..Default::default()
        }
    }
}

/// Options for creating a [`Vm`](super::Vm)
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Resource limits
    pub limits: ResourceLimits,

    /// Run a type's initializer the first time the type is touched
    pub run_type_initializers: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            run_type_initializers: true,
        }
    }
}

impl VmOptions {
    /// Replace the limits
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}
