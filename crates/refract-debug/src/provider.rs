//! Uniform, system-value and texture bindings supplied by the host.

use std::sync::Arc;

use indexmap::IndexMap;
use refract_vm::{TextureSampler, Value};

/// Host-side source of the values a stage reads but does not compute.
///
/// Called once per [`prepare_stage`](crate::DebugSession::prepare_stage) for
/// every named uniform, storage buffer and anonymous-block member, and from
/// inside the VM for every texture fetch.
pub trait BindingProvider: Send + Sync {
    /// Current value of the uniform or system value called `name`.
    ///
    /// `None` leaves the variable zero-initialized.
    fn copy(&self, name: &str) -> Option<Value>;

    /// Sample the texture bound at `binding` at normalized `coord`.
    fn sample(&self, _binding: u32, _coord: &[f32], _lod: f32) -> [f32; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }

    /// Texel dimensions of the texture bound at `binding`.
    fn texture_size(&self, _binding: u32) -> [u32; 2] {
        [1, 1]
    }
}

/// Fixed name → value table.
#[derive(Debug, Clone, Default)]
pub struct StaticBindings {
    values: IndexMap<String, Value>,
    textures: IndexMap<u32, [f32; 4]>,
}

impl StaticBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `name`, replacing any previous value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Bind a texture that samples to `color` everywhere.
    pub fn with_solid_texture(mut self, binding: u32, color: [f32; 4]) -> Self {
        self.textures.insert(binding, color);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

impl BindingProvider for StaticBindings {
    fn copy(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn sample(&self, binding: u32, _coord: &[f32], _lod: f32) -> [f32; 4] {
        self.textures
            .get(&binding)
            .copied()
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }
}

/// Routes VM texture access to a [`BindingProvider`].
pub(crate) struct ProviderSampler(pub(crate) Arc<dyn BindingProvider>);

impl TextureSampler for ProviderSampler {
    fn sample(&self, binding: u32, coord: &[f32], lod: f32) -> [f32; 4] {
        self.0.sample(binding, coord, lod)
    }

    fn size(&self, binding: u32) -> [u32; 2] {
        self.0.texture_size(binding)
    }
}
