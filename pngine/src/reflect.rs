//! The shader reflection interface.
//!
//! WGSL source is opaque to the compiler, but `#init` auto-binding,
//! `size=<shader>.<var>` auto-sizing and dispatch-count calculation all
//! need to know what a shader declares. That knowledge comes from an
//! external reflector behind this narrow trait; tests substitute a stub,
//! hosts plug in whatever implementation they have.

use std::collections::HashMap;
use thiserror::Error;

/// The reflector failed on a shader.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("error[E307]: shader reflection failed: {0}")]
pub struct ReflectError(pub String);

/// Provides reflection data for a WGSL source.
pub trait Reflect {
    fn reflect(&self, wgsl: &str) -> Result<ShaderReflection, ReflectError>;
}

/// Everything the compiler wants to know about one shader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderReflection {
    /// Every `@group/@binding` declaration.
    pub bindings: Vec<BindingInfo>,
    /// Struct layouts by type name.
    pub structs: HashMap<String, StructLayout>,
    pub entry_points: Vec<EntryPoint>,
}

impl ShaderReflection {
    /// Find a binding by its variable name.
    pub fn binding(&self, name: &str) -> Option<&BindingInfo> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// The first entry point of the given stage.
    pub fn entry_point(&self, stage: ShaderStage) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|e| e.stage == stage)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindingInfo {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub address_space: AddressSpace,
    pub layout: TypeLayout,
    /// Present when the binding is an array.
    pub array: Option<ArrayInfo>,
}

impl BindingInfo {
    /// The byte size a buffer bound here must have: array count × stride,
    /// or the plain type size.
    pub fn byte_size(&self) -> u32 {
        match &self.array {
            Some(array) => array.element_count * array.element_stride,
            None => self.layout.size,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSpace {
    Uniform,
    Storage,
    ReadOnlyStorage,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeLayout {
    pub size: u32,
    pub alignment: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrayInfo {
    pub element_count: u32,
    pub element_stride: u32,
    pub element_type: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructLayout {
    pub size: u32,
    pub alignment: u32,
    pub fields: Vec<(String, TypeLayout)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
    pub workgroup_size: [u32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// A reflector for sources that never reach for reflection; any actual
/// call is an error naming the missing collaborator.
#[derive(Debug, Default)]
pub struct NoReflection;

impl Reflect for NoReflection {
    fn reflect(&self, _wgsl: &str) -> Result<ShaderReflection, ReflectError> {
        Err(ReflectError(
            "no reflector was configured for this compile".to_string(),
        ))
    }
}
