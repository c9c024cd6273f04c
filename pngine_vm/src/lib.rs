//! Replay for pngine payloads.
//!
//! The compiler (the `pngine` crate) turns a declarative GPU-pipeline
//! description into a bytecode [`Module`]; this crate walks that bytecode
//! and drives a GPU through it. The [`Dispatcher`] is generic over a
//! [`Backend`] — the fixed capability set of `pngine_bytecode`'s opcode
//! table — so the same payload replays against WebGPU in a browser,
//! wgpu-native on desktop, or a recording mock in a test, and a backend
//! missing a capability simply does not compile.
//!
//! A host's frame loop looks like:
//!
//! ```ignore
//! let mut dispatcher = Dispatcher::new(&module, backend, size, PluginSet(0xFF))?;
//! dispatcher.run_init()?;
//! loop {
//!     dispatcher.run_frame(FrameTime { total, delta })?;
//!     // present, advance the clock, repeat
//! }
//! ```

pub mod backend;
pub mod dispatch;

pub use self::backend::{
    Attachment, Backend, BindGroupBinding, ComputePipelineArgs, PipelineRef, RenderPipelineArgs,
    ResolvedPipelineLayout, WasmOutput,
};
pub use self::dispatch::{
    DispatchError, Dispatcher, FrameOutcome, FrameTime, Step, SurfaceSize, MAX_OPCODES,
};
pub use pngine_bytecode as bytecode;
pub use pngine_bytecode::{Module, PluginSet};
