//! The wire format shared by every part of the pngine toolchain.
//!
//! A compiled pngine payload is a self-describing binary: a fixed 32-byte
//! header, an optional embedded executor, an opcode stream and a data
//! section holding strings, shader sources, descriptor records and static
//! blobs. The compiler emits it, the VM replays it, and a host container
//! (a PNG ancillary chunk or a ZIP archive) carries it around — the
//! container itself is none of this crate's business.
//!
//! Everything that must agree bit-for-bit between the emitter and the
//! dispatcher lives here and **only** here: the opcode table and its
//! operand widths ([`Opcode`]), the closed enumerations with fixed wire
//! bytes ([`wire`]), the descriptor sub-encodings ([`descriptor`]), the
//! plugin bitfield ([`PluginSet`]) and the payload container itself
//! ([`Module`]). Duplicating any of these tag numbers elsewhere is how
//! silent descriptor mismatches happen; import them instead.

pub mod animation;
pub mod bytes;
pub mod descriptor;
pub mod instr;
pub mod module;
pub mod opcode;
pub mod plugin;
pub mod wire;

pub use self::animation::{AnimationTable, Scene};
pub use self::instr::{DecodeError, Instruction};
pub use self::descriptor::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindingLayout, ColorTarget,
    ComputePipelineDescriptor, DepthStencilState, DescriptorType, LayoutRef, PipelineLayout,
    PipelineLayoutDescriptor, PrimitiveState, RenderPipelineDescriptor, SamplerDescriptor,
    TextureDescriptor, TextureViewDesc, VertexAttribute, VertexBufferLayout, WireError,
    FIELD_SENTINEL,
};
pub use self::module::{Module, ModuleInfo, ValidateError};
pub use self::opcode::Opcode;
pub use self::plugin::PluginSet;

/// The four magic bytes opening every payload.
pub const MAGIC: [u8; 4] = *b"PNGB";

/// The format version this crate reads and writes.
///
/// Version 0 makes no backward compatibility promises; the field exists so
/// a shipping version can start making them.
pub const VERSION: u16 = 0;

/// Byte length of the fixed payload header.
pub const HEADER_LEN: usize = 32;

/// Inclusive cap on the opcode stream so a program counter fits in `u32`
/// with plenty of slack.
pub const MAX_BYTECODE_LEN: usize = 1 << 20;

/// Resource id naming the host-managed surface (canvas) texture.
pub const SURFACE_TEXTURE_ID: u16 = 0xFFFE;

/// Resource id meaning "no depth attachment".
pub const NO_DEPTH_ID: u16 = 0xFFFF;

/// Resource id meaning "no output buffer" on a wasm call.
pub const NO_BUFFER_ID: u16 = 0xFFFF;

/// Header flag: the payload carries an embedded executor section.
pub const FLAG_HAS_EXECUTOR: u16 = 1 << 0;

/// Header flag: the data section carries an animation scene table.
pub const FLAG_HAS_ANIMATION_TABLE: u16 = 1 << 1;
