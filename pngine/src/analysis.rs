//! The analyzer's output: every resource resolved to dense ids and typed
//! values, ready for the emitter to serialize. Nothing in here refers
//! back to the AST — once an [`Analysis`] exists the tree can be dropped.

use pngine_bytecode::plugin::PluginSet;
use pngine_bytecode::wire::{
    BufferUsages, EndBehavior, IndexFormat, LoadOp, StoreOp, TextureDimension, TextureFormat,
    TextureUsages,
};
use pngine_bytecode::{
    BindingLayout, ColorTarget, DepthStencilState, PrimitiveState, SamplerDescriptor,
    TextureViewDesc, VertexBufferLayout,
};

use crate::symbol::Symbols;

/// Everything the emitter needs, indexed by the dense per-kind ids the
/// symbol tables assigned.
#[derive(Debug, Default)]
pub struct Analysis {
    pub symbols: Symbols,
    pub plugins: PluginSet,
    pub shaders: Vec<ShaderInfo>,
    pub buffers: Vec<BufferInfo>,
    pub textures: Vec<TextureInfo>,
    pub views: Vec<ViewInfo>,
    pub samplers: Vec<SamplerDescriptor>,
    pub bind_group_layouts: Vec<Vec<BindingLayout>>,
    pub pipeline_layouts: Vec<Vec<u16>>,
    pub bind_groups: Vec<BindGroupInfo>,
    pub render_pipelines: Vec<RenderPipelineInfo>,
    pub compute_pipelines: Vec<ComputePipelineInfo>,
    pub render_passes: Vec<RenderPassInfo>,
    pub compute_passes: Vec<ComputePassInfo>,
    pub bundles: Vec<PassBody>,
    pub datas: Vec<DataInfo>,
    pub queues: Vec<QueueOp>,
    pub bitmaps: Vec<BitmapInfo>,
    pub inits: Vec<InitInfo>,
    pub frames: Vec<FrameInfo>,
    pub wasm_modules: Vec<u16>,
    pub wasm_calls: Vec<WasmCallInfo>,
    pub animation: Option<AnimationInfo>,
}

#[derive(Clone, Debug, Default)]
pub struct ShaderInfo {
    pub code: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BufferInfo {
    pub size: u32,
    pub usage: BufferUsages,
    /// `#data` block whose bytes initialize the buffer.
    pub data: Option<u16>,
}

#[derive(Clone, Debug)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: TextureFormat,
    pub usage: TextureUsages,
    pub dimension: TextureDimension,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub view_formats: Vec<TextureFormat>,
    /// `#imageBitmap` providing the initial texels.
    pub source: Option<u16>,
}

impl Default for TextureInfo {
    fn default() -> Self {
        TextureInfo {
            width: 1,
            height: 1,
            depth: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING.union(TextureUsages::COPY_DST),
            dimension: TextureDimension::D2,
            mip_level_count: 1,
            sample_count: 1,
            view_formats: Vec::new(),
            source: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ViewInfo {
    pub texture: u16,
    pub view: TextureViewDesc,
}

#[derive(Clone, Debug, Default)]
pub struct BindGroupInfo {
    pub layout: u16,
    pub entries: Vec<BindGroupEntryInfo>,
}

#[derive(Clone, Copy, Debug)]
pub enum BindGroupEntryInfo {
    Buffer {
        binding: u8,
        buffer: u16,
        offset: u32,
        size: u32,
    },
    Sampler {
        binding: u8,
        sampler: u16,
    },
    /// References a `#textureView` resource; the emitter embeds the view
    /// description inline since views have no create opcode.
    View {
        binding: u8,
        view: u16,
    },
}

#[derive(Clone, Debug)]
pub struct RenderPipelineInfo {
    /// `None` is `layout=auto`.
    pub layout: Option<u16>,
    pub vertex_module: u16,
    pub vertex_entry: String,
    pub fragment: Option<(u16, String)>,
    pub targets: Vec<ColorTarget>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
}

impl Default for RenderPipelineInfo {
    fn default() -> Self {
        RenderPipelineInfo {
            layout: None,
            vertex_module: 0,
            vertex_entry: String::new(),
            fragment: None,
            targets: Vec::new(),
            vertex_buffers: Vec::new(),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ComputePipelineInfo {
    pub layout: Option<u16>,
    pub module: u16,
    pub entry: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DrawCmd {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DrawIndexedCmd {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// The command body shared by render passes and render bundles.
#[derive(Clone, Debug, Default)]
pub struct PassBody {
    pub pipeline: Option<u16>,
    pub bind_groups: Vec<u16>,
    pub vertex_buffers: Vec<u16>,
    pub index_buffer: Option<(u16, IndexFormat)>,
    pub draw: Option<DrawCmd>,
    pub draw_indexed: Option<DrawIndexedCmd>,
    pub bundles: Vec<u16>,
}

/// What a render pass draws into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentTarget {
    /// The host-managed surface (`contextCurrentTexture`).
    Surface,
    Texture(u16),
}

#[derive(Clone, Debug)]
pub struct RenderPassInfo {
    pub color: AttachmentTarget,
    pub load: LoadOp,
    pub store: StoreOp,
    pub depth: Option<u16>,
    pub body: PassBody,
}

impl Default for RenderPassInfo {
    fn default() -> Self {
        RenderPassInfo {
            color: AttachmentTarget::Surface,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            depth: None,
            body: PassBody::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ComputePassInfo {
    pub pipeline: Option<u16>,
    pub bind_groups: Vec<u16>,
    pub dispatch: [u32; 3],
}

#[derive(Clone, Debug, Default)]
pub struct DataInfo {
    pub bytes: Vec<u8>,
}

#[derive(Clone, Copy, Debug)]
pub enum QueueOp {
    Write {
        buffer: u16,
        offset: u32,
        data: u16,
    },
    Copy {
        src: u16,
        src_off: u32,
        dst: u16,
        dst_off: u32,
        size: u32,
    },
}

impl Default for QueueOp {
    fn default() -> Self {
        QueueOp::Copy {
            src: 0,
            src_off: 0,
            dst: 0,
            dst_off: 0,
            size: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BitmapInfo {
    pub bytes: Vec<u8>,
}

/// The four runtime values a `params` slot may name, with the canonical
/// slot each is pinned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeValue {
    TimeTotal,
    TimeDelta,
    CanvasWidth,
    CanvasHeight,
}

impl RuntimeValue {
    pub fn canonical_slot(self) -> usize {
        match self {
            RuntimeValue::TimeTotal => 0,
            RuntimeValue::TimeDelta => 1,
            RuntimeValue::CanvasWidth => 2,
            RuntimeValue::CanvasHeight => 3,
        }
    }

    pub fn from_dotted(path: &str) -> Option<RuntimeValue> {
        match path {
            "time.total" => Some(RuntimeValue::TimeTotal),
            "time.delta" => Some(RuntimeValue::TimeDelta),
            "canvas.width" => Some(RuntimeValue::CanvasWidth),
            "canvas.height" => Some(RuntimeValue::CanvasHeight),
        _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamField {
    Literal(u32),
    Runtime(RuntimeValue),
}

impl Default for ParamField {
    fn default() -> Self {
        ParamField::Literal(0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InitParams {
    /// The compiler-allocated 16-byte uniform buffer.
    pub buffer: u16,
    pub fields: [ParamField; 4],
}

/// One `#init` operation, lowered to the synthetic resources it runs on.
#[derive(Clone, Copy, Debug, Default)]
pub struct InitInfo {
    pub pipeline: u16,
    pub bind_group: u16,
    pub params: Option<InitParams>,
    pub dispatch: [u32; 3],
}

/// What one frame entry performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerformRef {
    RenderPass(u16),
    ComputePass(u16),
    Queue(u16),
    WasmCall(u16),
}

#[derive(Clone, Debug, Default)]
pub struct FrameInfo {
    /// Runs once, before the first per-frame submission.
    pub init: Vec<PerformRef>,
    pub perform: Vec<PerformRef>,
}

#[derive(Clone, Debug, Default)]
pub struct WasmCallInfo {
    /// Index into [`Analysis::wasm_modules`].
    pub module: u16,
    pub func: String,
    pub args: Vec<u32>,
    /// `(buffer, offset, length)` receiving the call's result.
    pub output: Option<(u16, u32, u32)>,
}

#[derive(Clone, Debug, Default)]
pub struct AnimationInfo {
    /// `(frame, start, end)` per scene, in declaration order.
    pub scenes: Vec<(u16, f32, f32)>,
    pub end_behavior: EndBehavior,
}
