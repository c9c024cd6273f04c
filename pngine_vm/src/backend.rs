//! The backend capability set.
//!
//! The dispatcher is generic over one [`Backend`] implementor with an
//! associated handle type per resource kind and one method per opcode
//! group. Implementing the trait *is* the capability check: a backend
//! missing a method does not compile, so no payload can reach a hole at
//! run time. Handles are whatever the backend wants them to be — wgpu
//! objects, JS indices, or plain records in a test mock.
//!
//! Methods receive decoded, typed descriptors; offsets into the data
//! section never cross this boundary.

use pngine_bytecode::wire::{BufferUsages, IndexFormat, LoadOp, StoreOp};
use pngine_bytecode::{
    BindGroupLayoutDescriptor, RenderPipelineDescriptor, SamplerDescriptor, TextureDescriptor,
};

/// A pipeline layout resolved to its full bind-group-layout records.
///
/// Layouts have no create opcodes, so backends receive them inline and
/// may cache by `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPipelineLayout {
    pub id: u16,
    pub bind_group_layouts: Vec<BindGroupLayoutDescriptor>,
}

/// Everything a backend needs to build a render pipeline.
pub struct RenderPipelineArgs<'a, B: Backend + ?Sized> {
    pub descriptor: &'a RenderPipelineDescriptor,
    /// `None` is `layout=auto`: derive the layout from the shader.
    pub layout: Option<&'a ResolvedPipelineLayout>,
    pub vertex_module: &'a B::ShaderModule,
    pub fragment_module: Option<&'a B::ShaderModule>,
}

/// Everything a backend needs to build a compute pipeline.
pub struct ComputePipelineArgs<'a, B: Backend + ?Sized> {
    pub layout: Option<&'a ResolvedPipelineLayout>,
    pub module: &'a B::ShaderModule,
    pub entry: &'a str,
}

/// One resolved bind-group slot.
pub enum BindGroupBinding<'a, B: Backend + ?Sized> {
    Buffer {
        binding: u8,
        buffer: &'a B::Buffer,
        offset: u32,
        /// 0 binds the whole buffer.
        size: u32,
    },
    Sampler {
        binding: u8,
        sampler: &'a B::Sampler,
    },
    TextureView {
        binding: u8,
        texture: &'a B::Texture,
        view: pngine_bytecode::TextureViewDesc,
    },
}

/// A render-pass color target: the host surface or an offscreen texture.
pub enum Attachment<'a, B: Backend + ?Sized> {
    Surface,
    Texture(&'a B::Texture),
}

/// The pipeline being bound, matching the active pass kind.
pub enum PipelineRef<'a, B: Backend + ?Sized> {
    Render(&'a B::RenderPipeline),
    Compute(&'a B::ComputePipeline),
}

/// Destination of a wasm call's return bytes.
pub struct WasmOutput<'a, B: Backend + ?Sized> {
    pub buffer: &'a B::Buffer,
    pub offset: u32,
    pub length: u32,
}

/// The fixed GPU capability set a replay target must provide.
pub trait Backend {
    type Buffer;
    type Texture;
    type Sampler;
    type ShaderModule;
    type BindGroup;
    type RenderPipeline;
    type ComputePipeline;
    type WasmModule;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create_buffer(
        &mut self,
        id: u16,
        size: u32,
        usage: BufferUsages,
    ) -> Result<Self::Buffer, Self::Error>;

    /// `init_data` carries encoded image bytes (the `#imageBitmap` path)
    /// the backend decodes and uploads at creation.
    fn create_texture(
        &mut self,
        id: u16,
        descriptor: &TextureDescriptor,
        init_data: Option<&[u8]>,
    ) -> Result<Self::Texture, Self::Error>;

    fn create_sampler(
        &mut self,
        id: u16,
        descriptor: &SamplerDescriptor,
    ) -> Result<Self::Sampler, Self::Error>;

    fn create_shader_module(&mut self, id: u16, wgsl: &str)
        -> Result<Self::ShaderModule, Self::Error>;

    fn create_render_pipeline(
        &mut self,
        id: u16,
        args: RenderPipelineArgs<'_, Self>,
    ) -> Result<Self::RenderPipeline, Self::Error>;

    fn create_compute_pipeline(
        &mut self,
        id: u16,
        args: ComputePipelineArgs<'_, Self>,
    ) -> Result<Self::ComputePipeline, Self::Error>;

    fn create_bind_group(
        &mut self,
        id: u16,
        layout: &BindGroupLayoutDescriptor,
        bindings: &[BindGroupBinding<'_, Self>],
    ) -> Result<Self::BindGroup, Self::Error>;

    fn begin_render_pass(
        &mut self,
        color: Attachment<'_, Self>,
        load: LoadOp,
        store: StoreOp,
        depth: Option<&Self::Texture>,
    ) -> Result<(), Self::Error>;

    fn begin_compute_pass(&mut self) -> Result<(), Self::Error>;

    fn set_pipeline(&mut self, pipeline: PipelineRef<'_, Self>) -> Result<(), Self::Error>;

    fn set_bind_group(&mut self, slot: u8, group: &Self::BindGroup) -> Result<(), Self::Error>;

    fn set_vertex_buffer(&mut self, slot: u8, buffer: &Self::Buffer) -> Result<(), Self::Error>;

    fn set_index_buffer(
        &mut self,
        buffer: &Self::Buffer,
        format: IndexFormat,
    ) -> Result<(), Self::Error>;

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), Self::Error>;

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<(), Self::Error>;

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), Self::Error>;

    fn end_pass(&mut self) -> Result<(), Self::Error>;

    fn write_buffer(
        &mut self,
        buffer: &Self::Buffer,
        offset: u32,
        data: &[u8],
    ) -> Result<(), Self::Error>;

    fn copy_buffer(
        &mut self,
        src: &Self::Buffer,
        src_offset: u32,
        dst: &Self::Buffer,
        dst_offset: u32,
        size: u32,
    ) -> Result<(), Self::Error>;

    fn submit(&mut self) -> Result<(), Self::Error>;

    fn init_wasm_module(&mut self, id: u16, bytes: &[u8]) -> Result<Self::WasmModule, Self::Error>;

    fn call_wasm_func(
        &mut self,
        module: &Self::WasmModule,
        name: &str,
        args: &[u32],
        output: Option<WasmOutput<'_, Self>>,
    ) -> Result<(), Self::Error>;
}
