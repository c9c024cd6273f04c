//! The dispatcher.
//!
//! A flat loop over the opcode stream: decode one instruction, check the
//! pass-state machine, look up the dense-id handle tables, invoke the
//! matching backend capability, advance. Tables are sized up front from
//! the counts `Module::validate` reports, so lookups are plain indexing
//! and a forward reference — already rejected at validation — would still
//! be caught as an empty slot.
//!
//! On any error the program counter stays on the faulting opcode; the
//! dispatcher remains usable for diagnostics but the run is over.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use pngine_bytecode::instr::{DecodeError, Instruction};
use pngine_bytecode::plugin::PluginSet;
use pngine_bytecode::wire::BufferUsages;
use pngine_bytecode::{
    AnimationTable, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    ComputePipelineDescriptor, LayoutRef, Module, ModuleInfo, PipelineLayout,
    PipelineLayoutDescriptor, RenderPipelineDescriptor, SamplerDescriptor, TextureDescriptor,
    ValidateError, WireError, NO_BUFFER_ID, NO_DEPTH_ID, SURFACE_TEXTURE_ID,
};
use thiserror::Error;

use crate::backend::{
    Attachment, Backend, BindGroupBinding, ComputePipelineArgs, PipelineRef, RenderPipelineArgs,
    ResolvedPipelineLayout, WasmOutput,
};

/// Upper bound on opcodes executed by one `run_*` call, so a pathological
/// payload cannot spin forever.
pub const MAX_OPCODES: u32 = 1_000_000;

/// Timing for one frame, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    pub total: f32,
    pub delta: f32,
}

/// The host surface dimensions, substituted into `canvas.*` params.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

/// What one `step` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// A `submit` executed; the current subsequence is complete.
    Submitted,
    /// The `end` opcode was reached.
    End,
}

/// What a `run_frame` call produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame subsequence ran to its `submit`.
    Submitted,
    /// No scene covers the given time (a gap, or `endBehavior=stop`).
    Idle,
}

/// The active pass while decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PassState {
    None,
    Render,
    Compute,
}

/// A replay failed. `Backend` wraps the backend's own error; everything
/// else is the dispatcher's.
#[derive(Debug, Error)]
pub enum DispatchError<E: std::error::Error + Send + Sync + 'static> {
    #[error("error[E601]: {opcode} is not legal in the current pass state at offset {offset}")]
    InvalidPassState { opcode: &'static str, offset: usize },
    #[error("error[E602]: unknown opcode byte 0x{byte:02X} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },
    #[error("error[E603]: {kind} id {id} is not materialized at offset {offset}")]
    UnknownResource {
        kind: &'static str,
        id: u16,
        offset: usize,
    },
    #[error("error[E604]: payload requires the {0} plugin which is not enabled")]
    PluginNotEnabled(&'static str),
    #[error("error[E605]: opcode budget of {MAX_OPCODES} exhausted")]
    OpcodeLimitExceeded,
    #[error("error[E606]: backend error: {0}")]
    Backend(#[source] E),
    #[error("{0}")]
    Validate(#[from] ValidateError),
    #[error("error[E606]: descriptor record is malformed: {0}")]
    Descriptor(#[from] WireError),
}

impl<E: std::error::Error + Send + Sync + 'static> From<DecodeError> for DispatchError<E> {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownOpcode { byte, offset } => {
                DispatchError::UnknownOpcode { byte, offset }
            }
            other => DispatchError::Validate(other.into()),
        }
    }
}

/// Replays one module against one backend.
pub struct Dispatcher<'m, B: Backend> {
    module: &'m Module,
    backend: B,
    info: ModuleInfo,
    animation: Option<AnimationTable>,
    surface: SurfaceSize,
    time: FrameTime,
    pass: PassState,
    pc: usize,
    /// Start of the per-frame section, learned during `run_init`.
    frame_start: Option<usize>,
    /// Offset of the first pass-opening opcode ever executed; the
    /// fallback frame start when initialization consumed the only frame.
    first_pass_pc: Option<usize>,
    buffers: Vec<Option<B::Buffer>>,
    textures: Vec<Option<B::Texture>>,
    samplers: Vec<Option<B::Sampler>>,
    shaders: Vec<Option<B::ShaderModule>>,
    render_pipelines: Vec<Option<B::RenderPipeline>>,
    compute_pipelines: Vec<Option<B::ComputePipeline>>,
    bind_groups: Vec<Option<B::BindGroup>>,
    wasm_modules: Vec<Option<B::WasmModule>>,
    /// Executed-opcode count across the dispatcher's lifetime, for
    /// diagnostics.
    executed: AtomicU64,
}

fn table<T>(len: u16) -> Vec<Option<T>> {
    let mut v = Vec::with_capacity(len as usize);
    v.resize_with(len as usize, || None);
    v
}

impl<'m, B: Backend> Dispatcher<'m, B> {
    /// Validate the module and prepare empty resource tables.
    ///
    /// `supported` names the plugins this host provides; a payload asking
    /// for more is rejected before any opcode runs.
    pub fn new(
        module: &'m Module,
        backend: B,
        surface: SurfaceSize,
        supported: PluginSet,
    ) -> Result<Self, DispatchError<B::Error>> {
        let info = module.validate()?;
        if !supported.contains(module.plugins) {
            return Err(DispatchError::PluginNotEnabled("requested"));
        }
        let animation = module.animation_table();
        if module.has_animation_table && animation.is_none() {
            return Err(DispatchError::Descriptor(WireError::UnexpectedEnd));
        }
        debug!(
            "dispatcher ready: {} opcodes, {} submits, plugins 0x{:02x}",
            info.opcode_count,
            info.submit_count,
            module.plugins.to_wire()
        );
        Ok(Dispatcher {
            module,
            backend,
            surface,
            time: FrameTime::default(),
            pass: PassState::None,
            pc: 0,
            frame_start: None,
            first_pass_pc: None,
            buffers: table(info.buffers),
            textures: table(info.textures),
            samplers: table(info.samplers),
            shaders: table(info.shaders),
            render_pipelines: table(info.render_pipelines),
            compute_pipelines: table(info.compute_pipelines),
            bind_groups: table(info.bind_groups),
            wasm_modules: table(info.wasm_modules),
            executed: AtomicU64::new(0),
            info,
            animation,
        })
    }

    /// The backend, for hosts that need to poke at it between frames.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Tear the dispatcher down, returning the backend and its handles'
    /// owner.
    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// The program counter, pointing at the opcode `step` would decode
    /// next — or, after an error, at the opcode that faulted.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Total opcodes executed so far.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Decode and execute the opcode at `pc`. On error `pc` does not
    /// advance past the faulting opcode.
    pub fn step(&mut self) -> Result<Step, DispatchError<B::Error>> {
        let (instruction, next) = Instruction::decode_at(&self.module.bytecode, self.pc)?;
        trace!("pc={:5} {}", self.pc, instruction.opcode().name());
        let step = self.execute(&instruction, self.pc)?;
        self.executed.fetch_add(1, Ordering::Relaxed);
        if step != Step::End {
            self.pc = next;
        }
        Ok(step)
    }

    /// Run from the top of the stream until the first `submit`,
    /// materializing every resource and running one-shot init passes.
    pub fn run_init(&mut self) -> Result<(), DispatchError<B::Error>> {
        self.pc = 0;
        self.pass = PassState::None;
        for _ in 0..MAX_OPCODES {
            match self.step()? {
                Step::Continue => {}
                Step::Submitted => {
                    // If more than the end opcode follows, the per-frame
                    // section starts here; otherwise initialization
                    // consumed the only frame and the recorded first
                    // pass-opening offset is the replay point.
                    self.frame_start = if self.next_is_end() {
                        self.first_pass_pc
                    } else {
                        Some(self.pc)
                    };
                    return Ok(());
                }
                Step::End => {
                    self.frame_start = self.first_pass_pc;
                    return Ok(());
                }
            }
        }
        Err(DispatchError::OpcodeLimitExceeded)
    }

    /// Replay one frame: refresh per-frame uniforms and execute up to and
    /// including the frame's `submit`.
    ///
    /// With an animation table the frame is selected by `time.total`;
    /// without one the dispatcher replays from the frame start recorded
    /// by [`Dispatcher::run_init`].
    pub fn run_frame(
        &mut self,
        time: FrameTime,
    ) -> Result<FrameOutcome, DispatchError<B::Error>> {
        self.time = time;
        let start = match &self.animation {
            Some(animation) => match animation.select(time.total) {
                Some(scene) => Some(scene.frame_off as usize),
                None => return Ok(FrameOutcome::Idle),
            },
            None => self.frame_start,
        };
        let start = match start {
            Some(start) => start,
            None => return Ok(FrameOutcome::Idle),
        };
        self.pc = start;
        self.pass = PassState::None;
        for _ in 0..MAX_OPCODES {
            match self.step()? {
                Step::Continue => {}
                Step::Submitted => {
                    debug!("frame at t={:.3}s submitted", time.total);
                    return Ok(FrameOutcome::Submitted);
                }
                Step::End => return Ok(FrameOutcome::Idle),
            }
        }
        Err(DispatchError::OpcodeLimitExceeded)
    }

    /// Run the whole stream from the top, bounded by [`MAX_OPCODES`].
    pub fn run_to_end(&mut self) -> Result<(), DispatchError<B::Error>> {
        self.pc = 0;
        self.pass = PassState::None;
        for _ in 0..MAX_OPCODES {
            if let Step::End = self.step()? {
                return Ok(());
            }
        }
        Err(DispatchError::OpcodeLimitExceeded)
    }

    fn next_is_end(&self) -> bool {
        matches!(
            Instruction::decode_at(&self.module.bytecode, self.pc),
            Ok((Instruction::End, _))
        )
    }

    // -----------------------------------------------------------------

    fn execute(
        &mut self,
        instruction: &Instruction,
        offset: usize,
    ) -> Result<Step, DispatchError<B::Error>> {
        match *instruction {
            Instruction::CreateBuffer { id, size, usage } => {
                self.require_no_pass("create_buffer", offset)?;
                let handle = self
                    .backend
                    .create_buffer(id, size, BufferUsages::from_wire(usage))
                    .map_err(DispatchError::Backend)?;
                self.buffers[id as usize] = Some(handle);
            }
            Instruction::CreateTexture { id, desc_off, desc_len } => {
                self.require_no_pass("create_texture", offset)?;
                self.require_plugin(PluginSet::TEXTURE, "texture")?;
                let descriptor = TextureDescriptor::decode(self.data(desc_off, desc_len, offset)?)?;
                let init_data = match descriptor.init_data {
                    Some((off, len)) => Some(self.data(off, len, offset)?),
                    None => None,
                };
                let handle = self
                    .backend
                    .create_texture(id, &descriptor, init_data)
                    .map_err(DispatchError::Backend)?;
                self.textures[id as usize] = Some(handle);
            }
            Instruction::CreateSampler { id, desc_off, desc_len } => {
                self.require_no_pass("create_sampler", offset)?;
                self.require_plugin(PluginSet::TEXTURE, "texture")?;
                let descriptor = SamplerDescriptor::decode(self.data(desc_off, desc_len, offset)?)?;
                let handle = self
                    .backend
                    .create_sampler(id, &descriptor)
                    .map_err(DispatchError::Backend)?;
                self.samplers[id as usize] = Some(handle);
            }
            Instruction::CreateShader { id, code_off, code_len } => {
                self.require_no_pass("create_shader", offset)?;
                let code = self
                    .module
                    .data_str(code_off, code_len)
                    .ok_or(ValidateError::OffsetOutOfBounds {
                        section: "data",
                        offset: code_off,
                    })?;
                let handle = self
                    .backend
                    .create_shader_module(id, code)
                    .map_err(DispatchError::Backend)?;
                self.shaders[id as usize] = Some(handle);
            }
            Instruction::CreateRenderPipeline { id, desc_off, desc_len } => {
                self.require_no_pass("create_render_pipeline", offset)?;
                self.require_plugin(PluginSet::RENDER, "render")?;
                let descriptor =
                    RenderPipelineDescriptor::decode(self.data(desc_off, desc_len, offset)?)?;
                let layout = self.resolve_pipeline_layout(descriptor.layout, offset)?;
                let vertex_module =
                    resource(&self.shaders, descriptor.vertex_module, "shader", offset)?;
                let fragment_module = match descriptor.fragment {
                    Some((module, _)) => Some(resource(&self.shaders, module, "shader", offset)?),
                    None => None,
                };
                let handle = self
                    .backend
                    .create_render_pipeline(
                        id,
                        RenderPipelineArgs {
                            descriptor: &descriptor,
                            layout: layout.as_ref(),
                            vertex_module,
                            fragment_module,
                        },
                    )
                    .map_err(DispatchError::Backend)?;
                self.render_pipelines[id as usize] = Some(handle);
            }
            Instruction::CreateComputePipeline { id, desc_off, desc_len } => {
                self.require_no_pass("create_compute_pipeline", offset)?;
                self.require_plugin(PluginSet::COMPUTE, "compute")?;
                let descriptor =
                    ComputePipelineDescriptor::decode(self.data(desc_off, desc_len, offset)?)?;
                let layout = self.resolve_pipeline_layout(descriptor.layout, offset)?;
                let module = resource(&self.shaders, descriptor.module, "shader", offset)?;
                let handle = self
                    .backend
                    .create_compute_pipeline(
                        id,
                        ComputePipelineArgs {
                            layout: layout.as_ref(),
                            module,
                            entry: &descriptor.entry,
                        },
                    )
                    .map_err(DispatchError::Backend)?;
                self.compute_pipelines[id as usize] = Some(handle);
            }
            Instruction::CreateBindGroup { id, entries_off, entries_len, .. } => {
                self.require_no_pass("create_bind_group", offset)?;
                let descriptor =
                    BindGroupDescriptor::decode(self.data(entries_off, entries_len, offset)?)?;
                let layout = self.layout_record(descriptor.layout, offset)?;
                let mut bindings = Vec::with_capacity(descriptor.entries.len());
                for entry in &descriptor.entries {
                    bindings.push(match *entry {
                        BindGroupEntry::Buffer { binding, buffer, offset: buf_off, size } => {
                            BindGroupBinding::Buffer {
                                binding,
                                buffer: resource(&self.buffers, buffer, "buffer", offset)?,
                                offset: buf_off,
                                size,
                            }
                        }
                        BindGroupEntry::Sampler { binding, sampler } => {
                            BindGroupBinding::Sampler {
                                binding,
                                sampler: resource(&self.samplers, sampler, "sampler", offset)?,
                            }
                        }
                        BindGroupEntry::TextureView { binding, texture, view } => {
                            BindGroupBinding::TextureView {
                                binding,
                                texture: resource(&self.textures, texture, "texture", offset)?,
                                view,
                            }
                        }
                    });
                }
                let handle = self
                    .backend
                    .create_bind_group(id, &layout, &bindings)
                    .map_err(DispatchError::Backend)?;
                self.bind_groups[id as usize] = Some(handle);
            }
            Instruction::BeginRenderPass { color_tex, load, store, depth_tex } => {
                self.require_plugin(PluginSet::RENDER, "render")?;
                if self.pass != PassState::None {
                    return Err(DispatchError::InvalidPassState {
                        opcode: "begin_render_pass",
                        offset,
                    });
                }
                self.note_pass_start(offset);
                let color = if color_tex == SURFACE_TEXTURE_ID {
                    Attachment::Surface
                } else {
                    Attachment::Texture(resource(&self.textures, color_tex, "texture", offset)?)
                };
                let depth = if depth_tex == NO_DEPTH_ID {
                    None
                } else {
                    Some(resource(&self.textures, depth_tex, "texture", offset)?)
                };
                self.backend
                    .begin_render_pass(color, load, store, depth)
                    .map_err(DispatchError::Backend)?;
                self.pass = PassState::Render;
            }
            Instruction::BeginComputePass => {
                self.require_plugin(PluginSet::COMPUTE, "compute")?;
                if self.pass != PassState::None {
                    return Err(DispatchError::InvalidPassState {
                        opcode: "begin_compute_pass",
                        offset,
                    });
                }
                self.note_pass_start(offset);
                self.backend
                    .begin_compute_pass()
                    .map_err(DispatchError::Backend)?;
                self.pass = PassState::Compute;
            }
            Instruction::SetPipeline { id } => {
                let pipeline = match self.pass {
                    PassState::Render => PipelineRef::Render(resource(
                        &self.render_pipelines,
                        id,
                        "render pipeline",
                        offset,
                    )?),
                    PassState::Compute => PipelineRef::Compute(resource(
                        &self.compute_pipelines,
                        id,
                        "compute pipeline",
                        offset,
                    )?),
                    PassState::None => {
                        return Err(DispatchError::InvalidPassState {
                            opcode: "set_pipeline",
                            offset,
                        })
                    }
                };
                self.backend
                    .set_pipeline(pipeline)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::SetBindGroup { slot, id } => {
                if self.pass == PassState::None {
                    return Err(DispatchError::InvalidPassState {
                        opcode: "set_bind_group",
                        offset,
                    });
                }
                let group = resource(&self.bind_groups, id, "bind group", offset)?;
                self.backend
                    .set_bind_group(slot, group)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::SetVertexBuffer { slot, id } => {
                self.require_render_pass("set_vertex_buffer", offset)?;
                let buffer = resource(&self.buffers, id, "buffer", offset)?;
                self.backend
                    .set_vertex_buffer(slot, buffer)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::SetIndexBuffer { id, format } => {
                self.require_render_pass("set_index_buffer", offset)?;
                let buffer = resource(&self.buffers, id, "buffer", offset)?;
                self.backend
                    .set_index_buffer(buffer, format)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => {
                self.require_render_pass("draw", offset)?;
                self.backend
                    .draw(vertex_count, instance_count, first_vertex, first_instance)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            } => {
                self.require_render_pass("draw_indexed", offset)?;
                self.backend
                    .draw_indexed(
                        index_count,
                        instance_count,
                        first_index,
                        base_vertex,
                        first_instance,
                    )
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::Dispatch { x, y, z } => {
                if self.pass != PassState::Compute {
                    return Err(DispatchError::InvalidPassState {
                        opcode: "dispatch",
                        offset,
                    });
                }
                self.backend
                    .dispatch(x, y, z)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::EndPass => {
                if self.pass == PassState::None {
                    return Err(DispatchError::InvalidPassState {
                        opcode: "end_pass",
                        offset,
                    });
                }
                self.backend.end_pass().map_err(DispatchError::Backend)?;
                self.pass = PassState::None;
            }
            Instruction::WriteBuffer { id, offset: buf_off, data_off, data_len } => {
                self.require_no_pass("write_buffer", offset)?;
                let data = self.data(data_off, data_len, offset)?;
                let buffer = resource(&self.buffers, id, "buffer", offset)?;
                self.backend
                    .write_buffer(buffer, buf_off, data)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::WriteTimeUniform { id, offset: buf_off } => {
                self.require_no_pass("write_time_uniform", offset)?;
                self.note_pass_start(offset);
                // The slot within the 16-byte params block names the
                // runtime value; the analyzer pinned each value to its
                // canonical slot for exactly this reason.
                let value = match (buf_off / 4) % 4 {
                    0 => self.time.total,
                    1 => self.time.delta,
                    2 => self.surface.width as f32,
                    _ => self.surface.height as f32,
                };
                let buffer = resource(&self.buffers, id, "buffer", offset)?;
                self.backend
                    .write_buffer(buffer, buf_off, &value.to_le_bytes())
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::CopyBuffer { src, src_off, dst, dst_off, size } => {
                self.require_no_pass("copy_buffer", offset)?;
                let src = resource(&self.buffers, src, "buffer", offset)?;
                let dst = resource(&self.buffers, dst, "buffer", offset)?;
                self.backend
                    .copy_buffer(src, src_off, dst, dst_off, size)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::InitWasmModule { id, data_off, data_len } => {
                self.require_no_pass("init_wasm_module", offset)?;
                self.require_plugin(PluginSet::WASM, "wasm")?;
                let bytes = self.data(data_off, data_len, offset)?;
                let handle = self
                    .backend
                    .init_wasm_module(id, bytes)
                    .map_err(DispatchError::Backend)?;
                self.wasm_modules[id as usize] = Some(handle);
            }
            Instruction::CallWasmFunc {
                module,
                name_off,
                name_len,
                args_off,
                args_len,
                out_buf,
                out_off,
                out_len,
            } => {
                self.require_no_pass("call_wasm_func", offset)?;
                self.require_plugin(PluginSet::WASM, "wasm")?;
                let name = self
                    .module
                    .data_str(name_off, name_len)
                    .ok_or(ValidateError::OffsetOutOfBounds {
                        section: "data",
                        offset: name_off,
                    })?;
                let arg_bytes = self.data(args_off, args_len, offset)?;
                let args: Vec<u32> = arg_bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                let wasm = resource(&self.wasm_modules, module, "wasm module", offset)?;
                let output = if out_buf == NO_BUFFER_ID {
                    None
                } else {
                    Some(WasmOutput {
                        buffer: resource(&self.buffers, out_buf, "buffer", offset)?,
                        offset: out_off,
                        length: out_len,
                    })
                };
                self.backend
                    .call_wasm_func(wasm, name, &args, output)
                    .map_err(DispatchError::Backend)?;
            }
            Instruction::Submit => {
                self.require_no_pass("submit", offset)?;
                self.backend.submit().map_err(DispatchError::Backend)?;
                return Ok(Step::Submitted);
            }
            Instruction::End => return Ok(Step::End),
        }
        Ok(Step::Continue)
    }

    // -----------------------------------------------------------------

    fn note_pass_start(&mut self, offset: usize) {
        if self.first_pass_pc.is_none() {
            self.first_pass_pc = Some(offset);
        }
    }

    fn require_no_pass(
        &self,
        opcode: &'static str,
        offset: usize,
    ) -> Result<(), DispatchError<B::Error>> {
        if self.pass != PassState::None {
            return Err(DispatchError::InvalidPassState { opcode, offset });
        }
        Ok(())
    }

    fn require_render_pass(
        &self,
        opcode: &'static str,
        offset: usize,
    ) -> Result<(), DispatchError<B::Error>> {
        if self.pass != PassState::Render {
            return Err(DispatchError::InvalidPassState { opcode, offset });
        }
        Ok(())
    }

    fn require_plugin(
        &self,
        plugin: PluginSet,
        name: &'static str,
    ) -> Result<(), DispatchError<B::Error>> {
        if !self.module.plugins.contains(plugin) {
            return Err(DispatchError::PluginNotEnabled(name));
        }
        Ok(())
    }

    fn data(
        &self,
        off: u32,
        len: u32,
        _at: usize,
    ) -> Result<&'m [u8], DispatchError<B::Error>> {
        self.module
            .data_slice(off, len)
            .ok_or_else(|| {
                DispatchError::Validate(ValidateError::OffsetOutOfBounds {
                    section: "data",
                    offset: off,
                })
            })
    }

    /// Chase a `(id, offset)` layout reference into its decoded record.
    fn layout_record(
        &self,
        layout: LayoutRef,
        offset: usize,
    ) -> Result<BindGroupLayoutDescriptor, DispatchError<B::Error>> {
        let bytes = self
            .module
            .data
            .get(layout.offset as usize..)
            .ok_or(DispatchError::UnknownResource {
                kind: "bind group layout",
                id: layout.id,
                offset,
            })?;
        Ok(BindGroupLayoutDescriptor::decode(bytes)?)
    }

    fn resolve_pipeline_layout(
        &self,
        layout: PipelineLayout,
        offset: usize,
    ) -> Result<Option<ResolvedPipelineLayout>, DispatchError<B::Error>> {
        let layout = match layout {
            PipelineLayout::Auto => return Ok(None),
            PipelineLayout::Explicit(layout) => layout,
        };
        let bytes = self
            .module
            .data
            .get(layout.offset as usize..)
            .ok_or(DispatchError::UnknownResource {
                kind: "pipeline layout",
                id: layout.id,
                offset,
            })?;
        let record = PipelineLayoutDescriptor::decode(bytes)?;
        let mut bind_group_layouts = Vec::with_capacity(record.bind_group_layouts.len());
        for group in record.bind_group_layouts {
            bind_group_layouts.push(self.layout_record(group, offset)?);
        }
        Ok(Some(ResolvedPipelineLayout {
            id: record.id,
            bind_group_layouts,
        }))
    }
}

/// Dense-id table lookup; an empty slot means a reference ran ahead of
/// its creation, which validation should have rejected already.
fn resource<'t, T, E: std::error::Error + Send + Sync + 'static>(
    slots: &'t [Option<T>],
    id: u16,
    kind: &'static str,
    offset: usize,
) -> Result<&'t T, DispatchError<E>> {
    slots
        .get(id as usize)
        .and_then(Option::as_ref)
        .ok_or(DispatchError::UnknownResource { kind, id, offset })
}
