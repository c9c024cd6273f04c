//! The emitter.
//!
//! Serializes an [`Analysis`] into the payload container. Emission order
//! is a fixed traversal of the symbol tables in dependency order — never
//! source order — so a resource is always created before anything that
//! references it and the same program text always produces the same
//! bytes:
//!
//! ```text
//!   shaders → layouts → pipelines → buffers/textures/samplers
//!           → bind groups → data/bitmap/wasm blobs → init operations
//!           → per-frame opcode sequences
//! ```
//!
//! The data section is built alongside: deduplicated null-terminated
//! strings, descriptor records, static blobs, and (last) the animation
//! table patched into the reserved leading word.

use std::collections::HashMap;

use log::debug;
use pngine_bytecode::bytes::Writer;
use pngine_bytecode::instr::Instruction;
use pngine_bytecode::{
    AnimationTable, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    ComputePipelineDescriptor, LayoutRef, Module, PipelineLayout, PipelineLayoutDescriptor,
    RenderPipelineDescriptor, Scene, TextureDescriptor, MAX_BYTECODE_LEN, NO_BUFFER_ID,
    NO_DEPTH_ID, SURFACE_TEXTURE_ID, VERSION,
};
use thiserror::Error;

use crate::analysis::{
    Analysis, AttachmentTarget, BindGroupEntryInfo, InitParams, ParamField, PassBody, PerformRef,
    QueueOp,
};

/// Emission failed; no module is produced.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("error[E401]: opcode stream of {size} bytes exceeds the 1 MiB cap")]
    BytecodeTooLarge { size: usize },
    #[error("error[E402]: descriptor field '{0}' does not fit its encoding")]
    DescriptorTooLarge(&'static str),
    #[error("error[E403]: data section exceeds 4 GiB")]
    DataSectionOverflow,
    #[error("error[E404]: layout references form a cycle")]
    DependencyCycle,
}

/// Serialize the analysis into a finished module.
pub fn emit(analysis: &Analysis, executor: Option<Vec<u8>>) -> Result<Module, EmitError> {
    let mut emitter = Emitter {
        a: analysis,
        code: Writer::new(),
        data: Vec::new(),
        blobs: HashMap::new(),
        bgl_offsets: Vec::new(),
        pl_offsets: Vec::new(),
        data_offsets: Vec::new(),
        bitmap_offsets: Vec::new(),
        frame_offsets: Vec::new(),
    };
    emitter.run()?;

    let bytecode = emitter.code.into_bytes();
    if bytecode.len() > MAX_BYTECODE_LEN {
        return Err(EmitError::BytecodeTooLarge {
            size: bytecode.len(),
        });
    }
    if emitter.data.len() > u32::MAX as usize {
        return Err(EmitError::DataSectionOverflow);
    }
    debug!(
        "emitted {} bytecode bytes, {} data bytes",
        bytecode.len(),
        emitter.data.len()
    );
    Ok(Module {
        version: VERSION,
        plugins: analysis.plugins,
        executor,
        bytecode,
        data: emitter.data,
        has_animation_table: analysis.animation.is_some(),
    })
}

struct Emitter<'a> {
    a: &'a Analysis,
    code: Writer,
    data: Vec<u8>,
    /// Content-addressed blob deduplication.
    blobs: HashMap<Vec<u8>, (u32, u32)>,
    bgl_offsets: Vec<u32>,
    pl_offsets: Vec<u32>,
    data_offsets: Vec<(u32, u32)>,
    bitmap_offsets: Vec<(u32, u32)>,
    frame_offsets: Vec<u32>,
}

impl<'a> Emitter<'a> {
    fn run(&mut self) -> Result<(), EmitError> {
        if self.a.animation.is_some() {
            // Reserve the leading word for the animation-table offset.
            self.data.extend_from_slice(&[0; 4]);
        }

        self.layout_records()?;
        self.shaders()?;
        self.pipelines()?;
        self.plain_resources()?;
        self.bind_groups()?;
        self.static_blobs();
        let emitted_init = self.init_section()?;
        if emitted_init {
            self.put(Instruction::Submit);
        }
        self.frame_sections()?;
        self.put(Instruction::End);
        self.animation_table();
        Ok(())
    }

    // -----------------------------------------------------------------
    // Data-section records

    /// Bind-group-layout and pipeline-layout records carry no opcode;
    /// they live purely in the data section, id-tagged, and everything
    /// else references them by `(id, offset)`.
    fn layout_records(&mut self) -> Result<(), EmitError> {
        for (id, entries) in self.a.bind_group_layouts.iter().enumerate() {
            let record = BindGroupLayoutDescriptor {
                id: id as u16,
                entries: entries.clone(),
            };
            let mut w = Writer::new();
            record.encode(&mut w);
            let (off, _) = self.append(&w.into_bytes());
            self.bgl_offsets.push(off);
        }
        for (id, layouts) in self.a.pipeline_layouts.iter().enumerate() {
            let bind_group_layouts = layouts
                .iter()
                .map(|&bgl| {
                    self.bgl_offsets
                        .get(bgl as usize)
                        .map(|&offset| LayoutRef { id: bgl, offset })
                        .ok_or(EmitError::DependencyCycle)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let record = PipelineLayoutDescriptor {
                id: id as u16,
                bind_group_layouts,
            };
            let mut w = Writer::new();
            record.encode(&mut w);
            let (off, _) = self.append(&w.into_bytes());
            self.pl_offsets.push(off);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Creation opcodes

    fn shaders(&mut self) -> Result<(), EmitError> {
        for (id, shader) in self.a.shaders.iter().enumerate() {
            let (code_off, code_len) = self.string(&shader.code);
            self.put(Instruction::CreateShader {
                id: id as u16,
                code_off,
                code_len,
            });
        }
        Ok(())
    }

    fn pipeline_layout_ref(&self, layout: Option<u16>) -> PipelineLayout {
        match layout {
            None => PipelineLayout::Auto,
            Some(id) => PipelineLayout::Explicit(LayoutRef {
                id,
                offset: self.pl_offsets[id as usize],
            }),
        }
    }

    fn pipelines(&mut self) -> Result<(), EmitError> {
        for (id, info) in self.a.render_pipelines.iter().enumerate() {
            check_entry_name(&info.vertex_entry)?;
            if let Some((_, entry)) = &info.fragment {
                check_entry_name(entry)?;
            }
            if info.vertex_buffers.iter().any(|b| b.attributes.len() > 255) {
                return Err(EmitError::DescriptorTooLarge("vertex attributes"));
            }
            let descriptor = RenderPipelineDescriptor {
                layout: self.pipeline_layout_ref(info.layout),
                vertex_module: info.vertex_module,
                vertex_entry: info.vertex_entry.clone(),
                fragment: info.fragment.clone(),
                targets: info.targets.clone(),
                vertex_buffers: info.vertex_buffers.clone(),
                primitive: info.primitive,
                depth_stencil: info.depth_stencil,
            };
            let mut w = Writer::new();
            descriptor.encode(&mut w);
            let (desc_off, desc_len) = self.append(&w.into_bytes());
            self.put(Instruction::CreateRenderPipeline {
                id: id as u16,
                desc_off,
                desc_len,
            });
        }
        for (id, info) in self.a.compute_pipelines.iter().enumerate() {
            check_entry_name(&info.entry)?;
            let descriptor = ComputePipelineDescriptor {
                layout: self.pipeline_layout_ref(info.layout),
                module: info.module,
                entry: info.entry.clone(),
            };
            let mut w = Writer::new();
            descriptor.encode(&mut w);
            let (desc_off, desc_len) = self.append(&w.into_bytes());
            self.put(Instruction::CreateComputePipeline {
                id: id as u16,
                desc_off,
                desc_len,
            });
        }
        Ok(())
    }

    fn plain_resources(&mut self) -> Result<(), EmitError> {
        for (id, info) in self.a.buffers.iter().enumerate() {
            self.put(Instruction::CreateBuffer {
                id: id as u16,
                size: info.size,
                usage: info.usage.to_wire(),
            });
        }
        // Bitmap bytes land in the data section first so texture
        // descriptors can point at them.
        for bitmap in self.a.bitmaps.iter() {
            let bytes = bitmap.bytes.clone();
            let at = self.append(&bytes);
            self.bitmap_offsets.push(at);
        }
        for (id, info) in self.a.textures.iter().enumerate() {
            let descriptor = TextureDescriptor {
                width: info.width,
                height: info.height,
                depth: info.depth,
                format: info.format,
                usage: info.usage,
                dimension: info.dimension,
                mip_level_count: info.mip_level_count,
                sample_count: info.sample_count,
                view_formats: info.view_formats.clone(),
                init_data: info.source.map(|bitmap| self.bitmap_offsets[bitmap as usize]),
            };
            let mut w = Writer::new();
            descriptor.encode(&mut w);
            let (desc_off, desc_len) = self.append(&w.into_bytes());
            self.put(Instruction::CreateTexture {
                id: id as u16,
                desc_off,
                desc_len,
            });
        }
        for (id, descriptor) in self.a.samplers.iter().enumerate() {
            let mut w = Writer::new();
            descriptor.encode(&mut w);
            let (desc_off, desc_len) = self.append(&w.into_bytes());
            self.put(Instruction::CreateSampler {
                id: id as u16,
                desc_off,
                desc_len,
            });
        }
        Ok(())
    }

    fn bind_groups(&mut self) -> Result<(), EmitError> {
        for (id, info) in self.a.bind_groups.iter().enumerate() {
            let entries = info
                .entries
                .iter()
                .map(|entry| match *entry {
                    BindGroupEntryInfo::Buffer {
                        binding,
                        buffer,
                        offset,
                        size,
                    } => BindGroupEntry::Buffer {
                        binding,
                        buffer,
                        offset,
                        size,
                    },
                    BindGroupEntryInfo::Sampler { binding, sampler } => {
                        BindGroupEntry::Sampler { binding, sampler }
                    }
                    BindGroupEntryInfo::View { binding, view } => {
                        let view_info = &self.a.views[view as usize];
                        BindGroupEntry::TextureView {
                            binding,
                            texture: view_info.texture,
                            view: view_info.view,
                        }
                    }
                })
                .collect();
            let descriptor = BindGroupDescriptor {
                layout: LayoutRef {
                    id: info.layout,
                    offset: self.bgl_offsets[info.layout as usize],
                },
                entries,
            };
            let mut w = Writer::new();
            descriptor.encode(&mut w);
            let (entries_off, entries_len) = self.append(&w.into_bytes());
            self.put(Instruction::CreateBindGroup {
                id: id as u16,
                layout: info.layout,
                entries_off,
                entries_len,
            });
        }
        Ok(())
    }

    fn static_blobs(&mut self) {
        for data in self.a.datas.iter() {
            let bytes = data.bytes.clone();
            let at = self.append(&bytes);
            self.data_offsets.push(at);
        }
    }

    // -----------------------------------------------------------------
    // The run-once init section

    /// Emit everything that runs once before the first frame: wasm module
    /// instantiation, buffer uploads, `#init` compute passes, queue ops no
    /// frame references, and frame `init=[…]` lists. Returns whether
    /// anything was emitted (and therefore needs the init submit).
    fn init_section(&mut self) -> Result<bool, EmitError> {
        let start_len = self.code.len();

        for (id, &data) in self.a.wasm_modules.iter().enumerate() {
            let (data_off, data_len) = self.data_offsets[data as usize];
            self.put(Instruction::InitWasmModule {
                id: id as u16,
                data_off,
                data_len,
            });
        }

        for (id, info) in self.a.buffers.iter().enumerate() {
            if let Some(data) = info.data {
                let (data_off, data_len) = self.data_offsets[data as usize];
                self.put(Instruction::WriteBuffer {
                    id: id as u16,
                    offset: 0,
                    data_off,
                    data_len,
                });
            }
        }

        // Params templates: the literal slots of each init's 16-byte
        // block, written once; runtime slots are refreshed per frame by
        // write_time_uniform.
        for init in self.a.inits.iter() {
            if let Some(params) = &init.params {
                let template = params_template(params);
                let (data_off, data_len) = self.append_dedup(&template);
                self.put(Instruction::WriteBuffer {
                    id: params.buffer,
                    offset: 0,
                    data_off,
                    data_len,
                });
            }
        }

        for init in self.a.inits.iter() {
            self.put(Instruction::BeginComputePass);
            self.put(Instruction::SetPipeline { id: init.pipeline });
            self.put(Instruction::SetBindGroup {
                slot: 0,
                id: init.bind_group,
            });
            let [x, y, z] = init.dispatch;
            self.put(Instruction::Dispatch { x, y, z });
            self.put(Instruction::EndPass);
        }

        // Queue ops that no frame performs still run, once, here.
        let referenced: Vec<u16> = self
            .a
            .frames
            .iter()
            .flat_map(|f| f.init.iter().chain(f.perform.iter()))
            .filter_map(|r| match r {
                PerformRef::Queue(q) => Some(*q),
                _ => None,
            })
            .collect();
        for (id, _) in self.a.queues.iter().enumerate() {
            if !referenced.contains(&(id as u16)) {
                self.queue_op(id as u16);
            }
        }

        let inits: Vec<PerformRef> = self
            .a
            .frames
            .iter()
            .flat_map(|f| f.init.iter().copied())
            .collect();
        for perform in inits {
            self.perform(perform)?;
        }

        Ok(self.code.len() > start_len)
    }

    // -----------------------------------------------------------------
    // Frames

    fn frame_sections(&mut self) -> Result<(), EmitError> {
        for frame in self.a.frames.iter() {
            self.frame_offsets.push(self.code.len() as u32);
            // Refresh every runtime params slot for this submission.
            for init in self.a.inits.iter() {
                if let Some(params) = &init.params {
                    for field in params.fields.iter() {
                        if let ParamField::Runtime(value) = field {
                            self.put(Instruction::WriteTimeUniform {
                                id: params.buffer,
                                offset: (value.canonical_slot() * 4) as u32,
                            });
                        }
                    }
                }
            }
            for perform in frame.perform.clone() {
                self.perform(perform)?;
            }
            self.put(Instruction::Submit);
        }
        Ok(())
    }

    fn perform(&mut self, perform: PerformRef) -> Result<(), EmitError> {
        match perform {
            PerformRef::RenderPass(id) => self.render_pass(id)?,
            PerformRef::ComputePass(id) => {
                let info = self.a.compute_passes[id as usize].clone();
                self.put(Instruction::BeginComputePass);
                if let Some(pipeline) = info.pipeline {
                    self.put(Instruction::SetPipeline { id: pipeline });
                }
                for (slot, group) in info.bind_groups.iter().enumerate() {
                    self.put(Instruction::SetBindGroup {
                        slot: slot as u8,
                        id: *group,
                    });
                }
                let [x, y, z] = info.dispatch;
                self.put(Instruction::Dispatch { x, y, z });
                self.put(Instruction::EndPass);
            }
            PerformRef::Queue(id) => self.queue_op(id),
            PerformRef::WasmCall(id) => self.wasm_call(id),
        }
        Ok(())
    }

    fn render_pass(&mut self, id: u16) -> Result<(), EmitError> {
        let info = self.a.render_passes[id as usize].clone();
        let color_tex = match info.color {
            AttachmentTarget::Surface => SURFACE_TEXTURE_ID,
            AttachmentTarget::Texture(texture) => texture,
        };
        self.put(Instruction::BeginRenderPass {
            color_tex,
            load: info.load,
            store: info.store,
            depth_tex: info.depth.unwrap_or(NO_DEPTH_ID),
        });
        self.pass_body(&info.body);
        for &bundle in info.body.bundles.iter() {
            let body = self.a.bundles[bundle as usize].clone();
            self.pass_body(&body);
        }
        self.put(Instruction::EndPass);
        Ok(())
    }

    fn pass_body(&mut self, body: &PassBody) {
        if let Some(pipeline) = body.pipeline {
            self.put(Instruction::SetPipeline { id: pipeline });
        }
        for (slot, group) in body.bind_groups.iter().enumerate() {
            self.put(Instruction::SetBindGroup {
                slot: slot as u8,
                id: *group,
            });
        }
        for (slot, buffer) in body.vertex_buffers.iter().enumerate() {
            self.put(Instruction::SetVertexBuffer {
                slot: slot as u8,
                id: *buffer,
            });
        }
        if let Some((buffer, format)) = body.index_buffer {
            self.put(Instruction::SetIndexBuffer { id: buffer, format });
        }
        if let Some(draw) = body.draw {
            self.put(Instruction::Draw {
                vertex_count: draw.vertex_count,
                instance_count: draw.instance_count,
                first_vertex: draw.first_vertex,
                first_instance: draw.first_instance,
            });
        }
        if let Some(draw) = body.draw_indexed {
            self.put(Instruction::DrawIndexed {
                index_count: draw.index_count,
                instance_count: draw.instance_count,
                first_index: draw.first_index,
                base_vertex: draw.base_vertex,
                first_instance: draw.first_instance,
            });
        }
    }

    fn queue_op(&mut self, id: u16) {
        match self.a.queues[id as usize] {
            QueueOp::Write {
                buffer,
                offset,
                data,
            } => {
                let (data_off, data_len) = self.data_offsets[data as usize];
                self.put(Instruction::WriteBuffer {
                    id: buffer,
                    offset,
                    data_off,
                    data_len,
                });
            }
            QueueOp::Copy {
                src,
                src_off,
                dst,
                dst_off,
                size,
            } => {
                self.put(Instruction::CopyBuffer {
                    src,
                    src_off,
                    dst,
                    dst_off,
                    size,
                });
            }
        }
    }

    fn wasm_call(&mut self, id: u16) {
        let info = self.a.wasm_calls[id as usize].clone();
        let (name_off, name_len) = self.string(&info.func);
        let mut args = Vec::with_capacity(info.args.len() * 4);
        for arg in info.args.iter() {
            args.extend_from_slice(&arg.to_le_bytes());
        }
        let (args_off, args_len) = self.append_dedup(&args);
        let (out_buf, out_off, out_len) = match info.output {
            Some((buffer, offset, length)) => (buffer, offset, length),
            None => (NO_BUFFER_ID, 0, 0),
        };
        self.put(Instruction::CallWasmFunc {
            module: info.module,
            name_off,
            name_len,
            args_off,
            args_len,
            out_buf,
            out_off,
            out_len,
        });
    }

    // -----------------------------------------------------------------
    // The animation table

    fn animation_table(&mut self) {
        let animation = match &self.a.animation {
            Some(animation) => animation,
            None => return,
        };
        let mut scenes: Vec<Scene> = animation
            .scenes
            .iter()
            .enumerate()
            .map(|(scene, &(frame, start, end))| Scene {
                scene: scene as u16,
                frame,
                frame_off: self.frame_offsets[frame as usize],
                start,
                end,
            })
            .collect();
        scenes.sort_by(|a, b| {
            a.start
                .partial_cmp(&b.start)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.scene.cmp(&b.scene))
        });
        let table = AnimationTable {
            scenes,
            end_behavior: animation.end_behavior,
        };
        let offset = self.data.len() as u32;
        let mut w = Writer::new();
        table.encode(&mut w);
        self.data.extend_from_slice(&w.into_bytes());
        self.data[0..4].copy_from_slice(&offset.to_le_bytes());
    }

    // -----------------------------------------------------------------
    // Low-level helpers

    fn put(&mut self, instruction: Instruction) {
        instruction.encode(&mut self.code);
    }

    /// Append raw bytes without deduplication.
    fn append(&mut self, bytes: &[u8]) -> (u32, u32) {
        let off = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        (off, bytes.len() as u32)
    }

    /// Append with content deduplication.
    fn append_dedup(&mut self, bytes: &[u8]) -> (u32, u32) {
        if let Some(&at) = self.blobs.get(bytes) {
            return at;
        }
        let at = self.append(bytes);
        self.blobs.insert(bytes.to_vec(), at);
        at
    }

    /// A null-terminated string-table entry; the returned length excludes
    /// the terminator.
    fn string(&mut self, text: &str) -> (u32, u32) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let (off, _) = self.append_dedup(&bytes);
        (off, text.len() as u32)
    }
}

/// The 16-byte params block with literals in place and runtime slots
/// zeroed.
fn params_template(params: &InitParams) -> [u8; 16] {
    let mut template = [0u8; 16];
    for (slot, field) in params.fields.iter().enumerate() {
        if let ParamField::Literal(value) = field {
            template[slot * 4..slot * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
    }
    template
}

fn check_entry_name(name: &str) -> Result<(), EmitError> {
    if name.len() > 255 {
        return Err(EmitError::DescriptorTooLarge("entry point name"));
    }
    Ok(())
}
