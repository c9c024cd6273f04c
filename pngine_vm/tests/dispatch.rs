//! Replay tests against a recording mock backend.

use std::convert::Infallible;

use pngine::bytecode::bytes::Writer;
use pngine::bytecode::instr::Instruction;
use pngine::bytecode::wire::{BufferUsages, IndexFormat, LoadOp, StoreOp};
use pngine::bytecode::{Module, NO_DEPTH_ID, SURFACE_TEXTURE_ID, VERSION};
use pngine::reflect::{
    ArrayInfo, BindingInfo, EntryPoint, NoReflection, Reflect, ReflectError, ShaderReflection,
    ShaderStage, TypeLayout,
};
use pngine::{compile_with_loader, MemoryLoader, Options};
use pngine_vm::{
    Attachment, Backend, BindGroupBinding, ComputePipelineArgs, DispatchError, Dispatcher,
    FrameOutcome, FrameTime, PipelineRef, PluginSet, RenderPipelineArgs, SurfaceSize, WasmOutput,
};

// ---------------------------------------------------------------------------
// The mock

#[derive(Clone, Debug, PartialEq)]
enum Call {
    CreateBuffer { id: u16, size: u32 },
    CreateTexture { id: u16 },
    CreateSampler { id: u16 },
    CreateShader { id: u16 },
    CreateRenderPipeline { id: u16 },
    CreateComputePipeline { id: u16 },
    CreateBindGroup { id: u16, bindings: usize },
    BeginRenderPass { surface: bool, load: LoadOp, store: StoreOp, depth: bool },
    BeginComputePass,
    SetRenderPipeline(u16),
    SetComputePipeline(u16),
    SetBindGroup { slot: u8, id: u16 },
    SetVertexBuffer { slot: u8, id: u16 },
    SetIndexBuffer { id: u16, format: IndexFormat },
    Draw { vertices: u32, instances: u32 },
    DrawIndexed { indices: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    EndPass,
    WriteBuffer { buffer: u16, offset: u32, bytes: Vec<u8> },
    CopyBuffer { src: u16, dst: u16, size: u32 },
    Submit,
    InitWasm { id: u16 },
    CallWasm { module: u16, name: String, args: Vec<u32>, output: Option<u16> },
}

/// Records every capability invocation; handles are the ids the
/// dispatcher materialized them under.
#[derive(Default)]
struct RecordingBackend {
    calls: Vec<Call>,
    quiet: bool,
}

impl RecordingBackend {
    fn record(&mut self, call: Call) {
        if !self.quiet {
            self.calls.push(call);
        }
    }

    fn drain(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }
}

impl Backend for RecordingBackend {
    type Buffer = u16;
    type Texture = u16;
    type Sampler = u16;
    type ShaderModule = u16;
    type BindGroup = u16;
    type RenderPipeline = u16;
    type ComputePipeline = u16;
    type WasmModule = u16;
    type Error = Infallible;

    fn create_buffer(
        &mut self,
        id: u16,
        size: u32,
        _usage: BufferUsages,
    ) -> Result<u16, Infallible> {
        self.record(Call::CreateBuffer { id, size });
        Ok(id)
    }

    fn create_texture(
        &mut self,
        id: u16,
        _descriptor: &pngine::bytecode::TextureDescriptor,
        _init_data: Option<&[u8]>,
    ) -> Result<u16, Infallible> {
        self.record(Call::CreateTexture { id });
        Ok(id)
    }

    fn create_sampler(
        &mut self,
        id: u16,
        _descriptor: &pngine::bytecode::SamplerDescriptor,
    ) -> Result<u16, Infallible> {
        self.record(Call::CreateSampler { id });
        Ok(id)
    }

    fn create_shader_module(&mut self, id: u16, _wgsl: &str) -> Result<u16, Infallible> {
        self.record(Call::CreateShader { id });
        Ok(id)
    }

    fn create_render_pipeline(
        &mut self,
        id: u16,
        _args: RenderPipelineArgs<'_, Self>,
    ) -> Result<u16, Infallible> {
        self.record(Call::CreateRenderPipeline { id });
        Ok(id)
    }

    fn create_compute_pipeline(
        &mut self,
        id: u16,
        _args: ComputePipelineArgs<'_, Self>,
    ) -> Result<u16, Infallible> {
        self.record(Call::CreateComputePipeline { id });
        Ok(id)
    }

    fn create_bind_group(
        &mut self,
        id: u16,
        _layout: &pngine::bytecode::BindGroupLayoutDescriptor,
        bindings: &[BindGroupBinding<'_, Self>],
    ) -> Result<u16, Infallible> {
        self.record(Call::CreateBindGroup {
            id,
            bindings: bindings.len(),
        });
        Ok(id)
    }

    fn begin_render_pass(
        &mut self,
        color: Attachment<'_, Self>,
        load: LoadOp,
        store: StoreOp,
        depth: Option<&u16>,
    ) -> Result<(), Infallible> {
        self.record(Call::BeginRenderPass {
            surface: matches!(color, Attachment::Surface),
            load,
            store,
            depth: depth.is_some(),
        });
        Ok(())
    }

    fn begin_compute_pass(&mut self) -> Result<(), Infallible> {
        self.record(Call::BeginComputePass);
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: PipelineRef<'_, Self>) -> Result<(), Infallible> {
        let call = match pipeline {
            PipelineRef::Render(&id) => Call::SetRenderPipeline(id),
            PipelineRef::Compute(&id) => Call::SetComputePipeline(id),
        };
        self.record(call);
        Ok(())
    }

    fn set_bind_group(&mut self, slot: u8, group: &u16) -> Result<(), Infallible> {
        self.record(Call::SetBindGroup { slot, id: *group });
        Ok(())
    }

    fn set_vertex_buffer(&mut self, slot: u8, buffer: &u16) -> Result<(), Infallible> {
        self.record(Call::SetVertexBuffer {
            slot,
            id: *buffer,
        });
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: &u16, format: IndexFormat) -> Result<(), Infallible> {
        self.record(Call::SetIndexBuffer {
            id: *buffer,
            format,
        });
        Ok(())
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) -> Result<(), Infallible> {
        self.record(Call::Draw {
            vertices: vertex_count,
            instances: instance_count,
        });
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _base_vertex: i32,
        _first_instance: u32,
    ) -> Result<(), Infallible> {
        self.record(Call::DrawIndexed {
            indices: index_count,
        });
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), Infallible> {
        self.record(Call::Dispatch { x, y, z });
        Ok(())
    }

    fn end_pass(&mut self) -> Result<(), Infallible> {
        self.record(Call::EndPass);
        Ok(())
    }

    fn write_buffer(&mut self, buffer: &u16, offset: u32, data: &[u8]) -> Result<(), Infallible> {
        self.record(Call::WriteBuffer {
            buffer: *buffer,
            offset,
            bytes: data.to_vec(),
        });
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: &u16,
        _src_offset: u32,
        dst: &u16,
        _dst_offset: u32,
        size: u32,
    ) -> Result<(), Infallible> {
        self.record(Call::CopyBuffer {
            src: *src,
            dst: *dst,
            size,
        });
        Ok(())
    }

    fn submit(&mut self) -> Result<(), Infallible> {
        self.record(Call::Submit);
        Ok(())
    }

    fn init_wasm_module(&mut self, id: u16, _bytes: &[u8]) -> Result<u16, Infallible> {
        self.record(Call::InitWasm { id });
        Ok(id)
    }

    fn call_wasm_func(
        &mut self,
        module: &u16,
        name: &str,
        args: &[u32],
        output: Option<WasmOutput<'_, Self>>,
    ) -> Result<(), Infallible> {
        self.record(Call::CallWasm {
            module: *module,
            name: name.to_string(),
            args: args.to_vec(),
            output: output.map(|o| *o.buffer),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers

const ALL_PLUGINS: PluginSet = PluginSet(0xFF);
const SURFACE: SurfaceSize = SurfaceSize {
    width: 640,
    height: 480,
};

fn dispatcher(module: &Module) -> Dispatcher<'_, RecordingBackend> {
    Dispatcher::new(module, RecordingBackend::default(), SURFACE, ALL_PLUGINS)
        .expect("module validates")
}

fn compile(source: &str) -> Module {
    compile_with_loader(source, &Options::default(), &NoReflection, &MemoryLoader::new())
        .expect("compiles")
}

fn raw_module(instructions: &[Instruction], plugins: PluginSet) -> Module {
    let mut w = Writer::new();
    for instruction in instructions {
        instruction.encode(&mut w);
    }
    Module {
        version: VERSION,
        plugins,
        executor: None,
        bytecode: w.into_bytes(),
        data: Vec::new(),
        has_animation_table: false,
    }
}

const TRIANGLE: &str = r#"
    #wgsl s { code="@vertex fn v()->@builtin(position) vec4f { return vec4f(0.0); }
                    @fragment fn f()->@location(0) vec4f { return vec4f(1.0); }" }
    #renderPipeline p { layout=auto vertex={module=s entryPoint="v"}
                        fragment={module=s entryPoint="f"
                                  targets=[{format=preferredCanvasFormat}]} }
    #renderPass r { colorAttachments=[{ view=contextCurrentTexture
                                        loadOp=clear storeOp=store }]
                    pipeline=p draw=3 }
    #frame main { perform=[r] }
"#;

// ---------------------------------------------------------------------------
// Scenarios

#[test]
fn triangle_replays_against_the_backend() {
    let module = compile(TRIANGLE);
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();

    let frame = vec![
        Call::BeginRenderPass {
            surface: true,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            depth: false,
        },
        Call::SetRenderPipeline(0),
        Call::Draw {
            vertices: 3,
            instances: 1,
        },
        Call::EndPass,
        Call::Submit,
    ];
    let mut expected = vec![
        Call::CreateShader { id: 0 },
        Call::CreateRenderPipeline { id: 0 },
    ];
    expected.extend(frame.iter().cloned());
    assert_eq!(dispatcher.backend_mut().drain(), expected);

    // Each run_frame replays the frame subsequence.
    let outcome = dispatcher.run_frame(FrameTime::default()).unwrap();
    assert_eq!(outcome, FrameOutcome::Submitted);
    assert_eq!(dispatcher.backend_mut().drain(), frame);
}

#[test]
fn nested_render_passes_are_rejected() {
    let begin = Instruction::BeginRenderPass {
        color_tex: SURFACE_TEXTURE_ID,
        load: LoadOp::Clear,
        store: StoreOp::Store,
        depth_tex: NO_DEPTH_ID,
    };
    let module = raw_module(
        &[
            begin,
            begin,
            Instruction::EndPass,
            Instruction::Submit,
            Instruction::End,
        ],
        PluginSet::new() | PluginSet::RENDER,
    );
    let mut dispatcher = dispatcher(&module);
    let err = dispatcher.run_to_end().unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InvalidPassState {
            opcode: "begin_render_pass",
            ..
        }
    ));
    // The program counter stays on the faulting opcode.
    assert_eq!(dispatcher.pc(), 7);
}

#[test]
fn draw_outside_a_render_pass_is_rejected() {
    let module = raw_module(
        &[
            Instruction::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            },
            Instruction::End,
        ],
        PluginSet::new() | PluginSet::RENDER,
    );
    let mut dispatcher = dispatcher(&module);
    assert!(matches!(
        dispatcher.run_to_end().unwrap_err(),
        DispatchError::InvalidPassState { opcode: "draw", .. }
    ));
}

#[test]
fn missing_plugin_bit_blocks_render_opcodes() {
    let module = raw_module(
        &[
            Instruction::BeginRenderPass {
                color_tex: SURFACE_TEXTURE_ID,
                load: LoadOp::Clear,
                store: StoreOp::Store,
                depth_tex: NO_DEPTH_ID,
            },
            Instruction::EndPass,
            Instruction::Submit,
            Instruction::End,
        ],
        PluginSet::new(),
    );
    let mut dispatcher = dispatcher(&module);
    assert!(matches!(
        dispatcher.run_to_end().unwrap_err(),
        DispatchError::PluginNotEnabled("render")
    ));
}

#[test]
fn opcode_budget_bounds_every_run() {
    let mut instructions = vec![Instruction::Submit; pngine_vm::MAX_OPCODES as usize];
    instructions.push(Instruction::End);
    let module = raw_module(&instructions, PluginSet::new());
    let mut backend = RecordingBackend::default();
    backend.quiet = true;
    let mut dispatcher = Dispatcher::new(&module, backend, SURFACE, ALL_PLUGINS).unwrap();
    assert!(matches!(
        dispatcher.run_to_end().unwrap_err(),
        DispatchError::OpcodeLimitExceeded
    ));
}

fn animated_source(end_behavior: &str) -> String {
    let mut source = String::from(
        "#wgsl s { code=\"@vertex fn v()->@builtin(position) vec4f { return vec4f(0.0); }\" }\n\
         #renderPipeline p { layout=auto vertex={module=s entryPoint=\"v\"} }\n",
    );
    for (frame, draw) in [("a", 3), ("b", 6), ("c", 9)].iter() {
        source.push_str(&format!(
            "#renderPass pass_{f} {{ colorAttachments=[{{view=contextCurrentTexture loadOp=clear storeOp=store}}] pipeline=p draw={d} }}\n\
             #frame frame_{f} {{ perform=[pass_{f}] }}\n",
            f = frame,
            d = draw
        ));
    }
    source.push_str(&format!(
        "#animation a {{ frame=frame_a start=0 end=10 endBehavior={eb} }}\n\
         #animation b {{ frame=frame_b start=10 end=20 endBehavior={eb} }}\n\
         #animation c {{ frame=frame_c start=20 end=30 endBehavior={eb} }}\n",
        eb = end_behavior
    ));
    source
}

fn draws_of(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::Draw { vertices, .. } => Some(*vertices),
            _ => None,
        })
        .collect()
}

#[test]
fn animation_selects_the_scene_for_the_current_time() {
    let module = compile(&animated_source("hold"));
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();
    dispatcher.backend_mut().drain();

    dispatcher
        .run_frame(FrameTime { total: 12.0, delta: 0.016 })
        .unwrap();
    assert_eq!(draws_of(&dispatcher.backend_mut().drain()), vec![6]);

    // Past the covered range, hold keeps the last scene.
    dispatcher
        .run_frame(FrameTime { total: 35.0, delta: 0.016 })
        .unwrap();
    assert_eq!(draws_of(&dispatcher.backend_mut().drain()), vec![9]);
}

#[test]
fn animation_loop_wraps_time_modulo_the_total() {
    let module = compile(&animated_source("loop"));
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();
    dispatcher.backend_mut().drain();

    // 35 mod 30 = 5 falls in the first scene.
    dispatcher
        .run_frame(FrameTime { total: 35.0, delta: 0.016 })
        .unwrap();
    assert_eq!(draws_of(&dispatcher.backend_mut().drain()), vec![3]);
}

#[test]
fn hold_with_overlapping_same_start_scenes_keeps_the_earlier_declaration() {
    // Overlapping intervals are legal; only `end > start` is checked. Two
    // scenes opening at the same instant tie, and past the covered range
    // hold must keep the earlier-declared one.
    let source = "#wgsl s { code=\"@vertex fn v()->@builtin(position) vec4f { return vec4f(0.0); }\" }\n\
                  #renderPipeline p { layout=auto vertex={module=s entryPoint=\"v\"} }\n\
                  #renderPass pass_a { colorAttachments=[{view=contextCurrentTexture loadOp=clear storeOp=store}] pipeline=p draw=3 }\n\
                  #frame frame_a { perform=[pass_a] }\n\
                  #renderPass pass_b { colorAttachments=[{view=contextCurrentTexture loadOp=clear storeOp=store}] pipeline=p draw=6 }\n\
                  #frame frame_b { perform=[pass_b] }\n\
                  #animation a { frame=frame_a start=10 end=20 endBehavior=hold }\n\
                  #animation b { frame=frame_b start=10 end=15 endBehavior=hold }\n";
    let module = compile(source);
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();
    dispatcher.backend_mut().drain();

    dispatcher
        .run_frame(FrameTime { total: 50.0, delta: 0.016 })
        .unwrap();
    assert_eq!(draws_of(&dispatcher.backend_mut().drain()), vec![3]);
}

#[test]
fn animation_stop_goes_idle_past_the_end() {
    let module = compile(&animated_source("stop"));
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();
    dispatcher.backend_mut().drain();

    let outcome = dispatcher
        .run_frame(FrameTime { total: 31.0, delta: 0.016 })
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Idle);
    assert!(dispatcher.backend_mut().drain().is_empty());
}

// ---------------------------------------------------------------------------
// `#init` and per-frame uniforms

struct InitReflector;

impl Reflect for InitReflector {
    fn reflect(&self, _wgsl: &str) -> Result<ShaderReflection, ReflectError> {
        let mut reflection = ShaderReflection::default();
        reflection.bindings.push(BindingInfo {
            group: 0,
            binding: 0,
            name: "params".to_string(),
            address_space: pngine::reflect::AddressSpace::Uniform,
            layout: TypeLayout { size: 16, alignment: 16 },
            array: None,
        });
        reflection.bindings.push(BindingInfo {
            group: 0,
            binding: 1,
            name: "d".to_string(),
            address_space: pngine::reflect::AddressSpace::Storage,
            layout: TypeLayout { size: 1600, alignment: 16 },
            array: Some(ArrayInfo {
                element_count: 100,
                element_stride: 16,
                element_type: "vec4f".to_string(),
            }),
        });
        reflection.entry_points.push(EntryPoint {
            name: "main".to_string(),
            stage: ShaderStage::Compute,
            workgroup_size: [64, 1, 1],
        });
        Ok(reflection)
    }
}

const INIT_SOURCE: &str = r#"
    #wgsl w { code="@compute @workgroup_size(64) fn main() {}" }
    #buffer d { size=w.d usage=[STORAGE] }
    #init seed { shader=w params=[time.total time.delta 7 8] }
    #computePipeline cp { layout=auto module=w entryPoint="main" }
    #computePass tick { pipeline=cp dispatch=[1] }
    #frame main { perform=[tick] }
"#;

#[test]
fn init_compiles_to_a_one_shot_compute_sequence() {
    let module = compile_with_loader(
        INIT_SOURCE,
        &Options::default(),
        &InitReflector,
        &MemoryLoader::new(),
    )
    .unwrap();
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();
    let calls = dispatcher.backend_mut().drain();

    // Auto-sized storage buffer plus the synthetic 16-byte params buffer.
    assert!(calls.contains(&Call::CreateBuffer { id: 0, size: 1600 }));
    assert!(calls.contains(&Call::CreateBuffer { id: 1, size: 16 }));
    // The params template writes literals into slots 2 and 3.
    let template = calls.iter().find_map(|c| match c {
        Call::WriteBuffer { buffer: 1, offset: 0, bytes } => Some(bytes.clone()),
        _ => None,
    });
    let template = template.expect("params template written during init");
    assert_eq!(&template[8..12], &7u32.to_le_bytes());
    assert_eq!(&template[12..16], &8u32.to_le_bytes());
    // ceil(100 / 64) workgroups for the seeding dispatch.
    assert!(calls.contains(&Call::Dispatch { x: 2, y: 1, z: 1 }));
    assert_eq!(calls.last(), Some(&Call::Submit));
}

#[test]
fn run_frame_refreshes_runtime_params() {
    let module = compile_with_loader(
        INIT_SOURCE,
        &Options::default(),
        &InitReflector,
        &MemoryLoader::new(),
    )
    .unwrap();
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();
    dispatcher.backend_mut().drain();

    dispatcher
        .run_frame(FrameTime { total: 1.5, delta: 0.25 })
        .unwrap();
    let calls = dispatcher.backend_mut().drain();
    assert_eq!(
        calls[0],
        Call::WriteBuffer {
            buffer: 1,
            offset: 0,
            bytes: 1.5f32.to_le_bytes().to_vec(),
        }
    );
    assert_eq!(
        calls[1],
        Call::WriteBuffer {
            buffer: 1,
            offset: 4,
            bytes: 0.25f32.to_le_bytes().to_vec(),
        }
    );
    assert_eq!(
        &calls[2..],
        &[
            Call::BeginComputePass,
            Call::SetComputePipeline(0),
            Call::Dispatch { x: 1, y: 1, z: 1 },
            Call::EndPass,
            Call::Submit,
        ]
    );
}

// ---------------------------------------------------------------------------
// Wasm calls

#[test]
fn wasm_modules_initialize_once_and_calls_carry_their_arguments() {
    let source = r#"
        #data m { type=u8 values=[0 97 115 109] }
        #buffer out { size=16 usage=[STORAGE COPY_DST] }
        #wasmCall fill { module=m func="run" args=[1 2] output=out }
        #frame main { init=[fill] perform=[fill] }
    "#;
    let module = compile(source);
    let mut dispatcher = dispatcher(&module);
    dispatcher.run_init().unwrap();
    let calls = dispatcher.backend_mut().drain();
    assert!(calls.contains(&Call::InitWasm { id: 0 }));
    assert!(calls.contains(&Call::CallWasm {
        module: 0,
        name: "run".to_string(),
        args: vec![1, 2],
        output: Some(0),
    }));

    dispatcher.run_frame(FrameTime::default()).unwrap();
    let frame_calls = dispatcher.backend_mut().drain();
    // The per-frame call happens again; instantiation does not.
    assert!(!frame_calls.iter().any(|c| matches!(c, Call::InitWasm { .. })));
    assert!(frame_calls
        .iter()
        .any(|c| matches!(c, Call::CallWasm { .. })));
}
