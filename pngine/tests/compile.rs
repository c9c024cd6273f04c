//! End-to-end compiles: source text in, decoded opcode streams out.

use pngine::bytecode::instr::Instruction;
use pngine::bytecode::plugin::PluginSet;
use pngine::bytecode::wire::{EndBehavior, LoadOp, StoreOp};
use pngine::bytecode::{Module, NO_DEPTH_ID, SURFACE_TEXTURE_ID};
use pngine::error::CompileErrorKind;
use pngine::reflect::{
    ArrayInfo, BindingInfo, EntryPoint, NoReflection, Reflect, ReflectError, ShaderReflection,
    ShaderStage, TypeLayout,
};
use pngine::{compile_with_loader, MemoryLoader, Options};

fn compile_str(source: &str) -> Result<Module, pngine::Errors> {
    compile_with_loader(source, &Options::default(), &NoReflection, &MemoryLoader::new())
}

fn decode_all(module: &Module) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut pos = 0;
    while pos < module.bytecode.len() {
        let (instruction, next) = Instruction::decode_at(&module.bytecode, pos).expect("decodes");
        instructions.push(instruction);
        pos = next;
    }
    instructions
}

const TRIANGLE: &str = r#"
    #wgsl s { code="@vertex fn v(@builtin(vertex_index) i:u32)->@builtin(position) vec4f
                   { return vec4f(0.0,0.0,0.0,1.0); }
                   @fragment fn f()->@location(0) vec4f
                   { return vec4f(1.0,0.0,0.0,1.0); }" }
    #renderPipeline p { layout=auto vertex={module=s entryPoint="v"}
                        fragment={module=s entryPoint="f"
                                  targets=[{format=preferredCanvasFormat}]} }
    #renderPass r { colorAttachments=[{ view=contextCurrentTexture
                                        clearValue=[0 0 0 1] loadOp=clear storeOp=store }]
                    pipeline=p draw=3 }
    #frame main { perform=[r] }
"#;

#[test]
fn minimal_triangle_stream() {
    let module = compile_str(TRIANGLE).unwrap();
    let ops = decode_all(&module);
    assert!(matches!(
        ops[0],
        Instruction::CreateShader { id: 0, .. }
    ));
    assert!(matches!(
        ops[1],
        Instruction::CreateRenderPipeline { id: 0, .. }
    ));
    assert_eq!(
        ops[2],
        Instruction::BeginRenderPass {
            color_tex: SURFACE_TEXTURE_ID,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            depth_tex: NO_DEPTH_ID,
        }
    );
    assert_eq!(ops[3], Instruction::SetPipeline { id: 0 });
    assert_eq!(
        ops[4],
        Instruction::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    );
    assert_eq!(ops[5], Instruction::EndPass);
    assert_eq!(ops[6], Instruction::Submit);
    assert_eq!(ops[7], Instruction::End);
    assert_eq!(ops.len(), 8);

    assert!(module.plugins.contains(PluginSet::RENDER));
    assert!(!module.plugins.contains(PluginSet::COMPUTE));
}

#[test]
fn triangle_module_validates_with_matching_counts() {
    let module = compile_str(TRIANGLE).unwrap();
    let info = module.validate().unwrap();
    assert_eq!(info.shaders, 1);
    assert_eq!(info.render_pipelines, 1);
    assert_eq!(info.buffers, 0);
    assert_eq!(info.submit_count, 1);
}

#[test]
fn define_expands_to_the_same_bytes_as_a_literal() {
    let defined = compile_str(
        "#define N=3\n#buffer b { size=\"N*16\" usage=[UNIFORM] }\n",
    )
    .unwrap();
    let literal = compile_str("#buffer b { size=48 usage=[UNIFORM] }\n").unwrap();
    assert_eq!(defined.bytecode, literal.bytecode);

    let ops = decode_all(&defined);
    assert!(matches!(
        ops[0],
        Instruction::CreateBuffer { id: 0, size: 48, .. }
    ));
}

#[test]
fn nested_define_chains_resolve() {
    let module = compile_str(
        "#define A=4\n#define B=\"A*2\"\n#define C=\"ceil(B/3)\"\n\
         #buffer b { size=\"C*16\" usage=[STORAGE] }\n",
    )
    .unwrap();
    let ops = decode_all(&module);
    assert!(matches!(
        ops[0],
        Instruction::CreateBuffer { size: 48, .. }
    ));
}

struct StubReflector;

impl Reflect for StubReflector {
    fn reflect(&self, _wgsl: &str) -> Result<ShaderReflection, ReflectError> {
        let mut reflection = ShaderReflection::default();
        reflection.bindings.push(BindingInfo {
            group: 0,
            binding: 0,
            name: "d".to_string(),
            address_space: pngine::reflect::AddressSpace::Storage,
            layout: TypeLayout {
                size: 160,
                alignment: 16,
            },
            array: Some(ArrayInfo {
                element_count: 10,
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

#[test]
fn buffer_size_comes_from_reflection() {
    let source = "#wgsl w { code=\"@group(0)@binding(0) var<storage,read_write> d:array<vec4f,10>;\" }\n\
                  #buffer b { size=w.d usage=[STORAGE] }\n";
    let module =
        compile_with_loader(source, &Options::default(), &StubReflector, &MemoryLoader::new())
            .unwrap();
    let ops = decode_all(&module);
    // create_shader first, then the buffer sized by the reflector.
    assert!(matches!(
        ops[1],
        Instruction::CreateBuffer { size: 160, .. }
    ));
}

#[test]
fn undefined_reference_fails_without_a_module() {
    let errors = compile_str("#renderPass r { pipeline=nope draw=3 }\n\
                              #frame main { perform=[r] }")
        .unwrap_err();
    let rendered = errors.to_string();
    assert!(rendered.contains("E303"), "got: {}", rendered);
    assert!(rendered.contains("nope"), "got: {}", rendered);
}

#[test]
fn duplicate_definitions_are_rejected() {
    let errors = compile_str(
        "#buffer b { size=16 usage=[UNIFORM] }\n#buffer b { size=32 usage=[UNIFORM] }",
    )
    .unwrap_err();
    assert!(errors.to_string().contains("E301"));
}

#[test]
fn zero_sized_buffers_are_rejected() {
    let errors = compile_str("#buffer b { size=0 usage=[UNIFORM] }").unwrap_err();
    assert!(errors.to_string().contains("E302"));
}

#[test]
fn mixed_define_use_is_a_type_mismatch() {
    let errors = compile_str(
        "#define X=\"main\"\n\
         #buffer b { size=X usage=[UNIFORM] }\n",
    )
    .unwrap_err();
    assert!(errors.to_string().contains("E302"), "got: {}", errors);
}

#[test]
fn unknown_properties_are_errors_not_noops() {
    let errors = compile_str("#buffer b { size=16 usage=[UNIFORM] wat=1 }").unwrap_err();
    assert!(errors.to_string().contains("unknown property"));
}

#[test]
fn empty_source_emits_just_the_end_opcode() {
    let module = compile_str("").unwrap();
    assert_eq!(module.bytecode, vec![0xFF]);
    assert!(module.validate().is_ok());
}

#[test]
fn compiling_twice_is_byte_identical() {
    let first = compile_str(TRIANGLE).unwrap();
    let second = compile_str(TRIANGLE).unwrap();
    assert_eq!(first.to_payload(), second.to_payload());
}

#[test]
fn import_order_does_not_change_the_bytecode() {
    let loader = MemoryLoader::new()
        .file("b.pngn", "#buffer b { size=16 usage=[UNIFORM] }")
        .file("c.pngn", "#buffer c { size=32 usage=[STORAGE] }");
    let forward = compile_with_loader(
        "#import \"b.pngn\"\n#import \"c.pngn\"\n",
        &Options::default(),
        &NoReflection,
        &loader,
    )
    .unwrap();
    let backward = compile_with_loader(
        "#import \"c.pngn\"\n#import \"b.pngn\"\n",
        &Options::default(),
        &NoReflection,
        &loader,
    )
    .unwrap();
    assert_eq!(forward.bytecode, backward.bytecode);
    assert_eq!(forward.data, backward.data);
}

#[test]
fn import_cycles_are_reported() {
    let loader = MemoryLoader::new()
        .file("a.pngn", "#import \"b.pngn\"")
        .file("b.pngn", "#import \"a.pngn\"");
    let errors = compile_with_loader(
        "#import \"a.pngn\"",
        &Options::default(),
        &NoReflection,
        &loader,
    )
    .unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e.kind, CompileErrorKind::CyclicImport(_))));
}

#[test]
fn cross_file_references_resolve() {
    let loader = MemoryLoader::new().file(
        "shaders.pngn",
        "#wgsl s { code=\"@vertex fn v() -> @builtin(position) vec4f { return vec4f(0.0); }\" }",
    );
    let source = "#import \"shaders.pngn\"\n\
                  #renderPipeline p { layout=auto vertex={module=s entryPoint=\"v\"} }\n\
                  #renderPass r { colorAttachments=[{view=contextCurrentTexture loadOp=clear storeOp=store}] pipeline=p draw=3 }\n\
                  #frame main { perform=[r] }\n";
    let module =
        compile_with_loader(source, &Options::default(), &NoReflection, &loader).unwrap();
    assert!(module.validate().is_ok());
}

#[test]
fn non_default_clear_values_are_rejected() {
    let source = "#wgsl s { code=\"x\" }\n\
                  #renderPipeline p { layout=auto vertex={module=s entryPoint=\"v\"} }\n\
                  #renderPass r { colorAttachments=[{view=contextCurrentTexture clearValue=[1 0 0 1] loadOp=clear storeOp=store}] pipeline=p draw=3 }\n\
                  #frame main { perform=[r] }\n";
    let errors = compile_str(source).unwrap_err();
    assert!(errors.to_string().contains("clearValue"));
}

#[test]
fn animation_declarations_build_the_scene_table() {
    let source = format!(
        "{}\n\
         #animation first {{ frame=main start=0 end=10 }}\n\
         #animation second {{ frame=main start=10 end=20 endBehavior=loop }}\n",
        TRIANGLE
    );
    let module = compile_str(&source).unwrap();
    assert!(module.has_animation_table);
    assert!(module.plugins.contains(PluginSet::ANIMATION));
    let table = module.animation_table().expect("table decodes");
    assert_eq!(table.scenes.len(), 2);
    assert_eq!(table.end_behavior, EndBehavior::Loop);
    assert_eq!(table.scenes[0].start, 0.0);
    assert_eq!(table.scenes[1].end, 20.0);
    // Scene frame offsets land inside the bytecode.
    for scene in &table.scenes {
        assert!((scene.frame_off as usize) < module.bytecode.len());
    }
}

#[test]
fn data_blocks_initialize_buffers() {
    let source = "#data d { type=f32 values=[1 2 3 4] }\n\
                  #buffer b { usage=[VERTEX COPY_DST] data=d }\n";
    let module = compile_str(source).unwrap();
    let ops = decode_all(&module);
    // Buffer sized from its data, then written once in the init section.
    assert!(matches!(
        ops[0],
        Instruction::CreateBuffer { id: 0, size: 16, .. }
    ));
    let write = ops.iter().find_map(|op| match *op {
        Instruction::WriteBuffer { id, offset, data_off, data_len } => {
            Some((id, offset, data_off, data_len))
        }
        _ => None,
    });
    let (id, offset, data_off, data_len) = write.expect("an init write exists");
    assert_eq!((id, offset, data_len), (0, 0, 16));
    let bytes = module.data_slice(data_off, data_len).unwrap();
    assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
    // The init section closes with its own submit before the end.
    let submits = ops.iter().filter(|op| **op == Instruction::Submit).count();
    assert_eq!(submits, 1);
}

#[test]
fn map_usages_cannot_reach_the_wire() {
    let errors = compile_str("#buffer b { size=16 usage=[MAP_READ COPY_DST] }").unwrap_err();
    assert!(errors.to_string().contains("MAP_READ"));
}
