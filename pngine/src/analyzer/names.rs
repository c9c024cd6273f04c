//! DSL spellings of the wire enumerations.
//!
//! The language uses identifier-safe camelCase names; the wire bytes they
//! map to live in `pngine_bytecode::wire`. Names appear here and nowhere
//! else, so a renamed or added member touches one table.

use pngine_bytecode::wire::{
    AddressMode, BindingKind, BlendMode, BufferUsages, CompareFunction, CullMode, EndBehavior,
    FilterMode, FrontFace, IndexFormat, LoadOp, PrimitiveTopology, QueryType, ShaderStages,
    StoreOp, TextureDimension, TextureFormat, TextureUsages, VertexFormat, VertexStepMode,
};

pub fn texture_format(name: &str) -> Option<TextureFormat> {
    let format = match name {
        "preferredCanvasFormat" => TextureFormat::PreferredCanvas,
        "rgba8unorm" => TextureFormat::Rgba8Unorm,
        "rgba8unormSrgb" => TextureFormat::Rgba8UnormSrgb,
        "bgra8unorm" => TextureFormat::Bgra8Unorm,
        "bgra8unormSrgb" => TextureFormat::Bgra8UnormSrgb,
        "r8unorm" => TextureFormat::R8Unorm,
        "rg8unorm" => TextureFormat::Rg8Unorm,
        "r32float" => TextureFormat::R32Float,
        "rg32float" => TextureFormat::Rg32Float,
        "rgba16float" => TextureFormat::Rgba16Float,
        "rgba32float" => TextureFormat::Rgba32Float,
        "r32uint" => TextureFormat::R32Uint,
        "rgba8uint" => TextureFormat::Rgba8Uint,
        "depth24plus" => TextureFormat::Depth24Plus,
        "depth32float" => TextureFormat::Depth32Float,
        _ => return None,
    };
    Some(format)
}

pub fn texture_dimension(name: &str) -> Option<TextureDimension> {
    let dimension = match name {
        "d1" => TextureDimension::D1,
        "d2" => TextureDimension::D2,
        "d3" => TextureDimension::D3,
        _ => return None,
    };
    Some(dimension)
}

pub fn filter_mode(name: &str) -> Option<FilterMode> {
    let mode = match name {
        "nearest" => FilterMode::Nearest,
        "linear" => FilterMode::Linear,
        _ => return None,
    };
    Some(mode)
}

pub fn address_mode(name: &str) -> Option<AddressMode> {
    let mode = match name {
        "clampToEdge" => AddressMode::ClampToEdge,
        "repeat" => AddressMode::Repeat,
        "mirrorRepeat" => AddressMode::MirrorRepeat,
        _ => return None,
    };
    Some(mode)
}

pub fn compare_function(name: &str) -> Option<CompareFunction> {
    let func = match name {
        "never" => CompareFunction::Never,
        "less" => CompareFunction::Less,
        "equal" => CompareFunction::Equal,
        "lessEqual" => CompareFunction::LessEqual,
        "greater" => CompareFunction::Greater,
        "notEqual" => CompareFunction::NotEqual,
        "greaterEqual" => CompareFunction::GreaterEqual,
        "always" => CompareFunction::Always,
        _ => return None,
    };
    Some(func)
}

pub fn load_op(name: &str) -> Option<LoadOp> {
    let op = match name {
        "load" => LoadOp::Load,
        "clear" => LoadOp::Clear,
        _ => return None,
    };
    Some(op)
}

pub fn store_op(name: &str) -> Option<StoreOp> {
    let op = match name {
        "store" => StoreOp::Store,
        "discard" => StoreOp::Discard,
        _ => return None,
    };
    Some(op)
}

pub fn topology(name: &str) -> Option<PrimitiveTopology> {
    let topology = match name {
        "pointList" => PrimitiveTopology::PointList,
        "lineList" => PrimitiveTopology::LineList,
        "lineStrip" => PrimitiveTopology::LineStrip,
        "triangleList" => PrimitiveTopology::TriangleList,
        "triangleStrip" => PrimitiveTopology::TriangleStrip,
        _ => return None,
    };
    Some(topology)
}

pub fn cull_mode(name: &str) -> Option<CullMode> {
    let mode = match name {
        "none" => CullMode::None,
        "front" => CullMode::Front,
        "back" => CullMode::Back,
        _ => return None,
    };
    Some(mode)
}

pub fn front_face(name: &str) -> Option<FrontFace> {
    let face = match name {
        "ccw" => FrontFace::Ccw,
        "cw" => FrontFace::Cw,
        _ => return None,
    };
    Some(face)
}

pub fn index_format(name: &str) -> Option<IndexFormat> {
    let format = match name {
        "uint16" => IndexFormat::Uint16,
        "uint32" => IndexFormat::Uint32,
        _ => return None,
    };
    Some(format)
}

pub fn vertex_format(name: &str) -> Option<VertexFormat> {
    let format = match name {
        "float32" => VertexFormat::Float32,
        "float32x2" => VertexFormat::Float32x2,
        "float32x3" => VertexFormat::Float32x3,
        "float32x4" => VertexFormat::Float32x4,
        "uint32" => VertexFormat::Uint32,
        "uint32x2" => VertexFormat::Uint32x2,
        "uint32x3" => VertexFormat::Uint32x3,
        "uint32x4" => VertexFormat::Uint32x4,
        "sint32" => VertexFormat::Sint32,
        "sint32x2" => VertexFormat::Sint32x2,
        "sint32x3" => VertexFormat::Sint32x3,
        "sint32x4" => VertexFormat::Sint32x4,
        "uint8x4" => VertexFormat::Uint8x4,
        "unorm8x4" => VertexFormat::Unorm8x4,
        _ => return None,
    };
    Some(format)
}

pub fn step_mode(name: &str) -> Option<VertexStepMode> {
    let mode = match name {
        "vertex" => VertexStepMode::Vertex,
        "instance" => VertexStepMode::Instance,
        _ => return None,
    };
    Some(mode)
}

pub fn blend_mode(name: &str) -> Option<BlendMode> {
    let mode = match name {
        "replace" => BlendMode::Replace,
        "alphaBlend" => BlendMode::AlphaBlend,
        "additive" => BlendMode::Additive,
        _ => return None,
    };
    Some(mode)
}

pub fn binding_kind(name: &str) -> Option<BindingKind> {
    let kind = match name {
        "uniform" => BindingKind::UniformBuffer,
        "storage" => BindingKind::StorageBuffer,
        "readOnlyStorage" => BindingKind::ReadOnlyStorageBuffer,
        "sampler" => BindingKind::Sampler,
        "comparisonSampler" => BindingKind::ComparisonSampler,
        "texture" => BindingKind::Texture,
        "storageTexture" => BindingKind::StorageTexture,
        _ => return None,
    };
    Some(kind)
}

pub fn query_type(name: &str) -> Option<QueryType> {
    let ty = match name {
        "occlusion" => QueryType::Occlusion,
        "timestamp" => QueryType::Timestamp,
        _ => return None,
    };
    Some(ty)
}

pub fn end_behavior(name: &str) -> Option<EndBehavior> {
    let behavior = match name {
        "hold" => EndBehavior::Hold,
        "loop" => EndBehavior::Loop,
        "stop" => EndBehavior::Stop,
        _ => return None,
    };
    Some(behavior)
}

pub fn buffer_usage(name: &str) -> Option<BufferUsages> {
    let usage = match name {
        "VERTEX" => BufferUsages::VERTEX,
        "INDEX" => BufferUsages::INDEX,
        "UNIFORM" => BufferUsages::UNIFORM,
        "STORAGE" => BufferUsages::STORAGE,
        "COPY_SRC" => BufferUsages::COPY_SRC,
        "COPY_DST" => BufferUsages::COPY_DST,
        "INDIRECT" => BufferUsages::INDIRECT,
        "QUERY_RESOLVE" => BufferUsages::QUERY_RESOLVE,
        "MAP_READ" => BufferUsages::MAP_READ,
        "MAP_WRITE" => BufferUsages::MAP_WRITE,
        _ => return None,
    };
    Some(usage)
}

pub fn texture_usage(name: &str) -> Option<TextureUsages> {
    let usage = match name {
        "COPY_SRC" => TextureUsages::COPY_SRC,
        "COPY_DST" => TextureUsages::COPY_DST,
        "TEXTURE_BINDING" => TextureUsages::TEXTURE_BINDING,
        "STORAGE_BINDING" => TextureUsages::STORAGE_BINDING,
        "RENDER_ATTACHMENT" => TextureUsages::RENDER_ATTACHMENT,
        _ => return None,
    };
    Some(usage)
}

pub fn shader_stage(name: &str) -> Option<ShaderStages> {
    let stage = match name {
        "VERTEX" => ShaderStages::VERTEX,
        "FRAGMENT" => ShaderStages::FRAGMENT,
        "COMPUTE" => ShaderStages::COMPUTE,
        _ => return None,
    };
    Some(stage)
}
