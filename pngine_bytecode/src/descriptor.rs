//! Descriptor sub-encodings.
//!
//! Complex resources (textures, samplers, pipelines, bind groups) do not
//! fit in fixed opcode operands. Their `create_*` opcodes instead carry an
//! `(offset, length)` pair into the data section where a tagged record
//! describes the resource:
//!
//! ```text
//!   [0]    DescriptorType tag (u8)
//!   [1..]  sequence of { field_tag:u8, payload } until sentinel 0xFF
//! ```
//!
//! Encode and decode live side by side in this module so the two can never
//! drift apart; the unit tests round-trip every record shape.
//!
//! Bind-group layouts and pipeline layouts have no `create_*` opcodes of
//! their own. Their records are written to the data section tagged with
//! their dense resource id, and the records that need them (bind groups,
//! pipelines) embed a [`LayoutRef`] — the id plus the record's offset — so
//! a decoder can chase the reference and a backend can cache by id.

use crate::bytes::{Reader, Writer};
use crate::wire::{
    AddressMode, BindingKind, BlendMode, CompareFunction, CullMode, FilterMode, FrontFace,
    IndexFormat, PrimitiveTopology, ShaderStages, TextureDimension, TextureFormat, TextureUsages,
    VertexFormat, VertexStepMode,
};
use thiserror::Error;

/// Closes every field sequence.
pub const FIELD_SENTINEL: u8 = 0xFF;

/// The leading tag of a descriptor record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DescriptorType {
    Texture = 0x01,
    Sampler = 0x02,
    BindGroup = 0x03,
    BindGroupLayout = 0x04,
    RenderPipeline = 0x05,
    ComputePipeline = 0x06,
    /// Reserved. Render passes are fully described by their opcode
    /// operands in format v0; the tag is kept so the set stays closed.
    RenderPass = 0x07,
    PipelineLayout = 0x08,
}

impl DescriptorType {
    pub const ALL: &'static [DescriptorType] = &[
        DescriptorType::Texture,
        DescriptorType::Sampler,
        DescriptorType::BindGroup,
        DescriptorType::BindGroupLayout,
        DescriptorType::RenderPipeline,
        DescriptorType::ComputePipeline,
        DescriptorType::RenderPass,
        DescriptorType::PipelineLayout,
    ];

    pub const fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn from_wire(byte: u8) -> Option<DescriptorType> {
        match byte {
            0x01 => Some(DescriptorType::Texture),
            0x02 => Some(DescriptorType::Sampler),
            0x03 => Some(DescriptorType::BindGroup),
            0x04 => Some(DescriptorType::BindGroupLayout),
            0x05 => Some(DescriptorType::RenderPipeline),
            0x06 => Some(DescriptorType::ComputePipeline),
            0x07 => Some(DescriptorType::RenderPass),
            0x08 => Some(DescriptorType::PipelineLayout),
            _ => None,
        }
    }
}

/// A descriptor record failed to decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("descriptor record ends unexpectedly")]
    UnexpectedEnd,
    #[error("expected descriptor type 0x{expected:02X}, found 0x{found:02X}")]
    WrongDescriptorType { expected: u8, found: u8 },
    #[error("unknown field tag 0x{tag:02X} in descriptor 0x{descriptor:02X}")]
    UnknownFieldTag { descriptor: u8, tag: u8 },
    #[error("byte 0x{value:02X} is not a valid {what}")]
    UnknownEnumValue { what: &'static str, value: u8 },
    #[error("descriptor {descriptor} is missing its {field} field")]
    MissingField {
        descriptor: &'static str,
        field: &'static str,
    },
    #[error("descriptor string is not UTF-8")]
    BadString,
}

fn enum_byte<T>(
    r: &mut Reader,
    what: &'static str,
    from: impl Fn(u8) -> Option<T>,
) -> Result<T, WireError> {
    let byte = r.u8().ok_or(WireError::UnexpectedEnd)?;
    from(byte).ok_or(WireError::UnknownEnumValue { what, value: byte })
}

fn short_string(r: &mut Reader) -> Result<String, WireError> {
    let len = r.u8().ok_or(WireError::UnexpectedEnd)? as usize;
    let mut buf = Vec::with_capacity(len);
    for _ in 0..len {
        buf.push(r.u8().ok_or(WireError::UnexpectedEnd)?);
    }
    String::from_utf8(buf).map_err(|_| WireError::BadString)
}

fn put_short_string(w: &mut Writer, s: &str) {
    debug_assert!(s.len() <= u8::MAX as usize);
    w.u8(s.len() as u8);
    w.raw(s.as_bytes());
}

fn expect_type(r: &mut Reader, expected: DescriptorType) -> Result<(), WireError> {
    let found = r.u8().ok_or(WireError::UnexpectedEnd)?;
    if found != expected.to_wire() {
        return Err(WireError::WrongDescriptorType {
            expected: expected.to_wire(),
            found,
        });
    }
    Ok(())
}

/// A by-id, by-offset reference to a layout record elsewhere in the data
/// section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutRef {
    /// Dense id assigned by the compiler, usable as a backend cache key.
    pub id: u16,
    /// Offset of the referenced record within the data section.
    pub offset: u32,
}

impl LayoutRef {
    fn encode(&self, w: &mut Writer) {
        w.u16(self.id);
        w.u32(self.offset);
    }

    fn decode(r: &mut Reader) -> Result<LayoutRef, WireError> {
        let id = r.u16().ok_or(WireError::UnexpectedEnd)?;
        let offset = r.u32().ok_or(WireError::UnexpectedEnd)?;
        Ok(LayoutRef { id, offset })
    }
}

// ---------------------------------------------------------------------------
// Texture

mod texture_field {
    pub const WIDTH: u8 = 0x01;
    pub const HEIGHT: u8 = 0x02;
    pub const DEPTH: u8 = 0x03;
    pub const FORMAT: u8 = 0x04;
    pub const USAGE: u8 = 0x05;
    pub const DIMENSION: u8 = 0x06;
    pub const MIP_LEVEL_COUNT: u8 = 0x07;
    pub const SAMPLE_COUNT: u8 = 0x08;
    pub const VIEW_FORMATS: u8 = 0x09;
    pub const INIT_DATA: u8 = 0x0A;
}

/// Describes a texture to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: TextureFormat,
    pub usage: TextureUsages,
    pub dimension: TextureDimension,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub view_formats: Vec<TextureFormat>,
    /// Encoded image bytes in the data section that the backend uploads at
    /// creation (the `#imageBitmap` path). `(offset, length)`.
    pub init_data: Option<(u32, u32)>,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        TextureDescriptor {
            width: 1,
            height: 1,
            depth: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING,
            dimension: TextureDimension::D2,
            mip_level_count: 1,
            sample_count: 1,
            view_formats: Vec::new(),
            init_data: None,
        }
    }
}

impl TextureDescriptor {
    pub fn encode(&self, w: &mut Writer) {
        w.u8(DescriptorType::Texture.to_wire());
        w.u8(texture_field::WIDTH);
        w.u32(self.width);
        w.u8(texture_field::HEIGHT);
        w.u32(self.height);
        if self.depth != 1 {
            w.u8(texture_field::DEPTH);
            w.u32(self.depth);
        }
        w.u8(texture_field::FORMAT);
        w.u8(self.format.to_wire());
        w.u8(texture_field::USAGE);
        w.u8(self.usage.to_wire());
        if self.dimension != TextureDimension::D2 {
            w.u8(texture_field::DIMENSION);
            w.u8(self.dimension.to_wire());
        }
        if self.mip_level_count != 1 {
            w.u8(texture_field::MIP_LEVEL_COUNT);
            w.u32(self.mip_level_count);
        }
        if self.sample_count != 1 {
            w.u8(texture_field::SAMPLE_COUNT);
            w.u32(self.sample_count);
        }
        if !self.view_formats.is_empty() {
            w.u8(texture_field::VIEW_FORMATS);
            w.u8(self.view_formats.len() as u8);
            for format in &self.view_formats {
                w.u8(format.to_wire());
            }
        }
        if let Some((off, len)) = self.init_data {
            w.u8(texture_field::INIT_DATA);
            w.u32(off);
            w.u32(len);
        }
        w.u8(FIELD_SENTINEL);
    }

    pub fn decode(bytes: &[u8]) -> Result<TextureDescriptor, WireError> {
        let mut r = Reader::new(bytes);
        expect_type(&mut r, DescriptorType::Texture)?;
        let mut desc = TextureDescriptor::default();
        loop {
            let tag = r.u8().ok_or(WireError::UnexpectedEnd)?;
            match tag {
                FIELD_SENTINEL => break,
                texture_field::WIDTH => desc.width = r.u32().ok_or(WireError::UnexpectedEnd)?,
                texture_field::HEIGHT => desc.height = r.u32().ok_or(WireError::UnexpectedEnd)?,
                texture_field::DEPTH => desc.depth = r.u32().ok_or(WireError::UnexpectedEnd)?,
                texture_field::FORMAT => {
                    desc.format = enum_byte(&mut r, "TextureFormat", TextureFormat::from_wire)?
                }
                texture_field::USAGE => {
                    desc.usage =
                        TextureUsages::from_wire(r.u8().ok_or(WireError::UnexpectedEnd)?)
                }
                texture_field::DIMENSION => {
                    desc.dimension =
                        enum_byte(&mut r, "TextureDimension", TextureDimension::from_wire)?
                }
                texture_field::MIP_LEVEL_COUNT => {
                    desc.mip_level_count = r.u32().ok_or(WireError::UnexpectedEnd)?
                }
                texture_field::SAMPLE_COUNT => {
                    desc.sample_count = r.u32().ok_or(WireError::UnexpectedEnd)?
                }
                texture_field::VIEW_FORMATS => {
                    let count = r.u8().ok_or(WireError::UnexpectedEnd)?;
                    desc.view_formats.clear();
                    for _ in 0..count {
                        desc.view_formats.push(enum_byte(
                            &mut r,
                            "TextureFormat",
                            TextureFormat::from_wire,
                        )?);
                    }
                }
                texture_field::INIT_DATA => {
                    let off = r.u32().ok_or(WireError::UnexpectedEnd)?;
                    let len = r.u32().ok_or(WireError::UnexpectedEnd)?;
                    desc.init_data = Some((off, len));
                }
                _ => {
                    return Err(WireError::UnknownFieldTag {
                        descriptor: DescriptorType::Texture.to_wire(),
                        tag,
                    })
                }
            }
        }
        Ok(desc)
    }
}

// ---------------------------------------------------------------------------
// Sampler

mod sampler_field {
    pub const ADDRESS_MODE_U: u8 = 0x01;
    pub const ADDRESS_MODE_V: u8 = 0x02;
    pub const ADDRESS_MODE_W: u8 = 0x03;
    pub const MAG_FILTER: u8 = 0x04;
    pub const MIN_FILTER: u8 = 0x05;
    pub const MIPMAP_FILTER: u8 = 0x06;
    pub const COMPARE: u8 = 0x07;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub compare: Option<CompareFunction>,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        SamplerDescriptor {
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            compare: None,
        }
    }
}

impl SamplerDescriptor {
    pub fn encode(&self, w: &mut Writer) {
        w.u8(DescriptorType::Sampler.to_wire());
        let fields = [
            (sampler_field::ADDRESS_MODE_U, self.address_mode_u.to_wire()),
            (sampler_field::ADDRESS_MODE_V, self.address_mode_v.to_wire()),
            (sampler_field::ADDRESS_MODE_W, self.address_mode_w.to_wire()),
            (sampler_field::MAG_FILTER, self.mag_filter.to_wire()),
            (sampler_field::MIN_FILTER, self.min_filter.to_wire()),
            (sampler_field::MIPMAP_FILTER, self.mipmap_filter.to_wire()),
        ];
        for (tag, byte) in fields.iter() {
            w.u8(*tag);
            w.u8(*byte);
        }
        if let Some(compare) = self.compare {
            w.u8(sampler_field::COMPARE);
            w.u8(compare.to_wire());
        }
        w.u8(FIELD_SENTINEL);
    }

    pub fn decode(bytes: &[u8]) -> Result<SamplerDescriptor, WireError> {
        let mut r = Reader::new(bytes);
        expect_type(&mut r, DescriptorType::Sampler)?;
        let mut desc = SamplerDescriptor::default();
        loop {
            let tag = r.u8().ok_or(WireError::UnexpectedEnd)?;
            match tag {
                FIELD_SENTINEL => break,
                sampler_field::ADDRESS_MODE_U => {
                    desc.address_mode_u = enum_byte(&mut r, "AddressMode", AddressMode::from_wire)?
                }
                sampler_field::ADDRESS_MODE_V => {
                    desc.address_mode_v = enum_byte(&mut r, "AddressMode", AddressMode::from_wire)?
                }
                sampler_field::ADDRESS_MODE_W => {
                    desc.address_mode_w = enum_byte(&mut r, "AddressMode", AddressMode::from_wire)?
                }
                sampler_field::MAG_FILTER => {
                    desc.mag_filter = enum_byte(&mut r, "FilterMode", FilterMode::from_wire)?
                }
                sampler_field::MIN_FILTER => {
                    desc.min_filter = enum_byte(&mut r, "FilterMode", FilterMode::from_wire)?
                }
                sampler_field::MIPMAP_FILTER => {
                    desc.mipmap_filter = enum_byte(&mut r, "FilterMode", FilterMode::from_wire)?
                }
                sampler_field::COMPARE => {
                    desc.compare =
                        Some(enum_byte(&mut r, "CompareFunction", CompareFunction::from_wire)?)
                }
                _ => {
                    return Err(WireError::UnknownFieldTag {
                        descriptor: DescriptorType::Sampler.to_wire(),
                        tag,
                    })
                }
            }
        }
        Ok(desc)
    }
}

// ---------------------------------------------------------------------------
// Bind group layout

mod bind_group_layout_field {
    pub const ID: u8 = 0x01;
    pub const ENTRY: u8 = 0x02;
}

/// One slot of a bind-group layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingLayout {
    pub binding: u8,
    pub visibility: ShaderStages,
    pub kind: BindingKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindGroupLayoutDescriptor {
    pub id: u16,
    pub entries: Vec<BindingLayout>,
}

impl BindGroupLayoutDescriptor {
    pub fn encode(&self, w: &mut Writer) {
        w.u8(DescriptorType::BindGroupLayout.to_wire());
        w.u8(bind_group_layout_field::ID);
        w.u16(self.id);
        for entry in &self.entries {
            w.u8(bind_group_layout_field::ENTRY);
            w.u8(entry.binding);
            w.u8(entry.visibility.to_wire());
            w.u8(entry.kind.to_wire());
        }
        w.u8(FIELD_SENTINEL);
    }

    pub fn decode(bytes: &[u8]) -> Result<BindGroupLayoutDescriptor, WireError> {
        let mut r = Reader::new(bytes);
        expect_type(&mut r, DescriptorType::BindGroupLayout)?;
        let mut desc = BindGroupLayoutDescriptor::default();
        loop {
            let tag = r.u8().ok_or(WireError::UnexpectedEnd)?;
            match tag {
                FIELD_SENTINEL => break,
                bind_group_layout_field::ID => {
                    desc.id = r.u16().ok_or(WireError::UnexpectedEnd)?
                }
                bind_group_layout_field::ENTRY => {
                    let binding = r.u8().ok_or(WireError::UnexpectedEnd)?;
                    let visibility =
                        ShaderStages::from_wire(r.u8().ok_or(WireError::UnexpectedEnd)?);
                    let kind = enum_byte(&mut r, "BindingKind", BindingKind::from_wire)?;
                    desc.entries.push(BindingLayout {
                        binding,
                        visibility,
                        kind,
                    });
                }
                _ => {
                    return Err(WireError::UnknownFieldTag {
                        descriptor: DescriptorType::BindGroupLayout.to_wire(),
                        tag,
                    })
                }
            }
        }
        Ok(desc)
    }
}

// ---------------------------------------------------------------------------
// Pipeline layout

mod pipeline_layout_field {
    pub const ID: u8 = 0x01;
    pub const BIND_GROUP_LAYOUT: u8 = 0x02;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineLayoutDescriptor {
    pub id: u16,
    pub bind_group_layouts: Vec<LayoutRef>,
}

impl PipelineLayoutDescriptor {
    pub fn encode(&self, w: &mut Writer) {
        w.u8(DescriptorType::PipelineLayout.to_wire());
        w.u8(pipeline_layout_field::ID);
        w.u16(self.id);
        for layout in &self.bind_group_layouts {
            w.u8(pipeline_layout_field::BIND_GROUP_LAYOUT);
            layout.encode(w);
        }
        w.u8(FIELD_SENTINEL);
    }

    pub fn decode(bytes: &[u8]) -> Result<PipelineLayoutDescriptor, WireError> {
        let mut r = Reader::new(bytes);
        expect_type(&mut r, DescriptorType::PipelineLayout)?;
        let mut desc = PipelineLayoutDescriptor::default();
        loop {
            let tag = r.u8().ok_or(WireError::UnexpectedEnd)?;
            match tag {
                FIELD_SENTINEL => break,
                pipeline_layout_field::ID => {
                    desc.id = r.u16().ok_or(WireError::UnexpectedEnd)?
                }
                pipeline_layout_field::BIND_GROUP_LAYOUT => {
                    desc.bind_group_layouts.push(LayoutRef::decode(&mut r)?)
                }
                _ => {
                    return Err(WireError::UnknownFieldTag {
                        descriptor: DescriptorType::PipelineLayout.to_wire(),
                        tag,
                    })
                }
            }
        }
        Ok(desc)
    }
}

// ---------------------------------------------------------------------------
// Bind group

mod bind_group_field {
    pub const LAYOUT: u8 = 0x01;
    pub const ENTRY_BUFFER: u8 = 0x02;
    pub const ENTRY_SAMPLER: u8 = 0x03;
    pub const ENTRY_TEXTURE_VIEW: u8 = 0x04;
}

/// How a bind-group entry views its texture. Zeroed fields inherit from
/// the texture itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureViewDesc {
    pub format: Option<TextureFormat>,
    pub dimension: Option<TextureDimension>,
    pub base_mip_level: u8,
    /// 0 = all remaining levels.
    pub mip_level_count: u8,
    pub base_array_layer: u8,
    /// 0 = all remaining layers.
    pub array_layer_count: u8,
}

impl TextureViewDesc {
    fn encode(&self, w: &mut Writer) {
        w.u8(self.format.map_or(0, TextureFormat::to_wire));
        w.u8(self.dimension.map_or(0, TextureDimension::to_wire));
        w.u8(self.base_mip_level);
        w.u8(self.mip_level_count);
        w.u8(self.base_array_layer);
        w.u8(self.array_layer_count);
    }

    fn decode(r: &mut Reader) -> Result<TextureViewDesc, WireError> {
        let format_byte = r.u8().ok_or(WireError::UnexpectedEnd)?;
        let format = match format_byte {
            0 => None,
            b => Some(TextureFormat::from_wire(b).ok_or(WireError::UnknownEnumValue {
                what: "TextureFormat",
                value: b,
            })?),
        };
        let dimension_byte = r.u8().ok_or(WireError::UnexpectedEnd)?;
        let dimension = match dimension_byte {
            0 => None,
            b => Some(TextureDimension::from_wire(b).ok_or(WireError::UnknownEnumValue {
                what: "TextureDimension",
                value: b,
            })?),
        };
        Ok(TextureViewDesc {
            format,
            dimension,
            base_mip_level: r.u8().ok_or(WireError::UnexpectedEnd)?,
            mip_level_count: r.u8().ok_or(WireError::UnexpectedEnd)?,
            base_array_layer: r.u8().ok_or(WireError::UnexpectedEnd)?,
            array_layer_count: r.u8().ok_or(WireError::UnexpectedEnd)?,
        })
    }
}

/// One bound resource within a bind group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindGroupEntry {
    Buffer {
        binding: u8,
        buffer: u16,
        offset: u32,
        /// 0 = bind the whole buffer.
        size: u32,
    },
    Sampler {
        binding: u8,
        sampler: u16,
    },
    TextureView {
        binding: u8,
        texture: u16,
        view: TextureViewDesc,
    },
}

impl BindGroupEntry {
    pub fn binding(&self) -> u8 {
        match *self {
            BindGroupEntry::Buffer { binding, .. }
            | BindGroupEntry::Sampler { binding, .. }
            | BindGroupEntry::TextureView { binding, .. } => binding,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindGroupDescriptor {
    pub layout: LayoutRef,
    pub entries: Vec<BindGroupEntry>,
}

impl BindGroupDescriptor {
    pub fn encode(&self, w: &mut Writer) {
        w.u8(DescriptorType::BindGroup.to_wire());
        w.u8(bind_group_field::LAYOUT);
        self.layout.encode(w);
        for entry in &self.entries {
            match *entry {
                BindGroupEntry::Buffer {
                    binding,
                    buffer,
                    offset,
                    size,
                } => {
                    w.u8(bind_group_field::ENTRY_BUFFER);
                    w.u8(binding);
                    w.u16(buffer);
                    w.u32(offset);
                    w.u32(size);
                }
                BindGroupEntry::Sampler { binding, sampler } => {
                    w.u8(bind_group_field::ENTRY_SAMPLER);
                    w.u8(binding);
                    w.u16(sampler);
                }
                BindGroupEntry::TextureView {
                    binding,
                    texture,
                    ref view,
                } => {
                    w.u8(bind_group_field::ENTRY_TEXTURE_VIEW);
                    w.u8(binding);
                    w.u16(texture);
                    view.encode(w);
                }
            }
        }
        w.u8(FIELD_SENTINEL);
    }

    pub fn decode(bytes: &[u8]) -> Result<BindGroupDescriptor, WireError> {
        let mut r = Reader::new(bytes);
        expect_type(&mut r, DescriptorType::BindGroup)?;
        let mut layout = None;
        let mut entries = Vec::new();
        loop {
            let tag = r.u8().ok_or(WireError::UnexpectedEnd)?;
            match tag {
                FIELD_SENTINEL => break,
                bind_group_field::LAYOUT => layout = Some(LayoutRef::decode(&mut r)?),
                bind_group_field::ENTRY_BUFFER => {
                    entries.push(BindGroupEntry::Buffer {
                        binding: r.u8().ok_or(WireError::UnexpectedEnd)?,
                        buffer: r.u16().ok_or(WireError::UnexpectedEnd)?,
                        offset: r.u32().ok_or(WireError::UnexpectedEnd)?,
                        size: r.u32().ok_or(WireError::UnexpectedEnd)?,
                    });
                }
                bind_group_field::ENTRY_SAMPLER => {
                    entries.push(BindGroupEntry::Sampler {
                        binding: r.u8().ok_or(WireError::UnexpectedEnd)?,
                        sampler: r.u16().ok_or(WireError::UnexpectedEnd)?,
                    });
                }
                bind_group_field::ENTRY_TEXTURE_VIEW => {
                    entries.push(BindGroupEntry::TextureView {
                        binding: r.u8().ok_or(WireError::UnexpectedEnd)?,
                        texture: r.u16().ok_or(WireError::UnexpectedEnd)?,
                        view: TextureViewDesc::decode(&mut r)?,
                    });
                }
                _ => {
                    return Err(WireError::UnknownFieldTag {
                        descriptor: DescriptorType::BindGroup.to_wire(),
                        tag,
                    })
                }
            }
        }
        let layout = layout.ok_or(WireError::MissingField {
            descriptor: "bind group",
            field: "layout",
        })?;
        Ok(BindGroupDescriptor { layout, entries })
    }
}

// ---------------------------------------------------------------------------
// Render pipeline

mod render_pipeline_field {
    pub const LAYOUT: u8 = 0x01;
    pub const VERTEX_MODULE: u8 = 0x02;
    pub const VERTEX_ENTRY: u8 = 0x03;
    pub const FRAGMENT_MODULE: u8 = 0x04;
    pub const FRAGMENT_ENTRY: u8 = 0x05;
    pub const TARGET: u8 = 0x06;
    pub const VERTEX_BUFFER: u8 = 0x07;
    pub const PRIMITIVE: u8 = 0x08;
    pub const DEPTH_STENCIL: u8 = 0x09;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: u32,
    pub shader_location: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub array_stride: u32,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorTarget {
    pub format: TextureFormat,
    pub blend: BlendMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveState {
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub strip_index_format: Option<IndexFormat>,
}

impl Default for PrimitiveState {
    fn default() -> Self {
        PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            strip_index_format: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

/// Pipeline layout as referenced from a pipeline descriptor. `Auto` asks
/// the backend to derive the layout from the shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineLayout {
    Auto,
    Explicit(LayoutRef),
}

impl PipelineLayout {
    fn encode(&self, w: &mut Writer) {
        match *self {
            PipelineLayout::Auto => w.u8(0),
            PipelineLayout::Explicit(layout) => {
                w.u8(1);
                layout.encode(w);
            }
        }
    }

    fn decode(r: &mut Reader) -> Result<PipelineLayout, WireError> {
        match r.u8().ok_or(WireError::UnexpectedEnd)? {
            0 => Ok(PipelineLayout::Auto),
            1 => Ok(PipelineLayout::Explicit(LayoutRef::decode(r)?)),
            b => Err(WireError::UnknownEnumValue {
                what: "PipelineLayout mode",
                value: b,
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPipelineDescriptor {
    pub layout: PipelineLayout,
    pub vertex_module: u16,
    pub vertex_entry: String,
    pub fragment: Option<(u16, String)>,
    pub targets: Vec<ColorTarget>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
}

impl RenderPipelineDescriptor {
    pub fn encode(&self, w: &mut Writer) {
        w.u8(DescriptorType::RenderPipeline.to_wire());
        w.u8(render_pipeline_field::LAYOUT);
        self.layout.encode(w);
        w.u8(render_pipeline_field::VERTEX_MODULE);
        w.u16(self.vertex_module);
        w.u8(render_pipeline_field::VERTEX_ENTRY);
        put_short_string(w, &self.vertex_entry);
        if let Some((module, ref entry)) = self.fragment {
            w.u8(render_pipeline_field::FRAGMENT_MODULE);
            w.u16(module);
            w.u8(render_pipeline_field::FRAGMENT_ENTRY);
            put_short_string(w, entry);
        }
        for target in &self.targets {
            w.u8(render_pipeline_field::TARGET);
            w.u8(target.format.to_wire());
            w.u8(target.blend.to_wire());
        }
        for buffer in &self.vertex_buffers {
            w.u8(render_pipeline_field::VERTEX_BUFFER);
            w.u32(buffer.array_stride);
            w.u8(buffer.step_mode.to_wire());
            w.u8(buffer.attributes.len() as u8);
            for attr in &buffer.attributes {
                w.u8(attr.format.to_wire());
                w.u32(attr.offset);
                w.u8(attr.shader_location);
            }
        }
        w.u8(render_pipeline_field::PRIMITIVE);
        w.u8(self.primitive.topology.to_wire());
        w.u8(self.primitive.cull_mode.to_wire());
        w.u8(self.primitive.front_face.to_wire());
        w.u8(match self.primitive.strip_index_format {
            None => 0,
            Some(IndexFormat::Uint16) => 1,
            Some(IndexFormat::Uint32) => 2,
        });
        if let Some(ds) = self.depth_stencil {
            w.u8(render_pipeline_field::DEPTH_STENCIL);
            w.u8(ds.format.to_wire());
            w.u8(ds.depth_write_enabled as u8);
            w.u8(ds.depth_compare.to_wire());
        }
        w.u8(FIELD_SENTINEL);
    }

    pub fn decode(bytes: &[u8]) -> Result<RenderPipelineDescriptor, WireError> {
        let mut r = Reader::new(bytes);
        expect_type(&mut r, DescriptorType::RenderPipeline)?;
        let mut layout = PipelineLayout::Auto;
        let mut vertex_module = None;
        let mut vertex_entry = None;
        let mut fragment_module = None;
        let mut fragment_entry = None;
        let mut targets = Vec::new();
        let mut vertex_buffers = Vec::new();
        let mut primitive = PrimitiveState::default();
        let mut depth_stencil = None;
        loop {
            let tag = r.u8().ok_or(WireError::UnexpectedEnd)?;
            match tag {
                FIELD_SENTINEL => break,
                render_pipeline_field::LAYOUT => layout = PipelineLayout::decode(&mut r)?,
                render_pipeline_field::VERTEX_MODULE => {
                    vertex_module = Some(r.u16().ok_or(WireError::UnexpectedEnd)?)
                }
                render_pipeline_field::VERTEX_ENTRY => {
                    vertex_entry = Some(short_string(&mut r)?)
                }
                render_pipeline_field::FRAGMENT_MODULE => {
                    fragment_module = Some(r.u16().ok_or(WireError::UnexpectedEnd)?)
                }
                render_pipeline_field::FRAGMENT_ENTRY => {
                    fragment_entry = Some(short_string(&mut r)?)
                }
                render_pipeline_field::TARGET => {
                    let format = enum_byte(&mut r, "TextureFormat", TextureFormat::from_wire)?;
                    let blend = enum_byte(&mut r, "BlendMode", BlendMode::from_wire)?;
                    targets.push(ColorTarget { format, blend });
                }
                render_pipeline_field::VERTEX_BUFFER => {
                    let array_stride = r.u32().ok_or(WireError::UnexpectedEnd)?;
                    let step_mode =
                        enum_byte(&mut r, "VertexStepMode", VertexStepMode::from_wire)?;
                    let count = r.u8().ok_or(WireError::UnexpectedEnd)?;
                    let mut attributes = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        attributes.push(VertexAttribute {
                            format: enum_byte(&mut r, "VertexFormat", VertexFormat::from_wire)?,
                            offset: r.u32().ok_or(WireError::UnexpectedEnd)?,
                            shader_location: r.u8().ok_or(WireError::UnexpectedEnd)?,
                        });
                    }
                    vertex_buffers.push(VertexBufferLayout {
                        array_stride,
                        step_mode,
                        attributes,
                    });
                }
                render_pipeline_field::PRIMITIVE => {
                    primitive.topology =
                        enum_byte(&mut r, "PrimitiveTopology", PrimitiveTopology::from_wire)?;
                    primitive.cull_mode = enum_byte(&mut r, "CullMode", CullMode::from_wire)?;
                    primitive.front_face = enum_byte(&mut r, "FrontFace", FrontFace::from_wire)?;
                    primitive.strip_index_format =
                        match r.u8().ok_or(WireError::UnexpectedEnd)? {
                            0 => None,
                            1 => Some(IndexFormat::Uint16),
                            2 => Some(IndexFormat::Uint32),
                            b => {
                                return Err(WireError::UnknownEnumValue {
                                    what: "strip IndexFormat",
                                    value: b,
                                })
                            }
                        };
                }
                render_pipeline_field::DEPTH_STENCIL => {
                    depth_stencil = Some(DepthStencilState {
                        format: enum_byte(&mut r, "TextureFormat", TextureFormat::from_wire)?,
                        depth_write_enabled: r.u8().ok_or(WireError::UnexpectedEnd)? != 0,
                        depth_compare: enum_byte(
                            &mut r,
                            "CompareFunction",
                            CompareFunction::from_wire,
                        )?,
                    });
                }
                _ => {
                    return Err(WireError::UnknownFieldTag {
                        descriptor: DescriptorType::RenderPipeline.to_wire(),
                        tag,
                    })
                }
            }
        }
        let vertex_module = vertex_module.ok_or(WireError::MissingField {
            descriptor: "render pipeline",
            field: "vertex module",
        })?;
        let vertex_entry = vertex_entry.ok_or(WireError::MissingField {
            descriptor: "render pipeline",
            field: "vertex entry point",
        })?;
        let fragment = match (fragment_module, fragment_entry) {
            (Some(module), Some(entry)) => Some((module, entry)),
            (None, None) => None,
            _ => {
                return Err(WireError::MissingField {
                    descriptor: "render pipeline",
                    field: "fragment entry point",
                })
            }
        };
        Ok(RenderPipelineDescriptor {
            layout,
            vertex_module,
            vertex_entry,
            fragment,
            targets,
            vertex_buffers,
            primitive,
            depth_stencil,
        })
    }
}

// ---------------------------------------------------------------------------
// Compute pipeline

mod compute_pipeline_field {
    pub const LAYOUT: u8 = 0x01;
    pub const MODULE: u8 = 0x02;
    pub const ENTRY: u8 = 0x03;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputePipelineDescriptor {
    pub layout: PipelineLayout,
    pub module: u16,
    pub entry: String,
}

impl ComputePipelineDescriptor {
    pub fn encode(&self, w: &mut Writer) {
        w.u8(DescriptorType::ComputePipeline.to_wire());
        w.u8(compute_pipeline_field::LAYOUT);
        self.layout.encode(w);
        w.u8(compute_pipeline_field::MODULE);
        w.u16(self.module);
        w.u8(compute_pipeline_field::ENTRY);
        put_short_string(w, &self.entry);
        w.u8(FIELD_SENTINEL);
    }

    pub fn decode(bytes: &[u8]) -> Result<ComputePipelineDescriptor, WireError> {
        let mut r = Reader::new(bytes);
        expect_type(&mut r, DescriptorType::ComputePipeline)?;
        let mut layout = PipelineLayout::Auto;
        let mut module = None;
        let mut entry = None;
        loop {
            let tag = r.u8().ok_or(WireError::UnexpectedEnd)?;
            match tag {
                FIELD_SENTINEL => break,
                compute_pipeline_field::LAYOUT => layout = PipelineLayout::decode(&mut r)?,
                compute_pipeline_field::MODULE => {
                    module = Some(r.u16().ok_or(WireError::UnexpectedEnd)?)
                }
                compute_pipeline_field::ENTRY => entry = Some(short_string(&mut r)?),
                _ => {
                    return Err(WireError::UnknownFieldTag {
                        descriptor: DescriptorType::ComputePipeline.to_wire(),
                        tag,
                    })
                }
            }
        }
        Ok(ComputePipelineDescriptor {
            layout,
            module: module.ok_or(WireError::MissingField {
                descriptor: "compute pipeline",
                field: "module",
            })?,
            entry: entry.ok_or(WireError::MissingField {
                descriptor: "compute pipeline",
                field: "entry point",
            })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(encode: impl FnOnce(&mut Writer)) -> Vec<u8> {
        let mut w = Writer::new();
        encode(&mut w);
        w.into_bytes()
    }

    #[test]
    fn descriptor_type_round_trip() {
        for &ty in DescriptorType::ALL.iter() {
            assert_eq!(DescriptorType::from_wire(ty.to_wire()), Some(ty));
        }
    }

    #[test]
    fn texture_round_trip() {
        let desc = TextureDescriptor {
            width: 512,
            height: 256,
            depth: 1,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::RENDER_ATTACHMENT,
            dimension: TextureDimension::D2,
            mip_level_count: 4,
            sample_count: 1,
            view_formats: vec![TextureFormat::Rgba8Unorm],
            init_data: Some((128, 4096)),
        };
        let bytes = bytes_of(|w| desc.encode(w));
        assert_eq!(TextureDescriptor::decode(&bytes), Ok(desc));
    }

    #[test]
    fn sampler_round_trip() {
        let desc = SamplerDescriptor {
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::MirrorRepeat,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Nearest,
            compare: Some(CompareFunction::LessEqual),
        };
        let bytes = bytes_of(|w| desc.encode(w));
        assert_eq!(SamplerDescriptor::decode(&bytes), Ok(desc));
    }

    #[test]
    fn bind_group_layout_round_trip() {
        let desc = BindGroupLayoutDescriptor {
            id: 3,
            entries: vec![
                BindingLayout {
                    binding: 0,
                    visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                    kind: BindingKind::UniformBuffer,
                },
                BindingLayout {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    kind: BindingKind::Sampler,
                },
            ],
        };
        let bytes = bytes_of(|w| desc.encode(w));
        assert_eq!(BindGroupLayoutDescriptor::decode(&bytes), Ok(desc));
    }

    #[test]
    fn pipeline_layout_round_trip() {
        let desc = PipelineLayoutDescriptor {
            id: 0,
            bind_group_layouts: vec![
                LayoutRef { id: 0, offset: 16 },
                LayoutRef { id: 1, offset: 48 },
            ],
        };
        let bytes = bytes_of(|w| desc.encode(w));
        assert_eq!(PipelineLayoutDescriptor::decode(&bytes), Ok(desc));
    }

    #[test]
    fn bind_group_round_trip() {
        let desc = BindGroupDescriptor {
            layout: LayoutRef { id: 2, offset: 64 },
            entries: vec![
                BindGroupEntry::Buffer {
                    binding: 0,
                    buffer: 5,
                    offset: 0,
                    size: 256,
                },
                BindGroupEntry::Sampler {
                    binding: 1,
                    sampler: 0,
                },
                BindGroupEntry::TextureView {
                    binding: 2,
                    texture: 3,
                    view: TextureViewDesc {
                        format: Some(TextureFormat::Rgba8UnormSrgb),
                        ..TextureViewDesc::default()
                    },
                },
            ],
        };
        let bytes = bytes_of(|w| desc.encode(w));
        assert_eq!(BindGroupDescriptor::decode(&bytes), Ok(desc));
    }

    #[test]
    fn render_pipeline_round_trip() {
        let desc = RenderPipelineDescriptor {
            layout: PipelineLayout::Auto,
            vertex_module: 0,
            vertex_entry: "v".to_string(),
            fragment: Some((0, "f".to_string())),
            targets: vec![ColorTarget {
                format: TextureFormat::PreferredCanvas,
                blend: BlendMode::Replace,
            }],
            vertex_buffers: vec![VertexBufferLayout {
                array_stride: 16,
                step_mode: VertexStepMode::Vertex,
                attributes: vec![VertexAttribute {
                    format: VertexFormat::Float32x4,
                    offset: 0,
                    shader_location: 0,
                }],
            }],
            primitive: PrimitiveState::default(),
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth24Plus,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
        };
        let bytes = bytes_of(|w| desc.encode(w));
        assert_eq!(RenderPipelineDescriptor::decode(&bytes), Ok(desc));
    }

    #[test]
    fn compute_pipeline_round_trip() {
        let desc = ComputePipelineDescriptor {
            layout: PipelineLayout::Explicit(LayoutRef { id: 1, offset: 8 }),
            module: 2,
            entry: "main".to_string(),
        };
        let bytes = bytes_of(|w| desc.encode(w));
        assert_eq!(ComputePipelineDescriptor::decode(&bytes), Ok(desc));
    }

    #[test]
    fn unknown_field_tag_is_an_error_not_a_skip() {
        let mut bytes = bytes_of(|w| SamplerDescriptor::default().encode(w));
        // Replace the sentinel with an unknown tag followed by one.
        let sentinel = bytes.len() - 1;
        bytes[sentinel] = 0x7E;
        bytes.push(FIELD_SENTINEL);
        assert_eq!(
            SamplerDescriptor::decode(&bytes),
            Err(WireError::UnknownFieldTag {
                descriptor: DescriptorType::Sampler.to_wire(),
                tag: 0x7E,
            })
        );
    }

    #[test]
    fn truncated_record_is_reported() {
        let bytes = bytes_of(|w| TextureDescriptor::default().encode(w));
        let cut = &bytes[..bytes.len() - 2];
        assert_eq!(TextureDescriptor::decode(cut), Err(WireError::UnexpectedEnd));
    }

    #[test]
    fn type_tag_mismatch_is_reported() {
        let bytes = bytes_of(|w| SamplerDescriptor::default().encode(w));
        assert_eq!(
            TextureDescriptor::decode(&bytes),
            Err(WireError::WrongDescriptorType {
                expected: DescriptorType::Texture.to_wire(),
                found: DescriptorType::Sampler.to_wire(),
            })
        );
    }
}
