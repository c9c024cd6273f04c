//! Closed enumerations with fixed wire bytes.
//!
//! These sets must match across emitter, validator and every backend. Each
//! enum is declared exactly once, through [`wire_enum!`], which also derives
//! the `to_wire`/`from_wire` pair and an `ALL` table so the round-trip unit
//! test covers every member mechanically.

/// Declares a `u8`-backed wire enumeration plus its codec.
macro_rules! wire_enum {
    (
        $(#[$attr:meta])*
        $name:ident {
            $( $(#[$vattr:meta])* $variant:ident = $byte:literal, )+
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vattr])* $variant = $byte, )+
        }

        impl $name {
            /// Every member, in declaration order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// The byte this member is written as.
            pub const fn to_wire(self) -> u8 {
                self as u8
            }

            /// Decode a wire byte, if it names a member.
            pub fn from_wire(byte: u8) -> Option<$name> {
                match byte {
                    $( $byte => Some($name::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

wire_enum! {
    /// Texel formats a payload may name.
    ///
    /// `PreferredCanvas` is a placeholder resolved by the backend to the
    /// surface's own format; it never describes an offscreen texture.
    TextureFormat {
        PreferredCanvas = 0x00,
        Rgba8Unorm = 0x01,
        Rgba8UnormSrgb = 0x02,
        Bgra8Unorm = 0x03,
        Bgra8UnormSrgb = 0x04,
        R8Unorm = 0x05,
        Rg8Unorm = 0x06,
        R32Float = 0x07,
        Rg32Float = 0x08,
        Rgba16Float = 0x09,
        Rgba32Float = 0x0A,
        R32Uint = 0x0B,
        Rgba8Uint = 0x0C,
        Depth24Plus = 0x0D,
        Depth32Float = 0x0E,
    }
}

impl TextureFormat {
    /// Whether the format is only usable as a depth attachment.
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth24Plus | TextureFormat::Depth32Float)
    }
}

wire_enum! {
    TextureDimension {
        D1 = 0x01,
        D2 = 0x02,
        D3 = 0x03,
    }
}

wire_enum! {
    FilterMode {
        Nearest = 0x00,
        Linear = 0x01,
    }
}

wire_enum! {
    AddressMode {
        ClampToEdge = 0x00,
        Repeat = 0x01,
        MirrorRepeat = 0x02,
    }
}

wire_enum! {
    CompareFunction {
        Never = 0x01,
        Less = 0x02,
        Equal = 0x03,
        LessEqual = 0x04,
        Greater = 0x05,
        NotEqual = 0x06,
        GreaterEqual = 0x07,
        Always = 0x08,
    }
}

wire_enum! {
    LoadOp {
        Load = 0x00,
        Clear = 0x01,
    }
}

wire_enum! {
    StoreOp {
        Store = 0x00,
        Discard = 0x01,
    }
}

wire_enum! {
    PrimitiveTopology {
        PointList = 0x00,
        LineList = 0x01,
        LineStrip = 0x02,
        TriangleList = 0x03,
        TriangleStrip = 0x04,
    }
}

wire_enum! {
    CullMode {
        None = 0x00,
        Front = 0x01,
        Back = 0x02,
    }
}

wire_enum! {
    FrontFace {
        Ccw = 0x00,
        Cw = 0x01,
    }
}

wire_enum! {
    IndexFormat {
        Uint16 = 0x00,
        Uint32 = 0x01,
    }
}

wire_enum! {
    VertexFormat {
        Float32 = 0x01,
        Float32x2 = 0x02,
        Float32x3 = 0x03,
        Float32x4 = 0x04,
        Uint32 = 0x05,
        Uint32x2 = 0x06,
        Uint32x3 = 0x07,
        Uint32x4 = 0x08,
        Sint32 = 0x09,
        Sint32x2 = 0x0A,
        Sint32x3 = 0x0B,
        Sint32x4 = 0x0C,
        Uint8x4 = 0x0D,
        Unorm8x4 = 0x0E,
    }
}

impl VertexFormat {
    /// Byte width of one attribute of this format.
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Sint32 => 4,
            VertexFormat::Float32x2 | VertexFormat::Uint32x2 | VertexFormat::Sint32x2 => 8,
            VertexFormat::Float32x3 | VertexFormat::Uint32x3 | VertexFormat::Sint32x3 => 12,
            VertexFormat::Float32x4 | VertexFormat::Uint32x4 | VertexFormat::Sint32x4 => 16,
            VertexFormat::Uint8x4 | VertexFormat::Unorm8x4 => 4,
        }
    }
}

wire_enum! {
    VertexStepMode {
        Vertex = 0x00,
        Instance = 0x01,
    }
}

wire_enum! {
    /// Fixed blend configurations for render-pipeline color targets.
    BlendMode {
        Replace = 0x00,
        AlphaBlend = 0x01,
        Additive = 0x02,
    }
}

wire_enum! {
    QueryType {
        Occlusion = 0x00,
        Timestamp = 0x01,
    }
}

wire_enum! {
    /// What an animation does when time runs past its last scene.
    EndBehavior {
        Hold = 0x00,
        Loop = 0x01,
        Stop = 0x02,
    }
}

wire_enum! {
    /// The kind of resource bound at a bind-group-layout entry.
    BindingKind {
        UniformBuffer = 0x00,
        StorageBuffer = 0x01,
        ReadOnlyStorageBuffer = 0x02,
        Sampler = 0x03,
        ComparisonSampler = 0x04,
        Texture = 0x05,
        StorageTexture = 0x06,
    }
}

/// Buffer usage bits.
///
/// The in-language set is closed over ten members; the wire byte carries
/// the eight that a replayed payload can express. `MAP_READ`/`MAP_WRITE`
/// describe host mappings and are rejected by the compiler rather than
/// silently dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferUsages(pub u16);

impl BufferUsages {
    pub const VERTEX: BufferUsages = BufferUsages(1 << 0);
    pub const INDEX: BufferUsages = BufferUsages(1 << 1);
    pub const UNIFORM: BufferUsages = BufferUsages(1 << 2);
    pub const STORAGE: BufferUsages = BufferUsages(1 << 3);
    pub const COPY_SRC: BufferUsages = BufferUsages(1 << 4);
    pub const COPY_DST: BufferUsages = BufferUsages(1 << 5);
    pub const INDIRECT: BufferUsages = BufferUsages(1 << 6);
    pub const QUERY_RESOLVE: BufferUsages = BufferUsages(1 << 7);
    pub const MAP_READ: BufferUsages = BufferUsages(1 << 8);
    pub const MAP_WRITE: BufferUsages = BufferUsages(1 << 9);

    pub const fn empty() -> BufferUsages {
        BufferUsages(0)
    }

    pub const fn union(self, other: BufferUsages) -> BufferUsages {
        BufferUsages(self.0 | other.0)
    }

    pub const fn contains(self, other: BufferUsages) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether every set bit survives the eight-bit wire encoding.
    pub const fn is_wire_encodable(self) -> bool {
        self.0 < 0x100
    }

    pub const fn to_wire(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub const fn from_wire(byte: u8) -> BufferUsages {
        BufferUsages(byte as u16)
    }
}

impl core::ops::BitOr for BufferUsages {
    type Output = BufferUsages;
    fn bitor(self, rhs: BufferUsages) -> BufferUsages {
        self.union(rhs)
    }
}

/// Texture usage bits. All members fit the wire byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureUsages(pub u8);

impl TextureUsages {
    pub const COPY_SRC: TextureUsages = TextureUsages(1 << 0);
    pub const COPY_DST: TextureUsages = TextureUsages(1 << 1);
    pub const TEXTURE_BINDING: TextureUsages = TextureUsages(1 << 2);
    pub const STORAGE_BINDING: TextureUsages = TextureUsages(1 << 3);
    pub const RENDER_ATTACHMENT: TextureUsages = TextureUsages(1 << 4);

    pub const fn empty() -> TextureUsages {
        TextureUsages(0)
    }

    pub const fn union(self, other: TextureUsages) -> TextureUsages {
        TextureUsages(self.0 | other.0)
    }

    pub const fn contains(self, other: TextureUsages) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn to_wire(self) -> u8 {
        self.0
    }

    pub const fn from_wire(byte: u8) -> TextureUsages {
        TextureUsages(byte)
    }
}

impl core::ops::BitOr for TextureUsages {
    type Output = TextureUsages;
    fn bitor(self, rhs: TextureUsages) -> TextureUsages {
        self.union(rhs)
    }
}

/// Shader stage visibility bits for bind-group-layout entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderStages(pub u8);

impl ShaderStages {
    pub const VERTEX: ShaderStages = ShaderStages(1 << 0);
    pub const FRAGMENT: ShaderStages = ShaderStages(1 << 1);
    pub const COMPUTE: ShaderStages = ShaderStages(1 << 2);

    pub const fn union(self, other: ShaderStages) -> ShaderStages {
        ShaderStages(self.0 | other.0)
    }

    pub const fn contains(self, other: ShaderStages) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn to_wire(self) -> u8 {
        self.0
    }

    pub const fn from_wire(byte: u8) -> ShaderStages {
        ShaderStages(byte)
    }
}

impl core::ops::BitOr for ShaderStages {
    type Output = ShaderStages;
    fn bitor(self, rhs: ShaderStages) -> ShaderStages {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One mechanical round-trip per closed enumeration. A mismatch here is
    // exactly the class of bug the shared declaration exists to prevent.
    macro_rules! round_trip {
        ($test:ident, $name:ident) => {
            #[test]
            fn $test() {
                for &member in $name::ALL.iter() {
                    assert_eq!($name::from_wire(member.to_wire()), Some(member));
                }
            }
        };
    }

    round_trip!(texture_format, TextureFormat);
    round_trip!(texture_dimension, TextureDimension);
    round_trip!(filter_mode, FilterMode);
    round_trip!(address_mode, AddressMode);
    round_trip!(compare_function, CompareFunction);
    round_trip!(load_op, LoadOp);
    round_trip!(store_op, StoreOp);
    round_trip!(primitive_topology, PrimitiveTopology);
    round_trip!(cull_mode, CullMode);
    round_trip!(front_face, FrontFace);
    round_trip!(index_format, IndexFormat);
    round_trip!(vertex_format, VertexFormat);
    round_trip!(vertex_step_mode, VertexStepMode);
    round_trip!(blend_mode, BlendMode);
    round_trip!(query_type, QueryType);
    round_trip!(end_behavior, EndBehavior);
    round_trip!(binding_kind, BindingKind);

    #[test]
    fn load_and_store_ops_match_their_documented_bytes() {
        assert_eq!(LoadOp::Load.to_wire(), 0x00);
        assert_eq!(LoadOp::Clear.to_wire(), 0x01);
        assert_eq!(StoreOp::Store.to_wire(), 0x00);
        assert_eq!(StoreOp::Discard.to_wire(), 0x01);
    }

    #[test]
    fn buffer_usage_wire_bits() {
        let u = BufferUsages::VERTEX | BufferUsages::COPY_DST;
        assert!(u.is_wire_encodable());
        assert_eq!(BufferUsages::from_wire(u.to_wire()), u);

        let mapped = BufferUsages::MAP_READ | BufferUsages::COPY_DST;
        assert!(!mapped.is_wire_encodable());
    }

    #[test]
    fn texture_usage_wire_bits() {
        let u = TextureUsages::TEXTURE_BINDING | TextureUsages::RENDER_ATTACHMENT;
        assert_eq!(TextureUsages::from_wire(u.to_wire()), u);
    }
}
