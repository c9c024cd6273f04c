//! Tokens and spans over the source bytes.
//!
//! A token never owns text: it records the byte range it was cut from, and
//! the source is kept alongside for the rare places that need the
//! characters back. This keeps the lexer allocation-free.

use std::fmt;

/// A half-open byte range into one source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    /// The characters this span covers.
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        &src[self.start..self.end]
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(&self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// One lexed token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// `#buffer`, `#frame`, … — a `#` followed by a keyword from the
    /// fixed macro set.
    Macro(MacroKind),
    Ident,
    Int,
    Hex,
    Float,
    /// A quoted string, quotes included in the span.
    Str,
    Bool,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Dot,
    Eof,
}

impl TokenKind {
    /// A short human name for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Macro(_) => "macro keyword",
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Hex => "hex literal",
            TokenKind::Float => "float",
            TokenKind::Str => "string",
            TokenKind::Bool => "boolean",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Equals => "'='",
            TokenKind::Dot => "'.'",
            TokenKind::Eof => "end of input",
        }
    }
}

/// Every macro the language knows, which doubles as the resource-kind
/// index for the analyzer's symbol tables and the emitter's traversal.
/// One enum, three consumers — the set can only be extended in one place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MacroKind {
    Wgsl = 0,
    Buffer = 1,
    Texture = 2,
    Sampler = 3,
    TextureView = 4,
    BindGroup = 5,
    BindGroupLayout = 6,
    PipelineLayout = 7,
    RenderPipeline = 8,
    ComputePipeline = 9,
    RenderPass = 10,
    ComputePass = 11,
    RenderBundle = 12,
    Frame = 13,
    Data = 14,
    Define = 15,
    Queue = 16,
    Init = 17,
    QuerySet = 18,
    ImageBitmap = 19,
    WasmCall = 20,
    Import = 21,
    Animation = 22,
}

impl MacroKind {
    pub const COUNT: usize = 23;

    pub const ALL: [MacroKind; MacroKind::COUNT] = [
        MacroKind::Wgsl,
        MacroKind::Buffer,
        MacroKind::Texture,
        MacroKind::Sampler,
        MacroKind::TextureView,
        MacroKind::BindGroup,
        MacroKind::BindGroupLayout,
        MacroKind::PipelineLayout,
        MacroKind::RenderPipeline,
        MacroKind::ComputePipeline,
        MacroKind::RenderPass,
        MacroKind::ComputePass,
        MacroKind::RenderBundle,
        MacroKind::Frame,
        MacroKind::Data,
        MacroKind::Define,
        MacroKind::Queue,
        MacroKind::Init,
        MacroKind::QuerySet,
        MacroKind::ImageBitmap,
        MacroKind::WasmCall,
        MacroKind::Import,
        MacroKind::Animation,
    ];

    /// The keyword as written after the `#`.
    pub fn keyword(self) -> &'static str {
        match self {
            MacroKind::Wgsl => "wgsl",
            MacroKind::Buffer => "buffer",
            MacroKind::Texture => "texture",
            MacroKind::Sampler => "sampler",
            MacroKind::TextureView => "textureView",
            MacroKind::BindGroup => "bindGroup",
            MacroKind::BindGroupLayout => "bindGroupLayout",
            MacroKind::PipelineLayout => "pipelineLayout",
            MacroKind::RenderPipeline => "renderPipeline",
            MacroKind::ComputePipeline => "computePipeline",
            MacroKind::RenderPass => "renderPass",
            MacroKind::ComputePass => "computePass",
            MacroKind::RenderBundle => "renderBundle",
            MacroKind::Frame => "frame",
            MacroKind::Data => "data",
            MacroKind::Define => "define",
            MacroKind::Queue => "queue",
            MacroKind::Init => "init",
            MacroKind::QuerySet => "querySet",
            MacroKind::ImageBitmap => "imageBitmap",
            MacroKind::WasmCall => "wasmCall",
            MacroKind::Import => "import",
            MacroKind::Animation => "animation",
        }
    }

    /// Classify a keyword; `None` if it is not in the fixed set.
    pub fn from_keyword(word: &str) -> Option<MacroKind> {
        MacroKind::ALL.iter().copied().find(|k| k.keyword() == word)
    }
}

impl fmt::Display for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_keyword_classifies_back_to_its_kind() {
        for &kind in MacroKind::ALL.iter() {
            assert_eq!(MacroKind::from_keyword(kind.keyword()), Some(kind));
        }
        assert_eq!(MacroKind::from_keyword("notAMacro"), None);
    }
}
