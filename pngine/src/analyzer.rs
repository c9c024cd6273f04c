//! The analyzer.
//!
//! Two passes over the parsed files. Pass 1 walks every top-level
//! declaration into its per-kind symbol table, assigning dense ids in
//! declaration order, and evaluates `#define` constants (string
//! expressions resolve iteratively so chains of constants need no
//! call-stack recursion). Pass 2 resolves every property: textual
//! references against the expected kind's table, numeric values through
//! the expression evaluator, reflection-backed sizes and `#init`
//! bindings, and the plugin set the payload will require.
//!
//! Errors accumulate per entry — a broken buffer does not hide a broken
//! pass — and the compile fails if any were recorded.

use std::collections::HashMap;
use std::path::Path;

use log::debug;
use pngine_bytecode::plugin::PluginSet;
use pngine_bytecode::wire::{BufferUsages, IndexFormat, TextureFormat, TextureUsages};
use pngine_bytecode::{
    BindingLayout, ColorTarget, DepthStencilState, SamplerDescriptor, TextureViewDesc,
    VertexAttribute, VertexBufferLayout,
};
use thiserror::Error;

use crate::analysis::*;
use crate::ast::{NodeId, NodeTag};
use crate::expr::{self, ExprError};
use crate::import::{SourceFile, SourceLoader};
use crate::lexer::string_value;
use crate::reflect::{AddressSpace, Reflect, ReflectError, ShaderReflection, ShaderStage};
use crate::symbol::NodeRef;
use crate::token::{MacroKind, Span};

mod names;

/// One analysis diagnostic, located in a file and span.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{kind}")]
pub struct AnalyzeError {
    pub kind: AnalyzeErrorKind,
    pub file: u16,
    pub span: Span,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum AnalyzeErrorKind {
    #[error("error[E301]: duplicate {kind} definition '{name}'")]
    DuplicateDefinition { kind: MacroKind, name: String },
    #[error("error[E302]: type mismatch: {0}")]
    TypeMismatch(String),
    #[error("error[E303]: undefined reference '{name}'")]
    UndefinedReference { kind: MacroKind, name: String },
    #[error("{0}")]
    InvalidExpression(#[from] ExprError),
    #[error("{0}")]
    ReflectionFailed(#[from] ReflectError),
    #[error("error[E308]: '{0}' is not supported by this format version")]
    UnknownPluginFeature(String),
    #[error("error[E305]: init binding '{0}' cannot be resolved")]
    InvalidInitBinding(String),
}

/// Run both passes over the loaded files.
pub fn analyze(
    files: &[SourceFile],
    reflector: &dyn Reflect,
    loader: &dyn SourceLoader,
    base_dir: &Path,
) -> Result<Analysis, Vec<AnalyzeError>> {
    let mut analyzer = Analyzer {
        files,
        reflector,
        loader,
        base_dir,
        out: Analysis::default(),
        errors: Vec::new(),
        defines: HashMap::new(),
        reflections: HashMap::new(),
        animation_span: None,
    };
    analyzer.declare_all();
    analyzer.resolve_defines();
    analyzer.resolve_all();
    if analyzer.errors.is_empty() {
        debug!(
            "analysis complete: {} shaders, {} buffers, {} frames, plugins 0x{:02x}",
            analyzer.out.shaders.len(),
            analyzer.out.buffers.len(),
            analyzer.out.frames.len(),
            analyzer.out.plugins.to_wire(),
        );
        Ok(analyzer.out)
    } else {
        Err(analyzer.errors)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DefineUse {
    Numeric,
    Text,
}

#[derive(Clone, Debug)]
enum DefineVal {
    Number(f64),
    Text(String),
    /// A string that parsed as an expression but cannot evaluate; the
    /// stored error surfaces if the constant is used numerically.
    Broken(ExprError),
    /// Still waiting on other defines; only observed mid-resolution.
    Pending(String),
}

#[derive(Clone, Debug)]
struct Define {
    value: DefineVal,
    used: Option<DefineUse>,
    decl: NodeRef,
    span: Span,
}

struct Analyzer<'a> {
    files: &'a [SourceFile],
    reflector: &'a dyn Reflect,
    loader: &'a dyn SourceLoader,
    base_dir: &'a Path,
    out: Analysis,
    errors: Vec<AnalyzeError>,
    defines: HashMap<String, Define>,
    reflections: HashMap<u16, ShaderReflection>,
    animation_span: Option<(u16, Span)>,
}

/// The key/value pairs of one object body.
struct Props {
    file: u16,
    entries: Vec<(String, NodeId, Span)>,
}

impl Props {
    fn get(&self, key: &str) -> Option<NodeId> {
        self.entries
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|&(_, node, _)| node)
    }
}

impl<'a> Analyzer<'a> {
    // -----------------------------------------------------------------
    // Pass 1 — declaration

    fn declare_all(&mut self) {
        for (file_idx, file) in self.files.iter().enumerate() {
            let file_idx = file_idx as u16;
            for &root in file.ast.roots() {
                let node = file.ast.node(root);
                let kind = match node.tag {
                    NodeTag::MacroDecl(kind) => kind,
                    _ => continue,
                };
                match kind {
                    MacroKind::Import => continue,
                    MacroKind::Define => self.declare_define(file_idx, root),
                    _ => self.declare_resource(file_idx, root, kind),
                }
            }
        }
    }

    fn declare_define(&mut self, file: u16, root: NodeId) {
        let ast = &self.files[file as usize].ast;
        let children = ast.children(root);
        let name_node = children[0];
        let value_node = children[1];
        let name = self.node_text(file, name_node).to_string();
        let span = ast.node(name_node).span;
        if self.defines.contains_key(&name) {
            self.error(
                file,
                span,
                AnalyzeErrorKind::DuplicateDefinition {
                    kind: MacroKind::Define,
                    name,
                },
            );
            return;
        }
        let decl = NodeRef {
            file,
            node: value_node,
        };
        // Numeric literals resolve immediately; strings wait for the
        // iterative pass so they may reference other constants.
        let value = match self.files[file as usize].ast.node(value_node).tag {
            NodeTag::LitInt | NodeTag::LitHex | NodeTag::LitFloat => {
                match self.literal_number(file, value_node) {
                    Ok(value) => DefineVal::Number(value),
                    Err(err) => {
                        self.errors.push(err);
                        return;
                    }
                }
            }
            NodeTag::LitStr => {
                let text =
                    string_value(&self.files[file as usize].src, self.span_of(file, value_node));
                DefineVal::Pending(text)
            }
            NodeTag::LitBool | NodeTag::Ident | NodeTag::DottedRef => {
                let text = self.node_text(file, value_node).to_string();
                DefineVal::Text(text)
            }
            _ => {
                self.error(
                    file,
                    span,
                    AnalyzeErrorKind::TypeMismatch(
                        "#define takes a literal or string value".to_string(),
                    ),
                );
                return;
            }
        };
        // Defines also occupy their kind's symbol table so the kind set
        // stays uniform.
        let _ = self
            .out
            .symbols
            .table_mut(MacroKind::Define)
            .insert(&name, decl, span);
        self.defines.insert(
            name,
            Define {
                value,
                used: None,
                decl,
                span,
            },
        );
    }

    fn declare_resource(&mut self, file: u16, root: NodeId, kind: MacroKind) {
        let ast = &self.files[file as usize].ast;
        let children = ast.children(root);
        if children.len() != 2 {
            let span = ast.node(root).span;
            self.error(
                file,
                span,
                AnalyzeErrorKind::TypeMismatch(format!("{} requires a name", kind)),
            );
            return;
        }
        let name_node = children[0];
        let body = children[1];
        let span = ast.node(name_node).span;
        let name = self.node_text(file, name_node).to_string();
        let decl = NodeRef { file, node: body };
        self.out.plugins.insert(plugin_of(kind));
        if let Err(existing) = self.out.symbols.table_mut(kind).insert(&name, decl, span) {
            let _ = existing;
            self.error(
                file,
                span,
                AnalyzeErrorKind::DuplicateDefinition { kind, name },
            );
        }
    }

    // -----------------------------------------------------------------
    // `#define` resolution

    /// Resolve string-expression constants without recursion: repeat a
    /// sweep, evaluating every constant whose referenced names are ready,
    /// until a sweep makes no progress. Whatever is left either refers to
    /// an unknown name (treated as plain text) or forms a cycle.
    fn resolve_defines(&mut self) {
        loop {
            let pending: Vec<String> = self
                .defines
                .iter()
                .filter(|(_, d)| matches!(d.value, DefineVal::Pending(_)))
                .map(|(name, _)| name.clone())
                .collect();
            if pending.is_empty() {
                return;
            }
            let mut progressed = false;
            for name in pending {
                let text = match &self.defines[&name].value {
                    DefineVal::Pending(text) => text.clone(),
                    _ => continue,
                };
                let resolved: HashMap<String, f64> = self
                    .defines
                    .iter()
                    .filter_map(|(n, d)| match d.value {
                        DefineVal::Number(v) => Some((n.clone(), v)),
                        _ => None,
                    })
                    .collect();
                let mut blocked_on_pending = false;
                let known: Vec<String> = self.defines.keys().cloned().collect();
                let result = expr::eval(&text, &mut |ident| {
                    if let Some(&value) = resolved.get(ident) {
                        return Some(value);
                    }
                    if known.iter().any(|n| n == ident) {
                        blocked_on_pending = true;
                    }
                    None
                });
                let define = self.defines.get_mut(&name).expect("name came from the map");
                match result {
                    Ok(value) => {
                        define.value = DefineVal::Number(value);
                        progressed = true;
                    }
                    Err(_) if blocked_on_pending => {
                        // Another sweep may unblock it.
                    }
                    Err(err) => {
                        // Not evaluable: plain text, unless it *looked*
                        // numeric and broke mid-way.
                        define.value = match err.reason {
                            expr::ExprErrorReason::UnknownIdentifier(_)
                            | expr::ExprErrorReason::UnexpectedChar(_) => {
                                DefineVal::Text(text.clone())
                            }
                            _ => DefineVal::Broken(err),
                        };
                        progressed = true;
                    }
                }
            }
            if !progressed {
                // Every remaining pending constant is part of a cycle.
                let stuck: Vec<(String, u16, Span)> = self
                    .defines
                    .iter()
                    .filter(|(_, d)| matches!(d.value, DefineVal::Pending(_)))
                    .map(|(n, d)| (n.clone(), d.decl.file, d.span))
                    .collect();
                for (name, file, span) in stuck {
                    self.error(
                        file,
                        span,
                        AnalyzeErrorKind::InvalidExpression(ExprError {
                            reason: expr::ExprErrorReason::UnknownIdentifier(name.clone()),
                            offset: 0,
                        }),
                    );
                    if let Some(d) = self.defines.get_mut(&name) {
                        d.value = DefineVal::Text(String::new());
                    }
                }
                return;
            }
        }
    }

    fn numeric_define(&mut self, name: &str, file: u16, span: Span) -> Option<f64> {
        let define = self.defines.get_mut(name)?;
        match define.used {
            Some(DefineUse::Text) => {
                let kind = AnalyzeErrorKind::TypeMismatch(format!(
                    "constant '{}' is used both as text and as a number",
                    name
                ));
                self.error(file, span, kind);
                return Some(0.0);
            }
            _ => {}
        }
        let define = self.defines.get_mut(name).expect("checked above");
        define.used = Some(DefineUse::Numeric);
        match &define.value {
            DefineVal::Number(value) => Some(*value),
            DefineVal::Broken(err) => {
                let err = err.clone();
                self.error(file, span, AnalyzeErrorKind::InvalidExpression(err));
                Some(0.0)
            }
            DefineVal::Text(_) | DefineVal::Pending(_) => {
                let kind = AnalyzeErrorKind::TypeMismatch(format!(
                    "constant '{}' is not numeric",
                    name
                ));
                self.error(file, span, kind);
                Some(0.0)
            }
        }
    }

    fn text_define(&mut self, name: &str, file: u16, span: Span) -> Option<String> {
        let define = self.defines.get_mut(name)?;
        if define.used == Some(DefineUse::Numeric) {
            let kind = AnalyzeErrorKind::TypeMismatch(format!(
                "constant '{}' is used both as a number and as text",
                name
            ));
            self.error(file, span, kind);
            return Some(String::new());
        }
        let define = self.defines.get_mut(name).expect("checked above");
        define.used = Some(DefineUse::Text);
        match &define.value {
            DefineVal::Text(text) => Some(text.clone()),
            DefineVal::Number(_) | DefineVal::Broken(_) | DefineVal::Pending(_) => {
                let kind = AnalyzeErrorKind::TypeMismatch(format!(
                    "constant '{}' is not text",
                    name
                ));
                self.error(file, span, kind);
                Some(String::new())
            }
        }
    }

    // -----------------------------------------------------------------
    // Pass 2 — resolution

    /// Resolve in dependency order. Every per-kind output vector is
    /// pre-sized to its table so a failed entry leaves a default in its
    /// slot and later ids still line up; `#init` resolution may append
    /// synthetic entries past the pre-sized region.
    fn resolve_all(&mut self) {
        let len = |s: &Self, k: MacroKind| s.out.symbols.table(k).len();

        self.out.shaders = vec![Default::default(); len(self, MacroKind::Wgsl)];
        self.resolve_kind(MacroKind::Wgsl, Analyzer::resolve_shader);
        self.out.datas = vec![Default::default(); len(self, MacroKind::Data)];
        self.resolve_kind(MacroKind::Data, Analyzer::resolve_data);
        self.out.bitmaps = vec![Default::default(); len(self, MacroKind::ImageBitmap)];
        self.resolve_kind(MacroKind::ImageBitmap, Analyzer::resolve_bitmap);
        self.out.buffers = vec![Default::default(); len(self, MacroKind::Buffer)];
        self.resolve_kind(MacroKind::Buffer, Analyzer::resolve_buffer);
        self.out.textures = vec![Default::default(); len(self, MacroKind::Texture)];
        self.resolve_kind(MacroKind::Texture, Analyzer::resolve_texture);
        self.out.views = vec![Default::default(); len(self, MacroKind::TextureView)];
        self.resolve_kind(MacroKind::TextureView, Analyzer::resolve_view);
        self.out.samplers = vec![Default::default(); len(self, MacroKind::Sampler)];
        self.resolve_kind(MacroKind::Sampler, Analyzer::resolve_sampler);
        self.out.bind_group_layouts =
            vec![Default::default(); len(self, MacroKind::BindGroupLayout)];
        self.resolve_kind(MacroKind::BindGroupLayout, Analyzer::resolve_bind_group_layout);
        self.out.pipeline_layouts =
            vec![Default::default(); len(self, MacroKind::PipelineLayout)];
        self.resolve_kind(MacroKind::PipelineLayout, Analyzer::resolve_pipeline_layout);
        self.out.bind_groups = vec![Default::default(); len(self, MacroKind::BindGroup)];
        self.resolve_kind(MacroKind::BindGroup, Analyzer::resolve_bind_group);
        self.out.render_pipelines =
            vec![Default::default(); len(self, MacroKind::RenderPipeline)];
        self.resolve_kind(MacroKind::RenderPipeline, Analyzer::resolve_render_pipeline);
        self.out.compute_pipelines =
            vec![Default::default(); len(self, MacroKind::ComputePipeline)];
        self.resolve_kind(MacroKind::ComputePipeline, Analyzer::resolve_compute_pipeline);
        self.resolve_kind(MacroKind::QuerySet, Analyzer::resolve_query_set);
        self.out.bundles = vec![Default::default(); len(self, MacroKind::RenderBundle)];
        self.resolve_kind(MacroKind::RenderBundle, Analyzer::resolve_bundle);
        self.out.render_passes = vec![Default::default(); len(self, MacroKind::RenderPass)];
        self.resolve_kind(MacroKind::RenderPass, Analyzer::resolve_render_pass);
        self.out.compute_passes = vec![Default::default(); len(self, MacroKind::ComputePass)];
        self.resolve_kind(MacroKind::ComputePass, Analyzer::resolve_compute_pass);
        self.out.queues = vec![Default::default(); len(self, MacroKind::Queue)];
        self.resolve_kind(MacroKind::Queue, Analyzer::resolve_queue);
        self.out.wasm_calls = vec![Default::default(); len(self, MacroKind::WasmCall)];
        self.resolve_kind(MacroKind::WasmCall, Analyzer::resolve_wasm_call);
        self.out.inits = vec![Default::default(); len(self, MacroKind::Init)];
        self.resolve_kind(MacroKind::Init, Analyzer::resolve_init);
        self.out.frames = vec![Default::default(); len(self, MacroKind::Frame)];
        self.resolve_kind(MacroKind::Frame, Analyzer::resolve_frame);
        self.resolve_kind(MacroKind::Animation, Analyzer::resolve_animation);
    }

    fn resolve_kind(
        &mut self,
        kind: MacroKind,
        resolve: fn(&mut Analyzer<'a>, u16, NodeRef) -> Result<(), AnalyzeError>,
    ) {
        let decls: Vec<(u16, NodeRef)> = self
            .out
            .symbols
            .table(kind)
            .iter()
            .map(|entry| (entry.id, entry.decl))
            .collect();
        for (id, decl) in decls {
            if let Err(err) = resolve(self, id, decl) {
                self.errors.push(err);
            }
            self.out.symbols.table_mut(kind).by_id_mut(id).analyzed = true;
        }
    }

    fn resolve_shader(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let body = self.files[decl.file as usize].ast.node(decl.node);
        let code = match body.tag {
            NodeTag::LitStr => string_value(&self.files[decl.file as usize].src, body.span),
            NodeTag::Object => {
                let props = self.props(decl, &["code", "value"])?;
                let node = props
                    .get("code")
                    .or_else(|| props.get("value"))
                    .ok_or_else(|| self.err_at(decl, "#wgsl requires a code property"))?;
                self.string(decl.file, node)?
            }
            _ => return Err(self.err_at(decl, "#wgsl takes a string body")),
        };
        self.out.shaders[id as usize] = ShaderInfo { code };
        Ok(())
    }

    fn resolve_data(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["type", "values"])?;
        let ty = match props.get("type") {
            Some(node) => self.ident_text(decl.file, node)?,
            None => "u32".to_string(),
        };
        let values_node = props
            .get("values")
            .ok_or_else(|| self.err_at(decl, "#data requires a values array"))?;
        let items = self.array_items(decl.file, values_node)?;
        let mut bytes = Vec::new();
        for node in items {
            let value = self.number(decl.file, node)?;
            match ty.as_str() {
                "u8" => {
                    let v = self.integral(value, 0.0, 255.0, decl.file, node)?;
                    bytes.push(v as u8);
                }
                "u32" => {
                    let v =
                        self.integral(value, 0.0, u32::MAX as f64, decl.file, node)?;
                    bytes.extend_from_slice(&(v as u32).to_le_bytes());
                }
                "i32" => {
                    let v = self.integral(
                        value,
                        i32::MIN as f64,
                        i32::MAX as f64,
                        decl.file,
                        node,
                    )?;
                    bytes.extend_from_slice(&(v as i32).to_le_bytes());
                }
                "f32" => bytes.extend_from_slice(&(value as f32).to_le_bytes()),
                other => {
                    return Err(self.err_at(
                        decl,
                        &format!("unknown data element type '{}'", other),
                    ))
                }
            }
        }
        self.out.datas[id as usize] = DataInfo { bytes };
        Ok(())
    }

    fn resolve_bitmap(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["path"])?;
        let path_node = props
            .get("path")
            .ok_or_else(|| self.err_at(decl, "#imageBitmap requires a path"))?;
        let path = self.string(decl.file, path_node)?;
        let full = self.base_dir.join(&path);
        let bytes = self.loader.load_bytes(&full).map_err(|err| AnalyzeError {
            kind: AnalyzeErrorKind::TypeMismatch(format!(
                "cannot read image '{}': {}",
                path, err
            )),
            file: decl.file,
            span: self.span_of(decl.file, path_node),
        })?;
        self.out.bitmaps[id as usize] = BitmapInfo { bytes };
        Ok(())
    }

    fn resolve_buffer(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["size", "usage", "data"])?;
        let usage_node = props
            .get("usage")
            .ok_or_else(|| self.err_at(decl, "#buffer requires a usage list"))?;
        let usage = self.buffer_usages(decl.file, usage_node)?;
        let data = match props.get("data") {
            Some(node) => Some(self.reference(decl.file, node, MacroKind::Data)?),
            None => None,
        };
        let size = match props.get("size") {
            Some(node) => {
                let tag = self.files[decl.file as usize].ast.node(node).tag;
                if tag == NodeTag::DottedRef {
                    self.reflected_size(decl.file, node)?
                } else {
                    self.u32_value(decl.file, node)?
                }
            }
            None => match data {
                Some(data_id) => self.out.datas[data_id as usize].bytes.len() as u32,
                None => return Err(self.err_at(decl, "#buffer requires a size")),
            },
        };
        if size == 0 {
            return Err(self.err_at(decl, "buffer size must be non-zero"));
        }
        self.out.buffers[id as usize] = BufferInfo { size, usage, data };
        Ok(())
    }

    /// `size=<shader>.<var>` — the reflector's byte size for the binding.
    fn reflected_size(&mut self, file: u16, node: NodeId) -> Result<u32, AnalyzeError> {
        let segments = self.dotted_segments(file, node);
        if segments.len() != 2 {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(
                    "auto-size takes the form <shader>.<variable>".to_string(),
                ),
                file,
                span: self.span_of(file, node),
            });
        }
        let span = self.span_of(file, node);
        let shader = self.reference_name(file, &segments[0], MacroKind::Wgsl, span)?;
        let reflection = self.reflection(shader, file, span)?;
        let binding = reflection.binding(&segments[1]).ok_or_else(|| AnalyzeError {
            kind: AnalyzeErrorKind::UndefinedReference {
                kind: MacroKind::Wgsl,
                name: format!("{}.{}", segments[0], segments[1]),
            },
            file,
            span,
        })?;
        Ok(binding.byte_size())
    }

    fn resolve_texture(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &[
                "width",
                "height",
                "depth",
                "format",
                "usage",
                "dimension",
                "mipLevelCount",
                "sampleCount",
                "viewFormats",
                "source",
            ],
        )?;
        let mut info = TextureInfo::default();
        info.width = match props.get("width") {
            Some(node) => self.u32_value(decl.file, node)?,
            None => return Err(self.err_at(decl, "#texture requires a width")),
        };
        info.height = match props.get("height") {
            Some(node) => self.u32_value(decl.file, node)?,
            None => return Err(self.err_at(decl, "#texture requires a height")),
        };
        if let Some(node) = props.get("depth") {
            info.depth = self.u32_value(decl.file, node)?;
        }
        if let Some(node) = props.get("format") {
            info.format = self.wire_enum(decl.file, node, "texture format", names::texture_format)?;
        }
        if let Some(node) = props.get("usage") {
            info.usage = self.texture_usages(decl.file, node)?;
        }
        if let Some(node) = props.get("dimension") {
            info.dimension =
                self.wire_enum(decl.file, node, "texture dimension", names::texture_dimension)?;
        }
        if let Some(node) = props.get("mipLevelCount") {
            info.mip_level_count = self.u32_value(decl.file, node)?;
        }
        if let Some(node) = props.get("sampleCount") {
            info.sample_count = self.u32_value(decl.file, node)?;
        }
        if let Some(node) = props.get("viewFormats") {
            for item in self.array_items(decl.file, node)? {
                info.view_formats.push(self.wire_enum(
                    decl.file,
                    item,
                    "texture format",
                    names::texture_format,
                )?);
            }
        }
        if let Some(node) = props.get("source") {
            info.source = Some(self.reference(decl.file, node, MacroKind::ImageBitmap)?);
            info.usage = info.usage.union(TextureUsages::COPY_DST);
        }
        self.out.textures[id as usize] = info;
        Ok(())
    }

    fn resolve_view(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &[
                "texture",
                "format",
                "dimension",
                "baseMipLevel",
                "mipLevelCount",
                "baseArrayLayer",
                "arrayLayerCount",
            ],
        )?;
        let texture_node = props
            .get("texture")
            .ok_or_else(|| self.err_at(decl, "#textureView requires a texture"))?;
        let texture = self.reference(decl.file, texture_node, MacroKind::Texture)?;
        let mut view = TextureViewDesc::default();
        if let Some(node) = props.get("format") {
            view.format =
                Some(self.wire_enum(decl.file, node, "texture format", names::texture_format)?);
        }
        if let Some(node) = props.get("dimension") {
            view.dimension = Some(self.wire_enum(
                decl.file,
                node,
                "texture dimension",
                names::texture_dimension,
            )?);
        }
        if let Some(node) = props.get("baseMipLevel") {
            view.base_mip_level = self.u8_value(decl.file, node)?;
        }
        if let Some(node) = props.get("mipLevelCount") {
            view.mip_level_count = self.u8_value(decl.file, node)?;
        }
        if let Some(node) = props.get("baseArrayLayer") {
            view.base_array_layer = self.u8_value(decl.file, node)?;
        }
        if let Some(node) = props.get("arrayLayerCount") {
            view.array_layer_count = self.u8_value(decl.file, node)?;
        }
        self.out.views[id as usize] = ViewInfo { texture, view };
        Ok(())
    }

    fn resolve_sampler(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &[
                "magFilter",
                "minFilter",
                "mipmapFilter",
                "addressModeU",
                "addressModeV",
                "addressModeW",
                "compare",
            ],
        )?;
        let mut desc = SamplerDescriptor::default();
        if let Some(node) = props.get("magFilter") {
            desc.mag_filter = self.wire_enum(decl.file, node, "filter mode", names::filter_mode)?;
        }
        if let Some(node) = props.get("minFilter") {
            desc.min_filter = self.wire_enum(decl.file, node, "filter mode", names::filter_mode)?;
        }
        if let Some(node) = props.get("mipmapFilter") {
            desc.mipmap_filter =
                self.wire_enum(decl.file, node, "filter mode", names::filter_mode)?;
        }
        if let Some(node) = props.get("addressModeU") {
            desc.address_mode_u =
                self.wire_enum(decl.file, node, "address mode", names::address_mode)?;
        }
        if let Some(node) = props.get("addressModeV") {
            desc.address_mode_v =
                self.wire_enum(decl.file, node, "address mode", names::address_mode)?;
        }
        if let Some(node) = props.get("addressModeW") {
            desc.address_mode_w =
                self.wire_enum(decl.file, node, "address mode", names::address_mode)?;
        }
        if let Some(node) = props.get("compare") {
            desc.compare = Some(self.wire_enum(
                decl.file,
                node,
                "compare function",
                names::compare_function,
            )?);
        }
        self.out.samplers[id as usize] = desc;
        Ok(())
    }

    fn resolve_bind_group_layout(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["entries"])?;
        let entries_node = props
            .get("entries")
            .ok_or_else(|| self.err_at(decl, "#bindGroupLayout requires entries"))?;
        let mut entries = Vec::new();
        for item in self.array_items(decl.file, entries_node)? {
            let entry = self.object_props(decl.file, item, &["binding", "visibility", "type"])?;
            let binding = match entry.get("binding") {
                Some(node) => self.u8_value(decl.file, node)?,
                None => return Err(self.err_at(decl, "layout entry requires a binding")),
            };
            let visibility = match entry.get("visibility") {
                Some(node) => self.shader_stages(decl.file, node)?,
                None => return Err(self.err_at(decl, "layout entry requires visibility")),
            };
            let kind = match entry.get("type") {
                Some(node) => {
                    self.wire_enum(decl.file, node, "binding type", names::binding_kind)?
                }
                None => return Err(self.err_at(decl, "layout entry requires a type")),
            };
            entries.push(BindingLayout {
                binding,
                visibility,
                kind,
            });
        }
        self.out.bind_group_layouts[id as usize] = entries;
        Ok(())
    }

    fn resolve_pipeline_layout(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["bindGroupLayouts"])?;
        let layouts_node = props
            .get("bindGroupLayouts")
            .ok_or_else(|| self.err_at(decl, "#pipelineLayout requires bindGroupLayouts"))?;
        let mut layouts = Vec::new();
        for item in self.array_items(decl.file, layouts_node)? {
            layouts.push(self.reference(decl.file, item, MacroKind::BindGroupLayout)?);
        }
        self.out.pipeline_layouts[id as usize] = layouts;
        Ok(())
    }

    fn resolve_bind_group(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["layout", "entries"])?;
        let layout_node = props
            .get("layout")
            .ok_or_else(|| self.err_at(decl, "#bindGroup requires a layout"))?;
        let layout = self.reference(decl.file, layout_node, MacroKind::BindGroupLayout)?;
        let entries_node = props
            .get("entries")
            .ok_or_else(|| self.err_at(decl, "#bindGroup requires entries"))?;
        let mut entries = Vec::new();
        for item in self.array_items(decl.file, entries_node)? {
            let entry = self.object_props(
                decl.file,
                item,
                &["binding", "buffer", "offset", "size", "sampler", "textureView"],
            )?;
            let binding = match entry.get("binding") {
                Some(node) => self.u8_value(decl.file, node)?,
                None => return Err(self.err_at(decl, "bind group entry requires a binding")),
            };
            let info = if let Some(node) = entry.get("buffer") {
                let buffer = self.reference(decl.file, node, MacroKind::Buffer)?;
                let offset = match entry.get("offset") {
                    Some(node) => self.u32_value(decl.file, node)?,
                    None => 0,
                };
                let size = match entry.get("size") {
                    Some(node) => self.u32_value(decl.file, node)?,
                    None => 0,
                };
                BindGroupEntryInfo::Buffer {
                    binding,
                    buffer,
                    offset,
                    size,
                }
            } else if let Some(node) = entry.get("sampler") {
                let sampler = self.reference(decl.file, node, MacroKind::Sampler)?;
                BindGroupEntryInfo::Sampler { binding, sampler }
            } else if let Some(node) = entry.get("textureView") {
                let view = self.reference(decl.file, node, MacroKind::TextureView)?;
                BindGroupEntryInfo::View { binding, view }
            } else {
                return Err(self.err_at(
                    decl,
                    "bind group entry requires a buffer, sampler or textureView",
                ));
            };
            entries.push(info);
        }
        self.out.bind_groups[id as usize] = BindGroupInfo { layout, entries };
        Ok(())
    }

    fn resolve_render_pipeline(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &["layout", "vertex", "fragment", "primitive", "depthStencil"],
        )?;
        let mut info = RenderPipelineInfo::default();
        info.layout = self.pipeline_layout_ref(decl.file, props.get("layout"))?;

        let vertex_node = props
            .get("vertex")
            .ok_or_else(|| self.err_at(decl, "#renderPipeline requires a vertex stage"))?;
        let vertex = self.object_props(
            decl.file,
            vertex_node,
            &["module", "entryPoint", "buffers"],
        )?;
        let module_node = vertex
            .get("module")
            .ok_or_else(|| self.err_at(decl, "vertex stage requires a module"))?;
        info.vertex_module = self.reference(decl.file, module_node, MacroKind::Wgsl)?;
        info.vertex_entry = match vertex.get("entryPoint") {
            Some(node) => self.string(decl.file, node)?,
            None => "main".to_string(),
        };
        if let Some(buffers_node) = vertex.get("buffers") {
            for item in self.array_items(decl.file, buffers_node)? {
                info.vertex_buffers
                    .push(self.vertex_buffer_layout(decl.file, item)?);
            }
        }

        if let Some(fragment_node) = props.get("fragment") {
            let fragment = self.object_props(
                decl.file,
                fragment_node,
                &["module", "entryPoint", "targets"],
            )?;
            let module_node = fragment
                .get("module")
                .ok_or_else(|| self.err_at(decl, "fragment stage requires a module"))?;
            let module = self.reference(decl.file, module_node, MacroKind::Wgsl)?;
            let entry = match fragment.get("entryPoint") {
                Some(node) => self.string(decl.file, node)?,
                None => "main".to_string(),
            };
            info.fragment = Some((module, entry));
            if let Some(targets_node) = fragment.get("targets") {
                for item in self.array_items(decl.file, targets_node)? {
                    let target = self.object_props(decl.file, item, &["format", "blend"])?;
                    let format = match target.get("format") {
                        Some(node) => self.wire_enum(
                            decl.file,
                            node,
                            "texture format",
                            names::texture_format,
                        )?,
                        None => TextureFormat::PreferredCanvas,
                    };
                    let blend = match target.get("blend") {
                        Some(node) => {
                            self.wire_enum(decl.file, node, "blend mode", names::blend_mode)?
                        }
                        None => pngine_bytecode::wire::BlendMode::Replace,
                    };
                    info.targets.push(ColorTarget { format, blend });
                }
            }
        }

        if let Some(primitive_node) = props.get("primitive") {
            let primitive = self.object_props(
                decl.file,
                primitive_node,
                &["topology", "cullMode", "frontFace", "stripIndexFormat"],
            )?;
            if let Some(node) = primitive.get("topology") {
                info.primitive.topology =
                    self.wire_enum(decl.file, node, "primitive topology", names::topology)?;
            }
            if let Some(node) = primitive.get("cullMode") {
                info.primitive.cull_mode =
                    self.wire_enum(decl.file, node, "cull mode", names::cull_mode)?;
            }
            if let Some(node) = primitive.get("frontFace") {
                info.primitive.front_face =
                    self.wire_enum(decl.file, node, "front face", names::front_face)?;
            }
            if let Some(node) = primitive.get("stripIndexFormat") {
                info.primitive.strip_index_format =
                    Some(self.wire_enum(decl.file, node, "index format", names::index_format)?);
            }
        }

        if let Some(ds_node) = props.get("depthStencil") {
            let ds = self.object_props(
                decl.file,
                ds_node,
                &["format", "depthWriteEnabled", "depthCompare"],
            )?;
            let format = match ds.get("format") {
                Some(node) => {
                    self.wire_enum(decl.file, node, "texture format", names::texture_format)?
                }
                None => TextureFormat::Depth24Plus,
            };
            let depth_write_enabled = match ds.get("depthWriteEnabled") {
                Some(node) => self.bool_value(decl.file, node)?,
                None => true,
            };
            let depth_compare = match ds.get("depthCompare") {
                Some(node) => self.wire_enum(
                    decl.file,
                    node,
                    "compare function",
                    names::compare_function,
                )?,
                None => pngine_bytecode::wire::CompareFunction::Less,
            };
            info.depth_stencil = Some(DepthStencilState {
                format,
                depth_write_enabled,
                depth_compare,
            });
        }

        self.out.render_pipelines[id as usize] = info;
        Ok(())
    }

    fn pipeline_layout_ref(
        &mut self,
        file: u16,
        node: Option<NodeId>,
    ) -> Result<Option<u16>, AnalyzeError> {
        let node = match node {
            Some(node) => node,
            None => return Ok(None),
        };
        let tag = self.files[file as usize].ast.node(node).tag;
        if tag == NodeTag::Ident && self.node_text(file, node) == "auto" {
            return Ok(None);
        }
        Ok(Some(self.reference(file, node, MacroKind::PipelineLayout)?))
    }

    fn vertex_buffer_layout(
        &mut self,
        file: u16,
        node: NodeId,
    ) -> Result<VertexBufferLayout, AnalyzeError> {
        let props =
            self.object_props(file, node, &["arrayStride", "stepMode", "attributes"])?;
        let array_stride = match props.get("arrayStride") {
            Some(node) => self.u32_value(file, node)?,
            None => {
                return Err(AnalyzeError {
                    kind: AnalyzeErrorKind::TypeMismatch(
                        "vertex buffer requires an arrayStride".to_string(),
                    ),
                    file,
                    span: self.span_of(file, node),
                })
            }
        };
        let step_mode = match props.get("stepMode") {
            Some(node) => self.wire_enum(file, node, "step mode", names::step_mode)?,
            None => pngine_bytecode::wire::VertexStepMode::Vertex,
        };
        let mut attributes = Vec::new();
        if let Some(attrs_node) = props.get("attributes") {
            for item in self.array_items(file, attrs_node)? {
                let attr =
                    self.object_props(file, item, &["format", "offset", "shaderLocation"])?;
                let format = match attr.get("format") {
                    Some(node) => {
                        self.wire_enum(file, node, "vertex format", names::vertex_format)?
                    }
                    None => {
                        return Err(AnalyzeError {
                            kind: AnalyzeErrorKind::TypeMismatch(
                                "vertex attribute requires a format".to_string(),
                            ),
                            file,
                            span: self.span_of(file, item),
                        })
                    }
                };
                let offset = match attr.get("offset") {
                    Some(node) => self.u32_value(file, node)?,
                    None => 0,
                };
                let shader_location = match attr.get("shaderLocation") {
                    Some(node) => self.u8_value(file, node)?,
                    None => 0,
                };
                attributes.push(VertexAttribute {
                    format,
                    offset,
                    shader_location,
                });
            }
        }
        Ok(VertexBufferLayout {
            array_stride,
            step_mode,
            attributes,
        })
    }

    fn resolve_compute_pipeline(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["layout", "module", "entryPoint"])?;
        let layout = self.pipeline_layout_ref(decl.file, props.get("layout"))?;
        let module_node = props
            .get("module")
            .ok_or_else(|| self.err_at(decl, "#computePipeline requires a module"))?;
        let module = self.reference(decl.file, module_node, MacroKind::Wgsl)?;
        let entry = match props.get("entryPoint") {
            Some(node) => self.string(decl.file, node)?,
            None => "main".to_string(),
        };
        self.out.compute_pipelines[id as usize] = ComputePipelineInfo {
            layout,
            module,
            entry,
        };
        Ok(())
    }

    fn resolve_query_set(&mut self, _id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["type", "count"])?;
        if let Some(node) = props.get("type") {
            let _ = self.wire_enum(decl.file, node, "query type", names::query_type)?;
        }
        if let Some(node) = props.get("count") {
            let _ = self.u32_value(decl.file, node)?;
        }
        // Declared and id-assigned only: format v0 has no opcode that
        // materializes a query set, so passes may not reference them yet.
        Ok(())
    }

    fn resolve_bundle(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &[
                "pipeline",
                "bindGroups",
                "vertexBuffers",
                "indexBuffer",
                "draw",
                "drawIndexed",
            ],
        )?;
        let body = self.pass_body(decl, &props, false)?;
        self.out.bundles[id as usize] = body;
        Ok(())
    }

    fn resolve_render_pass(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &[
                "colorAttachments",
                "depthStencilAttachment",
                "pipeline",
                "bindGroups",
                "vertexBuffers",
                "indexBuffer",
                "draw",
                "drawIndexed",
                "bundles",
            ],
        )?;
        let mut info = RenderPassInfo::default();

        // Resolve the command body first so a broken reference is
        // reported even when the attachments are elided (they default to
        // clearing the surface).
        info.body = self.pass_body(decl, &props, true)?;

        if let Some(attachments_node) = props.get("colorAttachments") {
            let attachments = self.array_items(decl.file, attachments_node)?;
            if attachments.len() != 1 {
                return Err(self.err_at(
                    decl,
                    "this format version supports exactly one color attachment",
                ));
            }
            let attachment = self.object_props(
                decl.file,
                attachments[0],
                &["view", "loadOp", "storeOp", "clearValue"],
            )?;
            let view_node = attachment
                .get("view")
                .ok_or_else(|| self.err_at(decl, "color attachment requires a view"))?;
            info.color = self.attachment_target(decl.file, view_node)?;
            if let Some(node) = attachment.get("loadOp") {
                info.load = self.wire_enum(decl.file, node, "load op", names::load_op)?;
            }
            if let Some(node) = attachment.get("storeOp") {
                info.store = self.wire_enum(decl.file, node, "store op", names::store_op)?;
            }
            if let Some(node) = attachment.get("clearValue") {
                self.check_clear_value(decl.file, node)?;
            }
        }

        if let Some(node) = props.get("depthStencilAttachment") {
            let depth = self.object_props(decl.file, node, &["view"])?;
            let view_node = depth
                .get("view")
                .ok_or_else(|| self.err_at(decl, "depth attachment requires a view"))?;
            info.depth = Some(self.reference(decl.file, view_node, MacroKind::Texture)?);
        }

        self.out.render_passes[id as usize] = info;
        Ok(())
    }

    fn attachment_target(
        &mut self,
        file: u16,
        node: NodeId,
    ) -> Result<AttachmentTarget, AnalyzeError> {
        let tag = self.files[file as usize].ast.node(node).tag;
        if tag == NodeTag::Ident && self.node_text(file, node) == "contextCurrentTexture" {
            return Ok(AttachmentTarget::Surface);
        }
        Ok(AttachmentTarget::Texture(self.reference(
            file,
            node,
            MacroKind::Texture,
        )?))
    }

    /// Format v0 cannot carry a clear color in `begin_render_pass`; only
    /// the default opaque black is accepted, anything else must fail
    /// loudly rather than be dropped.
    fn check_clear_value(&mut self, file: u16, node: NodeId) -> Result<(), AnalyzeError> {
        let items = self.array_items(file, node)?;
        let mut values = [0.0f64; 4];
        if items.len() != 4 {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(
                    "clearValue takes four components".to_string(),
                ),
                file,
                span: self.span_of(file, node),
            });
        }
        for (slot, item) in items.iter().enumerate() {
            values[slot] = self.number(file, *item)?;
        }
        if values != [0.0, 0.0, 0.0, 1.0] {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(
                    "this format version only encodes the default clearValue [0 0 0 1]"
                        .to_string(),
                ),
                file,
                span: self.span_of(file, node),
            });
        }
        Ok(())
    }

    fn pass_body(
        &mut self,
        decl: NodeRef,
        props: &Props,
        allow_bundles: bool,
    ) -> Result<PassBody, AnalyzeError> {
        let mut body = PassBody::default();
        if let Some(node) = props.get("pipeline") {
            body.pipeline = Some(self.reference(decl.file, node, MacroKind::RenderPipeline)?);
        }
        if let Some(node) = props.get("bindGroups") {
            for item in self.array_items(decl.file, node)? {
                body.bind_groups
                    .push(self.reference(decl.file, item, MacroKind::BindGroup)?);
            }
        }
        if let Some(node) = props.get("vertexBuffers") {
            for item in self.array_items(decl.file, node)? {
                body.vertex_buffers
                    .push(self.reference(decl.file, item, MacroKind::Buffer)?);
            }
        }
        if let Some(node) = props.get("indexBuffer") {
            let index = self.object_props(decl.file, node, &["buffer", "format"])?;
            let buffer_node = index
                .get("buffer")
                .ok_or_else(|| self.err_at(decl, "indexBuffer requires a buffer"))?;
            let buffer = self.reference(decl.file, buffer_node, MacroKind::Buffer)?;
            let format = match index.get("format") {
                Some(node) => self.wire_enum(decl.file, node, "index format", names::index_format)?,
                None => IndexFormat::Uint16,
            };
            body.index_buffer = Some((buffer, format));
        }
        if let Some(node) = props.get("draw") {
            body.draw = Some(self.draw_cmd(decl.file, node)?);
        }
        if let Some(node) = props.get("drawIndexed") {
            body.draw_indexed = Some(self.draw_indexed_cmd(decl.file, node)?);
        }
        if allow_bundles {
            if let Some(node) = props.get("bundles") {
                for item in self.array_items(decl.file, node)? {
                    body.bundles
                        .push(self.reference(decl.file, item, MacroKind::RenderBundle)?);
                }
            }
        }
        Ok(body)
    }

    fn draw_cmd(&mut self, file: u16, node: NodeId) -> Result<DrawCmd, AnalyzeError> {
        let tag = self.files[file as usize].ast.node(node).tag;
        if tag != NodeTag::Object {
            // `draw=3` — three vertices, one instance.
            return Ok(DrawCmd {
                vertex_count: self.u32_value(file, node)?,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            });
        }
        let props = self.object_props(
            file,
            node,
            &["vertexCount", "instanceCount", "firstVertex", "firstInstance"],
        )?;
        let mut cmd = DrawCmd {
            vertex_count: 0,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        };
        if let Some(n) = props.get("vertexCount") {
            cmd.vertex_count = self.u32_value(file, n)?;
        }
        if let Some(n) = props.get("instanceCount") {
            cmd.instance_count = self.u32_value(file, n)?;
        }
        if let Some(n) = props.get("firstVertex") {
            cmd.first_vertex = self.u32_value(file, n)?;
        }
        if let Some(n) = props.get("firstInstance") {
            cmd.first_instance = self.u32_value(file, n)?;
        }
        Ok(cmd)
    }

    fn draw_indexed_cmd(
        &mut self,
        file: u16,
        node: NodeId,
    ) -> Result<DrawIndexedCmd, AnalyzeError> {
        let props = self.object_props(
            file,
            node,
            &[
                "indexCount",
                "instanceCount",
                "firstIndex",
                "baseVertex",
                "firstInstance",
            ],
        )?;
        let mut cmd = DrawIndexedCmd {
            index_count: 0,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        };
        if let Some(n) = props.get("indexCount") {
            cmd.index_count = self.u32_value(file, n)?;
        }
        if let Some(n) = props.get("instanceCount") {
            cmd.instance_count = self.u32_value(file, n)?;
        }
        if let Some(n) = props.get("firstIndex") {
            cmd.first_index = self.u32_value(file, n)?;
        }
        if let Some(n) = props.get("baseVertex") {
            cmd.base_vertex = self.i32_value(file, n)?;
        }
        if let Some(n) = props.get("firstInstance") {
            cmd.first_instance = self.u32_value(file, n)?;
        }
        Ok(cmd)
    }

    fn resolve_compute_pass(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["pipeline", "bindGroups", "dispatch"])?;
        let mut info = ComputePassInfo {
            dispatch: [1, 1, 1],
            ..ComputePassInfo::default()
        };
        if let Some(node) = props.get("pipeline") {
            info.pipeline = Some(self.reference(decl.file, node, MacroKind::ComputePipeline)?);
        }
        if let Some(node) = props.get("bindGroups") {
            for item in self.array_items(decl.file, node)? {
                info.bind_groups
                    .push(self.reference(decl.file, item, MacroKind::BindGroup)?);
            }
        }
        if let Some(node) = props.get("dispatch") {
            info.dispatch = self.dispatch_size(decl.file, node)?;
        }
        self.out.compute_passes[id as usize] = info;
        Ok(())
    }

    fn dispatch_size(&mut self, file: u16, node: NodeId) -> Result<[u32; 3], AnalyzeError> {
        let tag = self.files[file as usize].ast.node(node).tag;
        if tag != NodeTag::Array {
            return Ok([self.u32_value(file, node)?, 1, 1]);
        }
        let items = self.array_items(file, node)?;
        if items.is_empty() || items.len() > 3 {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(
                    "dispatch takes one to three workgroup counts".to_string(),
                ),
                file,
                span: self.span_of(file, node),
            });
        }
        let mut size = [1u32; 3];
        for (slot, item) in items.iter().enumerate() {
            size[slot] = self.u32_value(file, *item)?;
        }
        Ok(size)
    }

    fn resolve_queue(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["buffer", "offset", "data", "copy"])?;
        if let Some(copy_node) = props.get("copy") {
            let copy = self.object_props(
                decl.file,
                copy_node,
                &["src", "srcOffset", "dst", "dstOffset", "size"],
            )?;
            let src_node = copy
                .get("src")
                .ok_or_else(|| self.err_at(decl, "copy requires a src buffer"))?;
            let dst_node = copy
                .get("dst")
                .ok_or_else(|| self.err_at(decl, "copy requires a dst buffer"))?;
            let size_node = copy
                .get("size")
                .ok_or_else(|| self.err_at(decl, "copy requires a size"))?;
            let op = QueueOp::Copy {
                src: self.reference(decl.file, src_node, MacroKind::Buffer)?,
                src_off: match copy.get("srcOffset") {
                    Some(node) => self.u32_value(decl.file, node)?,
                    None => 0,
                },
                dst: self.reference(decl.file, dst_node, MacroKind::Buffer)?,
                dst_off: match copy.get("dstOffset") {
                    Some(node) => self.u32_value(decl.file, node)?,
                    None => 0,
                },
                size: self.u32_value(decl.file, size_node)?,
            };
            self.out.queues[id as usize] = op;
            return Ok(());
        }
        let buffer_node = props
            .get("buffer")
            .ok_or_else(|| self.err_at(decl, "#queue requires a buffer or a copy"))?;
        let data_node = props
            .get("data")
            .ok_or_else(|| self.err_at(decl, "#queue requires a data block"))?;
        let op = QueueOp::Write {
            buffer: self.reference(decl.file, buffer_node, MacroKind::Buffer)?,
            offset: match props.get("offset") {
                Some(node) => self.u32_value(decl.file, node)?,
                None => 0,
            },
            data: self.reference(decl.file, data_node, MacroKind::Data)?,
        };
        self.out.queues[id as usize] = op;
        Ok(())
    }

    fn resolve_wasm_call(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &["module", "func", "args", "output", "outputOffset", "outputLength"],
        )?;
        let module_node = props
            .get("module")
            .ok_or_else(|| self.err_at(decl, "#wasmCall requires a module data block"))?;
        let data = self.reference(decl.file, module_node, MacroKind::Data)?;
        // Distinct data blocks become distinct wasm module ids; repeats
        // share one instantiation.
        let module = match self.out.wasm_modules.iter().position(|&d| d == data) {
            Some(index) => index as u16,
            None => {
                self.out.wasm_modules.push(data);
                (self.out.wasm_modules.len() - 1) as u16
            }
        };
        let func_node = props
            .get("func")
            .ok_or_else(|| self.err_at(decl, "#wasmCall requires a func name"))?;
        let func = self.string(decl.file, func_node)?;
        let mut args = Vec::new();
        if let Some(node) = props.get("args") {
            for item in self.array_items(decl.file, node)? {
                args.push(self.u32_value(decl.file, item)?);
            }
        }
        let output = match props.get("output") {
            Some(node) => {
                let buffer = self.reference(decl.file, node, MacroKind::Buffer)?;
                let offset = match props.get("outputOffset") {
                    Some(node) => self.u32_value(decl.file, node)?,
                    None => 0,
                };
                let length = match props.get("outputLength") {
                    Some(node) => self.u32_value(decl.file, node)?,
                    None => self.out.buffers[buffer as usize].size.saturating_sub(offset),
                };
                Some((buffer, offset, length))
            }
            None => None,
        };
        self.out.wasm_calls[id as usize] = WasmCallInfo {
            module,
            func,
            args,
            output,
        };
        Ok(())
    }

    fn resolve_init(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(
            decl,
            &["shader", "entryPoint", "bindings", "params", "dispatch"],
        )?;
        let shader_node = props
            .get("shader")
            .ok_or_else(|| self.err_at(decl, "#init requires a shader"))?;
        let shader = self.reference(decl.file, shader_node, MacroKind::Wgsl)?;
        let span = self.span_of(decl.file, decl.node);
        let reflection = self.reflection(shader, decl.file, span)?;

        let entry = match props.get("entryPoint") {
            Some(node) => self.string(decl.file, node)?,
            None => reflection
                .entry_point(ShaderStage::Compute)
                .map(|e| e.name.clone())
                .ok_or_else(|| AnalyzeError {
                    kind: AnalyzeErrorKind::InvalidInitBinding(
                        "shader has no compute entry point".to_string(),
                    ),
                    file: decl.file,
                    span,
                })?,
        };

        // The explicit `bindings={ var = buf }` map.
        let mut explicit: HashMap<String, u16> = HashMap::new();
        if let Some(node) = props.get("bindings") {
            let ast = &self.files[decl.file as usize].ast;
            if ast.node(node).tag != NodeTag::Object {
                return Err(self.err_at(decl, "bindings takes an object of var=buffer pairs"));
            }
            let pairs: Vec<(String, NodeId)> = ast
                .children(node)
                .iter()
                .map(|&prop| {
                    let kv = ast.children(prop);
                    (self.node_text(decl.file, kv[0]).to_string(), kv[1])
                })
                .collect();
            for (var, value_node) in pairs {
                let buffer = self.reference(decl.file, value_node, MacroKind::Buffer)?;
                explicit.insert(var, buffer);
            }
        }

        // The init's name seeds its synthetic resources; `$` cannot occur
        // in user identifiers, so the names cannot collide.
        let init_name = self
            .out
            .symbols
            .table(MacroKind::Init)
            .by_id(id)
            .name
            .clone();

        let mut params: Option<InitParams> = None;
        let mut group_entries: Vec<(u32, u16, AddressSpace)> = Vec::new();
        for binding in &reflection.bindings {
            if binding.group != 0 {
                return Err(AnalyzeError {
                    kind: AnalyzeErrorKind::InvalidInitBinding(format!(
                        "'{}' is in @group({}); init shaders use group 0",
                        binding.name, binding.group
                    )),
                    file: decl.file,
                    span,
                });
            }
            let buffer = if binding.name == "params" {
                if binding.byte_size() != 16 {
                    return Err(AnalyzeError {
                        kind: AnalyzeErrorKind::InvalidInitBinding(
                            "the params uniform must be exactly 16 bytes".to_string(),
                        ),
                        file: decl.file,
                        span,
                    });
                }
                let fields = match props.get("params") {
                    Some(node) => self.param_fields(decl.file, node)?,
                    None => [ParamField::Literal(0); 4],
                };
                let buffer = self.synth_buffer(
                    &format!("{}$params", init_name),
                    decl,
                    BufferInfo {
                        size: 16,
                        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                        data: None,
                    },
                );
                params = Some(InitParams { buffer, fields });
                buffer
            } else if let Some(&buffer) = explicit.get(&binding.name) {
                buffer
            } else if let Some(entry) =
                self.out.symbols.resolve(MacroKind::Buffer, &binding.name)
            {
                entry.id
            } else {
                return Err(AnalyzeError {
                    kind: AnalyzeErrorKind::InvalidInitBinding(binding.name.clone()),
                    file: decl.file,
                    span,
                });
            };
            group_entries.push((binding.binding, buffer, binding.address_space));
        }
        group_entries.sort_by_key(|&(binding, _, _)| binding);

        // Synthesize layout, pipeline and bind group around the shader.
        let layout_entries: Vec<BindingLayout> = group_entries
            .iter()
            .map(|&(binding, _, space)| BindingLayout {
                binding: binding as u8,
                visibility: pngine_bytecode::wire::ShaderStages::COMPUTE,
                kind: match space {
                    AddressSpace::Uniform => {
                        pngine_bytecode::wire::BindingKind::UniformBuffer
                    }
                    AddressSpace::Storage => {
                        pngine_bytecode::wire::BindingKind::StorageBuffer
                    }
                    AddressSpace::ReadOnlyStorage => {
                        pngine_bytecode::wire::BindingKind::ReadOnlyStorageBuffer
                    }
                },
            })
            .collect();
        let bgl = self.synth_bind_group_layout(&format!("{}$layout", init_name), decl, layout_entries);
        let pl = self.synth_pipeline_layout(&format!("{}$playout", init_name), decl, vec![bgl]);
        let pipeline = self.synth_compute_pipeline(
            &format!("{}$pipeline", init_name),
            decl,
            ComputePipelineInfo {
                layout: Some(pl),
                module: shader,
                entry: entry.clone(),
            },
        );
        let bind_group = self.synth_bind_group(
            &format!("{}$group", init_name),
            decl,
            BindGroupInfo {
                layout: bgl,
                entries: group_entries
                    .iter()
                    .map(|&(binding, buffer, _)| BindGroupEntryInfo::Buffer {
                        binding: binding as u8,
                        buffer,
                        offset: 0,
                        size: 0,
                    })
                    .collect(),
            },
        );

        let dispatch = match props.get("dispatch") {
            Some(node) => self.dispatch_size(decl.file, node)?,
            None => {
                // ceil(element_count / workgroup_size.x) over the array
                // bindings; a shader with none dispatches a single group.
                let workgroup = reflection
                    .entry_points
                    .iter()
                    .find(|e| e.stage == ShaderStage::Compute && e.name == entry)
                    .map(|e| e.workgroup_size[0].max(1))
                    .unwrap_or(1);
                let mut x = 1;
                for binding in &reflection.bindings {
                    if let Some(array) = &binding.array {
                        let groups =
                            (array.element_count + workgroup - 1) / workgroup;
                        x = x.max(groups);
                    }
                }
                [x, 1, 1]
            }
        };

        self.out.inits[id as usize] = InitInfo {
            pipeline,
            bind_group,
            params,
            dispatch,
        };
        Ok(())
    }

    fn param_fields(&mut self, file: u16, node: NodeId) -> Result<[ParamField; 4], AnalyzeError> {
        let items = self.array_items(file, node)?;
        if items.len() > 4 {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(
                    "params holds at most four 32-bit fields".to_string(),
                ),
                file,
                span: self.span_of(file, node),
            });
        }
        let mut fields = [ParamField::Literal(0); 4];
        for (slot, item) in items.iter().enumerate() {
            let tag = self.files[file as usize].ast.node(*item).tag;
            fields[slot] = if tag == NodeTag::DottedRef {
                let path = self.dotted_segments(file, *item).join(".");
                let runtime = RuntimeValue::from_dotted(&path).ok_or_else(|| AnalyzeError {
                    kind: AnalyzeErrorKind::TypeMismatch(format!(
                        "'{}' is not a runtime params value",
                        path
                    )),
                    file,
                    span: self.span_of(file, *item),
                })?;
                // Runtime values are pinned to canonical slots; the VM
                // recovers which value to write from the byte offset
                // alone, so a shuffled layout cannot be encoded.
                if runtime.canonical_slot() != slot {
                    return Err(AnalyzeError {
                        kind: AnalyzeErrorKind::TypeMismatch(format!(
                            "'{}' must occupy params slot {}",
                            path,
                            runtime.canonical_slot()
                        )),
                        file,
                        span: self.span_of(file, *item),
                    });
                }
                ParamField::Runtime(runtime)
            } else {
                ParamField::Literal(self.u32_value(file, *item)?)
            };
        }
        Ok(fields)
    }

    fn resolve_frame(&mut self, id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["init", "perform"])?;
        let mut info = FrameInfo::default();
        if let Some(node) = props.get("init") {
            for item in self.array_items(decl.file, node)? {
                info.init.push(self.perform_ref(decl.file, item)?);
            }
        }
        let perform_node = props
            .get("perform")
            .ok_or_else(|| self.err_at(decl, "#frame requires a perform list"))?;
        for item in self.array_items(decl.file, perform_node)? {
            info.perform.push(self.perform_ref(decl.file, item)?);
        }
        self.out.frames[id as usize] = info;
        Ok(())
    }

    /// A frame entry names a pass, a queue op or a wasm call; the name
    /// must be unambiguous across those kinds.
    fn perform_ref(&mut self, file: u16, node: NodeId) -> Result<PerformRef, AnalyzeError> {
        let name = self.ident_text(file, node)?;
        let span = self.span_of(file, node);
        let mut matches: Vec<PerformRef> = Vec::new();
        if let Some(entry) = self.out.symbols.resolve(MacroKind::RenderPass, &name) {
            matches.push(PerformRef::RenderPass(entry.id));
        }
        if let Some(entry) = self.out.symbols.resolve(MacroKind::ComputePass, &name) {
            matches.push(PerformRef::ComputePass(entry.id));
        }
        if let Some(entry) = self.out.symbols.resolve(MacroKind::Queue, &name) {
            matches.push(PerformRef::Queue(entry.id));
        }
        if let Some(entry) = self.out.symbols.resolve(MacroKind::WasmCall, &name) {
            matches.push(PerformRef::WasmCall(entry.id));
        }
        match matches.len() {
            0 => Err(AnalyzeError {
                kind: AnalyzeErrorKind::UndefinedReference {
                    kind: MacroKind::RenderPass,
                    name,
                },
                file,
                span,
            }),
            1 => Ok(matches[0]),
            _ => Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(format!(
                    "'{}' names more than one performable declaration",
                    name
                )),
                file,
                span,
            }),
        }
    }

    fn resolve_animation(&mut self, _id: u16, decl: NodeRef) -> Result<(), AnalyzeError> {
        let props = self.props(decl, &["frame", "start", "end", "endBehavior"])?;
        let frame_node = props
            .get("frame")
            .ok_or_else(|| self.err_at(decl, "#animation requires a frame"))?;
        let frame = self.reference(decl.file, frame_node, MacroKind::Frame)?;
        let start = match props.get("start") {
            Some(node) => self.number(decl.file, node)? as f32,
            None => 0.0,
        };
        let end_node = props
            .get("end")
            .ok_or_else(|| self.err_at(decl, "#animation requires an end time"))?;
        let end = self.number(decl.file, end_node)? as f32;
        if end <= start {
            return Err(self.err_at(decl, "animation end must come after its start"));
        }

        let animation = self.out.animation.get_or_insert_with(AnimationInfo::default);
        animation.scenes.push((frame, start, end));
        if let Some(node) = props.get("endBehavior") {
            let behavior =
                self.wire_enum(decl.file, node, "end behavior", names::end_behavior)?;
            let span = self.span_of(decl.file, node);
            match self.animation_span {
                Some(_) if self.out.animation.as_ref().map(|a| a.end_behavior)
                    != Some(behavior) =>
                {
                    return Err(AnalyzeError {
                        kind: AnalyzeErrorKind::TypeMismatch(
                            "conflicting endBehavior across animations".to_string(),
                        ),
                        file: decl.file,
                        span,
                    });
                }
                _ => {
                    self.animation_span = Some((decl.file, span));
                    if let Some(animation) = self.out.animation.as_mut() {
                        animation.end_behavior = behavior;
                    }
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Synthetic resources (used by `#init`)

    fn synth_buffer(&mut self, name: &str, decl: NodeRef, info: BufferInfo) -> u16 {
        let id = self
            .out
            .symbols
            .table_mut(MacroKind::Buffer)
            .insert(name, decl, Span::default())
            .expect("synthetic names are unique");
        self.out.buffers.push(info);
        id
    }

    fn synth_bind_group_layout(
        &mut self,
        name: &str,
        decl: NodeRef,
        entries: Vec<BindingLayout>,
    ) -> u16 {
        let id = self
            .out
            .symbols
            .table_mut(MacroKind::BindGroupLayout)
            .insert(name, decl, Span::default())
            .expect("synthetic names are unique");
        self.out.bind_group_layouts.push(entries);
        id
    }

    fn synth_pipeline_layout(&mut self, name: &str, decl: NodeRef, layouts: Vec<u16>) -> u16 {
        let id = self
            .out
            .symbols
            .table_mut(MacroKind::PipelineLayout)
            .insert(name, decl, Span::default())
            .expect("synthetic names are unique");
        self.out.pipeline_layouts.push(layouts);
        id
    }

    fn synth_compute_pipeline(
        &mut self,
        name: &str,
        decl: NodeRef,
        info: ComputePipelineInfo,
    ) -> u16 {
        let id = self
            .out
            .symbols
            .table_mut(MacroKind::ComputePipeline)
            .insert(name, decl, Span::default())
            .expect("synthetic names are unique");
        self.out.compute_pipelines.push(info);
        id
    }

    fn synth_bind_group(&mut self, name: &str, decl: NodeRef, info: BindGroupInfo) -> u16 {
        let id = self
            .out
            .symbols
            .table_mut(MacroKind::BindGroup)
            .insert(name, decl, Span::default())
            .expect("synthetic names are unique");
        self.out.bind_groups.push(info);
        id
    }

    // -----------------------------------------------------------------
    // Shared value helpers

    fn reflection(
        &mut self,
        shader: u16,
        file: u16,
        span: Span,
    ) -> Result<ShaderReflection, AnalyzeError> {
        if let Some(reflection) = self.reflections.get(&shader) {
            return Ok(reflection.clone());
        }
        let code = self.out.shaders[shader as usize].code.clone();
        let reflection = self.reflector.reflect(&code).map_err(|err| AnalyzeError {
            kind: AnalyzeErrorKind::ReflectionFailed(err),
            file,
            span,
        })?;
        self.reflections.insert(shader, reflection.clone());
        Ok(reflection)
    }

    fn props(&mut self, decl: NodeRef, allowed: &[&str]) -> Result<Props, AnalyzeError> {
        self.object_props(decl.file, decl.node, allowed)
    }

    fn object_props(
        &mut self,
        file: u16,
        node: NodeId,
        allowed: &[&str],
    ) -> Result<Props, AnalyzeError> {
        let ast = &self.files[file as usize].ast;
        if ast.node(node).tag != NodeTag::Object {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch("expected an object body".to_string()),
                file,
                span: ast.node(node).span,
            });
        }
        let mut entries = Vec::new();
        for &prop in ast.children(node) {
            let kv = ast.children(prop);
            let key_span = ast.node(kv[0]).span;
            let key = key_span.text(&self.files[file as usize].src).to_string();
            if !allowed.contains(&key.as_str()) {
                // Unrecognized fields are errors, never no-ops.
                self.errors.push(AnalyzeError {
                    kind: AnalyzeErrorKind::TypeMismatch(format!(
                        "unknown property '{}'",
                        key
                    )),
                    file,
                    span: key_span,
                });
                continue;
            }
            entries.push((key, kv[1], key_span));
        }
        Ok(Props { file, entries })
    }

    fn array_items(&mut self, file: u16, node: NodeId) -> Result<Vec<NodeId>, AnalyzeError> {
        let ast = &self.files[file as usize].ast;
        if ast.node(node).tag != NodeTag::Array {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch("expected an array".to_string()),
                file,
                span: ast.node(node).span,
            });
        }
        Ok(ast.children(node).to_vec())
    }

    /// Resolve a numeric value: literals, `#define` names, and string
    /// expressions.
    fn number(&mut self, file: u16, node: NodeId) -> Result<f64, AnalyzeError> {
        let tag = self.files[file as usize].ast.node(node).tag;
        let span = self.span_of(file, node);
        match tag {
            NodeTag::LitInt | NodeTag::LitHex | NodeTag::LitFloat => {
                self.literal_number(file, node)
            }
            NodeTag::Ident => {
                let name = self.node_text(file, node).to_string();
                self.numeric_define(&name, file, span)
                    .ok_or_else(|| AnalyzeError {
                        kind: AnalyzeErrorKind::UndefinedReference {
                            kind: MacroKind::Define,
                            name,
                        },
                        file,
                        span,
                    })
            }
            NodeTag::LitStr => {
                let text = string_value(&self.files[file as usize].src, span);
                self.eval_expr(&text, file, span)
            }
            _ => Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch("expected a number".to_string()),
                file,
                span,
            }),
        }
    }

    fn eval_expr(&mut self, text: &str, file: u16, span: Span) -> Result<f64, AnalyzeError> {
        // Collect the define lookups first so the closure does not fight
        // the borrow checker over `self`.
        let mut missing: Vec<String> = Vec::new();
        let resolved: HashMap<String, f64> = self
            .defines
            .iter()
            .filter_map(|(name, d)| match d.value {
                DefineVal::Number(value) => Some((name.clone(), value)),
                _ => None,
            })
            .collect();
        let result = expr::eval(text, &mut |ident| match resolved.get(ident) {
            Some(&value) => Some(value),
            None => {
                missing.push(ident.to_string());
                None
            }
        });
        for name in missing {
            if self.defines.contains_key(&name) {
                // Known but non-numeric; record the mixed use.
                let _ = self.numeric_define(&name, file, span);
            }
        }
        result.map_err(|err| AnalyzeError {
            kind: AnalyzeErrorKind::InvalidExpression(err),
            file,
            span,
        })
    }

    fn literal_number(&self, file: u16, node: NodeId) -> Result<f64, AnalyzeError> {
        let span = self.span_of(file, node);
        let text = span.text(&self.files[file as usize].src);
        let tag = self.files[file as usize].ast.node(node).tag;
        let parsed = match tag {
            NodeTag::LitHex => {
                let (negative, digits) = match text.strip_prefix('-') {
                    Some(rest) => (true, rest),
                    None => (false, text),
                };
                i64::from_str_radix(digits.trim_start_matches("0x").trim_start_matches("0X"), 16)
                    .ok()
                    .map(|v| if negative { -(v as f64) } else { v as f64 })
            }
            _ => text.parse::<f64>().ok(),
        };
        parsed.ok_or_else(|| AnalyzeError {
            kind: AnalyzeErrorKind::TypeMismatch(format!("'{}' is not a number", text)),
            file,
            span,
        })
    }

    fn integral(
        &self,
        value: f64,
        min: f64,
        max: f64,
        file: u16,
        node: NodeId,
    ) -> Result<i64, AnalyzeError> {
        let rounded = value.round();
        if (value - rounded).abs() > 1e-6 || rounded < min || rounded > max {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(format!(
                    "{} is outside the range {}..={}",
                    value, min, max
                )),
                file,
                span: self.span_of(file, node),
            });
        }
        Ok(rounded as i64)
    }

    fn u32_value(&mut self, file: u16, node: NodeId) -> Result<u32, AnalyzeError> {
        let value = self.number(file, node)?;
        Ok(self.integral(value, 0.0, u32::MAX as f64, file, node)? as u32)
    }

    fn i32_value(&mut self, file: u16, node: NodeId) -> Result<i32, AnalyzeError> {
        let value = self.number(file, node)?;
        Ok(self.integral(value, i32::MIN as f64, i32::MAX as f64, file, node)? as i32)
    }

    fn u8_value(&mut self, file: u16, node: NodeId) -> Result<u8, AnalyzeError> {
        let value = self.number(file, node)?;
        Ok(self.integral(value, 0.0, u8::MAX as f64, file, node)? as u8)
    }

    fn bool_value(&mut self, file: u16, node: NodeId) -> Result<bool, AnalyzeError> {
        let tag = self.files[file as usize].ast.node(node).tag;
        if tag != NodeTag::LitBool {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch("expected true or false".to_string()),
                file,
                span: self.span_of(file, node),
            });
        }
        Ok(self.node_text(file, node) == "true")
    }

    /// Resolve a string value: a quoted literal or a text `#define`.
    fn string(&mut self, file: u16, node: NodeId) -> Result<String, AnalyzeError> {
        let tag = self.files[file as usize].ast.node(node).tag;
        let span = self.span_of(file, node);
        match tag {
            NodeTag::LitStr => Ok(string_value(&self.files[file as usize].src, span)),
            NodeTag::Ident => {
                let name = self.node_text(file, node).to_string();
                self.text_define(&name, file, span)
                    .ok_or_else(|| AnalyzeError {
                        kind: AnalyzeErrorKind::UndefinedReference {
                            kind: MacroKind::Define,
                            name,
                        },
                        file,
                        span,
                    })
            }
            _ => Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch("expected a string".to_string()),
                file,
                span,
            }),
        }
    }

    /// Resolve a bare identifier against the expected kind's table.
    fn reference(
        &mut self,
        file: u16,
        node: NodeId,
        kind: MacroKind,
    ) -> Result<u16, AnalyzeError> {
        let name = self.ident_text(file, node)?;
        let span = self.span_of(file, node);
        self.reference_name(file, &name, kind, span)
    }

    fn reference_name(
        &mut self,
        file: u16,
        name: &str,
        kind: MacroKind,
        span: Span,
    ) -> Result<u16, AnalyzeError> {
        match self.out.symbols.resolve(kind, name) {
            Some(entry) => Ok(entry.id),
            None => Err(AnalyzeError {
                kind: AnalyzeErrorKind::UndefinedReference {
                    kind,
                    name: name.to_string(),
                },
                file,
                span,
            }),
        }
    }

    fn ident_text(&mut self, file: u16, node: NodeId) -> Result<String, AnalyzeError> {
        let tag = self.files[file as usize].ast.node(node).tag;
        if tag != NodeTag::Ident {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch("expected an identifier".to_string()),
                file,
                span: self.span_of(file, node),
            });
        }
        Ok(self.node_text(file, node).to_string())
    }

    fn wire_enum<T>(
        &mut self,
        file: u16,
        node: NodeId,
        what: &str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<T, AnalyzeError> {
        let name = self.ident_text(file, node)?;
        parse(&name).ok_or_else(|| AnalyzeError {
            kind: AnalyzeErrorKind::TypeMismatch(format!("'{}' is not a {}", name, what)),
            file,
            span: self.span_of(file, node),
        })
    }

    fn buffer_usages(&mut self, file: u16, node: NodeId) -> Result<BufferUsages, AnalyzeError> {
        let mut usages = BufferUsages::empty();
        for item in self.array_items(file, node)? {
            let name = self.ident_text(file, item)?;
            let usage = names::buffer_usage(&name).ok_or_else(|| AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(format!(
                    "'{}' is not a buffer usage",
                    name
                )),
                file,
                span: self.span_of(file, item),
            })?;
            usages = usages | usage;
        }
        if !usages.is_wire_encodable() {
            return Err(AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(
                    "MAP_READ/MAP_WRITE usages cannot be encoded in a payload".to_string(),
                ),
                file,
                span: self.span_of(file, node),
            });
        }
        Ok(usages)
    }

    fn texture_usages(&mut self, file: u16, node: NodeId) -> Result<TextureUsages, AnalyzeError> {
        let mut usages = TextureUsages::empty();
        for item in self.array_items(file, node)? {
            let name = self.ident_text(file, item)?;
            let usage = names::texture_usage(&name).ok_or_else(|| AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(format!(
                    "'{}' is not a texture usage",
                    name
                )),
                file,
                span: self.span_of(file, item),
            })?;
            usages = usages | usage;
        }
        Ok(usages)
    }

    fn shader_stages(
        &mut self,
        file: u16,
        node: NodeId,
    ) -> Result<pngine_bytecode::wire::ShaderStages, AnalyzeError> {
        let mut stages = pngine_bytecode::wire::ShaderStages(0);
        for item in self.array_items(file, node)? {
            let name = self.ident_text(file, item)?;
            let stage = names::shader_stage(&name).ok_or_else(|| AnalyzeError {
                kind: AnalyzeErrorKind::TypeMismatch(format!(
                    "'{}' is not a shader stage",
                    name
                )),
                file,
                span: self.span_of(file, item),
            })?;
            stages = stages | stage;
        }
        Ok(stages)
    }

    fn dotted_segments(&self, file: u16, node: NodeId) -> Vec<String> {
        let ast = &self.files[file as usize].ast;
        ast.children(node)
            .iter()
            .map(|&seg| self.node_text(file, seg).to_string())
            .collect()
    }

    fn node_text(&self, file: u16, node: NodeId) -> &str {
        let span = self.files[file as usize].ast.node(node).span;
        span.text(&self.files[file as usize].src)
    }

    fn span_of(&self, file: u16, node: NodeId) -> Span {
        self.files[file as usize].ast.node(node).span
    }

    fn err_at(&self, decl: NodeRef, message: &str) -> AnalyzeError {
        AnalyzeError {
            kind: AnalyzeErrorKind::TypeMismatch(message.to_string()),
            file: decl.file,
            span: self.span_of(decl.file, decl.node),
        }
    }

    fn error(&mut self, file: u16, span: Span, kind: AnalyzeErrorKind) {
        self.errors.push(AnalyzeError { kind, file, span });
    }
}

fn plugin_of(kind: MacroKind) -> PluginSet {
    match kind {
        MacroKind::RenderPipeline | MacroKind::RenderPass | MacroKind::RenderBundle => {
            PluginSet::RENDER
        }
        MacroKind::ComputePipeline | MacroKind::ComputePass | MacroKind::Init => {
            PluginSet::COMPUTE
        }
        MacroKind::Animation => PluginSet::ANIMATION,
        MacroKind::Texture | MacroKind::TextureView | MacroKind::Sampler => PluginSet::TEXTURE,
        MacroKind::ImageBitmap => PluginSet::IMAGE_BITMAP.union(PluginSet::TEXTURE),
        MacroKind::WasmCall => PluginSet::WASM,
        MacroKind::QuerySet => PluginSet::QUERY_SET,
        _ => PluginSet::new(),
    }
}
