//! The pngine compiler.
//!
//! pngine turns a declarative description of GPU resources — shader
//! modules, buffers, pipelines, bind groups, passes, frames — into a
//! compact bytecode payload that a small dispatcher replays against a
//! WebGPU-shaped backend. This crate is the front half of that story:
//! the lexer, parser, analyzer and emitter, plus `#import` resolution and
//! the narrow shader-reflection interface the analyzer consumes.
//!
//! The produced [`Module`] and everything about its byte layout live in
//! [`pngine_bytecode`]; replay lives in `pngine_vm`. A minimal compile:
//!
//! ```no_run
//! use pngine::{compile, Options};
//! use pngine::reflect::NoReflection;
//!
//! let source = r#"
//!     #wgsl s { "@vertex fn v() -> @builtin(position) vec4f {
//!                    return vec4f(0.0, 0.0, 0.0, 1.0);
//!                }" }
//!     #renderPipeline p { layout=auto vertex={module=s entryPoint="v"} }
//!     #renderPass r { colorAttachments=[{view=contextCurrentTexture
//!                                        loadOp=clear storeOp=store}]
//!                     pipeline=p draw=3 }
//!     #frame main { perform=[r] }
//! "#;
//! let module = compile(source, &Options::default(), &NoReflection)?;
//! let payload = module.to_payload();
//! # Ok::<(), pngine::Errors>(())
//! ```

pub mod analysis;
pub mod analyzer;
pub mod ast;
pub mod emitter;
pub mod error;
pub mod expr;
pub mod import;
pub mod lexer;
pub mod parser;
pub mod reflect;
pub mod symbol;
pub mod token;

pub use self::error::{CompileError, CompileErrorKind, Errors};
pub use self::import::{FsLoader, MemoryLoader, SourceLoader};
pub use self::reflect::Reflect;
// The wire format is this crate's output type; re-export it whole the
// way nannou re-exports wgpu.
pub use pngine_bytecode as bytecode;
pub use pngine_bytecode::Module;

use std::path::PathBuf;

use log::debug;

/// Knobs for one compile.
#[derive(Debug, Default)]
pub struct Options {
    /// Directory `#import` and `#imageBitmap` paths resolve against.
    pub base_dir: PathBuf,
    /// Tailored runtime bytes to embed, making the payload
    /// self-contained. `None` emits a payload-only module and leaves the
    /// executor to the host.
    pub executor: Option<Vec<u8>>,
}

impl Options {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Options {
        Options {
            base_dir: base_dir.into(),
            executor: None,
        }
    }
}

/// Compile a source text, resolving imports through the filesystem.
pub fn compile(
    source: &str,
    options: &Options,
    reflector: &dyn Reflect,
) -> Result<Module, Errors> {
    compile_with_loader(source, options, reflector, &FsLoader)
}

/// Compile with a caller-supplied [`SourceLoader`] — the seam tests and
/// embedded hosts use to avoid the filesystem.
pub fn compile_with_loader(
    source: &str,
    options: &Options,
    reflector: &dyn Reflect,
    loader: &dyn SourceLoader,
) -> Result<Module, Errors> {
    let files = import::load_sources(source, &options.base_dir, loader)?;
    debug!("compiling {} file(s)", files.len());

    let analysis = analyzer::analyze(&files, reflector, loader, &options.base_dir)
        .map_err(|analyze_errors| {
            let mut errors = Errors::default();
            for err in analyze_errors {
                let file = files
                    .get(err.file as usize)
                    .map(|f| f.name.clone());
                let span = err.span;
                errors.push(CompileError {
                    kind: CompileErrorKind::Analyze(err),
                    file,
                    span: Some(span),
                });
            }
            errors
        })?;

    emitter::emit(&analysis, options.executor.clone()).map_err(|err| {
        Errors(vec![CompileError {
            kind: CompileErrorKind::Emit(err),
            file: None,
            span: None,
        }])
    })
}
