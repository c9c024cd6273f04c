//! `#import` resolution.
//!
//! Imports are textual includes with set semantics: every transitive file
//! is loaded once, keyed by canonical path, and merged into one namespace.
//! A file importing one that is still being expanded is a cycle and an
//! error. To keep compiles independent of import order, the transitive
//! closure (minus the entry source) is analyzed in canonical-path order —
//! two programs importing the same set of files in different orders
//! produce identical id assignments and therefore identical bytecode.
//!
//! Loading goes through [`SourceLoader`] so tests can compile import
//! graphs from memory; the default loader is the filesystem.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::ast::{Ast, NodeTag};
use crate::error::{CompileError, CompileErrorKind, Errors};
use crate::lexer::{string_value, Lexer};
use crate::parser;
use crate::token::MacroKind;

/// Where `#import` paths and `#imageBitmap` bytes come from.
pub trait SourceLoader {
    fn load_text(&self, path: &Path) -> io::Result<String>;
    fn load_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// The deduplication key for a path.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// The filesystem loader used by `compile`.
#[derive(Debug, Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn load_text(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn load_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        path.canonicalize()
    }
}

/// An in-memory loader for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
    blobs: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> MemoryLoader {
        MemoryLoader::default()
    }

    pub fn file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> MemoryLoader {
        self.files.insert(path.into(), text.into());
        self
    }

    pub fn blob(mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> MemoryLoader {
        self.blobs.insert(path.into(), bytes);
        self
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display()))
}

impl SourceLoader for MemoryLoader {
    fn load_text(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn load_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.blobs
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// One parsed file of the compile.
#[derive(Debug)]
pub struct SourceFile {
    /// Display name for diagnostics: `<input>` for the entry source, the
    /// given path for imports.
    pub name: String,
    pub src: String,
    pub ast: Ast,
}

#[derive(Clone, Copy, PartialEq)]
enum LoadState {
    Loading,
    Done,
}

/// Expand the entry source and its transitive imports into the ordered
/// file list the analyzer walks.
pub fn load_sources(
    entry: &str,
    base_dir: &Path,
    loader: &dyn SourceLoader,
) -> Result<Vec<SourceFile>, Errors> {
    let mut errors = Errors::default();
    let entry_file = match parse_one("<input>", entry.to_string(), &mut errors) {
        Some(file) => file,
        None => return Err(errors),
    };

    let mut states: HashMap<PathBuf, LoadState> = HashMap::new();
    let mut imported: Vec<(PathBuf, SourceFile)> = Vec::new();
    // Explicit expansion stack: (canonical path or None for the entry,
    // pending import paths of that file).
    let mut stack: Vec<(Option<PathBuf>, Vec<String>)> =
        vec![(None, import_paths(&entry_file))];
    let mut files_in_flight: Vec<SourceFile> = vec![entry_file];

    while let Some((_, pending)) = stack.last_mut() {
        let raw_path = match pending.pop() {
            Some(path) => path,
            None => {
                // This file is fully expanded.
                let (canonical, _) = stack.pop().expect("stack is non-empty in the loop");
                let file = files_in_flight.pop().expect("one file per stack frame");
                match canonical {
                    Some(canonical) => {
                        states.insert(canonical.clone(), LoadState::Done);
                        imported.push((canonical, file));
                    }
                    None => {
                        // The entry source; it stays first.
                        imported.push((PathBuf::new(), file));
                    }
                }
                continue;
            }
        };

        let full = base_dir.join(&raw_path);
        let canonical = match loader.canonicalize(&full) {
            Ok(canonical) => canonical,
            Err(err) => {
                errors.push(io_error(&raw_path, err));
                continue;
            }
        };
        match states.get(&canonical) {
            Some(LoadState::Done) => continue,
            Some(LoadState::Loading) => {
                errors.push(CompileError {
                    kind: CompileErrorKind::CyclicImport(raw_path.clone()),
                    file: None,
                    span: None,
                });
                continue;
            }
            None => {}
        }
        let text = match loader.load_text(&canonical) {
            Ok(text) => text,
            Err(err) => {
                errors.push(io_error(&raw_path, err));
                continue;
            }
        };
        match parse_one(&raw_path, text, &mut errors) {
            Some(file) => {
                states.insert(canonical.clone(), LoadState::Loading);
                stack.push((Some(canonical), import_paths(&file)));
                files_in_flight.push(file);
            }
            None => continue,
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // The entry source analyzes first; imports follow in canonical-path
    // order so import order in the text cannot influence id assignment.
    let entry_pos = imported
        .iter()
        .position(|(path, _)| path.as_os_str().is_empty())
        .expect("the entry file is always pushed");
    let entry_file = imported.remove(entry_pos).1;
    imported.sort_by(|(a, _), (b, _)| a.cmp(b));
    let mut files = vec![entry_file];
    files.extend(imported.into_iter().map(|(_, file)| file));
    Ok(files)
}

fn parse_one(name: &str, src: String, errors: &mut Errors) -> Option<SourceFile> {
    let tokens = match Lexer::new(&src).tokenize() {
        Ok(tokens) => tokens,
        Err(err) => {
            errors.push(CompileError {
                kind: CompileErrorKind::Lex(err),
                file: Some(name.to_string()),
                span: None,
            });
            return None;
        }
    };
    match parser::parse(&tokens) {
        Ok(ast) => Some(SourceFile {
            name: name.to_string(),
            src,
            ast,
        }),
        Err(parse_errors) => {
            for err in parse_errors {
                errors.push(CompileError {
                    kind: CompileErrorKind::Parse(err),
                    file: Some(name.to_string()),
                    span: Some(err.span),
                });
            }
            None
        }
    }
}

fn import_paths(file: &SourceFile) -> Vec<String> {
    let mut paths = Vec::new();
    for &root in file.ast.roots() {
        if let NodeTag::MacroDecl(MacroKind::Import) = file.ast.node(root).tag {
            let path_node = file.ast.children(root)[0];
            let span = file.ast.node(path_node).span;
            paths.push(string_value(&file.src, span));
        }
    }
    // The stack pops from the back; reverse so expansion follows source
    // order (cycle reports stay deterministic — the final file list is
    // order-insensitive anyway).
    paths.reverse();
    paths
}

fn io_error(path: &str, err: io::Error) -> CompileError {
    CompileError {
        kind: CompileErrorKind::Io {
            path: path.to_string(),
            message: err.to_string(),
        },
        file: None,
        span: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_imports_load_once() {
        let loader = MemoryLoader::new()
            .file("b.pngn", "#import \"d.pngn\"\n#buffer b { size=4 usage=[UNIFORM] }")
            .file("c.pngn", "#import \"d.pngn\"\n#buffer c { size=4 usage=[UNIFORM] }")
            .file("d.pngn", "#buffer d { size=4 usage=[UNIFORM] }");
        let entry = "#import \"b.pngn\"\n#import \"c.pngn\"";
        let files = load_sources(entry, Path::new(""), &loader).unwrap();
        // Entry + b + c + d, each exactly once.
        assert_eq!(files.len(), 4);
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names[0], "<input>");
        assert_eq!(names.iter().filter(|n| **n == "d.pngn").count(), 1);
    }

    #[test]
    fn import_order_does_not_change_the_file_list() {
        let loader = MemoryLoader::new()
            .file("b.pngn", "#buffer b { size=4 usage=[UNIFORM] }")
            .file("c.pngn", "#buffer c { size=4 usage=[UNIFORM] }");
        let forward = load_sources(
            "#import \"b.pngn\"\n#import \"c.pngn\"",
            Path::new(""),
            &loader,
        )
        .unwrap();
        let backward = load_sources(
            "#import \"c.pngn\"\n#import \"b.pngn\"",
            Path::new(""),
            &loader,
        )
        .unwrap();
        let forward_names: Vec<_> = forward.iter().map(|f| f.name.as_str()).collect();
        let backward_names: Vec<_> = backward.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(forward_names[1..], backward_names[1..]);
    }

    #[test]
    fn cycles_are_errors() {
        let loader = MemoryLoader::new()
            .file("a.pngn", "#import \"b.pngn\"")
            .file("b.pngn", "#import \"a.pngn\"");
        let errors = load_sources("#import \"a.pngn\"", Path::new(""), &loader).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e.kind, CompileErrorKind::CyclicImport(_))));
    }

    #[test]
    fn missing_files_are_reported_with_their_path() {
        let loader = MemoryLoader::new();
        let errors = load_sources("#import \"gone.pngn\"", Path::new(""), &loader).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(&e.kind, CompileErrorKind::Io { path, .. } if path == "gone.pngn")));
    }
}
