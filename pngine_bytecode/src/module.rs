//! The payload container.
//!
//! A [`Module`] is the immutable product of a compile: header fields, an
//! optional embedded executor, the opcode stream and the data section.
//! [`Module::to_payload`] and [`Module::from_payload`] convert to and from
//! the byte-exact container; [`Module::validate`] proves the stream is
//! well-formed before any backend sees it.

use std::collections::HashSet;

use crate::animation::AnimationTable;
use crate::bytes::{Reader, Writer};
use crate::instr::{DecodeError, Instruction};
use crate::plugin::PluginSet;
use crate::{
    FLAG_HAS_ANIMATION_TABLE, FLAG_HAS_EXECUTOR, HEADER_LEN, MAGIC, MAX_BYTECODE_LEN, NO_BUFFER_ID,
    NO_DEPTH_ID, SURFACE_TEXTURE_ID, VERSION,
};
use thiserror::Error;

/// A compiled payload, in memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    /// Format version; `crate::VERSION` for anything this crate produced.
    pub version: u16,
    /// Which runtime capabilities the payload needs.
    pub plugins: PluginSet,
    /// The tailored runtime executor, when the payload is self-contained.
    pub executor: Option<Vec<u8>>,
    /// The opcode stream.
    pub bytecode: Vec<u8>,
    /// Strings, shader sources, descriptor records and static blobs.
    pub data: Vec<u8>,
    /// Whether the data section leads with an animation-table offset.
    pub has_animation_table: bool,
}

/// Per-kind resource counts plus stream statistics, computed by
/// [`Module::validate`]. The dispatcher sizes its handle tables from the
/// counts, which are `max id + 1` per create opcode kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    pub buffers: u16,
    pub textures: u16,
    pub samplers: u16,
    pub shaders: u16,
    pub render_pipelines: u16,
    pub compute_pipelines: u16,
    pub bind_groups: u16,
    pub wasm_modules: u16,
    pub opcode_count: u32,
    pub submit_count: u32,
}

/// A payload failed its load-time checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidateError {
    #[error("error[E501]: payload magic is not \"PNGB\"")]
    BadMagic,
    #[error("error[E502]: unsupported payload version {0}")]
    BadVersion(u16),
    #[error("error[E503]: payload sections overlap or are out of order")]
    SectionOverlap,
    #[error("error[E504]: offset {offset} is outside the {section} section")]
    OffsetOutOfBounds { section: &'static str, offset: u32 },
    #[error("error[E505]: {kind} id {id} referenced at offset {offset} before its creation")]
    ForwardReference {
        kind: &'static str,
        id: u16,
        offset: usize,
    },
    #[error("error[E506]: opcode stream malformed at offset {offset}: {reason}")]
    TruncatedStream { offset: usize, reason: &'static str },
    #[error("error[E507]: unknown opcode byte 0x{byte:02X} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },
    #[error("error[E508]: malformed header: {0}")]
    BadHeader(&'static str),
}

impl From<DecodeError> for ValidateError {
    fn from(err: DecodeError) -> ValidateError {
        match err {
            DecodeError::UnknownOpcode { byte, offset } => {
                ValidateError::UnknownOpcode { byte, offset }
            }
            DecodeError::Truncated { offset } => ValidateError::TruncatedStream {
                offset,
                reason: "operands run past the end of the stream",
            },
            DecodeError::BadOperand { offset, .. } => ValidateError::TruncatedStream {
                offset,
                reason: "operand byte is not a member of its enumeration",
            },
        }
    }
}

impl Module {
    /// The header flag word for this module.
    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.executor.is_some() {
            flags |= FLAG_HAS_EXECUTOR;
        }
        if self.has_animation_table {
            flags |= FLAG_HAS_ANIMATION_TABLE;
        }
        flags
    }

    /// Serialize into the byte-exact payload container.
    pub fn to_payload(&self) -> Vec<u8> {
        let executor_len = self.executor.as_ref().map_or(0, Vec::len);
        let executor_offset = if self.executor.is_some() { HEADER_LEN } else { 0 };
        let bytecode_offset = HEADER_LEN + executor_len;
        let data_offset = bytecode_offset + self.bytecode.len();

        let mut w = Writer::new();
        w.raw(&MAGIC);
        w.u16(self.version);
        w.u16(self.flags());
        w.u8(self.plugins.to_wire());
        w.raw(&[0, 0, 0]);
        w.u32(executor_offset as u32);
        w.u32(executor_len as u32);
        w.u32(bytecode_offset as u32);
        w.u32(self.bytecode.len() as u32);
        w.u32(data_offset as u32);
        debug_assert_eq!(w.len(), HEADER_LEN);

        if let Some(executor) = &self.executor {
            w.raw(executor);
        }
        w.raw(&self.bytecode);
        w.raw(&self.data);
        w.into_bytes()
    }

    /// Parse a payload container, checking the header invariants.
    ///
    /// Stream-level invariants are the business of [`Module::validate`],
    /// which callers should run next.
    pub fn from_payload(payload: &[u8]) -> Result<Module, ValidateError> {
        if payload.len() < HEADER_LEN {
            return Err(ValidateError::BadHeader("payload shorter than its header"));
        }
        let mut r = Reader::new(payload);
        let mut magic = [0u8; 4];
        for byte in magic.iter_mut() {
            *byte = r.u8().expect("header length checked above");
        }
        if magic != MAGIC {
            return Err(ValidateError::BadMagic);
        }
        let version = r.u16().expect("header length checked above");
        if version != VERSION {
            return Err(ValidateError::BadVersion(version));
        }
        let flags = r.u16().expect("header length checked above");
        if flags & !(FLAG_HAS_EXECUTOR | FLAG_HAS_ANIMATION_TABLE) != 0 {
            return Err(ValidateError::BadHeader("reserved flag bits are set"));
        }
        let plugins = PluginSet::from_wire(r.u8().expect("header length checked above"));
        if !plugins.contains(PluginSet::CORE) {
            return Err(ValidateError::BadHeader("core plugin bit is clear"));
        }
        let reserved = [
            r.u8().expect("header length checked above"),
            r.u8().expect("header length checked above"),
            r.u8().expect("header length checked above"),
        ];
        if reserved != [0, 0, 0] {
            return Err(ValidateError::BadHeader("reserved header bytes are set"));
        }
        let executor_offset = r.u32().expect("header length checked above") as usize;
        let executor_length = r.u32().expect("header length checked above") as usize;
        let bytecode_offset = r.u32().expect("header length checked above") as usize;
        let bytecode_length = r.u32().expect("header length checked above") as usize;
        let data_offset = r.u32().expect("header length checked above") as usize;

        let has_executor = flags & FLAG_HAS_EXECUTOR != 0;
        if has_executor != (executor_offset != 0) {
            return Err(ValidateError::BadHeader(
                "executor flag disagrees with the executor offset",
            ));
        }
        let executor_end = executor_offset + executor_length;
        let bytecode_end = bytecode_offset
            .checked_add(bytecode_length)
            .ok_or(ValidateError::SectionOverlap)?;
        if has_executor && (executor_offset < HEADER_LEN || executor_end > bytecode_offset) {
            return Err(ValidateError::SectionOverlap);
        }
        if bytecode_offset < HEADER_LEN || bytecode_end > data_offset {
            return Err(ValidateError::SectionOverlap);
        }
        if data_offset > payload.len() || bytecode_end > payload.len() {
            return Err(ValidateError::OffsetOutOfBounds {
                section: "payload",
                offset: data_offset as u32,
            });
        }

        let executor = if has_executor {
            Some(payload[executor_offset..executor_end].to_vec())
        } else {
            None
        };
        Ok(Module {
            version,
            plugins,
            executor,
            bytecode: payload[bytecode_offset..bytecode_end].to_vec(),
            data: payload[data_offset..].to_vec(),
            has_animation_table: flags & FLAG_HAS_ANIMATION_TABLE != 0,
        })
    }

    /// A slice of the data section, bounds-checked.
    pub fn data_slice(&self, off: u32, len: u32) -> Option<&[u8]> {
        let start = off as usize;
        let end = start.checked_add(len as usize)?;
        self.data.get(start..end)
    }

    /// A UTF-8 string at `(off, len)` in the data section.
    pub fn data_str(&self, off: u32, len: u32) -> Option<&str> {
        std::str::from_utf8(self.data_slice(off, len)?).ok()
    }

    /// A null-terminated string-table entry starting at `off`.
    pub fn string_at(&self, off: u32) -> Option<&str> {
        let start = off as usize;
        let rest = self.data.get(start..)?;
        let nul = rest.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&rest[..nul]).ok()
    }

    /// Decode the animation table, if the module carries one.
    pub fn animation_table(&self) -> Option<AnimationTable> {
        if !self.has_animation_table {
            return None;
        }
        let off = u32::from_le_bytes([
            *self.data.get(0)?,
            *self.data.get(1)?,
            *self.data.get(2)?,
            *self.data.get(3)?,
        ]) as usize;
        AnimationTable::decode(self.data.get(off..)?).ok()
    }

    /// Walk the opcode stream and prove every load-time invariant.
    pub fn validate(&self) -> Result<ModuleInfo, ValidateError> {
        if self.bytecode.len() > MAX_BYTECODE_LEN {
            return Err(ValidateError::BadHeader("bytecode exceeds the 1 MiB cap"));
        }
        let mut declared = DeclaredIds::default();
        let mut info = ModuleInfo::default();
        let mut pass = Pass::None;
        let mut pos = 0;
        let mut ended = false;
        while pos < self.bytecode.len() {
            if ended {
                return Err(ValidateError::TruncatedStream {
                    offset: pos,
                    reason: "bytes trail the end opcode",
                });
            }
            let (instr, next) = Instruction::decode_at(&self.bytecode, pos)?;
            info.opcode_count += 1;
            self.check_instruction(&instr, pos, &mut declared, &mut pass)?;
            match instr {
                Instruction::Submit => info.submit_count += 1,
                Instruction::End => ended = true,
                _ => {}
            }
            pos = next;
        }
        if !ended {
            return Err(ValidateError::TruncatedStream {
                offset: pos,
                reason: "stream does not terminate with an end opcode",
            });
        }
        info.buffers = declared.buffers.count();
        info.textures = declared.textures.count();
        info.samplers = declared.samplers.count();
        info.shaders = declared.shaders.count();
        info.render_pipelines = declared.render_pipelines.count();
        info.compute_pipelines = declared.compute_pipelines.count();
        info.bind_groups = declared.bind_groups.count();
        info.wasm_modules = declared.wasm_modules.count();
        Ok(info)
    }

    fn check_data_ref(&self, off: u32, len: u32) -> Result<(), ValidateError> {
        if self.data_slice(off, len).is_none() {
            return Err(ValidateError::OffsetOutOfBounds {
                section: "data",
                offset: off,
            });
        }
        Ok(())
    }

    fn check_instruction(
        &self,
        instr: &Instruction,
        offset: usize,
        declared: &mut DeclaredIds,
        pass: &mut Pass,
    ) -> Result<(), ValidateError> {
        match *instr {
            Instruction::CreateBuffer { id, .. } => declared.buffers.declare(id),
            Instruction::CreateTexture { id, desc_off, desc_len } => {
                self.check_data_ref(desc_off, desc_len)?;
                declared.textures.declare(id);
            }
            Instruction::CreateSampler { id, desc_off, desc_len } => {
                self.check_data_ref(desc_off, desc_len)?;
                declared.samplers.declare(id);
            }
            Instruction::CreateShader { id, code_off, code_len } => {
                self.check_data_ref(code_off, code_len)?;
                declared.shaders.declare(id);
            }
            Instruction::CreateRenderPipeline { id, desc_off, desc_len } => {
                self.check_data_ref(desc_off, desc_len)?;
                declared.render_pipelines.declare(id);
            }
            Instruction::CreateComputePipeline { id, desc_off, desc_len } => {
                self.check_data_ref(desc_off, desc_len)?;
                declared.compute_pipelines.declare(id);
            }
            Instruction::CreateBindGroup { id, entries_off, entries_len, .. } => {
                self.check_data_ref(entries_off, entries_len)?;
                declared.bind_groups.declare(id);
            }
            Instruction::BeginRenderPass { color_tex, depth_tex, .. } => {
                if color_tex != SURFACE_TEXTURE_ID {
                    declared.textures.require("texture", color_tex, offset)?;
                }
                if depth_tex != NO_DEPTH_ID {
                    declared.textures.require("texture", depth_tex, offset)?;
                }
                *pass = Pass::Render;
            }
            Instruction::BeginComputePass => *pass = Pass::Compute,
            Instruction::EndPass => *pass = Pass::None,
            Instruction::SetPipeline { id } => match pass {
                Pass::Render => declared.render_pipelines.require("render pipeline", id, offset)?,
                Pass::Compute => {
                    declared.compute_pipelines.require("compute pipeline", id, offset)?
                }
                // The dispatcher rejects the sequencing; here it is enough
                // that the id exists in either pipeline kind.
                Pass::None => {
                    if !declared.render_pipelines.is_declared(id)
                        && !declared.compute_pipelines.is_declared(id)
                    {
                        return Err(ValidateError::ForwardReference {
                            kind: "pipeline",
                            id,
                            offset,
                        });
                    }
                }
            },
            Instruction::SetBindGroup { id, .. } => {
                declared.bind_groups.require("bind group", id, offset)?
            }
            Instruction::SetVertexBuffer { id, .. } | Instruction::SetIndexBuffer { id, .. } => {
                declared.buffers.require("buffer", id, offset)?
            }
            Instruction::Draw { .. } | Instruction::DrawIndexed { .. } | Instruction::Dispatch { .. } => {}
            Instruction::WriteBuffer { id, data_off, data_len, .. } => {
                declared.buffers.require("buffer", id, offset)?;
                self.check_data_ref(data_off, data_len)?;
            }
            Instruction::WriteTimeUniform { id, .. } => {
                declared.buffers.require("buffer", id, offset)?
            }
            Instruction::CopyBuffer { src, dst, .. } => {
                declared.buffers.require("buffer", src, offset)?;
                declared.buffers.require("buffer", dst, offset)?;
            }
            Instruction::InitWasmModule { id, data_off, data_len } => {
                self.check_data_ref(data_off, data_len)?;
                declared.wasm_modules.declare(id);
            }
            Instruction::CallWasmFunc {
                module,
                name_off,
                name_len,
                args_off,
                args_len,
                out_buf,
                ..
            } => {
                declared.wasm_modules.require("wasm module", module, offset)?;
                self.check_data_ref(name_off, name_len)?;
                self.check_data_ref(args_off, args_len)?;
                if out_buf != NO_BUFFER_ID {
                    declared.buffers.require("buffer", out_buf, offset)?;
                }
            }
            Instruction::Submit | Instruction::End => {}
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    None,
    Render,
    Compute,
}

/// Tracks which dense ids each kind has declared so far.
#[derive(Default)]
struct DeclaredIds {
    buffers: IdSet,
    textures: IdSet,
    samplers: IdSet,
    shaders: IdSet,
    render_pipelines: IdSet,
    compute_pipelines: IdSet,
    bind_groups: IdSet,
    wasm_modules: IdSet,
}

#[derive(Default)]
struct IdSet {
    declared: HashSet<u16>,
    max: Option<u16>,
}

impl IdSet {
    fn declare(&mut self, id: u16) {
        self.declared.insert(id);
        self.max = Some(self.max.map_or(id, |m| m.max(id)));
    }

    fn is_declared(&self, id: u16) -> bool {
        self.declared.contains(&id)
    }

    fn require(&self, kind: &'static str, id: u16, offset: usize) -> Result<(), ValidateError> {
        if self.is_declared(id) {
            Ok(())
        } else {
            Err(ValidateError::ForwardReference { kind, id, offset })
        }
    }

    fn count(&self) -> u16 {
        self.max.map_or(0, |m| m + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{LoadOp, StoreOp};

    fn stream(instructions: &[Instruction]) -> Vec<u8> {
        let mut w = Writer::new();
        for instr in instructions {
            instr.encode(&mut w);
        }
        w.into_bytes()
    }

    fn module_with(bytecode: Vec<u8>, data: Vec<u8>) -> Module {
        Module {
            version: VERSION,
            plugins: PluginSet::new(),
            executor: None,
            bytecode,
            data,
            has_animation_table: false,
        }
    }

    #[test]
    fn payload_round_trip() {
        let module = Module {
            version: VERSION,
            plugins: PluginSet::new() | PluginSet::RENDER,
            executor: Some(vec![0xEE; 40]),
            bytecode: stream(&[Instruction::Submit, Instruction::End]),
            data: b"hello\0world\0".to_vec(),
            has_animation_table: false,
        };
        let payload = module.to_payload();
        let parsed = Module::from_payload(&payload).unwrap();
        assert_eq!(parsed, module);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut payload = module_with(stream(&[Instruction::End]), vec![]).to_payload();
        payload[0] = b'X';
        assert_eq!(Module::from_payload(&payload), Err(ValidateError::BadMagic));
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut payload = module_with(stream(&[Instruction::End]), vec![]).to_payload();
        payload[4] = 9;
        assert_eq!(Module::from_payload(&payload), Err(ValidateError::BadVersion(9)));
    }

    #[test]
    fn reserved_flag_bits_are_rejected() {
        let mut payload = module_with(stream(&[Instruction::End]), vec![]).to_payload();
        payload[7] = 0x80;
        assert!(matches!(
            Module::from_payload(&payload),
            Err(ValidateError::BadHeader(_))
        ));
    }

    #[test]
    fn overlapping_sections_are_rejected() {
        let mut payload = module_with(stream(&[Instruction::End]), vec![1, 2, 3]).to_payload();
        // Pull the data section start back inside the bytecode section.
        payload[28..32].copy_from_slice(&(HEADER_LEN as u32).to_le_bytes());
        assert_eq!(
            Module::from_payload(&payload),
            Err(ValidateError::SectionOverlap)
        );
    }

    #[test]
    fn empty_stream_is_just_an_end() {
        let module = module_with(stream(&[Instruction::End]), vec![]);
        let info = module.validate().unwrap();
        assert_eq!(info.opcode_count, 1);
        assert_eq!(info.submit_count, 0);
        assert_eq!(info.buffers, 0);
    }

    #[test]
    fn missing_end_is_rejected() {
        let module = module_with(stream(&[Instruction::Submit]), vec![]);
        assert!(matches!(
            module.validate(),
            Err(ValidateError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn trailing_bytes_after_end_are_rejected() {
        let module = module_with(stream(&[Instruction::End, Instruction::Submit]), vec![]);
        assert!(matches!(
            module.validate(),
            Err(ValidateError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn forward_reference_is_rejected() {
        let module = module_with(
            stream(&[
                Instruction::BeginRenderPass {
                    color_tex: SURFACE_TEXTURE_ID,
                    load: LoadOp::Clear,
                    store: StoreOp::Store,
                    depth_tex: NO_DEPTH_ID,
                },
                Instruction::SetPipeline { id: 0 },
                Instruction::EndPass,
                Instruction::End,
            ]),
            vec![],
        );
        assert_eq!(
            module.validate(),
            Err(ValidateError::ForwardReference {
                kind: "render pipeline",
                id: 0,
                offset: 7,
            })
        );
    }

    #[test]
    fn data_reference_out_of_bounds_is_rejected() {
        let module = module_with(
            stream(&[
                Instruction::CreateShader { id: 0, code_off: 0, code_len: 64 },
                Instruction::End,
            ]),
            vec![0; 32],
        );
        assert_eq!(
            module.validate(),
            Err(ValidateError::OffsetOutOfBounds { section: "data", offset: 0 })
        );
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut bytecode = stream(&[Instruction::End]);
        bytecode.insert(0, 0x44);
        let module = module_with(bytecode, vec![]);
        assert_eq!(
            module.validate(),
            Err(ValidateError::UnknownOpcode { byte: 0x44, offset: 0 })
        );
    }

    #[test]
    fn counts_are_max_id_plus_one() {
        let module = module_with(
            stream(&[
                Instruction::CreateBuffer { id: 0, size: 16, usage: 0 },
                Instruction::CreateBuffer { id: 2, size: 16, usage: 0 },
                Instruction::Submit,
                Instruction::End,
            ]),
            vec![],
        );
        let info = module.validate().unwrap();
        assert_eq!(info.buffers, 3);
        assert_eq!(info.submit_count, 1);
    }

    #[test]
    fn bytecode_cap_is_inclusive() {
        // Exactly 1 MiB of submits followed by the end opcode still
        // validates; one more byte must not.
        const SUBMIT_BYTE: u8 = 0xF0;
        const END_BYTE: u8 = 0xFF;
        let mut bytecode = vec![SUBMIT_BYTE; MAX_BYTECODE_LEN - 1];
        bytecode.push(END_BYTE);
        let module = module_with(bytecode, vec![]);
        assert!(module.validate().is_ok());

        let mut over = vec![SUBMIT_BYTE; MAX_BYTECODE_LEN];
        over.push(END_BYTE);
        let module = module_with(over, vec![]);
        assert!(matches!(module.validate(), Err(ValidateError::BadHeader(_))));
    }

    #[test]
    fn string_table_lookup() {
        let module = module_with(stream(&[Instruction::End]), b"first\0second\0".to_vec());
        assert_eq!(module.string_at(0), Some("first"));
        assert_eq!(module.string_at(6), Some("second"));
        assert_eq!(module.string_at(40), None);
    }
}
