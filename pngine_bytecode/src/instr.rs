//! Typed instructions over the opcode stream.
//!
//! [`Instruction`] is the decoded form of one opcode plus its operands.
//! The emitter encodes through it, `Module::validate` walks the stream
//! with it, and the dispatcher matches on it — so an operand layout can
//! only ever be defined once.

use crate::bytes::{Reader, Writer};
use crate::opcode::Opcode;
use crate::wire::{IndexFormat, LoadOp, StoreOp};
use thiserror::Error;

/// One decoded opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    CreateBuffer { id: u16, size: u32, usage: u8 },
    CreateTexture { id: u16, desc_off: u32, desc_len: u32 },
    CreateSampler { id: u16, desc_off: u32, desc_len: u32 },
    CreateShader { id: u16, code_off: u32, code_len: u32 },
    CreateRenderPipeline { id: u16, desc_off: u32, desc_len: u32 },
    CreateComputePipeline { id: u16, desc_off: u32, desc_len: u32 },
    CreateBindGroup { id: u16, layout: u16, entries_off: u32, entries_len: u32 },
    BeginRenderPass { color_tex: u16, load: LoadOp, store: StoreOp, depth_tex: u16 },
    BeginComputePass,
    SetPipeline { id: u16 },
    SetBindGroup { slot: u8, id: u16 },
    SetVertexBuffer { slot: u8, id: u16 },
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    EndPass,
    Dispatch { x: u32, y: u32, z: u32 },
    SetIndexBuffer { id: u16, format: IndexFormat },
    WriteBuffer { id: u16, offset: u32, data_off: u32, data_len: u32 },
    WriteTimeUniform { id: u16, offset: u32 },
    CopyBuffer { src: u16, src_off: u32, dst: u16, dst_off: u32, size: u32 },
    InitWasmModule { id: u16, data_off: u32, data_len: u32 },
    CallWasmFunc {
        module: u16,
        name_off: u32,
        name_len: u32,
        args_off: u32,
        args_len: u32,
        out_buf: u16,
        out_off: u32,
        out_len: u32,
    },
    Submit,
    End,
}

/// The stream could not be decoded at some offset.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode byte 0x{byte:02X} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },
    #[error("opcode stream truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("invalid operand byte 0x{byte:02X} for {what} at offset {offset}")]
    BadOperand {
        what: &'static str,
        byte: u8,
        offset: usize,
    },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::CreateBuffer { .. } => Opcode::CreateBuffer,
            Instruction::CreateTexture { .. } => Opcode::CreateTexture,
            Instruction::CreateSampler { .. } => Opcode::CreateSampler,
            Instruction::CreateShader { .. } => Opcode::CreateShader,
            Instruction::CreateRenderPipeline { .. } => Opcode::CreateRenderPipeline,
            Instruction::CreateComputePipeline { .. } => Opcode::CreateComputePipeline,
            Instruction::CreateBindGroup { .. } => Opcode::CreateBindGroup,
            Instruction::BeginRenderPass { .. } => Opcode::BeginRenderPass,
            Instruction::BeginComputePass => Opcode::BeginComputePass,
            Instruction::SetPipeline { .. } => Opcode::SetPipeline,
            Instruction::SetBindGroup { .. } => Opcode::SetBindGroup,
            Instruction::SetVertexBuffer { .. } => Opcode::SetVertexBuffer,
            Instruction::Draw { .. } => Opcode::Draw,
            Instruction::DrawIndexed { .. } => Opcode::DrawIndexed,
            Instruction::EndPass => Opcode::EndPass,
            Instruction::Dispatch { .. } => Opcode::Dispatch,
            Instruction::SetIndexBuffer { .. } => Opcode::SetIndexBuffer,
            Instruction::WriteBuffer { .. } => Opcode::WriteBuffer,
            Instruction::WriteTimeUniform { .. } => Opcode::WriteTimeUniform,
            Instruction::CopyBuffer { .. } => Opcode::CopyBuffer,
            Instruction::InitWasmModule { .. } => Opcode::InitWasmModule,
            Instruction::CallWasmFunc { .. } => Opcode::CallWasmFunc,
            Instruction::Submit => Opcode::Submit,
            Instruction::End => Opcode::End,
        }
    }

    /// Append the opcode byte and operands to `w`.
    pub fn encode(&self, w: &mut Writer) {
        w.u8(self.opcode() as u8);
        match *self {
            Instruction::CreateBuffer { id, size, usage } => {
                w.u16(id);
                w.u32(size);
                w.u8(usage);
            }
            Instruction::CreateTexture { id, desc_off, desc_len }
            | Instruction::CreateSampler { id, desc_off, desc_len }
            | Instruction::CreateRenderPipeline { id, desc_off, desc_len }
            | Instruction::CreateComputePipeline { id, desc_off, desc_len } => {
                w.u16(id);
                w.u32(desc_off);
                w.u32(desc_len);
            }
            Instruction::CreateShader { id, code_off, code_len } => {
                w.u16(id);
                w.u32(code_off);
                w.u32(code_len);
            }
            Instruction::CreateBindGroup { id, layout, entries_off, entries_len } => {
                w.u16(id);
                w.u16(layout);
                w.u32(entries_off);
                w.u32(entries_len);
            }
            Instruction::BeginRenderPass { color_tex, load, store, depth_tex } => {
                w.u16(color_tex);
                w.u8(load.to_wire());
                w.u8(store.to_wire());
                w.u16(depth_tex);
            }
            Instruction::BeginComputePass
            | Instruction::EndPass
            | Instruction::Submit
            | Instruction::End => {}
            Instruction::SetPipeline { id } => w.u16(id),
            Instruction::SetBindGroup { slot, id } | Instruction::SetVertexBuffer { slot, id } => {
                w.u8(slot);
                w.u16(id);
            }
            Instruction::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => {
                w.u32(vertex_count);
                w.u32(instance_count);
                w.u32(first_vertex);
                w.u32(first_instance);
            }
            Instruction::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            } => {
                w.u32(index_count);
                w.u32(instance_count);
                w.u32(first_index);
                w.i32(base_vertex);
                w.u32(first_instance);
            }
            Instruction::Dispatch { x, y, z } => {
                w.u32(x);
                w.u32(y);
                w.u32(z);
            }
            Instruction::SetIndexBuffer { id, format } => {
                w.u16(id);
                w.u8(format.to_wire());
            }
            Instruction::WriteBuffer { id, offset, data_off, data_len } => {
                w.u16(id);
                w.u32(offset);
                w.u32(data_off);
                w.u32(data_len);
            }
            Instruction::WriteTimeUniform { id, offset } => {
                w.u16(id);
                w.u32(offset);
            }
            Instruction::CopyBuffer { src, src_off, dst, dst_off, size } => {
                w.u16(src);
                w.u32(src_off);
                w.u16(dst);
                w.u32(dst_off);
                w.u32(size);
            }
            Instruction::InitWasmModule { id, data_off, data_len } => {
                w.u16(id);
                w.u32(data_off);
                w.u32(data_len);
            }
            Instruction::CallWasmFunc {
                module,
                name_off,
                name_len,
                args_off,
                args_len,
                out_buf,
                out_off,
                out_len,
            } => {
                w.u16(module);
                w.u32(name_off);
                w.u32(name_len);
                w.u32(args_off);
                w.u32(args_len);
                w.u16(out_buf);
                w.u32(out_off);
                w.u32(out_len);
            }
        }
    }

    /// Decode the instruction starting at `offset` in `stream`.
    ///
    /// Returns the instruction and the offset just past it.
    pub fn decode_at(stream: &[u8], offset: usize) -> Result<(Instruction, usize), DecodeError> {
        let byte = *stream
            .get(offset)
            .ok_or(DecodeError::Truncated { offset })?;
        let opcode = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { byte, offset })?;
        let operands = stream
            .get(offset + 1..offset + 1 + opcode.operand_len())
            .ok_or(DecodeError::Truncated { offset })?;
        let mut r = Reader::new(operands);
        // Widths were checked above, so the reads cannot fail.
        let next = |r: &mut Reader| r.u32().unwrap();
        let instr = match opcode {
            Opcode::CreateBuffer => Instruction::CreateBuffer {
                id: r.u16().unwrap(),
                size: next(&mut r),
                usage: r.u8().unwrap(),
            },
            Opcode::CreateTexture => Instruction::CreateTexture {
                id: r.u16().unwrap(),
                desc_off: next(&mut r),
                desc_len: next(&mut r),
            },
            Opcode::CreateSampler => Instruction::CreateSampler {
                id: r.u16().unwrap(),
                desc_off: next(&mut r),
                desc_len: next(&mut r),
            },
            Opcode::CreateShader => Instruction::CreateShader {
                id: r.u16().unwrap(),
                code_off: next(&mut r),
                code_len: next(&mut r),
            },
            Opcode::CreateRenderPipeline => Instruction::CreateRenderPipeline {
                id: r.u16().unwrap(),
                desc_off: next(&mut r),
                desc_len: next(&mut r),
            },
            Opcode::CreateComputePipeline => Instruction::CreateComputePipeline {
                id: r.u16().unwrap(),
                desc_off: next(&mut r),
                desc_len: next(&mut r),
            },
            Opcode::CreateBindGroup => Instruction::CreateBindGroup {
                id: r.u16().unwrap(),
                layout: r.u16().unwrap(),
                entries_off: next(&mut r),
                entries_len: next(&mut r),
            },
            Opcode::BeginRenderPass => {
                let color_tex = r.u16().unwrap();
                let load_byte = r.u8().unwrap();
                let load = LoadOp::from_wire(load_byte).ok_or(DecodeError::BadOperand {
                    what: "LoadOp",
                    byte: load_byte,
                    offset,
                })?;
                let store_byte = r.u8().unwrap();
                let store = StoreOp::from_wire(store_byte).ok_or(DecodeError::BadOperand {
                    what: "StoreOp",
                    byte: store_byte,
                    offset,
                })?;
                Instruction::BeginRenderPass {
                    color_tex,
                    load,
                    store,
                    depth_tex: r.u16().unwrap(),
                }
            }
            Opcode::BeginComputePass => Instruction::BeginComputePass,
            Opcode::SetPipeline => Instruction::SetPipeline { id: r.u16().unwrap() },
            Opcode::SetBindGroup => Instruction::SetBindGroup {
                slot: r.u8().unwrap(),
                id: r.u16().unwrap(),
            },
            Opcode::SetVertexBuffer => Instruction::SetVertexBuffer {
                slot: r.u8().unwrap(),
                id: r.u16().unwrap(),
            },
            Opcode::Draw => Instruction::Draw {
                vertex_count: next(&mut r),
                instance_count: next(&mut r),
                first_vertex: next(&mut r),
                first_instance: next(&mut r),
            },
            Opcode::DrawIndexed => Instruction::DrawIndexed {
                index_count: next(&mut r),
                instance_count: next(&mut r),
                first_index: next(&mut r),
                base_vertex: r.i32().unwrap(),
                first_instance: next(&mut r),
            },
            Opcode::EndPass => Instruction::EndPass,
            Opcode::Dispatch => Instruction::Dispatch {
                x: next(&mut r),
                y: next(&mut r),
                z: next(&mut r),
            },
            Opcode::SetIndexBuffer => {
                let id = r.u16().unwrap();
                let format_byte = r.u8().unwrap();
                let format =
                    IndexFormat::from_wire(format_byte).ok_or(DecodeError::BadOperand {
                        what: "IndexFormat",
                        byte: format_byte,
                        offset,
                    })?;
                Instruction::SetIndexBuffer { id, format }
            }
            Opcode::WriteBuffer => Instruction::WriteBuffer {
                id: r.u16().unwrap(),
                offset: next(&mut r),
                data_off: next(&mut r),
                data_len: next(&mut r),
            },
            Opcode::WriteTimeUniform => Instruction::WriteTimeUniform {
                id: r.u16().unwrap(),
                offset: next(&mut r),
            },
            Opcode::CopyBuffer => Instruction::CopyBuffer {
                src: r.u16().unwrap(),
                src_off: next(&mut r),
                dst: r.u16().unwrap(),
                dst_off: next(&mut r),
                size: next(&mut r),
            },
            Opcode::InitWasmModule => Instruction::InitWasmModule {
                id: r.u16().unwrap(),
                data_off: next(&mut r),
                data_len: next(&mut r),
            },
            Opcode::CallWasmFunc => Instruction::CallWasmFunc {
                module: r.u16().unwrap(),
                name_off: next(&mut r),
                name_len: next(&mut r),
                args_off: next(&mut r),
                args_len: next(&mut r),
                out_buf: r.u16().unwrap(),
                out_off: next(&mut r),
                out_len: next(&mut r),
            },
            Opcode::Submit => Instruction::Submit,
            Opcode::End => Instruction::End,
        };
        Ok((instr, offset + 1 + opcode.operand_len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let instructions = [
            Instruction::CreateBuffer { id: 0, size: 48, usage: 0x24 },
            Instruction::CreateShader { id: 0, code_off: 0, code_len: 120 },
            Instruction::CreateRenderPipeline { id: 0, desc_off: 120, desc_len: 30 },
            Instruction::BeginRenderPass {
                color_tex: crate::SURFACE_TEXTURE_ID,
                load: LoadOp::Clear,
                store: StoreOp::Store,
                depth_tex: crate::NO_DEPTH_ID,
            },
            Instruction::SetPipeline { id: 0 },
            Instruction::SetBindGroup { slot: 0, id: 1 },
            Instruction::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            },
            Instruction::DrawIndexed {
                index_count: 6,
                instance_count: 2,
                first_index: 0,
                base_vertex: -4,
                first_instance: 0,
            },
            Instruction::EndPass,
            Instruction::Dispatch { x: 8, y: 1, z: 1 },
            Instruction::SetIndexBuffer { id: 2, format: IndexFormat::Uint16 },
            Instruction::WriteBuffer { id: 1, offset: 0, data_off: 8, data_len: 64 },
            Instruction::WriteTimeUniform { id: 1, offset: 0 },
            Instruction::CopyBuffer { src: 0, src_off: 0, dst: 1, dst_off: 16, size: 32 },
            Instruction::InitWasmModule { id: 0, data_off: 0, data_len: 9 },
            Instruction::CallWasmFunc {
                module: 0,
                name_off: 9,
                name_len: 3,
                args_off: 12,
                args_len: 8,
                out_buf: 1,
                out_off: 0,
                out_len: 16,
            },
            Instruction::Submit,
            Instruction::End,
        ];
        let mut w = Writer::new();
        for instr in instructions.iter() {
            instr.encode(&mut w);
        }
        let stream = w.into_bytes();
        let mut pos = 0;
        for instr in instructions.iter() {
            let (decoded, next) = Instruction::decode_at(&stream, pos).unwrap();
            assert_eq!(&decoded, instr);
            assert_eq!(next - pos, 1 + instr.opcode().operand_len());
            pos = next;
        }
        assert_eq!(pos, stream.len());
    }

    #[test]
    fn truncated_operands_are_reported() {
        let mut w = Writer::new();
        Instruction::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
        .encode(&mut w);
        let bytes = w.into_bytes();
        let cut = &bytes[..bytes.len() - 1];
        assert_eq!(
            Instruction::decode_at(cut, 0),
            Err(DecodeError::Truncated { offset: 0 })
        );
    }

    #[test]
    fn unknown_opcode_is_reported_with_its_offset() {
        let mut w = Writer::new();
        Instruction::Submit.encode(&mut w);
        w.u8(0x7B);
        let bytes = w.into_bytes();
        let (_, next) = Instruction::decode_at(&bytes, 0).unwrap();
        assert_eq!(
            Instruction::decode_at(&bytes, next),
            Err(DecodeError::UnknownOpcode { byte: 0x7B, offset: 1 })
        );
    }
}
