//! The opcode table.
//!
//! One byte of opcode, then a fixed little-endian operand layout per
//! opcode. The widths below are the single source of truth: the emitter
//! packs against them, `Module::validate` walks the stream with them, and
//! the dispatcher decodes with them. Adding an opcode means adding an enum
//! member here plus an emitter case and a dispatcher case — nothing else.

/// Every operation a payload can ask of the replay VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// `id:u16, size:u32, usage:u8`
    CreateBuffer = 0x01,
    /// `id:u16, desc_off:u32, desc_len:u32`
    CreateTexture = 0x02,
    /// `id:u16, desc_off:u32, desc_len:u32`
    CreateSampler = 0x03,
    /// `id:u16, code_off:u32, code_len:u32`
    CreateShader = 0x04,
    /// `id:u16, desc_off:u32, desc_len:u32`
    CreateRenderPipeline = 0x05,
    /// `id:u16, desc_off:u32, desc_len:u32`
    CreateComputePipeline = 0x06,
    /// `id:u16, layout:u16, entries_off:u32, entries_len:u32`
    CreateBindGroup = 0x07,
    /// `color_tex:u16, load:u8, store:u8, depth_tex:u16`
    BeginRenderPass = 0x10,
    BeginComputePass = 0x11,
    /// `id:u16`
    SetPipeline = 0x12,
    /// `slot:u8, id:u16`
    SetBindGroup = 0x13,
    /// `slot:u8, id:u16`
    SetVertexBuffer = 0x14,
    /// `vcount:u32, icount:u32, first_v:u32, first_i:u32`
    Draw = 0x15,
    /// `icount:u32, inst:u32, first:u32, base:i32, first_i:u32`
    DrawIndexed = 0x16,
    EndPass = 0x17,
    /// `x:u32, y:u32, z:u32`
    Dispatch = 0x18,
    /// `id:u16, format:u8`
    SetIndexBuffer = 0x19,
    /// `id:u16, offset:u32, data_off:u32, data_len:u32`
    WriteBuffer = 0x20,
    /// `id:u16, offset:u32`
    WriteTimeUniform = 0x21,
    /// `src:u16, src_off:u32, dst:u16, dst_off:u32, size:u32`
    CopyBuffer = 0x22,
    /// `id:u16, data_off:u32, data_len:u32`
    InitWasmModule = 0x30,
    /// `mod:u16, name_off:u32, name_len:u32, args_off:u32, args_len:u32,
    /// out_buf:u16, out_off:u32, out_len:u32`
    CallWasmFunc = 0x31,
    Submit = 0xF0,
    End = 0xFF,
}

impl Opcode {
    /// All opcodes, in stream-byte order.
    pub const ALL: [Opcode; 24] = [
        Opcode::CreateBuffer,
        Opcode::CreateTexture,
        Opcode::CreateSampler,
        Opcode::CreateShader,
        Opcode::CreateRenderPipeline,
        Opcode::CreateComputePipeline,
        Opcode::CreateBindGroup,
        Opcode::BeginRenderPass,
        Opcode::BeginComputePass,
        Opcode::SetPipeline,
        Opcode::SetBindGroup,
        Opcode::SetVertexBuffer,
        Opcode::Draw,
        Opcode::DrawIndexed,
        Opcode::EndPass,
        Opcode::Dispatch,
        Opcode::SetIndexBuffer,
        Opcode::WriteBuffer,
        Opcode::WriteTimeUniform,
        Opcode::CopyBuffer,
        Opcode::InitWasmModule,
        Opcode::CallWasmFunc,
        Opcode::Submit,
        Opcode::End,
    ];

    /// Decode a stream byte, if it names a known opcode.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        let op = match byte {
            0x01 => Opcode::CreateBuffer,
            0x02 => Opcode::CreateTexture,
            0x03 => Opcode::CreateSampler,
            0x04 => Opcode::CreateShader,
            0x05 => Opcode::CreateRenderPipeline,
            0x06 => Opcode::CreateComputePipeline,
            0x07 => Opcode::CreateBindGroup,
            0x10 => Opcode::BeginRenderPass,
            0x11 => Opcode::BeginComputePass,
            0x12 => Opcode::SetPipeline,
            0x13 => Opcode::SetBindGroup,
            0x14 => Opcode::SetVertexBuffer,
            0x15 => Opcode::Draw,
            0x16 => Opcode::DrawIndexed,
            0x17 => Opcode::EndPass,
            0x18 => Opcode::Dispatch,
            0x19 => Opcode::SetIndexBuffer,
            0x20 => Opcode::WriteBuffer,
            0x21 => Opcode::WriteTimeUniform,
            0x22 => Opcode::CopyBuffer,
            0x30 => Opcode::InitWasmModule,
            0x31 => Opcode::CallWasmFunc,
            0xF0 => Opcode::Submit,
            0xFF => Opcode::End,
            _ => return None,
        };
        Some(op)
    }

    /// The total byte width of this opcode's operands.
    pub const fn operand_len(self) -> usize {
        match self {
            Opcode::CreateBuffer => 2 + 4 + 1,
            Opcode::CreateTexture
            | Opcode::CreateSampler
            | Opcode::CreateShader
            | Opcode::CreateRenderPipeline
            | Opcode::CreateComputePipeline => 2 + 4 + 4,
            Opcode::CreateBindGroup => 2 + 2 + 4 + 4,
            Opcode::BeginRenderPass => 2 + 1 + 1 + 2,
            Opcode::BeginComputePass => 0,
            Opcode::SetPipeline => 2,
            Opcode::SetBindGroup | Opcode::SetVertexBuffer => 1 + 2,
            Opcode::Draw => 4 * 4,
            Opcode::DrawIndexed => 5 * 4,
            Opcode::EndPass => 0,
            Opcode::Dispatch => 3 * 4,
            Opcode::SetIndexBuffer => 2 + 1,
            Opcode::WriteBuffer => 2 + 4 + 4 + 4,
            Opcode::WriteTimeUniform => 2 + 4,
            Opcode::CopyBuffer => 2 + 4 + 2 + 4 + 4,
            Opcode::InitWasmModule => 2 + 4 + 4,
            Opcode::CallWasmFunc => 2 + 4 + 4 + 4 + 4 + 2 + 4 + 4,
            Opcode::Submit => 0,
            Opcode::End => 0,
        }
    }

    /// A short lower-case name for logs and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::CreateBuffer => "create_buffer",
            Opcode::CreateTexture => "create_texture",
            Opcode::CreateSampler => "create_sampler",
            Opcode::CreateShader => "create_shader",
            Opcode::CreateRenderPipeline => "create_render_pipeline",
            Opcode::CreateComputePipeline => "create_compute_pipeline",
            Opcode::CreateBindGroup => "create_bind_group",
            Opcode::BeginRenderPass => "begin_render_pass",
            Opcode::BeginComputePass => "begin_compute_pass",
            Opcode::SetPipeline => "set_pipeline",
            Opcode::SetBindGroup => "set_bind_group",
            Opcode::SetVertexBuffer => "set_vertex_buffer",
            Opcode::Draw => "draw",
            Opcode::DrawIndexed => "draw_indexed",
            Opcode::EndPass => "end_pass",
            Opcode::Dispatch => "dispatch",
            Opcode::SetIndexBuffer => "set_index_buffer",
            Opcode::WriteBuffer => "write_buffer",
            Opcode::WriteTimeUniform => "write_time_uniform",
            Opcode::CopyBuffer => "copy_buffer",
            Opcode::InitWasmModule => "init_wasm_module",
            Opcode::CallWasmFunc => "call_wasm_func",
            Opcode::Submit => "submit",
            Opcode::End => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip_for_every_opcode() {
        for &op in Opcode::ALL.iter() {
            assert_eq!(Opcode::from_byte(op as u8), Some(op));
        }
    }

    #[test]
    fn unknown_bytes_decode_to_none() {
        assert_eq!(Opcode::from_byte(0x00), None);
        assert_eq!(Opcode::from_byte(0x0F), None);
        assert_eq!(Opcode::from_byte(0x23), None);
        assert_eq!(Opcode::from_byte(0xF1), None);
    }

    #[test]
    fn operand_widths_match_the_format_table() {
        let expected = [
            (Opcode::CreateBuffer, 7),
            (Opcode::CreateTexture, 10),
            (Opcode::CreateSampler, 10),
            (Opcode::CreateShader, 10),
            (Opcode::CreateRenderPipeline, 10),
            (Opcode::CreateComputePipeline, 10),
            (Opcode::CreateBindGroup, 12),
            (Opcode::BeginRenderPass, 6),
            (Opcode::BeginComputePass, 0),
            (Opcode::SetPipeline, 2),
            (Opcode::SetBindGroup, 3),
            (Opcode::SetVertexBuffer, 3),
            (Opcode::Draw, 16),
            (Opcode::DrawIndexed, 20),
            (Opcode::EndPass, 0),
            (Opcode::Dispatch, 12),
            (Opcode::SetIndexBuffer, 3),
            (Opcode::WriteBuffer, 14),
            (Opcode::WriteTimeUniform, 6),
            (Opcode::CopyBuffer, 16),
            (Opcode::InitWasmModule, 10),
            (Opcode::CallWasmFunc, 28),
            (Opcode::Submit, 0),
            (Opcode::End, 0),
        ];
        for &(op, len) in expected.iter() {
            assert_eq!(op.operand_len(), len, "width of {}", op.name());
        }
    }
}
