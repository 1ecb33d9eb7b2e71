//! Operand model for x86-64 instruction lowering.
//!
//! These types describe the operands the encoding-form lowerers consume:
//! registers, pointer-size tags, memory operands, and the closed set of
//! supported mnemonics and Intel-manual encoding forms.

use core::fmt;

/// x86-64 general-purpose register.
///
/// Covers all 64/32/16-bit registers, the REX-addressable low bytes
/// (SPL/BPL/SIL/DIL), and the legacy high bytes (AH/CH/DH/BH).  Each
/// variant knows its own width (see [`Register::size`]) and 4-bit
/// encoding index (see [`Register::low_id`] / [`Register::is_extended`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Register {
    // -- 64-bit registers --
    /// RAX — 64-bit accumulator.
    Rax,
    /// RCX — 64-bit counter.
    Rcx,
    /// RDX — 64-bit data.
    Rdx,
    /// RBX — 64-bit base.
    Rbx,
    /// RSP — 64-bit stack pointer.
    Rsp,
    /// RBP — 64-bit frame pointer.
    Rbp,
    /// RSI — 64-bit source index.
    Rsi,
    /// RDI — 64-bit destination index.
    Rdi,
    /// Extended 64-bit register (requires REX.B/R/X).
    R8,
    /// Extended 64-bit register.
    R9,
    /// Extended 64-bit register.
    R10,
    /// Extended 64-bit register.
    R11,
    /// Extended 64-bit register.
    R12,
    /// Extended 64-bit register.
    R13,
    /// Extended 64-bit register.
    R14,
    /// Extended 64-bit register.
    R15,
    // -- 32-bit registers --
    /// EAX — 32-bit accumulator.
    Eax,
    /// ECX — 32-bit counter.
    Ecx,
    /// EDX — 32-bit data.
    Edx,
    /// EBX — 32-bit base.
    Ebx,
    /// ESP — 32-bit stack pointer.
    Esp,
    /// EBP — 32-bit frame pointer.
    Ebp,
    /// ESI — 32-bit source index.
    Esi,
    /// EDI — 32-bit destination index.
    Edi,
    /// Low 32 bits of an extended register.
    R8d,
    /// Low 32 bits of an extended register.
    R9d,
    /// Low 32 bits of an extended register.
    R10d,
    /// Low 32 bits of an extended register.
    R11d,
    /// Low 32 bits of an extended register.
    R12d,
    /// Low 32 bits of an extended register.
    R13d,
    /// Low 32 bits of an extended register.
    R14d,
    /// Low 32 bits of an extended register.
    R15d,
    // -- 16-bit registers --
    /// AX — 16-bit accumulator.
    Ax,
    /// CX — 16-bit counter.
    Cx,
    /// DX — 16-bit data.
    Dx,
    /// BX — 16-bit base.
    Bx,
    /// SP — 16-bit stack pointer.
    Sp,
    /// BP — 16-bit frame pointer.
    Bp,
    /// SI — 16-bit source index.
    Si,
    /// DI — 16-bit destination index.
    Di,
    /// Low 16 bits of an extended register.
    R8w,
    /// Low 16 bits of an extended register.
    R9w,
    /// Low 16 bits of an extended register.
    R10w,
    /// Low 16 bits of an extended register.
    R11w,
    /// Low 16 bits of an extended register.
    R12w,
    /// Low 16 bits of an extended register.
    R13w,
    /// Low 16 bits of an extended register.
    R14w,
    /// Low 16 bits of an extended register.
    R15w,
    // -- 8-bit registers (REX-addressable) --
    /// AL — low byte of RAX.
    Al,
    /// CL — low byte of RCX.
    Cl,
    /// DL — low byte of RDX.
    Dl,
    /// BL — low byte of RBX.
    Bl,
    /// SPL — low byte of RSP (requires a bare REX prefix).
    Spl,
    /// BPL — low byte of RBP (requires a bare REX prefix).
    Bpl,
    /// SIL — low byte of RSI (requires a bare REX prefix).
    Sil,
    /// DIL — low byte of RDI (requires a bare REX prefix).
    Dil,
    /// Low byte of an extended register.
    R8b,
    /// Low byte of an extended register.
    R9b,
    /// Low byte of an extended register.
    R10b,
    /// Low byte of an extended register.
    R11b,
    /// Low byte of an extended register.
    R12b,
    /// Low byte of an extended register.
    R13b,
    /// Low byte of an extended register.
    R14b,
    /// Low byte of an extended register.
    R15b,
    // -- 8-bit legacy high-byte registers (never combined with REX) --
    /// AH — bits 8..16 of RAX.
    Ah,
    /// CH — bits 8..16 of RCX.
    Ch,
    /// DH — bits 8..16 of RDX.
    Dh,
    /// BH — bits 8..16 of RBX.
    Bh,
}

impl Register {
    /// The 4-bit encoding index (0..=15).
    ///
    /// High-byte registers share ModR/M codes 4..=7 with SPL/BPL/SIL/DIL;
    /// the REX prefix (or its absence) disambiguates them.
    pub fn index(self) -> u8 {
        use Register::*;
        match self {
            Rax | Eax | Ax | Al => 0,
            Rcx | Ecx | Cx | Cl => 1,
            Rdx | Edx | Dx | Dl => 2,
            Rbx | Ebx | Bx | Bl => 3,
            Rsp | Esp | Sp | Spl | Ah => 4,
            Rbp | Ebp | Bp | Bpl | Ch => 5,
            Rsi | Esi | Si | Sil | Dh => 6,
            Rdi | Edi | Di | Dil | Bh => 7,
            R8 | R8d | R8w | R8b => 8,
            R9 | R9d | R9w | R9b => 9,
            R10 | R10d | R10w | R10b => 10,
            R11 | R11d | R11w | R11b => 11,
            R12 | R12d | R12w | R12b => 12,
            R13 | R13d | R13w | R13b => 13,
            R14 | R14d | R14w | R14b => 14,
            R15 | R15d | R15w | R15b => 15,
        }
    }

    /// The low 3 bits of the encoding index — the value that lands in
    /// ModR/M reg / r/m, SIB base/index, or an opcode-embedded register.
    #[inline]
    pub fn low_id(self) -> u8 {
        self.index() & 0b111
    }

    /// Whether this is an extended register (R8..R15 in any width),
    /// requiring REX.R, REX.B, or REX.X depending on position.
    #[inline]
    pub fn is_extended(self) -> bool {
        self.index() >= 8
    }

    /// Register width in bits (8, 16, 32, or 64).
    pub fn size(self) -> u16 {
        use Register::*;
        match self {
            Rax | Rcx | Rdx | Rbx | Rsp | Rbp | Rsi | Rdi | R8 | R9 | R10 | R11 | R12 | R13
            | R14 | R15 => 64,
            Eax | Ecx | Edx | Ebx | Esp | Ebp | Esi | Edi | R8d | R9d | R10d | R11d | R12d
            | R13d | R14d | R15d => 32,
            Ax | Cx | Dx | Bx | Sp | Bp | Si | Di | R8w | R9w | R10w | R11w | R12w | R13w
            | R14w | R15w => 16,
            Al | Cl | Dl | Bl | Spl | Bpl | Sil | Dil | R8b | R9b | R10b | R11b | R12b | R13b
            | R14b | R15b | Ah | Ch | Dh | Bh => 8,
        }
    }

    /// Whether this register needs a REX prefix to be addressable as a
    /// byte register even when REX.{W,R,X,B} are all clear.
    #[inline]
    pub fn requires_rex_for_byte(self) -> bool {
        use Register::*;
        matches!(self, Spl | Bpl | Sil | Dil)
    }

    /// Whether this is a legacy high-byte register (AH/CH/DH/BH).
    /// These cannot appear in any instruction that carries a REX prefix.
    #[inline]
    pub fn is_high_byte(self) -> bool {
        use Register::*;
        matches!(self, Ah | Ch | Dh | Bh)
    }

    const BY_INDEX_64: [Register; 16] = {
        use Register::*;
        [
            Rax, Rcx, Rdx, Rbx, Rsp, Rbp, Rsi, Rdi, R8, R9, R10, R11, R12, R13, R14, R15,
        ]
    };
    const BY_INDEX_32: [Register; 16] = {
        use Register::*;
        [
            Eax, Ecx, Edx, Ebx, Esp, Ebp, Esi, Edi, R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d,
        ]
    };
    const BY_INDEX_16: [Register; 16] = {
        use Register::*;
        [
            Ax, Cx, Dx, Bx, Sp, Bp, Si, Di, R8w, R9w, R10w, R11w, R12w, R13w, R14w, R15w,
        ]
    };
    const BY_INDEX_8: [Register; 16] = {
        use Register::*;
        [
            Al, Cl, Dl, Bl, Spl, Bpl, Sil, Dil, R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b,
        ]
    };

    /// The index of the architectural container register (0..=15).
    /// For high-byte registers this is the 64-bit register they alias
    /// (AH → RAX), not their ModR/M code.
    fn container_index(self) -> u8 {
        use Register::*;
        match self {
            Ah => 0,
            Ch => 1,
            Dh => 2,
            Bh => 3,
            _ => self.index(),
        }
    }

    /// Coerce to the 8-bit register with the same container.
    /// Never produces a high-byte register.
    pub fn to8(self) -> Register {
        Self::BY_INDEX_8[self.container_index() as usize]
    }

    /// Coerce to the 16-bit register with the same container.
    pub fn to16(self) -> Register {
        Self::BY_INDEX_16[self.container_index() as usize]
    }

    /// Coerce to the 32-bit register with the same container.
    pub fn to32(self) -> Register {
        Self::BY_INDEX_32[self.container_index() as usize]
    }

    /// Coerce to the 64-bit register with the same container.
    pub fn to64(self) -> Register {
        Self::BY_INDEX_64[self.container_index() as usize]
    }

    /// Coerce to the register of the given pointer size.
    pub fn to_size(self, size: PtrSize) -> Register {
        match size {
            PtrSize::Byte => self.to8(),
            PtrSize::Word => self.to16(),
            PtrSize::Dword => self.to32(),
            PtrSize::Qword => self.to64(),
        }
    }

    /// Stable 7-bit identifier used by the packed MIR operand field.
    ///
    /// 0..=15 are the 64-bit registers, 16..=31 the 32-bit, 32..=47 the
    /// 16-bit, 48..=63 the low bytes, 64..=67 the high bytes.
    pub fn id(self) -> u8 {
        use Register::*;
        match self {
            Ah => 64,
            Ch => 65,
            Dh => 66,
            Bh => 67,
            _ => {
                let class = match self.size() {
                    64 => 0,
                    32 => 1,
                    16 => 2,
                    _ => 3,
                };
                class * 16 + self.index()
            }
        }
    }

    /// Inverse of [`Register::id`].
    pub fn from_id(id: u8) -> Option<Register> {
        use Register::*;
        let reg = match id {
            0..=15 => Self::BY_INDEX_64[id as usize],
            16..=31 => Self::BY_INDEX_32[(id - 16) as usize],
            32..=47 => Self::BY_INDEX_16[(id - 32) as usize],
            48..=63 => Self::BY_INDEX_8[(id - 48) as usize],
            64 => Ah,
            65 => Ch,
            66 => Dh,
            67 => Bh,
            _ => return None,
        };
        Some(reg)
    }

    /// System V DWARF register number (for `DW_OP_reg<N>` expressions).
    /// The DWARF numbering swaps rcx/rdx and orders rsi/rdi/rbp/rsp
    /// differently from the hardware encoding.
    pub fn dwarf_number(self) -> u8 {
        match self.container_index() {
            0 => 0, // rax
            1 => 2, // rcx
            2 => 1, // rdx
            3 => 3, // rbx
            4 => 7, // rsp
            5 => 6, // rbp
            6 => 4, // rsi
            7 => 5, // rdi
            n => n, // r8..r15 map identically
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = alloc::format!("{self:?}").to_lowercase();
        f.write_str(&name)
    }
}

/// Pointer-size tag for memory operands (`byte ptr` .. `qword ptr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PtrSize {
    /// 8-bit (`byte ptr`).
    Byte,
    /// 16-bit (`word ptr`).
    Word,
    /// 32-bit (`dword ptr`).
    Dword,
    /// 64-bit (`qword ptr`).
    Qword,
}

impl PtrSize {
    /// Size in bits.
    pub fn bits(self) -> u16 {
        match self {
            PtrSize::Byte => 8,
            PtrSize::Word => 16,
            PtrSize::Dword => 32,
            PtrSize::Qword => 64,
        }
    }

    /// Build from a bit width (8/16/32/64).
    pub fn from_bits(bits: u16) -> Option<PtrSize> {
        match bits {
            8 => Some(PtrSize::Byte),
            16 => Some(PtrSize::Word),
            32 => Some(PtrSize::Dword),
            64 => Some(PtrSize::Qword),
            _ => None,
        }
    }

    /// Decode from a 2-bit MIR flag field (00=byte .. 11=qword).
    pub fn from_flags(flags: u8) -> PtrSize {
        match flags & 0b11 {
            0b00 => PtrSize::Byte,
            0b01 => PtrSize::Word,
            0b10 => PtrSize::Dword,
            _ => PtrSize::Qword,
        }
    }
}

impl fmt::Display for PtrSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PtrSize::Byte => write!(f, "byte"),
            PtrSize::Word => write!(f, "word"),
            PtrSize::Dword => write!(f, "dword"),
            PtrSize::Qword => write!(f, "qword"),
        }
    }
}

/// A scaled SIB index: `index * 2^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaledIndex {
    /// Scale exponent 0..=3 (factor 1, 2, 4, 8).
    pub scale: u8,
    /// Index register.  Must be 64-bit and must not be RSP.
    pub index: Register,
}

/// A memory operand.
///
/// Invariants: `rip_relative` excludes `base`; a present base register
/// must be 64-bit (32-bit addressing via the 0x67 prefix is not
/// supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Memory {
    /// Base register, if any.
    pub base: Option<Register>,
    /// RIP-relative addressing (`[rip + disp32]`).
    pub rip_relative: bool,
    /// Constant displacement.
    pub disp: i32,
    /// Operand width of the access.
    pub ptr_size: PtrSize,
    /// Optional scaled index (forces a SIB byte).
    pub sib: Option<ScaledIndex>,
}

impl Memory {
    /// `[base + disp]`
    pub fn base_disp(base: Register, disp: i32, ptr_size: PtrSize) -> Memory {
        Memory {
            base: Some(base),
            rip_relative: false,
            disp,
            ptr_size,
            sib: None,
        }
    }

    /// `[rip + disp32]`
    pub fn rip(disp: i32, ptr_size: PtrSize) -> Memory {
        Memory {
            base: None,
            rip_relative: true,
            disp,
            ptr_size,
            sib: None,
        }
    }

    /// `[base + index*2^scale + disp]`
    pub fn sib(base: Register, scale: u8, index: Register, disp: i32, ptr_size: PtrSize) -> Memory {
        Memory {
            base: Some(base),
            rip_relative: false,
            disp,
            ptr_size,
            sib: Some(ScaledIndex { scale, index }),
        }
    }

    /// `[disp32]` — absolute address, no base.
    pub fn disp_only(disp: i32, ptr_size: PtrSize) -> Memory {
        Memory {
            base: None,
            rip_relative: false,
            disp,
            ptr_size,
            sib: None,
        }
    }
}

/// A register or memory operand (the `r/m` side of an encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegOrMem {
    /// Direct register operand.
    Reg(Register),
    /// Memory operand.
    Mem(Memory),
}

impl RegOrMem {
    /// Operand width in bits.
    pub fn size(&self) -> u16 {
        match self {
            RegOrMem::Reg(reg) => reg.size(),
            RegOrMem::Mem(mem) => mem.ptr_size.bits(),
        }
    }
}

/// Supported mnemonics.
///
/// A closed enumeration: the opcode tables are exhaustive over this set,
/// and anything else arriving from MIR is a structural error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Mnemonic {
    Adc,
    Add,
    And,
    Cmp,
    Mov,
    Or,
    Sbb,
    Sub,
    Xor,
    Lea,
    Imul,
    Push,
    Pop,
    Test,
    Brk,
    Nop,
    Syscall,
    RetNear,
    RetFar,
    JmpNear,
    CallNear,
    // Conditional jumps, in Intel condition-code order (tttn = 0x0..0xF).
    Jo,
    Jno,
    Jb,
    Jae,
    Je,
    Jne,
    Jbe,
    Ja,
    Js,
    Jns,
    Jp,
    Jnp,
    Jl,
    Jge,
    Jle,
    Jg,
    // Conditional set-byte, same condition-code order.
    Seto,
    Setno,
    Setb,
    Setae,
    Sete,
    Setne,
    Setbe,
    Seta,
    Sets,
    Setns,
    Setp,
    Setnp,
    Setl,
    Setge,
    Setle,
    Setg,
}

impl Mnemonic {
    /// Whether this is a SETcc mnemonic.
    pub fn is_set_byte(self) -> bool {
        self.set_byte_cond().is_some()
    }

    /// Condition-code nibble for the Jcc family (`0F 8x` / `7x`).
    pub fn jmp_cond(self) -> Option<u8> {
        use Mnemonic::*;
        let cc = match self {
            Jo => 0x0,
            Jno => 0x1,
            Jb => 0x2,
            Jae => 0x3,
            Je => 0x4,
            Jne => 0x5,
            Jbe => 0x6,
            Ja => 0x7,
            Js => 0x8,
            Jns => 0x9,
            Jp => 0xA,
            Jnp => 0xB,
            Jl => 0xC,
            Jge => 0xD,
            Jle => 0xE,
            Jg => 0xF,
            _ => return None,
        };
        Some(cc)
    }

    /// Condition-code nibble for the SETcc family (`0F 9x`).
    pub fn set_byte_cond(self) -> Option<u8> {
        use Mnemonic::*;
        let cc = match self {
            Seto => 0x0,
            Setno => 0x1,
            Setb => 0x2,
            Setae => 0x3,
            Sete => 0x4,
            Setne => 0x5,
            Setbe => 0x6,
            Seta => 0x7,
            Sets => 0x8,
            Setns => 0x9,
            Setp => 0xA,
            Setnp => 0xB,
            Setl => 0xC,
            Setge => 0xD,
            Setle => 0xE,
            Setg => 0xF,
            _ => return None,
        };
        Some(cc)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mnemonic::RetNear => write!(f, "ret"),
            Mnemonic::RetFar => write!(f, "retf"),
            Mnemonic::JmpNear => write!(f, "jmp"),
            Mnemonic::CallNear => write!(f, "call"),
            Mnemonic::Brk => write!(f, "int3"),
            _ => {
                let name = alloc::format!("{self:?}").to_lowercase();
                f.write_str(&name)
            }
        }
    }
}

/// Intel-manual operand-encoding form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum EncodingForm {
    Zo,
    I,
    D,
    O,
    M,
    Mi,
    Mr,
    Rm,
    Oi,
    Fd,
    Td,
    Rmi,
}

impl fmt::Display for EncodingForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = alloc::format!("{self:?}").to_uppercase();
        f.write_str(&name)
    }
}
