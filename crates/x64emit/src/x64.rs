//! x86-64 opcode tables and encoding-form lowerers.
//!
//! The opcode tables are exhaustive pattern matches over the closed
//! mnemonic set; a miss means the caller asked for an unsupported
//! `(mnemonic, form)` pair and is reported as a structural failure, not
//! silently encoded.  One lowerer per Intel-manual operand-encoding form
//! (ZO, I, D, O, M, MI, MR, RM, OI, FD, TD, RMI) validates that form's
//! operand-size contract and drives the [`Encoder`].
//!
//! ## Addressing-mode selection
//!
//! Memory operands follow a deterministic table:
//!
//! | base          | displacement | encoding                               |
//! |---------------|--------------|----------------------------------------|
//! | absent, rip   | any          | mod=00 rm=5, disp32                    |
//! | absent        | any          | mod=00 rm=4, SIB base=5, disp32        |
//! | rsp/r12       | 0            | mod=00 rm=4, SIB base-only             |
//! | rsp/r12       | fits i8      | mod=01, SIB, disp8                     |
//! | rsp/r12       | else         | mod=10, SIB, disp32                    |
//! | other         | 0            | mod=00                                 |
//! | other         | fits i8      | mod=01, disp8                          |
//! | other         | else         | mod=10, disp32                         |
//!
//! rbp/r13 with displacement 0 fall through to the disp8-with-zero row
//! because mod=00 rm=5 is reserved for RIP-relative addressing.

use alloc::vec::Vec;

use crate::encoder::{Encoder, Rex};
use crate::error::{isel_fail, EmitError};
use crate::ir::{EncodingForm, Memory, Mnemonic, PtrSize, RegOrMem, Register};

/// Maximum length of one x86-64 instruction.
const MAX_INSTRUCTION_LEN: usize = 15;

// ─── Opcode tables ──────────────────────────────────────────────────────────

/// Opcode bytes: one plain byte, or a `0x0F`-escaped second byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Single-byte opcode.
    One(u8),
    /// Two-byte opcode `0x0F xx`.
    Two(u8),
}

impl Opcode {
    fn emit(self, enc: &mut Encoder<'_>) {
        match self {
            Opcode::One(op) => enc.opcode_1byte(op),
            Opcode::Two(op) => enc.opcode_2byte(0x0F, op),
        }
    }
}

/// Opcode lookup for a `(mnemonic, form)` pair.
///
/// `is_byte` selects the byte-operand variant where one exists.  Returns
/// `None` for unsupported pairs — reaching a lowerer with such a pair is
/// a structural error.
pub fn opcode(mnemonic: Mnemonic, form: EncodingForm, is_byte: bool) -> Option<Opcode> {
    use EncodingForm::*;
    use Mnemonic::*;
    use Opcode::{One, Two};
    let opc = match (mnemonic, form) {
        (RetNear, Zo) => One(0xC3),
        (RetFar, Zo) => One(0xCB),
        (Brk, Zo) => One(0xCC),
        (Nop, Zo) => One(0x90),
        (Syscall, Zo) => Two(0x05),

        (RetNear, I) => One(0xC2),
        (RetFar, I) => One(0xCA),
        (Push, I) => One(if is_byte { 0x6A } else { 0x68 }),
        (Test, I) => One(if is_byte { 0xA8 } else { 0xA9 }),

        (JmpNear, D) => One(0xE9),
        (CallNear, D) => One(0xE8),

        (Push, O) => One(0x50),
        (Pop, O) => One(0x58),

        (JmpNear | CallNear | Push, M) => One(0xFF),
        (Pop, M) => One(0x8F),

        (Adc | Add | And | Cmp | Or | Sbb | Sub | Xor, Mi) => {
            One(if is_byte { 0x80 } else { 0x81 })
        }
        (Mov, Mi) => One(if is_byte { 0xC6 } else { 0xC7 }),
        (Test, Mi) => One(if is_byte { 0xF6 } else { 0xF7 }),

        (Adc, Mr) => One(if is_byte { 0x10 } else { 0x11 }),
        (Add, Mr) => One(if is_byte { 0x00 } else { 0x01 }),
        (Sub, Mr) => One(if is_byte { 0x28 } else { 0x29 }),
        (Xor, Mr) => One(if is_byte { 0x30 } else { 0x31 }),
        (And, Mr) => One(if is_byte { 0x20 } else { 0x21 }),
        (Or, Mr) => One(if is_byte { 0x08 } else { 0x09 }),
        (Sbb, Mr) => One(if is_byte { 0x18 } else { 0x19 }),
        (Cmp, Mr) => One(if is_byte { 0x38 } else { 0x39 }),
        (Mov, Mr) => One(if is_byte { 0x88 } else { 0x89 }),

        (Adc, Rm) => One(if is_byte { 0x12 } else { 0x13 }),
        (Add, Rm) => One(if is_byte { 0x02 } else { 0x03 }),
        (Sub, Rm) => One(if is_byte { 0x2A } else { 0x2B }),
        (Xor, Rm) => One(if is_byte { 0x32 } else { 0x33 }),
        (And, Rm) => One(if is_byte { 0x22 } else { 0x23 }),
        // The byte form is 0x0A (SDM); 0x0B is the dword/qword form.
        (Or, Rm) => One(if is_byte { 0x0A } else { 0x0B }),
        (Sbb, Rm) => One(if is_byte { 0x1A } else { 0x1B }),
        (Cmp, Rm) => One(if is_byte { 0x3A } else { 0x3B }),
        (Mov, Rm) => One(if is_byte { 0x8A } else { 0x8B }),
        (Lea, Rm) if !is_byte => One(0x8D),
        (Imul, Rm) if !is_byte => Two(0xAF),

        (Mov, Oi) => One(if is_byte { 0xB0 } else { 0xB8 }),
        (Mov, Fd) => One(if is_byte { 0xA0 } else { 0xA1 }),
        (Mov, Td) => One(if is_byte { 0xA2 } else { 0xA3 }),

        // is_byte selects the imm8 variant.
        (Imul, Rmi) => One(if is_byte { 0x6B } else { 0x69 }),

        (m, D) => match m.jmp_cond() {
            // Jcc rel32 is 0F 8x; the rel8 short form is 7x.
            Some(cc) => {
                if is_byte {
                    One(0x70 + cc)
                } else {
                    Two(0x80 + cc)
                }
            }
            None => return None,
        },
        (m, M) => match m.set_byte_cond() {
            Some(cc) => Two(0x90 + cc),
            None => return None,
        },

        _ => return None,
    };
    Some(opc)
}

/// ModR/M reg-field extension (`/digit`) for opcode-extended forms.
pub fn modrm_ext(mnemonic: Mnemonic) -> Option<u8> {
    use Mnemonic::*;
    let ext = match mnemonic {
        Add => 0,
        Or => 1,
        Adc => 2,
        Sbb => 3,
        And => 4,
        Sub => 5,
        Xor => 6,
        Cmp => 7,
        Mov => 0,
        Test => 0,
        JmpNear => 4,
        CallNear => 2,
        Push => 6,
        Pop => 0,
        m if m.is_set_byte() => 0,
        _ => return None,
    };
    Some(ext)
}

fn table_opcode(
    mnemonic: Mnemonic,
    form: EncodingForm,
    is_byte: bool,
) -> Result<Opcode, EmitError> {
    opcode(mnemonic, form, is_byte)
        .ok_or_else(|| isel_fail!("no opcode for {mnemonic} in encoding form {form}"))
}

fn table_ext(mnemonic: Mnemonic) -> Result<u8, EmitError> {
    modrm_ext(mnemonic).ok_or_else(|| isel_fail!("no ModR/M extension for {mnemonic}"))
}

// ─── Shared helpers ─────────────────────────────────────────────────────────

/// REX bits contributed by a memory operand (X from the SIB index, B from
/// the base), combined with the caller's W and R.
fn mem_rex(mem: &Memory, w: bool, r: bool) -> Rex {
    Rex {
        w,
        r,
        x: mem.sib.map_or(false, |si| si.index.is_extended()),
        b: mem.base.map_or(false, |base| base.is_extended()),
    }
}

/// Validate the structural memory-operand invariants: a present base or
/// index register must be 64-bit, and RSP cannot be an index.
fn check_mem(mnemonic: Mnemonic, mem: &Memory) -> Result<(), EmitError> {
    if let Some(base) = mem.base {
        if base.size() != 64 {
            return Err(EmitError::OperandSizeMismatch { mnemonic });
        }
    }
    if let Some(si) = mem.sib {
        if si.index.size() != 64 {
            return Err(EmitError::OperandSizeMismatch { mnemonic });
        }
        if si.index.low_id() == 4 && !si.index.is_extended() {
            return Err(isel_fail!("rsp cannot be a SIB index register"));
        }
        if si.scale > 0b11 {
            return Err(isel_fail!("SIB scale exponent {} out of range", si.scale));
        }
    }
    Ok(())
}

/// AH/CH/DH/BH cannot appear in an instruction that carries any REX
/// prefix; the prefix reinterprets their register codes as SPL/BPL/SIL/DIL.
fn check_high_byte(mnemonic: Mnemonic, regs: &[Register], rex: Rex, force: bool) -> Result<(), EmitError> {
    let has_high = regs.iter().any(|r| r.is_high_byte());
    if has_high && (rex.present() || force) {
        return Err(isel_fail!(
            "cannot encode {mnemonic}: high-byte register combined with a REX-requiring operand"
        ));
    }
    Ok(())
}

/// Emit a REX prefix, honoring the bare-REX requirement of the
/// SPL/BPL/SIL/DIL registers.
#[inline]
fn emit_rex(enc: &mut Encoder<'_>, rex: Rex, force: bool) {
    if force {
        enc.rex_always(rex);
    } else {
        enc.rex(rex);
    }
}

/// Emit ModR/M (+ SIB) and displacement for a memory operand, with
/// `reg_or_ext` in the ModR/M reg field.  Follows the module-level
/// addressing-mode table; assumes [`check_mem`] has passed.
fn encode_mem(enc: &mut Encoder<'_>, reg_or_ext: u8, mem: &Memory) {
    if mem.rip_relative {
        debug_assert!(mem.base.is_none() && mem.sib.is_none());
        enc.modrm_rip_disp32(reg_or_ext);
        enc.disp32(mem.disp);
        return;
    }

    let base = match mem.base {
        Some(base) => base,
        None => {
            // No base register: SIB escape with base=101 and a mandatory
            // disp32 (index=100 when there is no index either).
            let (scale, index) = match mem.sib {
                Some(si) => (si.scale, si.index.low_id()),
                None => (0, 0b100),
            };
            enc.modrm_sib_disp0(reg_or_ext);
            enc.sib_no_base(scale, index);
            enc.disp32(mem.disp);
            return;
        }
    };

    // rsp/r12 share the SIB escape code and always need a SIB byte.
    let need_sib = mem.sib.is_some() || base.low_id() == 4;
    let disp = mem.disp;

    if need_sib {
        let (scale, index) = match mem.sib {
            Some(si) => (si.scale, si.index.low_id()),
            None => (0, 0b100),
        };
        if disp == 0 && base.low_id() != 5 {
            enc.modrm_sib_disp0(reg_or_ext);
            enc.sib_disp0(scale, index, base.low_id());
        } else if let Ok(d8) = i8::try_from(disp) {
            enc.modrm_sib_disp8(reg_or_ext);
            enc.sib_disp8(scale, index, base.low_id());
            enc.disp8(d8);
        } else {
            enc.modrm_sib_disp32(reg_or_ext);
            enc.sib_disp32(scale, index, base.low_id());
            enc.disp32(disp);
        }
    } else if disp == 0 && base.low_id() != 5 {
        enc.modrm_indirect_disp0(reg_or_ext, base.low_id());
    } else if let Ok(d8) = i8::try_from(disp) {
        enc.modrm_indirect_disp8(reg_or_ext, base.low_id());
        enc.disp8(d8);
    } else {
        enc.modrm_indirect_disp32(reg_or_ext, base.low_id());
        enc.disp32(disp);
    }
}

/// Write an immediate of `bits` width (8/16/32), little-endian.
fn write_imm(enc: &mut Encoder<'_>, imm: i32, bits: u16) {
    match bits {
        8 => enc.imm8(imm as u8),
        16 => enc.imm16(imm as u16),
        _ => enc.imm32(imm as u32),
    }
}

// ─── Encoding-form lowerers ─────────────────────────────────────────────────

/// ZO: no operands.
pub fn lower_zo(code: &mut Vec<u8>, mnemonic: Mnemonic) -> Result<(), EmitError> {
    let opc = table_opcode(mnemonic, EncodingForm::Zo, false)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    opc.emit(&mut enc);
    Ok(())
}

/// I: `OP imm`.
///
/// `ret`/`retf` immediates are always 16-bit; otherwise the immediate is
/// written at its natural size (8/16/32) with a `0x66` prefix for the
/// 16-bit case.
pub fn lower_i(code: &mut Vec<u8>, mnemonic: Mnemonic, imm: i32) -> Result<(), EmitError> {
    let is_ret = matches!(mnemonic, Mnemonic::RetNear | Mnemonic::RetFar);
    let imm_bits: u16 = if is_ret {
        16
    } else if i8::try_from(imm).is_ok() {
        8
    } else if i16::try_from(imm).is_ok() {
        16
    } else {
        32
    };
    let opc = table_opcode(mnemonic, EncodingForm::I, imm_bits == 8)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    if imm_bits == 16 && !is_ret {
        enc.prefix_16bit();
    }
    opc.emit(&mut enc);
    write_imm(&mut enc, imm, imm_bits);
    Ok(())
}

/// D: `OP rel32`.
///
/// Emits a zero placeholder displacement; branch emitters register a
/// relocation and back-patch it once the target offset is known.
pub fn lower_d(code: &mut Vec<u8>, mnemonic: Mnemonic) -> Result<(), EmitError> {
    let opc = table_opcode(mnemonic, EncodingForm::D, false)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    opc.emit(&mut enc);
    enc.disp32(0);
    Ok(())
}

/// O: `OP reg`, register embedded in the opcode.
///
/// Only 16- and 64-bit registers are legal (the push/pop restriction in
/// 64-bit mode).
pub fn lower_o(code: &mut Vec<u8>, mnemonic: Mnemonic, reg: Register) -> Result<(), EmitError> {
    if !matches!(reg.size(), 16 | 64) {
        return Err(EmitError::OperandSizeMismatch { mnemonic });
    }
    let opc = table_opcode(mnemonic, EncodingForm::O, false)?;
    let base = match opc {
        Opcode::One(op) => op,
        Opcode::Two(_) => {
            return Err(isel_fail!("{mnemonic}: O form requires a one-byte opcode"))
        }
    };
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    if reg.size() == 16 {
        enc.prefix_16bit();
    }
    enc.rex(Rex {
        b: reg.is_extended(),
        ..Rex::default()
    });
    enc.opcode_with_reg(base, reg.low_id());
    Ok(())
}

/// M: `OP r/m`.
///
/// Register operands must be 16- or 64-bit, except the SETcc family which
/// requires 8-bit.  Memory operands must be word or qword.  W is never
/// set: every M-form mnemonic here defaults to 64-bit operand size.
pub fn lower_m(code: &mut Vec<u8>, mnemonic: Mnemonic, rm: &RegOrMem) -> Result<(), EmitError> {
    let ext = table_ext(mnemonic)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    match rm {
        RegOrMem::Reg(reg) => {
            if mnemonic.is_set_byte() {
                if reg.size() != 8 {
                    return Err(EmitError::OperandSizeMismatch { mnemonic });
                }
            } else if !matches!(reg.size(), 16 | 64) {
                return Err(EmitError::OperandSizeMismatch { mnemonic });
            }
            let opc = table_opcode(mnemonic, EncodingForm::M, reg.size() == 8)?;
            let rex = Rex {
                b: reg.is_extended(),
                ..Rex::default()
            };
            let force = reg.requires_rex_for_byte();
            check_high_byte(mnemonic, &[*reg], rex, force)?;
            if reg.size() == 16 {
                enc.prefix_16bit();
            }
            emit_rex(&mut enc, rex, force);
            opc.emit(&mut enc);
            enc.modrm_direct(ext, reg.low_id());
        }
        RegOrMem::Mem(mem) => {
            if !matches!(mem.ptr_size, PtrSize::Word | PtrSize::Qword) {
                return Err(EmitError::OperandSizeMismatch { mnemonic });
            }
            check_mem(mnemonic, mem)?;
            let opc = table_opcode(mnemonic, EncodingForm::M, false)?;
            if mem.ptr_size == PtrSize::Word {
                enc.prefix_16bit();
            }
            enc.rex(mem_rex(mem, false, false));
            opc.emit(&mut enc);
            encode_mem(&mut enc, ext, mem);
        }
    }
    Ok(())
}

/// MI: `OP r/m, imm`.
///
/// The immediate is written at the operand width, capped at 32 bits
/// (sign-extended for qword operands).  A `test` against the accumulator
/// is rewritten to the shorter I encoding.
pub fn lower_mi(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    rm: &RegOrMem,
    imm: i32,
) -> Result<(), EmitError> {
    // test al/ax/eax/rax, imm has a dedicated accumulator opcode.
    if mnemonic == Mnemonic::Test {
        if let RegOrMem::Reg(reg) = rm {
            if reg.low_id() == 0 && !reg.is_extended() && !reg.is_high_byte() {
                return lower_test_acc(code, *reg, imm);
            }
        }
    }

    let op_bits = rm.size();
    let ext = table_ext(mnemonic)?;
    let opc = table_opcode(mnemonic, EncodingForm::Mi, op_bits == 8)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    match rm {
        RegOrMem::Reg(reg) => {
            let rex = Rex {
                w: op_bits == 64,
                b: reg.is_extended(),
                ..Rex::default()
            };
            let force = reg.requires_rex_for_byte();
            check_high_byte(mnemonic, &[*reg], rex, force)?;
            if op_bits == 16 {
                enc.prefix_16bit();
            }
            emit_rex(&mut enc, rex, force);
            opc.emit(&mut enc);
            enc.modrm_direct(ext, reg.low_id());
        }
        RegOrMem::Mem(mem) => {
            check_mem(mnemonic, mem)?;
            if op_bits == 16 {
                enc.prefix_16bit();
            }
            enc.rex(mem_rex(mem, op_bits == 64, false));
            opc.emit(&mut enc);
            encode_mem(&mut enc, ext, mem);
        }
    }
    write_imm(&mut enc, imm, op_bits.min(32));
    Ok(())
}

/// The accumulator-only I encoding of `test` (`A8 ib` / `A9 iw/id`).
fn lower_test_acc(code: &mut Vec<u8>, reg: Register, imm: i32) -> Result<(), EmitError> {
    let op_bits = reg.size();
    let opc = table_opcode(Mnemonic::Test, EncodingForm::I, op_bits == 8)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    if op_bits == 16 {
        enc.prefix_16bit();
    }
    enc.rex(Rex {
        w: op_bits == 64,
        ..Rex::default()
    });
    opc.emit(&mut enc);
    write_imm(&mut enc, imm, op_bits.min(32));
    Ok(())
}

/// MR: `OP r/m, reg`.
pub fn lower_mr(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    rm: &RegOrMem,
    reg: Register,
) -> Result<(), EmitError> {
    lower_modrm_reg(code, mnemonic, EncodingForm::Mr, rm, reg)
}

/// RM: `OP reg, r/m`.
pub fn lower_rm(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    reg: Register,
    rm: &RegOrMem,
) -> Result<(), EmitError> {
    lower_modrm_reg(code, mnemonic, EncodingForm::Rm, rm, reg)
}

/// Shared body of the MR and RM forms: both put `reg` in the ModR/M reg
/// field and the r/m operand in the r/m field; only the opcode differs.
fn lower_modrm_reg(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    form: EncodingForm,
    rm: &RegOrMem,
    reg: Register,
) -> Result<(), EmitError> {
    if rm.size() != reg.size() {
        return Err(EmitError::OperandSizeMismatch { mnemonic });
    }
    let op_bits = reg.size();
    let opc = table_opcode(mnemonic, form, op_bits == 8)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    match rm {
        RegOrMem::Reg(rm_reg) => {
            let rex = Rex {
                w: op_bits == 64,
                r: reg.is_extended(),
                x: false,
                b: rm_reg.is_extended(),
            };
            let force = reg.requires_rex_for_byte() || rm_reg.requires_rex_for_byte();
            check_high_byte(mnemonic, &[reg, *rm_reg], rex, force)?;
            if op_bits == 16 {
                enc.prefix_16bit();
            }
            emit_rex(&mut enc, rex, force);
            opc.emit(&mut enc);
            enc.modrm_direct(reg.low_id(), rm_reg.low_id());
        }
        RegOrMem::Mem(mem) => {
            check_mem(mnemonic, mem)?;
            let rex = mem_rex(mem, op_bits == 64, reg.is_extended());
            let force = reg.requires_rex_for_byte();
            check_high_byte(mnemonic, &[reg], rex, force)?;
            if op_bits == 16 {
                enc.prefix_16bit();
            }
            emit_rex(&mut enc, rex, force);
            opc.emit(&mut enc);
            encode_mem(&mut enc, reg.low_id(), mem);
        }
    }
    Ok(())
}

/// OI: `OP reg, imm`, register embedded in the opcode.
///
/// The immediate width equals the register width; the 64-bit form writes
/// a full 8-byte immediate (`movabs`).
pub fn lower_oi(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    reg: Register,
    imm: u64,
) -> Result<(), EmitError> {
    let op_bits = reg.size();
    let opc = table_opcode(mnemonic, EncodingForm::Oi, op_bits == 8)?;
    let base = match opc {
        Opcode::One(op) => op,
        Opcode::Two(_) => {
            return Err(isel_fail!("{mnemonic}: OI form requires a one-byte opcode"))
        }
    };
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    let rex = Rex {
        w: op_bits == 64,
        b: reg.is_extended(),
        ..Rex::default()
    };
    let force = reg.requires_rex_for_byte();
    check_high_byte(mnemonic, &[reg], rex, force)?;
    if op_bits == 16 {
        enc.prefix_16bit();
    }
    emit_rex(&mut enc, rex, force);
    enc.opcode_with_reg(base, reg.low_id());
    match op_bits {
        8 => enc.imm8(imm as u8),
        16 => enc.imm16(imm as u16),
        32 => enc.imm32(imm as u32),
        _ => enc.imm64(imm),
    }
    Ok(())
}

/// FD: `OP rax, moffs` — load the accumulator from a memory offset.
pub fn lower_fd(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    reg: Register,
    moffs: u64,
) -> Result<(), EmitError> {
    lower_moffs(code, mnemonic, EncodingForm::Fd, reg, moffs)
}

/// TD: `OP moffs, rax` — store the accumulator to a memory offset.
pub fn lower_td(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    reg: Register,
    moffs: u64,
) -> Result<(), EmitError> {
    lower_moffs(code, mnemonic, EncodingForm::Td, reg, moffs)
}

fn lower_moffs(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    form: EncodingForm,
    reg: Register,
    moffs: u64,
) -> Result<(), EmitError> {
    if reg.low_id() != Register::Rax.low_id() || reg.is_extended() || reg.is_high_byte() {
        return Err(EmitError::RaxOperandExpected);
    }
    let op_bits = reg.size();
    let opc = table_opcode(mnemonic, form, op_bits == 8)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    if op_bits == 16 {
        enc.prefix_16bit();
    }
    enc.rex(Rex {
        w: op_bits == 64,
        ..Rex::default()
    });
    opc.emit(&mut enc);
    // The moffs width tracks the register width.
    match op_bits {
        8 => enc.imm8(moffs as u8),
        16 => enc.imm16(moffs as u16),
        32 => enc.imm32(moffs as u32),
        _ => enc.imm64(moffs),
    }
    Ok(())
}

/// RMI: `OP reg, r/m, imm` (three-operand `imul`).
///
/// Byte operands are disallowed; the immediate is written at the operand
/// width capped at 32 bits.
pub fn lower_rmi(
    code: &mut Vec<u8>,
    mnemonic: Mnemonic,
    reg: Register,
    rm: &RegOrMem,
    imm: i32,
) -> Result<(), EmitError> {
    if reg.size() < 16 {
        return Err(EmitError::OperandSizeMismatch { mnemonic });
    }
    if let RegOrMem::Mem(mem) = rm {
        if mem.ptr_size == PtrSize::Byte {
            return Err(EmitError::OperandSizeMismatch { mnemonic });
        }
    }
    if rm.size() != reg.size() {
        return Err(EmitError::OperandSizeMismatch { mnemonic });
    }
    let op_bits = reg.size();
    let opc = table_opcode(mnemonic, EncodingForm::Rmi, false)?;
    let mut enc = Encoder::new(code);
    enc.reserve(MAX_INSTRUCTION_LEN)?;
    match rm {
        RegOrMem::Reg(rm_reg) => {
            let rex = Rex {
                w: op_bits == 64,
                r: reg.is_extended(),
                x: false,
                b: rm_reg.is_extended(),
            };
            if op_bits == 16 {
                enc.prefix_16bit();
            }
            enc.rex(rex);
            opc.emit(&mut enc);
            enc.modrm_direct(reg.low_id(), rm_reg.low_id());
        }
        RegOrMem::Mem(mem) => {
            check_mem(mnemonic, mem)?;
            if op_bits == 16 {
                enc.prefix_16bit();
            }
            enc.rex(mem_rex(mem, op_bits == 64, reg.is_extended()));
            opc.emit(&mut enc);
            encode_mem(&mut enc, reg.low_id(), mem);
        }
    }
    write_imm(&mut enc, imm, op_bits.min(32));
    Ok(())
}
