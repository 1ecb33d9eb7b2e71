//! MIR walk: instruction dispatch, offset mapping, relocation, and
//! debug-line emission.
//!
//! [`Emit`] owns the per-function bookkeeping — the MIR-index→offset
//! map, the pending branch-relocation list, and the debug-line state —
//! for exactly one lowering session.  The walk is a pure transducer:
//! instructions are visited in index order, each records its start
//! offset before any byte is written, and forward branches are patched
//! in one pass after the walk completes.

use alloc::vec;
use alloc::vec::Vec;

use crate::debug::{ArgInfo, DebugSink};
use crate::error::{isel_fail, EmitError};
use crate::ir::{Memory, Mnemonic, PtrSize, RegOrMem, Register};
use crate::mir::{BinaryKind, Data, Extra, InstIndex, Mir, Tag};
use crate::x64;

/// Callee-preserved registers of the System V AMD64 ABI, in push order.
/// Bit *i* of a [`Data::RegMask`] selects the *i*-th entry.
pub const CALLEE_PRESERVED: [Register; 5] = [
    Register::Rbx,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

/// A pending branch relocation against another MIR instruction.
///
/// After the walk, the patch site receives
/// `i32(offset_of(target) - (source + length))` little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BranchReloc {
    /// Code offset at which the branch instruction starts.
    pub source: u32,
    /// MIR index of the branch target.
    pub target: InstIndex,
    /// Code offset of the 4-byte displacement field.
    pub offset: u32,
    /// Encoded length of the branch instruction.
    pub length: u8,
}

/// Symbol side of an external relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelocTarget {
    /// Object-local target (a GOT entry index).
    Local(u32),
    /// Global target (an extern-function name index).
    Global(u32),
}

/// Mach-O relocation type of an external relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExternRelocKind {
    /// `X86_64_RELOC_BRANCH` — a rel32 call site.
    Branch,
    /// `X86_64_RELOC_GOT` — a RIP-relative GOT load.
    Got,
}

/// An external relocation pushed to the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternReloc {
    /// Code offset of the 4-byte rel32 field.
    pub offset: u32,
    /// Relocation target.
    pub target: RelocTarget,
    /// Relocation type.
    pub kind: ExternRelocKind,
    /// PC-relative.
    pub pcrel: bool,
    /// log2 of the field size (2 = 4 bytes).
    pub length: u8,
    /// Constant addend.
    pub addend: i64,
}

/// Destination for external relocations, selected by the output object
/// format.  Only Mach-O is supported; other formats fail at the first
/// site that needs a relocation.
#[derive(Debug)]
pub enum ObjectSink<'a> {
    /// Push Mach-O relocations into the linker-owned list.
    MachO {
        /// Linker-owned relocation list.
        relocs: &'a mut Vec<ExternReloc>,
    },
    /// ELF output (extern relocations unimplemented).
    Elf,
}

impl ObjectSink<'_> {
    fn push(&mut self, reloc: ExternReloc) -> Result<(), EmitError> {
        match self {
            ObjectSink::MachO { relocs } => {
                relocs.push(reloc);
                Ok(())
            }
            ObjectSink::Elf => Err(isel_fail!(
                "extern relocations are only implemented for Mach-O output"
            )),
        }
    }
}

/// One function-lowering session.
pub struct Emit<'a> {
    mir: &'a Mir,
    code: &'a mut Vec<u8>,
    debug: &'a mut DebugSink,
    object: ObjectSink<'a>,
    args: &'a [ArgInfo],
    offset_map: Vec<Option<u32>>,
    relocs: Vec<BranchReloc>,
    prev_line: u32,
    prev_column: u32,
    prev_pc: usize,
}

impl<'a> Emit<'a> {
    /// Start a session over `mir`, appending to `code`.
    ///
    /// `args` describes the function's parameters for `arg_dbg_info`
    /// records; `debug` and `object` receive the debug streams and
    /// external relocations.
    pub fn new(
        mir: &'a Mir,
        code: &'a mut Vec<u8>,
        debug: &'a mut DebugSink,
        object: ObjectSink<'a>,
        args: &'a [ArgInfo],
    ) -> Emit<'a> {
        let offset_map = vec![None; mir.len()];
        Emit {
            mir,
            code,
            debug,
            object,
            args,
            offset_map,
            relocs: Vec::new(),
            prev_line: 0,
            prev_column: 0,
            prev_pc: 0,
        }
    }

    /// Lower every MIR instruction in program order, then back-patch
    /// branch relocations.
    pub fn run(mut self) -> Result<(), EmitError> {
        log::debug!("emitting {} MIR instructions", self.mir.len());
        for inst in 0..self.mir.len() as InstIndex {
            self.record_offset(inst)?;
            self.lower_inst(inst)?;
        }
        self.apply_relocations()?;
        log::debug!(
            "emitted {} bytes, {} branch relocations resolved",
            self.code.len(),
            self.relocs.len()
        );
        Ok(())
    }

    // ─── Bookkeeping ────────────────────────────────────────────────────

    fn record_offset(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let slot = &mut self.offset_map[inst as usize];
        if slot.is_some() {
            return Err(isel_fail!("duplicate code offset for MIR index {inst}"));
        }
        *slot = Some(self.code.len() as u32);
        Ok(())
    }

    fn apply_relocations(&mut self) -> Result<(), EmitError> {
        for reloc in &self.relocs {
            let target_offset = self
                .offset_map
                .get(reloc.target as usize)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    isel_fail!("branch target MIR index {} has no code offset", reloc.target)
                })?;
            let disp = i64::from(target_offset)
                - (i64::from(reloc.source) + i64::from(reloc.length));
            let disp = i32::try_from(disp).map_err(|_| EmitError::Overflow)?;
            let patch = reloc.offset as usize;
            self.code[patch..patch + 4].copy_from_slice(&disp.to_le_bytes());
        }
        Ok(())
    }

    // ─── Column accessors ───────────────────────────────────────────────

    fn reg1(&self, inst: InstIndex) -> Result<Register, EmitError> {
        self.mir
            .ops(inst)
            .reg1()
            .ok_or_else(|| isel_fail!("{:?} requires a first register operand", self.mir.tag(inst)))
    }

    fn reg2(&self, inst: InstIndex) -> Result<Register, EmitError> {
        self.mir
            .ops(inst)
            .reg2()
            .ok_or_else(|| isel_fail!("{:?} requires a second register operand", self.mir.tag(inst)))
    }

    fn data_imm(&self, inst: InstIndex) -> Result<i32, EmitError> {
        match self.mir.data(inst) {
            Data::Imm(imm) => Ok(imm),
            other => Err(isel_fail!(
                "{:?} expects immediate data, found {other:?}",
                self.mir.tag(inst)
            )),
        }
    }

    fn data_inst(&self, inst: InstIndex) -> Result<InstIndex, EmitError> {
        match self.mir.data(inst) {
            Data::Inst(target) => Ok(target),
            other => Err(isel_fail!(
                "{:?} expects a branch target, found {other:?}",
                self.mir.tag(inst)
            )),
        }
    }

    fn data_extra(&self, inst: InstIndex) -> Result<Extra, EmitError> {
        match self.mir.data(inst) {
            Data::Payload(payload) => self
                .mir
                .extra(payload)
                .ok_or_else(|| isel_fail!("payload index {payload} out of bounds")),
            other => Err(isel_fail!(
                "{:?} expects an extra payload, found {other:?}",
                self.mir.tag(inst)
            )),
        }
    }

    fn extra_imm64(&self, inst: InstIndex) -> Result<u64, EmitError> {
        match self.data_extra(inst)? {
            Extra::Imm64(imm) => Ok(imm),
            other => Err(isel_fail!("expected Imm64 payload, found {other:?}")),
        }
    }

    fn extra_imm_pair(&self, inst: InstIndex) -> Result<(i32, i32), EmitError> {
        match self.data_extra(inst)? {
            Extra::ImmPair { dest_off, operand } => Ok((dest_off, operand)),
            other => Err(isel_fail!("expected ImmPair payload, found {other:?}")),
        }
    }

    fn ptr_size_of(&self, reg: Register) -> PtrSize {
        // Register widths are 8/16/32/64, always representable.
        PtrSize::from_bits(reg.size()).unwrap_or(PtrSize::Qword)
    }

    fn unused_flags(&self, inst: InstIndex) -> EmitError {
        isel_fail!(
            "unused operand flags 0b{:02b} for {:?}",
            self.mir.ops(inst).flags(),
            self.mir.tag(inst)
        )
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    fn lower_inst(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let tag = self.mir.tag(inst);
        log::trace!("lowering {tag:?} at MIR index {inst}");

        if let Some((mnemonic, kind)) = tag.binary_op() {
            return self.lower_binary(inst, mnemonic, kind);
        }

        match tag {
            Tag::Movabs => self.lower_movabs(inst),
            Tag::Lea => self.lower_lea(inst),
            Tag::ImulComplex => self.lower_imul_complex(inst),
            Tag::Push => self.lower_push_pop(inst, Mnemonic::Push),
            Tag::Pop => self.lower_push_pop(inst, Mnemonic::Pop),
            Tag::PushRegsFromCalleePreservedRegs => self.lower_push_regs(inst),
            Tag::PopRegsFromCalleePreservedRegs => self.lower_pop_regs(inst),
            Tag::Jmp => self.lower_jmp_call(inst, Mnemonic::JmpNear),
            Tag::Call => self.lower_jmp_call(inst, Mnemonic::CallNear),
            Tag::CondJmpGreaterLess => {
                let mnemonic = match self.mir.ops(inst).flags() {
                    0b00 => Mnemonic::Jge,
                    0b01 => Mnemonic::Jg,
                    0b10 => Mnemonic::Jl,
                    _ => Mnemonic::Jle,
                };
                self.lower_cond_jmp(inst, mnemonic)
            }
            Tag::CondJmpAboveBelow => {
                let mnemonic = match self.mir.ops(inst).flags() {
                    0b00 => Mnemonic::Jae,
                    0b01 => Mnemonic::Ja,
                    0b10 => Mnemonic::Jb,
                    _ => Mnemonic::Jbe,
                };
                self.lower_cond_jmp(inst, mnemonic)
            }
            Tag::CondJmpEqNe => {
                let mnemonic = match self.mir.ops(inst).flags() {
                    0b00 => Mnemonic::Jne,
                    0b01 => Mnemonic::Je,
                    _ => return Err(self.unused_flags(inst)),
                };
                self.lower_cond_jmp(inst, mnemonic)
            }
            Tag::CondSetByteGreaterLess => {
                let mnemonic = match self.mir.ops(inst).flags() {
                    0b00 => Mnemonic::Setge,
                    0b01 => Mnemonic::Setg,
                    0b10 => Mnemonic::Setl,
                    _ => Mnemonic::Setle,
                };
                self.lower_set_byte(inst, mnemonic)
            }
            Tag::CondSetByteAboveBelow => {
                let mnemonic = match self.mir.ops(inst).flags() {
                    0b00 => Mnemonic::Setae,
                    0b01 => Mnemonic::Seta,
                    0b10 => Mnemonic::Setb,
                    _ => Mnemonic::Setbe,
                };
                self.lower_set_byte(inst, mnemonic)
            }
            Tag::CondSetByteEqNe => {
                let mnemonic = match self.mir.ops(inst).flags() {
                    0b00 => Mnemonic::Setne,
                    0b01 => Mnemonic::Sete,
                    _ => return Err(self.unused_flags(inst)),
                };
                self.lower_set_byte(inst, mnemonic)
            }
            Tag::Test => self.lower_test(inst),
            Tag::Ret => self.lower_ret(inst),
            Tag::Brk => x64::lower_zo(self.code, Mnemonic::Brk),
            Tag::Nop => x64::lower_zo(self.code, Mnemonic::Nop),
            Tag::Syscall => x64::lower_zo(self.code, Mnemonic::Syscall),
            Tag::DbgLine => self.lower_dbg_line(inst),
            Tag::DbgPrologueEnd => {
                self.debug.prologue_end();
                self.dbg_advance(self.prev_line, self.prev_column);
                Ok(())
            }
            Tag::DbgEpilogueBegin => {
                self.debug.epilogue_begin();
                self.dbg_advance(self.prev_line, self.prev_column);
                Ok(())
            }
            Tag::ArgDbgInfo => self.lower_arg_dbg_info(inst),
            Tag::CallExtern => self.lower_call_extern(inst),
            // Binary-arithmetic tags were handled above.
            other => Err(isel_fail!("unhandled MIR tag {other:?}")),
        }
    }

    fn lower_binary(
        &mut self,
        inst: InstIndex,
        mnemonic: Mnemonic,
        kind: BinaryKind,
    ) -> Result<(), EmitError> {
        let ops = self.mir.ops(inst);
        match kind {
            BinaryKind::Plain => {
                let reg1 = self.reg1(inst)?;
                match ops.flags() {
                    0b00 => match ops.reg2() {
                        Some(reg2) => {
                            x64::lower_rm(self.code, mnemonic, reg1, &RegOrMem::Reg(reg2))
                        }
                        None => {
                            let imm = self.data_imm(inst)?;
                            x64::lower_mi(self.code, mnemonic, &RegOrMem::Reg(reg1), imm)
                        }
                    },
                    0b01 => {
                        // Memory source: reg1 <- [reg2 + disp].
                        let base = self.reg2(inst)?.to64();
                        let disp = self.data_imm(inst)?;
                        let mem = Memory::base_disp(base, disp, self.ptr_size_of(reg1));
                        x64::lower_rm(self.code, mnemonic, reg1, &RegOrMem::Mem(mem))
                    }
                    0b10 => {
                        // Memory destination: [reg1 + disp] <- reg2.
                        let reg2 = self.reg2(inst)?;
                        let disp = self.data_imm(inst)?;
                        let mem =
                            Memory::base_disp(reg1.to64(), disp, self.ptr_size_of(reg2));
                        x64::lower_mr(self.code, mnemonic, &RegOrMem::Mem(mem), reg2)
                    }
                    _ => Err(self.unused_flags(inst)),
                }
            }
            BinaryKind::MemImm => {
                let base = self.reg1(inst)?.to64();
                let ptr_size = PtrSize::from_flags(ops.flags());
                let (dest_off, operand) = self.extra_imm_pair(inst)?;
                let mem = Memory::base_disp(base, dest_off, ptr_size);
                x64::lower_mi(self.code, mnemonic, &RegOrMem::Mem(mem), operand)
            }
            BinaryKind::ScaleSrc => {
                // reg1 <- [reg2 + rcx*2^scale + disp]
                let reg1 = self.reg1(inst)?;
                let base = self.reg2(inst)?.to64();
                let disp = self.data_imm(inst)?;
                let mem = Memory::sib(
                    base,
                    ops.flags(),
                    Register::Rcx,
                    disp,
                    self.ptr_size_of(reg1),
                );
                x64::lower_rm(self.code, mnemonic, reg1, &RegOrMem::Mem(mem))
            }
            BinaryKind::ScaleDst => {
                // [reg1 + rax*2^scale + disp] <- reg2
                let base = self.reg1(inst)?.to64();
                let reg2 = self.reg2(inst)?;
                let disp = self.data_imm(inst)?;
                let mem = Memory::sib(
                    base,
                    ops.flags(),
                    Register::Rax,
                    disp,
                    self.ptr_size_of(reg2),
                );
                x64::lower_mr(self.code, mnemonic, &RegOrMem::Mem(mem), reg2)
            }
            BinaryKind::ScaleImm => {
                // [reg1 + rax*2^scale + dest_off] <- operand
                let base = self.reg1(inst)?.to64();
                let (dest_off, operand) = self.extra_imm_pair(inst)?;
                let mem = Memory::sib(
                    base,
                    ops.flags(),
                    Register::Rax,
                    dest_off,
                    PtrSize::Qword,
                );
                x64::lower_mi(self.code, mnemonic, &RegOrMem::Mem(mem), operand)
            }
        }
    }

    fn lower_movabs(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let ops = self.mir.ops(inst);
        if ops.flags() == 0b00 {
            let reg = self.reg1(inst)?;
            let imm = if reg.size() == 64 {
                self.extra_imm64(inst)?
            } else {
                self.data_imm(inst)? as u64
            };
            return x64::lower_oi(self.code, Mnemonic::Mov, reg, imm);
        }
        let moffs = self.extra_imm64(inst)?;
        match ops.reg1() {
            // moffs <- rax
            None => x64::lower_td(self.code, Mnemonic::Mov, Register::Rax, moffs),
            // accumulator <- moffs
            Some(reg) => x64::lower_fd(self.code, Mnemonic::Mov, reg, moffs),
        }
    }

    fn lower_lea(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let ops = self.mir.ops(inst);
        let reg = self.reg1(inst)?;
        let ptr_size = self.ptr_size_of(reg);
        match ops.flags() {
            0b00 => {
                let base = self.reg2(inst)?.to64();
                let disp = self.data_imm(inst)?;
                let mem = Memory::base_disp(base, disp, ptr_size);
                x64::lower_rm(self.code, Mnemonic::Lea, reg, &RegOrMem::Mem(mem))
            }
            0b01 => {
                // RIP-relative with a 64-bit byte-offset payload: emit
                // with displacement 0, then rewrite the trailing disp32
                // to `imm - instruction_length`.
                let imm = self.extra_imm64(inst)?;
                let start = self.code.len();
                let mem = Memory::rip(0, ptr_size);
                x64::lower_rm(self.code, Mnemonic::Lea, reg, &RegOrMem::Mem(mem))?;
                let end = self.code.len();
                let disp = (imm as i64) - (end - start) as i64;
                let disp = i32::try_from(disp).map_err(|_| EmitError::Overflow)?;
                self.code[end - 4..end].copy_from_slice(&disp.to_le_bytes());
                Ok(())
            }
            0b10 => {
                // RIP-relative placeholder resolved through the GOT.
                let got_entry = match self.mir.data(inst) {
                    Data::GotEntry(entry) => entry,
                    other => {
                        return Err(isel_fail!(
                            "lea GOT form expects a GOT entry, found {other:?}"
                        ))
                    }
                };
                let mem = Memory::rip(0, ptr_size);
                x64::lower_rm(self.code, Mnemonic::Lea, reg, &RegOrMem::Mem(mem))?;
                let reloc = ExternReloc {
                    offset: self.code.len() as u32 - 4,
                    target: RelocTarget::Local(got_entry),
                    kind: ExternRelocKind::Got,
                    pcrel: true,
                    length: 2,
                    addend: 0,
                };
                self.object.push(reloc)
            }
            _ => Err(self.unused_flags(inst)),
        }
    }

    fn lower_imul_complex(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let ops = self.mir.ops(inst);
        match ops.flags() {
            0b00 => {
                let reg1 = self.reg1(inst)?;
                let reg2 = self.reg2(inst)?;
                x64::lower_rm(self.code, Mnemonic::Imul, reg1, &RegOrMem::Reg(reg2))
            }
            0b10 => {
                let reg1 = self.reg1(inst)?;
                let base = self.reg2(inst)?.to64();
                let (dest_off, operand) = self.extra_imm_pair(inst)?;
                let mem = Memory::base_disp(base, dest_off, self.ptr_size_of(reg1));
                x64::lower_rmi(self.code, Mnemonic::Imul, reg1, &RegOrMem::Mem(mem), operand)
            }
            _ => Err(self.unused_flags(inst)),
        }
    }

    fn lower_push_pop(&mut self, inst: InstIndex, mnemonic: Mnemonic) -> Result<(), EmitError> {
        let ops = self.mir.ops(inst);
        match ops.flags() {
            0b00 => {
                let reg = self.reg1(inst)?;
                x64::lower_o(self.code, mnemonic, reg)
            }
            0b01 => {
                let base = self.reg1(inst)?.to64();
                let disp = self.data_imm(inst)?;
                let mem = Memory::base_disp(base, disp, PtrSize::Qword);
                x64::lower_m(self.code, mnemonic, &RegOrMem::Mem(mem))
            }
            0b10 if mnemonic == Mnemonic::Push => {
                let imm = self.data_imm(inst)?;
                x64::lower_i(self.code, mnemonic, imm)
            }
            _ => Err(self.unused_flags(inst)),
        }
    }

    fn reg_mask(&self, inst: InstIndex) -> Result<u64, EmitError> {
        match self.mir.data(inst) {
            Data::RegMask(mask) => Ok(mask),
            other => Err(isel_fail!(
                "{:?} expects a register mask, found {other:?}",
                self.mir.tag(inst)
            )),
        }
    }

    fn lower_push_regs(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let mask = self.reg_mask(inst)?;
        for (bit, reg) in CALLEE_PRESERVED.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                x64::lower_o(self.code, Mnemonic::Push, *reg)?;
            }
        }
        Ok(())
    }

    fn lower_pop_regs(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let mask = self.reg_mask(inst)?;
        for (bit, reg) in CALLEE_PRESERVED.iter().enumerate().rev() {
            if mask & (1 << bit) != 0 {
                x64::lower_o(self.code, Mnemonic::Pop, *reg)?;
            }
        }
        Ok(())
    }

    fn lower_jmp_call(&mut self, inst: InstIndex, mnemonic: Mnemonic) -> Result<(), EmitError> {
        let ops = self.mir.ops(inst);
        if ops.flags() & 0b01 == 0 {
            // Direct rel32 against another MIR instruction.
            let target = self.data_inst(inst)?;
            let source = self.code.len() as u32;
            x64::lower_d(self.code, mnemonic)?;
            self.relocs.push(BranchReloc {
                source,
                target,
                offset: self.code.len() as u32 - 4,
                length: (self.code.len() as u32 - source) as u8,
            });
            return Ok(());
        }
        match ops.reg1() {
            None => {
                // Indirect through an absolute address: jmp [imm].
                let disp = self.data_imm(inst)?;
                let mem = Memory::disp_only(disp, PtrSize::Qword);
                x64::lower_m(self.code, mnemonic, &RegOrMem::Mem(mem))
            }
            Some(reg) => x64::lower_m(self.code, mnemonic, &RegOrMem::Reg(reg)),
        }
    }

    fn lower_cond_jmp(&mut self, inst: InstIndex, mnemonic: Mnemonic) -> Result<(), EmitError> {
        let target = self.data_inst(inst)?;
        let source = self.code.len() as u32;
        x64::lower_d(self.code, mnemonic)?;
        // 0F 8x disp32.
        self.relocs.push(BranchReloc {
            source,
            target,
            offset: self.code.len() as u32 - 4,
            length: (self.code.len() as u32 - source) as u8,
        });
        Ok(())
    }

    fn lower_set_byte(&mut self, inst: InstIndex, mnemonic: Mnemonic) -> Result<(), EmitError> {
        let reg = self.reg1(inst)?.to8();
        x64::lower_m(self.code, mnemonic, &RegOrMem::Reg(reg))
    }

    fn lower_test(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let ops = self.mir.ops(inst);
        if ops.flags() != 0b00 || ops.reg2().is_some() {
            return Err(isel_fail!("unimplemented test operand combination"));
        }
        let reg = self.reg1(inst)?;
        let imm = self.data_imm(inst)?;
        x64::lower_mi(self.code, Mnemonic::Test, &RegOrMem::Reg(reg), imm)
    }

    fn lower_ret(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        match self.mir.ops(inst).flags() {
            0b00 => x64::lower_zo(self.code, Mnemonic::RetNear),
            0b01 => {
                let imm = self.data_imm(inst)?;
                x64::lower_i(self.code, Mnemonic::RetNear, imm)
            }
            0b10 => x64::lower_zo(self.code, Mnemonic::RetFar),
            _ => {
                let imm = self.data_imm(inst)?;
                x64::lower_i(self.code, Mnemonic::RetFar, imm)
            }
        }
    }

    fn lower_dbg_line(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        match self.data_extra(inst)? {
            Extra::DbgLineColumn { line, column } => {
                self.dbg_advance(line, column);
                Ok(())
            }
            other => Err(isel_fail!("expected DbgLineColumn payload, found {other:?}")),
        }
    }

    fn dbg_advance(&mut self, line: u32, column: u32) {
        let delta_line = i64::from(line) - i64::from(self.prev_line);
        let delta_pc = (self.code.len() - self.prev_pc) as u64;
        self.debug.advance(delta_line, delta_pc);
        self.prev_line = line;
        self.prev_column = column;
        self.prev_pc = self.code.len();
    }

    fn lower_arg_dbg_info(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        match self.data_extra(inst)? {
            Extra::ArgDbgInfo { arg_index, .. } => {
                let arg = self.args.get(arg_index as usize).ok_or_else(|| {
                    isel_fail!("arg_dbg_info index {arg_index} out of bounds")
                })?;
                self.debug.arg_info(arg);
                Ok(())
            }
            other => Err(isel_fail!("expected ArgDbgInfo payload, found {other:?}")),
        }
    }

    fn lower_call_extern(&mut self, inst: InstIndex) -> Result<(), EmitError> {
        let extern_fn = match self.mir.data(inst) {
            Data::ExternFn(index) => index,
            other => {
                return Err(isel_fail!(
                    "call_extern expects an extern-function index, found {other:?}"
                ))
            }
        };
        // call rel32 with a zero displacement; the linker resolves it.
        x64::lower_d(self.code, Mnemonic::CallNear)?;
        let reloc = ExternReloc {
            offset: self.code.len() as u32 - 4,
            target: RelocTarget::Global(extern_fn),
            kind: ExternRelocKind::Branch,
            pcrel: true,
            length: 2,
            addend: 0,
        };
        self.object.push(reloc)
    }
}
