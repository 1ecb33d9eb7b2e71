//! MIR-level integration tests: dispatch, offset mapping, branch
//! back-patching, external relocations, and debug-line streams.

use x64emit::{
    ArgInfo, ArgLoc, Data, DebugSink, DwarfSink, Emit, EmitError, ExternReloc, ExternRelocKind,
    Extra, Mir, ObjectSink, Ops, Plan9Sink, Register, RelocTarget, Tag,
};

fn emit_ok(mir: &Mir) -> Vec<u8> {
    let mut code = Vec::new();
    let mut debug = DebugSink::None;
    let mut relocs = Vec::new();
    Emit::new(
        mir,
        &mut code,
        &mut debug,
        ObjectSink::MachO { relocs: &mut relocs },
        &[],
    )
    .run()
    .expect("emission failed");
    code
}

fn emit_with_relocs(mir: &Mir) -> (Vec<u8>, Vec<ExternReloc>) {
    let mut code = Vec::new();
    let mut debug = DebugSink::None;
    let mut relocs = Vec::new();
    Emit::new(
        mir,
        &mut code,
        &mut debug,
        ObjectSink::MachO { relocs: &mut relocs },
        &[],
    )
    .run()
    .expect("emission failed");
    (code, relocs)
}

fn emit_err(mir: &Mir) -> EmitError {
    let mut code = Vec::new();
    let mut debug = DebugSink::None;
    let mut relocs = Vec::new();
    Emit::new(
        mir,
        &mut code,
        &mut debug,
        ObjectSink::MachO { relocs: &mut relocs },
        &[],
    )
    .run()
    .expect_err("emission unexpectedly succeeded")
}

fn read_i32(code: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(code[offset..offset + 4].try_into().unwrap())
}

// ─── Binary arithmetic dispatch ─────────────────────────────────────────────

#[test]
fn binary_reg_reg_and_reg_imm() {
    let mut mir = Mir::new();
    // add rax, rcx
    mir.push(
        Tag::Add,
        Ops::new(Some(Register::Rax), Some(Register::Rcx), 0b00),
        Data::None,
    );
    // cmp rbx, 0x7F
    mir.push(
        Tag::Cmp,
        Ops::new(Some(Register::Rbx), None, 0b00),
        Data::Imm(0x7F),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x48, 0x03, 0xC1, // add rax, rcx (RM)
            0x48, 0x81, 0xFB, 0x7F, 0x00, 0x00, 0x00, // cmp rbx, 0x7F (MI)
        ]
    );
}

#[test]
fn binary_memory_source_and_destination() {
    let mut mir = Mir::new();
    // mov rax, [rbp - 16]
    mir.push(
        Tag::Mov,
        Ops::new(Some(Register::Rax), Some(Register::Rbp), 0b01),
        Data::Imm(-16),
    );
    // mov [rbp - 24], rcx
    mir.push(
        Tag::Mov,
        Ops::new(Some(Register::Rbp), Some(Register::Rcx), 0b10),
        Data::Imm(-24),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x48, 0x8B, 0x45, 0xF0, // mov rax, [rbp-16]
            0x48, 0x89, 0x4D, 0xE8, // mov [rbp-24], rcx
        ]
    );
}

#[test]
fn binary_unused_flags_fail() {
    let mut mir = Mir::new();
    mir.push(
        Tag::Add,
        Ops::new(Some(Register::Rax), Some(Register::Rcx), 0b11),
        Data::None,
    );
    assert!(matches!(emit_err(&mir), EmitError::IselFail(_)));
}

#[test]
fn mem_imm_selects_pointer_size_from_flags() {
    let mut mir = Mir::new();
    let pair = mir.push_extra(Extra::ImmPair {
        dest_off: 0,
        operand: 0x10,
    });
    // mov qword ptr [r11], 0x10
    mir.push(
        Tag::MovMemImm,
        Ops::new(Some(Register::R11), None, 0b11),
        Data::Payload(pair),
    );
    let pair8 = mir.push_extra(Extra::ImmPair {
        dest_off: 4,
        operand: 0x7F,
    });
    // mov byte ptr [rax + 4], 0x7F
    mir.push(
        Tag::MovMemImm,
        Ops::new(Some(Register::Rax), None, 0b00),
        Data::Payload(pair8),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x49, 0xC7, 0x03, 0x10, 0x00, 0x00, 0x00, // mov qword [r11], 0x10
            0xC6, 0x40, 0x04, 0x7F, // mov byte [rax+4], 0x7F
        ]
    );
}

#[test]
fn scale_src_reads_through_rcx_index() {
    let mut mir = Mir::new();
    // mov rdx, [rbx + rcx*4 + 8]
    mir.push(
        Tag::MovScaleSrc,
        Ops::new(Some(Register::Rdx), Some(Register::Rbx), 0b10),
        Data::Imm(8),
    );
    let code = emit_ok(&mir);
    // 48 8B 54 8B 08: modrm mod=01 reg=rdx rm=SIB, sib scale=4 index=rcx base=rbx
    assert_eq!(code, [0x48, 0x8B, 0x54, 0x8B, 0x08]);
}

#[test]
fn scale_dst_writes_through_rax_index() {
    let mut mir = Mir::new();
    // mov [rbx + rax*2 + 4], rcx
    mir.push(
        Tag::MovScaleDst,
        Ops::new(Some(Register::Rbx), Some(Register::Rcx), 0b01),
        Data::Imm(4),
    );
    let code = emit_ok(&mir);
    assert_eq!(code, [0x48, 0x89, 0x4C, 0x43, 0x04]);
}

#[test]
fn scale_imm_writes_immediate() {
    let mut mir = Mir::new();
    let pair = mir.push_extra(Extra::ImmPair {
        dest_off: 16,
        operand: 0x42,
    });
    // mov qword ptr [rsi + rax*8 + 16], 0x42
    mir.push(
        Tag::MovScaleImm,
        Ops::new(Some(Register::Rsi), None, 0b11),
        Data::Payload(pair),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [0x48, 0xC7, 0x44, 0xC6, 0x10, 0x42, 0x00, 0x00, 0x00]
    );
}

// ─── movabs ─────────────────────────────────────────────────────────────────

#[test]
fn movabs_oi_imm64() {
    let mut mir = Mir::new();
    let imm = mir.push_extra(Extra::Imm64(0x1000000000000000));
    mir.push(
        Tag::Movabs,
        Ops::new(Some(Register::Rax), None, 0b00),
        Data::Payload(imm),
    );
    let code = emit_ok(&mir);
    assert_eq!(code, [0x48, 0xB8, 0, 0, 0, 0, 0, 0, 0, 0x10]);
}

#[test]
fn movabs_moffs_store_and_load() {
    let mut mir = Mir::new();
    let addr = mir.push_extra(Extra::Imm64(0xDEADBEEF));
    // moffs <- rax
    mir.push(Tag::Movabs, Ops::flags_only(0b01), Data::Payload(addr));
    // rax <- moffs
    mir.push(
        Tag::Movabs,
        Ops::new(Some(Register::Rax), None, 0b01),
        Data::Payload(addr),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x48, 0xA3, 0xEF, 0xBE, 0xAD, 0xDE, 0, 0, 0, 0, // mov [moffs], rax
            0x48, 0xA1, 0xEF, 0xBE, 0xAD, 0xDE, 0, 0, 0, 0, // mov rax, [moffs]
        ]
    );
}

#[test]
fn movabs_moffs_rejects_non_accumulator() {
    let mut mir = Mir::new();
    let addr = mir.push_extra(Extra::Imm64(0x1000));
    mir.push(
        Tag::Movabs,
        Ops::new(Some(Register::Rcx), None, 0b01),
        Data::Payload(addr),
    );
    assert_eq!(emit_err(&mir), EmitError::RaxOperandExpected);
}

// ─── lea ────────────────────────────────────────────────────────────────────

#[test]
fn lea_base_disp() {
    let mut mir = Mir::new();
    mir.push(
        Tag::Lea,
        Ops::new(Some(Register::Rax), Some(Register::Rbp), 0b00),
        Data::Imm(-8),
    );
    let code = emit_ok(&mir);
    assert_eq!(code, [0x48, 0x8D, 0x45, 0xF8]);
}

#[test]
fn lea_rip_imm64_backpatches_displacement() {
    let mut mir = Mir::new();
    let imm = mir.push_extra(Extra::Imm64(0x100));
    mir.push(
        Tag::Lea,
        Ops::new(Some(Register::Rax), None, 0b01),
        Data::Payload(imm),
    );
    let code = emit_ok(&mir);
    // lea rax, [rip + disp]: the placeholder is rewritten to
    // imm - instruction_length = 0x100 - 7 = 0xF9.
    assert_eq!(code, [0x48, 0x8D, 0x05, 0xF9, 0x00, 0x00, 0x00]);
}

#[test]
fn lea_got_pushes_extern_reloc() {
    let mut mir = Mir::new();
    mir.push(
        Tag::Lea,
        Ops::new(Some(Register::Rax), None, 0b10),
        Data::GotEntry(3),
    );
    let (code, relocs) = emit_with_relocs(&mir);
    assert_eq!(code, [0x48, 0x8D, 0x05, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(
        relocs,
        [ExternReloc {
            offset: 3,
            target: RelocTarget::Local(3),
            kind: ExternRelocKind::Got,
            pcrel: true,
            length: 2,
            addend: 0,
        }]
    );
}

// ─── push/pop ───────────────────────────────────────────────────────────────

#[test]
fn push_pop_forms() {
    let mut mir = Mir::new();
    mir.push(
        Tag::Push,
        Ops::new(Some(Register::Rbp), None, 0b00),
        Data::None,
    );
    mir.push(
        Tag::Push,
        Ops::new(Some(Register::Rsp), None, 0b01),
        Data::Imm(8),
    );
    mir.push(Tag::Push, Ops::flags_only(0b10), Data::Imm(0x42));
    mir.push(
        Tag::Pop,
        Ops::new(Some(Register::R15), None, 0b00),
        Data::None,
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x55, // push rbp
            0xFF, 0x74, 0x24, 0x08, // push qword [rsp+8]
            0x6A, 0x42, // push 0x42
            0x41, 0x5F, // pop r15
        ]
    );
}

#[test]
fn pop_imm_flags_unused() {
    let mut mir = Mir::new();
    mir.push(Tag::Pop, Ops::flags_only(0b10), Data::Imm(1));
    assert!(matches!(emit_err(&mir), EmitError::IselFail(_)));
}

#[test]
fn callee_preserved_mask_push_in_order_pop_reversed() {
    let mut mir = Mir::new();
    // rbx (bit 0), r12 (bit 1), r15 (bit 4)
    mir.push(
        Tag::PushRegsFromCalleePreservedRegs,
        Ops::flags_only(0),
        Data::RegMask(0b10011),
    );
    mir.push(
        Tag::PopRegsFromCalleePreservedRegs,
        Ops::flags_only(0),
        Data::RegMask(0b10011),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x53, // push rbx
            0x41, 0x54, // push r12
            0x41, 0x57, // push r15
            0x41, 0x5F, // pop r15
            0x41, 0x5C, // pop r12
            0x5B, // pop rbx
        ]
    );
}

// ─── jumps, calls, relocation back-patching ─────────────────────────────────

#[test]
fn forward_conditional_branch_backpatch() {
    let mut mir = Mir::new();
    // 0: cmp rax, rcx            (3 bytes @ 0)
    mir.push(
        Tag::Cmp,
        Ops::new(Some(Register::Rax), Some(Register::Rcx), 0b00),
        Data::None,
    );
    // 1: je -> inst 3            (6 bytes @ 3)
    mir.push(Tag::CondJmpEqNe, Ops::flags_only(0b01), Data::Inst(3));
    // 2: mov rax, 1              (7 bytes @ 9)
    mir.push(
        Tag::Mov,
        Ops::new(Some(Register::Rax), None, 0b00),
        Data::Imm(1),
    );
    // 3: ret                     (1 byte @ 16)
    mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);

    let code = emit_ok(&mir);
    assert_eq!(code.len(), 17);
    assert_eq!(&code[3..5], &[0x0F, 0x84]);
    // disp = target_offset - (source_offset + 6) = 16 - 9 = 7
    assert_eq!(read_i32(&code, 5), 7);
}

#[test]
fn backward_jump_negative_displacement() {
    let mut mir = Mir::new();
    // 0: nop                     (1 byte @ 0)
    mir.push(Tag::Nop, Ops::flags_only(0), Data::None);
    // 1: jmp -> inst 0           (5 bytes @ 1)
    mir.push(Tag::Jmp, Ops::flags_only(0b00), Data::Inst(0));
    let code = emit_ok(&mir);
    assert_eq!(code[1], 0xE9);
    // disp = 0 - (1 + 5) = -6
    assert_eq!(read_i32(&code, 2), -6);
}

#[test]
fn direct_call_targets_other_instruction() {
    let mut mir = Mir::new();
    // 0: call -> inst 2
    mir.push(Tag::Call, Ops::flags_only(0b00), Data::Inst(2));
    // 1: ret
    mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);
    // 2: ret
    mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);
    let code = emit_ok(&mir);
    assert_eq!(code[0], 0xE8);
    // disp = 6 - (0 + 5) = 1
    assert_eq!(read_i32(&code, 1), 1);
}

#[test]
fn missing_branch_target_fails() {
    let mut mir = Mir::new();
    mir.push(Tag::Jmp, Ops::flags_only(0b00), Data::Inst(7));
    assert!(matches!(emit_err(&mir), EmitError::IselFail(_)));
}

#[test]
fn indirect_jumps() {
    let mut mir = Mir::new();
    // jmp r11
    mir.push(
        Tag::Jmp,
        Ops::new(Some(Register::R11), None, 0b01),
        Data::None,
    );
    // jmp [0x1000]
    mir.push(Tag::Jmp, Ops::flags_only(0b01), Data::Imm(0x1000));
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x41, 0xFF, 0xE3, // jmp r11
            0xFF, 0x24, 0x25, 0x00, 0x10, 0x00, 0x00, // jmp qword [0x1000]
        ]
    );
}

#[test]
fn all_conditional_jump_variants() {
    let mut mir = Mir::new();
    for flags in 0..4 {
        mir.push(Tag::CondJmpGreaterLess, Ops::flags_only(flags), Data::Inst(10));
    }
    for flags in 0..4 {
        mir.push(Tag::CondJmpAboveBelow, Ops::flags_only(flags), Data::Inst(10));
    }
    for flags in 0..2 {
        mir.push(Tag::CondJmpEqNe, Ops::flags_only(flags), Data::Inst(10));
    }
    // All ten jumps land on the nop at MIR index 10.
    mir.push(Tag::Nop, Ops::flags_only(0), Data::None);
    mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);
    let err_free = emit_ok(&mir);
    // jge jg jl jle / jae ja jb jbe / jne je
    let expected_cc = [0x8D, 0x8F, 0x8C, 0x8E, 0x83, 0x87, 0x82, 0x86, 0x85, 0x84];
    for (i, cc) in expected_cc.into_iter().enumerate() {
        assert_eq!(err_free[i * 6], 0x0F);
        assert_eq!(err_free[i * 6 + 1], cc);
    }

    let mut bad = Mir::new();
    bad.push(Tag::CondJmpEqNe, Ops::flags_only(0b10), Data::Inst(0));
    assert!(matches!(emit_err(&bad), EmitError::IselFail(_)));
}

#[test]
fn set_byte_variants_coerce_to_byte_register() {
    let mut mir = Mir::new();
    // Producer hands over the 64-bit register; the emitter uses its byte form.
    mir.push(
        Tag::CondSetByteAboveBelow,
        Ops::new(Some(Register::R11), None, 0b01),
        Data::None,
    );
    mir.push(
        Tag::CondSetByteEqNe,
        Ops::new(Some(Register::Rax), None, 0b01),
        Data::None,
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x41, 0x0F, 0x97, 0xC3, // seta r11b
            0x0F, 0x94, 0xC0, // sete al
        ]
    );
}

// ─── test / ret ─────────────────────────────────────────────────────────────

#[test]
fn test_prefers_accumulator_encoding() {
    let mut mir = Mir::new();
    mir.push(
        Tag::Test,
        Ops::new(Some(Register::Rax), None, 0b00),
        Data::Imm(1),
    );
    mir.push(
        Tag::Test,
        Ops::new(Some(Register::Rcx), None, 0b00),
        Data::Imm(1),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x48, 0xA9, 0x01, 0x00, 0x00, 0x00, // test rax, 1 (I form)
            0x48, 0xF7, 0xC1, 0x01, 0x00, 0x00, 0x00, // test rcx, 1 (MI form)
        ]
    );
}

#[test]
fn ret_sub_forms() {
    let mut mir = Mir::new();
    mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);
    mir.push(Tag::Ret, Ops::flags_only(0b01), Data::Imm(16));
    mir.push(Tag::Ret, Ops::flags_only(0b10), Data::None);
    mir.push(Tag::Ret, Ops::flags_only(0b11), Data::Imm(16));
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0xC3, // ret
            0xC2, 0x10, 0x00, // ret 16
            0xCB, // retf
            0xCA, 0x10, 0x00, // retf 16
        ]
    );
}

// ─── extern calls and object formats ────────────────────────────────────────

#[test]
fn call_extern_pushes_branch_reloc() {
    let mut mir = Mir::new();
    mir.push(Tag::Nop, Ops::flags_only(0), Data::None);
    mir.push(Tag::CallExtern, Ops::flags_only(0), Data::ExternFn(7));
    let (code, relocs) = emit_with_relocs(&mir);
    assert_eq!(code, [0x90, 0xE8, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(
        relocs,
        [ExternReloc {
            offset: 2,
            target: RelocTarget::Global(7),
            kind: ExternRelocKind::Branch,
            pcrel: true,
            length: 2,
            addend: 0,
        }]
    );
}

#[test]
fn elf_output_rejects_extern_relocs() {
    let mut mir = Mir::new();
    mir.push(Tag::CallExtern, Ops::flags_only(0), Data::ExternFn(0));
    let mut code = Vec::new();
    let mut debug = DebugSink::None;
    let err = Emit::new(&mir, &mut code, &mut debug, ObjectSink::Elf, &[])
        .run()
        .expect_err("ELF extern relocs are unsupported");
    assert!(matches!(err, EmitError::IselFail(_)));
}

// ─── debug info ─────────────────────────────────────────────────────────────

#[test]
fn dwarf_line_program_stream() {
    let mut mir = Mir::new();
    let line1 = mir.push_extra(Extra::DbgLineColumn { line: 1, column: 1 });
    mir.push(Tag::DbgLine, Ops::flags_only(0), Data::Payload(line1));
    mir.push(Tag::DbgPrologueEnd, Ops::flags_only(0), Data::None);
    mir.push(Tag::Nop, Ops::flags_only(0), Data::None);
    let line3 = mir.push_extra(Extra::DbgLineColumn { line: 3, column: 5 });
    mir.push(Tag::DbgLine, Ops::flags_only(0), Data::Payload(line3));
    mir.push(Tag::DbgEpilogueBegin, Ops::flags_only(0), Data::None);
    mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);

    let mut code = Vec::new();
    let mut debug = DebugSink::Dwarf(DwarfSink::new());
    let mut relocs = Vec::new();
    Emit::new(
        &mir,
        &mut code,
        &mut debug,
        ObjectSink::MachO { relocs: &mut relocs },
        &[],
    )
    .run()
    .unwrap();
    assert_eq!(code, [0x90, 0xC3]);

    let DebugSink::Dwarf(dwarf) = &debug else {
        unreachable!()
    };
    assert_eq!(
        dwarf.line,
        [
            0x02, 0x00, // advance_pc 0
            0x03, 0x01, // advance_line +1
            0x01, // copy
            0x0A, // set_prologue_end
            0x02, 0x00, // advance_pc 0
            0x01, // copy
            0x02, 0x01, // advance_pc 1 (the nop)
            0x03, 0x02, // advance_line +2
            0x01, // copy
            0x0B, // set_epilogue_begin
            0x02, 0x00, // advance_pc 0
            0x01, // copy
        ]
    );
}

#[test]
fn plan9_line_stream() {
    let mut mir = Mir::new();
    let line1 = mir.push_extra(Extra::DbgLineColumn { line: 1, column: 1 });
    mir.push(Tag::DbgLine, Ops::flags_only(0), Data::Payload(line1));
    // 7 bytes of code between the line markers.
    mir.push(
        Tag::Mov,
        Ops::new(Some(Register::Rax), None, 0b00),
        Data::Imm(1),
    );
    let line2 = mir.push_extra(Extra::DbgLineColumn { line: 2, column: 1 });
    mir.push(Tag::DbgLine, Ops::flags_only(0), Data::Payload(line2));

    let mut code = Vec::new();
    let mut debug = DebugSink::Plan9(Plan9Sink::new(1));
    let mut relocs = Vec::new();
    Emit::new(
        &mir,
        &mut code,
        &mut debug,
        ObjectSink::MachO { relocs: &mut relocs },
        &[],
    )
    .run()
    .unwrap();

    let DebugSink::Plan9(plan9) = &debug else {
        unreachable!()
    };
    // delta_pc 7 with quantum 1: (7-1)/1 + 128 - 1 = 133.
    assert_eq!(plan9.line, [133]);
    assert_eq!(plan9.pcop_change_index(), Some(0));
    assert_eq!(plan9.line_counter(), 1);
}

#[test]
fn arg_dbg_info_resolves_argument_vector() {
    let mut mir = Mir::new();
    let arg0 = mir.push_extra(Extra::ArgDbgInfo {
        inst: 0,
        arg_index: 0,
    });
    mir.push(Tag::ArgDbgInfo, Ops::flags_only(0), Data::Payload(arg0));
    mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);

    let args = [ArgInfo {
        loc: ArgLoc::Register(Register::Rdi),
        ty: 9,
        name: String::from("count"),
    }];
    let mut code = Vec::new();
    let mut debug = DebugSink::Dwarf(DwarfSink::new());
    let mut relocs = Vec::new();
    Emit::new(
        &mir,
        &mut code,
        &mut debug,
        ObjectSink::MachO { relocs: &mut relocs },
        &args,
    )
    .run()
    .unwrap();

    let DebugSink::Dwarf(dwarf) = &debug else {
        unreachable!()
    };
    // abbrev 6, exprloc len 1, DW_OP_reg5 (rdi), type placeholder, "count\0"
    assert_eq!(
        dwarf.info,
        [6, 1, 0x55, 0, 0, 0, 0, b'c', b'o', b'u', b'n', b't', 0]
    );
    assert_eq!(dwarf.pending_type_relocs()[&9], [3]);
}

#[test]
fn arg_dbg_info_out_of_bounds_fails() {
    let mut mir = Mir::new();
    let arg = mir.push_extra(Extra::ArgDbgInfo {
        inst: 0,
        arg_index: 2,
    });
    mir.push(Tag::ArgDbgInfo, Ops::flags_only(0), Data::Payload(arg));
    assert!(matches!(emit_err(&mir), EmitError::IselFail(_)));
}

// ─── imul ───────────────────────────────────────────────────────────────────

#[test]
fn imul_complex_forms() {
    let mut mir = Mir::new();
    // imul rax, rcx
    mir.push(
        Tag::ImulComplex,
        Ops::new(Some(Register::Rax), Some(Register::Rcx), 0b00),
        Data::None,
    );
    // imul rax, [rbp - 8], 0x10
    let pair = mir.push_extra(Extra::ImmPair {
        dest_off: -8,
        operand: 0x10,
    });
    mir.push(
        Tag::ImulComplex,
        Ops::new(Some(Register::Rax), Some(Register::Rbp), 0b10),
        Data::Payload(pair),
    );
    let code = emit_ok(&mir);
    assert_eq!(
        code,
        [
            0x48, 0x0F, 0xAF, 0xC1, // imul rax, rcx
            0x48, 0x69, 0x45, 0xF8, 0x10, 0x00, 0x00, 0x00, // imul rax, [rbp-8], 0x10
        ]
    );
}

#[test]
fn imul_unimplemented_flags_fail() {
    let mut mir = Mir::new();
    mir.push(
        Tag::ImulComplex,
        Ops::new(Some(Register::Rax), Some(Register::Rcx), 0b01),
        Data::None,
    );
    assert!(matches!(emit_err(&mir), EmitError::IselFail(_)));
}

// ─── data-column mismatches ─────────────────────────────────────────────────

#[test]
fn wrong_data_variant_fails() {
    let mut mir = Mir::new();
    // jmp expects Data::Inst, not an immediate.
    mir.push(Tag::Jmp, Ops::flags_only(0b00), Data::Imm(0));
    assert!(matches!(emit_err(&mir), EmitError::IselFail(_)));

    let mut mir = Mir::new();
    // payload index out of bounds
    mir.push(Tag::DbgLine, Ops::flags_only(0), Data::Payload(42));
    assert!(matches!(emit_err(&mir), EmitError::IselFail(_)));
}
