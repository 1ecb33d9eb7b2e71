#![no_main]
use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use x64emit::{Data, DebugSink, DwarfSink, Emit, Extra, Mir, ObjectSink, Ops, Plan9Sink, Register, Tag};

const TAGS: [Tag; 36] = [
    Tag::Adc,
    Tag::AdcMemImm,
    Tag::AdcScaleSrc,
    Tag::AdcScaleDst,
    Tag::AdcScaleImm,
    Tag::Add,
    Tag::Mov,
    Tag::MovMemImm,
    Tag::MovScaleSrc,
    Tag::MovScaleDst,
    Tag::MovScaleImm,
    Tag::Sub,
    Tag::Xor,
    Tag::Cmp,
    Tag::Or,
    Tag::And,
    Tag::Sbb,
    Tag::Movabs,
    Tag::Lea,
    Tag::ImulComplex,
    Tag::Push,
    Tag::Pop,
    Tag::PushRegsFromCalleePreservedRegs,
    Tag::PopRegsFromCalleePreservedRegs,
    Tag::Jmp,
    Tag::Call,
    Tag::CondJmpGreaterLess,
    Tag::CondJmpAboveBelow,
    Tag::CondJmpEqNe,
    Tag::CondSetByteGreaterLess,
    Tag::Test,
    Tag::Ret,
    Tag::Nop,
    Tag::Syscall,
    Tag::DbgLine,
    Tag::CallExtern,
];

fn arbitrary_reg(u: &mut Unstructured<'_>) -> Option<Register> {
    let id = u8::arbitrary(u).ok()?;
    if id & 0x80 != 0 {
        return None;
    }
    Register::from_id(id % 68)
}

fn arbitrary_data(u: &mut Unstructured<'_>, extra_count: u32) -> Data {
    match u8::arbitrary(u).unwrap_or(0) % 7 {
        0 => Data::None,
        1 => Data::Imm(i32::arbitrary(u).unwrap_or(0)),
        2 => Data::Inst(u32::arbitrary(u).unwrap_or(0) % 64),
        3 => Data::Payload(u32::arbitrary(u).unwrap_or(0) % extra_count.max(1)),
        4 => Data::ExternFn(u32::arbitrary(u).unwrap_or(0)),
        5 => Data::GotEntry(u32::arbitrary(u).unwrap_or(0)),
        _ => Data::RegMask(u64::arbitrary(u).unwrap_or(0)),
    }
}

fuzz_target!(|data: &[u8]| {
    // Build an arbitrary (frequently invalid) MIR table and run the
    // emitter — it must never panic, only return Ok/Err.
    let mut u = Unstructured::new(data);

    let mut mir = Mir::new();
    mir.push_extra(Extra::Imm64(u64::arbitrary(&mut u).unwrap_or(0)));
    mir.push_extra(Extra::ImmPair {
        dest_off: i32::arbitrary(&mut u).unwrap_or(0),
        operand: i32::arbitrary(&mut u).unwrap_or(0),
    });
    mir.push_extra(Extra::DbgLineColumn {
        line: u32::arbitrary(&mut u).unwrap_or(0) % 10_000,
        column: u32::arbitrary(&mut u).unwrap_or(0) % 1_000,
    });
    let extra_count = 3;

    for _ in 0..64 {
        if u.is_empty() {
            break;
        }
        let tag = TAGS[usize::from(u8::arbitrary(&mut u).unwrap_or(0)) % TAGS.len()];
        let reg1 = arbitrary_reg(&mut u);
        let reg2 = arbitrary_reg(&mut u);
        let flags = u8::arbitrary(&mut u).unwrap_or(0) % 4;
        let data = arbitrary_data(&mut u, extra_count);
        mir.push(tag, Ops::new(reg1, reg2, flags), data);
    }

    for use_dwarf in [true, false] {
        let mut code = Vec::new();
        let mut debug = if use_dwarf {
            DebugSink::Dwarf(DwarfSink::new())
        } else {
            DebugSink::Plan9(Plan9Sink::new(1))
        };
        let mut relocs = Vec::new();
        let object = ObjectSink::MachO {
            relocs: &mut relocs,
        };
        let _ = Emit::new(&mir, &mut code, &mut debug, object, &[]).run();
    }
});
