//! Debug-line and debug-info sinks.
//!
//! The emitter drives one of three sinks: a DWARF line-program/DIE
//! writer, a Plan 9 quantum-encoded line table, or a discarding sink.
//! Each variant owns its output buffers; the emitter only hands over
//! line/PC deltas and parameter records.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::ir::Register;

// DWARF line-program standard opcodes (DWARF v4 §6.2.5.2).
const DW_LNS_COPY: u8 = 0x01;
const DW_LNS_ADVANCE_PC: u8 = 0x02;
const DW_LNS_ADVANCE_LINE: u8 = 0x03;
const DW_LNS_SET_PROLOGUE_END: u8 = 0x0A;
const DW_LNS_SET_EPILOGUE_BEGIN: u8 = 0x0B;

// DWARF expression opcodes.
const DW_OP_REG0: u8 = 0x50;
const DW_OP_BREG6: u8 = 0x76;

/// Abbreviation code of the formal-parameter DIE in the consumer's
/// abbreviation table.
const ABBREV_PARAMETER: u8 = 6;

/// Append a ULEB128-encoded value.
pub(crate) fn write_uleb128(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Append a signed LEB128-encoded value.
pub(crate) fn write_sleb128(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Machine location of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArgLoc {
    /// Argument lives in a register.
    Register(Register),
    /// Argument lives at a frame-pointer-relative stack slot.
    StackOffset(i32),
}

/// Caller-supplied description of one function argument.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArgInfo {
    /// Where the argument lives at function entry.
    pub loc: ArgLoc,
    /// Abstract type reference, resolved later by the debug-info
    /// consumer through the pending-type-relocation map.
    pub ty: u32,
    /// Parameter name.
    pub name: String,
}

/// DWARF debug output: a `.debug_line` program fragment and a
/// `.debug_info` DIE fragment.
#[derive(Debug, Default)]
pub struct DwarfSink {
    /// Line-program opcode stream.
    pub line: Vec<u8>,
    /// DIE byte stream for parameter entries.
    pub info: Vec<u8>,
    /// Offsets in `info` of 4-byte `DW_AT_type` placeholders, keyed by
    /// the abstract type reference that must be patched in.
    pending_type_relocs: BTreeMap<u32, Vec<u32>>,
}

impl DwarfSink {
    /// An empty sink.
    pub fn new() -> DwarfSink {
        DwarfSink::default()
    }

    /// Placeholder offsets awaiting type resolution, keyed by type
    /// reference.
    pub fn pending_type_relocs(&self) -> &BTreeMap<u32, Vec<u32>> {
        &self.pending_type_relocs
    }

    fn advance(&mut self, delta_line: i64, delta_pc: u64) {
        self.line.push(DW_LNS_ADVANCE_PC);
        write_uleb128(&mut self.line, delta_pc);
        if delta_line != 0 {
            self.line.push(DW_LNS_ADVANCE_LINE);
            write_sleb128(&mut self.line, delta_line);
        }
        self.line.push(DW_LNS_COPY);
    }

    fn arg_info(&mut self, arg: &ArgInfo) {
        write_uleb128(&mut self.info, u64::from(ABBREV_PARAMETER));
        // DW_AT_location: exprloc.
        match arg.loc {
            ArgLoc::Register(reg) => {
                write_uleb128(&mut self.info, 1);
                self.info.push(DW_OP_REG0 + reg.dwarf_number());
            }
            ArgLoc::StackOffset(off) => {
                let mut expr = Vec::new();
                expr.push(DW_OP_BREG6);
                write_sleb128(&mut expr, i64::from(off));
                write_uleb128(&mut self.info, expr.len() as u64);
                self.info.extend_from_slice(&expr);
            }
        }
        // DW_AT_type: 4-byte placeholder patched once the type DIE
        // offset is known.
        let placeholder = self.info.len() as u32;
        self.info.extend_from_slice(&[0, 0, 0, 0]);
        self.pending_type_relocs
            .entry(arg.ty)
            .or_default()
            .push(placeholder);
        // DW_AT_name: NUL-terminated string.
        self.info.extend_from_slice(arg.name.as_bytes());
        self.info.push(0);
    }
}

/// Plan 9 line table: one byte per PC advance, scaled by the
/// per-architecture instruction quantum.
#[derive(Debug)]
pub struct Plan9Sink {
    quantum: u8,
    /// Encoded line-table bytes.
    pub line: Vec<u8>,
    /// Index of the most recent PC-op byte in `line`.
    pcop_change_index: Option<u32>,
    /// Running source-line counter.
    line_counter: i64,
}

impl Plan9Sink {
    /// A sink for an architecture with the given instruction quantum
    /// (1 for x86-64).
    pub fn new(quantum: u8) -> Plan9Sink {
        debug_assert!(quantum > 0);
        Plan9Sink {
            quantum,
            line: Vec::new(),
            pcop_change_index: None,
            line_counter: 0,
        }
    }

    /// Index of the most recent PC-op byte, if one has been emitted.
    pub fn pcop_change_index(&self) -> Option<u32> {
        self.pcop_change_index
    }

    /// The running source-line counter.
    pub fn line_counter(&self) -> i64 {
        self.line_counter
    }

    fn advance(&mut self, delta_line: i64, delta_pc: u64) {
        let q = i64::from(self.quantum);
        let d_pc = delta_pc as i64 - q;
        if d_pc > 0 {
            self.line_counter += delta_line;
            // Quantum-scaled PC advance, biased into the 128.. opcode
            // range of the Plan 9 line table.
            self.line.push(((d_pc / q + 128) - q) as u8);
            self.pcop_change_index = Some(self.line.len() as u32 - 1);
        }
    }
}

/// Polymorphic debug sink.
#[derive(Debug)]
pub enum DebugSink {
    /// DWARF line program and DIE stream.
    Dwarf(DwarfSink),
    /// Plan 9 line table.
    Plan9(Plan9Sink),
    /// Discard all debug output.
    None,
}

impl DebugSink {
    /// Advance the line/PC state machine.
    pub fn advance(&mut self, delta_line: i64, delta_pc: u64) {
        match self {
            DebugSink::Dwarf(dwarf) => dwarf.advance(delta_line, delta_pc),
            DebugSink::Plan9(plan9) => plan9.advance(delta_line, delta_pc),
            DebugSink::None => {}
        }
    }

    /// Mark the end of the function prologue.
    pub fn prologue_end(&mut self) {
        if let DebugSink::Dwarf(dwarf) = self {
            dwarf.line.push(DW_LNS_SET_PROLOGUE_END);
        }
    }

    /// Mark the start of the function epilogue.
    pub fn epilogue_begin(&mut self) {
        if let DebugSink::Dwarf(dwarf) = self {
            dwarf.line.push(DW_LNS_SET_EPILOGUE_BEGIN);
        }
    }

    /// Record a parameter debug-info entry.
    pub fn arg_info(&mut self, arg: &ArgInfo) {
        if let DebugSink::Dwarf(dwarf) = self {
            dwarf.arg_info(arg);
        }
    }
}
