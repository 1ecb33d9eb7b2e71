//! # x64emit — x86-64 machine-code emission backend
//!
//! `x64emit` lowers a columnar machine IR into a flat buffer of x86-64
//! machine-code bytes, producing branch relocations, external (Mach-O)
//! relocations, and DWARF or Plan 9 debug-line streams along the way.
//!
//! ## Quick Start
//!
//! ```rust
//! use x64emit::{Data, DebugSink, Emit, Mir, ObjectSink, Ops, Register, Tag};
//!
//! let mut mir = Mir::new();
//! mir.push(
//!     Tag::Mov,
//!     Ops::new(Some(Register::Rax), None, 0b00),
//!     Data::Imm(0x10),
//! );
//! mir.push(Tag::Ret, Ops::flags_only(0b00), Data::None);
//!
//! let mut code = Vec::new();
//! let mut debug = DebugSink::None;
//! let mut relocs = Vec::new();
//! let object = ObjectSink::MachO { relocs: &mut relocs };
//! Emit::new(&mir, &mut code, &mut debug, object, &[]).run()?;
//!
//! assert_eq!(code, [0x48, 0xC7, 0xC0, 0x10, 0x00, 0x00, 0x00, 0xC3]);
//! # Ok::<(), x64emit::EmitError>(())
//! ```
//!
//! ## Design
//!
//! - **Encoder primitive** ([`encoder`]) — REX/ModR/M/SIB byte writer.
//! - **Opcode tables and form lowerers** ([`x64`]) — one lowerer per
//!   Intel operand-encoding form, each enforcing its size contracts.
//! - **MIR dispatcher** ([`emit`]) — walks the [`Mir`] table in program
//!   order, records a MIR-index→offset map, and back-patches branches.
//! - **Debug sinks** ([`debug`]) — DWARF line program, Plan 9 line
//!   table, or discard.
//!
//! The crate is `no_std` + `alloc` (the `std` feature, on by default,
//! only adds `std::error::Error` impls).  All fallible paths return
//! [`EmitError`]; library code never panics on malformed MIR.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
// ── Lint policy ──────────────────────────────────────────────────────────
// An instruction encoder performs many deliberate narrowing casts between
// integer widths (i32→u8, usize→u32, …) and uses dense hex literals
// without separators.  The lints below are expected in this domain.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::return_self_not_must_use
)]

extern crate alloc;

pub mod debug;
pub mod emit;
pub mod encoder;
pub mod error;
pub mod ir;
pub mod mir;
pub mod x64;

pub use debug::{ArgInfo, ArgLoc, DebugSink, DwarfSink, Plan9Sink};
pub use emit::{
    BranchReloc, Emit, ExternReloc, ExternRelocKind, ObjectSink, RelocTarget, CALLEE_PRESERVED,
};
pub use encoder::{Encoder, Rex};
pub use error::EmitError;
pub use ir::{EncodingForm, Memory, Mnemonic, PtrSize, RegOrMem, Register, ScaledIndex};
pub use mir::{BinaryKind, Data, Extra, InstIndex, Mir, Ops, Tag};
