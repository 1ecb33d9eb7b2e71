//! Error types for the emission session.

use alloc::string::String;
use core::fmt;

use crate::ir::Mnemonic;

/// Emission error.
///
/// Three categories share this enum:
///
/// - **Structural** ([`EmitError::IselFail`]): opcode-table miss, unused
///   operand-flag combination, unknown MIR tag, missing branch target,
///   unsupported object format.  These indicate a bug in the MIR producer
///   or in the opcode tables, carried as a formatted message.
/// - **Lowering** ([`EmitError::OperandSizeMismatch`],
///   [`EmitError::RaxOperandExpected`]): the operands handed to an
///   encoding-form lowerer violate its width contract.
/// - **Resource** ([`EmitError::OutOfMemory`], [`EmitError::Overflow`]):
///   code-buffer growth failure, or a branch displacement that does not
///   fit in 32 bits.
///
/// All errors abort the session; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// Instruction selection failed with a formatted diagnostic.
    IselFail(String),
    /// Operand widths do not match the selected encoding form.
    OperandSizeMismatch {
        /// The mnemonic being lowered when the mismatch was detected.
        mnemonic: Mnemonic,
    },
    /// The FD/TD moffs forms require the accumulator register.
    RaxOperandExpected,
    /// The code buffer could not grow.
    OutOfMemory,
    /// A branch displacement does not fit in a signed 32-bit field.
    Overflow,
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::IselFail(msg) => write!(f, "instruction selection failed: {msg}"),
            EmitError::OperandSizeMismatch { mnemonic } => {
                write!(f, "operand size mismatch for {mnemonic}")
            }
            EmitError::RaxOperandExpected => {
                write!(f, "moffs encoding requires the rax accumulator operand")
            }
            EmitError::OutOfMemory => write!(f, "out of memory growing the code buffer"),
            EmitError::Overflow => write!(f, "branch displacement overflows i32"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EmitError {}

/// Build an [`EmitError::IselFail`] from format arguments.
///
/// The session surfaces at most one of these: the first failure aborts
/// the walk via `?` propagation.
macro_rules! isel_fail {
    ($($arg:tt)*) => {
        $crate::error::EmitError::IselFail(alloc::format!($($arg)*))
    };
}

pub(crate) use isel_fail;
