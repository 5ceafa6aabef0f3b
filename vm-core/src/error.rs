use crate::state::memory::MemoryError;
use thiserror::Error;

/// VM core error codes.
#[derive(Debug, Error)]
pub enum VmCoreError {
    #[error("Illegal opcode: {0:#04x}")]
    IllegalOpcode(u8),
    #[error("Illegal addressing mode: {0:#x}")]
    IllegalAddressingMode(u8),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("MemoryError: {0}")]
    MemoryError(#[from] MemoryError),
}
