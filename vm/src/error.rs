use edvm_core::error::VmCoreError;
use edvm_firmware::FirmwareError;
use edvm_types::types::MemAddress;
use thiserror::Error;

/// Errors surfaced by the VM facade.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("Cannot load an empty program")]
    EmptyProgram,
    #[error("Program of {required} bytes does not fit at base {base:#x} (memory size {memory_size})")]
    LoadTooLarge {
        base: MemAddress,
        required: u64,
        memory_size: u64,
    },
    #[error("Execution fault: {0}")]
    Execution(#[from] VmCoreError),
    #[error("Invalid firmware: {0}")]
    InvalidFirmware(#[from] FirmwareError),
}
