pub mod config;
pub mod error;
pub mod vm;

pub use config::VmConfig;
pub use edvm_firmware::{Firmware, FirmwareCodec, FirmwareError, FirmwareInfo};
pub use error::VmError;
pub use vm::VirtualMachine;
