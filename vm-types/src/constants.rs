//! Machine-level constants
use crate::types::MemAddress;

/// The number of general purpose registers.
pub const REGISTER_COUNT: usize = 16;

/// Instruction width in octets. The program counter advances by this much
/// on every fetch.
pub const INSTRUCTION_SIZE: MemAddress = 8;

/// Default RAM size in octets (16 MiB).
pub const DEFAULT_MEMORY_SIZE: usize = 16 * 1024 * 1024;

/// Distance from the top of RAM to the initial stack pointer.
pub const STACK_POINTER_OFFSET: MemAddress = 16;

/// Size of each default memory segment in octets (1 MiB).
pub const SEGMENT_SIZE: u64 = 0x10_0000;

/// Base address of the default CODE segment.
pub const CODE_SEGMENT_BASE: MemAddress = 0x00_0000;

/// Base address of the default DATA segment.
pub const DATA_SEGMENT_BASE: MemAddress = 0x10_0000;

/// Base address of the default HEAP segment.
pub const HEAP_SEGMENT_BASE: MemAddress = 0x20_0000;
