/// 64-bit machine words, including packed instruction words.
pub type Word = u64;

/// 64-bit register values.
pub type RegValue = u64;

/// Byte addresses into RAM.
pub type MemAddress = u64;

/// Register file indices.
pub type RegIndex = usize;
