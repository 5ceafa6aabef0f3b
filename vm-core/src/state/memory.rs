use edvm_types::{
    constants::{CODE_SEGMENT_BASE, DATA_SEGMENT_BASE, HEAP_SEGMENT_BASE, SEGMENT_SIZE},
    types::{MemAddress, Word},
};
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory address out of range: {0:#x}")]
    BadAddress(MemAddress),
    #[error("Memory access violation ({kind}) at {address:#x}")]
    AccessViolation { address: MemAddress, kind: AccessKind },
}

/// Memory access kinds checked against segment permissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Segment permission mask over read/write/execute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions(u8);

impl Permissions {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(1 << 1);
    pub const EXECUTE: Self = Self(1 << 2);
    pub const RW: Self = Self(1 | 1 << 1);
    pub const RWX: Self = Self(1 | 1 << 1 | 1 << 2);

    pub fn allows(&self, kind: AccessKind) -> bool {
        let mask = match kind {
            AccessKind::Read => Self::READ.0,
            AccessKind::Write => Self::WRITE.0,
            AccessKind::Execute => Self::EXECUTE.0,
        };
        self.0 & mask != 0
    }
}

/// A named half-open byte range with a permission mask.
///
/// Segments may overlap; permission lookups walk the table in insertion
/// order and the first segment covering the address wins.
#[derive(Clone, Debug)]
pub struct MemorySegment {
    pub base: MemAddress,
    pub size: u64,
    pub permissions: Permissions,
    pub name: String,
}

impl MemorySegment {
    pub fn new(base: MemAddress, size: u64, permissions: Permissions, name: &str) -> Self {
        Self {
            base,
            size,
            permissions,
            name: name.to_string(),
        }
    }

    #[inline(always)]
    pub fn contains(&self, address: MemAddress) -> bool {
        address
            .checked_sub(self.base)
            .is_some_and(|offset| offset < self.size)
    }
}

/// Linear byte-addressable RAM plus the segment table.
///
/// Every access is bounds-checked against the RAM size and permission-checked
/// byte by byte against the segment table, so a multi-byte access crossing a
/// segment boundary faults at the first offending byte. Multi-byte values are
/// little-endian.
#[derive(Clone, Debug)]
pub struct Memory {
    data: Vec<u8>,
    segments: Vec<MemorySegment>,
}

impl Memory {
    /// Creates RAM of `size` octets with the default segment layout:
    /// CODE (rwx), DATA (rw), HEAP (rw) and a STACK window (rw) below the
    /// top of memory.
    pub fn new(size: usize) -> Self {
        let mut memory = Self {
            data: vec![0; size],
            segments: Vec::new(),
        };
        memory.add_segment(MemorySegment::new(
            CODE_SEGMENT_BASE,
            SEGMENT_SIZE,
            Permissions::RWX,
            "CODE",
        ));
        memory.add_segment(MemorySegment::new(
            DATA_SEGMENT_BASE,
            SEGMENT_SIZE,
            Permissions::RW,
            "DATA",
        ));
        memory.add_segment(MemorySegment::new(
            HEAP_SEGMENT_BASE,
            SEGMENT_SIZE,
            Permissions::RW,
            "HEAP",
        ));
        memory.add_segment(MemorySegment::new(
            (size as u64).saturating_sub(SEGMENT_SIZE),
            SEGMENT_SIZE,
            Permissions::RW,
            "STACK",
        ));
        memory
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Appends a segment to the table. Order matters: earlier segments win
    /// on overlap.
    pub fn add_segment(&mut self, segment: MemorySegment) {
        self.segments.push(segment);
    }

    pub fn segments(&self) -> &[MemorySegment] {
        &self.segments
    }

    /// Returns true iff some segment covers `address` and its mask includes
    /// `kind`. Bytes outside all declared segments are inaccessible.
    pub fn check_permission(&self, address: MemAddress, kind: AccessKind) -> bool {
        self.segments
            .iter()
            .find(|segment| segment.contains(address))
            .map(|segment| segment.permissions.allows(kind))
            .unwrap_or(false)
    }

    /// Validates bounds and permissions for every byte of `address..+width`
    /// before anything is read or written, reporting the first offending
    /// byte.
    fn check_range(&self, address: MemAddress, width: u64, kind: AccessKind) -> Result<(), MemoryError> {
        for offset in 0..width {
            let byte_address = address
                .checked_add(offset)
                .ok_or(MemoryError::BadAddress(address))?;
            if byte_address >= self.data.len() as u64 {
                return Err(MemoryError::BadAddress(byte_address));
            }
            if !self.check_permission(byte_address, kind) {
                return Err(MemoryError::AccessViolation {
                    address: byte_address,
                    kind,
                });
            }
        }
        Ok(())
    }

    pub fn read8(&self, address: MemAddress) -> Result<u8, MemoryError> {
        self.check_range(address, 1, AccessKind::Read)?;
        Ok(self.data[address as usize])
    }

    pub fn read16(&self, address: MemAddress) -> Result<u16, MemoryError> {
        self.check_range(address, 2, AccessKind::Read)?;
        let mut buf = [0u8; 2];
        buf.copy_from_slice(&self.data[address as usize..address as usize + 2]);
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read32(&self, address: MemAddress) -> Result<u32, MemoryError> {
        self.check_range(address, 4, AccessKind::Read)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[address as usize..address as usize + 4]);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read64(&self, address: MemAddress) -> Result<Word, MemoryError> {
        self.load64(address, AccessKind::Read)
    }

    /// Instruction fetch path. Identical to [`read64`](Self::read64) but
    /// checked as an EXECUTE access.
    pub fn fetch64(&self, address: MemAddress) -> Result<Word, MemoryError> {
        self.load64(address, AccessKind::Execute)
    }

    fn load64(&self, address: MemAddress, kind: AccessKind) -> Result<Word, MemoryError> {
        self.check_range(address, 8, kind)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[address as usize..address as usize + 8]);
        Ok(Word::from_le_bytes(buf))
    }

    pub fn write8(&mut self, address: MemAddress, value: u8) -> Result<(), MemoryError> {
        self.check_range(address, 1, AccessKind::Write)?;
        self.data[address as usize] = value;
        Ok(())
    }

    pub fn write16(&mut self, address: MemAddress, value: u16) -> Result<(), MemoryError> {
        self.check_range(address, 2, AccessKind::Write)?;
        self.data[address as usize..address as usize + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write32(&mut self, address: MemAddress, value: u32) -> Result<(), MemoryError> {
        self.check_range(address, 4, AccessKind::Write)?;
        self.data[address as usize..address as usize + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write64(&mut self, address: MemAddress, value: Word) -> Result<(), MemoryError> {
        self.check_range(address, 8, AccessKind::Write)?;
        self.data[address as usize..address as usize + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Zeroes the byte array. The segment table is untouched.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Renders `length` bytes starting at `start` as hex + ASCII rows.
    /// The span is truncated at the end of memory; this never fails.
    pub fn dump(&self, start: MemAddress, length: u64) -> String {
        let mut out = String::new();
        let end = start
            .saturating_add(length)
            .min(self.data.len() as u64);
        let mut row = start;
        while row < end {
            let row_end = (row + 16).min(end);
            let bytes = &self.data[row as usize..row_end as usize];
            let _ = write!(out, "{row:#010x}: ");
            for byte in bytes {
                let _ = write!(out, "{byte:02x} ");
            }
            for _ in bytes.len()..16 {
                out.push_str("   ");
            }
            out.push_str(" | ");
            for byte in bytes {
                let c = *byte as char;
                out.push(if c.is_ascii_graphic() || c == ' ' { c } else { '.' });
            }
            out.push('\n');
            row = row_end;
        }
        out
    }
}
