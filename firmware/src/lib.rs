//! Firmware container codec.
//!
//! A firmware file is a fixed header, an optional UTF-8 description and a
//! packed vector of instruction words:
//!
//! ```text
//! offset  size  field
//! 0       7     magic = ASCII "VMFW001"
//! 7       1     reserved (written as 0x00)
//! 8       4     version (u32 LE) = 1
//! 12      4     instruction_count (u32 LE)
//! 16      8     entry_point (u64 LE)
//! 24      8     creation_timestamp (u64 LE)
//! 32      4     description_size (u32 LE)
//! 36      4     reserved (u32 LE, 0)
//! 40      D     description bytes (no NUL terminator)
//! 40+D    8*N   instruction words (u64 LE each)
//! ```
//!
//! Words are encoded little-endian explicitly rather than by host-memory
//! copy, so images are portable across host endianness.

use edvm_types::types::Word;
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

/// Magic signature, without the trailing reserved byte.
pub const FIRMWARE_MAGIC: [u8; 7] = *b"VMFW001";

/// The only container version this codec understands.
pub const FIRMWARE_VERSION: u32 = 1;

/// Upper bound on the instruction count a loader accepts.
pub const MAX_INSTRUCTION_COUNT: u32 = 1_000_000;

/// Upper bound on the description size a loader accepts.
pub const MAX_DESCRIPTION_SIZE: u32 = 10_000;

/// Reasons a firmware image is rejected. Every variant other than `Io` is
/// an invalid-firmware condition; nothing is partially loaded on failure.
#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("IOError: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid firmware magic")]
    BadMagic,
    #[error("Unsupported firmware version: {0}")]
    UnsupportedVersion(u32),
    #[error("Instruction count out of range: {0}")]
    BadInstructionCount(u32),
    #[error("Description too large: {0} bytes")]
    DescriptionTooLarge(u32),
}

/// Decoded firmware header fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareHeader {
    pub version: u32,
    pub instruction_count: u32,
    pub entry_point: u64,
    pub created_at: u64,
    pub description_size: u32,
}

/// A loaded firmware image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Firmware {
    pub entry_point: u64,
    pub instructions: Vec<Word>,
}

/// Header metadata plus the description, read without the word stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub header: FirmwareHeader,
    pub description: String,
}

pub struct FirmwareCodec;

impl FirmwareCodec {
    /// Serializes `instructions` to `path` with the given description and
    /// entry point.
    pub fn save(
        path: &Path,
        instructions: &[Word],
        description: &str,
        entry_point: u64,
    ) -> Result<(), FirmwareError> {
        let count = u32::try_from(instructions.len())
            .map_err(|_| FirmwareError::BadInstructionCount(u32::MAX))?;
        if count == 0 || count > MAX_INSTRUCTION_COUNT {
            return Err(FirmwareError::BadInstructionCount(count));
        }
        let description_size = u32::try_from(description.len())
            .map_err(|_| FirmwareError::DescriptionTooLarge(u32::MAX))?;
        if description_size > MAX_DESCRIPTION_SIZE {
            return Err(FirmwareError::DescriptionTooLarge(description_size));
        }

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(&FIRMWARE_MAGIC)?;
        file.write_all(&[0u8])?;
        file.write_all(&FIRMWARE_VERSION.to_le_bytes())?;
        file.write_all(&count.to_le_bytes())?;
        file.write_all(&entry_point.to_le_bytes())?;
        file.write_all(&Self::unix_timestamp().to_le_bytes())?;
        file.write_all(&description_size.to_le_bytes())?;
        file.write_all(&0u32.to_le_bytes())?;
        file.write_all(description.as_bytes())?;
        for word in instructions {
            file.write_all(&word.to_le_bytes())?;
        }
        file.flush()?;
        tracing::info!("saved firmware: {count} instructions, entry {entry_point:#x}");
        Ok(())
    }

    /// Reads and validates a firmware image. The description is skipped;
    /// exactly `instruction_count` words are read.
    pub fn load(path: &Path) -> Result<Firmware, FirmwareError> {
        let mut file = BufReader::new(File::open(path)?);
        let header = Self::read_header(&mut file)?;

        let mut description = vec![0u8; header.description_size as usize];
        file.read_exact(&mut description)?;

        let mut instructions = Vec::with_capacity(header.instruction_count as usize);
        let mut buf = [0u8; 8];
        for _ in 0..header.instruction_count {
            file.read_exact(&mut buf)?;
            instructions.push(Word::from_le_bytes(buf));
        }
        tracing::info!(
            "loaded firmware: {} instructions, entry {:#x}",
            instructions.len(),
            header.entry_point
        );
        Ok(Firmware {
            entry_point: header.entry_point,
            instructions,
        })
    }

    /// Reads header metadata and the description without touching the word
    /// stream.
    pub fn info(path: &Path) -> Result<FirmwareInfo, FirmwareError> {
        let mut file = BufReader::new(File::open(path)?);
        let header = Self::read_header(&mut file)?;
        let mut description = vec![0u8; header.description_size as usize];
        file.read_exact(&mut description)?;
        Ok(FirmwareInfo {
            header,
            description: String::from_utf8_lossy(&description).into_owned(),
        })
    }

    fn read_header(reader: &mut impl Read) -> Result<FirmwareHeader, FirmwareError> {
        let mut magic = [0u8; 7];
        reader.read_exact(&mut magic)?;
        if magic != FIRMWARE_MAGIC {
            return Err(FirmwareError::BadMagic);
        }
        let mut reserved = [0u8; 1];
        reader.read_exact(&mut reserved)?;

        let version = read_u32(reader)?;
        if version != FIRMWARE_VERSION {
            return Err(FirmwareError::UnsupportedVersion(version));
        }
        let instruction_count = read_u32(reader)?;
        if instruction_count == 0 || instruction_count > MAX_INSTRUCTION_COUNT {
            return Err(FirmwareError::BadInstructionCount(instruction_count));
        }
        let entry_point = read_u64(reader)?;
        let created_at = read_u64(reader)?;
        let description_size = read_u32(reader)?;
        if description_size > MAX_DESCRIPTION_SIZE {
            return Err(FirmwareError::DescriptionTooLarge(description_size));
        }
        let _reserved = read_u32(reader)?;

        Ok(FirmwareHeader {
            version,
            instruction_count,
            entry_point,
            created_at,
            description_size,
        })
    }

    fn unix_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32, FirmwareError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64, FirmwareError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
