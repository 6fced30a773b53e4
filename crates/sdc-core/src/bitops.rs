use thiserror::Error;
use tracing::debug;

pub use sdconfig::{fits, mask};

/// Bit range of a field inside its parent register, counted from the least
/// significant bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub bit_offset: u32,
    pub bit_length: u32,
}

impl BitField {
    pub const fn new(bit_offset: u32, bit_length: u32) -> Self {
        Self {
            bit_offset,
            bit_length,
        }
    }
}

/// Errors produced by bitfield extraction and insertion helpers.
#[derive(Debug, Error)]
pub enum BitOpsError {
    /// Register wider than the supported 64-bit limit.
    #[error("unsupported register width {bits} bits for bitfield operation")]
    UnsupportedWidth { bits: u32 },
    /// Bitfield length outside the supported range.
    #[error("unsupported bitfield length {bit_length} bits")]
    UnsupportedLength { bit_length: u32 },
    /// Bitfield configuration exceeds the register width.
    #[error(
        "bitfield (offset {bit_offset}, length {bit_length}) exceeds register width {register_bits} bits"
    )]
    OutOfRange {
        register_bits: u32,
        bit_offset: u32,
        bit_length: u32,
    },
    /// Provided value does not fit into the bitfield.
    #[error("value {value} does not fit {bit_length} bits")]
    ValueTooWide { bit_length: u32, value: u64 },
}

fn validate_range(register_bits: u32, bf: BitField) -> Result<(), BitOpsError> {
    if register_bits == 0 || register_bits > 64 {
        return Err(BitOpsError::UnsupportedWidth {
            bits: register_bits,
        });
    }
    if bf.bit_length == 0 || bf.bit_length > 64 {
        return Err(BitOpsError::UnsupportedLength {
            bit_length: bf.bit_length,
        });
    }
    if u64::from(bf.bit_offset) + u64::from(bf.bit_length) > u64::from(register_bits) {
        return Err(BitOpsError::OutOfRange {
            register_bits,
            bit_offset: bf.bit_offset,
            bit_length: bf.bit_length,
        });
    }
    Ok(())
}

/// Extract the value of a bitfield from a register value.
pub fn extract(register: u64, register_bits: u32, bf: BitField) -> Result<u64, BitOpsError> {
    validate_range(register_bits, bf)?;
    let value = (register >> bf.bit_offset) & mask(bf.bit_length);
    debug!(
        bit_offset = bf.bit_offset,
        bit_length = bf.bit_length,
        register,
        value,
        "extract bitfield"
    );
    Ok(value)
}

/// Insert a value into the specified bitfield and return the updated register value.
pub fn insert(
    register: u64,
    register_bits: u32,
    bf: BitField,
    value: u64,
) -> Result<u64, BitOpsError> {
    validate_range(register_bits, bf)?;
    if !fits(value, bf.bit_length) {
        return Err(BitOpsError::ValueTooWide {
            bit_length: bf.bit_length,
            value,
        });
    }
    let field_mask = mask(bf.bit_length) << bf.bit_offset;
    let updated = (register & !field_mask) | (value << bf.bit_offset);
    debug!(
        bit_offset = bf.bit_offset,
        bit_length = bf.bit_length,
        before = register,
        after = updated,
        value,
        "insert bitfield"
    );
    Ok(updated)
}
