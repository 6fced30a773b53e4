use sdconfig::ConfigError;
use thiserror::Error;

use crate::bitops::BitOpsError;

/// Error type produced by Semi Device Control operations.
#[derive(Debug, Error)]
pub enum SdcError {
    /// The identifier is malformed or not present in the loaded register map.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    /// The identifier resolved to an element of the other kind.
    #[error("{uid} is not a {expected}")]
    WrongElementKind { uid: String, expected: &'static str },
    /// No register is declared at the address within the IP block.
    #[error("no register at address 0x{address:X} in IP block {ip_block}")]
    UnknownAddress { ip_block: String, address: u64 },
    /// The symbolic value is not declared for the field.
    #[error("field {field} has no value definition {definition}")]
    UnknownValueDefinition { field: String, definition: String },
    /// The raw value is wider than the field.
    #[error("value {value} does not fit {size_bits}-bit field {field}")]
    FieldSizeOverflow {
        field: String,
        value: u64,
        size_bits: u32,
    },
    /// The raw value is wider than the register.
    #[error("value 0x{value:X} does not fit {size_bits}-bit register {register}")]
    RegisterSizeOverflow {
        register: String,
        value: u64,
        size_bits: u32,
    },
    /// The register access mode forbids the attempted operation.
    #[error("{operation} access denied for {uid}")]
    AccessDenied {
        uid: String,
        operation: &'static str,
    },
    /// Parallel batch sequences differ in length.
    #[error("batch length mismatch: {expected} keys, {actual} values")]
    LengthMismatch { expected: usize, actual: usize },
    /// An element of a batch operation failed; earlier elements stay applied.
    #[error("batch element {index} ({key}) failed: {source}")]
    BatchElement {
        index: usize,
        key: String,
        #[source]
        source: Box<SdcError>,
    },
    /// The operation is not allowed in the current lifecycle state.
    #[error("{operation} is not allowed while the session is {state}")]
    InvalidSessionState {
        operation: &'static str,
        state: &'static str,
    },
    /// Destroy was requested on a session that is already destroyed.
    #[error("session already destroyed")]
    AlreadyDestroyed,
    /// Nothing is staged in the cache for the key.
    #[error("cache miss: {0}")]
    CacheMiss(String),
    /// A staged write failed while flushing; entries from `index` on are retained.
    #[error("flush failed at entry {index} ({key}): {source}")]
    FlushFailure {
        index: usize,
        key: String,
        #[source]
        source: Box<SdcError>,
    },
    /// The engine is still executing a script.
    #[error("a script is already running")]
    ScriptAlreadyRunning,
    /// No script with this name is bundled with the configuration.
    #[error("unknown script: {0}")]
    UnknownScript(String),
    /// The configuration export could not be loaded.
    #[error("configuration load failed: {0}")]
    ConfigLoadFailure(#[from] ConfigError),
    /// Field bit manipulation failed.
    #[error("bitfield: {0}")]
    BitField(#[from] BitOpsError),
    /// The hardware backend reported a failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Writing a generated artifact failed.
    #[error("io error: {0}")]
    Io(String),
}

impl SdcError {
    /// Wrap an error raised while processing element `index` of a batch.
    pub fn batch(index: usize, key: impl Into<String>, source: SdcError) -> Self {
        SdcError::BatchElement {
            index,
            key: key.into(),
            source: Box::new(source),
        }
    }
}
