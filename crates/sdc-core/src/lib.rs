//! Semi Device Control core: register/field addressing, write-behind cache,
//! session lifecycle and the hardware backend capability trait.

pub mod backend;
pub mod bitops;
pub mod cache;
pub mod elements;
mod error;
pub mod lifecycle;
pub mod map;
pub mod uid;

pub use backend::{
    CccRequest, CccType, CustomRegister, HardwareBackend, InstrumentHandle, ScriptMode,
    ScriptRequest, SettingKey,
};
pub use bitops::{BitField, BitOpsError};
pub use cache::{CacheKey, OrderPolicy, WriteBehindCache};
pub use elements::DeviceElements;
pub use error::SdcError;
pub use lifecycle::{SessionState, Transition};
pub use map::{Element, FieldDefinitionDetails, FieldEntry, RegisterEntry, RegisterMap};
pub use sdconfig::{AccessMode, PinState};
pub use uid::Uid;
