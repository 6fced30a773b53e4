//! Capability trait implemented by engines that drive the instruments.

use std::fmt;
use std::sync::Arc;

use sdconfig::PinState;

use crate::map::{FieldEntry, RegisterEntry};
use crate::{RegisterMap, SdcError};

/// Register reached by raw address outside the loaded register map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRegister {
    pub address: u64,
    /// Address width in bits.
    pub address_size: u32,
    /// Register width in bits.
    pub register_size: u32,
    pub interface: String,
    pub protocol: String,
}

/// Whether a script call waits for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptMode {
    #[default]
    Blocking,
    Asynchronous,
}

/// Script submitted to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    /// Name of the bundled script, `None` for ad-hoc commands.
    pub name: Option<String>,
    pub text: String,
    pub mode: ScriptMode,
}

/// Dynamic setting of an interface or of a protocol on an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Interface {
        interface: String,
        setting: String,
    },
    Protocol {
        interface: String,
        protocol: String,
        setting: String,
    },
}

impl SettingKey {
    pub fn interface(&self) -> &str {
        match self {
            SettingKey::Interface { interface, .. } | SettingKey::Protocol { interface, .. } => {
                interface
            }
        }
    }

    pub fn setting(&self) -> &str {
        match self {
            SettingKey::Interface { setting, .. } | SettingKey::Protocol { setting, .. } => setting,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingKey::Interface { interface, setting } => write!(f, "{interface}/{setting}"),
            SettingKey::Protocol {
                interface,
                protocol,
                setting,
            } => write!(f, "{interface}/{protocol}/{setting}"),
        }
    }
}

/// Opaque handle of an instrument session owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrumentHandle(pub u64);

impl fmt::Display for InstrumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Addressing mode of an I3C common command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CccType {
    Broadcast = 0,
    Direct = 1,
}

impl CccType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(CccType::Broadcast),
            1 => Some(CccType::Direct),
            _ => None,
        }
    }
}

/// I3C common command code transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CccRequest {
    /// Dynamic address assignment commands such as SETDASA, RSTDAA or ENTDAA.
    DynamicAddressing {
        ccc_type: CccType,
        command_id: u8,
        dynamic_address: Option<u8>,
        with_read: bool,
    },
    /// SDR write with an optional defining byte.
    SdrWrite {
        ccc_type: CccType,
        command_id: u8,
        defining_byte: Option<u8>,
        data: Vec<u8>,
    },
    /// SDR read with an optional defining byte.
    SdrRead {
        ccc_type: CccType,
        command_id: u8,
        defining_byte: Option<u8>,
        read_len: Option<usize>,
    },
}

impl CccRequest {
    pub fn ccc_type(&self) -> CccType {
        match self {
            CccRequest::DynamicAddressing { ccc_type, .. }
            | CccRequest::SdrWrite { ccc_type, .. }
            | CccRequest::SdrRead { ccc_type, .. } => *ccc_type,
        }
    }

    pub fn command_id(&self) -> u8 {
        match self {
            CccRequest::DynamicAddressing { command_id, .. }
            | CccRequest::SdrWrite { command_id, .. }
            | CccRequest::SdrRead { command_id, .. } => *command_id,
        }
    }
}

/// Engine driving the instruments for one session.
///
/// The session checks lifecycle state, identifiers, access rights and value
/// widths before calling into the backend, so implementations only deal with
/// the hardware side of each operation.
pub trait HardwareBackend: Send {
    /// Open the hardware session for the loaded register map.
    fn create(&mut self, map: Arc<RegisterMap>) -> Result<(), SdcError>;
    fn start(&mut self) -> Result<(), SdcError>;
    fn stop(&mut self) -> Result<(), SdcError>;
    /// Release the hardware session.
    fn destroy(&mut self) -> Result<(), SdcError>;

    fn read_register(&mut self, register: &RegisterEntry) -> Result<u64, SdcError>;
    fn write_register(&mut self, register: &RegisterEntry, value: u64) -> Result<(), SdcError>;
    fn read_field(&mut self, register: &RegisterEntry, field: &FieldEntry)
        -> Result<u64, SdcError>;
    fn write_field(
        &mut self,
        register: &RegisterEntry,
        field: &FieldEntry,
        value: u64,
    ) -> Result<(), SdcError>;
    fn read_custom_register(&mut self, register: &CustomRegister) -> Result<u64, SdcError>;
    fn write_custom_register(
        &mut self,
        register: &CustomRegister,
        value: u64,
    ) -> Result<(), SdcError>;

    fn read_pin_state(&mut self, pin: &str) -> Result<PinState, SdcError>;
    fn write_pin_state(&mut self, pin: &str, state: PinState) -> Result<(), SdcError>;

    /// Run a script; blocking runs return one JSON string per executed command.
    fn execute_script(&mut self, request: &ScriptRequest) -> Result<Vec<String>, SdcError>;
    fn abort_script(&mut self) -> Result<(), SdcError>;
    fn validate_script(&self, text: &str) -> bool;

    fn setting(&mut self, key: &SettingKey) -> Result<String, SdcError>;
    fn set_setting(&mut self, key: &SettingKey, value: &str) -> Result<(), SdcError>;

    /// Engine log rows.
    fn logs(&mut self) -> Result<Vec<Vec<String>>, SdcError>;
    fn reset_to_default_state(&mut self) -> Result<(), SdcError>;
    fn instrument_session(&mut self, interface: &str) -> Result<InstrumentHandle, SdcError>;

    fn execute_ccc(
        &mut self,
        interface: &str,
        protocol: &str,
        request: &CccRequest,
    ) -> Result<Vec<u8>, SdcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccc_type_from_raw() {
        assert_eq!(CccType::from_raw(0), Some(CccType::Broadcast));
        assert_eq!(CccType::from_raw(1), Some(CccType::Direct));
        assert_eq!(CccType::from_raw(2), None);
    }

    #[test]
    fn setting_key_display() {
        let key = SettingKey::Protocol {
            interface: "NI 657x".into(),
            protocol: "I3C".into(),
            setting: "Frequency".into(),
        };
        assert_eq!(key.to_string(), "NI 657x/I3C/Frequency");
        assert_eq!(key.interface(), "NI 657x");
        assert_eq!(key.setting(), "Frequency");
    }

    #[test]
    fn ccc_request_accessors() {
        let request = CccRequest::SdrRead {
            ccc_type: CccType::Direct,
            command_id: 0x8D,
            defining_byte: None,
            read_len: Some(6),
        };
        assert_eq!(request.ccc_type(), CccType::Direct);
        assert_eq!(request.command_id(), 0x8D);
    }
}
