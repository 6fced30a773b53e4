//! Load and validate Semi Device Control configuration exports using quick-xml.
//!
//! A configuration export describes the register map of the device under test
//! (IP blocks, register groups, registers, fields and their value definitions),
//! the hardware topology (interfaces, protocols, pins and their dynamic
//! settings) and the scripts bundled with the configuration.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;

/// Name of the document element of a configuration export.
pub const ROOT_ELEMENT: &str = "DeviceConfiguration";

/// Delimiter between the parts of a register or field unique identifier.
pub const UID_DELIMITER: char = '-';

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("io: {0}")]
    Io(String),
}

/// Access rights declared for a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read-only.
    RO,
    /// Write-only.
    WO,
    /// Read-write.
    #[default]
    RW,
}

impl AccessMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RO" => Some(AccessMode::RO),
            "WO" => Some(AccessMode::WO),
            "RW" => Some(AccessMode::RW),
            _ => None,
        }
    }

    /// Whether the register may be read from the device.
    pub fn is_readable(self) -> bool {
        !matches!(self, AccessMode::WO)
    }

    /// Whether the register may be written to the device.
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::RO)
    }
}

/// Digital pin state as understood by the pin instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PinState {
    #[default]
    Low = 0,
    High = 1,
    Terminate = 2,
}

impl PinState {
    /// Convert from the raw integer encoding (`0` low, `1` high, `2` terminate).
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(PinState::Low),
            1 => Some(PinState::High),
            2 => Some(PinState::Terminate),
            _ => None,
        }
    }

    /// Raw integer encoding of the state.
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// Parse either the symbolic name or the raw integer encoding.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "low" => Some(PinState::Low),
            "high" => Some(PinState::High),
            "terminate" => Some(PinState::Terminate),
            _ => trimmed.parse().ok().and_then(PinState::from_raw),
        }
    }
}

impl std::fmt::Display for PinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PinState::Low => "Low",
            PinState::High => "High",
            PinState::Terminate => "Terminate",
        };
        f.write_str(name)
    }
}

/// Parsed configuration export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigModel {
    /// Device name from the document element.
    pub name: String,
    /// Optional export version.
    pub version: Option<String>,
    pub ip_blocks: Vec<IpBlockDecl>,
    /// Registers in declaration order.
    pub registers: Vec<RegisterDecl>,
    pub interfaces: Vec<InterfaceDecl>,
    pub pins: Vec<PinDecl>,
    pub scripts: Vec<ScriptDecl>,
}

/// IP block (device sub-unit) and the bus used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpBlockDecl {
    pub name: String,
    pub interface: Option<String>,
    pub protocol: Option<String>,
}

/// Register declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDecl {
    pub ip_block: String,
    pub group: String,
    pub name: String,
    pub address: u64,
    /// Register width in bits (1..=64).
    pub size_bits: u32,
    /// Power-on value.
    pub default: u64,
    pub access: AccessMode,
    pub fields: Vec<FieldDecl>,
}

impl RegisterDecl {
    /// Unique identifier `<IPBlock>-<RegisterGroup>-<Name>`.
    pub fn uid(&self) -> String {
        join_uid(&self.ip_block, &self.group, &self.name)
    }

    /// Unique identifier of a field declared inside this register.
    pub fn field_uid(&self, field: &FieldDecl) -> String {
        join_uid(&self.ip_block, &self.group, &field.name)
    }
}

/// Bit field declaration inside a register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    /// Offset of the least significant bit within the register.
    pub bit_offset: u32,
    pub size_bits: u32,
    /// Symbolic value definitions `(display name, raw value)` in declaration order.
    pub definitions: Vec<(String, u64)>,
}

/// Hardware interface (instrument) declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    pub name: String,
    /// Interface type, e.g. `NI-Digital Pattern`.
    pub kind: String,
    /// Dynamic interface settings `(name, value)`.
    pub settings: Vec<(String, String)>,
    pub protocols: Vec<ProtocolDecl>,
}

/// Protocol configured on an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolDecl {
    pub name: String,
    /// Dynamic protocol settings `(name, value)`.
    pub settings: Vec<(String, String)>,
}

/// Pin declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDecl {
    pub name: String,
    /// Interface driving the pin, when declared inside an `Interface` element.
    pub interface: Option<String>,
    pub default: PinState,
}

/// Script bundled with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDecl {
    pub name: String,
    pub content: String,
}

/// Join the three parts of a unique identifier.
pub fn join_uid(ip_block: &str, group: &str, name: &str) -> String {
    format!("{ip_block}{UID_DELIMITER}{group}{UID_DELIMITER}{name}")
}

/// Read and parse a configuration export from disk.
pub fn load(path: impl AsRef<Path>) -> Result<ConfigModel, ConfigError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Io(format!("read {}: {err}", path.display())))?;
    debug!(path = %path.display(), bytes = xml.len(), "loaded configuration export");
    parse(&xml)
}

/// Parse a configuration export and validate its cross references.
pub fn parse(xml: &str) -> Result<ConfigModel, ConfigError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut builder = Builder::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                builder.open(&e)?;
            }
            Ok(Event::Empty(e)) => {
                builder.open(&e)?;
                let name = element_name(&e);
                builder.close(&name)?;
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                builder.close(&name)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ConfigError::Xml(err.to_string()))?;
                builder.text(&text);
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                builder.text(&String::from_utf8_lossy(&raw));
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ConfigError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let model = builder.finish()?;
    validate(&model)?;
    debug!(
        device = %model.name,
        ip_blocks = model.ip_blocks.len(),
        registers = model.registers.len(),
        interfaces = model.interfaces.len(),
        pins = model.pins.len(),
        scripts = model.scripts.len(),
        "parsed configuration export"
    );
    Ok(model)
}

#[derive(Debug, Default)]
struct Builder {
    model: ConfigModel,
    seen_root: bool,
    depth: usize,
    ip_block: Option<String>,
    group: Option<String>,
    register: Option<RegisterDecl>,
    field: Option<FieldDecl>,
    interface: Option<InterfaceDecl>,
    protocol: Option<ProtocolDecl>,
    script: Option<ScriptDecl>,
}

impl Builder {
    fn open(&mut self, event: &BytesStart<'_>) -> Result<(), ConfigError> {
        let tag = element_name(event);
        self.depth += 1;
        if self.depth == 1 {
            if tag != ROOT_ELEMENT {
                return Err(ConfigError::Invalid(format!(
                    "expected <{ROOT_ELEMENT}> document element, found <{tag}>"
                )));
            }
            self.seen_root = true;
            self.model.name = attribute_value(event, b"Name")?.unwrap_or_default();
            self.model.version = attribute_value(event, b"Version")?;
            return Ok(());
        }

        match tag.as_str() {
            "IPBlock" => {
                let name = required(event, b"Name", &tag)?;
                ensure_no_delimiter(&name, "IP block")?;
                self.model.ip_blocks.push(IpBlockDecl {
                    name: name.clone(),
                    interface: attribute_value(event, b"Interface")?,
                    protocol: attribute_value(event, b"Protocol")?,
                });
                self.ip_block = Some(name);
            }
            "RegisterGroup" => {
                if self.ip_block.is_none() {
                    return Err(misplaced(&tag, "IPBlock"));
                }
                let name = required(event, b"Name", &tag)?;
                ensure_no_delimiter(&name, "register group")?;
                self.group = Some(name);
            }
            "Register" => {
                let (Some(ip_block), Some(group)) = (&self.ip_block, &self.group) else {
                    return Err(misplaced(&tag, "RegisterGroup"));
                };
                let name = required(event, b"Name", &tag)?;
                let address = parse_int(&required(event, b"Address", &tag)?)?;
                let size_bits = parse_width(&required(event, b"Size", &tag)?, &name)?;
                let default = match attribute_value(event, b"Default")? {
                    Some(value) => parse_int(&value)?,
                    None => 0,
                };
                if !fits(default, size_bits) {
                    return Err(ConfigError::Invalid(format!(
                        "default 0x{default:X} of register {name} does not fit {size_bits} bits"
                    )));
                }
                let access = match attribute_value(event, b"Access")? {
                    Some(value) => AccessMode::parse(&value).ok_or_else(|| {
                        ConfigError::Invalid(format!("unknown access mode '{value}' for {name}"))
                    })?,
                    None => AccessMode::RW,
                };
                self.register = Some(RegisterDecl {
                    ip_block: ip_block.clone(),
                    group: group.clone(),
                    name,
                    address,
                    size_bits,
                    default,
                    access,
                    fields: Vec::new(),
                });
            }
            "Field" => {
                if self.register.is_none() {
                    return Err(misplaced(&tag, "Register"));
                }
                let name = required(event, b"Name", &tag)?;
                let bit_offset = parse_int(&required(event, b"Offset", &tag)?)?;
                let bit_offset = u32::try_from(bit_offset)
                    .map_err(|_| ConfigError::Invalid(format!("offset of {name} out of range")))?;
                let size_bits = parse_width(&required(event, b"Size", &tag)?, &name)?;
                self.field = Some(FieldDecl {
                    name,
                    bit_offset,
                    size_bits,
                    definitions: Vec::new(),
                });
            }
            "ValueDefinition" => {
                let Some(field) = self.field.as_mut() else {
                    return Err(misplaced(&tag, "Field"));
                };
                let name = required(event, b"Name", &tag)?;
                let value = parse_int(&required(event, b"Value", &tag)?)?;
                field.definitions.push((name, value));
            }
            "Interface" => {
                let name = required(event, b"Name", &tag)?;
                let kind = attribute_value(event, b"Type")?.unwrap_or_default();
                self.interface = Some(InterfaceDecl {
                    name,
                    kind,
                    settings: Vec::new(),
                    protocols: Vec::new(),
                });
            }
            "Protocol" => {
                if self.interface.is_none() {
                    return Err(misplaced(&tag, "Interface"));
                }
                let name = required(event, b"Name", &tag)?;
                self.protocol = Some(ProtocolDecl {
                    name,
                    settings: Vec::new(),
                });
            }
            "Setting" => {
                let name = required(event, b"Name", &tag)?;
                let value = attribute_value(event, b"Value")?.unwrap_or_default();
                if let Some(protocol) = self.protocol.as_mut() {
                    protocol.settings.push((name, value));
                } else if let Some(interface) = self.interface.as_mut() {
                    interface.settings.push((name, value));
                } else {
                    return Err(misplaced(&tag, "Interface or Protocol"));
                }
            }
            "Pin" => {
                let name = required(event, b"Name", &tag)?;
                let default = match attribute_value(event, b"Default")? {
                    Some(value) => PinState::parse(&value).ok_or_else(|| {
                        ConfigError::Invalid(format!("unknown pin state '{value}' for {name}"))
                    })?,
                    None => PinState::Low,
                };
                self.model.pins.push(PinDecl {
                    name,
                    interface: self.interface.as_ref().map(|i| i.name.clone()),
                    default,
                });
            }
            "Script" => {
                let name = required(event, b"Name", &tag)?;
                self.script = Some(ScriptDecl {
                    name,
                    content: String::new(),
                });
            }
            "RegisterMap" | "Hardware" | "Scripts" => {}
            other => {
                debug!(element = other, "ignoring unknown configuration element");
            }
        }
        Ok(())
    }

    fn close(&mut self, tag: &str) -> Result<(), ConfigError> {
        self.depth = self.depth.saturating_sub(1);
        match tag {
            "IPBlock" => {
                self.ip_block = None;
                self.group = None;
            }
            "RegisterGroup" => {
                self.group = None;
            }
            "Register" => {
                if let Some(register) = self.register.take() {
                    self.model.registers.push(register);
                }
            }
            "Field" => {
                if let (Some(field), Some(register)) = (self.field.take(), self.register.as_mut()) {
                    check_field(register, &field)?;
                    register.fields.push(field);
                }
            }
            "Protocol" => {
                if let (Some(protocol), Some(interface)) =
                    (self.protocol.take(), self.interface.as_mut())
                {
                    interface.protocols.push(protocol);
                }
            }
            "Interface" => {
                if let Some(interface) = self.interface.take() {
                    self.model.interfaces.push(interface);
                }
            }
            "Script" => {
                if let Some(mut script) = self.script.take() {
                    script.content = script.content.trim().to_string();
                    self.model.scripts.push(script);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(script) = self.script.as_mut() {
            script.content.push_str(text);
        }
    }

    fn finish(self) -> Result<ConfigModel, ConfigError> {
        if !self.seen_root {
            return Err(ConfigError::Invalid(format!(
                "missing <{ROOT_ELEMENT}> document element"
            )));
        }
        Ok(self.model)
    }
}

fn check_field(register: &RegisterDecl, field: &FieldDecl) -> Result<(), ConfigError> {
    let end = u64::from(field.bit_offset) + u64::from(field.size_bits);
    if end > u64::from(register.size_bits) {
        return Err(ConfigError::Invalid(format!(
            "field {} (offset {}, size {}) exceeds {}-bit register {}",
            field.name, field.bit_offset, field.size_bits, register.size_bits, register.name
        )));
    }
    for (name, value) in &field.definitions {
        if !fits(*value, field.size_bits) {
            return Err(ConfigError::Invalid(format!(
                "value definition {name}={value} does not fit {}-bit field {}",
                field.size_bits, field.name
            )));
        }
    }
    Ok(())
}

fn validate(model: &ConfigModel) -> Result<(), ConfigError> {
    let mut uids = HashSet::new();
    let mut addresses = HashSet::new();
    for register in &model.registers {
        let uid = register.uid();
        if !addresses.insert((register.ip_block.as_str(), register.address)) {
            return Err(ConfigError::Invalid(format!(
                "duplicate address 0x{:X} in IP block {}",
                register.address, register.ip_block
            )));
        }
        if !uids.insert(uid.clone()) {
            return Err(ConfigError::Invalid(format!("duplicate identifier {uid}")));
        }
        for field in &register.fields {
            let uid = register.field_uid(field);
            if !uids.insert(uid.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate identifier {uid}")));
            }
        }
    }

    let mut protocols: HashMap<&str, HashSet<&str>> = HashMap::new();
    for interface in &model.interfaces {
        if protocols.contains_key(interface.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate interface {}",
                interface.name
            )));
        }
        let mut names = HashSet::new();
        for protocol in &interface.protocols {
            if !names.insert(protocol.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate protocol {} on interface {}",
                    protocol.name, interface.name
                )));
            }
        }
        protocols.insert(interface.name.as_str(), names);
    }

    for block in &model.ip_blocks {
        if let Some(interface) = block.interface.as_deref() {
            let known = protocols.get(interface).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "IP block {} references unknown interface {interface}",
                    block.name
                ))
            })?;
            if let Some(protocol) = block.protocol.as_deref() {
                if !known.contains(protocol) {
                    return Err(ConfigError::Invalid(format!(
                        "IP block {} references unknown protocol {protocol} on {interface}",
                        block.name
                    )));
                }
            }
        } else if block.protocol.is_some() {
            return Err(ConfigError::Invalid(format!(
                "IP block {} declares a protocol without an interface",
                block.name
            )));
        }
    }

    let mut pins = HashSet::new();
    for pin in &model.pins {
        if !pins.insert(pin.name.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate pin {}", pin.name)));
        }
    }

    let mut scripts = HashSet::new();
    for script in &model.scripts {
        if !scripts.insert(script.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate script {}",
                script.name
            )));
        }
    }
    Ok(())
}

fn element_name(event: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(event.name().as_ref()).to_string()
}

fn misplaced(tag: &str, parent: &str) -> ConfigError {
    ConfigError::Invalid(format!("<{tag}> must be nested inside <{parent}>"))
}

fn required(event: &BytesStart<'_>, name: &[u8], tag: &str) -> Result<String, ConfigError> {
    attribute_value(event, name)?.ok_or_else(|| {
        ConfigError::Invalid(format!(
            "<{tag}> is missing the {} attribute",
            String::from_utf8_lossy(name)
        ))
    })
}

fn ensure_no_delimiter(name: &str, what: &str) -> Result<(), ConfigError> {
    if name.contains(UID_DELIMITER) {
        return Err(ConfigError::Invalid(format!(
            "{what} name '{name}' must not contain '{UID_DELIMITER}'"
        )));
    }
    Ok(())
}

fn attribute_value(event: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ConfigError> {
    for attr in event.attributes() {
        let attr = attr.map_err(|err| ConfigError::Xml(err.to_string()))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|err| ConfigError::Xml(err.to_string()))?;
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                return Ok(None);
            }
            return Ok(Some(trimmed));
        }
    }
    Ok(None)
}

fn parse_width(value: &str, owner: &str) -> Result<u32, ConfigError> {
    let bits = parse_int(value)?;
    if bits == 0 || bits > 64 {
        return Err(ConfigError::Invalid(format!(
            "size of {owner} must be within 1..=64 bits, got {bits}"
        )));
    }
    Ok(bits as u32)
}

/// Mask covering the low `bits` bits.
pub fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Whether `value` is representable in `bits` bits.
pub fn fits(value: u64, bits: u32) -> bool {
    value & !mask(bits) == 0
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
pub fn parse_int(value: &str) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(&hex.replace('_', ""), 16)
            .map_err(|err| ConfigError::Invalid(format!("invalid hex value '{trimmed}': {err}")))
    } else {
        trimmed
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("invalid integer '{trimmed}': {err}")))
    }
}
