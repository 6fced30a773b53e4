//! Register/field addressing layer built from a parsed configuration export.

use std::collections::HashMap;
use std::path::Path;

use sdconfig::{
    AccessMode, ConfigError, ConfigModel, InterfaceDecl, PinDecl, ProtocolDecl, ScriptDecl,
};
use tracing::debug;

use crate::bitops::{self, BitField};
use crate::uid::Uid;
use crate::SdcError;

/// Register resolved from the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEntry {
    pub uid: String,
    pub ip_block: String,
    pub group: String,
    pub name: String,
    pub address: u64,
    pub size_bits: u32,
    /// Power-on value.
    pub default: u64,
    pub access: AccessMode,
    /// Interface owning the IP block, if declared.
    pub interface: Option<String>,
    /// Protocol used on `interface`, if declared.
    pub protocol: Option<String>,
    /// Unique identifiers of the fields of this register in declaration order.
    pub fields: Vec<String>,
}

impl RegisterEntry {
    pub fn ensure_readable(&self) -> Result<(), SdcError> {
        if !self.access.is_readable() {
            return Err(SdcError::AccessDenied {
                uid: self.uid.clone(),
                operation: "read",
            });
        }
        Ok(())
    }

    pub fn ensure_writable(&self) -> Result<(), SdcError> {
        if !self.access.is_writable() {
            return Err(SdcError::AccessDenied {
                uid: self.uid.clone(),
                operation: "write",
            });
        }
        Ok(())
    }

    /// Reject values wider than the register.
    pub fn check_value(&self, value: u64) -> Result<(), SdcError> {
        if !bitops::fits(value, self.size_bits) {
            return Err(SdcError::RegisterSizeOverflow {
                register: self.uid.clone(),
                value,
                size_bits: self.size_bits,
            });
        }
        Ok(())
    }
}

/// Bit field resolved from the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    pub uid: String,
    /// Unique identifier of the parent register.
    pub register: String,
    pub name: String,
    pub bit_offset: u32,
    pub size_bits: u32,
    /// Symbolic value definitions in declaration order.
    pub definitions: Vec<(String, u64)>,
    register_index: usize,
    map_by_name: HashMap<String, u64>,
}

impl FieldEntry {
    pub fn bit_field(&self) -> BitField {
        BitField::new(self.bit_offset, self.size_bits)
    }

    /// Raw value of a symbolic definition.
    pub fn definition(&self, name: &str) -> Option<u64> {
        self.map_by_name.get(name).copied()
    }

    /// Reject values wider than the field.
    pub fn check_value(&self, value: u64) -> Result<(), SdcError> {
        if !bitops::fits(value, self.size_bits) {
            return Err(SdcError::FieldSizeOverflow {
                field: self.uid.clone(),
                value,
                size_bits: self.size_bits,
            });
        }
        Ok(())
    }
}

/// Either kind of addressable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element<'a> {
    Register(&'a RegisterEntry),
    Field(&'a FieldEntry),
}

impl<'a> Element<'a> {
    pub fn uid(&self) -> &'a str {
        match self {
            Element::Register(register) => &register.uid,
            Element::Field(field) => &field.uid,
        }
    }
}

/// Display names, raw values and width of a field's value definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinitionDetails {
    pub display_values: Vec<String>,
    pub values: Vec<u64>,
    pub size: u32,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Register(usize),
    Field(usize),
}

/// Immutable register map of the device under test together with its
/// hardware topology.
#[derive(Debug)]
pub struct RegisterMap {
    name: String,
    version: Option<String>,
    registers: Vec<RegisterEntry>,
    fields: Vec<FieldEntry>,
    by_uid: HashMap<String, Slot>,
    by_address: HashMap<(String, u64), usize>,
    interfaces: Vec<InterfaceDecl>,
    pins: Vec<PinDecl>,
    scripts: Vec<ScriptDecl>,
}

impl RegisterMap {
    /// Load a configuration export from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SdcError> {
        let model = sdconfig::load(path)?;
        RegisterMap::try_from(model)
    }

    /// Build the map from an in-memory configuration export.
    pub fn from_xml(xml: &str) -> Result<Self, SdcError> {
        let model = sdconfig::parse(xml)?;
        RegisterMap::try_from(model)
    }

    /// Device name of the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Resolve a register or field by unique identifier.
    pub fn resolve_by_name(&self, uid: &str) -> Result<Element<'_>, SdcError> {
        Uid::parse(uid)?;
        match self.by_uid.get(uid) {
            Some(Slot::Register(index)) => Ok(Element::Register(&self.registers[*index])),
            Some(Slot::Field(index)) => Ok(Element::Field(&self.fields[*index])),
            None => Err(SdcError::UnknownIdentifier(uid.to_string())),
        }
    }

    pub fn register_by_name(&self, uid: &str) -> Result<&RegisterEntry, SdcError> {
        match self.resolve_by_name(uid)? {
            Element::Register(register) => Ok(register),
            Element::Field(_) => Err(SdcError::WrongElementKind {
                uid: uid.to_string(),
                expected: "register",
            }),
        }
    }

    pub fn field_by_name(&self, uid: &str) -> Result<&FieldEntry, SdcError> {
        match self.resolve_by_name(uid)? {
            Element::Field(field) => Ok(field),
            Element::Register(_) => Err(SdcError::WrongElementKind {
                uid: uid.to_string(),
                expected: "field",
            }),
        }
    }

    /// Parent register of a field.
    pub fn parent(&self, field: &FieldEntry) -> &RegisterEntry {
        &self.registers[field.register_index]
    }

    /// Resolve a register by `(IP block, address)`.
    pub fn resolve_by_address(
        &self,
        ip_block: &str,
        address: u64,
    ) -> Result<&RegisterEntry, SdcError> {
        self.by_address
            .get(&(ip_block.to_string(), address))
            .map(|index| &self.registers[*index])
            .ok_or_else(|| SdcError::UnknownAddress {
                ip_block: ip_block.to_string(),
                address,
            })
    }

    /// Raw value of a field's symbolic value definition.
    pub fn resolve_field_definition(&self, uid: &str, definition: &str) -> Result<u64, SdcError> {
        let field = self.field_by_name(uid)?;
        let value = field
            .definition(definition)
            .ok_or_else(|| SdcError::UnknownValueDefinition {
                field: uid.to_string(),
                definition: definition.to_string(),
            })?;
        field.check_value(value)?;
        Ok(value)
    }

    pub fn field_definition_details(&self, uid: &str) -> Result<FieldDefinitionDetails, SdcError> {
        let field = self.field_by_name(uid)?;
        Ok(FieldDefinitionDetails {
            display_values: field.definitions.iter().map(|(n, _)| n.clone()).collect(),
            values: field.definitions.iter().map(|(_, v)| *v).collect(),
            size: field.size_bits,
        })
    }

    /// Resolve several identifiers in order; the first failure aborts with its index.
    pub fn resolve_multi_by_name<S: AsRef<str>>(
        &self,
        uids: &[S],
    ) -> Result<Vec<Element<'_>>, SdcError> {
        uids.iter()
            .enumerate()
            .map(|(index, uid)| {
                let uid = uid.as_ref();
                self.resolve_by_name(uid)
                    .map_err(|err| SdcError::batch(index, uid, err))
            })
            .collect()
    }

    /// Resolve parallel `(IP block, address)` sequences in order.
    pub fn resolve_multi_by_address<S: AsRef<str>>(
        &self,
        ip_blocks: &[S],
        addresses: &[u64],
    ) -> Result<Vec<&RegisterEntry>, SdcError> {
        ensure_same_len(ip_blocks.len(), addresses.len())?;
        ip_blocks
            .iter()
            .zip(addresses)
            .enumerate()
            .map(|(index, (ip_block, address))| {
                let ip_block = ip_block.as_ref();
                self.resolve_by_address(ip_block, *address).map_err(|err| {
                    SdcError::batch(index, format!("{ip_block}@0x{address:X}"), err)
                })
            })
            .collect()
    }

    /// Register identifiers and addresses in declaration order.
    pub fn register_addresses(&self) -> (Vec<String>, Vec<u64>) {
        self.registers
            .iter()
            .map(|register| (register.uid.clone(), register.address))
            .unzip()
    }

    pub fn registers(&self) -> &[RegisterEntry] {
        &self.registers
    }

    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    pub fn register_uids(&self) -> Vec<String> {
        self.registers.iter().map(|r| r.uid.clone()).collect()
    }

    pub fn field_uids(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.uid.clone()).collect()
    }

    /// Interface names and types in declaration order.
    pub fn interface_details(&self) -> (Vec<String>, Vec<String>) {
        self.interfaces
            .iter()
            .map(|interface| (interface.name.clone(), interface.kind.clone()))
            .unzip()
    }

    pub fn interfaces(&self) -> &[InterfaceDecl] {
        &self.interfaces
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceDecl> {
        self.interfaces.iter().find(|interface| interface.name == name)
    }

    pub fn protocol(&self, interface: &str, protocol: &str) -> Option<&ProtocolDecl> {
        self.interface(interface)?
            .protocols
            .iter()
            .find(|candidate| candidate.name == protocol)
    }

    pub fn pins(&self) -> &[PinDecl] {
        &self.pins
    }

    pub fn pin(&self, name: &str) -> Option<&PinDecl> {
        self.pins.iter().find(|pin| pin.name == name)
    }

    pub fn scripts(&self) -> &[ScriptDecl] {
        &self.scripts
    }

    pub fn script(&self, name: &str) -> Option<&ScriptDecl> {
        self.scripts.iter().find(|script| script.name == name)
    }
}

/// Fail with [`SdcError::LengthMismatch`] unless both batch sequences have equal length.
pub fn ensure_same_len(keys: usize, values: usize) -> Result<(), SdcError> {
    if keys != values {
        return Err(SdcError::LengthMismatch {
            expected: keys,
            actual: values,
        });
    }
    Ok(())
}

fn invalid(message: String) -> SdcError {
    SdcError::ConfigLoadFailure(ConfigError::Invalid(message))
}

impl TryFrom<ConfigModel> for RegisterMap {
    type Error = SdcError;

    fn try_from(model: ConfigModel) -> Result<Self, Self::Error> {
        let blocks: HashMap<&str, (Option<String>, Option<String>)> = model
            .ip_blocks
            .iter()
            .map(|block| {
                (
                    block.name.as_str(),
                    (block.interface.clone(), block.protocol.clone()),
                )
            })
            .collect();

        let mut registers = Vec::with_capacity(model.registers.len());
        let mut fields = Vec::new();
        let mut by_uid = HashMap::new();
        let mut by_address = HashMap::new();

        for decl in &model.registers {
            let uid = decl.uid();
            let register_index = registers.len();
            if by_uid
                .insert(uid.clone(), Slot::Register(register_index))
                .is_some()
            {
                return Err(invalid(format!("duplicate identifier {uid}")));
            }
            if by_address
                .insert((decl.ip_block.clone(), decl.address), register_index)
                .is_some()
            {
                return Err(invalid(format!(
                    "duplicate address 0x{:X} in IP block {}",
                    decl.address, decl.ip_block
                )));
            }

            let mut field_uids = Vec::with_capacity(decl.fields.len());
            for field in &decl.fields {
                let field_uid = decl.field_uid(field);
                if by_uid
                    .insert(field_uid.clone(), Slot::Field(fields.len()))
                    .is_some()
                {
                    return Err(invalid(format!("duplicate identifier {field_uid}")));
                }
                field_uids.push(field_uid.clone());
                fields.push(FieldEntry {
                    uid: field_uid,
                    register: uid.clone(),
                    name: field.name.clone(),
                    bit_offset: field.bit_offset,
                    size_bits: field.size_bits,
                    definitions: field.definitions.clone(),
                    register_index,
                    map_by_name: field.definitions.iter().cloned().collect(),
                });
            }

            let (interface, protocol) = blocks
                .get(decl.ip_block.as_str())
                .cloned()
                .unwrap_or((None, None));
            registers.push(RegisterEntry {
                uid,
                ip_block: decl.ip_block.clone(),
                group: decl.group.clone(),
                name: decl.name.clone(),
                address: decl.address,
                size_bits: decl.size_bits,
                default: decl.default,
                access: decl.access,
                interface,
                protocol,
                fields: field_uids,
            });
        }

        debug!(
            device = %model.name,
            registers = registers.len(),
            fields = fields.len(),
            "built register map"
        );

        Ok(RegisterMap {
            name: model.name,
            version: model.version,
            registers,
            fields,
            by_uid,
            by_address,
            interfaces: model.interfaces,
            pins: model.pins,
            scripts: model.scripts,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const FIXTURE: &str = r#"
        <DeviceConfiguration Name="LPS22HH" Version="1.0">
            <RegisterMap>
                <IPBlock Name="LPS22HH" Interface="NI 657x" Protocol="I3C">
                    <RegisterGroup Name="Control_Register">
                        <Register Name="CTRL_REG1" Address="0x10" Size="8">
                            <Field Name="ODR" Offset="4" Size="3">
                                <ValueDefinition Name="PowerDown" Value="0" />
                                <ValueDefinition Name="1Hz" Value="1" />
                                <ValueDefinition Name="10Hz" Value="2" />
                            </Field>
                            <Field Name="BDU" Offset="1" Size="1" />
                        </Register>
                        <Register Name="CTRL_REG2" Address="0x11" Size="8" Default="0x10" />
                    </RegisterGroup>
                    <RegisterGroup Name="Status">
                        <Register Name="WHO_AM_I" Address="0x0F" Size="8" Default="0xB3" Access="RO" />
                        <Register Name="RESET" Address="0x12" Size="8" Access="WO" />
                    </RegisterGroup>
                </IPBlock>
                <IPBlock Name="AUX">
                    <RegisterGroup Name="Control_Register">
                        <Register Name="CTRL" Address="0x10" Size="16" />
                    </RegisterGroup>
                </IPBlock>
            </RegisterMap>
            <Hardware>
                <Interface Name="NI 657x" Type="NI-Digital Pattern">
                    <Setting Name="VoltageLevel" Value="1.8" />
                    <Protocol Name="I3C">
                        <Setting Name="Frequency" Value="12500000" />
                    </Protocol>
                    <Pin Name="Vdd" Default="Low" />
                    <Pin Name="CS" Default="High" />
                </Interface>
            </Hardware>
            <Scripts>
                <Script Name="power_up"><![CDATA[
WritePin Vdd High
WriteField LPS22HH-Control_Register-ODR 1Hz
ReadRegister LPS22HH-Control_Register-CTRL_REG1
]]></Script>
            </Scripts>
        </DeviceConfiguration>
    "#;

    pub(crate) fn build_map() -> RegisterMap {
        RegisterMap::from_xml(FIXTURE).expect("build map")
    }

    #[test]
    fn resolve_is_deterministic() {
        let map = build_map();
        let first = map
            .resolve_by_name("LPS22HH-Control_Register-CTRL_REG1")
            .expect("resolve");
        let second = map
            .resolve_by_name("LPS22HH-Control_Register-CTRL_REG1")
            .expect("resolve again");
        assert_eq!(first, second);
        let Element::Register(register) = first else {
            panic!("expected register");
        };
        assert_eq!(register.address, 0x10);
        assert_eq!(register.interface.as_deref(), Some("NI 657x"));
        assert_eq!(register.protocol.as_deref(), Some("I3C"));
    }

    #[test]
    fn resolve_field_and_parent() {
        let map = build_map();
        let field = map
            .field_by_name("LPS22HH-Control_Register-ODR")
            .expect("field");
        assert_eq!(field.bit_field(), BitField::new(4, 3));
        assert_eq!(map.parent(field).name, "CTRL_REG1");
    }

    #[test]
    fn unknown_and_malformed_identifiers() {
        let map = build_map();
        assert!(matches!(
            map.resolve_by_name("LPS22HH-Control_Register-NOPE"),
            Err(SdcError::UnknownIdentifier(_))
        ));
        assert!(matches!(
            map.resolve_by_name("CTRL_REG1"),
            Err(SdcError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn wrong_element_kind() {
        let map = build_map();
        assert!(matches!(
            map.register_by_name("LPS22HH-Control_Register-ODR"),
            Err(SdcError::WrongElementKind {
                expected: "register",
                ..
            })
        ));
        assert!(matches!(
            map.field_by_name("LPS22HH-Control_Register-CTRL_REG1"),
            Err(SdcError::WrongElementKind {
                expected: "field",
                ..
            })
        ));
    }

    #[test]
    fn address_resolution_matches_name() {
        let map = build_map();
        let by_address = map.resolve_by_address("LPS22HH", 0x10).expect("address");
        let by_name = map
            .register_by_name("LPS22HH-Control_Register-CTRL_REG1")
            .expect("name");
        assert_eq!(by_address, by_name);
        assert_eq!(map.resolve_by_address("AUX", 0x10).unwrap().size_bits, 16);
        assert!(matches!(
            map.resolve_by_address("LPS22HH", 0x99),
            Err(SdcError::UnknownAddress { address: 0x99, .. })
        ));
    }

    #[test]
    fn value_definitions() {
        let map = build_map();
        let uid = "LPS22HH-Control_Register-ODR";
        assert_eq!(map.resolve_field_definition(uid, "10Hz").unwrap(), 2);
        assert!(matches!(
            map.resolve_field_definition(uid, "200Hz"),
            Err(SdcError::UnknownValueDefinition { .. })
        ));
        let details = map.field_definition_details(uid).expect("details");
        assert_eq!(details.display_values, vec!["PowerDown", "1Hz", "10Hz"]);
        assert_eq!(details.values, vec![0, 1, 2]);
        assert_eq!(details.size, 3);
    }

    #[test]
    fn field_overflow() {
        let map = build_map();
        let field = map
            .field_by_name("LPS22HH-Control_Register-ODR")
            .expect("field");
        assert!(field.check_value(7).is_ok());
        assert!(matches!(
            field.check_value(9),
            Err(SdcError::FieldSizeOverflow { size_bits: 3, .. })
        ));
    }

    #[test]
    fn access_checks() {
        let map = build_map();
        let who = map.register_by_name("LPS22HH-Status-WHO_AM_I").unwrap();
        assert!(who.ensure_readable().is_ok());
        assert!(matches!(
            who.ensure_writable(),
            Err(SdcError::AccessDenied { operation: "write", .. })
        ));
        let reset = map.register_by_name("LPS22HH-Status-RESET").unwrap();
        assert!(reset.ensure_readable().is_err());
    }

    #[test]
    fn multi_resolution_reports_index() {
        let map = build_map();
        let err = map
            .resolve_multi_by_name(&[
                "LPS22HH-Control_Register-CTRL_REG1",
                "LPS22HH-Control_Register-MISSING",
            ])
            .unwrap_err();
        assert!(matches!(err, SdcError::BatchElement { index: 1, .. }));

        let err = map
            .resolve_multi_by_address(&["LPS22HH", "AUX"], &[0x10])
            .unwrap_err();
        assert!(matches!(
            err,
            SdcError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));

        let registers = map
            .resolve_multi_by_address(&["LPS22HH", "AUX"], &[0x11, 0x10])
            .expect("resolve");
        assert_eq!(registers[0].name, "CTRL_REG2");
        assert_eq!(registers[1].ip_block, "AUX");
    }

    #[test]
    fn listings_follow_declaration_order() {
        let map = build_map();
        let (uids, addresses) = map.register_addresses();
        assert_eq!(uids[0], "LPS22HH-Control_Register-CTRL_REG1");
        assert_eq!(addresses, vec![0x10, 0x11, 0x0F, 0x12, 0x10]);
        assert_eq!(
            map.field_uids(),
            vec![
                "LPS22HH-Control_Register-ODR",
                "LPS22HH-Control_Register-BDU"
            ]
        );
        let (names, kinds) = map.interface_details();
        assert_eq!(names, vec!["NI 657x"]);
        assert_eq!(kinds, vec!["NI-Digital Pattern"]);
        assert!(map.protocol("NI 657x", "I3C").is_some());
        assert!(map.protocol("NI 657x", "SPI").is_none());
        assert_eq!(map.pins().len(), 2);
        assert!(map.script("power_up").is_some());
    }

    #[test]
    fn config_errors_surface_as_load_failure() {
        let err = RegisterMap::from_xml("<DeviceConfiguration").unwrap_err();
        assert!(matches!(err, SdcError::ConfigLoadFailure(_)));
    }
}
