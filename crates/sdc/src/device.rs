//! Register and field operations applied directly to the device.

use sdc_core::map::ensure_same_len;
use sdc_core::{BitOpsError, CustomRegister, HardwareBackend, SdcError};
use tracing::debug;

use crate::session::{read_field, read_register, write_field, write_register, Session};

/// Device view of a [`Session`]. Every call requires the session to be started.
pub struct Device<'a, B: HardwareBackend> {
    session: &'a Session<B>,
}

impl<'a, B: HardwareBackend> Device<'a, B> {
    pub(crate) fn new(session: &'a Session<B>) -> Self {
        Self { session }
    }

    pub fn write_register_by_name(&self, uid: &str, value: u64) -> Result<(), SdcError> {
        self.session
            .with_started("write_register_by_name", |inner, map| {
                let register = map.register_by_name(uid)?;
                write_register(&mut inner.backend, register, value)
            })
    }

    /// Write several registers in order. Not transactional: elements before a
    /// failing one stay written.
    pub fn write_registers_by_name<S: AsRef<str>>(
        &self,
        uids: &[S],
        values: &[u64],
    ) -> Result<(), SdcError> {
        self.session
            .with_started("write_registers_by_name", |inner, map| {
                ensure_same_len(uids.len(), values.len())?;
                for (index, (uid, value)) in uids.iter().zip(values).enumerate() {
                    let uid = uid.as_ref();
                    map.register_by_name(uid)
                        .and_then(|register| write_register(&mut inner.backend, register, *value))
                        .map_err(|err| SdcError::batch(index, uid, err))?;
                }
                Ok(())
            })
    }

    pub fn write_register_by_address(
        &self,
        ip_block: &str,
        address: u64,
        value: u64,
    ) -> Result<(), SdcError> {
        self.session
            .with_started("write_register_by_address", |inner, map| {
                let register = map.resolve_by_address(ip_block, address)?;
                write_register(&mut inner.backend, register, value)
            })
    }

    pub fn write_registers_by_address<S: AsRef<str>>(
        &self,
        ip_blocks: &[S],
        addresses: &[u64],
        values: &[u64],
    ) -> Result<(), SdcError> {
        self.session
            .with_started("write_registers_by_address", |inner, map| {
                ensure_same_len(ip_blocks.len(), addresses.len())?;
                ensure_same_len(addresses.len(), values.len())?;
                for (index, ((ip_block, address), value)) in
                    ip_blocks.iter().zip(addresses).zip(values).enumerate()
                {
                    let ip_block = ip_block.as_ref();
                    map.resolve_by_address(ip_block, *address)
                        .and_then(|register| write_register(&mut inner.backend, register, *value))
                        .map_err(|err| {
                            SdcError::batch(index, format!("{ip_block}@0x{address:X}"), err)
                        })?;
                }
                Ok(())
            })
    }

    /// Write a register outside the loaded map by raw address.
    pub fn write_custom_register(
        &self,
        register: &CustomRegister,
        value: u64,
    ) -> Result<(), SdcError> {
        self.session
            .with_started("write_custom_register", |inner, _| {
                check_custom(register, Some(value))?;
                debug!(
                    address = register.address,
                    interface = %register.interface,
                    protocol = %register.protocol,
                    value,
                    "write custom register"
                );
                inner.backend.write_custom_register(register, value)
            })
    }

    pub fn read_register_by_name(&self, uid: &str) -> Result<u64, SdcError> {
        self.session
            .with_started("read_register_by_name", |inner, map| {
                let register = map.register_by_name(uid)?;
                read_register(&mut inner.backend, register)
            })
    }

    pub fn read_registers_by_name<S: AsRef<str>>(&self, uids: &[S]) -> Result<Vec<u64>, SdcError> {
        self.session
            .with_started("read_registers_by_name", |inner, map| {
                let mut values = Vec::with_capacity(uids.len());
                for (index, uid) in uids.iter().enumerate() {
                    let uid = uid.as_ref();
                    let value = map
                        .register_by_name(uid)
                        .and_then(|register| read_register(&mut inner.backend, register))
                        .map_err(|err| SdcError::batch(index, uid, err))?;
                    values.push(value);
                }
                Ok(values)
            })
    }

    pub fn read_register_by_address(&self, ip_block: &str, address: u64) -> Result<u64, SdcError> {
        self.session
            .with_started("read_register_by_address", |inner, map| {
                let register = map.resolve_by_address(ip_block, address)?;
                read_register(&mut inner.backend, register)
            })
    }

    pub fn read_registers_by_address<S: AsRef<str>>(
        &self,
        ip_blocks: &[S],
        addresses: &[u64],
    ) -> Result<Vec<u64>, SdcError> {
        self.session
            .with_started("read_registers_by_address", |inner, map| {
                let registers = map.resolve_multi_by_address(ip_blocks, addresses)?;
                let mut values = Vec::with_capacity(registers.len());
                for (index, register) in registers.into_iter().enumerate() {
                    let value = read_register(&mut inner.backend, register).map_err(|err| {
                        SdcError::batch(
                            index,
                            format!("{}@0x{:X}", register.ip_block, register.address),
                            err,
                        )
                    })?;
                    values.push(value);
                }
                Ok(values)
            })
    }

    /// Read a register outside the loaded map by raw address.
    pub fn read_custom_register(&self, register: &CustomRegister) -> Result<u64, SdcError> {
        self.session
            .with_started("read_custom_register", |inner, _| {
                check_custom(register, None)?;
                inner.backend.read_custom_register(register)
            })
    }

    pub fn write_field_by_name(&self, uid: &str, value: u64) -> Result<(), SdcError> {
        self.session
            .with_started("write_field_by_name", |inner, map| {
                let field = map.field_by_name(uid)?;
                write_field(&mut inner.backend, map, field, value)
            })
    }

    pub fn write_fields_by_name<S: AsRef<str>>(
        &self,
        uids: &[S],
        values: &[u64],
    ) -> Result<(), SdcError> {
        self.session
            .with_started("write_fields_by_name", |inner, map| {
                ensure_same_len(uids.len(), values.len())?;
                for (index, (uid, value)) in uids.iter().zip(values).enumerate() {
                    let uid = uid.as_ref();
                    map.field_by_name(uid)
                        .and_then(|field| write_field(&mut inner.backend, map, field, *value))
                        .map_err(|err| SdcError::batch(index, uid, err))?;
                }
                Ok(())
            })
    }

    /// Write the raw value of a symbolic value definition.
    pub fn write_field_by_value_definition(
        &self,
        uid: &str,
        definition: &str,
    ) -> Result<(), SdcError> {
        self.session
            .with_started("write_field_by_value_definition", |inner, map| {
                let value = map.resolve_field_definition(uid, definition)?;
                let field = map.field_by_name(uid)?;
                write_field(&mut inner.backend, map, field, value)
            })
    }

    pub fn read_field_by_name(&self, uid: &str) -> Result<u64, SdcError> {
        self.session
            .with_started("read_field_by_name", |inner, map| {
                let field = map.field_by_name(uid)?;
                read_field(&mut inner.backend, map, field)
            })
    }

    pub fn read_fields_by_name<S: AsRef<str>>(&self, uids: &[S]) -> Result<Vec<u64>, SdcError> {
        self.session
            .with_started("read_fields_by_name", |inner, map| {
                let mut values = Vec::with_capacity(uids.len());
                for (index, uid) in uids.iter().enumerate() {
                    let uid = uid.as_ref();
                    let value = map
                        .field_by_name(uid)
                        .and_then(|field| read_field(&mut inner.backend, map, field))
                        .map_err(|err| SdcError::batch(index, uid, err))?;
                    values.push(value);
                }
                Ok(values)
            })
    }
}

fn check_custom(register: &CustomRegister, value: Option<u64>) -> Result<(), SdcError> {
    if register.register_size == 0 || register.register_size > 64 {
        return Err(BitOpsError::UnsupportedWidth {
            bits: register.register_size,
        }
        .into());
    }
    if register.address_size == 0 || register.address_size > 64 {
        return Err(BitOpsError::UnsupportedWidth {
            bits: register.address_size,
        }
        .into());
    }
    if !sdc_core::bitops::fits(register.address, register.address_size) {
        return Err(SdcError::Transport(format!(
            "address 0x{:X} does not fit {} address bits",
            register.address, register.address_size
        )));
    }
    if let Some(value) = value {
        if !sdc_core::bitops::fits(value, register.register_size) {
            return Err(SdcError::RegisterSizeOverflow {
                register: format!("custom@0x{:X}", register.address),
                value,
                size_bits: register.register_size,
            });
        }
    }
    Ok(())
}
