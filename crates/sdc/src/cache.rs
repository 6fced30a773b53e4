//! Register and field operations staged in the write-behind cache.

use sdc_core::map::ensure_same_len;
use sdc_core::{
    CacheKey, FieldEntry, HardwareBackend, RegisterEntry, RegisterMap, SdcError,
    WriteBehindCache,
};
use tracing::info;

use crate::session::{write_field, write_register, Inner, Session};

/// Cache view of a [`Session`]. Every call requires the session to be started.
///
/// Reads return staged values only and never reach the device. Address keyed
/// operations share the slot of the register's unique identifier.
pub struct Cache<'a, B: HardwareBackend> {
    session: &'a Session<B>,
}

impl<'a, B: HardwareBackend> Cache<'a, B> {
    pub(crate) fn new(session: &'a Session<B>) -> Self {
        Self { session }
    }

    pub fn write_register_by_name(&self, uid: &str, value: u64) -> Result<(), SdcError> {
        self.session
            .with_started("cache.write_register_by_name", |inner, map| {
                let register = map.register_by_name(uid)?;
                stage_register(&mut inner.cache, register, value)
            })
    }

    pub fn write_registers_by_name<S: AsRef<str>>(
        &self,
        uids: &[S],
        values: &[u64],
    ) -> Result<(), SdcError> {
        self.session
            .with_started("cache.write_registers_by_name", |inner, map| {
                ensure_same_len(uids.len(), values.len())?;
                for (index, (uid, value)) in uids.iter().zip(values).enumerate() {
                    let uid = uid.as_ref();
                    map.register_by_name(uid)
                        .and_then(|register| stage_register(&mut inner.cache, register, *value))
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
            .with_started("cache.write_register_by_address", |inner, map| {
                let register = map.resolve_by_address(ip_block, address)?;
                stage_register(&mut inner.cache, register, value)
            })
    }

    pub fn write_registers_by_address<S: AsRef<str>>(
        &self,
        ip_blocks: &[S],
        addresses: &[u64],
        values: &[u64],
    ) -> Result<(), SdcError> {
        self.session
            .with_started("cache.write_registers_by_address", |inner, map| {
                ensure_same_len(ip_blocks.len(), addresses.len())?;
                ensure_same_len(addresses.len(), values.len())?;
                for (index, ((ip_block, address), value)) in
                    ip_blocks.iter().zip(addresses).zip(values).enumerate()
                {
                    let ip_block = ip_block.as_ref();
                    map.resolve_by_address(ip_block, *address)
                        .and_then(|register| stage_register(&mut inner.cache, register, *value))
                        .map_err(|err| {
                            SdcError::batch(index, format!("{ip_block}@0x{address:X}"), err)
                        })?;
                }
                Ok(())
            })
    }

    pub fn read_register_by_name(&self, uid: &str) -> Result<u64, SdcError> {
        self.session
            .with_started("cache.read_register_by_name", |inner, map| {
                let register = map.register_by_name(uid)?;
                inner.cache.read(&register_key(register))
            })
    }

    pub fn read_registers_by_name<S: AsRef<str>>(&self, uids: &[S]) -> Result<Vec<u64>, SdcError> {
        self.session
            .with_started("cache.read_registers_by_name", |inner, map| {
                uids.iter()
                    .enumerate()
                    .map(|(index, uid)| {
                        let uid = uid.as_ref();
                        map.register_by_name(uid)
                            .and_then(|register| inner.cache.read(&register_key(register)))
                            .map_err(|err| SdcError::batch(index, uid, err))
                    })
                    .collect()
            })
    }

    pub fn read_register_by_address(&self, ip_block: &str, address: u64) -> Result<u64, SdcError> {
        self.session
            .with_started("cache.read_register_by_address", |inner, map| {
                let register = map.resolve_by_address(ip_block, address)?;
                inner.cache.read(&register_key(register))
            })
    }

    pub fn read_registers_by_address<S: AsRef<str>>(
        &self,
        ip_blocks: &[S],
        addresses: &[u64],
    ) -> Result<Vec<u64>, SdcError> {
        self.session
            .with_started("cache.read_registers_by_address", |inner, map| {
                let registers = map.resolve_multi_by_address(ip_blocks, addresses)?;
                registers
                    .into_iter()
                    .enumerate()
                    .map(|(index, register)| {
                        inner
                            .cache
                            .read(&register_key(register))
                            .map_err(|err| SdcError::batch(index, register.uid.clone(), err))
                    })
                    .collect()
            })
    }

    pub fn write_field_by_name(&self, uid: &str, value: u64) -> Result<(), SdcError> {
        self.session
            .with_started("cache.write_field_by_name", |inner, map| {
                let field = map.field_by_name(uid)?;
                stage_field(&mut inner.cache, map, field, value)
            })
    }

    pub fn write_fields_by_name<S: AsRef<str>>(
        &self,
        uids: &[S],
        values: &[u64],
    ) -> Result<(), SdcError> {
        self.session
            .with_started("cache.write_fields_by_name", |inner, map| {
                ensure_same_len(uids.len(), values.len())?;
                for (index, (uid, value)) in uids.iter().zip(values).enumerate() {
                    let uid = uid.as_ref();
                    map.field_by_name(uid)
                        .and_then(|field| stage_field(&mut inner.cache, map, field, *value))
                        .map_err(|err| SdcError::batch(index, uid, err))?;
                }
                Ok(())
            })
    }

    pub fn write_field_by_value_definition(
        &self,
        uid: &str,
        definition: &str,
    ) -> Result<(), SdcError> {
        self.session
            .with_started("cache.write_field_by_value_definition", |inner, map| {
                let value = map.resolve_field_definition(uid, definition)?;
                let field = map.field_by_name(uid)?;
                stage_field(&mut inner.cache, map, field, value)
            })
    }

    pub fn read_field_by_name(&self, uid: &str) -> Result<u64, SdcError> {
        self.session
            .with_started("cache.read_field_by_name", |inner, map| {
                let field = map.field_by_name(uid)?;
                inner.cache.read(&field_key(field))
            })
    }

    pub fn read_fields_by_name<S: AsRef<str>>(&self, uids: &[S]) -> Result<Vec<u64>, SdcError> {
        self.session
            .with_started("cache.read_fields_by_name", |inner, map| {
                uids.iter()
                    .enumerate()
                    .map(|(index, uid)| {
                        let uid = uid.as_ref();
                        map.field_by_name(uid)
                            .and_then(|field| inner.cache.read(&field_key(field)))
                            .map_err(|err| SdcError::batch(index, uid, err))
                    })
                    .collect()
            })
    }

    /// Apply every staged write to the device in order and return how many
    /// were applied.
    ///
    /// If entry `i` fails the error is [`SdcError::FlushFailure`]; entries
    /// before `i` have been written and removed, entry `i` and later entries
    /// remain staged.
    pub fn flush_to_device(&self) -> Result<usize, SdcError> {
        self.session
            .with_started("cache.flush_to_device", |inner, map| {
                let Inner { cache, backend, .. } = inner;
                let staged = cache.len();
                let applied = cache.flush(|key, value| apply(&mut *backend, map, key, value))?;
                info!(staged, applied, "flushed cache to device");
                Ok(applied)
            })
    }

    /// Discard every staged write without touching the device.
    pub fn clear(&self) -> Result<(), SdcError> {
        self.session.with_started("cache.clear", |inner, _| {
            inner.cache.clear();
            Ok(())
        })
    }

    /// Number of staged writes.
    pub fn len(&self) -> Result<usize, SdcError> {
        self.session
            .with_started("cache.len", |inner, _| Ok(inner.cache.len()))
    }

    pub fn is_empty(&self) -> Result<bool, SdcError> {
        self.len().map(|len| len == 0)
    }
}

fn register_key(register: &RegisterEntry) -> CacheKey {
    CacheKey::Register(register.uid.clone())
}

fn field_key(field: &FieldEntry) -> CacheKey {
    CacheKey::Field(field.uid.clone())
}

fn stage_register(
    cache: &mut WriteBehindCache,
    register: &RegisterEntry,
    value: u64,
) -> Result<(), SdcError> {
    register.ensure_writable()?;
    register.check_value(value)?;
    cache.write(register_key(register), value);
    Ok(())
}

fn stage_field(
    cache: &mut WriteBehindCache,
    map: &RegisterMap,
    field: &FieldEntry,
    value: u64,
) -> Result<(), SdcError> {
    map.parent(field).ensure_writable()?;
    field.check_value(value)?;
    cache.write(field_key(field), value);
    Ok(())
}

fn apply<B: HardwareBackend>(
    backend: &mut B,
    map: &RegisterMap,
    key: &CacheKey,
    value: u64,
) -> Result<(), SdcError> {
    match key {
        CacheKey::Register(uid) => {
            let register = map.register_by_name(uid)?;
            write_register(backend, register, value)
        }
        CacheKey::Field(uid) => {
            let field = map.field_by_name(uid)?;
            write_field(backend, map, field, value)
        }
    }
}
