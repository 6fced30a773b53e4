use std::path::Path;

use anyhow::{Context, Result};
use sdc::core::Element;
use serde::Serialize;
use tracing::info;

use crate::common::{self, SimSession};

#[derive(Serialize)]
struct ElementValue<'a> {
    name: &'a str,
    kind: &'static str,
    value: u64,
}

/// Read a register or field by UID from a started session.
pub(crate) fn read(session: &SimSession, name: &str) -> Result<(&'static str, u64, u32)> {
    let map = session.register_map()?;
    let device = session.device();
    let read = match map.resolve_by_name(name)? {
        Element::Register(reg) => ("register", device.read_register_by_name(name)?, reg.size_bits),
        Element::Field(field) => ("field", device.read_field_by_name(name)?, field.size_bits),
    };
    Ok(read)
}

pub fn run(config: &Path, name: &str, json: bool) -> Result<()> {
    let session = common::open_started_session(config)?;
    info!(name, "reading element");
    let outcome = read(&session, name).with_context(|| format!("read {name}"));
    common::close_session(&session)?;
    let (kind, value, size_bits) = outcome?;

    if json {
        common::print_json(&ElementValue { name, kind, value })?;
    } else {
        println!("{}", common::format_hex(value, size_bits));
    }
    Ok(())
}
