use std::path::Path;

use anyhow::{Context, Result};
use sdc::core::Element;
use serde::Serialize;
use tracing::info;

use crate::cmd_get;
use crate::common::{self, SimSession};

#[derive(Serialize)]
struct SetResponse<'a> {
    name: &'a str,
    value: u64,
}

fn write(session: &SimSession, name: &str, value: &str) -> Result<()> {
    let map = session.register_map()?;
    let device = session.device();
    let raw = sdc::config::parse_int(value).ok();
    match (map.resolve_by_name(name)?, raw) {
        (Element::Register(_), Some(raw)) => device.write_register_by_name(name, raw)?,
        (Element::Register(_), None) => {
            anyhow::bail!("register value '{value}' is not an integer")
        }
        (Element::Field(_), Some(raw)) => device.write_field_by_name(name, raw)?,
        (Element::Field(_), None) => device.write_field_by_value_definition(name, value)?,
    }
    Ok(())
}

pub fn run(config: &Path, name: &str, value: &str, json: bool) -> Result<()> {
    let session = common::open_started_session(config)?;
    info!(name, value, "writing element");
    let outcome = write(&session, name, value)
        .with_context(|| format!("write {name}"))
        .and_then(|()| cmd_get::read(&session, name).with_context(|| format!("read {name}")));
    common::close_session(&session)?;
    let (_, read_back, size_bits) = outcome?;

    if json {
        common::print_json(&SetResponse {
            name,
            value: read_back,
        })?;
    } else {
        println!("{}", common::format_hex(read_back, size_bits));
    }
    Ok(())
}
