use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct FieldDetails<'a> {
    name: &'a str,
    size: u32,
    definitions: Vec<Definition>,
}

#[derive(Serialize)]
struct Definition {
    name: String,
    value: u64,
}

pub fn run(config: &Path, name: &str, json: bool) -> Result<()> {
    let session = common::open_session(config)?;
    let details = session
        .field_definition_details(name)
        .with_context(|| format!("field definitions of {name}"))?;
    common::close_session(&session)?;

    let payload = FieldDetails {
        name,
        size: details.size,
        definitions: details
            .display_values
            .into_iter()
            .zip(details.values)
            .map(|(name, value)| Definition { name, value })
            .collect(),
    };
    if json {
        return common::print_json(&payload);
    }
    println!("{} ({} bits)", payload.name, payload.size);
    for def in &payload.definitions {
        println!("  {:<16} {}", def.name, def.value);
    }
    Ok(())
}
