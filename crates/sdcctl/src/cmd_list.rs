use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct RegisterRow {
    uid: String,
    address: String,
    size: u32,
    access: String,
    default: String,
    fields: Vec<String>,
}

#[derive(Serialize)]
struct InterfaceRow {
    name: String,
    kind: String,
    protocols: Vec<String>,
}

#[derive(Serialize)]
struct ScriptRow {
    name: String,
    valid: bool,
    lines: usize,
}

pub fn registers(config: &Path, json: bool) -> Result<()> {
    let session = common::open_session(config)?;
    let map = session.register_map()?;
    info!(count = map.registers().len(), "listing registers");

    let rows: Vec<RegisterRow> = map
        .registers()
        .iter()
        .map(|reg| RegisterRow {
            uid: reg.uid.clone(),
            address: common::format_hex(reg.address, 8),
            size: reg.size_bits,
            access: format!("{:?}", reg.access),
            default: common::format_hex(reg.default, reg.size_bits),
            fields: reg.fields.clone(),
        })
        .collect();
    common::close_session(&session)?;

    if json {
        return common::print_json(&rows);
    }
    println!(
        "{:<48} {:<8} {:<5} {:<7} {}",
        "UID", "ADDRESS", "SIZE", "ACCESS", "DEFAULT"
    );
    for row in &rows {
        println!(
            "{:<48} {:<8} {:<5} {:<7} {}",
            row.uid, row.address, row.size, row.access, row.default
        );
    }
    Ok(())
}

pub fn interfaces(config: &Path, json: bool) -> Result<()> {
    let session = common::open_session(config)?;
    let map = session.register_map()?;
    let rows: Vec<InterfaceRow> = map
        .interfaces()
        .iter()
        .map(|iface| InterfaceRow {
            name: iface.name.clone(),
            kind: iface.kind.clone(),
            protocols: iface.protocols.iter().map(|p| p.name.clone()).collect(),
        })
        .collect();
    common::close_session(&session)?;

    if json {
        return common::print_json(&rows);
    }
    if rows.is_empty() {
        println!("No interfaces configured.");
        return Ok(());
    }
    println!("{:<20} {:<24} {}", "NAME", "TYPE", "PROTOCOLS");
    for row in &rows {
        println!("{:<20} {:<24} {}", row.name, row.kind, row.protocols.join(","));
    }
    Ok(())
}

pub fn scripts(config: &Path, json: bool) -> Result<()> {
    let session = common::open_session(config)?;
    let mut rows = Vec::new();
    for name in session.script_names()? {
        let (valid, content) = session.script_string(&name)?;
        rows.push(ScriptRow {
            name,
            valid,
            lines: content.lines().filter(|l| !l.trim().is_empty()).count(),
        });
    }
    common::close_session(&session)?;

    if json {
        return common::print_json(&rows);
    }
    if rows.is_empty() {
        println!("No scripts in configuration.");
        return Ok(());
    }
    println!("{:<24} {:<6} {}", "NAME", "VALID", "LINES");
    for row in &rows {
        println!("{:<24} {:<6} {}", row.name, row.valid, row.lines);
    }
    Ok(())
}
