//! Enumeration of addressable elements grouped by IP block and register group,
//! rendered as a Rust module of identifier constants.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::uid::Uid;
use crate::{RegisterMap, SdcError};

/// File name of the rendered listing.
pub const FILE_NAME: &str = "sdc_device_elements.rs";

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "yield",
];

/// Run of identifiers sharing one register group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSection {
    pub group: String,
    /// `(leaf name, unique identifier)` pairs in encountered order.
    pub leaves: Vec<(String, String)>,
}

/// Run of identifiers sharing one IP block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpSection {
    pub ip_block: String,
    pub groups: Vec<GroupSection>,
}

/// Group identifiers in encountered order.
///
/// A new IP section starts whenever the IP block differs from the previous
/// identifier, and a new group section whenever the IP block or the group
/// differs. Non-adjacent runs are kept apart.
pub fn group_identifiers<S: AsRef<str>>(uids: &[S]) -> Result<Vec<IpSection>, SdcError> {
    let mut sections: Vec<IpSection> = Vec::new();
    for uid in uids {
        let uid = uid.as_ref();
        let parsed = Uid::parse(uid)?;
        let same_ip = sections
            .last()
            .is_some_and(|section| section.ip_block == parsed.ip_block);
        if !same_ip {
            sections.push(IpSection {
                ip_block: parsed.ip_block.to_string(),
                groups: Vec::new(),
            });
        }
        let Some(section) = sections.last_mut() else {
            continue;
        };
        let same_group = section
            .groups
            .last()
            .is_some_and(|group| group.group == parsed.group);
        if !same_group {
            section.groups.push(GroupSection {
                group: parsed.group.to_string(),
                leaves: Vec::new(),
            });
        }
        if let Some(group) = section.groups.last_mut() {
            group.leaves.push((parsed.name.to_string(), uid.to_string()));
        }
    }
    Ok(sections)
}

/// Flat listing: IP block headers, group headers and leaves in emission order.
pub fn outline(sections: &[IpSection]) -> Vec<String> {
    let mut lines = Vec::new();
    for section in sections {
        lines.push(section.ip_block.clone());
        for group in &section.groups {
            lines.push(group.group.clone());
            lines.extend(group.leaves.iter().map(|(leaf, _)| leaf.clone()));
        }
    }
    lines
}

/// Register and field listings of a register map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceElements {
    pub device: String,
    pub registers: Vec<IpSection>,
    pub fields: Vec<IpSection>,
}

impl DeviceElements {
    pub fn from_map(map: &RegisterMap) -> Result<Self, SdcError> {
        Ok(Self {
            device: map.name().to_string(),
            registers: group_identifiers(&map.register_uids())?,
            fields: group_identifiers(&map.field_uids())?,
        })
    }

    /// Render the listing as a Rust source module.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "//! Device elements of {}.", self.device);
        out.push_str("//! Generated file; regenerate instead of editing.\n");
        out.push_str("#![allow(non_snake_case, non_upper_case_globals, dead_code)]\n");
        render_kind(&mut out, "Register", &self.registers);
        render_kind(&mut out, "Field", &self.fields);
        out
    }

    /// Write [`FILE_NAME`] into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, SdcError> {
        if !dir.is_dir() {
            return Err(SdcError::Io(format!(
                "{} is not an existing directory",
                dir.display()
            )));
        }
        let path = dir.join(FILE_NAME);
        std::fs::write(&path, self.render())
            .map_err(|err| SdcError::Io(format!("write {}: {err}", path.display())))?;
        info!(path = %path.display(), "generated device elements");
        Ok(path)
    }
}

fn render_kind(out: &mut String, kind: &str, sections: &[IpSection]) {
    let _ = writeln!(out, "\npub mod {kind} {{");
    let mut ip_names = HashSet::new();
    for section in sections {
        let ip = unique_ident(&mut ip_names, &section.ip_block);
        let _ = writeln!(out, "    pub mod {ip} {{");
        let mut group_names = HashSet::new();
        for group in &section.groups {
            let name = unique_ident(&mut group_names, &group.group);
            let _ = writeln!(out, "        pub mod {name} {{");
            let mut leaf_names = HashSet::new();
            for (leaf, uid) in &group.leaves {
                let leaf = unique_ident(&mut leaf_names, leaf);
                let _ = writeln!(out, "            pub const {leaf}: &str = {uid:?};");
            }
            out.push_str("        }\n");
        }
        out.push_str("    }\n");
    }
    out.push_str("}\n");
}

/// Sanitized identifier not yet in `used`; repeats get `_2`, `_3`, ...
fn unique_ident(used: &mut HashSet<String>, name: &str) -> String {
    let base = sanitize(name);
    let mut ident = base.clone();
    let mut n = 2;
    while used.contains(&ident) {
        ident = format!("{base}_{n}");
        n += 1;
    }
    used.insert(ident.clone());
    ident
}

/// Turn an arbitrary name into a valid Rust identifier.
pub fn sanitize(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if ident == "_" || KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::tests::build_map;

    #[test]
    fn headers_follow_changes() {
        let sections =
            group_identifiers(&["A-G1-x", "A-G1-y", "A-G2-z", "B-G1-w"]).expect("group");
        assert_eq!(
            outline(&sections),
            vec!["A", "G1", "x", "y", "G2", "z", "B", "G1", "w"]
        );
    }

    #[test]
    fn non_adjacent_runs_are_not_merged() {
        let sections = group_identifiers(&["A-G1-x", "B-G1-y", "A-G1-z"]).expect("group");
        assert_eq!(sections.len(), 3);
        assert_eq!(outline(&sections), vec!["A", "G1", "x", "B", "G1", "y", "A", "G1", "z"]);
    }

    #[test]
    fn malformed_identifier_fails() {
        assert!(matches!(
            group_identifiers(&["A-G1"]),
            Err(SdcError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn sanitize_identifiers() {
        assert_eq!(sanitize("CTRL_REG1"), "CTRL_REG1");
        assert_eq!(sanitize("1Hz"), "_1Hz");
        assert_eq!(sanitize("ODR-low"), "ODR_low");
        assert_eq!(sanitize("type"), "type_");
        assert_eq!(sanitize(""), "__");
    }

    #[test]
    fn repeated_sections_render_distinct_names() {
        let elements = DeviceElements {
            device: "D".into(),
            registers: group_identifiers(&[
                "A-G1-x",
                "A-G2-y",
                "A-G1-z",
                "B-G1-w",
                "A-G1-v",
                "A-G3-ODR_low",
                "A-G3-ODR-low",
            ])
            .expect("group"),
            fields: Vec::new(),
        };
        let text = elements.render();
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let modules: Vec<&str> = lines
            .iter()
            .filter(|l| l.starts_with("pub mod ") && !l.starts_with("pub mod Register"))
            .copied()
            .collect();
        assert_eq!(
            modules,
            vec![
                "pub mod A {",
                "pub mod G1 {",
                "pub mod G2 {",
                "pub mod G1_2 {",
                "pub mod B {",
                "pub mod G1 {",
                "pub mod A_2 {",
                "pub mod G1 {",
                "pub mod G3 {",
            ]
        );
        assert!(text.contains("pub const ODR_low: &str = \"A-G3-ODR_low\";"));
        assert!(text.contains("pub const ODR_low_2: &str = \"A-G3-ODR-low\";"));
    }

    #[test]
    fn unique_ident_skips_taken_suffixes() {
        let mut used = HashSet::new();
        assert_eq!(unique_ident(&mut used, "G1_2"), "G1_2");
        assert_eq!(unique_ident(&mut used, "G1"), "G1");
        assert_eq!(unique_ident(&mut used, "G1"), "G1_3");
    }

    #[test]
    fn render_and_write() {
        let map = build_map();
        let elements = DeviceElements::from_map(&map).expect("elements");
        let text = elements.render();
        assert!(text.contains("pub mod Register {"));
        assert!(text.contains(
            "pub const CTRL_REG1: &str = \"LPS22HH-Control_Register-CTRL_REG1\";"
        ));
        assert!(text.contains("pub const ODR: &str = \"LPS22HH-Control_Register-ODR\";"));
        assert!(text.contains("pub mod AUX {"));

        let dir = tempfile::tempdir().expect("temp dir");
        let path = elements.write_to(dir.path()).expect("write");
        assert_eq!(path.file_name().unwrap(), FILE_NAME);
        assert_eq!(std::fs::read_to_string(path).unwrap(), text);
        assert!(matches!(
            elements.write_to(&dir.path().join("missing")),
            Err(SdcError::Io(_))
        ));
    }
}
