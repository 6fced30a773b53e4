//! Line-oriented script language executed by the simulated engine.
//!
//! One command per line, keywords are case-insensitive and `#` starts a
//! comment:
//!
//! ```text
//! WriteRegister <uid> <value>
//! ReadRegister  <uid>
//! WriteField    <uid> <value|definition>
//! ReadField     <uid>
//! WritePin      <pin> <Low|High|Terminate|0|1|2>
//! ReadPin       <pin>
//! Wait          <milliseconds>
//! ```

use sdc_core::{PinState, RegisterMap, SdcError};
use serde::{Deserialize, Serialize};

/// Value operand of `WriteField`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Raw(u64),
    Definition(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    WriteRegister { uid: String, value: u64 },
    ReadRegister { uid: String },
    WriteField { uid: String, value: FieldValue },
    ReadField { uid: String },
    WritePin { pin: String, state: PinState },
    ReadPin { pin: String },
    Wait { millis: u64 },
}

impl Command {
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::WriteRegister { .. } => "WriteRegister",
            Command::ReadRegister { .. } => "ReadRegister",
            Command::WriteField { .. } => "WriteField",
            Command::ReadField { .. } => "ReadField",
            Command::WritePin { .. } => "WritePin",
            Command::ReadPin { .. } => "ReadPin",
            Command::Wait { .. } => "Wait",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Command::WriteRegister { uid, .. }
            | Command::ReadRegister { uid }
            | Command::WriteField { uid, .. }
            | Command::ReadField { uid } => uid,
            Command::WritePin { pin, .. } | Command::ReadPin { pin } => pin,
            Command::Wait { .. } => "",
        }
    }
}

/// Parsed command together with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub command: Command,
}

/// Outcome of one executed command, reported as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub target: String,
    pub value: serde_json::Value,
}

impl CommandResult {
    pub fn new(command: &Command, value: serde_json::Value) -> Self {
        Self {
            command: command.keyword().to_string(),
            target: command.target().to_string(),
            value,
        }
    }

    pub fn to_json(&self) -> Result<String, SdcError> {
        serde_json::to_string(self)
            .map_err(|err| SdcError::Transport(format!("encode script result: {err}")))
    }
}

fn syntax_error(line: usize, message: impl std::fmt::Display) -> SdcError {
    SdcError::Transport(format!("script line {line}: {message}"))
}

fn number(line: usize, text: &str) -> Result<u64, SdcError> {
    sdconfig::parse_int(text).map_err(|err| syntax_error(line, err))
}

/// Parse script text; syntax errors carry the offending line number.
pub fn parse(text: &str) -> Result<Vec<ScriptLine>, SdcError> {
    let mut lines = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let code = raw.find('#').map_or(raw, |pos| &raw[..pos]).trim();
        if code.is_empty() {
            continue;
        }
        let words: Vec<&str> = code.split_whitespace().collect();
        let (keyword, args) = (words[0].to_ascii_lowercase(), &words[1..]);
        let command = match (keyword.as_str(), args) {
            ("writeregister", [uid, value]) => Command::WriteRegister {
                uid: uid.to_string(),
                value: number(line, value)?,
            },
            ("readregister", [uid]) => Command::ReadRegister {
                uid: uid.to_string(),
            },
            ("writefield", [uid, value]) => Command::WriteField {
                uid: uid.to_string(),
                value: match sdconfig::parse_int(value) {
                    Ok(raw) => FieldValue::Raw(raw),
                    Err(_) => FieldValue::Definition(value.to_string()),
                },
            },
            ("readfield", [uid]) => Command::ReadField {
                uid: uid.to_string(),
            },
            ("writepin", [pin, state]) => Command::WritePin {
                pin: pin.to_string(),
                state: PinState::parse(state)
                    .ok_or_else(|| syntax_error(line, format!("invalid pin state '{state}'")))?,
            },
            ("readpin", [pin]) => Command::ReadPin {
                pin: pin.to_string(),
            },
            ("wait", [millis]) => Command::Wait {
                millis: number(line, millis)?,
            },
            _ => return Err(syntax_error(line, format!("cannot parse '{code}'"))),
        };
        lines.push(ScriptLine { line, command });
    }
    Ok(lines)
}

/// Check every reference of a parsed script against the register map.
pub fn check(map: &RegisterMap, lines: &[ScriptLine]) -> Result<(), SdcError> {
    for ScriptLine { line, command } in lines {
        let outcome = match command {
            Command::WriteRegister { uid, value } => map.register_by_name(uid).and_then(|r| {
                r.ensure_writable()?;
                r.check_value(*value)
            }),
            Command::ReadRegister { uid } => {
                map.register_by_name(uid).and_then(|r| r.ensure_readable())
            }
            Command::WriteField { uid, value } => map.field_by_name(uid).and_then(|field| {
                map.parent(field).ensure_writable()?;
                match value {
                    FieldValue::Raw(raw) => field.check_value(*raw),
                    FieldValue::Definition(name) => {
                        map.resolve_field_definition(uid, name).map(|_| ())
                    }
                }
            }),
            Command::ReadField { uid } => map
                .field_by_name(uid)
                .and_then(|field| map.parent(field).ensure_readable()),
            Command::WritePin { pin, .. } | Command::ReadPin { pin } => match map.pin(pin) {
                Some(_) => Ok(()),
                None => Err(SdcError::UnknownIdentifier(pin.clone())),
            },
            Command::Wait { .. } => Ok(()),
        };
        outcome.map_err(|err| syntax_error(*line, err))?;
    }
    Ok(())
}
