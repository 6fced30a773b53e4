use std::path::Path;

use anyhow::{Context, Result};
use sdc::script::CommandResult;
use sdc::ScriptMode;
use tracing::info;

use crate::common;

/// Where the script text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Named(String),
    Inline(String),
}

pub fn run(config: &Path, source: ScriptSource, json: bool) -> Result<()> {
    let session = common::open_started_session(config)?;
    let outcome = match &source {
        ScriptSource::Named(name) => {
            info!(script = %name, "running script");
            session
                .execute_script(name, ScriptMode::Blocking)
                .with_context(|| format!("run script {name}"))
        }
        ScriptSource::Inline(text) => session
            .execute_script_command(text, ScriptMode::Blocking)
            .context("run script command"),
    };
    common::close_session(&session)?;
    let results = outcome?;

    let decoded = results
        .iter()
        .map(|line| serde_json::from_str::<CommandResult>(line).context("decode script result"))
        .collect::<Result<Vec<_>>>()?;
    if json {
        return common::print_json(&decoded);
    }
    for result in &decoded {
        println!("{:<14} {:<48} {}", result.command, result.target, result.value);
    }
    Ok(())
}
