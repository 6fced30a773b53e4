use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct Generated {
    path: String,
}

pub fn run(config: &Path, dir: Option<PathBuf>, json: bool) -> Result<()> {
    let session = common::open_session(config)?;
    let path = session
        .generate_device_elements(dir.as_deref())
        .context("generate device elements")?;
    common::close_session(&session)?;

    if json {
        common::print_json(&Generated {
            path: path.display().to_string(),
        })
    } else {
        println!("{}", path.display());
        Ok(())
    }
}
