use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sdcctl::cmd_elements;
use sdcctl::cmd_field;
use sdcctl::cmd_get;
use sdcctl::cmd_list;
use sdcctl::cmd_script::{self, ScriptSource};
use sdcctl::cmd_set;

#[derive(Parser, Debug)]
#[command(name = "sdcctl", version, about = "Semi Device Control CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    /// Device configuration export (.sdconfig)
    #[arg(long, short = 'c', env = "SDC_CONFIG")]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List registers with address, width and access
    Registers,
    /// Show the value definitions of a field
    Field {
        #[arg(long)]
        name: String,
    },
    /// List hardware interfaces and their protocols
    Interfaces,
    /// List scripts bundled with the configuration
    Scripts,
    /// Generate the device elements listing
    Elements {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Read a register or field by UID
    Get {
        #[arg(long)]
        name: String,
    },
    /// Write a register or field by UID and read it back
    Set {
        #[arg(long)]
        name: String,
        /// Integer value, or a value definition name for fields
        #[arg(long)]
        value: String,
    },
    /// Run a bundled script or inline script text
    Script {
        #[arg(long, conflicts_with = "command")]
        name: Option<String>,
        #[arg(long)]
        command: Option<String>,
    },
}

fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        config,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cmd {
        Cmd::Registers => cmd_list::registers(&config, json)?,
        Cmd::Field { name } => cmd_field::run(&config, &name, json)?,
        Cmd::Interfaces => cmd_list::interfaces(&config, json)?,
        Cmd::Scripts => cmd_list::scripts(&config, json)?,
        Cmd::Elements { dir } => cmd_elements::run(&config, dir, json)?,
        Cmd::Get { name } => cmd_get::run(&config, &name, json)?,
        Cmd::Set { name, value } => cmd_set::run(&config, &name, &value, json)?,
        Cmd::Script { name, command } => {
            let source = match (name, command) {
                (Some(name), None) => ScriptSource::Named(name),
                (None, Some(text)) => ScriptSource::Inline(text.replace(';', "\n")),
                _ => bail!("specify either --name or --command"),
            };
            cmd_script::run(&config, source, json)?
        }
    };

    Ok(())
}
