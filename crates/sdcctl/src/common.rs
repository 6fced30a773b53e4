use std::path::Path;

use anyhow::{Context, Result};
use sdc::{Session, SessionOptions, SimulatedBackend};
use serde::Serialize;
use tracing::info;

pub type SimSession = Session<SimulatedBackend>;

/// Create a simulated session from the configuration export at `path`.
pub fn open_session(path: &Path) -> Result<SimSession> {
    let session = Session::open(path, SimulatedBackend::new(), SessionOptions::default())
        .with_context(|| format!("load configuration {}", path.display()))?;
    info!(path = %path.display(), "session created");
    Ok(session)
}

/// Create and start a simulated session.
pub fn open_started_session(path: &Path) -> Result<SimSession> {
    let session = open_session(path)?;
    session.start().context("start hardware session")?;
    Ok(session)
}

/// Stop (when started) and destroy the session, reporting the first failure.
pub fn close_session(session: &SimSession) -> Result<()> {
    if session.state() == sdc::SessionState::Started {
        session.stop().context("stop hardware session")?;
    }
    session.destroy().context("destroy session")?;
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

pub fn format_hex(value: u64, size_bits: u32) -> String {
    let digits = size_bits.div_ceil(4).max(1) as usize;
    format!("0x{value:0digits$X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_padded_to_register_width() {
        assert_eq!(format_hex(0xB3, 8), "0xB3");
        assert_eq!(format_hex(0x3, 8), "0x03");
        assert_eq!(format_hex(0x10, 16), "0x0010");
        assert_eq!(format_hex(1, 1), "0x1");
        assert_eq!(format_hex(5, 0), "0x5");
    }
}
