use std::env;
use std::error::Error;
use std::path::PathBuf;

use sdc::{Session, SessionOptions, SimulatedBackend};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let config = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("conf/lps22hh.sdconfig");
    let out_dir = env::args().nth(1).map(PathBuf::from);

    let session = Session::open(config, SimulatedBackend::new(), SessionOptions::default())?;
    let path = session.generate_device_elements(out_dir.as_deref())?;
    println!("The generated file is located at {}", path.display());
    session.destroy()?;
    Ok(())
}
