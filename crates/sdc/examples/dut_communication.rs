use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use sdc::{PinState, Session, SessionOptions, SimulatedBackend};
use tracing::info;

const THS_P_H: &str = "LPS22HH-Control_Register-THS_P_H";

fn config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("conf/lps22hh.sdconfig")
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let session = Session::open(
        config_path(),
        SimulatedBackend::new(),
        SessionOptions::default(),
    )?;
    session.start()?;

    let outcome = run(&session);

    session.stop()?;
    session.destroy()?;
    outcome
}

fn run(session: &Session<SimulatedBackend>) -> Result<(), Box<dyn Error>> {
    let handle = session.instrument_session("NI 657x")?;
    info!(%handle, "attached to instrument session");

    for pin in ["Vdd", "Vdd_IO", "CS"] {
        session.write_pin_state(pin, PinState::High)?;
    }
    session.write_pin_state("SDO", PinState::Low)?;
    thread::sleep(Duration::from_millis(50));

    let device = session.device();
    for value in 0..25 {
        device.write_register_by_name(THS_P_H, value)?;
        let read = device.read_register_by_name(THS_P_H)?;
        println!("0x{read:x}");
        thread::sleep(Duration::from_millis(20));
    }

    session.write_pin_state("Vdd_IO", PinState::Low)?;
    session.write_pin_state("Vdd", PinState::Low)?;
    Ok(())
}
