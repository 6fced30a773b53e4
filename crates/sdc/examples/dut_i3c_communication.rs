use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use sdc::sim::{CCC_GETPID, CCC_RSTDAA, CCC_SETDASA};
use sdc::{CccType, I3cSession, PinState, Session, SessionOptions, SimulatedBackend};

const THS_P_H: &str = "LPS22HH-Control_Register-THS_P_H";
const DYNAMIC_ADDRESS: u8 = 0x25;

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
    let i3c = I3cSession::new(session, "NI 657x", "I3C")?;

    session.write_pin_state("Vdd", PinState::High)?;
    session.write_pin_state("Vdd_IO", PinState::High)?;
    session.write_pin_state("CS", PinState::High)?;
    session.write_pin_state("SDO", PinState::Low)?;
    thread::sleep(Duration::from_millis(50));

    // Static addressing (I2C mode) before the target gets a dynamic address.
    let device = session.device();
    device.write_register_by_name(THS_P_H, 10)?;
    println!("0x{:x}", device.read_register_by_name(THS_P_H)?);

    i3c.execute_dynamic_addressing_ccc(CccType::Direct, CCC_SETDASA, Some(DYNAMIC_ADDRESS))?;
    let pid = i3c.execute_sdr_ccc_read(CccType::Direct, CCC_GETPID, None, None)?;
    println!("The device PID value is {pid:02X?}");

    device.write_register_by_name(THS_P_H, 15)?;
    println!("0x{:x}", device.read_register_by_name(THS_P_H)?);

    i3c.execute_dynamic_addressing_ccc(CccType::Broadcast, CCC_RSTDAA, None)?;

    session.write_pin_state("Vdd_IO", PinState::Low)?;
    session.write_pin_state("Vdd", PinState::Low)?;
    session.write_pin_state("CS", PinState::Low)?;
    Ok(())
}
