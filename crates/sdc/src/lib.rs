#![cfg_attr(docsrs, feature(doc_cfg))]
//! Semi Device Control facade: a session over a device configuration export
//! with direct device access, a write-behind cache, pins, scripts and I3C
//! common command codes.
//!
//! ```rust,no_run
//! use sdc::{PinState, SdcError, Session, SessionOptions, SimulatedBackend};
//!
//! # fn run() -> Result<(), SdcError> {
//! let session = Session::open(
//!     "lps22hh.sdconfig",
//!     SimulatedBackend::new(),
//!     SessionOptions::default(),
//! )?;
//! session.start()?;
//! session.write_pin_state("Vdd", PinState::High)?;
//! session
//!     .device()
//!     .write_register_by_name("LPS22HH-Control_Register-THS_P_H", 10)?;
//! let value = session
//!     .device()
//!     .read_register_by_name("LPS22HH-Control_Register-THS_P_H")?;
//! println!("THS_P_H = {value}");
//! session.stop()?;
//! session.destroy()?;
//! # Ok(())
//! # }
//! ```
//!
//! Writes staged in the cache reach the device only on flush, in first-write
//! order by default:
//!
//! ```rust,no_run
//! # fn staged(session: &sdc::Session<sdc::SimulatedBackend>) -> Result<(), sdc::SdcError> {
//! let cache = session.cache();
//! cache.write_register_by_name("LPS22HH-Control_Register-CTRL_REG1", 0x02)?;
//! cache.write_field_by_value_definition("LPS22HH-Control_Register-ODR", "10Hz")?;
//! let applied = cache.flush_to_device()?;
//! println!("flushed {applied} entries");
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,no_run
//! # fn ccc(session: &sdc::Session<sdc::SimulatedBackend>) -> Result<(), sdc::SdcError> {
//! use sdc::{CccType, I3cSession};
//! let i3c = I3cSession::new(session, "NI 657x", "I3C")?;
//! i3c.execute_dynamic_addressing_ccc(CccType::Direct, 0x87, Some(0x25))?;
//! let pid = i3c.execute_sdr_ccc_read(CccType::Direct, 0x8D, None, None)?;
//! println!("PID {pid:02X?}");
//! # Ok(())
//! # }
//! ```

pub use sdc_core as core;
pub use sdconfig as config;

pub mod cache;
pub mod device;
pub mod i3c;
pub mod script;
pub mod session;
pub mod sim;

#[cfg(test)]
mod testing;

pub use cache::Cache;
pub use device::Device;
pub use i3c::I3cSession;
pub use session::{Session, SessionOptions};
pub use sim::SimulatedBackend;

pub use sdc_core::{
    AccessMode, CacheKey, CccRequest, CccType, CustomRegister, FieldDefinitionDetails,
    HardwareBackend, InstrumentHandle, OrderPolicy, PinState, RegisterMap, ScriptMode,
    SdcError, SessionState, SettingKey,
};
