//! In-memory engine implementing [`HardwareBackend`].
//!
//! Register and pin state live in memory, scripts run on a worker thread when
//! asynchronous, I3C common command codes are answered by a simulated target
//! and every engine action is recorded in the engine log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sdc_core::{
    bitops, CccRequest, CccType, CustomRegister, FieldEntry, HardwareBackend, InstrumentHandle,
    PinState, RegisterEntry, RegisterMap, ScriptMode, ScriptRequest, SdcError, SettingKey,
};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::script::{self, Command, CommandResult, FieldValue, ScriptLine};

/// Reset all dynamic addresses (broadcast).
pub const CCC_RSTDAA: u8 = 0x06;
/// Enter dynamic address assignment (broadcast).
pub const CCC_ENTDAA: u8 = 0x07;
/// Set dynamic address from static address (direct).
pub const CCC_SETDASA: u8 = 0x87;
/// Get provisional ID (direct).
pub const CCC_GETPID: u8 = 0x8D;
/// Get bus characteristics register (direct).
pub const CCC_GETBCR: u8 = 0x8E;
/// Get device characteristics register (direct).
pub const CCC_GETDCR: u8 = 0x8F;

const DEFAULT_PID: u64 = 0x0208_00B3_0001;
const DEFAULT_BCR: u8 = 0x07;
const DEFAULT_DCR: u8 = 0x00;
const WAIT_SLICE: Duration = Duration::from_millis(5);
const FIRST_INSTRUMENT_HANDLE: u64 = 0x1000;

#[derive(Debug, Default)]
struct SimState {
    map: Option<Arc<RegisterMap>>,
    started: bool,
    registers: HashMap<String, u64>,
    custom: HashMap<(String, String, u64), u64>,
    pins: HashMap<String, PinState>,
    interface_settings: HashMap<(String, String), String>,
    protocol_settings: HashMap<(String, String, String), String>,
    instruments: HashMap<String, InstrumentHandle>,
    dynamic_addresses: HashMap<(String, String), u8>,
    log: Vec<Vec<String>>,
}

impl SimState {
    fn record(&mut self, level: &str, message: impl Into<String>) {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("-"));
        self.log
            .push(vec![timestamp, level.to_string(), message.into()]);
    }

    fn map(&self) -> Result<Arc<RegisterMap>, SdcError> {
        self.map
            .clone()
            .ok_or_else(|| SdcError::Transport("engine session not created".into()))
    }

    fn restore_defaults(&mut self, map: &RegisterMap) {
        self.registers = map
            .registers()
            .iter()
            .map(|register| (register.uid.clone(), register.default))
            .collect();
        self.pins = map
            .pins()
            .iter()
            .map(|pin| (pin.name.clone(), pin.default))
            .collect();
        self.custom.clear();
        self.dynamic_addresses.clear();
    }

    fn seed_settings(&mut self, map: &RegisterMap) {
        self.interface_settings.clear();
        self.protocol_settings.clear();
        for interface in map.interfaces() {
            for (name, value) in &interface.settings {
                self.interface_settings
                    .insert((interface.name.clone(), name.clone()), value.clone());
            }
            for protocol in &interface.protocols {
                for (name, value) in &protocol.settings {
                    self.protocol_settings.insert(
                        (interface.name.clone(), protocol.name.clone(), name.clone()),
                        value.clone(),
                    );
                }
            }
        }
    }

    fn register_value(&self, register: &RegisterEntry) -> u64 {
        self.registers
            .get(&register.uid)
            .copied()
            .unwrap_or(register.default)
    }

    fn write_register(&mut self, register: &RegisterEntry, value: u64) {
        self.registers.insert(register.uid.clone(), value);
        self.record(
            "DEBUG",
            format!("WriteRegister {} 0x{value:X}", register.uid),
        );
    }

    fn read_field(&mut self, register: &RegisterEntry, field: &FieldEntry) -> Result<u64, SdcError> {
        let current = self.register_value(register);
        let value = bitops::extract(current, register.size_bits, field.bit_field())?;
        self.record("DEBUG", format!("ReadField {} -> 0x{value:X}", field.uid));
        Ok(value)
    }

    fn write_field(
        &mut self,
        register: &RegisterEntry,
        field: &FieldEntry,
        value: u64,
    ) -> Result<(), SdcError> {
        let current = self.register_value(register);
        let updated = bitops::insert(current, register.size_bits, field.bit_field(), value)?;
        self.registers.insert(register.uid.clone(), updated);
        self.record("DEBUG", format!("WriteField {} 0x{value:X}", field.uid));
        Ok(())
    }

    fn pin(&self, pin: &str) -> Result<PinState, SdcError> {
        self.pins
            .get(pin)
            .copied()
            .ok_or_else(|| SdcError::Transport(format!("unknown pin {pin}")))
    }

    fn write_pin(&mut self, pin: &str, state: PinState) -> Result<(), SdcError> {
        self.pin(pin)?;
        self.pins.insert(pin.to_string(), state);
        self.record("DEBUG", format!("WritePin {pin} {state}"));
        Ok(())
    }

    fn execute(&mut self, map: &RegisterMap, command: &Command) -> Result<CommandResult, SdcError> {
        let value = match command {
            Command::WriteRegister { uid, value } => {
                let register = map.register_by_name(uid)?;
                self.write_register(register, *value);
                json!(value)
            }
            Command::ReadRegister { uid } => {
                let register = map.register_by_name(uid)?;
                json!(self.register_value(register))
            }
            Command::WriteField { uid, value } => {
                let field = map.field_by_name(uid)?;
                let raw = match value {
                    FieldValue::Raw(raw) => *raw,
                    FieldValue::Definition(name) => map.resolve_field_definition(uid, name)?,
                };
                self.write_field(map.parent(field), field, raw)?;
                json!(raw)
            }
            Command::ReadField { uid } => {
                let field = map.field_by_name(uid)?;
                json!(self.read_field(map.parent(field), field)?)
            }
            Command::WritePin { pin, state } => {
                self.write_pin(pin, *state)?;
                json!(state.to_string())
            }
            Command::ReadPin { pin } => json!(self.pin(pin)?.to_string()),
            Command::Wait { millis } => json!(millis),
        };
        Ok(CommandResult::new(command, value))
    }

    fn check_endpoint(&self, interface: &str, protocol: &str) -> Result<(), SdcError> {
        let map = self.map()?;
        if map.interface(interface).is_none() {
            return Err(SdcError::Transport(format!("unknown interface {interface}")));
        }
        if map.protocol(interface, protocol).is_none() {
            return Err(SdcError::Transport(format!(
                "unknown protocol {protocol} on {interface}"
            )));
        }
        Ok(())
    }

    fn protocol_number(&self, interface: &str, protocol: &str, setting: &str, default: u64) -> u64 {
        self.protocol_settings
            .get(&(interface.to_string(), protocol.to_string(), setting.to_string()))
            .and_then(|value| sdconfig::parse_int(value).ok())
            .unwrap_or(default)
    }

    fn characteristics(&self, interface: &str, protocol: &str) -> (Vec<u8>, u8, u8) {
        let pid = self.protocol_number(interface, protocol, "ProvisionalID", DEFAULT_PID);
        let bcr = self.protocol_byte(interface, protocol, "BCR", DEFAULT_BCR);
        let dcr = self.protocol_byte(interface, protocol, "DCR", DEFAULT_DCR);
        (pid.to_be_bytes()[2..].to_vec(), bcr, dcr)
    }

    /// Single-byte setting; values wider than a byte fall back to `default`.
    fn protocol_byte(&self, interface: &str, protocol: &str, setting: &str, default: u8) -> u8 {
        let value = self.protocol_number(interface, protocol, setting, u64::from(default));
        u8::try_from(value).unwrap_or(default)
    }
}

fn lock_state(state: &Mutex<SimState>) -> Result<MutexGuard<'_, SimState>, SdcError> {
    state
        .lock()
        .map_err(|_| SdcError::Transport("engine state lock poisoned".into()))
}

fn check_dynamic_address(address: u8) -> Result<(), SdcError> {
    if address > 0x7F {
        return Err(SdcError::Transport(format!(
            "dynamic address 0x{address:02X} exceeds 7 bits"
        )));
    }
    Ok(())
}

fn check_ccc_range(request: &CccRequest) -> Result<(), SdcError> {
    let id = request.command_id();
    let valid = match request.ccc_type() {
        CccType::Broadcast => id <= 0x7F,
        CccType::Direct => (0x80..=0xFE).contains(&id),
    };
    if !valid {
        return Err(SdcError::Transport(format!(
            "CCC 0x{id:02X} is not a {:?} command",
            request.ccc_type()
        )));
    }
    Ok(())
}

fn sized(mut data: Vec<u8>, len: Option<usize>) -> Vec<u8> {
    if let Some(len) = len {
        data.resize(len, 0);
    }
    data
}

/// Run parsed script lines, checking `abort` between commands and while waiting.
fn run_script(
    state: &Mutex<SimState>,
    map: &RegisterMap,
    lines: &[ScriptLine],
    abort: &AtomicBool,
    label: &str,
) -> Result<Vec<String>, SdcError> {
    let mut results = Vec::with_capacity(lines.len());
    for ScriptLine { line, command } in lines {
        if abort.load(Ordering::SeqCst) {
            lock_state(state)?.record("WARN", format!("script {label} aborted at line {line}"));
            return Ok(results);
        }
        let result = match command {
            Command::Wait { millis } => {
                let deadline = Instant::now() + Duration::from_millis(*millis);
                while Instant::now() < deadline && !abort.load(Ordering::SeqCst) {
                    thread::sleep(WAIT_SLICE.min(deadline.saturating_duration_since(Instant::now())));
                }
                CommandResult::new(command, json!(millis))
            }
            _ => lock_state(state)?
                .execute(map, command)
                .map_err(|err| SdcError::Transport(format!("script {label} line {line}: {err}")))?,
        };
        results.push(result.to_json()?);
    }
    lock_state(state)?.record(
        "INFO",
        format!("script {label} completed ({} commands)", results.len()),
    );
    Ok(results)
}

/// Simulated Semi Device Control engine.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimState>>,
    abort: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>, SdcError> {
        lock_state(&self.state)
    }

    /// Join a finished worker so its slot can be reused.
    fn reap(&mut self) -> Result<(), SdcError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| SdcError::Transport("script worker panicked".into()))?;
        }
        Ok(())
    }

    fn stop_worker(&mut self) -> Result<(), SdcError> {
        if let Some(worker) = self.worker.take() {
            self.abort.store(true, Ordering::SeqCst);
            let joined = worker.join();
            self.abort.store(false, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
            joined.map_err(|_| SdcError::Transport("script worker panicked".into()))?;
        }
        Ok(())
    }
}

impl HardwareBackend for SimulatedBackend {
    fn create(&mut self, map: Arc<RegisterMap>) -> Result<(), SdcError> {
        let mut state = self.state()?;
        state.restore_defaults(&map);
        state.seed_settings(&map);
        state.record("INFO", format!("created session for device {}", map.name()));
        info!(device = %map.name(), "simulated engine created");
        state.map = Some(map);
        Ok(())
    }

    fn start(&mut self) -> Result<(), SdcError> {
        let mut state = self.state()?;
        state.map()?;
        state.started = true;
        state.record("INFO", "hardware session started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SdcError> {
        self.stop_worker()?;
        let mut state = self.state()?;
        state.started = false;
        state.instruments.clear();
        state.record("INFO", "hardware session stopped");
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), SdcError> {
        self.stop_worker()?;
        let mut state = self.state()?;
        let log = std::mem::take(&mut state.log);
        *state = SimState {
            log,
            ..SimState::default()
        };
        state.record("INFO", "session destroyed");
        Ok(())
    }

    fn read_register(&mut self, register: &RegisterEntry) -> Result<u64, SdcError> {
        let mut state = self.state()?;
        let value = state.register_value(register);
        state.record(
            "DEBUG",
            format!("ReadRegister {} -> 0x{value:X}", register.uid),
        );
        Ok(value)
    }

    fn write_register(&mut self, register: &RegisterEntry, value: u64) -> Result<(), SdcError> {
        self.state()?.write_register(register, value);
        Ok(())
    }

    fn read_field(&mut self, register: &RegisterEntry, field: &FieldEntry) -> Result<u64, SdcError> {
        self.state()?.read_field(register, field)
    }

    fn write_field(
        &mut self,
        register: &RegisterEntry,
        field: &FieldEntry,
        value: u64,
    ) -> Result<(), SdcError> {
        self.state()?.write_field(register, field, value)
    }

    fn read_custom_register(&mut self, register: &CustomRegister) -> Result<u64, SdcError> {
        let mut state = self.state()?;
        state.check_endpoint(&register.interface, &register.protocol)?;
        let key = (
            register.interface.clone(),
            register.protocol.clone(),
            register.address,
        );
        let value = state.custom.get(&key).copied().unwrap_or(0) & bitops::mask(register.register_size);
        state.record(
            "DEBUG",
            format!(
                "ReadCustomRegister {}/{} 0x{:X} -> 0x{value:X}",
                register.interface, register.protocol, register.address
            ),
        );
        Ok(value)
    }

    fn write_custom_register(
        &mut self,
        register: &CustomRegister,
        value: u64,
    ) -> Result<(), SdcError> {
        let mut state = self.state()?;
        state.check_endpoint(&register.interface, &register.protocol)?;
        state.custom.insert(
            (
                register.interface.clone(),
                register.protocol.clone(),
                register.address,
            ),
            value,
        );
        state.record(
            "DEBUG",
            format!(
                "WriteCustomRegister {}/{} 0x{:X} 0x{value:X}",
                register.interface, register.protocol, register.address
            ),
        );
        Ok(())
    }

    fn read_pin_state(&mut self, pin: &str) -> Result<PinState, SdcError> {
        let mut state = self.state()?;
        let value = state.pin(pin)?;
        state.record("DEBUG", format!("ReadPin {pin} -> {value}"));
        Ok(value)
    }

    fn write_pin_state(&mut self, pin: &str, value: PinState) -> Result<(), SdcError> {
        self.state()?.write_pin(pin, value)
    }

    fn execute_script(&mut self, request: &ScriptRequest) -> Result<Vec<String>, SdcError> {
        self.reap()?;
        if self.running.load(Ordering::SeqCst) {
            return Err(SdcError::ScriptAlreadyRunning);
        }
        let map = self.state()?.map()?;
        let lines = script::parse(&request.text)?;
        script::check(&map, &lines)?;
        let label = request
            .name
            .clone()
            .unwrap_or_else(|| String::from("<command>"));
        self.state()?.record(
            "INFO",
            format!("script {label} started ({:?})", request.mode),
        );
        debug!(script = %label, commands = lines.len(), mode = ?request.mode, "running script");

        match request.mode {
            ScriptMode::Blocking => {
                self.running.store(true, Ordering::SeqCst);
                let outcome = run_script(&self.state, &map, &lines, &self.abort, &label);
                self.running.store(false, Ordering::SeqCst);
                self.abort.store(false, Ordering::SeqCst);
                outcome
            }
            ScriptMode::Asynchronous => {
                self.running.store(true, Ordering::SeqCst);
                let state = Arc::clone(&self.state);
                let abort = Arc::clone(&self.abort);
                let running = Arc::clone(&self.running);
                let worker = thread::Builder::new()
                    .name(format!("sdc-script-{label}"))
                    .spawn(move || {
                        if let Err(err) = run_script(&state, &map, &lines, &abort, &label) {
                            warn!(script = %label, error = %err, "script failed");
                            if let Ok(mut state) = lock_state(&state) {
                                state.record("ERROR", err.to_string());
                            }
                        }
                        running.store(false, Ordering::SeqCst);
                    });
                match worker {
                    Ok(worker) => {
                        self.worker = Some(worker);
                        Ok(Vec::new())
                    }
                    Err(err) => {
                        self.running.store(false, Ordering::SeqCst);
                        Err(SdcError::Transport(format!("spawn script worker: {err}")))
                    }
                }
            }
        }
    }

    fn abort_script(&mut self) -> Result<(), SdcError> {
        let was_running = self.running.load(Ordering::SeqCst);
        self.stop_worker()?;
        if was_running {
            self.state()?.record("WARN", "script aborted");
        }
        Ok(())
    }

    fn validate_script(&self, text: &str) -> bool {
        let Ok(lines) = script::parse(text) else {
            return false;
        };
        match self.state().and_then(|state| state.map()) {
            Ok(map) => script::check(&map, &lines).is_ok(),
            Err(_) => false,
        }
    }

    fn setting(&mut self, key: &SettingKey) -> Result<String, SdcError> {
        let state = self.state()?;
        let value = match key {
            SettingKey::Interface { interface, setting } => {
                if state.map()?.interface(interface).is_none() {
                    return Err(SdcError::Transport(format!("unknown interface {interface}")));
                }
                state
                    .interface_settings
                    .get(&(interface.clone(), setting.clone()))
                    .cloned()
            }
            SettingKey::Protocol {
                interface,
                protocol,
                setting,
            } => {
                state.check_endpoint(interface, protocol)?;
                state
                    .protocol_settings
                    .get(&(interface.clone(), protocol.clone(), setting.clone()))
                    .cloned()
            }
        };
        value.ok_or_else(|| SdcError::Transport(format!("unknown setting {key}")))
    }

    fn set_setting(&mut self, key: &SettingKey, value: &str) -> Result<(), SdcError> {
        let mut state = self.state()?;
        match key {
            SettingKey::Interface { interface, setting } => {
                if state.map()?.interface(interface).is_none() {
                    return Err(SdcError::Transport(format!("unknown interface {interface}")));
                }
                state
                    .interface_settings
                    .insert((interface.clone(), setting.clone()), value.to_string());
            }
            SettingKey::Protocol {
                interface,
                protocol,
                setting,
            } => {
                state.check_endpoint(interface, protocol)?;
                state.protocol_settings.insert(
                    (interface.clone(), protocol.clone(), setting.clone()),
                    value.to_string(),
                );
            }
        }
        state.record("INFO", format!("setting {key} = {value}"));
        Ok(())
    }

    fn logs(&mut self) -> Result<Vec<Vec<String>>, SdcError> {
        Ok(self.state()?.log.clone())
    }

    fn reset_to_default_state(&mut self) -> Result<(), SdcError> {
        let mut state = self.state()?;
        let map = state.map()?;
        state.restore_defaults(&map);
        state.record("INFO", "device reset to default state");
        Ok(())
    }

    fn instrument_session(&mut self, interface: &str) -> Result<InstrumentHandle, SdcError> {
        let mut state = self.state()?;
        if !state.started {
            return Err(SdcError::Transport("hardware session not started".into()));
        }
        if state.map()?.interface(interface).is_none() {
            return Err(SdcError::Transport(format!("unknown interface {interface}")));
        }
        if let Some(handle) = state.instruments.get(interface) {
            return Ok(*handle);
        }
        let handle = InstrumentHandle(FIRST_INSTRUMENT_HANDLE + state.instruments.len() as u64);
        state.instruments.insert(interface.to_string(), handle);
        state.record("INFO", format!("instrument session {handle} for {interface}"));
        Ok(handle)
    }

    fn execute_ccc(
        &mut self,
        interface: &str,
        protocol: &str,
        request: &CccRequest,
    ) -> Result<Vec<u8>, SdcError> {
        let mut state = self.state()?;
        state.check_endpoint(interface, protocol)?;
        check_ccc_range(request)?;
        let target = (interface.to_string(), protocol.to_string());
        let id = request.command_id();

        let response = match request {
            CccRequest::DynamicAddressing {
                dynamic_address,
                with_read,
                ..
            } => match id {
                CCC_SETDASA => {
                    let address = dynamic_address.ok_or_else(|| {
                        SdcError::Transport("SETDASA requires a dynamic address".into())
                    })?;
                    check_dynamic_address(address)?;
                    state.dynamic_addresses.insert(target, address);
                    Vec::new()
                }
                CCC_RSTDAA => {
                    state.dynamic_addresses.remove(&target);
                    Vec::new()
                }
                CCC_ENTDAA => {
                    if let Some(address) = *dynamic_address {
                        check_dynamic_address(address)?;
                        state.dynamic_addresses.insert(target, address);
                    }
                    if *with_read {
                        let (mut data, bcr, dcr) = state.characteristics(interface, protocol);
                        data.extend([bcr, dcr]);
                        data
                    } else {
                        Vec::new()
                    }
                }
                _ => Vec::new(),
            },
            CccRequest::SdrWrite { data, .. } => {
                ensure_addressed(&state, &target, request)?;
                state.record(
                    "DEBUG",
                    format!("CCC 0x{id:02X} wrote {} bytes", data.len()),
                );
                Vec::new()
            }
            CccRequest::SdrRead { read_len, .. } => {
                ensure_addressed(&state, &target, request)?;
                let (pid, bcr, dcr) = state.characteristics(interface, protocol);
                match id {
                    CCC_GETPID => sized(pid, *read_len),
                    CCC_GETBCR => sized(vec![bcr], *read_len),
                    CCC_GETDCR => sized(vec![dcr], *read_len),
                    _ => vec![0; read_len.unwrap_or(0)],
                }
            }
        };
        state.record(
            "INFO",
            format!(
                "CCC 0x{id:02X} ({:?}) on {interface}/{protocol} -> {} bytes",
                request.ccc_type(),
                response.len()
            ),
        );
        Ok(response)
    }
}

/// Direct SDR commands need a target with an assigned dynamic address.
fn ensure_addressed(
    state: &SimState,
    target: &(String, String),
    request: &CccRequest,
) -> Result<(), SdcError> {
    if request.ccc_type() == CccType::Direct && !state.dynamic_addresses.contains_key(target) {
        return Err(SdcError::Transport(format!(
            "CCC 0x{:02X} not acknowledged: no dynamic address assigned",
            request.command_id()
        )));
    }
    Ok(())
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        if let Err(err) = self.stop_worker() {
            warn!(error = %err, "failed to stop script worker");
        }
    }
}
