//! Session lifecycle manager owning the register map, the write-behind cache
//! and the hardware backend.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use sdc_core::{
    CccRequest, DeviceElements, FieldDefinitionDetails, FieldEntry, HardwareBackend,
    InstrumentHandle, OrderPolicy, PinState, RegisterEntry, RegisterMap, ScriptMode,
    ScriptRequest, SdcError, SessionState, SettingKey, Transition, WriteBehindCache,
};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::device::Device;

/// Explicit per-session configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Flush ordering of re-written cache keys.
    pub cache_order: OrderPolicy,
}

pub(crate) struct Inner<B> {
    pub(crate) state: SessionState,
    pub(crate) map: Option<Arc<RegisterMap>>,
    pub(crate) cache: WriteBehindCache,
    pub(crate) backend: B,
}

/// Semi Device Control session.
///
/// Every operation takes the session lock for its whole duration, so a flush
/// or a blocking script is applied as one unit and concurrent callers queue.
pub struct Session<B: HardwareBackend> {
    inner: Mutex<Inner<B>>,
}

impl<B: HardwareBackend> Session<B> {
    /// Wrap a backend in an uninitialized session.
    pub fn new(backend: B, options: SessionOptions) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                map: None,
                cache: WriteBehindCache::new(options.cache_order),
                backend,
            }),
        }
    }

    /// Construct a session and create it from the configuration export at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        backend: B,
        options: SessionOptions,
    ) -> Result<Self, SdcError> {
        let session = Self::new(backend, options);
        session.create(path)?;
        Ok(session)
    }

    /// Load the configuration export and open the hardware session.
    pub fn create(&self, path: impl AsRef<Path>) -> Result<(), SdcError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "creating session");
        self.create_with(|| RegisterMap::load(path))
    }

    pub fn create_from_str(&self, xml: &str) -> Result<(), SdcError> {
        self.create_with(|| RegisterMap::from_xml(xml))
    }

    pub fn create_from_map(&self, map: RegisterMap) -> Result<(), SdcError> {
        self.create_with(|| Ok(map))
    }

    fn create_with(
        &self,
        load: impl FnOnce() -> Result<RegisterMap, SdcError>,
    ) -> Result<(), SdcError> {
        let mut inner = self.lock()?;
        let next = inner.state.apply(Transition::Create)?;
        let map = Arc::new(load()?);
        inner.backend.create(Arc::clone(&map))?;
        info!(
            device = %map.name(),
            registers = map.registers().len(),
            fields = map.fields().len(),
            "session created"
        );
        inner.map = Some(map);
        inner.state = next;
        Ok(())
    }

    /// Start the hardware session.
    pub fn start(&self) -> Result<(), SdcError> {
        self.transition(Transition::Start)
    }

    /// Stop the hardware session; it may be started again.
    pub fn stop(&self) -> Result<(), SdcError> {
        self.transition(Transition::Stop)
    }

    /// Release the hardware session. Staged cache entries are discarded.
    pub fn destroy(&self) -> Result<(), SdcError> {
        self.transition(Transition::Destroy)
    }

    fn transition(&self, transition: Transition) -> Result<(), SdcError> {
        let mut inner = self.lock()?;
        let next = inner.state.apply(transition)?;
        match transition {
            Transition::Start => inner.backend.start()?,
            Transition::Stop => inner.backend.stop()?,
            Transition::Destroy => {
                inner.backend.destroy()?;
                inner.cache.clear();
            }
            Transition::Create => {}
        }
        info!(
            transition = transition.name(),
            from = %inner.state,
            to = %next,
            "session state changed"
        );
        inner.state = next;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match self.inner.lock() {
            Ok(inner) => inner.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    /// Loaded register map.
    pub fn register_map(&self) -> Result<Arc<RegisterMap>, SdcError> {
        let inner = self.lock()?;
        inner.state.ensure_loaded("register_map")?;
        loaded(&inner, "register_map")
    }

    /// Operations applied directly to the device.
    pub fn device(&self) -> Device<'_, B> {
        Device::new(self)
    }

    /// Operations against the write-behind cache.
    pub fn cache(&self) -> Cache<'_, B> {
        Cache::new(self)
    }

    pub fn read_pin_state(&self, pin: &str) -> Result<PinState, SdcError> {
        self.with_started("read_pin_state", |inner, map| {
            ensure_pin(map, pin)?;
            let state = inner.backend.read_pin_state(pin)?;
            debug!(pin, %state, "read pin state");
            Ok(state)
        })
    }

    pub fn write_pin_state(&self, pin: &str, state: PinState) -> Result<(), SdcError> {
        self.with_started("write_pin_state", |inner, map| {
            ensure_pin(map, pin)?;
            debug!(pin, %state, "write pin state");
            inner.backend.write_pin_state(pin, state)
        })
    }

    /// Run a script bundled with the configuration.
    ///
    /// Blocking runs return one JSON string per executed command; asynchronous
    /// runs return immediately with no results.
    pub fn execute_script(&self, name: &str, mode: ScriptMode) -> Result<Vec<String>, SdcError> {
        self.with_started("execute_script", |inner, map| {
            let script = map
                .script(name)
                .ok_or_else(|| SdcError::UnknownScript(name.to_string()))?;
            debug!(script = name, ?mode, "execute script");
            inner.backend.execute_script(&ScriptRequest {
                name: Some(name.to_string()),
                text: script.content.clone(),
                mode,
            })
        })
    }

    /// Run ad-hoc script text.
    pub fn execute_script_command(
        &self,
        text: &str,
        mode: ScriptMode,
    ) -> Result<Vec<String>, SdcError> {
        self.with_started("execute_script_command", |inner, _| {
            debug!(?mode, lines = text.lines().count(), "execute script command");
            inner.backend.execute_script(&ScriptRequest {
                name: None,
                text: text.to_string(),
                mode,
            })
        })
    }

    pub fn abort_script(&self) -> Result<(), SdcError> {
        self.with_started("abort_script", |inner, _| inner.backend.abort_script())
    }

    pub fn script_names(&self) -> Result<Vec<String>, SdcError> {
        self.with_loaded("script_names", |_, map| {
            Ok(map.scripts().iter().map(|s| s.name.clone()).collect())
        })
    }

    /// Script content and whether the engine accepts it.
    pub fn script_string(&self, name: &str) -> Result<(bool, String), SdcError> {
        self.with_loaded("script_string", |inner, map| {
            let script = map
                .script(name)
                .ok_or_else(|| SdcError::UnknownScript(name.to_string()))?;
            let valid = inner.backend.validate_script(&script.content);
            Ok((valid, script.content.clone()))
        })
    }

    pub fn interface_setting(&self, interface: &str, setting: &str) -> Result<String, SdcError> {
        let key = SettingKey::Interface {
            interface: interface.to_string(),
            setting: setting.to_string(),
        };
        self.with_started("interface_setting", |inner, _| inner.backend.setting(&key))
    }

    pub fn set_interface_setting(
        &self,
        interface: &str,
        setting: &str,
        value: &str,
    ) -> Result<(), SdcError> {
        let key = SettingKey::Interface {
            interface: interface.to_string(),
            setting: setting.to_string(),
        };
        self.with_started("set_interface_setting", |inner, _| {
            debug!(%key, value, "set interface setting");
            inner.backend.set_setting(&key, value)
        })
    }

    pub fn protocol_setting(
        &self,
        interface: &str,
        protocol: &str,
        setting: &str,
    ) -> Result<String, SdcError> {
        let key = SettingKey::Protocol {
            interface: interface.to_string(),
            protocol: protocol.to_string(),
            setting: setting.to_string(),
        };
        self.with_started("protocol_setting", |inner, _| inner.backend.setting(&key))
    }

    pub fn set_protocol_setting(
        &self,
        interface: &str,
        protocol: &str,
        setting: &str,
        value: &str,
    ) -> Result<(), SdcError> {
        let key = SettingKey::Protocol {
            interface: interface.to_string(),
            protocol: protocol.to_string(),
            setting: setting.to_string(),
        };
        self.with_started("set_protocol_setting", |inner, _| {
            debug!(%key, value, "set protocol setting");
            inner.backend.set_setting(&key, value)
        })
    }

    /// Engine log rows `[timestamp, level, message]`.
    pub fn logs(&self) -> Result<Vec<Vec<String>>, SdcError> {
        self.with_started("logs", |inner, _| inner.backend.logs())
    }

    pub fn reset_to_default_state(&self) -> Result<(), SdcError> {
        self.with_started("reset_to_default_state", |inner, _| {
            info!("resetting device to default state");
            inner.backend.reset_to_default_state()
        })
    }

    /// Register identifiers and addresses in declaration order.
    pub fn register_addresses(&self) -> Result<(Vec<String>, Vec<u64>), SdcError> {
        self.with_loaded("register_addresses", |_, map| Ok(map.register_addresses()))
    }

    pub fn field_definition_details(&self, uid: &str) -> Result<FieldDefinitionDetails, SdcError> {
        self.with_loaded("field_definition_details", |_, map| {
            map.field_definition_details(uid)
        })
    }

    /// Interface names and types.
    pub fn interface_details(&self) -> Result<(Vec<String>, Vec<String>), SdcError> {
        self.with_loaded("interface_details", |_, map| Ok(map.interface_details()))
    }

    /// Handle of the instrument session backing `interface`.
    pub fn instrument_session(&self, interface: &str) -> Result<InstrumentHandle, SdcError> {
        self.with_started("instrument_session", |inner, map| {
            if map.interface(interface).is_none() {
                return Err(SdcError::UnknownIdentifier(interface.to_string()));
            }
            inner.backend.instrument_session(interface)
        })
    }

    /// Write the device elements listing into `dir`, or the working directory
    /// when `None`, and return the path of the generated file.
    pub fn generate_device_elements(&self, dir: Option<&Path>) -> Result<PathBuf, SdcError> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()
                .map_err(|err| SdcError::Io(format!("current directory: {err}")))?,
        };
        self.with_loaded("generate_device_elements", |_, map| {
            DeviceElements::from_map(map)?.write_to(&dir)
        })
    }

    pub(crate) fn execute_ccc(
        &self,
        interface: &str,
        protocol: &str,
        request: &CccRequest,
    ) -> Result<Vec<u8>, SdcError> {
        self.with_started("execute_ccc", |inner, _| {
            debug!(
                interface,
                protocol,
                command_id = request.command_id(),
                ccc_type = ?request.ccc_type(),
                "execute ccc"
            );
            inner.backend.execute_ccc(interface, protocol, request)
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<B>>, SdcError> {
        self.inner
            .lock()
            .map_err(|_| SdcError::Transport("session lock poisoned".into()))
    }

    /// Run `f` under the session lock after checking the session is started.
    pub(crate) fn with_started<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Inner<B>, &RegisterMap) -> Result<T, SdcError>,
    ) -> Result<T, SdcError> {
        let mut inner = self.lock()?;
        inner.state.ensure_started(operation)?;
        let map = loaded(&inner, operation)?;
        f(&mut *inner, &map)
    }

    /// Run `f` under the session lock after checking a register map is loaded.
    pub(crate) fn with_loaded<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Inner<B>, &RegisterMap) -> Result<T, SdcError>,
    ) -> Result<T, SdcError> {
        let mut inner = self.lock()?;
        inner.state.ensure_loaded(operation)?;
        let map = loaded(&inner, operation)?;
        f(&mut *inner, &map)
    }
}

impl<B: HardwareBackend> Drop for Session<B> {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if matches!(
            inner.state,
            SessionState::Uninitialized | SessionState::Destroyed
        ) {
            return;
        }
        warn!(state = %inner.state, "session dropped without destroy; releasing hardware");
        if inner.state == SessionState::Started {
            if let Err(err) = inner.backend.stop() {
                warn!(error = %err, "implicit stop failed");
            }
        }
        if let Err(err) = inner.backend.destroy() {
            warn!(error = %err, "implicit destroy failed");
        }
        inner.state = SessionState::Destroyed;
    }
}

fn loaded<B>(
    inner: &MutexGuard<'_, Inner<B>>,
    operation: &'static str,
) -> Result<Arc<RegisterMap>, SdcError> {
    inner.map.clone().ok_or(SdcError::InvalidSessionState {
        operation,
        state: inner.state.name(),
    })
}

fn ensure_pin(map: &RegisterMap, pin: &str) -> Result<(), SdcError> {
    if map.pin(pin).is_none() {
        return Err(SdcError::UnknownIdentifier(pin.to_string()));
    }
    Ok(())
}

pub(crate) fn write_register<B: HardwareBackend>(
    backend: &mut B,
    register: &RegisterEntry,
    value: u64,
) -> Result<(), SdcError> {
    register.ensure_writable()?;
    register.check_value(value)?;
    debug!(uid = %register.uid, value, "write register");
    backend.write_register(register, value)
}

pub(crate) fn read_register<B: HardwareBackend>(
    backend: &mut B,
    register: &RegisterEntry,
) -> Result<u64, SdcError> {
    register.ensure_readable()?;
    let value = backend.read_register(register)?;
    debug!(uid = %register.uid, value, "read register");
    Ok(value)
}

pub(crate) fn write_field<B: HardwareBackend>(
    backend: &mut B,
    map: &RegisterMap,
    field: &FieldEntry,
    value: u64,
) -> Result<(), SdcError> {
    let register = map.parent(field);
    register.ensure_writable()?;
    field.check_value(value)?;
    debug!(uid = %field.uid, value, "write field");
    backend.write_field(register, field, value)
}

pub(crate) fn read_field<B: HardwareBackend>(
    backend: &mut B,
    map: &RegisterMap,
    field: &FieldEntry,
) -> Result<u64, SdcError> {
    let register = map.parent(field);
    register.ensure_readable()?;
    let value = backend.read_field(register, field)?;
    debug!(uid = %field.uid, value, "read field");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        created_session, started_session, started_session_with, Journal, MockBackend, FIXTURE,
    };

    #[test]
    fn operations_before_start_fail() {
        let (session, journal) = created_session();
        let err = session
            .device()
            .write_register_by_name("LPS22HH-Control_Register-CTRL_REG1", 1)
            .unwrap_err();
        assert!(matches!(
            err,
            SdcError::InvalidSessionState {
                state: "created",
                ..
            }
        ));
        assert!(journal.writes().is_empty());
    }

    #[test]
    fn operations_after_destroy_never_reach_backend() {
        let (session, journal) = started_session();
        session.stop().expect("stop");
        session.destroy().expect("destroy");
        let before = journal.entries().len();
        assert!(matches!(
            session
                .device()
                .read_register_by_name("LPS22HH-Control_Register-CTRL_REG1"),
            Err(SdcError::InvalidSessionState { .. })
        ));
        assert!(matches!(
            session.register_addresses(),
            Err(SdcError::InvalidSessionState { .. })
        ));
        assert!(matches!(session.destroy(), Err(SdcError::AlreadyDestroyed)));
        assert_eq!(journal.entries().len(), before);
        assert_eq!(session.state(), SessionState::Destroyed);
    }

    #[test]
    fn lifecycle_reaches_backend_in_order() {
        let (session, journal) = started_session();
        session.stop().expect("stop");
        session.start().expect("restart");
        session.stop().expect("stop again");
        session.destroy().expect("destroy");
        assert_eq!(
            journal.entries(),
            vec!["create LPS22HH", "start", "stop", "start", "stop", "destroy"]
        );
    }

    #[test]
    fn start_before_create_is_rejected() {
        let journal = Journal::default();
        let session = Session::new(MockBackend::new(journal.clone()), SessionOptions::default());
        assert!(matches!(
            session.start(),
            Err(SdcError::InvalidSessionState {
                operation: "start",
                state: "uninitialized"
            })
        ));
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn config_errors_leave_session_uninitialized() {
        let journal = Journal::default();
        let session = Session::new(MockBackend::new(journal.clone()), SessionOptions::default());
        let err = session.create_from_str("<Nope/>").unwrap_err();
        assert!(matches!(err, SdcError::ConfigLoadFailure(_)));
        assert_eq!(session.state(), SessionState::Uninitialized);
        session.create_from_str(FIXTURE).expect("retry create");
        assert_eq!(session.state(), SessionState::Created);
    }

    #[test]
    fn open_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("device.sdconfig");
        std::fs::write(&path, FIXTURE).expect("write config");
        let journal = Journal::default();
        let session = Session::open(
            &path,
            MockBackend::new(journal.clone()),
            SessionOptions::default(),
        )
        .expect("open");
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(session.register_map().unwrap().name(), "LPS22HH");
    }

    #[test]
    fn map_queries_work_without_start() {
        let (session, _journal) = created_session();
        let (uids, addresses) = session.register_addresses().expect("addresses");
        assert_eq!(uids.len(), addresses.len());
        let (names, kinds) = session.interface_details().expect("interfaces");
        assert_eq!(names, vec!["NI 657x"]);
        assert_eq!(kinds, vec!["NI-Digital Pattern"]);
        let details = session
            .field_definition_details("LPS22HH-Control_Register-ODR")
            .expect("details");
        assert_eq!(details.size, 3);
        assert_eq!(session.script_names().unwrap(), vec!["power_up", "slow"]);
        let (valid, content) = session.script_string("power_up").expect("script");
        assert!(valid);
        assert!(content.starts_with("WritePin Vdd High"));
        assert!(matches!(
            session.script_string("missing"),
            Err(SdcError::UnknownScript(_))
        ));
    }

    #[test]
    fn generate_device_elements_into_directory() {
        let (session, _journal) = created_session();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = session
            .generate_device_elements(Some(dir.path()))
            .expect("generate");
        let text = std::fs::read_to_string(path).expect("read generated");
        assert!(text.contains("pub mod Field {"));
        assert!(text.contains("\"LPS22HH-Status-WHO_AM_I\""));
    }

    #[test]
    fn pins_are_checked_before_backend() {
        let (session, journal) = started_session();
        session
            .write_pin_state("Vdd", PinState::High)
            .expect("write pin");
        assert_eq!(session.read_pin_state("Vdd").unwrap(), PinState::High);
        assert!(matches!(
            session.write_pin_state("NOPE", PinState::Low),
            Err(SdcError::UnknownIdentifier(_))
        ));
        assert!(!journal.entries().iter().any(|e| e.contains("NOPE")));
    }

    #[test]
    fn scripts_and_settings_delegate() {
        let (session, journal) = started_session();
        let results = session
            .execute_script("power_up", ScriptMode::Blocking)
            .expect("script");
        assert_eq!(results.len(), 1);
        assert!(matches!(
            session.execute_script("missing", ScriptMode::Blocking),
            Err(SdcError::UnknownScript(_))
        ));
        session
            .set_protocol_setting("NI 657x", "I3C", "Frequency", "1000000")
            .expect("set setting");
        assert_eq!(
            session
                .protocol_setting("NI 657x", "I3C", "Frequency")
                .unwrap(),
            "1000000"
        );
        session
            .set_interface_setting("NI 657x", "VoltageLevel", "3.3")
            .expect("set interface setting");
        assert_eq!(
            session.interface_setting("NI 657x", "VoltageLevel").unwrap(),
            "3.3"
        );
        assert!(journal
            .entries()
            .contains(&"execute_script power_up Blocking".to_string()));
    }

    #[test]
    fn instrument_session_requires_known_interface() {
        let (session, _journal) = started_session();
        assert_eq!(
            session.instrument_session("NI 657x").unwrap(),
            InstrumentHandle(1)
        );
        assert!(matches!(
            session.instrument_session("PXIe-6570"),
            Err(SdcError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn drop_releases_started_session() {
        let (session, journal) = started_session();
        drop(session);
        let entries = journal.entries();
        assert_eq!(&entries[entries.len() - 2..], ["stop", "destroy"]);
    }

    #[test]
    fn session_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session<MockBackend>>();
    }

    /// Lengths of consecutive runs of equal items.
    fn run_lengths<T: PartialEq + Copy>(items: &[T]) -> Vec<(T, usize)> {
        let mut runs: Vec<(T, usize)> = Vec::new();
        for item in items {
            match runs.last_mut() {
                Some((last, len)) if last == item => *len += 1,
                _ => runs.push((*item, 1)),
            }
        }
        runs
    }

    /// Each run must be a sum of consecutive whole units, consuming all of them.
    fn runs_are_whole_units(runs: &[usize], units: &[usize]) -> bool {
        let mut units = units.iter().copied();
        for &run in runs {
            let mut covered = 0;
            while covered < run {
                match units.next() {
                    Some(unit) => covered += unit,
                    None => return false,
                }
            }
            if covered != run {
                return false;
            }
        }
        units.next().is_none()
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        use std::thread;
        use std::time::Duration;

        const BATCH: [&str; 3] = [
            "LPS22HH-Control_Register-CTRL_REG1",
            "LPS22HH-Control_Register-CTRL_REG2",
            "LPS22HH-Control_Register-THS_P_H",
        ];
        const WORKERS: u64 = 3;
        const ROUNDS: u64 = 8;

        let (session, journal) = started_session_with(
            |journal| MockBackend::new(journal).with_delay(Duration::from_millis(1)),
            SessionOptions::default(),
        );

        let (flusher, counts) = thread::scope(|scope| {
            for worker in 0..WORKERS {
                let session = &session;
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        let value = worker * 16 + round;
                        session
                            .device()
                            .write_registers_by_name(&BATCH, &[value; 3])
                            .expect("device batch");
                    }
                });
            }
            scope.spawn(|| {
                for round in 0..ROUNDS {
                    session
                        .cache()
                        .write_registers_by_name(&BATCH, &[0x80 + round; 3])
                        .expect("stage batch");
                    thread::yield_now();
                }
            });
            let flusher = scope.spawn(|| {
                let mut counts = Vec::new();
                for _ in 0..ROUNDS {
                    counts.push(session.cache().flush_to_device().expect("flush"));
                    thread::yield_now();
                }
                (thread::current().id(), counts)
            });
            flusher.join().expect("flusher thread")
        });
        // Anything staged after the last flush stays in the cache.
        let leftover = session.cache().len().expect("len");

        assert_eq!(journal.overlaps(), 0, "backend calls overlapped");

        let threads = journal.write_threads();
        let flushed: usize = counts.iter().sum();
        assert_eq!(threads.len(), (WORKERS * ROUNDS * 3) as usize + flushed);
        assert!(leftover <= BATCH.len());

        let runs = run_lengths(&threads);
        let flush_runs: Vec<usize> = runs
            .iter()
            .filter(|(id, _)| *id == flusher)
            .map(|(_, len)| *len)
            .collect();
        let nonzero: Vec<usize> = counts.iter().copied().filter(|count| *count > 0).collect();
        assert!(
            runs_are_whole_units(&flush_runs, &nonzero),
            "flush writes interleaved: runs {flush_runs:?}, flushes {nonzero:?}"
        );
        for (id, len) in runs.iter().filter(|(id, _)| *id != flusher) {
            assert_eq!(len % BATCH.len(), 0, "batch from {id:?} interleaved");
        }
    }

    #[test]
    fn whole_unit_runs() {
        assert!(runs_are_whole_units(&[3, 6], &[3, 3, 3]));
        assert!(!runs_are_whole_units(&[2, 4], &[3, 3]));
        assert!(!runs_are_whole_units(&[3], &[3, 3]));
        assert_eq!(run_lengths(&[1, 1, 2, 1]), vec![(1, 2), (2, 1), (1, 1)]);
    }
}
