use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use sdc_core::{
    CccRequest, CustomRegister, FieldEntry, HardwareBackend, InstrumentHandle, PinState,
    RegisterEntry, RegisterMap, ScriptRequest, SdcError, SettingKey,
};

use crate::session::{Session, SessionOptions};

pub(crate) const FIXTURE: &str = r#"
    <DeviceConfiguration Name="LPS22HH" Version="1.0">
        <RegisterMap>
            <IPBlock Name="LPS22HH" Interface="NI 657x" Protocol="I3C">
                <RegisterGroup Name="Control_Register">
                    <Register Name="THS_P_H" Address="0x0D" Size="8" />
                    <Register Name="CTRL_REG1" Address="0x10" Size="8">
                        <Field Name="ODR" Offset="4" Size="3">
                            <ValueDefinition Name="PowerDown" Value="0" />
                            <ValueDefinition Name="1Hz" Value="1" />
                            <ValueDefinition Name="10Hz" Value="2" />
                        </Field>
                        <Field Name="BDU" Offset="1" Size="1" />
                    </Register>
                    <Register Name="CTRL_REG2" Address="0x11" Size="8" Default="0x10" />
                </RegisterGroup>
                <RegisterGroup Name="Status">
                    <Register Name="WHO_AM_I" Address="0x0F" Size="8" Default="0xB3" Access="RO" />
                    <Register Name="RESET" Address="0x12" Size="8" Access="WO" />
                </RegisterGroup>
            </IPBlock>
            <IPBlock Name="AUX">
                <RegisterGroup Name="Control_Register">
                    <Register Name="CTRL" Address="0x10" Size="16" />
                </RegisterGroup>
            </IPBlock>
        </RegisterMap>
        <Hardware>
            <Interface Name="NI 657x" Type="NI-Digital Pattern">
                <Setting Name="VoltageLevel" Value="1.8" />
                <Protocol Name="I3C">
                    <Setting Name="Frequency" Value="12500000" />
                    <Setting Name="ProvisionalID" Value="0x020800B30001" />
                </Protocol>
                <Pin Name="Vdd" Default="Low" />
                <Pin Name="Vdd_IO" Default="Low" />
                <Pin Name="CS" Default="Terminate" />
                <Pin Name="SDO" Default="Low" />
            </Interface>
        </Hardware>
        <Scripts>
            <Script Name="power_up"><![CDATA[
WritePin Vdd High
Wait 1
WriteField LPS22HH-Control_Register-ODR 1Hz
ReadRegister LPS22HH-Control_Register-CTRL_REG1
]]></Script>
            <Script Name="slow"><![CDATA[
WritePin Vdd High
Wait 5000
WritePin Vdd Low
]]></Script>
        </Scripts>
    </DeviceConfiguration>
"#;

/// Shared record of the calls that reached a [`MockBackend`].
#[derive(Debug, Default, Clone)]
pub(crate) struct Journal {
    calls: Arc<Mutex<Vec<(ThreadId, String)>>>,
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl Journal {
    fn push(&self, entry: String) {
        self.calls
            .lock()
            .expect("journal lock")
            .push((thread::current().id(), entry));
    }

    /// Mark a backend call as in progress until the guard drops.
    fn enter(&self) -> BusyGuard<'_> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        BusyGuard(&self.busy)
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("journal lock")
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Register and field writes in the order they reached the backend.
    pub(crate) fn writes(&self) -> Vec<String> {
        self.entries().into_iter().filter(|entry| is_write(entry)).collect()
    }

    /// Calling thread of every register and field write, in order.
    pub(crate) fn write_threads(&self) -> Vec<ThreadId> {
        self.calls
            .lock()
            .expect("journal lock")
            .iter()
            .filter(|(_, entry)| is_write(entry))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of backend calls that started while another was in progress.
    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

fn is_write(entry: &str) -> bool {
    entry.starts_with("write_register") || entry.starts_with("write_field")
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub(crate) struct MockBackend {
    journal: Journal,
    values: HashMap<String, u64>,
    custom: HashMap<u64, u64>,
    pins: HashMap<String, PinState>,
    settings: HashMap<String, String>,
    fail_uid: Option<String>,
    delay: Duration,
}

impl MockBackend {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            values: HashMap::new(),
            custom: HashMap::new(),
            pins: HashMap::new(),
            settings: HashMap::new(),
            fail_uid: None,
            delay: Duration::ZERO,
        }
    }

    /// Hold every register and field access for `delay`.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn hold(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    /// Fail every write that targets `uid`.
    pub(crate) fn failing_on(mut self, uid: &str) -> Self {
        self.fail_uid = Some(uid.to_string());
        self
    }

    fn check_failure(&self, uid: &str) -> Result<(), SdcError> {
        if self.fail_uid.as_deref() == Some(uid) {
            return Err(SdcError::Transport(format!("nack writing {uid}")));
        }
        Ok(())
    }
}

impl HardwareBackend for MockBackend {
    fn create(&mut self, map: Arc<RegisterMap>) -> Result<(), SdcError> {
        self.journal.push(format!("create {}", map.name()));
        Ok(())
    }

    fn start(&mut self) -> Result<(), SdcError> {
        self.journal.push("start".into());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SdcError> {
        self.journal.push("stop".into());
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), SdcError> {
        self.journal.push("destroy".into());
        Ok(())
    }

    fn read_register(&mut self, register: &RegisterEntry) -> Result<u64, SdcError> {
        let _busy = self.journal.enter();
        self.hold();
        self.journal.push(format!("read_register {}", register.uid));
        Ok(self
            .values
            .get(&register.uid)
            .copied()
            .unwrap_or(register.default))
    }

    fn write_register(&mut self, register: &RegisterEntry, value: u64) -> Result<(), SdcError> {
        let _busy = self.journal.enter();
        self.hold();
        self.check_failure(&register.uid)?;
        self.journal
            .push(format!("write_register {} 0x{value:X}", register.uid));
        self.values.insert(register.uid.clone(), value);
        Ok(())
    }

    fn read_field(&mut self, _register: &RegisterEntry, field: &FieldEntry) -> Result<u64, SdcError> {
        self.journal.push(format!("read_field {}", field.uid));
        Ok(self.values.get(&field.uid).copied().unwrap_or(0))
    }

    fn write_field(
        &mut self,
        _register: &RegisterEntry,
        field: &FieldEntry,
        value: u64,
    ) -> Result<(), SdcError> {
        let _busy = self.journal.enter();
        self.hold();
        self.check_failure(&field.uid)?;
        self.journal
            .push(format!("write_field {} 0x{value:X}", field.uid));
        self.values.insert(field.uid.clone(), value);
        Ok(())
    }

    fn read_custom_register(&mut self, register: &CustomRegister) -> Result<u64, SdcError> {
        self.journal
            .push(format!("read_custom 0x{:X}", register.address));
        Ok(self.custom.get(&register.address).copied().unwrap_or(0))
    }

    fn write_custom_register(
        &mut self,
        register: &CustomRegister,
        value: u64,
    ) -> Result<(), SdcError> {
        self.journal
            .push(format!("write_custom 0x{:X} 0x{value:X}", register.address));
        self.custom.insert(register.address, value);
        Ok(())
    }

    fn read_pin_state(&mut self, pin: &str) -> Result<PinState, SdcError> {
        self.journal.push(format!("read_pin {pin}"));
        Ok(self.pins.get(pin).copied().unwrap_or_default())
    }

    fn write_pin_state(&mut self, pin: &str, state: PinState) -> Result<(), SdcError> {
        self.journal.push(format!("write_pin {pin} {state}"));
        self.pins.insert(pin.to_string(), state);
        Ok(())
    }

    fn execute_script(&mut self, request: &ScriptRequest) -> Result<Vec<String>, SdcError> {
        let name = request.name.as_deref().unwrap_or("<command>");
        self.journal
            .push(format!("execute_script {name} {:?}", request.mode));
        Ok(vec![format!("{{\"script\":\"{name}\"}}")])
    }

    fn abort_script(&mut self) -> Result<(), SdcError> {
        self.journal.push("abort_script".into());
        Ok(())
    }

    fn validate_script(&self, text: &str) -> bool {
        !text.trim().is_empty()
    }

    fn setting(&mut self, key: &SettingKey) -> Result<String, SdcError> {
        self.settings
            .get(&key.to_string())
            .cloned()
            .ok_or_else(|| SdcError::Transport(format!("unknown setting {key}")))
    }

    fn set_setting(&mut self, key: &SettingKey, value: &str) -> Result<(), SdcError> {
        self.journal.push(format!("set_setting {key} {value}"));
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn logs(&mut self) -> Result<Vec<Vec<String>>, SdcError> {
        Ok(Vec::new())
    }

    fn reset_to_default_state(&mut self) -> Result<(), SdcError> {
        self.journal.push("reset".into());
        self.values.clear();
        Ok(())
    }

    fn instrument_session(&mut self, interface: &str) -> Result<InstrumentHandle, SdcError> {
        self.journal.push(format!("instrument_session {interface}"));
        Ok(InstrumentHandle(1))
    }

    fn execute_ccc(
        &mut self,
        interface: &str,
        protocol: &str,
        request: &CccRequest,
    ) -> Result<Vec<u8>, SdcError> {
        self.journal.push(format!(
            "ccc {interface} {protocol} 0x{:02X}",
            request.command_id()
        ));
        Ok(Vec::new())
    }
}

pub(crate) fn created_session() -> (Session<MockBackend>, Journal) {
    let journal = Journal::default();
    let session = Session::new(MockBackend::new(journal.clone()), SessionOptions::default());
    session.create_from_str(FIXTURE).expect("create session");
    (session, journal)
}

pub(crate) fn started_session() -> (Session<MockBackend>, Journal) {
    started_session_with(MockBackend::new, SessionOptions::default())
}

pub(crate) fn started_session_with(
    backend: impl FnOnce(Journal) -> MockBackend,
    options: SessionOptions,
) -> (Session<MockBackend>, Journal) {
    let journal = Journal::default();
    let session = Session::new(backend(journal.clone()), options);
    session.create_from_str(FIXTURE).expect("create session");
    session.start().expect("start session");
    (session, journal)
}
