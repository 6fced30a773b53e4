//! I3C common command codes on one interface/protocol pair.

use sdc_core::{CccRequest, CccType, HardwareBackend, SdcError};
use tracing::debug;

use crate::session::Session;

/// I3C view of a [`Session`] bound to an interface and protocol of the map.
pub struct I3cSession<'a, B: HardwareBackend> {
    session: &'a Session<B>,
    interface: String,
    protocol: String,
}

impl<'a, B: HardwareBackend> I3cSession<'a, B> {
    /// Bind to `interface`/`protocol`, which must be declared in the loaded map.
    pub fn new(session: &'a Session<B>, interface: &str, protocol: &str) -> Result<Self, SdcError> {
        session.with_loaded("i3c_session", |_, map| {
            if map.protocol(interface, protocol).is_none() {
                return Err(SdcError::UnknownIdentifier(format!("{interface}/{protocol}")));
            }
            Ok(())
        })?;
        Ok(Self {
            session,
            interface: interface.to_string(),
            protocol: protocol.to_string(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Dynamic address assignment command (SETDASA, RSTDAA, ENTDAA, ...).
    pub fn execute_dynamic_addressing_ccc(
        &self,
        ccc_type: CccType,
        command_id: u8,
        dynamic_address: Option<u8>,
    ) -> Result<(), SdcError> {
        self.execute(CccRequest::DynamicAddressing {
            ccc_type,
            command_id,
            dynamic_address,
            with_read: false,
        })
        .map(|_| ())
    }

    /// Dynamic address assignment command returning the target's response bytes.
    pub fn execute_dynamic_addressing_ccc_with_read(
        &self,
        ccc_type: CccType,
        command_id: u8,
        dynamic_address: Option<u8>,
    ) -> Result<Vec<u8>, SdcError> {
        self.execute(CccRequest::DynamicAddressing {
            ccc_type,
            command_id,
            dynamic_address,
            with_read: true,
        })
    }

    pub fn execute_sdr_ccc_write(
        &self,
        ccc_type: CccType,
        command_id: u8,
        defining_byte: Option<u8>,
        data: &[u8],
    ) -> Result<(), SdcError> {
        self.execute(CccRequest::SdrWrite {
            ccc_type,
            command_id,
            defining_byte,
            data: data.to_vec(),
        })
        .map(|_| ())
    }

    /// SDR read; `read_len` of `None` lets the target decide the length.
    pub fn execute_sdr_ccc_read(
        &self,
        ccc_type: CccType,
        command_id: u8,
        defining_byte: Option<u8>,
        read_len: Option<usize>,
    ) -> Result<Vec<u8>, SdcError> {
        self.execute(CccRequest::SdrRead {
            ccc_type,
            command_id,
            defining_byte,
            read_len,
        })
    }

    fn execute(&self, request: CccRequest) -> Result<Vec<u8>, SdcError> {
        let response = self
            .session
            .execute_ccc(&self.interface, &self.protocol, &request)?;
        debug!(
            interface = %self.interface,
            protocol = %self.protocol,
            command_id = request.command_id(),
            len = response.len(),
            "ccc response"
        );
        Ok(response)
    }
}
