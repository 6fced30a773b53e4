//! Session lifecycle state machine.

use std::fmt;

use crate::SdcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Created,
    Started,
    Stopped,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Create,
    Start,
    Stop,
    Destroy,
}

impl Transition {
    pub const fn name(self) -> &'static str {
        match self {
            Transition::Create => "create",
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::Destroy => "destroy",
        }
    }
}

impl SessionState {
    pub const fn name(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Created => "created",
            SessionState::Started => "started",
            SessionState::Stopped => "stopped",
            SessionState::Destroyed => "destroyed",
        }
    }

    /// State reached by applying `transition`, or the error describing why it is illegal.
    pub fn apply(self, transition: Transition) -> Result<SessionState, SdcError> {
        use SessionState::*;
        match (self, transition) {
            (Uninitialized, Transition::Create) => Ok(Created),
            (Created | Stopped, Transition::Start) => Ok(Started),
            (Started, Transition::Stop) => Ok(Stopped),
            (Created | Stopped, Transition::Destroy) => Ok(Destroyed),
            (Destroyed, Transition::Destroy) => Err(SdcError::AlreadyDestroyed),
            (state, transition) => Err(SdcError::InvalidSessionState {
                operation: transition.name(),
                state: state.name(),
            }),
        }
    }

    /// Require the `Started` state for a device operation.
    pub fn ensure_started(self, operation: &'static str) -> Result<(), SdcError> {
        if self != SessionState::Started {
            return Err(SdcError::InvalidSessionState {
                operation,
                state: self.name(),
            });
        }
        Ok(())
    }

    /// Require a loaded register map (created, started or stopped).
    pub fn ensure_loaded(self, operation: &'static str) -> Result<(), SdcError> {
        match self {
            SessionState::Created | SessionState::Started | SessionState::Stopped => Ok(()),
            state => Err(SdcError::InvalidSessionState {
                operation,
                state: state.name(),
            }),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
