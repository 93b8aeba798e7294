//! Connection lifecycle state machine.

use crate::mode::AdapterMode;
use crate::{AdapterError, AdapterResult};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Lifecycle state of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

impl ConnectionState {
    /// Legal transitions. `Connecting -> Disconnected` is taken when the
    /// resource fails to connect.
    fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }
}

/// Owns the state sequence and the mode selected for the current connect cycle
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    declared: Vec<AdapterMode>,
    active: Option<AdapterMode>,
}

impl ConnectionStateMachine {
    /// Create a state machine for the given declared modes
    ///
    /// The declared set must be non-empty and its names unique.
    pub fn new(declared: Vec<AdapterMode>) -> AdapterResult<Self> {
        if declared.is_empty() {
            return Err(AdapterError::config("adapter declares no modes"));
        }

        let mut seen = HashSet::new();
        for mode in &declared {
            if !seen.insert(mode.kind()) {
                return Err(AdapterError::config(format!(
                    "mode {} is declared more than once",
                    mode.name()
                )));
            }
        }

        Ok(Self {
            state: ConnectionState::Disconnected,
            declared,
            active: None,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn declared(&self) -> &[AdapterMode] {
        &self.declared
    }

    /// Mode of the current connect cycle, if connected
    pub fn active_mode(&self) -> Option<AdapterMode> {
        self.active
    }

    /// Resolve a mode name against the declared set (case-insensitive)
    pub fn select_mode(&self, requested: &str) -> AdapterResult<AdapterMode> {
        self.declared
            .iter()
            .copied()
            .find(|mode| mode.matches(requested))
            .ok_or_else(|| AdapterError::InvalidMode {
                requested: requested.to_string(),
                declared: self.declared.iter().map(|m| m.name().to_string()).collect(),
            })
    }

    /// Disconnected -> Connecting
    pub fn begin_connect(&mut self, mode: AdapterMode) -> AdapterResult<()> {
        self.transition(ConnectionState::Connecting)?;
        self.active = Some(mode);
        Ok(())
    }

    /// Connecting -> Connected
    pub fn complete_connect(&mut self) -> AdapterResult<()> {
        self.transition(ConnectionState::Connected)
    }

    /// Connecting -> Disconnected after the resource refused the connection
    pub fn abort_connect(&mut self) -> AdapterResult<()> {
        self.transition(ConnectionState::Disconnected)?;
        self.active = None;
        Ok(())
    }

    /// Connected -> Disconnecting
    pub fn begin_disconnect(&mut self) -> AdapterResult<()> {
        self.transition(ConnectionState::Disconnecting)
    }

    /// Disconnecting -> Disconnected
    pub fn complete_disconnect(&mut self) -> AdapterResult<()> {
        self.transition(ConnectionState::Disconnected)?;
        self.active = None;
        Ok(())
    }

    fn transition(&mut self, next: ConnectionState) -> AdapterResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AdapterError::invalid_state(
                format!("a state that can move to {}", next),
                self.state,
            ));
        }
        debug!("Connection state: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ConnectionStateMachine {
        ConnectionStateMachine::new(vec![AdapterMode::publish(), AdapterMode::subscribe()]).unwrap()
    }

    #[test]
    fn test_full_cycle() {
        let mut sm = machine();
        let mode = sm.select_mode("publish").unwrap();

        sm.begin_connect(mode).unwrap();
        assert_eq!(sm.state(), ConnectionState::Connecting);
        sm.complete_connect().unwrap();
        assert_eq!(sm.state(), ConnectionState::Connected);
        assert_eq!(sm.active_mode(), Some(AdapterMode::publish()));

        sm.begin_disconnect().unwrap();
        sm.complete_disconnect().unwrap();
        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert_eq!(sm.active_mode(), None);
    }

    #[test]
    fn test_no_skipping() {
        let mut sm = machine();
        assert!(sm.complete_connect().is_err());
        assert!(sm.begin_disconnect().is_err());

        sm.begin_connect(AdapterMode::publish()).unwrap();
        assert!(sm.begin_disconnect().is_err());
        assert!(sm.begin_connect(AdapterMode::publish()).is_err());
    }

    #[test]
    fn test_abort_connect_returns_to_disconnected() {
        let mut sm = machine();
        sm.begin_connect(AdapterMode::subscribe()).unwrap();
        sm.abort_connect().unwrap();

        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert_eq!(sm.active_mode(), None);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let sm = machine();
        match sm.select_mode("RequestReply") {
            Err(AdapterError::InvalidMode { requested, declared }) => {
                assert_eq!(requested, "RequestReply");
                assert_eq!(declared, vec!["Publish", "Subscribe"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(sm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_declared_modes_validated() {
        assert!(ConnectionStateMachine::new(vec![]).is_err());
        assert!(ConnectionStateMachine::new(vec![
            AdapterMode::publish(),
            AdapterMode::publish()
        ])
        .is_err());
    }
}
