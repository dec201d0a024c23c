//! Error classification and recovery policy
//!
//! Backend faults are classified into a small taxonomy and turned into a
//! recovery action: ignore, recover in place, hard reload after a delay, or
//! surface the error to the viewer.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Recovery tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Delay before a hard reload after a fatal playback error
    pub reload_delay_ms: u64,
    /// Delay before a hard reload after a 5xx response
    pub server_error_delay_ms: u64,
    /// Hard reloads allowed before giving up
    pub max_reloads: u32,
    /// Soft errors tolerated between successful fragment loads
    pub soft_error_threshold: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            reload_delay_ms: 6_000,
            server_error_delay_ms: 10_000,
            max_reloads: 3,
            soft_error_threshold: 5,
        }
    }
}

impl RecoveryConfig {
    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    pub fn server_error_delay(&self) -> Duration {
        Duration::from_millis(self.server_error_delay_ms)
    }
}

/// Where a backend fault originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    Network,
    Media,
    KeySystem,
    Other,
}

/// A backend error, normalized by the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFault {
    pub kind: FaultKind,
    /// The engine gave up on its own
    pub fatal: bool,
    /// HTTP status of the failed request, if any
    pub status: Option<u16>,
    pub details: String,
}

impl MediaFault {
    pub fn network(status: Option<u16>, details: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind: FaultKind::Network,
            fatal,
            status,
            details: details.into(),
        }
    }

    pub fn media(details: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind: FaultKind::Media,
            fatal,
            status: None,
            details: details.into(),
        }
    }

    pub fn other(details: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind: FaultKind::Other,
            fatal,
            status: None,
            details: details.into(),
        }
    }

    /// Session-level error for this fault
    pub fn to_error(&self) -> Error {
        match classify(self) {
            ErrorClass::Permission => Error::Permission {
                status: self.status.unwrap_or(403),
                message: None,
            },
            ErrorClass::Server => Error::Server {
                status: self.status.unwrap_or(500),
                details: self.details.clone(),
            },
            ErrorClass::RecoverableMedia => Error::RecoverableMedia(self.details.clone()),
            ErrorClass::Fatal | ErrorClass::Transient => Error::FatalPlayback(self.details.clone()),
        }
    }
}

impl fmt::Display for MediaFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} error: {}", self.kind, self.details)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        if self.fatal {
            write!(f, " [fatal]")?;
        }
        Ok(())
    }
}

/// Error taxonomy used for recovery decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 401/403, never retried
    Permission,
    /// 5xx, reloaded with a long delay
    Server,
    /// Fatal decode-type error the engine can recover from in place
    RecoverableMedia,
    /// Any other fatal error
    Fatal,
    /// Non-fatal, the engine keeps going
    Transient,
}

/// Classify a backend fault
pub fn classify(fault: &MediaFault) -> ErrorClass {
    match fault.status {
        Some(401) | Some(403) => return ErrorClass::Permission,
        Some(500..=599) => return ErrorClass::Server,
        _ => {}
    }

    match (fault.fatal, fault.kind) {
        (false, _) => ErrorClass::Transient,
        (true, FaultKind::Media) => ErrorClass::RecoverableMedia,
        (true, _) => ErrorClass::Fatal,
    }
}

/// What the session should do about a fault
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    Ignore,
    RecoverInPlace,
    HardReload { delay: Duration, error: Error },
    Surface(Error),
}

/// Soft-error counter plus the decision table
#[derive(Debug)]
pub struct RecoveryPolicy {
    config: RecoveryConfig,
    soft_errors: u32,
}

impl RecoveryPolicy {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            soft_errors: 0,
        }
    }

    /// Errors seen since the last successful fragment load
    pub fn soft_errors(&self) -> u32 {
        self.soft_errors
    }

    /// A fragment loaded; prior transient errors are forgiven
    pub fn on_fragment_loaded(&mut self) {
        self.soft_errors = 0;
    }

    pub fn reset(&mut self) {
        self.soft_errors = 0;
    }

    /// Decide how to handle `fault`
    pub fn on_fault(&mut self, fault: &MediaFault) -> RecoveryAction {
        self.soft_errors += 1;
        let class = classify(fault);

        debug!(fault = %fault, ?class, soft_errors = self.soft_errors, "Classifying backend fault");

        if class == ErrorClass::Permission {
            return RecoveryAction::Surface(fault.to_error());
        }

        if self.soft_errors >= self.config.soft_error_threshold {
            warn!(
                soft_errors = self.soft_errors,
                threshold = self.config.soft_error_threshold,
                "Too many errors, escalating to reload"
            );
            let delay = if class == ErrorClass::Server {
                self.config.server_error_delay()
            } else {
                self.config.reload_delay()
            };
            return RecoveryAction::HardReload {
                delay,
                error: fault.to_error(),
            };
        }

        match class {
            ErrorClass::Server => RecoveryAction::HardReload {
                delay: self.config.server_error_delay(),
                error: fault.to_error(),
            },
            ErrorClass::RecoverableMedia => RecoveryAction::RecoverInPlace,
            ErrorClass::Fatal => RecoveryAction::HardReload {
                delay: self.config.reload_delay(),
                error: fault.to_error(),
            },
            ErrorClass::Transient | ErrorClass::Permission => RecoveryAction::Ignore,
        }
    }
}

/// Bounded count of hard reloads
#[derive(Debug)]
pub struct ReloadBudget {
    attempts: u32,
    max: u32,
}

impl ReloadBudget {
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    /// Record an attempt; false once the budget is spent
    pub fn try_acquire(&mut self) -> bool {
        self.attempts += 1;
        self.attempts <= self.max
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn set_max(&mut self, max: u32) {
        self.max = max;
    }

    /// Playback started; the resource works again
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
