//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) follow a transfer without the
//! engines knowing who is listening.

use std::fmt;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    /// Opening the port and typing the shell preamble.
    Connecting,
    /// Protocol handshake and payload in progress.
    Transferring,
    /// Writing a received image to disk, or converting offline.
    Finalizing,
    Complete,
    Error,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPhase::Idle => write!(f, "Idle"),
            TransferPhase::Connecting => write!(f, "Connecting"),
            TransferPhase::Transferring => write!(f, "Transferring"),
            TransferPhase::Finalizing => write!(f, "Finalizing"),
            TransferPhase::Complete => write!(f, "Complete"),
            TransferPhase::Error => write!(f, "Error"),
        }
    }
}

/// Direction of a transfer, from this host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Receive => write!(f, "receive"),
        }
    }
}

/// Events emitted by a transfer session.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    PhaseChanged {
        from: TransferPhase,
        to: TransferPhase,
    },
    /// Bytes moved through memory so far. `total` is 0 when unknown
    /// (receiving before the size is known).
    Progress {
        direction: Direction,
        current: u64,
        total: u64,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    Error {
        message: String,
    },
    Complete {
        direction: Direction,
        bytes: u64,
        elapsed_ms: u64,
    },
}

/// Observer trait for receiving transfer events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait TransferObserver: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl TransferObserver for NullObserver {
    fn on_event(&self, _event: &TransferEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn on_event(&self, event: &TransferEvent) {
        match event {
            TransferEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            TransferEvent::Progress {
                direction,
                current,
                total,
            } => {
                if *total > 0 {
                    let pct = (*current * 100) / *total;
                    tracing::debug!(dir = %direction, progress = %format!("{}%", pct), "Progress");
                } else {
                    tracing::debug!(dir = %direction, bytes = current, "Progress");
                }
            }
            TransferEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            TransferEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            TransferEvent::Complete {
                direction,
                bytes,
                elapsed_ms,
            } => {
                let rate = if *elapsed_ms > 0 {
                    *bytes * 1000 / *elapsed_ms
                } else {
                    0
                };
                tracing::info!(
                    dir = %direction,
                    bytes = bytes,
                    elapsed_ms = elapsed_ms,
                    bytes_per_sec = rate,
                    "Transfer complete"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records every event it sees.
    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<TransferEvent>>,
    }

    impl TransferObserver for RecordingObserver {
        fn on_event(&self, event: &TransferEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(TransferPhase::Transferring.to_string(), "Transferring");
        assert_eq!(Direction::Receive.to_string(), "receive");
    }

    #[test]
    fn test_observers_accept_every_event() {
        let events = [
            TransferEvent::PhaseChanged {
                from: TransferPhase::Idle,
                to: TransferPhase::Connecting,
            },
            TransferEvent::Progress {
                direction: Direction::Receive,
                current: 10,
                total: 0,
            },
            TransferEvent::Complete {
                direction: Direction::Send,
                bytes: 10,
                elapsed_ms: 0,
            },
        ];

        let recorder = RecordingObserver::default();
        for event in &events {
            NullObserver.on_event(event);
            TracingObserver.on_event(event);
            recorder.on_event(event);
        }
        assert_eq!(recorder.events.lock().unwrap().len(), 3);
    }
}
