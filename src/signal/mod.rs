//! Interrupt handling
//!
//! The first SIGINT/SIGTERM stops further submissions: the executor checks
//! the flag between submissions, marks what is left as cancelled and the
//! run exits with code 80. A second signal exits immediately.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::summary::ExitCode;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop submitting
    StopSubmitting,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal
    Ignore,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    signals: Arc<AtomicU8>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.load(Ordering::SeqCst) > 0
    }

    /// Record a signal and return what to do about it.
    pub fn signal(&self) -> SignalAction {
        match self.signals.fetch_add(1, Ordering::SeqCst) {
            0 => SignalAction::StopSubmitting,
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }

    /// Install the process-wide handler. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        ctrlc::set_handler(move || match flag.signal() {
            SignalAction::StopSubmitting => {
                eprintln!("\nInterrupted, no further jobs will be submitted (again to exit now)");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nInterrupted twice, exiting");
                std::process::exit(ExitCode::Cancelled.as_i32());
            }
            SignalAction::Ignore => {}
        })
    }
}
