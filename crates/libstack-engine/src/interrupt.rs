//! Cooperative cancellation on Ctrl-C
//!
//! The signal handler only flips a flag. The sequencer polls it before each
//! step, after each command and between readiness attempts, so cleanup always
//! runs on the main thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::warn;

/// Shared "an interrupt was received" flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interrupt. Returns `true` only for the first one.
    pub fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Listen for Ctrl-C on a background thread and set `flag` when it arrives.
///
/// The listener owns a small current-thread runtime so the main thread stays
/// synchronous. Repeated interrupts after the first are ignored; the run is
/// already winding down.
pub fn install_interrupt_handler(flag: &InterruptFlag) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let flag = flag.clone();
    thread::Builder::new()
        .name("libstack-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Stopped listening for Ctrl-C");
                        return;
                    }
                    if flag.trigger() {
                        warn!("Interrupt received; stopping after the current command");
                    }
                }
            });
        })?;
    Ok(())
}
