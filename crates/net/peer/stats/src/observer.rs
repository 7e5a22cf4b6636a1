//! Diagnostic moving average of tunnel build times.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;
use web_time::Instant;

/// Starting value for the average before any observation.
const EMA_SEED_MS: f64 = 10_000.0;
/// Each observation contributes 1/EMA_WINDOW of the new average.
const EMA_WINDOW: f64 = 50.0;
const LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct EmaState {
    ms_per_hop: f64,
    samples: u64,
    last_logged: Option<Instant>,
}

/// Exponential moving average of per-hop build times, logged periodically.
///
/// Disabled observers ignore samples entirely.
#[derive(Debug)]
pub struct BuildTimeObserver {
    enabled: AtomicBool,
    state: Mutex<EmaState>,
}

impl Default for BuildTimeObserver {
    fn default() -> Self {
        Self::new(false)
    }
}

impl BuildTimeObserver {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            state: Mutex::new(EmaState {
                ms_per_hop: EMA_SEED_MS,
                samples: 0,
                last_logged: None,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn observe(&self, per_hop: Duration) {
        if !self.is_enabled() {
            return;
        }
        let sample = per_hop.as_secs_f64() * 1000.0;
        let mut state = self.state.lock();
        state.ms_per_hop = (state.ms_per_hop * (EMA_WINDOW - 1.0) + sample) / EMA_WINDOW;
        state.samples += 1;

        let due = state
            .last_logged
            .is_none_or(|logged| logged.elapsed() >= LOG_INTERVAL);
        if due {
            state.last_logged = Some(Instant::now());
            debug!(
                ms_per_hop = state.ms_per_hop,
                samples = state.samples,
                "tunnel build time average"
            );
        }
    }

    /// Current average in milliseconds per hop.
    pub fn average_ms(&self) -> f64 {
        self.state.lock().ms_per_hop
    }

    pub fn samples(&self) -> u64 {
        self.state.lock().samples
    }
}
