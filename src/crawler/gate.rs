//! Process-wide fetch gate
//!
//! Every outbound feed fetch, whichever catalog loop or sweep issued it,
//! runs inside [`FetchGate::run`]. The gate admits one fetch at a time and
//! keeps the slot closed for a trailing politeness delay, so across the
//! whole process no two fetches overlap and consecutive fetch starts are at
//! least `politeness_delay` apart.
//!
//! The gate is a cheap `Clone` handle. Construct it once at startup and pass
//! it to every component that fetches.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

/// Mutual exclusion plus pacing for outbound fetches
#[derive(Debug, Clone)]
pub struct FetchGate {
    slot: Arc<Mutex<()>>,
    politeness_delay: Duration,
}

impl FetchGate {
    /// Create a gate with the given trailing delay
    pub fn new(politeness_delay: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(())),
            politeness_delay,
        }
    }

    /// Trailing delay held after each fetch
    pub fn politeness_delay(&self) -> Duration {
        self.politeness_delay
    }

    /// Run `op` with exclusive access, then hold the gate for the politeness delay
    ///
    /// The delay applies whatever `op` returned, so failed fetches are paced
    /// exactly like successful ones.
    pub async fn run<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.slot.lock().await;
        let output = op().await;
        if !self.politeness_delay.is_zero() {
            tracing::debug!(
                delay_ms = self.politeness_delay.as_millis() as u64,
                "Holding fetch gate for politeness delay"
            );
            tokio::time::sleep(self.politeness_delay).await;
        }
        output
    }

    /// Whether a fetch currently holds the gate
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}
