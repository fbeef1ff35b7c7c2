use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use crate::train::epoch_stats::EpochStats;

/// Optional hooks observed by `train_loop`.
///
/// - `progress_tx` — one `EpochStats` is sent per completed epoch. If the
///                   receiver is dropped the loop terminates early.
/// - `stop_flag`   — when set to `true` from another thread the loop
///                   terminates after the current epoch.
#[derive(Debug, Default, Clone)]
pub struct TrainMonitor {
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainMonitor {
    /// A monitor with no channel and no stop flag.
    pub fn new() -> Self {
        TrainMonitor::default()
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stop_flag
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    /// Returns `false` when the receiving end has hung up.
    pub(crate) fn report(&self, stats: &EpochStats) -> bool {
        match self.progress_tx {
            Some(ref tx) => tx.send(stats.clone()).is_ok(),
            None => true,
        }
    }
}
