//! Pool lifecycle state

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`WorkerPool`](super::WorkerPool)
///
/// `Created -> Running -> {Paused <-> Running} -> Stopping -> Stopped`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    /// Built, no worker spawned yet
    Created = 0,
    /// Workers performing operations
    Running = 1,
    /// Workers parked at the pause gate
    Paused = 2,
    /// Stop in progress
    Stopping = 3,
    /// Every worker exited or was abandoned
    Stopped = 4,
}

impl PoolState {
    /// Lowercase state name
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolState::Created => "created",
            PoolState::Running => "running",
            PoolState::Paused => "paused",
            PoolState::Stopping => "stopping",
            PoolState::Stopped => "stopped",
        }
    }

    /// True once stop has begun
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, PoolState::Stopping | PoolState::Stopped)
    }

    /// True while workers exist and may be controlled
    pub fn is_active(&self) -> bool {
        matches!(self, PoolState::Running | PoolState::Paused)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Created,
            1 => PoolState::Running,
            2 => PoolState::Paused,
            3 => PoolState::Stopping,
            _ => PoolState::Stopped,
        }
    }
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `PoolState` in one atomic, advanced by compare-and-swap
#[derive(Debug)]
pub(crate) struct AtomicPoolState(AtomicU8);

impl AtomicPoolState {
    pub(crate) fn new(state: PoolState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> PoolState {
        PoolState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: PoolState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move `from -> to`; on failure returns the state actually observed
    pub(crate) fn transition(&self, from: PoolState, to: PoolState) -> Result<(), PoolState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(PoolState::from_u8)
    }

    /// Enter `Stopping` from any state that has not started stopping
    ///
    /// Returns the state stop began from.
    pub(crate) fn begin_stop(&self) -> Result<PoolState, PoolState> {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (!PoolState::from_u8(current).is_shutting_down())
                    .then_some(PoolState::Stopping as u8)
            })
            .map(PoolState::from_u8)
            .map_err(PoolState::from_u8)
    }
}
