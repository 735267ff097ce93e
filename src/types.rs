use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Clock ticks as recorded by the interception layer
pub type Timestamp = u64;

/// Root value recorded for collectives that have no root
pub const UNDEFINED_ROOT: u32 = u32::MAX;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_type!(
    /// Opaque MPI datatype handle
    DatatypeId(i64)
);
handle_type!(
    /// Opaque MPI request handle
    RequestId(i64)
);
handle_type!(
    /// Rank-local communicator handle
    CommId(i64)
);
handle_type!(
    /// Rank-local group handle
    GroupId(i64)
);

/// Identity of one process among all participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub rank: u32,
    pub size: u32,
}

/// Observed time bounds of a run, widened by every call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl TimeWindow {
    pub fn new() -> Self {
        Self {
            start: Timestamp::MAX,
            stop: 0,
        }
    }

    pub fn observe(&mut self, start: Timestamp, stop: Timestamp) {
        self.start = self.start.min(start);
        self.stop = self.stop.max(stop);
    }

    pub fn merge(&mut self, other: &TimeWindow) {
        self.observe(other.start, other.stop);
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.stop
    }

    /// Length in ticks, zero for a window that never observed a call
    pub fn length(&self) -> Timestamp {
        if self.is_empty() {
            0
        } else {
            self.stop - self.start
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-rank results of a conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSummary {
    pub rank: u32,
    pub calls: u64,
    pub events: u64,
    pub regions: usize,
    pub communicators: usize,
    pub pending_requests: usize,
    pub errors: usize,
}

/// Complete conversion report
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub output: Option<PathBuf>,
    pub created: DateTime<Utc>,
    pub world_size: u32,
    pub clock_resolution: u64,
    pub start_ticks: Timestamp,
    pub stop_ticks: Timestamp,
    pub duration_seconds: Option<f64>,
    pub total_events: u64,
    pub regions: usize,
    pub communicators: usize,
    pub ranks: Vec<RankSummary>,
}

impl ConversionSummary {
    pub fn total_errors(&self) -> usize {
        self.ranks.iter().map(|r| r.errors).sum()
    }
}
