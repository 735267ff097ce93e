//! Trace archive writers.
//!
//! A conversion opens one archive, streams events per location (one location
//! per rank), then writes each rank's local mapping tables and finally the
//! global definitions once ids have been agreed on.

use crate::collective::CollectiveOp;
use crate::defs::{GlobalDefinitions, LocalDefinitions};
use crate::error::Result;
use crate::types::{CommId, RequestId, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod json;
mod memory;

pub use json::JsonArchive;
pub use memory::MemoryArchive;

/// One event record in a location's stream.
///
/// Region ids and communicator handles are rank-local; the local mapping
/// tables translate them to global definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Enter {
        time: Timestamp,
        region: u32,
    },
    Leave {
        time: Timestamp,
        region: u32,
    },
    MpiSend {
        time: Timestamp,
        receiver: u32,
        comm: CommId,
        tag: u32,
        bytes: u64,
    },
    MpiIsend {
        time: Timestamp,
        receiver: u32,
        comm: CommId,
        tag: u32,
        bytes: u64,
        request: RequestId,
    },
    MpiIsendComplete {
        time: Timestamp,
        request: RequestId,
    },
    MpiIrecvRequest {
        time: Timestamp,
        request: RequestId,
    },
    MpiRecv {
        time: Timestamp,
        sender: u32,
        comm: CommId,
        tag: u32,
        bytes: u64,
    },
    MpiIrecv {
        time: Timestamp,
        sender: u32,
        comm: CommId,
        tag: u32,
        bytes: u64,
        request: RequestId,
    },
    MpiCollectiveBegin {
        time: Timestamp,
    },
    MpiCollectiveEnd {
        time: Timestamp,
        op: CollectiveOp,
        comm: CommId,
        root: u32,
        sent: u64,
        received: u64,
    },
}

impl Event {
    pub fn time(&self) -> Timestamp {
        match self {
            Event::Enter { time, .. }
            | Event::Leave { time, .. }
            | Event::MpiSend { time, .. }
            | Event::MpiIsend { time, .. }
            | Event::MpiIsendComplete { time, .. }
            | Event::MpiIrecvRequest { time, .. }
            | Event::MpiRecv { time, .. }
            | Event::MpiIrecv { time, .. }
            | Event::MpiCollectiveBegin { time }
            | Event::MpiCollectiveEnd { time, .. } => *time,
        }
    }
}

/// Destination of a converted trace
pub trait ArchiveWriter {
    /// Prepare the archive for `world_size` locations
    fn open(&mut self, path: &Path, world_size: u32) -> Result<()>;

    /// Append one event to `location`'s stream
    fn write_event(&mut self, location: u32, event: &Event) -> Result<()>;

    /// End `location`'s event stream and release what backs it. Later
    /// events for `location` are rejected.
    fn finish_location(&mut self, location: u32) -> Result<()>;

    /// Record the rank-local to global id tables of `location`
    fn write_local_definitions(&mut self, location: u32, defs: &LocalDefinitions) -> Result<()>;

    fn write_global_definitions(&mut self, defs: &GlobalDefinitions) -> Result<()>;

    /// Flush everything; no writes are accepted afterwards
    fn close(&mut self) -> Result<()>;
}
