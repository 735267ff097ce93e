//! Error types for the conversion core

use crate::types::{CommId, DatatypeId, GroupId, RequestId};
use thiserror::Error;

/// Result type for structural, accounting and archive operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A wait/test completed a request that was never issued
    #[error("request ({request}) not found on rank {rank}")]
    UnknownRequest { request: RequestId, rank: u32 },

    /// The operation has no structural semantics yet
    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),

    /// A derived type was built from an unregistered type
    #[error("unknown datatype ({0})")]
    UnknownType(DatatypeId),

    #[error("unknown communicator ({0})")]
    UnknownComm(CommId),

    #[error("unknown group ({0})")]
    UnknownGroup(GroupId),

    #[error("rank index {index} out of range for a group of {size}")]
    RankIndexOutOfRange { index: i64, size: usize },

    #[error("request index {index} out of range for {len} requests")]
    RequestIndexOutOfRange { index: i64, len: usize },

    #[error("rank {rank} is not a member of communicator ({comm})")]
    NotAMember { rank: u32, comm: CommId },

    #[error("{0} registered more than once")]
    AlreadyRegistered(&'static str),

    #[error("archive already open")]
    ArchiveAlreadyOpen,

    #[error("archive not open")]
    ArchiveNotOpen,

    #[error("archive has no event stream for location {0}")]
    UnknownLocation(u32),

    #[error("event stream of location {0} already finished")]
    LocationFinished(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the conversion must stop; everything else can be logged and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnknownRequest { .. }
                | Error::ArchiveAlreadyOpen
                | Error::ArchiveNotOpen
                | Error::UnknownLocation(_)
                | Error::LocationFinished(_)
                | Error::Io(_)
                | Error::Json(_)
        )
    }
}
