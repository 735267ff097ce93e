//! Conversion of recorded MPI call streams into trace archives.
//!
//! Each rank's stream is replayed through a [`writer::RankWriter`], which
//! tracks requests, datatypes and communicators and emits timed events.
//! Once every rank is replayed, communicator ids are agreed on across ranks
//! and the global definitions are written.

pub mod archive;
pub mod call;
pub mod cli;
pub mod collective;
pub mod comm;
pub mod convert;
pub mod datatype;
pub mod defs;
pub mod error;
pub mod global_id;
pub mod input;
pub mod logger;
pub mod names;
pub mod reporter;
pub mod request;
pub mod types;
pub mod writer;

pub use error::{Error, Result};
