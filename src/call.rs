//! Intercepted calls as they arrive from the recording layer.
//!
//! One JSON object per call:
//!
//! ```json
//! {"call": "MPI_Isend", "start": 120, "stop": 131, "datatype": 3, "count": 10,
//!  "dest": 1, "comm": 0, "tag": 7, "request": 42}
//! ```
//!
//! Setup records (`register_*`) describe the rank's MPI constants and carry no
//! timestamps.

use crate::types::{CommId, DatatypeId, GroupId, RequestId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    #[serde(default)]
    pub start: Timestamp,
    #[serde(default)]
    pub stop: Timestamp,
    #[serde(flatten)]
    pub call: MpiCall,
}

impl CallRecord {
    pub fn new(start: Timestamp, stop: Timestamp, call: MpiCall) -> Self {
        Self { start, stop, call }
    }

    /// A setup record, which is not timed
    pub fn setup(call: MpiCall) -> Self {
        Self::new(0, 0, call)
    }
}

/// Blocking point-to-point transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointToPoint {
    pub datatype: DatatypeId,
    pub count: u64,
    #[serde(alias = "dest", alias = "source")]
    pub peer: u32,
    pub comm: CommId,
    pub tag: u32,
}

/// Non-blocking point-to-point transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonBlocking {
    pub datatype: DatatypeId,
    pub count: u64,
    #[serde(alias = "dest", alias = "source")]
    pub peer: u32,
    pub comm: CommId,
    pub tag: u32,
    pub request: RequestId,
}

/// Collective with separate send and receive buffers and a root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootedExchange {
    pub send_count: u64,
    pub send_type: DatatypeId,
    pub recv_count: u64,
    pub recv_type: DatatypeId,
    pub root: u32,
    pub comm: CommId,
}

/// Collective with separate send and receive buffers and no root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub send_count: u64,
    pub send_type: DatatypeId,
    pub recv_count: u64,
    pub recv_type: DatatypeId,
    pub comm: CommId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPair {
    pub first: GroupId,
    pub second: GroupId,
    pub new: GroupId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSelection {
    pub group: GroupId,
    pub ranks: Vec<i64>,
    pub new: GroupId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorType {
    pub count: u64,
    pub block_length: u64,
    pub old: DatatypeId,
    pub new: DatatypeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedType {
    pub lengths: Vec<u64>,
    pub old: DatatypeId,
    pub new: DatatypeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    pub block_lengths: Vec<u64>,
    pub old_types: Vec<DatatypeId>,
    pub new: DatatypeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call")]
pub enum MpiCall {
    #[serde(rename = "register_type")]
    RegisterType { datatype: DatatypeId, size: u64 },
    #[serde(rename = "register_comm_world")]
    RegisterCommWorld { comm: CommId },
    #[serde(rename = "register_comm_self")]
    RegisterCommSelf { comm: CommId },
    #[serde(rename = "register_comm_null")]
    RegisterCommNull { comm: CommId },
    #[serde(rename = "register_comm_error")]
    RegisterCommError { comm: CommId },
    #[serde(rename = "register_null_request")]
    RegisterNullRequest { request: RequestId },

    #[serde(rename = "MPI_Send")]
    Send(PointToPoint),
    #[serde(rename = "MPI_Bsend")]
    Bsend(PointToPoint),
    #[serde(rename = "MPI_Ssend")]
    Ssend(PointToPoint),
    #[serde(rename = "MPI_Rsend")]
    Rsend(PointToPoint),
    #[serde(rename = "MPI_Recv")]
    Recv(PointToPoint),
    #[serde(rename = "MPI_Isend")]
    Isend(NonBlocking),
    #[serde(rename = "MPI_Ibsend")]
    Ibsend(NonBlocking),
    #[serde(rename = "MPI_Issend")]
    Issend(NonBlocking),
    #[serde(rename = "MPI_Irsend")]
    Irsend(NonBlocking),
    #[serde(rename = "MPI_Irecv")]
    Irecv(NonBlocking),

    #[serde(rename = "MPI_Wait")]
    Wait { request: RequestId },
    #[serde(rename = "MPI_Waitany")]
    Waitany { request: RequestId },
    #[serde(rename = "MPI_Waitall")]
    Waitall { requests: Vec<RequestId> },
    #[serde(rename = "MPI_Waitsome")]
    Waitsome {
        requests: Vec<RequestId>,
        indices: Vec<i64>,
    },
    #[serde(rename = "MPI_Test")]
    Test { request: RequestId, flag: bool },
    #[serde(rename = "MPI_Testany")]
    Testany {
        requests: Vec<RequestId>,
        index: i64,
        flag: bool,
    },
    #[serde(rename = "MPI_Testall")]
    Testall { requests: Vec<RequestId>, flag: bool },
    #[serde(rename = "MPI_Testsome")]
    Testsome {
        requests: Vec<RequestId>,
        indices: Vec<i64>,
    },

    #[serde(rename = "MPI_Barrier")]
    Barrier { comm: CommId },
    #[serde(rename = "MPI_Bcast")]
    Bcast {
        count: u64,
        datatype: DatatypeId,
        root: u32,
        comm: CommId,
    },
    #[serde(rename = "MPI_Gather")]
    Gather(RootedExchange),
    #[serde(rename = "MPI_Gatherv")]
    Gatherv {
        send_count: u64,
        send_type: DatatypeId,
        recv_counts: Vec<u64>,
        recv_type: DatatypeId,
        root: u32,
        comm: CommId,
    },
    #[serde(rename = "MPI_Scatter")]
    Scatter(RootedExchange),
    #[serde(rename = "MPI_Scatterv")]
    Scatterv {
        send_counts: Vec<u64>,
        send_type: DatatypeId,
        recv_count: u64,
        recv_type: DatatypeId,
        root: u32,
        comm: CommId,
    },
    #[serde(rename = "MPI_Reduce")]
    Reduce {
        count: u64,
        datatype: DatatypeId,
        root: u32,
        comm: CommId,
    },
    #[serde(rename = "MPI_Scan")]
    Scan {
        count: u64,
        datatype: DatatypeId,
        comm: CommId,
    },
    #[serde(rename = "MPI_Allgather")]
    Allgather(Exchange),
    #[serde(rename = "MPI_Allgatherv")]
    Allgatherv {
        send_count: u64,
        send_type: DatatypeId,
        recv_counts: Vec<u64>,
        recv_type: DatatypeId,
        comm: CommId,
    },
    #[serde(rename = "MPI_Alltoall")]
    Alltoall(Exchange),
    #[serde(rename = "MPI_Alltoallv")]
    Alltoallv {
        send_counts: Vec<u64>,
        send_type: DatatypeId,
        recv_counts: Vec<u64>,
        recv_type: DatatypeId,
        comm: CommId,
    },
    #[serde(rename = "MPI_Allreduce")]
    Allreduce {
        count: u64,
        datatype: DatatypeId,
        comm: CommId,
    },
    #[serde(rename = "MPI_Reduce_scatter")]
    ReduceScatter {
        recv_counts: Vec<u64>,
        datatype: DatatypeId,
        comm: CommId,
    },

    #[serde(rename = "MPI_Group_union")]
    GroupUnion(GroupPair),
    #[serde(rename = "MPI_Group_difference")]
    GroupDifference(GroupPair),
    #[serde(rename = "MPI_Group_intersection")]
    GroupIntersection(GroupPair),
    #[serde(rename = "MPI_Group_incl")]
    GroupIncl(GroupSelection),
    #[serde(rename = "MPI_Group_excl")]
    GroupExcl(GroupSelection),
    #[serde(rename = "MPI_Group_range_incl")]
    GroupRangeIncl {
        group: GroupId,
        ranges: Vec<[i64; 3]>,
        new: GroupId,
    },

    #[serde(rename = "MPI_Comm_dup")]
    CommDup { comm: CommId, new: CommId },
    #[serde(rename = "MPI_Comm_group")]
    CommGroup { comm: CommId, group: GroupId },
    #[serde(rename = "MPI_Comm_create")]
    CommCreate {
        comm: CommId,
        group: GroupId,
        new: CommId,
    },
    #[serde(rename = "MPI_Comm_split")]
    CommSplit {
        comm: CommId,
        color: i64,
        key: i64,
        new: CommId,
    },

    #[serde(rename = "MPI_Type_contiguous")]
    TypeContiguous {
        count: u64,
        old: DatatypeId,
        new: DatatypeId,
    },
    #[serde(rename = "MPI_Type_vector")]
    TypeVector(VectorType),
    #[serde(rename = "MPI_Type_hvector")]
    TypeHvector(VectorType),
    #[serde(rename = "MPI_Type_create_hvector")]
    TypeCreateHvector(VectorType),
    #[serde(rename = "MPI_Type_indexed")]
    TypeIndexed(IndexedType),
    #[serde(rename = "MPI_Type_hindexed")]
    TypeHindexed(IndexedType),
    #[serde(rename = "MPI_Type_create_hindexed")]
    TypeCreateHindexed(IndexedType),
    #[serde(rename = "MPI_Type_struct")]
    TypeStruct(StructType),
    #[serde(rename = "MPI_Type_create_struct")]
    TypeCreateStruct(StructType),
    #[serde(rename = "MPI_Type_create_subarray")]
    TypeCreateSubarray {
        subsizes: Vec<u64>,
        old: DatatypeId,
        new: DatatypeId,
    },

    /// Any call recorded only as a timed region
    #[serde(rename = "generic")]
    Generic { name: String },
}

impl MpiCall {
    /// Region name of a traced call; `None` for setup records
    pub fn region_name(&self) -> Option<&str> {
        let name = match self {
            MpiCall::RegisterType { .. }
            | MpiCall::RegisterCommWorld { .. }
            | MpiCall::RegisterCommSelf { .. }
            | MpiCall::RegisterCommNull { .. }
            | MpiCall::RegisterCommError { .. }
            | MpiCall::RegisterNullRequest { .. } => return None,
            MpiCall::Send(_) => "MPI_Send",
            MpiCall::Bsend(_) => "MPI_Bsend",
            MpiCall::Ssend(_) => "MPI_Ssend",
            MpiCall::Rsend(_) => "MPI_Rsend",
            MpiCall::Recv(_) => "MPI_Recv",
            MpiCall::Isend(_) => "MPI_Isend",
            MpiCall::Ibsend(_) => "MPI_Ibsend",
            MpiCall::Issend(_) => "MPI_Issend",
            MpiCall::Irsend(_) => "MPI_Irsend",
            MpiCall::Irecv(_) => "MPI_Irecv",
            MpiCall::Wait { .. } => "MPI_Wait",
            MpiCall::Waitany { .. } => "MPI_Waitany",
            MpiCall::Waitall { .. } => "MPI_Waitall",
            MpiCall::Waitsome { .. } => "MPI_Waitsome",
            MpiCall::Test { .. } => "MPI_Test",
            MpiCall::Testany { .. } => "MPI_Testany",
            MpiCall::Testall { .. } => "MPI_Testall",
            MpiCall::Testsome { .. } => "MPI_Testsome",
            MpiCall::Barrier { .. } => "MPI_Barrier",
            MpiCall::Bcast { .. } => "MPI_Bcast",
            MpiCall::Gather(_) => "MPI_Gather",
            MpiCall::Gatherv { .. } => "MPI_Gatherv",
            MpiCall::Scatter(_) => "MPI_Scatter",
            MpiCall::Scatterv { .. } => "MPI_Scatterv",
            MpiCall::Reduce { .. } => "MPI_Reduce",
            MpiCall::Scan { .. } => "MPI_Scan",
            MpiCall::Allgather(_) => "MPI_Allgather",
            MpiCall::Allgatherv { .. } => "MPI_Allgatherv",
            MpiCall::Alltoall(_) => "MPI_Alltoall",
            MpiCall::Alltoallv { .. } => "MPI_Alltoallv",
            MpiCall::Allreduce { .. } => "MPI_Allreduce",
            MpiCall::ReduceScatter { .. } => "MPI_Reduce_scatter",
            MpiCall::GroupUnion(_) => "MPI_Group_union",
            MpiCall::GroupDifference(_) => "MPI_Group_difference",
            MpiCall::GroupIntersection(_) => "MPI_Group_intersection",
            MpiCall::GroupIncl(_) => "MPI_Group_incl",
            MpiCall::GroupExcl(_) => "MPI_Group_excl",
            MpiCall::GroupRangeIncl { .. } => "MPI_Group_range_incl",
            MpiCall::CommDup { .. } => "MPI_Comm_dup",
            MpiCall::CommGroup { .. } => "MPI_Comm_group",
            MpiCall::CommCreate { .. } => "MPI_Comm_create",
            MpiCall::CommSplit { .. } => "MPI_Comm_split",
            MpiCall::TypeContiguous { .. } => "MPI_Type_contiguous",
            MpiCall::TypeVector(_) => "MPI_Type_vector",
            MpiCall::TypeHvector(_) => "MPI_Type_hvector",
            MpiCall::TypeCreateHvector(_) => "MPI_Type_create_hvector",
            MpiCall::TypeIndexed(_) => "MPI_Type_indexed",
            MpiCall::TypeHindexed(_) => "MPI_Type_hindexed",
            MpiCall::TypeCreateHindexed(_) => "MPI_Type_create_hindexed",
            MpiCall::TypeStruct(_) => "MPI_Type_struct",
            MpiCall::TypeCreateStruct(_) => "MPI_Type_create_struct",
            MpiCall::TypeCreateSubarray { .. } => "MPI_Type_create_subarray",
            MpiCall::Generic { name } => name,
        };
        Some(name)
    }
}
