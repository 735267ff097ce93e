//! Logical bytes moved by collective operations.
//!
//! The numbers follow Score-P's accounting rather than the physical traffic
//! of any algorithm, so traces stay comparable across tools: a broadcast root
//! is credited with `bytes * group_size` sent although it sends the buffer
//! once per peer at most.

use crate::comm::CommView;
use crate::datatype::{TypeRegistry, saturating_sum};
use crate::types::{DatatypeId, UNDEFINED_ROOT};
use serde::{Deserialize, Serialize};

/// Collective kinds as they appear in collective-end records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectiveOp {
    Barrier,
    Bcast,
    Gather,
    Gatherv,
    Scatter,
    Scatterv,
    Reduce,
    Scan,
    Allgather,
    Allgatherv,
    Alltoall,
    Alltoallv,
    Allreduce,
    ReduceScatter,
}

/// `count` elements of `datatype`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    pub count: u64,
    pub datatype: DatatypeId,
}

impl Buffer {
    pub fn new(count: u64, datatype: DatatypeId) -> Self {
        Self { count, datatype }
    }
}

/// Per-peer element counts of a v-variant collective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts<'a> {
    pub counts: &'a [u64],
    pub datatype: DatatypeId,
}

impl<'a> Counts<'a> {
    pub fn new(counts: &'a [u64], datatype: DatatypeId) -> Self {
        Self { counts, datatype }
    }
}

/// This rank's contribution to one collective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traffic {
    pub op: CollectiveOp,
    /// Communicator-relative root, [`UNDEFINED_ROOT`] if the collective has none
    pub root: u32,
    pub sent: u64,
    pub received: u64,
}

/// Byte accounting for one rank within one communicator
pub struct Accountant<'a> {
    types: &'a TypeRegistry,
    comm: CommView,
}

impl<'a> Accountant<'a> {
    pub fn new(types: &'a TypeRegistry, comm: CommView) -> Self {
        Self { types, comm }
    }

    fn bytes(&self, buffer: Buffer) -> u64 {
        self.types.count_bytes(buffer.datatype, buffer.count)
    }

    fn total(&self, counts: Counts<'_>) -> u64 {
        self.types
            .count_bytes(counts.datatype, saturating_sum(counts.counts))
    }

    fn size(&self) -> u64 {
        u64::from(self.comm.size)
    }

    /// `bytes` once per communicator member, clamped at `u64::MAX`
    fn per_member(&self, bytes: u64) -> u64 {
        bytes.saturating_mul(self.size())
    }

    fn is_root(&self, root: u32) -> bool {
        self.comm.rank == root
    }

    fn rooted(&self, op: CollectiveOp, root: u32, sent: u64, received: u64) -> Traffic {
        Traffic {
            op,
            root,
            sent,
            received,
        }
    }

    fn unrooted(&self, op: CollectiveOp, sent: u64, received: u64) -> Traffic {
        self.rooted(op, UNDEFINED_ROOT, sent, received)
    }

    pub fn barrier(&self) -> Traffic {
        self.unrooted(CollectiveOp::Barrier, 0, 0)
    }

    pub fn bcast(&self, buffer: Buffer, root: u32) -> Traffic {
        let bytes = self.bytes(buffer);
        let sent = if self.is_root(root) { self.per_member(bytes) } else { 0 };
        self.rooted(CollectiveOp::Bcast, root, sent, bytes)
    }

    pub fn gather(&self, send: Buffer, recv: Buffer, root: u32) -> Traffic {
        let received = if self.is_root(root) {
            self.per_member(self.bytes(recv))
        } else {
            0
        };
        self.rooted(CollectiveOp::Gather, root, self.bytes(send), received)
    }

    pub fn gatherv(&self, send: Buffer, recv: Counts<'_>, root: u32) -> Traffic {
        let received = if self.is_root(root) { self.total(recv) } else { 0 };
        self.rooted(CollectiveOp::Gatherv, root, self.bytes(send), received)
    }

    pub fn scatter(&self, send: Buffer, recv: Buffer, root: u32) -> Traffic {
        let sent = if self.is_root(root) {
            self.per_member(self.bytes(send))
        } else {
            0
        };
        self.rooted(CollectiveOp::Scatter, root, sent, self.bytes(recv))
    }

    pub fn scatterv(&self, send: Counts<'_>, recv: Buffer, root: u32) -> Traffic {
        let sent = if self.is_root(root) { self.total(send) } else { 0 };
        self.rooted(CollectiveOp::Scatterv, root, sent, self.bytes(recv))
    }

    pub fn reduce(&self, buffer: Buffer, root: u32) -> Traffic {
        let bytes = self.bytes(buffer);
        let received = if self.is_root(root) { self.per_member(bytes) } else { 0 };
        self.rooted(CollectiveOp::Reduce, root, bytes, received)
    }

    /// Ranks send their prefix to every later rank and receive from every earlier one
    pub fn scan(&self, buffer: Buffer) -> Traffic {
        let bytes = self.bytes(buffer);
        let rank = u64::from(self.comm.rank);
        let later = self.size().saturating_sub(rank + 1);
        self.unrooted(
            CollectiveOp::Scan,
            later.saturating_mul(bytes),
            (rank + 1).saturating_mul(bytes),
        )
    }

    pub fn allgather(&self, send: Buffer, recv: Buffer) -> Traffic {
        self.unrooted(
            CollectiveOp::Allgather,
            self.per_member(self.bytes(send)),
            self.per_member(self.bytes(recv)),
        )
    }

    pub fn allgatherv(&self, send: Buffer, recv: Counts<'_>) -> Traffic {
        self.unrooted(
            CollectiveOp::Allgatherv,
            self.per_member(self.bytes(send)),
            self.total(recv),
        )
    }

    /// Both directions are credited from the receive buffer
    pub fn alltoall(&self, _send: Buffer, recv: Buffer) -> Traffic {
        let transmitted = self.per_member(self.bytes(recv));
        self.unrooted(CollectiveOp::Alltoall, transmitted, transmitted)
    }

    pub fn alltoallv(&self, send: Counts<'_>, recv: Counts<'_>) -> Traffic {
        self.unrooted(CollectiveOp::Alltoallv, self.total(send), self.total(recv))
    }

    pub fn allreduce(&self, buffer: Buffer) -> Traffic {
        let bytes = self.per_member(self.bytes(buffer));
        self.unrooted(CollectiveOp::Allreduce, bytes, bytes)
    }

    /// `recv_counts` is indexed by communicator rank; a short list counts as zero
    pub fn reduce_scatter(&self, recv_counts: &[u64], datatype: DatatypeId) -> Traffic {
        let sent = self.types.count_bytes(datatype, self.size());
        let mine = recv_counts
            .get(self.comm.rank as usize)
            .copied()
            .unwrap_or(0);
        let received = self.types.count_bytes(datatype, self.per_member(mine));
        self.unrooted(CollectiveOp::ReduceScatter, sent, received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOUBLE: DatatypeId = DatatypeId(8);

    fn types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register(DOUBLE, 8);
        types
    }

    fn view(rank: u32) -> CommView {
        CommView { size: 4, rank }
    }

    fn io(t: Traffic) -> (u64, u64) {
        (t.sent, t.received)
    }

    const TEN: Buffer = Buffer {
        count: 10,
        datatype: DOUBLE,
    };

    #[test]
    fn test_bcast_root_and_non_root() {
        let types = types();
        assert_eq!(io(Accountant::new(&types, view(0)).bcast(TEN, 0)), (320, 80));
        assert_eq!(io(Accountant::new(&types, view(2)).bcast(TEN, 0)), (0, 80));
    }

    #[test]
    fn test_root_is_communicator_relative() {
        let types = types();
        let traffic = Accountant::new(&types, view(3)).bcast(TEN, 3);
        assert_eq!(traffic.root, 3);
        assert_eq!(traffic.sent, 320);
    }

    #[test]
    fn test_allreduce_and_barrier() {
        let types = types();
        let acct = Accountant::new(&types, view(1));
        assert_eq!(io(acct.allreduce(TEN)), (320, 320));
        assert_eq!(io(acct.barrier()), (0, 0));
        assert_eq!(acct.barrier().root, UNDEFINED_ROOT);
    }

    #[test]
    fn test_scan_depends_on_rank() {
        let types = types();
        assert_eq!(io(Accountant::new(&types, view(1)).scan(TEN)), (160, 160));
        assert_eq!(io(Accountant::new(&types, view(0)).scan(TEN)), (240, 80));
        assert_eq!(io(Accountant::new(&types, view(3)).scan(TEN)), (0, 320));
    }

    #[test]
    fn test_gather_and_scatter() {
        let types = types();
        let root = Accountant::new(&types, view(0));
        let leaf = Accountant::new(&types, view(1));
        assert_eq!(io(root.gather(TEN, TEN, 0)), (80, 320));
        assert_eq!(io(leaf.gather(TEN, TEN, 0)), (80, 0));
        assert_eq!(io(root.scatter(TEN, TEN, 0)), (320, 80));
        assert_eq!(io(leaf.scatter(TEN, TEN, 0)), (0, 80));
        assert_eq!(io(root.reduce(TEN, 0)), (80, 320));
        assert_eq!(io(leaf.reduce(TEN, 0)), (80, 0));
    }

    #[test]
    fn test_v_variants_sum_counts() {
        let types = types();
        let counts = [1, 2, 3, 4];
        let root = Accountant::new(&types, view(0));
        let leaf = Accountant::new(&types, view(2));
        assert_eq!(io(root.gatherv(TEN, Counts::new(&counts, DOUBLE), 0)), (80, 80));
        assert_eq!(io(leaf.gatherv(TEN, Counts::new(&counts, DOUBLE), 0)), (80, 0));
        assert_eq!(io(root.scatterv(Counts::new(&counts, DOUBLE), TEN, 0)), (80, 80));
        assert_eq!(io(leaf.scatterv(Counts::new(&counts, DOUBLE), TEN, 0)), (0, 80));
        assert_eq!(io(leaf.allgatherv(TEN, Counts::new(&counts, DOUBLE))), (320, 80));
        assert_eq!(
            io(leaf.alltoallv(Counts::new(&counts, DOUBLE), Counts::new(&[4, 4, 4, 4], DOUBLE))),
            (80, 128)
        );
    }

    #[test]
    fn test_all_to_all_family() {
        let types = types();
        let acct = Accountant::new(&types, view(1));
        let five = Buffer::new(5, DOUBLE);
        assert_eq!(io(acct.allgather(TEN, five)), (320, 160));
        assert_eq!(io(acct.alltoall(TEN, five)), (160, 160));
    }

    #[test]
    fn test_reduce_scatter_uses_own_count() {
        let types = types();
        let acct = Accountant::new(&types, view(2));
        assert_eq!(io(acct.reduce_scatter(&[1, 2, 3, 4], DOUBLE)), (32, 96));
    }

    #[test]
    fn test_unknown_type_counts_four_bytes() {
        let types = types();
        let acct = Accountant::new(&types, view(0));
        assert_eq!(io(acct.allreduce(Buffer::new(10, DatatypeId(77)))), (160, 160));
    }

    #[test]
    fn test_huge_counts_saturate() {
        let types = types();
        let huge = Buffer::new(1 << 61, DOUBLE);
        let root = Accountant::new(&types, view(0));
        let leaf = Accountant::new(&types, view(3));
        assert_eq!(io(root.bcast(huge, 0)), (u64::MAX, u64::MAX));
        assert_eq!(io(leaf.scan(huge)), (0, u64::MAX));
        assert_eq!(io(leaf.allreduce(huge)), (u64::MAX, u64::MAX));
        assert_eq!(io(root.reduce_scatter(&[u64::MAX], DOUBLE)).1, u64::MAX);
        assert_eq!(
            io(root.gatherv(TEN, Counts::new(&[u64::MAX, 1], DOUBLE), 0)).1,
            u64::MAX
        );
    }
}
