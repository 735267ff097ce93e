//! Per-rank conversion of the call stream into events.
//!
//! Every traced call is bracketed by an enter record at its start and a leave
//! record at its stop. The call-specific work runs in between, and the leave
//! record is written even when that work fails.

use crate::archive::{ArchiveWriter, Event};
use crate::call::{
    CallRecord, Exchange, GroupPair, GroupSelection, IndexedType, MpiCall, NonBlocking,
    PointToPoint, RootedExchange, StructType, VectorType,
};
use crate::collective::{Accountant, Buffer, Counts, Traffic};
use crate::comm::{Derivation, Hierarchy};
use crate::datatype::{TypeConstructor, TypeRegistry};
use crate::error::Result;
use crate::names::NameTable;
use crate::request::{Completion, IrecvCapture, RequestTracker};
use crate::types::{CommId, DatatypeId, RequestId, TimeWindow, Timestamp, WorldConfig};
use log::{info, warn};

/// Everything a rank leaves behind once its stream is exhausted
#[derive(Debug)]
pub struct RankOutcome {
    pub world: WorldConfig,
    pub calls: u64,
    pub events: u64,
    pub regions: NameTable,
    pub comms: Hierarchy,
    pub window: TimeWindow,
    pub pending_requests: usize,
}

pub struct RankWriter<'a, A: ArchiveWriter + ?Sized> {
    world: WorldConfig,
    archive: &'a mut A,
    types: TypeRegistry,
    requests: RequestTracker,
    comms: Hierarchy,
    regions: NameTable,
    window: TimeWindow,
    calls: u64,
    events: u64,
}

impl<'a, A: ArchiveWriter + ?Sized> RankWriter<'a, A> {
    pub fn new(world: WorldConfig, archive: &'a mut A) -> Self {
        Self {
            world,
            archive,
            types: TypeRegistry::new(),
            requests: RequestTracker::new(world.rank),
            comms: Hierarchy::new(world),
            regions: NameTable::new(),
            window: TimeWindow::new(),
            calls: 0,
            events: 0,
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn comms(&self) -> &Hierarchy {
        &self.comms
    }

    pub fn regions(&self) -> &NameTable {
        &self.regions
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Apply one record. Setup records configure the rank; every other call
    /// is bracketed and then interpreted.
    pub fn record(&mut self, record: &CallRecord) -> Result<()> {
        let Some(name) = record.call.region_name() else {
            return self.setup(&record.call);
        };
        let (start, stop) = (record.start, record.stop);

        info!("{name}");
        self.calls += 1;
        self.window.observe(start, stop);
        let region = self.regions.insert(name);

        self.emit(Event::Enter {
            time: start,
            region,
        })?;
        let outcome = self.apply(start, stop, &record.call);
        self.emit(Event::Leave { time: stop, region })?;
        outcome
    }

    pub fn finish(self) -> RankOutcome {
        let pending_requests = self.requests.outstanding();
        if pending_requests > 0 {
            warn!(
                "{} request(s) never completed on rank {}",
                pending_requests, self.world.rank
            );
        }
        RankOutcome {
            world: self.world,
            calls: self.calls,
            events: self.events,
            regions: self.regions,
            comms: self.comms,
            window: self.window,
            pending_requests,
        }
    }

    fn emit(&mut self, event: Event) -> Result<()> {
        self.archive.write_event(self.world.rank, &event)?;
        self.events += 1;
        Ok(())
    }

    fn setup(&mut self, call: &MpiCall) -> Result<()> {
        match call {
            MpiCall::RegisterType { datatype, size } => self.types.register(*datatype, *size),
            MpiCall::RegisterCommWorld { comm } => {
                self.comms.register_comm_world(*comm)?;
            }
            MpiCall::RegisterCommSelf { comm } => {
                self.comms.register_comm_self(*comm)?;
            }
            MpiCall::RegisterCommNull { comm } => self.comms.register_comm_null(*comm)?,
            MpiCall::RegisterCommError { comm } => self.comms.register_comm_error(*comm)?,
            MpiCall::RegisterNullRequest { request } => self.requests.set_null_request(*request),
            _ => {}
        }
        Ok(())
    }

    fn apply(&mut self, start: Timestamp, stop: Timestamp, call: &MpiCall) -> Result<()> {
        match call {
            MpiCall::Send(p) | MpiCall::Bsend(p) | MpiCall::Ssend(p) | MpiCall::Rsend(p) => {
                self.send(start, p)
            }
            MpiCall::Recv(p) => self.recv(start, p),
            MpiCall::Isend(nb) | MpiCall::Ibsend(nb) | MpiCall::Issend(nb) | MpiCall::Irsend(nb) => {
                self.isend(start, nb)
            }
            MpiCall::Irecv(nb) => self.irecv(start, nb),

            MpiCall::Wait { request } | MpiCall::Waitany { request } => {
                let completed = self.requests.complete(*request)?;
                self.emit_completions(start, completed)
            }
            MpiCall::Waitall { requests } => {
                let completed = self.requests.complete_all(requests)?;
                self.emit_completions(start, completed)
            }
            MpiCall::Waitsome { requests, indices } | MpiCall::Testsome { requests, indices } => {
                let completed = self.requests.complete_indexed(requests, indices)?;
                self.emit_completions(start, completed)
            }
            MpiCall::Test { request, flag } => {
                if !flag {
                    return Ok(());
                }
                let completed = self.requests.complete(*request)?;
                self.emit_completions(start, completed)
            }
            MpiCall::Testany {
                requests,
                index,
                flag,
            } => {
                if !flag {
                    return Ok(());
                }
                let completed = self.requests.complete_indexed(requests, &[*index])?;
                self.emit_completions(start, completed)
            }
            MpiCall::Testall { requests, flag } => {
                if !flag {
                    return Ok(());
                }
                let completed = self.requests.complete_all(requests)?;
                self.emit_completions(start, completed)
            }

            MpiCall::Barrier { comm } => {
                let traffic = self.accountant(*comm)?.barrier();
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Bcast {
                count,
                datatype,
                root,
                comm,
            } => {
                let traffic = self
                    .accountant(*comm)?
                    .bcast(Buffer::new(*count, *datatype), *root);
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Gather(x) => {
                let traffic = self
                    .accountant(x.comm)?
                    .gather(send_buffer(x), recv_buffer(x), x.root);
                self.collective(start, stop, x.comm, traffic)
            }
            MpiCall::Scatter(x) => {
                let traffic = self
                    .accountant(x.comm)?
                    .scatter(send_buffer(x), recv_buffer(x), x.root);
                self.collective(start, stop, x.comm, traffic)
            }
            MpiCall::Gatherv {
                send_count,
                send_type,
                recv_counts,
                recv_type,
                root,
                comm,
            } => {
                let traffic = self.accountant(*comm)?.gatherv(
                    Buffer::new(*send_count, *send_type),
                    Counts::new(recv_counts, *recv_type),
                    *root,
                );
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Scatterv {
                send_counts,
                send_type,
                recv_count,
                recv_type,
                root,
                comm,
            } => {
                let traffic = self.accountant(*comm)?.scatterv(
                    Counts::new(send_counts, *send_type),
                    Buffer::new(*recv_count, *recv_type),
                    *root,
                );
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Reduce {
                count,
                datatype,
                root,
                comm,
            } => {
                let traffic = self
                    .accountant(*comm)?
                    .reduce(Buffer::new(*count, *datatype), *root);
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Scan {
                count,
                datatype,
                comm,
            } => {
                let traffic = self
                    .accountant(*comm)?
                    .scan(Buffer::new(*count, *datatype));
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Allreduce {
                count,
                datatype,
                comm,
            } => {
                let traffic = self
                    .accountant(*comm)?
                    .allreduce(Buffer::new(*count, *datatype));
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Allgather(x) => {
                let traffic = self
                    .accountant(x.comm)?
                    .allgather(exchange_send(x), exchange_recv(x));
                self.collective(start, stop, x.comm, traffic)
            }
            MpiCall::Alltoall(x) => {
                let traffic = self
                    .accountant(x.comm)?
                    .alltoall(exchange_send(x), exchange_recv(x));
                self.collective(start, stop, x.comm, traffic)
            }
            MpiCall::Allgatherv {
                send_count,
                send_type,
                recv_counts,
                recv_type,
                comm,
            } => {
                let traffic = self.accountant(*comm)?.allgatherv(
                    Buffer::new(*send_count, *send_type),
                    Counts::new(recv_counts, *recv_type),
                );
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::Alltoallv {
                send_counts,
                send_type,
                recv_counts,
                recv_type,
                comm,
            } => {
                let traffic = self.accountant(*comm)?.alltoallv(
                    Counts::new(send_counts, *send_type),
                    Counts::new(recv_counts, *recv_type),
                );
                self.collective(start, stop, *comm, traffic)
            }
            MpiCall::ReduceScatter {
                recv_counts,
                datatype,
                comm,
            } => {
                let traffic = self
                    .accountant(*comm)?
                    .reduce_scatter(recv_counts, *datatype);
                self.collective(start, stop, *comm, traffic)
            }

            MpiCall::GroupUnion(GroupPair { first, second, new }) => self
                .comms
                .group_union(*first, *second, *new)
                .map(drop),
            MpiCall::GroupDifference(GroupPair { first, second, new }) => self
                .comms
                .group_difference(*first, *second, *new)
                .map(drop),
            MpiCall::GroupIntersection(GroupPair { first, second, new }) => self
                .comms
                .group_intersection(*first, *second, *new)
                .map(drop),
            MpiCall::GroupIncl(GroupSelection { group, ranks, new }) => {
                self.comms.group_incl(*group, ranks, *new).map(drop)
            }
            MpiCall::GroupExcl(GroupSelection { group, ranks, new }) => {
                self.comms.group_excl(*group, ranks, *new).map(drop)
            }
            MpiCall::GroupRangeIncl { group, ranges, new } => {
                self.comms.group_range_incl(*group, ranges, *new).map(drop)
            }
            MpiCall::CommDup { comm, new } => self.comms.comm_dup(*comm, *new).map(drop),
            MpiCall::CommGroup { comm, group } => self.comms.comm_group(*comm, *group).map(drop),
            MpiCall::CommCreate { comm, group, new } => {
                self.comms.comm_create(*comm, *group, *new).map(drop)
            }
            MpiCall::CommSplit {
                comm,
                color,
                key,
                new,
            } => {
                if self.comms.comm_split(*comm, *color, *key, *new) == Derivation::Unmodeled {
                    warn!(
                        "MPI_Comm_split on rank {}: communicator ({}) is not tracked",
                        self.world.rank, new
                    );
                }
                Ok(())
            }

            MpiCall::TypeContiguous { count, old, new } => self.derive(
                *new,
                TypeConstructor::Contiguous {
                    count: *count,
                    old: *old,
                },
            ),
            MpiCall::TypeVector(v) | MpiCall::TypeHvector(v) | MpiCall::TypeCreateHvector(v) => {
                let VectorType {
                    count,
                    block_length,
                    old,
                    new,
                } = *v;
                self.derive(
                    new,
                    TypeConstructor::Vector {
                        count,
                        block_length,
                        old,
                    },
                )
            }
            MpiCall::TypeIndexed(t)
            | MpiCall::TypeHindexed(t)
            | MpiCall::TypeCreateHindexed(t) => {
                let IndexedType { lengths, old, new } = t;
                self.derive(
                    *new,
                    TypeConstructor::Indexed {
                        lengths: lengths.clone(),
                        old: *old,
                    },
                )
            }
            MpiCall::TypeStruct(t) | MpiCall::TypeCreateStruct(t) => {
                let StructType {
                    block_lengths,
                    old_types,
                    new,
                } = t;
                if block_lengths.len() != old_types.len() {
                    warn!(
                        "struct type ({}) has {} block lengths but {} types",
                        new,
                        block_lengths.len(),
                        old_types.len()
                    );
                }
                let blocks = block_lengths
                    .iter()
                    .copied()
                    .zip(old_types.iter().copied())
                    .collect();
                self.derive(*new, TypeConstructor::Struct { blocks })
            }
            MpiCall::TypeCreateSubarray { subsizes, old, new } => self.derive(
                *new,
                TypeConstructor::Subarray {
                    subsizes: subsizes.clone(),
                    old: *old,
                },
            ),

            MpiCall::Generic { .. } => Ok(()),

            MpiCall::RegisterType { .. }
            | MpiCall::RegisterCommWorld { .. }
            | MpiCall::RegisterCommSelf { .. }
            | MpiCall::RegisterCommNull { .. }
            | MpiCall::RegisterCommError { .. }
            | MpiCall::RegisterNullRequest { .. } => self.setup(call),
        }
    }

    fn send(&mut self, time: Timestamp, p: &PointToPoint) -> Result<()> {
        let bytes = self.types.count_bytes(p.datatype, p.count);
        self.emit(Event::MpiSend {
            time,
            receiver: p.peer,
            comm: p.comm,
            tag: p.tag,
            bytes,
        })
    }

    fn recv(&mut self, time: Timestamp, p: &PointToPoint) -> Result<()> {
        let bytes = self.types.count_bytes(p.datatype, p.count);
        self.emit(Event::MpiRecv {
            time,
            sender: p.peer,
            comm: p.comm,
            tag: p.tag,
            bytes,
        })
    }

    fn isend(&mut self, time: Timestamp, nb: &NonBlocking) -> Result<()> {
        let bytes = self.types.count_bytes(nb.datatype, nb.count);
        self.requests.begin_isend(nb.request);
        self.emit(Event::MpiIsend {
            time,
            receiver: nb.peer,
            comm: nb.comm,
            tag: nb.tag,
            bytes,
            request: nb.request,
        })
    }

    fn irecv(&mut self, time: Timestamp, nb: &NonBlocking) -> Result<()> {
        let capture = IrecvCapture {
            bytes: self.types.count_bytes(nb.datatype, nb.count),
            source: nb.peer,
            tag: nb.tag,
            comm: nb.comm,
        };
        self.requests.begin_irecv(nb.request, capture);
        self.emit(Event::MpiIrecvRequest {
            time,
            request: nb.request,
        })
    }

    /// Completion records carry the time the wait/test call started
    fn emit_completions<I>(&mut self, time: Timestamp, completed: I) -> Result<()>
    where
        I: IntoIterator<Item = Completion>,
    {
        for completion in completed {
            let event = match completion {
                Completion::Isend { request } => Event::MpiIsendComplete { time, request },
                Completion::Irecv { request, capture } => irecv_event(time, request, capture),
            };
            self.emit(event)?;
        }
        Ok(())
    }

    fn accountant(&self, comm: CommId) -> Result<Accountant<'_>> {
        Ok(Accountant::new(&self.types, self.comms.view(comm)?))
    }

    fn collective(
        &mut self,
        start: Timestamp,
        stop: Timestamp,
        comm: CommId,
        traffic: Traffic,
    ) -> Result<()> {
        self.emit(Event::MpiCollectiveBegin { time: start })?;
        self.emit(Event::MpiCollectiveEnd {
            time: stop,
            op: traffic.op,
            comm,
            root: traffic.root,
            sent: traffic.sent,
            received: traffic.received,
        })
    }

    fn derive(&mut self, new: DatatypeId, constructor: TypeConstructor) -> Result<()> {
        self.types.derive(new, &constructor).map(drop)
    }
}

fn irecv_event(time: Timestamp, request: RequestId, capture: IrecvCapture) -> Event {
    Event::MpiIrecv {
        time,
        sender: capture.source,
        comm: capture.comm,
        tag: capture.tag,
        bytes: capture.bytes,
        request,
    }
}

fn send_buffer(x: &RootedExchange) -> Buffer {
    Buffer::new(x.send_count, x.send_type)
}

fn recv_buffer(x: &RootedExchange) -> Buffer {
    Buffer::new(x.recv_count, x.recv_type)
}

fn exchange_send(x: &Exchange) -> Buffer {
    Buffer::new(x.send_count, x.send_type)
}

fn exchange_recv(x: &Exchange) -> Buffer {
    Buffer::new(x.recv_count, x.recv_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::collective::CollectiveOp;
    use crate::error::Error;
    use crate::types::GroupId;
    use std::path::Path;

    const WORLD: CommId = CommId(0);
    const SELF: CommId = CommId(1);
    const NULL_REQUEST: RequestId = RequestId(-1);
    const DOUBLE: DatatypeId = DatatypeId(8);

    fn archive(size: u32) -> MemoryArchive {
        let mut archive = MemoryArchive::new();
        archive.open(Path::new("mem"), size).unwrap();
        archive
    }

    fn setup<A: ArchiveWriter>(writer: &mut RankWriter<'_, A>) {
        for call in [
            MpiCall::RegisterType {
                datatype: DOUBLE,
                size: 8,
            },
            MpiCall::RegisterCommWorld { comm: WORLD },
            MpiCall::RegisterCommSelf { comm: SELF },
            MpiCall::RegisterCommNull { comm: CommId(-1) },
            MpiCall::RegisterNullRequest {
                request: NULL_REQUEST,
            },
        ] {
            writer.record(&CallRecord::setup(call)).unwrap();
        }
    }

    fn p2p(peer: u32, count: u64) -> PointToPoint {
        PointToPoint {
            datatype: DOUBLE,
            count,
            peer,
            comm: WORLD,
            tag: 0,
        }
    }

    fn nb(peer: u32, request: i64) -> NonBlocking {
        NonBlocking {
            datatype: DOUBLE,
            count: 2,
            peer,
            comm: WORLD,
            tag: 5,
            request: RequestId(request),
        }
    }

    #[test]
    fn test_setup_records_emit_nothing() {
        let mut archive = archive(4);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 4 }, &mut archive);
        setup(&mut writer);
        assert_eq!(writer.events(), 0);
        assert!(writer.window().is_empty());
        assert_eq!(writer.types().size_of(DOUBLE), Some(8));
    }

    #[test]
    fn test_send_is_bracketed() {
        let mut archive = archive(4);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 4 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(10, 20, MpiCall::Send(p2p(1, 10))))
            .unwrap();
        writer
            .record(&CallRecord::new(30, 40, MpiCall::Send(p2p(2, 1))))
            .unwrap();
        assert_eq!(writer.events(), 6);
        assert_eq!(writer.regions().len(), 1);
        assert_eq!(writer.window(), TimeWindow { start: 10, stop: 40 });
        drop(writer);

        assert_eq!(
            archive.events(0)[..3],
            [
                Event::Enter { time: 10, region: 0 },
                Event::MpiSend {
                    time: 10,
                    receiver: 1,
                    comm: WORLD,
                    tag: 0,
                    bytes: 80
                },
                Event::Leave { time: 20, region: 0 },
            ]
        );
    }

    #[test]
    fn test_irecv_completes_at_wait_start() {
        let mut archive = archive(2);
        let mut writer = RankWriter::new(WorldConfig { rank: 1, size: 2 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(1, 2, MpiCall::Irecv(nb(0, 7))))
            .unwrap();
        writer
            .record(&CallRecord::new(
                5,
                9,
                MpiCall::Wait {
                    request: RequestId(7),
                },
            ))
            .unwrap();
        let outcome = writer.finish();
        assert_eq!(outcome.pending_requests, 0);
        assert_eq!(outcome.events, 6);

        let events = archive.events(1);
        assert_eq!(
            events[1],
            Event::MpiIrecvRequest {
                time: 1,
                request: RequestId(7)
            }
        );
        assert_eq!(
            events[4],
            Event::MpiIrecv {
                time: 5,
                sender: 0,
                comm: WORLD,
                tag: 5,
                bytes: 16,
                request: RequestId(7)
            }
        );
    }

    #[test]
    fn test_waitall_deduplicates_and_skips_null() {
        let mut archive = archive(2);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 2 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(1, 2, MpiCall::Isend(nb(1, 3))))
            .unwrap();
        writer
            .record(&CallRecord::new(
                3,
                4,
                MpiCall::Waitall {
                    requests: vec![RequestId(3), NULL_REQUEST, RequestId(3)],
                },
            ))
            .unwrap();
        drop(writer);

        let completions: Vec<_> = archive
            .events(0)
            .iter()
            .filter(|e| matches!(e, Event::MpiIsendComplete { .. }))
            .collect();
        assert_eq!(completions.len(), 1);
    }

    #[test]
    fn test_waitsome_completes_repeated_id_once() {
        let mut archive = archive(2);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 2 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(1, 2, MpiCall::Isend(nb(1, 3))))
            .unwrap();
        writer
            .record(&CallRecord::new(
                3,
                4,
                MpiCall::Waitsome {
                    requests: vec![RequestId(3), RequestId(3)],
                    indices: vec![0, 1],
                },
            ))
            .unwrap();
        let outcome = writer.finish();
        assert_eq!(outcome.pending_requests, 0);
        assert_eq!(outcome.events, 3 + 3);
        assert_eq!(
            archive.events(0)[4],
            Event::MpiIsendComplete {
                time: 3,
                request: RequestId(3)
            }
        );
    }

    #[test]
    fn test_testall_with_flag_completes_each_id_once() {
        let mut archive = archive(2);
        let mut writer = RankWriter::new(WorldConfig { rank: 1, size: 2 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(1, 2, MpiCall::Irecv(nb(0, 8))))
            .unwrap();
        writer
            .record(&CallRecord::new(3, 4, MpiCall::Isend(nb(0, 9))))
            .unwrap();
        writer
            .record(&CallRecord::new(
                5,
                6,
                MpiCall::Testall {
                    requests: vec![RequestId(8), NULL_REQUEST, RequestId(9), RequestId(8)],
                    flag: true,
                },
            ))
            .unwrap();
        let outcome = writer.finish();
        assert_eq!(outcome.pending_requests, 0);
        assert_eq!(outcome.events, 3 + 3 + 4);

        let events = archive.events(1);
        assert!(matches!(
            events[7],
            Event::MpiIrecv {
                time: 5,
                request: RequestId(8),
                ..
            }
        ));
        assert_eq!(
            events[8],
            Event::MpiIsendComplete {
                time: 5,
                request: RequestId(9)
            }
        );
    }

    #[test]
    fn test_unknown_request_is_fatal_but_bracket_closes() {
        let mut archive = archive(1);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 1 }, &mut archive);
        setup(&mut writer);
        let err = writer
            .record(&CallRecord::new(
                1,
                2,
                MpiCall::Wait {
                    request: RequestId(99),
                },
            ))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(writer.events(), 2);
        drop(writer);
        assert!(matches!(
            archive.events(0).last(),
            Some(Event::Leave { time: 2, .. })
        ));
    }

    #[test]
    fn test_test_without_flag_completes_nothing() {
        let mut archive = archive(2);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 2 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(1, 2, MpiCall::Isend(nb(1, 4))))
            .unwrap();
        writer
            .record(&CallRecord::new(
                3,
                4,
                MpiCall::Test {
                    request: RequestId(4),
                    flag: false,
                },
            ))
            .unwrap();
        writer
            .record(&CallRecord::new(
                5,
                6,
                MpiCall::Testany {
                    requests: vec![NULL_REQUEST, RequestId(4)],
                    index: 1,
                    flag: true,
                },
            ))
            .unwrap();
        let outcome = writer.finish();
        assert_eq!(outcome.pending_requests, 0);
        assert_eq!(outcome.events, 3 + 2 + 3);
    }

    #[test]
    fn test_collective_on_derived_comm_uses_relative_rank() {
        let mut archive = archive(4);
        let mut writer = RankWriter::new(WorldConfig { rank: 3, size: 4 }, &mut archive);
        setup(&mut writer);
        let calls = [
            MpiCall::CommGroup {
                comm: WORLD,
                group: GroupId(1),
            },
            MpiCall::GroupIncl(GroupSelection {
                group: GroupId(1),
                ranks: vec![2, 3],
                new: GroupId(2),
            }),
            MpiCall::CommCreate {
                comm: WORLD,
                group: GroupId(2),
                new: CommId(10),
            },
            MpiCall::Bcast {
                count: 10,
                datatype: DOUBLE,
                root: 1,
                comm: CommId(10),
            },
        ];
        for (i, call) in calls.into_iter().enumerate() {
            let t = i as u64 * 10;
            writer.record(&CallRecord::new(t, t + 5, call)).unwrap();
        }
        drop(writer);

        let end = archive
            .events(3)
            .iter()
            .find(|e| matches!(e, Event::MpiCollectiveEnd { .. }))
            .cloned();
        assert_eq!(
            end,
            Some(Event::MpiCollectiveEnd {
                time: 35,
                op: CollectiveOp::Bcast,
                comm: CommId(10),
                root: 1,
                sent: 160,
                received: 80,
            })
        );
    }

    #[test]
    fn test_unimplemented_group_op_still_brackets() {
        let mut archive = archive(1);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 1 }, &mut archive);
        setup(&mut writer);
        let err = writer
            .record(&CallRecord::new(
                1,
                2,
                MpiCall::GroupUnion(GroupPair {
                    first: GroupId(1),
                    second: GroupId(2),
                    new: GroupId(3),
                }),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::Unimplemented(_)));
        assert!(!err.is_fatal());
        assert_eq!(writer.events(), 2);
    }

    #[test]
    fn test_split_comm_is_unknown_to_collectives() {
        let mut archive = archive(2);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 2 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(
                1,
                2,
                MpiCall::CommSplit {
                    comm: WORLD,
                    color: 0,
                    key: 0,
                    new: CommId(20),
                },
            ))
            .unwrap();
        let err = writer
            .record(&CallRecord::new(3, 4, MpiCall::Barrier { comm: CommId(20) }))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownComm(CommId(20))));
    }

    #[test]
    fn test_derived_type_sizes_later_transfers() {
        let mut archive = archive(2);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 2 }, &mut archive);
        setup(&mut writer);
        writer
            .record(&CallRecord::new(
                1,
                2,
                MpiCall::TypeContiguous {
                    count: 3,
                    old: DOUBLE,
                    new: DatatypeId(100),
                },
            ))
            .unwrap();
        assert_eq!(writer.types().size_of(DatatypeId(100)), Some(24));

        let err = writer
            .record(&CallRecord::new(
                3,
                4,
                MpiCall::TypeVector(VectorType {
                    count: 2,
                    block_length: 2,
                    old: DatatypeId(55),
                    new: DatatypeId(101),
                }),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownType(DatatypeId(55))));
    }

    #[test]
    fn test_generic_call_is_a_plain_bracket() {
        let mut archive = archive(1);
        let mut writer = RankWriter::new(WorldConfig { rank: 0, size: 1 }, &mut archive);
        writer
            .record(&CallRecord::new(
                0,
                1,
                MpiCall::Generic {
                    name: "MPI_Init".to_string(),
                },
            ))
            .unwrap();
        assert_eq!(writer.events(), 2);
        assert_eq!(writer.regions().get("MPI_Init"), Some(0));
    }
}
