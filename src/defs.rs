//! Global definitions of a converted run and per-rank mapping tables.
//!
//! Definitions are built once every rank has been replayed and communicator
//! ids have been agreed on. Strings come first so that everything after them
//! can reference a string id. Group and communicator ids are contiguous.

use crate::comm::{COMM_SELF_GLOBAL_ID, COMM_WORLD_GLOBAL_ID, CommKind};
use crate::names::NameTable;
use crate::types::{CommId, TimeWindow, Timestamp};
use crate::writer::RankOutcome;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Id of the group holding every location
pub const LOCATIONS_GROUP_ID: u32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockProperties {
    /// Ticks per second
    pub resolution: u64,
    pub global_offset: Timestamp,
    pub trace_length: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringDef {
    pub id: u32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParadigmDef {
    pub paradigm: String,
    pub name: u32,
    pub class: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDef {
    pub id: u32,
    pub name: u32,
    pub canonical_name: u32,
    pub role: String,
    pub paradigm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemTreeNodeDef {
    pub id: u32,
    pub name: u32,
    pub class: u32,
    pub parent: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationGroupDef {
    pub id: u32,
    pub name: u32,
    pub kind: String,
    pub system_tree_parent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDef {
    pub id: u32,
    pub name: u32,
    pub kind: String,
    pub events: u64,
    pub location_group: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupKind {
    CommLocations,
    CommGroup,
    CommSelf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDef {
    pub id: u32,
    pub name: u32,
    pub kind: GroupKind,
    pub paradigm: String,
    /// Global ranks
    pub members: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommDef {
    pub id: u32,
    pub name: u32,
    pub group: u32,
    pub parent: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDefinitions {
    pub clock: ClockProperties,
    pub strings: Vec<StringDef>,
    pub paradigm: ParadigmDef,
    pub regions: Vec<RegionDef>,
    pub system_tree_nodes: Vec<SystemTreeNodeDef>,
    pub location_groups: Vec<LocationGroupDef>,
    pub locations: Vec<LocationDef>,
    pub groups: Vec<GroupDef>,
    pub comms: Vec<CommDef>,
}

impl GlobalDefinitions {
    pub fn string(&self, id: u32) -> Option<&str> {
        self.strings
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.value.as_str())
    }

    pub fn comm(&self, id: u32) -> Option<&CommDef> {
        self.comms.iter().find(|c| c.id == id)
    }

    pub fn group(&self, id: u32) -> Option<&GroupDef> {
        self.groups.iter().find(|g| g.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMapping {
    pub local: u32,
    pub global: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommMapping {
    pub handle: CommId,
    pub global: u32,
}

/// Translation of one rank's local ids to global definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalDefinitions {
    pub regions: Vec<RegionMapping>,
    pub comms: Vec<CommMapping>,
}

impl LocalDefinitions {
    pub fn region(&self, local: u32) -> Option<u32> {
        self.regions
            .iter()
            .find(|m| m.local == local)
            .map(|m| m.global)
    }

    pub fn comm(&self, handle: CommId) -> Option<u32> {
        self.comms
            .iter()
            .find(|m| m.handle == handle)
            .map(|m| m.global)
    }
}

/// A communicator as first seen by any rank
struct CommEntry {
    kind: CommKind,
    members: Vec<u32>,
    parent: Option<u32>,
}

/// Build global definitions and one mapping table per outcome, in the order
/// of `outcomes`.
pub fn build(
    world_size: u32,
    clock_resolution: u64,
    outcomes: &[RankOutcome],
) -> (GlobalDefinitions, Vec<LocalDefinitions>) {
    if clock_resolution == 0 {
        error!("Clock resolution not set");
    }
    for outcome in outcomes {
        check_registration(outcome);
    }

    let mut window = TimeWindow::new();
    for outcome in outcomes {
        window.merge(&outcome.window);
    }
    let clock = ClockProperties {
        resolution: clock_resolution,
        global_offset: if window.is_empty() { 0 } else { window.start },
        trace_length: window.length(),
    };

    let mut strings = NameTable::new();
    strings.insert("");
    let mpi = strings.insert("MPI");
    let locations_name = strings.insert("LOCATIONS_GROUP");
    let machine = strings.insert("machine");
    let node = strings.insert("node");

    // Region names, unioned over ranks in rank order
    let mut region_names = NameTable::new();
    let mut locals: Vec<LocalDefinitions> = outcomes
        .iter()
        .map(|outcome| LocalDefinitions {
            regions: outcome
                .regions
                .iter()
                .map(|(local, name)| RegionMapping {
                    local,
                    global: region_names.insert(name),
                })
                .collect(),
            comms: Vec::new(),
        })
        .collect();
    let region_strings: Vec<u32> = region_names
        .iter()
        .map(|(_, name)| strings.insert(name))
        .collect();

    let rank_names: Vec<(u32, u32)> = (0..world_size)
        .map(|rank| {
            (
                strings.insert(&format!("MPI Rank {rank}")),
                strings.insert(&format!("Master Thread {rank}")),
            )
        })
        .collect();

    let comms = collect_comms(outcomes);
    let comm_names: BTreeMap<u32, u32> = comms
        .iter()
        .map(|(&id, entry)| {
            let name = match entry.kind {
                CommKind::World => "MPI_COMM_WORLD".to_string(),
                CommKind::SelfComm => "MPI_COMM_SELF".to_string(),
                CommKind::Derived => format!("MPI Comm {id}"),
            };
            (id, strings.insert(&name))
        })
        .collect();

    let regions = region_strings
        .iter()
        .enumerate()
        .map(|(id, &name)| RegionDef {
            id: id as u32,
            name,
            canonical_name: name,
            role: "FUNCTION".to_string(),
            paradigm: "MPI".to_string(),
        })
        .collect();

    let system_tree_nodes = vec![SystemTreeNodeDef {
        id: 0,
        name: machine,
        class: node,
        parent: None,
    }];

    let location_groups = rank_names
        .iter()
        .enumerate()
        .map(|(rank, &(name, _))| LocationGroupDef {
            id: rank as u32,
            name,
            kind: "PROCESS".to_string(),
            system_tree_parent: 0,
        })
        .collect();

    let mut events = vec![0; world_size as usize];
    for outcome in outcomes {
        if let Some(count) = events.get_mut(outcome.world.rank as usize) {
            *count = outcome.events;
        }
    }
    let locations = rank_names
        .iter()
        .enumerate()
        .map(|(rank, &(_, thread))| LocationDef {
            id: rank as u32,
            name: thread,
            kind: "CPU_THREAD".to_string(),
            events: events[rank],
            location_group: rank as u32,
        })
        .collect();

    let mut groups = vec![GroupDef {
        id: LOCATIONS_GROUP_ID,
        name: locations_name,
        kind: GroupKind::CommLocations,
        paradigm: "MPI".to_string(),
        members: (0..world_size).collect(),
    }];
    let mut comm_defs = Vec::with_capacity(comms.len());
    for (&id, entry) in &comms {
        let group = groups.len() as u32;
        groups.push(GroupDef {
            id: group,
            name: strings.insert(""),
            kind: if entry.kind == CommKind::SelfComm {
                GroupKind::CommSelf
            } else {
                GroupKind::CommGroup
            },
            paradigm: "MPI".to_string(),
            members: if entry.kind == CommKind::SelfComm {
                Vec::new()
            } else {
                entry.members.clone()
            },
        });
        comm_defs.push(CommDef {
            id,
            name: comm_names[&id],
            group,
            parent: entry.parent,
        });
    }

    for (local, outcome) in locals.iter_mut().zip(outcomes) {
        local.comms = outcome
            .comms
            .handle_mappings()
            .into_iter()
            .map(|(handle, global)| CommMapping { handle, global })
            .collect();
    }

    let defs = GlobalDefinitions {
        clock,
        strings: strings
            .iter()
            .map(|(id, value)| StringDef {
                id,
                value: value.to_string(),
            })
            .collect(),
        paradigm: ParadigmDef {
            paradigm: "MPI".to_string(),
            name: mpi,
            class: "PROCESS".to_string(),
        },
        regions,
        system_tree_nodes,
        location_groups,
        locations,
        groups,
        comms: comm_defs,
    };
    (defs, locals)
}

/// Every agreed communicator keyed by global id, as the first rank to know
/// it describes it
fn collect_comms(outcomes: &[RankOutcome]) -> BTreeMap<u32, CommEntry> {
    let mut comms = BTreeMap::new();
    for outcome in outcomes {
        let hierarchy = &outcome.comms;
        for comm in hierarchy.communicators() {
            let Some(id) = comm.global_id else {
                continue;
            };
            if comm.kind == CommKind::SelfComm && id != COMM_SELF_GLOBAL_ID {
                warn!("comm-self registered with global id {id}");
            }
            comms.entry(id).or_insert_with(|| CommEntry {
                kind: comm.kind,
                members: hierarchy.members(comm).to_vec(),
                parent: hierarchy.parent_global_id(comm),
            });
        }
    }
    comms
}

fn check_registration(outcome: &RankOutcome) {
    let rank = outcome.world.rank;
    if outcome.comms.comm_world().is_none() {
        error!("MPI_COMM_WORLD not registered on rank {rank}");
    }
    if outcome.comms.comm_self().is_none() {
        error!("MPI_COMM_SELF not registered on rank {rank}");
    }
    if !outcome.comms.has_comm_null() {
        error!("MPI_COMM_NULL not registered on rank {rank}");
    }
    if let Some(world) = outcome.comms.comm_world() {
        if world.global_id != Some(COMM_WORLD_GLOBAL_ID) {
            warn!("MPI_COMM_WORLD on rank {rank} has no agreed id");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Hierarchy;
    use crate::global_id::GlobalIdCollector;
    use crate::types::{GroupId, WorldConfig};

    const WORLD: CommId = CommId(0);
    const SELF: CommId = CommId(1);
    const NULL: CommId = CommId(-1);

    fn outcome(rank: u32, size: u32, regions: &[&str]) -> RankOutcome {
        let world = WorldConfig { rank, size };
        let mut comms = Hierarchy::new(world);
        comms.register_comm_world(WORLD).unwrap();
        comms.register_comm_self(SELF).unwrap();
        comms.register_comm_null(NULL).unwrap();
        comms.comm_group(WORLD, GroupId(1)).unwrap();
        comms
            .group_incl(GroupId(1), &[1, 0], GroupId(2))
            .unwrap();
        comms.comm_dup(WORLD, CommId(5)).unwrap();

        let mut names = NameTable::new();
        for name in regions {
            names.insert(name);
        }
        let mut window = TimeWindow::new();
        window.observe(10 + u64::from(rank), 100);
        RankOutcome {
            world,
            calls: regions.len() as u64,
            events: 2 * regions.len() as u64,
            regions: names,
            comms,
            window,
            pending_requests: 0,
        }
    }

    fn agreed(mut outcomes: Vec<RankOutcome>) -> Vec<RankOutcome> {
        let mut collector = GlobalIdCollector::new();
        for o in &outcomes {
            o.comms.agree(&mut collector);
        }
        let table = collector.seal();
        for o in &mut outcomes {
            o.comms.assign(&table);
        }
        outcomes
    }

    #[test]
    fn test_regions_are_unioned_and_mapped() {
        let outcomes = agreed(vec![
            outcome(0, 2, &["MPI_Send", "MPI_Barrier"]),
            outcome(1, 2, &["MPI_Recv", "MPI_Barrier"]),
        ]);
        let (defs, locals) = build(2, 1_000, &outcomes);

        assert_eq!(defs.regions.len(), 3);
        assert_eq!(locals[0].region(1), Some(1));
        assert_eq!(locals[1].region(0), Some(2));
        assert_eq!(locals[1].region(1), Some(1));
        let barrier = &defs.regions[1];
        assert_eq!(defs.string(barrier.name), Some("MPI_Barrier"));
    }

    #[test]
    fn test_strings_precede_references() {
        let outcomes = agreed(vec![outcome(0, 1, &["MPI_Init"])]);
        let (defs, _) = build(1, 1_000, &outcomes);
        let max_string = defs.strings.len() as u32;
        assert!(defs.regions.iter().all(|r| r.name < max_string));
        assert!(defs.comms.iter().all(|c| c.name < max_string));
        assert!(defs.locations.iter().all(|l| l.name < max_string));
        assert_eq!(defs.string(0), Some(""));
    }

    #[test]
    fn test_groups_and_comms_are_contiguous() {
        let outcomes = agreed(vec![outcome(0, 2, &[]), outcome(1, 2, &[])]);
        let (defs, locals) = build(2, 1_000, &outcomes);

        let group_ids: Vec<u32> = defs.groups.iter().map(|g| g.id).collect();
        assert_eq!(group_ids, vec![0, 1, 2, 3]);
        assert_eq!(defs.groups[0].kind, GroupKind::CommLocations);

        let comm_ids: Vec<u32> = defs.comms.iter().map(|c| c.id).collect();
        assert_eq!(comm_ids, vec![0, 1, 2]);
        assert_eq!(defs.string(defs.comms[0].name), Some("MPI_COMM_WORLD"));
        assert_eq!(defs.string(defs.comms[1].name), Some("MPI_COMM_SELF"));
        assert_eq!(defs.string(defs.comms[2].name), Some("MPI Comm 2"));
        assert_eq!(defs.comms[2].parent, Some(0));
        assert_eq!(defs.group(defs.comms[1].group).unwrap().kind, GroupKind::CommSelf);
        assert_eq!(locals[1].comm(CommId(5)), Some(2));
    }

    #[test]
    fn test_locations_and_clock() {
        let outcomes = agreed(vec![outcome(0, 3, &["MPI_Init"]), outcome(2, 3, &[])]);
        let (defs, _) = build(3, 1_000, &outcomes);

        assert_eq!(defs.locations.len(), 3);
        assert_eq!(defs.locations[0].events, 2);
        assert_eq!(defs.locations[1].events, 0);
        assert_eq!(defs.string(defs.locations[2].name), Some("Master Thread 2"));
        assert_eq!(defs.clock.global_offset, 10);
        assert_eq!(defs.clock.trace_length, 90);
    }
}
