//! Groups and communicators as one rank sees them.
//!
//! Communicators form a forest rooted at comm-world and comm-self. Derived
//! communicators hang below the communicator they were created from, in
//! creation order. Nodes are never removed: freeing a communicator only
//! makes its handle reusable.

use crate::error::{Error, Result};
use crate::global_id::{GlobalIdCollector, GlobalIdTable, TreePosition};
use crate::types::{CommId, GroupId, WorldConfig};
use log::warn;
use std::collections::{BTreeSet, HashMap};

/// Global id of comm-world
pub const COMM_WORLD_GLOBAL_ID: u32 = 0;
/// Global id of comm-self
pub const COMM_SELF_GLOBAL_ID: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommIndex(pub usize);

/// Ordered global ranks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub members: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommKind {
    World,
    SelfComm,
    Derived,
}

#[derive(Debug, Clone)]
pub struct Communicator {
    /// Handle the trace currently uses for this node, if any
    pub handle: Option<CommId>,
    pub kind: CommKind,
    pub group: GroupIndex,
    pub global_id: Option<u32>,
    /// This rank is the lowest global rank among the members
    pub is_root: bool,
    pub parent: Option<CommIndex>,
    pub children: Vec<CommIndex>,
}

/// Structural result of a derivation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Communicator(CommIndex),
    Group(GroupIndex),
    /// The call is traced but its structure is not tracked
    Unmodeled,
}

/// Size of a communicator and this rank's position in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommView {
    pub size: u32,
    pub rank: u32,
}

#[derive(Debug)]
pub struct Hierarchy {
    world: WorldConfig,
    groups: Vec<Group>,
    group_handles: HashMap<GroupId, GroupIndex>,
    comms: Vec<Communicator>,
    comm_handles: HashMap<CommId, CommIndex>,
    comm_world: Option<CommIndex>,
    comm_self: Option<CommIndex>,
    comm_null: Option<CommId>,
    comm_error: Option<CommId>,
}

impl Hierarchy {
    pub fn new(world: WorldConfig) -> Self {
        Self {
            world,
            groups: Vec::new(),
            group_handles: HashMap::new(),
            comms: Vec::new(),
            comm_handles: HashMap::new(),
            comm_world: None,
            comm_self: None,
            comm_null: None,
            comm_error: None,
        }
    }

    pub fn register_comm_world(&mut self, handle: CommId) -> Result<CommIndex> {
        if self.comm_world.is_some() {
            return Err(Error::AlreadyRegistered("MPI_COMM_WORLD"));
        }
        let group = self.add_group((0..self.world.size).collect());
        let index = self.add_comm(Communicator {
            handle: Some(handle),
            kind: CommKind::World,
            group,
            global_id: Some(COMM_WORLD_GLOBAL_ID),
            is_root: self.world.rank == 0,
            parent: None,
            children: Vec::new(),
        });
        self.comm_world = Some(index);
        Ok(index)
    }

    pub fn register_comm_self(&mut self, handle: CommId) -> Result<CommIndex> {
        if self.comm_self.is_some() {
            return Err(Error::AlreadyRegistered("MPI_COMM_SELF"));
        }
        let group = self.add_group(vec![self.world.rank]);
        let index = self.add_comm(Communicator {
            handle: Some(handle),
            kind: CommKind::SelfComm,
            group,
            global_id: Some(COMM_SELF_GLOBAL_ID),
            is_root: true,
            parent: None,
            children: Vec::new(),
        });
        self.comm_self = Some(index);
        Ok(index)
    }

    pub fn register_comm_null(&mut self, handle: CommId) -> Result<()> {
        if self.comm_null.replace(handle).is_some() {
            return Err(Error::AlreadyRegistered("MPI_COMM_NULL"));
        }
        Ok(())
    }

    pub fn register_comm_error(&mut self, handle: CommId) -> Result<()> {
        if self.comm_error.replace(handle).is_some() {
            return Err(Error::AlreadyRegistered("MPI_ERRORS"));
        }
        Ok(())
    }

    pub fn comm_world(&self) -> Option<&Communicator> {
        self.comm_world.map(|i| &self.comms[i.0])
    }

    pub fn comm_self(&self) -> Option<&Communicator> {
        self.comm_self.map(|i| &self.comms[i.0])
    }

    pub fn has_comm_null(&self) -> bool {
        self.comm_null.is_some()
    }

    /// New communicator with the parent's group and root-ness
    pub fn comm_dup(&mut self, parent: CommId, new: CommId) -> Result<Derivation> {
        let parent_index = self.comm_index(parent)?;
        let source = &self.comms[parent_index.0];
        let (group, is_root) = (source.group, source.is_root);
        let index = self.add_child(parent_index, new, group, is_root);
        Ok(Derivation::Communicator(index))
    }

    /// New communicator over `group`, rooted at the group's first member.
    ///
    /// Ranks outside the group receive comm-null; they still record the node
    /// so that every rank's forest keeps the same shape.
    pub fn comm_create(&mut self, parent: CommId, group: GroupId, new: CommId) -> Result<Derivation> {
        let parent_index = self.comm_index(parent)?;
        let group_index = self.group_index(group)?;
        let is_root = self.groups[group_index.0].members.first() == Some(&self.world.rank);
        let index = self.add_child(parent_index, new, group_index, is_root);
        Ok(Derivation::Communicator(index))
    }

    /// Splitting is traced but the resulting communicators are not modeled
    pub fn comm_split(&mut self, _parent: CommId, _color: i64, _key: i64, _new: CommId) -> Derivation {
        Derivation::Unmodeled
    }

    /// Bind `group` to the membership of `comm`; a reused handle is rebound
    pub fn comm_group(&mut self, comm: CommId, group: GroupId) -> Result<Derivation> {
        let index = self.comm_index(comm)?;
        let group_index = self.comms[index.0].group;
        self.group_handles.insert(group, group_index);
        Ok(Derivation::Group(group_index))
    }

    /// Members picked from `parent` by index, in the given order
    pub fn group_incl(&mut self, parent: GroupId, indices: &[i64], new: GroupId) -> Result<Derivation> {
        let source = &self.groups[self.group_index(parent)?.0].members;
        let members = indices
            .iter()
            .map(|&index| {
                usize::try_from(index)
                    .ok()
                    .and_then(|i| source.get(i))
                    .copied()
                    .ok_or(Error::RankIndexOutOfRange {
                        index,
                        size: source.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Derivation::Group(self.bind_group(new, members)))
    }

    /// Members of `parent` with the positions in `indices` removed, order kept
    pub fn group_excl(&mut self, parent: GroupId, indices: &[i64], new: GroupId) -> Result<Derivation> {
        let source = &self.groups[self.group_index(parent)?.0].members;
        let mut excluded = BTreeSet::new();
        for &index in indices {
            match usize::try_from(index) {
                Ok(i) if i < source.len() => {
                    excluded.insert(i);
                }
                _ => {
                    return Err(Error::RankIndexOutOfRange {
                        index,
                        size: source.len(),
                    });
                }
            }
        }
        let members = source
            .iter()
            .enumerate()
            .filter(|(i, _)| !excluded.contains(i))
            .map(|(_, &rank)| rank)
            .collect();
        Ok(Derivation::Group(self.bind_group(new, members)))
    }

    pub fn group_union(&mut self, _first: GroupId, _second: GroupId, _new: GroupId) -> Result<Derivation> {
        Err(Error::Unimplemented("MPI_Group_union"))
    }

    pub fn group_difference(&mut self, _first: GroupId, _second: GroupId, _new: GroupId) -> Result<Derivation> {
        Err(Error::Unimplemented("MPI_Group_difference"))
    }

    pub fn group_intersection(&mut self, _first: GroupId, _second: GroupId, _new: GroupId) -> Result<Derivation> {
        Err(Error::Unimplemented("MPI_Group_intersection"))
    }

    pub fn group_range_incl(&mut self, _parent: GroupId, _ranges: &[[i64; 3]], _new: GroupId) -> Result<Derivation> {
        Err(Error::Unimplemented("MPI_Group_range_incl"))
    }

    pub fn group_members(&self, group: GroupId) -> Result<&[u32]> {
        Ok(&self.groups[self.group_index(group)?.0].members)
    }

    pub fn communicator(&self, comm: CommId) -> Result<&Communicator> {
        Ok(&self.comms[self.comm_index(comm)?.0])
    }

    pub fn members(&self, comm: &Communicator) -> &[u32] {
        &self.groups[comm.group.0].members
    }

    /// Size of `comm` and this rank's communicator-relative rank in it
    pub fn view(&self, comm: CommId) -> Result<CommView> {
        let members = self.members(self.communicator(comm)?);
        let rank = members
            .iter()
            .position(|&r| r == self.world.rank)
            .ok_or(Error::NotAMember {
                rank: self.world.rank,
                comm,
            })?;
        Ok(CommView {
            size: members.len() as u32,
            rank: rank as u32,
        })
    }

    pub fn communicators(&self) -> impl Iterator<Item = &Communicator> {
        self.comms.iter()
    }

    pub fn len(&self) -> usize {
        self.comms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comms.is_empty()
    }

    pub fn parent_global_id(&self, comm: &Communicator) -> Option<u32> {
        comm.parent.and_then(|p| self.comms[p.0].global_id)
    }

    /// Handle -> agreed global id for every handle still bound
    pub fn handle_mappings(&self) -> Vec<(CommId, u32)> {
        let mut mappings: Vec<_> = self
            .comm_handles
            .iter()
            .filter_map(|(&handle, index)| self.comms[index.0].global_id.map(|id| (handle, id)))
            .collect();
        mappings.sort();
        mappings
    }

    /// Contribute every position of comm-world's subtree where this rank is root
    pub fn agree(&self, collector: &mut GlobalIdCollector) {
        for (index, position) in self.positions() {
            if self.comms[index.0].is_root {
                collector.contribute(&position);
            }
        }
    }

    /// Read agreed ids back by position, returning how many stayed unresolved
    pub fn assign(&mut self, table: &GlobalIdTable) -> usize {
        let mut unresolved = 0;
        for (index, position) in self.positions() {
            match table.get(&position) {
                Some(id) => self.comms[index.0].global_id = Some(id),
                None => {
                    warn!(
                        "No rank claimed communicator at position {:?} on rank {}",
                        position.path(),
                        self.world.rank
                    );
                    self.comms[index.0].global_id = None;
                    unresolved += 1;
                }
            }
        }
        unresolved
    }

    /// Pre-order walk of comm-world's descendants with their positions
    fn positions(&self) -> Vec<(CommIndex, TreePosition)> {
        let mut out = Vec::new();
        if let Some(world) = self.comm_world {
            let mut position = TreePosition::new();
            self.walk(world, &mut position, &mut out);
        }
        out
    }

    fn walk(&self, comm: CommIndex, position: &mut TreePosition, out: &mut Vec<(CommIndex, TreePosition)>) {
        position.push_level();
        for &child in &self.comms[comm.0].children {
            position.advance();
            out.push((child, position.clone()));
            self.walk(child, position, out);
        }
        position.pop_level();
    }

    fn comm_index(&self, comm: CommId) -> Result<CommIndex> {
        self.comm_handles
            .get(&comm)
            .copied()
            .ok_or(Error::UnknownComm(comm))
    }

    fn group_index(&self, group: GroupId) -> Result<GroupIndex> {
        self.group_handles
            .get(&group)
            .copied()
            .ok_or(Error::UnknownGroup(group))
    }

    fn add_group(&mut self, members: Vec<u32>) -> GroupIndex {
        self.groups.push(Group { members });
        GroupIndex(self.groups.len() - 1)
    }

    fn bind_group(&mut self, handle: GroupId, members: Vec<u32>) -> GroupIndex {
        let index = self.add_group(members);
        self.group_handles.insert(handle, index);
        index
    }

    fn add_comm(&mut self, comm: Communicator) -> CommIndex {
        let index = CommIndex(self.comms.len());
        if let Some(handle) = comm.handle {
            self.comm_handles.insert(handle, index);
        }
        self.comms.push(comm);
        index
    }

    fn add_child(&mut self, parent: CommIndex, handle: CommId, group: GroupIndex, is_root: bool) -> CommIndex {
        let handle = (self.comm_null != Some(handle)).then_some(handle);
        let index = self.add_comm(Communicator {
            handle,
            kind: CommKind::Derived,
            group,
            global_id: None,
            is_root,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.comms[parent.0].children.push(index);
        index
    }
}
