//! Process-wide communicator ids without cross-rank communication.
//!
//! Every rank builds its communicator forest from the same sequence of
//! collective creation calls, so the forest has the same shape everywhere;
//! only root-ness differs. A communicator is therefore named by its position
//! in that shape. The root rank of each communicator contributes the position
//! to a [`GlobalIdCollector`]; sealing the collector numbers the contributed
//! positions in pre-order, and every rank reads its ids back by position.

use std::collections::{BTreeMap, BTreeSet};

/// First id handed out to a derived communicator; 0 and 1 are comm-world and comm-self
pub const FIRST_DERIVED_COMM_ID: u32 = 2;

/// Path of 1-based child ordinals from the forest root.
///
/// Ordering is lexicographic, which is pre-order for positions of one forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePosition(Vec<u32>);

impl TreePosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Descend one level; the next `advance` selects the first child
    pub fn push_level(&mut self) {
        self.0.push(0);
    }

    pub fn pop_level(&mut self) {
        self.0.pop();
    }

    /// Move to the next sibling at the current level
    pub fn advance(&mut self) {
        if let Some(last) = self.0.last_mut() {
            *last += 1;
        }
    }

    pub fn path(&self) -> &[u32] {
        &self.0
    }
}

impl From<Vec<u32>> for TreePosition {
    fn from(path: Vec<u32>) -> Self {
        Self(path)
    }
}

/// Positions contributed by the root ranks of communicators
#[derive(Debug, Default)]
pub struct GlobalIdCollector {
    positions: BTreeSet<TreePosition>,
}

impl GlobalIdCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that some rank is root at `position`; repeated contributions are merged
    pub fn contribute(&mut self, position: &TreePosition) {
        self.positions.insert(position.clone());
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number the contributed positions in pre-order
    pub fn seal(self) -> GlobalIdTable {
        let ids = self
            .positions
            .into_iter()
            .zip(FIRST_DERIVED_COMM_ID..)
            .collect();
        GlobalIdTable { ids }
    }
}

/// Agreed id of every contributed position
#[derive(Debug, Default)]
pub struct GlobalIdTable {
    ids: BTreeMap<TreePosition, u32>,
}

impl GlobalIdTable {
    pub fn get(&self, position: &TreePosition) -> Option<u32> {
        self.ids.get(position).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_walk() {
        let mut pos = TreePosition::new();
        pos.push_level();
        pos.advance();
        assert_eq!(pos.path(), &[1]);
        pos.push_level();
        pos.advance();
        pos.advance();
        assert_eq!(pos.path(), &[1, 2]);
        pos.pop_level();
        pos.advance();
        assert_eq!(pos.path(), &[2]);
        assert_eq!(pos.depth(), 1);
    }

    #[test]
    fn test_seal_numbers_in_preorder() {
        let mut collector = GlobalIdCollector::new();
        collector.contribute(&TreePosition::from(vec![2]));
        collector.contribute(&TreePosition::from(vec![1, 1]));
        collector.contribute(&TreePosition::from(vec![1]));
        collector.contribute(&TreePosition::from(vec![1]));
        assert_eq!(collector.len(), 3);

        let table = collector.seal();
        assert_eq!(table.get(&TreePosition::from(vec![1])), Some(2));
        assert_eq!(table.get(&TreePosition::from(vec![1, 1])), Some(3));
        assert_eq!(table.get(&TreePosition::from(vec![2])), Some(4));
        assert_eq!(table.get(&TreePosition::from(vec![3])), None);
    }
}
