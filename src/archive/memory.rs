use super::{ArchiveWriter, Event};
use crate::defs::{GlobalDefinitions, LocalDefinitions};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Archive kept in memory, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryArchive {
    path: Option<PathBuf>,
    world_size: u32,
    open: bool,
    closed: bool,
    events: BTreeMap<u32, Vec<Event>>,
    finished: BTreeSet<u32>,
    locals: BTreeMap<u32, LocalDefinitions>,
    globals: Option<GlobalDefinitions>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Events of `location` in write order
    pub fn events(&self, location: u32) -> &[Event] {
        self.events.get(&location).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn local_definitions(&self, location: u32) -> Option<&LocalDefinitions> {
        self.locals.get(&location)
    }

    pub fn global_definitions(&self) -> Option<&GlobalDefinitions> {
        self.globals.as_ref()
    }

    /// Locations whose event stream was finished, in ascending order
    pub fn finished_locations(&self) -> Vec<u32> {
        self.finished.iter().copied().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_location(&self, location: u32) -> Result<()> {
        if !self.open {
            return Err(Error::ArchiveNotOpen);
        }
        if location >= self.world_size {
            return Err(Error::UnknownLocation(location));
        }
        Ok(())
    }
}

impl ArchiveWriter for MemoryArchive {
    fn open(&mut self, path: &Path, world_size: u32) -> Result<()> {
        if self.open || self.closed {
            return Err(Error::ArchiveAlreadyOpen);
        }
        self.path = Some(path.to_path_buf());
        self.world_size = world_size;
        self.open = true;
        Ok(())
    }

    fn write_event(&mut self, location: u32, event: &Event) -> Result<()> {
        self.check_location(location)?;
        if self.finished.contains(&location) {
            return Err(Error::LocationFinished(location));
        }
        self.events.entry(location).or_default().push(event.clone());
        Ok(())
    }

    fn finish_location(&mut self, location: u32) -> Result<()> {
        self.check_location(location)?;
        self.finished.insert(location);
        Ok(())
    }

    fn write_local_definitions(&mut self, location: u32, defs: &LocalDefinitions) -> Result<()> {
        self.check_location(location)?;
        self.locals.insert(location, defs.clone());
        Ok(())
    }

    fn write_global_definitions(&mut self, defs: &GlobalDefinitions) -> Result<()> {
        if !self.open {
            return Err(Error::ArchiveNotOpen);
        }
        self.globals = Some(defs.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::ArchiveNotOpen);
        }
        self.open = false;
        self.closed = true;
        Ok(())
    }
}
