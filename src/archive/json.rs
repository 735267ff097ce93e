use super::{ArchiveWriter, Event};
use crate::defs::{GlobalDefinitions, LocalDefinitions};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const ANCHOR_FILE: &str = "traces.json";
const GLOBAL_DEFS_FILE: &str = "traces.def.json";
const TRACE_DIR: &str = "traces";

/// Archive header written when the archive is opened
#[derive(Debug, Serialize)]
struct Anchor<'a> {
    creator: String,
    format_version: u32,
    created: DateTime<Utc>,
    world_size: u32,
    definitions: &'a str,
    locations: &'a str,
}

/// Directory archive: one JSON-lines event stream and one mapping file per
/// location, plus global definitions.
///
/// ```text
/// out/
///   traces.json          anchor
///   traces.def.json      global definitions
///   traces/0.evt.jsonl   events of location 0
///   traces/0.def.json    mapping tables of location 0
/// ```
#[derive(Debug, Default)]
pub struct JsonArchive {
    root: Option<PathBuf>,
    world_size: u32,
    closed: bool,
    /// Event streams of the locations still being written
    streams: BTreeMap<u32, BufWriter<File>>,
    finished: BTreeSet<u32>,
}

impl JsonArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of event files currently held open
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }

    fn root(&self) -> Result<&Path> {
        self.root.as_deref().ok_or(Error::ArchiveNotOpen)
    }

    fn location_file(&self, location: u32, suffix: &str) -> Result<PathBuf> {
        let root = self.root()?;
        if location >= self.world_size {
            return Err(Error::UnknownLocation(location));
        }
        Ok(root.join(TRACE_DIR).join(format!("{location}.{suffix}")))
    }

    fn stream(&mut self, location: u32) -> Result<&mut BufWriter<File>> {
        if self.finished.contains(&location) {
            return Err(Error::LocationFinished(location));
        }
        if !self.streams.contains_key(&location) {
            let path = self.location_file(location, "evt.jsonl")?;
            let file = File::create(path)?;
            self.streams.insert(location, BufWriter::new(file));
        }
        self.streams
            .get_mut(&location)
            .ok_or(Error::UnknownLocation(location))
    }
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

impl ArchiveWriter for JsonArchive {
    fn open(&mut self, path: &Path, world_size: u32) -> Result<()> {
        if self.root.is_some() || self.closed {
            return Err(Error::ArchiveAlreadyOpen);
        }
        fs::create_dir_all(path.join(TRACE_DIR))?;

        let anchor = Anchor {
            creator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            format_version: 1,
            created: Utc::now(),
            world_size,
            definitions: GLOBAL_DEFS_FILE,
            locations: TRACE_DIR,
        };
        write_pretty(&path.join(ANCHOR_FILE), &anchor)?;

        info!("Opened archive {} for {} locations", path.display(), world_size);
        self.root = Some(path.to_path_buf());
        self.world_size = world_size;
        Ok(())
    }

    fn write_event(&mut self, location: u32, event: &Event) -> Result<()> {
        let stream = self.stream(location)?;
        serde_json::to_writer(&mut *stream, event)?;
        stream.write_all(b"\n")?;
        Ok(())
    }

    fn finish_location(&mut self, location: u32) -> Result<()> {
        self.location_file(location, "evt.jsonl")?;
        if let Some(mut stream) = self.streams.remove(&location) {
            stream.flush()?;
        }
        self.finished.insert(location);
        Ok(())
    }

    fn write_local_definitions(&mut self, location: u32, defs: &LocalDefinitions) -> Result<()> {
        let path = self.location_file(location, "def.json")?;
        write_pretty(&path, defs)
    }

    fn write_global_definitions(&mut self, defs: &GlobalDefinitions) -> Result<()> {
        let path = self.root()?.join(GLOBAL_DEFS_FILE);
        write_pretty(&path, defs)
    }

    fn close(&mut self) -> Result<()> {
        if self.root.is_none() {
            return Err(Error::ArchiveNotOpen);
        }
        for stream in self.streams.values_mut() {
            stream.flush()?;
        }
        self.streams.clear();
        self.root = None;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommId;

    #[test]
    fn test_events_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        let mut archive = JsonArchive::new();
        archive.open(&root, 2).unwrap();
        archive
            .write_event(1, &Event::Enter { time: 3, region: 0 })
            .unwrap();
        archive
            .write_event(
                1,
                &Event::MpiSend {
                    time: 4,
                    receiver: 0,
                    comm: CommId(0),
                    tag: 1,
                    bytes: 8,
                },
            )
            .unwrap();
        archive.close().unwrap();

        assert!(root.join(ANCHOR_FILE).exists());
        let text = fs::read_to_string(root.join(TRACE_DIR).join("1.evt.jsonl")).unwrap();
        let events: Vec<Event> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Enter { time: 3, region: 0 });
    }

    #[test]
    fn test_unknown_location() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = JsonArchive::new();
        archive.open(dir.path(), 1).unwrap();
        let result = archive.write_event(1, &Event::MpiCollectiveBegin { time: 0 });
        assert!(matches!(result, Err(Error::UnknownLocation(1))));
    }

    #[test]
    fn test_finished_location_releases_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = JsonArchive::new();
        archive.open(dir.path(), 2).unwrap();
        for location in 0..2 {
            archive
                .write_event(location, &Event::Enter { time: 1, region: 0 })
                .unwrap();
        }
        assert_eq!(archive.open_streams(), 2);

        archive.finish_location(0).unwrap();
        assert_eq!(archive.open_streams(), 1);
        let text = fs::read_to_string(dir.path().join(TRACE_DIR).join("0.evt.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 1);

        let result = archive.write_event(0, &Event::Leave { time: 2, region: 0 });
        assert!(matches!(result, Err(Error::LocationFinished(0))));
        assert!(matches!(
            archive.finish_location(2),
            Err(Error::UnknownLocation(2))
        ));
        archive.close().unwrap();
        assert_eq!(archive.open_streams(), 0);
    }

    #[test]
    fn test_reopen_after_close_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = JsonArchive::new();
        archive.open(dir.path(), 1).unwrap();
        archive.close().unwrap();
        assert!(matches!(
            archive.open(dir.path(), 1),
            Err(Error::ArchiveAlreadyOpen)
        ));
        assert!(matches!(archive.close(), Err(Error::ArchiveNotOpen)));
    }

    #[test]
    fn test_write_before_open() {
        let mut archive = JsonArchive::new();
        let result = archive.write_event(0, &Event::MpiCollectiveBegin { time: 0 });
        assert!(matches!(result, Err(Error::ArchiveNotOpen)));
    }
}
