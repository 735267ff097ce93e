//! Locating per-rank call streams and reading them.

use crate::call::CallRecord;
use anyhow::{Context, Result, bail};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static RANK_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)$").expect("Failed to compile rank suffix regex"));

/// One rank's call stream on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankInput {
    pub rank: u32,
    pub path: PathBuf,
}

/// Rank encoded as the trailing number of the file stem
pub fn rank_from_path(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    RANK_SUFFIX.captures(stem)?.get(1)?.as_str().parse().ok()
}

fn is_trace_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("jsonl") | Some("json")
        )
}

/// Expand directories and order the inputs by rank
pub fn discover(paths: &[PathBuf]) -> Result<Vec<RankInput>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("Failed to read directory: {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_trace_file(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }

    let mut by_rank = BTreeMap::new();
    for path in files {
        let rank = rank_from_path(&path)
            .with_context(|| format!("No rank number in file name: {}", path.display()))?;
        if let Some(previous) = by_rank.insert(rank, path.clone()) {
            bail!(
                "Rank {} given twice: {} and {}",
                rank,
                previous.display(),
                path.display()
            );
        }
    }

    if by_rank.is_empty() {
        bail!("No input traces found");
    }
    Ok(by_rank
        .into_iter()
        .map(|(rank, path)| RankInput { rank, path })
        .collect())
}

/// Whitespace-separated JSON call records
pub fn parse_calls<R: Read>(reader: R) -> impl Iterator<Item = Result<CallRecord>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<CallRecord>()
        .enumerate()
        .map(|(index, record)| {
            record.with_context(|| format!("Malformed call record #{}", index + 1))
        })
}

/// Open `input` and stream its records
pub fn read_calls(input: &RankInput) -> Result<impl Iterator<Item = Result<CallRecord>> + use<>> {
    let file = File::open(&input.path)
        .with_context(|| format!("Failed to open trace: {}", input.path.display()))?;
    Ok(parse_calls(BufReader::new(file)))
}

/// Like [`read_calls`], but the file is only opened by the first `next`
/// and is closed again once its records run out.
///
/// A file that cannot be opened yields a single error.
pub fn read_calls_lazily(input: &RankInput) -> impl Iterator<Item = Result<CallRecord>> + '_ {
    let mut records: Option<Box<dyn Iterator<Item = Result<CallRecord>>>> = None;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        if records.is_none() {
            match read_calls(input) {
                Ok(calls) => records = Some(Box::new(calls)),
                Err(e) => {
                    done = true;
                    return Some(Err(e));
                }
            }
        }
        let next = records.as_mut()?.next();
        if next.is_none() {
            done = true;
            records = None;
        }
        next
    })
}
