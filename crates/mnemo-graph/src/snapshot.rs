//! JSONL snapshots of the in-memory graph: one line per node or relation.
//!
//! Node lines come first, in creation order; relations reference nodes by
//! their position in that order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotLine {
    Node {
        labels: Vec<String>,
        properties: Map<String, Value>,
    },
    Relation {
        #[serde(rename = "type")]
        rel_type: String,
        source: usize,
        target: usize,
        #[serde(default)]
        properties: Map<String, Value>,
    },
}

/// Errors from snapshot reads and writes.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("line {0}: I/O error: {1}")]
    Io(usize, String),

    #[error("line {0}: parse error: {1}")]
    Parse(usize, String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("line {line}: relation references unknown node {index}")]
    DanglingRelation { line: usize, index: usize },
}

pub fn read_lines(reader: impl BufRead) -> Result<Vec<SnapshotLine>, SnapshotError> {
    let mut lines = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SnapshotError::Io(line_no + 1, e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: SnapshotLine = serde_json::from_str(trimmed)
            .map_err(|e| SnapshotError::Parse(line_no + 1, e.to_string()))?;
        lines.push(parsed);
    }
    Ok(lines)
}

pub fn write_lines(writer: &mut impl Write, lines: &[SnapshotLine]) -> Result<(), SnapshotError> {
    for line in lines {
        let text =
            serde_json::to_string(line).map_err(|e| SnapshotError::Serialize(e.to_string()))?;
        writeln!(writer, "{text}").map_err(|e| SnapshotError::Io(0, e.to_string()))?;
    }
    Ok(())
}

/// Read a snapshot; a missing file is an empty graph.
pub fn read_from_path(path: &Path) -> Result<Vec<SnapshotLine>, SnapshotError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SnapshotError::Io(0, format!("{}: {e}", path.display()))),
    };
    read_lines(BufReader::new(file))
}

/// Replace the snapshot at `path` atomically.
///
/// Lines are staged in a sibling file and fsynced, the staged file is renamed
/// over `path`, and the directory is fsynced so the rename survives a crash.
pub fn write_to_path(path: &Path, lines: &[SnapshotLine]) -> Result<(), SnapshotError> {
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    }

    let staged = staging_path(path);
    let replaced = stage(&staged, lines)
        .and_then(|()| fs::rename(&staged, path).map_err(|e| io_error(path, e)));
    if replaced.is_err() {
        let _ = fs::remove_file(&staged);
    }
    replaced?;

    if let Some(dir) = dir {
        File::open(dir)
            .and_then(|handle| handle.sync_all())
            .map_err(|e| io_error(dir, e))?;
    }
    Ok(())
}

fn stage(staged: &Path, lines: &[SnapshotLine]) -> Result<(), SnapshotError> {
    let file = File::create(staged).map_err(|e| io_error(staged, e))?;
    let mut writer = BufWriter::new(file);
    write_lines(&mut writer, lines)?;
    writer
        .into_inner()
        .map_err(|e| io_error(staged, e.into_error()))?
        .sync_all()
        .map_err(|e| io_error(staged, e))
}

/// `<name>.<pid>-<n>.staged`, next to `path` so the rename stays on one filesystem.
fn staging_path(path: &Path) -> PathBuf {
    static STAGED: AtomicU64 = AtomicU64::new(0);
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("graph.jsonl"));
    name.push(format!(
        ".{}-{}.staged",
        std::process::id(),
        STAGED.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}

fn io_error(target: &Path, error: std::io::Error) -> SnapshotError {
    SnapshotError::Io(0, format!("{}: {error}", target.display()))
}
