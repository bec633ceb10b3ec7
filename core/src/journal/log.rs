use crate::error::{CoreError, CoreResult};
use crate::journal::event::{compute_event_hash, finalize_event, JournalEvent, ZERO_HASH_64};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only NDJSON file of hash-chained [`JournalEvent`]s.
pub struct MutationJournal {
    path: PathBuf,
    last_hash: String,
}

impl MutationJournal {
    pub fn open_or_create(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(&path)?;
            return Ok(Self {
                path,
                last_hash: ZERO_HASH_64.to_string(),
            });
        }

        let mut last_hash = ZERO_HASH_64.to_string();
        for event in read_events(&path)? {
            last_hash = event.event_hash;
        }
        Ok(Self { path, last_hash })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    pub fn append(&mut self, mut event: JournalEvent) -> CoreResult<JournalEvent> {
        event.prev_event_hash = self.last_hash.clone();
        let event = finalize_event(event)?;
        let line = serde_json::to_string(&event)?;
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;
        self.last_hash = event.event_hash.clone();
        Ok(event)
    }
}

fn read_events(path: &Path) -> CoreResult<Vec<JournalEvent>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

/// Re-hashes every event and checks the chain links. Returns the number of
/// events on success.
pub fn verify_chain(path: impl AsRef<Path>) -> CoreResult<usize> {
    let events = read_events(path.as_ref())?;
    let mut prev = ZERO_HASH_64.to_string();
    for (idx, event) in events.iter().enumerate() {
        if event.prev_event_hash != prev {
            return Err(CoreError::Validation(format!(
                "journal line {}: prev_event_hash does not match the previous event",
                idx + 1
            )));
        }
        if compute_event_hash(event)? != event.event_hash {
            return Err(CoreError::Validation(format!(
                "journal line {}: event_hash mismatch",
                idx + 1
            )));
        }
        prev = event.event_hash.clone();
    }
    Ok(events.len())
}
