//! Process identity from the kernel's `/proc/<pid>/stat` record.
//!
//! The pid alone does not identify a process: once a process exits the kernel
//! may hand the same pid to an unrelated one. The `starttime` field of the
//! stat record (field 22, in clock ticks since boot) pins a pid to one
//! process lifetime, so it travels with the pid in every authority query.
//!
//! The record reads `pid (comm) state ppid ...`. `comm` is chosen by the
//! process itself and may contain spaces and parentheses, so the parser looks
//! for the LAST `)` in the record, like the authority's own parser does.
//! Everything after the `") "` that follows is split on single spaces and
//! `starttime` is token 19 of that tail.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Tokens after `comm` up to and including `starttime`.
pub const STAT_TAIL_FIELDS: usize = 20;

/// Zero-based index of `starttime` in the tail after `comm`.
pub const START_TIME_FIELD_INDEX: usize = 19;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Enumerates malformed stat record shapes.
pub enum StatParseError {
    #[error("parsing error: missing )")]
    MissingCommEnd,
    #[error("parsing error: ) at the end")]
    CommEndAtEof,
    #[error("parsing error: {found} fields after comm, need at least 20")]
    TooFewFields { found: usize },
    #[error("parsing error: invalid start time {token:?}")]
    InvalidStartTime { token: String },
}

#[derive(Debug, Error)]
pub enum ProcStatError {
    #[error("couldn't open stat file {}: {source}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] StatParseError),
}

/// Leading fields of one stat record, borrowed from the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord<'a> {
    comm: &'a [u8],
    tail: [&'a [u8]; STAT_TAIL_FIELDS],
}

impl<'a> StatRecord<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self, StatParseError> {
        let raw = raw.trim_ascii_end();
        let comm_end = raw
            .iter()
            .rposition(|byte| *byte == b')')
            .ok_or(StatParseError::MissingCommEnd)?;
        let tail_start = comm_end + 2;
        if tail_start > raw.len() {
            return Err(StatParseError::CommEndAtEof);
        }

        let comm = raw[..comm_end]
            .iter()
            .position(|byte| *byte == b'(')
            .map(|open| &raw[open + 1..comm_end])
            .unwrap_or_default();

        let mut tail: [&[u8]; STAT_TAIL_FIELDS] = [&[]; STAT_TAIL_FIELDS];
        let mut found = 0;
        for token in raw[tail_start..]
            .split(|byte| *byte == b' ')
            .take(STAT_TAIL_FIELDS)
        {
            tail[found] = token;
            found += 1;
        }
        if found < STAT_TAIL_FIELDS {
            return Err(StatParseError::TooFewFields { found });
        }

        Ok(Self { comm, tail })
    }

    /// Executable name as the process set it. Not necessarily UTF-8.
    pub fn comm(&self) -> &'a [u8] {
        self.comm
    }

    pub fn state(&self) -> &'a [u8] {
        self.tail[0]
    }

    pub fn start_time(&self) -> Result<u64, StatParseError> {
        let token = self.tail[START_TIME_FIELD_INDEX];
        let invalid = || StatParseError::InvalidStartTime {
            token: String::from_utf8_lossy(token).into_owned(),
        };
        if token.is_empty() || !token.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        std::str::from_utf8(token)
            .ok()
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(invalid)
    }
}

/// Extracts `starttime` from raw stat record bytes.
pub fn parse_start_time(raw: &[u8]) -> Result<u64, StatParseError> {
    StatRecord::parse(raw)?.start_time()
}

pub fn stat_path(root: &Path, pid: i32) -> PathBuf {
    root.join("proc").join(pid.to_string()).join("stat")
}

/// Reads `<root>/proc/<pid>/stat` and returns the process start time in ticks.
///
/// `root` is `/` in production and only differs under test harnesses.
pub async fn read_start_time(root: &Path, pid: i32) -> Result<u64, ProcStatError> {
    let path = stat_path(root, pid);
    let raw = tokio::fs::read(&path)
        .await
        .map_err(|source| ProcStatError::NotFound { path, source })?;
    Ok(parse_start_time(&raw)?)
}

/// Live identity of the requesting process, captured at check time.
///
/// Never cached: a snapshot is only meaningful for the check that built it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentitySnapshot {
    pub pid: i32,
    pub start_time_ticks: u64,
    pub uid: u32,
}

impl ProcessIdentitySnapshot {
    pub async fn capture(root: &Path, pid: i32, uid: u32) -> Result<Self, ProcStatError> {
        let start_time_ticks = read_start_time(root, pid).await?;
        Ok(Self {
            pid,
            start_time_ticks,
            uid,
        })
    }
}

#[cfg(test)]
pub(crate) fn fixture_stat_line(pid: i32, comm: &str, start_time: u64) -> String {
    format!(
        "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194560 1044 0 0 0 3 1 0 0 20 0 1 0 {start_time} 9437184 812 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 0 17 2 0 0 0 0 0\n"
    )
}

#[cfg(test)]
pub(crate) fn write_fixture_stat(root: &Path, pid: i32, contents: &[u8]) {
    let dir = root.join("proc").join(pid.to_string());
    std::fs::create_dir_all(&dir).expect("create fake proc dir");
    std::fs::write(dir.join("stat"), contents).expect("write fake stat record");
}
