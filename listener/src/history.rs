//! Rolling per-channel history stored in a line-oriented log
//!
//! Line `i` of the log holds the window of channel `i`. Every flush reads
//! the whole file, rewrites the touched lines, and atomically replaces the
//! file, so an interrupted write leaves the previous version in place.
//!
//! Malformed content never fails an append. A missing file or line starts an
//! empty window, an over-long line is trimmed to the newest `capacity`
//! samples, and undecodable bytes in the appended line are replaced. Lines
//! that are not appended to are written back byte for byte. The worst
//! outcome of a corrupt log is a channel whose history restarts.

use std::borrow::Cow;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::codec::{validate_field, HistoryWindow, RECORD_TERMINATOR};
use crate::config::ListenerConfig;
use crate::error::{HistoryError, HistoryResult};

/// Position of a channel's line in the log
pub type ChannelId = usize;

/// Most empty lines a single append may insert before its channel's line
pub const MAX_PADDED_LINES: usize = 1024;

const LINE_END: u8 = RECORD_TERMINATOR as u8;

/// Durable rolling-window storage for a fixed set of channels
#[derive(Debug, Clone)]
pub struct HistoryStore {
    /// Log file path
    path: PathBuf,

    /// Samples retained per channel
    capacity: usize,

    /// Registered channel names; the position is the channel id
    channels: Vec<String>,
}

impl HistoryStore {
    /// Create a store over `path` keeping `capacity` samples per channel
    pub fn new<P: Into<PathBuf>>(path: P, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
            channels: Vec::new(),
        }
    }

    /// Create a store from the agent configuration
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(config.log_name.clone(), config.number_of_items_per_line)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registered channel names, in line order
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Map a channel name to its line, assigning the next free line on first use
    pub fn register_channel(&mut self, name: &str) -> ChannelId {
        if let Some(id) = self.channel_id(name) {
            return id;
        }
        self.channels.push(name.to_string());
        let id = self.channels.len() - 1;
        debug!(channel = name, line = id, "registered history channel");
        id
    }

    /// Line of a registered channel
    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.channels.iter().position(|registered| registered == name)
    }

    /// Append one sample to a channel and persist the log
    pub fn append_sample(&self, channel: ChannelId, value: &str) -> HistoryResult<()> {
        self.append_samples(&[(channel, value)])
    }

    /// Append one sample to a registered channel
    pub fn append_named(&self, name: &str, value: &str) -> HistoryResult<()> {
        let channel = self
            .channel_id(name)
            .ok_or_else(|| HistoryError::UnknownChannel { name: name.to_string() })?;
        self.append_sample(channel, value)
    }

    /// Append several samples with a single read and a single write
    ///
    /// Samples are applied in order, so two samples for the same channel
    /// behave exactly like two calls to [`append_sample`](Self::append_sample).
    /// If any sample cannot be encoded, or a channel lies too far past the
    /// end of the log, nothing is written.
    pub fn append_samples<S: AsRef<str>>(&self, samples: &[(ChannelId, S)]) -> HistoryResult<()> {
        for (channel, value) in samples {
            validate_field(value.as_ref()).map_err(|reason| HistoryError::InvalidSample {
                channel: *channel,
                value: value.as_ref().to_string(),
                reason,
            })?;
        }
        if samples.is_empty() {
            return Ok(());
        }

        let mut lines = self.read_lines()?;
        for (channel, value) in samples {
            self.apply(&mut lines, *channel, value.as_ref())?;
        }
        self.write_lines(&lines)
    }

    /// Stored window of one channel, oldest first
    pub fn read_channel(&self, channel: ChannelId) -> HistoryResult<Vec<String>> {
        let lines = self.read_lines()?;
        Ok(lines
            .get(channel)
            .map(|line| self.decode_line(line))
            .unwrap_or_default())
    }

    /// Stored windows of every line in the log
    pub fn read_all(&self) -> HistoryResult<Vec<Vec<String>>> {
        Ok(self
            .read_lines()?
            .iter()
            .map(|line| self.decode_line(line))
            .collect())
    }

    fn decode_line(&self, line: &[u8]) -> Vec<String> {
        HistoryWindow::decode(self.capacity, &String::from_utf8_lossy(line))
            .0
            .into_fields()
    }

    /// Append `value` to one line; every other line keeps its exact bytes
    fn apply(&self, lines: &mut Vec<Vec<u8>>, channel: ChannelId, value: &str) -> HistoryResult<()> {
        if channel >= lines.len() {
            let gap = channel - lines.len();
            if gap > MAX_PADDED_LINES {
                return Err(HistoryError::ChannelOutOfRange {
                    channel,
                    lines: lines.len(),
                    limit: MAX_PADDED_LINES,
                });
            }
            if gap > 0 {
                warn!(
                    channel,
                    lines = lines.len(),
                    "history log has no line for preceding channels, padding with empty lines"
                );
            }
            lines.resize(channel + 1, Vec::new());
        }

        let (mut window, trimmed) = {
            let text = String::from_utf8_lossy(&lines[channel]);
            if matches!(text, Cow::Owned(_)) {
                warn!(channel, "history line contains invalid UTF-8, replacing undecodable bytes");
            }
            HistoryWindow::decode(self.capacity, &text)
        };
        if trimmed > 0 {
            warn!(
                channel,
                trimmed,
                capacity = self.capacity,
                "history line longer than capacity, dropped oldest samples"
            );
        } else if window.is_full() {
            debug!(channel, capacity = self.capacity, "history line full, evicting oldest sample");
        }

        window.push(value.to_string());
        debug!(channel, value, len = window.len(), "appended sample");

        let mut encoded = window.encode();
        encoded.pop();
        lines[channel] = encoded.into_bytes();
        Ok(())
    }

    /// Raw lines of the log without the `\n` terminator; a missing log has none
    fn read_lines(&self) -> HistoryResult<Vec<Vec<u8>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "history log does not exist yet");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(HistoryError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let mut lines: Vec<Vec<u8>> = bytes
            .split(|byte| *byte == LINE_END)
            .map(<[u8]>::to_vec)
            .collect();
        if bytes.ends_with(&[LINE_END]) {
            lines.pop();
        }

        debug!(path = %self.path.display(), lines = lines.len(), "read history log");
        Ok(lines)
    }

    /// The file actually holding the log, following a symlinked `path`
    fn resolve_target(&self) -> io::Result<PathBuf> {
        match fs::symlink_metadata(&self.path) {
            Ok(metadata) if metadata.file_type().is_symlink() => fs::canonicalize(&self.path),
            _ => Ok(self.path.clone()),
        }
    }

    /// Replace the log with `lines` via a sibling temp file and rename
    fn write_lines(&self, lines: &[Vec<u8>]) -> HistoryResult<()> {
        let write_error = |source: io::Error| HistoryError::Write {
            path: self.path.clone(),
            source,
        };

        let target = self.resolve_target().map_err(write_error)?;
        let existing = match fs::metadata(&target) {
            Ok(metadata) => Some(metadata),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(write_error(e)),
        };
        // Rename only needs a writable directory; a read-only log must still fail.
        if existing.as_ref().is_some_and(|metadata| metadata.permissions().readonly()) {
            return Err(write_error(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "history log is read-only",
            )));
        }

        let mut content = Vec::with_capacity(lines.iter().map(|line| line.len() + 1).sum());
        for line in lines {
            content.extend_from_slice(line);
            content.push(LINE_END);
        }

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
        temp.write_all(&content).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;

        if let Some(metadata) = existing {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(write_error)?;
        }

        temp.persist(&target).map_err(|e| HistoryError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;

        debug!(path = %target.display(), lines = lines.len(), "wrote history log");
        Ok(())
    }
}
