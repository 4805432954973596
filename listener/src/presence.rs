//! Required-file presence checks
//!
//! A missing file is reported, never repaired: each one produces a
//! critical-severity event on every tick until it reappears.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::ListenerConfig;

/// Source of the names currently present in a directory
pub trait DirectoryLister: Send {
    fn list(&self) -> io::Result<Vec<String>>;
}

/// Lists a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsDirectoryLister {
    dir: PathBuf,
}

impl FsDirectoryLister {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl DirectoryLister for FsDirectoryLister {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

/// Critical event raised for one missing file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingFileAlert {
    pub file: String,
    pub detected_at: DateTime<Utc>,
}

/// Required names absent from `present`, in `required` order
pub fn missing_files<'a>(required: &'a [String], present: &[String]) -> Vec<&'a str> {
    let present: HashSet<&str> = present.iter().map(String::as_str).collect();
    required
        .iter()
        .map(String::as_str)
        .filter(|name| !present.contains(name))
        .collect()
}

/// Compares the required-file list against a directory listing
pub struct PresenceChecker {
    required: Vec<String>,
    lister: Box<dyn DirectoryLister>,
}

impl PresenceChecker {
    pub fn new(required: Vec<String>, lister: Box<dyn DirectoryLister>) -> Self {
        Self { required, lister }
    }

    /// Checker over `config.watch_dir` for `config.files`
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(
            config.files.clone(),
            Box::new(FsDirectoryLister::new(config.watch_dir.clone())),
        )
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Run one check, logging a critical event per missing file
    ///
    /// A listing failure is logged and reported as nothing missing.
    pub fn check(&self) -> Vec<MissingFileAlert> {
        if self.required.is_empty() {
            return Vec::new();
        }

        let present = match self.lister.list() {
            Ok(present) => present,
            Err(e) => {
                warn!(error = %e, "unable to list watched directory, skipping presence check");
                return Vec::new();
            }
        };
        debug!(?present, required = ?self.required, "checking required files");

        let detected_at = Utc::now();
        let alerts: Vec<MissingFileAlert> = missing_files(&self.required, &present)
            .into_iter()
            .map(|file| {
                error!(severity = "critical", file, "File {} is missing!!", file);
                MissingFileAlert {
                    file: file.to_string(),
                    detected_at,
                }
            })
            .collect();

        if alerts.is_empty() {
            debug!("every required file is present");
        }
        alerts
    }
}
