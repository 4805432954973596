//! Tick loop driving samplers, the history store and the presence checker

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::validate_field;
use crate::config::ListenerConfig;
use crate::error::Result;
use crate::history::{ChannelId, HistoryStore};
use crate::presence::{MissingFileAlert, PresenceChecker};
use crate::samplers::{default_samplers, Sampler};

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Channels that received a sample
    pub written: Vec<ChannelId>,

    /// Samplers whose reading was dropped this tick
    pub skipped: Vec<String>,

    /// Missing required files
    pub missing: Vec<MissingFileAlert>,
}

/// Single-threaded monitoring loop
pub struct Scheduler {
    store: HistoryStore,
    samplers: Vec<(ChannelId, Box<dyn Sampler>)>,
    checker: PresenceChecker,
    delay: Duration,
    ticks: u64,
}

impl Scheduler {
    /// Build a scheduler; samplers are registered as channels in the given order
    ///
    /// A sampler whose name is already taken is dropped, so every channel
    /// receives at most one sample per tick.
    pub fn new(
        config: &ListenerConfig,
        samplers: Vec<Box<dyn Sampler>>,
        checker: PresenceChecker,
    ) -> Self {
        let mut store = HistoryStore::from_config(config);
        let mut registered = Vec::with_capacity(samplers.len());
        for sampler in samplers {
            if let Some(channel) = store.channel_id(sampler.name()) {
                warn!(sampler = sampler.name(), channel, "duplicate sampler name, ignoring sampler");
                continue;
            }
            registered.push((store.register_channel(sampler.name()), sampler));
        }

        Self {
            store,
            samplers: registered,
            checker,
            delay: config.delay(),
            ticks: 0,
        }
    }

    /// Scheduler with the host samplers and a filesystem presence check
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(config, default_samplers(config), PresenceChecker::from_config(config))
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Sample every channel, flush the history once, then check required files
    ///
    /// Only a history log I/O failure is returned as an error.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();
        let mut batch: Vec<(ChannelId, String)> = Vec::with_capacity(self.samplers.len());

        for (channel, sampler) in self.samplers.iter_mut() {
            match sampler.sample() {
                Ok(value) => {
                    if let Err(reason) = validate_field(&value) {
                        warn!(sampler = sampler.name(), value = %value, %reason, "dropping unencodable sample");
                        report.skipped.push(sampler.name().to_string());
                        continue;
                    }
                    batch.push((*channel, value));
                    report.written.push(*channel);
                }
                Err(e) => {
                    warn!(sampler = sampler.name(), error = %e, "sampler failed, skipping channel this tick");
                    report.skipped.push(sampler.name().to_string());
                }
            }
        }

        self.store.append_samples(&batch)?;
        report.missing = self.checker.check();
        self.ticks += 1;

        debug!(
            tick = self.ticks,
            written = report.written.len(),
            skipped = report.skipped.len(),
            missing = report.missing.len(),
            "tick complete"
        );
        Ok(report)
    }

    /// Tick every `delay` until a history log I/O failure
    pub async fn run(&mut self) -> Result<()> {
        info!(
            channels = ?self.store.channels(),
            delay = ?self.delay,
            log = %self.store.path().display(),
            "starting main loop"
        );
        loop {
            self.tick()?;
            tokio::time::sleep(self.delay).await;
        }
    }
}
