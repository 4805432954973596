//! Listener host-monitoring agent library
//!
//! Samples CPU, memory, network and disk usage on a fixed interval and keeps
//! a bounded rolling history of each metric in a line-oriented log, one line
//! per channel. Each tick also checks that a configured set of required files
//! is present and raises a critical event for every missing one.

pub mod codec;
pub mod config;
pub mod error;
pub mod history;
pub mod presence;
pub mod samplers;
pub mod scheduler;

// Re-export commonly used types
pub use codec::HistoryWindow;
pub use config::ListenerConfig;
pub use error::{ListenerError, Result};
pub use history::{ChannelId, HistoryStore};
pub use presence::{MissingFileAlert, PresenceChecker};
pub use samplers::Sampler;
pub use scheduler::{Scheduler, TickReport};
