//! # Relwatch Engine
//! The core cycle: fetch releases, detect what is new against the per-project
//! marker, route through tag toggles, fan out to channels, advance the marker.

pub mod detector;
pub mod dispatcher;
pub mod router;
pub mod scheduler;

pub use detector::{Detection, detect_new};
pub use dispatcher::{CycleReport, DispatchOptions, Dispatcher, ProjectReport};
pub use router::resolve_channels;
pub use scheduler::{CheckOutcome, Scheduler};

#[cfg(test)]
pub(crate) mod testutil;
