pub mod batcher;
pub mod clock;
pub mod config;
pub mod constants;
pub mod device;
pub mod display;
pub mod error;
pub mod export;
pub mod ljm;
pub mod sample;
pub mod scheduler;
pub mod session;
pub mod solar;
pub mod store;

// Re-export the types most callers need
pub use config::AcquisitionConfig;
pub use error::AcqError;
pub use scheduler::{AcquisitionScheduler, CycleReport, SchedulerState};
pub use session::{SessionId, SessionOutcome, SessionSummary};
pub use solar::{DaylightWindow, Location, NoaaCalculator, SolarCalculator};
