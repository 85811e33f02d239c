//! Import job progress: push-stream framing, typed updates and the job reducer.

mod event;
mod monitor;
mod state;

pub use event::{JobUpdate, Phase};
pub use monitor::JobMonitor;
pub use state::{JobOutcome, JobState, Transition};
