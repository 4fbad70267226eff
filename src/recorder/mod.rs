//! Evidence and outcome recording
//!
//! Screenshots at named checkpoints and the JSON artifact written at the end
//! of every run.

mod artifact;
#[allow(clippy::module_inception)]
mod recorder;

pub use artifact::{ArtifactStatus, Checkpoint, ResultArtifact};
pub use recorder::{new_run_id, ResultRecorder};
