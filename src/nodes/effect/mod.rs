//! Audio effect nodes (units with audio inputs and outputs)

mod mixer;
mod passthrough;
mod shell;
mod volume;

pub use mixer::{pan_gains, Mixer};
pub use passthrough::Passthrough;
pub use shell::{Effect, Process};
pub use volume::{Volume, VolumeParams};
