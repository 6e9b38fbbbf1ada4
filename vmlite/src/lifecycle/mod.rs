mod controller;
mod state;

pub use controller::{ControllerOptions, VmController};
pub use state::{VmState, VmStatus};
