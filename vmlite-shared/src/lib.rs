//! Types shared between the vmlite controller, its CLI and test doubles.

pub mod api;
pub mod constants;
pub mod errors;

pub use errors::{VmliteError, VmliteResult};
