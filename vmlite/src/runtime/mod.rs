mod layout;
mod lock;

pub use layout::{WorkDirLayout, dirs};
pub use lock::WorkDirLock;
