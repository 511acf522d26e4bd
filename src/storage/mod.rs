//! On-disk state that is not statistics.

pub mod lockfile;

pub use lockfile::ProcessLock;
