pub mod builder;
pub mod snapshot;

pub use builder::SnapshotBuilder;
pub use snapshot::{Snapshot, SnapshotKey};
