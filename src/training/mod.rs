pub mod artifact;
pub mod metrics;
pub mod model;
pub mod publisher;
pub mod split;
pub mod summary;
pub mod updater;
pub mod vector;

pub use artifact::{Lineage, ModelArtifact, ModelStore};
pub use publisher::{LoadedModels, PublishOutcome, Publisher};
pub use summary::{Prediction, TrainingSummary};
pub use updater::ModelUpdater;
