pub mod background;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod features;
pub mod queue;
pub mod shutdown;
pub mod source;
pub mod store;
pub mod training;
pub mod workflow;
