//! Stateless feature extractors over issue text and labels.

pub mod labels;
pub mod text;

pub use labels::{categorize, Category, LabelCategory};
pub use text::{extract, Readability, TextFeatures};
