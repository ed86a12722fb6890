//! Model export and serialization module
//!
//! A [`TrainedArtifact`] bundles the fitted estimator with the fitted
//! imputer, encoder, feature subset, scaler and class labels. It is written
//! inside a checksummed envelope in one of two formats:
//! - Native binary format (bincode)
//! - JSON format (portable, human-readable)

mod artifact;
mod serializer;

pub use artifact::{ArtifactMetadata, TrainedArtifact};
pub use serializer::{checksum, ExportFormat, FORMAT_VERSION, MAGIC};
