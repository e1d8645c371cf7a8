//! Target-generation backends and the multiplexer that merges them.

pub mod backend;
pub mod batcher;
pub mod ct_backend;
pub mod directory_backend;
pub mod multiplexer;
pub mod pipeline;
pub mod static_backend;

pub use backend::{HostEntry, TargetBackend};
pub use batcher::BatchParams;
pub use ct_backend::{CertificateStream, CertificateTransparencyBackend};
pub use directory_backend::{DirectoryBackend, DirectoryEntry, DirectorySearch};
pub use pipeline::{spawn_pipeline, spawn_pipeline_with_backends};
pub use static_backend::StaticBackend;
