//! Face identification against an enrolled gallery, behind a single-image
//! liveness gate.

pub mod config;
pub mod embedding;
pub mod error;
pub mod matcher;
pub mod service;
pub mod storage;

pub use embedding::{Embedding, EmbeddingSource, EMBEDDING_DIM};
pub use error::{Error, Result, StorageError};
pub use facegate_vision::{liveness, LivenessGate, LivenessReport, Verdict};
pub use matcher::{find_match, Gallery, MatchResult, UNKNOWN_LABEL};
pub use service::Recognizer;
pub use storage::{EmbeddingStore, FaceRecord, FileStore, MemoryStore, Metadata, RecordId};

#[cfg(feature = "onnx")]
pub use embedding::OnnxSource;
