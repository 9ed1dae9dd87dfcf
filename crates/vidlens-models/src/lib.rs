//! Shared data models for the vidlens job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle state machine
//! - Analysis options submitted with a job
//! - Analysis results and provider metadata
//! - Error classification shared by the worker and the API

pub mod analysis;
pub mod error;
pub mod job;
pub mod options;
pub mod reference;

// Re-export common types
pub use analysis::{AiProviderInfo, Analysis, AnalysisMetadata, AnalysisResult, VideoMetadata};
pub use error::{ErrorKind, InputError, JobError, TransitionError};
pub use job::{Job, JobId, JobStatus};
pub use options::{AnalysisDepth, AnalysisOptions};
pub use reference::{validate_reference, video_format, SUPPORTED_FORMATS};
