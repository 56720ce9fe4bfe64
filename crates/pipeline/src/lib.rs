//! Pipeline Adapter (C6) — owns the interaction with the external
//! multi-agent orchestrator (`spec.md` §4.6). This crate defines the
//! `Pipeline` trait boundary, the stage graph, chunking/validation
//! helpers, and the `PipelineAdapter` that drives a job through it; the
//! actual generation backend is an external collaborator injected
//! through the trait.

mod cancel;
mod chunk;
mod executor;
mod reference;
mod stage;
mod traits;
mod validate;

pub use cancel::{CancelRegistry, CancelToken};
pub use chunk::chunk_content;
pub use executor::{PipelineAdapter, RunParams};
pub use reference::DeterministicPipeline;
pub use stage::{StageGraph, StageKind, Wave};
pub use traits::{deliverable_type, Pipeline, StageContext, StageOutput};
pub use validate::{is_repairable, validate_output, validate_structure, ValidationOutcome};
