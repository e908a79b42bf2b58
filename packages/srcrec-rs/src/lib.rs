pub mod batch;
pub mod bridge;
pub mod config;
pub mod error;
pub mod model;
pub mod npy;
pub mod pipeline;
pub mod profiling;
pub mod subjects;
pub mod toolkit;
pub mod types;

pub use batch::{run_batch, BatchObserver, BatchReport, SubjectReport, SubjectStatus};
pub use bridge::{python::PythonEnvironment, BridgeScript, MneBridge};
pub use config::{StudyConfig, SubjectPaths};
pub use error::{ErrorKind, Result, SrcRecError};
pub use model::{build_head_model, ModelArtifacts};
pub use pipeline::{ExclusionSet, PipelineStep, StepFailure, SubjectOutput, SubjectPipeline};
pub use toolkit::Toolkit;
pub use types::*;
