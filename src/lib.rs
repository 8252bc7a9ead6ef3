pub mod artifact;
pub mod cache;
pub mod compare;
pub mod digest;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod presets;
pub mod runner;
pub mod store;
pub mod suite;
pub mod validation;

pub use artifact::{Artifact, BranchRef, CaseStatus, ResultRecord};
pub use compare::{ComparisonReport, Thresholds, Verdict};
pub use pipeline::{PipelineController, PipelineOptions, PipelineOutcome, PipelineStatus};
pub use store::ArtifactStore;
pub use suite::Suite;
