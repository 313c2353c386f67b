//! Image builds
//!
//! Everything between "the inputs changed" and "a new image is registered":
//! fingerprinting, usage hints, the cross-process lock, the toolchain
//! subprocess and detached background workers.

pub mod fingerprint;
pub mod hints;
pub mod job;
pub mod lock;
mod orchestrator;
pub mod toolchain;
pub mod worker;

pub use fingerprint::FingerprintInputs;
pub use hints::{HintSnapshot, UsageHints};
pub use job::{BuildJob, BuildMode, BuildOutcome, JobHandle, JobState};
pub use lock::{BuildLock, LockHolder};
pub use orchestrator::{summarize_failure, BuildOrchestrator, OutputSink, StalenessReport};
pub use toolchain::{CommandToolchain, CompileRequest, Toolchain};
pub use worker::{WorkerCommand, WorkerTask};
