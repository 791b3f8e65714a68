//! Transcode dispatch: orchestrator pool, per-stream session manager, and
//! the segment processing pipeline.

pub mod process;
pub mod sessions;

pub use process::process_segment;
pub use sessions::{
    BroadcastSession, OrchestratorInfo, OrchestratorPool, RenditionInfo, SessionManager,
    StaticOrchestratorPool, TranscodeResult,
};
