//! Per-target workers and their log sources

pub mod orchestrator;
pub mod source;
pub mod supervisor;

pub use orchestrator::{Orchestrator, OrchestratorHandle};
pub use source::{
    ChannelConnector, ChannelSource, JournalConnector, JournalSource, LineSource, SourceConnector,
    SourceError,
};
pub use supervisor::{TargetSupervisor, MAX_RECONNECT_DELAY};
