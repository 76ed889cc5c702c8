//! StreamGate memory — the append-only per-user fact memory engine.
//!
//! The fact log is the source of truth; everything else (index snapshot,
//! markdown projections, prompt summaries) is derived and rebuildable.
//! A background worker extracts durable facts from logged chat turns.

pub mod extract;
pub mod history;
pub mod index;
pub mod log;
pub mod projection;
pub mod store;
pub mod worker;

pub use history::{log_chat_turn, HistoryEntry};
pub use index::MemoryIndex;
pub use store::MemoryStore;
pub use worker::{MemoryWorker, WorkerOptions};
