//! StreamGate agent engine.
//!
//! Everything between a client chat request and its stream of events:
//! the pattern detector that recovers text-encoded tool calls, the
//! self-evolution learner that synthesizes per-model parsers, the
//! self-correction pass, and the turn orchestrator that ties them to the
//! tool registry and the upstream server.

pub mod correction;
pub mod detector;
pub mod learner;
pub mod orchestrator;
pub mod prompts;

pub use detector::{DetectedCall, DetectorOutput, Encoding, FinishOutput, StreamDetector};
pub use learner::{LearnedPattern, PatternLearner, PatternStore};
pub use orchestrator::{ChatOrchestrator, OrchestratorOptions, RequestScope};
