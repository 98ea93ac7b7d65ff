//! Action planner: free text → vetted command
//!
//! Pipeline: Intent Resolver (LLM, constrained) → Policy Gate → Tool
//! Registry → Command Builder. Every stage is deterministic except the
//! resolver, and the resolver is only allowed to name an intent — tools,
//! arguments, risk, and privileges all come from the static registry.

pub mod builder;
pub mod gate;
pub mod intent;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod suggest;

pub use builder::{build_command, FinalCommand};
pub use gate::{GateOutcome, PolicyGate};
pub use intent::{Intent, IntentKind};
pub use policy::{ExecutionPolicy, PolicyDecision, RiskLevel, Tactic};
pub use registry::{ToolDef, ToolRegistry};
pub use resolver::IntentResolver;
pub use suggest::{Suggestion, SuggestionEngine};
