//! AI Analysis Pipeline
//!
//! Per-message intelligence: four analyses fan out in parallel, their
//! results persist as vector facts, and everything folds into one
//! character-aware prompt.
//!
//! The pipeline is tolerant end to end. Any analysis can fail; its slot
//! degrades to empty, the failure is logged once, and the prompt still
//! assembles. The only strict paths in the system are storage and search,
//! and even their failures stop at the persistence boundary here.

mod emotion;
mod orchestrator;
mod personality;

pub use emotion::{EmotionAnalyzer, EmotionAssessment, LexicalEmotionAnalyzer};
pub use orchestrator::{
    ConversationMode, InteractionAnalysis, InteractionType, PipelineOrchestrator, PipelineResult,
    RelationshipAnalysis,
};
pub use personality::{HistoricalPatterns, PersonalityAnalysis, PersonalityAnalyzer};

/// Failure of a single pipeline analysis branch.
///
/// Never escapes the pipeline: the owning slot degrades to empty.
#[derive(Debug, Clone, thiserror::Error)]
#[error("analysis failed: {0}")]
pub struct AnalysisError(pub String);
