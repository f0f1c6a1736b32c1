//! Emotional Trajectory Analysis
//!
//! Extracts the arc of a user's emotional state from stored memories and
//! turns it into something a character can act on:
//!
//! - [`TrajectoryAnalyzer`] - pulls ordered emotional points out of the
//!   vector store, fits slope/variance/acceleration, classifies the trend,
//!   and phrases a natural-language summary
//! - [`TrajectoryCdlBridge`] - converts a trajectory into a prompt-ready
//!   block, gated by confidence and injection priority
//!
//! The whole layer is additive: every failure degrades to "no trajectory"
//! and the conversation proceeds without it.

mod analyzer;
mod bridge;

pub use analyzer::{
    EmotionalPoint, TrajectoryAnalyzer, TrajectoryContext, TrajectoryTrend, TrajectoryVector,
    TRAJECTORY_QUERY,
};
pub use bridge::{
    confidence, emotional_awareness, format_time_context, injection_priority,
    CharacterArchetype, TrajectoryCdlBridge, TrajectoryPromptContext,
};
