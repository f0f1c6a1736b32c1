//! # Reverie Core
//!
//! Conversational memory and intelligence core for character-driven chat.
//! Every user turn becomes an embedded, annotated vector record; retrieval,
//! emotional-arc analysis, and prompt assembly all run on top of that store:
//!
//! - **Memory Optimization**: query/embedding/metadata caches with LRU, TTL,
//!   and hybrid eviction; batch coalescers for embeddings, storage, and
//!   queries; query rewriting, synonym expansion, and reranking
//! - **Embedding Service**: single-model batch encoding behind an LRU
//!   vector cache, model loading serialized and offloaded
//! - **Emotional Trajectory**: ordered intensity points fitted for slope,
//!   variance, and acceleration; trend classification and natural-language
//!   summaries with confidence-gated prompt injection
//! - **Analysis Pipeline**: personality, emotion, relationship, and
//!   interaction analyses fan out in parallel, persist as vector facts, and
//!   fold into one character-aware prompt
//!
//! The vector database and the LLM endpoint are collaborators behind
//! contracts ([`VectorStore`], [`EmbeddingModel`]); nothing in the core
//! persists on its own.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use reverie_core::prelude::*;
//!
//! let config = CoreConfig::default();
//! config.validate()?;
//!
//! let embeddings = Arc::new(EmbeddingService::new(
//!     model, // your EmbeddingModel implementation
//!     config.embedding_cache_size,
//!     config.embedding_batch_size,
//! ));
//! let optimizer = Arc::new(MemoryOptimizer::new(&config, store, embeddings));
//! let pipeline = PipelineOrchestrator::new(
//!     &config,
//!     Arc::clone(&optimizer),
//!     Arc::new(LexicalEmotionAnalyzer::new()),
//! );
//!
//! // One turn: analyze, persist facts, assemble the prompt
//! let result = pipeline.process("user-1", "I'm so frustrated today", &[]).await;
//! let prompt = pipeline
//!     .create_prompt("user-1", "I'm so frustrated today", &result, CharacterArchetype::RealWorld)
//!     .await;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod embeddings;
pub mod memory;
pub mod optimize;
pub mod pipeline;
pub mod store;
pub mod text;
pub mod trajectory;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration
pub use config::{ConfigError, CoreConfig};

// Memory data model
pub use memory::{ConversationTurn, DocType, Fact};

// Vector store contract
pub use store::{
    Collection, MemoryHit, MemoryRecord, RecordPayload, Result, SearchFilter, StoreError,
    VectorStore,
};

// Embeddings
pub use embeddings::{
    cosine_similarity, EmbeddingError, EmbeddingModel, EmbeddingService, EmbeddingStats,
};

// Optimization fabric
pub use optimize::{
    AdvancedCache, BatchCoalescer, BatchProcessor, CacheCleanup, CacheStats, CacheStrategy,
    CacheSummary, CoalescerError, MemoryOptimizer, OperationStats, OptimizationLevel,
    PerformanceLog, PerformanceReport, PerformanceSample, RewrittenQuery,
};

// Emotional trajectory
pub use trajectory::{
    CharacterArchetype, EmotionalPoint, TrajectoryAnalyzer, TrajectoryCdlBridge,
    TrajectoryContext, TrajectoryPromptContext, TrajectoryTrend, TrajectoryVector,
};

// Analysis pipeline
pub use pipeline::{
    AnalysisError, ConversationMode, EmotionAnalyzer, EmotionAssessment, HistoricalPatterns,
    InteractionAnalysis, InteractionType, LexicalEmotionAnalyzer, PersonalityAnalysis,
    PersonalityAnalyzer, PipelineOrchestrator, PipelineResult, RelationshipAnalysis,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CharacterArchetype, Collection, ConversationTurn, CoreConfig, DocType, EmbeddingModel,
        EmbeddingService, Fact, LexicalEmotionAnalyzer, MemoryHit, MemoryOptimizer, MemoryRecord,
        OptimizationLevel, PipelineOrchestrator, PipelineResult, RecordPayload, Result,
        SearchFilter, StoreError, TrajectoryAnalyzer, TrajectoryCdlBridge, TrajectoryTrend,
        VectorStore,
    };
}
