//! Pipeline Orchestrator
//!
//! Entry point for per-message intelligence. `process` fans out the four
//! analyses in parallel, joins them with independent error handling (a
//! failing branch degrades its slot, never the pipeline), persists each
//! surviving slot as a vector fact, and `assemble_prompt` folds everything
//! into the final character-aware prompt.
//!
//! Prompt layout is fixed: base instruction, Context section, trajectory
//! block (when it passes the injection gate), Background snippets. The
//! trajectory sits between Context and Background so the model reads the
//! emotional arc next to the personality and emotion facts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::memory::{DocType, Fact};
use crate::optimize::MemoryOptimizer;
use crate::pipeline::emotion::{EmotionAnalyzer, EmotionAssessment};
use crate::pipeline::personality::{PersonalityAnalysis, PersonalityAnalyzer};
use crate::pipeline::AnalysisError;
use crate::store::MemoryHit;
use crate::text;
use crate::trajectory::{
    CharacterArchetype, TrajectoryAnalyzer, TrajectoryCdlBridge, TrajectoryPromptContext,
};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Query used to gauge relationship depth from memory volume
const RELATIONSHIP_QUERY: &str = "relationship interaction conversation";

/// Background snippets are clipped to this many characters
const SNIPPET_LEN: usize = 100;

/// At most this many background snippets make the prompt
const MAX_SNIPPETS: usize = 3;

/// Emotion confidence below this stays out of the prompt
const EMOTION_CONFIDENCE_FLOOR: f64 = 0.7;

// ============================================================================
// ANALYSIS TYPES
// ============================================================================

/// Coarse shape of the current exchange
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Contains a question
    Question,
    /// Short, low-stakes message
    QuickExchange,
    /// Long, involved message
    DeepDiscussion,
    #[default]
    General,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Question => "question",
            InteractionType::QuickExchange => "quick_exchange",
            InteractionType::DeepDiscussion => "deep_discussion",
            InteractionType::General => "general",
        }
    }
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the assistant should pitch its response
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    #[default]
    Standard,
    Analytical,
    Supportive,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::Standard => "standard",
            ConversationMode::Analytical => "analytical",
            ConversationMode::Supportive => "supportive",
        }
    }
}

impl std::fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Interaction-context slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionAnalysis {
    pub interaction_type: InteractionType,
    pub conversation_mode: ConversationMode,
}

/// Relationship slot, derived from memory volume and content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipAnalysis {
    /// "new encounter" through "deep companion"
    pub depth: String,
    /// Observed conversation patterns, strongest first
    pub patterns: Vec<String>,
    /// Recurring topics, most frequent first
    pub topics: Vec<String>,
    /// Memories backing the depth estimate
    pub memory_count: usize,
}

/// Joined output of one pipeline run.
///
/// Slots are `None` when their branch failed; the prompt assembles either
/// way.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub user_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub personality: Option<PersonalityAnalysis>,
    pub emotion: Option<EmotionAssessment>,
    pub relationship: Option<RelationshipAnalysis>,
    pub interaction: Option<InteractionAnalysis>,
}

impl PipelineResult {
    fn empty(user_id: &str, message: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            personality: None,
            emotion: None,
            relationship: None,
            interaction: None,
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Runs the analysis fan-out and assembles the final prompt.
pub struct PipelineOrchestrator {
    optimizer: Arc<MemoryOptimizer>,
    personality: PersonalityAnalyzer,
    emotion: Arc<dyn EmotionAnalyzer>,
    bridge: TrajectoryCdlBridge,
}

impl PipelineOrchestrator {
    /// Wire the orchestrator over the shared optimizer and an emotion
    /// analysis collaborator.
    pub fn new(
        config: &CoreConfig,
        optimizer: Arc<MemoryOptimizer>,
        emotion: Arc<dyn EmotionAnalyzer>,
    ) -> Self {
        let bridge = TrajectoryCdlBridge::new(
            TrajectoryAnalyzer::new(Arc::clone(&optimizer)),
            config.trajectory_lookback,
            chrono::Duration::minutes(config.trajectory_min_span_minutes),
        );
        Self {
            personality: PersonalityAnalyzer::new(Arc::clone(&optimizer)),
            optimizer,
            emotion,
            bridge,
        }
    }

    /// Process one user message: parallel analyses, then fact persistence.
    ///
    /// Always returns a result. A failing branch logs one warning and
    /// leaves its slot empty; persistence failures are logged and
    /// swallowed, but persistence completes before this returns.
    pub async fn process(
        &self,
        user_id: &str,
        message: &str,
        recent_messages: &[String],
    ) -> PipelineResult {
        let interaction = Self::analyze_interaction(message, recent_messages);
        let (personality, emotion, relationship) = tokio::join!(
            self.personality.analyze(user_id, message),
            self.emotion.analyze(user_id, message),
            self.analyze_relationship(user_id, message),
        );

        let result = PipelineResult {
            personality: degrade_slot("personality", personality),
            emotion: degrade_slot("emotion", emotion),
            relationship: degrade_slot("relationship", relationship),
            interaction: Some(interaction),
            ..PipelineResult::empty(user_id, message)
        };

        self.persist(&result).await;
        result
    }

    /// Trajectory context for the current user, shaped for injection
    pub async fn trajectory_context(&self, user_id: &str) -> TrajectoryPromptContext {
        self.bridge.trajectory_context(user_id).await
    }

    /// Fetch trajectory and background concurrently and assemble the
    /// prompt. Both fetches are tolerant; this never fails.
    pub async fn create_prompt(
        &self,
        user_id: &str,
        message: &str,
        result: &PipelineResult,
        archetype: CharacterArchetype,
    ) -> String {
        let (trajectory, background) = tokio::join!(
            self.bridge.trajectory_context(user_id),
            self.background_snippets(user_id, message),
        );
        self.assemble_prompt(result, &trajectory, archetype, &background)
    }

    /// Compose the final prompt: base instruction, Context, trajectory
    /// block (gated), Background snippets.
    pub fn assemble_prompt(
        &self,
        result: &PipelineResult,
        trajectory: &TrajectoryPromptContext,
        archetype: CharacterArchetype,
        background: &[String],
    ) -> String {
        let mut prompt = format!(
            "You are a helpful, emotionally aware assistant. User said: \"{}\"",
            result.message
        );

        let mut context_parts: Vec<String> = Vec::new();

        if let Some(personality) = &result.personality {
            let mut bits = vec![format!("style {}", personality.communication_style)];
            if !personality.traits.is_empty() {
                bits.push(format!(
                    "traits {}",
                    personality.traits[..personality.traits.len().min(3)].join(", ")
                ));
            }
            context_parts.push(format!("Personality: {}", bits.join(", ")));
        }

        if let Some(emotion) = &result.emotion {
            let mut bits = vec![format!("current mood {}", emotion.primary_emotion)];
            if emotion.confidence >= EMOTION_CONFIDENCE_FLOOR {
                bits.push(format!("confidence {:.1}", emotion.confidence));
            }
            if emotion.support_needed {
                bits.push("needs emotional support".to_string());
            }
            context_parts.push(format!("Emotional state: {}", bits.join(", ")));
        }

        if let Some(relationship) = &result.relationship {
            let mut bits = vec![format!("depth {}", relationship.depth)];
            if !relationship.patterns.is_empty() {
                bits.push(format!(
                    "patterns {}",
                    relationship.patterns[..relationship.patterns.len().min(2)].join(", ")
                ));
            }
            if !relationship.topics.is_empty() {
                bits.push(format!(
                    "topics {}",
                    relationship.topics[..relationship.topics.len().min(3)].join(", ")
                ));
            }
            context_parts.push(format!("Relationship: {}", bits.join(", ")));
        }

        if let Some(interaction) = &result.interaction {
            context_parts.push(format!(
                "Interaction: {} interaction, {} mode",
                interaction.interaction_type, interaction.conversation_mode
            ));
        }

        if !context_parts.is_empty() {
            prompt.push_str(". Context: ");
            prompt.push_str(&context_parts.join("; "));
        }
        prompt.push_str(". Respond naturally.");

        let word_count = prompt.split_whitespace().count();
        if trajectory.should_inject(word_count) {
            let block = trajectory.format_for(archetype, true);
            if !block.is_empty() {
                prompt.push_str("\n\n");
                prompt.push_str(&block);
            }
        }

        if !background.is_empty() {
            prompt.push_str("\n\nBackground context (weave in naturally):");
            for snippet in background.iter().take(MAX_SNIPPETS) {
                let clipped: String = snippet.chars().take(SNIPPET_LEN).collect();
                prompt.push_str("\n- ");
                prompt.push_str(&clipped);
            }
        }

        prompt
    }

    // ========================================================================
    // ANALYSIS BRANCHES
    // ========================================================================

    /// Relationship depth from memory volume, plus patterns and topics
    /// mined from retrieved content.
    async fn analyze_relationship(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<RelationshipAnalysis, AnalysisError> {
        let relationship_hits = self
            .optimizer
            .search(RELATIONSHIP_QUERY, Some(user_id), 100, None)
            .await
            .map_err(|e| AnalysisError(e.to_string()))?;

        let topic_hits = self
            .optimizer
            .search(message, Some(user_id), 15, None)
            .await
            .map_err(|e| AnalysisError(e.to_string()))?;

        let memory_count = relationship_hits.len();
        let depth = match memory_count {
            0..=5 => "new encounter",
            6..=20 => "developing connection",
            21..=50 => "familiar acquaintance",
            51..=100 => "trusted friend",
            _ => "deep companion",
        };

        Ok(RelationshipAnalysis {
            depth: depth.to_string(),
            patterns: conversation_patterns(&relationship_hits),
            topics: top_topics(&topic_hits, 5),
            memory_count,
        })
    }

    /// Interaction shape from the message itself and the recent cadence.
    /// Infallible: there is always a readable shape.
    pub fn analyze_interaction(message: &str, recent_messages: &[String]) -> InteractionAnalysis {
        let interaction_type = if message.contains('?') {
            InteractionType::Question
        } else if message.len() < 50 {
            InteractionType::QuickExchange
        } else if message.len() > 200 {
            InteractionType::DeepDiscussion
        } else {
            InteractionType::General
        };

        let lowered = message.to_lowercase();
        let emotional_cue = ["feel", "felt", "emotion", "upset", "happy", "sad"]
            .iter()
            .any(|w| lowered.contains(w))
            || recent_messages.iter().rev().take(3).any(|m| {
                let m = m.to_lowercase();
                ["feel", "upset", "sad"].iter().any(|w| m.contains(w))
            });
        let analytical_cue = ["because", "therefore", "analyze", "compare", "explain"]
            .iter()
            .any(|w| lowered.contains(w));

        let conversation_mode = if emotional_cue {
            ConversationMode::Supportive
        } else if analytical_cue {
            ConversationMode::Analytical
        } else {
            ConversationMode::Standard
        };

        InteractionAnalysis {
            interaction_type,
            conversation_mode,
        }
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Persist each surviving slot as a vector fact. Failures are logged
    /// and swallowed; the conversation proceeds regardless.
    async fn persist(&self, result: &PipelineResult) {
        let user_id = result.user_id.as_str();

        if let Some(personality) = &result.personality {
            let text = format!(
                "User personality: {}, traits: {}",
                personality.communication_style,
                personality.traits.join(", ")
            );
            let fact = Fact::new(
                Some(user_id),
                DocType::Personality,
                text,
                personality.analysis_confidence,
                "personality",
            )
            .map(|f| {
                f.with_metadata("source", json!("personality_analysis"))
                    .with_metadata("communication_style", json!(personality.communication_style))
            });
            self.store_slot_fact("personality", fact).await;
        }

        if let Some(emotion) = &result.emotion {
            let text = format!(
                "User emotional state: {}, intensity: {:.2}",
                emotion.primary_emotion, emotion.intensity
            );
            let fact = Fact::new(
                Some(user_id),
                DocType::EmotionalAnalysis,
                text,
                emotion.confidence,
                "emotion",
            )
            .map(|f| {
                f.with_metadata("source", json!("emotion_analysis"))
                    .with_metadata("emotion_type", json!(emotion.primary_emotion))
                    .with_metadata("emotional_intensity", json!(emotion.intensity))
            });
            self.store_slot_fact("emotion", fact).await;
        }

        if let Some(relationship) = &result.relationship {
            let text = format!(
                "User relationship: {} connection, patterns: {}, topics: {}",
                relationship.depth,
                relationship.patterns.join(", "),
                relationship.topics.join(", ")
            );
            let fact = Fact::new(
                Some(user_id),
                DocType::RelationshipAnalysis,
                text,
                0.7,
                "relationship",
            )
            .map(|f| {
                f.with_metadata("source", json!("relationship_analysis"))
                    .with_metadata("memory_count", json!(relationship.memory_count))
            });
            self.store_slot_fact("relationship", fact).await;
        }

        if let Some(interaction) = &result.interaction {
            let text = format!(
                "Conversation context: {} interaction, {} mode",
                interaction.interaction_type, interaction.conversation_mode
            );
            let fact = Fact::new(
                Some(user_id),
                DocType::Phase4Analysis,
                text,
                0.6,
                "interaction",
            )
            .map(|f| f.with_metadata("source", json!("interaction_analysis")));
            self.store_slot_fact("interaction", fact).await;
        }
    }

    async fn store_slot_fact(&self, slot: &'static str, fact: Option<Fact>) {
        let Some(fact) = fact else {
            return;
        };
        if let Err(err) = self.optimizer.store_fact(fact).await {
            warn!(slot, error = %err, "failed to persist pipeline fact");
        }
    }

    async fn background_snippets(&self, user_id: &str, message: &str) -> Vec<String> {
        match self.optimizer.search(message, Some(user_id), 5, None).await {
            Ok(hits) => hits
                .into_iter()
                .take(MAX_SNIPPETS)
                .map(|hit| hit.content)
                .collect(),
            Err(err) => {
                debug!(error = %err, "background enhancement skipped");
                Vec::new()
            }
        }
    }
}

// ============================================================================
// CONTENT MINING
// ============================================================================

/// Words never counted as topics (conversation scaffolding)
const TOPIC_SKIP: &[&str] = &["user", "assistant"];

/// Most frequent content words across hit contents, ties alphabetical.
fn top_topics(hits: &[MemoryHit], max: usize) -> Vec<String> {
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for hit in hits {
        for word in text::content_words(&hit.content, 4) {
            if TOPIC_SKIP.contains(&word.as_str()) {
                continue;
            }
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    // BTreeMap iteration is alphabetical, and the sort is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(max).map(|(word, _)| word).collect()
}

/// Observable conversation patterns across retrieved memories.
fn conversation_patterns(hits: &[MemoryHit]) -> Vec<String> {
    if hits.is_empty() {
        return Vec::new();
    }

    let mut patterns = Vec::new();
    let count = hits.len() as f64;

    let avg_len = hits.iter().map(|h| h.content.len()).sum::<usize>() as f64 / count;
    if avg_len > 200.0 {
        patterns.push("long-form discussions".to_string());
    } else if avg_len < 80.0 {
        patterns.push("quick exchanges".to_string());
    }

    let question_rate = hits.iter().filter(|h| h.content.contains('?')).count() as f64 / count;
    if question_rate > 0.3 {
        patterns.push("question-driven conversations".to_string());
    }

    let emotional = hits.iter().any(|h| {
        h.payload
            .emotional_intensity_ema
            .or(h.payload.emotional_intensity)
            .is_some_and(|v| v > 0.6)
    });
    if emotional {
        patterns.push("emotionally open conversations".to_string());
    }

    patterns
}

fn degrade_slot<T>(slot: &'static str, result: Result<T, AnalysisError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(slot, error = %err, "pipeline analysis degraded");
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Collection, RecordPayload};

    fn hit(content: &str, ema: Option<f64>) -> MemoryHit {
        MemoryHit {
            content: content.to_string(),
            payload: RecordPayload {
                emotional_intensity_ema: ema,
                ..Default::default()
            },
            distance: 0.1,
            collection: Collection::User,
        }
    }

    #[test]
    fn test_interaction_types() {
        let q = PipelineOrchestrator::analyze_interaction("What time is it?", &[]);
        assert_eq!(q.interaction_type, InteractionType::Question);

        let quick = PipelineOrchestrator::analyze_interaction("hi", &[]);
        assert_eq!(quick.interaction_type, InteractionType::QuickExchange);

        let deep = PipelineOrchestrator::analyze_interaction(
            &"a ".repeat(150),
            &[],
        );
        assert_eq!(deep.interaction_type, InteractionType::DeepDiscussion);
    }

    #[test]
    fn test_conversation_modes() {
        let supportive =
            PipelineOrchestrator::analyze_interaction("I feel pretty low about all this today", &[]);
        assert_eq!(supportive.conversation_mode, ConversationMode::Supportive);

        let analytical = PipelineOrchestrator::analyze_interaction(
            "Explain the tradeoff because I want to compare the two options carefully",
            &[],
        );
        assert_eq!(analytical.conversation_mode, ConversationMode::Analytical);

        let standard = PipelineOrchestrator::analyze_interaction("Tell me a story about a dragon", &[]);
        assert_eq!(standard.conversation_mode, ConversationMode::Standard);
    }

    #[test]
    fn test_recent_messages_pull_supportive_mode() {
        let recent = vec!["I've been sad all week".to_string()];
        let analysis =
            PipelineOrchestrator::analyze_interaction("Tell me a story about a dragon", &recent);
        assert_eq!(analysis.conversation_mode, ConversationMode::Supportive);
    }

    #[test]
    fn test_top_topics_frequency_order() {
        let hits = vec![
            hit("User: my garden needs water\nAssistant: gardens love water", None),
            hit("User: the garden again\nAssistant: garden talk", None),
            hit("User: music practice\nAssistant: keep practicing music", None),
        ];
        let topics = top_topics(&hits, 3);
        assert_eq!(topics.first().map(String::as_str), Some("garden"));
        assert!(topics.contains(&"music".to_string()));
        // Scaffolding words never rank
        assert!(!topics.contains(&"user".to_string()));
        assert!(!topics.contains(&"assistant".to_string()));
    }

    #[test]
    fn test_conversation_patterns() {
        let short_hits = vec![hit("User: hi\nAssistant: hey", None); 4];
        assert!(conversation_patterns(&short_hits).contains(&"quick exchanges".to_string()));

        let emotional_hits = vec![hit("User: rough day\nAssistant: tell me more", Some(0.8))];
        assert!(conversation_patterns(&emotional_hits)
            .contains(&"emotionally open conversations".to_string()));

        assert!(conversation_patterns(&[]).is_empty());
    }
}
