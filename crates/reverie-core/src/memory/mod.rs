//! Memory data model
//!
//! The fundamental units stored in the vector database:
//! - [`ConversationTurn`] - one user/assistant exchange, content-addressed
//! - [`Fact`] - a typed assertion extracted by the analysis pipeline
//! - [`DocType`] - the document type tag shared by records and search filters
//!
//! Turn ids are a hash of the concatenated user and assistant text, which
//! gives natural idempotence: storing the same exchange twice produces the
//! same id and the vector store dedupes on upsert.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// DOCUMENT TYPES
// ============================================================================

/// Types of documents held in the vector store
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// A stored user/assistant exchange
    #[default]
    Conversation,
    /// Personality insight extracted by the pipeline
    Personality,
    /// Emotional analysis extracted by the pipeline
    EmotionalAnalysis,
    /// Relationship analysis extracted by the pipeline
    RelationshipAnalysis,
    /// Interaction-context analysis extracted by the pipeline
    Phase4Analysis,
    /// A fact about a specific user
    UserFact,
    /// A fact shared across all users
    GlobalFact,
}

impl DocType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Conversation => "conversation",
            DocType::Personality => "personality",
            DocType::EmotionalAnalysis => "emotional_analysis",
            DocType::RelationshipAnalysis => "relationship_analysis",
            DocType::Phase4Analysis => "phase4_analysis",
            DocType::UserFact => "user_fact",
            DocType::GlobalFact => "global_fact",
        }
    }

    /// Parse from string name, defaulting to `Conversation`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "personality" => DocType::Personality,
            "emotional_analysis" => DocType::EmotionalAnalysis,
            "relationship_analysis" => DocType::RelationshipAnalysis,
            "phase4_analysis" => DocType::Phase4Analysis,
            "user_fact" => DocType::UserFact,
            "global_fact" => DocType::GlobalFact,
            _ => DocType::Conversation,
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONTENT-ADDRESSED IDS
// ============================================================================

/// Hex digest prefix length for content-addressed ids
const ID_HASH_LEN: usize = 12;

fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..ID_HASH_LEN].to_string()
}

// ============================================================================
// CONVERSATION TURN
// ============================================================================

/// One user/assistant exchange.
///
/// Immutable once created; the id is deterministic from
/// `(user_text, assistant_text)` so repeated stores dedupe in the vector
/// store. Retention is the store's concern, turns are never deleted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    /// Content-addressed identifier
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// When the exchange happened
    pub timestamp: DateTime<Utc>,
    /// What the user said
    pub user_text: String,
    /// What the assistant replied
    pub assistant_text: String,
    /// Free-form annotations (emotional intensity, source channel, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ConversationTurn {
    /// Create a new turn stamped with the current time
    pub fn new(
        user_id: impl Into<String>,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
    ) -> Self {
        let user_text = user_text.into();
        let assistant_text = assistant_text.into();
        Self {
            id: Self::turn_id(&user_text, &assistant_text),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            user_text,
            assistant_text,
            metadata: BTreeMap::new(),
        }
    }

    /// Deterministic id for an exchange: hash of the concatenated texts
    pub fn turn_id(user_text: &str, assistant_text: &str) -> String {
        format!("conversation_{}", short_hash(&[user_text, assistant_text]))
    }

    /// Render the turn as a single searchable document
    pub fn content(&self) -> String {
        format!("User: {}\nAssistant: {}", self.user_text, self.assistant_text)
    }
}

// ============================================================================
// FACTS
// ============================================================================

/// A typed assertion extracted from pipeline analysis.
///
/// Written after each processed turn and queried as ordinary memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    /// Deterministic identifier from `(fact_type, user_id, text)`
    pub id: String,
    /// Owning user, `None` for global facts
    pub user_id: Option<String>,
    /// What kind of assertion this is
    pub fact_type: DocType,
    /// The assertion itself (never empty)
    pub text: String,
    /// Reliability of the assertion, clamped to `[0, 1]`
    pub confidence: f64,
    /// Coarse grouping label
    pub category: String,
    /// Free-form annotations
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// When the fact was produced
    pub timestamp: DateTime<Utc>,
}

impl Fact {
    /// Build a fact, returning `None` when the text is empty after trimming.
    ///
    /// Confidence is clamped to `[0, 1]`.
    pub fn new(
        user_id: Option<&str>,
        fact_type: DocType,
        text: impl Into<String>,
        confidence: f64,
        category: impl Into<String>,
    ) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        let user_id = user_id.map(str::to_string);
        let id = format!(
            "{}_{}",
            fact_type.as_str(),
            short_hash(&[user_id.as_deref().unwrap_or(""), &text])
        );
        Some(Self {
            id,
            user_id,
            fact_type,
            text,
            confidence: confidence.clamp(0.0, 1.0),
            category: category.into(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        })
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_roundtrip() {
        for doc_type in [
            DocType::Conversation,
            DocType::Personality,
            DocType::EmotionalAnalysis,
            DocType::RelationshipAnalysis,
            DocType::Phase4Analysis,
            DocType::UserFact,
            DocType::GlobalFact,
        ] {
            assert_eq!(DocType::parse_name(doc_type.as_str()), doc_type);
        }
    }

    #[test]
    fn test_turn_id_deterministic() {
        let a = ConversationTurn::new("u1", "hello", "hi there");
        let b = ConversationTurn::new("u1", "hello", "hi there");
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("conversation_"));
    }

    #[test]
    fn test_turn_id_sensitive_to_both_sides() {
        let base = ConversationTurn::turn_id("hello", "hi");
        assert_ne!(base, ConversationTurn::turn_id("hello", "hey"));
        assert_ne!(base, ConversationTurn::turn_id("hullo", "hi"));
    }

    #[test]
    fn test_fact_rejects_empty_text() {
        assert!(Fact::new(Some("u1"), DocType::Personality, "", 0.5, "style").is_none());
        assert!(Fact::new(Some("u1"), DocType::Personality, "   ", 0.5, "style").is_none());
    }

    #[test]
    fn test_fact_confidence_clamped() {
        let fact = Fact::new(Some("u1"), DocType::UserFact, "likes tea", 1.7, "preference")
            .expect("non-empty fact");
        assert_eq!(fact.confidence, 1.0);

        let fact = Fact::new(None, DocType::GlobalFact, "water is wet", -0.5, "trivia")
            .expect("non-empty fact");
        assert_eq!(fact.confidence, 0.0);
        assert!(fact.user_id.is_none());
    }

    #[test]
    fn test_fact_id_deterministic() {
        let a = Fact::new(Some("u1"), DocType::Personality, "casual style", 0.8, "style");
        let b = Fact::new(Some("u1"), DocType::Personality, "casual style", 0.3, "style");
        assert_eq!(a.unwrap().id, b.unwrap().id);
    }
}
