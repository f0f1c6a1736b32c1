//! Memory Optimizer
//!
//! Orchestrates the optimization fabric around the vector store:
//! - three caches (query / embedding / metadata) with per-role strategies
//! - three coalescers (embedding / storage / query) draining on short ticks
//! - query rewriting, synonym expansion, and term-overlap reranking
//! - a performance ring buffer behind every public operation
//!
//! The storage and search paths are strict: store errors propagate. Cache
//! invalidation is never attempted; query-cache TTLs bound staleness.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::embeddings::EmbeddingService;
use crate::memory::{ConversationTurn, DocType, Fact};
use crate::optimize::cache::{AdvancedCache, CacheStats, CacheStrategy};
use crate::optimize::coalescer::{BatchCoalescer, BatchProcessor, CoalescerError};
use crate::optimize::monitor::{PerformanceLog, PerformanceReport};
use crate::store::{
    Collection, MemoryHit, MemoryRecord, RecordPayload, Result, SearchFilter, StoreError,
    VectorStore,
};
use crate::text;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Coalescer cadences: ticks well under any interactive SLO
const EMBEDDING_TICK: Duration = Duration::from_millis(100);
const STORAGE_TICK: Duration = Duration::from_millis(50);
const QUERY_TICK: Duration = Duration::from_millis(20);

/// Metadata cache TTL for user conversation listings
const USER_CONVERSATIONS_TTL: Duration = Duration::from_secs(120);

/// Query rewriting drops tokens shorter than this
const MIN_QUERY_WORD_LEN: usize = 3;

/// Adaptive TTL floor for cached search results
const MIN_SEARCH_TTL: Duration = Duration::from_secs(60);

/// Exact-substring bonus applied during reranking
const RERANK_PHRASE_BONUS: f64 = 0.5;

/// Synonym table for aggressive query expansion; the first two synonyms of
/// a recognized token are injected after it.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("happy", &["joyful", "pleased", "content", "glad"]),
    ("sad", &["unhappy", "depressed", "melancholy", "down"]),
    ("angry", &["mad", "furious", "upset", "irritated"]),
    ("help", &["assist", "support", "aid", "guidance"]),
    ("question", &["ask", "inquiry", "query", "problem"]),
    ("thank", &["thanks", "grateful", "appreciate"]),
    ("good", &["great", "excellent", "nice", "wonderful"]),
    ("bad", &["terrible", "awful", "poor", "horrible"]),
    ("code", &["programming", "script", "function", "algorithm"]),
    ("bug", &["error", "issue", "problem", "defect"]),
    ("feature", &["functionality", "capability", "option"]),
    ("memory", &["remember", "recall", "conversation", "history"]),
];

/// Cue words that imply a conversation-type search
const CONVERSATION_CUES: &[&str] = &["remember", "told", "said", "conversation"];

/// Cue words that imply a fact-type search
const FACT_CUES: &[&str] = &["fact", "about", "information"];

/// Operation type labels for the performance log
const OP_SEARCH: &str = "search_memories";
const OP_STORE: &str = "store_conversation";
const OP_STORE_FACT: &str = "store_fact";
const OP_LIST: &str = "get_user_conversations";
const OP_EMBED: &str = "get_embeddings";

// ============================================================================
// OPTIMIZATION LEVEL
// ============================================================================

/// Query optimization tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Pass queries through untouched; storage is direct
    Minimal,
    /// Stop-word rewriting, adaptive limits, coalesced storage
    #[default]
    Standard,
    /// Standard plus synonym expansion, doc-type inference, reranking,
    /// and coalesced query dispatch
    Aggressive,
}

impl OptimizationLevel {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::Minimal => "minimal",
            OptimizationLevel::Standard => "standard",
            OptimizationLevel::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SUPPORT TYPES
// ============================================================================

/// A query after level-dependent rewriting
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenQuery {
    pub text: String,
    pub limit: usize,
    pub doc_types: Option<Vec<DocType>>,
}

/// Entries removed by a manual cache sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCleanup {
    pub query: usize,
    pub embedding: usize,
    pub metadata: usize,
}

/// Statistics for all three caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub query: CacheStats,
    pub embedding: CacheStats,
    pub metadata: CacheStats,
    pub total_entries: usize,
}

/// One search dispatched through the query coalescer.
///
/// The outcome is per-job so one job's store error cannot poison unrelated
/// queries drained in the same batch.
#[derive(Clone)]
struct SearchJob {
    vector: Vec<f32>,
    filter: SearchFilter,
    limit: usize,
    include_global: bool,
}

type SearchOutcome = std::result::Result<Vec<MemoryHit>, String>;
type StoreOutcome = std::result::Result<String, String>;

// ============================================================================
// BATCH PROCESSORS
// ============================================================================

/// Embeds and upserts a drained batch of conversation turns.
///
/// All contents go through one batched encode; an encode failure fails the
/// whole batch. Upserts are per-turn so one store rejection only fails its
/// own waiter.
struct StorageProcessor {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingService>,
}

#[async_trait]
impl BatchProcessor<ConversationTurn, StoreOutcome> for StorageProcessor {
    async fn process(
        &self,
        batch: Vec<ConversationTurn>,
    ) -> std::result::Result<Vec<StoreOutcome>, CoalescerError> {
        let contents: Vec<String> = batch.iter().map(ConversationTurn::content).collect();
        let vectors = self
            .embeddings
            .encode(&contents)
            .await
            .map_err(|e| CoalescerError::BatchFailed(e.to_string()))?;

        let upserts = batch
            .into_iter()
            .zip(vectors)
            .map(|(turn, vector)| {
                let record = turn_record(turn, vector);
                let store = Arc::clone(&self.store);
                async move {
                    store
                        .upsert(record)
                        .await
                        .map_err(|e| e.to_string())
                }
            });
        Ok(futures::future::join_all(upserts).await)
    }
}

/// Encodes a drained batch of texts in one model pass
struct EmbeddingBatchProcessor {
    embeddings: Arc<EmbeddingService>,
}

#[async_trait]
impl BatchProcessor<String, Vec<f32>> for EmbeddingBatchProcessor {
    async fn process(
        &self,
        batch: Vec<String>,
    ) -> std::result::Result<Vec<Vec<f32>>, CoalescerError> {
        self.embeddings
            .encode(&batch)
            .await
            .map_err(|e| CoalescerError::BatchFailed(e.to_string()))
    }
}

/// Dispatches a drained batch of rewritten searches concurrently
struct QueryProcessor {
    store: Arc<dyn VectorStore>,
}

#[async_trait]
impl BatchProcessor<SearchJob, SearchOutcome> for QueryProcessor {
    async fn process(
        &self,
        batch: Vec<SearchJob>,
    ) -> std::result::Result<Vec<SearchOutcome>, CoalescerError> {
        let searches = batch.into_iter().map(|job| {
            let store = Arc::clone(&self.store);
            async move {
                run_search(store.as_ref(), &job)
                    .await
                    .map_err(|e| e.to_string())
            }
        });
        Ok(futures::future::join_all(searches).await)
    }
}

async fn run_search(store: &dyn VectorStore, job: &SearchJob) -> Result<Vec<MemoryHit>> {
    let mut hits = store
        .search(
            Collection::User,
            job.vector.clone(),
            Some(job.filter.clone()),
            job.limit,
        )
        .await?;

    if job.include_global {
        let global = store
            .search(
                Collection::Global,
                job.vector.clone(),
                Some(job.filter.clone()),
                job.limit,
            )
            .await?;
        hits.extend(global);
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(job.limit);
    }
    Ok(hits)
}

fn turn_record(turn: ConversationTurn, vector: Vec<f32>) -> MemoryRecord {
    let content = turn.content();
    let payload = RecordPayload::from_metadata(
        Some(&turn.user_id),
        DocType::Conversation,
        turn.timestamp,
        &turn.metadata,
    );
    MemoryRecord {
        id: turn.id,
        collection: Collection::User,
        content,
        payload,
        vector,
    }
}

fn cache_key(parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]); // field separator
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ============================================================================
// MEMORY OPTIMIZER
// ============================================================================

/// The optimization layer over a [`VectorStore`] and [`EmbeddingService`].
///
/// Owns its caches, coalescers, and sweeper tasks; dropping the optimizer
/// aborts all background work.
pub struct MemoryOptimizer {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingService>,
    level: OptimizationLevel,
    relevance_cutoff: f32,
    base_ttl: Duration,
    query_cache: Arc<AdvancedCache<Vec<MemoryHit>>>,
    embedding_cache: Arc<AdvancedCache<Vec<f32>>>,
    metadata_cache: Arc<AdvancedCache<Vec<MemoryRecord>>>,
    embedding_coalescer: BatchCoalescer<String, Vec<f32>>,
    storage_coalescer: BatchCoalescer<ConversationTurn, StoreOutcome>,
    query_coalescer: BatchCoalescer<SearchJob, SearchOutcome>,
    monitor: Arc<PerformanceLog>,
    sweepers: Vec<JoinHandle<()>>,
}

impl MemoryOptimizer {
    /// Build the optimizer and start its background tasks.
    ///
    /// Must run inside a tokio runtime; sweepers and coalescer drains are
    /// spawned here and live until the optimizer drops.
    pub fn new(
        config: &CoreConfig,
        store: Arc<dyn VectorStore>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        let base_ttl = Duration::from_secs(config.cache_ttl_seconds);

        // Embeddings hold more memory per entry, metadata far less; sizes
        // and TTLs scale accordingly.
        let query_cache = Arc::new(AdvancedCache::new(
            "query",
            config.memory_cache_size,
            base_ttl,
            CacheStrategy::Hybrid,
        ));
        let embedding_cache = Arc::new(AdvancedCache::new(
            "embedding",
            config.memory_cache_size / 2,
            base_ttl * 2,
            CacheStrategy::Lru,
        ));
        let metadata_cache = Arc::new(AdvancedCache::new(
            "metadata",
            config.memory_cache_size * 2,
            base_ttl / 2,
            CacheStrategy::Ttl,
        ));

        let sweep = Duration::from_secs(config.cache_sweep_interval_seconds);
        let sweepers = vec![
            query_cache.spawn_sweeper(sweep),
            embedding_cache.spawn_sweeper(sweep),
            metadata_cache.spawn_sweeper(sweep),
        ];

        let embedding_coalescer = BatchCoalescer::spawn(
            "embedding",
            Arc::new(EmbeddingBatchProcessor {
                embeddings: Arc::clone(&embeddings),
            }) as Arc<dyn BatchProcessor<String, Vec<f32>>>,
            EMBEDDING_TICK,
            config.batch_size,
        );
        let storage_coalescer = BatchCoalescer::spawn(
            "storage",
            Arc::new(StorageProcessor {
                store: Arc::clone(&store),
                embeddings: Arc::clone(&embeddings),
            }) as Arc<dyn BatchProcessor<ConversationTurn, StoreOutcome>>,
            STORAGE_TICK,
            config.batch_size,
        );
        let query_coalescer = BatchCoalescer::spawn(
            "query",
            Arc::new(QueryProcessor {
                store: Arc::clone(&store),
            }) as Arc<dyn BatchProcessor<SearchJob, SearchOutcome>>,
            QUERY_TICK,
            config.batch_size,
        );

        info!(level = %config.optimization_level, "memory optimizer initialized");

        Self {
            store,
            embeddings,
            level: config.optimization_level,
            relevance_cutoff: config.relevance_cutoff,
            base_ttl,
            query_cache,
            embedding_cache,
            metadata_cache,
            embedding_coalescer,
            storage_coalescer,
            query_coalescer,
            monitor: Arc::new(PerformanceLog::new(
                config.monitoring_enabled,
                config.max_metric_samples,
            )),
            sweepers,
        }
    }

    /// Active optimization level
    pub fn level(&self) -> OptimizationLevel {
        self.level
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Search memories with caching, rewriting, and relevance filtering.
    pub async fn search(
        &self,
        query: &str,
        user_id: Option<&str>,
        limit: usize,
        doc_types: Option<&[DocType]>,
    ) -> Result<Vec<MemoryHit>> {
        let started = Instant::now();
        let key = Self::search_cache_key(query, user_id, limit, doc_types);

        if let Some(hits) = self.query_cache.get(&key) {
            self.monitor.sample(OP_SEARCH, started, true, limit);
            return Ok(hits);
        }

        let rewritten = self.rewrite_query(query, limit, doc_types);
        if rewritten.text != query {
            debug!(original = query, rewritten = %rewritten.text, "query rewritten");
        }

        let vector = self.embed_query(&rewritten.text).await?;
        let include_global = rewritten
            .doc_types
            .as_ref()
            .is_some_and(|types| types.contains(&DocType::GlobalFact));
        let job = SearchJob {
            vector,
            filter: SearchFilter {
                user_id: user_id.map(str::to_string),
                doc_types: rewritten.doc_types.clone(),
            },
            limit: rewritten.limit,
            include_global,
        };

        let raw = self.dispatch_search(job).await?;

        let mut hits: Vec<MemoryHit> = raw
            .into_iter()
            .filter(|hit| hit.similarity() >= self.relevance_cutoff)
            .collect();
        if self.level == OptimizationLevel::Aggressive {
            Self::rerank(query, &mut hits);
        }

        let ttl = self.adaptive_ttl(query, hits.len());
        self.query_cache.put(key, hits.clone(), Some(ttl));
        self.monitor.sample(OP_SEARCH, started, false, hits.len());
        Ok(hits)
    }

    /// Aggressive searches ride the query coalescer; everything else (and
    /// any coalescer breakdown) goes straight to the store.
    async fn dispatch_search(&self, job: SearchJob) -> Result<Vec<MemoryHit>> {
        if self.level == OptimizationLevel::Aggressive {
            match self.query_coalescer.submit(job.clone()).await {
                Ok(Ok(hits)) => return Ok(hits),
                // The store itself failed: strict path, propagate
                Ok(Err(message)) => return Err(StoreError::Unavailable(message)),
                // Optimization machinery failed: fall back to the direct path
                Err(err) => {
                    warn!(error = %err, "query coalescer unavailable, falling back to direct search");
                }
            }
        }

        run_search(self.store.as_ref(), &job).await
    }

    // ========================================================================
    // STORAGE
    // ========================================================================

    /// Store one conversation turn; coalesced at Standard and above.
    ///
    /// The turn id is content-addressed, so repeated stores of the same
    /// exchange dedupe in the vector store. No cache invalidation happens
    /// here; query-cache TTLs bound staleness.
    pub async fn store_conversation(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<String> {
        let started = Instant::now();
        let mut turn = ConversationTurn::new(user_id, user_text, assistant_text);
        if let Some(metadata) = metadata {
            turn.metadata = metadata;
        }

        let id = if self.level >= OptimizationLevel::Standard {
            match self.storage_coalescer.submit(turn).await {
                Ok(Ok(id)) => id,
                Ok(Err(message)) => return Err(StoreError::Batch(message)),
                Err(err) => return Err(err.into()),
            }
        } else {
            let vector = self.embeddings.encode_one(&turn.content()).await?;
            self.store.upsert(turn_record(turn, vector)).await?
        };

        self.monitor.sample(OP_STORE, started, false, 1);
        Ok(id)
    }

    /// Persist a pipeline fact as an ordinary vector memory.
    pub async fn store_fact(&self, fact: Fact) -> Result<String> {
        if fact.text.trim().is_empty() {
            return Err(StoreError::InvalidRecord("fact text is empty".to_string()));
        }
        let started = Instant::now();

        let vector = self.embeddings.encode_one(&fact.text).await?;
        let collection = if fact.user_id.is_some() {
            Collection::User
        } else {
            Collection::Global
        };
        let mut payload = RecordPayload::from_metadata(
            fact.user_id.as_deref(),
            fact.fact_type,
            fact.timestamp,
            &fact.metadata,
        );
        payload
            .extra
            .insert("confidence".to_string(), json!(fact.confidence));
        if !fact.category.is_empty() {
            payload
                .extra
                .insert("category".to_string(), json!(fact.category));
        }

        let id = self
            .store
            .upsert(MemoryRecord {
                id: fact.id.clone(),
                collection,
                content: fact.text,
                payload,
                vector,
            })
            .await?;

        self.monitor.sample(OP_STORE_FACT, started, false, 1);
        Ok(id)
    }

    /// List a user's stored conversations, newest first.
    pub async fn list_user_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let started = Instant::now();
        let key = cache_key(&["user_conversations", user_id, &limit.to_string()]);

        if let Some(records) = self.metadata_cache.get(&key) {
            self.monitor.sample(OP_LIST, started, true, limit);
            return Ok(records);
        }

        let filter = SearchFilter {
            user_id: Some(user_id.to_string()),
            doc_types: Some(vec![DocType::Conversation]),
        };
        let mut records = self.store.scroll(Collection::User, filter, limit).await?;
        records.sort_by(|a, b| b.payload.timestamp.cmp(&a.payload.timestamp));

        self.metadata_cache
            .put(key, records.clone(), Some(USER_CONVERSATIONS_TTL));
        self.monitor.sample(OP_LIST, started, false, records.len());
        Ok(records)
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Embed texts through the optimizer's cache and, for multi-text
    /// requests at Standard and above, the embedding coalescer.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            match self.embedding_cache.get(&Self::embedding_key(text)) {
                Some(vector) => results[i] = Some(vector),
                None => misses.push((i, text.clone())),
            }
        }
        let had_hits = misses.len() < texts.len();

        if !misses.is_empty() {
            let vectors: Vec<Vec<f32>> =
                if misses.len() > 1 && self.level >= OptimizationLevel::Standard {
                    let waiters: Vec<_> = misses
                        .iter()
                        .map(|(_, text)| self.embedding_coalescer.submit(text.clone()))
                        .collect();
                    let mut vectors = Vec::with_capacity(waiters.len());
                    for outcome in futures::future::join_all(waiters).await {
                        vectors.push(outcome?);
                    }
                    vectors
                } else {
                    let texts: Vec<String> = misses.iter().map(|(_, t)| t.clone()).collect();
                    self.embeddings.encode(&texts).await?
                };

            for ((i, text), vector) in misses.into_iter().zip(vectors) {
                self.embedding_cache
                    .put(Self::embedding_key(&text), vector.clone(), None);
                results[i] = Some(vector);
            }
        }

        self.monitor.sample(OP_EMBED, started, had_hits, texts.len());
        Ok(results.into_iter().flatten().collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::embedding_key(text);
        if let Some(vector) = self.embedding_cache.get(&key) {
            return Ok(vector);
        }
        let vector = self.embeddings.encode_one(text).await?;
        self.embedding_cache.put(key, vector.clone(), None);
        Ok(vector)
    }

    // ========================================================================
    // QUERY REWRITING
    // ========================================================================

    /// Rewrite a query according to the active optimization level.
    pub fn rewrite_query(
        &self,
        query: &str,
        limit: usize,
        doc_types: Option<&[DocType]>,
    ) -> RewrittenQuery {
        let mut rewritten = RewrittenQuery {
            text: query.to_string(),
            limit,
            doc_types: doc_types.map(<[DocType]>::to_vec),
        };
        if self.level == OptimizationLevel::Minimal {
            return rewritten;
        }

        let optimized = text::optimize_query(query, MIN_QUERY_WORD_LEN, None);
        if !optimized.is_empty() {
            rewritten.text = optimized;
        }
        rewritten.limit = Self::adjusted_limit(query, limit);

        if self.level == OptimizationLevel::Aggressive {
            rewritten.text = Self::expand_synonyms(&rewritten.text);
            if rewritten.doc_types.is_none() {
                rewritten.doc_types = Self::infer_doc_types(query);
            }
        }
        rewritten
    }

    /// Wordy queries fetch more candidates so relevance filtering has
    /// something to work with.
    fn adjusted_limit(query: &str, limit: usize) -> usize {
        let complexity = query.split_whitespace().count() + 2 * query.matches('?').count();
        if complexity > 10 {
            (limit * 2).min(20)
        } else if complexity > 5 {
            ((limit as f64 * 1.5) as usize).min(15)
        } else {
            limit
        }
    }

    /// Inject the top two synonyms after each recognized token, preserving
    /// insertion order and deduplicating.
    fn expand_synonyms(query: &str) -> String {
        let mut seen: HashSet<String> = HashSet::new();
        let mut expanded: Vec<String> = Vec::new();

        for word in query.to_lowercase().split_whitespace() {
            if seen.insert(word.to_string()) {
                expanded.push(word.to_string());
            }
            if let Some((_, synonyms)) = SYNONYMS.iter().find(|(token, _)| *token == word) {
                for synonym in synonyms.iter().take(2) {
                    if seen.insert((*synonym).to_string()) {
                        expanded.push((*synonym).to_string());
                    }
                }
            }
        }
        expanded.join(" ")
    }

    /// Infer target doc types from conversational cues in the raw query.
    fn infer_doc_types(query: &str) -> Option<Vec<DocType>> {
        let lowered = query.to_lowercase();
        if CONVERSATION_CUES.iter().any(|cue| lowered.contains(cue)) {
            return Some(vec![DocType::Conversation]);
        }
        if FACT_CUES.iter().any(|cue| lowered.contains(cue)) {
            return Some(vec![DocType::UserFact, DocType::GlobalFact]);
        }
        None
    }

    /// Term-overlap rerank with an exact-phrase bonus. Stable: ties keep
    /// their store-returned order.
    fn rerank(query: &str, hits: &mut Vec<MemoryHit>) {
        if hits.is_empty() || query.is_empty() {
            return;
        }
        let query_lower = query.to_lowercase();
        let query_tokens: HashSet<&str> = query_lower.split_whitespace().collect();

        let mut scored: Vec<(f64, MemoryHit)> = hits
            .drain(..)
            .map(|hit| {
                let content_lower = hit.content.to_lowercase();
                let content_tokens: HashSet<&str> = content_lower.split_whitespace().collect();
                let mut score = if content_tokens.is_empty() {
                    0.0
                } else {
                    query_tokens.intersection(&content_tokens).count() as f64
                        / content_tokens.len() as f64
                };
                if content_lower.contains(&query_lower) {
                    score += RERANK_PHRASE_BONUS;
                }
                (score, hit)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        *hits = scored.into_iter().map(|(_, hit)| hit).collect();
    }

    /// TTL scaled by query characteristics: short queries recur, large
    /// result sets churn.
    fn adaptive_ttl(&self, query: &str, result_count: usize) -> Duration {
        let mut ttl = self.base_ttl;
        if query.split_whitespace().count() <= 3 {
            ttl *= 2;
        }
        if result_count > 10 {
            ttl /= 2;
        }
        ttl.max(MIN_SEARCH_TTL)
    }

    fn search_cache_key(
        query: &str,
        user_id: Option<&str>,
        limit: usize,
        doc_types: Option<&[DocType]>,
    ) -> String {
        let mut type_names: Vec<&str> = doc_types
            .unwrap_or_default()
            .iter()
            .map(DocType::as_str)
            .collect();
        type_names.sort_unstable();

        let limit_str = limit.to_string();
        let mut parts = vec!["search", query, user_id.unwrap_or(""), limit_str.as_str()];
        parts.extend(type_names);
        cache_key(&parts)
    }

    fn embedding_key(text: &str) -> String {
        cache_key(&["embedding", text])
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Manually sweep expired entries from all three caches.
    pub fn cleanup_caches(&self) -> CacheCleanup {
        let cleanup = CacheCleanup {
            query: self.query_cache.cleanup_expired(),
            embedding: self.embedding_cache.cleanup_expired(),
            metadata: self.metadata_cache.cleanup_expired(),
        };
        let total = cleanup.query + cleanup.embedding + cleanup.metadata;
        if total > 0 {
            info!(total, "cache cleanup complete");
        }
        cleanup
    }

    /// Prime the query cache with common queries for known users.
    ///
    /// Bounded to 10 queries x 5 users; individual failures are logged
    /// and skipped.
    pub async fn warm_up(&self, queries: &[String], user_ids: &[String]) {
        let mut warmers = Vec::new();
        for query in queries.iter().take(10) {
            for user_id in user_ids.iter().take(5) {
                warmers.push(self.search(query, Some(user_id), 5, None));
            }
        }
        let total = warmers.len();
        let results = futures::future::join_all(warmers).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total, "cache warm-up partially failed");
        } else {
            info!(total, "cache warm-up complete");
        }
    }

    /// Statistics for all three caches
    pub fn cache_summary(&self) -> CacheSummary {
        let query = self.query_cache.stats();
        let embedding = self.embedding_cache.stats();
        let metadata = self.metadata_cache.stats();
        let total_entries = query.size + embedding.size + metadata.size;
        CacheSummary {
            query,
            embedding,
            metadata,
            total_entries,
        }
    }

    /// Windowed per-operation performance aggregate
    pub fn performance_report(&self, window: Duration) -> PerformanceReport {
        self.monitor.aggregate(window)
    }

    /// The performance ring buffer
    pub fn monitor(&self) -> &PerformanceLog {
        &self.monitor
    }
}

impl Drop for MemoryOptimizer {
    fn drop(&mut self) {
        for sweeper in &self.sweepers {
            sweeper.abort();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjusted_limit_tiers() {
        // Simple query: untouched
        assert_eq!(MemoryOptimizer::adjusted_limit("cat facts", 5), 5);
        // Medium complexity (6 words): x1.5
        assert_eq!(
            MemoryOptimizer::adjusted_limit("tell me all about the cat", 6),
            9
        );
        // Wordy question (9 words + '?' counted double): x2 capped at 20
        assert_eq!(
            MemoryOptimizer::adjusted_limit(
                "what did we talk about regarding my old cat?",
                15
            ),
            20
        );
    }

    #[test]
    fn test_expand_synonyms_order_and_dedup() {
        let expanded = MemoryOptimizer::expand_synonyms("help code");
        assert_eq!(expanded, "help assist support code programming script");

        // Duplicate synonym not re-inserted
        let expanded = MemoryOptimizer::expand_synonyms("bug error");
        assert_eq!(expanded, "bug error issue");
    }

    #[test]
    fn test_infer_doc_types_from_cues() {
        assert_eq!(
            MemoryOptimizer::infer_doc_types("do you remember what I said"),
            Some(vec![DocType::Conversation])
        );
        assert_eq!(
            MemoryOptimizer::infer_doc_types("tell me a fact about whales"),
            Some(vec![DocType::UserFact, DocType::GlobalFact])
        );
        assert_eq!(MemoryOptimizer::infer_doc_types("hello there"), None);
    }

    #[test]
    fn test_rerank_overlap_and_phrase_bonus() {
        fn hit(content: &str) -> MemoryHit {
            MemoryHit {
                content: content.to_string(),
                payload: RecordPayload::default(),
                distance: 0.1,
                collection: Collection::User,
            }
        }

        let mut hits = vec![
            hit("nothing relevant whatsoever in this one"),
            hit("the cat story"),
            hit("cat story details and more words besides"),
        ];
        MemoryOptimizer::rerank("cat story", &mut hits);

        // Exact phrase + high overlap wins; the irrelevant hit sinks
        assert_eq!(hits[0].content, "the cat story");
        assert_eq!(hits[2].content, "nothing relevant whatsoever in this one");
    }

    #[test]
    fn test_rerank_ties_preserve_order() {
        fn hit(content: &str) -> MemoryHit {
            MemoryHit {
                content: content.to_string(),
                payload: RecordPayload::default(),
                distance: 0.1,
                collection: Collection::User,
            }
        }

        let mut hits = vec![hit("alpha beta"), hit("gamma delta")];
        MemoryOptimizer::rerank("unrelated", &mut hits);
        assert_eq!(hits[0].content, "alpha beta");
        assert_eq!(hits[1].content, "gamma delta");
    }

    #[test]
    fn test_search_cache_key_sorts_doc_types() {
        let a = MemoryOptimizer::search_cache_key(
            "q",
            Some("u"),
            5,
            Some(&[DocType::UserFact, DocType::GlobalFact]),
        );
        let b = MemoryOptimizer::search_cache_key(
            "q",
            Some("u"),
            5,
            Some(&[DocType::GlobalFact, DocType::UserFact]),
        );
        assert_eq!(a, b);

        let c = MemoryOptimizer::search_cache_key("q", Some("u"), 6, None);
        assert_ne!(a, c);
    }
}
