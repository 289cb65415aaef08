//! Natural-language search over indexed segments.

use super::{ScoredSegment, SearchIndex};
use crate::embedding::Embedder;
use crate::error::{KapitelError, Result};
use crate::generation::TextGenerator;
use crate::repository::VideoRepository;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const QUERY_EXPANSION_SYSTEM_PROMPT: &str = "You are a search query optimizer. Expand the user's search query to include synonyms and related terms that would help find relevant content. Return only the expanded query, not an explanation.";

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 50;
const DEFAULT_MIN_SIMILARITY: f32 = 0.5;

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// One video only.
    Video,
    /// All of the user's completed videos.
    #[default]
    Library,
}

/// A search request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Natural-language query (must be non-empty).
    pub query: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Video to search within (required when scope is `video`).
    pub video_id: Option<String>,
    /// Maximum number of results (clamped to 1-50).
    pub limit: Option<usize>,
    /// Minimum similarity threshold (clamped to 0-1).
    pub min_similarity: Option<f32>,
    /// Expand the query with related terms before embedding.
    pub enhanced: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            scope: SearchScope::Library,
            video_id: None,
            limit: None,
            min_similarity: None,
            enhanced: false,
        }
    }
}

impl SearchRequest {
    /// Create a library-scoped request with defaults.
    pub fn library(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    /// Create a video-scoped request with defaults.
    pub fn video(query: &str, video_id: &str) -> Self {
        Self {
            query: query.to_string(),
            scope: SearchScope::Video,
            video_id: Some(video_id.to_string()),
            ..Self::default()
        }
    }
}

/// A single ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub segment_id: String,
    pub video_id: String,
    pub video_title: String,
    pub segment_title: String,
    pub segment_text: String,
    /// Segment start time in seconds.
    pub timestamp: f64,
    pub similarity: f32,
}

/// A complete search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// The query as executed (after any expansion).
    pub query: String,
    pub count: usize,
    pub enhanced: bool,
}

/// Similarity search engine over a user's indexed segments.
pub struct SearchEngine {
    repository: Arc<dyn VideoRepository>,
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl SearchEngine {
    /// Create a search engine without query expansion support.
    pub fn new(
        repository: Arc<dyn VideoRepository>,
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            repository,
            index,
            embedder,
            generator: None,
        }
    }

    /// Enable query expansion via a text generator.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Run a similarity search for one user.
    #[instrument(skip(self, request), fields(user_id = %user_id, scope = ?request.scope))]
    pub async fn search(&self, user_id: &str, request: SearchRequest) -> Result<SearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(KapitelError::InvalidInput("Query must not be empty".into()));
        }
        if request.scope == SearchScope::Video && request.video_id.is_none() {
            return Err(KapitelError::InvalidInput(
                "video_id is required for video-scoped search".into(),
            ));
        }

        let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let min_similarity = request
            .min_similarity
            .unwrap_or(DEFAULT_MIN_SIMILARITY)
            .clamp(0.0, 1.0);

        // Expansion is best-effort; the original query always survives
        let (effective_query, enhanced) = if request.enhanced {
            match self.expand_query(query).await {
                Some(expanded) => (format!("{} {}", query, expanded), true),
                None => (query.to_string(), false),
            }
        } else {
            (query.to_string(), false)
        };

        // Only completed videos owned by the requesting user are searchable
        let completed = self.repository.list_completed_videos(user_id).await?;
        let titles: HashMap<String, String> = completed
            .iter()
            .map(|v| (v.id.clone(), v.title.clone()))
            .collect();

        let video_ids: Vec<String> = match request.scope {
            SearchScope::Library => completed.iter().map(|v| v.id.clone()).collect(),
            SearchScope::Video => {
                let target = request.video_id.as_deref().unwrap_or_default();
                completed
                    .iter()
                    .filter(|v| v.id == target)
                    .map(|v| v.id.clone())
                    .collect()
            }
        };

        if video_ids.is_empty() {
            debug!("No searchable videos in scope");
            return Ok(SearchResponse {
                results: Vec::new(),
                query: effective_query,
                count: 0,
                enhanced,
            });
        }

        let query_embedding = self.embedder.embed(&effective_query).await?;

        let mut scored = self
            .index
            .scan(&query_embedding, &video_ids, min_similarity)
            .await
            .map_err(|e| {
                warn!("Index scan failed: {}", e);
                KapitelError::SearchFailed
            })?;

        // Stable sort keeps insertion/order_index order for equal scores
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        let results: Vec<SearchHit> = scored
            .into_iter()
            .map(|s| to_hit(s, &titles))
            .collect();

        info!("Search returned {} results", results.len());

        Ok(SearchResponse {
            count: results.len(),
            results,
            query: effective_query,
            enhanced,
        })
    }

    /// Ask the text generator for synonym/related-term expansions.
    async fn expand_query(&self, query: &str) -> Option<String> {
        let generator = self.generator.as_ref()?;
        let user = format!("Expand this search query: \"{}\"", query);

        match generator.complete(QUERY_EXPANSION_SYSTEM_PROMPT, &user).await {
            Ok(expanded) => {
                let expanded = expanded.trim().to_string();
                if expanded.is_empty() {
                    None
                } else {
                    Some(expanded)
                }
            }
            Err(e) => {
                warn!("Query expansion failed, using original query: {}", e);
                None
            }
        }
    }
}

fn to_hit(scored: ScoredSegment, titles: &HashMap<String, String>) -> SearchHit {
    let video_title = titles
        .get(&scored.segment.video_id)
        .cloned()
        .unwrap_or_default();

    SearchHit {
        segment_id: scored.segment.segment_id.to_string(),
        video_id: scored.segment.video_id,
        video_title,
        segment_title: scored.segment.segment_title,
        segment_text: scored.segment.segment_text,
        timestamp: scored.segment.start_time,
        similarity: scored.similarity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryRepository, Video, VideoStatus};
    use crate::search::{IndexedSegment, MemorySearchIndex};
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    /// Embedder that maps known phrases to fixed unit vectors.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let v = if text.contains("gradient") {
                vec![1.0, 0.0, 0.0]
            } else if text.contains("backprop") {
                vec![0.0, 1.0, 0.0]
            } else {
                vec![0.57735, 0.57735, 0.57735]
            };
            Ok(v)
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    fn doc(video_id: &str, order_index: i32, embedding: Vec<f32>) -> IndexedSegment {
        IndexedSegment {
            segment_id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            segment_title: format!("Chapter {}", order_index),
            segment_text: "Segment text".to_string(),
            start_time: order_index as f64 * 30.0,
            order_index,
            embedding,
            model_id: "stub".to_string(),
            indexed_at: Utc::now(),
        }
    }

    async fn completed_video(repo: &MemoryRepository, id: &str, user: &str) {
        let mut video = Video::new(user, &format!("Video {}", id), "/tmp/v.mp4");
        video.id = id.to_string();
        repo.insert_video(&video).await.unwrap();
        repo.set_status(id, VideoStatus::Processing, None).await.unwrap();
        repo.set_status(id, VideoStatus::Completed, None).await.unwrap();
    }

    async fn engine_with_corpus() -> SearchEngine {
        let repo = Arc::new(MemoryRepository::new());
        let index = Arc::new(MemorySearchIndex::new());

        completed_video(&repo, "v1", "user1").await;
        completed_video(&repo, "v2", "user1").await;
        completed_video(&repo, "v3", "user2").await;

        index.upsert(&doc("v1", 0, vec![1.0, 0.0, 0.0])).await.unwrap();
        index.upsert(&doc("v1", 1, vec![0.9, 0.1, 0.0])).await.unwrap();
        index.upsert(&doc("v2", 0, vec![0.0, 1.0, 0.0])).await.unwrap();
        index.upsert(&doc("v3", 0, vec![1.0, 0.0, 0.0])).await.unwrap();

        SearchEngine::new(repo, index, Arc::new(StubEmbedder))
    }

    #[tokio::test]
    async fn test_results_sorted_descending() {
        let engine = engine_with_corpus().await;
        let response = engine
            .search("user1", SearchRequest::library("gradient descent"))
            .await
            .unwrap();

        assert_eq!(response.count, 2);
        assert!(response.results[0].similarity >= response.results[1].similarity);
        assert_eq!(response.results[0].video_title, "Video v1");
    }

    #[tokio::test]
    async fn test_threshold_excludes_all() {
        let engine = engine_with_corpus().await;
        let mut request = SearchRequest::library("gradient");
        request.min_similarity = Some(0.999);

        let response = engine.search("user1", request).await.unwrap();
        // Only the exact-match vector passes a near-1.0 threshold
        assert!(response.count <= 1);

        let mut request = SearchRequest::library("unrelated topic");
        request.min_similarity = Some(0.9);
        let response = engine.search("user1", request).await.unwrap();
        assert_eq!(response.count, 0);
    }

    #[tokio::test]
    async fn test_limit_truncation() {
        let repo = Arc::new(MemoryRepository::new());
        let index = Arc::new(MemorySearchIndex::new());
        completed_video(&repo, "v1", "user1").await;
        for i in 0..20 {
            index.upsert(&doc("v1", i, vec![1.0, 0.0, 0.0])).await.unwrap();
        }
        let engine = SearchEngine::new(repo, index, Arc::new(StubEmbedder));

        let mut request = SearchRequest::library("gradient");
        request.limit = Some(5);
        let response = engine.search("user1", request).await.unwrap();
        assert_eq!(response.count, 5);
    }

    #[tokio::test]
    async fn test_video_scope_isolation() {
        let engine = engine_with_corpus().await;
        let response = engine
            .search("user1", SearchRequest::video("gradient", "v2"))
            .await
            .unwrap();

        // v1 has more similar segments but is out of scope
        for hit in &response.results {
            assert_eq!(hit.video_id, "v2");
        }
    }

    #[tokio::test]
    async fn test_other_users_videos_invisible() {
        let engine = engine_with_corpus().await;
        let response = engine
            .search("user2", SearchRequest::library("gradient"))
            .await
            .unwrap();

        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].video_id, "v3");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let engine = engine_with_corpus().await;
        let err = engine
            .search("user1", SearchRequest::library("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, KapitelError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_video_scope_requires_video_id() {
        let engine = engine_with_corpus().await;
        let mut request = SearchRequest::library("gradient");
        request.scope = SearchScope::Video;

        let err = engine.search("user1", request).await.unwrap_err();
        assert!(matches!(err, KapitelError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty_results() {
        let repo = Arc::new(MemoryRepository::new());
        completed_video(&repo, "v1", "user1").await;
        let engine = SearchEngine::new(
            repo,
            Arc::new(MemorySearchIndex::new()),
            Arc::new(StubEmbedder),
        );

        let response = engine
            .search("user1", SearchRequest::library("anything at all"))
            .await
            .unwrap();
        assert_eq!(response.count, 0);
    }

    #[tokio::test]
    async fn test_expansion_failure_is_not_fatal() {
        struct FailingGenerator;

        #[async_trait]
        impl TextGenerator for FailingGenerator {
            async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
                Err(KapitelError::Generation("offline".to_string()))
            }
        }

        let engine = engine_with_corpus().await.with_generator(Arc::new(FailingGenerator));
        let mut request = SearchRequest::library("gradient");
        request.enhanced = true;

        let response = engine.search("user1", request).await.unwrap();
        assert!(!response.enhanced);
        assert_eq!(response.query, "gradient");
        assert!(response.count > 0);
    }

    #[tokio::test]
    async fn test_expansion_concatenates_original_query() {
        struct EchoGenerator;

        #[async_trait]
        impl TextGenerator for EchoGenerator {
            async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
                Ok("slope optimization".to_string())
            }
        }

        let engine = engine_with_corpus().await.with_generator(Arc::new(EchoGenerator));
        let mut request = SearchRequest::library("gradient");
        request.enhanced = true;

        let response = engine.search("user1", request).await.unwrap();
        assert!(response.enhanced);
        assert_eq!(response.query, "gradient slope optimization");
    }
}
