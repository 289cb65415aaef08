//! Search command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::generation::{OpenAIGenerator, TextGenerator};
use crate::repository::SqliteRepository;
use crate::search::{SearchEngine, SearchRequest, SearchScope, SqliteSearchIndex};
use anyhow::Result;
use std::sync::Arc;

/// Run the search command.
#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    query: &str,
    video: Option<String>,
    limit: usize,
    min_score: f32,
    enhanced: bool,
    user: &str,
    settings: Settings,
) -> Result<()> {
    let repository = Arc::new(SqliteRepository::new(&settings.sqlite_path())?);
    let index = Arc::new(SqliteSearchIndex::new(&settings.index_path())?);
    let embedder = Arc::new(OpenAIEmbedder::from_settings(&settings));
    let generator: Arc<dyn TextGenerator> = Arc::new(OpenAIGenerator::from_settings(&settings));

    let engine = SearchEngine::new(repository, index, embedder).with_generator(generator);

    let request = SearchRequest {
        query: query.to_string(),
        scope: if video.is_some() {
            SearchScope::Video
        } else {
            SearchScope::Library
        },
        video_id: video,
        limit: Some(limit),
        min_similarity: Some(min_score),
        enhanced,
    };

    let spinner = Output::spinner("Searching...");
    let response = engine.search(user, request).await;
    spinner.finish_and_clear();

    match response {
        Ok(response) => {
            if response.results.is_empty() {
                Output::warning("No results found matching your query.");
            } else {
                Output::success(&format!("Found {} results", response.count));
                if response.enhanced {
                    Output::info(&format!("Expanded query: {}", response.query));
                }

                for hit in &response.results {
                    Output::search_result(
                        &hit.video_title,
                        hit.timestamp,
                        hit.similarity,
                        &hit.segment_text,
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            Err(anyhow::anyhow!("{}", e))
        }
    }
}
