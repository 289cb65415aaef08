//! Kapitel - Video Chaptering and Semantic Search
//!
//! A local-first tool for turning videos into searchable, chaptered knowledge.
//!
//! The name "Kapitel" comes from the Norwegian/Scandinavian word for "chapter."
//!
//! # Overview
//!
//! Kapitel allows you to:
//! - Transcribe local video files with word-level timestamps
//! - Split transcripts into topical chapters with titles and descriptions
//! - Extract typed key insights from each chapter
//! - Search your library semantically with cosine similarity
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `audio` - Audio extraction from video files
//! - `transcription` - Speech-to-text transcription
//! - `segmenter` - Topic-based transcript segmentation
//! - `insights` - Key insight extraction per chapter
//! - `embedding` - Embedding generation
//! - `search` - Embedding index and similarity search
//! - `repository` - Video/transcript/segment persistence
//! - `queue` - Asynchronous processing job queue
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use kapitel::config::Settings;
//! use kapitel::orchestrator::Orchestrator;
//! use kapitel::progress::LogSink;
//! use kapitel::repository::{Video, VideoRepository};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::from_settings(&settings)?;
//!
//!     let video = Video::new("local", "Intro to Neural Networks", "/videos/intro.mp4");
//!     orchestrator.repository().insert_video(&video).await?;
//!     orchestrator.run(&video.id, Arc::new(LogSink)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod insights;
pub mod notifier;
pub mod openai;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod repository;
pub mod search;
pub mod segmenter;
pub mod transcription;

pub use error::{KapitelError, Result};
