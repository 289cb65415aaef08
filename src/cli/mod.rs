//! CLI module for Kapitel.

pub mod commands;
mod output;

pub use output::{format_timestamp, Output};

use clap::{Parser, Subcommand};

/// Kapitel - Video Chaptering and Semantic Search
///
/// A local-first CLI tool that transcribes videos, splits them into topical
/// chapters with key insights, and makes them searchable by meaning.
/// The name "Kapitel" comes from the Norwegian/Scandinavian word for "chapter."
#[derive(Parser, Debug)]
#[command(name = "kapitel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Kapitel and verify system requirements
    Init,

    /// Transcribe, chapter and index a video file
    Process {
        /// Path to a local video file
        file: String,

        /// Display title (defaults to the file name)
        #[arg(short, long)]
        title: Option<String>,

        /// Owning user ID
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Search processed videos by meaning
    Search {
        /// Search query
        query: String,

        /// Restrict the search to one video ID
        #[arg(long)]
        video: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long, default_value = "0.5")]
        min_score: f32,

        /// Expand the query with related terms before searching
        #[arg(short, long)]
        enhanced: bool,

        /// User whose library to search
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Show the processing status of a video
    Status {
        /// Video ID
        video_id: String,
    },
}
