//! Command-line argument parsing for trackrag
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// trackrag - track-scoped retrieval-augmented generation over Ollama
#[derive(Parser, Debug)]
#[command(name = "trackrag")]
#[command(version)]
#[command(about = "Retrieval-augmented generation with per-track knowledge and direct fallback", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.trackrag/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Ollama base URL
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// RAG service base URL
    #[arg(long, global = true)]
    pub rag_url: Option<String>,

    /// Knowledge data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except the result)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the RAG service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Generate a response, augmented from a track when possible
    Generate {
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Track to retrieve references from
        #[arg(short, long)]
        track: Option<String>,

        /// Number of references to retrieve
        #[arg(long)]
        top_k: Option<usize>,

        /// Model to use (default from config)
        #[arg(short, long)]
        model: Option<String>,

        /// Skip retrieval and generate directly
        #[arg(long)]
        no_rag: bool,

        /// Stream the response as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Generate a learning module for a track
    Learn {
        #[arg(short, long)]
        track: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "beginner")]
        difficulty: String,
        /// Learner goal (repeatable)
        #[arg(long = "goal")]
        goals: Vec<String>,
        #[arg(long)]
        no_rag: bool,
        /// Stream the module as it is generated (direct generation only)
        #[arg(long)]
        stream: bool,
    },

    /// Generate a multiple-choice question about some content
    Quiz {
        /// Content to ask about
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        /// Read the content from a file
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Add a document, through the service when it is running
    Add {
        #[arg(short, long)]
        track: String,
        /// Document text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        /// Read document text from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Metadata entry as key=value (repeatable)
        #[arg(long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,
        /// Write to the local data directory even if the service is running
        #[arg(long)]
        local: bool,
    },

    /// Remove every document from a track collection
    Clear {
        #[arg(short, long)]
        track: String,
        /// Clear the local data directory even if the service is running
        #[arg(long)]
        local: bool,
    },

    /// List available Ollama models
    Models,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Flags take precedence over file and environment
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.ollama_url {
            config.backends.ollama_url = url.clone();
        }
        if let Some(url) = &self.rag_url {
            config.backends.rag_url = url.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.store.data_dir = dir.clone();
        }
    }
}

impl Verbosity {
    /// Default tracing filter when RUST_LOG is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "trackrag=debug,info",
            Verbosity::VeryVerbose => "trackrag=trace,debug",
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}
