// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// vault-rag - Semantic index for a markdown notes vault
///
/// Indexes every note in the vault, keeps the index current while notes
/// change, and retrieves the passages closest to a question.
#[derive(Parser, Debug)]
#[command(name = "vault-rag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Config file (defaults to .vaultragrc.toml, then ~/.config/vault-rag/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Vault root, overriding `vault_path` from the config
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    /// Base directory for collections, overriding `index_dir` from the config
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index every note in the vault once
    Index {
        /// Re-embed notes even when their content is unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Index the vault, then keep the index current until Ctrl+C
    Watch {
        /// Quiet period in milliseconds before a changed note is re-indexed
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Concurrent ingestion workers
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show the passages closest to a question
    Query {
        /// Question or keywords
        query: String,

        /// Number of passages to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Print the prompt context that would be sent to a completion service
    Context {
        /// Question or keywords
        query: String,

        /// Number of passages to include
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show collection location and counts
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
