// SPDX-License-Identifier: MIT OR Apache-2.0

//! vault-rag - Semantic index for a markdown notes vault

mod cli;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, OutputFormat};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use vault_rag::app::App;
use vault_rag::completion::{CompletionRequest, NO_MATCH_ANSWER};
use vault_rag::config::Config;
use vault_rag::output;
use vault_rag::retrieval::Retrieval;
use vault_rag::watcher::initial_scan;

fn main() -> Result<()> {
    // Initialize tracing with VAULT_RAG_LOG env var (e.g., VAULT_RAG_LOG=debug vault-rag watch)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VAULT_RAG_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let use_color = output::use_colors();
    let load_config = || -> Result<Config> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(vault) = &cli.vault {
            config.vault_path = Some(vault.clone());
        }
        if let Some(index_dir) = &cli.index_dir {
            config.index_dir = Some(index_dir.clone());
        }
        Ok(config)
    };

    match &cli.command {
        Commands::Index { force } => {
            let mut config = load_config()?;
            if *force {
                config.index.skip_unchanged = Some(false);
            }
            let workers = config.watch.workers();
            let app = App::build(config)?;
            let files = app.scanner().list_notes();
            let summary = initial_scan(&app.pipeline(), &files, workers, &progress_bar())?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Text => println!("{}", output::render_summary(&summary, use_color)),
            }
        }
        Commands::Watch {
            debounce_ms,
            workers,
        } => {
            let mut config = load_config()?;
            if debounce_ms.is_some() {
                config.watch.debounce_ms = *debounce_ms;
            }
            if workers.is_some() {
                config.watch.workers = *workers;
            }
            let app = App::build(config)?;
            let watcher = app.watcher().with_progress(progress_bar());

            eprintln!(
                "{} Watching {} for changes...",
                "👁".cyan(),
                app.vault().display()
            );
            eprintln!("Press Ctrl+C to stop\n");

            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            let summary = runtime.block_on(watcher.run(async {
                let _ = tokio::signal::ctrl_c().await;
            }))?;
            eprintln!("{}", output::render_summary(&summary.initial, use_color));
            eprintln!(
                "{} {} changes re-indexed, {} failed",
                "✓".green(),
                summary.live.indexed,
                summary.live.failed
            );
        }
        Commands::Query { query, top_k } => {
            let config = load_config()?;
            let k = top_k.unwrap_or_else(|| config.retrieval.top_k());
            let app = App::build(config)?;
            let result = app.retrieval().search(query, k)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Text if result.is_blank() => println!("{}", NO_MATCH_ANSWER),
                OutputFormat::Text => print!("{}", output::render_hits(&result, use_color)),
            }
        }
        Commands::Context { query, top_k } => {
            let config = load_config()?;
            let k = top_k.unwrap_or_else(|| config.retrieval.top_k());
            let app = App::build(config)?;
            match app.retrieval().retrieve(query, k)? {
                Retrieval::NoRelevantContent => match format {
                    OutputFormat::Json => println!("{}", serde_json::json!({ "answer": NO_MATCH_ANSWER })),
                    OutputFormat::Text => println!("{}", NO_MATCH_ANSWER),
                },
                Retrieval::Context(bundle) => {
                    let request = CompletionRequest::from_bundle(&bundle);
                    match format {
                        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&request)?),
                        OutputFormat::Text => print!("{}", request.system_prompt),
                    }
                }
            }
        }
        Commands::Status => {
            let app = App::build(load_config()?)?;
            let status = app.status()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Text => println!("{}", output::render_status(&status, use_color)),
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "vault-rag", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{bar:40.cyan/blue}] {pos}/{len} notes | Indexing {msg}")
    {
        pb.set_style(style.progress_chars("##."));
    }
    pb
}
