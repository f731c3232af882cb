//! hygrep CLI.
//!
//! Command-line interface for the hybrid lexical/semantic code search
//! engine. Wires `clap` argument parsing to `hygrep-core`'s
//! `Engine`/`Reranker` types; owns terminal rendering, color handling,
//! and the embedder's model acquisition (download/cache), all of which
//! are explicitly out of the core crate.

mod model_manager;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hygrep_core::pipeline::{Engine, QueryOptions};
use hygrep_core::reranker::QueryFilters;
use hygrep_core::types::BlockKind;

/// hygrep -- hybrid lexical + semantic code search.
#[derive(Parser, Debug)]
#[command(name = "hygrep", version, about = "Hybrid lexical/semantic code search")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Search query (natural language or regex). Required unless a subcommand is given.
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Corpus root to search.
    #[arg(value_name = "PATH", default_value = ".")]
    path: PathBuf,

    /// Maximum number of results.
    #[arg(short = 'n', long, default_value_t = 10)]
    top_k: usize,

    /// Emit results as a JSON array.
    #[arg(long)]
    json: bool,

    /// Omit block content from output.
    #[arg(long)]
    compact: bool,

    /// Restrict to these file extensions (comma-separated, e.g. `py,rs`).
    #[arg(short = 't', long, value_delimiter = ',')]
    r#type: Vec<String>,

    /// Exclude paths matching this glob (repeatable).
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Print only matching file paths, one per line.
    #[arg(short = 'l', long = "files-only")]
    files_only: bool,

    /// Skip the persisted index; scan and embed ephemerally.
    #[arg(long)]
    fast: bool,

    /// Suppress warnings (unreadable files, stale index, etc.).
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Drop results scoring below this threshold before top-k truncation.
    #[arg(long)]
    threshold: Option<f64>,

    /// Color terminal output.
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ColorMode {
    Always,
    Never,
    Auto,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build (or force-rebuild) the persistent index.
    Build {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Discard the existing index and rebuild from scratch.
        #[arg(long)]
        force: bool,
    },
    /// Report index staleness and size.
    Status {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// List every file tracked by the index.
    List {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Delete the persisted index.
    Clean {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Also remove indexes in nested corpora.
        #[arg(short = 'r', long)]
        recursive: bool,
    },
    /// Inspect or fetch the embedder's model artifacts.
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Print embedder and scanner build info.
    Info,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ModelAction {
    /// Report whether the default model is installed.
    Status,
    /// Download the default model into the local cache.
    Install,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match &cli.command {
        Some(Commands::Build { path, force }) => run_build(path, *force),
        Some(Commands::Status { path }) => run_status(path),
        Some(Commands::List { path }) => run_list(path),
        Some(Commands::Clean { path, recursive }) => run_clean(path, *recursive),
        Some(Commands::Model { action }) => run_model(*action),
        Some(Commands::Info) => run_info(),
        None => match cli.query.clone().context("a QUERY is required unless a subcommand is given") {
            Ok(query) => run_query(&cli, &query),
            Err(e) => Err(e),
        },
    };

    // Grep-compatible exit codes: 0 match, 1 no match, 2 error (spec.md §6).
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("hygrep: error: {err:?}");
            ExitCode::from(2)
        }
    }
}

fn run_build(path: &PathBuf, force: bool) -> Result<ExitCode> {
    let engine = Engine::for_root(path).context("loading configuration")?;
    let report = engine.build(force).context("building index")?;
    println!(
        "indexed {} files ({} reused, {} embedded blocks, {} blocks total, {} parse errors)",
        report.files_total,
        report.files_reused,
        report.blocks_embedded,
        report.blocks_total,
        report.parse_errors
    );
    Ok(ExitCode::SUCCESS)
}

fn run_status(path: &PathBuf) -> Result<ExitCode> {
    let engine = Engine::for_root(path).context("loading configuration")?;
    let status = engine.status().context("reading index status")?;
    if !status.exists {
        println!("no index at {}", engine.config().index_dir().display());
        return Ok(ExitCode::from(1));
    }
    println!(
        "model_version={} files={} blocks={} stale={}",
        status.model_version.as_deref().unwrap_or("?"),
        status.file_count,
        status.block_count,
        status.stale_files.len()
    );
    for file in &status.stale_files {
        println!("  stale: {file}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_list(path: &PathBuf) -> Result<ExitCode> {
    let engine = Engine::for_root(path).context("loading configuration")?;
    let files = engine.list_indexed_files().context("listing indexed files")?;
    for file in &files {
        println!("{file}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_clean(path: &PathBuf, recursive: bool) -> Result<ExitCode> {
    let engine = Engine::for_root(path).context("loading configuration")?;
    engine.clean().context("removing index")?;
    if recursive {
        for entry in walkdir_nested_hhg(path) {
            let _ = std::fs::remove_dir_all(&entry);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn walkdir_nested_hhg(root: &std::path::Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let walker = ignore::WalkBuilder::new(root).build();
    for entry in walker.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) && entry.file_name() == ".hhg" {
            found.push(entry.path().to_path_buf());
        }
    }
    found
}

fn run_model(action: ModelAction) -> Result<ExitCode> {
    let spec = &model_manager::DEFAULT_MODEL;
    match action {
        ModelAction::Status => {
            if model_manager::is_installed(spec) {
                println!("{} installed at {}", spec.name, model_manager::cache_dir(spec).display());
            } else {
                println!("{} not installed", spec.name);
                return Ok(ExitCode::from(1));
            }
        }
        ModelAction::Install => {
            let (model_path, tokenizer_path) = model_manager::ensure_model(spec)?;
            println!("model: {}", model_path.display());
            println!("tokenizer: {}", tokenizer_path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_info() -> Result<ExitCode> {
    let spec = &model_manager::DEFAULT_MODEL;
    println!("embedder: {} ({} dims, max_length {})", spec.name, spec.dimensions, spec.max_length);
    println!("threads: {}", rayon_threads());
    Ok(ExitCode::SUCCESS)
}

fn rayon_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn run_query(cli: &Cli, query: &str) -> Result<ExitCode> {
    let engine = Engine::for_root(&cli.path).context("loading configuration")?;

    let extensions = if cli.r#type.is_empty() {
        None
    } else {
        Some(cli.r#type.clone())
    };

    let filters = QueryFilters {
        exclude_globs: cli.exclude.clone(),
        extensions,
        kinds: None::<Vec<BlockKind>>,
    };

    let options = QueryOptions {
        top_k: cli.top_k,
        filters,
        compact: cli.compact || cli.files_only,
        fast: cli.fast,
    };

    let mut results = engine.query(query, &options).context("running query")?;

    if let Some(threshold) = cli.threshold {
        results.retain(|r| r.score >= threshold);
        results.truncate(cli.top_k);
    }

    let use_color = match cli.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::IsTerminal::is_terminal(&std::io::stdout()),
    };

    if cli.files_only {
        output::print_files_only(&results);
    } else if cli.json {
        output::print_json(&results)?;
    } else {
        output::print_plain(&results, use_color);
    }

    Ok(if results.is_empty() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
