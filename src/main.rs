use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use goalpath::config::{EmbeddingProvider, Settings};
use goalpath::corpus::{Chunker, SourceCategory, corpus_fingerprint, load_corpus};
use goalpath::embedding::{Embedder, FastEmbedder, HashedEmbedder};
use goalpath::index::{BuildProgress, KnowledgeStore, StoreError, VectorDimension};
use goalpath::retrieval::{ContextBundle, Retriever};

#[derive(Parser)]
#[command(name = "goalpath")]
#[command(about = "Retrieval engine for drafting IEP transition goals", version)]
struct Cli {
    /// Path to a settings file (defaults to .goalpath/settings.toml)
    #[arg(long, global = true, env = "GOALPATH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default settings.toml
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Build the knowledge index from the corpus files
    Build {
        /// Disable progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Retrieve a context bundle for a student's stated interest
    Retrieve {
        /// Student interest text, e.g. "retail sales"
        interest: String,

        /// Print the bundle as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { force } => run_init(force),
        Commands::Build { no_progress } => {
            let settings = setup(cli.config.as_deref())?;
            run_build(&settings, !no_progress)
        }
        Commands::Retrieve { interest, json } => {
            let settings = setup(cli.config.as_deref())?;
            run_retrieve(&settings, &interest, json)
        }
        Commands::Stats { json } => {
            let settings = setup(cli.config.as_deref())?;
            run_stats(&settings, json)
        }
    }
}

fn setup(config: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    goalpath::logging::init_with_config(&settings.logging);
    Ok(settings)
}

fn run_init(force: bool) -> anyhow::Result<()> {
    let path = Settings::init_config_file(force)?;
    println!("Created {}", path.display());
    println!("\nNext steps:");
    println!("  1. Put corpus JSONL files under corpus/ (one per category)");
    println!("  2. Run: goalpath build");
    println!("  3. Run: goalpath retrieve \"retail sales\"");
    Ok(())
}

fn run_build(settings: &Settings, progress: bool) -> anyhow::Result<()> {
    let documents = load_corpus(&settings.corpus).context("failed to load corpus")?;
    let fingerprint = corpus_fingerprint(&settings.corpus)?;
    let chunker = Chunker::new(settings.chunking.clone());
    let embedder = create_embedder(settings)?;

    let mut chunk_bar: Option<ProgressBar> = None;
    let mut embed_bar: Option<ProgressBar> = None;

    let (store, stats) = KnowledgeStore::build(
        &settings.index_path,
        &documents,
        &chunker,
        embedder.as_ref(),
        &model_name(settings),
        fingerprint,
        |update| {
            if !progress {
                return;
            }
            match update {
                BuildProgress::ChunkingDocument { current, total, .. } => {
                    let bar =
                        chunk_bar.get_or_insert_with(|| styled_bar(total as u64, "chunking"));
                    bar.set_position(current as u64);
                }
                BuildProgress::EmbeddingChunks { current, total } => {
                    if let Some(bar) = chunk_bar.take() {
                        bar.finish_and_clear();
                    }
                    let bar =
                        embed_bar.get_or_insert_with(|| styled_bar(total as u64, "embedding"));
                    bar.set_position(current as u64);
                }
            }
        },
    )?;

    if let Some(bar) = embed_bar.take() {
        bar.finish_and_clear();
    }

    println!(
        "Indexed {} documents into {} chunks at {}",
        stats.documents,
        stats.chunks,
        store.base_path().display()
    );
    if stats.chunks == 0 {
        println!("The corpus is empty; retrieval will fail until documents are indexed");
    }
    if stats.chunks_skipped > 0 {
        println!(
            "Skipped {} chunks the embedder rejected (see warnings above)",
            stats.chunks_skipped
        );
    }
    Ok(())
}

fn run_retrieve(settings: &Settings, interest: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let embedder = create_embedder(settings)?;
    let retriever = Retriever::new(&store, embedder.as_ref(), settings.retrieval);

    let bundle = retriever.retrieve(interest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
    } else {
        print_bundle(&bundle);
    }
    Ok(())
}

fn run_stats(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Index: {}", store.base_path().display());
        println!("  Chunks: {}", stats.chunk_count);
        println!("    occupation: {}", stats.occupation_chunks);
        println!("    standard:   {}", stats.standard_chunks);
        println!("    example:    {}", stats.example_chunks);
        println!("  Dimension: {}", stats.dimension);
        println!("  Model: {}", stats.model);
    }
    Ok(())
}

fn open_store(settings: &Settings) -> anyhow::Result<KnowledgeStore> {
    match KnowledgeStore::open(&settings.index_path) {
        Ok(store) => Ok(store),
        Err(StoreError::Missing(path)) => {
            bail!("no index found at {path}; run `goalpath build` first")
        }
        Err(StoreError::MetadataMismatch(detail)) => {
            bail!("index is inconsistent ({detail}); run `goalpath build` to rebuild")
        }
        Err(err) => Err(err).context("failed to open index"),
    }
}

fn create_embedder(settings: &Settings) -> anyhow::Result<Box<dyn Embedder>> {
    match settings.embedding.provider {
        EmbeddingProvider::Hashed => {
            Ok(Box::new(HashedEmbedder::new(VectorDimension::dim_384())))
        }
        EmbeddingProvider::Fastembed => {
            let model = match settings.embedding.model.as_str() {
                "AllMiniLML6V2" => fastembed::EmbeddingModel::AllMiniLML6V2,
                "AllMiniLML12V2" => fastembed::EmbeddingModel::AllMiniLML12V2,
                "BGESmallENV15" => fastembed::EmbeddingModel::BGESmallENV15,
                other => bail!(
                    "unknown embedding model '{other}' (supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15)"
                ),
            };
            let embedder =
                FastEmbedder::with_model(model).context("failed to load embedding model")?;
            Ok(Box::new(embedder))
        }
    }
}

fn model_name(settings: &Settings) -> String {
    match settings.embedding.provider {
        EmbeddingProvider::Hashed => "hashed-384".to_string(),
        EmbeddingProvider::Fastembed => settings.embedding.model.clone(),
    }
}

fn styled_bar(len: u64, phase: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{msg:>10} [{bar:28}] {pos}/{len}")
            .expect("progress template is valid")
            .progress_chars("=> "),
    );
    bar.set_message(phase.to_string());
    bar
}

fn print_bundle(bundle: &ContextBundle) {
    for category in SourceCategory::ALL {
        let heading = match category {
            SourceCategory::Occupation => "Career information",
            SourceCategory::Standard => "Relevant standards",
            SourceCategory::Example => "Example goals",
        };
        println!("=== {heading} ===");

        let list = bundle.list(category);
        if list.is_empty() {
            println!("  (no {category} context retrieved)");
        } else {
            for chunk in list {
                println!(
                    "  [{:.3}] {} ({})",
                    chunk.score,
                    chunk.meta.label(),
                    chunk.doc_id
                );
                println!("      {}", preview(&chunk.text, 240));
            }
        }
        println!();
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out.replace('\n', " ")
}
