use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use coalesce_core::{
    MatcherConfig, ResolutionFilter, ResolutionService, RunMode, Store,
};

#[derive(Parser)]
#[command(
    name = "coalesce",
    about = "Entity resolution over an ingested document database",
    version
)]
struct Cli {
    /// Path to the SQLite database holding ingested mentions and
    /// relationships
    #[arg(long, global = true, default_value = "coalesce.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a resolution pass and print its stats
    Resolve {
        /// Narrow the run to these document ids
        #[arg(long = "doc")]
        docs: Vec<String>,
        /// Re-resolve the whole corpus, ignoring any narrowing
        #[arg(long)]
        full: bool,
        /// Matching strategy
        #[arg(long, value_enum, default_value_t = Strategy::Exact)]
        strategy: Strategy,
        /// Similarity threshold for the fuzzy strategy
        #[arg(long, default_value_t = 0.93)]
        threshold: f64,
    },
    /// List canonical entities
    Entities,
    /// Show provenance rows for a canonical relationship
    Provenance {
        /// The resolved relationship id (rel::…)
        resolved_rel_id: String,
    },
    /// Dump the resolved graph as JSON
    Snapshot {
        /// Limit to edges evidenced in these document ids
        #[arg(long = "doc")]
        docs: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Exact,
    Fuzzy,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Store::open(&cli.db).await?;

    match cli.command {
        Commands::Resolve {
            docs,
            full,
            strategy,
            threshold,
        } => run_resolve(&store, docs, full, strategy, threshold).await,
        Commands::Entities => run_entities(&store).await,
        Commands::Provenance { resolved_rel_id } => run_provenance(&store, &resolved_rel_id).await,
        Commands::Snapshot { docs } => run_snapshot(&store, docs).await,
    }
}

async fn run_resolve(
    store: &Store,
    docs: Vec<String>,
    full: bool,
    strategy: Strategy,
    threshold: f64,
) -> Result<()> {
    let filter = if docs.is_empty() {
        ResolutionFilter::default()
    } else {
        ResolutionFilter::for_documents(docs)
    };
    let mode = if full { RunMode::Full } else { RunMode::Incremental };
    let config = match strategy {
        Strategy::Exact => MatcherConfig::Exact,
        Strategy::Fuzzy => MatcherConfig::Fuzzy { threshold },
    };

    let stats = ResolutionService::new(store)
        .with_matcher(config.build())
        .resolve(&filter, mode)
        .await?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_entities(store: &Store) -> Result<()> {
    for entity in store.list_resolved_entities().await? {
        println!(
            "{}  {}  [{}]  mentions={} docs={}",
            entity.resolved_id,
            entity.primary_name,
            entity.entity_type,
            entity.mention_count,
            entity.doc_count
        );
    }
    Ok(())
}

async fn run_provenance(store: &Store, resolved_rel_id: &str) -> Result<()> {
    let rel = store.get_resolved_relationship(resolved_rel_id).await?;
    println!(
        "{} {} {}  weight={} docs={}",
        rel.subject_resolved_id, rel.predicate, rel.object_resolved_id, rel.weight, rel.doc_count
    );
    for row in store.provenance_for(resolved_rel_id).await? {
        println!(
            "  {}  doc={} chunk={} page={}",
            row.relationship_id,
            row.document_id,
            row.chunk_id.map_or_else(|| "-".into(), |c| c.to_string()),
            row.page.map_or_else(|| "-".into(), |p| p.to_string())
        );
    }
    Ok(())
}

async fn run_snapshot(store: &Store, docs: Vec<String>) -> Result<()> {
    let filter = if docs.is_empty() { None } else { Some(docs.as_slice()) };
    let snapshot = store.graph_snapshot(filter).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
