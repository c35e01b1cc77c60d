use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use unionx::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ChannelKind {
    Set,
    Ontology,
    Embedding,
}

/// Find tables unionable with a query table
#[derive(Parser, Debug)]
#[command(name = "unionx")]
#[command(about = "Table union search over LSH forests", long_about = None)]
struct Args {
    /// Directory holding `{table}/{column}.{ext}` sketch files
    #[arg(short, long, default_value = "./domains")]
    domain_dir: PathBuf,

    /// Table id of the query table, relative to the domain directory
    #[arg(short, long)]
    query_table: String,

    /// Columns to align per candidate table
    #[arg(short, default_value_t = 3)]
    k: usize,

    /// Number of tables to return
    #[arg(short, default_value_t = 10)]
    n: usize,

    /// Similarity channels to search
    #[arg(long, value_enum, value_delimiter = ',', default_value = "set")]
    channels: Vec<ChannelKind>,

    /// Hash functions per signature
    #[arg(long, default_value_t = 256)]
    num_hash: usize,

    /// Similarity threshold the forests are tuned for
    #[arg(long, default_value_t = 0.5)]
    threshold: f64,

    /// Seed for the embedding index hyperplanes
    #[arg(long, default_value_t = 1)]
    hyperplane_seed: u64,

    /// Pairs per alignment batch
    #[arg(long, default_value_t = 2000)]
    batch_size: usize,

    /// Scoring workers per channel
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Shortest probe prefix in hash values
    #[arg(long, default_value_t = 0)]
    min_prefix: usize,

    /// Only return tables with all k columns aligned
    #[arg(long)]
    complete_only: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn set_channel(
    store: &SketchStore,
    source: &Arc<dyn SketchSource>,
    config: ForestConfig,
    query_table: &str,
    kind: ChannelKind,
) -> anyhow::Result<Arc<dyn SimilarityChannel>> {
    let sketch = if kind == ChannelKind::Ontology { ext::ONT_MINHASH } else { ext::MINHASH };
    let mut queries = Vec::new();
    let mut cardinalities = Vec::new();
    let mut columns = Vec::new();
    for (key, path) in store.table_columns(query_table, sketch)? {
        let read = store
            .read_minhash(&path)
            .and_then(|sig| store.cardinality(&key).map(|card| (sig, card)));
        match read {
            Ok((sig, card)) => {
                queries.push(sig);
                cardinalities.push(card);
                columns.push(key.column_index);
            }
            Err(e) if e.is_recoverable() => warn!("skipping query column {}: {}", key, e),
            Err(e) => return Err(e.into()),
        }
    }
    if queries.is_empty() {
        bail!("query table {} has no usable {} sketches", query_table, sketch);
    }

    let keys = store.scan(sketch)?.into_iter().map(|(key, _)| key);
    let (index, stats) = JaccardUnionIndex::build(config, source.clone(), sketch, keys)?;
    info!("{} index: {} columns, {} skipped", sketch, stats.indexed, stats.skipped);

    let index = Arc::new(index);
    let channel = match kind {
        ChannelKind::Ontology => SetChannel::ontology(index, queries, cardinalities)?,
        _ => SetChannel::new(index, queries, cardinalities)?,
    };
    Ok(Arc::new(channel.with_query_columns(columns)?))
}

fn embedding_channel(
    store: &SketchStore,
    source: &Arc<dyn SketchSource>,
    config: ForestConfig,
    query_table: &str,
    seed: u64,
) -> anyhow::Result<Arc<dyn SimilarityChannel>> {
    let mut queries = Vec::new();
    let mut columns = Vec::new();
    for (key, _) in store.table_columns(query_table, ext::FT_MEAN)? {
        match EmbeddingQuery::load(store, &key) {
            Ok(query) => {
                queries.push(query);
                columns.push(key.column_index);
            }
            Err(e) if e.is_recoverable() => warn!("skipping query column {}: {}", key, e),
            Err(e) => return Err(e.into()),
        }
    }
    let dim = match queries.first() {
        Some(query) => query.mean.len(),
        None => bail!("query table {} has no usable {} vectors", query_table, ext::FT_MEAN),
    };

    let keys = store.scan(ext::FT_MEAN)?.into_iter().map(|(key, _)| key);
    let (index, stats) = EmbeddingUnionIndex::build(config, dim, seed, source.clone(), ext::FT_MEAN, keys)?;
    info!("embedding index: {} columns, {} skipped", stats.indexed, stats.skipped);

    let channel = EmbeddingChannel::new(Arc::new(index), queries).with_query_columns(columns)?;
    Ok(Arc::new(channel))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting unionX v{}", env!("CARGO_PKG_VERSION"));
    info!("Domain directory: {:?}", args.domain_dir);
    info!("Query table: {}", args.query_table);

    let store = SketchStore::new(&args.domain_dir);
    let source: Arc<dyn SketchSource> = Arc::new(store.clone());
    let forest_config = ForestConfig {
        num_hash: args.num_hash,
        threshold: args.threshold,
        ..ForestConfig::default()
    };

    let mut channels = Vec::new();
    for kind in &args.channels {
        let channel = match kind {
            ChannelKind::Set | ChannelKind::Ontology => {
                set_channel(&store, &source, forest_config, &args.query_table, *kind)
            }
            ChannelKind::Embedding => {
                embedding_channel(&store, &source, forest_config, &args.query_table, args.hyperplane_seed)
            }
        }
        .with_context(|| format!("building {:?} channel", kind))?;
        channels.push(channel);
    }

    let search = UnionSearch::new(SearchConfig {
        batch_size: args.batch_size,
        scoring_workers: args.workers,
        min_prefix: args.min_prefix,
        exclude_table: Some(args.query_table.clone()),
        emit_partial: !args.complete_only,
        ..SearchConfig::new(args.k, args.n)
    })?;

    let results = tokio::select! {
        results = search.search(channels) => results?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            return Ok(());
        }
    };

    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }
    info!("Found {} unionable tables", results.len());
    Ok(())
}
