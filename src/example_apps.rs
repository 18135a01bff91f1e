use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, error::ErrorKind};
use serde::Deserialize;

use crate::config::{PipelineConfig, default_store_path, default_store_path_in_dir};
use crate::coordinator::{CacheCoordinator, Rehydration, RehydrationOrigin, WriteBack};
use crate::data::ArticleInput;
use crate::gateway::LexiconGateway;
use crate::metrics::symbol_sentiment;
use crate::store::{DeepCacheStore, MemoryDeepCache, SqliteDeepCache};
use crate::types::Symbol;

#[derive(Debug, Parser)]
#[command(
    name = "deep_cache_demo",
    disable_help_subcommand = true,
    about = "Compute or rehydrate article sentiment roll-ups",
    long_about = "Run articles through the cache coordinator with the built-in lexicon gateway. The first run computes and stores each record; later runs rehydrate them with zero gateway calls.",
    after_help = "Articles are read from --articles (a JSON array of {symbol, url, paragraphs}) or a built-in sample set."
)]
/// CLI for `deep_cache_demo`.
///
/// Common usage:
/// - Keep default store location: `.sentiment_cache/deep_cache.sqlite3`
/// - Set an explicit file path: `--store-path /tmp/deep_cache.sqlite3`
/// - Set a custom directory and keep default filename: `--store-dir /tmp/cache`
/// - Skip persistence entirely: `--memory`
struct DeepCacheDemoCli {
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON file holding an array of {symbol, url, paragraphs}"
    )]
    articles: Option<PathBuf>,
    #[arg(long, help = "Store-key namespace (defaults to 0001)")]
    namespace: Option<String>,
    #[arg(
        long = "max-segment-chars",
        value_parser = parse_positive_usize,
        help = "Per-segment length budget in chars"
    )]
    max_segment_chars: Option<usize>,
    #[arg(
        long,
        value_parser = parse_positive_usize,
        help = "Worker threads (defaults to available parallelism)"
    )]
    workers: Option<usize>,
    #[arg(
        long = "gateway-slots",
        value_parser = parse_positive_usize,
        help = "Concurrent classify calls admitted"
    )]
    gateway_slots: Option<usize>,
    #[arg(
        long = "store-path",
        value_name = "STORE_PATH",
        help = "Optional path for the deep cache file"
    )]
    store_path: Option<PathBuf>,
    #[arg(
        long = "store-dir",
        value_name = "DIR",
        conflicts_with = "store_path",
        help = "Optional directory for the deep cache file (uses deep_cache.sqlite3 filename)"
    )]
    store_dir: Option<PathBuf>,
    #[arg(
        long,
        conflicts_with_all = ["store_path", "store_dir"],
        help = "Keep records in memory only"
    )]
    memory: bool,
}

/// Article entry in a `--articles` JSON file.
#[derive(Debug, Deserialize)]
struct DemoArticle {
    symbol: Symbol,
    url: String,
    #[serde(default)]
    paragraphs: Vec<String>,
}

impl From<DemoArticle> for ArticleInput {
    fn from(article: DemoArticle) -> Self {
        ArticleInput::from_url(article.symbol, &article.url, article.paragraphs)
    }
}

/// Run the deep cache demo with CLI-style arguments (program name excluded).
pub fn run_deep_cache_demo<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<DeepCacheDemoCli, _>(
        std::iter::once("deep_cache_demo".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mut config = PipelineConfig::default();
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    config.max_segment_chars = cli.max_segment_chars.unwrap_or(config.max_segment_chars);
    config.workers = cli.workers.unwrap_or(config.workers);
    config.gateway_slots = cli.gateway_slots.unwrap_or(config.gateway_slots);

    let articles = match &cli.articles {
        Some(path) => load_articles(path)?,
        None => sample_articles(),
    };

    let store: Arc<dyn DeepCacheStore> = if cli.memory {
        println!("Keeping deep cache records in memory only");
        Arc::new(MemoryDeepCache::new())
    } else {
        let store_path = if let Some(path) = cli.store_path {
            path
        } else if let Some(dir) = cli.store_dir {
            default_store_path_in_dir(dir)
        } else {
            default_store_path()
        };
        println!("Persisting deep cache records to {}", store_path.display());
        Arc::new(SqliteDeepCache::new(store_path, config.store.clone()))
    };

    let coordinator = CacheCoordinator::new(config, store, Arc::new(LexiconGateway::default()))?;
    let outcomes = coordinator.rehydrate_many(&articles);

    let mut records = Vec::with_capacity(outcomes.len());
    for (article, outcome) in articles.iter().zip(outcomes) {
        match outcome {
            Ok(rehydration) => {
                print_rehydration(article, &rehydration);
                records.push(rehydration.record);
            }
            Err(err) => eprintln!("{} ({}): {err}", article.symbol, article.article_id),
        }
    }

    if !records.is_empty() {
        println!();
        println!("=== symbol roll-up ===");
        for rollup in symbol_sentiment(&records) {
            println!(
                "{:<8} articles={} chunks={} +{} ={} -{} net={:+.3}",
                rollup.symbol,
                rollup.articles,
                rollup.chunk_count,
                rollup.positive_count,
                rollup.neutral_count,
                rollup.negative_count,
                rollup.net_score
            );
        }
    }

    let stats = coordinator.stats();
    println!();
    println!(
        "hits={} misses={} corrupt={} unavailable={} computed={} write_back_failures={} gateway_calls={}",
        stats.hits,
        stats.misses,
        stats.corrupt,
        stats.unavailable,
        stats.computed,
        stats.write_back_failures,
        coordinator.gateway().calls()
    );
    Ok(())
}

fn load_articles(path: &Path) -> Result<Vec<ArticleInput>, Box<dyn Error>> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read articles from {}: {err}", path.display()))?;
    let parsed: Vec<DemoArticle> = serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse articles from {}: {err}", path.display()))?;
    Ok(parsed.into_iter().map(Into::into).collect())
}

fn sample_articles() -> Vec<ArticleInput> {
    vec![
        ArticleInput::from_url(
            "AAPL",
            "https://news.example.com/markets/apple-services-record",
            [
                "Apple reported record services revenue, and shares rose 3.5% after the call.",
                "Analysts upgraded the stock, citing strong growth in wearables.",
                "Supply constraints in China remain a warning sign for the holiday quarter.",
            ],
        ),
        ArticleInput::from_url(
            "TSLA",
            "https://news.example.com/autos/tesla-recall",
            [
                "Tesla shares fell after regulators announced a recall of 120,000 vehicles.",
                "The company said the fix ships as an over-the-air update.",
            ],
        ),
        ArticleInput::from_url(
            "BRK.B",
            "https://news.example.com/markets/berkshire-cash-pile",
            ["Berkshire's cash pile grew again as buybacks slowed."],
        ),
        ArticleInput::from_url("MSFT", "https://news.example.com/briefs/empty", Vec::<String>::new()),
    ]
}

fn print_rehydration(article: &ArticleInput, rehydration: &Rehydration) {
    let origin = match rehydration.origin {
        RehydrationOrigin::Rehydrated => "rehydrated",
        RehydrationOrigin::Computed {
            write_back: WriteBack::Stored,
        } => "computed+stored",
        RehydrationOrigin::Computed {
            write_back: WriteBack::Failed,
        } => "computed (write-back failed)",
        RehydrationOrigin::Computed {
            write_back: WriteBack::Skipped,
        } => "computed (store unavailable)",
    };
    let record = &rehydration.record;
    println!(
        "{:<8} {} [{origin}] chunks={} +{} ={} -{} tokens={} shapes=s{}/p{}/r{}{}{}",
        article.symbol,
        record.article_id,
        record.chunk_count,
        record.positive_count,
        record.neutral_count,
        record.negative_count,
        record.total_tokens,
        record.sentence_count,
        record.paragraph_count,
        record.random_count,
        if record.no_content { " no-content" } else { "" },
        if record.incomplete { " incomplete" } else { "" },
    );
    for segment in record.ordered_segments() {
        println!(
            "    #{:<3} {:?} {:.3} {:?} keywords={}",
            segment.ordinal,
            segment.sentiment_label,
            segment.sentiment_score,
            segment.shape,
            segment.keywords.join(",")
        );
    }
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
