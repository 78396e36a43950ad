//! Graphrag CLI - knowledge graph retrieval for LLM prompts

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use graphrag_core::config::{Config, EmbeddingOverrides};
use graphrag_core::domain::graph::{EntityType, FilterLogic, GraphStore, SearchFilters};
use graphrag_core::embedding::{EmbeddingService, ProviderKind};
use graphrag_core::indexing::EmbeddingIndexer;
use graphrag_core::pipeline::KnowledgeGraphRag;
use graphrag_core::search::SearchResult;
use graphrag_core::storage::{Database, SqliteGraphStore};
use graphrag_core::vector::{Collection, HttpVectorIndex};
use tracing::info;

#[derive(Parser)]
#[command(name = "graphrag")]
#[command(author, version, about = "Knowledge graph retrieval for LLM prompts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database with the graph objects
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Vector index base URL
    #[arg(long, global = true)]
    index_url: Option<String>,

    /// Embedding provider
    #[arg(long, global = true, value_enum)]
    provider: Option<ProviderArg>,

    /// Embedding model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Embedding endpoint URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Cloud embedding API key (defaults to OPENAI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum ProviderArg {
    #[value(name = "openai")]
    OpenAi,
    Local,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::OpenAi => ProviderKind::OpenAi,
            ProviderArg::Local => ProviderKind::Local,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CollectionArg {
    Entities,
    Relations,
    Topics,
}

impl From<CollectionArg> for Collection {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Entities => Collection::Entities,
            CollectionArg::Relations => Collection::Relations,
            CollectionArg::Topics => Collection::Topics,
        }
    }
}

#[derive(clap::Args, Default)]
struct FilterArgs {
    /// Organization scope
    #[arg(long)]
    org: Option<String>,
    #[arg(long)]
    entity_type: Option<String>,
    #[arg(long)]
    relation_type: Option<String>,
    /// Topic semantic category
    #[arg(long)]
    category: Option<String>,
    /// RFC 3339 timestamp or YYYY-MM-DD
    #[arg(long)]
    created_after: Option<String>,
    #[arg(long)]
    created_before: Option<String>,
    #[arg(long)]
    updated_after: Option<String>,
    #[arg(long)]
    updated_before: Option<String>,
    /// How date bounds combine (and, or)
    #[arg(long)]
    logic: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search entities, relations and topics
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Build an LLM context block for a query
    Context {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        max_tokens: Option<usize>,
        #[arg(long)]
        org: Option<String>,
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Embed stored graph objects into the vector index
    Index {
        collection: CollectionArg,
        #[arg(long)]
        org: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show every key with its current value
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("graphrag=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Search {
            query,
            limit,
            filters,
            format,
        } => {
            let filters = filters.to_filters()?;
            let limit = limit.unwrap_or(config.search.default_limit);
            cmd_search(&cli, &config, query, limit, &filters, *format).await
        }

        Commands::Context {
            query,
            limit,
            max_tokens,
            org,
            format,
        } => {
            let filters = SearchFilters {
                organization_id: org.clone(),
                ..Default::default()
            };
            let limit = limit.unwrap_or(config.search.default_limit);
            let max_tokens = max_tokens.unwrap_or(config.search.max_context_tokens);
            cmd_context(&cli, &config, query, limit, &filters, max_tokens, *format).await
        }

        Commands::Index { collection, org } => {
            cmd_index(&cli, &config, (*collection).into(), org).await
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Stored configuration with the global flags applied
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    if let Some(url) = &cli.index_url {
        config.vector_index.url = url.clone();
    }
    if let Some(db) = &cli.db {
        config.database.path = Some(db.clone());
    }
    Ok(config)
}

fn overrides(cli: &Cli) -> EmbeddingOverrides {
    EmbeddingOverrides {
        provider: cli.provider.map(ProviderKind::from),
        model: cli.model.clone(),
        api_url: cli.api_url.clone(),
        api_key: cli.api_key.clone(),
    }
}

/// Embedding service and graph store shared by every command
async fn open_parts(cli: &Cli, config: &Config) -> anyhow::Result<(EmbeddingService, Arc<dyn GraphStore>)> {
    let resolved = config
        .embedding
        .resolve(&overrides(cli), |key| std::env::var(key).ok())?;
    let embeddings = EmbeddingService::from_config(&resolved)?;

    let db_path = config.database_path()?;
    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("Failed to open graph database at {}", db_path.display()))?;
    let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(db.pool().clone()));
    Ok((embeddings, store))
}

fn vector_index(config: &Config) -> anyhow::Result<HttpVectorIndex> {
    Ok(HttpVectorIndex::builder()
        .base_url(&config.vector_index.url)
        .timeout(Duration::from_secs(config.vector_index.timeout_secs))
        .build()?)
}

async fn open_rag(cli: &Cli, config: &Config) -> anyhow::Result<KnowledgeGraphRag> {
    let (embeddings, store) = open_parts(cli, config).await?;
    let index = Arc::new(vector_index(config)?);
    Ok(KnowledgeGraphRag::from_parts(config, embeddings, index, store)?)
}

impl FilterArgs {
    fn to_filters(&self) -> anyhow::Result<SearchFilters> {
        let filter_logic = match &self.logic {
            Some(value) => FilterLogic::parse(value)
                .ok_or_else(|| anyhow!("Unknown filter logic '{value}'. Expected 'and' or 'or'."))?,
            None => FilterLogic::default(),
        };
        Ok(SearchFilters {
            organization_id: self.org.clone(),
            entity_type: self.entity_type.as_deref().map(EntityType::parse),
            relation_type: self.relation_type.clone(),
            topic_semantic_category: self.category.clone(),
            created_after: parse_date(self.created_after.as_deref())?,
            created_before: parse_date(self.created_before.as_deref())?,
            updated_after: parse_date(self.updated_after.as_deref())?,
            updated_before: parse_date(self.updated_before.as_deref())?,
            filter_logic,
        })
    }
}

/// RFC 3339, or a bare date taken as midnight UTC
fn parse_date(value: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{value}'. Use YYYY-MM-DD or RFC 3339."))?;
    Ok(date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_search(
    cli: &Cli,
    config: &Config,
    query: &str,
    limit: usize,
    filters: &SearchFilters,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rag = open_rag(cli, config).await?;
    let results = rag.search(query, limit, filters).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Text => print_results(&results),
    }
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. [{}] {} (score {:.3}, similarity {:.1}%)",
            rank + 1,
            result.kind,
            result.display_name(),
            result.score,
            result.normalized_similarity * 100.0
        );
        println!("    id: {}", result.id);
    }
}

async fn cmd_context(
    cli: &Cli,
    config: &Config,
    query: &str,
    limit: usize,
    filters: &SearchFilters,
    max_tokens: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rag = open_rag(cli, config).await?;
    let context = rag
        .retrieve_context(query, limit, filters, max_tokens)
        .await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&context)?),
        OutputFormat::Text => {
            if context.is_empty() {
                println!("No relevant knowledge graph context found.");
                return Ok(());
            }
            println!("{}", context.context);
            println!();
            println!("Sources:");
            for source in &context.sources {
                println!(
                    "  [{}] {} ({}, {:.1}%)",
                    source.kind,
                    source.name,
                    source.id,
                    source.score * 100.0
                );
            }
        }
    }
    Ok(())
}

async fn cmd_index(
    cli: &Cli,
    config: &Config,
    collection: Collection,
    org: &str,
) -> anyhow::Result<()> {
    let (embeddings, store) = open_parts(cli, config).await?;
    let index = Arc::new(vector_index(config)?);
    let indexer = EmbeddingIndexer::new(embeddings, index, store);

    info!(collection = %collection, organization_id = org, "Indexing started");
    let report = indexer.index_organization(collection, org).await?;
    println!(
        "Indexed {} {} ({} failed).",
        report.indexed, collection, report.failed
    );
    if report.failed > 0 {
        return Err(anyhow!("{} {} could not be indexed", report.failed, collection));
    }
    Ok(())
}

fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    println!("# {}", Config::config_path()?.display());
    for (key, value) in config.list() {
        println!("{} = {}", key, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_args_build_filters() {
        let cli = Cli::try_parse_from([
            "graphrag",
            "search",
            "acme pricing",
            "--org",
            "org1",
            "--entity-type",
            "organization",
            "--created-after",
            "2024-03-01",
            "--logic",
            "or",
            "--format",
            "json",
        ])
        .unwrap();

        let Commands::Search { filters, limit, .. } = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(limit, None);
        let filters = filters.to_filters().unwrap();
        assert_eq!(filters.organization_id.as_deref(), Some("org1"));
        assert_eq!(filters.entity_type, Some(EntityType::Organization));
        assert_eq!(filters.filter_logic, FilterLogic::Or);
        let after = filters.created_after.unwrap();
        assert_eq!((after.year(), after.month(), after.day()), (2024, 3, 1));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "graphrag",
            "index",
            "topics",
            "--org",
            "org1",
            "--provider",
            "local",
            "--index-url",
            "http://index:9000",
        ])
        .unwrap();

        assert_eq!(cli.index_url.as_deref(), Some("http://index:9000"));
        let overrides = overrides(&cli);
        assert_eq!(overrides.provider, Some(ProviderKind::Local));
    }

    #[test]
    fn test_provider_flag_is_a_closed_choice() {
        assert!(Cli::try_parse_from(["graphrag", "config", "show", "--provider", "gpu"]).is_err());

        let cli = Cli::try_parse_from(["graphrag", "config", "show", "--provider", "openai"]).unwrap();
        assert_eq!(cli.provider, Some(ProviderArg::OpenAi));
        assert_eq!(overrides(&cli).provider, Some(ProviderKind::OpenAi));
    }

    #[test]
    fn test_parse_date_formats() {
        let ts = parse_date(Some("2024-05-06T07:08:09Z")).unwrap().unwrap();
        assert_eq!(ts.hour(), 7);
        assert!(parse_date(None).unwrap().is_none());
        assert!(parse_date(Some("last tuesday")).is_err());
    }

    #[test]
    fn test_bad_logic_is_rejected() {
        let args = FilterArgs {
            logic: Some("xor".to_string()),
            ..Default::default()
        };
        assert!(args.to_filters().is_err());
    }
}
