//! Mimir CLI - ask questions over a knowledge graph and a document collection

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mimir_core::config::Config;
use mimir_core::graph::{Freshness, GraphStore, Neo4jGraphStore, SchemaCache};
use mimir_core::ingest::{Ingestor, SourceDocument, TextChunker};
use mimir_core::llm::LlmClient;
use mimir_core::rag::{Answer, HybridOrchestrator, RetrievalOptions};
use mimir_core::storage::migration_status;
use mimir_core::vector::{SqliteVectorIndex, VectorIndex};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "mimir")]
#[command(author, version, about = "Hybrid GraphRAG question answering", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging; `ask` and `chat` also print the graph query and channel status
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        question: String,
        /// Chat model to use instead of llm.default_model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Interactive question loop
    Chat {
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Ingest plain text or markdown files into the graph and the vector index
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Wipe both stores first
        #[arg(long)]
        clear: bool,
    },

    /// Print the graph schema used for query generation
    Schema {
        /// Compare the live schema with the one recorded by the last ingest or refresh
        #[arg(long)]
        check: bool,
    },

    /// Show graph and vector index counts
    Stats,

    /// Delete everything from the graph and the vector index
    Clear {
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Show config file path
    Path,
}

/// Connected collaborators shared by the commands
struct Services {
    config: Config,
    llm: Arc<LlmClient>,
    graph: Arc<Neo4jGraphStore>,
    index: Arc<SqliteVectorIndex>,
    schema_cache: Arc<SchemaCache>,
}

impl Services {
    async fn connect(model: Option<&str>) -> anyhow::Result<Self> {
        let config = Config::load()?;
        config.validate()?;

        let mut llm = LlmClient::from_config(config.llm.clone())?;
        if let Some(model) = model {
            llm = llm.with_model(model);
        }
        let graph = Neo4jGraphStore::from_config(&config.graph)?;
        let index = SqliteVectorIndex::open(config.vector.path.clone()).await?;
        debug!(
            model = %llm.default_model(),
            graph = %graph.endpoint(),
            index = %config.vector.path.display(),
            "Services connected"
        );

        Ok(Self {
            config,
            llm: Arc::new(llm),
            graph: Arc::new(graph),
            index: Arc::new(index),
            schema_cache: Arc::new(SchemaCache::new()),
        })
    }

    fn orchestrator(&self) -> anyhow::Result<HybridOrchestrator> {
        let orchestrator = HybridOrchestrator::builder()
            .graph_store(self.graph.clone())
            .vector_index(self.index.clone())
            .language_model(self.llm.clone())
            .embedder(self.llm.clone())
            .schema_cache(self.schema_cache.clone())
            .options(RetrievalOptions::from(&self.config.retrieval))
            .build()?;
        Ok(orchestrator)
    }

    fn ingestor(&self) -> anyhow::Result<Ingestor> {
        Ok(Ingestor::new(
            self.graph.clone(),
            self.index.clone(),
            self.llm.clone(),
            self.llm.clone(),
            self.schema_cache.clone(),
            TextChunker::from_config(&self.config.ingest)?,
        ))
    }

    /// Store the live schema fingerprint for later `schema --check` runs
    async fn record_schema(&self) -> anyhow::Result<()> {
        let schema = self.schema_cache.ensure_fresh(self.graph.as_ref()).await?;
        self.index
            .database()
            .record_schema_fingerprint(&schema.fingerprint())
            .await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "mimir=debug" } else { "mimir=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    match cli.command {
        Commands::Ask { question, model } => {
            cmd_ask(&question, model.as_deref(), cli.verbose, cli.format).await
        }

        Commands::Chat { model } => {
            cmd_chat(model.as_deref(), cli.verbose, cli.format, cli.quiet).await
        }

        Commands::Ingest { files, clear } => cmd_ingest(&files, clear, cli.format, cli.quiet).await,

        Commands::Schema { check } => cmd_schema(check, cli.format).await,

        Commands::Stats => cmd_stats(cli.format).await,

        Commands::Clear { force } => cmd_clear(force, cli.quiet).await,

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.quiet).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ask(
    question: &str,
    model: Option<&str>,
    verbose: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let services = Services::connect(model).await?;
    let orchestrator = services.orchestrator()?;

    let answer = orchestrator.ask(question).await?;
    print_answer(&answer, verbose, format)
}

async fn cmd_chat(
    model: Option<&str>,
    verbose: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let services = Services::connect(model).await?;
    let orchestrator = services.orchestrator()?;

    let mut rl = DefaultEditor::new()?;
    let history_path = Config::config_dir()?.join("history.txt");
    let _ = rl.load_history(&history_path);

    if !quiet {
        println!("Mimir chat ({}). Type 'exit' to leave.", services.llm.default_model());
        println!();
    }

    loop {
        match rl.readline("mimir> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if matches!(input, "exit" | "quit" | "q") {
                    break;
                }
                let _ = rl.add_history_entry(input);

                // A failed question should not end the session
                match orchestrator.ask(input).await {
                    Ok(answer) => print_answer(&answer, verbose, format)?,
                    Err(e) => eprintln!("Error [{}]: {}", e.code(), e),
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type 'exit' or press Ctrl+D to leave.");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = rl.save_history(&history_path) {
        warn!(error = %e, "Could not save chat history");
    }
    Ok(())
}

async fn cmd_ingest(
    files: &[PathBuf],
    clear: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    // Reject unreadable or unsupported files before touching either store
    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        documents.push(SourceDocument::load(path).await?);
    }

    let services = Services::connect(None).await?;
    let ingestor = services.ingestor()?;

    if !quiet && format == OutputFormat::Text {
        println!("Ingesting {} document(s)...", documents.len());
    }
    let stats = ingestor.ingest(&documents, clear).await?;
    services.record_schema().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            if !quiet {
                println!("Ingestion complete!");
                println!("  Documents: {}", stats.documents);
                println!("  Chunks: {}", stats.chunks);
                println!("  Entities: {}", stats.entities);
                println!("  Relationships: {}", stats.relationships);
                if stats.skipped_chunks > 0 {
                    println!("  Skipped chunks: {}", stats.skipped_chunks);
                }
                println!("  Duration: {:.1}s", stats.duration.as_secs_f64());
            }
        }
    }
    Ok(())
}

async fn cmd_schema(check: bool, format: OutputFormat) -> anyhow::Result<()> {
    let services = Services::connect(None).await?;
    let database = services.index.database();
    let recorded = database.recorded_schema_fingerprint().await?;
    let schema = services.schema_cache.refresh(services.graph.as_ref()).await?;
    let fingerprint = schema.fingerprint();

    // --check compares against the recorded fingerprint without replacing it
    let freshness = if check {
        recorded
            .as_deref()
            .map(|recorded| Freshness::against(recorded, &schema))
    } else {
        database.record_schema_fingerprint(&fingerprint).await?;
        None
    };

    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(schema.as_ref())?;
            value["fingerprint"] = serde_json::json!(fingerprint);
            if check {
                value["recorded_fingerprint"] = serde_json::json!(recorded);
                value["freshness"] = serde_json::json!(freshness.map(freshness_label));
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("{}", schema.describe());
            println!();
            println!("Fingerprint: {}", fingerprint);
            if check {
                println!(
                    "Freshness: {}",
                    freshness.map_or("never recorded", freshness_label)
                );
            }
        }
    }

    if freshness == Some(Freshness::Stale) {
        anyhow::bail!(
            "Graph schema changed since it was last recorded. Run `mimir schema` to record the new one"
        );
    }
    Ok(())
}

fn freshness_label(freshness: Freshness) -> &'static str {
    match freshness {
        Freshness::Current => "current",
        Freshness::Stale => "stale",
    }
}

async fn cmd_stats(format: OutputFormat) -> anyhow::Result<()> {
    let services = Services::connect(None).await?;
    let graph = services.graph.stats().await?;
    let chunks = services.index.count().await?;
    let embedding_model = services.index.embedding_model().await?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "graph": graph,
                "chunks": chunks,
                "embedding_model": embedding_model,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Graph");
            println!("  Nodes: {}", graph.nodes);
            println!("  Relationships: {}", graph.edges);
            println!("Vector index");
            println!("  Chunks: {}", chunks);
            println!(
                "  Embedding model: {}",
                embedding_model.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn cmd_clear(force: bool, quiet: bool) -> anyhow::Result<()> {
    if !force {
        anyhow::bail!("This deletes every node, relationship and indexed chunk. Re-run with --force");
    }

    let services = Services::connect(None).await?;
    services.ingestor()?.clear().await?;
    services.record_schema().await?;
    if !quiet {
        println!("Graph and vector index cleared.");
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Mimir Health Check");
        println!("==================");
        println!();
    }

    let mut all_ok = true;
    let mut report = |ok: bool, line: String| {
        all_ok &= ok;
        if !quiet {
            println!("{} {}", if ok { "[OK]" } else { "[!!]" }, line);
        }
    };

    let config = match Config::load().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => {
            report(true, "Configuration: Valid".to_string());
            config
        }
        Err(e) => {
            report(false, format!("Configuration: Error - {}", e));
            anyhow::bail!("Configuration is invalid; remaining checks skipped");
        }
    };

    match LlmClient::from_config(config.llm.clone()) {
        Ok(llm) => match llm.list_models().await {
            Ok(models) => {
                report(
                    true,
                    format!("Model server: {} ({} models)", llm.base_url(), models.len()),
                );
                for model in [&config.llm.default_model, &config.llm.embedding_model] {
                    let available = llm.is_model_available(model).await.unwrap_or(false);
                    let status = if available { "available" } else { "not pulled" };
                    report(available, format!("Model {}: {}", model, status));
                }
            }
            Err(e) => report(false, format!("Model server: {} - {}", llm.base_url(), e)),
        },
        Err(e) => report(false, format!("Model server: Error - {}", e)),
    }

    match Neo4jGraphStore::from_config(&config.graph) {
        Ok(graph) => match graph.ping().await {
            Ok(()) => report(true, format!("Graph store: Connected ({})", graph.endpoint())),
            Err(e) => report(false, format!("Graph store: {} - {}", graph.endpoint(), e)),
        },
        Err(e) => report(false, format!("Graph store: Error - {}", e)),
    }

    match SqliteVectorIndex::open(config.vector.path.clone()).await {
        Ok(index) => {
            let chunks = index.count().await.unwrap_or_default();
            report(
                true,
                format!("Vector index: {} ({} chunks)", config.vector.path.display(), chunks),
            );

            match migration_status(index.database().pool()).await {
                Ok(status) if status.needs_migration => report(
                    false,
                    format!(
                        "Vector index: Migrations pending (v{} -> v{})",
                        status.current_version, status.target_version
                    ),
                ),
                Ok(status) => report(true, format!("Vector index: Schema v{}", status.current_version)),
                Err(e) => report(false, format!("Vector index: Migration check failed - {}", e)),
            }

            if let Ok(Some(model)) = index.embedding_model().await
                && model != config.llm.embedding_model
            {
                report(
                    false,
                    format!(
                        "Vector index built with {}, configured embedding model is {}",
                        model, config.llm.embedding_model
                    ),
                );
            }
        }
        Err(e) => report(false, format!("Vector index: Error - {}", e)),
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    if !all_ok {
        anyhow::bail!("Some health checks failed");
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_answer(answer: &Answer, verbose: bool, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(answer)?);
        return Ok(());
    }

    println!("{}", answer.text);

    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, citation) in answer.citations.iter().enumerate() {
            match citation.page {
                Some(page) => println!("  [{}] {} (page {})", i + 1, citation.document_id, page),
                None => println!("  [{}] {}", i + 1, citation.document_id),
            }
        }
    }

    if verbose {
        let d = &answer.diagnostics;
        println!();
        println!("Query {}", d.query_id);
        println!("  Graph query: {}", d.graph_statement.as_deref().unwrap_or("-"));
        match &d.graph_failure {
            Some(failure) => println!("  Graph: no data ({})", failure),
            None => println!(
                "  Graph: {} record(s){}",
                d.graph_records,
                if d.graph_truncated { ", truncated" } else { "" }
            ),
        }
        match &d.text_failure {
            Some(failure) => println!("  Text: no data ({})", failure),
            None => println!("  Text: {} passage(s)", d.text_hits),
        }
        if d.schema_stale {
            println!("  Schema: changed during the query; re-ask for current results");
        }
        println!("  Elapsed: {} ms", d.elapsed.as_millis());
    }
    Ok(())
}
