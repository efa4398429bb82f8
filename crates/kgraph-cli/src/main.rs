//! kgraph CLI - persistent knowledge graph engine

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use kgraph_core::config::Config;
use kgraph_core::domain::graph::{EdgeInput, EdgeType, Node, NodeInput, NodeType, ids};
use kgraph_core::engine::{ActivationParams, GraphEngine, SubgraphQuery};
use kgraph_core::storage::{Database, DatabaseConfig, default_database_path};
use kgraph_core::Error;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(author, version, about = "Persistent knowledge graph engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides storage.path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the graph store and its schema
    Init,

    /// Load nodes and edges from JSON files
    Ingest {
        /// JSON array of node inputs
        #[arg(long)]
        nodes: Option<PathBuf>,
        /// JSON array of edge inputs; endpoints may be node ids or names
        #[arg(long)]
        edges: Option<PathBuf>,
    },

    /// Show nodes reachable from a node
    Related {
        /// Node id or name
        node: String,
        /// Maximum number of hops
        #[arg(short, long, default_value_t = 2)]
        depth: u32,
        /// Only follow these edge types (repeatable)
        #[arg(long = "edge-type", value_parser = parse_edge_type)]
        edge_types: Vec<EdgeType>,
        /// Minimum edge weight
        #[arg(long, default_value_t = 0.0)]
        min_weight: f64,
    },

    /// Spread activation from seed nodes
    Activate {
        /// Seed node ids or names
        #[arg(required = true)]
        seeds: Vec<String>,
        #[arg(long, default_value_t = 3)]
        iterations: u32,
        #[arg(long, default_value_t = 0.5)]
        decay: f64,
        #[arg(long, default_value_t = 0.05)]
        min_activation: f64,
    },

    /// Score nodes by centrality and blend the score into importance
    Centrality {
        /// betweenness, closeness, degree, eigenvector or pagerank
        metric: String,
        /// Number of top nodes to show
        #[arg(short, long, default_value_t = 10)]
        top: usize,
    },

    /// Extract a filtered subgraph
    Subgraph {
        #[arg(long = "node-type", value_parser = parse_node_type)]
        node_types: Vec<NodeType>,
        #[arg(long = "edge-type", value_parser = parse_edge_type)]
        edge_types: Vec<EdgeType>,
        #[arg(long, default_value_t = 0.0)]
        min_importance: f64,
        #[arg(long, default_value_t = 1000)]
        max_nodes: usize,
    },

    /// Show graph statistics
    Stats,

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
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

fn parse_node_type(s: &str) -> Result<NodeType, String> {
    NodeType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = NodeType::all().iter().map(|t| t.as_str()).collect();
        format!("unknown node type '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn parse_edge_type(s: &str) -> Result<EdgeType, String> {
    EdgeType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = EdgeType::all().iter().map(|t| t.as_str()).collect();
        format!("unknown edge type '{}' (expected one of: {})", s, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("kgraph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Config { action } => cmd_config(action, out),
        Commands::Doctor => cmd_doctor(cli.db.as_deref(), out).await,
        command => {
            let config = load_config(cli.db.as_deref())?;
            let engine = GraphEngine::open(config.clone())
                .await
                .context("Failed to open graph store")?;
            let result = run(&engine, &config, command, out).await;
            engine.close().await;
            result
        }
    }
}

async fn run(engine: &GraphEngine, config: &Config, command: Commands, out: Output) -> anyhow::Result<()> {
    match command {
        Commands::Init => cmd_init(config, out),
        Commands::Ingest { nodes, edges } => cmd_ingest(engine, nodes.as_deref(), edges.as_deref(), out).await,
        Commands::Related {
            node,
            depth,
            edge_types,
            min_weight,
        } => cmd_related(engine, &node, depth, &edge_types, min_weight, out).await,
        Commands::Activate {
            seeds,
            iterations,
            decay,
            min_activation,
        } => {
            let params = ActivationParams {
                iterations,
                decay,
                min_activation,
            };
            cmd_activate(engine, &seeds, params, out).await
        }
        Commands::Centrality { metric, top } => cmd_centrality(engine, &metric, top, out).await,
        Commands::Subgraph {
            node_types,
            edge_types,
            min_importance,
            max_nodes,
        } => {
            let query = SubgraphQuery {
                node_types,
                edge_types,
                min_importance,
                max_nodes,
            };
            cmd_subgraph(engine, query, out).await
        }
        Commands::Stats => cmd_stats(engine, out).await,
        Commands::Config { .. } | Commands::Doctor => Ok(()),
    }
}

fn load_config(db: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    if let Some(path) = db {
        config.storage.path = Some(path.to_path_buf());
    }
    Ok(config)
}

fn database_path(config: &Config) -> PathBuf {
    config.storage.path.clone().unwrap_or_else(default_database_path)
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    /// Print `value` as JSON, or run `text` for human output
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }

    /// Status line, suppressed in quiet and JSON modes
    fn status(&self, message: impl std::fmt::Display) {
        if !self.quiet && self.format == OutputFormat::Text {
            println!("{}", message);
        }
    }
}

/// Find a node by id, falling back to an exact name match
async fn resolve_node(engine: &GraphEngine, key: &str) -> anyhow::Result<Node> {
    if let Some(node) = engine.get_node(key).await? {
        return Ok(node);
    }
    let canonical = ids::canonical_name(key);
    let mut candidates = engine.search_nodes(&canonical, 50).await?;
    candidates.retain(|n| n.name_lower == canonical);
    match candidates.len() {
        0 => Err(Error::NodeNotFound(key.to_string()).into()),
        1 => Ok(candidates.remove(0)),
        n => {
            warn!(name = key, matches = n, "Name is ambiguous, using the most important node");
            Ok(candidates.remove(0))
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn cmd_init(config: &Config, out: Output) -> anyhow::Result<()> {
    let path = database_path(config);
    out.emit(&serde_json::json!({ "database": path.display().to_string() }), || {
        if !out.quiet {
            println!("Initialized graph store at {}", path.display());
        }
    })
}

#[derive(Serialize)]
struct IngestSummary {
    nodes: usize,
    edges: usize,
}

async fn cmd_ingest(
    engine: &GraphEngine,
    nodes: Option<&Path>,
    edges: Option<&Path>,
    out: Output,
) -> anyhow::Result<()> {
    if nodes.is_none() && edges.is_none() {
        anyhow::bail!("Nothing to ingest: pass --nodes and/or --edges");
    }

    let mut names: HashMap<String, String> = HashMap::new();
    let mut summary = IngestSummary { nodes: 0, edges: 0 };

    if let Some(path) = nodes {
        let inputs: Vec<NodeInput> = read_json(path)?;
        let written = engine.add_node_batch(inputs).await?;
        for node in &written {
            names.insert(node.name_lower.clone(), node.id.clone());
        }
        summary.nodes = written.len();
        debug!(path = %path.display(), nodes = written.len(), "Ingested nodes");
    }

    if let Some(path) = edges {
        let mut inputs: Vec<EdgeInput> = read_json(path)?;
        for input in &mut inputs {
            input.source_id = resolve_endpoint(engine, &names, &input.source_id).await?;
            input.target_id = resolve_endpoint(engine, &names, &input.target_id).await?;
        }
        summary.edges = engine.add_edge_batch(inputs).await?.len();
        debug!(path = %path.display(), edges = summary.edges, "Ingested edges");
    }

    out.emit(&summary, || {
        if !out.quiet {
            println!("Ingested {} nodes and {} edges", summary.nodes, summary.edges);
        }
    })
}

/// Map an endpoint written as a node name to its id; ids pass through
async fn resolve_endpoint(
    engine: &GraphEngine,
    names: &HashMap<String, String>,
    endpoint: &str,
) -> anyhow::Result<String> {
    if let Some(id) = names.get(&ids::canonical_name(endpoint)) {
        return Ok(id.clone());
    }
    match resolve_node(engine, endpoint).await {
        Ok(node) => Ok(node.id),
        // left as-is so the batch logs and drops it
        Err(_) => Ok(endpoint.to_string()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn cmd_related(
    engine: &GraphEngine,
    key: &str,
    depth: u32,
    edge_types: &[EdgeType],
    min_weight: f64,
    out: Output,
) -> anyhow::Result<()> {
    let start = resolve_node(engine, key).await?;
    let related = engine.find_related(&start.id, depth, edge_types, min_weight).await?;

    out.emit(&related, || {
        if related.is_empty() {
            println!("No nodes reachable from '{}' within {} hops", start.name, depth);
            return;
        }
        println!("Related to '{}' ({}):", start.name, start.node_type);
        for item in &related.nodes {
            println!(
                "  [{}] {} ({}) importance={:.2}",
                item.depth, item.node.name, item.node.node_type, item.node.importance
            );
        }
        if !out.quiet {
            println!();
            println!("{} nodes, {} edges", related.nodes.len(), related.edges.len());
        }
    })
}

async fn cmd_activate(
    engine: &GraphEngine,
    seeds: &[String],
    params: ActivationParams,
    out: Output,
) -> anyhow::Result<()> {
    let mut seed_ids = Vec::with_capacity(seeds.len());
    for seed in seeds {
        seed_ids.push(resolve_node(engine, seed).await?.id);
    }

    let activated = engine.spreading_activation(&seed_ids, params).await?;
    out.emit(&activated, || {
        for node in &activated {
            println!("{:.4}  {}", node.activation, node.name);
        }
    })
}

#[derive(Serialize)]
struct Ranked {
    id: String,
    name: String,
    score: f64,
}

async fn cmd_centrality(engine: &GraphEngine, metric: &str, top: usize, out: Output) -> anyhow::Result<()> {
    let scores = engine.calculate_centrality(metric).await?;

    let mut ranked = Vec::with_capacity(scores.len());
    for (id, score) in scores {
        let name = engine.get_node(&id).await?.map(|n| n.name).unwrap_or_default();
        ranked.push(Ranked { id, name, score });
    }
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    ranked.truncate(top);

    out.emit(&ranked, || {
        for item in &ranked {
            println!("{:.4}  {}", item.score, item.name);
        }
    })
}

async fn cmd_subgraph(engine: &GraphEngine, query: SubgraphQuery, out: Output) -> anyhow::Result<()> {
    let subgraph = engine.get_subgraph(query).await?;
    let names: HashMap<&str, &str> = subgraph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.name.as_str()))
        .collect();

    out.emit(&subgraph, || {
        println!("Nodes ({}):", subgraph.nodes.len());
        for node in &subgraph.nodes {
            println!("  {} ({}) importance={:.2}", node.name, node.node_type, node.importance);
        }
        println!("Edges ({}):", subgraph.edges.len());
        for edge in &subgraph.edges {
            println!(
                "  {} -[{} {:.2}]-> {}",
                names.get(edge.source_id.as_str()).unwrap_or(&"?"),
                edge.edge_type,
                edge.weight,
                names.get(edge.target_id.as_str()).unwrap_or(&"?"),
            );
        }
    })
}

async fn cmd_stats(engine: &GraphEngine, out: Output) -> anyhow::Result<()> {
    let stats = engine.get_statistics().await;
    let count = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_else(|| "unavailable".to_string());

    out.emit(&stats, || {
        println!("Graph Statistics");
        println!("================");
        println!("Nodes:        {}", stats.node_count);
        println!("Edges:        {}", stats.edge_count);
        println!("Avg degree:   {:.3}", stats.avg_degree);
        println!("Density:      {:.5}", stats.density);
        println!("Store nodes:  {}", count(stats.store_node_count));
        println!("Store edges:  {}", count(stats.store_edge_count));
        if !stats.node_type_histogram.is_empty() {
            println!();
            println!("Node types:");
            for (node_type, n) in &stats.node_type_histogram {
                println!("  {:<12} {}", node_type.as_str(), n);
            }
        }
        if !stats.edge_type_histogram.is_empty() {
            println!();
            println!("Edge types:");
            for (edge_type, n) in &stats.edge_type_histogram {
                println!("  {:<14} {}", edge_type.as_str(), n);
            }
        }
    })
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
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
            out.status(format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.format == OutputFormat::Json {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (key, value) in items {
                    println!("{} = {}", key, value);
                }
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            out.status("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(db: Option<&Path>, out: Output) -> anyhow::Result<()> {
    let quiet = out.quiet;
    if !quiet {
        println!("kgraph Health Check");
        println!("===================");
        println!();
    }

    let mut all_ok = true;

    // Check configuration
    let config = match load_config(db) {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            Config::default()
        }
    };

    // Check config file location
    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }
    }

    // Check database
    match Database::new(DatabaseConfig::from(&config.storage)).await {
        Ok(database) => {
            match database.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Database: Connected");
                        println!("     Path: {}", database.path().display());
                    }
                    match database.migration_status().await {
                        Ok(status) if status.needs_migration => {
                            all_ok = false;
                            if !quiet {
                                println!(
                                    "[!!] Database: Migrations pending (v{} -> v{})",
                                    status.current_version, status.target_version
                                );
                            }
                        }
                        Ok(status) => {
                            if !quiet {
                                println!("[OK] Database: Schema v{}", status.current_version);
                            }
                        }
                        Err(e) => {
                            all_ok = false;
                            if !quiet {
                                println!("[!!] Database: Migration check failed - {}", e);
                            }
                        }
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Database: Health check failed - {}", e);
                    }
                }
            }
            database.close().await;
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {}", e);
                println!("     Path: {}", database_path(&config).display());
            }
        }
    }

    // Summary
    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    if all_ok {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Health check failed"))
    }
}
