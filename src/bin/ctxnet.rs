//! ctxnet CLI tool
//!
//! Command-line interface for building, rendering and checking context networks.
//!
//! ## Commands
//!
//! - `build <entry>`: Build a network and print its statistics
//! - `render <entry>`: Build a network and print its rendered root
//! - `check <dir>`: Build a network from every recognized file under a directory

use clap::{Parser, Subcommand};
use context_network::{
    codec::FormatParserRegistry,
    config::NetworkConfig,
    network::{NodeNetwork, NodeNetworkBuilder},
    paths::{os_path_to_string, FilesystemResolver},
    properties::NodeFormat,
    render::RenderMode,
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "ctxnet")]
#[command(author, version, about = "Build and render context node networks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct NetworkArgs {
    /// Entry node, relative to the root or an absolute path inside it
    entry: String,

    /// Network root directory (defaults to the current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// TOML file with network limits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the maximum reference chain length
    #[arg(long)]
    max_depth: Option<usize>,

    /// Override the token model
    #[arg(long)]
    token_model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a network and print its statistics
    Build {
        #[command(flatten)]
        network: NetworkArgs,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a network and print the rendered root node
    Render {
        #[command(flatten)]
        network: NetworkArgs,

        /// Output format (yaml, markdown, template, json). Defaults to the root's own format
        #[arg(short, long)]
        format: Option<NodeFormat>,

        /// full or file-first
        #[arg(short, long, default_value = "full")]
        mode: RenderMode,
    },

    /// Build a network from every recognized file under a directory and report failures
    Check {
        /// Directory to scan
        dir: PathBuf,

        /// TOML file with network limits
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn load_config(
    path: Option<&Path>,
    max_depth: Option<usize>,
    token_model: Option<String>,
) -> Result<NetworkConfig, context_network::ContextNetworkError> {
    let mut config = match path {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::default(),
    };
    if let Some(max_depth) = max_depth {
        config = config.with_max_depth(max_depth);
    }
    if let Some(token_model) = token_model {
        config = config.with_token_model(token_model);
    }
    Ok(config)
}

fn build(args: NetworkArgs) -> Result<NodeNetwork, Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref(), args.max_depth, args.token_model)?;
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    Ok(NodeNetwork::from_directory(root, &args.entry, &config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { network, json } => {
            let network = build(network)?;
            let stats = network.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("=== Network: {} ===", stats.root);
                println!("Nodes: {}", stats.nodes);
                println!("Edges: {}", stats.edges);
                println!("Depth: {}", stats.depth);
                println!("Total size: {} bytes", stats.total_size);
                println!("Total tokens: {} ({})", stats.total_tokens, stats.token_model);
                for (format, count) in &stats.formats {
                    println!("  {format}: {count}");
                }
            }
            Ok(())
        }

        Commands::Render {
            network,
            format,
            mode,
        } => {
            let network = build(network)?;
            let target = format.unwrap_or_else(|| network.root().format());
            let rendered = network.render_to_string(target, mode)?;
            print!("{rendered}");
            if !rendered.ends_with('\n') {
                println!();
            }
            Ok(())
        }

        Commands::Check {
            dir,
            config,
            verbose,
        } => {
            let config = load_config(config.as_deref(), None, None)?;
            let registry = FormatParserRegistry::with_defaults();
            let resolver = FilesystemResolver::new(&dir)?;
            let builder = NodeNetworkBuilder::new(&registry, &resolver);

            let mut checked = 0;
            let mut failures = Vec::new();
            for entry in WalkDir::new(resolver.root())
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let Ok(rel) = entry.path().strip_prefix(resolver.root()) else {
                    continue;
                };
                let id = os_path_to_string(rel);
                if !registry.handles_path(&id) {
                    continue;
                }
                checked += 1;
                match builder.build_network(&id, &config) {
                    Ok(network) => {
                        if verbose {
                            println!("ok    {id} ({} nodes)", network.len());
                        }
                    }
                    Err(e) => {
                        println!("FAIL  {id}: {e}");
                        failures.push(id);
                    }
                }
            }

            println!(
                "\nChecked {checked} file(s), {} failure(s)",
                failures.len()
            );
            if !failures.is_empty() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
