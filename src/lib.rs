//! # context-network
//!
//! Builds and renders a unified **context node network**: a graph of content nodes (blueprints,
//! instructions, data, memory) authored in mixed formats (YAML, Markdown, Jinja-style templates and
//! JSON) that reference one another by path or identifier.
//!
//! ## Overview
//!
//! Building a network takes three steps:
//!
//! 1. **Canonicalize**: each source is matched to a parser by the [`codec::FormatParserRegistry`],
//!    parsed, converted to canonical JSON, and scanned for references in its own syntax.
//! 2. **Resolve**: the [`network::NodeNetworkBuilder`] walks the references depth-first with an
//!    explicit stack, resolving each through an injected [`paths::NodeReferenceResolver`]. Cycles,
//!    over-deep chains and oversized nodes or networks abort the build with a specific error.
//! 3. **Render**: the [`render::ReferenceInliner`] writes a node back out in a target format,
//!    either inlining everything it references or keeping compact pointers (file-first mode).
//!
//! ### Reference syntaxes
//!
//! | Format   | Syntax                                               |
//! |----------|------------------------------------------------------|
//! | YAML     | `$ref: instructions/analyze.md` anywhere in the tree |
//! | Markdown | `[Analysis](instructions/analyze.md)`                |
//! | Template | `{# ref: instructions/analyze.md #}`, `{% include "x.j2" %}` |
//! | JSON     | `{"type": "reference", "path": "instructions/analyze.md"}` |
//!
//! Links with an external scheme (`https://`, `mailto:` ...) are never references.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use context_network::{
//!     config::NetworkConfig, network::NodeNetwork, properties::NodeFormat, render::RenderMode,
//! };
//!
//! fn main() -> Result<(), context_network::ContextNetworkError> {
//!     let config = NetworkConfig::default().with_max_depth(6);
//!     let network = NodeNetwork::from_directory("./prompts", "blueprints/research.yaml", &config)?;
//!     println!("{} nodes, {} tokens", network.len(), network.total_tokens());
//!
//!     // Everything inlined, as one Markdown document
//!     let prompt = network.render_to_string(NodeFormat::Markdown, RenderMode::Full)?;
//!     println!("{prompt}");
//!     Ok(())
//! }
//! ```
//!
//! ### In-memory networks
//!
//! ```rust
//! use context_network::{
//!     codec::FormatParserRegistry, config::NetworkConfig, network::NodeNetworkBuilder,
//!     paths::InMemoryResolver, properties::NodeFormat, render::RenderMode,
//! };
//!
//! let registry = FormatParserRegistry::with_defaults();
//! let resolver = InMemoryResolver::new()
//!     .with("task.md", "# Task\n\n[Rules](rules.md)\n")
//!     .with("rules.md", "Be brief.\n");
//! let network = NodeNetworkBuilder::new(&registry, &resolver)
//!     .build_network("task.md", &NetworkConfig::default())
//!     .unwrap();
//!
//! let full = network.render_to_string(NodeFormat::Markdown, RenderMode::Full).unwrap();
//! assert_eq!(full, "# Task\n\nBe brief.\n");
//! ```
//!
//! ## Features
//!
//! - **default**: the library
//! - **bin**: the `ctxnet` command line tool (`clap`, `tracing-subscriber`)

pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod paths;
pub mod properties;
pub mod render;
pub mod tokens;

pub use error::*;
