//! Performance benchmarks for network building and rendering
//!
//! These benchmarks wrap the integration test scenarios to measure:
//! - Building the `network_1` fixture from disk
//! - Building a wide in-memory network with heavy node sharing
//! - Full and file-first rendering of a built network
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use context_network::{
    codec::FormatParserRegistry,
    config::NetworkConfig,
    network::{NodeNetwork, NodeNetworkBuilder},
    paths::{CachingResolver, FilesystemResolver, InMemoryResolver},
    properties::NodeFormat,
    render::RenderMode,
};
use std::path::PathBuf;
use tempfile::TempDir;

const ENTRY: &str = "blueprints/research.yaml";

// Test corpus setup - mirrors tests/common/mod.rs
fn setup_network_1() -> Result<(TempDir, PathBuf), Box<dyn std::error::Error>> {
    let test_tempdir = TempDir::new()?;
    let test_root = test_tempdir.path().to_path_buf();

    let source = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/network_1");
    copy_dir_recursive(&source, &test_root)?;

    Ok((test_tempdir, test_root))
}

fn copy_dir_recursive(src: &PathBuf, dst: &PathBuf) -> std::io::Result<()> {
    if !dst.exists() {
        std::fs::create_dir_all(dst)?;
    }

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// `layers` layers of `width` Markdown nodes, every node linking to every node of the next layer.
fn layered_network(layers: usize, width: usize) -> InMemoryResolver {
    let mut resolver = InMemoryResolver::new();
    let mut root = String::from("# Root\n\n");
    for j in 0..width {
        root.push_str(&format!("- [node 0.{j}](l0/n{j}.md)\n"));
    }
    resolver.insert("root.md", root);
    for i in 0..layers {
        for j in 0..width {
            let mut body = format!("# Layer {i} node {j}\n\nSome prose for node {j}.\n\n");
            if i + 1 < layers {
                for k in 0..width {
                    body.push_str(&format!("- [next {k}](../l{}/n{k}.md)\n", i + 1));
                }
            }
            resolver.insert(format!("l{i}/n{j}.md"), body);
        }
    }
    resolver
}

// Benchmark: build the fixture from disk, with and without the load cache
fn bench_build_fixture(c: &mut Criterion) {
    let (_tempdir, test_root) = setup_network_1().unwrap();
    let config = NetworkConfig::default();

    c.bench_function("build_fixture_network", |b| {
        b.iter(|| {
            let network = NodeNetwork::from_directory(&test_root, ENTRY, &config).unwrap();
            black_box(network.len())
        });
    });

    let registry = FormatParserRegistry::with_defaults();
    let resolver = CachingResolver::new(FilesystemResolver::new(&test_root).unwrap());
    c.bench_function("build_fixture_network_cached", |b| {
        b.iter(|| {
            let network = NodeNetworkBuilder::new(&registry, &resolver)
                .build_network(ENTRY, &config)
                .unwrap();
            black_box(network.len())
        });
    });
}

// Benchmark: shared-node bookkeeping on a dense layered graph
fn bench_build_layered(c: &mut Criterion) {
    let registry = FormatParserRegistry::with_defaults();
    let resolver = layered_network(6, 8);
    let config = NetworkConfig::default();

    c.bench_function("build_layered_6x8", |b| {
        b.iter(|| {
            let network = NodeNetworkBuilder::new(&registry, &resolver)
                .build_network("root.md", &config)
                .unwrap();
            black_box(network.edge_count())
        });
    });
}

// Benchmark: rendering modes over the fixture
fn bench_render(c: &mut Criterion) {
    let (_tempdir, test_root) = setup_network_1().unwrap();
    let network = NodeNetwork::from_directory(&test_root, ENTRY, &NetworkConfig::default()).unwrap();

    c.bench_function("render_full_markdown", |b| {
        b.iter(|| {
            black_box(
                network
                    .render_to_string(NodeFormat::Markdown, RenderMode::Full)
                    .unwrap(),
            )
        });
    });

    c.bench_function("render_file_first_yaml", |b| {
        b.iter(|| {
            black_box(
                network
                    .render_to_string(NodeFormat::Yaml, RenderMode::FileFirst)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_build_fixture, bench_build_layered, bench_render);
criterion_main!(benches);
