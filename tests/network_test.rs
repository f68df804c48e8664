use serde_json::json;
use std::fs;
use test_log::test;

use context_network::{
    codec::FormatParserRegistry,
    config::NetworkConfig,
    error::{ContextNetworkError, LimitKind},
    network::{NodeNetwork, NodeNetworkBuilder},
    paths::{CachingResolver, FilesystemResolver, NodeReferenceResolver},
    properties::NodeFormat,
    tokens::{ModelTokenCounter, TokenCounter},
};

mod common;

const ENTRY: &str = "blueprints/research.yaml";

#[test]
fn test_fixture_network_shape() {
    let root = common::generate_test_root("network_1");
    let network = NodeNetwork::from_directory(root.path(), ENTRY, &NetworkConfig::default()).unwrap();

    let ids: Vec<&str> = network.nodes().keys().map(|k| k.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "blueprints/research.yaml",
            "data/sources.json",
            "instructions/analyze.md",
            "instructions/footer.j2",
            "instructions/summarize.j2",
            "memory/notes.md",
        ]
    );
    assert_eq!(network.depth(), 2);

    // notes.md is loaded once and shared by three parents
    let parents: Vec<&str> = network
        .parents("memory/notes.md")
        .iter()
        .map(|n| n.id())
        .collect();
    assert_eq!(
        parents,
        vec![
            "data/sources.json",
            "instructions/analyze.md",
            "instructions/summarize.j2"
        ]
    );

    // Relative, relative-with-parent and rooted references
    let blueprint = network.root();
    assert_eq!(
        blueprint.children(),
        &[
            "instructions/analyze.md".to_string(),
            "instructions/summarize.j2".to_string(),
            "data/sources.json".to_string()
        ]
    );
    assert_eq!(blueprint.references()[0].label.as_deref(), Some("Analysis"));
}

#[test]
fn test_formats_and_metadata() {
    let root = common::generate_test_root("network_1");
    let network = NodeNetwork::from_directory(root.path(), ENTRY, &NetworkConfig::default()).unwrap();

    let blueprint = network.root();
    assert_eq!(blueprint.format(), NodeFormat::Yaml);
    assert_eq!(blueprint.semantic_type(), Some("blueprint"));
    assert_eq!(blueprint.metadata().get("owner"), Some(&json!("research")));

    let analyze = network.get("instructions/analyze.md").unwrap();
    assert_eq!(analyze.format(), NodeFormat::Markdown);
    assert_eq!(analyze.semantic_type(), Some("instruction"));
    assert_eq!(analyze.metadata().get("tags"), Some(&json!(["analysis"])));
    // The external style guide link is not a reference
    assert_eq!(analyze.references().len(), 1);

    let summarize = network.get("instructions/summarize.j2").unwrap();
    assert_eq!(summarize.format(), NodeFormat::Template);
    assert_eq!(summarize.content()["variables"], json!(["audience"]));

    let sources = network.get("data/sources.json").unwrap();
    assert_eq!(sources.format(), NodeFormat::Json);
    assert_eq!(sources.content()["sources"][0]["limit"], json!(10));
}

#[test]
fn test_absolute_entry_path() {
    let root = common::generate_test_root("network_1");
    let entry = root.path().join(ENTRY);
    let network = NodeNetwork::from_directory(
        root.path(),
        entry.to_str().unwrap(),
        &NetworkConfig::default(),
    )
    .unwrap();
    assert_eq!(network.root_id(), ENTRY);
    assert_eq!(network.len(), 6);
}

#[test]
fn test_depth_limit_from_config_file() {
    let root = common::generate_test_root("network_1");
    let config_path = root.path().join("limits.toml");
    fs::write(&config_path, "max_depth = 2\n").unwrap();
    let config = NetworkConfig::from_file(&config_path).unwrap();

    let err = NodeNetwork::from_directory(root.path(), ENTRY, &config).unwrap_err();
    assert_eq!(
        err,
        ContextNetworkError::NodeNetworkDepthExceeded {
            depth: 3,
            max_depth: 2
        }
    );
    assert!(NodeNetwork::from_directory(root.path(), ENTRY, &config.with_max_depth(3)).is_ok());
}

#[test]
fn test_missing_reference_suggests_near_matches() {
    let root = common::write_network(&[
        ("plan.yaml", "task:\n  $ref: notes.md\n"),
        ("memory/notes.md", "# Notes\n"),
    ]);
    let err = NodeNetwork::from_directory(root.path(), "plan.yaml", &NetworkConfig::default())
        .unwrap_err();
    assert_eq!(
        err,
        ContextNetworkError::NodeReferenceNotFound {
            path: "notes.md".to_string(),
            referenced_from: "plan.yaml".to_string(),
            suggestions: vec!["memory/notes.md".to_string()],
        }
    );
    assert!(err.to_string().contains("did you mean: memory/notes.md"));
}

#[test]
fn test_reference_escaping_root() {
    let root = common::write_network(&[("plan/a.yaml", "task:\n  $ref: ../../outside.md\n")]);
    let err = NodeNetwork::from_directory(root.path(), "plan/a.yaml", &NetworkConfig::default())
        .unwrap_err();
    assert!(matches!(err, ContextNetworkError::PathResolution(_)));
}

#[cfg(unix)]
#[test]
fn test_symlink_escaping_root() {
    let outside = common::write_network(&[("secret.md", "outside the root\n")]);
    let root = common::write_network(&[("root.md", "[s](link.md)\n")]);
    std::os::unix::fs::symlink(outside.path().join("secret.md"), root.path().join("link.md"))
        .unwrap();
    let err = NodeNetwork::from_directory(root.path(), "root.md", &NetworkConfig::default())
        .unwrap_err();
    assert!(matches!(err, ContextNetworkError::PathResolution(_)));
}

#[test]
fn test_filesystem_cycle() {
    let root = common::write_network(&[
        ("a.md", "[b](b.yaml)\n"),
        ("b.yaml", "next:\n  $ref: c.json\n"),
        ("c.json", "{\"back\": {\"type\": \"reference\", \"path\": \"a.md\"}}"),
    ]);
    let err = NodeNetwork::from_directory(root.path(), "a.md", &NetworkConfig::default())
        .unwrap_err();
    assert_eq!(
        err,
        ContextNetworkError::NodeNetworkValidation {
            cycle: vec![
                "a.md".to_string(),
                "b.yaml".to_string(),
                "c.json".to_string(),
                "a.md".to_string()
            ]
        }
    );
    assert_eq!(
        err.to_string(),
        "Reference cycle detected: a.md -> b.yaml -> c.json -> a.md"
    );
}

#[test]
fn test_parse_error_carries_location() {
    let root = common::write_network(&[("bad.json", "{\n  \"a\": [1, 2,\n}")]);
    let err = NodeNetwork::from_directory(root.path(), "bad.json", &NetworkConfig::default())
        .unwrap_err();
    match err {
        ContextNetworkError::FormatParse {
            format,
            path,
            location,
            ..
        } => {
            assert_eq!(format, "json");
            assert_eq!(path, "bad.json");
            assert!(location.is_some());
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_undetectable_format() {
    let root = common::write_network(&[("blob.bin", "")]);
    let err = NodeNetwork::from_directory(root.path(), "blob.bin", &NetworkConfig::default())
        .unwrap_err();
    assert!(matches!(err, ContextNetworkError::FormatDetection(_)));
}

#[test]
fn test_caching_resolver_is_transparent() {
    let root = common::generate_test_root("network_1");
    let registry = FormatParserRegistry::with_defaults();
    let resolver = CachingResolver::new(FilesystemResolver::new(root.path()).unwrap());
    let builder = NodeNetworkBuilder::new(&registry, &resolver);

    let first = builder.build_network(ENTRY, &NetworkConfig::default()).unwrap();
    assert_eq!(resolver.hits(), 0);
    assert_eq!(resolver.cached(), 6);

    let second = builder.build_network(ENTRY, &NetworkConfig::default()).unwrap();
    assert_eq!(resolver.hits(), 6);
    assert_eq!(first.nodes(), second.nodes());
    assert!(resolver.validate("../memory/notes.md", "instructions/analyze.md"));
}

#[test]
fn test_network_token_total() {
    let root = common::generate_test_root("network_1");
    let network = NodeNetwork::from_directory(root.path(), ENTRY, &NetworkConfig::default()).unwrap();
    let counter = ModelTokenCounter;
    let expected: usize = network
        .nodes()
        .values()
        .map(|node| counter.count_tokens_for_node(node, "gpt-4").unwrap())
        .sum();
    assert_eq!(network.total_tokens(), expected);

    let err = NodeNetwork::from_directory(
        root.path(),
        ENTRY,
        &NetworkConfig::default().with_max_tokens_per_network(Some(expected - 1)),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ContextNetworkError::NodeResourceLimitExceeded {
            node: None,
            kind: LimitKind::NetworkTokens,
            current: expected,
            maximum: expected - 1
        }
    );
}
