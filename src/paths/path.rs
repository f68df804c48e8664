use std::{
    borrow::Cow,
    path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR},
};

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    let res = os_path_ref
        .as_ref()
        .components()
        .map(|c| match c {
            Component::RootDir => Cow::from("".to_string()),
            _ => c.as_os_str().to_string_lossy(),
        })
        .collect::<Vec<_>>()
        .join("/");
    tracing::trace!(
        "os_path_to_string: turned {:?} into {}",
        os_path_ref.as_ref().components(),
        res
    );
    res
}

pub fn string_to_os_path(path_string: &str) -> PathBuf {
    PathBuf::from(path_string.replace('/', MAIN_SEPARATOR_STR))
}

/// Drop any `#fragment` or `?query` suffix.
pub fn strip_fragment(path: &str) -> &str {
    let end = path.find(['#', '?']).unwrap_or(path.len());
    &path[..end]
}

/// Directory part of a `/` separated id, without the trailing slash. Empty for top-level ids.
pub fn parent_dir(id: &str) -> &str {
    match id.rfind('/') {
        Some(idx) => &id[..idx],
        None => "",
    }
}

pub fn file_name(id: &str) -> &str {
    match id.rfind('/') {
        Some(idx) => &id[idx + 1..],
        None => id,
    }
}

pub fn file_stem(id: &str) -> &str {
    let name = file_name(id);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Join `rel` onto `dir` and normalize. `None` when `..` climbs above the root.
pub fn join(dir: &str, rel: &str) -> Option<String> {
    if dir.is_empty() {
        normalize(rel)
    } else {
        normalize(&format!("{dir}/{rel}"))
    }
}

/// Resolve `.` and `..` components of a root-relative path.
///
/// Leading slashes and empty components are dropped, so the result never starts with `/`.
/// Returns `None` when a `..` would step above the root instead of preserving it.
///
/// ```rust
/// use context_network::paths::normalize;
///
/// assert_eq!(normalize("blueprints/../instructions/./analyze.md").as_deref(), Some("instructions/analyze.md"));
/// assert_eq!(normalize("/data//a.json").as_deref(), Some("data/a.json"));
/// assert_eq!(normalize("../outside.md"), None);
/// ```
pub fn normalize(path: &str) -> Option<String> {
    let mut components: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                components.pop()?;
            }
            _ => components.push(part),
        }
    }
    Some(components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let cases = [
            ("a/b/c.md", Some("a/b/c.md")),
            ("./a/./b.md", Some("a/b.md")),
            ("a/b/../c.md", Some("a/c.md")),
            ("a/../../c.md", None),
            ("/a/b.md", Some("a/b.md")),
            ("a\\b.md", Some("a/b.md")),
            ("", Some("")),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize(input).as_deref(), expected, "{input}");
        }
    }

    #[test]
    fn test_join_relative_to_directory() {
        assert_eq!(
            join("blueprints", "../instructions/analyze.md").as_deref(),
            Some("instructions/analyze.md")
        );
        assert_eq!(join("", "a.md").as_deref(), Some("a.md"));
        assert_eq!(join("blueprints", "../../x.md"), None);
    }

    #[test]
    fn test_components() {
        assert_eq!(parent_dir("blueprints/research.yaml"), "blueprints");
        assert_eq!(parent_dir("research.yaml"), "");
        assert_eq!(file_name("a/b/c.md"), "c.md");
        assert_eq!(file_stem("a/b/c.md"), "c");
        assert_eq!(file_stem("a/.hidden"), ".hidden");
        assert_eq!(strip_fragment("a.md#section"), "a.md");
        assert_eq!(strip_fragment("a.md?v=2"), "a.md");
    }

    #[test]
    fn test_os_path_roundtrip() {
        let os = string_to_os_path("a/b/c.md");
        assert_eq!(os_path_to_string(&os), "a/b/c.md");
    }
}
