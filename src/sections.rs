//! Section path resolution.
//!
//! Maps local folder-style paths (`login/two-factor`) to TestRail section
//! ids, creating missing sections (and their missing ancestors) on demand.
//! The mapping is cached per resolver; [`SectionResolver::load_existing`]
//! seeds it from the sections that already exist remotely.
//!
//! Path segments are slugs; section names are display names. The two
//! conversions only touch the first character and the first separator, so
//! names with several spaces do not survive a round trip unchanged.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::store::{StoreError, TestRailApi};

/// Result type for section resolution
pub type SectionResult<T> = Result<T, SectionError>;

#[derive(Debug, thiserror::Error)]
pub enum SectionError {
    /// Creating a section failed; ancestors created before stay in place
    #[error("failed to create section '{name}' for path '{path}': {source}")]
    SectionCreation {
        path: String,
        name: String,
        #[source]
        source: StoreError,
    },

    /// Listing the existing sections failed
    #[error("failed to load sections of suite {suite_id}: {source}")]
    Load {
        suite_id: u64,
        #[source]
        source: StoreError,
    },
}

/// Convert a path segment to a section name: first `-` becomes a space and
/// the first character is upper-cased (`two-factor` → `Two factor`)
pub fn path_to_section_name(segment: &str) -> String {
    upper_first(&segment.replacen('-', " ", 1))
}

/// Convert a section name to a path segment: first space becomes `-` and the
/// first character is lower-cased (`Two factor` → `two-factor`)
pub fn section_name_to_path(name: &str) -> String {
    lower_first(&name.replacen(' ', "-", 1))
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split a path into segments, dropping everything up to and including the
/// last `tests` segment
pub fn path_segments(path: &str) -> Vec<&str> {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    match segments.iter().rposition(|s| *s == "tests") {
        Some(root) => segments[root + 1..].to_vec(),
        None => segments,
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", parent, segment)
    }
}

/// Cached mapping from section path to section id for one suite
pub struct SectionResolver<'a, A: TestRailApi + ?Sized> {
    api: &'a A,
    suite_id: u64,
    sections: HashMap<String, u64>,
    paths_by_id: HashMap<u64, String>,
    created: usize,
}

impl<'a, A: TestRailApi + ?Sized> SectionResolver<'a, A> {
    pub fn new(api: &'a A, suite_id: u64) -> Self {
        Self {
            api,
            suite_id,
            sections: HashMap::new(),
            paths_by_id: HashMap::new(),
            created: 0,
        }
    }

    /// Cached id for a path, without touching the store
    pub fn cached(&self, path: &str) -> Option<u64> {
        self.sections.get(&path_segments(path).join("/")).copied()
    }

    /// Path a section id was cached under
    pub fn path_for_section_id(&self, id: u64) -> Option<&str> {
        self.paths_by_id.get(&id).map(String::as_str)
    }

    /// Number of sections this resolver created remotely
    pub fn created(&self) -> usize {
        self.created
    }

    /// Import every existing section of the suite into the cache.
    ///
    /// Sections are processed by ascending parent id, top-level sections
    /// first. A section whose parent has not been seen yet is cached under
    /// its own slug. Returns the number of imported sections.
    pub fn load_existing(&mut self) -> SectionResult<usize> {
        let mut sections = self
            .api
            .get_sections(self.suite_id)
            .map_err(|source| SectionError::Load {
                suite_id: self.suite_id,
                source,
            })?;
        sections.sort_by_key(|s| s.parent_id);

        for section in &sections {
            let slug = section_name_to_path(&section.name);
            let path = match section.parent_id {
                Some(parent_id) => join_path(
                    self.path_for_section_id(parent_id).unwrap_or_default(),
                    &slug,
                ),
                None => slug,
            };
            self.insert(path, section.id);
        }

        debug!(
            "imported {} sections of suite {}",
            sections.len(),
            self.suite_id
        );
        Ok(sections.len())
    }

    /// Resolve a path to a section id, creating missing sections top-down.
    ///
    /// An empty path (after stripping the project root) is the top level and
    /// resolves to `None`.
    pub fn resolve_or_create(&mut self, path: &str) -> SectionResult<Option<u64>> {
        let segments = path_segments(path);
        if segments.is_empty() {
            return Ok(None);
        }

        let key = segments.join("/");
        if let Some(&id) = self.sections.get(&key) {
            debug!("section '{}' cached as {}", key, id);
            return Ok(Some(id));
        }

        // Longest cached ancestor, then create the rest in order.
        let (mut depth, mut parent_id) = (1..segments.len())
            .rev()
            .find_map(|len| {
                self.sections
                    .get(&segments[..len].join("/"))
                    .map(|&id| (len, Some(id)))
            })
            .unwrap_or((0, None));

        while depth < segments.len() {
            depth += 1;
            let path = segments[..depth].join("/");
            let name = path_to_section_name(segments[depth - 1]);
            parent_id = Some(self.create(path, &name, parent_id)?);
        }

        Ok(parent_id)
    }

    /// Resolve or create a section with an explicit display name below
    /// `parent_path`; it is cached at `parent_path/<slug of name>`
    pub fn resolve_or_create_child(&mut self, parent_path: &str, name: &str) -> SectionResult<u64> {
        let parent_id = self.resolve_or_create(parent_path)?;
        let key = join_path(&path_segments(parent_path).join("/"), &section_name_to_path(name));

        if let Some(&id) = self.sections.get(&key) {
            debug!("section '{}' cached as {}", key, id);
            return Ok(id);
        }
        self.create(key, name, parent_id)
    }

    fn create(&mut self, path: String, name: &str, parent_id: Option<u64>) -> SectionResult<u64> {
        let section = self
            .api
            .add_section(self.suite_id, name, parent_id)
            .map_err(|source| SectionError::SectionCreation {
                path: path.clone(),
                name: name.to_string(),
                source,
            })?;

        info!("Section {} is created: {}", name, section.id);
        self.created += 1;
        self.insert(path, section.id);
        Ok(section.id)
    }

    fn insert(&mut self, path: String, id: u64) {
        self.paths_by_id.insert(id, path.clone());
        self.sections.insert(path, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTestRail, StoreCall};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_name_conversions() {
        assert_eq!(path_to_section_name("login"), "Login");
        assert_eq!(path_to_section_name("two-factor"), "Two factor");
        assert_eq!(section_name_to_path("Two factor"), "two-factor");
        assert_eq!(section_name_to_path("Login"), "login");
        assert_eq!(path_to_section_name(""), "");
    }

    #[test]
    fn test_name_conversion_is_lossy() {
        assert_eq!(path_to_section_name("a-b-c"), "A b-c");
        assert_eq!(section_name_to_path("A b c"), "a-b c");
        assert_ne!(section_name_to_path(&path_to_section_name("a-b-c")), "a b c");
    }

    #[test]
    fn test_path_segments_strip_tests_root() {
        assert_eq!(path_segments("/home/ci/project/tests/login/mfa"), vec!["login", "mfa"]);
        assert_eq!(path_segments("tests"), Vec::<&str>::new());
        assert_eq!(path_segments("login/mfa/"), vec!["login", "mfa"]);
        assert_eq!(path_segments(""), Vec::<&str>::new());
    }

    #[test]
    fn test_empty_path_is_top_level() {
        let store = MemoryTestRail::new();
        let mut resolver = SectionResolver::new(&store, 1);
        assert_eq!(resolver.resolve_or_create("").unwrap(), None);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_creates_missing_ancestors() {
        let store = MemoryTestRail::new();
        let mut resolver = SectionResolver::new(&store, 1);

        let id = resolver.resolve_or_create("account/two-factor").unwrap();
        assert_eq!(id, Some(1001));
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::AddSection {
                    suite_id: 1,
                    name: "Account".to_string(),
                    parent_id: None
                },
                StoreCall::AddSection {
                    suite_id: 1,
                    name: "Two factor".to_string(),
                    parent_id: Some(1000)
                },
            ]
        );
        assert_eq!(resolver.cached("account"), Some(1000));
        assert_eq!(resolver.created(), 2);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let store = MemoryTestRail::new();
        let mut resolver = SectionResolver::new(&store, 1);

        let first = resolver.resolve_or_create("a/b/c").unwrap();
        let second = resolver.resolve_or_create("a/b/c").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.calls().len(), 3);
    }

    #[test]
    fn test_reuses_cached_ancestor() {
        let store = MemoryTestRail::new();
        let mut resolver = SectionResolver::new(&store, 1);
        let parent = resolver.resolve_or_create("a/b").unwrap();
        resolver.resolve_or_create("a/b/c").unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2],
            StoreCall::AddSection {
                suite_id: 1,
                name: "C".to_string(),
                parent_id: parent
            }
        );
    }

    #[test]
    fn test_load_existing_rebuilds_paths() {
        let store = MemoryTestRail::new()
            .with_section(30, "Two factor", Some(10), 1)
            .with_section(10, "Account", None, 1)
            .with_section(20, "Checkout", None, 1)
            .with_section(99, "Elsewhere", None, 2);
        let mut resolver = SectionResolver::new(&store, 1);

        assert_eq!(resolver.load_existing().unwrap(), 3);
        assert_eq!(resolver.cached("account"), Some(10));
        assert_eq!(resolver.cached("account/two-factor"), Some(30));
        assert_eq!(resolver.cached("checkout"), Some(20));
        assert_eq!(resolver.cached("elsewhere"), None);

        assert_eq!(resolver.resolve_or_create("account/two-factor").unwrap(), Some(30));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_round_trip_through_bulk_import() {
        let store = MemoryTestRail::new();
        let created = SectionResolver::new(&store, 1)
            .resolve_or_create("a/b/c")
            .unwrap();

        let mut reloaded = SectionResolver::new(&store, 1);
        reloaded.load_existing().unwrap();
        assert_eq!(reloaded.resolve_or_create("a/b/c").unwrap(), created);
        assert_eq!(store.calls().len(), 3);
    }

    #[test]
    fn test_failed_creation_keeps_ancestors() {
        let store = MemoryTestRail::new();
        let mut resolver = SectionResolver::new(&store, 1);
        resolver.resolve_or_create("a").unwrap();

        store.fail_on("add_section");
        let err = resolver.resolve_or_create("a/b").unwrap_err();
        assert!(matches!(err, SectionError::SectionCreation { ref path, .. } if path == "a/b"));
        assert_eq!(resolver.cached("a"), Some(1000));
    }

    #[test]
    fn test_child_with_display_name() {
        let store = MemoryTestRail::new();
        let mut resolver = SectionResolver::new(&store, 1);

        let id = resolver.resolve_or_create_child("account", "login").unwrap();
        assert_eq!(resolver.cached("account/login"), Some(id));
        assert_eq!(resolver.resolve_or_create_child("account", "login").unwrap(), id);
        assert_eq!(store.calls().len(), 2);
    }
}
