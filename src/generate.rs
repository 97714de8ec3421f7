//! Case generation for un-annotated test declarations.
//!
//! Walks a directory of test sources, finds declarations such as
//! `it('logs in', ...)` whose description carries no case reference, creates
//! a section tree mirroring the folders (plus one section per file) and a
//! case per declaration, then rewrites the declaration to
//! `it('logs in C1234', ...)`.
//!
//! A file is written back once, after every remote creation for it
//! succeeded. A failure part-way leaves the file untouched while the
//! sections and cases created so far remain in the store.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::case_ref::has_case_reference;
use crate::sections::{SectionError, SectionResolver};
use crate::store::{StoreError, TestRailApi};

/// Default name of the test declaration function
pub const DEFAULT_MARKER: &str = "it";

/// Result type for case generation
pub type GenerateResult<T> = Result<T, GenerateError>;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("invalid marker '{marker}': {source}")]
    Marker {
        marker: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Section(#[from] SectionError),

    #[error("failed to create case '{title}': {source}")]
    CaseCreation {
        title: String,
        #[source]
        source: StoreError,
    },
}

/// What a generation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub files_scanned: usize,
    pub files_updated: usize,
    pub cases_created: usize,
    pub sections_created: usize,
}

/// Annotates test declarations with newly created case ids
pub struct CaseGenerator<'a, A: TestRailApi + ?Sized> {
    api: &'a A,
    resolver: SectionResolver<'a, A>,
    declaration: Regex,
}

impl<'a, A: TestRailApi + ?Sized> CaseGenerator<'a, A> {
    /// Generator creating sections and cases in `suite_id`, matching
    /// `<marker>(<quote>description<quote>`
    pub fn new(api: &'a A, suite_id: u64, marker: &str) -> GenerateResult<Self> {
        Ok(Self {
            api,
            resolver: SectionResolver::new(api, suite_id),
            declaration: declaration_regex(marker)?,
        })
    }

    /// Walk `base_dir` in file-name order and annotate every file
    pub fn run(&mut self, base_dir: &Path) -> GenerateResult<GenerateSummary> {
        let imported = self.resolver.load_existing()?;
        debug!("{} existing sections imported", imported);

        let mut summary = GenerateSummary::default();
        for entry in WalkDir::new(base_dir).sort_by_file_name() {
            let entry = entry.map_err(|source| GenerateError::Walk {
                path: base_dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            summary.files_scanned += 1;
            let created = self.process_file(base_dir, entry.path())?;
            if created > 0 {
                summary.files_updated += 1;
                summary.cases_created += created;
            }
        }

        summary.sections_created = self.resolver.created();
        Ok(summary)
    }

    /// Annotate one file; returns the number of cases created for it
    fn process_file(&mut self, base_dir: &Path, path: &Path) -> GenerateResult<usize> {
        let bytes = fs::read(path).map_err(|source| GenerateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let Ok(content) = String::from_utf8(bytes) else {
            warn!("Skipping {}: not valid UTF-8", path.display());
            return Ok(0);
        };

        let folders = path
            .parent()
            .and_then(|dir| dir.strip_prefix(base_dir).ok())
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let section_name = file_section_name(&file_name);

        let mut rewritten = String::with_capacity(content.len());
        let mut last = 0;
        let mut created = 0;

        for caps in self.declaration.captures_iter(&content) {
            let Some(description) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))
            else {
                continue;
            };
            if has_case_reference(description.as_str()) {
                continue;
            }

            let section_id = self
                .resolver
                .resolve_or_create_child(&folders, section_name)?;
            let case = self
                .api
                .add_case(section_id, description.as_str())
                .map_err(|source| GenerateError::CaseCreation {
                    title: description.as_str().to_string(),
                    source,
                })?;
            info!("TestCase {} is created: {}", description.as_str(), case.id);

            rewritten.push_str(&content[last..description.end()]);
            rewritten.push_str(&format!(" C{}", case.id));
            last = description.end();
            created += 1;
        }

        if created > 0 {
            rewritten.push_str(&content[last..]);
            fs::write(path, rewritten).map_err(|source| GenerateError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            info!("File {} is updated", path.display());
        }
        Ok(created)
    }
}

/// `<marker>(` followed by a quoted description; the marker has to start at
/// a word boundary and backslash-escaped quotes stay part of the description
fn declaration_regex(marker: &str) -> GenerateResult<Regex> {
    let pattern = format!(
        r#"\b{}\s*\((?:'((?:[^'\\\n]|\\.)+)'|"((?:[^"\\\n]|\\.)+)"|`((?:[^`\\]|\\.)+)`)"#,
        regex::escape(marker)
    );
    Regex::new(&pattern).map_err(|source| GenerateError::Marker {
        marker: marker.to_string(),
        source,
    })
}

/// Leaf section name for a file: everything before the first `.`
pub fn file_section_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTestRail, StoreCall};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn descriptions(marker: &str, source: &str) -> Vec<String> {
        declaration_regex(marker)
            .unwrap()
            .captures_iter(source)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_file_section_name() {
        assert_eq!(file_section_name("login.test.js"), "login");
        assert_eq!(file_section_name("login.js"), "login");
        assert_eq!(file_section_name("README"), "README");
    }

    #[test]
    fn test_declaration_quotes() {
        let source = "it('single', f);\nit (\"double\", f);\nit(`back`, f);\nit(variable, f);";
        assert_eq!(descriptions("it", source), vec!["single", "double", "back"]);
    }

    #[test]
    fn test_escaped_quotes_stay_in_description() {
        let source = r#"it('doesn\'t crash', f); it("says \"hi\"", f); it(`a \` tick`, f);"#;
        assert_eq!(
            descriptions("it", source),
            vec![r"doesn\'t crash", r#"says \"hi\""#, r"a \` tick"]
        );
    }

    #[test]
    fn test_escaped_quote_annotation_keeps_literal_intact() {
        let dir = TempDir::new().unwrap();
        let test_file = dir.path().join("errors.spec.js");
        fs::write(&test_file, "it('doesn\\'t crash', () => {});\n").unwrap();

        let store = MemoryTestRail::new();
        CaseGenerator::new(&store, 3, DEFAULT_MARKER)
            .unwrap()
            .run(dir.path())
            .unwrap();

        let case = store.cases().pop().unwrap();
        assert_eq!(case.title, "doesn\\'t crash");
        assert_eq!(
            fs::read_to_string(&test_file).unwrap(),
            format!("it('doesn\\'t crash C{}', () => {{}});\n", case.id)
        );
    }

    #[test]
    fn test_marker_needs_word_boundary() {
        let source = "split('a'); it('real'); xit('skipped')";
        assert_eq!(descriptions("it", source), vec!["real"]);
    }

    #[test]
    fn test_custom_marker_is_escaped() {
        let source = "test.only('focused'); test('plain')";
        assert_eq!(descriptions("test.only", source), vec!["focused"]);
    }

    #[test]
    fn test_annotates_file_in_place() {
        let dir = TempDir::new().unwrap();
        let tests_dir = dir.path().join("tests").join("login");
        fs::create_dir_all(&tests_dir).unwrap();
        let test_file = tests_dir.join("auth.spec.js");
        fs::write(&test_file, "it('logs in', () => {});\nit('logs out C7', () => {});\n").unwrap();

        let store = MemoryTestRail::new();
        let summary = CaseGenerator::new(&store, 3, DEFAULT_MARKER)
            .unwrap()
            .run(dir.path())
            .unwrap();

        assert_eq!(
            summary,
            GenerateSummary {
                files_scanned: 1,
                files_updated: 1,
                cases_created: 1,
                sections_created: 2,
            }
        );
        let case_id = store.cases()[0].id;
        assert_eq!(
            fs::read_to_string(&test_file).unwrap(),
            format!("it('logs in C{}', () => {{}});\nit('logs out C7', () => {{}});\n", case_id)
        );

        let names: Vec<String> = store.sections().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Login", "auth"]);
    }

    #[test]
    fn test_failed_case_creation_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let test_file = dir.path().join("checkout.js");
        let original = "it('pays', () => {});\n";
        fs::write(&test_file, original).unwrap();

        let store = MemoryTestRail::new();
        store.fail_on("add_case");
        let err = CaseGenerator::new(&store, 3, DEFAULT_MARKER)
            .unwrap()
            .run(dir.path())
            .unwrap_err();

        assert!(matches!(err, GenerateError::CaseCreation { .. }));
        assert_eq!(fs::read_to_string(&test_file).unwrap(), original);
        assert!(matches!(store.calls()[0], StoreCall::AddSection { .. }));
    }

    #[test]
    fn test_binary_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("image.png"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

        let store = MemoryTestRail::new();
        let summary = CaseGenerator::new(&store, 3, DEFAULT_MARKER)
            .unwrap()
            .run(dir.path())
            .unwrap();

        assert_eq!(summary.files_scanned, 1);
        assert_eq!(summary.files_updated, 0);
        assert!(store.calls().is_empty());
    }
}
