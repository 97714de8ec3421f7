//! Case generation over a directory tree.

use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

use testrail_sync::generate::{CaseGenerator, GenerateSummary};
use testrail_sync::store::{MemoryTestRail, StoreCall};

fn write(dir: &TempDir, relative: &str, content: &str) {
    let path = dir.path().join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(dir: &TempDir, relative: &str) -> String {
    fs::read_to_string(dir.path().join(relative)).unwrap()
}

#[test]
fn test_reuses_existing_sections() {
    let dir = TempDir::new().unwrap();
    write(&dir, "e2e/tests/login/two-factor/sms.spec.js", "it(\"sends a code\", () => {});\n");

    let store = MemoryTestRail::new()
        .with_section(10, "Login", None, 3)
        .with_section(11, "Two factor", Some(10), 3);

    let summary = CaseGenerator::new(&store, 3, "it")
        .unwrap()
        .run(dir.path())
        .unwrap();

    assert_eq!(summary.sections_created, 1);
    assert_eq!(
        store.calls()[0],
        StoreCall::AddSection {
            suite_id: 3,
            name: "sms".to_string(),
            parent_id: Some(11),
        }
    );
    let case = store.cases().pop().unwrap();
    assert_eq!(case.title, "sends a code");
    assert_eq!(
        read(&dir, "e2e/tests/login/two-factor/sms.spec.js"),
        format!("it(\"sends a code C{}\", () => {{}});\n", case.id)
    );
}

#[test]
fn test_files_share_directory_sections() {
    let dir = TempDir::new().unwrap();
    write(&dir, "checkout/cart.spec.js", "it('adds item', f);\nit('removes item', f);\n");
    write(&dir, "checkout/payment.spec.js", "it('pays by card C5', f);\nit('pays by invoice', f);\n");
    write(&dir, "notes.md", "Nothing to see here.\n");

    let store = MemoryTestRail::new();
    let summary = CaseGenerator::new(&store, 3, "it")
        .unwrap()
        .run(dir.path())
        .unwrap();

    assert_eq!(
        summary,
        GenerateSummary {
            files_scanned: 3,
            files_updated: 2,
            cases_created: 3,
            sections_created: 3,
        }
    );

    let names: Vec<String> = store.sections().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["Checkout", "cart", "payment"]);

    let cart = read(&dir, "checkout/cart.spec.js");
    assert!(cart.contains("it('adds item C"));
    assert!(cart.contains("it('removes item C"));
    let payment = read(&dir, "checkout/payment.spec.js");
    assert!(payment.starts_with("it('pays by card C5', f);\n"));
    assert!(payment.contains("it('pays by invoice C"));
    assert_eq!(read(&dir, "notes.md"), "Nothing to see here.\n");
}

#[test]
fn test_second_pass_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    write(&dir, "smoke.spec.js", "it('boots', f);\n");

    let store = MemoryTestRail::new();
    CaseGenerator::new(&store, 3, "it").unwrap().run(dir.path()).unwrap();
    let calls_after_first = store.calls().len();

    let summary = CaseGenerator::new(&store, 3, "it")
        .unwrap()
        .run(dir.path())
        .unwrap();

    assert_eq!(summary.cases_created, 0);
    assert_eq!(summary.files_updated, 0);
    assert_eq!(store.calls().len(), calls_after_first);
}

#[test]
fn test_custom_marker() {
    let dir = TempDir::new().unwrap();
    write(&dir, "api.test.ts", "test('lists users', f);\nit('ignored', f);\n");

    let store = MemoryTestRail::new();
    let summary = CaseGenerator::new(&store, 3, "test")
        .unwrap()
        .run(dir.path())
        .unwrap();

    assert_eq!(summary.cases_created, 1);
    assert!(read(&dir, "api.test.ts").ends_with("it('ignored', f);\n"));
}
