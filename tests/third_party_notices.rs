//! Content-integrity checks for THIRD_PARTY_NOTICES.md.
//!
//! The notices document must stay in sync with the direct dependencies in
//! Cargo.toml and keep its required structure. URL liveness is a maintenance
//! concern and deliberately not checked here.

use std::collections::BTreeSet;

const NOTICES: &str = include_str!("../THIRD_PARTY_NOTICES.md");
const MANIFEST: &str = include_str!("../Cargo.toml");

fn direct_dependencies() -> BTreeSet<String> {
    let manifest: toml::Table = toml::from_str(MANIFEST).expect("Cargo.toml should parse");
    manifest["dependencies"]
        .as_table()
        .expect("[dependencies] should be a table")
        .keys()
        .cloned()
        .collect()
}

fn notice_entries() -> Vec<String> {
    NOTICES
        .lines()
        .filter_map(|line| line.strip_prefix("## "))
        .map(|name| name.trim().to_string())
        .collect()
}

/// Lines of one `##` section, up to the next heading or the closing rule.
fn section_body(name: &str) -> Vec<&'static str> {
    let heading = format!("## {}", name);
    NOTICES
        .lines()
        .skip_while(|line| line.trim() != heading)
        .skip(1)
        .take_while(|line| !line.starts_with("## ") && line.trim() != "---")
        .collect()
}

#[test]
fn test_document_has_required_framing() {
    let mut lines = NOTICES.lines();
    assert_eq!(lines.next(), Some("# Third Party Notices"));

    // Intro sentence before the first entry.
    let intro: Vec<&str> = NOTICES
        .lines()
        .skip(1)
        .take_while(|line| !line.starts_with("## "))
        .filter(|line| !line.trim().is_empty())
        .collect();
    assert!(!intro.is_empty(), "intro sentence is missing");

    // Closing horizontal rule followed by a disclaimer.
    let after_rule: Vec<&str> = NOTICES
        .lines()
        .skip_while(|line| line.trim() != "---")
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .collect();
    assert!(
        !after_rule.is_empty(),
        "closing rule or disclaimer is missing"
    );
}

#[test]
fn test_one_entry_per_direct_dependency() {
    let dependencies = direct_dependencies();
    let entries = notice_entries();
    let entry_set: BTreeSet<String> = entries.iter().cloned().collect();

    assert_eq!(
        entries.len(),
        entry_set.len(),
        "duplicate notice entries found"
    );
    assert_eq!(
        entry_set, dependencies,
        "notice entries and [dependencies] must match one-to-one"
    );
}

#[test]
fn test_every_entry_has_required_fields() {
    for name in notice_entries() {
        let body = section_body(&name);
        assert!(
            body.iter().any(|line| line.starts_with("**License:** ")),
            "entry '{}' is missing its license line",
            name
        );
        assert!(
            body.iter()
                .any(|line| line.starts_with("- Repository: https://")),
            "entry '{}' is missing its repository bullet",
            name
        );
        assert!(
            body.iter()
                .any(|line| line.starts_with("- License Text: https://")),
            "entry '{}' is missing its license-text bullet",
            name
        );

        // One descriptive paragraph between the license line and the bullets.
        let has_description = body
            .iter()
            .any(|line| !line.trim().is_empty() && !line.starts_with("**") && !line.starts_with('-'));
        assert!(has_description, "entry '{}' is missing a description", name);
    }
}

#[test]
fn test_known_license_identifiers() {
    let symphonia = section_body("symphonia").join("\n");
    assert!(symphonia.contains("**License:** MPL-2.0"));

    let cpal = section_body("cpal").join("\n");
    assert!(cpal.contains("**License:** Apache-2.0"));
}

#[test]
fn test_formatting_is_stable() {
    // No trailing whitespace and a trailing newline, so re-rendering the
    // document reproduces it byte for byte.
    for (index, line) in NOTICES.lines().enumerate() {
        assert_eq!(
            line,
            line.trim_end(),
            "trailing whitespace on line {}",
            index + 1
        );
    }
    assert!(NOTICES.ends_with('\n'));
    assert!(!NOTICES.ends_with("\n\n"));
}
