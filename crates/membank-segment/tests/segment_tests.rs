use std::fs;

use membank_core::types::{Document, SizeCategory};
use membank_segment::{scan_corpus, Segmenter};

fn doc(path: &str, content: &str) -> Document {
    Document {
        path: path.to_string(),
        content: content.to_string(),
        modified_at_ms: 1_700_000_000_000,
        domain: "misc".to_string(),
    }
}

fn segmenter() -> Segmenter {
    Segmenter::new(2000, 500, 1500)
}

#[test]
fn splits_on_second_level_headings_and_excludes_title() {
    let content = "# Project Plan\n\n## Goals\nShip the thing.\n\n## Risks\nScope creep.\n";
    let out = segmenter().segment(&doc("plan.md", content));

    assert_eq!(out.skipped_sections, 0);
    assert_eq!(out.chunks.len(), 2);
    assert_eq!(out.chunks[0].section_header, "## Goals");
    assert_eq!(out.chunks[1].section_header, "## Risks");
    assert!(out.chunks[0].content.contains("Ship the thing."));
    for chunk in &out.chunks {
        assert!(!chunk.content.contains("Project Plan"), "title leaked into {}", chunk.id);
    }
    // Positions and ids are deterministic.
    assert_eq!(out.chunks[0].chunk_index, 0);
    assert_eq!(out.chunks[1].chunk_index, 1);
    assert_ne!(out.chunks[0].id, out.chunks[1].id);
}

#[test]
fn title_text_repeated_in_a_section_body_is_kept() {
    let content = "# Alpha\n## Section\nThe word Alpha appears here too.\n";
    let out = segmenter().segment(&doc("alpha.md", content));
    assert_eq!(out.chunks.len(), 1);
    assert!(out.chunks[0].content.contains("Alpha appears"));
}

#[test]
fn unicode_content_survives_verbatim() {
    let content = "# Unicode Test 🌍\n## Section A 🔴\nBody with 中文 and ∫∂∇\n";
    let out = segmenter().segment(&doc("unicode.md", content));

    assert_eq!(out.chunks.len(), 1);
    let chunk = &out.chunks[0];
    assert!(chunk.content.contains("🔴"));
    assert!(chunk.content.contains("中文"));
    assert!(chunk.content.contains("∫∂∇"));
    assert!(!chunk.content.contains("🌍"));
    assert_eq!(chunk.section_header, "## Section A 🔴");
}

#[test]
fn preamble_between_title_and_first_section_becomes_a_chunk() {
    let content = "# Notes\nIntro line before any section.\n\n## Details\nBody.\n";
    let out = segmenter().segment(&doc("notes.md", content));

    assert_eq!(out.chunks.len(), 2);
    assert_eq!(out.chunks[0].section_header, "");
    assert!(out.chunks[0].content.contains("Intro line"));
    assert!(!out.chunks[0].content.contains("# Notes"));
}

#[test]
fn oversized_section_without_paragraph_breaks_yields_zero_chunks() {
    // Single section, 450 repeated lines, no blank lines anywhere: no
    // sub-boundary can bring a fragment under the 2,000 char bound.
    let mut content = String::from("# Big\n## Only Section\n");
    for _ in 0..450 {
        content.push_str("repeated line of filler text\n");
    }
    let out = segmenter().segment(&doc("big.md", &content));

    assert!(out.chunks.is_empty());
    assert_eq!(out.skipped_sections, 1);
}

#[test]
fn oversized_section_with_paragraph_breaks_is_split_under_the_bound() {
    let mut content = String::from("# Big\n## Only Section\n");
    for i in 0..40 {
        content.push_str(&format!("paragraph {} with a reasonable amount of text in it\n\n", i));
    }
    let out = segmenter().segment(&doc("big.md", &content));

    assert!(out.chunks.len() > 1, "section should split into several chunks");
    assert_eq!(out.skipped_sections, 0);
    for chunk in &out.chunks {
        assert!(chunk.content.chars().count() <= 2000);
        assert_eq!(chunk.section_header, "## Only Section");
    }
    let indices: Vec<usize> = out.chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, (0..out.chunks.len()).collect::<Vec<_>>());
}

#[test]
fn size_categories_follow_final_chunk_length() {
    let small = "# T\n## S\nshort\n";
    let medium = format!("# T\n## S\n{}\n", "x".repeat(800));
    let out_small = segmenter().segment(&doc("a.md", small));
    let out_medium = segmenter().segment(&doc("b.md", &medium));
    assert_eq!(out_small.chunks[0].size_category, SizeCategory::Small);
    assert_eq!(out_medium.chunks[0].size_category, SizeCategory::Medium);
}

#[test]
fn scan_corpus_assigns_directory_domains_and_skips_non_markdown() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path();
    fs::create_dir_all(root.join("business")).expect("mkdir");
    fs::create_dir_all(root.join(".membank")).expect("mkdir");
    fs::write(root.join("readme.md"), "# Top\n## A\nbody\n").expect("write");
    fs::write(root.join("business/q3.md"), "# Q3\n## Plan\nbody\n").expect("write");
    fs::write(root.join("business/skip.txt"), "not markdown").expect("write");
    fs::write(root.join(".membank/state.md"), "# Hidden\n## X\ny\n").expect("write");

    let docs = scan_corpus(root).expect("scan");
    let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["business/q3.md", "readme.md"]);
    assert_eq!(docs[0].domain, "business");
    assert_eq!(docs[1].domain, "misc");
}
