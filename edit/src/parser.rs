//! SEARCH/REPLACE block extraction.
//!
//! The wire format is a `<SEARCH>…</SEARCH>` segment followed, with nothing but
//! whitespace in between, by a `<REPLACE>…</REPLACE>` segment. A response may
//! carry any number of pairs; order is significant.

use std::sync::LazyLock;

use mender_types::EditBlock;
use regex::Regex;
use thiserror::Error;

static SEARCH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?s)<SEARCH>.*?</SEARCH>"));

static REPLACE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?s)<REPLACE>.*?</REPLACE>"));

static BLOCK_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"(?s)<SEARCH>\s*(.*?)\s*</SEARCH>\s*<REPLACE>\s*(.*?)\s*</REPLACE>")
});

static MARKER: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"</?(?:SEARCH|REPLACE)>"));

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid block regex {pattern:?}: {err}"))
}

/// Which half of the block format a response is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Search,
    Replace,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKind::Search => f.write_str("<SEARCH>"),
            BlockKind::Replace => f.write_str("<REPLACE>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response does not contain any {missing} blocks")]
pub struct MalformedResponse {
    pub missing: BlockKind,
}

/// Check that `text` has at least one search segment and one replace segment.
pub fn validate_instructions(text: &str) -> Result<(), MalformedResponse> {
    if !SEARCH_SEGMENT.is_match(text) {
        return Err(MalformedResponse {
            missing: BlockKind::Search,
        });
    }
    if !REPLACE_SEGMENT.is_match(text) {
        return Err(MalformedResponse {
            missing: BlockKind::Replace,
        });
    }
    Ok(())
}

/// Extract `(search, replace)` pairs in order of appearance.
///
/// Validates first, so a response with no markers at all is an error while a
/// response whose markers never pair up yields an empty list.
pub fn parse_edit_blocks(text: &str) -> Result<Vec<EditBlock>, MalformedResponse> {
    validate_instructions(text)?;

    Ok(BLOCK_PAIR
        .captures_iter(text)
        .map(|caps| {
            let search = caps.get(1).map_or("", |m| m.as_str()).trim();
            let replace = caps.get(2).map_or("", |m| m.as_str()).trim();
            EditBlock::exact(search, replace)
        })
        .collect())
}

/// Remove any stray block markers from replacement text.
#[must_use]
pub fn strip_markers(text: &str) -> String {
    MARKER.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::{BlockKind, parse_edit_blocks, strip_markers, validate_instructions};

    #[test]
    fn parses_pairs_in_order_and_trims_edges() {
        let text = "intro\n<SEARCH>\n  a = 1\n</SEARCH>\n<REPLACE>\na = 2\n</REPLACE>\n\
                    prose\n<SEARCH>b</SEARCH>  <REPLACE>c</REPLACE>";
        let blocks = parse_edit_blocks(text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].search(), "a = 1");
        assert_eq!(blocks[0].replace(), "a = 2");
        assert_eq!(blocks[1].search(), "b");
        assert_eq!(blocks[1].replace(), "c");
        assert_eq!(blocks[0].similarity(), 1.0);
    }

    #[test]
    fn keeps_inner_formatting_verbatim() {
        let text = "<SEARCH>\nfn a() {\n    x();\n}\n</SEARCH><REPLACE>\nfn a() {\n\n    y();\n}\n</REPLACE>";
        let blocks = parse_edit_blocks(text).unwrap();
        assert_eq!(blocks[0].search(), "fn a() {\n    x();\n}");
        assert_eq!(blocks[0].replace(), "fn a() {\n\n    y();\n}");
    }

    #[test]
    fn missing_search_or_replace_is_malformed() {
        let err = validate_instructions("just prose").unwrap_err();
        assert_eq!(err.missing, BlockKind::Search);

        let err = validate_instructions("<SEARCH>x</SEARCH>").unwrap_err();
        assert_eq!(err.missing, BlockKind::Replace);
        assert!(err.to_string().contains("<REPLACE>"));
    }

    #[test]
    fn prose_between_markers_prevents_pairing() {
        let text = "<SEARCH>a</SEARCH> then <REPLACE>b</REPLACE>";
        assert!(validate_instructions(text).is_ok());
        assert!(parse_edit_blocks(text).unwrap().is_empty());
    }

    #[test]
    fn empty_replace_is_a_deletion() {
        let blocks = parse_edit_blocks("<SEARCH>drop me</SEARCH>\n<REPLACE>\n</REPLACE>").unwrap();
        assert_eq!(blocks[0].replace(), "");
    }

    #[test]
    fn strips_markers_from_replacement() {
        assert_eq!(strip_markers("x</SEARCH> = <REPLACE>1"), "x = 1");
        assert_eq!(strip_markers("untouched"), "untouched");
    }
}
