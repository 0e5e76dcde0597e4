//! Ordered application of edit blocks to one file's content.

use std::path::Path;

use mender_types::EditBlock;
use mender_utils::{compute_diff_stats, format_unified_diff, persist_text};
use tracing::{debug, info};

use crate::error::EditError;
use crate::matcher::{Anchor, MatchConfig, MatchKind, locate};
use crate::parser::strip_markers;

/// One substitution that changed the content.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEdit {
    /// 1-based position of the block in its response.
    pub index: usize,
    /// The block as applied, carrying the ratio its anchor matched with.
    pub block: EditBlock,
    pub kind: MatchKind,
    /// Unified diff of anchor text to replacement.
    pub diff: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub edited_content: String,
    pub applied: Vec<AppliedEdit>,
    /// Blocks whose replacement was already in place.
    pub already_applied: usize,
    /// `"Edit <i>: <search>"` for each block that found no anchor.
    pub failed_edits: Vec<String>,
    pub console_output: Vec<String>,
}

impl ApplyReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }

    #[must_use]
    pub fn console_text(&self) -> String {
        self.console_output.join("\n")
    }
}

/// Apply `blocks` to `content` in order, each block seeing the previous ones' result.
#[must_use]
pub fn apply_to_content(
    path: &str,
    blocks: &[EditBlock],
    content: &str,
    config: &MatchConfig,
) -> ApplyReport {
    let total = blocks.len();
    let mut report = ApplyReport {
        edited_content: content.to_string(),
        ..ApplyReport::default()
    };

    for (offset, block) in blocks.iter().enumerate() {
        let index = offset + 1;
        let search = block.search().trim();
        let replacement = strip_markers(block.replace().trim());

        let Some(anchor) = locate(search, &report.edited_content, config) else {
            report.console_output.push(format!(
                "Edit {index}/{total} not applied: content not found (Similarity: 0.00)"
            ));
            report.failed_edits.push(format!("Edit {index}: {search}"));
            continue;
        };

        if already_in_place(&report.edited_content, &anchor, &replacement) {
            report.already_applied += 1;
            report
                .console_output
                .push(format!("Edit {index}/{total} already applied"));
            continue;
        }

        let anchor_text = anchor.text(&report.edited_content);

        let diff = format_unified_diff(path, anchor_text, &replacement);
        debug!(path, edit = index, similarity = anchor.similarity, "Applied edit\n{diff}");

        let mut edited = String::with_capacity(
            report.edited_content.len() - anchor_text.len() + replacement.len(),
        );
        edited.push_str(&report.edited_content[..anchor.start]);
        edited.push_str(&replacement);
        edited.push_str(&report.edited_content[anchor.end..]);
        report.edited_content = edited;

        let mut line = format!("Edit {index}/{total} applied successfully");
        if anchor.kind == MatchKind::Fuzzy {
            line.push_str(&format!(" (Similarity: {:.2}", anchor.similarity));
            if anchor.similarity < config.recommend_threshold {
                line.push_str(", low confidence");
            }
            line.push(')');
        }
        report.console_output.push(line);

        report.applied.push(AppliedEdit {
            index,
            block: EditBlock::new(search, replacement, anchor.similarity),
            kind: anchor.kind,
            diff,
        });
    }

    report
}

/// Whether the anchor already sits inside a copy of `replacement`.
///
/// True when the anchor text equals the replacement, or when a replacement that
/// grew around its search resolves back to part of itself. A replacement shorter
/// than its anchor never qualifies, so deletions always substitute.
fn already_in_place(content: &str, anchor: &Anchor, replacement: &str) -> bool {
    if replacement.is_empty() || replacement.len() < anchor.end - anchor.start {
        return false;
    }
    content
        .match_indices(replacement)
        .any(|(start, text)| start <= anchor.start && anchor.end <= start + text.len())
}

/// Apply blocks in memory, then persist when anything changed.
pub fn apply_and_persist(
    path: &Path,
    blocks: &[EditBlock],
    content: &str,
    config: &MatchConfig,
) -> Result<ApplyReport, EditError> {
    let shown = path.display().to_string();
    let mut report = apply_to_content(&shown, blocks, content, config);

    if report.changed() {
        persist_text(path, &report.edited_content).map_err(|source| EditError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (additions, deletions) = compute_diff_stats(content, &report.edited_content);
        info!(path = %shown, additions, deletions, "Wrote edited file");
        report
            .console_output
            .push(format!("Changes have been written to {shown}"));
    } else {
        report.console_output.push(
            "No changes were applied. The file content already matches the desired state."
                .to_string(),
        );
    }

    Ok(report)
}
