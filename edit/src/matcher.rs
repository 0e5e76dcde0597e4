//! Anchor resolution: exact substring first, then fuzzy line windows.

use std::collections::HashMap;

use similar::{Algorithm, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Fall back to fuzzy line windows when the exact search misses.
    pub fuzzy: bool,
    /// Minimum ratio a fuzzy window needs to become an anchor.
    pub cutoff: f64,
    /// Fuzzy edits below this ratio are flagged as low confidence.
    pub recommend_threshold: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            fuzzy: true,
            cutoff: 0.6,
            recommend_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// Byte span of live content that a search resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub start: usize,
    pub end: usize,
    pub similarity: f64,
    pub kind: MatchKind,
}

impl Anchor {
    #[must_use]
    pub fn text<'a>(&self, content: &'a str) -> &'a str {
        &content[self.start..self.end]
    }
}

/// `2·M / (|a| + |b|)` over chars, where `M` is the number of matched chars.
///
/// The diff runs without a deadline so the score depends only on the inputs.
#[must_use]
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(a, b);
    f64::from(diff.ratio())
}

/// Ratio ceiling from lengths alone.
fn length_bound(a_len: usize, b_len: usize) -> f64 {
    let total = a_len + b_len;
    if total == 0 {
        return 1.0;
    }
    2.0 * a_len.min(b_len) as f64 / total as f64
}

/// Ratio ceiling from shared character counts, ignoring order.
fn multiset_bound(search_counts: &HashMap<char, usize>, search_len: usize, candidate: &str) -> f64 {
    let mut remaining = search_counts.clone();
    let mut shared = 0usize;
    let mut candidate_len = 0usize;
    for ch in candidate.chars() {
        candidate_len += 1;
        if let Some(count) = remaining.get_mut(&ch)
            && *count > 0
        {
            *count -= 1;
            shared += 1;
        }
    }
    let total = search_len + candidate_len;
    if total == 0 {
        return 1.0;
    }
    2.0 * shared as f64 / total as f64
}

fn char_counts(text: &str) -> HashMap<char, usize> {
    let mut counts = HashMap::new();
    for ch in text.chars() {
        *counts.entry(ch).or_insert(0) += 1;
    }
    counts
}

/// Byte spans of each line, excluding the line terminator.
fn line_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        spans.push((offset, offset + body.len()));
        offset += line.len();
    }
    spans
}

/// Resolve `search` against `content`.
///
/// An empty search never anchors.
#[must_use]
pub fn locate(search: &str, content: &str, config: &MatchConfig) -> Option<Anchor> {
    if search.is_empty() {
        return None;
    }
    if let Some(start) = content.find(search) {
        return Some(Anchor {
            start,
            end: start + search.len(),
            similarity: 1.0,
            kind: MatchKind::Exact,
        });
    }
    if !config.fuzzy {
        return None;
    }
    best_window(search, content, config.cutoff)
}

/// Best trimmed line window of `n-1`, `n` or `n+1` lines scoring at least `cutoff`.
///
/// Ties keep the earliest window.
fn best_window(search: &str, content: &str, cutoff: f64) -> Option<Anchor> {
    let spans = line_spans(content);
    if spans.is_empty() {
        return None;
    }

    let search_lines = search.lines().count().max(1);
    let search_len = search.chars().count();
    let search_counts = char_counts(search);

    let mut best: Option<Anchor> = None;
    for size in [search_lines.saturating_sub(1), search_lines, search_lines + 1] {
        if size == 0 || size > spans.len() {
            continue;
        }
        for first in 0..=spans.len() - size {
            let start = spans[first].0;
            let end = spans[first + size - 1].1;
            let window = &content[start..end];
            let trimmed = window.trim();
            if trimmed.is_empty() {
                continue;
            }

            let floor = best.map_or(cutoff, |b| b.similarity.max(cutoff));
            if length_bound(search_len, trimmed.chars().count()) < floor
                || multiset_bound(&search_counts, search_len, trimmed) < floor
            {
                continue;
            }

            let ratio = similarity_ratio(search, trimmed);
            let better = best.is_none_or(|b| ratio > b.similarity);
            if ratio >= cutoff && better {
                let lead = window.len() - window.trim_start().len();
                best = Some(Anchor {
                    start: start + lead,
                    end: start + lead + trimmed.len(),
                    similarity: ratio,
                    kind: MatchKind::Fuzzy,
                });
            }
        }
    }
    best
}
