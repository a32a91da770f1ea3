//! Rendering fused results into a bounded prompt context.

use serde::Serialize;

use crate::retrieval::core::candidate::Candidate;
use crate::retrieval::core::kinds::RetrievalSource;
use crate::retrieval::fusion::rrf::FusedResult;
use crate::retrieval::text::keywords::extract_keywords;

/// Separator between rendered parts.
pub const PART_SEPARATOR: &str = "\n\n---\n\n";
const ELLIPSIS: &str = "...";
const ELLIPSIS_CHARS: usize = 3;

/// Character budgets applied while formatting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextBudget {
    /// Cap per candidate content.
    pub max_chunk_length: usize,
    /// Cap on the whole context.
    pub max_context_length: usize,
}

/// Formatting statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    /// Passages emitted.
    pub chunk_count: usize,
    /// Glossary entries emitted.
    pub dict_count: usize,
    /// Mean emitted passage length, in chars.
    pub avg_chunk_len: usize,
    /// Mean emitted glossary entry length, in chars.
    pub avg_dict_len: usize,
    /// Longest emitted content, in chars.
    pub max_len: usize,
    /// Label of the longest emitted content.
    pub max_source: String,
    /// Emitted contents that were shortened to the per-candidate cap.
    pub truncated_count: usize,
    /// Candidates left out by the global cap.
    pub dropped_count: usize,
    /// Length of the emitted context, in chars.
    pub total_len: usize,
    /// Input was non-empty but nothing fit.
    pub budget_exhausted: bool,
}

/// One cited document volume.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceInfo {
    /// Document identifier.
    pub document_id: String,
    /// Document title.
    pub title: String,
    /// Volume.
    pub volume: u32,
    /// Retrievers that surfaced this volume, in first-seen order.
    pub retrieval_methods: Vec<RetrievalSource>,
    /// Backend score of the first passage seen.
    pub similarity: Option<f64>,
}

/// Rendered context with its statistics and citations.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FormattedContext {
    /// Parts joined by [`PART_SEPARATOR`].
    pub text: String,
    /// Formatting statistics.
    pub stats: ContextStats,
    /// Cited document volumes.
    pub sources: Vec<SourceInfo>,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn char_slice(chars: &[char], start: usize, end: usize) -> String {
    chars[start..end].iter().collect()
}

/// Shorten `content` to at most `cap` chars, centering the window on the
/// first keyword that occurs.
#[must_use]
pub fn smart_truncate(content: &str, cap: usize, keywords: &[String]) -> String {
    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();
    if len <= cap {
        return content.to_string();
    }
    if cap <= 2 * ELLIPSIS_CHARS {
        return char_slice(&chars, 0, cap);
    }

    if keywords.is_empty() {
        let inner = cap - 2 * ELLIPSIS_CHARS;
        let start = (len - inner) / 2;
        return format!("{ELLIPSIS}{}{ELLIPSIS}", char_slice(&chars, start, start + inner));
    }

    let center = keywords.iter().find_map(|keyword| {
        content
            .find(keyword.as_str())
            .map(|byte| char_len(&content[..byte]) + char_len(keyword) / 2)
    });
    let Some(center) = center else {
        return format!("{}{ELLIPSIS}", char_slice(&chars, 0, cap - ELLIPSIS_CHARS));
    };

    let window_end = (center.saturating_sub(cap / 2) + cap).min(len);
    let (mut start, mut end) = (window_end - cap, window_end);
    let clipped_left = start > 0;
    let clipped_right = end < len;
    if clipped_left {
        start += ELLIPSIS_CHARS;
    }
    if clipped_right {
        end -= ELLIPSIS_CHARS;
    }

    let mut window = String::with_capacity(cap * 4);
    if clipped_left {
        window.push_str(ELLIPSIS);
    }
    window.push_str(&char_slice(&chars, start, end));
    if clipped_right {
        window.push_str(ELLIPSIS);
    }
    window
}

fn source_tag(result: &FusedResult) -> &'static str {
    if result.is_multi_hit() {
        return "[多路命中]";
    }
    match result.sources.iter().next() {
        Some(RetrievalSource::Semantic) => "[语义匹配]",
        Some(RetrievalSource::Fulltext) => "[关键词匹配]",
        Some(RetrievalSource::Dictionary) | None => "[词典]",
    }
}

/// Render `results` in ranked order under `budget`.
///
/// Parts are appended while they fit; the first part that would overflow the
/// global cap is dropped together with every part after it.
#[must_use]
pub fn format_context(
    results: &[FusedResult],
    question: &str,
    budget: ContextBudget,
) -> FormattedContext {
    let keywords = extract_keywords(question);
    let separator_len = char_len(PART_SEPARATOR);

    let mut parts: Vec<String> = Vec::new();
    let mut stats = ContextStats::default();
    let (mut chunk_total, mut dict_total) = (0_usize, 0_usize);

    for (position, result) in results.iter().enumerate() {
        let original = result.candidate.content();
        let content = smart_truncate(original, budget.max_chunk_length, &keywords);
        let truncated = content.len() != original.len();
        let content_len = char_len(&content);
        let tag = source_tag(result);

        let (part, label) = match &result.candidate {
            Candidate::GlossaryEntry(entry) => (
                format!("【词典】{content} {tag}"),
                format!("词典:{}", entry.term),
            ),
            Candidate::Passage(passage) => (
                format!(
                    "【经文】《{}》卷{} ({}) {tag}\n{content}",
                    passage.title, passage.volume, passage.document_id
                ),
                format!("{}:卷{}", passage.title, passage.volume),
            ),
        };

        let added = char_len(&part) + if parts.is_empty() { 0 } else { separator_len };
        if stats.total_len + added > budget.max_context_length {
            stats.dropped_count = results.len() - position;
            break;
        }
        stats.total_len += added;
        parts.push(part);

        match result.candidate {
            Candidate::GlossaryEntry(_) => {
                stats.dict_count += 1;
                dict_total += content_len;
            }
            Candidate::Passage(_) => {
                stats.chunk_count += 1;
                chunk_total += content_len;
            }
        }
        if truncated {
            stats.truncated_count += 1;
        }
        if content_len > stats.max_len {
            stats.max_len = content_len;
            stats.max_source = label;
        }
    }

    stats.avg_chunk_len = rounded_mean(chunk_total, stats.chunk_count);
    stats.avg_dict_len = rounded_mean(dict_total, stats.dict_count);
    stats.budget_exhausted = !results.is_empty() && parts.is_empty();

    FormattedContext {
        text: parts.join(PART_SEPARATOR),
        stats,
        sources: collect_sources(results),
    }
}

const fn rounded_mean(total: usize, count: usize) -> usize {
    match (total + count / 2).checked_div(count) {
        Some(mean) => mean,
        None => 0,
    }
}

/// One [`SourceInfo`] per cited document volume, in ranked order.
#[must_use]
pub fn collect_sources(results: &[FusedResult]) -> Vec<SourceInfo> {
    let mut sources: Vec<SourceInfo> = Vec::new();
    for result in results {
        let Some(passage) = result.candidate.as_passage() else {
            continue;
        };
        let existing = sources.iter_mut().find(|source| {
            source.document_id == passage.document_id && source.volume == passage.volume
        });
        match existing {
            Some(source) => {
                for method in &result.sources {
                    if !source.retrieval_methods.contains(method) {
                        source.retrieval_methods.push(*method);
                    }
                }
            }
            None => sources.push(SourceInfo {
                document_id: passage.document_id.clone(),
                title: passage.title.clone(),
                volume: passage.volume,
                retrieval_methods: result.sources.iter().copied().collect(),
                similarity: passage.score,
            }),
        }
    }
    sources
}
