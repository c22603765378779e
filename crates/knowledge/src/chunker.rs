//! Token-budgeted text chunking with overlap.
//!
//! [`chunk_text`] packs plain text. [`chunk_sections`] first splits a
//! structured document at its headings and chunks each section on its own,
//! so no chunk straddles two sections.

use crate::tokens::TokenCounter;
use regex::Regex;
use std::sync::LazyLock;

static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})(?:\s|$)").expect("markdown heading pattern"));

/// `1. Intro`, `2.1 Setup`, `3.1.4. Details`
static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)+\.?|\d+\.)\s+\S").expect("numbered heading pattern")
});

/// `一、概述`
static CJK_CHAPTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[一二三四五六七八九十]+、").expect("chapter pattern"));

/// `（一）背景`, `(二) 目标`
static CJK_SUBCHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[（(]?[一二三四五六七八九十]+[）)]").expect("subchapter pattern")
});

/// Chunk sizing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Token budget per chunk; 0 disables chunking
    pub max_tokens: usize,

    /// Token budget of the tail carried into the next chunk
    pub overlap_tokens: usize,
}

impl ChunkOptions {
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
        }
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self::new(512, 50)
    }
}

/// Split text into overlapping, token-budgeted chunks of whole words.
///
/// Words are packed greedily. When the next word would overflow the budget
/// the chunk is closed and the next one starts with the closed chunk's tail
/// (at most `overlap_tokens`). The tail is shortened further when it would
/// leave no room for the next word, so a chunk only exceeds `max_tokens`
/// when it consists of a single oversized word.
///
/// Empty and whitespace-only text yield no chunks rather than one blank
/// chunk, so nothing without words is ever embedded. `max_tokens == 0`
/// yields the text unchanged as the only chunk.
pub fn chunk_text(
    text: &str,
    options: ChunkOptions,
    counter: &dyn TokenCounter,
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if options.max_tokens == 0 {
        return vec![text.to_string()];
    }

    let words: Vec<(&str, usize)> = text
        .split_whitespace()
        .map(|word| (word, counter.count(word)))
        .collect();

    let mut chunks = Vec::new();
    let mut current: Vec<(&str, usize)> = Vec::new();
    let mut current_cost = 0usize;

    for &(word, cost) in &words {
        if !current.is_empty() && current_cost + cost > options.max_tokens {
            chunks.push(join_words(&current));

            let mut tail = overlap_tail(&current, options.overlap_tokens);
            let mut tail_cost: usize = tail.iter().map(|(_, c)| c).sum();
            while !tail.is_empty() && tail_cost + cost > options.max_tokens {
                let (_, dropped) = tail.remove(0);
                tail_cost -= dropped;
            }

            current = tail;
            current_cost = tail_cost;
        }

        current.push((word, cost));
        current_cost += cost;
    }

    if !current.is_empty() {
        chunks.push(join_words(&current));
    }

    tracing::trace!("Split {} words into {} chunks", words.len(), chunks.len());
    chunks
}

/// Trailing words of `chunk` whose total cost stays within `budget`.
fn overlap_tail<'a>(chunk: &[(&'a str, usize)], budget: usize) -> Vec<(&'a str, usize)> {
    let mut cost = 0usize;
    let mut start = chunk.len();
    for (i, &(_, word_cost)) in chunk.iter().enumerate().rev() {
        if cost + word_cost > budget {
            break;
        }
        cost += word_cost;
        start = i;
    }
    chunk[start..].to_vec()
}

fn join_words(words: &[(&str, usize)]) -> String {
    words
        .iter()
        .map(|(word, _)| *word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heading level of a line, or 0 when it is body text.
///
/// Recognized styles:
/// - Markdown `#` to `######` followed by a space
/// - dotted numbering, one level per number (`1.` is 1, `2.1` is 2)
/// - CJK chapters `一、` (1) and parenthesized `（一）` (2)
pub fn heading_level(line: &str) -> usize {
    let line = line.trim();

    if let Some(caps) = MARKDOWN_HEADING.captures(line) {
        return caps[1].len();
    }
    if let Some(caps) = NUMBERED_HEADING.captures(line) {
        return caps[1]
            .split('.')
            .filter(|part| !part.is_empty())
            .count();
    }
    if CJK_CHAPTER.is_match(line) {
        return 1;
    }
    if CJK_SUBCHAPTER.is_match(line) {
        return 2;
    }
    0
}

/// A heading and the lines up to the next heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading line that opened the section; `None` for leading body text
    pub heading: Option<String>,

    /// Heading level, 0 for leading body text
    pub level: usize,

    /// Heading line followed by the section's non-blank lines
    pub content: String,
}

impl Section {
    /// `"heading"` for headed sections, `"text"` otherwise.
    pub fn section_type(&self) -> &'static str {
        if self.heading.is_some() {
            "heading"
        } else {
            "text"
        }
    }
}

/// Split text at heading lines. Blank lines are dropped.
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        heading: None,
        level: 0,
        content: String::new(),
    };

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let level = heading_level(line);
        if level > 0 {
            if !current.content.is_empty() {
                sections.push(current);
            }
            current = Section {
                heading: Some(line.to_string()),
                level,
                content: line.to_string(),
            };
        } else {
            if !current.content.is_empty() {
                current.content.push('\n');
            }
            current.content.push_str(line);
        }
    }

    if !current.content.is_empty() {
        sections.push(current);
    }
    sections
}

/// One chunk of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionChunk {
    pub content: String,
    pub heading: Option<String>,
    pub level: usize,
    pub section_type: &'static str,
}

/// Split at headings, then chunk each section with [`chunk_text`].
pub fn chunk_sections(
    text: &str,
    options: ChunkOptions,
    counter: &dyn TokenCounter,
) -> Vec<SectionChunk> {
    let sections = split_sections(text);
    let mut chunks = Vec::new();

    for section in &sections {
        for content in chunk_text(&section.content, options, counter) {
            chunks.push(SectionChunk {
                content,
                heading: section.heading.clone(),
                level: section.level,
                section_type: section.section_type(),
            });
        }
    }

    tracing::trace!(
        "Split {} sections into {} chunks",
        sections.len(),
        chunks.len()
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{HeuristicCounter, WordCounter};

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", ChunkOptions::new(10, 2), &WordCounter).is_empty());
    }

    #[test]
    fn test_zero_budget_returns_whole_text() {
        let text = "  keep   spacing as is ";
        assert_eq!(
            chunk_text(text, ChunkOptions::new(0, 5), &WordCounter),
            vec![text.to_string()]
        );
    }

    #[test]
    fn test_word_budget_with_overlap() {
        let chunks = chunk_text("a b c d e", ChunkOptions::new(2, 1), &WordCounter);
        assert_eq!(chunks, vec!["a b", "b c", "c d", "d e"]);
    }

    #[test]
    fn test_no_overlap() {
        let chunks = chunk_text("a b c d e", ChunkOptions::new(2, 0), &WordCounter);
        assert_eq!(chunks, vec!["a b", "c d", "e"]);
    }

    #[test]
    fn test_wider_overlap() {
        let chunks = chunk_text("a b c d e f", ChunkOptions::new(4, 2), &WordCounter);
        assert_eq!(chunks, vec!["a b c d", "c d e f"]);
    }

    #[test]
    fn test_overlap_shrinks_to_fit_budget() {
        // Overlap as large as the budget would otherwise stall
        let chunks = chunk_text("a b c d", ChunkOptions::new(2, 5), &WordCounter);
        assert_eq!(chunks, vec!["a b", "b c", "c d"]);
    }

    #[test]
    fn test_oversized_word_stands_alone() {
        let long = "x".repeat(40);
        let text = format!("ab {} cd", long);
        let chunks = chunk_text(&text, ChunkOptions::new(4, 1), &HeuristicCounter);
        assert_eq!(chunks, vec!["ab".to_string(), long, "cd".to_string()]);
    }

    #[test]
    fn test_whitespace_only_text() {
        assert!(chunk_text(" \n\t ", ChunkOptions::new(4, 1), &WordCounter).is_empty());
    }

    #[test]
    fn test_single_chunk_when_under_budget() {
        let chunks = chunk_text("short text\nhere", ChunkOptions::default(), &HeuristicCounter);
        assert_eq!(chunks, vec!["short text here"]);
    }

    #[test]
    fn test_heading_levels() {
        assert_eq!(heading_level("# Title"), 1);
        assert_eq!(heading_level("### Deep"), 3);
        assert_eq!(heading_level("#hashtag"), 0);
        assert_eq!(heading_level("####### too deep"), 0);

        assert_eq!(heading_level("1. Introduction"), 1);
        assert_eq!(heading_level("2.1 Setup"), 2);
        assert_eq!(heading_level("3.1.4. Details"), 3);
        assert_eq!(heading_level("2024 was a year"), 0);
        assert_eq!(heading_level("3.14"), 0);

        assert_eq!(heading_level("一、概述"), 1);
        assert_eq!(heading_level("（二）目标"), 2);
        assert_eq!(heading_level("(三) 方法"), 2);

        assert_eq!(heading_level("plain sentence."), 0);
    }

    #[test]
    fn test_split_sections() {
        let text = "preface line\n\n# Ownership\nmoves values\n\n## Borrowing\nshares them\n";
        let sections = split_sections(text);

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].heading, None);
        assert_eq!(sections[0].level, 0);
        assert_eq!(sections[0].section_type(), "text");
        assert_eq!(sections[0].content, "preface line");

        assert_eq!(sections[1].heading.as_deref(), Some("# Ownership"));
        assert_eq!(sections[1].level, 1);
        assert_eq!(sections[1].content, "# Ownership\nmoves values");

        assert_eq!(sections[2].level, 2);
        assert_eq!(sections[2].section_type(), "heading");
    }

    #[test]
    fn test_split_sections_without_headings() {
        let sections = split_sections("just\nbody text");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "just\nbody text");
        assert!(split_sections(" \n\n ").is_empty());
    }

    #[test]
    fn test_chunks_never_straddle_sections() {
        let text = "# A\none two three four\n# B\nfive";
        let chunks = chunk_sections(text, ChunkOptions::new(3, 1), &WordCounter);

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["# A one", "one two three", "three four", "# B five"]);
        assert!(chunks[..3].iter().all(|c| c.heading.as_deref() == Some("# A")));
        assert_eq!(chunks[3].level, 1);
        assert_eq!(chunks[3].section_type, "heading");
    }
}
