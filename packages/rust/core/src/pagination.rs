//! Pagination engine.
//!
//! Derives capacity-bounded pages from chapter text. The capacity itself is
//! unknowable here — it depends on the rendering surface — so it is injected
//! as a [`CapacityProbe`]. Production binds the probe to a real terminal;
//! tests use a deterministic character budget.
//!
//! The whole page sequence is recomputed from scratch whenever the chapter
//! data or the probe's measurement context changes. Identical inputs produce
//! an identical page sequence.

use crate::assembler::Chapter;

/// A derived, capacity-bounded slice of a chapter's text. Never persisted,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Chapter this page belongs to.
    pub chapter_no: u32,
    /// Chapter title (rendered as a heading block on the first page).
    pub title: String,
    /// The page's prose.
    pub text: String,
    /// True for the first page of a chapter.
    pub is_chapter_start: bool,
}

/// The conceptual chapter heading block rendered above a chapter's first page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChapterHeading<'a> {
    pub chapter_no: u32,
    pub title: &'a str,
}

/// Candidate content handed to the capacity probe.
#[derive(Debug, Clone, Copy)]
pub struct PageContent<'a> {
    /// Present while probing a chapter's first page.
    pub heading: Option<ChapterHeading<'a>>,
    /// Candidate body text.
    pub body: &'a str,
}

/// Injected predicate reporting whether content fits the current rendering
/// bounds. Implementations must be monotonic in content length: adding words
/// to content that already does not fit must not make it fit. The pagination
/// loop's termination argument relies on this.
pub trait CapacityProbe {
    fn fits(&self, content: &PageContent<'_>) -> bool;
}

/// Derive the full page sequence for all chapters, in chapter order.
///
/// Per chapter: whitespace-split words are packed greedily; a word is never
/// split. When a candidate no longer fits, the buffer before it becomes a
/// completed page. A single word that alone exceeds capacity is emitted as a
/// one-word page so the loop always makes forward progress. A chapter with
/// no words produces no pages.
pub fn paginate(chapters: &[Chapter], probe: &dyn CapacityProbe) -> Vec<Page> {
    let mut pages = Vec::new();
    for chapter in chapters {
        paginate_chapter(chapter, probe, &mut pages);
    }
    pages
}

fn paginate_chapter(chapter: &Chapter, probe: &dyn CapacityProbe, out: &mut Vec<Page>) {
    let text = chapter.text();
    let mut buffer = String::new();
    let mut is_chapter_start = true;

    for word in text.split_whitespace() {
        let candidate = if buffer.is_empty() {
            word.to_string()
        } else {
            format!("{buffer} {word}")
        };

        let content = PageContent {
            heading: is_chapter_start.then_some(ChapterHeading {
                chapter_no: chapter.chapter_no,
                title: &chapter.title,
            }),
            body: &candidate,
        };

        if probe.fits(&content) {
            buffer = candidate;
        } else if buffer.is_empty() {
            // The word alone exceeds capacity: commit it as a one-word page
            // rather than looping on it forever.
            out.push(make_page(chapter, word.to_string(), is_chapter_start));
            is_chapter_start = false;
        } else {
            out.push(make_page(
                chapter,
                std::mem::take(&mut buffer),
                is_chapter_start,
            ));
            is_chapter_start = false;
            buffer.push_str(word);
        }
    }

    if !buffer.is_empty() {
        out.push(make_page(chapter, buffer, is_chapter_start));
    }
}

fn make_page(chapter: &Chapter, text: String, is_chapter_start: bool) -> Page {
    Page {
        chapter_no: chapter.chapter_no,
        title: chapter.title.clone(),
        text,
        is_chapter_start,
    }
}

// ---------------------------------------------------------------------------
// Character-budget probe
// ---------------------------------------------------------------------------

/// Deterministic probe counting characters against a fixed budget.
///
/// The heading block costs its title plus the `Chapter {n}` label. Monotonic
/// in content length by construction. Used by tests and headless callers.
#[derive(Debug, Clone, Copy)]
pub struct CharBudgetProbe {
    /// Maximum number of characters a page may hold.
    pub max_chars: usize,
}

impl CapacityProbe for CharBudgetProbe {
    fn fits(&self, content: &PageContent<'_>) -> bool {
        let heading_cost = content
            .heading
            .map(|h| h.title.chars().count() + format!("Chapter {}", h.chapter_no).len())
            .unwrap_or(0);
        heading_cost + content.body.chars().count() <= self.max_chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storyloom_shared::{BookId, Segment};

    fn chapter(chapter_no: u32, text: &str) -> Chapter {
        Chapter {
            chapter_no,
            title: format!("Chapter {chapter_no}"),
            segments: vec![Segment {
                id: format!("seg-{chapter_no}"),
                book_id: BookId(uuid::Uuid::nil()),
                chapter_no,
                sequence_no: chapter_no as u64,
                title: format!("Chapter {chapter_no}"),
                text: text.into(),
                author_id: "tester".into(),
                created_at: Utc::now(),
            }],
        }
    }

    fn probe(max_chars: usize) -> CharBudgetProbe {
        CharBudgetProbe { max_chars }
    }

    #[test]
    fn chapter_fitting_one_page_yields_single_start_page() {
        let chapters = vec![chapter(1, "a short chapter")];
        let pages = paginate(&chapters, &probe(200));

        assert_eq!(pages.len(), 1);
        assert!(pages[0].is_chapter_start);
        assert_eq!(pages[0].text, "a short chapter");
        assert_eq!(pages[0].chapter_no, 1);
    }

    #[test]
    fn empty_chapter_yields_no_pages() {
        let chapters = vec![chapter(1, "   ")];
        assert!(paginate(&chapters, &probe(100)).is_empty());
    }

    #[test]
    fn heading_consumes_capacity_only_on_first_page() {
        // Budget leaves little room once the heading is counted, so the
        // first page holds fewer words than the later ones.
        let chapters = vec![chapter(1, "one two three four five six seven eight")];
        let pages = paginate(&chapters, &probe(30));

        assert!(pages.len() > 1);
        assert!(pages[0].is_chapter_start);
        assert!(pages[1..].iter().all(|p| !p.is_chapter_start));
        assert!(pages[0].text.len() < pages[1].text.len());
    }

    #[test]
    fn oversized_word_becomes_one_word_page() {
        let long_word = "a".repeat(50);
        let text = format!("tiny {long_word} words");
        let chapters = vec![chapter(1, &text)];

        let pages = paginate(&chapters, &probe(20));
        assert!(pages.iter().any(|p| p.text == long_word));
        // Round-trip still holds: nothing dropped.
        let rejoined: Vec<&str> = pages.iter().flat_map(|p| p.text.split_whitespace()).collect();
        assert_eq!(rejoined, vec!["tiny", long_word.as_str(), "words"]);
    }

    #[test]
    fn oversized_word_as_entire_chapter_terminates() {
        let long_word = "b".repeat(100);
        let chapters = vec![chapter(1, &long_word)];

        let pages = paginate(&chapters, &probe(10));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, long_word);
        assert!(pages[0].is_chapter_start);
    }

    #[test]
    fn round_trip_preserves_every_word_in_order() {
        let text = "It was a dark and stormy night; the rain fell in torrents \
                    except at occasional intervals when it was checked by a \
                    violent gust of wind which swept up the streets";
        let chapters = vec![chapter(1, text)];

        let pages = paginate(&chapters, &probe(40));
        let rejoined: Vec<&str> = pages.iter().flat_map(|p| p.text.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn chapters_paginate_independently_in_order() {
        let chapters = vec![chapter(1, "alpha beta gamma"), chapter(2, "delta epsilon")];
        let pages = paginate(&chapters, &probe(200));

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].chapter_no, 1);
        assert_eq!(pages[1].chapter_no, 2);
        assert!(pages[1].is_chapter_start);
    }

    #[test]
    fn idempotent_for_identical_inputs() {
        let chapters = vec![chapter(1, "the same text every time, word for word")];
        let p = probe(25);
        assert_eq!(paginate(&chapters, &p), paginate(&chapters, &p));
    }
}
