//! Chapter assembler.
//!
//! Derives the chapter tree from the flat segment list the store returns.
//! The derivation is stateless and recomputed on every read — there is no
//! mutable chapter tree to keep in sync with storage.

use std::collections::BTreeMap;

use storyloom_shared::Segment;

/// A derived grouping of segments sharing a chapter number.
///
/// Never persisted; rebuilt from the full segment list on every read.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// Chapter number (1-based).
    pub chapter_no: u32,
    /// Chapter title, taken from the chapter's first segment by sequence.
    pub title: String,
    /// Segments ordered by `sequence_no` ascending.
    pub segments: Vec<Segment>,
}

impl Chapter {
    /// The chapter's full prose: segment texts joined in sequence order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            if !out.is_empty() && !segment.text.is_empty() {
                out.push(' ');
            }
            out.push_str(&segment.text);
        }
        out
    }
}

/// Group a flat segment list into ordered chapters.
///
/// The store's return order is not trusted: segments are grouped by
/// `chapter_no`, each group sorted by `sequence_no` ascending, and groups
/// emitted by `chapter_no` ascending. Pure and deterministic — safe to call
/// on every read.
pub fn assemble(segments: &[Segment]) -> Vec<Chapter> {
    let mut groups: BTreeMap<u32, Vec<Segment>> = BTreeMap::new();
    for segment in segments {
        groups
            .entry(segment.chapter_no)
            .or_default()
            .push(segment.clone());
    }

    groups
        .into_iter()
        .map(|(chapter_no, mut group)| {
            group.sort_by_key(|s| s.sequence_no);
            Chapter {
                chapter_no,
                title: group[0].title.clone(),
                segments: group,
            }
        })
        .collect()
}
