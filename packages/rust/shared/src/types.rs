//! Core domain types for Storyloom books.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoryloomError};

// ---------------------------------------------------------------------------
// BookId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for book identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub Uuid);

impl BookId {
    /// Generate a new time-sortable book identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// A book record as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Unique book identifier.
    pub id: BookId,
    /// Human-readable title.
    pub title: String,
    /// Identity of the book's author.
    pub author_id: String,
    /// When the book was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One committed unit of generated prose.
///
/// `sequence_no` is strictly increasing in commit order across the whole
/// book — it is never reset per chapter. Segments are immutable once
/// committed and are never deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Unique segment identifier (UUID v7).
    pub id: String,
    /// Owning book.
    pub book_id: BookId,
    /// Chapter assignment (1-based).
    pub chapter_no: u32,
    /// Book-wide commit position (1-based).
    pub sequence_no: u64,
    /// Chapter title carried by this segment.
    pub title: String,
    /// The prose text.
    pub text: String,
    /// Identity of the requesting author.
    pub author_id: String,
    /// When the segment was committed.
    pub created_at: DateTime<Utc>,
}

/// A segment about to be committed; the store assigns nothing — all
/// placement fields are decided by the session controller.
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub book_id: BookId,
    pub chapter_no: u32,
    pub sequence_no: u64,
    pub title: String,
    pub text: String,
    pub author_id: String,
}

// ---------------------------------------------------------------------------
// Sampling parameters
// ---------------------------------------------------------------------------

/// Sampling parameters for one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Top-K mass, normalized to `[0, 1]`.
    #[serde(default = "default_top_k")]
    pub top_k: f64,
    /// Nucleus sampling threshold, `[0, 1]`.
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Minimum probability cutoff, `[0, 1]`.
    #[serde(default = "default_min_p")]
    pub min_p: f64,
    /// Softmax temperature, `[0, 2]`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Repetition penalty, `[0, 10]`.
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_p: default_top_p(),
            min_p: default_min_p(),
            temperature: default_temperature(),
            repeat_penalty: default_repeat_penalty(),
        }
    }
}

fn default_top_k() -> f64 {
    0.0
}
fn default_top_p() -> f64 {
    0.9
}
fn default_min_p() -> f64 {
    0.0
}
fn default_temperature() -> f64 {
    0.8
}
fn default_repeat_penalty() -> f64 {
    1.1
}

impl SamplingParams {
    /// Check every parameter against its allowed range.
    pub fn validate(&self) -> Result<()> {
        check_range("top_k", self.top_k, 0.0, 1.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("min_p", self.min_p, 0.0, 1.0)?;
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("repeat_penalty", self.repeat_penalty, 0.0, 10.0)?;
        Ok(())
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(StoryloomError::validation(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )))
    }
}

// ---------------------------------------------------------------------------
// GenerationRecord
// ---------------------------------------------------------------------------

/// Append-only audit entry for one generation session.
///
/// Written best-effort after the segment commit; a failed record write is a
/// logged anomaly and never invalidates the committed segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Unique record identifier (UUID v7).
    pub id: String,
    /// Owning book.
    pub book_id: BookId,
    /// Model identifier the session ran against.
    pub model: String,
    /// System prompt sent with the request.
    pub system_prompt: String,
    /// User prompt sent with the request.
    pub user_prompt: String,
    /// Sampling parameters used.
    pub params: SamplingParams,
    /// Identity of the requesting author.
    pub author_id: String,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

/// A generation record about to be written.
#[derive(Debug, Clone)]
pub struct NewGenerationRecord {
    pub book_id: BookId,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub params: SamplingParams,
    pub author_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_id_roundtrip() {
        let id = BookId::new();
        let s = id.to_string();
        let parsed: BookId = s.parse().expect("parse BookId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn segment_serialization() {
        let segment = Segment {
            id: Uuid::now_v7().to_string(),
            book_id: BookId::new(),
            chapter_no: 2,
            sequence_no: 7,
            title: "Chapter 2".into(),
            text: "The rain had not stopped for three days.".into(),
            author_id: "author-1".into(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&segment).expect("serialize");
        let parsed: Segment = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, segment);
    }

    #[test]
    fn default_sampling_params_are_valid() {
        SamplingParams::default().validate().expect("defaults valid");
    }

    #[test]
    fn sampling_params_range_checks() {
        let mut params = SamplingParams::default();
        params.temperature = 2.0;
        assert!(params.validate().is_ok());

        params.temperature = 2.1;
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));

        params.temperature = 0.8;
        params.repeat_penalty = -0.5;
        assert!(params.validate().is_err());

        params.repeat_penalty = f64::NAN;
        assert!(params.validate().is_err());
    }
}
