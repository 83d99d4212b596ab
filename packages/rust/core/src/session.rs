//! Generation session controller.
//!
//! Orchestrates one streamed generation call: validates the request, decides
//! placement (chapter and sequence number) once at session start, streams
//! deltas into a draft with live preview, and commits the result as a single
//! segment followed by a best-effort audit record and a full reload.
//!
//! At most one session may be active per book view at a time. The controller
//! does not enforce this — it is a documented caller obligation, tracked by
//! the caller's "generation in progress" flag.

use tracing::{info, instrument, warn};

use storyloom_shared::{
    BookId, NewGenerationRecord, NewSegment, Result, SamplingParams, Segment, StoryloomError,
};

use crate::assembler::{Chapter, assemble};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Durable ordered storage of segments. Implemented by the libSQL store;
/// tests substitute an in-memory fake.
pub trait SegmentStore {
    /// Fetch every segment of a book. The return order is unspecified.
    async fn fetch_segments(&self, book_id: &BookId) -> Result<Vec<Segment>>;

    /// Append one committed segment.
    async fn insert_segment(&self, segment: &NewSegment) -> Result<()>;
}

/// Append-only store for generation audit records.
pub trait RecordStore {
    async fn insert_record(&self, record: &NewGenerationRecord) -> Result<()>;
}

/// A source of incremental generated text.
pub trait TextGenerator {
    type Stream: DeltaStream;

    /// Start one streamed generation call.
    async fn start(&self, request: &GenerationRequest) -> Result<Self::Stream>;
}

/// A cancellable asynchronous sequence of content deltas. Yields `None` when
/// the stream completed; dropping the stream cancels it. There is no other
/// cancellation primitive: once started, the caller awaits completion or
/// failure.
pub trait DeltaStream {
    async fn next_delta(&mut self) -> Option<Result<String>>;
}

// ---------------------------------------------------------------------------
// Request / placement types
// ---------------------------------------------------------------------------

/// One generation request as issued by the user.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub model: String,
    pub params: SamplingParams,
}

/// The user's chapter decision for this session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChapterChoice {
    /// Open a new chapter instead of continuing an existing one.
    pub new_chapter: bool,
    /// Chapter to continue when `new_chapter` is false.
    pub current_chapter: Option<u32>,
}

/// Placement decided once at session start from the latest segment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub chapter_no: u32,
    pub sequence_no: u64,
    pub title: String,
}

/// Decide where the session's segment will land.
///
/// The sequence number is book-wide: one past the highest committed
/// `sequence_no` regardless of chapter. A new chapter gets one past the
/// highest chapter number and a synthesized title; a continued chapter
/// reuses its existing title when it has one.
pub fn plan_placement(segments: &[Segment], choice: &ChapterChoice) -> Placement {
    let max_chapter_no = segments.iter().map(|s| s.chapter_no).max().unwrap_or(0);
    let max_sequence_no = segments.iter().map(|s| s.sequence_no).max().unwrap_or(0);

    let chapter_no = if choice.new_chapter {
        max_chapter_no + 1
    } else {
        match choice.current_chapter {
            Some(n) if n >= 1 => n,
            _ => 1,
        }
    };

    let title = if choice.new_chapter {
        format!("Chapter {chapter_no}")
    } else {
        segments
            .iter()
            .filter(|s| s.chapter_no == chapter_no)
            .min_by_key(|s| s.sequence_no)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| format!("Chapter {chapter_no}"))
    };

    Placement {
        chapter_no,
        sequence_no: max_sequence_no + 1,
        title,
    }
}

// ---------------------------------------------------------------------------
// Session controller
// ---------------------------------------------------------------------------

/// Result of a completed generation session.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// The committed segment.
    pub segment: Segment,
    /// Chapters re-derived from the reloaded segment list.
    pub chapters: Vec<Chapter>,
    /// False when the best-effort audit record write failed.
    pub record_persisted: bool,
}

/// Runs generation sessions for one book.
pub struct SessionController<'a, S, R> {
    segments: &'a S,
    records: &'a R,
    book_id: BookId,
    author_id: String,
}

impl<'a, S, R> SessionController<'a, S, R>
where
    S: SegmentStore,
    R: RecordStore,
{
    pub fn new(segments: &'a S, records: &'a R, book_id: BookId, author_id: String) -> Self {
        Self {
            segments,
            records,
            book_id,
            author_id,
        }
    }

    /// Run one streamed generation session to completion.
    ///
    /// Each delta is appended to the draft and surfaced through `on_delta`
    /// for live preview before anything is committed. On any failure after
    /// streaming began the draft is discarded; the view must never show a
    /// draft that is neither confirmed persisted state nor actively
    /// streaming. A successful commit is followed by a full reload and
    /// reassembly rather than patching in-memory state.
    #[instrument(skip_all, fields(book_id = %self.book_id, model = %request.model))]
    pub async fn run<G>(
        &self,
        generator: &G,
        request: &GenerationRequest,
        choice: ChapterChoice,
        mut on_delta: impl FnMut(&str),
    ) -> Result<GenerationOutcome>
    where
        G: TextGenerator,
    {
        // Reject before any session state exists.
        if request.prompt.trim().is_empty() {
            return Err(StoryloomError::validation("prompt must not be empty"));
        }
        request.params.validate()?;

        // Placement is evaluated once, from the latest known segment list.
        let known = self.segments.fetch_segments(&self.book_id).await?;
        let placement = plan_placement(&known, &choice);
        info!(
            chapter_no = placement.chapter_no,
            sequence_no = placement.sequence_no,
            new_chapter = choice.new_chapter,
            "session started"
        );

        // Stream the draft. A mid-stream failure discards it entirely;
        // no delta is persisted individually.
        let mut stream = generator
            .start(request)
            .await
            .map_err(|e| StoryloomError::Stream(e.to_string()))?;

        let mut draft = String::new();
        while let Some(delta) = stream.next_delta().await {
            match delta {
                Ok(chunk) => {
                    draft.push_str(&chunk);
                    on_delta(&chunk);
                }
                Err(e) => {
                    warn!(error = %e, received = draft.len(), "stream failed, discarding draft");
                    return Err(StoryloomError::Stream(e.to_string()));
                }
            }
        }

        // Commit exactly one segment.
        let new_segment = NewSegment {
            book_id: self.book_id.clone(),
            chapter_no: placement.chapter_no,
            sequence_no: placement.sequence_no,
            title: placement.title.clone(),
            text: draft,
            author_id: self.author_id.clone(),
        };
        self.segments
            .insert_segment(&new_segment)
            .await
            .map_err(|e| StoryloomError::Persistence(e.to_string()))?;

        // Best-effort audit record. Failure here is a logged anomaly, never
        // a rollback of the committed segment.
        let record = NewGenerationRecord {
            book_id: self.book_id.clone(),
            model: request.model.clone(),
            system_prompt: request.system_prompt.clone(),
            user_prompt: request.prompt.clone(),
            params: request.params,
            author_id: self.author_id.clone(),
        };
        let record_persisted = match self.records.insert_record(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "generation record write failed; segment commit stands");
                false
            }
        };

        // Reload and reassemble from the store rather than patching local
        // state, so the view cannot diverge from what was actually written.
        let refreshed = self
            .segments
            .fetch_segments(&self.book_id)
            .await
            .map_err(|e| StoryloomError::Refresh(e.to_string()))?;
        let chapters = assemble(&refreshed);

        let segment = refreshed
            .iter()
            .find(|s| s.sequence_no == placement.sequence_no)
            .cloned()
            .ok_or_else(|| {
                StoryloomError::Refresh("committed segment missing after reload".into())
            })?;

        info!(
            sequence_no = segment.sequence_no,
            chars = segment.text.len(),
            record_persisted,
            "session committed"
        );

        Ok(GenerationOutcome {
            segment,
            chapters,
            record_persisted,
        })
    }
}
