//! Core domain logic for Storyloom.
//!
//! This crate holds the four components that make a growing book behave:
//! the chapter assembler (flat segments → ordered chapters), the generation
//! session controller (one streamed inference call, committed under the
//! book's ordering invariants), the pagination engine (chapter text →
//! capacity-bounded pages), and the navigation controller (timed page
//! turns). Persistence and inference are reached only through the trait
//! seams in [`session`], so everything here is testable with in-memory
//! fakes.

// Collaborator traits are consumed via static dispatch within this
// workspace; dyn compatibility is not needed.
#![allow(async_fn_in_trait)]

pub mod assembler;
pub mod navigation;
pub mod pagination;
pub mod session;

pub use assembler::{Chapter, assemble};
pub use navigation::{NavCommand, NavState, Navigator, PageTurn};
pub use pagination::{CapacityProbe, CharBudgetProbe, ChapterHeading, Page, PageContent, paginate};
pub use session::{
    ChapterChoice, DeltaStream, GenerationOutcome, GenerationRequest, Placement, RecordStore,
    SegmentStore, SessionController, TextGenerator, plan_placement,
};
