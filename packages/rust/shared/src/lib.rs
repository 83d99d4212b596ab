//! Shared types, error model, and configuration for Storyloom.
//!
//! This crate is the foundation depended on by all other Storyloom crates.
//! It provides:
//! - [`StoryloomError`] — the unified error type
//! - Domain types ([`Book`], [`Segment`], [`GenerationRecord`], [`BookId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, OpenRouterConfig, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, StoryloomError};
pub use types::{
    Book, BookId, GenerationRecord, NewGenerationRecord, NewSegment, SamplingParams, Segment,
};
