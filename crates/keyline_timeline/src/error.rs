// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the timeline engine.

use thiserror::Error;

/// Timeline errors
#[derive(Debug, Error)]
pub enum TimelineError {
    /// Duration must be strictly positive and at most `MAX_DURATION_SECONDS`
    #[error("Invalid duration {0}: duration must be a positive number of seconds, at most 1e9")]
    InvalidDuration(f64),

    /// Timecode string could not be parsed
    #[error("Invalid timecode '{0}': expected HH:MM:SS:MLS")]
    InvalidTimecode(String),

    /// Normalized range with min > max or values outside [0, 1]
    #[error("Invalid range [{min}, {max}]")]
    InvalidRange {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// Pages need a name
    #[error("Cannot add page with an empty name")]
    EmptyPageName,

    /// Page name already taken
    #[error("Page '{0}' already exists")]
    DuplicatePage(String),

    /// No page with that name
    #[error("Page '{0}' not found")]
    PageNotFound(String),

    /// No page at that index
    #[error("Page index {0} out of bounds")]
    PageIndexOutOfBounds(usize),

    /// No track with that name anywhere in the timeline
    #[error("Couldn't find track '{0}'")]
    TrackNotFound(String),

    /// Operation needs `Timeline::setup` first
    #[error("Timeline has not been set up")]
    NotSetUp,

    /// Persistence requested for something without a file path
    #[error("'{0}' has no file path")]
    NoFilePath(String),

    /// Settings written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },

    /// State buffer encoding error
    #[error("State buffer error: {0}")]
    Encode(#[from] bincode::Error),

    /// Document serialization error
    #[error("Document error: {0}")]
    Document(#[from] ron::Error),

    /// Document parse error
    #[error("Document parse error: {0}")]
    DocumentParse(#[from] ron::error::SpannedError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for timeline operations
pub type Result<T> = std::result::Result<T, TimelineError>;
