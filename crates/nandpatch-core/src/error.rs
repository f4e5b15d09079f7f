//! Error types for nandpatch

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for patch operations
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, front-end facing classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InputNotFound,
    OutputNotSpecified,
    SourceEqualsTarget,
    OutputAlreadyExists,
    InvalidInputSize,
    PayloadNotFound,
    PayloadOutOfBounds,
    OverlappingPatchRanges,
    EmptyPlan,
    InvalidLayout,
    IoFailure,
}

impl Error {
    /// Classify this error for callers that map failures to their own messages
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(e) => e.kind(),
            Error::Patch(e) => e.kind(),
            Error::Layout(_) => ErrorKind::InvalidLayout,
            Error::Io(_) => ErrorKind::IoFailure,
        }
    }
}

/// Precondition failures detected before the output path is touched
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Source image missing: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Target image not provided")]
    OutputNotSpecified,

    #[error("Source equals target, will not overwrite the source file")]
    SourceEqualsTarget,

    #[error("Target image already exists. Refusing to overwrite! ({})", .0.display())]
    OutputAlreadyExists(PathBuf),

    #[error(
        "Source image has invalid size: {actual} bytes, expected {expected}. \
         Was it dumped without OOB data?"
    )]
    InvalidInputSize { expected: u64, actual: u64 },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::InputNotFound(_) => ErrorKind::InputNotFound,
            ValidationError::OutputNotSpecified => ErrorKind::OutputNotSpecified,
            ValidationError::SourceEqualsTarget => ErrorKind::SourceEqualsTarget,
            ValidationError::OutputAlreadyExists(_) => ErrorKind::OutputAlreadyExists,
            ValidationError::InvalidInputSize { .. } => ErrorKind::InvalidInputSize,
        }
    }
}

/// Errors while loading payloads or writing the output image
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Patch plan is empty")]
    EmptyPlan,

    #[error("Payload #{index} ({name}) not found at {}: {source}", .path.display())]
    PayloadNotFound {
        index: usize,
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Payload #{index} ({name}) ends at byte {end}, past the {image_size}-byte image")]
    PayloadOutOfBounds {
        index: usize,
        name: String,
        end: u64,
        image_size: u64,
    },

    #[error("Payloads #{first} ({first_name}) and #{second} ({second_name}) overlap")]
    OverlappingPatchRanges {
        first: usize,
        first_name: String,
        second: usize,
        second_name: String,
    },

    #[error("Failed to copy source image: {0}")]
    Copy(#[source] std::io::Error),

    #[error("Failed to write payload #{index} ({name}): {source}")]
    Write {
        index: usize,
        name: String,
        source: std::io::Error,
    },

    #[error("Failed to finalize output image: {0}")]
    Persist(#[source] std::io::Error),
}

impl PatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::EmptyPlan => ErrorKind::EmptyPlan,
            PatchError::PayloadNotFound { .. } => ErrorKind::PayloadNotFound,
            PatchError::PayloadOutOfBounds { .. } => ErrorKind::PayloadOutOfBounds,
            PatchError::OverlappingPatchRanges { .. } => ErrorKind::OverlappingPatchRanges,
            PatchError::Copy(_) | PatchError::Write { .. } | PatchError::Persist(_) => {
                ErrorKind::IoFailure
            }
        }
    }
}

/// Errors in a device layout description
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Block size must be non-zero")]
    ZeroBlockSize,

    #[error("Expected image size must be non-zero")]
    ZeroExpectedSize,

    #[error("Layout has no mandatory payload slot")]
    NoMandatorySlot,

    #[error("Duplicate payload slot: {0}")]
    DuplicateSlot(String),

    #[error("Slot {name} at block {block} lies outside the image")]
    SlotOutOfRange { name: String, block: u64 },

    #[error("Malformed layout: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
