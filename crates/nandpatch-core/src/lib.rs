//! nandpatch core - validate-then-patch pipeline for fixed-layout NAND dumps
//!
//! The crate checks an input dump against a [`DeviceLayout`], duplicates it
//! to a new output file and overwrites block-aligned regions with payload
//! files. The built-in layout targets the Meraki MR33.

pub mod error;
pub mod hash;
pub mod layout;
pub mod patcher;
pub mod plan;
pub mod resources;
pub mod validate;
pub mod verify;

// Re-export commonly used types
pub use error::{Error, ErrorKind, LayoutError, PatchError, ValidationError};
pub use hash::{hash_to_hex, sha256, sha256_file};
pub use layout::{DeviceLayout, PayloadSlot, BLOCK_SIZE, EXPECTED_SIZE};
pub use patcher::{ImagePatcher, NoProgress, PatchProgress, PatchReport, WriteMode};
pub use plan::{check_overlap, find_overlap, LoadedPayload, PatchEntry, PatchPlan, PatchedRegion};
pub use resources::{BundledResources, PayloadResolver};
pub use validate::{same_file_path, validate};
pub use verify::{verify_output, VerifyReport};
