//! Device flash layout
//!
//! A layout pins down everything device specific: the erase block size,
//! the exact size of a full dump (pages plus OOB data) and the block at
//! which each payload lands. The built-in layout is the Meraki MR33.

use crate::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Size of one block including OOB data (0x21000)
pub const BLOCK_SIZE: u64 = 135_168;

/// Size of a full MR33 dump including OOB data (0x8400000)
pub const EXPECTED_SIZE: u64 = 138_412_032;

/// U-Boot payload placement
pub const BOOTLOADER_BLOCK: u64 = 56;
pub const BOOTLOADER_FILE: &str = "ubootmr332012.bin";

/// UBI filesystem payload placement
pub const FILESYSTEM_BLOCK: u64 = 96;
pub const FILESYSTEM_FILE: &str = "ubimr33.bin";

/// ART calibration payload placement (optional)
pub const CALIBRATION_BLOCK: u64 = 88;
pub const CALIBRATION_FILE: &str = "art_repaired.bin";

/// One payload location in a layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSlot {
    /// Short identifier, e.g. "bootloader"
    pub name: String,

    /// File name handed to the payload resolver
    pub file: String,

    /// Block index where the payload starts
    pub block: u64,

    /// Only included in a plan when the caller asks for it
    #[serde(default)]
    pub optional: bool,
}

impl PayloadSlot {
    pub fn new(name: impl Into<String>, file: impl Into<String>, block: u64) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            block,
            optional: false,
        }
    }

    /// Mark this slot as opt-in
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Flash geometry and payload placement for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLayout {
    /// Human readable device name
    pub name: String,

    /// Bytes per block
    pub block_size: u64,

    /// Exact byte length a valid dump must have
    pub expected_size: u64,

    /// Payload slots; mandatory slots are applied in this order, then optional ones
    pub slots: Vec<PayloadSlot>,
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self::mr33()
    }
}

impl DeviceLayout {
    /// Layout of the Meraki MR33 NAND
    pub fn mr33() -> Self {
        Self {
            name: "MR33".to_string(),
            block_size: BLOCK_SIZE,
            expected_size: EXPECTED_SIZE,
            slots: vec![
                PayloadSlot::new("bootloader", BOOTLOADER_FILE, BOOTLOADER_BLOCK),
                PayloadSlot::new("filesystem", FILESYSTEM_FILE, FILESYSTEM_BLOCK),
                PayloadSlot::new("calibration", CALIBRATION_FILE, CALIBRATION_BLOCK).optional(),
            ],
        }
    }

    /// Create an empty layout with the given geometry
    pub fn new(name: impl Into<String>, block_size: u64, expected_size: u64) -> Self {
        Self {
            name: name.into(),
            block_size,
            expected_size,
            slots: Vec::new(),
        }
    }

    /// Append a payload slot
    pub fn with_slot(mut self, slot: PayloadSlot) -> Self {
        self.slots.push(slot);
        self
    }

    /// Parse and check a JSON layout
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let layout: DeviceLayout = serde_json::from_str(json)?;
        layout.check()?;
        Ok(layout)
    }

    /// Load a JSON layout from disk
    pub fn from_file(path: &Path) -> Result<Self, LayoutError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Byte offset of a block, or None on overflow
    pub fn byte_offset(&self, block: u64) -> Option<u64> {
        block.checked_mul(self.block_size)
    }

    /// Number of whole blocks in a valid image
    pub fn block_count(&self) -> u64 {
        if self.block_size == 0 {
            0
        } else {
            self.expected_size / self.block_size
        }
    }

    pub fn mandatory_slots(&self) -> impl Iterator<Item = &PayloadSlot> {
        self.slots.iter().filter(|s| !s.optional)
    }

    pub fn optional_slots(&self) -> impl Iterator<Item = &PayloadSlot> {
        self.slots.iter().filter(|s| s.optional)
    }

    /// Check the layout is self-consistent
    pub fn check(&self) -> Result<(), LayoutError> {
        if self.block_size == 0 {
            return Err(LayoutError::ZeroBlockSize);
        }
        if self.expected_size == 0 {
            return Err(LayoutError::ZeroExpectedSize);
        }
        if self.mandatory_slots().next().is_none() {
            return Err(LayoutError::NoMandatorySlot);
        }

        let mut seen = HashSet::new();
        for slot in &self.slots {
            if !seen.insert(slot.name.as_str()) {
                return Err(LayoutError::DuplicateSlot(slot.name.clone()));
            }
            match self.byte_offset(slot.block) {
                Some(offset) if offset < self.expected_size => {}
                _ => {
                    return Err(LayoutError::SlotOutOfRange {
                        name: slot.name.clone(),
                        block: slot.block,
                    })
                }
            }
        }

        Ok(())
    }
}
