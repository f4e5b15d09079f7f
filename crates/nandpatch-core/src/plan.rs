//! Patch plans: which payload goes to which block

use crate::error::PatchError;
use crate::layout::DeviceLayout;
use crate::resources::PayloadResolver;
use std::fs;
use std::path::PathBuf;

/// One payload-to-block assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    /// Slot name, used in errors and reports
    pub name: String,
    /// Payload file on disk
    pub payload: PathBuf,
    /// Block index where the payload is written
    pub block: u64,
}

impl PatchEntry {
    pub fn new(name: impl Into<String>, payload: impl Into<PathBuf>, block: u64) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            block,
        }
    }
}

/// Ordered list of payload writes for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPlan {
    entries: Vec<PatchEntry>,
}

impl PatchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard plan for a layout
    ///
    /// Mandatory slots come first in layout order; optional slots (the MR33
    /// ART region) are appended only when `include_optional` is set.
    pub fn for_layout(
        layout: &DeviceLayout,
        include_optional: bool,
        resolver: &dyn PayloadResolver,
    ) -> Self {
        let optional = layout.optional_slots().filter(|_| include_optional);
        let entries = layout
            .mandatory_slots()
            .chain(optional)
            .map(|slot| PatchEntry::new(&slot.name, resolver.resolve(&slot.file), slot.block))
            .collect();

        Self { entries }
    }

    /// Append an entry; later entries are written after earlier ones
    pub fn with_entry(mut self, entry: PatchEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[PatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read every payload into memory, resolving byte offsets
    pub fn load(&self, layout: &DeviceLayout) -> Result<Vec<LoadedPayload>, PatchError> {
        if self.entries.is_empty() {
            return Err(PatchError::EmptyPlan);
        }

        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| -> Result<LoadedPayload, PatchError> {
                let data = fs::read(&entry.payload).map_err(|source| PatchError::PayloadNotFound {
                    index,
                    name: entry.name.clone(),
                    path: entry.payload.clone(),
                    source,
                })?;

                let region = PatchedRegion::locate(index, entry, layout, data.len() as u64)?;
                Ok(LoadedPayload { region, data })
            })
            .collect()
    }
}

/// Byte range a payload occupies in the output image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedRegion {
    /// Position in the plan
    pub index: usize,
    pub name: String,
    pub block: u64,
    pub offset: u64,
    pub len: u64,
}

impl PatchedRegion {
    fn locate(
        index: usize,
        entry: &PatchEntry,
        layout: &DeviceLayout,
        len: u64,
    ) -> Result<Self, PatchError> {
        let out_of_bounds = |end| PatchError::PayloadOutOfBounds {
            index,
            name: entry.name.clone(),
            end,
            image_size: layout.expected_size,
        };

        let offset = layout
            .byte_offset(entry.block)
            .ok_or_else(|| out_of_bounds(u64::MAX))?;
        let end = offset.checked_add(len).ok_or_else(|| out_of_bounds(u64::MAX))?;
        if end > layout.expected_size {
            return Err(out_of_bounds(end));
        }

        Ok(Self {
            index,
            name: entry.name.clone(),
            block: entry.block,
            offset,
            len,
        })
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    pub fn overlaps(&self, other: &PatchedRegion) -> bool {
        self.len > 0 && other.len > 0 && self.offset < other.end() && other.offset < self.end()
    }
}

/// A payload read from disk together with its placement
#[derive(Debug, Clone)]
pub struct LoadedPayload {
    pub region: PatchedRegion,
    pub data: Vec<u8>,
}

/// Find the first pair of overlapping regions, ordered by plan index
pub fn find_overlap(regions: &[PatchedRegion]) -> Option<(&PatchedRegion, &PatchedRegion)> {
    let mut sorted: Vec<&PatchedRegion> = regions.iter().filter(|r| r.len > 0).collect();
    sorted.sort_by_key(|r| (r.offset, r.index));

    // Track the region reaching furthest so far; any later start before its end overlaps
    let mut furthest: Option<&PatchedRegion> = None;
    for region in sorted {
        if let Some(prev) = furthest {
            if region.offset < prev.end() {
                return Some(if prev.index < region.index {
                    (prev, region)
                } else {
                    (region, prev)
                });
            }
        }
        if furthest.map_or(true, |prev| region.end() > prev.end()) {
            furthest = Some(region);
        }
    }

    None
}

/// Reject overlapping payload ranges
pub fn check_overlap(regions: &[PatchedRegion]) -> Result<(), PatchError> {
    match find_overlap(regions) {
        Some((first, second)) => Err(PatchError::OverlappingPatchRanges {
            first: first.index,
            first_name: first.name.clone(),
            second: second.index,
            second_name: second.name.clone(),
        }),
        None => Ok(()),
    }
}
