//! Fuzz target for payload range overlap detection
//!
//! Compares the sorted sweep against a brute-force pairwise check.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use nandpatch_core::{find_overlap, PatchedRegion};

#[derive(Arbitrary, Debug)]
struct FuzzRegion {
    offset: u32,
    len: u16,
}

fuzz_target!(|input: Vec<FuzzRegion>| {
    let regions: Vec<PatchedRegion> = input
        .iter()
        .take(32)
        .enumerate()
        .map(|(index, r)| PatchedRegion {
            index,
            name: format!("r{}", index),
            block: 0,
            offset: r.offset as u64,
            len: r.len as u64,
        })
        .collect();

    let brute_force = regions
        .iter()
        .enumerate()
        .any(|(i, a)| regions[i + 1..].iter().any(|b| a.overlaps(b)));

    match find_overlap(&regions) {
        Some((first, second)) => {
            assert!(brute_force);
            assert!(first.index < second.index);
            assert!(first.overlaps(second));
        }
        None => assert!(!brute_force),
    }
});
