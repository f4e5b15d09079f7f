//! `nandpatch` patch run

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use nandpatch_core::{
    hash_to_hex, sha256_file, BundledResources, DeviceLayout, ImagePatcher, PatchProgress,
    PatchedRegion, WriteMode,
};
use std::path::{Path, PathBuf};

/// Options for one patch run, collected from the command line
pub struct PatchArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub art: bool,
    pub resources: Option<PathBuf>,
    pub layout: Option<PathBuf>,
    pub in_place: bool,
    pub allow_overlap: bool,
    pub dry_run: bool,
    pub verify: bool,
}

fn load_layout(path: Option<&Path>) -> Result<DeviceLayout> {
    match path {
        Some(path) => DeviceLayout::from_file(path)
            .with_context(|| format!("Failed to load layout {}", path.display())),
        None => Ok(DeviceLayout::mr33()),
    }
}

pub fn run(args: &PatchArgs) -> Result<()> {
    let layout = load_layout(args.layout.as_deref())?;
    let resolver = match &args.resources {
        Some(dir) => BundledResources::with_dir(dir),
        None => BundledResources::new(),
    };
    let mode = if args.in_place {
        WriteMode::InPlace
    } else {
        WriteMode::Atomic
    };

    let patcher = ImagePatcher::new(layout)
        .with_write_mode(mode)
        .with_allow_overlap(args.allow_overlap);
    let plan = patcher.plan(args.art, &resolver);

    println!("Patching {} NAND image...", patcher.layout().name);
    println!("  Input:  {}", args.input.display());
    println!("  Output: {}", args.output.display());
    if patcher.write_mode() == WriteMode::InPlace {
        println!("  Mode:   in-place (a failure leaves a partial output file)");
    }
    if let Some(dir) = resolver.dir() {
        println!("  Payload dir: {}", dir.display());
    }
    for entry in plan.entries() {
        println!(
            "  Payload: {:<12} block {:>4}  {}",
            entry.name,
            entry.block,
            entry.payload.display()
        );
    }

    if args.dry_run {
        let payloads = patcher.prepare(&args.input, &args.output, &plan)?;
        println!();
        println!("Dry run: all checks passed, nothing written.");
        for payload in &payloads {
            print_region(&payload.region);
        }
        return Ok(());
    }

    let mut progress = CliProgress::new(patcher.layout().expected_size);
    let result = patcher.apply_patch_with_progress(&args.input, &args.output, &plan, &mut progress);
    progress.pb.finish_and_clear();
    let report = result?;

    println!();
    println!("Patching completed successfully.");
    println!("  Image size:   {:>12} bytes", report.image_size);
    for region in &report.regions {
        print_region(region);
    }

    let digest = sha256_file(&report.output).context("Failed to hash output image")?;
    println!("  SHA256:       {}", hash_to_hex(&digest));

    if args.verify {
        let verification = patcher.verify(&args.input, &report.output, &plan)?;
        if let Some(offset) = verification.first_mismatch {
            anyhow::bail!(
                "Verification failed: output differs from expected image at byte {}",
                offset
            );
        }
        println!(
            "  Verified:     {} payload regions, all other bytes match the input",
            verification.regions_checked
        );
    }

    Ok(())
}

fn print_region(region: &PatchedRegion) {
    println!(
        "  {:<12}  block {:>4}  bytes 0x{:08x}..0x{:08x}  ({} bytes)",
        region.name,
        region.block,
        region.offset,
        region.end(),
        region.len
    );
}

/// Progress reporter using indicatif progress bar
struct CliProgress {
    pb: ProgressBar,
}

impl CliProgress {
    fn new(total: u64) -> Self {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message("copying");
        Self { pb }
    }
}

impl PatchProgress for CliProgress {
    fn on_copy_progress(&mut self, copied: u64, _total: u64) {
        self.pb.set_position(copied);
    }

    fn on_payload_written(&mut self, region: &PatchedRegion) {
        self.pb.set_message(format!("wrote {}", region.name));
    }
}
