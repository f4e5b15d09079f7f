//! Copy-then-overwrite image patching
//!
//! [`ImagePatcher`] validates the input/output pair, loads and range-checks
//! every payload, duplicates the input image and then writes each payload
//! at its block offset. Nothing touches the output path until every
//! precondition has passed.

use crate::error::{Error, PatchError, ValidationError};
use crate::layout::DeviceLayout;
use crate::plan::{check_overlap, find_overlap, LoadedPayload, PatchPlan, PatchedRegion};
use crate::resources::PayloadResolver;
use crate::validate::validate;
use crate::verify::{verify_output, VerifyReport};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How the output file is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Build the image in a temp file next to the output and move it into
    /// place only once every payload is written
    #[default]
    Atomic,
    /// Write straight into the output path; a failure leaves a partial file
    InPlace,
}

/// Observer for long-running patch steps
pub trait PatchProgress {
    /// Called as the source image is duplicated
    fn on_copy_progress(&mut self, _copied: u64, _total: u64) {}

    /// Called after each payload has been written
    fn on_payload_written(&mut self, _region: &PatchedRegion) {}
}

/// Progress observer that ignores everything
pub struct NoProgress;

impl PatchProgress for NoProgress {}

/// Outcome of a successful patch run
#[derive(Debug, Clone)]
pub struct PatchReport {
    pub output: PathBuf,
    pub image_size: u64,
    pub regions: Vec<PatchedRegion>,
    pub write_mode: WriteMode,
}

/// Validates and patches images for one device layout
#[derive(Debug, Clone, Default)]
pub struct ImagePatcher {
    layout: DeviceLayout,
    write_mode: WriteMode,
    allow_overlap: bool,
}

impl ImagePatcher {
    /// Create a patcher for the given layout
    pub fn new(layout: DeviceLayout) -> Self {
        Self {
            layout,
            write_mode: WriteMode::default(),
            allow_overlap: false,
        }
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Let later payloads overwrite earlier ones instead of failing
    pub fn with_allow_overlap(mut self, allow: bool) -> Self {
        self.allow_overlap = allow;
        self
    }

    pub fn layout(&self) -> &DeviceLayout {
        &self.layout
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Run the precondition checks without side effects
    pub fn validate(&self, input: &Path, output: &Path) -> Result<(), ValidationError> {
        validate(input, output, self.layout.expected_size)
    }

    /// Standard plan for this patcher's layout
    pub fn plan(&self, include_calibration: bool, resolver: &dyn PayloadResolver) -> PatchPlan {
        PatchPlan::for_layout(&self.layout, include_calibration, resolver)
    }

    /// Validate, load payloads and check their ranges without writing anything
    pub fn prepare(
        &self,
        input: &Path,
        output: &Path,
        plan: &PatchPlan,
    ) -> Result<Vec<LoadedPayload>, Error> {
        self.validate(input, output)?;

        let payloads = plan.load(&self.layout)?;
        let regions: Vec<PatchedRegion> = payloads.iter().map(|p| p.region.clone()).collect();

        if self.allow_overlap {
            if let Some((first, second)) = find_overlap(&regions) {
                warn!(
                    first = %first.name,
                    second = %second.name,
                    "payload ranges overlap, later write wins"
                );
            }
        } else {
            check_overlap(&regions)?;
        }

        Ok(payloads)
    }

    /// Patch `input` into a new file at `output`
    pub fn apply_patch(
        &self,
        input: &Path,
        output: &Path,
        plan: &PatchPlan,
    ) -> Result<PatchReport, Error> {
        self.apply_patch_with_progress(input, output, plan, &mut NoProgress)
    }

    /// Patch `input` into a new file at `output`, reporting progress
    pub fn apply_patch_with_progress(
        &self,
        input: &Path,
        output: &Path,
        plan: &PatchPlan,
        progress: &mut dyn PatchProgress,
    ) -> Result<PatchReport, Error> {
        let payloads = self.prepare(input, output, plan)?;
        let total = self.layout.expected_size;

        info!(
            input = %input.display(),
            output = %output.display(),
            payloads = payloads.len(),
            mode = ?self.write_mode,
            "patching image"
        );

        match self.write_mode {
            WriteMode::Atomic => write_atomic(input, output, total, &payloads, progress)?,
            WriteMode::InPlace => write_in_place(input, output, total, &payloads, progress)?,
        }

        info!(output = %output.display(), "image patched");

        Ok(PatchReport {
            output: output.to_path_buf(),
            image_size: total,
            regions: payloads.into_iter().map(|p| p.region).collect(),
            write_mode: self.write_mode,
        })
    }

    /// Re-read a patched image and check it against its input and plan
    pub fn verify(
        &self,
        input: &Path,
        output: &Path,
        plan: &PatchPlan,
    ) -> Result<VerifyReport, Error> {
        let payloads = plan.load(&self.layout)?;
        verify_output(input, output, &payloads, self.layout.block_size)
    }
}

fn write_atomic(
    input: &Path,
    output: &Path,
    total: u64,
    payloads: &[LoadedPayload],
    progress: &mut dyn PatchProgress,
) -> Result<(), Error> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Dropping the temp file on any early return removes it
    let mut builder = tempfile::Builder::new();
    builder.prefix(".nandpatch-").suffix(".part");
    // Same mode bits as a freshly created file; the umask still applies
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut temp = builder.tempfile_in(dir).map_err(PatchError::Copy)?;
    debug!(temp = %temp.path().display(), "staging output");

    copy_image(input, temp.as_file_mut(), total, progress)?;
    write_payloads(temp.as_file_mut(), payloads, progress)?;
    temp.as_file().sync_all().map_err(PatchError::Persist)?;

    temp.persist_noclobber(output).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            Error::from(ValidationError::OutputAlreadyExists(output.to_path_buf()))
        } else {
            Error::from(PatchError::Persist(e.error))
        }
    })?;

    Ok(())
}

fn write_in_place(
    input: &Path,
    output: &Path,
    total: u64,
    payloads: &[LoadedPayload],
    progress: &mut dyn PatchProgress,
) -> Result<(), Error> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(output)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                Error::from(ValidationError::OutputAlreadyExists(output.to_path_buf()))
            } else {
                Error::from(PatchError::Copy(e))
            }
        })?;

    copy_image(input, &mut file, total, progress)?;
    write_payloads(&mut file, payloads, progress)?;
    file.sync_all().map_err(PatchError::Persist)?;

    Ok(())
}

/// Duplicate the whole source image into `dest`
fn copy_image(
    input: &Path,
    dest: &mut File,
    total: u64,
    progress: &mut dyn PatchProgress,
) -> Result<(), PatchError> {
    let source = File::open(input).map_err(PatchError::Copy)?;
    let mut reader = ProgressReader {
        inner: BufReader::new(source),
        copied: 0,
        total,
        progress,
    };

    let copied = io::copy(&mut reader, dest).map_err(PatchError::Copy)?;
    if copied != total {
        return Err(PatchError::Copy(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("source image changed size during copy: {copied} of {total} bytes"),
        )));
    }

    debug!(bytes = copied, "source image copied");
    Ok(())
}

/// Overwrite each payload range in plan order
fn write_payloads(
    dest: &mut File,
    payloads: &[LoadedPayload],
    progress: &mut dyn PatchProgress,
) -> Result<(), PatchError> {
    for payload in payloads {
        let region = &payload.region;
        dest.seek(SeekFrom::Start(region.offset))
            .and_then(|_| dest.write_all(&payload.data))
            .map_err(|source| PatchError::Write {
                index: region.index,
                name: region.name.clone(),
                source,
            })?;

        debug!(
            name = %region.name,
            block = region.block,
            offset = region.offset,
            len = region.len,
            "payload written"
        );
        progress.on_payload_written(region);
    }

    dest.flush().map_err(PatchError::Persist)
}

struct ProgressReader<'a, R> {
    inner: R,
    copied: u64,
    total: u64,
    progress: &'a mut dyn PatchProgress,
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.copied += n as u64;
        self.progress.on_copy_progress(self.copied, self.total);
        Ok(n)
    }
}
