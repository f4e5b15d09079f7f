//! Post-patch verification
//!
//! Re-reads the source and patched images block by block and checks the
//! patched image equals the source with every payload laid over it.

use crate::error::Error;
use crate::plan::LoadedPayload;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Result of comparing a patched image against its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub source_size: u64,
    pub output_size: u64,
    pub regions_checked: usize,
    /// Offset of the first byte that differs from the expected image
    pub first_mismatch: Option<u64>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.source_size == self.output_size && self.first_mismatch.is_none()
    }
}

/// Compare `output` with `input` overlaid by `payloads` in plan order
pub fn verify_output(
    input: &Path,
    output: &Path,
    payloads: &[LoadedPayload],
    block_size: u64,
) -> Result<VerifyReport, Error> {
    let source_size = fs::metadata(input)?.len();
    let output_size = fs::metadata(output)?.len();

    let mut report = VerifyReport {
        source_size,
        output_size,
        regions_checked: payloads.len(),
        first_mismatch: None,
    };

    if source_size != output_size {
        report.first_mismatch = Some(source_size.min(output_size));
        return Ok(report);
    }

    let chunk = block_size.max(1) as usize;
    let mut source = BufReader::new(File::open(input)?);
    let mut patched = BufReader::new(File::open(output)?);
    let mut expected = vec![0u8; chunk];
    let mut actual = vec![0u8; chunk];
    let mut pos = 0u64;

    loop {
        let n = read_full(&mut source, &mut expected)?;
        if n == 0 {
            break;
        }
        let m = read_full(&mut patched, &mut actual[..n])?;
        if m != n {
            report.first_mismatch = Some(pos + m as u64);
            break;
        }

        overlay(&mut expected[..n], pos, payloads);

        if let Some(i) = expected[..n].iter().zip(&actual[..n]).position(|(a, b)| a != b) {
            report.first_mismatch = Some(pos + i as u64);
            break;
        }

        pos += n as u64;
    }

    Ok(report)
}

/// Lay every payload byte that falls inside `[pos, pos + buf.len())` over `buf`
fn overlay(buf: &mut [u8], pos: u64, payloads: &[LoadedPayload]) {
    let end = pos + buf.len() as u64;
    for payload in payloads {
        let start = payload.region.offset.max(pos);
        let stop = payload.region.end().min(end);
        if start >= stop {
            continue;
        }
        let src = (start - payload.region.offset) as usize..(stop - payload.region.offset) as usize;
        let dst = (start - pos) as usize..(stop - pos) as usize;
        buf[dst].copy_from_slice(&payload.data[src]);
    }
}

/// Read until `buf` is full or EOF
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
