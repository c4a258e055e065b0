//! Writer decorators composed around the destination file so that a single
//! pass over the bytes writes, hashes and reports progress.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

use crate::catalog::{ChecksumKind, HexCase, RunningHash};

use super::progress::ProgressObserver;

/// Feeds every byte accepted by the inner writer into a hash accumulator.
pub struct HashingWriter<W> {
    inner: W,
    hash: RunningHash,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, kind: ChecksumKind) -> Self {
        Self {
            inner,
            hash: kind.hasher(),
        }
    }

    /// Hex digest of everything written so far, and the inner writer.
    pub fn finish(self, case: HexCase) -> (W, String) {
        (self.inner, self.hash.finalize_hex(case))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // Only what the inner writer actually took.
        self.hash.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reports written byte counts to a [`ProgressObserver`] once per `step`.
pub struct ProgressWriter<'a, W> {
    inner: W,
    observer: &'a mut dyn ProgressObserver,
    total: Option<u64>,
    step: u64,
    written: u64,
    last_reported: u64,
    finished: bool,
}

impl<'a, W: Write> ProgressWriter<'a, W> {
    /// `step_bytes` is the coarsest allowed gap between updates; when the
    /// total size is known the gap is also capped at 0.5% of it.
    pub fn new(
        inner: W,
        observer: &'a mut dyn ProgressObserver,
        total: Option<u64>,
        step_bytes: u64,
    ) -> Self {
        let step = effective_step(step_bytes, total);
        observer.started(total);
        Self {
            inner,
            observer,
            total,
            step,
            written: 0,
            last_reported: 0,
            finished: false,
        }
    }

    #[cfg(test)]
    fn written(&self) -> u64 {
        self.written
    }

    /// Emit the completion update. Calling it again is a no-op.
    pub fn complete(&mut self) {
        if !self.finished {
            self.finished = true;
            self.observer.finished(self.written, self.total);
        }
    }

    pub fn into_inner(mut self) -> W {
        self.complete();
        self.inner
    }
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        if self.written - self.last_reported >= self.step {
            self.last_reported = self.written;
            self.observer.advanced(self.written, self.total);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn effective_step(step_bytes: u64, total: Option<u64>) -> u64 {
    let step = step_bytes.max(1);
    match total {
        Some(total) if total > 0 => step.min((total / 200).max(1)),
        _ => step,
    }
}

/// Stream a local file through a hash accumulator.
pub fn hash_file(path: &Path, kind: ChecksumKind, case: HexCase) -> io::Result<String> {
    let mut reader = BufReader::with_capacity(1024 * 1024, File::open(path)?);
    let mut sink = HashingWriter::new(io::sink(), kind);
    io::copy(&mut reader, &mut sink)?;
    Ok(sink.finish(case).1)
}
