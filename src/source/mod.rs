//! PCM sources
//!
//! The encode loop pulls raw PCM through [`PcmSource`]. Two implementations
//! exist: [`file::FileSource`] decodes an audio file with FFmpeg, and
//! [`PullSource`] adapts an application-supplied [`DataSource`].

pub mod file;

use std::io;

use crate::error::{ConverterError, Result};
use crate::format::FormatDescriptor;

/// Engine-facing PCM supplier
pub trait PcmSource: Send {
    /// Format of the bytes returned by [`PcmSource::read`].
    fn format(&self) -> FormatDescriptor;

    /// Fill `buf` with up to `buf.len()` bytes. `Ok(0)` signals end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Total PCM bytes the source will produce, when known.
    fn total_bytes(&self) -> Option<u64>;

    fn seekable(&self) -> bool {
        false
    }

    /// Reposition to byte offset `position` of the PCM stream.
    fn seek(&mut self, _position: u64) -> Result<()> {
        Err(ConverterError::file("source does not support seeking"))
    }
}

/// Application-supplied pull capability
///
/// The engine owns the buffer handed to [`DataSource::next_bytes`]; the source
/// fills it during the call and must not keep any reference to it. Calls are
/// made on the job's worker thread.
pub trait DataSource: Send {
    /// Fill `buffer` with the next PCM bytes and return how many were written.
    /// Returning 0 means end of stream.
    fn next_bytes(&mut self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Whether [`DataSource::seek`] is implemented.
    fn seekable(&self) -> bool {
        false
    }

    fn seek(&mut self, _position: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "data source does not support seeking",
        ))
    }

    /// Length hint in bytes, used for progress reporting.
    fn total_bytes(&self) -> Option<u64> {
        None
    }
}

impl<F> DataSource for F
where
    F: FnMut(&mut [u8]) -> io::Result<usize> + Send,
{
    fn next_bytes(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self(buffer)
    }
}

/// [`PcmSource`] over a [`DataSource`] with an explicit format
pub struct PullSource {
    inner: Box<dyn DataSource>,
    format: FormatDescriptor,
    seekable: bool,
    total_bytes: Option<u64>,
}

impl PullSource {
    pub fn new(inner: Box<dyn DataSource>, format: FormatDescriptor) -> Self {
        // Optional capabilities are probed once, here
        let seekable = inner.seekable();
        let total_bytes = inner.total_bytes();
        Self {
            inner,
            format,
            seekable,
            total_bytes,
        }
    }
}

impl PcmSource for PullSource {
    fn format(&self) -> FormatDescriptor {
        self.format
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.next_bytes(buf).map_err(ConverterError::file)?;
        if n > buf.len() {
            return Err(ConverterError::file(format!(
                "data source reported {} bytes for a {}-byte buffer",
                n,
                buf.len()
            )));
        }
        Ok(n)
    }

    fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    fn seekable(&self) -> bool {
        self.seekable
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if !self.seekable {
            return Err(ConverterError::file("data source does not support seeking"));
        }
        self.inner.seek(position).map_err(ConverterError::file)
    }
}
