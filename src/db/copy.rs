//! Line-buffered framing for the `place` COPY-IN stream.

use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use tokio_postgres::{Client, CopyInSink};
use tracing::debug;

use crate::error::{ImportError, Result};

/// COPY statement matching the column order of `PlaceRow::copy_line`.
const COPY_PLACE_SQL: &str = "COPY place (osm_type, osm_id, class, type, name, \
     admin_level, housenumber, street, addr_place, isin, postcode, \
     country_code, extratags, geometry) FROM STDIN";

/// Default buffer capacity.
pub const COPY_BUFFER_CAPACITY: usize = 64 * 1024;

/// Headroom kept free when deciding whether a fragment still fits.
const RESERVE: usize = 16;

/// Buffers COPY text fragments and streams them into an open COPY-IN.
///
/// The connection is idle until the first append, which issues the
/// COPY statement. `end_copy` must run before any non-COPY statement
/// is sent on the same connection.
pub struct CopyBuffer {
    buf: BytesMut,
    capacity: usize,
    sink: Option<Pin<Box<CopyInSink<Bytes>>>>,
    rows_queued: u64,
}

impl CopyBuffer {
    pub fn new() -> Self {
        Self::with_capacity(COPY_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            sink: None,
            rows_queued: 0,
        }
    }

    /// Whether a COPY is currently open on the connection.
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Rows queued since the buffer was created.
    pub fn rows_queued(&self) -> u64 {
        self.rows_queued
    }

    /// Append a fragment of COPY text, starting the COPY if idle.
    pub async fn append(&mut self, client: &Client, fragment: &str) -> Result<()> {
        if self.sink.is_none() {
            let sink = client
                .copy_in(COPY_PLACE_SQL)
                .await
                .map_err(ImportError::CopyProtocol)?;
            self.sink = Some(Box::pin(sink));
        }

        self.rows_queued += fragment.bytes().filter(|b| *b == b'\n').count() as u64;

        let chunks = frame(&mut self.buf, fragment.as_bytes(), self.capacity);
        if let Some(sink) = self.sink.as_mut() {
            for chunk in chunks {
                sink.send(chunk).await.map_err(ImportError::CopyProtocol)?;
            }
        }
        Ok(())
    }

    /// Terminate an active COPY, flushing any buffered complete rows.
    /// Returns the number of rows the server reports as copied; zero
    /// when the connection was already idle.
    pub async fn end_copy(&mut self) -> Result<u64> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(0);
        };

        if !self.buf.is_empty() {
            let tail = self.buf.split().freeze();
            sink.send(tail).await.map_err(ImportError::CopyProtocol)?;
        }

        let copied = sink
            .as_mut()
            .finish()
            .await
            .map_err(ImportError::CopyProtocol)?;
        debug!("COPY finished, {} rows", copied);
        Ok(copied)
    }
}

impl Default for CopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure buffering policy: returns the chunks that must be transmitted
/// for this fragment. A newline-terminated buffer is a complete set of
/// rows and goes out immediately; oversized fragments bypass the
/// buffer; a full buffer is drained before appending.
fn frame(buf: &mut BytesMut, fragment: &[u8], capacity: usize) -> Vec<Bytes> {
    let mut out = Vec::new();
    let limit = capacity.saturating_sub(RESERVE);

    if !buf.is_empty() && buf.len() + fragment.len() > limit {
        out.push(buf.split().freeze());
    }

    if fragment.len() > limit {
        out.push(Bytes::copy_from_slice(fragment));
    } else {
        buf.extend_from_slice(fragment);
    }

    if buf.last() == Some(&b'\n') {
        out.push(buf.split().freeze());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_fragment_is_buffered() {
        let mut buf = BytesMut::new();
        let chunks = frame(&mut buf, b"N\t1\tplace", 1024);
        assert!(chunks.is_empty());
        assert_eq!(&buf[..], b"N\t1\tplace");
    }

    #[test]
    fn test_newline_flushes_complete_rows() {
        let mut buf = BytesMut::new();
        frame(&mut buf, b"N\t1\tplace\tcity", 1024);
        let chunks = frame(&mut buf, b"\tSRID=4326;POINT(1 2)\n", 1024);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].ends_with(b"\n"));
        assert!(chunks[0].starts_with(b"N\t1\tplace"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_capacity_pressure_drains_buffer_first() {
        let mut buf = BytesMut::new();
        frame(&mut buf, &[b'a'; 40], 64);
        let chunks = frame(&mut buf, &[b'b'; 20], 64);

        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][..], &[b'a'; 40][..]);
        assert_eq!(&buf[..], &[b'b'; 20][..]);
    }

    #[test]
    fn test_oversized_fragment_bypasses_buffer() {
        let mut buf = BytesMut::new();
        frame(&mut buf, b"pending", 64);
        let big = vec![b'x'; 100];
        let chunks = frame(&mut buf, &big, 64);

        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0][..], b"pending");
        assert_eq!(&chunks[1][..], &big[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_buffered_rows_go_out_together() {
        let mut buf = BytesMut::new();
        frame(&mut buf, b"row1 part", 1024);
        let chunks = frame(&mut buf, b" end\nrow2\n", 1024);

        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][..], b"row1 part end\nrow2\n");
    }
}
