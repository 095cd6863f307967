//! Multi-core gzip writer.
//!
//! Input is cut into fixed-size chunks that are deflated independently on
//! worker threads. Every chunk except the last ends with a sync flush, so
//! the raw deflate streams concatenate into one valid stream and the output
//! is a single gzip member readable by any gzip decoder.

use std::io::{self, Write};

use flate2::{Compress, Compression, Crc, FlushCompress, Status};

/// Fixed gzip member header: deflate, no flags, no mtime, unknown OS.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];

/// Gzip encoder that deflates `workers` chunks at a time in parallel.
pub struct ParallelGzEncoder<W: Write> {
    inner: W,
    level: Compression,
    workers: usize,
    chunk_size: usize,
    current: Vec<u8>,
    pending: Vec<Vec<u8>>,
    crc: Crc,
    header_written: bool,
}

impl<W: Write> ParallelGzEncoder<W> {
    pub fn new(inner: W, level: Compression, workers: usize, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        ParallelGzEncoder {
            inner,
            level,
            workers: workers.max(1),
            chunk_size,
            current: Vec::with_capacity(chunk_size),
            pending: Vec::new(),
            crc: Crc::new(),
            header_written: false,
        }
    }

    /// Deflate everything still buffered, write the trailer and return the
    /// inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let last = std::mem::take(&mut self.current);
        self.pending.push(last);
        self.deflate_pending(true)?;

        self.inner.write_all(&self.crc.sum().to_le_bytes())?;
        self.inner.write_all(&self.crc.amount().to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn deflate_pending(&mut self, ends_stream: bool) -> io::Result<()> {
        if !self.header_written {
            self.inner.write_all(&GZIP_HEADER)?;
            self.header_written = true;
        }

        let chunks = std::mem::take(&mut self.pending);
        let last_index = if ends_stream { chunks.len().checked_sub(1) } else { None };
        for block in deflate_batch(&chunks, last_index, self.level)? {
            self.inner.write_all(&block)?;
        }
        Ok(())
    }
}

impl<W: Write> Write for ParallelGzEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.chunk_size - self.current.len();
        let taken = room.min(buf.len());
        self.current.extend_from_slice(&buf[..taken]);
        self.crc.update(&buf[..taken]);

        if self.current.len() == self.chunk_size {
            let full = std::mem::replace(&mut self.current, Vec::with_capacity(self.chunk_size));
            self.pending.push(full);
            if self.pending.len() == self.workers {
                self.deflate_pending(false)?;
            }
        }
        Ok(taken)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Deflate each chunk on its own thread, returning blocks in input order.
fn deflate_batch(chunks: &[Vec<u8>], last_index: Option<usize>, level: Compression) -> io::Result<Vec<Vec<u8>>> {
    if chunks.len() == 1 {
        return Ok(vec![deflate_chunk(&chunks[0], last_index == Some(0), level)?]);
    }

    crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| scope.spawn(move |_| deflate_chunk(chunk, last_index == Some(i), level)))
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|_| Err(worker_panicked())))
            .collect::<io::Result<Vec<_>>>()
    })
    .map_err(|_| worker_panicked())?
}

/// Raw deflate of one chunk. Non-final chunks end on a byte boundary with
/// a sync flush; the final chunk closes the stream.
fn deflate_chunk(data: &[u8], last: bool, level: Compression) -> io::Result<Vec<u8>> {
    let mut compress = Compress::new(level, false);
    let flush = if last { FlushCompress::Finish } else { FlushCompress::Sync };
    let mut out = Vec::with_capacity(deflate_bound(data.len()));

    loop {
        if out.len() == out.capacity() {
            out.reserve(64 * 1024);
        }
        let consumed = compress.total_in() as usize;
        let status = compress
            .compress_vec(&data[consumed..], &mut out, flush)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let all_consumed = compress.total_in() as usize == data.len();
        match status {
            Status::StreamEnd => break,
            // a flush is complete once it leaves spare output space
            Status::Ok | Status::BufError if !last && all_consumed && out.len() < out.capacity() => break,
            Status::Ok | Status::BufError => {}
        }
    }
    Ok(out)
}

/// Worst-case deflate output size, with room for the flush marker.
fn deflate_bound(len: usize) -> usize {
    len + 5 * (len / 16_383 + 1) + 64
}

fn worker_panicked() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "gzip worker thread panicked")
}
