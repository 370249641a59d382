//! Stock input-stream collaborators and the opaque I/O handles.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::{ChunkSource, DecodeError};

/// Scheduling-class tag under which the I/O collaborator should issue reads
/// for a given consumer. Opaque to the decoder itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoPriority(pub u8);

/// Shared byte-quota handle.
///
/// The driver charges every pulled chunk to the tracker and releases the
/// whole charge when the stream finishes or fails, so an I/O layer can cap
/// the bytes outstanding across many concurrent decoders. The default
/// handle tracks nothing.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    in_flight: Option<Arc<AtomicU64>>,
}

impl ResourceTracker {
    pub fn untracked() -> Self {
        ResourceTracker { in_flight: None }
    }

    /// Track against a counter shared with the I/O layer.
    pub fn new(in_flight: Arc<AtomicU64>) -> Self {
        ResourceTracker {
            in_flight: Some(in_flight),
        }
    }

    pub fn consume(&self, n: u64) {
        if let Some(c) = &self.in_flight {
            c.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn release(&self, n: u64) {
        if let Some(c) = &self.in_flight {
            c.fetch_sub(n, Ordering::Relaxed);
        }
    }
}

/// Cooperative cancellation flag, checked by sources at pull boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Replays a scripted sequence of chunks, then reports end of stream.
///
/// The test rig for chunk-boundary behaviour: any split of a byte stream
/// must decode identically to the unsplit stream.
pub struct SliceSource {
    chunks: VecDeque<Bytes>,
    cancel: CancelFlag,
}

impl SliceSource {
    /// One chunk per element of `chunks`.
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        SliceSource {
            chunks: chunks.into_iter().map(Into::into).collect(),
            cancel: CancelFlag::new(),
        }
    }

    /// The whole stream as a single chunk.
    pub fn whole(data: impl Into<Bytes>) -> Self {
        Self::new([data.into()])
    }

    /// Split `data` into chunks of at most `size` bytes.
    pub fn chunked(data: impl Into<Bytes>, size: usize) -> Self {
        let mut data: Bytes = data.into();
        assert!(size > 0, "chunk size must be positive");
        let mut chunks = VecDeque::new();
        while !data.is_empty() {
            chunks.push_back(data.split_to(size.min(data.len())));
        }
        SliceSource {
            chunks,
            cancel: CancelFlag::new(),
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl ChunkSource for SliceSource {
    fn next_chunk(&mut self) -> Result<Bytes, DecodeError> {
        if self.cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        Ok(self.chunks.pop_front().unwrap_or_default())
    }
}

/// Reads fixed-size chunks from a file until EOF.
///
/// The file handle is owned exclusively by the source for the lifetime of
/// the decode; dropping the source (or the driver holding it) releases it.
pub struct FileSource {
    file: File,
    chunk_size: usize,
    priority: IoPriority,
    cancel: CancelFlag,
}

impl FileSource {
    pub fn new(file: File, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        FileSource {
            file,
            chunk_size,
            priority: IoPriority::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_priority(mut self, priority: IoPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn priority(&self) -> IoPriority {
        self.priority
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl ChunkSource for FileSource {
    fn next_chunk(&mut self) -> Result<Bytes, DecodeError> {
        if self.cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        // Loop until the buffer is full or EOF; short reads are legal.
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }
}
