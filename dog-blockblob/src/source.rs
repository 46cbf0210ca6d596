use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use tokio::io::AsyncReadExt;

use crate::config::check_block_size;
use crate::{BlockId, Chunk, UploadError, UploadResult};

/// Stream of chunks in read order
pub type ChunkStream = Pin<Box<dyn Stream<Item = UploadResult<Chunk>> + Send>>;

/// What an upload reads its bytes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadInput {
    /// In-memory content
    Buffer(Bytes),
    /// A regular file streamed from disk
    File(PathBuf),
}

impl UploadInput {
    pub fn buffer<B: Into<Bytes>>(content: B) -> Self {
        Self::Buffer(content.into())
    }

    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self::File(path.into())
    }

    /// Decide whether `content_or_path` is content or names a file.
    ///
    /// Anything containing a NUL byte is content. Otherwise, if the bytes name
    /// an existing regular file, the file is read. Everything else is content.
    /// Callers that know which one they have should use [`UploadInput::buffer`]
    /// or [`UploadInput::file`] instead: a payload that happens to spell out a
    /// local path is read from disk.
    pub fn classify<B: Into<Bytes>>(content_or_path: B) -> Self {
        let raw: Bytes = content_or_path.into();

        if raw.is_empty() || raw.contains(&0) {
            return Self::Buffer(raw);
        }

        match path_from_bytes(&raw) {
            Some(path) if path.is_file() => Self::File(path),
            _ => Self::Buffer(raw),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

#[cfg(unix)]
fn path_from_bytes(raw: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(raw)))
}

#[cfg(not(unix))]
fn path_from_bytes(raw: &[u8]) -> Option<PathBuf> {
    std::str::from_utf8(raw).ok().map(PathBuf::from)
}

impl From<Vec<u8>> for UploadInput {
    fn from(content: Vec<u8>) -> Self {
        Self::Buffer(Bytes::from(content))
    }
}

impl From<Bytes> for UploadInput {
    fn from(content: Bytes) -> Self {
        Self::Buffer(content)
    }
}

impl From<PathBuf> for UploadInput {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

enum ChunkReader {
    Buffer { data: Bytes, offset: usize },
    File { file: tokio::fs::File, read: u64 },
}

/// Forward-only reader that cuts its input into blocks of at most `block_size` bytes.
///
/// A source cannot be rewound; open a new one to read from the start again.
pub struct ChunkSource {
    reader: ChunkReader,
    block_size: usize,
    next_sequence: u32,
    len: Option<u64>,
}

impl ChunkSource {
    /// Open a source over `input`
    pub async fn open(input: UploadInput, block_size: usize) -> UploadResult<Self> {
        match input {
            UploadInput::Buffer(data) => Self::from_bytes(data, block_size),
            UploadInput::File(path) => {
                check_block_size(block_size)?;
                let file = tokio::fs::File::open(&path).await?;
                let len = file.metadata().await?.len();
                Ok(Self {
                    reader: ChunkReader::File { file, read: 0 },
                    block_size,
                    next_sequence: 1,
                    len: Some(len),
                })
            }
        }
    }

    /// Source over in-memory content; chunks share the buffer rather than copying it
    pub fn from_bytes<B: Into<Bytes>>(data: B, block_size: usize) -> UploadResult<Self> {
        check_block_size(block_size)?;
        let data = data.into();
        let len = data.len() as u64;
        Ok(Self {
            reader: ChunkReader::Buffer { data, offset: 0 },
            block_size,
            next_sequence: 1,
            len: Some(len),
        })
    }

    /// Input length when it was known at open time
    pub fn len_hint(&self) -> Option<u64> {
        self.len
    }

    /// Number of chunks handed out so far
    pub fn emitted(&self) -> u32 {
        self.next_sequence - 1
    }

    /// Read the next chunk, `None` once every input byte has been returned
    pub async fn next_chunk(&mut self) -> UploadResult<Option<Chunk>> {
        let payload = match &mut self.reader {
            ChunkReader::Buffer { data, offset } => {
                if *offset >= data.len() {
                    return Ok(None);
                }
                let end = (*offset + self.block_size).min(data.len());
                let payload = data.slice(*offset..end);
                *offset = end;
                payload
            }
            ChunkReader::File { file, read } => {
                let remaining = self.len.unwrap_or(0).saturating_sub(*read);
                let capacity = usize::try_from(remaining).map_or(self.block_size, |r| r.min(self.block_size));
                let mut buf = Vec::with_capacity(capacity);
                (&mut *file).take(self.block_size as u64).read_to_end(&mut buf).await?;
                if buf.is_empty() {
                    return Ok(None);
                }
                *read += buf.len() as u64;
                Bytes::from(buf)
            }
        };

        let sequence = self.next_sequence;
        if sequence > BlockId::MAX_SEQUENCE {
            return Err(UploadError::TooManyBlocks {
                max: BlockId::MAX_SEQUENCE,
            });
        }
        self.next_sequence += 1;

        Ok(Some(Chunk::new(sequence, payload)))
    }

    /// Turn the source into a lazy stream of chunks
    pub fn into_stream(self) -> ChunkStream {
        let mut source = self;
        Box::pin(async_stream::try_stream! {
            while let Some(chunk) = source.next_chunk().await? {
                yield chunk;
            }
        })
    }
}
