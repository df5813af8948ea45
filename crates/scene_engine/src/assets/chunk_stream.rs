//! Tagged binary chunk streams
//!
//! Every chunk starts with a little-endian header:
//!
//! ```text
//! id: u32 | version: u16 | size: u32 | payload (size bytes)
//! ```
//!
//! Chunks nest: a payload may itself hold chunks. Readers skip chunks whose
//! id they do not know or whose version is newer than they understand, using
//! the size field, so older code can read files written by newer code.
//!
//! Structured records inside a payload are bincode-encoded with the standard
//! configuration; only the chunk framing is written by hand.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Size of a chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = 4 + 2 + 4;

/// Build a chunk id from a four-character tag
pub const fn chunk_id(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Chunk stream errors
#[derive(Error, Debug)]
pub enum ChunkError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ran out of data
    #[error("Unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes requested
        needed: usize,
        /// Bytes left
        available: usize,
    },

    /// A chunk claims more bytes than its parent holds
    #[error("Chunk {id:#010x} of {size} bytes overruns its parent ({available} bytes left)")]
    Overrun {
        /// Chunk id
        id: u32,
        /// Declared payload size
        size: u32,
        /// Bytes left in the parent
        available: usize,
    },

    /// `end_chunk` without a matching `begin_chunk`
    #[error("No open chunk to end")]
    NoOpenChunk,

    /// `finish` with chunks still open
    #[error("{0} chunk(s) still open")]
    UnclosedChunks(usize),

    /// Payload does not fit the 32-bit size field
    #[error("Chunk payload of {0} bytes is too large")]
    TooLarge(usize),

    /// String payload is not UTF-8
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// Record could not be encoded
    #[error("Record encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Record payload is malformed
    #[error("Record decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Data parsed but is inconsistent
    #[error("Invalid data: {0}")]
    Invalid(String),
}

/// Parsed chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Chunk type
    pub id: u32,
    /// Payload layout version
    pub version: u16,
    /// Payload size in bytes
    pub size: u32,
}

/// Result of reading a chunk the caller asked for
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkRead<T> {
    /// The chunk was understood and parsed
    Read(T),
    /// The chunk was skipped by size
    Skipped(ChunkHeader),
}

impl<T> ChunkRead<T> {
    /// Parsed value, if the chunk was read
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Read(value) => Some(value),
            Self::Skipped(_) => None,
        }
    }
}

/// Writes nested chunks into a byte buffer
#[derive(Debug, Default)]
pub struct ChunkWriter {
    buffer: Vec<u8>,
    open: Vec<usize>,
}

impl ChunkWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a chunk; its size is patched by [`Self::end_chunk`]
    pub fn begin_chunk(&mut self, id: u32, version: u16) {
        self.write_u32(id);
        self.write_u16(version);
        self.open.push(self.buffer.len());
        self.write_u32(0);
    }

    /// Close the innermost open chunk
    pub fn end_chunk(&mut self) -> Result<(), ChunkError> {
        let size_at = self.open.pop().ok_or(ChunkError::NoOpenChunk)?;
        let payload = self.buffer.len() - size_at - 4;
        let size = u32::try_from(payload).map_err(|_| ChunkError::TooLarge(payload))?;
        self.buffer[size_at..size_at + 4].copy_from_slice(&size.to_le_bytes());
        Ok(())
    }

    /// Write a whole chunk whose payload is produced by `body`
    pub fn chunk(
        &mut self,
        id: u32,
        version: u16,
        body: impl FnOnce(&mut Self) -> Result<(), ChunkError>,
    ) -> Result<(), ChunkError> {
        self.begin_chunk(id, version);
        body(self)?;
        self.end_chunk()
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Nothing written yet
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the finished buffer
    pub fn finish(self) -> Result<Vec<u8>, ChunkError> {
        if !self.open.is_empty() {
            return Err(ChunkError::UnclosedChunks(self.open.len()));
        }
        Ok(self.buffer)
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a byte
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a little-endian `u16`
    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write a little-endian `u32`
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write a little-endian `f32`
    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write a collection length as `u32`
    pub fn write_len(&mut self, len: usize) -> Result<(), ChunkError> {
        let len = u32::try_from(len).map_err(|_| ChunkError::TooLarge(len))?;
        self.write_u32(len);
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) -> Result<(), ChunkError> {
        self.write_len(value.len())?;
        self.write_bytes(value.as_bytes());
        Ok(())
    }

    /// Append a bincode-encoded record
    pub fn write_record<T: Serialize>(&mut self, value: &T) -> Result<(), ChunkError> {
        let encoded = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
        self.write_bytes(&encoded);
        Ok(())
    }
}

/// Reads chunks and primitives from a byte slice
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ChunkReader<'a> {
    /// Read from the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Everything consumed
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], ChunkError> {
        if count > self.remaining() {
            return Err(ChunkError::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ChunkError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    /// Read the next chunk header and return a reader over its payload
    ///
    /// The payload is consumed from this reader whether or not the caller
    /// parses it, so unknown chunks are skipped by dropping the sub-reader.
    pub fn next_chunk(&mut self) -> Result<Option<(ChunkHeader, ChunkReader<'a>)>, ChunkError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let header = ChunkHeader {
            id: self.read_u32()?,
            version: self.read_u16()?,
            size: self.read_u32()?,
        };
        let size = header.size as usize;
        if size > self.remaining() {
            return Err(ChunkError::Overrun {
                id: header.id,
                size: header.size,
                available: self.remaining(),
            });
        }
        let payload = self.take(size)?;
        Ok(Some((header, ChunkReader::new(payload))))
    }

    /// Read the next chunk, parsing it only if it has the expected id and
    /// a version no newer than `max_version`
    pub fn read_chunk<T>(
        &mut self,
        id: u32,
        max_version: u16,
        parse: impl FnOnce(u16, &mut ChunkReader<'a>) -> Result<T, ChunkError>,
    ) -> Result<ChunkRead<T>, ChunkError> {
        let Some((header, mut payload)) = self.next_chunk()? else {
            return Err(ChunkError::UnexpectedEof {
                needed: CHUNK_HEADER_SIZE,
                available: 0,
            });
        };
        if header.id != id || header.version > max_version {
            log::debug!(
                "Skipping chunk {:#010x} v{} ({} bytes)",
                header.id,
                header.version,
                header.size
            );
            return Ok(ChunkRead::Skipped(header));
        }
        parse(header.version, &mut payload).map(ChunkRead::Read)
    }

    /// Read a byte
    pub fn read_u8(&mut self) -> Result<u8, ChunkError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian `u16`
    pub fn read_u16(&mut self) -> Result<u16, ChunkError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian `u32`
    pub fn read_u32(&mut self) -> Result<u32, ChunkError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian `f32`
    pub fn read_f32(&mut self) -> Result<f32, ChunkError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Read a collection length, rejecting lengths that cannot fit the
    /// remaining data at `min_item_size` bytes per item
    pub fn read_len(&mut self, min_item_size: usize) -> Result<usize, ChunkError> {
        let len = self.read_u32()? as usize;
        let needed = len.saturating_mul(min_item_size);
        if needed > self.remaining() {
            return Err(ChunkError::UnexpectedEof {
                needed,
                available: self.remaining(),
            });
        }
        Ok(len)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, ChunkError> {
        let len = self.read_len(1)?;
        Ok(String::from_utf8(self.take(len)?.to_vec())?)
    }

    /// Read a record written by [`ChunkWriter::write_record`]
    pub fn read_record<T: DeserializeOwned>(&mut self) -> Result<T, ChunkError> {
        let (value, used) = bincode::serde::decode_from_slice(
            &self.data[self.position..],
            bincode::config::standard(),
        )?;
        self.position += used;
        Ok(value)
    }
}
