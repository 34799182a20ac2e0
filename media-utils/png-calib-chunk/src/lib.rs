//! Embed an opaque text payload, such as a serialized camera calibration, in
//! a private ancillary PNG chunk and recover it later with corruption
//! detection.
//!
//! The payload is stored in a chunk of type [CHUNK_TYPE] (`caLb`) whose data
//! is a serialized [ChunkRecord]:
//!
//! ```text
//! [length:u32 BE][payload:length bytes][checksum:u32 BE]
//! ```
//!
//! `checksum` is CRC-32/ISO-HDLC of the payload bytes. This is the same CRC
//! which PNG uses for its own chunks: polynomial 0x04C11DB7 (reflected
//! 0xEDB88320), initial value 0xFFFFFFFF, input and output reflected, final
//! xor 0xFFFFFFFF.
//!
//! The chunk type is ancillary, private and safe-to-copy, so PNG decoders
//! which do not know it skip it and image editors may carry it along.

use byteorder::{BigEndian, ByteOrder};

mod png;

pub use crate::png::{
    PNG_SIGNATURE, RawChunk, blank_canvas, embed_chunk, read_chunk, read_chunk_from_file,
    read_raw_chunks, save_chunk_to_file, write_raw_chunk,
};

pub type Result<M> = std::result::Result<M, Error>;

/// Chunk type code of the calibration payload chunk.
pub const CHUNK_TYPE: [u8; 4] = *b"caLb";

/// Largest data length of a single PNG chunk (2^31 - 1).
pub const PNG_MAX_CHUNK_LEN: usize = (1 << 31) - 1;

/// Bytes taken by the length and checksum fields of a serialized record.
const RECORD_OVERHEAD: usize = 8;

/// Largest payload which fits in a single record.
pub const MAX_PAYLOAD_LEN: usize = PNG_MAX_CHUNK_LEN - RECORD_OVERHEAD;

pub(crate) const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Compute the record checksum of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("payload of {0} bytes does not fit in a PNG chunk")]
    PayloadTooLarge(usize),
    #[error("chunk data of {0} bytes does not fit in a PNG chunk")]
    ChunkTooLarge(usize),
    #[error("invalid PNG chunk length {0}")]
    InvalidChunkLength(u32),
    #[error("not a PNG file")]
    NotPng,
    #[error("PNG chunk stream ends before IEND")]
    Truncated,
    #[error("CRC mismatch in PNG chunk {chunk_type}")]
    ChunkCrc { chunk_type: String },
    #[error("{source}")]
    Decode {
        #[from]
        source: DecodeError,
    },
    #[error("image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },
    #[error("{source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("From {path}: {source}")]
    IoPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The reason a [ChunkRecord] failed to decode.
///
/// All variants indicate a corrupt record. The `Display` output is meant to
/// be shown to users.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("corrupt record: chunk of {0} bytes is too short to hold length and checksum")]
    TooShort(usize),
    #[error("corrupt record: declared length {declared} but {actual} payload bytes present")]
    LengthMismatch { declared: u32, actual: usize },
    #[error("corrupt record: stored checksum {stored:#010x} does not match computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("corrupt record: payload is not UTF-8 ({0})")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// One embedded payload, as stored in the chunk data.
///
/// A record parsed from a file is not validated. Call [ChunkRecord::decode]
/// to check it and get the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Declared payload length in bytes.
    pub length: u32,
    pub payload: Vec<u8>,
    /// CRC-32 of `payload` at encode time.
    pub checksum: u32,
}

impl ChunkRecord {
    /// Build a record holding `payload` verbatim.
    ///
    /// An empty payload gives a zero-length record.
    pub fn encode(payload: &str) -> Result<Self> {
        let bytes = payload.as_bytes();
        if bytes.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(bytes.len()));
        }
        Ok(Self {
            length: bytes.len() as u32,
            payload: bytes.to_vec(),
            checksum: checksum(bytes),
        })
    }

    /// Validate the record and return its payload text.
    pub fn decode(&self) -> std::result::Result<String, DecodeError> {
        if self.length as usize != self.payload.len() {
            return Err(DecodeError::LengthMismatch {
                declared: self.length,
                actual: self.payload.len(),
            });
        }
        let computed = checksum(&self.payload);
        if computed != self.checksum {
            return Err(DecodeError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        let text = std::str::from_utf8(&self.payload)?;
        Ok(text.to_string())
    }

    /// Serialize to the data of a [CHUNK_TYPE] chunk.
    ///
    /// Fields are written as they are, so a corrupt record stays corrupt.
    pub fn to_chunk_data(&self) -> Vec<u8> {
        let n = self.payload.len();
        let mut buf = vec![0; n + RECORD_OVERHEAD];
        BigEndian::write_u32(&mut buf[..4], self.length);
        buf[4..4 + n].copy_from_slice(&self.payload);
        BigEndian::write_u32(&mut buf[4 + n..], self.checksum);
        buf
    }

    /// Parse the data of a [CHUNK_TYPE] chunk.
    ///
    /// Everything between the length field and the trailing checksum is taken
    /// as payload, whatever the length field says.
    pub fn from_chunk_data(data: &[u8]) -> std::result::Result<Self, DecodeError> {
        if data.len() < RECORD_OVERHEAD {
            return Err(DecodeError::TooShort(data.len()));
        }
        let (head, rest) = data.split_at(4);
        let (payload, tail) = rest.split_at(rest.len() - 4);
        Ok(Self {
            length: BigEndian::read_u32(head),
            payload: payload.to_vec(),
            checksum: BigEndian::read_u32(tail),
        })
    }
}
