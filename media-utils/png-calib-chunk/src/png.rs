use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::{CHUNK_TYPE, CRC32, ChunkRecord, Error, PNG_MAX_CHUNK_LEN, Result};

/// The eight bytes every PNG file starts with.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const IEND: [u8; 4] = *b"IEND";

/// A chunk exactly as found in a PNG stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub chunk_type: [u8; 4],
    pub data: Vec<u8>,
    /// The CRC stored in the stream. It is not verified when reading.
    pub crc: u32,
}

impl RawChunk {
    pub fn new(chunk_type: [u8; 4], data: Vec<u8>) -> Self {
        let crc = chunk_crc(&chunk_type, &data);
        Self {
            chunk_type,
            data,
            crc,
        }
    }

    /// Critical chunks have an uppercase first letter.
    pub fn is_critical(&self) -> bool {
        self.chunk_type[0].is_ascii_uppercase()
    }

    pub fn crc_ok(&self) -> bool {
        self.crc == chunk_crc(&self.chunk_type, &self.data)
    }

    pub fn type_str(&self) -> String {
        String::from_utf8_lossy(&self.chunk_type).into_owned()
    }

    /// Write the chunk with its stored CRC, byte for byte.
    fn write_verbatim<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<BigEndian>(self.data.len() as u32)?;
        w.write_all(&self.chunk_type)?;
        w.write_all(&self.data)?;
        w.write_u32::<BigEndian>(self.crc)?;
        Ok(())
    }
}

fn chunk_crc(chunk_type: &[u8; 4], data: &[u8]) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(chunk_type);
    digest.update(data);
    digest.finalize()
}

fn eof_is_truncation(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::Truncated
    } else {
        Error::Io { source: e }
    }
}

fn read_signature<R: Read>(r: &mut R) -> Result<()> {
    let mut sig = [0u8; 8];
    match r.read_exact(&mut sig) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::NotPng),
        Err(e) => return Err(e.into()),
    }
    if sig != PNG_SIGNATURE {
        return Err(Error::NotPng);
    }
    Ok(())
}

/// Fill `buf` as far as possible, returning the number of bytes read.
fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read the next chunk. Returns `None` at a clean end of stream.
fn read_next_chunk<R: Read>(r: &mut R) -> Result<Option<RawChunk>> {
    let mut len_buf = [0u8; 4];
    match read_up_to(r, &mut len_buf)? {
        0 => return Ok(None),
        4 => {}
        _ => return Err(Error::Truncated),
    }
    let len = BigEndian::read_u32(&len_buf);
    if len as usize > PNG_MAX_CHUNK_LEN {
        return Err(Error::InvalidChunkLength(len));
    }

    let mut chunk_type = [0u8; 4];
    r.read_exact(&mut chunk_type).map_err(eof_is_truncation)?;

    // Do not trust `len` for the allocation, a corrupt file could claim 2 GB.
    let mut data = Vec::new();
    r.by_ref().take(len.into()).read_to_end(&mut data)?;
    if data.len() != len as usize {
        return Err(Error::Truncated);
    }

    let crc = r.read_u32::<BigEndian>().map_err(eof_is_truncation)?;
    Ok(Some(RawChunk {
        chunk_type,
        data,
        crc,
    }))
}

/// Read all chunks of a PNG stream, up to and including `IEND`.
///
/// Anything after `IEND` is ignored.
pub fn read_raw_chunks<R: Read>(mut r: R) -> Result<Vec<RawChunk>> {
    read_signature(&mut r)?;
    let mut chunks = Vec::new();
    loop {
        let chunk = read_next_chunk(&mut r)?.ok_or(Error::Truncated)?;
        let is_end = chunk.chunk_type == IEND;
        chunks.push(chunk);
        if is_end {
            return Ok(chunks);
        }
    }
}

/// Write one chunk, computing its CRC.
pub fn write_raw_chunk<W: Write>(w: &mut W, chunk_type: &[u8; 4], data: &[u8]) -> Result<()> {
    if data.len() > PNG_MAX_CHUNK_LEN {
        return Err(Error::ChunkTooLarge(data.len()));
    }
    w.write_u32::<BigEndian>(data.len() as u32)?;
    w.write_all(chunk_type)?;
    w.write_all(data)?;
    w.write_u32::<BigEndian>(chunk_crc(chunk_type, data))?;
    Ok(())
}

/// Find the first calibration record in a PNG stream.
///
/// Chunks are scanned in order. Reading stops at the first [CHUNK_TYPE]
/// chunk, so the rest of the stream is never looked at. Returns `Ok(None)`
/// when `IEND` is reached without finding one.
///
/// The PNG CRC of every chunk before the record is checked, so a record
/// whose chunk type got damaged is an error, not absence. The CRC of the
/// record chunk itself is not checked: damage there is reported by
/// [ChunkRecord::decode].
pub fn read_chunk<R: Read>(mut r: R) -> Result<Option<ChunkRecord>> {
    read_signature(&mut r)?;
    loop {
        let chunk = read_next_chunk(&mut r)?.ok_or(Error::Truncated)?;
        if chunk.chunk_type == CHUNK_TYPE {
            return Ok(Some(ChunkRecord::from_chunk_data(&chunk.data)?));
        }
        if !chunk.crc_ok() {
            return Err(Error::ChunkCrc {
                chunk_type: chunk.type_str(),
            });
        }
        if chunk.chunk_type == IEND {
            return Ok(None);
        }
    }
}

/// Find the first calibration record in the PNG file at `path`.
///
/// `Ok(None)` means the file is a PNG without a record. An unreadable file,
/// a file which is not PNG, and a truncated PNG are errors.
pub fn read_chunk_from_file<P: AsRef<Path>>(path: P) -> Result<Option<ChunkRecord>> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|source| Error::IoPath {
        path: path.display().to_string(),
        source,
    })?;
    read_chunk(BufReader::new(f))
}

/// Return `png` with `record` embedded.
///
/// The record goes right before `IEND`. Every other chunk is copied
/// verbatim, except previous calibration chunks which are dropped.
pub fn embed_chunk(png: &[u8], record: &ChunkRecord) -> Result<Vec<u8>> {
    let chunks = read_raw_chunks(png)?;
    let record_data = record.to_chunk_data();

    let mut out = Vec::with_capacity(png.len() + record_data.len() + 12);
    out.extend_from_slice(&PNG_SIGNATURE);
    for chunk in chunks.iter().filter(|c| c.chunk_type != CHUNK_TYPE) {
        if chunk.chunk_type == IEND {
            write_raw_chunk(&mut out, &CHUNK_TYPE, &record_data)?;
        }
        chunk.write_verbatim(&mut out)?;
    }
    Ok(out)
}

/// A minimal valid PNG: one black 8-bit grayscale pixel.
pub fn blank_canvas() -> Result<Vec<u8>> {
    let img = image::GrayImage::new(1, 1);
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Save `record` in the PNG file at `path`.
///
/// If `path` is an existing PNG, its image chunks are kept unchanged and the
/// record is added (replacing a previous one). If `path` does not exist or is
/// empty, a [blank_canvas] carrying the record is written. An existing file
/// which is not PNG is left alone and [Error::NotPng] is returned.
///
/// An existing file is replaced by renaming a fully written temporary file
/// over it, so a failed write leaves the original image intact.
pub fn save_chunk_to_file<P: AsRef<Path>>(path: P, record: &ChunkRecord) -> Result<()> {
    let path = path.as_ref();
    let io_path = |source: std::io::Error| Error::IoPath {
        path: path.display().to_string(),
        source,
    };

    let existing = match std::fs::read(path) {
        Ok(existing) if existing.is_empty() => None,
        Ok(existing) => Some(existing),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_path(e)),
    };
    match existing {
        Some(base) => {
            let annotated = embed_chunk(&base, record)?;
            replace_file(path, &annotated).map_err(io_path)
        }
        None => {
            let annotated = embed_chunk(&blank_canvas()?, record)?;
            std::fs::write(path, annotated).map_err(io_path)
        }
    }
}

/// Write `contents` to a temporary file next to `path`, then rename it over
/// `path`. The permissions of `path` are kept.
fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let permissions = std::fs::metadata(path)?.permissions();
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
