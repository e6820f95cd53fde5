//! Structured binary I/O over storage streams.
//!
//! [`StructWriter`] and [`StructReader`] wrap a raw storage stream with the
//! primitive encodings every segment file is built from: little-endian fixed
//! integers, ULEB128 variable integers, length-prefixed strings and byte
//! slices. Both sides maintain a running CRC32 over every byte produced or
//! consumed, which the codec footer (see [`crate::storage::checksum`])
//! records and verifies.

use std::collections::BTreeMap;
use std::io::SeekFrom;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::error::{FalxError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint::encode_u64;

/// A structured writer for one segment file.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: crc32fast::Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured writer at position 0.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: crc32fast::Hasher::new(),
            position: 0,
        }
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.hasher.update(data);
        self.position += data.len() as u64;
        Ok(())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.hasher.update(&[value]);
        self.position += 1;
        Ok(())
    }

    /// Write a u32 (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 4;
        Ok(())
    }

    /// Write a u32 (big-endian); used only for codec magic values.
    pub fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<BigEndian>(value)?;
        self.hasher.update(&value.to_be_bytes());
        self.position += 4;
        Ok(())
    }

    /// Write a u64 (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(())
    }

    /// Write a variable-length u32.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        self.write_vlong(value as u64)
    }

    /// Write a variable-length u64.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.put(&encoded)
    }

    /// Write a string with a VInt length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_vint(value.len() as u32)?;
        self.put(value.as_bytes())
    }

    /// Write a byte slice with a VInt length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_vint(value.len() as u32)?;
        self.put(value)
    }

    /// Write raw bytes without a length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.put(value)
    }

    /// Write a string-to-string map (sorted for deterministic output).
    pub fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.write_vint(map.len() as u32)?;
        for (key, value) in map {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC32 of every byte written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Flush, fsync and close the underlying output.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush_and_sync()?;
        self.writer.close()
    }
}

/// A structured reader for one segment file.
///
/// Seeking is allowed for random-access files (postings, positions); it
/// invalidates the running checksum, so footer verification is only legal on
/// readers that consumed the file sequentially from the start.
pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: crc32fast::Hasher,
    position: u64,
    length: u64,
    checksum_valid: bool,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured reader at position 0.
    pub fn new(reader: R) -> Self {
        let length = reader.len();
        StructReader {
            reader,
            hasher: crc32fast::Hasher::new(),
            position: 0,
            length,
            checksum_valid: true,
        }
    }

    fn take(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FalxError::corrupt("unexpected end of file")
            } else {
                FalxError::Io(e)
            }
        })?;
        self.hasher.update(buf);
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.take(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a u32 (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.take(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a u32 (big-endian); used only for codec magic values.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.take(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a u64 (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.take(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Skip `n` bytes, keeping the running checksum up to date.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        let mut scratch = [0u8; 512];
        while remaining > 0 {
            let take = remaining.min(scratch.len() as u64) as usize;
            self.take(&mut scratch[..take])?;
            remaining -= take as u64;
        }
        Ok(())
    }

    /// Read a variable-length u32.
    pub fn read_vint(&mut self) -> Result<u32> {
        let value = self.read_vlong()?;
        if value > u32::MAX as u64 {
            return Err(FalxError::corrupt("VInt exceeds u32 range"));
        }
        Ok(value as u32)
    }

    /// Read a variable-length u64.
    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            if shift >= 64 {
                return Err(FalxError::corrupt("VLong overflow"));
            }
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read a length-prefixed string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| FalxError::corrupt(format!("invalid UTF-8: {e}")))
    }

    /// Read a length-prefixed byte slice.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_vint()? as usize;
        let mut bytes = vec![0u8; length];
        self.take(&mut bytes)?;
        Ok(bytes)
    }

    /// Read exactly `length` raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.take(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a string-to-string map written by [`StructWriter::write_string_map`].
    pub fn read_string_map(&mut self) -> Result<BTreeMap<String, String>> {
        let count = self.read_vint()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Seek to an absolute position, invalidating the running checksum.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;
        self.position = pos;
        self.checksum_valid = false;
        Ok(())
    }

    /// Current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total file length.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// CRC32 of every byte consumed so far, or `None` after a seek.
    pub fn checksum(&self) -> Option<u32> {
        if self.checksum_valid {
            Some(self.hasher.clone().finalize())
        } else {
            None
        }
    }

    /// Clone the underlying input into an independent reader at position 0.
    pub fn clone_reader(&self) -> Result<StructReader<Box<dyn StorageInput>>> {
        Ok(StructReader::new(self.reader.clone_input()?))
    }

    /// Close the underlying input.
    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}
