//! Codec header and footer framing with CRC32 verification.
//!
//! Every segment file begins with a header
//! `CODEC_MAGIC ∥ codecName ∥ version ∥ objectID(16) ∥ suffix`
//! and ends with a 16-byte footer
//! `FOOTER_MAGIC ∥ algorithmID ∥ checksum(u64 LE, high 32 bits zero)`.
//! The checksum is a CRC32 over every byte of the file before it, including
//! the footer magic and algorithm id.

use crate::error::{FalxError, Result};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Magic value leading every codec header (big-endian on disk).
pub const CODEC_MAGIC: u32 = 0x3FD7_6C17;

/// Magic value leading every codec footer; bitwise complement of the header
/// magic so neither can be mistaken for the other.
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Only checksum algorithm id defined: CRC32.
pub const CHECKSUM_ALGORITHM_CRC32: u32 = 0;

/// Total footer length in bytes.
pub const FOOTER_LENGTH: u64 = 16;

/// A file's identity as parsed from its codec header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecHeader {
    /// Codec name recorded in the file.
    pub codec: String,
    /// Format version.
    pub version: u32,
    /// 16-byte object (segment) id.
    pub object_id: [u8; 16],
    /// Segment suffix, usually empty.
    pub suffix: String,
}

/// Write a codec header.
pub fn write_header<W: StorageOutput>(
    writer: &mut StructWriter<W>,
    codec: &str,
    version: u32,
    object_id: &[u8; 16],
    suffix: &str,
) -> Result<()> {
    writer.write_u32_be(CODEC_MAGIC)?;
    writer.write_string(codec)?;
    writer.write_u32(version)?;
    writer.write_raw(object_id)?;
    writer.write_string(suffix)
}

/// Read and validate a codec header.
///
/// `resource` names the file for error messages. The version must fall in
/// `min_version..=max_version`; if `expected_id` is given it must match the
/// id in the file.
pub fn check_header<R: StorageInput>(
    reader: &mut StructReader<R>,
    codec: &str,
    min_version: u32,
    max_version: u32,
    expected_id: Option<&[u8; 16]>,
    resource: &str,
) -> Result<CodecHeader> {
    let magic = reader.read_u32_be()?;
    if magic != CODEC_MAGIC {
        return Err(FalxError::corrupt(format!(
            "codec header mismatch in {resource}: expected magic {CODEC_MAGIC:#x}, got {magic:#x}"
        )));
    }
    let actual_codec = reader.read_string()?;
    if actual_codec != codec {
        return Err(FalxError::corrupt(format!(
            "codec mismatch in {resource}: expected {codec}, got {actual_codec}"
        )));
    }
    let version = reader.read_u32()?;
    if version < min_version {
        return Err(FalxError::IndexFormatTooOld {
            resource: resource.to_string(),
            version,
            min: min_version,
            max: max_version,
        });
    }
    if version > max_version {
        return Err(FalxError::IndexFormatTooNew {
            resource: resource.to_string(),
            version,
            min: min_version,
            max: max_version,
        });
    }
    let id_bytes = reader.read_raw(16)?;
    let mut object_id = [0u8; 16];
    object_id.copy_from_slice(&id_bytes);
    if let Some(expected) = expected_id {
        if expected != &object_id {
            return Err(FalxError::corrupt(format!(
                "object id mismatch in {resource}: expected {expected:02x?}, got {object_id:02x?}"
            )));
        }
    }
    let suffix = reader.read_string()?;
    Ok(CodecHeader {
        codec: actual_codec,
        version,
        object_id,
        suffix,
    })
}

/// Write the codec footer, sealing the file.
pub fn write_footer<W: StorageOutput>(writer: &mut StructWriter<W>) -> Result<()> {
    writer.write_u32_be(FOOTER_MAGIC)?;
    writer.write_u32_be(CHECKSUM_ALGORITHM_CRC32)?;
    // checksum covers everything written so far, footer prefix included
    let checksum = writer.checksum() as u64;
    writer.write_u64(checksum)
}

/// Validate the footer of a sequentially consumed file.
///
/// The reader must be positioned exactly at the footer start with a valid
/// running checksum (no seeks since position 0).
pub fn check_footer<R: StorageInput>(reader: &mut StructReader<R>, resource: &str) -> Result<u32> {
    let footer_start = reader.len().checked_sub(FOOTER_LENGTH).ok_or_else(|| {
        FalxError::corrupt(format!("{resource} is shorter than a codec footer"))
    })?;
    if reader.position() != footer_start {
        return Err(FalxError::corrupt(format!(
            "misplaced codec footer in {resource}: position {} but footer starts at {footer_start}",
            reader.position()
        )));
    }

    let magic = reader.read_u32_be()?;
    if magic != FOOTER_MAGIC {
        return Err(FalxError::corrupt(format!(
            "codec footer mismatch in {resource}: expected magic {FOOTER_MAGIC:#x}, got {magic:#x}"
        )));
    }
    let algorithm = reader.read_u32_be()?;
    if algorithm != CHECKSUM_ALGORITHM_CRC32 {
        return Err(FalxError::corrupt(format!(
            "unknown checksum algorithm {algorithm} in {resource}"
        )));
    }

    let expected = reader
        .checksum()
        .ok_or_else(|| FalxError::invalid_argument("footer check requires a sequential read"))?;
    let stored = reader.read_u64()?;
    if stored > u32::MAX as u64 {
        return Err(FalxError::corrupt(format!(
            "invalid checksum in {resource}: high 32 bits must be zero, got {stored:#x}"
        )));
    }
    if stored as u32 != expected {
        return Err(FalxError::corrupt(format!(
            "checksum mismatch in {resource}: stored {stored:#010x}, computed {expected:#010x}"
        )));
    }
    Ok(expected)
}

/// Stream an entire file and verify its footer checksum.
///
/// This is the `check_integrity` primitive: it re-reads every byte of the
/// named file and fails with [`FalxError::IndexCorrupt`] on any mismatch.
pub fn verify_file(storage: &dyn Storage, name: &str) -> Result<()> {
    let input = storage.open_input(name)?;
    let mut reader = StructReader::new(input);
    let len = reader.len();
    let body = len
        .checked_sub(FOOTER_LENGTH)
        .ok_or_else(|| FalxError::corrupt(format!("{name} is shorter than a codec footer")))?;
    reader.skip(body)?;
    check_footer(&mut reader, name)?;
    reader.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{MemoryStorageConfig, Storage};

    const ID: [u8; 16] = [7u8; 16];

    fn storage() -> MemoryStorage {
        MemoryStorage::new(MemoryStorageConfig::default())
    }

    fn write_sample(storage: &MemoryStorage, name: &str) {
        let out = storage.create_output(name).unwrap();
        let mut writer = StructWriter::new(out);
        write_header(&mut writer, "FalxTest", 1, &ID, "").unwrap();
        writer.write_string("payload").unwrap();
        write_footer(&mut writer).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_header_footer_roundtrip() {
        let storage = storage();
        write_sample(&storage, "sample");

        let input = storage.open_input("sample").unwrap();
        let mut reader = StructReader::new(input);
        let header = check_header(&mut reader, "FalxTest", 1, 1, Some(&ID), "sample").unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.object_id, ID);
        assert_eq!(reader.read_string().unwrap(), "payload");
        check_footer(&mut reader, "sample").unwrap();
    }

    #[test]
    fn test_verify_file() {
        let storage = storage();
        write_sample(&storage, "ok");
        verify_file(&storage, "ok").unwrap();
    }

    #[test]
    fn test_flipped_byte_detected() {
        let storage = storage();
        write_sample(&storage, "corrupt");

        // flip one payload byte and rewrite the file
        let mut input = storage.open_input("corrupt").unwrap();
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut input, &mut bytes).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x01;
        let mut out = storage.create_output("corrupt").unwrap();
        std::io::Write::write_all(&mut out, &bytes).unwrap();
        out.close().unwrap();

        assert!(matches!(
            verify_file(&storage, "corrupt"),
            Err(FalxError::IndexCorrupt(_))
        ));
    }

    #[test]
    fn test_version_range() {
        let storage = storage();
        write_sample(&storage, "versioned");

        let input = storage.open_input("versioned").unwrap();
        let mut reader = StructReader::new(input);
        let err = check_header(&mut reader, "FalxTest", 2, 3, None, "versioned").unwrap_err();
        assert!(matches!(err, FalxError::IndexFormatTooOld { .. }));

        let input = storage.open_input("versioned").unwrap();
        let mut reader = StructReader::new(input);
        let err = check_header(&mut reader, "FalxTest", 0, 0, None, "versioned").unwrap_err();
        assert!(matches!(err, FalxError::IndexFormatTooNew { .. }));
    }

    #[test]
    fn test_wrong_codec_name() {
        let storage = storage();
        write_sample(&storage, "named");
        let input = storage.open_input("named").unwrap();
        let mut reader = StructReader::new(input);
        assert!(check_header(&mut reader, "OtherCodec", 1, 1, None, "named").is_err());
    }
}
