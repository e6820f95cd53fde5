//! Segment metadata (`.si`) and the transactional commit point
//! (`segments_N`).
//!
//! A commit writes `pending_segments_N`, fsyncs every referenced file, and
//! renames the pending file into place; readers always open the highest
//! `segments_N` and therefore never observe a partial commit.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::storage::checksum::{check_footer, check_header, write_footer, write_header};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Codec name of the `.si` file.
pub const SEGMENT_INFO_CODEC: &str = "FalxSegmentInfo";
/// Codec name of the `segments_N` file.
pub const SEGMENTS_CODEC: &str = "FalxSegments";
/// Current format version for both files.
pub const SEGMENT_VERSION: u32 = 1;
/// Extension of the per-segment info file.
pub const SEGMENT_INFO_EXTENSION: &str = "si";

/// Immutable description of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment name, e.g. `_0`.
    pub name: String,
    /// Number of documents in the segment.
    pub max_doc: u32,
    /// 16-byte segment id, shared by every file of the segment.
    pub id: [u8; 16],
    /// Format version the segment was written with.
    pub version: u32,
    /// Files belonging to the segment.
    pub files: Vec<String>,
    /// Free-form diagnostics (source, timestamps).
    pub diagnostics: BTreeMap<String, String>,
}

impl SegmentInfo {
    /// Write the `.si` file.
    pub fn write<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        write_header(writer, SEGMENT_INFO_CODEC, SEGMENT_VERSION, &self.id, "")?;
        writer.write_string(&self.name)?;
        writer.write_vint(self.max_doc)?;
        writer.write_vint(self.version)?;
        writer.write_vint(self.files.len() as u32)?;
        for file in &self.files {
            writer.write_string(file)?;
        }
        writer.write_string_map(&self.diagnostics)?;
        write_footer(writer)
    }

    /// Read the `.si` file.
    pub fn read<R: StorageInput>(
        reader: &mut StructReader<R>,
        expected_id: &[u8; 16],
        resource: &str,
    ) -> Result<Self> {
        let header = check_header(
            reader,
            SEGMENT_INFO_CODEC,
            SEGMENT_VERSION,
            SEGMENT_VERSION,
            Some(expected_id),
            resource,
        )?;
        let name = reader.read_string()?;
        let max_doc = reader.read_vint()?;
        let version = reader.read_vint()?;
        let file_count = reader.read_vint()?;
        let mut files = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            files.push(reader.read_string()?);
        }
        let diagnostics = reader.read_string_map()?;
        check_footer(reader, resource)?;
        Ok(SegmentInfo {
            name,
            max_doc,
            id: header.object_id,
            version,
            files,
            diagnostics,
        })
    }
}

/// One segment's entry in a commit point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCommitInfo {
    /// Segment name.
    pub name: String,
    /// Codec the segment was written with.
    pub codec: String,
    /// Delete generation: 0 = no deletes, otherwise the `.liv` file suffix.
    pub del_gen: u64,
    /// Field-infos generation (reserved, always 0 here).
    pub field_infos_gen: u64,
    /// Doc-values generation (reserved, always 0 here).
    pub dv_gen: u64,
    /// Number of soft-deleted documents.
    pub soft_del_count: u32,
    /// Segment id.
    pub id: [u8; 16],
    /// Files referenced by this entry, including generation files.
    pub files: Vec<String>,
}

impl SegmentCommitInfo {
    /// Name of this entry's live-docs file, if it has deletes.
    pub fn live_docs_file(&self) -> Option<String> {
        if self.del_gen == 0 {
            None
        } else {
            Some(format!("{}_{}.liv", self.name, self.del_gen))
        }
    }
}

/// A commit point: the content of one `segments_N` file.
#[derive(Debug, Clone, Default)]
pub struct SegmentInfos {
    /// Commit generation; `segments_<generation>`.
    pub generation: u64,
    /// Monotonic commit version.
    pub version: u64,
    /// Counter used to allocate segment names.
    pub counter: u64,
    /// Per-segment entries in reader order.
    pub segments: Vec<SegmentCommitInfo>,
    /// Free-form user data carried with the commit.
    pub user_data: BTreeMap<String, String>,
}

impl SegmentInfos {
    /// The file name of this commit point.
    pub fn segments_file_name(&self) -> String {
        format!("segments_{}", self.generation)
    }

    /// Allocate the next segment name (`_0`, `_1`, ...).
    pub fn next_segment_name(&mut self) -> String {
        let name = format!("_{}", self.counter);
        self.counter += 1;
        name
    }

    /// Every file referenced by this commit, including the segments file
    /// itself.
    pub fn referenced_files(&self) -> Vec<String> {
        let mut files = vec![self.segments_file_name()];
        for segment in &self.segments {
            files.extend(segment.files.iter().cloned());
        }
        files
    }

    fn write<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        let id = [0u8; 16];
        write_header(writer, SEGMENTS_CODEC, SEGMENT_VERSION, &id, "")?;
        writer.write_u64(self.version)?;
        writer.write_u64(self.counter)?;
        writer.write_u32(self.segments.len() as u32)?;
        for segment in &self.segments {
            writer.write_string(&segment.name)?;
            writer.write_string(&segment.codec)?;
            writer.write_u64(segment.del_gen)?;
            writer.write_u64(segment.field_infos_gen)?;
            writer.write_u64(segment.dv_gen)?;
            writer.write_u32(segment.soft_del_count)?;
            writer.write_raw(&segment.id)?;
            writer.write_vint(segment.files.len() as u32)?;
            for file in &segment.files {
                writer.write_string(file)?;
            }
        }
        writer.write_string_map(&self.user_data)?;
        write_footer(writer)
    }

    fn read<R: StorageInput>(reader: &mut StructReader<R>, resource: &str) -> Result<Self> {
        check_header(
            reader,
            SEGMENTS_CODEC,
            SEGMENT_VERSION,
            SEGMENT_VERSION,
            None,
            resource,
        )?;
        let version = reader.read_u64()?;
        let counter = reader.read_u64()?;
        let num_segments = reader.read_u32()?;
        let mut segments = Vec::with_capacity(num_segments as usize);
        for _ in 0..num_segments {
            let name = reader.read_string()?;
            let codec = reader.read_string()?;
            let del_gen = reader.read_u64()?;
            let field_infos_gen = reader.read_u64()?;
            let dv_gen = reader.read_u64()?;
            let soft_del_count = reader.read_u32()?;
            let id_bytes = reader.read_raw(16)?;
            let mut id = [0u8; 16];
            id.copy_from_slice(&id_bytes);
            let file_count = reader.read_vint()?;
            let mut files = Vec::with_capacity(file_count as usize);
            for _ in 0..file_count {
                files.push(reader.read_string()?);
            }
            segments.push(SegmentCommitInfo {
                name,
                codec,
                del_gen,
                field_infos_gen,
                dv_gen,
                soft_del_count,
                id,
                files,
            });
        }
        let user_data = reader.read_string_map()?;
        check_footer(reader, resource)?;
        Ok(SegmentInfos {
            generation: 0,
            version,
            counter,
            segments,
            user_data,
        })
    }

    /// Latest commit generation present in the storage, if any.
    pub fn latest_generation(storage: &dyn Storage) -> Result<Option<u64>> {
        let mut latest = None;
        for name in storage.list_all()? {
            if let Some(gen) = name.strip_prefix("segments_") {
                if let Ok(gen) = gen.parse::<u64>() {
                    latest = Some(latest.map_or(gen, |g: u64| g.max(gen)));
                }
            }
        }
        Ok(latest)
    }

    /// Open the latest commit point, or an empty one for a new index.
    pub fn read_latest(storage: &dyn Storage) -> Result<Self> {
        match Self::latest_generation(storage)? {
            None => Ok(SegmentInfos::default()),
            Some(generation) => {
                let name = format!("segments_{generation}");
                let input = storage.open_input(&name)?;
                let mut reader = StructReader::new(input);
                let mut infos = Self::read(&mut reader, &name)?;
                infos.generation = generation;
                Ok(infos)
            }
        }
    }

    /// Durably publish this commit point.
    ///
    /// Writes `pending_segments_N`, fsyncs it along with every referenced
    /// segment file, renames it into place, and removes the previous
    /// `segments_*` files.
    pub fn commit(&mut self, storage: &dyn Storage) -> Result<()> {
        self.generation += 1;
        self.version += 1;
        let pending = format!("pending_segments_{}", self.generation);
        let target = self.segments_file_name();

        {
            let out = storage.create_output(&pending)?;
            let mut writer = StructWriter::new(out);
            self.write(&mut writer)?;
            writer.close()?;
        }
        let mut to_sync: Vec<String> = vec![pending.clone()];
        for segment in &self.segments {
            to_sync.extend(segment.files.iter().cloned());
        }
        let names: Vec<&str> = to_sync.iter().map(|s| s.as_str()).collect();
        storage.sync(&names)?;
        storage.rename_file(&pending, &target)?;
        storage.sync_metadata()?;

        // keep-last-commit deletion policy
        for name in storage.list_all()? {
            if name.starts_with("segments_") && name != target {
                let _ = storage.delete_file(&name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{MemoryStorageConfig, Storage};

    fn sample_commit() -> SegmentInfos {
        SegmentInfos {
            generation: 0,
            version: 0,
            counter: 1,
            segments: vec![SegmentCommitInfo {
                name: "_0".to_string(),
                codec: "Falx".to_string(),
                del_gen: 0,
                field_infos_gen: 0,
                dv_gen: 0,
                soft_del_count: 0,
                id: [3u8; 16],
                files: vec!["_0.si".to_string(), "_0.inf".to_string()],
            }],
            user_data: BTreeMap::new(),
        }
    }

    #[test]
    fn test_segment_info_roundtrip() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        let mut diagnostics = BTreeMap::new();
        diagnostics.insert("source".to_string(), "flush".to_string());
        let info = SegmentInfo {
            name: "_0".to_string(),
            max_doc: 42,
            id: [5u8; 16],
            version: SEGMENT_VERSION,
            files: vec!["_0.doc".to_string(), "_0.tim".to_string()],
            diagnostics,
        };
        {
            let out = storage.create_output("_0.si").unwrap();
            let mut writer = StructWriter::new(out);
            info.write(&mut writer).unwrap();
            writer.close().unwrap();
        }
        let input = storage.open_input("_0.si").unwrap();
        let mut reader = StructReader::new(input);
        let loaded = SegmentInfo::read(&mut reader, &[5u8; 16], "_0.si").unwrap();
        assert_eq!(loaded, info);
    }

    #[test]
    fn test_commit_is_atomic_rename() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        for name in ["_0.si", "_0.inf"] {
            storage.create_output(name).unwrap().close().unwrap();
        }
        let mut infos = sample_commit();
        infos.commit(&storage).unwrap();
        assert!(storage.file_exists("segments_1"));
        assert!(!storage.file_exists("pending_segments_1"));

        let loaded = SegmentInfos::read_latest(&storage).unwrap();
        assert_eq!(loaded.generation, 1);
        assert_eq!(loaded.segments.len(), 1);
        assert_eq!(loaded.segments[0].name, "_0");
    }

    #[test]
    fn test_second_commit_replaces_first() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        for name in ["_0.si", "_0.inf"] {
            storage.create_output(name).unwrap().close().unwrap();
        }
        let mut infos = sample_commit();
        infos.commit(&storage).unwrap();
        infos.commit(&storage).unwrap();
        assert!(storage.file_exists("segments_2"));
        assert!(!storage.file_exists("segments_1"));
        let loaded = SegmentInfos::read_latest(&storage).unwrap();
        assert_eq!(loaded.generation, 2);
    }

    #[test]
    fn test_pending_commit_is_invisible() {
        // a crash between writing pending_segments_N and the rename leaves
        // the previous commit as the visible one
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        for name in ["_0.si", "_0.inf"] {
            storage.create_output(name).unwrap().close().unwrap();
        }
        let mut infos = sample_commit();
        infos.commit(&storage).unwrap();

        // simulate the crash: pending file exists, rename never happened
        storage
            .create_output("pending_segments_2")
            .unwrap()
            .close()
            .unwrap();
        let loaded = SegmentInfos::read_latest(&storage).unwrap();
        assert_eq!(loaded.generation, 1);
    }
}
