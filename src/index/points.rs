//! Point values (`.dat` + `.idx`): a BKD tree per field.
//!
//! Values are fixed-width packed byte tuples (`dims × bytes_per_dim`).
//! The writer recursively splits the value set on the widest dimension
//! until a node holds at most [`LEAF_SIZE`] points, writing leaf blocks and
//! inner split nodes into `.dat`; `.idx` maps each field name to its root
//! node pointer and value metadata. All fields share one `.dat` stream,
//! which is closed once after the last field.

use ahash::AHashMap;

use crate::error::{FalxError, Result};
use crate::storage::checksum::{check_footer, check_header, write_footer, write_header};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Codec name of the points data file.
pub const POINTS_DATA_CODEC: &str = "FalxPointsData";
/// Codec name of the points index file.
pub const POINTS_INDEX_CODEC: &str = "FalxPointsIndex";
/// Current points format version.
pub const POINTS_VERSION: u32 = 1;
/// Extension of the points data file.
pub const POINTS_DATA_EXTENSION: &str = "dat";
/// Extension of the points index file.
pub const POINTS_INDEX_EXTENSION: &str = "idx";

/// Maximum points per leaf block.
pub const LEAF_SIZE: usize = 512;

const NODE_LEAF: u8 = 0;
const NODE_INNER: u8 = 1;

/// One field's entry in the points index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsFieldMeta {
    /// Field name.
    pub name: String,
    /// Number of dimensions per value.
    pub num_dims: u32,
    /// Bytes per dimension.
    pub bytes_per_dim: u32,
    /// Total indexed points.
    pub count: u64,
    /// Minimum packed value, dimension-wise.
    pub min_value: Vec<u8>,
    /// Maximum packed value, dimension-wise.
    pub max_value: Vec<u8>,
    /// Root node file pointer into `.dat`.
    pub root_fp: u64,
}

/// Writes the BKD trees of one segment.
pub struct PointsWriter {
    dat: StructWriter<Box<dyn StorageOutput>>,
    fields: Vec<PointsFieldMeta>,
}

impl PointsWriter {
    /// Open the writer over a fresh `.dat` output.
    pub fn new(dat_out: Box<dyn StorageOutput>, segment_id: &[u8; 16]) -> Result<Self> {
        let mut dat = StructWriter::new(dat_out);
        write_header(&mut dat, POINTS_DATA_CODEC, POINTS_VERSION, segment_id, "")?;
        Ok(PointsWriter {
            dat,
            fields: Vec::new(),
        })
    }

    /// Index one field's points: `(packed_value, doc_id)` pairs.
    ///
    /// The data output stays open across fields; it is sealed once in
    /// [`PointsWriter::finish`].
    pub fn write_field(
        &mut self,
        name: &str,
        num_dims: u32,
        bytes_per_dim: u32,
        mut points: Vec<(Vec<u8>, u32)>,
    ) -> Result<()> {
        let packed_len = (num_dims * bytes_per_dim) as usize;
        for (value, _) in &points {
            if value.len() != packed_len {
                return Err(FalxError::invalid_argument(format!(
                    "point value of {} bytes in field {name}, expected {packed_len}",
                    value.len()
                )));
            }
        }
        if points.is_empty() {
            return Err(FalxError::invalid_argument(format!(
                "no points for field {name}"
            )));
        }

        let mut min_value = points[0].0.clone();
        let mut max_value = points[0].0.clone();
        for (value, _) in &points {
            for dim in 0..num_dims as usize {
                let range = dim * bytes_per_dim as usize..(dim + 1) * bytes_per_dim as usize;
                if value[range.clone()] < min_value[range.clone()] {
                    min_value[range.clone()].copy_from_slice(&value[range.clone()]);
                }
                if value[range.clone()] > max_value[range.clone()] {
                    max_value[range.clone()].copy_from_slice(&value[range.clone()]);
                }
            }
        }

        let count = points.len() as u64;
        let root_fp =
            self.write_node(&mut points[..], num_dims as usize, bytes_per_dim as usize)?;
        self.fields.push(PointsFieldMeta {
            name: name.to_string(),
            num_dims,
            bytes_per_dim,
            count,
            min_value,
            max_value,
            root_fp,
        });
        Ok(())
    }

    /// Recursively write one node, returning its file pointer.
    fn write_node(
        &mut self,
        points: &mut [(Vec<u8>, u32)],
        num_dims: usize,
        bytes_per_dim: usize,
    ) -> Result<u64> {
        if points.len() <= LEAF_SIZE {
            let fp = self.dat.position();
            self.dat.write_u8(NODE_LEAF)?;
            self.dat.write_vint(points.len() as u32)?;
            for (value, doc) in points.iter() {
                self.dat.write_raw(value)?;
                self.dat.write_vint(*doc)?;
            }
            return Ok(fp);
        }

        // split on the dimension with the widest byte spread
        let mut split_dim = 0;
        let mut widest = Vec::new();
        for dim in 0..num_dims {
            let range = dim * bytes_per_dim..(dim + 1) * bytes_per_dim;
            let lo = points.iter().map(|(v, _)| &v[range.clone()]).min();
            let hi = points.iter().map(|(v, _)| &v[range.clone()]).max();
            if let (Some(lo), Some(hi)) = (lo, hi) {
                let spread: Vec<u8> = hi
                    .iter()
                    .zip(lo.iter())
                    .map(|(h, l)| h.wrapping_sub(*l))
                    .collect();
                if spread > widest {
                    widest = spread;
                    split_dim = dim;
                }
            }
        }
        let range = split_dim * bytes_per_dim..(split_dim + 1) * bytes_per_dim;
        points.sort_by(|(a, _), (b, _)| a[range.clone()].cmp(&b[range.clone()]));
        let mid = points.len() / 2;
        let split_value = points[mid].0[range.clone()].to_vec();

        let (left, right) = points.split_at_mut(mid);
        let left_fp = self.write_node(left, num_dims, bytes_per_dim)?;
        let right_fp = self.write_node(right, num_dims, bytes_per_dim)?;

        let fp = self.dat.position();
        self.dat.write_u8(NODE_INNER)?;
        self.dat.write_vint(split_dim as u32)?;
        self.dat.write_raw(&split_value)?;
        self.dat.write_vlong(left_fp)?;
        self.dat.write_vlong(right_fp)?;
        Ok(fp)
    }

    /// Seal `.dat`, write the `.idx` field map, and close both files.
    pub fn finish(
        mut self,
        idx_out: Box<dyn StorageOutput>,
        segment_id: &[u8; 16],
    ) -> Result<()> {
        write_footer(&mut self.dat)?;
        self.dat.close()?;

        let mut idx = StructWriter::new(idx_out);
        write_header(&mut idx, POINTS_INDEX_CODEC, POINTS_VERSION, segment_id, "")?;
        idx.write_vint(self.fields.len() as u32)?;
        for field in &self.fields {
            idx.write_string(&field.name)?;
            idx.write_vint(field.num_dims)?;
            idx.write_vint(field.bytes_per_dim)?;
            idx.write_vlong(field.count)?;
            idx.write_bytes(&field.min_value)?;
            idx.write_bytes(&field.max_value)?;
            idx.write_vlong(field.root_fp)?;
        }
        write_footer(&mut idx)?;
        idx.close()
    }
}

/// Reads the BKD trees of one segment.
pub struct PointsReader {
    fields: AHashMap<String, PointsFieldMeta>,
    dat_source: Box<dyn StorageInput>,
}

impl PointsReader {
    /// Open the index and keep `.dat` available for tree walks.
    pub fn open(
        idx_in: Box<dyn StorageInput>,
        dat_in: Box<dyn StorageInput>,
        segment_id: &[u8; 16],
        idx_name: &str,
    ) -> Result<Self> {
        let mut idx = StructReader::new(idx_in);
        check_header(
            &mut idx,
            POINTS_INDEX_CODEC,
            POINTS_VERSION,
            POINTS_VERSION,
            Some(segment_id),
            idx_name,
        )?;
        let count = idx.read_vint()?;
        let mut fields = AHashMap::new();
        for _ in 0..count {
            let name = idx.read_string()?;
            let num_dims = idx.read_vint()?;
            let bytes_per_dim = idx.read_vint()?;
            let value_count = idx.read_vlong()?;
            let min_value = idx.read_bytes()?;
            let max_value = idx.read_bytes()?;
            let root_fp = idx.read_vlong()?;
            fields.insert(
                name.clone(),
                PointsFieldMeta {
                    name,
                    num_dims,
                    bytes_per_dim,
                    count: value_count,
                    min_value,
                    max_value,
                    root_fp,
                },
            );
        }
        check_footer(&mut idx, idx_name)?;
        Ok(PointsReader {
            fields,
            dat_source: dat_in,
        })
    }

    /// Metadata of a field's points, if any.
    pub fn field(&self, name: &str) -> Option<&PointsFieldMeta> {
        self.fields.get(name)
    }

    /// Collect every doc with a value inside `[lower, upper]` (inclusive,
    /// dimension-wise) into `hits`.
    pub fn intersect_range(
        &self,
        field: &str,
        lower: &[u8],
        upper: &[u8],
        hits: &mut Vec<u32>,
    ) -> Result<()> {
        let meta = match self.fields.get(field) {
            Some(meta) => meta,
            None => return Ok(()),
        };
        let packed_len = (meta.num_dims * meta.bytes_per_dim) as usize;
        if lower.len() != packed_len || upper.len() != packed_len {
            return Err(FalxError::invalid_argument(format!(
                "range bounds must be {packed_len} bytes for field {field}"
            )));
        }
        let mut dat = StructReader::new(self.dat_source.clone_input()?);
        self.walk(&mut dat, meta, meta.root_fp, lower, upper, hits)
    }

    fn value_in_range(meta: &PointsFieldMeta, value: &[u8], lower: &[u8], upper: &[u8]) -> bool {
        let bytes = meta.bytes_per_dim as usize;
        for dim in 0..meta.num_dims as usize {
            let range = dim * bytes..(dim + 1) * bytes;
            if value[range.clone()] < lower[range.clone()]
                || value[range.clone()] > upper[range.clone()]
            {
                return false;
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        dat: &mut StructReader<Box<dyn StorageInput>>,
        meta: &PointsFieldMeta,
        fp: u64,
        lower: &[u8],
        upper: &[u8],
        hits: &mut Vec<u32>,
    ) -> Result<()> {
        dat.seek(fp)?;
        let kind = dat.read_u8()?;
        let packed_len = (meta.num_dims * meta.bytes_per_dim) as usize;
        match kind {
            NODE_LEAF => {
                let count = dat.read_vint()?;
                for _ in 0..count {
                    let value = dat.read_raw(packed_len)?;
                    let doc = dat.read_vint()?;
                    if Self::value_in_range(meta, &value, lower, upper) {
                        hits.push(doc);
                    }
                }
                Ok(())
            }
            NODE_INNER => {
                let split_dim = dat.read_vint()? as usize;
                let split_value = dat.read_raw(meta.bytes_per_dim as usize)?;
                let left_fp = dat.read_vlong()?;
                let right_fp = dat.read_vlong()?;
                let bytes = meta.bytes_per_dim as usize;
                let range = split_dim * bytes..(split_dim + 1) * bytes;
                // left holds values <= split on the split dim, right >= split
                if lower[range.clone()] <= split_value[..] {
                    self.walk(dat, meta, left_fp, lower, upper, hits)?;
                }
                if upper[range.clone()] >= split_value[..] {
                    self.walk(dat, meta, right_fp, lower, upper, hits)?;
                }
                Ok(())
            }
            other => Err(FalxError::corrupt(format!("bad BKD node kind {other}"))),
        }
    }
}

/// Encode an i64 so unsigned byte order matches numeric order.
pub fn pack_i64(value: i64) -> Vec<u8> {
    ((value as u64) ^ (1 << 63)).to_be_bytes().to_vec()
}

/// Inverse of [`pack_i64`].
pub fn unpack_i64(bytes: &[u8]) -> Result<i64> {
    if bytes.len() != 8 {
        return Err(FalxError::invalid_argument("packed i64 must be 8 bytes"));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{MemoryStorageConfig, Storage};

    const ID: [u8; 16] = [6u8; 16];

    fn build(points_by_field: Vec<(&str, Vec<(i64, u32)>)>) -> (MemoryStorage, PointsReader) {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        {
            let mut writer =
                PointsWriter::new(storage.create_output("_0.dat").unwrap(), &ID).unwrap();
            for (field, points) in points_by_field {
                let packed: Vec<(Vec<u8>, u32)> = points
                    .into_iter()
                    .map(|(value, doc)| (pack_i64(value), doc))
                    .collect();
                writer.write_field(field, 1, 8, packed).unwrap();
            }
            writer
                .finish(storage.create_output("_0.idx").unwrap(), &ID)
                .unwrap();
        }
        let reader = PointsReader::open(
            storage.open_input("_0.idx").unwrap(),
            storage.open_input("_0.dat").unwrap(),
            &ID,
            "_0.idx",
        )
        .unwrap();
        (storage, reader)
    }

    #[test]
    fn test_pack_i64_order() {
        let values = [-1000i64, -1, 0, 1, 63, 64, 100_000];
        let packed: Vec<Vec<u8>> = values.iter().map(|&v| pack_i64(v)).collect();
        assert!(packed.windows(2).all(|w| w[0] < w[1]));
        for &v in &values {
            assert_eq!(unpack_i64(&pack_i64(v)).unwrap(), v);
        }
    }

    #[test]
    fn test_range_query_small() {
        let points: Vec<(i64, u32)> = (0..100).map(|i| (i as i64 * 10, i)).collect();
        let (_storage, reader) = build(vec![("price", points)]);

        let mut hits = Vec::new();
        reader
            .intersect_range("price", &pack_i64(200), &pack_i64(290), &mut hits)
            .unwrap();
        hits.sort_unstable();
        assert_eq!(hits, (20..30).collect::<Vec<u32>>());
    }

    #[test]
    fn test_range_query_spans_leaves() {
        // enough points to force several leaves and inner splits
        let points: Vec<(i64, u32)> = (0..5000).map(|i| (i as i64, i)).collect();
        let (_storage, reader) = build(vec![("n", points)]);

        let mut hits = Vec::new();
        reader
            .intersect_range("n", &pack_i64(1500), &pack_i64(3499), &mut hits)
            .unwrap();
        assert_eq!(hits.len(), 2000);
        hits.sort_unstable();
        assert_eq!(hits[0], 1500);
        assert_eq!(hits[1999], 3499);
    }

    #[test]
    fn test_multiple_fields_share_data_file() {
        let (_storage, reader) = build(vec![
            ("a", (0..10).map(|i| (i as i64, i)).collect()),
            ("b", (0..10).map(|i| (i as i64 * 2, i)).collect()),
        ]);
        assert_eq!(reader.field("a").unwrap().count, 10);
        assert_eq!(reader.field("b").unwrap().count, 10);

        let mut hits = Vec::new();
        reader
            .intersect_range("b", &pack_i64(0), &pack_i64(6), &mut hits)
            .unwrap();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_field_metadata_min_max() {
        let (_storage, reader) = build(vec![("v", vec![(5, 0), (-3, 1), (12, 2)])]);
        let meta = reader.field("v").unwrap();
        assert_eq!(unpack_i64(&meta.min_value).unwrap(), -3);
        assert_eq!(unpack_i64(&meta.max_value).unwrap(), 12);
        assert_eq!(meta.count, 3);
    }
}
