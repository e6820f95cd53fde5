//! Minimal finite-state transducer: the terms dictionary core.
//!
//! An FST maps sorted byte-sequence keys to outputs drawn from an
//! [`outputs::Outputs`] algebra. The builder writes each node's arcs forward
//! into the paged byte store, then reverses the node in place, so the reader
//! walks from the root toward the leaves by scanning bytes from high
//! addresses to low.
//!
//! Nodes come in three encodings, chosen per node at freeze time:
//!
//! - a variable-length arc list (the default),
//! - a binary-search table of equal-width arc records,
//! - a direct-addressing table: a presence bit-set over the label range
//!   followed by equal-width records without labels, giving O(1) lookup by
//!   bit rank.

pub mod builder;
pub mod bytes;
pub mod node_hash;
pub mod outputs;

use crate::error::Result;
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};
use bytes::{BytesReader, SliceReverseReader};
use outputs::Outputs;

/// The target of this arc is a final (accepting) state.
pub const BIT_FINAL_ARC: u8 = 1 << 0;
/// This is the last arc of its node.
pub const BIT_LAST_ARC: u8 = 1 << 1;
/// The target node is written immediately before this node; no address is
/// stored.
pub const BIT_TARGET_NEXT: u8 = 1 << 2;
/// The target node has no outgoing arcs.
pub const BIT_STOP_NODE: u8 = 1 << 3;
/// The arc carries an output.
pub const BIT_ARC_HAS_OUTPUT: u8 = 1 << 4;
/// The arc carries a final output.
pub const BIT_ARC_HAS_FINAL_OUTPUT: u8 = 1 << 5;

/// Node-header byte for binary-search arc tables. Never a valid first-arc
/// flag byte: a final output implies the final bit.
pub const ARCS_FOR_BINARY_SEARCH: u8 = BIT_ARC_HAS_FINAL_OUTPUT;
/// Node-header byte for direct-addressing arc tables.
pub const ARCS_FOR_DIRECT_ADDRESSING: u8 = 1 << 6;

/// Address of the accepting end state (no outgoing arcs).
pub const FINAL_END_NODE: i64 = -1;
/// Address of the non-accepting end state.
pub const NON_FINAL_END_NODE: i64 = 0;

/// One labeled transition read back from the FST.
#[derive(Debug, Clone)]
pub struct FstArc<V> {
    /// The byte label.
    pub label: u8,
    /// Output accumulated by taking this arc.
    pub output: V,
    /// Extra output when the term ends on this arc.
    pub final_output: V,
    /// Target node address; `<= 0` means the target has no outgoing arcs.
    pub target: i64,
    /// Whether a term may end on this arc.
    pub is_final: bool,
    /// Whether this is the last arc of its node.
    pub is_last: bool,
}

/// Parsed arc before target resolution.
struct RawArc<V> {
    label: u8,
    output: V,
    final_output: V,
    target: TargetRef,
    is_final: bool,
    is_last: bool,
}

enum TargetRef {
    Address(i64),
    Next,
}

/// Parsed node header.
pub(crate) enum NodeHeader {
    /// Variable-length arc list beginning at the node address itself.
    Variable,
    /// Equal-width records, binary-searched by label.
    BinarySearch {
        num_arcs: u64,
        bytes_per_arc: u64,
        pos_arcs_start: i64,
    },
    /// Presence bit table plus equal-width label-less records.
    DirectAddressing {
        label_range: u64,
        bytes_per_arc: u64,
        first_label: u8,
        bit_table_start: i64,
        pos_arcs_start: i64,
    },
}

/// Read a node header at `addr`, leaving the reader positioned for the
/// encoding: at the first arc for tables, back at `addr` for variable lists.
pub(crate) fn parse_node_header(r: &mut dyn BytesReader, addr: i64) -> Result<NodeHeader> {
    r.set_position(addr);
    let first = r.read_u8()?;
    match first {
        ARCS_FOR_BINARY_SEARCH => {
            let num_arcs = r.read_vlong()?;
            let bytes_per_arc = r.read_vlong()?;
            Ok(NodeHeader::BinarySearch {
                num_arcs,
                bytes_per_arc,
                pos_arcs_start: r.position(),
            })
        }
        ARCS_FOR_DIRECT_ADDRESSING => {
            let label_range = r.read_vlong()?;
            let bytes_per_arc = r.read_vlong()?;
            let first_label = r.read_u8()?;
            let bit_table_start = r.position();
            let table_len = (label_range + 7) / 8;
            Ok(NodeHeader::DirectAddressing {
                label_range,
                bytes_per_arc,
                first_label,
                bit_table_start,
                pos_arcs_start: bit_table_start - table_len as i64,
            })
        }
        _ => {
            r.set_position(addr);
            Ok(NodeHeader::Variable)
        }
    }
}

/// Parse one arc at the reader's position. `implied_label` supplies the
/// label for direct-addressing records, which do not store it.
fn parse_arc<O: Outputs>(
    outputs: &O,
    r: &mut dyn BytesReader,
    implied_label: Option<u8>,
) -> Result<RawArc<O::Value>> {
    let flags = r.read_u8()?;
    let label = match implied_label {
        Some(l) => l,
        None => r.read_u8()?,
    };
    let output = if flags & BIT_ARC_HAS_OUTPUT != 0 {
        outputs.read(r)?
    } else {
        outputs.no_output()
    };
    let final_output = if flags & BIT_ARC_HAS_FINAL_OUTPUT != 0 {
        outputs.read(r)?
    } else {
        outputs.no_output()
    };
    let is_final = flags & BIT_FINAL_ARC != 0;
    let target = if flags & BIT_STOP_NODE != 0 {
        TargetRef::Address(if is_final { FINAL_END_NODE } else { NON_FINAL_END_NODE })
    } else if flags & BIT_TARGET_NEXT != 0 {
        TargetRef::Next
    } else {
        TargetRef::Address(r.read_vlong()? as i64)
    };
    Ok(RawArc {
        label,
        output,
        final_output,
        target,
        is_final,
        is_last: flags & BIT_LAST_ARC != 0,
    })
}

/// Resolve a [`TargetRef::Next`] for an arc just parsed: the target is the
/// node written immediately before this one, found by skipping any remaining
/// sibling arcs. The reader position is left unchanged.
fn resolve_next_target<O: Outputs>(
    outputs: &O,
    r: &mut dyn BytesReader,
    arc_is_last: bool,
) -> Result<i64> {
    if arc_is_last {
        return Ok(r.position());
    }
    let saved = r.position();
    loop {
        let arc = parse_arc(outputs, r, None)?;
        if arc.is_last {
            break;
        }
    }
    let target = r.position();
    r.set_position(saved);
    Ok(target)
}

fn finish_arc<O: Outputs>(
    outputs: &O,
    r: &mut dyn BytesReader,
    raw: RawArc<O::Value>,
) -> Result<FstArc<O::Value>> {
    let target = match raw.target {
        TargetRef::Address(addr) => addr,
        TargetRef::Next => resolve_next_target(outputs, r, raw.is_last)?,
    };
    Ok(FstArc {
        label: raw.label,
        output: raw.output,
        final_output: raw.final_output,
        target,
        is_final: raw.is_final,
        is_last: raw.is_last,
    })
}

/// Read the `idx`-th arc of a frozen node. For variable-length nodes the
/// reader must already be positioned at that arc (sequential ascending
/// access); table encodings are addressed by index.
pub(crate) fn read_frozen_arc<O: Outputs>(
    outputs: &O,
    r: &mut dyn BytesReader,
    header: &NodeHeader,
    idx: usize,
) -> Result<Option<FstArc<O::Value>>> {
    match header {
        NodeHeader::Variable => {
            let raw = parse_arc(outputs, r, None)?;
            Ok(Some(finish_arc(outputs, r, raw)?))
        }
        NodeHeader::BinarySearch {
            num_arcs,
            bytes_per_arc,
            pos_arcs_start,
        } => {
            if idx as u64 >= *num_arcs {
                return Ok(None);
            }
            r.set_position(pos_arcs_start - idx as i64 * *bytes_per_arc as i64);
            let raw = parse_arc(outputs, r, None)?;
            Ok(Some(finish_arc(outputs, r, raw)?))
        }
        NodeHeader::DirectAddressing {
            label_range,
            bytes_per_arc,
            first_label,
            bit_table_start,
            pos_arcs_start,
        } => {
            // find the label of the idx-th present arc via the bit table
            let mut seen = 0usize;
            let mut label_idx = None;
            for i in 0..*label_range {
                if da_bit_set(r, *bit_table_start, i)? {
                    if seen == idx {
                        label_idx = Some(i);
                        break;
                    }
                    seen += 1;
                }
            }
            let label_idx = match label_idx {
                Some(i) => i,
                None => return Ok(None),
            };
            r.set_position(pos_arcs_start - idx as i64 * *bytes_per_arc as i64);
            let label = (*first_label as u64 + label_idx) as u8;
            let raw = parse_arc(outputs, r, Some(label))?;
            Ok(Some(finish_arc(outputs, r, raw)?))
        }
    }
}

fn da_bit_set(r: &mut dyn BytesReader, bit_table_start: i64, idx: u64) -> Result<bool> {
    r.set_position(bit_table_start - (idx / 8) as i64);
    let byte = r.read_u8()?;
    Ok(byte & (1 << (idx % 8)) != 0)
}

fn da_rank(r: &mut dyn BytesReader, bit_table_start: i64, idx: u64) -> Result<u64> {
    let mut count = 0u64;
    for j in 0..idx / 8 {
        r.set_position(bit_table_start - j as i64);
        count += r.read_u8()?.count_ones() as u64;
    }
    if idx % 8 != 0 {
        r.set_position(bit_table_start - (idx / 8) as i64);
        let byte = r.read_u8()?;
        count += (byte & ((1 << (idx % 8)) - 1)).count_ones() as u64;
    }
    Ok(count)
}

/// A compiled, immutable FST.
pub struct Fst<O: Outputs> {
    outputs: O,
    bytes: Vec<u8>,
    start_node: i64,
    empty_output: Option<O::Value>,
}

impl<O: Outputs> std::fmt::Debug for Fst<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fst")
            .field("bytes", &self.bytes.len())
            .field("start_node", &self.start_node)
            .finish()
    }
}

impl<O: Outputs> Fst<O> {
    pub(crate) fn from_parts(
        outputs: O,
        bytes: Vec<u8>,
        start_node: i64,
        empty_output: Option<O::Value>,
    ) -> Self {
        Fst {
            outputs,
            bytes,
            start_node,
            empty_output,
        }
    }

    /// The output algebra.
    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    /// The serialized automaton bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Look up a key, returning its output or `None` if absent.
    pub fn get(&self, input: &[u8]) -> Result<Option<O::Value>> {
        if input.is_empty() {
            return Ok(self.empty_output.clone());
        }
        let mut r = SliceReverseReader::new(&self.bytes);
        let mut node = self.start_node;
        let mut output = self.outputs.no_output();
        for (i, &label) in input.iter().enumerate() {
            if node <= 0 {
                return Ok(None);
            }
            match self.find_target_arc(node, label, &mut r)? {
                None => return Ok(None),
                Some(arc) => {
                    output = self.outputs.add(&output, &arc.output);
                    if i + 1 == input.len() {
                        return if arc.is_final {
                            Ok(Some(self.outputs.add(&output, &arc.final_output)))
                        } else {
                            Ok(None)
                        };
                    }
                    node = arc.target;
                }
            }
        }
        unreachable!("non-empty input always returns inside the loop")
    }

    /// Find the arc labeled `label` leaving the node at `addr`.
    fn find_target_arc(
        &self,
        addr: i64,
        label: u8,
        r: &mut SliceReverseReader<'_>,
    ) -> Result<Option<FstArc<O::Value>>> {
        match parse_node_header(r, addr)? {
            NodeHeader::Variable => {
                loop {
                    let raw = parse_arc(&self.outputs, r, None)?;
                    if raw.label == label {
                        return Ok(Some(finish_arc(&self.outputs, r, raw)?));
                    }
                    if raw.label > label || raw.is_last {
                        return Ok(None);
                    }
                }
            }
            NodeHeader::BinarySearch {
                num_arcs,
                bytes_per_arc,
                pos_arcs_start,
            } => {
                let mut lo = 0i64;
                let mut hi = num_arcs as i64 - 1;
                while lo <= hi {
                    let mid = (lo + hi) / 2;
                    r.set_position(pos_arcs_start - mid * bytes_per_arc as i64);
                    let _flags = r.read_u8()?;
                    let mid_label = r.read_u8()?;
                    match mid_label.cmp(&label) {
                        std::cmp::Ordering::Less => lo = mid + 1,
                        std::cmp::Ordering::Greater => hi = mid - 1,
                        std::cmp::Ordering::Equal => {
                            r.set_position(pos_arcs_start - mid * bytes_per_arc as i64);
                            let raw = parse_arc(&self.outputs, r, None)?;
                            return Ok(Some(finish_arc(&self.outputs, r, raw)?));
                        }
                    }
                }
                Ok(None)
            }
            NodeHeader::DirectAddressing {
                label_range,
                bytes_per_arc,
                first_label,
                bit_table_start,
                pos_arcs_start,
            } => {
                if label < first_label {
                    return Ok(None);
                }
                let idx = (label - first_label) as u64;
                if idx >= label_range {
                    return Ok(None);
                }
                if !da_bit_set(r, bit_table_start, idx)? {
                    return Ok(None);
                }
                let rank = da_rank(r, bit_table_start, idx)?;
                r.set_position(pos_arcs_start - rank as i64 * bytes_per_arc as i64);
                let raw = parse_arc(&self.outputs, r, Some(label))?;
                Ok(Some(finish_arc(&self.outputs, r, raw)?))
            }
        }
    }

    /// Iterate every `(key, output)` pair in key order.
    pub fn iter(&self) -> FstIter<'_, O> {
        let mut stack = Vec::new();
        if self.start_node > 0 {
            stack.push(Frame {
                addr: self.start_node,
                state: None,
                prefix_output: self.outputs.no_output(),
                owns_key_byte: false,
            });
        }
        FstIter {
            fst: self,
            stack,
            key: Vec::new(),
            pending: self.empty_output.clone().map(|v| (Vec::new(), v)),
            failed: false,
        }
    }

    /// Iterate every `(key, output)` pair whose key starts with `prefix`,
    /// in key order.
    pub fn prefix_iter(&self, prefix: &[u8]) -> Result<FstIter<'_, O>> {
        if prefix.is_empty() {
            return Ok(self.iter());
        }
        let mut r = SliceReverseReader::new(&self.bytes);
        let mut node = self.start_node;
        let mut output = self.outputs.no_output();
        let mut pending = None;
        let mut stack = Vec::new();
        for (i, &label) in prefix.iter().enumerate() {
            if node <= 0 {
                return Ok(self.empty_iter());
            }
            match self.find_target_arc(node, label, &mut r)? {
                None => return Ok(self.empty_iter()),
                Some(arc) => {
                    output = self.outputs.add(&output, &arc.output);
                    if i + 1 == prefix.len() {
                        if arc.is_final {
                            pending = Some((
                                prefix.to_vec(),
                                self.outputs.add(&output, &arc.final_output),
                            ));
                        }
                        if arc.target > 0 {
                            stack.push(Frame {
                                addr: arc.target,
                                state: None,
                                prefix_output: output.clone(),
                                owns_key_byte: false,
                            });
                        }
                    }
                    node = arc.target;
                }
            }
        }
        Ok(FstIter {
            fst: self,
            stack,
            key: prefix.to_vec(),
            pending,
            failed: false,
        })
    }

    fn empty_iter(&self) -> FstIter<'_, O> {
        FstIter {
            fst: self,
            stack: Vec::new(),
            key: Vec::new(),
            pending: None,
            failed: false,
        }
    }

    /// Serialize the FST into a structured writer.
    pub fn save<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        match &self.empty_output {
            Some(v) => {
                writer.write_u8(1)?;
                let mut scratch = Vec::new();
                self.outputs.write(v, &mut scratch);
                writer.write_bytes(&scratch)?;
            }
            None => writer.write_u8(0)?,
        }
        writer.write_vlong((self.start_node + 1) as u64)?;
        writer.write_vlong(self.bytes.len() as u64)?;
        writer.write_raw(&self.bytes)
    }

    /// Deserialize an FST written by [`Fst::save`].
    pub fn load<R: StorageInput>(reader: &mut StructReader<R>, outputs: O) -> Result<Self> {
        let empty_output = if reader.read_u8()? != 0 {
            let mut encoded = reader.read_bytes()?;
            encoded.reverse();
            let mut r = SliceReverseReader::new(&encoded);
            r.set_position(encoded.len() as i64 - 1);
            Some(outputs.read(&mut r)?)
        } else {
            None
        };
        let start_node = reader.read_vlong()? as i64 - 1;
        let num_bytes = reader.read_vlong()? as usize;
        let bytes = reader.read_raw(num_bytes)?;
        Ok(Fst {
            outputs,
            bytes,
            start_node,
            empty_output,
        })
    }
}

/// Per-node iteration state for [`FstIter`].
enum FrameState {
    Variable {
        next_pos: i64,
        done: bool,
    },
    BinarySearch {
        pos_arcs_start: i64,
        bytes_per_arc: u64,
        num_arcs: u64,
        next_idx: u64,
    },
    DirectAddressing {
        pos_arcs_start: i64,
        bytes_per_arc: u64,
        label_range: u64,
        first_label: u8,
        bit_table_start: i64,
        next_label_idx: u64,
        next_rank: u64,
    },
}

impl FrameState {
    fn start(bytes: &[u8], addr: i64) -> Result<Self> {
        let mut r = SliceReverseReader::new(bytes);
        Ok(match parse_node_header(&mut r, addr)? {
            NodeHeader::Variable => FrameState::Variable {
                next_pos: addr,
                done: false,
            },
            NodeHeader::BinarySearch {
                num_arcs,
                bytes_per_arc,
                pos_arcs_start,
            } => FrameState::BinarySearch {
                pos_arcs_start,
                bytes_per_arc,
                num_arcs,
                next_idx: 0,
            },
            NodeHeader::DirectAddressing {
                label_range,
                bytes_per_arc,
                first_label,
                bit_table_start,
                pos_arcs_start,
            } => FrameState::DirectAddressing {
                pos_arcs_start,
                bytes_per_arc,
                label_range,
                first_label,
                bit_table_start,
                next_label_idx: 0,
                next_rank: 0,
            },
        })
    }
}

struct Frame<V> {
    addr: i64,
    state: Option<FrameState>,
    prefix_output: V,
    owns_key_byte: bool,
}

/// Ordered iterator over `(key, output)` pairs of an [`Fst`].
pub struct FstIter<'f, O: Outputs> {
    fst: &'f Fst<O>,
    stack: Vec<Frame<O::Value>>,
    key: Vec<u8>,
    pending: Option<(Vec<u8>, O::Value)>,
    failed: bool,
}

impl<O: Outputs> FstIter<'_, O> {
    fn next_arc_in_top(&mut self) -> Result<Option<FstArc<O::Value>>> {
        let fst = self.fst;
        let frame = match self.stack.last_mut() {
            Some(frame) => frame,
            None => return Ok(None),
        };
        if frame.state.is_none() {
            frame.state = Some(FrameState::start(&fst.bytes, frame.addr)?);
        }
        let state = match frame.state.as_mut() {
            Some(state) => state,
            None => return Ok(None),
        };
        let mut r = SliceReverseReader::new(&fst.bytes);
        match state {
            FrameState::Variable { next_pos, done } => {
                if *done {
                    return Ok(None);
                }
                r.set_position(*next_pos);
                let raw = parse_arc(&fst.outputs, &mut r, None)?;
                let arc = finish_arc(&fst.outputs, &mut r, raw)?;
                *next_pos = r.position();
                if arc.is_last {
                    *done = true;
                }
                Ok(Some(arc))
            }
            FrameState::BinarySearch {
                pos_arcs_start,
                bytes_per_arc,
                num_arcs,
                next_idx,
            } => {
                if *next_idx >= *num_arcs {
                    return Ok(None);
                }
                r.set_position(*pos_arcs_start - *next_idx as i64 * *bytes_per_arc as i64);
                let raw = parse_arc(&fst.outputs, &mut r, None)?;
                let arc = finish_arc(&fst.outputs, &mut r, raw)?;
                *next_idx += 1;
                Ok(Some(arc))
            }
            FrameState::DirectAddressing {
                pos_arcs_start,
                bytes_per_arc,
                label_range,
                first_label,
                bit_table_start,
                next_label_idx,
                next_rank,
            } => {
                while *next_label_idx < *label_range {
                    let idx = *next_label_idx;
                    *next_label_idx += 1;
                    if da_bit_set(&mut r, *bit_table_start, idx)? {
                        let label = (*first_label as u64 + idx) as u8;
                        r.set_position(*pos_arcs_start - *next_rank as i64 * *bytes_per_arc as i64);
                        *next_rank += 1;
                        let raw = parse_arc(&fst.outputs, &mut r, Some(label))?;
                        let arc = finish_arc(&fst.outputs, &mut r, raw)?;
                        return Ok(Some(arc));
                    }
                }
                Ok(None)
            }
        }
    }

    fn step(&mut self) -> Result<Option<(Vec<u8>, O::Value)>> {
        if let Some(item) = self.pending.take() {
            return Ok(Some(item));
        }
        while !self.stack.is_empty() {
            match self.next_arc_in_top()? {
                None => {
                    if let Some(frame) = self.stack.pop() {
                        if frame.owns_key_byte {
                            self.key.pop();
                        }
                    }
                }
                Some(arc) => {
                    let prefix = match self.stack.last() {
                        Some(frame) => frame.prefix_output.clone(),
                        None => return Ok(None),
                    };
                    let out = self.fst.outputs.add(&prefix, &arc.output);
                    let final_value = if arc.is_final {
                        Some(self.fst.outputs.add(&out, &arc.final_output))
                    } else {
                        None
                    };
                    if arc.target > 0 {
                        self.key.push(arc.label);
                        self.stack.push(Frame {
                            addr: arc.target,
                            state: None,
                            prefix_output: out,
                            owns_key_byte: true,
                        });
                        if let Some(v) = final_value {
                            return Ok(Some((self.key.clone(), v)));
                        }
                    } else if let Some(v) = final_value {
                        let mut key = self.key.clone();
                        key.push(arc.label);
                        return Ok(Some((key, v)));
                    }
                }
            }
        }
        Ok(None)
    }
}

impl<O: Outputs> Iterator for FstIter<'_, O> {
    type Item = Result<(Vec<u8>, O::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::builder::FstBuilder;
    use super::outputs::{ByteSequenceOutputs, Outputs, U64Outputs};
    use super::*;

    fn build(pairs: &[(&str, u64)]) -> Fst<U64Outputs> {
        let mut builder = FstBuilder::new(U64Outputs);
        for (key, value) in pairs {
            builder.add(key.as_bytes(), *value).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_lookup_round_trip() {
        let fst = build(&[("apple", 1), ("apricot", 2), ("banana", 3), ("band", 4)]);
        assert_eq!(fst.get(b"apple").unwrap(), Some(1));
        assert_eq!(fst.get(b"apricot").unwrap(), Some(2));
        assert_eq!(fst.get(b"banana").unwrap(), Some(3));
        assert_eq!(fst.get(b"band").unwrap(), Some(4));
        assert_eq!(fst.get(b"bandit").unwrap(), None);
        assert_eq!(fst.get(b"app").unwrap(), None);
        assert_eq!(fst.get(b"").unwrap(), None);
        assert_eq!(fst.get(b"zebra").unwrap(), None);
    }

    #[test]
    fn test_prefix_enumeration() {
        let fst = build(&[("apple", 1), ("apricot", 2), ("banana", 3), ("band", 4)]);
        let hits: Vec<(Vec<u8>, u64)> = fst
            .prefix_iter(b"ap")
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            hits,
            vec![(b"apple".to_vec(), 1), (b"apricot".to_vec(), 2)]
        );
    }

    #[test]
    fn test_full_iteration_in_order() {
        let pairs = [
            ("ab", 10u64),
            ("abc", 20),
            ("abd", 5),
            ("ba", 7),
            ("bb", 1),
            ("zzz", 99),
        ];
        let fst = build(&pairs);
        let items: Vec<(Vec<u8>, u64)> = fst.iter().collect::<Result<Vec<_>>>().unwrap();
        let expected: Vec<(Vec<u8>, u64)> = pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), *v))
            .collect();
        assert_eq!(items, expected);
    }

    #[test]
    fn test_empty_key() {
        let mut builder = FstBuilder::new(U64Outputs);
        builder.add(b"", 42).unwrap();
        builder.add(b"a", 1).unwrap();
        let fst = builder.finish().unwrap();
        assert_eq!(fst.get(b"").unwrap(), Some(42));
        assert_eq!(fst.get(b"a").unwrap(), Some(1));
        let items: Vec<(Vec<u8>, u64)> = fst.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(items, vec![(Vec::new(), 42), (b"a".to_vec(), 1)]);
    }

    #[test]
    fn test_dense_node_uses_direct_addressing() {
        // root with 26 dense labels exercises the direct-addressing path
        let mut builder = FstBuilder::new(U64Outputs);
        let mut keys = Vec::new();
        for c in b'a'..=b'z' {
            keys.push(vec![c]);
            keys.push(vec![c, b'x']);
        }
        keys.sort();
        for (i, key) in keys.iter().enumerate() {
            builder.add(key, i as u64 + 1).unwrap();
        }
        let fst = builder.finish().unwrap();
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(fst.get(key).unwrap(), Some(i as u64 + 1), "key {key:?}");
        }
        assert_eq!(fst.get(b"ay").unwrap(), None);
    }

    #[test]
    fn test_sparse_wide_node_uses_binary_search() {
        // labels spread across the byte range: binary search, not direct
        // addressing
        let mut builder = FstBuilder::new(U64Outputs);
        let labels: Vec<u8> = (0..16u32).map(|i| (i * 16) as u8).collect();
        let mut keys: Vec<Vec<u8>> = labels.iter().map(|&l| vec![l, b'q']).collect();
        keys.sort();
        for (i, key) in keys.iter().enumerate() {
            builder.add(key, i as u64).unwrap();
        }
        let fst = builder.finish().unwrap();
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(fst.get(key).unwrap(), Some(i as u64));
        }
        assert_eq!(fst.get(&[8, b'q']).unwrap(), None);
    }

    #[test]
    fn test_byte_sequence_outputs() {
        let mut builder = FstBuilder::new(ByteSequenceOutputs);
        builder.add(b"cat", b"feline".to_vec()).unwrap();
        builder.add(b"cow", b"bovine".to_vec()).unwrap();
        builder.add(b"dog", b"canine".to_vec()).unwrap();
        let fst = builder.finish().unwrap();
        assert_eq!(fst.get(b"cat").unwrap(), Some(b"feline".to_vec()));
        assert_eq!(fst.get(b"cow").unwrap(), Some(b"bovine".to_vec()));
        assert_eq!(fst.get(b"dog").unwrap(), Some(b"canine".to_vec()));
        assert_eq!(fst.get(b"c").unwrap(), None);
    }

    #[test]
    fn test_minimality_byte_identical() {
        let pairs = [("car", 5u64), ("cat", 7), ("war", 5), ("wat", 7)];
        let a = build(&pairs);
        let b = build(&pairs);
        assert_eq!(a.as_bytes(), b.as_bytes());

        // suffix sharing dedups the identical "ar"/"at" tails
        let mut unshared = FstBuilder::with_options(U64Outputs, false, true);
        for (k, v) in &pairs {
            unshared.add(k.as_bytes(), *v).unwrap();
        }
        assert!(a.as_bytes().len() < unshared.finish().unwrap().as_bytes().len());
    }

    #[test]
    fn test_save_load() {
        use crate::storage::memory::MemoryStorage;
        use crate::storage::{MemoryStorageConfig, Storage};

        let fst = build(&[("alpha", 3), ("beta", 9), ("gamma", 27)]);
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        {
            let out = storage.create_output("terms.fst").unwrap();
            let mut writer = StructWriter::new(out);
            fst.save(&mut writer).unwrap();
            writer.close().unwrap();
        }
        let input = storage.open_input("terms.fst").unwrap();
        let mut reader = StructReader::new(input);
        let loaded = Fst::load(&mut reader, U64Outputs).unwrap();
        assert_eq!(loaded.as_bytes(), fst.as_bytes());
        assert_eq!(loaded.get(b"beta").unwrap(), Some(9));
        assert_eq!(loaded.get(b"delta").unwrap(), None);
    }

    #[test]
    fn test_large_sorted_set() {
        let mut builder = FstBuilder::new(U64Outputs);
        let keys: Vec<String> = (0..2000u32).map(|i| format!("{i:06}")).collect();
        for (i, key) in keys.iter().enumerate() {
            builder.add(key.as_bytes(), (i as u64) * 3 + 1).unwrap();
        }
        let fst = builder.finish().unwrap();
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(fst.get(key.as_bytes()).unwrap(), Some((i as u64) * 3 + 1));
        }
        assert_eq!(fst.get(b"002000").unwrap(), None);
        let all: Vec<(Vec<u8>, u64)> = fst.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(all.len(), keys.len());
        assert!(all.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
