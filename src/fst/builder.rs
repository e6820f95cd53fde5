//! Online construction of a minimal FST from pre-sorted terms.
//!
//! The builder keeps a frontier of uncompiled nodes for the last inserted
//! term. Each new term freezes the frontier nodes past the shared prefix
//! (tail first, since no later term can extend them), pushes the new suffix,
//! and pushes output residuals along the shared prefix so every path sums to
//! its term's full output. Frozen nodes are deduplicated against a hash of
//! already-compiled states, which is what makes the result minimal.

use ahash::AHashMap;

use crate::error::{FalxError, Result};
use crate::fst::bytes::{ByteStore, DEFAULT_BLOCK_BITS};
use crate::fst::node_hash;
use crate::fst::outputs::Outputs;
use crate::fst::{
    Fst, ARCS_FOR_BINARY_SEARCH, ARCS_FOR_DIRECT_ADDRESSING, BIT_ARC_HAS_FINAL_OUTPUT,
    BIT_ARC_HAS_OUTPUT, BIT_FINAL_ARC, BIT_LAST_ARC, BIT_STOP_NODE, BIT_TARGET_NEXT,
    FINAL_END_NODE, NON_FINAL_END_NODE,
};
use crate::util::varint::encode_u64;

/// Shallow nodes with at least this many arcs get fixed-length encoding.
const FIXED_LENGTH_ARC_NUM_ARCS_SHALLOW: usize = 5;
/// Deeper nodes need at least this many arcs for fixed-length encoding.
const FIXED_LENGTH_ARC_NUM_ARCS_DEEP: usize = 10;
/// Depth boundary between the two thresholds.
const FIXED_LENGTH_ARC_SHALLOW_DEPTH: usize = 3;
/// Direct-addressing oversizing factor: 1.0 keeps no average oversize.
const DIRECT_ADDRESSING_MAX_OVERSIZING_FACTOR: f64 = 1.0;

pub(crate) const UNCOMPILED_TARGET: i64 = i64::MIN;

/// One arc of a frontier node still under construction.
pub(crate) struct BuilderArc<V> {
    pub label: u8,
    pub target: i64,
    pub is_final: bool,
    pub output: V,
    pub next_final_output: V,
}

/// A frontier node still under construction.
pub(crate) struct UnCompiledNode<V> {
    pub arcs: Vec<BuilderArc<V>>,
    /// Final output of this node, meaningful when `is_final`.
    pub output: V,
    pub is_final: bool,
}

impl<V: Clone> UnCompiledNode<V> {
    fn new(no_output: V) -> Self {
        UnCompiledNode {
            arcs: Vec::new(),
            output: no_output,
            is_final: false,
        }
    }

    fn clear(&mut self, no_output: V) {
        self.arcs.clear();
        self.output = no_output;
        self.is_final = false;
    }

    fn add_arc(&mut self, label: u8, no_output: V) {
        debug_assert!(self.arcs.last().map_or(true, |a| a.label < label));
        self.arcs.push(BuilderArc {
            label,
            target: UNCOMPILED_TARGET,
            is_final: false,
            output: no_output.clone(),
            next_final_output: no_output,
        });
    }

    fn replace_last(&mut self, target: i64, next_final_output: V, is_final: bool) {
        let arc = self.arcs.last_mut().expect("replace_last on empty node");
        arc.target = target;
        arc.next_final_output = next_final_output;
        arc.is_final = is_final;
    }

    fn last_output(&self) -> V {
        self.arcs.last().expect("last_output on empty node").output.clone()
    }

    fn set_last_output(&mut self, output: V) {
        self.arcs.last_mut().expect("set_last_output on empty node").output = output;
    }
}

/// Builds a minimal FST from keys fed in strictly ascending byte order.
pub struct FstBuilder<O: Outputs> {
    outputs: O,
    bytes: ByteStore,
    frontier: Vec<UnCompiledNode<O::Value>>,
    last_input: Vec<u8>,
    empty_output: Option<O::Value>,
    share_suffix: bool,
    allow_fixed_length_arcs: bool,
    dedup: AHashMap<u64, Vec<i64>>,
    last_frozen_node: i64,
    da_credit: i64,
    node_count: u64,
    arc_count: u64,
    started: bool,
    scratch: Vec<u8>,
}

impl<O: Outputs> FstBuilder<O> {
    /// New builder with suffix sharing and fixed-length arcs enabled.
    pub fn new(outputs: O) -> Self {
        Self::with_options(outputs, true, true)
    }

    /// New builder with explicit minimization and encoding switches.
    pub fn with_options(outputs: O, share_suffix: bool, allow_fixed_length_arcs: bool) -> Self {
        let mut bytes = ByteStore::new(DEFAULT_BLOCK_BITS);
        // pad byte: address 0 stays invalid so it can mean "no node"
        bytes.write_u8(0);
        let root = UnCompiledNode::new(outputs.no_output());
        FstBuilder {
            outputs,
            bytes,
            frontier: vec![root],
            last_input: Vec::new(),
            empty_output: None,
            share_suffix,
            allow_fixed_length_arcs,
            dedup: AHashMap::new(),
            last_frozen_node: 0,
            da_credit: 0,
            node_count: 0,
            arc_count: 0,
            started: false,
            scratch: Vec::new(),
        }
    }

    /// Number of compiled nodes so far.
    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    /// Number of compiled arcs so far.
    pub fn arc_count(&self) -> u64 {
        self.arc_count
    }

    /// Insert the next key. Keys must arrive in strictly ascending byte
    /// order; anything else is an [`FalxError::IllegalArgument`].
    pub fn add(&mut self, input: &[u8], output: O::Value) -> Result<()> {
        if self.started && input <= self.last_input.as_slice() {
            return Err(FalxError::invalid_argument(format!(
                "FST inputs out of order: {:?} after {:?}",
                input, self.last_input
            )));
        }
        self.started = true;

        if input.is_empty() {
            self.empty_output = Some(output);
            return Ok(());
        }

        let prefix_len = self
            .last_input
            .iter()
            .zip(input.iter())
            .take_while(|(a, b)| a == b)
            .count();

        self.freeze_tail(prefix_len)?;

        // push the new suffix as fresh frontier nodes
        while self.frontier.len() <= input.len() {
            self.frontier.push(UnCompiledNode::new(self.outputs.no_output()));
        }
        for idx in prefix_len..input.len() {
            let no = self.outputs.no_output();
            self.frontier[idx + 1].clear(no.clone());
            self.frontier[idx].add_arc(input[idx], no);
        }
        let last = input.len();
        self.frontier[last].is_final = true;
        self.frontier[last].output = self.outputs.no_output();

        // push conflicting outputs forward, only as far as needed
        let mut rest = output;
        for idx in 1..=prefix_len {
            let (head, tail) = self.frontier.split_at_mut(idx);
            let parent = &mut head[idx - 1];
            let node = &mut tail[0];
            let last_output = parent.last_output();
            let common = if !self.outputs.is_no_output(&last_output) {
                let common = self.outputs.common(&rest, &last_output);
                let word_suffix = self.outputs.subtract(&last_output, &common);
                parent.set_last_output(common.clone());
                if !self.outputs.is_no_output(&word_suffix) {
                    for arc in &mut node.arcs {
                        arc.output = self.outputs.add(&word_suffix, &arc.output);
                    }
                    if node.is_final {
                        node.output = self.outputs.add(&word_suffix, &node.output);
                    }
                }
                common
            } else {
                self.outputs.no_output()
            };
            rest = self.outputs.subtract(&rest, &common);
        }

        // the leftover output rides the first arc private to this input
        self.frontier[prefix_len].set_last_output(rest);

        self.last_input = input.to_vec();
        Ok(())
    }

    /// Freeze and return the finished FST.
    pub fn finish(mut self) -> Result<Fst<O>> {
        self.freeze_tail(0)?;
        let root =
            std::mem::replace(&mut self.frontier[0], UnCompiledNode::new(self.outputs.no_output()));
        let start_node = if root.arcs.is_empty() {
            if root.is_final {
                FINAL_END_NODE
            } else {
                NON_FINAL_END_NODE
            }
        } else {
            self.compile_node(&root, 0)?
        };
        Ok(Fst::from_parts(
            self.outputs.clone(),
            self.bytes.to_vec(),
            start_node,
            self.empty_output,
        ))
    }

    /// Compile every frontier node strictly past the shared prefix, tail
    /// first: no future input can extend them.
    fn freeze_tail(&mut self, prefix_len: usize) -> Result<()> {
        for idx in ((prefix_len + 1)..=self.last_input.len()).rev() {
            let node = std::mem::replace(
                &mut self.frontier[idx],
                UnCompiledNode::new(self.outputs.no_output()),
            );
            let addr = self.compile_node(&node, idx)?;
            self.frontier[idx - 1].replace_last(addr, node.output, node.is_final);
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &UnCompiledNode<O::Value>, depth: usize) -> Result<i64> {
        if node.arcs.is_empty() {
            return Ok(if node.is_final {
                FINAL_END_NODE
            } else {
                NON_FINAL_END_NODE
            });
        }
        if !self.share_suffix {
            return self.add_node(node, depth);
        }
        let hash = node_hash::hash_node(node);
        if let Some(candidates) = self.dedup.get(&hash) {
            let candidates = candidates.clone();
            for addr in candidates {
                if node_hash::frozen_equals(&self.outputs, &self.bytes, node, addr)? {
                    return Ok(addr);
                }
            }
        }
        let addr = self.add_node(node, depth)?;
        self.dedup.entry(hash).or_default().push(addr);
        Ok(addr)
    }

    /// Serialize a node's arcs, reverse them in place, and return the node
    /// address (its highest byte).
    fn add_node(&mut self, node: &UnCompiledNode<O::Value>, depth: usize) -> Result<i64> {
        let start_address = self.bytes.position();
        let num_arcs = node.arcs.len();
        let do_fixed = self.allow_fixed_length_arcs && self.should_expand(num_arcs, depth);

        if do_fixed {
            self.write_fixed_length_node(node)?;
        } else {
            self.write_variable_length_node(node);
        }

        self.node_count += 1;
        self.arc_count += num_arcs as u64;
        let end = self.bytes.position() - 1;
        self.bytes.reverse(start_address, end)?;
        self.last_frozen_node = end as i64;
        Ok(end as i64)
    }

    fn arc_flags(&self, arc: &BuilderArc<O::Value>, is_last: bool, target_next: bool) -> u8 {
        debug_assert!(arc.target != UNCOMPILED_TARGET);
        let mut flags = 0u8;
        if is_last {
            flags |= BIT_LAST_ARC;
        }
        if target_next {
            flags |= BIT_TARGET_NEXT;
        }
        if arc.is_final {
            flags |= BIT_FINAL_ARC;
            if !self.outputs.is_no_output(&arc.next_final_output) {
                flags |= BIT_ARC_HAS_FINAL_OUTPUT;
            }
        } else {
            debug_assert!(self.outputs.is_no_output(&arc.next_final_output));
        }
        if arc.target <= 0 {
            flags |= BIT_STOP_NODE;
        }
        if !self.outputs.is_no_output(&arc.output) {
            flags |= BIT_ARC_HAS_OUTPUT;
        }
        flags
    }

    fn write_variable_length_node(&mut self, node: &UnCompiledNode<O::Value>) {
        let num_arcs = node.arcs.len();
        for (i, arc) in node.arcs.iter().enumerate() {
            let is_last = i + 1 == num_arcs;
            let target_next = arc.target > 0 && arc.target == self.last_frozen_node;
            let flags = self.arc_flags(arc, is_last, target_next);
            self.bytes.write_u8(flags);
            self.bytes.write_u8(arc.label);
            if flags & BIT_ARC_HAS_OUTPUT != 0 {
                self.scratch.clear();
                self.outputs.write(&arc.output, &mut self.scratch);
                self.bytes.write(&self.scratch);
            }
            if flags & BIT_ARC_HAS_FINAL_OUTPUT != 0 {
                self.scratch.clear();
                self.outputs.write(&arc.next_final_output, &mut self.scratch);
                self.bytes.write(&self.scratch);
            }
            if arc.target > 0 && !target_next {
                self.bytes.write_vlong(arc.target as u64);
            }
        }
    }

    fn write_fixed_length_node(&mut self, node: &UnCompiledNode<O::Value>) -> Result<()> {
        let num_arcs = node.arcs.len();

        // serialize every arc body (everything past flags and label) first,
        // so the record width is known before committing to an encoding
        let mut bodies: Vec<u8> = Vec::new();
        let mut meta: Vec<(u8, usize, usize)> = Vec::with_capacity(num_arcs);
        for (i, arc) in node.arcs.iter().enumerate() {
            let is_last = i + 1 == num_arcs;
            let flags = self.arc_flags(arc, is_last, false);
            let body_start = bodies.len();
            if flags & BIT_ARC_HAS_OUTPUT != 0 {
                self.outputs.write(&arc.output, &mut bodies);
            }
            if flags & BIT_ARC_HAS_FINAL_OUTPUT != 0 {
                self.outputs.write(&arc.next_final_output, &mut bodies);
            }
            if arc.target > 0 {
                bodies.extend_from_slice(&encode_u64(arc.target as u64));
            }
            meta.push((flags, body_start, bodies.len() - body_start));
        }

        let max_body = meta.iter().map(|m| m.2).max().unwrap_or(0);
        let first_label = node.arcs[0].label;
        let last_label = node.arcs[num_arcs - 1].label;
        let label_range = (last_label - first_label) as u64 + 1;
        let bytes_per_arc_da = 1 + max_body;
        let bytes_per_arc_bs = 2 + max_body;

        if self.should_direct_address(num_arcs, label_range, bytes_per_arc_da, bytes_per_arc_bs) {
            self.bytes.write_u8(ARCS_FOR_DIRECT_ADDRESSING);
            self.bytes.write_vlong(label_range);
            self.bytes.write_vlong(bytes_per_arc_da as u64);
            self.bytes.write_u8(first_label);
            let table_len = ((label_range + 7) / 8) as usize;
            let mut table = vec![0u8; table_len];
            for arc in &node.arcs {
                let idx = (arc.label - first_label) as usize;
                table[idx / 8] |= 1 << (idx % 8);
            }
            self.bytes.write(&table);
            for (flags, start, len) in meta {
                self.bytes.write_u8(flags);
                self.bytes.write(&bodies[start..start + len]);
                self.bytes.skip_bytes((bytes_per_arc_da - 1 - len) as u64);
            }
        } else {
            self.bytes.write_u8(ARCS_FOR_BINARY_SEARCH);
            self.bytes.write_vlong(num_arcs as u64);
            self.bytes.write_vlong(bytes_per_arc_bs as u64);
            for (i, (flags, start, len)) in meta.into_iter().enumerate() {
                self.bytes.write_u8(flags);
                self.bytes.write_u8(node.arcs[i].label);
                self.bytes.write(&bodies[start..start + len]);
                self.bytes.skip_bytes((bytes_per_arc_bs - 2 - len) as u64);
            }
        }
        Ok(())
    }

    fn should_expand(&self, num_arcs: usize, depth: usize) -> bool {
        num_arcs >= FIXED_LENGTH_ARC_NUM_ARCS_DEEP
            || (depth <= FIXED_LENGTH_ARC_SHALLOW_DEPTH
                && num_arcs >= FIXED_LENGTH_ARC_NUM_ARCS_SHALLOW)
    }

    /// Direct addressing drops per-record labels but pays a presence bit
    /// table; the running credit lets occasional oversized tables through
    /// while bounding the average to the oversizing factor.
    fn should_direct_address(
        &mut self,
        num_arcs: usize,
        label_range: u64,
        bytes_per_arc_da: usize,
        bytes_per_arc_bs: usize,
    ) -> bool {
        let table_len = ((label_range + 7) / 8) as i64;
        let size_da = table_len + 1 + (num_arcs * bytes_per_arc_da) as i64;
        let size_bs = (num_arcs * bytes_per_arc_bs) as i64;
        let allowed =
            (size_bs as f64 * DIRECT_ADDRESSING_MAX_OVERSIZING_FACTOR) as i64 + self.da_credit;
        if size_da <= allowed {
            self.da_credit += size_bs - size_da;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::outputs::U64Outputs;

    #[test]
    fn test_out_of_order_rejected() {
        let mut builder = FstBuilder::new(U64Outputs);
        builder.add(b"beta", 1).unwrap();
        let err = builder.add(b"alpha", 2).unwrap_err();
        assert!(matches!(err, FalxError::IllegalArgument(_)));
        let err = builder.add(b"beta", 3).unwrap_err();
        assert!(matches!(err, FalxError::IllegalArgument(_)));
    }

    #[test]
    fn test_empty_builder() {
        let builder = FstBuilder::new(U64Outputs);
        let fst = builder.finish().unwrap();
        assert_eq!(fst.get(b"anything").unwrap(), None);
        assert_eq!(fst.get(b"").unwrap(), None);
        assert_eq!(fst.iter().count(), 0);
    }

    #[test]
    fn test_single_key() {
        let mut builder = FstBuilder::new(U64Outputs);
        builder.add(b"only", 17).unwrap();
        let fst = builder.finish().unwrap();
        assert_eq!(fst.get(b"only").unwrap(), Some(17));
        assert_eq!(fst.get(b"onl").unwrap(), None);
        assert_eq!(fst.get(b"onlyx").unwrap(), None);
    }

    #[test]
    fn test_shared_suffix_reduces_nodes() {
        // "xar","xat" vs "yar","yat": tails dedup into one frozen subgraph
        let mut shared = FstBuilder::new(U64Outputs);
        for key in ["xar", "xat", "yar", "yat"] {
            shared.add(key.as_bytes(), 0).unwrap();
        }
        let shared_len = shared.finish().unwrap().as_bytes().len();

        let mut unshared = FstBuilder::with_options(U64Outputs, false, true);
        for key in ["xar", "xat", "yar", "yat"] {
            unshared.add(key.as_bytes(), 0).unwrap();
        }
        let unshared_len = unshared.finish().unwrap().as_bytes().len();
        assert!(shared_len < unshared_len);
    }

    #[test]
    fn test_output_pushing() {
        // outputs share a common prefix value that must migrate toward the
        // root as later keys arrive
        let mut builder = FstBuilder::new(U64Outputs);
        builder.add(b"mop", 100).unwrap();
        builder.add(b"moth", 91).unwrap();
        builder.add(b"pop", 72).unwrap();
        builder.add(b"star", 83).unwrap();
        builder.add(b"stop", 54).unwrap();
        builder.add(b"top", 55).unwrap();
        let fst = builder.finish().unwrap();
        for (key, want) in [
            (&b"mop"[..], 100u64),
            (b"moth", 91),
            (b"pop", 72),
            (b"star", 83),
            (b"stop", 54),
            (b"top", 55),
        ] {
            assert_eq!(fst.get(key).unwrap(), Some(want), "key {key:?}");
        }
    }
}
