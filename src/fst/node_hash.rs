//! Frozen-state deduplication for the FST builder.
//!
//! Candidate addresses are bucketed by a structural hash of the uncompiled
//! node; a hit is confirmed by re-reading the frozen node's arcs through the
//! reverse reader and comparing label, target, outputs and finality. Only
//! confirmed equality reuses an address, so hash quality affects speed, not
//! correctness.

use std::hash::{Hash, Hasher};

use crate::error::Result;
use crate::fst::builder::UnCompiledNode;
use crate::fst::bytes::ByteStore;
use crate::fst::outputs::Outputs;
use crate::fst::{parse_node_header, read_frozen_arc, NodeHeader};

/// Structural hash of an uncompiled node. Must be identical for any two
/// nodes that would freeze to the same bytes.
pub(crate) fn hash_node<V: Hash>(node: &UnCompiledNode<V>) -> u64 {
    let mut hasher = ahash::AHasher::default();
    for arc in &node.arcs {
        arc.label.hash(&mut hasher);
        arc.target.hash(&mut hasher);
        arc.output.hash(&mut hasher);
        arc.next_final_output.hash(&mut hasher);
        arc.is_final.hash(&mut hasher);
    }
    hasher.finish()
}

/// Compare an uncompiled node against the frozen node at `addr`.
pub(crate) fn frozen_equals<O: Outputs>(
    outputs: &O,
    bytes: &ByteStore,
    node: &UnCompiledNode<O::Value>,
    addr: i64,
) -> Result<bool> {
    let mut r = bytes.reverse_reader();
    let header = parse_node_header(&mut r, addr)?;

    // fail fast on arc-count mismatch for table-encoded nodes
    match &header {
        NodeHeader::BinarySearch { num_arcs, .. } => {
            if *num_arcs as usize != node.arcs.len() {
                return Ok(false);
            }
        }
        NodeHeader::DirectAddressing {
            label_range,
            first_label,
            ..
        } => {
            let node_range =
                (node.arcs[node.arcs.len() - 1].label - node.arcs[0].label) as u64 + 1;
            if *label_range != node_range || *first_label != node.arcs[0].label {
                return Ok(false);
            }
        }
        NodeHeader::Variable => {}
    }

    for (i, want) in node.arcs.iter().enumerate() {
        let arc = match read_frozen_arc(outputs, &mut r, &header, i)? {
            Some(arc) => arc,
            None => return Ok(false),
        };
        if arc.label != want.label
            || arc.target != want.target
            || arc.is_final != want.is_final
            || arc.output != want.output
            || arc.final_output != want.next_final_output
        {
            return Ok(false);
        }
        if arc.is_last {
            return Ok(i + 1 == node.arcs.len());
        }
    }
    Ok(false)
}
