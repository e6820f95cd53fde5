//! Output algebras for FST arcs.
//!
//! An output algebra provides `common`, `add` and `subtract` over the value
//! type so that per-arc residuals compose along a path to the full term
//! payload: `add(a, subtract(b, a)) == b` whenever `a` is a common value of
//! `b`, `common(x, x) == x`, and `common(x, no_output()) == no_output()`.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::Result;
use crate::fst::bytes::BytesReader;

/// The algebra under which FST arc outputs compose along a path.
pub trait Outputs: Clone + Send + Sync {
    /// The output value type.
    type Value: Clone + PartialEq + Eq + Hash + Debug + Send + Sync;

    /// The shared part of two outputs, e.g. `common(7, 5) == 5`.
    fn common(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// Remove `inc` from the front of `a`, e.g. `subtract(7, 5) == 2`.
    fn subtract(&self, a: &Self::Value, inc: &Self::Value) -> Self::Value;

    /// Compose a prefix and a suffix, e.g. `add(5, 2) == 7`.
    fn add(&self, prefix: &Self::Value, suffix: &Self::Value) -> Self::Value;

    /// The identity element.
    fn no_output(&self) -> Self::Value;

    /// Whether `v` is the identity.
    fn is_no_output(&self, v: &Self::Value) -> bool {
        *v == self.no_output()
    }

    /// Encode a value into the forward byte stream.
    fn write(&self, v: &Self::Value, out: &mut Vec<u8>);

    /// Decode a value from the reverse reader.
    fn read(&self, reader: &mut dyn BytesReader) -> Result<Self::Value>;
}

/// Non-negative integer outputs under the min/plus algebra.
///
/// Used by the terms dictionary, where each term's output is its metadata
/// offset into the `.tim` file. The identity is 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct U64Outputs;

impl Outputs for U64Outputs {
    type Value = u64;

    fn common(&self, a: &u64, b: &u64) -> u64 {
        (*a).min(*b)
    }

    fn subtract(&self, a: &u64, inc: &u64) -> u64 {
        debug_assert!(inc <= a);
        a - inc
    }

    fn add(&self, prefix: &u64, suffix: &u64) -> u64 {
        prefix + suffix
    }

    fn no_output(&self) -> u64 {
        0
    }

    fn write(&self, v: &u64, out: &mut Vec<u8>) {
        let mut value = *v;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    fn read(&self, reader: &mut dyn BytesReader) -> Result<u64> {
        reader.read_vlong()
    }
}

/// Byte-sequence outputs under the longest-common-prefix algebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteSequenceOutputs;

impl Outputs for ByteSequenceOutputs {
    type Value = Vec<u8>;

    fn common(&self, a: &Vec<u8>, b: &Vec<u8>) -> Vec<u8> {
        let len = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
        a[..len].to_vec()
    }

    fn subtract(&self, a: &Vec<u8>, inc: &Vec<u8>) -> Vec<u8> {
        debug_assert!(a.starts_with(inc));
        a[inc.len()..].to_vec()
    }

    fn add(&self, prefix: &Vec<u8>, suffix: &Vec<u8>) -> Vec<u8> {
        let mut out = Vec::with_capacity(prefix.len() + suffix.len());
        out.extend_from_slice(prefix);
        out.extend_from_slice(suffix);
        out
    }

    fn no_output(&self) -> Vec<u8> {
        Vec::new()
    }

    fn write(&self, v: &Vec<u8>, out: &mut Vec<u8>) {
        U64Outputs.write(&(v.len() as u64), out);
        out.extend_from_slice(v);
    }

    fn read(&self, reader: &mut dyn BytesReader) -> Result<Vec<u8>> {
        let len = reader.read_vlong()? as usize;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(reader.read_u8()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_algebra_laws() {
        let o = U64Outputs;
        for (a, b) in [(5u64, 7u64), (0, 3), (12, 12)] {
            let c = o.common(&a, &b);
            assert_eq!(o.add(&c, &o.subtract(&b, &c)), b);
            assert_eq!(o.add(&c, &o.subtract(&a, &c)), a);
        }
        assert_eq!(o.common(&9, &o.no_output()), o.no_output());
    }

    #[test]
    fn test_byte_sequence_algebra_laws() {
        let o = ByteSequenceOutputs;
        let a = b"foobar".to_vec();
        let b = b"food".to_vec();
        let c = o.common(&a, &b);
        assert_eq!(c, b"foo");
        assert_eq!(o.subtract(&a, &c), b"bar");
        assert_eq!(o.add(&c, &o.subtract(&a, &c)), a);
        assert!(o.is_no_output(&o.common(&a, &o.no_output())));
    }
}
