//! # Element Serialization
//!
//! Keys and values stored in the tree are opaque to the engine: every
//! type-specific concern (byte encoding, decoding, ordering) is supplied by
//! the caller through the [`ElementSerializer`] trait. The engine itself only
//! ever calls `compare` during searches and `deserialize` when a lazily-loaded
//! key slot is first touched.
//!
//! ## Ordering Contract
//!
//! `compare` must define a total order. When a durable collaborator relies on
//! byte-level prefix comparison, the order must also be consistent with the
//! serialized layout; the in-memory engine only requires consistency of the
//! comparator itself.
//!
//! ## Provided Implementations
//!
//! - [`LongSerializer`] / [`IntSerializer`]: big-endian fixed-width integers
//! - [`StringSerializer`]: UTF-8 bytes, ordered by `str` comparison
//! - [`ByteArraySerializer`]: raw bytes, standard length-extended
//!   lexicographic order (equal up to the shorter length means the shorter
//!   array sorts first)
//! - [`UnitSerializer`]: zero-byte marker type used as the value of
//!   duplicate-key sub-trees

use std::cmp::Ordering;

use eyre::{ensure, Result, WrapErr};

/// Per-type serialization and comparison capability supplied by the caller.
pub trait ElementSerializer<T>: Send + Sync {
    /// Encodes a value to bytes.
    fn serialize(&self, value: &T) -> Vec<u8>;

    /// Decodes a value from bytes produced by [`serialize`](Self::serialize).
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;

    /// Total order over values of `T`.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Marker bound for types storable in the tree. Pages are shared across
/// reader threads, so elements must be cloneable and thread-safe.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Element for T {}

/// Big-endian `i64` serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongSerializer;

impl ElementSerializer<i64> for LongSerializer {
    fn serialize(&self, value: &i64) -> Vec<u8> {
        value.to_be_bytes().to_vec()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<i64> {
        ensure!(
            bytes.len() == 8,
            "expected 8 bytes for an i64 key, got {}",
            bytes.len()
        );
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(buf))
    }

    fn compare(&self, a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }
}

/// Big-endian `i32` serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntSerializer;

impl ElementSerializer<i32> for IntSerializer {
    fn serialize(&self, value: &i32) -> Vec<u8> {
        value.to_be_bytes().to_vec()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<i32> {
        ensure!(
            bytes.len() == 4,
            "expected 4 bytes for an i32 key, got {}",
            bytes.len()
        );
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(i32::from_be_bytes(buf))
    }

    fn compare(&self, a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }
}

/// UTF-8 string serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl ElementSerializer<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).wrap_err("string key is not valid UTF-8")
    }

    fn compare(&self, a: &String, b: &String) -> Ordering {
        a.cmp(b)
    }
}

/// Raw byte-array serializer.
///
/// Comparison is standard length-extended lexicographic order: arrays equal
/// up to the shorter length compare by length, shorter first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteArraySerializer;

impl ElementSerializer<Vec<u8>> for ByteArraySerializer {
    fn serialize(&self, value: &Vec<u8>) -> Vec<u8> {
        value.clone()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn compare(&self, a: &Vec<u8>, b: &Vec<u8>) -> Ordering {
        a.as_slice().cmp(b.as_slice())
    }
}

/// Serializer for the `()` marker stored as the value of duplicate-key
/// sub-trees. Serializes to zero bytes; all markers compare equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitSerializer;

impl ElementSerializer<()> for UnitSerializer {
    fn serialize(&self, _value: &()) -> Vec<u8> {
        Vec::new()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<()> {
        ensure!(
            bytes.is_empty(),
            "expected 0 bytes for a unit marker, got {}",
            bytes.len()
        );
        Ok(())
    }

    fn compare(&self, _a: &(), _b: &()) -> Ordering {
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_roundtrip() {
        let ser = LongSerializer;
        for v in [i64::MIN, -1, 0, 1, 42, i64::MAX] {
            let bytes = ser.serialize(&v);
            assert_eq!(ser.deserialize(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn test_long_rejects_wrong_length() {
        let ser = LongSerializer;
        assert!(ser.deserialize(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_string_roundtrip() {
        let ser = StringSerializer;
        let s = "héllo".to_string();
        assert_eq!(ser.deserialize(&ser.serialize(&s)).unwrap(), s);
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let ser = StringSerializer;
        assert!(ser.deserialize(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_byte_array_prefix_orders_shorter_first() {
        let ser = ByteArraySerializer;
        let short = vec![1u8, 2];
        let long = vec![1u8, 2, 0];
        assert_eq!(ser.compare(&short, &long), Ordering::Less);
        assert_eq!(ser.compare(&long, &short), Ordering::Greater);
        assert_eq!(ser.compare(&short, &short.clone()), Ordering::Equal);
    }

    #[test]
    fn test_byte_array_content_beats_length() {
        let ser = ByteArraySerializer;
        assert_eq!(
            ser.compare(&vec![0u8, 9, 9, 9], &vec![1u8]),
            Ordering::Less
        );
    }

    #[test]
    fn test_unit_serializer() {
        let ser = UnitSerializer;
        assert!(ser.serialize(&()).is_empty());
        assert!(ser.deserialize(&[]).is_ok());
        assert!(ser.deserialize(&[0]).is_err());
    }
}
