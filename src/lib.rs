//! Per-country sales aggregation over a retail transaction log.
//!
//! The job is a classic map / combine / reduce dataflow: every CSV line
//! is mapped to a `(country, partial)` pair, partials are folded locally
//! by a combiner, shuffled by country and merged by the reducer. The
//! in-process scheduler in [`standalone`] stands in for a cluster.

use bytes::Bytes;
use counters::Counters;
use std::hash::Hasher;

pub mod aggregate;
pub mod counters;
pub mod record;
pub mod standalone;
pub mod utils;
pub mod workload;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// The output of an application map function.
///
/// There are 2 layers of [`anyhow::Result`]s here. The outer layer
/// accounts for errors that arise while creating the iterator.
/// The inner layer accounts for errors that occur during iteration.
///
/// Either layer failing aborts the job; per-record data problems are
/// reported through counters instead.
pub type MapOutput = anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<KeyValue>>>>;

/// A map function takes one input record and the job's counters.
///
/// The record key is the byte offset of the line, the value is the raw line.
/// It returns an iterator that yields intermediate key-value pairs.
pub type MapFn = fn(kv: KeyValue, counters: &dyn Counters) -> MapOutput;

/// A reduce function takes in a key and an iterator over encoded values for
/// that key. It returns the single encoded value for the key.
///
/// The same signature is used for combiners, whose output is fed back into
/// the shuffle.
pub type ReduceFn = fn(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    counters: &dyn Counters,
) -> anyhow::Result<Bytes>;

/// Renders one reduced pair as an output line, including the line terminator.
pub type FormatFn = fn(key: &Bytes, value: &Bytes) -> anyhow::Result<Bytes>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub name: &'static str,
    pub map_fn: MapFn,
    pub combine_fn: Option<ReduceFn>,
    pub reduce_fn: ReduceFn,
    pub format_fn: FormatFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: Bytes,
    /// The value.
    pub value: Bytes,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }

    /// Get the key of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn key(&self) -> Bytes {
        self.key.clone()
    }

    /// Get the value of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn value(&self) -> Bytes {
        self.value.clone()
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> Bytes {
        self.value
    }
}

/// Hashes an intermediate key. Compute a reduce bucket for a given key
/// by calculating `ihash(key) % n_reduce`.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    hasher.write(key);
    // Masked to 31 bits, always fits.
    (hasher.finish() & 0x7fffffff) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ihash_is_stable_and_spreads_keys() {
        assert_eq!(ihash(b"France"), ihash(b"France"));
        assert!(ihash(b"France") <= 0x7fffffff);

        let countries = ["France", "Germany", "EIRE", "Spain", "United Kingdom"];
        let buckets: std::collections::HashSet<u32> = countries
            .iter()
            .map(|c| ihash(c.as_bytes()) % 4)
            .collect();
        assert!(buckets.len() > 1);
    }

    #[test]
    fn key_value_accessors() {
        let kv = KeyValue::new(Bytes::from_static(b"k"), Bytes::from_static(b"v"));
        assert_eq!(kv.key(), Bytes::from_static(b"k"));
        assert_eq!(kv.value(), Bytes::from_static(b"v"));
        assert_eq!(kv.into_value(), Bytes::from_static(b"v"));
    }
}
