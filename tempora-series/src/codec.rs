//! Binary serialization for sorted series
//!
//! A serialized series is a self-delimiting little-endian payload: a
//! fixed header followed by a compressed key block and a compressed
//! value block.
//!
//! # Binary Format Specification
//!
//! ```text
//! ┌──────────────┬───────────┬─────────┬────────────┬──────────┐
//! │ Total Size   │ Format    │ Flags   │ Reserved   │ Size     │
//! │ (4B, i32)    │ (1B, ==1) │ (1B, 0) │ (2B, 0)    │ (4B,i32) │
//! ├──────────────┼───────────┼─────────┼────────────┼──────────┤
//! │ Version      │ Regular   │ Sealed  │ Key Block  │ Val Block│
//! │ (8B, i64)    │ (1B, 0/1) │ (1B,0/1)│ (variable) │ (variable)│
//! └──────────────┴───────────┴─────────┴────────────┴──────────┘
//! ```
//!
//! ## Block Format
//!
//! ```text
//! ┌────────────┬────────────┬────────────┬────────────┐
//! │ Length(4B) │ Method(1B) │ CRC32(4B)  │ Payload    │
//! └────────────┴────────────┴────────────┴────────────┘
//! ```
//!
//! `Length` counts everything after itself; `Method` selects the
//! compression (0 = none, 1 = LZ4, 2 = Snappy); the checksum covers
//! the compressed payload. Inside a block the elements are a
//! bincode-encoded vector.
//!
//! When the regular flag is set the key block carries exactly two
//! elements, `[first, second]`; the reader derives the remaining keys
//! arithmetically. Deserialization restores the series' mutation
//! version and sealed state, so a round-trip is observationally
//! identical to the original.

use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use tempora_core::{CompressionType, Error, KeyComparer, Result};

use crate::config::SeriesConfig;
use crate::key_store::KeyStore;
use crate::pool::BufferPool;
use crate::series::SortedSeries;

/// Serialization format version
pub const FORMAT_VERSION: u8 = 1;

/// Fixed header length in bytes
pub const HEADER_LEN: usize = 22;

const METHOD_NONE: u8 = 0;
const METHOD_LZ4: u8 = 1;
const METHOD_SNAPPY: u8 = 2;

/// Serializes a series into its binary form
pub fn serialize_series<K, V, C>(
    series: &SortedSeries<K, V, C>,
    compression: CompressionType,
) -> Result<Vec<u8>>
where
    K: Copy + Serialize,
    V: Copy + Serialize,
    C: KeyComparer<K>,
{
    let snapshot = series.codec_snapshot();

    let keys_payload = match snapshot.regular {
        Some((first, second)) => encode_elements(&[first, second])?,
        None => encode_elements(&snapshot.keys)?,
    };
    let values_payload = encode_elements(&snapshot.values)?;

    let keys_block = encode_block(&keys_payload, compression)?;
    let values_block = encode_block(&values_payload, compression)?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + keys_block.len() + values_block.len());
    buf.put_i32_le(0); // total size placeholder
    buf.put_u8(FORMAT_VERSION);
    buf.put_u8(0); // flags
    buf.put_i16_le(0); // reserved
    buf.put_i32_le(snapshot.len as i32);
    buf.put_i64_le(snapshot.version as i64);
    buf.put_u8(snapshot.regular.is_some() as u8);
    buf.put_u8(snapshot.sealed as u8);
    buf.extend_from_slice(&keys_block);
    buf.extend_from_slice(&values_block);

    let total = buf.len() as i32;
    buf[0..4].copy_from_slice(&total.to_le_bytes());
    Ok(buf.to_vec())
}

/// Reconstructs a series from its binary form
///
/// The comparer must match the one the series was built with; a
/// regular key block additionally requires it to be diffable.
pub fn deserialize_series<K, V, C>(data: &[u8], comparer: C) -> Result<SortedSeries<K, V, C>>
where
    K: Copy + DeserializeOwned,
    V: Copy + DeserializeOwned,
    C: KeyComparer<K>,
{
    if data.len() < HEADER_LEN {
        return Err(Error::Corruption("series payload too small".to_string()));
    }

    let mut cursor = data;
    let total = cursor.get_i32_le() as usize;
    if total != data.len() {
        return Err(Error::Corruption("total size mismatch".to_string()));
    }
    let format = cursor.get_u8();
    if format != FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported format version {}",
            format
        )));
    }
    let _flags = cursor.get_u8();
    let _reserved = cursor.get_i16_le();
    let size = cursor.get_i32_le();
    if size < 0 {
        return Err(Error::Corruption("negative entry count".to_string()));
    }
    let size = size as usize;
    let version = cursor.get_i64_le() as u64;
    let is_regular = cursor.get_u8() != 0;
    let is_sealed = cursor.get_u8() != 0;

    let keys_payload = decode_block(&mut cursor)?;
    let values_payload = decode_block(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(Error::Corruption("trailing bytes after blocks".to_string()));
    }

    let keys: Vec<K> = decode_elements(&keys_payload)?;
    let values: Vec<V> = decode_elements(&values_payload)?;
    if values.len() != size {
        return Err(Error::Corruption(format!(
            "value count {} does not match entry count {}",
            values.len(),
            size
        )));
    }

    let config = SeriesConfig::default();
    let key_pool = Arc::new(BufferPool::new(config.pool.max_retained));
    let value_pool = Arc::new(BufferPool::new(config.pool.max_retained));

    let key_store = if is_regular {
        if size < 2 || keys.len() < 2 {
            return Err(Error::Corruption(
                "regular key block needs two elements".to_string(),
            ));
        }
        if !comparer.is_diffable() {
            return Err(Error::Corruption(
                "regular key block requires a diffable comparer".to_string(),
            ));
        }
        let first = keys[0];
        let step = comparer.diff(&keys[1], &keys[0]);
        if step <= 0 {
            return Err(Error::Corruption(format!(
                "regular key block has non-positive step {}",
                step
            )));
        }
        KeyStore::from_regular(first, step, size, &comparer, &key_pool)
    } else {
        if keys.len() != size {
            return Err(Error::Corruption(format!(
                "key count {} does not match entry count {}",
                keys.len(),
                size
            )));
        }
        let mut buf = key_pool.rent(size.max(config.initial_capacity));
        buf.extend_from_slice(&keys);
        KeyStore::from_dense(buf)
    };

    let mut value_buf = value_pool.rent(size.max(config.initial_capacity));
    value_buf.extend_from_slice(&values);

    Ok(SortedSeries::from_parts(
        key_store, value_buf, comparer, version, is_sealed, key_pool, value_pool,
    ))
}

fn encode_elements<T: Serialize>(elements: &[T]) -> Result<Vec<u8>> {
    bincode::serialize(&elements).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode_elements<T: DeserializeOwned>(payload: &[u8]) -> Result<Vec<T>> {
    bincode::deserialize(payload).map_err(|e| Error::Serialization(e.to_string()))
}

fn encode_block(payload: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    let (method, compressed) = match compression {
        CompressionType::None => (METHOD_NONE, payload.to_vec()),
        CompressionType::Lz4 => (
            METHOD_LZ4,
            lz4::block::compress(payload, None, true)?,
        ),
        CompressionType::Snappy => (
            METHOD_SNAPPY,
            snap::raw::Encoder::new()
                .compress_vec(payload)
                .map_err(|e| Error::Serialization(e.to_string()))?,
        ),
    };

    let mut hasher = Hasher::new();
    hasher.update(&compressed);
    let checksum = hasher.finalize();

    let mut block = BytesMut::with_capacity(4 + 1 + 4 + compressed.len());
    block.put_u32_le((1 + 4 + compressed.len()) as u32);
    block.put_u8(method);
    block.put_u32_le(checksum);
    block.extend_from_slice(&compressed);
    Ok(block.to_vec())
}

fn decode_block(cursor: &mut &[u8]) -> Result<Vec<u8>> {
    if cursor.remaining() < 4 {
        return Err(Error::Corruption("block header truncated".to_string()));
    }
    let length = cursor.get_u32_le() as usize;
    if length < 5 || cursor.remaining() < length {
        return Err(Error::Corruption("block length out of bounds".to_string()));
    }
    let method = cursor.get_u8();
    let expected_checksum = cursor.get_u32_le();
    let compressed = &cursor[..length - 5];

    let mut hasher = Hasher::new();
    hasher.update(compressed);
    if hasher.finalize() != expected_checksum {
        return Err(Error::Corruption("block checksum mismatch".to_string()));
    }

    let payload = match method {
        METHOD_NONE => compressed.to_vec(),
        METHOD_LZ4 => lz4::block::decompress(compressed, None)?,
        METHOD_SNAPPY => snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| Error::Corruption(e.to_string()))?,
        other => {
            return Err(Error::Corruption(format!(
                "unknown compression method {}",
                other
            )))
        }
    };
    cursor.advance(length - 5);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempora_core::{DefaultComparer, TickComparer};

    fn sample_series() -> SortedSeries<i64, f64, TickComparer<i64>> {
        let series = SortedSeries::new(TickComparer::<i64>::new());
        series.set(10, 1.5).unwrap();
        series.set(20, 2.5).unwrap();
        series.set(30, 3.5).unwrap();
        series
    }

    fn assert_round_trip(compression: CompressionType) {
        let series = sample_series();
        let bytes = serialize_series(&series, compression).unwrap();
        let restored: SortedSeries<i64, f64, _> =
            deserialize_series(&bytes, TickComparer::<i64>::new()).unwrap();

        assert_eq!(restored.to_vec(), series.to_vec());
        assert_eq!(restored.version(), series.version());
        assert_eq!(restored.is_sealed(), series.is_sealed());
        assert_eq!(restored.is_regular(), series.is_regular());
    }

    #[test]
    fn test_round_trip_uncompressed() {
        assert_round_trip(CompressionType::None);
    }

    #[test]
    fn test_round_trip_lz4() {
        assert_round_trip(CompressionType::Lz4);
    }

    #[test]
    fn test_round_trip_snappy() {
        assert_round_trip(CompressionType::Snappy);
    }

    #[test]
    fn test_regular_series_writes_two_keys() {
        let series = sample_series();
        assert!(series.is_regular());
        let bytes = serialize_series(&series, CompressionType::None).unwrap();

        // regular flag at offset 20
        assert_eq!(bytes[20], 1);

        let restored: SortedSeries<i64, f64, _> =
            deserialize_series(&bytes, TickComparer::<i64>::new()).unwrap();
        assert!(restored.is_regular());
        assert_eq!(restored.keys(), vec![10, 20, 30]);
    }

    #[test]
    fn test_dense_series_round_trip() {
        let series = SortedSeries::new(TickComparer::<i64>::new());
        for (k, v) in [(10, 1.0), (20, 2.0), (35, 3.0)] {
            series.set(k, v).unwrap();
        }
        assert!(!series.is_regular());

        let bytes = serialize_series(&series, CompressionType::Lz4).unwrap();
        assert_eq!(bytes[20], 0);

        let restored: SortedSeries<i64, f64, _> =
            deserialize_series(&bytes, TickComparer::<i64>::new()).unwrap();
        assert!(!restored.is_regular());
        assert_eq!(restored.to_vec(), series.to_vec());
    }

    #[test]
    fn test_sealed_flag_survives() {
        let series = sample_series();
        series.complete();

        let bytes = serialize_series(&series, CompressionType::None).unwrap();
        assert_eq!(bytes[21], 1);

        let restored: SortedSeries<i64, f64, _> =
            deserialize_series(&bytes, TickComparer::<i64>::new()).unwrap();
        assert!(restored.is_sealed());
        assert!(matches!(restored.set(40, 4.0), Err(Error::Sealed)));
    }

    #[test]
    fn test_version_survives() {
        let series = sample_series();
        let version = series.version();
        assert!(version > 0);

        let bytes = serialize_series(&series, CompressionType::None).unwrap();
        let restored: SortedSeries<i64, f64, _> =
            deserialize_series(&bytes, TickComparer::<i64>::new()).unwrap();
        assert_eq!(restored.version(), version);
    }

    #[test]
    fn test_empty_series_round_trip() {
        let series: SortedSeries<i64, f64, _> = SortedSeries::new(TickComparer::<i64>::new());
        let bytes = serialize_series(&series, CompressionType::Snappy).unwrap();
        let restored: SortedSeries<i64, f64, _> =
            deserialize_series(&bytes, TickComparer::<i64>::new()).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_non_diffable_comparer_round_trip() {
        let series = SortedSeries::new(DefaultComparer::<i64>::new());
        series.set(1, 10i64).unwrap();
        series.set(2, 20).unwrap();

        let bytes = serialize_series(&series, CompressionType::None).unwrap();
        let restored: SortedSeries<i64, i64, _> =
            deserialize_series(&bytes, DefaultComparer::<i64>::new()).unwrap();
        assert_eq!(restored.to_vec(), vec![(1, 10), (2, 20)]);
    }

    #[test]
    fn test_corruption_detection() {
        let series = sample_series();
        let mut bytes = serialize_series(&series, CompressionType::None).unwrap();
        let tail = bytes.len() - 1;
        bytes[tail] ^= 0xFF;

        let result: Result<SortedSeries<i64, f64, _>> =
            deserialize_series(&bytes, TickComparer::<i64>::new());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let series = sample_series();
        let bytes = serialize_series(&series, CompressionType::None).unwrap();

        let result: Result<SortedSeries<i64, f64, _>> =
            deserialize_series(&bytes[..HEADER_LEN + 3], TickComparer::<i64>::new());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_total_size_field() {
        let series = sample_series();
        let bytes = serialize_series(&series, CompressionType::None).unwrap();
        let total = i32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(total, bytes.len());
        assert_eq!(bytes[4], FORMAT_VERSION);
    }
}
