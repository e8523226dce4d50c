//! Column statistics, bloom filters, and histograms recorded per partition
//! (spec §3 Partition, §4.7 step 6, consumed for pruning by §4.8 step 4).
//!
//! Bloom filters and histograms are only built for non-boolean columns — a
//! two-valued domain is too small for either to narrow a partition search.

use crate::domain::partition::ColumnStatistics;
use crate::domain::schema::{FieldType, SchemaField};
use chrono::DateTime;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const BLOOM_BITS: usize = 2048;
const BLOOM_HASHES: usize = 4;
const HISTOGRAM_BINS: usize = 16;

/// Compute per-column statistics over `rows` for every field in `schema`.
pub fn compute(schema: &[SchemaField], rows: &[serde_json::Value]) -> HashMap<String, ColumnStatistics> {
    schema.iter().map(|field| (field.name.clone(), compute_column(field, rows))).collect()
}

fn compute_column(field: &SchemaField, rows: &[serde_json::Value]) -> ColumnStatistics {
    let values: Vec<Option<&serde_json::Value>> =
        rows.iter().map(|row| row.get(&field.name).filter(|v| !v.is_null())).collect();

    let null_count = values.iter().filter(|v| v.is_none()).count() as i64;
    let present: Vec<&serde_json::Value> = values.into_iter().flatten().collect();
    let (min, max) = min_max(field.field_type, &present);
    let indexed = field.field_type != FieldType::Boolean;

    ColumnStatistics {
        min,
        max,
        null_count,
        row_count: rows.len() as i64,
        bloom_filter: if indexed { Some(build_bloom(&present)) } else { None },
        histogram: if indexed { build_histogram(field.field_type, &present) } else { None },
    }
}

fn min_max(
    field_type: FieldType,
    values: &[&serde_json::Value],
) -> (Option<serde_json::Value>, Option<serde_json::Value>) {
    if values.is_empty() {
        return (None, None);
    }
    match field_type {
        FieldType::Double | FieldType::Integer | FieldType::Timestamp => {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut min_v = None;
            let mut max_v = None;
            for value in values {
                if let Some(n) = as_f64(value) {
                    if n < min {
                        min = n;
                        min_v = Some((*value).clone());
                    }
                    if n > max {
                        max = n;
                        max_v = Some((*value).clone());
                    }
                }
            }
            (min_v, max_v)
        }
        FieldType::String | FieldType::Boolean => {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            (sorted.first().cloned().cloned(), sorted.last().cloned().cloned())
        }
    }
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.timestamp_millis() as f64)
}

fn bloom_bit(value: &serde_json::Value, seed: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(value.to_string().as_bytes());
    let digest = hasher.finalize();
    let n = u64::from_le_bytes(digest[0..8].try_into().expect("sha256 digest is at least 8 bytes"));
    (n % BLOOM_BITS as u64) as usize
}

fn build_bloom(values: &[&serde_json::Value]) -> Vec<u8> {
    let mut bits = vec![0u8; BLOOM_BITS / 8];
    for value in values {
        for seed in 0..BLOOM_HASHES {
            let bit = bloom_bit(value, seed);
            bits[bit / 8] |= 1 << (bit % 8);
        }
    }
    bits
}

/// Test membership against a bloom filter built by [`build_bloom`]. A
/// `false` result definitively excludes the value; `true` is inconclusive.
pub fn bloom_might_contain(bits: &[u8], value: &serde_json::Value) -> bool {
    for seed in 0..BLOOM_HASHES {
        let bit = bloom_bit(value, seed);
        if bits[bit / 8] & (1 << (bit % 8)) == 0 {
            return false;
        }
    }
    true
}

fn build_histogram(field_type: FieldType, values: &[&serde_json::Value]) -> Option<Vec<i64>> {
    if !matches!(field_type, FieldType::Double | FieldType::Integer | FieldType::Timestamp) {
        return None;
    }
    let numeric: Vec<f64> = values.iter().filter_map(|v| as_f64(v)).collect();
    if numeric.is_empty() {
        return None;
    }
    let min = numeric.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = numeric.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut bins = vec![0i64; HISTOGRAM_BINS];
    if !(max > min) {
        bins[0] = numeric.len() as i64;
        return Some(bins);
    }
    let width = (max - min) / HISTOGRAM_BINS as f64;
    for n in numeric {
        let bin = (((n - min) / width) as usize).min(HISTOGRAM_BINS - 1);
        bins[bin] += 1;
    }
    Some(bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::SchemaField;

    fn field(name: &str, ty: FieldType) -> SchemaField {
        SchemaField { name: name.into(), field_type: ty, nullable: true, description: None }
    }

    #[test]
    fn numeric_min_max_and_null_count() {
        let schema = vec![field("temp", FieldType::Double)];
        let rows = vec![
            serde_json::json!({"temp": 1.0}),
            serde_json::json!({"temp": 5.5}),
            serde_json::json!({"temp": serde_json::Value::Null}),
        ];
        let stats = compute(&schema, &rows);
        let temp = &stats["temp"];
        assert_eq!(temp.min, Some(serde_json::json!(1.0)));
        assert_eq!(temp.max, Some(serde_json::json!(5.5)));
        assert_eq!(temp.null_count, 1);
        assert_eq!(temp.row_count, 3);
    }

    #[test]
    fn boolean_columns_skip_bloom_and_histogram() {
        let schema = vec![field("flag", FieldType::Boolean)];
        let rows = vec![serde_json::json!({"flag": true}), serde_json::json!({"flag": false})];
        let stats = compute(&schema, &rows);
        assert!(stats["flag"].bloom_filter.is_none());
        assert!(stats["flag"].histogram.is_none());
    }

    #[test]
    fn bloom_filter_never_false_negative() {
        let schema = vec![field("id", FieldType::String)];
        let rows: Vec<serde_json::Value> = (0..50).map(|i| serde_json::json!({"id": format!("row-{i}")})).collect();
        let stats = compute(&schema, &rows);
        let bits = stats["id"].bloom_filter.as_ref().unwrap();
        for i in 0..50 {
            assert!(bloom_might_contain(bits, &serde_json::json!(format!("row-{i}"))));
        }
    }
}
