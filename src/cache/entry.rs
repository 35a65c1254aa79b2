use std::io::{Read, Write};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::model::{Priority, QueryResult};

/// L2 entries over `compression_threshold_bytes` are gzip-compressed
/// (spec.md §4.6 "entries over `compression_threshold` are stored
/// compressed").
pub(super) fn compress(result: &QueryResult) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(result)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

pub(super) fn decompress(bytes: &[u8]) -> Result<QueryResult> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Which of the two cache levels an entry currently occupies (spec.md
/// §4.6). Orthogonal to whether the payload happens to be compressed: an
/// L2 entry under `compression_threshold_bytes` is stored uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CacheLevel {
    L1,
    L2,
}

pub(super) enum Payload {
    Raw(QueryResult),
    Compressed { bytes: Vec<u8> },
}

impl Payload {
    pub(super) fn size_bytes(&self) -> u64 {
        match self {
            Payload::Raw(result) => estimate_size(result),
            Payload::Compressed { bytes, .. } => bytes.len() as u64,
        }
    }
}

/// Rough in-memory footprint of a result, used for L1 budget accounting
/// and the eviction threshold (spec.md §4.6). Exact byte accounting
/// would require tracking the allocator; this mirrors the teacher's
/// `estimate_memory_size` heuristic of summing field-level costs.
pub(super) fn estimate_size(result: &QueryResult) -> u64 {
    let mut size = 64u64;
    for log in &result.logs {
        size += log.message.raw.len() as u64 + 256;
    }
    size += (result.aggregations.len() as u64) * 48;
    size
}

pub(super) struct CacheEntry {
    pub(super) payload: Payload,
    pub(super) level: CacheLevel,
    pub(super) priority: Priority,
    pub(super) tags: Vec<String>,
    pub(super) created_at: Instant,
    pub(super) ttl: Duration,
    pub(super) last_accessed: Instant,
    pub(super) access_count: u64,
}

impl CacheEntry {
    pub(super) fn is_expired(&self) -> bool {
        self.ttl.is_zero() || self.created_at.elapsed() > self.ttl
    }

    pub(super) fn mark_accessed(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }
}
