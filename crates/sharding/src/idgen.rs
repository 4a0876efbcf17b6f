//! Identifier layout
//!
//! Ids are positive `i64` values that embed the shard which owns the row:
//!
//! ```text
//! [unused:1][time:63-shard_bits-12][shard:shard_bits][seq:12]
//! ```
//!
//! Time is counted in milliseconds since a configurable epoch. With the
//! default 11 shard bits the time field is 40 bits wide, which covers about
//! 34 years past the epoch.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::IdGenConfig;

/// Default epoch: 2010-01-01T00:00:00Z in unix milliseconds
pub const DEFAULT_EPOCH_MS: i64 = 1_262_304_000_000;

/// Default width of the shard field (2048 shards)
pub const DEFAULT_SHARD_BITS: u32 = 11;

/// Width of the per-millisecond sequence field
pub const SEQ_BITS: u32 = 12;

/// Largest supported shard field width
pub const MAX_SHARD_BITS: u32 = 16;

/// Identifier errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("Invalid id: {0}")]
    InvalidId(i64),
    #[error("Time {time_ms}ms is before epoch {epoch_ms}ms")]
    TimeBeforeEpoch { time_ms: i64, epoch_ms: i64 },
    #[error("Time overflows {bits}-bit time field: {elapsed_ms}ms since epoch")]
    TimeOverflow { elapsed_ms: i64, bits: u32 },
    #[error("Shard {shard} out of range [0, {num_shards})")]
    ShardOutOfRange { shard: i64, num_shards: usize },
    #[error("Sequence {seq} out of range [0, {max}]")]
    SequenceOverflow { seq: i64, max: i64 },
    #[error("Shard bits must be in 1..={max}, got {bits}")]
    InvalidShardBits { bits: u32, max: u32 },
    #[error("Epoch {0}ms is not a representable time")]
    InvalidEpoch(i64),
}

/// Components of a decoded id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitId {
    /// Millisecond the id was minted in
    pub time: DateTime<Utc>,
    /// Shard number
    pub shard: i64,
    /// Sequence within the millisecond
    pub seq: i64,
}

/// Id layout and epoch
///
/// `IdGen` is a plain value; clusters carry their own copy. Two deployments
/// that must never hand out overlapping ids use different epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdGen {
    shard_bits: u32,
    epoch_ms: i64,
}

impl IdGen {
    /// Default layout: 11 shard bits, epoch 2010-01-01T00:00:00Z
    pub const DEFAULT: IdGen = IdGen {
        shard_bits: DEFAULT_SHARD_BITS,
        epoch_ms: DEFAULT_EPOCH_MS,
    };

    /// Create a layout with `shard_bits` shard bits and a custom epoch
    pub fn new(shard_bits: u32, epoch: DateTime<Utc>) -> Result<Self, IdError> {
        if shard_bits == 0 || shard_bits > MAX_SHARD_BITS {
            return Err(IdError::InvalidShardBits {
                bits: shard_bits,
                max: MAX_SHARD_BITS,
            });
        }
        Ok(Self {
            shard_bits,
            epoch_ms: epoch.timestamp_millis(),
        })
    }

    /// Create from configuration
    pub fn from_config(config: &IdGenConfig) -> Result<Self, IdError> {
        let epoch = DateTime::from_timestamp_millis(config.epoch_ms)
            .ok_or(IdError::InvalidEpoch(config.epoch_ms))?;
        Self::new(config.shard_bits, epoch)
    }

    /// Maximum number of shards the shard field can address
    pub fn num_shards(&self) -> usize {
        1usize << self.shard_bits
    }

    /// Largest sequence number within one millisecond
    pub fn max_seq(&self) -> i64 {
        (1i64 << SEQ_BITS) - 1
    }

    pub fn shard_bits(&self) -> u32 {
        self.shard_bits
    }

    pub fn time_bits(&self) -> u32 {
        63 - self.shard_bits - SEQ_BITS
    }

    pub fn epoch_ms(&self) -> i64 {
        self.epoch_ms
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        // Checked at construction for every non-const instance
        DateTime::from_timestamp_millis(self.epoch_ms).unwrap_or_default()
    }

    fn time_shift(&self) -> u32 {
        self.shard_bits + SEQ_BITS
    }

    fn max_elapsed(&self) -> i64 {
        (1i64 << self.time_bits()) - 1
    }

    fn elapsed_ms(&self, tm: DateTime<Utc>) -> Result<i64, IdError> {
        let time_ms = tm.timestamp_millis();
        let elapsed = time_ms
            .checked_sub(self.epoch_ms)
            .filter(|e| *e >= 0)
            .ok_or(IdError::TimeBeforeEpoch {
                time_ms,
                epoch_ms: self.epoch_ms,
            })?;
        if elapsed > self.max_elapsed() {
            return Err(IdError::TimeOverflow {
                elapsed_ms: elapsed,
                bits: self.time_bits(),
            });
        }
        Ok(elapsed)
    }

    /// Mint the id for `(tm, shard, seq)`
    ///
    /// Sub-millisecond precision of `tm` is dropped. A sequence that does not
    /// fit the sequence field is an error; callers that run out of sequence
    /// numbers within a millisecond must wait for the next one.
    pub fn next_id(&self, tm: DateTime<Utc>, shard: i64, seq: i64) -> Result<i64, IdError> {
        let elapsed = self.elapsed_ms(tm)?;
        if shard < 0 || shard >= self.num_shards() as i64 {
            return Err(IdError::ShardOutOfRange {
                shard,
                num_shards: self.num_shards(),
            });
        }
        if seq < 0 || seq > self.max_seq() {
            return Err(IdError::SequenceOverflow {
                seq,
                max: self.max_seq(),
            });
        }

        let id = (elapsed << self.time_shift()) | (shard << SEQ_BITS) | seq;
        if id == 0 {
            return Err(IdError::InvalidId(id));
        }
        Ok(id)
    }

    /// Smallest id any shard can mint within the millisecond `tm`
    pub fn min_id(&self, tm: DateTime<Utc>) -> Result<i64, IdError> {
        Ok(self.elapsed_ms(tm)? << self.time_shift())
    }

    /// Largest id any shard can mint within the millisecond `tm`
    pub fn max_id(&self, tm: DateTime<Utc>) -> Result<i64, IdError> {
        let low = (1i64 << self.time_shift()) - 1;
        Ok((self.elapsed_ms(tm)? << self.time_shift()) | low)
    }

    /// Decode an id into its time, shard and sequence components
    ///
    /// Zero and negative values are never produced by [`IdGen::next_id`] and
    /// are rejected rather than decoded to shard 0.
    pub fn split_id(&self, id: i64) -> Result<SplitId, IdError> {
        if id <= 0 {
            return Err(IdError::InvalidId(id));
        }

        let elapsed = id >> self.time_shift();
        let shard = (id >> SEQ_BITS) & (self.num_shards() as i64 - 1);
        let seq = id & self.max_seq();

        let time = self
            .epoch_ms
            .checked_add(elapsed)
            .and_then(DateTime::from_timestamp_millis)
            .ok_or(IdError::InvalidId(id))?;

        Ok(SplitId { time, shard, seq })
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_default_layout() {
        let id_gen = IdGen::default();
        assert_eq!(id_gen.num_shards(), 2048);
        assert_eq!(id_gen.max_seq(), 4095);
        assert_eq!(id_gen.time_bits(), 40);
        assert_eq!(id_gen.epoch(), at(2010, 1, 1));
    }

    #[test]
    fn test_next_id_split_id_roundtrip() {
        let id_gen = IdGen::default();
        let tm = at(2024, 6, 1) + Duration::milliseconds(1234);

        for (shard, seq) in [(0, 1), (1, 0), (2047, 4095), (1000, 17)] {
            let id = id_gen.next_id(tm, shard, seq).unwrap();
            assert!(id > 0);
            let split = id_gen.split_id(id).unwrap();
            assert_eq!(split, SplitId { time: tm, shard, seq });
        }
    }

    #[test]
    fn test_ids_sort_by_time() {
        let id_gen = IdGen::default();
        let tm = at(2020, 1, 1);
        let earlier = id_gen.next_id(tm, 2047, 4095).unwrap();
        let later = id_gen.next_id(tm + Duration::milliseconds(1), 0, 0).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_split_id_rejects_non_positive() {
        let id_gen = IdGen::default();
        assert_eq!(id_gen.split_id(0), Err(IdError::InvalidId(0)));
        assert_eq!(id_gen.split_id(-5), Err(IdError::InvalidId(-5)));
    }

    #[test]
    fn test_next_id_field_limits() {
        let id_gen = IdGen::default();
        let tm = at(2020, 1, 1);

        assert!(matches!(
            id_gen.next_id(tm, 2048, 0),
            Err(IdError::ShardOutOfRange { shard: 2048, num_shards: 2048 })
        ));
        assert!(matches!(id_gen.next_id(tm, -1, 0), Err(IdError::ShardOutOfRange { .. })));
        assert!(matches!(
            id_gen.next_id(tm, 0, 4096),
            Err(IdError::SequenceOverflow { seq: 4096, max: 4095 })
        ));
        assert!(matches!(
            id_gen.next_id(at(2009, 12, 31), 0, 0),
            Err(IdError::TimeBeforeEpoch { .. })
        ));
        assert!(matches!(
            id_gen.next_id(at(2060, 1, 1), 0, 0),
            Err(IdError::TimeOverflow { bits: 40, .. })
        ));
        // The one triple that would encode to zero
        assert_eq!(id_gen.next_id(id_gen.epoch(), 0, 0), Err(IdError::InvalidId(0)));
    }

    #[test]
    fn test_min_max_id_bound_a_millisecond() {
        let id_gen = IdGen::default();
        let tm = at(2022, 3, 4);
        let min = id_gen.min_id(tm).unwrap();
        let max = id_gen.max_id(tm).unwrap();

        assert!(min <= id_gen.next_id(tm, 0, 1).unwrap());
        assert!(max >= id_gen.next_id(tm, 2047, 4095).unwrap());
        assert_eq!(max + 1, id_gen.min_id(tm + Duration::milliseconds(1)).unwrap());
    }

    #[test]
    fn test_custom_layout() {
        let id_gen = IdGen::new(4, at(2020, 1, 1)).unwrap();
        assert_eq!(id_gen.num_shards(), 16);
        assert_eq!(id_gen.time_bits(), 47);

        let id = id_gen.next_id(at(2021, 1, 1), 15, 9).unwrap();
        let split = id_gen.split_id(id).unwrap();
        assert_eq!(split.shard, 15);
        assert_eq!(split.seq, 9);

        // Same id means something else under the default layout
        assert_ne!(IdGen::default().split_id(id).unwrap().time, split.time);
    }

    #[test]
    fn test_invalid_shard_bits() {
        assert!(matches!(
            IdGen::new(0, at(2020, 1, 1)),
            Err(IdError::InvalidShardBits { bits: 0, .. })
        ));
        assert!(IdGen::new(MAX_SHARD_BITS + 1, at(2020, 1, 1)).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = IdGenConfig {
            shard_bits: 8,
            epoch_ms: at(2015, 1, 1).timestamp_millis(),
        };
        let id_gen = IdGen::from_config(&config).unwrap();
        assert_eq!(id_gen.num_shards(), 256);
        assert_eq!(id_gen.epoch(), at(2015, 1, 1));

        let bad = IdGenConfig {
            shard_bits: 8,
            epoch_ms: i64::MAX,
        };
        assert_eq!(IdGen::from_config(&bad), Err(IdError::InvalidEpoch(i64::MAX)));
    }
}
