//! Hash-key partitioning of the 128-bit key space.
//!
//! Partition keys are hashed with MD5 and the digest is read as a big-endian
//! unsigned integer. Every open shard owns one contiguous [`KeyRange`]; the
//! open ranges of a stream always tile `0..=u128::MAX` exactly.

use kinesim_types::HashKeyRange;
use md5::{Digest, Md5};

/// Largest position in the hash-key space (2^128 - 1).
pub const MAX_HASH_KEY: u128 = u128::MAX;

/// Inclusive range of hash keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyRange {
    pub start: u128,
    pub end: u128,
}

impl KeyRange {
    /// The whole key space.
    pub const FULL: KeyRange = KeyRange {
        start: 0,
        end: MAX_HASH_KEY,
    };

    pub fn new(start: u128, end: u128) -> Self {
        debug_assert!(start <= end, "inverted key range {}..={}", start, end);
        Self { start, end }
    }

    pub fn contains(&self, key: u128) -> bool {
        self.start <= key && key <= self.end
    }

    /// True when the two ranges touch with no gap, in either order.
    pub fn is_adjacent_to(&self, other: &KeyRange) -> bool {
        self.end.checked_add(1) == Some(other.start) || other.end.checked_add(1) == Some(self.start)
    }

    /// Smallest range covering both inputs. Only meaningful for adjacent ranges.
    pub fn union(&self, other: &KeyRange) -> KeyRange {
        KeyRange::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Split into `[start, key - 1]` and `[key, end]`.
    ///
    /// Returns `None` unless `start < key <= end`, so both halves are non-empty.
    pub fn split_at(&self, key: u128) -> Option<(KeyRange, KeyRange)> {
        if key <= self.start || key > self.end {
            return None;
        }
        Some((
            KeyRange::new(self.start, key - 1),
            KeyRange::new(key, self.end),
        ))
    }
}

impl From<KeyRange> for HashKeyRange {
    fn from(range: KeyRange) -> Self {
        HashKeyRange {
            starting_hash_key: range.start,
            ending_hash_key: range.end,
        }
    }
}

/// Position of a partition key in the hash-key space.
pub fn hash_partition_key(partition_key: &str) -> u128 {
    let digest: [u8; 16] = Md5::digest(partition_key.as_bytes()).into();
    u128::from_be_bytes(digest)
}

/// Parse a decimal hash key, rejecting signs, whitespace and values above 2^128 - 1.
pub fn parse_hash_key(value: &str) -> Option<u128> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Divide the key space into `count` contiguous blocks of `floor(2^128 / count)`
/// keys each; the last block absorbs the remainder.
pub fn even_ranges(count: u32) -> Vec<KeyRange> {
    match count {
        0 => Vec::new(),
        1 => vec![KeyRange::FULL],
        n => {
            let n = n as u128;
            // floor(2^128 / n) computed without overflowing 2^128
            let mut step = MAX_HASH_KEY / n;
            if MAX_HASH_KEY % n == n - 1 {
                step += 1;
            }

            (0..n)
                .map(|i| {
                    let start = i * step;
                    let end = if i == n - 1 {
                        MAX_HASH_KEY
                    } else {
                        (i + 1) * step - 1
                    };
                    KeyRange::new(start, end)
                })
                .collect()
        }
    }
}

/// Check that `ranges` tile the full key space with no gap and no overlap.
pub fn covers_key_space(ranges: &[KeyRange]) -> bool {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    let mut expected_start = Some(0u128);
    for range in &sorted {
        if expected_start != Some(range.start) {
            return false;
        }
        expected_start = range.end.checked_add(1);
    }

    // Reaching MAX_HASH_KEY leaves no next start.
    !sorted.is_empty() && expected_start.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_partition_key_is_md5() {
        // md5("a") = 0cc175b9c0f1b6a831c399e269772661
        assert_eq!(
            hash_partition_key("a"),
            0x0cc175b9c0f1b6a831c399e269772661
        );
    }

    #[test]
    fn test_even_ranges_two_shards() {
        let ranges = even_ranges(2);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], KeyRange::new(0, (1u128 << 127) - 1));
        assert_eq!(ranges[1], KeyRange::new(1u128 << 127, MAX_HASH_KEY));
        assert!(covers_key_space(&ranges));
    }

    #[test]
    fn test_even_ranges_three_shards() {
        let ranges = even_ranges(3);
        assert_eq!(
            ranges[0].end,
            113427455640312821154458202477256070484
        );
        assert_eq!(
            ranges[1].start,
            113427455640312821154458202477256070485
        );
        assert_eq!(ranges[2].end, MAX_HASH_KEY);
        assert!(covers_key_space(&ranges));
    }

    #[test]
    fn test_even_ranges_cover_key_space() {
        for count in [1, 4, 5, 7, 10, 64, 100] {
            let ranges = even_ranges(count);
            assert_eq!(ranges.len(), count as usize);
            assert!(covers_key_space(&ranges), "count {}", count);
        }
        assert!(even_ranges(0).is_empty());
    }

    #[test]
    fn test_covers_key_space_detects_gaps_and_overlaps() {
        let gap = [KeyRange::new(0, 10), KeyRange::new(12, MAX_HASH_KEY)];
        assert!(!covers_key_space(&gap));

        let overlap = [KeyRange::new(0, 10), KeyRange::new(10, MAX_HASH_KEY)];
        assert!(!covers_key_space(&overlap));

        let short = [KeyRange::new(0, 10)];
        assert!(!covers_key_space(&short));

        assert!(!covers_key_space(&[]));
    }

    #[test]
    fn test_split_and_union_round_trip() {
        let mid = 1u128 << 127;
        let (left, right) = KeyRange::FULL.split_at(mid).unwrap();
        assert_eq!(left, KeyRange::new(0, mid - 1));
        assert_eq!(right, KeyRange::new(mid, MAX_HASH_KEY));
        assert!(left.is_adjacent_to(&right));
        assert!(right.is_adjacent_to(&left));
        assert_eq!(right.union(&left), KeyRange::FULL);
    }

    #[test]
    fn test_split_bounds() {
        let range = KeyRange::new(10, 20);
        assert!(range.split_at(10).is_none());
        assert!(range.split_at(21).is_none());
        assert_eq!(
            range.split_at(20),
            Some((KeyRange::new(10, 19), KeyRange::new(20, 20)))
        );
        assert_eq!(
            range.split_at(11),
            Some((KeyRange::new(10, 10), KeyRange::new(11, 20)))
        );
    }

    #[test]
    fn test_parse_hash_key() {
        assert_eq!(parse_hash_key("0"), Some(0));
        assert_eq!(
            parse_hash_key("340282366920938463463374607431768211455"),
            Some(MAX_HASH_KEY)
        );
        assert_eq!(parse_hash_key("340282366920938463463374607431768211456"), None);
        assert_eq!(parse_hash_key("+1"), None);
        assert_eq!(parse_hash_key(""), None);
        assert_eq!(parse_hash_key("12a"), None);
    }
}
