//! # Similarity Module
//!
//! Sequence-alignment similarity ratios, canonical value serialization and
//! content hashing of record field subsets.

use crate::model::{FieldKey, KeySet, Record, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

/// Sequences at least this long get the popular-element heuristic.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Similarity ratio of two serialized values in `[0, 1]`.
///
/// The ratio is `2·M / T` where `M` is the total size of the matching blocks
/// found by recursive longest-common-substring alignment and `T` the combined
/// length. Whitespace is junk: it never anchors a match but may extend one.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    SequenceMatcher::new(&a, &b).ratio()
}

/// Stable string encoding of a value for comparison.
///
/// Non-string scalars are rendered to their display text first, so `2` and
/// `"2"` serialize identically.
pub fn canonical_repr(value: &Value) -> String {
    canonical_json(value).to_string()
}

fn canonical_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Record(record) => serde_json::Value::Object(
            record
                .iter()
                .map(|(k, v)| (key_text(k), canonical_json(v)))
                .collect(),
        ),
        Value::List(items) => serde_json::Value::Array(items.iter().map(canonical_json).collect()),
        scalar => serde_json::Value::String(scalar.display_text()),
    }
}

fn key_text(key: &FieldKey) -> String {
    match key {
        FieldKey::Str(s) => s.clone(),
        other => other.tagged(),
    }
}

/// Lowercase `"<type>:<value>"` tag of a non-string value.
fn tagged_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Str(s) => serde_json::Value::String(s.clone()),
        other => serde_json::Value::String(
            format!("{}:{}", other.type_tag(), other.display_text()).to_lowercase(),
        ),
    }
}

/// Hash of `record` restricted to `keys`, iterated in `keys` order.
///
/// Keys and non-string values are type-tagged so that `"2"` and `2` differ.
/// The result depends on the order of `keys`, not only on its members.
/// Fields missing from `record` hash as null.
pub fn content_hash(record: &Record, keys: &KeySet) -> u64 {
    let pairs: Vec<serde_json::Value> = keys
        .iter()
        .map(|key| {
            let value = record.get(key).unwrap_or(&Value::Null);
            serde_json::Value::Array(vec![
                serde_json::Value::String(key.tagged()),
                tagged_value(value),
            ])
        })
        .collect();
    let serialized = serde_json::Value::Array(pairs).to_string();

    let digest = Sha256::digest(serialized.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Ratcliff/Obershelp matcher over two char sequences with whitespace junk.
struct SequenceMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of each non-junk, non-popular element of `b`.
    b2j: FxHashMap<char, Vec<usize>>,
    /// Junk elements present in `b`.
    bjunk: FxHashSet<char>,
}

impl<'a> SequenceMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: FxHashMap<char, Vec<usize>> = FxHashMap::default();
        for (j, &ch) in b.iter().enumerate() {
            b2j.entry(ch).or_default().push(j);
        }

        let mut bjunk = FxHashSet::default();
        b2j.retain(|ch, _| {
            if ch.is_whitespace() {
                bjunk.insert(*ch);
                false
            } else {
                true
            }
        });

        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let ntest = n / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= ntest);
        }

        Self { a, b, b2j, bjunk }
    }

    fn is_bjunk(&self, ch: char) -> bool {
        self.bjunk.contains(&ch)
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (a, b) = (self.a, self.b);
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0usize);

        let mut j2len: FxHashMap<usize, usize> = FxHashMap::default();
        for (i, ch) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut newj2len: FxHashMap<usize, usize> = FxHashMap::default();
            if let Some(positions) = self.b2j.get(ch) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let prev = j
                        .checked_sub(1)
                        .and_then(|p| j2len.get(&p).copied())
                        .unwrap_or(0);
                    let k = prev + 1;
                    newj2len.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = newj2len;
        }

        // Grow the block with equal non-junk neighbours first, then with junk.
        for junk in [false, true] {
            while besti > alo
                && bestj > blo
                && self.is_bjunk(b[bestj - 1]) == junk
                && a[besti - 1] == b[bestj - 1]
            {
                besti -= 1;
                bestj -= 1;
                bestsize += 1;
            }
            while besti + bestsize < ahi
                && bestj + bestsize < bhi
                && self.is_bjunk(b[bestj + bestsize]) == junk
                && a[besti + bestsize] == b[bestj + bestsize]
            {
                bestsize += 1;
            }
        }

        (besti, bestj, bestsize)
    }

    /// Total size of all matching blocks.
    fn matched_len(&self) -> usize {
        let mut total = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        total
    }

    fn ratio(&self) -> f64 {
        let length = self.a.len() + self.b.len();
        if length == 0 {
            return 1.0;
        }
        2.0 * self.matched_len() as f64 / length as f64
    }
}
