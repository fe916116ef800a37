//! # Crossing Module
//!
//! Overlap detection and best-cover matching over date ranges.
//!
//! [`DateRangeCrossing`] partitions ranges into an overlap-free subset and a
//! remainder. [`DateRangeMatcher`] uses such a partition as a haystack and
//! finds, for each needle range, the haystack range that covers it best.

use crate::error::Result;
use crate::temporal::{encloses, is_crossed, overlap_days, Interval, Ordinal, Ranged};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Result of splitting ranges into pairwise non-overlapping items and the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split<R> {
    pub disjoint: Vec<R>,
    pub remainder: Vec<R>,
}

impl<R> Split<R> {
    /// Disjoint items followed by the remainder.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.disjoint.iter().chain(self.remainder.iter())
    }

    pub fn len(&self) -> usize {
        self.disjoint.len() + self.remainder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consume `items`: take the first, move every later item crossing it to the
/// remainder, and repeat with what is left.
///
/// The outcome depends on the input order.
pub fn split<R: Ranged>(items: Vec<R>) -> Split<R> {
    let mut pending: VecDeque<R> = items.into();
    let mut disjoint = Vec::new();
    let mut remainder = Vec::new();

    while let Some(head) = pending.pop_front() {
        let mut kept = VecDeque::with_capacity(pending.len());
        for item in pending.drain(..) {
            if is_crossed(head.interval(), item.interval()) {
                remainder.push(item);
            } else {
                kept.push_back(item);
            }
        }
        disjoint.push(head);
        pending = kept;
    }

    Split {
        disjoint,
        remainder,
    }
}

/// A collection of ranges to be partitioned by overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeCrossing<R> {
    items: Vec<R>,
}

impl DateRangeCrossing<Interval> {
    /// Build from ISO date pairs, validating every range.
    pub fn from_pairs(pairs: &[(Option<&str>, Option<&str>)]) -> Result<Self> {
        let items = pairs
            .iter()
            .map(|(begin, end)| Interval::parse(*begin, *end))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(items))
    }
}

impl<R: Ranged + Clone> DateRangeCrossing<R> {
    pub fn new(items: Vec<R>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn into_items(self) -> Vec<R> {
        self.items
    }

    /// Number of other items each item crosses.
    pub fn crossing_counts(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, a)| {
                self.items
                    .iter()
                    .enumerate()
                    .filter(|(j, b)| i != *j && is_crossed(a.interval(), b.interval()))
                    .count()
            })
            .collect()
    }

    /// [`split`] in input order.
    pub fn crossings(&self) -> Split<R> {
        split(self.items.clone())
    }

    /// Split least-crossing items first, then sort both halves naturally.
    ///
    /// A heuristic; the disjoint half is not guaranteed to be maximal.
    pub fn min_crossings(&self) -> Split<R> {
        let counts = self.crossing_counts();
        let mut ordered: Vec<(usize, R)> = counts.into_iter().zip(self.items.iter().cloned()).collect();
        ordered.sort_by_key(|(count, _)| *count);

        let mut result = split(ordered.into_iter().map(|(_, item)| item).collect());
        result.disjoint.sort_by(|a, b| a.interval().cmp(b.interval()));
        result.remainder.sort_by(|a, b| a.interval().cmp(b.interval()));
        result
    }
}

/// How a haystack range relates to a needle range it overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    /// Identical normalized bounds
    Exact,
    /// Haystack covers the needle on both ends
    Include,
    /// Any other overlap
    Partial,
}

/// Overlap in days and classification of `haystack` against `needle`.
///
/// A negative overlap means the ranges do not cross.
pub fn crossing_distance(haystack: &Interval, needle: &Interval) -> (Ordinal, Crossing) {
    let overlap = overlap_days(haystack, needle);
    let crossing = if haystack.lower() == needle.lower() && haystack.upper() == needle.upper() {
        Crossing::Exact
    } else if encloses(haystack, needle) {
        Crossing::Include
    } else {
        Crossing::Partial
    };
    (overlap, crossing)
}

/// A haystack item selected for a needle.
#[derive(Debug, PartialEq, Eq)]
pub struct CrossingMatch<'h, H> {
    pub item: &'h H,
    pub overlap: Ordinal,
    pub crossing: Crossing,
}

impl<H> Clone for CrossingMatch<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for CrossingMatch<'_, H> {}

impl<H> CrossingMatch<'_, H> {
    fn is_cover(&self) -> bool {
        self.crossing != Crossing::Partial
    }
}

/// Best haystack item for `needle`.
///
/// The first exact item wins outright. Otherwise the narrowest including item,
/// then the partial item with the largest overlap; earlier items win ties.
pub fn best_match<'h, H, N>(
    haystack: impl IntoIterator<Item = &'h H>,
    needle: &N,
) -> Option<CrossingMatch<'h, H>>
where
    H: Ranged + 'h,
    N: Ranged,
{
    let needle = needle.interval();
    let mut include: Option<CrossingMatch<'h, H>> = None;
    let mut partial: Option<CrossingMatch<'h, H>> = None;

    for item in haystack {
        let (overlap, crossing) = crossing_distance(item.interval(), needle);
        if overlap < 0 {
            continue;
        }
        let found = CrossingMatch {
            item,
            overlap,
            crossing,
        };
        match crossing {
            Crossing::Exact => return Some(found),
            Crossing::Include => {
                if include.map_or(true, |best| item.interval().width() < best.item.interval().width()) {
                    include = Some(found);
                }
            }
            Crossing::Partial => {
                if partial.map_or(true, |best| overlap > best.overlap) {
                    partial = Some(found);
                }
            }
        }
    }

    include.or(partial)
}

/// Matches needle ranges against a split haystack.
#[derive(Debug, Clone)]
pub struct DateRangeMatcher<H> {
    haystack: Split<H>,
}

impl<H: Ranged + Clone> DateRangeMatcher<H> {
    /// Split `haystack` with [`DateRangeCrossing::min_crossings`].
    pub fn new(haystack: Vec<H>) -> Self {
        Self {
            haystack: DateRangeCrossing::new(haystack).min_crossings(),
        }
    }
}

impl<H: Ranged> DateRangeMatcher<H> {
    pub fn from_split(haystack: Split<H>) -> Self {
        Self { haystack }
    }

    pub fn haystack(&self) -> &Split<H> {
        &self.haystack
    }

    /// Search the whole haystack for every needle.
    #[instrument(skip(self, needles), level = "debug", fields(needles = needles.len()))]
    pub fn match_all<N: Ranged>(&self, needles: &[N]) -> Vec<Option<CrossingMatch<'_, H>>> {
        let matches: Vec<_> = needles
            .iter()
            .map(|needle| best_match(self.haystack.iter(), needle))
            .collect();
        debug!(unmatched = matches.iter().filter(|m| m.is_none()).count(), "matched needles");
        matches
    }

    /// Search the disjoint half first, then the remainder.
    ///
    /// An exact or including item ends the search. When both halves only
    /// offer partial overlaps the larger overlap wins, the disjoint half on ties.
    #[instrument(skip(self, needles), level = "debug", fields(needles = needles.len()))]
    pub fn match_alt<N: Ranged>(&self, needles: &[N]) -> Vec<Option<CrossingMatch<'_, H>>> {
        let matches: Vec<_> = needles
            .iter()
            .map(|needle| {
                let first = best_match(&self.haystack.disjoint, needle);
                if first.is_some_and(|m| m.is_cover()) {
                    return first;
                }
                let second = best_match(&self.haystack.remainder, needle);
                if second.is_some_and(|m| m.is_cover()) {
                    return second;
                }
                match (first, second) {
                    (Some(a), Some(b)) if b.overlap > a.overlap => Some(b),
                    (Some(a), _) => Some(a),
                    (None, b) => b,
                }
            })
            .collect();
        debug!(unmatched = matches.iter().filter(|m| m.is_none()).count(), "matched needles");
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;

    fn iv(begin: &str, end: Option<&str>) -> Interval {
        Interval::parse(Some(begin), end).unwrap()
    }

    #[test]
    fn test_split_in_input_order() {
        let a = iv("2023-01-01", Some("2023-01-10"));
        let b = iv("2023-01-05", Some("2023-01-15"));
        let c = iv("2023-01-12", Some("2023-01-20"));
        let d = iv("2023-01-16", Some("2023-01-18"));
        let result = split(vec![a, b, c, d]);
        assert_eq!(result.disjoint, vec![a, c]);
        assert_eq!(result.remainder, vec![b, d]);
    }

    #[test]
    fn test_min_crossings_prefers_least_crossing() {
        let wide = iv("2023-01-01", Some("2023-01-30"));
        let x = iv("2023-01-01", Some("2023-01-05"));
        let y = iv("2023-01-10", Some("2023-01-15"));
        let z = iv("2023-01-20", Some("2023-01-25"));
        let crossing = DateRangeCrossing::new(vec![wide, z, y, x]);

        assert_eq!(crossing.crossing_counts(), vec![3, 1, 1, 1]);
        let plain = crossing.crossings();
        assert_eq!(plain.disjoint, vec![wide]);

        let min = crossing.min_crossings();
        assert_eq!(min.disjoint, vec![x, y, z]);
        assert_eq!(min.remainder, vec![wide]);
        // The source collection is untouched.
        assert_eq!(crossing.items().len(), 4);
    }

    #[test]
    fn test_from_pairs_rejects_inverted_range() {
        let err = DateRangeCrossing::from_pairs(&[(Some("2023-05-10"), Some("2023-05-05"))]).unwrap_err();
        assert!(matches!(err, ReconcileError::InvertedRange { .. }));
    }

    #[test]
    fn test_open_end_includes_needle() {
        let crossing =
            DateRangeCrossing::from_pairs(&[(Some("2023-05-05"), Some("2023-05-10")), (Some("2023-05-15"), None)])
                .unwrap();
        let needle = iv("2023-05-16", Some("2023-05-20"));
        let found = best_match(crossing.items(), &needle).unwrap();
        assert_eq!(found.crossing, Crossing::Include);
        assert_eq!(*found.item, iv("2023-05-15", None));
    }

    #[test]
    fn test_best_match_priorities() {
        let needle = iv("2023-03-10", Some("2023-03-20"));
        let partial_big = iv("2023-03-12", Some("2023-03-30"));
        let include_wide = iv("2023-01-01", Some("2023-12-31"));
        let include_narrow = iv("2023-03-01", Some("2023-03-31"));
        let exact = needle;

        let covers = [partial_big, include_wide, include_narrow];
        let found = best_match(&covers, &needle).unwrap();
        assert_eq!(*found.item, include_narrow);

        let with_exact = [partial_big, include_wide, exact];
        let found = best_match(&with_exact, &needle).unwrap();
        assert_eq!(found.crossing, Crossing::Exact);

        let partial_small = iv("2023-03-18", Some("2023-04-30"));
        let partials = [partial_small, partial_big];
        let found = best_match(&partials, &needle).unwrap();
        assert_eq!(*found.item, partial_big);
        assert_eq!(found.overlap, 8);

        let far = [iv("2024-01-01", None)];
        assert!(best_match(&far, &needle).is_none());
    }

    #[test]
    fn test_match_alt_stops_at_disjoint_cover() {
        let wide = iv("2023-05-01", Some("2023-05-10"));
        let exact = iv("2023-05-03", Some("2023-05-05"));
        let matcher = DateRangeMatcher::from_split(split(vec![wide, exact]));
        let needles = [exact];

        let all = matcher.match_all(&needles);
        assert_eq!(all[0].unwrap().crossing, Crossing::Exact);

        let alt = matcher.match_alt(&needles);
        assert_eq!(alt[0].unwrap().crossing, Crossing::Include);
        assert_eq!(*alt[0].unwrap().item, wide);
    }

    #[test]
    fn test_match_alt_picks_larger_partial() {
        let small = iv("2023-05-01", Some("2023-05-11"));
        let large = iv("2023-05-09", Some("2023-05-30"));
        let matcher = DateRangeMatcher::from_split(split(vec![small, large]));
        assert_eq!(matcher.haystack().remainder, vec![large]);

        let needle = iv("2023-05-08", Some("2023-05-14"));
        let alt = matcher.match_alt(&[needle]);
        let found = alt[0].unwrap();
        assert_eq!(found.crossing, Crossing::Partial);
        assert_eq!(*found.item, large);
        assert_eq!(found.overlap, 5);
    }

    #[test]
    fn test_payload_items() {
        let periods = vec![
            (iv("2023-01-01", Some("2023-06-30")), "H1"),
            (iv("2023-07-01", None), "H2"),
        ];
        let matcher = DateRangeMatcher::new(periods);
        let needles = [iv("2023-08-01", Some("2023-08-31")), iv("2022-01-01", Some("2022-02-01"))];
        let found = matcher.match_all(&needles);
        assert_eq!(found[0].unwrap().item.1, "H2");
        assert!(found[1].is_none());
    }
}
