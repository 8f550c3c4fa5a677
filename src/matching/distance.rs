//! Genetic distance between two Y-STR profiles.
//!
//! Single-copy markers use the stepwise mutation model: the contribution is
//! the number of repeat steps separating the two readings. Intermediate
//! (fractional) readings are rounded up, so any non-zero difference below one
//! repeat still counts as one step (`9.3` vs `9` and `9.3` vs `10` both
//! contribute 1).
//!
//! Multi-copy markers pair the copies of the shorter reading with copies of
//! the longer one at minimum total cost, charge 1 for every unpaired copy of
//! the longer reading, and cap the marker's contribution at
//! [`MULTI_COPY_CAP`].

use std::cmp::Ordering;

use crate::core::marker::{MarkerSet, MarkerValue};

/// Maximum contribution of one multi-copy marker
pub const MULTI_COPY_CAP: u32 = 2;

/// Penalty for each copy present on one side only
pub const UNPAIRED_COPY_PENALTY: u32 = 1;

/// Largest contribution of one single-copy marker; readings further apart
/// than this are already far outside any useful match distance
pub const MAX_MARKER_STEPS: u32 = 1_000;

/// Absorbs floating-point noise in decimal readings (`9.3 - 9.2`)
const STEP_EPSILON: f64 = 1e-9;

/// Distance between two marker vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneticDistance {
    /// Sum of per-marker contributions
    pub distance: u32,

    /// Markers present in both vectors
    pub compared_markers: u32,
}

impl GeneticDistance {
    /// Compare two parsed marker sets.
    ///
    /// Only markers present in both sets are compared; markers missing on
    /// either side neither add distance nor count as compared. The function is
    /// pure, total over parsed input, and symmetric in its arguments.
    #[must_use]
    pub fn calculate(query: &MarkerSet, candidate: &MarkerSet) -> Self {
        let mut result = Self::default();

        // Both sets iterate in marker-name order, so a merge join visits each
        // shared marker exactly once.
        let mut left = query.iter().peekable();
        let mut right = candidate.iter().peekable();

        while let (Some((a_name, a_value)), Some((b_name, b_value))) = (left.peek(), right.peek())
        {
            match a_name.cmp(b_name) {
                Ordering::Less => {
                    left.next();
                }
                Ordering::Greater => {
                    right.next();
                }
                Ordering::Equal => {
                    result.distance = result
                        .distance
                        .saturating_add(marker_distance(a_value, b_value));
                    result.compared_markers += 1;
                    left.next();
                    right.next();
                }
            }
        }

        result
    }

    /// Markers that compared equal, saturating at zero when multi-step
    /// differences push the distance past the compared count
    pub fn identical_markers(&self) -> u32 {
        self.compared_markers.saturating_sub(self.distance)
    }

    /// Percentage of identical markers, rounded to one decimal; 0 when
    /// nothing was compared
    pub fn percent_identical(&self) -> f64 {
        if self.compared_markers == 0 {
            return 0.0;
        }
        let pct = f64::from(self.identical_markers()) / f64::from(self.compared_markers) * 100.0;
        (pct * 10.0).round() / 10.0
    }
}

/// Contribution of one shared marker
#[must_use]
pub fn marker_distance(a: &MarkerValue, b: &MarkerValue) -> u32 {
    match (a, b) {
        (MarkerValue::Single(x), MarkerValue::Single(y)) => step_difference(*x, *y),
        _ => multi_copy_difference(a.copies(), b.copies()),
    }
}

/// Whole repeat steps between two readings, rounding fractional
/// differences up and capping at [`MAX_MARKER_STEPS`]
#[must_use]
pub fn step_difference(a: f64, b: f64) -> u32 {
    let diff = (a - b).abs() - STEP_EPSILON;
    if diff <= 0.0 {
        return 0;
    }
    let steps = diff.ceil().min(f64::from(MAX_MARKER_STEPS));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // in 1..=MAX_MARKER_STEPS
    {
        steps as u32
    }
}

/// Capped distance between two multi-copy readings.
///
/// Copies are sorted, so an order-preserving pairing is optimal; the pairing
/// is found by dynamic programming over (copies of the shorter reading,
/// copies of the longer reading).
#[must_use]
pub fn multi_copy_difference(a: &[f64], b: &[f64]) -> u32 {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let n = short.len();
    let m = long.len();

    // best[i][j]: cheapest pairing of short[..i] into long[..j]
    let mut best = vec![vec![u32::MAX; m + 1]; n + 1];
    for cell in &mut best[0] {
        *cell = 0;
    }
    for i in 1..=n {
        for j in i..=m {
            let skip = if j > i { best[i][j - 1] } else { u32::MAX };
            let pair = best[i - 1][j - 1].saturating_add(step_difference(short[i - 1], long[j - 1]));
            best[i][j] = skip.min(pair);
        }
    }

    #[allow(clippy::cast_possible_truncation)] // copy counts are tiny
    let unpaired = (m - n) as u32 * UNPAIRED_COPY_PENALTY;

    best[n][m].saturating_add(unpaired).min(MULTI_COPY_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MarkerMap;

    fn set(pairs: &[(&str, &str)]) -> MarkerSet {
        let map: MarkerMap = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        MarkerSet::from_map(&map)
    }

    #[test]
    fn test_identical_profiles() {
        let a = set(&[("DYS393", "13"), ("DYS19", "14"), ("DYS391", "11")]);
        let gd = GeneticDistance::calculate(&a, &a);
        assert_eq!(gd.distance, 0);
        assert_eq!(gd.compared_markers, 3);
        assert!((gd.percent_identical() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_markers_are_skipped() {
        let a = set(&[("DYS393", "13"), ("DYS19", "14")]);
        let b = set(&[("DYS393", "13"), ("DYS391", "10")]);
        let gd = GeneticDistance::calculate(&a, &b);
        assert_eq!(gd.distance, 0);
        assert_eq!(gd.compared_markers, 1);
    }

    #[test]
    fn test_stepwise_difference() {
        let a = set(&[("DYS393", "13"), ("DYS19", "14")]);
        let b = set(&[("DYS393", "15"), ("DYS19", "13")]);
        assert_eq!(GeneticDistance::calculate(&a, &b).distance, 3);
    }

    #[test]
    fn test_intermediate_values_round_up() {
        assert_eq!(step_difference(9.3, 9.0), 1);
        assert_eq!(step_difference(9.3, 10.0), 1);
        assert_eq!(step_difference(9.3, 9.3), 0);
        assert_eq!(step_difference(9.2, 9.3), 1);
        assert_eq!(step_difference(9.5, 11.0), 2);
    }

    #[test]
    fn test_reference_scenario() {
        // DYS393 differs by one step; DYS390 pairs 24 with 24 and leaves 25
        // unpaired for one more.
        let query = set(&[("DYS393", "13"), ("DYS390", "24-25")]);
        let candidate = set(&[("DYS393", "14"), ("DYS390", "24")]);
        let gd = GeneticDistance::calculate(&query, &candidate);
        assert_eq!(gd.compared_markers, 2);
        assert_eq!(multi_copy_difference(&[24.0, 25.0], &[24.0]), 1);
        assert_eq!(gd.distance, 2);
    }

    #[test]
    fn test_multi_copy_cap() {
        assert_eq!(
            multi_copy_difference(&[11.0, 14.0], &[15.0, 19.0]),
            MULTI_COPY_CAP
        );
        assert_eq!(
            multi_copy_difference(&[15.0, 15.0, 16.0, 17.0], &[12.0]),
            MULTI_COPY_CAP
        );
        let a = set(&[("DYS464", "15-15-16-17")]);
        let b = set(&[("DYS464", "11-12-13-14")]);
        assert_eq!(GeneticDistance::calculate(&a, &b).distance, MULTI_COPY_CAP);
    }

    #[test]
    fn test_multi_copy_prefers_cheapest_pairing() {
        // Greedy left-to-right would pair 12 with 13; the optimum pairs 13 with 13
        assert_eq!(multi_copy_difference(&[13.0], &[12.0, 13.0]), 1);
        assert_eq!(multi_copy_difference(&[11.0, 14.0], &[11.0, 14.0]), 0);
        assert_eq!(multi_copy_difference(&[11.0, 14.0], &[11.0, 15.0]), 1);
    }

    #[test]
    fn test_known_multi_copy_single_reading_is_capped() {
        let a = set(&[("DYS385", "11")]);
        let b = set(&[("DYS385", "16")]);
        assert_eq!(GeneticDistance::calculate(&a, &b).distance, MULTI_COPY_CAP);
    }

    #[test]
    fn test_symmetry() {
        let a = set(&[
            ("DYS393", "13"),
            ("DYS390", "24-25"),
            ("DYS464", "15-16"),
            ("DYS389i", "9.3"),
        ]);
        let b = set(&[
            ("DYS393", "12"),
            ("DYS390", "23"),
            ("DYS464", "14-15-16-17"),
            ("DYS389i", "10"),
        ]);
        assert_eq!(
            GeneticDistance::calculate(&a, &b),
            GeneticDistance::calculate(&b, &a)
        );
    }

    #[test]
    fn test_percent_identical_saturates() {
        let gd = GeneticDistance {
            distance: 5,
            compared_markers: 3,
        };
        assert_eq!(gd.identical_markers(), 0);
        assert!(gd.percent_identical().abs() < f64::EPSILON);

        let gd = GeneticDistance {
            distance: 1,
            compared_markers: 3,
        };
        assert!((gd.percent_identical() - 66.7).abs() < 1e-9);
    }

    #[test]
    fn test_huge_readings_do_not_wrap() {
        assert_eq!(step_difference(4_294_967_296.0, 1.0), MAX_MARKER_STEPS);

        let a = set(&[("DYS393", "4294967296"), ("DYS19", "15")]);
        let b = set(&[("DYS393", "1"), ("DYS19", "14")]);
        let gd = GeneticDistance::calculate(&a, &b);
        assert_eq!(gd.compared_markers, 2);
        assert_eq!(gd.distance, MAX_MARKER_STEPS + 1);
        assert_eq!(gd.identical_markers(), 0);

        let a = set(&[("DYS464", "99999999999-15"), ("DYS393", "99999999999")]);
        let b = set(&[("DYS464", "1-15"), ("DYS393", "2")]);
        assert_eq!(GeneticDistance::calculate(&a, &b).distance, MULTI_COPY_CAP + MAX_MARKER_STEPS);
    }

    #[test]
    fn test_nothing_compared() {
        let a = set(&[("DYS393", "13")]);
        let b = set(&[("DYS19", "14")]);
        let gd = GeneticDistance::calculate(&a, &b);
        assert_eq!(gd, GeneticDistance::default());
        assert!(gd.percent_identical().abs() < f64::EPSILON);
    }
}
