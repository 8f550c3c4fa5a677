use std::collections::BTreeMap;

use crate::core::marker::MarkerMap;
use crate::core::types::count_to_f64;
use crate::matching::engine::Match;

/// Upper frequency bound (inclusive) of each rarity code, rarest first
pub const RARITY_THRESHOLDS: [(f64, u8); 4] = [(0.04, 4), (0.08, 3), (0.15, 2), (0.25, 1)];

/// Map a value frequency to a rarity code: 4 (extremely rare) to 0 (common)
///
/// # Examples
///
/// ```
/// use ystr_matcher::report::rarity::rarity_code;
///
/// assert_eq!(rarity_code(0.04), 4);
/// assert_eq!(rarity_code(0.0401), 3);
/// assert_eq!(rarity_code(0.25), 1);
/// assert_eq!(rarity_code(0.26), 0);
/// ```
#[must_use]
pub fn rarity_code(frequency: f64) -> u8 {
    RARITY_THRESHOLDS
        .iter()
        .find(|(bound, _)| frequency <= *bound)
        .map_or(0, |(_, code)| *code)
}

/// Share of `context` carrying exactly `value` at `marker`; 0 for an empty
/// context
#[must_use]
pub fn value_frequency(marker: &str, value: &str, context: &[Match]) -> f64 {
    if context.is_empty() {
        return 0.0;
    }
    let same = context
        .iter()
        .filter(|m| m.markers.get(marker).is_some_and(|v| v.trim() == value))
        .count();
    count_to_f64(same) / count_to_f64(context.len())
}

/// Rarity code of every listed marker the query has a value for.
///
/// With an empty context every frequency is 0, so every code is 0
/// ("common") rather than "extremely rare".
pub fn rarity_scores(markers: &[String], query: &MarkerMap, context: &[Match]) -> BTreeMap<String, u8> {
    markers
        .iter()
        .filter_map(|marker| {
            let value = query.get(marker)?.trim();
            if value.is_empty() {
                return None;
            }
            let code = if context.is_empty() {
                0
            } else {
                rarity_code(value_frequency(marker, value, context))
            };
            Some((marker.clone(), code))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::KitId;

    fn hit(kit: &str, dys393: &str) -> Match {
        Match {
            kit_number: KitId::from(kit),
            name: String::new(),
            country: String::new(),
            haplogroup: String::new(),
            markers: MarkerMap::from([("DYS393".to_string(), dys393.to_string())]),
            distance: 0,
            compared_markers: 1,
            identical_markers: 1,
            percent_identical: 100.0,
        }
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(rarity_code(0.0), 4);
        assert_eq!(rarity_code(0.04), 4);
        assert_eq!(rarity_code(0.08), 3);
        assert_eq!(rarity_code(0.15), 2);
        assert_eq!(rarity_code(0.25), 1);
        assert_eq!(rarity_code(0.250_001), 0);
        assert_eq!(rarity_code(1.0), 0);
    }

    #[test]
    fn test_frequency() {
        let context: Vec<Match> = (0..20)
            .map(|i| hit(&format!("K{i}"), if i < 3 { "13" } else { "14" }))
            .collect();
        assert!((value_frequency("DYS393", "13", &context) - 0.15).abs() < 1e-12);
        assert!(value_frequency("DYS390", "24", &context).abs() < f64::EPSILON);

        let query = MarkerMap::from([("DYS393".to_string(), "13".to_string())]);
        let scores = rarity_scores(&["DYS393".to_string()], &query, &context);
        assert_eq!(scores["DYS393"], 2);
    }

    #[test]
    fn test_empty_context_is_common() {
        let query = MarkerMap::from([("DYS393".to_string(), "13".to_string())]);
        let scores = rarity_scores(&["DYS393".to_string(), "DYS390".to_string()], &query, &[]);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["DYS393"], 0);
    }
}
