#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Keyword search over free-text queries.
//!
//! Turns a query such as `"Brooklyn 2022 pedestrian crashes"` into a
//! [`FilterSpec`] holding only the dimensions the query mentions. Matching
//! is case-insensitive substring search; within each dimension the first
//! rule that matches wins.

use std::sync::LazyLock;

use crash_map_collision_models::FilterSpec;
use regex::Regex;

/// A four-digit year in the 2000s, as a whole word.
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").expect("valid regex"));

/// Borough names in match priority order.
const BOROUGHS: &[&str] = &["bronx", "brooklyn", "manhattan", "queens", "staten island"];

/// Person type keywords, checked in order.
const PERSON_TYPES: &[(&[&str], &str)] = &[
    (&["pedestrian"], "Pedestrian"),
    (&["cyclist", "bicycle", "bike"], "Cyclist"),
    (&["driver", "motorist"], "Occupant"),
];

/// Injury keywords, checked in order. Fatal terms win over `injured`.
const INJURY_TYPES: &[(&[&str], &str)] = &[
    (&["killed", "fatal", "death"], "Killed"),
    (&["injured"], "Injured"),
];

/// Extracts filters from a free-text query.
#[must_use]
pub fn parse_query(query: &str) -> FilterSpec {
    let query = query.to_lowercase();

    FilterSpec {
        borough: BOROUGHS
            .iter()
            .find(|b| query.contains(*b))
            .map(|b| b.to_uppercase()),
        year: YEAR_RE
            .captures(&query)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        person_type: first_keyword_match(&query, PERSON_TYPES),
        injury_type: first_keyword_match(&query, INJURY_TYPES),
        ..FilterSpec::default()
    }
}

fn first_keyword_match(query: &str, rules: &[(&[&str], &str)]) -> Option<String> {
    rules
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| query.contains(k)))
        .map(|(_, value)| (*value).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_borough_year_and_person_type() {
        let spec = parse_query("Brooklyn 2022 pedestrian crashes");
        assert_eq!(spec.borough.as_deref(), Some("BROOKLYN"));
        assert_eq!(spec.year.as_deref(), Some("2022"));
        assert_eq!(spec.person_type.as_deref(), Some("Pedestrian"));
        assert_eq!(spec.injury_type, None);
        assert_eq!(spec.vehicle_type, None);
    }

    #[test]
    fn parses_cyclist_fatalities() {
        let spec = parse_query("Manhattan cyclist killed");
        assert_eq!(spec.borough.as_deref(), Some("MANHATTAN"));
        assert_eq!(spec.person_type.as_deref(), Some("Cyclist"));
        assert_eq!(spec.injury_type.as_deref(), Some("Killed"));
    }

    #[test]
    fn multi_word_borough_and_motorists() {
        let spec = parse_query("STATEN ISLAND motorist injured");
        assert_eq!(spec.borough.as_deref(), Some("STATEN ISLAND"));
        assert_eq!(spec.person_type.as_deref(), Some("Occupant"));
        assert_eq!(spec.injury_type.as_deref(), Some("Injured"));
    }

    #[test]
    fn first_rule_wins_within_a_dimension() {
        let spec = parse_query("queens or bronx, pedestrian hit by bike, injured and killed");
        assert_eq!(spec.borough.as_deref(), Some("BRONX"));
        assert_eq!(spec.person_type.as_deref(), Some("Pedestrian"));
        assert_eq!(spec.injury_type.as_deref(), Some("Killed"));
    }

    #[test]
    fn year_must_be_a_whole_word() {
        assert_eq!(parse_query("crashes in 12022").year, None);
        assert_eq!(parse_query("1999 crashes").year, None);
        assert_eq!(
            parse_query("between 2019 and 2021").year.as_deref(),
            Some("2019")
        );
    }

    #[test]
    fn unmatched_query_yields_empty_filters() {
        let spec = parse_query("show me everything");
        assert_eq!(spec, FilterSpec::default());
        assert_eq!(serde_json::to_string(&spec).unwrap(), "{}");
    }
}
