//! Filter specification for the statistics endpoints.
//!
//! [`FilterSpec`] is the loose wire form sent by the front end, where any
//! key may be missing, empty, or the sentinel `"All"`. [`FilterSpec::parse`]
//! turns it into a typed [`CollisionFilter`] with one optional exact-match
//! constraint per dimension.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::CollisionRecord;

/// Sentinel value meaning "no constraint on this dimension".
pub const ALL: &str = "All";

/// Error returned when a filter value cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFilterError {
    /// The `year` filter is not an integer.
    #[error("Invalid year filter '{value}': expected an integer year")]
    Year {
        /// The rejected value.
        value: String,
    },
}

/// Filter criteria as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    /// Exact borough name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borough: Option<String>,
    /// Calendar year (string or number on the wire).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Exact vehicle type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    /// Exact contributing factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributing_factor: Option<String>,
    /// Exact person type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_type: Option<String>,
    /// Exact injury status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injury_type: Option<String>,
}

impl FilterSpec {
    /// Parses the wire form into a typed filter.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidFilterError::Year`] if a `year` constraint is
    /// present but not an integer.
    pub fn parse(&self) -> Result<CollisionFilter, InvalidFilterError> {
        let year = constraint(self.year.as_deref())
            .map(|raw| {
                raw.trim()
                    .parse::<i32>()
                    .map_err(|_| InvalidFilterError::Year { value: raw })
            })
            .transpose()?;

        Ok(CollisionFilter {
            borough: constraint(self.borough.as_deref()),
            year,
            vehicle_type: constraint(self.vehicle_type.as_deref()),
            contributing_factor: constraint(self.contributing_factor.as_deref()),
            person_type: constraint(self.person_type.as_deref()),
            injury_type: constraint(self.injury_type.as_deref()),
        })
    }
}

/// Treats missing, empty, and `"All"` values as "no constraint".
fn constraint(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.is_empty() && *v != ALL)
        .map(str::to_owned)
}

/// Typed conjunction of exact-match constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CollisionFilter {
    /// Borough must equal this value.
    pub borough: Option<String>,
    /// Year must equal this value.
    pub year: Option<i32>,
    /// Vehicle type must equal this value.
    pub vehicle_type: Option<String>,
    /// Contributing factor must equal this value.
    pub contributing_factor: Option<String>,
    /// Person type must equal this value.
    pub person_type: Option<String>,
    /// Injury status must equal this value.
    pub injury_type: Option<String>,
}

impl CollisionFilter {
    /// Returns `true` if no constraint is set.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        *self == Self::default()
    }

    /// Returns `true` if the record satisfies every present constraint.
    #[must_use]
    pub fn matches(&self, record: &CollisionRecord) -> bool {
        text_matches(self.borough.as_deref(), record.borough.as_deref())
            && self.year.is_none_or(|y| record.year == Some(y))
            && text_matches(self.vehicle_type.as_deref(), record.vehicle_type.as_deref())
            && text_matches(
                self.contributing_factor.as_deref(),
                record.contributing_factor.as_deref(),
            )
            && text_matches(self.person_type.as_deref(), record.person_type.as_deref())
            && text_matches(self.injury_type.as_deref(), record.injury_status.as_deref())
    }
}

fn text_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    wanted.is_none_or(|w| actual == Some(w))
}

/// Accepts a string, number, boolean, or null as an optional string.
impl<'de> Deserialize<'de> for FilterSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FilterSpecVisitor)
    }
}

/// Reads a filter from a JSON object. Sequences are rejected and unknown
/// keys ignored.
struct FilterSpecVisitor;

impl<'de> Visitor<'de> for FilterSpecVisitor {
    type Value = FilterSpec;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a filter object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut spec = FilterSpec::default();

        while let Some(key) = map.next_key::<String>()? {
            let slot = match key.as_str() {
                "borough" => &mut spec.borough,
                "year" => &mut spec.year,
                "vehicle_type" => &mut spec.vehicle_type,
                "contributing_factor" => &mut spec.contributing_factor,
                "person_type" => &mut spec.person_type,
                "injury_type" => &mut spec.injury_type,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
            };
            *slot = map.next_value::<LooseValue>()?.0;
        }

        Ok(spec)
    }
}

/// A string, number, or boolean read as text; `null` reads as `None`.
struct LooseValue(Option<String>);

impl<'de> Deserialize<'de> for LooseValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LooseString).map(Self)
    }
}

struct LooseString;

impl<'de> Visitor<'de> for LooseString {
    type Value = Option<String>;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a string, number, or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(borough: &str, year: i32) -> CollisionRecord {
        CollisionRecord {
            collision_id: 1,
            borough: Some(borough.to_string()),
            year: Some(year),
            person_type: Some("Pedestrian".to_string()),
            ..CollisionRecord::default()
        }
    }

    #[test]
    fn all_sentinel_and_empty_values_are_unconstrained() {
        let spec = FilterSpec {
            borough: Some("All".to_string()),
            year: Some(String::new()),
            vehicle_type: Some("All".to_string()),
            contributing_factor: None,
            person_type: Some("All".to_string()),
            injury_type: Some("All".to_string()),
        };
        let filter = spec.parse().unwrap();
        assert!(filter.is_unrestricted());
        assert_eq!(filter, FilterSpec::default().parse().unwrap());
    }

    #[test]
    fn parses_year_as_integer() {
        let spec = FilterSpec {
            year: Some(" 2022 ".to_string()),
            ..FilterSpec::default()
        };
        assert_eq!(spec.parse().unwrap().year, Some(2022));
    }

    #[test]
    fn rejects_non_numeric_year() {
        let spec = FilterSpec {
            year: Some("twenty".to_string()),
            ..FilterSpec::default()
        };
        assert_eq!(
            spec.parse(),
            Err(InvalidFilterError::Year {
                value: "twenty".to_string()
            })
        );
    }

    #[test]
    fn matches_conjunctively_and_case_sensitively() {
        let filter = CollisionFilter {
            borough: Some("BROOKLYN".to_string()),
            year: Some(2022),
            ..CollisionFilter::default()
        };
        assert!(filter.matches(&record("BROOKLYN", 2022)));
        assert!(!filter.matches(&record("BROOKLYN", 2021)));
        assert!(!filter.matches(&record("Brooklyn", 2022)));

        let by_person = CollisionFilter {
            person_type: Some("Pedestrian".to_string()),
            ..CollisionFilter::default()
        };
        assert!(by_person.matches(&record("QUEENS", 2020)));
    }

    #[test]
    fn absent_record_value_never_matches_a_constraint() {
        let filter = CollisionFilter {
            vehicle_type: Some("Sedan".to_string()),
            ..CollisionFilter::default()
        };
        assert!(!filter.matches(&record("QUEENS", 2020)));
    }

    #[test]
    fn deserializes_numbers_and_nulls() {
        let spec: FilterSpec =
            serde_json::from_str(r#"{"year": 2021, "borough": null, "person_type": "Cyclist"}"#)
                .unwrap();
        assert_eq!(spec.year.as_deref(), Some("2021"));
        assert_eq!(spec.borough, None);
        assert_eq!(spec.person_type.as_deref(), Some("Cyclist"));

        let empty: FilterSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, FilterSpec::default());
    }

    #[test]
    fn ignores_unknown_keys() {
        let spec: FilterSpec =
            serde_json::from_str(r#"{"borough": "BRONX", "page": {"size": 10}, "tags": [1]}"#)
                .unwrap();
        assert_eq!(
            spec,
            FilterSpec {
                borough: Some("BRONX".to_string()),
                ..FilterSpec::default()
            }
        );
    }

    #[test]
    fn accepts_only_objects() {
        assert!(serde_json::from_str::<FilterSpec>("[1, 2]").is_err());
        assert!(serde_json::from_str::<FilterSpec>("[]").is_err());
        assert!(serde_json::from_str::<FilterSpec>(r#""BRONX""#).is_err());
        assert!(serde_json::from_str::<FilterSpec>(r#"{"borough": ["BRONX"]}"#).is_err());
    }

    #[test]
    fn serializes_only_present_keys() {
        let spec = FilterSpec {
            borough: Some("BRONX".to_string()),
            ..FilterSpec::default()
        };
        assert_eq!(
            serde_json::to_string(&spec).unwrap(),
            r#"{"borough":"BRONX"}"#
        );
    }
}
