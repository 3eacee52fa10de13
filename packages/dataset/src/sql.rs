//! SQL fragments for the `DuckDB` store.
//!
//! User-supplied filter values only ever reach the database as bound
//! parameters. Identifiers come from the canonical column list and are
//! double-quoted; table names are checked by [`validate_table_name`].

use crash_map_collision_models::{CollisionFilter, columns};
use duckdb::types::Value;

use crate::LoadError;

/// Double-quotes an identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Accepts plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`) and returns them
/// quoted.
///
/// # Errors
///
/// * If `name` is empty or contains anything else
pub fn validate_table_name(name: &str) -> Result<String, LoadError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(quote_ident(name))
    } else {
        Err(LoadError::InvalidTableName {
            name: name.to_string(),
        })
    }
}

/// A conjunction of predicates with positional `?` parameters.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    predicates: Vec<String>,
    params: Vec<Value>,
}

impl WhereClause {
    /// Creates an empty clause.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the clause for a collision filter. `year_expr` is the SQL
    /// expression yielding the calendar year.
    #[must_use]
    pub fn for_filter(filter: &CollisionFilter, year_expr: &str) -> Self {
        let mut clause = Self::new();

        if let Some(borough) = &filter.borough {
            clause = clause.eq_text(&quote_ident(columns::BOROUGH), borough);
        }
        if let Some(year) = filter.year {
            clause = clause.eq_int(year_expr, i64::from(year));
        }
        if let Some(vehicle) = &filter.vehicle_type {
            clause = clause.eq_text(&quote_ident(columns::VEHICLE_TYPE), vehicle);
        }
        if let Some(factor) = &filter.contributing_factor {
            clause = clause.eq_text(&quote_ident(columns::CONTRIBUTING_FACTOR), factor);
        }
        if let Some(person_type) = &filter.person_type {
            clause = clause.eq_text(&quote_ident(columns::PERSON_TYPE), person_type);
        }
        if let Some(injury) = &filter.injury_type {
            clause = clause.eq_text(&quote_ident(columns::PERSON_INJURY), injury);
        }

        clause
    }

    /// Adds `expr = ?` bound to a string.
    #[must_use]
    pub fn eq_text(mut self, expr: &str, value: &str) -> Self {
        self.predicates.push(format!("{expr} = ?"));
        self.params.push(Value::Text(value.to_string()));
        self
    }

    /// Adds `expr = ?` bound to an integer.
    #[must_use]
    pub fn eq_int(mut self, expr: &str, value: i64) -> Self {
        self.predicates.push(format!("{expr} = ?"));
        self.params.push(Value::BigInt(value));
        self
    }

    /// Adds `expr IS NOT NULL`.
    #[must_use]
    pub fn not_null(mut self, expr: &str) -> Self {
        self.predicates.push(format!("{expr} IS NOT NULL"));
        self
    }

    /// Adds `expr BETWEEN ? AND ?`.
    #[must_use]
    pub fn between(mut self, expr: &str, low: f64, high: f64) -> Self {
        self.predicates.push(format!("{expr} BETWEEN ? AND ?"));
        self.params.push(Value::Double(low));
        self.params.push(Value::Double(high));
        self
    }

    /// The clause text including a leading ` WHERE `, or an empty string.
    #[must_use]
    pub fn sql(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }

    /// Bound parameters in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}
