//! Static scenario registry.
//!
//! Every email scenario declares its variable contract up front: required
//! variables with a declared shape, and optional variables with defaults.
//! Validation is a pure function over the variable bag and runs before any
//! store or network interaction.

use crate::error::{RenderError, RenderResult};
use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

/// Declared shape of a scenario variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Any scalar value, rendered as text.
    Text,
    /// `YYYY-MM-DD` or RFC 3339 string.
    Date,
    /// Integer number, or a string holding one.
    Integer,
    /// Absolute http(s) URL.
    Url,
}

impl VarKind {
    pub fn expected(self) -> &'static str {
        match self {
            VarKind::Text => "text",
            VarKind::Date => "date (YYYY-MM-DD or RFC 3339)",
            VarKind::Integer => "integer",
            VarKind::Url => "http(s) URL",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            VarKind::Text => matches!(
                value,
                Value::String(_) | Value::Number(_) | Value::Bool(_)
            ),
            VarKind::Date => match value {
                Value::String(s) => {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                        || DateTime::parse_from_rfc3339(s).is_ok()
                }
                _ => false,
            },
            VarKind::Integer => match value {
                Value::Number(n) => n.is_i64() || n.is_u64(),
                Value::String(s) => s.parse::<i64>().is_ok(),
                _ => false,
            },
            VarKind::Url => match value {
                Value::String(s) => s.starts_with("http://") || s.starts_with("https://"),
                _ => false,
            },
        }
    }
}

/// A required variable and its declared shape.
#[derive(Debug, Clone, Copy)]
pub struct VarSpec {
    pub name: &'static str,
    pub kind: VarKind,
}

/// An optional variable with the default used when the caller omits it.
#[derive(Debug, Clone, Copy)]
pub struct OptionalVar {
    pub name: &'static str,
    pub default: &'static str,
}

/// One logical email kind and its variable contract.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioSpec {
    pub name: &'static str,
    pub required: &'static [VarSpec],
    pub optional: &'static [OptionalVar],
}

pub const SCENARIOS: &[ScenarioSpec] = &[
    ScenarioSpec {
        name: "password_reset",
        required: &[
            VarSpec { name: "user_name", kind: VarKind::Text },
            VarSpec { name: "reset_link", kind: VarKind::Url },
            VarSpec { name: "expires_in_hours", kind: VarKind::Integer },
        ],
        optional: &[],
    },
    ScenarioSpec {
        name: "appointment_reminder",
        required: &[
            VarSpec { name: "patient_name", kind: VarKind::Text },
            VarSpec { name: "appointment_date", kind: VarKind::Date },
            VarSpec { name: "clinic_name", kind: VarKind::Text },
        ],
        optional: &[OptionalVar { name: "location", default: "our clinic" }],
    },
    ScenarioSpec {
        name: "invoice_issued",
        required: &[
            VarSpec { name: "customer_name", kind: VarKind::Text },
            VarSpec { name: "invoice_number", kind: VarKind::Text },
            VarSpec { name: "amount_due", kind: VarKind::Text },
            VarSpec { name: "due_date", kind: VarKind::Date },
            VarSpec { name: "portal_link", kind: VarKind::Url },
        ],
        optional: &[OptionalVar { name: "notes", default: "" }],
    },
];

/// Look up a scenario by name.
pub fn scenario(name: &str) -> Option<&'static ScenarioSpec> {
    SCENARIOS.iter().find(|s| s.name == name)
}

impl ScenarioSpec {
    /// Validate the variable bag against this contract and produce the
    /// final render data, with defaults filled in for omitted optionals.
    ///
    /// All missing required variables are reported together; a shape
    /// mismatch is reported per field.
    pub fn prepare(&self, vars: &Map<String, Value>) -> RenderResult<Map<String, Value>> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|spec| !vars.contains_key(spec.name))
            .map(|spec| spec.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RenderError::MissingVariables { keys: missing });
        }

        for spec in self.required {
            let value = vars
                .get(spec.name)
                .ok_or_else(|| RenderError::MissingVariables {
                    keys: vec![spec.name.to_string()],
                })?;
            if !spec.kind.matches(value) {
                return Err(RenderError::VariableType {
                    key: spec.name.to_string(),
                    expected: spec.kind.expected(),
                });
            }
        }

        let mut data = vars.clone();
        for opt in self.optional {
            data.entry(opt.name.to_string())
                .or_insert_with(|| Value::String(opt.default.to_string()));
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test bags are objects"),
        }
    }

    #[test]
    fn all_missing_variables_are_reported_together() {
        let spec = scenario("password_reset").unwrap();
        let err = spec.prepare(&Map::new()).unwrap_err();

        match err {
            RenderError::MissingVariables { keys } => {
                assert_eq!(keys, vec!["user_name", "reset_link", "expires_in_hours"]);
            }
            other => panic!("expected MissingVariables, got {other:?}"),
        }
    }

    #[test]
    fn date_shaped_variable_rejects_non_dates() {
        let spec = scenario("appointment_reminder").unwrap();
        let vars = bag(json!({
            "patient_name": "Ada Lovelace",
            "appointment_date": "next tuesday",
            "clinic_name": "Northside Clinic",
        }));

        let err = spec.prepare(&vars).unwrap_err();
        match err {
            RenderError::VariableType { key, .. } => assert_eq!(key, "appointment_date"),
            other => panic!("expected VariableType, got {other:?}"),
        }
    }

    #[test]
    fn rfc3339_dates_are_accepted() {
        let spec = scenario("appointment_reminder").unwrap();
        let vars = bag(json!({
            "patient_name": "Ada Lovelace",
            "appointment_date": "2026-03-01T09:30:00+01:00",
            "clinic_name": "Northside Clinic",
        }));

        assert!(spec.prepare(&vars).is_ok());
    }

    #[test]
    fn optional_defaults_are_filled_in() {
        let spec = scenario("appointment_reminder").unwrap();
        let vars = bag(json!({
            "patient_name": "Ada Lovelace",
            "appointment_date": "2026-03-01",
            "clinic_name": "Northside Clinic",
        }));

        let data = spec.prepare(&vars).unwrap();
        assert_eq!(data.get("location"), Some(&json!("our clinic")));
    }

    #[test]
    fn caller_supplied_optionals_win_over_defaults() {
        let spec = scenario("appointment_reminder").unwrap();
        let vars = bag(json!({
            "patient_name": "Ada Lovelace",
            "appointment_date": "2026-03-01",
            "clinic_name": "Northside Clinic",
            "location": "Room 4, East Wing",
        }));

        let data = spec.prepare(&vars).unwrap();
        assert_eq!(data.get("location"), Some(&json!("Room 4, East Wing")));
    }

    #[test]
    fn integer_accepts_numbers_and_numeric_strings() {
        assert!(VarKind::Integer.matches(&json!(24)));
        assert!(VarKind::Integer.matches(&json!("24")));
        assert!(!VarKind::Integer.matches(&json!(2.5)));
        assert!(!VarKind::Integer.matches(&json!("soon")));
    }

    #[test]
    fn url_requires_http_scheme() {
        assert!(VarKind::Url.matches(&json!("https://crm.example.com/reset/abc")));
        assert!(!VarKind::Url.matches(&json!("javascript:alert(1)")));
        assert!(!VarKind::Url.matches(&json!(42)));
    }
}
