//! Activity statistics with per-activity defaulting.
//!
//! The analysis service returns loosely-typed JSON objects whose fields may be
//! missing, `null`, or of the wrong type. [`StatsSnapshot::from_json`] applies
//! the activity's field schema so every known metric always has a value, and
//! [`StatsSnapshot::labels`] renders them the way the display shows them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Activity;

// ── Values ────────────────────────────────────────────────────────────────────

/// One metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Flag(bool),
    Count(u64),
    Number(f64),
    Text(String),
}

impl StatValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Flag(*b)),
            Value::Number(n) => n.as_u64().map(Self::Count).or_else(|| n.as_f64().map(Self::Number)),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum FieldDefault {
    Count(u64),
    Number(f64),
    Flag(bool),
    Text(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Label {
    Integer,
    /// Value followed by a unit; `Some(n)` fixes the decimals.
    Unit(&'static str, Option<usize>),
    Fixed(usize),
    /// Already a percentage (0–100).
    Percent,
    /// Ratio in 0–1 shown as a rounded percentage.
    RatioPercent,
    Text,
    Calibration,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    key: &'static str,
    default: FieldDefault,
    label: Label,
}

const fn field(key: &'static str, default: FieldDefault, label: Label) -> FieldSpec {
    FieldSpec { key, default, label }
}

const DUMBBELL_FIELDS: &[FieldSpec] = &[
    field("left_reps", FieldDefault::Count(0), Label::Integer),
    field("right_reps", FieldDefault::Count(0), Label::Integer),
    field("total_reps", FieldDefault::Count(0), Label::Integer),
    field("estimated_weight", FieldDefault::Number(0.0), Label::Unit("kg", None)),
    field("left_status", FieldDefault::Text("Not visible"), Label::Text),
    field("right_status", FieldDefault::Text("Not visible"), Label::Text),
];

const JUMP_FIELDS: &[FieldSpec] = &[
    field("total_jumps", FieldDefault::Count(0), Label::Integer),
    field("current_height", FieldDefault::Number(0.0), Label::Unit("cm", Some(1))),
    field("max_height", FieldDefault::Number(0.0), Label::Unit("cm", Some(1))),
    field("state", FieldDefault::Text("GROUND"), Label::Text),
    field("calibrated", FieldDefault::Flag(false), Label::Calibration),
    field("feedback", FieldDefault::Text("System Ready"), Label::Text),
];

const HEIGHT_WEIGHT_FIELDS: &[FieldSpec] = &[
    field("height_cm", FieldDefault::Number(0.0), Label::Unit("cm", Some(1))),
    field("weight_kg", FieldDefault::Number(0.0), Label::Unit("kg", Some(1))),
    field("bmi", FieldDefault::Number(0.0), Label::Fixed(1)),
    field("confidence", FieldDefault::Number(0.0), Label::RatioPercent),
    field("status", FieldDefault::Text("Ready"), Label::Text),
];

const SITUP_FIELDS: &[FieldSpec] = &[
    field("reps", FieldDefault::Count(0), Label::Integer),
    field("form_percentage", FieldDefault::Number(0.0), Label::Percent),
    field("feedback", FieldDefault::Text("Get Ready"), Label::Text),
    field("elapsed_time", FieldDefault::Count(0), Label::Integer),
    field("remaining_time", FieldDefault::Count(180), Label::Integer),
];

fn schema(activity: Activity) -> &'static [FieldSpec] {
    match activity {
        Activity::Dumbbell => DUMBBELL_FIELDS,
        Activity::VerticalJump => JUMP_FIELDS,
        Activity::HeightWeight => HEIGHT_WEIGHT_FIELDS,
        Activity::Situp => SITUP_FIELDS,
    }
}

impl FieldSpec {
    fn default_value(&self) -> StatValue {
        match self.default {
            FieldDefault::Count(v) => StatValue::Count(v),
            FieldDefault::Number(v) => StatValue::Number(v),
            FieldDefault::Flag(v) => StatValue::Flag(v),
            FieldDefault::Text(v) => StatValue::Text(v.to_owned()),
        }
    }

    /// Coerce a raw JSON value into this field's type. Falsy values (0, "",
    /// null, false) and mismatched types collapse to the default.
    fn coerce(&self, raw: Option<&Value>) -> StatValue {
        let coerced = match (self.default, raw) {
            (FieldDefault::Count(_), Some(v)) => v
                .as_u64()
                .or_else(|| v.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.round() as u64))
                .filter(|n| *n != 0)
                .map(StatValue::Count),
            (FieldDefault::Number(_), Some(v)) => v
                .as_f64()
                .filter(|f| f.is_finite() && *f != 0.0)
                .map(StatValue::Number),
            (FieldDefault::Flag(_), Some(v)) => v.as_bool().map(StatValue::Flag),
            (FieldDefault::Text(_), Some(v)) => v
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| StatValue::Text(s.to_owned())),
            (_, None) => None,
        };
        coerced.unwrap_or_else(|| self.default_value())
    }

    fn render(&self, value: &StatValue) -> String {
        let number = match value {
            StatValue::Count(n) => *n as f64,
            StatValue::Number(f) => *f,
            StatValue::Flag(b) => f64::from(u8::from(*b)),
            StatValue::Text(_) => 0.0,
        };
        match (self.label, value) {
            (Label::Text, StatValue::Text(s)) => s.clone(),
            (Label::Text, other) => render_plain(other),
            (Label::Calibration, StatValue::Flag(true)) => "Calibrated".to_owned(),
            (Label::Calibration, _) => "Calibrating...".to_owned(),
            (Label::Integer, _) => format!("{}", number.round() as i64),
            (Label::Unit(unit, Some(decimals)), _) => format!("{number:.decimals$} {unit}"),
            (Label::Unit(unit, None), _) => format!("{} {unit}", render_plain(value)),
            (Label::Fixed(decimals), _) => format!("{number:.decimals$}"),
            (Label::Percent, _) => format!("{}%", render_plain(value)),
            (Label::RatioPercent, _) => format!("{}%", (number * 100.0).round() as i64),
        }
    }
}

fn render_plain(value: &StatValue) -> String {
    match value {
        StatValue::Flag(b) => b.to_string(),
        StatValue::Count(n) => n.to_string(),
        StatValue::Number(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        StatValue::Number(f) => f.to_string(),
        StatValue::Text(s) => s.clone(),
    }
}

// ── StatsSnapshot ─────────────────────────────────────────────────────────────

/// Aggregated metrics for one activity. Every snapshot fully replaces the
/// previously displayed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    activity: Activity,
    fields: BTreeMap<String, StatValue>,
}

impl StatsSnapshot {
    /// The zero/placeholder snapshot shown after a reset.
    pub fn defaults(activity: Activity) -> Self {
        let fields = schema(activity)
            .iter()
            .map(|spec| (spec.key.to_owned(), spec.default_value()))
            .collect();
        Self { activity, fields }
    }

    /// Build a snapshot from a stats object. Non-objects yield the defaults;
    /// unknown keys are preserved as-is.
    pub fn from_json(activity: Activity, value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::defaults(activity);
        };
        let specs = schema(activity);
        let mut fields: BTreeMap<String, StatValue> = obj
            .iter()
            .filter(|(key, _)| !specs.iter().any(|s| s.key == key.as_str()))
            .filter_map(|(key, v)| StatValue::from_json(v).map(|sv| (key.clone(), sv)))
            .collect();
        for spec in specs {
            fields.insert(spec.key.to_owned(), spec.coerce(obj.get(spec.key)));
        }
        Self { activity, fields }
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn get(&self, key: &str) -> Option<&StatValue> {
        self.fields.get(key)
    }

    pub fn count(&self, key: &str) -> u64 {
        match self.fields.get(key) {
            Some(StatValue::Count(n)) => *n,
            Some(StatValue::Number(f)) if *f >= 0.0 => f.round() as u64,
            _ => 0,
        }
    }

    pub fn number(&self, key: &str) -> f64 {
        match self.fields.get(key) {
            Some(StatValue::Count(n)) => *n as f64,
            Some(StatValue::Number(f)) => *f,
            _ => 0.0,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(StatValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(StatValue::Flag(true)))
    }

    /// Display labels for the activity's known metrics, in schema order.
    pub fn labels(&self) -> Vec<(&'static str, String)> {
        schema(self.activity)
            .iter()
            .map(|spec| {
                let label = match self.fields.get(spec.key) {
                    Some(v) => spec.render(v),
                    None => spec.render(&spec.default_value()),
                };
                (spec.key, label)
            })
            .collect()
    }

    pub fn is_default(&self) -> bool {
        *self == Self::defaults(self.activity)
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, label) in self.labels() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{key}={label}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_cover_every_field() {
        let s = StatsSnapshot::defaults(Activity::Dumbbell);
        assert_eq!(s.count("total_reps"), 0);
        assert_eq!(s.text("left_status"), Some("Not visible"));
        assert_eq!(s.text("right_status"), Some("Not visible"));
        assert!(s.is_default());

        let hw = StatsSnapshot::defaults(Activity::HeightWeight);
        assert_eq!(hw.text("status"), Some("Ready"));
        assert_eq!(hw.number("bmi"), 0.0);
    }

    #[test]
    fn missing_and_mistyped_fields_fall_back() {
        let raw = json!({
            "left_reps": 3,
            "right_reps": "oops",
            "left_status": "",
            "estimated_weight": 11.5,
            "session_active": true
        });
        let s = StatsSnapshot::from_json(Activity::Dumbbell, &raw);
        assert_eq!(s.count("left_reps"), 3);
        assert_eq!(s.count("right_reps"), 0);
        assert_eq!(s.text("left_status"), Some("Not visible"));
        assert_eq!(s.number("estimated_weight"), 11.5);
        // extra keys survive
        assert_eq!(s.get("session_active"), Some(&StatValue::Flag(true)));
    }

    #[test]
    fn non_object_yields_defaults() {
        let s = StatsSnapshot::from_json(Activity::Situp, &Value::Null);
        assert!(s.is_default());
        assert_eq!(s.count("remaining_time"), 180);
    }

    #[test]
    fn labels_match_display_format() {
        let jump = StatsSnapshot::from_json(
            Activity::VerticalJump,
            &json!({"total_jumps": 4, "current_height": 12.345, "max_height": 40, "calibrated": true}),
        );
        let labels: BTreeMap<_, _> = jump.labels().into_iter().collect();
        assert_eq!(labels["total_jumps"], "4");
        assert_eq!(labels["current_height"], "12.3 cm");
        assert_eq!(labels["max_height"], "40.0 cm");
        assert_eq!(labels["calibrated"], "Calibrated");
        assert_eq!(labels["state"], "GROUND");
        assert_eq!(labels["feedback"], "System Ready");

        let hw = StatsSnapshot::from_json(
            Activity::HeightWeight,
            &json!({"height_cm": 175.26, "weight_kg": 70, "bmi": 22.81, "confidence": 0.876}),
        );
        let labels: BTreeMap<_, _> = hw.labels().into_iter().collect();
        assert_eq!(labels["height_cm"], "175.3 cm");
        assert_eq!(labels["weight_kg"], "70.0 kg");
        assert_eq!(labels["bmi"], "22.8");
        assert_eq!(labels["confidence"], "88%");
        assert_eq!(labels["status"], "Ready");

        let db = StatsSnapshot::from_json(Activity::Dumbbell, &json!({"estimated_weight": 12.5}));
        let labels: BTreeMap<_, _> = db.labels().into_iter().collect();
        assert_eq!(labels["estimated_weight"], "12.5 kg");
        assert_eq!(StatsSnapshot::defaults(Activity::Dumbbell).labels()[3].1, "0 kg");
    }
}
