//! Feature tagging helpers: tag normalisation, ids, date tags and key parsing

use std::collections::HashSet;
use std::hash::Hash;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use serde_json::Value;

use crate::payload::properties_mut;

/// Separator for composite keys
pub const KEY_SEPARATOR: &str = "%%";

/// Property namespace the hub stores tags under
pub const XYZ_NAMESPACE: &str = "@ns:com:here:xyz";

/// Date parts that can be turned into tags or properties
pub const DATE_KINDS: &[&str] = &[
    "year",
    "month",
    "year_month",
    "week",
    "year_week",
    "weekday",
    "hour",
];

macro_rules! lazy_regex {
    ($(static ref $name:ident = $re:expr;)*) => {
        $(
            static $name: std::sync::LazyLock<Regex> =
                std::sync::LazyLock::new(|| Regex::new($re).expect("valid regex"));
        )*
    };
}

lazy_regex! {
    static ref WHITESPACE_RE = r"\s+";
    static ref COMMA_RE = r",+";
    static ref AMP_RE = r"&+";
    static ref PLUS_RE = r"\++";
    static ref HASH_RE = r"#+";
}

/// Normalise `value` and append `"{tag_type}@{value}"` to `tags`
pub fn add_tags_to_list(value: &str, tag_type: &str, tags: &mut Vec<String>) {
    let value = value.to_lowercase();
    let value = WHITESPACE_RE.replace_all(&value, "_");
    let value = COMMA_RE.replace_all(&value, "_");
    let value = AMP_RE.replace_all(&value, "_and_");
    let value = PLUS_RE.replace_all(&value, "_plus_");
    let value = HASH_RE.replace_all(&value, "_num_");
    let tag_type = WHITESPACE_RE.replace_all(tag_type, "_");
    tags.push(format!("{}@{}", tag_type, value));
}

/// Build an id from the comma-separated property names, joining the
/// non-empty values with `-`
pub fn create_unique_id(id_props: &str, feature: &Value) -> String {
    let properties = feature.get("properties").and_then(Value::as_object);
    id_props
        .split(',')
        .filter_map(|prop| properties.and_then(|p| p.get(prop)))
        .filter_map(truthy_string)
        .collect::<Vec<_>>()
        .join("-")
}

fn truthy_string(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Split a composite key on `%%`, falling back to a legacy `a-b` pair
pub fn split_keys(input: &str) -> Option<Vec<String>> {
    if input.contains(KEY_SEPARATOR) {
        return Some(input.split(KEY_SEPARATOR).map(str::to_string).collect());
    }

    let tokens: Vec<String> = input.split('-').map(str::to_string).collect();
    if tokens.len() == 2 {
        Some(tokens)
    } else {
        None
    }
}

/// Rewrite comparison operators into the hub's query syntax.
/// Only the first occurrence of each operator is replaced.
pub fn replace_operators(expr: &str) -> String {
    expr.replacen(">=", "=gte=", 1)
        .replacen("<=", "=lte=", 1)
        .replacen('>', "=gt=", 1)
        .replacen('<', "=lt=", 1)
        .replacen('+', "&", 1)
}

/// Order-preserving de-duplication
pub fn uniq<T: Eq + Hash + Clone>(values: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| seen.insert((*v).clone()))
        .cloned()
        .collect()
}

/// File name without directory and last extension
pub fn file_stem(file_name: &str) -> Option<String> {
    let base = Path::new(file_name).file_name()?.to_str()?;
    Some(match base.rfind('.') {
        Some(idx) => base[..idx].to_string(),
        None => base.to_string(),
    })
}

/// Merge tags into `properties["@ns:com:here:xyz"].tags`, keeping existing ones
pub fn apply_tags(feature: &mut Value, tags: &[String]) {
    if tags.is_empty() {
        return;
    }
    let Some(properties) = properties_mut(feature) else {
        return;
    };

    let ns = properties
        .entry(XYZ_NAMESPACE)
        .or_insert_with(|| Value::Object(Default::default()));
    if !ns.is_object() {
        *ns = Value::Object(Default::default());
    }
    let Some(ns) = ns.as_object_mut() else {
        return;
    };

    let mut all: Vec<String> = ns
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    all.extend(tags.iter().cloned());

    ns.insert(
        "tags".to_string(),
        Value::Array(uniq(&all).into_iter().map(Value::String).collect()),
    );
}

/// Which date parts to derive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateTagSelection {
    All,
    Only(Vec<String>),
}

impl DateTagSelection {
    /// Parse a comma list; empty input selects everything
    pub fn parse(input: Option<&str>) -> Self {
        match input.map(str::trim) {
            None | Some("") | Some("true") => Self::All,
            Some(list) => Self::Only(list.split(',').map(|s| s.trim().to_string()).collect()),
        }
    }

    fn includes(&self, kind: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.iter().any(|k| k == kind),
        }
    }
}

/// Week of year using US conventions: weeks start on Sunday and week 1 is the
/// week containing 1 January
pub fn locale_week(date: NaiveDate) -> u32 {
    let week_start = date - chrono::Duration::days(date.weekday().num_days_from_sunday() as i64);
    let week_end = week_start + chrono::Duration::days(6);
    if week_end.year() > date.year() {
        return 1;
    }
    let jan1 = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
    let offset = jan1.weekday().num_days_from_sunday();
    (date.ordinal0() + offset) / 7 + 1
}

/// Derived `(suffix, value)` pairs for the selected date parts
pub fn date_parts(value: &NaiveDateTime, selection: &DateTagSelection) -> Vec<(&'static str, String)> {
    let date = value.date();
    let week = locale_week(date);
    DATE_KINDS
        .iter()
        .filter(|kind| selection.includes(kind))
        .map(|kind| {
            let part = match *kind {
                "year" => date.year().to_string(),
                "month" => date.format("%B").to_string(),
                "year_month" => format!("{}-{:02}", date.year(), date.month()),
                "week" => format!("{:02}", week),
                "year_week" => format!("{}-{:02}", date.year(), week),
                "weekday" => date.format("%A").to_string(),
                _ => format!("{:02}", value.hour()),
            };
            (*kind, part)
        })
        .collect()
}

/// Append `date_{element}_{kind}@{value}` tags
pub fn add_datetime_tags(
    value: &NaiveDateTime,
    element: &str,
    selection: &DateTagSelection,
    tags: &mut Vec<String>,
) {
    for (kind, part) in date_parts(value, selection) {
        add_tags_to_list(&part, &format!("date_{}_{}", element, kind), tags);
    }
}

/// Set `date_{element}_{kind}` properties on the feature
pub fn add_datetime_properties(
    value: &NaiveDateTime,
    element: &str,
    selection: &DateTagSelection,
    feature: &mut Value,
) {
    let Some(properties) = properties_mut(feature) else {
        return;
    };
    for (kind, part) in date_parts(value, selection) {
        properties.insert(format!("date_{}_{}", element, kind), Value::String(part));
    }
}

/// Parse the date formats commonly found in feature properties
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(input, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_week_start_of_year() {
        // 2021-01-01 is a Friday; the week containing it is week 1
        assert_eq!(locale_week(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()), 1);
        assert_eq!(locale_week(NaiveDate::from_ymd_opt(2021, 1, 2).unwrap()), 1);
        // Sunday 3 January starts week 2
        assert_eq!(locale_week(NaiveDate::from_ymd_opt(2021, 1, 3).unwrap()), 2);
    }

    #[test]
    fn test_locale_week_end_of_year_rolls_over() {
        // Sunday 2020-12-27 starts the week containing 2021-01-01
        assert_eq!(locale_week(NaiveDate::from_ymd_opt(2020, 12, 27).unwrap()), 1);
        assert_eq!(locale_week(NaiveDate::from_ymd_opt(2020, 12, 26).unwrap()), 52);
    }

    #[test]
    fn test_truthy_string() {
        assert_eq!(truthy_string(&Value::Null), None);
        assert_eq!(truthy_string(&Value::from("")), None);
        assert_eq!(truthy_string(&Value::from(0)), None);
        assert_eq!(truthy_string(&Value::from(12)), Some("12".to_string()));
        assert_eq!(truthy_string(&Value::from("x")), Some("x".to_string()));
    }
}
