//! Feature engineering from raw event logs.
//!
//! Converts per-event log rows into one engineered feature row per user,
//! then assigns percentile-derived binary labels in a second pass so label
//! balance scales with dataset size.

use crate::error::{PerfilarError, Result};
use crate::primitives::Matrix;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A raw event row as delivered by the upstream log ingestion.
///
/// The metadata blob is already parsed into `device`/`source`/`folder` by
/// the collaborator that owns ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Stable user identifier.
    pub user_id: String,
    /// Resource type acted on (e.g. "dashboard", "export").
    pub resource_type: String,
    /// Resource name acted on.
    pub resource_name: String,
    /// ISO-8601 timestamp string.
    pub timestamp: String,
    /// Device type, when known.
    pub device: Option<String>,
    /// Traffic source, when known.
    pub source: Option<String>,
    /// Folder the resource lives in, when known.
    pub folder: Option<String>,
}

/// A single feature value, tagged numeric or categorical.
///
/// Columns must be homogeneous in type across every row of a matrix; the
/// check happens once at matrix-build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    /// Numeric feature.
    Numeric(f32),
    /// Categorical feature.
    Categorical(String),
}

impl FeatureValue {
    /// Returns the numeric value, if this is a numeric feature.
    #[must_use]
    pub fn as_numeric(&self) -> Option<f32> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Categorical(_) => None,
        }
    }

    /// Renders the value as a class-label string.
    ///
    /// Whole numbers drop their fractional part so binary 0/1 targets read
    /// as "0"/"1".
    #[must_use]
    pub fn label_string(&self) -> String {
        match self {
            FeatureValue::Categorical(s) => s.clone(),
            FeatureValue::Numeric(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{}", *v as i64)
                } else {
                    v.to_string()
                }
            }
        }
    }
}

/// One engineered feature row per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Stable user identifier the row was aggregated for.
    pub user_id: String,
    /// Feature name to value, in deterministic name order.
    pub values: BTreeMap<String, FeatureValue>,
}

impl FeatureRow {
    /// Looks up a numeric feature value, if present and numeric.
    #[must_use]
    pub fn numeric(&self, name: &str) -> Option<f32> {
        self.values.get(name).and_then(FeatureValue::as_numeric)
    }
}

/// Parses an ISO-8601 timestamp into fractional epoch hours.
fn parse_epoch_hours(timestamp: &str) -> Option<f64> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 3_600_000.0)
}

/// Most frequent value in `values`, ties broken by first encounter.
fn most_frequent(values: &[&str]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(name, _)| *name == v) {
            Some((_, c)) => *c += 1,
            None => counts.push((v, 1)),
        }
    }

    // Replace only on a strictly greater count so the first-encountered
    // value wins ties
    let mut best: Option<(&str, usize)> = None;
    for &(name, count) in &counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.to_string()).unwrap_or_default()
}

/// Builds one engineered feature row per user from raw event rows.
///
/// Per-user features: `event_count`, `distinct_resource_types`,
/// `distinct_resource_names`, `mobile_ratio`, `desktop_ratio`,
/// `export_count`, `distinct_folders`, `mean_hour`, `span_hours`, and the
/// categorical `top_resource_type`.
///
/// Rows come back sorted by user id so downstream runs are deterministic.
///
/// # Errors
///
/// Returns `EmptyDataset` if no events are supplied.
pub fn build_user_features(events: &[RawEvent]) -> Result<Vec<FeatureRow>> {
    if events.is_empty() {
        return Err(PerfilarError::empty_dataset("feature building"));
    }

    let mut by_user: BTreeMap<&str, Vec<&RawEvent>> = BTreeMap::new();
    for event in events {
        by_user.entry(&event.user_id).or_default().push(event);
    }

    debug!(
        n_events = events.len(),
        n_users = by_user.len(),
        "building user features"
    );

    let mut rows = Vec::with_capacity(by_user.len());

    for (user_id, user_events) in by_user {
        let n = user_events.len() as f32;

        let mut resource_types: Vec<&str> = Vec::new();
        let mut resource_names: Vec<&str> = Vec::new();
        let mut folders: Vec<&str> = Vec::new();
        let mut mobile = 0usize;
        let mut desktop = 0usize;
        let mut exports = 0usize;
        let mut hours: Vec<f64> = Vec::new();

        for event in &user_events {
            if !resource_types.contains(&event.resource_type.as_str()) {
                resource_types.push(&event.resource_type);
            }
            if !resource_names.contains(&event.resource_name.as_str()) {
                resource_names.push(&event.resource_name);
            }
            if let Some(folder) = &event.folder {
                if !folders.contains(&folder.as_str()) {
                    folders.push(folder);
                }
            }
            match event.device.as_deref() {
                Some("mobile") => mobile += 1,
                Some("desktop") => desktop += 1,
                _ => {}
            }
            if event.resource_type == "export" {
                exports += 1;
            }
            if let Some(h) = parse_epoch_hours(&event.timestamp) {
                hours.push(h);
            }
        }

        let (mean_hour, span_hours) = if hours.is_empty() {
            (0.0, 0.0)
        } else {
            let mean_epoch = hours.iter().sum::<f64>() / hours.len() as f64;
            let min = hours.iter().copied().fold(f64::INFINITY, f64::min);
            let max = hours.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            // Hour of day for the mean instant, span in raw hours
            (mean_epoch.rem_euclid(24.0) as f32, (max - min) as f32)
        };

        let all_types: Vec<&str> = user_events.iter().map(|e| e.resource_type.as_str()).collect();

        let mut values = BTreeMap::new();
        values.insert("event_count".to_string(), FeatureValue::Numeric(n));
        values.insert(
            "distinct_resource_types".to_string(),
            FeatureValue::Numeric(resource_types.len() as f32),
        );
        values.insert(
            "distinct_resource_names".to_string(),
            FeatureValue::Numeric(resource_names.len() as f32),
        );
        values.insert(
            "mobile_ratio".to_string(),
            FeatureValue::Numeric(mobile as f32 / n),
        );
        values.insert(
            "desktop_ratio".to_string(),
            FeatureValue::Numeric(desktop as f32 / n),
        );
        values.insert(
            "export_count".to_string(),
            FeatureValue::Numeric(exports as f32),
        );
        values.insert(
            "distinct_folders".to_string(),
            FeatureValue::Numeric(folders.len() as f32),
        );
        values.insert("mean_hour".to_string(), FeatureValue::Numeric(mean_hour));
        values.insert("span_hours".to_string(), FeatureValue::Numeric(span_hours));
        values.insert(
            "top_resource_type".to_string(),
            FeatureValue::Categorical(most_frequent(&all_types)),
        );

        rows.push(FeatureRow {
            user_id: user_id.to_string(),
            values,
        });
    }

    Ok(rows)
}

/// Percentile of a sample with linear interpolation between order statistics.
///
/// `q` is in [0, 100]. Returns 0.0 for an empty sample.
#[must_use]
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (q / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f32;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Assigns a binary label column from the 75th percentile of a numeric
/// source column computed over the whole dataset.
///
/// Rows strictly above the percentile get 1, others 0. When the percentile
/// value is zero (sparse columns), the rule falls back to "greater than
/// zero". The label is stored as a numeric 0/1 feature named `label_name`.
///
/// # Errors
///
/// Returns `EmptyDataset` for zero rows, or `InvalidConfig` if the source
/// column is missing or not numeric.
pub fn assign_percentile_labels(
    rows: &mut [FeatureRow],
    source_column: &str,
    label_name: &str,
) -> Result<()> {
    if rows.is_empty() {
        return Err(PerfilarError::empty_dataset("percentile labeling"));
    }

    let values: Vec<f32> = rows
        .iter()
        .map(|row| {
            row.numeric(source_column).ok_or_else(|| {
                PerfilarError::invalid_config(
                    "source_column",
                    source_column,
                    "must be a numeric column present in every row",
                )
            })
        })
        .collect::<Result<_>>()?;

    let threshold = percentile(&values, 75.0);
    debug!(source_column, threshold, "assigning percentile labels");

    for (row, &value) in rows.iter_mut().zip(values.iter()) {
        let positive = if threshold > 0.0 {
            value > threshold
        } else {
            value > 0.0
        };
        row.values.insert(
            label_name.to_string(),
            FeatureValue::Numeric(if positive { 1.0 } else { 0.0 }),
        );
    }

    Ok(())
}

/// Builds a numeric matrix from the named columns of a set of feature rows.
///
/// Validates the schema once: every named column must exist in every row and
/// must be numeric in all of them.
///
/// # Errors
///
/// Returns `EmptyDataset` for zero rows, or `InvalidConfig` if a column is
/// missing or categorical in any row.
pub fn to_matrix(rows: &[FeatureRow], columns: &[String]) -> Result<Matrix<f32>> {
    if rows.is_empty() {
        return Err(PerfilarError::empty_dataset("matrix building"));
    }

    let mut data = Vec::with_capacity(rows.len() * columns.len());
    for row in rows {
        for column in columns {
            let value = row.numeric(column).ok_or_else(|| {
                PerfilarError::invalid_config(
                    "feature",
                    column,
                    "must be a numeric column present in every row",
                )
            })?;
            data.push(value);
        }
    }

    Matrix::from_vec(rows.len(), columns.len(), data).map_err(Into::into)
}

/// Names of the numeric columns shared by every row, in deterministic order.
#[must_use]
pub fn numeric_columns(rows: &[FeatureRow]) -> Vec<String> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    first
        .values
        .iter()
        .filter(|(name, value)| {
            value.as_numeric().is_some() && rows.iter().all(|r| r.numeric(name).is_some())
        })
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user: &str, rtype: &str, rname: &str, ts: &str, device: Option<&str>) -> RawEvent {
        RawEvent {
            user_id: user.to_string(),
            resource_type: rtype.to_string(),
            resource_name: rname.to_string(),
            timestamp: ts.to_string(),
            device: device.map(String::from),
            source: None,
            folder: None,
        }
    }

    #[test]
    fn test_empty_events_error() {
        assert!(build_user_features(&[]).is_err());
    }

    #[test]
    fn test_groups_by_user() {
        let events = vec![
            event("a", "dashboard", "d1", "2024-03-01T08:00:00+00:00", Some("desktop")),
            event("a", "export", "d1", "2024-03-01T10:00:00+00:00", Some("desktop")),
            event("b", "dashboard", "d2", "2024-03-01T09:00:00+00:00", Some("mobile")),
        ];
        let rows = build_user_features(&events).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, "a");
        assert_eq!(rows[0].numeric("event_count"), Some(2.0));
        assert_eq!(rows[0].numeric("export_count"), Some(1.0));
        assert_eq!(rows[1].numeric("mobile_ratio"), Some(1.0));
    }

    #[test]
    fn test_span_hours() {
        let events = vec![
            event("a", "dashboard", "d1", "2024-03-01T08:00:00+00:00", None),
            event("a", "dashboard", "d1", "2024-03-01T14:00:00+00:00", None),
        ];
        let rows = build_user_features(&events).unwrap();
        assert!((rows[0].numeric("span_hours").unwrap() - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_top_resource_type_tie_first_encountered() {
        let events = vec![
            event("a", "report", "r1", "2024-03-01T08:00:00+00:00", None),
            event("a", "dashboard", "d1", "2024-03-01T09:00:00+00:00", None),
        ];
        let rows = build_user_features(&events).unwrap();
        assert_eq!(
            rows[0].values.get("top_resource_type"),
            Some(&FeatureValue::Categorical("report".to_string()))
        );
    }

    #[test]
    fn test_top_resource_type_three_way_tie_keeps_first() {
        let events = vec![
            event("a", "report", "r1", "2024-03-01T08:00:00+00:00", None),
            event("a", "dashboard", "d1", "2024-03-01T09:00:00+00:00", None),
            event("a", "export", "e1", "2024-03-01T10:00:00+00:00", None),
            event("a", "export", "e1", "2024-03-01T11:00:00+00:00", None),
            event("a", "dashboard", "d2", "2024-03-01T12:00:00+00:00", None),
            event("a", "report", "r2", "2024-03-01T13:00:00+00:00", None),
        ];
        let rows = build_user_features(&events).unwrap();
        assert_eq!(
            rows[0].values.get("top_resource_type"),
            Some(&FeatureValue::Categorical("report".to_string()))
        );
    }

    #[test]
    fn test_top_resource_type_strict_majority_beats_earlier() {
        let events = vec![
            event("a", "report", "r1", "2024-03-01T08:00:00+00:00", None),
            event("a", "dashboard", "d1", "2024-03-01T09:00:00+00:00", None),
            event("a", "dashboard", "d2", "2024-03-01T10:00:00+00:00", None),
        ];
        let rows = build_user_features(&events).unwrap();
        assert_eq!(
            rows[0].values.get("top_resource_type"),
            Some(&FeatureValue::Categorical("dashboard".to_string()))
        );
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        // rank = 0.75 * 3 = 2.25 -> 3.0 + 0.25 * 1.0
        assert!((percentile(&values, 75.0) - 3.25).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_label_balance() {
        let mut rows: Vec<FeatureRow> = (0..100)
            .map(|i| {
                let mut values = BTreeMap::new();
                values.insert("event_count".to_string(), FeatureValue::Numeric(i as f32));
                FeatureRow {
                    user_id: format!("u{i}"),
                    values,
                }
            })
            .collect();

        assign_percentile_labels(&mut rows, "event_count", "power_user").unwrap();

        let positives = rows
            .iter()
            .filter(|r| r.numeric("power_user") == Some(1.0))
            .count();
        // Strictly above the 75th percentile of 0..99 leaves ~25 rows
        assert!((20..=30).contains(&positives), "got {positives}");
    }

    #[test]
    fn test_percentile_zero_falls_back_to_gt_zero() {
        let mut rows: Vec<FeatureRow> = (0..10)
            .map(|i| {
                let mut values = BTreeMap::new();
                let v = if i == 9 { 3.0 } else { 0.0 };
                values.insert("export_count".to_string(), FeatureValue::Numeric(v));
                FeatureRow {
                    user_id: format!("u{i}"),
                    values,
                }
            })
            .collect();

        assign_percentile_labels(&mut rows, "export_count", "exporter").unwrap();

        let positives = rows
            .iter()
            .filter(|r| r.numeric("exporter") == Some(1.0))
            .count();
        assert_eq!(positives, 1);
    }

    #[test]
    fn test_to_matrix_schema_check() {
        let events = vec![event("a", "dashboard", "d1", "2024-03-01T08:00:00+00:00", None)];
        let rows = build_user_features(&events).unwrap();

        let ok = to_matrix(&rows, &["event_count".to_string()]);
        assert!(ok.is_ok());

        let missing = to_matrix(&rows, &["nonexistent".to_string()]);
        assert!(missing.is_err());

        let categorical = to_matrix(&rows, &["top_resource_type".to_string()]);
        assert!(categorical.is_err());
    }

    #[test]
    fn test_numeric_columns_excludes_categorical() {
        let events = vec![event("a", "dashboard", "d1", "2024-03-01T08:00:00+00:00", None)];
        let rows = build_user_features(&events).unwrap();
        let cols = numeric_columns(&rows);
        assert!(cols.contains(&"event_count".to_string()));
        assert!(!cols.contains(&"top_resource_type".to_string()));
    }
}
