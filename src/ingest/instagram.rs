//! Instagram JSON exports.
//!
//! Meta's export nests each record, e.g.
//! `{"organic_insights_posts": [{"string_map_data": {"Impressions": {"value": "120"}}}]}`.
//! Records are flattened to dotted key paths so discovery and mapping can
//! treat them like table columns.

use super::coerce::DateParser;
use super::table::parse_row;
use super::FileLoad;
use crate::discovery::{Field, FieldMapping, FileKind, SchemaSample};
use crate::models::{DataStore, InstagramMetric, RawRecord};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Records inspected to collect sample key paths.
const SAMPLE_RECORDS: usize = 5;

/// One export record in original and flattened form.
#[derive(Debug, Clone)]
pub struct JsonRecord {
    pub original: Map<String, Value>,
    pub flat: BTreeMap<String, String>,
}

/// Read the records of an Instagram export file.
pub fn read_records(path: &Path) -> Result<Vec<JsonRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(extract_records(value))
}

/// Locate the record array at the top level or one level down.
///
/// A bare object without any array of objects is a single record.
pub fn extract_records(value: Value) -> Vec<JsonRecord> {
    let objects: Vec<Map<String, Value>> = match value {
        Value::Array(items) => objects_of(items),
        Value::Object(map) => {
            let nested = map
                .iter()
                .find(|(_, v)| is_object_array(v))
                .map(|(k, _)| k.clone());
            match nested {
                Some(key) => match map.get(&key) {
                    Some(Value::Array(items)) => objects_of(items.clone()),
                    _ => Vec::new(),
                },
                None => vec![map],
            }
        }
        _ => Vec::new(),
    };

    objects
        .into_iter()
        .map(|original| {
            let mut flat = BTreeMap::new();
            flatten_into("", &Value::Object(original.clone()), &mut flat);
            JsonRecord { original, flat }
        })
        .collect()
}

fn is_object_array(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.first().map(Value::is_object).unwrap_or(false))
}

fn objects_of(items: Vec<Value>) -> Vec<Map<String, Value>> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Flatten nested objects and arrays to `a.b.0.c` paths with text leaves.
pub fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(&join(key), child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(&join(&i.to_string()), child, out);
            }
        }
        Value::Null => {}
        Value::String(text) => {
            out.insert(prefix.to_string(), text.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Discovery sample: key paths in first-seen order plus leading rows.
pub fn sample(file_name: &str, records: &[JsonRecord], rows: usize) -> SchemaSample {
    let mut columns: Vec<String> = Vec::new();
    for record in records.iter().take(SAMPLE_RECORDS.max(rows)) {
        for key in record.flat.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .take(rows)
        .map(|record| {
            columns
                .iter()
                .map(|c| record.flat.get(c).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    SchemaSample {
        file_name: file_name.to_string(),
        columns,
        rows,
    }
}

/// Append classified Instagram records to the store.
pub fn load_records(
    kind: FileKind,
    records: &[JsonRecord],
    mapping: &FieldMapping,
    store: &mut DataStore,
) -> FileLoad {
    let dates = DateParser::new(mapping.date_format.as_deref());
    let mut load = FileLoad::new(kind, records.len());

    if let Some(payload_kind) = kind.payload_kind() {
        for record in records {
            let date = mapping
                .date_column
                .as_deref()
                .and_then(|column| record.flat.get(column))
                .and_then(|raw| dates.parse(raw));
            store.instagram_payloads.push(RawRecord {
                kind: payload_kind,
                date,
                payload: record.original.clone(),
            });
        }
        load.loaded = records.len();
        return load;
    }

    if kind != FileKind::InstagramPosts {
        load.skipped = records.len();
        return load;
    }

    for record in records {
        let Some(parsed) = parse_row(&record.flat, mapping, &dates, true) else {
            load.skipped += 1;
            continue;
        };
        let Some(date) = parsed.date else {
            load.skipped += 1;
            continue;
        };

        let impressions = parsed.count(Field::Impressions);
        let likes = parsed.count(Field::Likes);
        let comments = parsed.count(Field::Comments);
        let shares = parsed.count(Field::Shares);
        let engagement_rate = if parsed.has(Field::EngagementRate) {
            parsed.rate(Field::EngagementRate)
        } else if impressions > 0 {
            let interactions = likes.saturating_add(comments).saturating_add(shares);
            (interactions as f64 / impressions as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        store.instagram_metrics.push(InstagramMetric {
            date,
            impressions,
            likes,
            comments,
            shares,
            engagement_rate,
        });
        load.loaded += 1;
    }

    load
}
