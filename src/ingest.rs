//! Upstream loading surface: bulk, all-or-nothing population of the
//! feature store and name index.
//!
//! Loading a gazetteer first drops whatever that gazetteer previously held
//! and then writes the new snapshot; there is no incremental update. The
//! query layer never writes.

use std::{collections::BTreeMap, collections::HashSet, path::Path};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::Result,
    feature::{AttrValue, Feature},
    feature_store::{self, FeatureStore},
    name_index::NameIndex,
};

/// Index-writer memory budget used during a load.
const WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// One canonical record together with its alternate names.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub feature: Feature,
    /// Alternate textual forms; blank entries are dropped. When empty, the
    /// record's `name` attribute is indexed instead.
    pub names: Vec<String>,
}

/// On-disk JSON form of a record; the gazetteer name comes from the caller.
#[derive(Debug, Deserialize, Serialize)]
struct RawRecord {
    identifier: String,
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    names: Vec<String>,
}

/// Read feature records from a JSON array file.
pub fn read_records(path: &Path, gazetteer: &str) -> Result<Vec<FeatureRecord>> {
    let content = std::fs::read_to_string(path)?;
    let raw: Vec<RawRecord> = serde_json::from_str(&content)?;
    Ok(raw
        .into_iter()
        .map(|r| FeatureRecord {
            feature: Feature {
                gazetteer: gazetteer.to_string(),
                identifier: r.identifier,
                attributes: r.attributes,
            },
            names: r.names,
        })
        .collect())
}

/// The searchable names of a record: explicit alternates, trimmed and
/// deduplicated, falling back to the `name` attribute.
fn searchable_names(record: &FeatureRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    let candidates: Vec<&str> = if record.names.is_empty() {
        record.feature.attr("name").as_str().into_iter().collect()
    } else {
        record.names.iter().map(String::as_str).collect()
    };

    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            names.push(trimmed.to_string());
        }
    }
    names
}

/// Replace the contents of `gazetteer` with `records`.
///
/// Writes the feature rows, derives the filterable-attribute set and its
/// distinct-value tables, and rebuilds the gazetteer's slice of the name
/// index. Returns the number of name entries indexed.
pub fn load_gazetteer(
    store: &FeatureStore,
    index: &NameIndex,
    gazetteer: &str,
    records: &[FeatureRecord],
) -> Result<usize> {
    info!(gazetteer, records = records.len(), "loading gazetteer");

    store.remove_gazetteer(gazetteer)?;

    let features: Vec<Feature> =
        records.iter().map(|r| r.feature.clone()).collect();
    store.put_features(&features)?;

    let attributes = feature_store::derive_filter_attributes(&features);
    store.set_filter_attributes(gazetteer, &attributes)?;
    for attribute in &attributes {
        let values = feature_store::distinct_values(&features, attribute);
        store.set_attribute_values(gazetteer, attribute, &values)?;
    }

    // Name normalization is per-record and embarrassingly parallel; the
    // index writer itself is driven sequentially.
    let entries: Vec<(String, Vec<String>)> = records
        .par_iter()
        .map(|record| {
            (record.feature.identifier.clone(), searchable_names(record))
        })
        .collect();

    let mut writer = index.writer(WRITER_MEMORY_BUDGET)?;
    index.delete_gazetteer(&writer, gazetteer);
    let mut indexed = 0;
    for (identifier, names) in &entries {
        for name in names {
            index.add_name(&writer, gazetteer, identifier, name)?;
            indexed += 1;
        }
    }
    writer.commit()?;

    info!(gazetteer, names = indexed, "gazetteer load complete");
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identifier: &str, name: &str, names: &[&str]) -> FeatureRecord {
        FeatureRecord {
            feature: Feature::new("geonames", identifier)
                .with_attr("name", name)
                .with_attr("feature_class", "P"),
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn open_store(tmp: &tempfile::TempDir) -> FeatureStore {
        FeatureStore::open(&tmp.path().join("features.redb")).unwrap()
    }

    #[test]
    fn load_populates_store_and_index() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp);
        let index = NameIndex::open_in_ram().unwrap();

        let records = vec![
            record("1", "Andorra", &["Andorra", "Principality of Andorra"]),
            record("2", "Andorra la Vella", &[]),
        ];
        let indexed =
            load_gazetteer(&store, &index, "geonames", &records).unwrap();

        assert_eq!(indexed, 3);
        assert_eq!(store.count("geonames").unwrap(), 2);
        assert_eq!(index.count("geonames").unwrap(), 3);

        // Fallback to the name attribute when no alternates are given.
        let hits = index
            .search_exact("geonames", "andorra la vella", 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identifier, "2");
    }

    #[test]
    fn blank_and_duplicate_names_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp);
        let index = NameIndex::open_in_ram().unwrap();

        let records =
            vec![record("1", "Paris", &["Paris", "  ", "Paris", " Paris "])];
        let indexed =
            load_gazetteer(&store, &index, "geonames", &records).unwrap();
        assert_eq!(indexed, 1);
    }

    #[test]
    fn reload_replaces_previous_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp);
        let index = NameIndex::open_in_ram().unwrap();

        load_gazetteer(
            &store,
            &index,
            "geonames",
            &[record("1", "Old Town", &[])],
        )
        .unwrap();
        load_gazetteer(
            &store,
            &index,
            "geonames",
            &[record("2", "New Town", &[])],
        )
        .unwrap();

        assert!(store.get("geonames", "1").unwrap().is_none());
        assert!(store.get("geonames", "2").unwrap().is_some());
        assert!(index.search_exact("geonames", "old town", 10).unwrap().is_empty());
        assert_eq!(index.count("geonames").unwrap(), 1);
    }

    #[test]
    fn load_builds_value_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp);
        let index = NameIndex::open_in_ram().unwrap();

        load_gazetteer(
            &store,
            &index,
            "geonames",
            &[record("1", "Paris", &[]), record("2", "London", &[])],
        )
        .unwrap();

        let attrs = store.filter_attributes("geonames").unwrap();
        assert_eq!(attrs, vec!["feature_class", "name"]);
        assert_eq!(
            store.attribute_values("geonames", "name").unwrap(),
            vec!["London", "Paris"]
        );
    }

    #[test]
    fn read_records_parses_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("records.json");
        std::fs::write(
            &path,
            r#"[
                {
                    "identifier": "1",
                    "attributes": {
                        "name": "Paris",
                        "population": 2138551,
                        "latitude": 48.85341
                    },
                    "names": ["Paris", "Lutetia"]
                },
                {"identifier": "2"}
            ]"#,
        )
        .unwrap();

        let records = read_records(&path, "geonames").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].feature.gazetteer, "geonames");
        assert_eq!(
            records[0].feature.attr("population").as_i64(),
            Some(2_138_551)
        );
        assert_eq!(records[0].names, vec!["Paris", "Lutetia"]);
        assert!(records[1].names.is_empty());
    }
}
