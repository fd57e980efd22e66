use std::{collections::BTreeMap, path::Path};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    error::Result,
    feature::{AttrValue, Feature},
};

/// Feature rows keyed by (gazetteer, identifier), serialized with serde_json.
const FEATURES: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("features");

/// Filterable attribute names per gazetteer, as a JSON string array.
const FILTER_ATTRIBUTES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("filter_attributes");

/// Distinct values per (gazetteer, attribute), as a sorted JSON string array.
const ATTRIBUTE_VALUES: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("attribute_values");

/// Read-mostly store of canonical geographic records.
///
/// Populated wholesale by the ingest step; query paths only ever read.
/// Every read runs inside a single redb read transaction, so a batch
/// lookup observes one consistent snapshot.
pub struct FeatureStore {
    db: Database,
}

impl FeatureStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(FEATURES)?;
        txn.open_table(FILTER_ATTRIBUTES)?;
        txn.open_table(ATTRIBUTE_VALUES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Features --

    /// Insert a batch of features in a single transaction.
    pub fn put_features(&self, features: &[Feature]) -> Result<()> {
        if features.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FEATURES)?;
            for feature in features {
                let bytes = serde_json::to_vec(feature)?;
                table.insert(
                    (feature.gazetteer.as_str(), feature.identifier.as_str()),
                    bytes.as_slice(),
                )?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Direct lookup; absence is `None`, not an error.
    pub fn get(
        &self,
        gazetteer: &str,
        identifier: &str,
    ) -> Result<Option<Feature>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FEATURES)?;
        match table.get((gazetteer, identifier))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Hydrate many identifiers under one read snapshot, preserving order.
    ///
    /// Identifiers missing from the store are skipped rather than erroring;
    /// the name index can legitimately be a superset during a reload.
    pub fn get_many(
        &self,
        gazetteer: &str,
        identifiers: &[String],
    ) -> Result<Vec<Feature>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FEATURES)?;
        let mut features = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            if let Some(bytes) = table.get((gazetteer, identifier.as_str()))? {
                features.push(serde_json::from_slice(bytes.value())?);
            }
        }
        Ok(features)
    }

    /// Remove every row belonging to a gazetteer, in one transaction.
    pub fn remove_gazetteer(&self, gazetteer: &str) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(FEATURES)?;
            let mut keys = Vec::new();
            for entry in table.range((gazetteer, "")..)? {
                let (key, _) = entry?;
                let (gaz, id) = key.value();
                if gaz != gazetteer {
                    break;
                }
                keys.push(id.to_string());
            }
            for id in &keys {
                table.remove((gazetteer, id.as_str()))?;
            }

            let mut attrs = txn.open_table(FILTER_ATTRIBUTES)?;
            let filterable: Vec<String> = attrs
                .remove(gazetteer)?
                .map(|v| serde_json::from_slice(v.value()))
                .transpose()?
                .unwrap_or_default();
            let mut values = txn.open_table(ATTRIBUTE_VALUES)?;
            for attr in &filterable {
                values.remove((gazetteer, attr.as_str()))?;
            }

            keys.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn count(&self, gazetteer: &str) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FEATURES)?;
        let mut n = 0;
        for entry in table.range((gazetteer, "")..)? {
            let (key, _) = entry?;
            if key.value().0 != gazetteer {
                break;
            }
            n += 1;
        }
        Ok(n)
    }

    /// Names of all loaded gazetteers.
    pub fn gazetteers(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FILTER_ATTRIBUTES)?;
        let mut names = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    // -- Filterable attributes --

    pub fn set_filter_attributes(
        &self,
        gazetteer: &str,
        attributes: &[String],
    ) -> Result<()> {
        let bytes = serde_json::to_vec(attributes)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FILTER_ATTRIBUTES)?;
            table.insert(gazetteer, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn filter_attributes(&self, gazetteer: &str) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FILTER_ATTRIBUTES)?;
        match table.get(gazetteer)? {
            Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
            None => Ok(Vec::new()),
        }
    }

    // -- Distinct attribute values --

    pub fn set_attribute_values(
        &self,
        gazetteer: &str,
        attribute: &str,
        values: &[String],
    ) -> Result<()> {
        let bytes = serde_json::to_vec(values)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ATTRIBUTE_VALUES)?;
            table.insert((gazetteer, attribute), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn attribute_values(
        &self,
        gazetteer: &str,
        attribute: &str,
    ) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ATTRIBUTE_VALUES)?;
        match table.get((gazetteer, attribute))? {
            Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for FeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStore").finish_non_exhaustive()
    }
}

/// Derive the filterable attribute set from a batch of features.
///
/// An attribute is filterable when it is textual wherever it appears and is
/// not an identifier column (nothing useful comes from `IN`-filtering on a
/// key that is unique per row).
pub fn derive_filter_attributes(features: &[Feature]) -> Vec<String> {
    let mut textual: BTreeMap<&str, bool> = BTreeMap::new();
    for feature in features {
        for (key, value) in &feature.attributes {
            let entry = textual.entry(key).or_insert(true);
            match value {
                AttrValue::Text(_) | AttrValue::Null => {}
                _ => *entry = false,
            }
        }
    }
    textual
        .into_iter()
        .filter(|(key, is_text)| {
            *is_text && *key != "identifier" && !key.ends_with("_id")
        })
        .map(|(key, _)| key.to_string())
        .collect()
}

/// Distinct non-null values of one attribute across a batch, sorted.
pub fn distinct_values(features: &[Feature], attribute: &str) -> Vec<String> {
    let mut values: Vec<String> = features
        .iter()
        .filter_map(|f| f.attr(attribute).as_str().map(str::to_string))
        .collect();
    values.sort();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, FeatureStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = FeatureStore::open(&tmp.path().join("features.redb")).unwrap();
        (tmp, store)
    }

    fn sample_features() -> Vec<Feature> {
        vec![
            Feature::new("geonames", "1")
                .with_attr("name", "Paris")
                .with_attr("feature_class", "P")
                .with_attr("country", "France")
                .with_attr("population", 2_138_551i64),
            Feature::new("geonames", "2")
                .with_attr("name", "Paris, Texas")
                .with_attr("feature_class", "P")
                .with_attr("country", "United States")
                .with_attr("population", 24_171i64),
            Feature::new("geonames", "3")
                .with_attr("name", "London")
                .with_attr("feature_class", "P")
                .with_attr("country", "United Kingdom")
                .with_attr("population", 8_961_989i64),
        ]
    }

    #[test]
    fn open_in_missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("no_such_dir").join("features.redb");
        assert!(FeatureStore::open(&path).is_err());
    }

    #[test]
    fn put_then_get() {
        let (_tmp, store) = test_store();
        store.put_features(&sample_features()).unwrap();

        let paris = store.get("geonames", "1").unwrap().unwrap();
        assert_eq!(paris.attr("name").as_str(), Some("Paris"));

        assert!(store.get("geonames", "99").unwrap().is_none());
        assert!(store.get("other", "1").unwrap().is_none());
    }

    #[test]
    fn get_many_preserves_order_and_skips_missing() {
        let (_tmp, store) = test_store();
        store.put_features(&sample_features()).unwrap();

        let ids = vec!["3".to_string(), "99".to_string(), "1".to_string()];
        let features = store.get_many("geonames", &ids).unwrap();
        let names: Vec<_> = features
            .iter()
            .map(|f| f.attr("name").as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["London", "Paris"]);
    }

    #[test]
    fn count_is_scoped_to_gazetteer() {
        let (_tmp, store) = test_store();
        store.put_features(&sample_features()).unwrap();
        store
            .put_features(&[Feature::new("swissnames", "10")])
            .unwrap();

        assert_eq!(store.count("geonames").unwrap(), 3);
        assert_eq!(store.count("swissnames").unwrap(), 1);
        assert_eq!(store.count("ghost").unwrap(), 0);
    }

    #[test]
    fn remove_gazetteer_clears_all_tables() {
        let (_tmp, store) = test_store();
        let features = sample_features();
        store.put_features(&features).unwrap();
        store
            .set_filter_attributes(
                "geonames",
                &["country".to_string(), "feature_class".to_string()],
            )
            .unwrap();
        store
            .set_attribute_values(
                "geonames",
                "country",
                &distinct_values(&features, "country"),
            )
            .unwrap();

        assert_eq!(store.remove_gazetteer("geonames").unwrap(), 3);
        assert_eq!(store.count("geonames").unwrap(), 0);
        assert!(store.filter_attributes("geonames").unwrap().is_empty());
        assert!(store
            .attribute_values("geonames", "country")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn filter_attributes_round_trip() {
        let (_tmp, store) = test_store();
        let attrs = vec!["country".to_string(), "feature_class".to_string()];
        store.set_filter_attributes("geonames", &attrs).unwrap();
        assert_eq!(store.filter_attributes("geonames").unwrap(), attrs);
    }

    #[test]
    fn attribute_values_round_trip() {
        let (_tmp, store) = test_store();
        let values = vec!["France".to_string(), "United States".to_string()];
        store
            .set_attribute_values("geonames", "country", &values)
            .unwrap();
        assert_eq!(
            store.attribute_values("geonames", "country").unwrap(),
            values
        );
        assert!(store
            .attribute_values("geonames", "elevation")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn derive_filter_attributes_is_textual_non_identifier() {
        let features = sample_features();
        let attrs = derive_filter_attributes(&features);
        assert_eq!(attrs, vec!["country", "feature_class", "name"]);
    }

    #[test]
    fn distinct_values_sorted_dedup() {
        let features = sample_features();
        let classes = distinct_values(&features, "feature_class");
        assert_eq!(classes, vec!["P"]);

        let countries = distinct_values(&features, "country");
        assert_eq!(
            countries,
            vec!["France", "United Kingdom", "United States"]
        );
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("features.redb");

        {
            let store = FeatureStore::open(&path).unwrap();
            store.put_features(&sample_features()).unwrap();
        }

        {
            let store = FeatureStore::open(&path).unwrap();
            assert_eq!(store.count("geonames").unwrap(), 3);
        }
    }
}
