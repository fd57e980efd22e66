use std::sync::Arc;

use tracing::debug;

use crate::{
    error::Result,
    feature::Feature,
    feature_store::FeatureStore,
    filter::{AttributeFilter, FilterCache, FilterVocabulary},
    method::MatchMethod,
    name_index::{NameIndex, NameMatch},
    normalize::normalize_query,
    rank::select_rank_groups,
};

/// Default maximum number of features returned by a search.
pub const DEFAULT_LIMIT: usize = 1000;

/// Options for a candidate search. `Default` gives `limit = 1000`,
/// `ranks = 1` and no attribute filter.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of features returned.
    pub limit: usize,
    /// Number of rank groups to expand (ignored by the exact method).
    pub ranks: usize,
    /// Optional attribute filter, validated against the store.
    pub filter: Option<AttributeFilter>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            ranks: 1,
            filter: None,
        }
    }
}

/// The retrieval engine: a pure query layer over a populated feature store
/// and name index.
///
/// Shared handles are injected at construction; there is no implicit
/// module-level connection. The only mutable state is the filter cache,
/// which is safe under concurrent use, so one `Gazetteer` instance can
/// serve many threads.
pub struct Gazetteer {
    gazetteer_name: String,
    store: Arc<FeatureStore>,
    index: Arc<NameIndex>,
    filters: FilterCache,
}

/// `FilterVocabulary` view of the store, scoped to one gazetteer.
struct StoreVocabulary<'a> {
    store: &'a FeatureStore,
    gazetteer: &'a str,
}

impl FilterVocabulary for StoreVocabulary<'_> {
    fn filter_attributes(&self) -> Result<Vec<String>> {
        self.store.filter_attributes(self.gazetteer)
    }

    fn attribute_values(&self, attribute: &str) -> Result<Vec<String>> {
        self.store.attribute_values(self.gazetteer, attribute)
    }
}

impl Gazetteer {
    pub fn new(
        gazetteer_name: &str,
        store: Arc<FeatureStore>,
        index: Arc<NameIndex>,
    ) -> Self {
        Self {
            gazetteer_name: gazetteer_name.to_string(),
            store,
            index,
            filters: FilterCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.gazetteer_name
    }

    /// Retrieve candidate features for a name.
    ///
    /// The query is normalized (quotes stripped, whitespace trimmed) and
    /// dispatched to `method`; rank-aware methods then keep the top
    /// `ranks` score groups, the attribute filter (if any) restricts the
    /// survivors, and the result is truncated to `limit` in relevance
    /// order, best first. An empty query yields an empty list for every
    /// method.
    pub fn search(
        &self,
        name: &str,
        method: MatchMethod,
        options: &SearchOptions,
    ) -> Result<Vec<Feature>> {
        let query = normalize_query(name);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        // Fetch a candidate pool independent of the caller's limit: rank
        // grouping and the attribute filter both discard candidates, so a
        // small limit must not starve what they get to see.
        let fetch = options.limit.max(DEFAULT_LIMIT);
        let matches = self.dispatch(&query, method, fetch)?;
        debug!(
            method = %method,
            query = %query,
            candidates = matches.len(),
            "name index matches"
        );

        let matches = if method.supports_ranks() {
            let scored: Vec<(String, f32)> = matches
                .into_iter()
                .map(|m| (m.identifier, m.score))
                .collect();
            select_rank_groups(scored, options.ranks)
                .into_iter()
                .map(|(identifier, _)| identifier)
                .collect()
        } else {
            matches.into_iter().map(|m| m.identifier).collect::<Vec<_>>()
        };

        let mut features =
            self.store.get_many(&self.gazetteer_name, &matches)?;

        if let Some(filter) = &options.filter {
            let compiled = self.filters.get_or_construct(
                filter,
                &StoreVocabulary {
                    store: &self.store,
                    gazetteer: &self.gazetteer_name,
                },
            )?;
            features.retain(|f| compiled.matches(f));
        }

        features.truncate(options.limit);
        Ok(features)
    }

    /// Direct lookup by identifier; `None` when absent, never an error.
    pub fn find(&self, identifier: &str) -> Result<Option<Feature>> {
        self.store.get(&self.gazetteer_name, identifier)
    }

    /// Validate an attribute filter without running a search.
    pub fn validate_filter(&self, filter: &AttributeFilter) -> Result<()> {
        crate::filter::validate(
            filter,
            &StoreVocabulary {
                store: &self.store,
                gazetteer: &self.gazetteer_name,
            },
        )
    }

    /// Filterable attribute names for this gazetteer.
    pub fn filter_attributes(&self) -> Result<Vec<String>> {
        self.store.filter_attributes(&self.gazetteer_name)
    }

    /// Known distinct values for one filterable attribute.
    pub fn filter_values(&self, attribute: &str) -> Result<Vec<String>> {
        self.store.attribute_values(&self.gazetteer_name, attribute)
    }

    /// Completed filter-validation passes (cache misses), for tests and
    /// status reporting.
    pub fn filter_validation_count(&self) -> usize {
        self.filters.validation_count()
    }

    fn dispatch(
        &self,
        query: &str,
        method: MatchMethod,
        limit: usize,
    ) -> Result<Vec<NameMatch>> {
        let gazetteer = &self.gazetteer_name;
        match method {
            MatchMethod::Exact => {
                self.index.search_exact(gazetteer, query, limit)
            }
            MatchMethod::Phrase => {
                self.index.search_phrase(gazetteer, query, limit)
            }
            MatchMethod::Substring => {
                self.index.search_substring(gazetteer, query, limit)
            }
            MatchMethod::Permuted => {
                self.index.search_permuted(gazetteer, query, limit)
            }
            MatchMethod::Partial => {
                self.index.search_partial(gazetteer, query, limit)
            }
            MatchMethod::Fuzzy => {
                self.index.search_fuzzy(gazetteer, query, limit)
            }
        }
    }
}

impl std::fmt::Debug for Gazetteer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gazetteer")
            .field("gazetteer_name", &self.gazetteer_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feature::Feature,
        ingest::{self, FeatureRecord},
    };

    fn sample_records() -> Vec<FeatureRecord> {
        vec![
            FeatureRecord {
                feature: Feature::new("geonames", "1")
                    .with_attr("name", "Paris")
                    .with_attr("country", "France")
                    .with_attr("feature_class", "P")
                    .with_attr("population", 2_138_551i64),
                names: vec!["Paris".to_string()],
            },
            FeatureRecord {
                feature: Feature::new("geonames", "2")
                    .with_attr("name", "Paris, Texas")
                    .with_attr("country", "United States")
                    .with_attr("feature_class", "P")
                    .with_attr("population", 24_171i64),
                names: vec!["Paris, Texas".to_string()],
            },
            FeatureRecord {
                feature: Feature::new("geonames", "3")
                    .with_attr("name", "London")
                    .with_attr("country", "United Kingdom")
                    .with_attr("feature_class", "P")
                    .with_attr("population", 8_961_989i64),
                names: vec!["London".to_string()],
            },
        ]
    }

    fn setup_engine() -> (tempfile::TempDir, Gazetteer) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            FeatureStore::open(&tmp.path().join("features.redb")).unwrap(),
        );
        let index = Arc::new(NameIndex::open_in_ram().unwrap());

        ingest::load_gazetteer(&store, &index, "geonames", &sample_records())
            .unwrap();

        let engine = Gazetteer::new("geonames", store, index);
        (tmp, engine)
    }

    fn ids(features: &[Feature]) -> Vec<&str> {
        features.iter().map(|f| f.identifier.as_str()).collect()
    }

    fn country_filter(country: &str) -> AttributeFilter {
        AttributeFilter::from([(
            "country".to_string(),
            vec![country.to_string()],
        )])
    }

    #[test]
    fn exact_returns_only_equal_names() {
        let (_tmp, engine) = setup_engine();
        let results = engine
            .search("Paris", MatchMethod::Exact, &SearchOptions::default())
            .unwrap();
        assert_eq!(ids(&results), vec!["1"]);
    }

    #[test]
    fn substring_returns_both_paris_features() {
        let (_tmp, engine) = setup_engine();
        let results = engine
            .search("Paris", MatchMethod::Substring, &SearchOptions::default())
            .unwrap();
        let mut found = ids(&results);
        found.sort();
        assert_eq!(found, vec!["1", "2"]);
    }

    #[test]
    fn fuzzy_finds_truncated_query() {
        let (_tmp, engine) = setup_engine();
        let results = engine
            .search("Pari", MatchMethod::Fuzzy, &SearchOptions::default())
            .unwrap();
        assert!(ids(&results).contains(&"1"));
    }

    #[test]
    fn find_present_and_absent() {
        let (_tmp, engine) = setup_engine();
        let london = engine.find("3").unwrap().unwrap();
        assert_eq!(london.attr("name").as_str(), Some("London"));
        assert!(engine.find("99").unwrap().is_none());
    }

    #[test]
    fn empty_query_is_not_an_error_for_any_method() {
        let (_tmp, engine) = setup_engine();
        for method in MatchMethod::ALL {
            let results = engine
                .search("", method, &SearchOptions::default())
                .unwrap();
            assert!(results.is_empty());
        }
    }

    #[test]
    fn quoted_query_is_normalized() {
        let (_tmp, engine) = setup_engine();
        let results = engine
            .search(
                "  \"Paris\"  ",
                MatchMethod::Exact,
                &SearchOptions::default(),
            )
            .unwrap();
        assert_eq!(ids(&results), vec!["1"]);
    }

    #[test]
    fn search_is_idempotent() {
        let (_tmp, engine) = setup_engine();
        let first = engine
            .search("Paris", MatchMethod::Partial, &SearchOptions::default())
            .unwrap();
        let second = engine
            .search("Paris", MatchMethod::Partial, &SearchOptions::default())
            .unwrap();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn ranks_expand_monotonically() {
        let (_tmp, engine) = setup_engine();
        let one = engine
            .search(
                "Paris",
                MatchMethod::Partial,
                &SearchOptions {
                    ranks: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        let two = engine
            .search(
                "Paris",
                MatchMethod::Partial,
                &SearchOptions {
                    ranks: 2,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(two.len() >= one.len());
    }

    #[test]
    fn zero_ranks_empty_for_rank_aware_methods() {
        let (_tmp, engine) = setup_engine();
        let options = SearchOptions {
            ranks: 0,
            ..Default::default()
        };
        let results = engine
            .search("Paris", MatchMethod::Partial, &options)
            .unwrap();
        assert!(results.is_empty());

        // Exact ignores ranks entirely.
        let results =
            engine.search("Paris", MatchMethod::Exact, &options).unwrap();
        assert_eq!(ids(&results), vec!["1"]);
    }

    #[test]
    fn limit_truncates() {
        let (_tmp, engine) = setup_engine();
        let results = engine
            .search(
                "Paris",
                MatchMethod::Substring,
                &SearchOptions {
                    limit: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn small_limit_does_not_starve_filtered_results() {
        let (_tmp, engine) = setup_engine();
        let results = engine
            .search(
                "Paris",
                MatchMethod::Substring,
                &SearchOptions {
                    limit: 1,
                    ranks: 10,
                    filter: Some(country_filter("United States")),
                },
            )
            .unwrap();
        assert_eq!(ids(&results), vec!["2"]);
    }

    #[test]
    fn filter_restricts_candidates() {
        let (_tmp, engine) = setup_engine();
        let results = engine
            .search(
                "Paris",
                MatchMethod::Substring,
                &SearchOptions {
                    filter: Some(country_filter("United States")),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ids(&results), vec!["2"]);
    }

    #[test]
    fn repeated_filter_validates_once() {
        let (_tmp, engine) = setup_engine();
        let options = SearchOptions {
            filter: Some(country_filter("France")),
            ..Default::default()
        };
        engine
            .search("Paris", MatchMethod::Substring, &options)
            .unwrap();
        engine
            .search("Paris", MatchMethod::Substring, &options)
            .unwrap();
        assert_eq!(engine.filter_validation_count(), 1);
    }

    #[test]
    fn invalid_filter_key_errors() {
        let (_tmp, engine) = setup_engine();
        let err = engine
            .validate_filter(&AttributeFilter::from([(
                "contry".to_string(),
                vec!["France".to_string()],
            )]))
            .unwrap_err();
        assert!(err.to_string().contains("country"));
    }

    #[test]
    fn invalid_filter_value_suggests() {
        let (_tmp, engine) = setup_engine();
        let err = engine
            .validate_filter(&country_filter("Frannce"))
            .unwrap_err();
        assert!(err.to_string().contains("Did you mean France?"));
    }

    #[test]
    fn filter_attributes_are_exposed() {
        let (_tmp, engine) = setup_engine();
        let attrs = engine.filter_attributes().unwrap();
        assert!(attrs.contains(&"country".to_string()));
        assert!(!attrs.contains(&"population".to_string()));
        assert!(engine
            .filter_values("country")
            .unwrap()
            .contains(&"France".to_string()));
    }
}
