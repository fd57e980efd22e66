//! Attribute-filter validation, construction and caching.
//!
//! A filter maps attribute names to the list of values a candidate feature
//! may carry. Validation checks keys against the gazetteer's filterable
//! attributes and values against the known distinct-value sets, producing
//! actionable errors ("did you mean ...?"). Construction compiles the
//! filter into an `attr IN (?, ...)` fragment with positional parameters
//! plus an evaluable predicate, cached by the filter's canonical signature.

use std::{
    collections::{BTreeMap, HashSet},
    num::NonZeroUsize,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use lru::LruCache;

use crate::{
    error::{Error, Result},
    feature::Feature,
};

/// Caller-supplied attribute filter.
pub type AttributeFilter = BTreeMap<String, Vec<String>>;

/// Jaro-Winkler similarity a known value must reach to be suggested.
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Entries kept in the filter cache. Entries are pure functions of their
/// key, so eviction only costs recomputation; the bound keeps adversarially
/// varied filters from growing the cache for the process lifetime.
const CACHE_CAPACITY: usize = 256;

/// Canonical signature of a filter: sorted (attribute, sorted values).
type Signature = Vec<(String, Vec<String>)>;

fn signature(filter: &AttributeFilter) -> Signature {
    filter
        .iter()
        .map(|(attr, values)| {
            let mut sorted = values.clone();
            sorted.sort();
            sorted.dedup();
            (attr.clone(), sorted)
        })
        .collect()
}

/// A validated, reusable filter.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// SQL-style fragment, e.g. `country IN (?, ?) AND feature_class IN (?)`.
    pub fragment: String,
    /// Positional parameters matching the fragment's placeholders.
    pub params: Vec<String>,
    allowed: Vec<(String, HashSet<String>)>,
}

impl CompiledFilter {
    fn build(signature: &Signature) -> Self {
        let mut parts = Vec::with_capacity(signature.len());
        let mut params = Vec::new();
        let mut allowed = Vec::with_capacity(signature.len());

        for (attr, values) in signature {
            let placeholders = vec!["?"; values.len()].join(", ");
            parts.push(format!("{attr} IN ({placeholders})"));
            params.extend(values.iter().cloned());
            allowed.push((
                attr.clone(),
                values.iter().cloned().collect::<HashSet<_>>(),
            ));
        }

        Self {
            fragment: parts.join(" AND "),
            params,
            allowed,
        }
    }

    /// Whether a feature's attribute bag satisfies every clause.
    pub fn matches(&self, feature: &Feature) -> bool {
        self.allowed.iter().all(|(attr, values)| {
            feature
                .attr(attr)
                .as_str()
                .is_some_and(|v| values.contains(v))
        })
    }
}

/// Source of filterable attributes and their known values.
///
/// Implemented by the retrieval engine over its feature store; tests use
/// in-memory maps.
pub trait FilterVocabulary {
    fn filter_attributes(&self) -> Result<Vec<String>>;
    fn attribute_values(&self, attribute: &str) -> Result<Vec<String>>;
}

/// Validate filter keys and values against the vocabulary.
pub fn validate(
    filter: &AttributeFilter,
    vocabulary: &dyn FilterVocabulary,
) -> Result<()> {
    let valid_attributes = vocabulary.filter_attributes()?;

    let invalid_keys: Vec<&str> = filter
        .keys()
        .filter(|k| !valid_attributes.contains(k))
        .map(String::as_str)
        .collect();
    if !invalid_keys.is_empty() {
        let mut sorted = valid_attributes.clone();
        sorted.sort();
        return Err(Error::InvalidFilterKeys {
            keys: invalid_keys.join(", "),
            valid: sorted.join("\n- "),
        });
    }

    for (attr, values) in filter {
        let valid_values = vocabulary.attribute_values(attr)?;
        let invalid: Vec<&str> = values
            .iter()
            .filter(|v| !valid_values.contains(v))
            .map(String::as_str)
            .collect();
        if invalid.is_empty() {
            continue;
        }

        let suggestions = invalid
            .iter()
            .map(|value| match closest_match(value, &valid_values) {
                Some(best) => format!("{value}: Did you mean {best}?"),
                None => format!("'{value}': No close matches found."),
            })
            .collect::<Vec<_>>()
            .join("\n- ");

        return Err(Error::InvalidFilterValues {
            attribute: attr.clone(),
            values: invalid.join(", "),
            suggestions,
        });
    }

    Ok(())
}

/// Case-insensitive nearest known value, if any is close enough.
fn closest_match<'a>(
    value: &str,
    valid_values: &'a [String],
) -> Option<&'a str> {
    let value_lower = value.to_lowercase();
    valid_values
        .iter()
        .map(|v| (strsim::jaro_winkler(&value_lower, &v.to_lowercase()), v))
        .filter(|(similarity, _)| *similarity >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| v.as_str())
}

/// LRU-bounded cache of compiled filters keyed by canonical signature.
///
/// Safe for concurrent use; a race merely recomputes an entry, which is
/// correctness-preserving. `validations` counts completed validation
/// passes, so tests can observe that repeat filters skip re-validation.
pub struct FilterCache {
    entries: Mutex<LruCache<Signature, Arc<CompiledFilter>>>,
    validations: AtomicUsize,
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY)
                    .expect("cache capacity is non-zero"),
            )),
            validations: AtomicUsize::new(0),
        }
    }

    /// Validate and compile `filter`, or return the cached compilation.
    pub fn get_or_construct(
        &self,
        filter: &AttributeFilter,
        vocabulary: &dyn FilterVocabulary,
    ) -> Result<Arc<CompiledFilter>> {
        let key = signature(filter);

        if let Some(compiled) = self.entries.lock().unwrap().get(&key) {
            return Ok(Arc::clone(compiled));
        }

        // Compute outside the lock; duplicate work on a race is harmless.
        validate(filter, vocabulary)?;
        self.validations.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(CompiledFilter::build(&key));

        self.entries
            .lock()
            .unwrap()
            .get_or_insert(key, || Arc::clone(&compiled));
        Ok(compiled)
    }

    /// How many validation passes have completed.
    pub fn validation_count(&self) -> usize {
        self.validations.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FilterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCache")
            .field("validations", &self.validation_count())
            .finish_non_exhaustive()
    }
}
