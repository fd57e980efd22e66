//! gazetteer - a retrieval engine for named geographic features.
//!
//! gazetteer loads feature records into a [redb](https://github.com/cberner/redb)
//! feature store and a [Tantivy](https://github.com/quickwit-oss/tantivy) name
//! index, then answers name queries under six match strategies (exact,
//! phrase, substring, permuted, partial, fuzzy) with rank-group selection
//! and validated attribute filters.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gazetteer::{
//!     DataDir, FeatureStore, Gazetteer, MatchMethod, NameIndex,
//!     SearchOptions,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let store = Arc::new(FeatureStore::open(data_dir.features_db()).unwrap());
//! let index = Arc::new(NameIndex::open(data_dir.index_dir()).unwrap());
//!
//! let engine = Gazetteer::new("geonames", store, index);
//! let results = engine
//!     .search("Paris", MatchMethod::Fuzzy, &SearchOptions::default())
//!     .unwrap();
//! for feature in &results {
//!     println!("{feature}");
//! }
//! ```

pub mod cli;
pub mod data_dir;
pub mod engine;
pub mod error;
pub mod feature;
pub mod feature_store;
pub mod filter;
pub mod ingest;
pub mod method;
pub mod name_index;
pub mod normalize;
pub mod phonetic;
pub mod rank;

pub use data_dir::DataDir;
pub use engine::{Gazetteer, SearchOptions};
pub use error::{Error, Result};
pub use feature::{AttrValue, Feature};
pub use feature_store::FeatureStore;
pub use filter::AttributeFilter;
pub use ingest::FeatureRecord;
pub use method::MatchMethod;
pub use name_index::NameIndex;
