use std::path::Path;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::{
        BooleanQuery,
        ConstScoreQuery,
        FuzzyTermQuery,
        Occur,
        PhraseQuery,
        Query,
        RegexQuery,
        TermQuery,
    },
    schema::*,
    tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer},
};

use crate::{
    error::Result,
    normalize::{punct_stripped_len, tokenize},
    phonetic,
};

/// Field names used in the schema.
pub mod fields {
    pub const GAZETTEER: &str = "gazetteer";
    pub const IDENTIFIER: &str = "identifier";
    pub const NAME: &str = "name";
    pub const NAME_RAW: &str = "name_raw";
    pub const PHONETIC: &str = "phonetic";
    pub const EXACT_LEN: &str = "exact_len";
}

/// Name of the tokenizer registered for the name and phonetic fields.
/// Lowercasing without stemming: stemming is built for prose and mangles
/// proper names ("Reading" must not become "read").
const NAME_TOKENIZER: &str = "name_simple";

/// Full-text index over alternate name strings.
///
/// One document per (name text, feature identifier) pair. Rebuilt wholesale
/// by the ingest step; there is no incremental-update contract. All query
/// operations return scores following the bm25() convention: lower (more
/// negative) is more relevant.
pub struct NameIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub gazetteer: Field,
    pub identifier: Field,
    pub name: Field,
    pub name_raw: Field,
    pub phonetic: Field,
    pub exact_len: Field,
}

/// A scored hit from the name index.
#[derive(Debug, Clone)]
pub struct NameMatch {
    /// Identifier of the feature this name refers to.
    pub identifier: String,
    /// Relevance; lower is more relevant.
    pub score: f32,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let gazetteer = builder.add_text_field(fields::GAZETTEER, STRING);
    let identifier = builder.add_text_field(fields::IDENTIFIER, STRING | STORED);

    let name_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(NAME_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let name = builder.add_text_field(fields::NAME, name_opts);

    // Lowercased raw string; carries exact equality, substring regexes and
    // the fuzzy edit-distance post-filter.
    let name_raw = builder.add_text_field(fields::NAME_RAW, STRING | STORED);

    let phonetic_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(NAME_TOKENIZER)
            .set_index_option(IndexRecordOption::Basic),
    );
    let phonetic = builder.add_text_field(fields::PHONETIC, phonetic_opts);

    let exact_len = builder.add_u64_field(fields::EXACT_LEN, INDEXED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        gazetteer,
        identifier,
        name,
        name_raw,
        phonetic,
        exact_len,
    };

    (schema, fields)
}

fn name_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build()
}

fn register_tokenizers(index: &Index) {
    index.tokenizers().register(NAME_TOKENIZER, name_analyzer());
}

/// Tokens of `text` as the index analyzer sees them.
fn analyzer_tokens(text: &str) -> Vec<String> {
    let mut analyzer = name_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push(token.text.clone());
    }
    tokens
}

/// Escape regex metacharacters for a literal substring pattern.
fn regex_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}'
                | '|' | '^' | '$'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Edit-distance budget for a fuzzy comparison against `text`.
fn edit_bound(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

impl NameIndex {
    /// Open or create a name index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Create an in-memory name index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Get the resolved field handles.
    pub fn fields(&self) -> SchemaFields {
        let f = |name: &str| {
            self.schema
                .get_field(name)
                .expect("field is defined by build_schema")
        };
        SchemaFields {
            gazetteer: f(fields::GAZETTEER),
            identifier: f(fields::IDENTIFIER),
            name: f(fields::NAME),
            name_raw: f(fields::NAME_RAW),
            phonetic: f(fields::PHONETIC),
            exact_len: f(fields::EXACT_LEN),
        }
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Add one alternate name referring to a feature.
    pub fn add_name(
        &self,
        writer: &IndexWriter,
        gazetteer: &str,
        identifier: &str,
        name: &str,
    ) -> Result<()> {
        let f = self.fields();
        let trimmed = name.trim();
        let lower = trimmed.to_lowercase();
        let tokens = tokenize(&lower);

        writer.add_document(doc!(
            f.gazetteer => gazetteer,
            f.identifier => identifier,
            f.name => trimmed,
            f.name_raw => lower.as_str(),
            f.phonetic => phonetic::encode_name(&tokens),
            f.exact_len => punct_stripped_len(trimmed),
        ))?;

        Ok(())
    }

    /// Delete all name entries belonging to a gazetteer.
    pub fn delete_gazetteer(&self, writer: &IndexWriter, gazetteer: &str) {
        let f = self.fields();
        let term = tantivy::Term::from_field_text(f.gazetteer, gazetteer);
        writer.delete_term(term);
    }

    // -- Match strategies --

    /// Case-insensitive whole-name equality.
    ///
    /// The query tokens must match as a contiguous phrase and the
    /// punctuation-stripped lengths must agree, so "Andorra" does not match
    /// "Andorra la Vella". Every hit is in the same (best) tier.
    pub fn search_exact(
        &self,
        gazetteer: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NameMatch>> {
        let f = self.fields();
        let tokens = analyzer_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let len_term =
            tantivy::Term::from_field_u64(f.exact_len, punct_stripped_len(query));
        let clauses = vec![
            (Occur::Must, self.phrase_clause(&tokens)),
            (
                Occur::Must,
                Box::new(TermQuery::new(len_term, IndexRecordOption::Basic))
                    as Box<dyn Query>,
            ),
        ];

        self.run_scoped(gazetteer, clauses, limit, None)
    }

    /// Contiguous quoted-phrase match with BM25-style relevance.
    pub fn search_phrase(
        &self,
        gazetteer: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NameMatch>> {
        let tokens = analyzer_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let clauses = vec![(Occur::Must, self.phrase_clause(&tokens))];
        self.run_scoped(gazetteer, clauses, limit, None)
    }

    /// Query characters appearing contiguously inside a name.
    ///
    /// Matching is a literal regex over the raw lowercased name.
    /// Containment is binary, so every hit carries the same score and
    /// rank-group selection keeps all of them as one tier.
    pub fn search_substring(
        &self,
        gazetteer: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NameMatch>> {
        let f = self.fields();
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!(".*{}.*", regex_escape(&needle));
        let regex = RegexQuery::from_pattern(&pattern, f.name_raw)?;

        let clauses: Vec<(Occur, Box<dyn Query>)> = vec![(
            Occur::Must,
            Box::new(ConstScoreQuery::new(Box::new(regex), 1.0)),
        )];

        self.run_scoped(gazetteer, clauses, limit, None)
    }

    /// Every query token must appear in the name, in any order.
    pub fn search_permuted(
        &self,
        gazetteer: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NameMatch>> {
        let f = self.fields();
        let tokens = analyzer_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let clauses = tokens
            .iter()
            .map(|t| {
                let term = tantivy::Term::from_field_text(f.name, t);
                (
                    Occur::Must,
                    Box::new(TermQuery::new(
                        term,
                        IndexRecordOption::WithFreqs,
                    )) as Box<dyn Query>,
                )
            })
            .collect();

        self.run_scoped(gazetteer, clauses, limit, None)
    }

    /// Any query token may appear; broadest recall, lowest precision.
    pub fn search_partial(
        &self,
        gazetteer: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NameMatch>> {
        let Some(any) = self.any_token_clause(&analyzer_tokens(query)) else {
            return Ok(Vec::new());
        };

        self.run_scoped(gazetteer, vec![(Occur::Must, any)], limit, None)
    }

    /// Approximate matching tolerant of misspellings.
    ///
    /// Candidates come from phonetic-code terms and bounded fuzzy term
    /// queries; a Levenshtein post-filter then discards hits beyond the
    /// edit-distance budget.
    pub fn search_fuzzy(
        &self,
        gazetteer: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NameMatch>> {
        let f = self.fields();
        let tokens = analyzer_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in &tokens {
            let code = phonetic::encode(token).to_lowercase();
            if !code.is_empty() {
                let term = tantivy::Term::from_field_text(f.phonetic, &code);
                candidates.push((
                    Occur::Should,
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                ));
            }
            if token.chars().count() >= 3 {
                let term = tantivy::Term::from_field_text(f.name, token);
                let distance = edit_bound(token).min(2) as u8;
                candidates.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(term, distance, true)),
                ));
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let clauses = vec![(
            Occur::Must,
            Box::new(BooleanQuery::new(candidates)) as Box<dyn Query>,
        )];
        let query_lower = query.trim().to_lowercase();
        self.run_scoped(
            gazetteer,
            clauses,
            limit,
            Some(&move |name_raw: &str| {
                within_edit_bound(&query_lower, name_raw)
            }),
        )
    }

    // -- Query plumbing --

    /// A phrase clause over tokens; a single token degrades to a term query.
    fn phrase_clause(&self, tokens: &[String]) -> Box<dyn Query> {
        let f = self.fields();
        if tokens.len() == 1 {
            let term = tantivy::Term::from_field_text(f.name, &tokens[0]);
            Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))
        } else {
            let terms = tokens
                .iter()
                .map(|t| tantivy::Term::from_field_text(f.name, t))
                .collect::<Vec<_>>();
            Box::new(PhraseQuery::new(terms))
        }
    }

    /// An OR-of-tokens scoring/matching clause, `None` when no tokens.
    fn any_token_clause(&self, tokens: &[String]) -> Option<Box<dyn Query>> {
        let f = self.fields();
        if tokens.is_empty() {
            return None;
        }
        let clauses = tokens
            .iter()
            .map(|t| {
                let term = tantivy::Term::from_field_text(f.name, t);
                (
                    Occur::Should,
                    Box::new(TermQuery::new(
                        term,
                        IndexRecordOption::WithFreqs,
                    )) as Box<dyn Query>,
                )
            })
            .collect::<Vec<_>>();
        Some(Box::new(BooleanQuery::new(clauses)))
    }

    /// Execute clauses restricted to one gazetteer and collect matches.
    ///
    /// Deduplicates by identifier keeping the best score; `post_filter`
    /// (when given) sees the raw lowercased name and can veto a hit.
    fn run_scoped(
        &self,
        gazetteer: &str,
        mut clauses: Vec<(Occur, Box<dyn Query>)>,
        limit: usize,
        post_filter: Option<&dyn Fn(&str) -> bool>,
    ) -> Result<Vec<NameMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        // Scoped with a zero-score clause: the gazetteer restriction must
        // never perturb the strategy's own relevance scores.
        let gaz_term = tantivy::Term::from_field_text(f.gazetteer, gazetteer);
        clauses.push((
            Occur::Must,
            Box::new(ConstScoreQuery::new(
                Box::new(TermQuery::new(gaz_term, IndexRecordOption::Basic)),
                0.0,
            )),
        ));
        let query = BooleanQuery::new(clauses);

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut seen = std::collections::HashSet::new();
        let mut matches = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(filter) = post_filter {
                let name_raw = doc
                    .get_first(f.name_raw)
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if !filter(name_raw) {
                    continue;
                }
            }
            let identifier = doc
                .get_first(f.identifier)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            if seen.insert(identifier.clone()) {
                matches.push(NameMatch {
                    identifier,
                    // bm25() convention: negate so lower = more relevant.
                    score: -score,
                });
            }
        }

        Ok(matches)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of name entries currently searchable for a gazetteer.
    pub fn count(&self, gazetteer: &str) -> Result<usize> {
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let term = tantivy::Term::from_field_text(f.gazetteer, gazetteer);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        Ok(searcher.search(&query, &tantivy::collector::Count)?)
    }
}

/// Whole-name or token-wise Levenshtein check for the fuzzy strategy.
fn within_edit_bound(query_lower: &str, name_raw: &str) -> bool {
    if strsim::levenshtein(query_lower, name_raw) <= edit_bound(query_lower) {
        return true;
    }
    // Multi-word names: a single-token query may target one word of the
    // name ("pari" -> "paris, texas").
    let query_tokens = tokenize(query_lower);
    let name_tokens = tokenize(name_raw);
    query_tokens.iter().all(|qt| {
        name_tokens
            .iter()
            .any(|nt| strsim::levenshtein(qt, nt) <= edit_bound(qt))
    })
}

impl std::fmt::Debug for NameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameIndex").finish_non_exhaustive()
    }
}
