//! In-memory hybrid index.
//!
//! Holds a small corpus in memory and answers hybrid queries: a lexical
//! term-overlap leg plus, for documents that carry vectors, a cosine
//! similarity leg. Both legs are min-max normalized and blended with a
//! fixed weight. Filters use the same predicate language the planner
//! emits for Azure AI Search, restricted to:
//!
//! ```text
//! expr  := term ("or" term)*
//! term  := factor ("and" factor)*
//! factor:= "not" factor | "(" expr ")" | search.in(field, 'a,b', ',')
//!        | field ("eq" | "ne") 'value'
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SearchIndex, SearchRequest};
use crate::core::SearchResult;
use crate::error::BackendError;

/// Weight of the vector leg in the blended score.
const VECTOR_WEIGHT: f64 = 0.5;

/// A document held by [`MemoryIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique key.
    pub id: String,
    /// Passage text.
    pub content: String,
    /// Source file.
    pub source_file: String,
    /// Page or chunk index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pages: Option<u32>,
    /// Filterable string fields, e.g. `category`.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Precomputed embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Document {
    /// Creates a document with no fields and no vector.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source_file: source_file.into(),
            source_pages: None,
            fields: BTreeMap::new(),
            vector: None,
        }
    }

    /// Adds a filterable field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the embedding.
    #[must_use]
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(self.id.as_str()),
            "source_file" => Some(self.source_file.as_str()),
            other => self.fields.get(other).map(String::as_str),
        }
    }
}

/// An in-memory [`SearchIndex`].
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    documents: Vec<Document>,
}

impl MemoryIndex {
    /// Creates an index over `documents`.
    #[must_use]
    pub const fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Loads documents from a JSON array file.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, BackendError> {
        let text = std::fs::read_to_string(path).map_err(|e| BackendError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        let documents = serde_json::from_str(&text).map_err(|e| BackendError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(Self::new(documents))
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` if the index holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns `true` if any document carries an embedding, so queries
    /// should be embedded too.
    #[must_use]
    pub fn has_vectors(&self) -> bool {
        self.documents.iter().any(|d| d.vector.is_some())
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, BackendError> {
        let predicate = request.filter.as_deref().map(Predicate::parse).transpose()?;
        let candidates: Vec<&Document> = self
            .documents
            .iter()
            .filter(|d| predicate.as_ref().is_none_or(|p| p.matches(d)))
            .collect();

        let terms = tokenize(&request.text);
        let lexical: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, d)| {
                let words: HashSet<String> = tokenize(&d.content).into_iter().collect();
                let hits = terms.iter().filter(|t| words.contains(*t)).count();
                (hits > 0).then(|| (i, f64::from(u32::try_from(hits).unwrap_or(u32::MAX))))
            })
            .collect();

        let mut semantic: Vec<(usize, f64)> = match &request.vector {
            Some(query) => candidates
                .iter()
                .enumerate()
                .filter_map(|(i, d)| {
                    d.vector
                        .as_ref()
                        .map(|v| (i, f64::from(cosine_similarity(query, v))))
                })
                .collect(),
            None => Vec::new(),
        };
        semantic.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        semantic.truncate(request.neighbor_count);

        let kw = normalize(&lexical);
        let vec = normalize(&semantic);
        let weight = if request.vector.is_some() {
            VECTOR_WEIGHT
        } else {
            0.0
        };

        let mut scored: Vec<(usize, f64)> = kw
            .keys()
            .chain(vec.keys())
            .copied()
            .collect::<HashSet<usize>>()
            .into_iter()
            .map(|i| {
                let k = kw.get(&i).copied().unwrap_or(0.0);
                let v = vec.get(&i).copied().unwrap_or(0.0);
                (i, (1.0 - weight).mul_add(k, weight * v))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(request.top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let d = candidates[i];
                let mut result =
                    SearchResult::new(&d.id, &d.content, &d.source_file).with_score(score);
                result.source_pages = d.source_pages;
                result
            })
            .collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Min-max normalizes scores to `[0, 1]`; a single distinct score maps to 1.
fn normalize(scores: &[(usize, f64)]) -> HashMap<usize, f64> {
    let min = scores.iter().map(|s| s.1).fold(f64::INFINITY, f64::min);
    let max = scores.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);
    scores
        .iter()
        .map(|&(i, s)| {
            let norm = if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - min) / (max - min)
            };
            (i, norm)
        })
        .collect()
}

/// Cosine similarity; `0.0` for empty or mismatched vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Str(String),
    Word(String),
}

fn unsupported(filter: &str) -> BackendError {
    BackendError::UnsupportedFilter {
        predicate: filter.to_string(),
    }
}

fn lex(filter: &str) -> Result<Vec<Token>, BackendError> {
    let mut tokens = Vec::new();
    let mut chars = filter.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            s.push('\'');
                        }
                        Some('\'') => break,
                        Some(ch) => s.push(ch),
                        None => return Err(unsupported(filter)),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '/' => {
                let mut w = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '/' {
                        w.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(w));
            }
            _ => return Err(unsupported(filter)),
        }
    }
    Ok(tokens)
}

/// A parsed filter predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Eq(String, String),
    Ne(String, String),
    In(String, Vec<String>),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek_word(&self, word: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w.eq_ignore_ascii_case(word))
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, token: &Token) -> Result<(), BackendError> {
        if self.next().as_ref() == Some(token) {
            Ok(())
        } else {
            Err(unsupported(self.source))
        }
    }

    fn string(&mut self) -> Result<String, BackendError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(unsupported(self.source)),
        }
    }

    fn expr(&mut self) -> Result<Predicate, BackendError> {
        let mut terms = vec![self.term()?];
        while self.peek_word("or") {
            self.pos += 1;
            terms.push(self.term()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Predicate::Or(terms)
        })
    }

    fn term(&mut self) -> Result<Predicate, BackendError> {
        let mut factors = vec![self.factor()?];
        while self.peek_word("and") {
            self.pos += 1;
            factors.push(self.factor()?);
        }
        Ok(if factors.len() == 1 {
            factors.remove(0)
        } else {
            Predicate::And(factors)
        })
    }

    fn factor(&mut self) -> Result<Predicate, BackendError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("not") => {
                Ok(Predicate::Not(Box::new(self.factor()?)))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("search.in") => {
                self.expect(&Token::LParen)?;
                let field = match self.next() {
                    Some(Token::Word(f)) => f,
                    _ => return Err(unsupported(self.source)),
                };
                self.expect(&Token::Comma)?;
                let list = self.string()?;
                let delims = if matches!(self.tokens.get(self.pos), Some(Token::Comma)) {
                    self.pos += 1;
                    self.string()?
                } else {
                    " ,".to_string()
                };
                self.expect(&Token::RParen)?;
                let values = list
                    .split(|c| delims.contains(c))
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(Predicate::In(field, values))
            }
            Some(Token::Word(field)) => {
                let op = match self.next() {
                    Some(Token::Word(op)) => op.to_ascii_lowercase(),
                    _ => return Err(unsupported(self.source)),
                };
                let value = self.string()?;
                match op.as_str() {
                    "eq" => Ok(Predicate::Eq(field, value)),
                    "ne" => Ok(Predicate::Ne(field, value)),
                    _ => Err(unsupported(self.source)),
                }
            }
            _ => Err(unsupported(self.source)),
        }
    }
}

impl Predicate {
    fn parse(filter: &str) -> Result<Self, BackendError> {
        let mut parser = Parser {
            tokens: lex(filter)?,
            pos: 0,
            source: filter,
        };
        let predicate = parser.expr()?;
        if parser.pos == parser.tokens.len() {
            Ok(predicate)
        } else {
            Err(unsupported(filter))
        }
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq(f, v) => doc.field(f) == Some(v.as_str()),
            Self::Ne(f, v) => doc.field(f) != Some(v.as_str()),
            Self::In(f, values) => doc.field(f).is_some_and(|x| values.iter().any(|v| v == x)),
            Self::Not(p) => !p.matches(doc),
            Self::And(ps) => ps.iter().all(|p| p.matches(doc)),
            Self::Or(ps) => ps.iter().any(|p| p.matches(doc)),
        }
    }
}
