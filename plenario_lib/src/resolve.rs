//! Entity resolution: attributing free-text author names to known
//! legislators.
//!
//! Government sources supply legislator names with no stable join key, so
//! resolution runs a deterministic cascade that prefers cheap, precise
//! matches and only reaches similarity scoring when everything else has
//! failed. Each step is a [`MatchStrategy`], independently testable; the
//! resolver owns the ranked list and returns the first hit.
//!
//! The name index is built once per run from the stored legislators and is
//! read-only afterwards, so it can be shared across workers without locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ResolverConfig;

/// How a match was established. `Exact` is the only 100%-precision tier;
/// everything below it is heuristic and callers decide what to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    Exact,
    Partial,
    TokenPrefix,
    Fuzzy,
}

impl std::fmt::Display for MatchConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MatchConfidence::Exact => "exact",
            MatchConfidence::Partial => "partial",
            MatchConfidence::TokenPrefix => "token-prefix",
            MatchConfidence::Fuzzy => "fuzzy",
        })
    }
}

/// A successful resolution. Not persisted here; the caller decides whether
/// to accept a match below its confidence threshold.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub entity_id: i64,
    pub display_name: String,
    pub confidence: MatchConfidence,
    /// Similarity score in [0, 1]. Heuristic tiers report a fixed nominal
    /// value; `Fuzzy` reports the measured ratio.
    pub score: f64,
}

/// One legislator in the read-only name index.
#[derive(Debug, Clone)]
pub struct IndexedEntity {
    pub id: i64,
    pub display_name: String,
    pub normalized: String,
    pub author_code: Option<i64>,
}

/// Read-only lookup structure over known legislators.
pub struct NameIndex {
    entities: Vec<IndexedEntity>,
    by_code: HashMap<i64, usize>,
    by_name: HashMap<String, usize>,
}

impl NameIndex {
    /// Builds the index from `(id, display_name, author_code)` rows.
    pub fn build(rows: Vec<(i64, String, Option<i64>)>) -> Self {
        let mut entities = Vec::with_capacity(rows.len());
        let mut by_code = HashMap::new();
        let mut by_name = HashMap::new();

        for (id, display_name, author_code) in rows {
            let normalized = normalize_name(&display_name);
            if normalized.is_empty() {
                continue;
            }
            let idx = entities.len();
            if let Some(code) = author_code {
                by_code.insert(code, idx);
            }
            by_name.insert(normalized.clone(), idx);
            entities.push(IndexedEntity {
                id,
                display_name,
                normalized,
                author_code,
            });
        }

        Self {
            entities,
            by_code,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &IndexedEntity> {
        self.entities.iter()
    }

    fn resolved(&self, idx: usize, confidence: MatchConfidence, score: f64) -> ResolvedEntity {
        let e = &self.entities[idx];
        ResolvedEntity {
            entity_id: e.id,
            display_name: e.display_name.clone(),
            confidence,
            score,
        }
    }
}

/// The input to one resolution call, pre-normalized once.
pub struct ResolveQuery {
    pub normalized: String,
    pub tokens: Vec<String>,
    pub code: Option<i64>,
}

/// One step of the cascade.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, query: &ResolveQuery, index: &NameIndex) -> Option<ResolvedEntity>;
}

/// Step 1: exact lookup by the source's numeric author code.
struct CodeMatch;

impl MatchStrategy for CodeMatch {
    fn name(&self) -> &'static str {
        "code"
    }

    fn apply(&self, query: &ResolveQuery, index: &NameIndex) -> Option<ResolvedEntity> {
        let code = query.code?;
        let idx = *index.by_code.get(&code)?;
        Some(index.resolved(idx, MatchConfidence::Exact, 1.0))
    }
}

/// Step 2: exact normalized-name lookup.
struct ExactName;

impl MatchStrategy for ExactName {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn apply(&self, query: &ResolveQuery, index: &NameIndex) -> Option<ResolvedEntity> {
        if query.normalized.is_empty() {
            return None;
        }
        let idx = *index.by_name.get(&query.normalized)?;
        Some(index.resolved(idx, MatchConfidence::Exact, 1.0))
    }
}

/// Step 3: substring containment in either direction.
struct SubstringContainment;

impl MatchStrategy for SubstringContainment {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn apply(&self, query: &ResolveQuery, index: &NameIndex) -> Option<ResolvedEntity> {
        if query.normalized.len() < 3 {
            return None;
        }
        for (idx, entity) in index.iter().enumerate() {
            if entity.normalized.contains(&query.normalized)
                || query.normalized.contains(&entity.normalized)
            {
                return Some(index.resolved(idx, MatchConfidence::Partial, 0.9));
            }
        }
        None
    }
}

/// Step 4: token windows of length 1..=window starting at each position,
/// matched as substrings against known names.
struct TokenWindow {
    window: usize,
}

impl MatchStrategy for TokenWindow {
    fn name(&self) -> &'static str {
        "token-window"
    }

    fn apply(&self, query: &ResolveQuery, index: &NameIndex) -> Option<ResolvedEntity> {
        if query.tokens.len() < 2 {
            return None;
        }
        for start in 0..query.tokens.len() {
            for len in 1..=self.window {
                if start + len > query.tokens.len() {
                    break;
                }
                let window = query.tokens[start..start + len].join(" ");
                if window.len() < 3 {
                    continue;
                }
                for (idx, entity) in index.iter().enumerate() {
                    if entity.normalized.contains(&window) {
                        return Some(index.resolved(idx, MatchConfidence::TokenPrefix, 0.8));
                    }
                }
            }
        }
        None
    }
}

/// Step 5: best similarity ratio over the whole index, accepted only above
/// the configured threshold.
struct Similarity {
    threshold: f64,
}

impl MatchStrategy for Similarity {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn apply(&self, query: &ResolveQuery, index: &NameIndex) -> Option<ResolvedEntity> {
        if query.normalized.is_empty() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (idx, entity) in index.iter().enumerate() {
            let score = strsim::normalized_levenshtein(&query.normalized, &entity.normalized);
            if score > self.threshold && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, score)| index.resolved(idx, MatchConfidence::Fuzzy, score))
    }
}

/// Step 6, last resort: a known name starting with the query's first token.
struct FirstTokenPrefix;

impl MatchStrategy for FirstTokenPrefix {
    fn name(&self) -> &'static str {
        "first-token"
    }

    fn apply(&self, query: &ResolveQuery, index: &NameIndex) -> Option<ResolvedEntity> {
        let first = query.tokens.first()?;
        if first.len() < 3 {
            return None;
        }
        for (idx, entity) in index.iter().enumerate() {
            if entity.normalized.starts_with(first.as_str()) {
                return Some(index.resolved(idx, MatchConfidence::TokenPrefix, 0.5));
            }
        }
        None
    }
}

/// The resolver: a ranked cascade of strategies over a shared index.
pub struct EntityResolver {
    index: Arc<NameIndex>,
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl EntityResolver {
    pub fn new(index: Arc<NameIndex>, cfg: &ResolverConfig) -> Self {
        let strategies: Vec<Box<dyn MatchStrategy>> = vec![
            Box::new(CodeMatch),
            Box::new(ExactName),
            Box::new(SubstringContainment),
            Box::new(TokenWindow {
                window: cfg.token_window,
            }),
            Box::new(Similarity {
                threshold: cfg.fuzzy_threshold,
            }),
            Box::new(FirstTokenPrefix),
        ];
        Self { index, strategies }
    }

    /// Resolves a free-text name (and optional natural code) to a known
    /// legislator. `None` means no match, never an error.
    ///
    /// Bloc authors ("BANCADA ...") are collective, not individuals; they
    /// short-circuit before any strategy runs.
    pub fn resolve(&self, free_text_name: &str, natural_code: Option<i64>) -> Option<ResolvedEntity> {
        let trimmed = free_text_name.trim();
        if trimmed.is_empty() && natural_code.is_none() {
            return None;
        }
        if trimmed.to_uppercase().contains("BANCADA") {
            return None;
        }

        let normalized = normalize_name(trimmed);
        let tokens = normalized
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        let query = ResolveQuery {
            normalized,
            tokens,
            code: natural_code,
        };

        for strategy in &self.strategies {
            if let Some(hit) = strategy.apply(&query, &self.index) {
                tracing::debug!(
                    "resolved {:?} via {} -> {} ({:.2})",
                    trimmed,
                    strategy.name(),
                    hit.display_name,
                    hit.score
                );
                return Some(hit);
            }
        }
        tracing::debug!("no match for {:?}", trimmed);
        None
    }
}

/// Normalizes a name for matching: strips diacritics, keeps letters and
/// spaces, uppercases, and collapses whitespace.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.chars().map(fold_diacritic).collect();
    let kept: String = folded
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Folds the accented characters that occur in Portuguese names down to
/// their ASCII base.
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}
