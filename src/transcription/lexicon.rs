//! # Language Model and Lexicon
//!
//! Read-only after load and shared by reference across concurrent decodes.
//!
//! ## Scoring:
//! - **Symbol transitions**: bigram log-probabilities between consecutive
//!   emitted symbols, with a backoff floor for unseen pairs
//! - **Words**: scored when they complete (word boundary, punctuation,
//!   next word-start piece, or end of utterance). Word bigram if known,
//!   else backoff + unigram, else the bounded out-of-vocabulary penalty
//!
//! ## Lexicon:
//! Every word is spelled into symbols and stored in a prefix trie. The trie
//! tracks whether a partial hypothesis is still inside the vocabulary and,
//! in strict mode, restricts which symbols may extend it.

use crate::error::{EngineError, EngineResult};
use crate::transcription::symbols::{SymbolId, SymbolInventory, SymbolKind};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

pub type WordId = u32;
type NodeId = u32;

const ROOT: NodeId = 0;

/// Language model section of the model header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageModelSpec {
    /// Word unigram natural-log probabilities; the keys form the lexicon
    pub words: BTreeMap<String, f32>,
    /// Backoff weights applied when a bigram starting at this word is missing
    pub word_backoff: BTreeMap<String, f32>,
    pub word_bigrams: Vec<Bigram>,
    pub symbol_bigrams: Vec<Bigram>,
    /// Log-probability for symbol pairs absent from `symbol_bigrams`
    pub symbol_backoff: f32,
    /// Log-probability charged for a word outside the lexicon
    pub oov_penalty: f32,
}

impl Default for LanguageModelSpec {
    fn default() -> Self {
        Self {
            words: BTreeMap::new(),
            word_backoff: BTreeMap::new(),
            word_bigrams: Vec::new(),
            symbol_bigrams: Vec::new(),
            symbol_backoff: -8.0,
            oov_penalty: -10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bigram {
    pub prev: String,
    pub next: String,
    pub log_prob: f32,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: BTreeMap<SymbolId, NodeId>,
    word: Option<WordId>,
}

/// Prefix tree over word spellings.
#[derive(Debug, Clone)]
pub struct LexiconTrie {
    nodes: Vec<TrieNode>,
}

impl Default for LexiconTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl LexiconTrie {
    pub fn insert(&mut self, spelling: &[SymbolId], word: WordId) {
        let mut node = ROOT;
        for &symbol in spelling {
            node = match self.nodes[node as usize].children.get(&symbol) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len() as NodeId;
                    self.nodes.push(TrieNode::default());
                    self.nodes[node as usize].children.insert(symbol, child);
                    child
                }
            };
        }
        self.nodes[node as usize].word = Some(word);
    }

    fn child(&self, node: NodeId, symbol: SymbolId) -> Option<NodeId> {
        self.nodes[node as usize].children.get(&symbol).copied()
    }

    fn word_at(&self, node: NodeId) -> Option<WordId> {
        self.nodes[node as usize].word
    }

    fn children(&self, node: NodeId) -> impl Iterator<Item = SymbolId> + '_ {
        self.nodes[node as usize].children.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Position of the word currently being spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordCursor {
    /// Between words
    Root,
    /// Inside the lexicon trie
    Node(u32),
    /// The partial word left the lexicon
    OutOfVocabulary,
}

/// Per-hypothesis language model context. A pure function of the
/// hypothesis' symbol history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LmState {
    prev_word: Option<WordId>,
    cursor: WordCursor,
}

impl LmState {
    pub fn cursor(&self) -> WordCursor {
        self.cursor
    }

    pub fn prev_word(&self) -> Option<WordId> {
        self.prev_word
    }
}

/// Unweighted score change produced by one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LmDelta {
    pub log_prob: f32,
    pub words_completed: u32,
}

#[derive(Debug, Clone)]
pub struct LanguageModel {
    words: Vec<String>,
    word_ids: HashMap<String, WordId>,
    unigram: Vec<f32>,
    backoff: Vec<f32>,
    word_bigrams: HashMap<(WordId, WordId), f32>,
    symbol_bigrams: HashMap<(SymbolId, SymbolId), f32>,
    symbol_backoff: f32,
    oov_penalty: f32,
    trie: LexiconTrie,
    kinds: Vec<SymbolKind>,
    /// Every non-blank symbol, ascending
    open_candidates: Vec<SymbolId>,
    /// Non-blank symbols that are legal between words in strict mode
    separators: Vec<SymbolId>,
}

impl LanguageModel {
    pub fn new(spec: &LanguageModelSpec, symbols: &SymbolInventory) -> EngineResult<Self> {
        let invalid = |msg: String| EngineError::InvalidModel(format!("language model: {}", msg));

        if !spec.oov_penalty.is_finite() || spec.oov_penalty > 0.0 {
            return Err(invalid("oov_penalty must be a finite log-probability".into()));
        }
        if !spec.symbol_backoff.is_finite() || spec.symbol_backoff > 0.0 {
            return Err(invalid("symbol_backoff must be a finite log-probability".into()));
        }

        let mut words = Vec::with_capacity(spec.words.len());
        let mut word_ids = HashMap::with_capacity(spec.words.len());
        let mut unigram = Vec::with_capacity(spec.words.len());
        let mut trie = LexiconTrie::default();

        for (word, &log_prob) in &spec.words {
            if !log_prob.is_finite() {
                return Err(invalid(format!("unigram for '{}' is not finite", word)));
            }
            let Some(spelling) = symbols.spell(word) else {
                tracing::warn!(word = %word, "lexicon word cannot be spelled with the model's symbols, skipping");
                continue;
            };
            let id = words.len() as WordId;
            trie.insert(&spelling, id);
            word_ids.insert(word.clone(), id);
            words.push(word.clone());
            unigram.push(log_prob);
        }

        let mut backoff = vec![0.0; words.len()];
        for (word, &weight) in &spec.word_backoff {
            if let Some(&id) = word_ids.get(word) {
                backoff[id as usize] = weight;
            }
        }

        let mut word_bigrams = HashMap::with_capacity(spec.word_bigrams.len());
        for bigram in &spec.word_bigrams {
            if let (Some(&prev), Some(&next)) = (word_ids.get(&bigram.prev), word_ids.get(&bigram.next)) {
                word_bigrams.insert((prev, next), bigram.log_prob);
            }
        }

        let mut symbol_bigrams = HashMap::with_capacity(spec.symbol_bigrams.len());
        for bigram in &spec.symbol_bigrams {
            let prev = symbols
                .id_of(&bigram.prev)
                .ok_or_else(|| invalid(format!("unknown symbol '{}' in bigram", bigram.prev)))?;
            let next = symbols
                .id_of(&bigram.next)
                .ok_or_else(|| invalid(format!("unknown symbol '{}' in bigram", bigram.next)))?;
            symbol_bigrams.insert((prev, next), bigram.log_prob);
        }

        let kinds: Vec<SymbolKind> = symbols.iter().map(|(_, s)| s.kind).collect();
        let open_candidates: Vec<SymbolId> = symbols
            .iter()
            .filter(|(_, s)| s.kind != SymbolKind::Blank)
            .map(|(id, _)| id)
            .collect();
        let separators: Vec<SymbolId> = symbols
            .iter()
            .filter(|(_, s)| {
                matches!(
                    s.kind,
                    SymbolKind::WordBoundary | SymbolKind::Punctuation | SymbolKind::Silence
                )
            })
            .map(|(id, _)| id)
            .collect();

        Ok(Self {
            words,
            word_ids,
            unigram,
            backoff,
            word_bigrams,
            symbol_bigrams,
            symbol_backoff: spec.symbol_backoff,
            oov_penalty: spec.oov_penalty,
            trie,
            kinds,
            open_candidates,
            separators,
        })
    }

    pub fn initial_state(&self) -> LmState {
        LmState {
            prev_word: None,
            cursor: WordCursor::Root,
        }
    }

    pub fn lexicon_size(&self) -> usize {
        self.words.len()
    }

    pub fn word(&self, id: WordId) -> &str {
        &self.words[id as usize]
    }

    pub fn word_id(&self, word: &str) -> Option<WordId> {
        self.word_ids.get(word).copied()
    }

    /// Log-probability of emitting `next` right after `prev`.
    pub fn transition_score(&self, prev: Option<SymbolId>, next: SymbolId) -> f32 {
        if self.symbol_bigrams.is_empty() {
            return 0.0;
        }
        match prev {
            Some(prev) => self
                .symbol_bigrams
                .get(&(prev, next))
                .copied()
                .unwrap_or(self.symbol_backoff),
            None => 0.0,
        }
    }

    /// Log-probability of `word` following `prev`; `None` means out of vocabulary.
    ///
    /// Without a lexicon there is no word model and every word scores 0.
    pub fn word_score(&self, prev: Option<WordId>, word: Option<WordId>) -> f32 {
        if self.words.is_empty() {
            return 0.0;
        }
        let Some(word) = word else {
            return self.oov_penalty;
        };
        if let Some(prev) = prev {
            if let Some(&log_prob) = self.word_bigrams.get(&(prev, word)) {
                return log_prob;
            }
            return self.backoff[prev as usize] + self.unigram[word as usize];
        }
        self.unigram[word as usize]
    }

    /// Non-blank symbols that may extend a hypothesis in `state`.
    ///
    /// Open vocabulary allows every symbol. Strict mode only allows symbols
    /// that keep the partial word on a lexicon path, plus separators and new
    /// words once the current word is complete.
    pub fn expand(&self, state: &LmState, strict: bool) -> Cow<'_, [SymbolId]> {
        if !strict || self.words.is_empty() {
            return Cow::Borrowed(&self.open_candidates);
        }

        let mut candidates: Vec<SymbolId> = match state.cursor {
            WordCursor::Root => self.trie.children(ROOT).chain(self.separators.iter().copied()).collect(),
            WordCursor::Node(node) => {
                let mut next: Vec<SymbolId> = self.trie.children(node).collect();
                if self.trie.word_at(node).is_some() {
                    next.extend(self.separators.iter().copied());
                    next.extend(
                        self.trie
                            .children(ROOT)
                            .filter(|&s| self.kinds[s as usize] == SymbolKind::WordStart),
                    );
                } else {
                    next.extend(
                        self.separators
                            .iter()
                            .copied()
                            .filter(|&s| self.kinds[s as usize] == SymbolKind::Silence),
                    );
                }
                next
            }
            WordCursor::OutOfVocabulary => return Cow::Borrowed(&self.open_candidates),
        };
        candidates.sort_unstable();
        candidates.dedup();
        Cow::Owned(candidates)
    }

    /// Advance `state` by emitting `next` after `prev`.
    pub fn advance(&self, state: &LmState, prev: Option<SymbolId>, next: SymbolId) -> (LmState, LmDelta) {
        let mut state = *state;
        let mut delta = LmDelta::default();

        match self.kinds[next as usize] {
            SymbolKind::Blank | SymbolKind::Silence => return (state, delta),
            SymbolKind::WordBoundary | SymbolKind::Punctuation => {
                self.complete_word(&mut state, &mut delta);
            }
            SymbolKind::WordStart => {
                self.complete_word(&mut state, &mut delta);
                state.cursor = self.step(ROOT, next);
            }
            SymbolKind::Piece => {
                state.cursor = match state.cursor {
                    WordCursor::Root => self.step(ROOT, next),
                    WordCursor::Node(node) => self.step(node, next),
                    WordCursor::OutOfVocabulary => WordCursor::OutOfVocabulary,
                };
            }
        }

        delta.log_prob += self.transition_score(prev, next);
        (state, delta)
    }

    /// Close the trailing word at the end of the utterance.
    pub fn finish(&self, state: &LmState) -> LmDelta {
        let mut state = *state;
        let mut delta = LmDelta::default();
        self.complete_word(&mut state, &mut delta);
        delta
    }

    fn step(&self, node: NodeId, symbol: SymbolId) -> WordCursor {
        match self.trie.child(node, symbol) {
            Some(child) => WordCursor::Node(child),
            None => WordCursor::OutOfVocabulary,
        }
    }

    fn complete_word(&self, state: &mut LmState, delta: &mut LmDelta) {
        let word = match state.cursor {
            WordCursor::Root => return,
            WordCursor::Node(node) => self.trie.word_at(node),
            WordCursor::OutOfVocabulary => None,
        };
        delta.log_prob += self.word_score(state.prev_word, word);
        delta.words_completed += 1;
        state.prev_word = word;
        state.cursor = WordCursor::Root;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> SymbolInventory {
        let mut spellings = vec!["<blank>".to_string(), "|".to_string(), ".".to_string()];
        spellings.extend(('A'..='Z').map(|c| c.to_string()));
        SymbolInventory::new(&spellings).unwrap()
    }

    fn spec() -> LanguageModelSpec {
        let mut spec = LanguageModelSpec::default();
        spec.words.insert("THE".into(), -1.0);
        spec.words.insert("THEM".into(), -3.0);
        spec.words.insert("CLASS".into(), -4.0);
        spec.word_backoff.insert("THE".into(), -0.5);
        spec.word_bigrams.push(Bigram {
            prev: "THE".into(),
            next: "CLASS".into(),
            log_prob: -0.25,
        });
        spec
    }

    fn emit(lm: &LanguageModel, symbols: &SymbolInventory, text: &str) -> (LmState, f32) {
        let mut state = lm.initial_state();
        let mut total = 0.0;
        let mut prev = None;
        for c in text.chars() {
            let spelling = if c == ' ' { "|".to_string() } else { c.to_string() };
            let id = symbols.id_of(&spelling).unwrap();
            let (next, delta) = lm.advance(&state, prev, id);
            state = next;
            total += delta.log_prob;
            prev = Some(id);
        }
        (state, total)
    }

    #[test]
    fn test_word_scores() {
        let symbols = inventory();
        let lm = LanguageModel::new(&spec(), &symbols).unwrap();
        let the = lm.word_id("THE");
        let class = lm.word_id("CLASS");
        let them = lm.word_id("THEM");

        assert_eq!(lm.word_score(None, the), -1.0);
        assert_eq!(lm.word_score(the, class), -0.25);
        assert_eq!(lm.word_score(the, them), -0.5 + -3.0);
        assert_eq!(lm.word_score(the, None), -10.0);
    }

    #[test]
    fn test_advance_completes_words_at_boundaries() {
        let symbols = inventory();
        let lm = LanguageModel::new(&spec(), &symbols).unwrap();

        let (state, score) = emit(&lm, &symbols, "THE CLASS");
        assert_eq!(score, -1.0);
        let finish = lm.finish(&state);
        assert_eq!(finish.words_completed, 1);
        assert_eq!(finish.log_prob, -0.25);
    }

    #[test]
    fn test_out_of_vocabulary_penalty_is_bounded() {
        let symbols = inventory();
        let lm = LanguageModel::new(&spec(), &symbols).unwrap();

        let (state, _) = emit(&lm, &symbols, "QZX");
        assert_eq!(state.cursor(), WordCursor::OutOfVocabulary);
        assert_eq!(lm.finish(&state).log_prob, -10.0);

        // a proper prefix of a lexicon word is still out of vocabulary
        let (state, _) = emit(&lm, &symbols, "TH");
        assert_eq!(lm.finish(&state).log_prob, -10.0);
    }

    #[test]
    fn test_strict_expansion_follows_the_trie() {
        let symbols = inventory();
        let lm = LanguageModel::new(&spec(), &symbols).unwrap();
        let id = |s: &str| symbols.id_of(s).unwrap();

        let root = lm.expand(&lm.initial_state(), true);
        assert!(root.contains(&id("T")) && root.contains(&id("C")));
        assert!(!root.contains(&id("Q")));

        let (state, _) = emit(&lm, &symbols, "THE");
        let after_the = lm.expand(&state, true);
        assert!(after_the.contains(&id("M")));
        assert!(after_the.contains(&id("|")));
        assert!(after_the.contains(&id(".")));
        assert!(!after_the.contains(&id("A")));

        let (state, _) = emit(&lm, &symbols, "TH");
        assert!(!lm.expand(&state, true).contains(&id("|")));

        assert_eq!(lm.expand(&state, false).len(), symbols.len() - 1);
    }

    #[test]
    fn test_symbol_bigrams() {
        let symbols = inventory();
        let mut spec = spec();
        spec.symbol_bigrams.push(Bigram {
            prev: "T".into(),
            next: "H".into(),
            log_prob: -0.1,
        });
        let lm = LanguageModel::new(&spec, &symbols).unwrap();
        let id = |s: &str| symbols.id_of(s).unwrap();

        assert_eq!(lm.transition_score(Some(id("T")), id("H")), -0.1);
        assert_eq!(lm.transition_score(Some(id("H")), id("T")), -8.0);
        assert_eq!(lm.transition_score(None, id("T")), 0.0);

        spec.symbol_bigrams.push(Bigram {
            prev: "@".into(),
            next: "H".into(),
            log_prob: -0.1,
        });
        assert!(matches!(LanguageModel::new(&spec, &symbols), Err(EngineError::InvalidModel(_))));
    }

    #[test]
    fn test_unspellable_words_are_skipped() {
        let symbols = inventory();
        let mut spec = spec();
        spec.words.insert("naïve".into(), -2.0);
        let lm = LanguageModel::new(&spec, &symbols).unwrap();
        assert_eq!(lm.lexicon_size(), 3);
        assert!(lm.word_id("naïve").is_none());
    }
}
