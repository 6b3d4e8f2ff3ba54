//! # Symbol Inventory
//!
//! The fixed, model-defined set of units the acoustic scorer emits one
//! log-probability for on every frame. Each symbol's role is derived from
//! its spelling:
//!
//! | spelling | kind |
//! |---|---|
//! | `<blank>`, `<pad>`, `<b>` | CTC blank (exactly one required) |
//! | `\|`, `<space>`, a lone `▁` | word boundary |
//! | `▁the` | word-initial sub-word piece |
//! | `<sil>`, `<noise>`, any other `<...>` | silence/noise, dropped from output |
//! | `.`, `,`, `?`, ... | punctuation, attached to the previous word |
//! | anything else | word-internal piece (characters, sub-words, `'`) |

use crate::error::{EngineError, EngineResult};
use std::collections::HashMap;

/// Index into the inventory; also the column of the score matrix.
pub type SymbolId = u32;

/// Marker SentencePiece-style vocabularies put in front of word-initial pieces.
pub const WORD_START_MARKER: char = '\u{2581}';

const BLANK_SPELLINGS: &[&str] = &["<blank>", "<pad>", "<b>"];
const BOUNDARY_SPELLINGS: &[&str] = &["|", "<space>"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Blank,
    WordBoundary,
    WordStart,
    Piece,
    Punctuation,
    Silence,
}

impl SymbolKind {
    fn classify(text: &str) -> Self {
        if BLANK_SPELLINGS.contains(&text) {
            SymbolKind::Blank
        } else if BOUNDARY_SPELLINGS.contains(&text) || text.strip_prefix(WORD_START_MARKER) == Some("") {
            SymbolKind::WordBoundary
        } else if text.starts_with('<') && text.ends_with('>') && text.len() > 2 {
            SymbolKind::Silence
        } else if text.starts_with(WORD_START_MARKER) && text.chars().count() > 1 {
            SymbolKind::WordStart
        } else if text.chars().all(|c| c.is_ascii_punctuation() && c != '\'') {
            SymbolKind::Punctuation
        } else {
            SymbolKind::Piece
        }
    }

    /// Symbols that can be part of a word's spelling.
    pub fn is_word_piece(self) -> bool {
        matches!(self, SymbolKind::WordStart | SymbolKind::Piece)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub text: String,
    pub kind: SymbolKind,
}

impl Symbol {
    /// Text contributed to the transcript (word-start marker removed).
    pub fn surface(&self) -> &str {
        match self.kind {
            SymbolKind::WordStart => self.text.trim_start_matches(WORD_START_MARKER),
            _ => &self.text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolInventory {
    symbols: Vec<Symbol>,
    by_text: HashMap<String, SymbolId>,
    blank: SymbolId,
    word_boundary: Option<SymbolId>,
    max_piece_chars: usize,
}

impl SymbolInventory {
    pub fn new<S: AsRef<str>>(spellings: &[S]) -> EngineResult<Self> {
        if spellings.is_empty() {
            return Err(EngineError::InvalidModel("symbol inventory is empty".into()));
        }

        let mut symbols = Vec::with_capacity(spellings.len());
        let mut by_text = HashMap::with_capacity(spellings.len());
        let mut blank = None;
        let mut word_boundary = None;
        let mut max_piece_chars = 0;

        for (index, spelling) in spellings.iter().enumerate() {
            let text = spelling.as_ref();
            if text.is_empty() {
                return Err(EngineError::InvalidModel(format!("symbol {} is empty", index)));
            }
            let id = index as SymbolId;
            if by_text.insert(text.to_string(), id).is_some() {
                return Err(EngineError::InvalidModel(format!("duplicate symbol '{}'", text)));
            }

            let kind = SymbolKind::classify(text);
            match kind {
                SymbolKind::Blank => {
                    if blank.replace(id).is_some() {
                        return Err(EngineError::InvalidModel(
                            "symbol inventory defines more than one blank".into(),
                        ));
                    }
                }
                SymbolKind::WordBoundary => {
                    word_boundary.get_or_insert(id);
                }
                SymbolKind::WordStart | SymbolKind::Piece => {
                    let symbol_chars = text.trim_start_matches(WORD_START_MARKER).chars().count();
                    max_piece_chars = max_piece_chars.max(symbol_chars);
                }
                _ => {}
            }

            symbols.push(Symbol {
                text: text.to_string(),
                kind,
            });
        }

        let blank = blank.ok_or_else(|| {
            EngineError::InvalidModel("symbol inventory has no blank symbol".into())
        })?;

        Ok(Self {
            symbols,
            by_text,
            blank,
            word_boundary,
            max_piece_chars,
        })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn blank(&self) -> SymbolId {
        self.blank
    }

    pub fn word_boundary(&self) -> Option<SymbolId> {
        self.word_boundary
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id as usize]
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.symbols[id as usize].kind
    }

    pub fn id_of(&self, text: &str) -> Option<SymbolId> {
        self.by_text.get(text).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| (index as SymbolId, symbol))
    }

    /// Spell `word` as a sequence of word pieces by greedy longest match.
    ///
    /// The first piece may be a `▁`-prefixed word-start piece. Returns
    /// `None` when some part of the word has no matching symbol.
    pub fn spell(&self, word: &str) -> Option<Vec<SymbolId>> {
        let chars: Vec<char> = word.chars().collect();
        if chars.is_empty() {
            return None;
        }

        let mut spelling = Vec::new();
        let mut pos = 0;
        while pos < chars.len() {
            let longest = self.max_piece_chars.min(chars.len() - pos);
            let mut matched = None;

            for len in (1..=longest).rev() {
                let candidate: String = chars[pos..pos + len].iter().collect();
                if pos == 0 {
                    let marked = format!("{}{}", WORD_START_MARKER, candidate);
                    if let Some(id) = self.piece(&marked, SymbolKind::WordStart) {
                        matched = Some((id, len));
                        break;
                    }
                }
                if let Some(id) = self.piece(&candidate, SymbolKind::Piece) {
                    matched = Some((id, len));
                    break;
                }
            }

            let (id, len) = matched?;
            spelling.push(id);
            pos += len;
        }
        Some(spelling)
    }

    fn piece(&self, text: &str, kind: SymbolKind) -> Option<SymbolId> {
        self.id_of(text).filter(|&id| self.kind(id) == kind)
    }
}
