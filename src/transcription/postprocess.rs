//! # Transcript Post-Processing
//!
//! Turns the decoder's symbol sequence into display text: drops blank and
//! silence symbols, joins pieces into words, places single spaces between
//! words and applies the model's casing convention.

use crate::transcription::symbols::{SymbolId, SymbolInventory, SymbolKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Casing {
    #[default]
    Upper,
    Lower,
    /// Lowercase with the first letter of each sentence capitalized
    Sentence,
    /// Symbols are emitted exactly as spelled in the inventory
    Preserve,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub casing: Casing,
}

#[derive(Debug, Clone)]
pub struct TranscriptRenderer {
    casing: Casing,
}

impl TranscriptRenderer {
    pub fn new(config: &PostProcessConfig) -> Self {
        Self { casing: config.casing }
    }

    pub fn render(&self, symbols: &[SymbolId], inventory: &SymbolInventory) -> String {
        let mut words: Vec<String> = Vec::new();
        let mut current = String::new();

        for &id in symbols {
            let symbol = inventory.symbol(id);
            match symbol.kind {
                SymbolKind::Blank | SymbolKind::Silence => {}
                SymbolKind::WordBoundary => flush(&mut words, &mut current),
                SymbolKind::WordStart => {
                    flush(&mut words, &mut current);
                    current.push_str(symbol.surface());
                }
                SymbolKind::Piece => current.push_str(symbol.surface()),
                SymbolKind::Punctuation => {
                    if current.is_empty() {
                        match words.last_mut() {
                            Some(previous) => previous.push_str(symbol.surface()),
                            None => current.push_str(symbol.surface()),
                        }
                    } else {
                        current.push_str(symbol.surface());
                    }
                }
            }
        }
        flush(&mut words, &mut current);

        apply_casing(&words.join(" "), self.casing)
    }
}

fn flush(words: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

fn apply_casing(text: &str, casing: Casing) -> String {
    match casing {
        Casing::Upper => text.to_uppercase(),
        Casing::Lower => text.to_lowercase(),
        Casing::Preserve => text.to_string(),
        Casing::Sentence => {
            let lower = text.to_lowercase();
            let mut out = String::with_capacity(lower.len());
            let mut capitalize = true;
            for (i, c) in lower.char_indices() {
                if capitalize && c.is_alphabetic() {
                    out.extend(c.to_uppercase());
                    capitalize = false;
                    continue;
                }
                if c == 'i' && is_standalone(&lower, i) {
                    out.push('I');
                    continue;
                }
                if matches!(c, '.' | '!' | '?') {
                    capitalize = true;
                }
                out.push(c);
            }
            out
        }
    }
}

/// Whether the char starting at byte `index` forms a word of its own.
fn is_standalone(text: &str, index: usize) -> bool {
    let joins = |c: char| c.is_alphanumeric() || c == '\'';
    let before = text[..index].chars().next_back().map_or(true, |c| !joins(c));
    let after = text[index..].chars().nth(1).map_or(true, |c| !joins(c));
    before && after
}
