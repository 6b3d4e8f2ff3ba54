//! # Beam Search Decoder
//!
//! CTC prefix beam search over the acoustic score matrix, combined with the
//! language model. Each hypothesis is a collapsed symbol prefix carrying two
//! acoustic path scores: paths ending in blank and paths ending in the
//! prefix's last symbol. Keeping both is what lets `A <blank> A` yield two
//! `A`s while `A A` yields one.
//!
//! ## Per frame:
//! 1. Every hypothesis continues with blank and with a repeat of its last symbol
//! 2. Every hypothesis is extended by each symbol the language model allows
//!    and the acoustic margin does not prune
//! 3. Paths reaching the same prefix are merged with log-add-exp
//! 4. The best `beam_width` hypotheses survive
//!
//! Ordering is total (score, then longer history, then smaller symbol ids)
//! so identical inputs always produce identical output.

use crate::config::DecoderConfig;
use crate::error::{EngineError, EngineResult};
use crate::transcription::acoustic::ScoreMatrix;
use crate::transcription::lexicon::{LanguageModel, LmState};
use crate::transcription::symbols::{SymbolId, SymbolInventory};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// Numerically stable `ln(exp(a) + exp(b))`.
#[inline]
pub fn log_add_exp(a: f32, b: f32) -> f32 {
    if a == f32::NEG_INFINITY {
        return b;
    }
    if b == f32::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + (-(a - b).abs()).exp().ln_1p()
}

#[derive(Debug, Clone)]
pub struct Hypothesis {
    labels: Vec<SymbolId>,
    p_blank: f32,
    p_label: f32,
    lm_state: LmState,
    lm_score: f32,
}

impl Hypothesis {
    fn root(lm_state: LmState) -> Self {
        Self {
            labels: Vec::new(),
            p_blank: 0.0,
            p_label: f32::NEG_INFINITY,
            lm_state,
            lm_score: 0.0,
        }
    }

    /// Same prefix, no acoustic mass yet.
    fn continuation(&self) -> Self {
        Self {
            labels: self.labels.clone(),
            p_blank: f32::NEG_INFINITY,
            p_label: f32::NEG_INFINITY,
            lm_state: self.lm_state,
            lm_score: self.lm_score,
        }
    }

    pub fn labels(&self) -> &[SymbolId] {
        &self.labels
    }

    pub fn acoustic_score(&self) -> f32 {
        log_add_exp(self.p_blank, self.p_label)
    }

    pub fn lm_score(&self) -> f32 {
        self.lm_score
    }

    pub fn score(&self) -> f32 {
        self.acoustic_score() + self.lm_score
    }

    fn last(&self) -> Option<SymbolId> {
        self.labels.last().copied()
    }
}

/// Total order used for pruning and final selection; greater is better.
fn rank(a_score: f32, a: &[SymbolId], b_score: f32, b: &[SymbolId]) -> Ordering {
    a_score
        .total_cmp(&b_score)
        .then_with(|| a.len().cmp(&b.len()))
        .then_with(|| b.cmp(a))
}

struct Ranked(Hypothesis);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        rank(self.0.score(), &self.0.labels, other.0.score(), &other.0.labels)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Best path found for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutput {
    pub symbols: Vec<SymbolId>,
    /// Acoustic plus weighted language model score
    pub score: f32,
    pub acoustic_score: f32,
    pub lm_score: f32,
}

pub struct BeamSearchDecoder<'a> {
    config: &'a DecoderConfig,
    lm: &'a LanguageModel,
    symbols: &'a SymbolInventory,
}

impl<'a> BeamSearchDecoder<'a> {
    pub fn new(config: &'a DecoderConfig, lm: &'a LanguageModel, symbols: &'a SymbolInventory) -> Self {
        Self { config, lm, symbols }
    }

    /// Search for the best symbol sequence.
    ///
    /// ## Returns:
    /// - **Ok(DecodeOutput)**: highest scoring complete hypothesis
    /// - **Err(ModelInferenceError)**: score matrix width differs from the inventory
    /// - **Err(DecodingFailure)**: no frames, or every hypothesis was pruned
    pub fn decode(&self, scores: &ScoreMatrix) -> EngineResult<DecodeOutput> {
        if scores.n_symbols() != self.symbols.len() {
            return Err(EngineError::ModelInferenceError(format!(
                "score matrix has {} columns but the model defines {} symbols",
                scores.n_symbols(),
                self.symbols.len()
            )));
        }
        if scores.n_frames() == 0 {
            return Err(EngineError::DecodingFailure("no frames to decode".into()));
        }

        let blank = self.symbols.blank() as usize;
        let margin = self.config.symbol_prune_margin;
        let mut beam = vec![Hypothesis::root(self.lm.initial_state())];

        for t in 0..scores.n_frames() {
            let row = scores.row(t);
            let frame_best = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let threshold = frame_best - margin;

            let mut next: HashMap<Vec<SymbolId>, Hypothesis> = HashMap::with_capacity(beam.len() * 4);

            for hyp in &beam {
                let total = hyp.acoustic_score();
                let last = hyp.last();

                let stay = next.entry(hyp.labels.clone()).or_insert_with(|| hyp.continuation());
                stay.p_blank = log_add_exp(stay.p_blank, total + row[blank]);
                if let Some(last) = last {
                    stay.p_label = log_add_exp(stay.p_label, hyp.p_label + row[last as usize]);
                }

                for &symbol in self.lm.expand(&hyp.lm_state, self.config.strict_lexicon).iter() {
                    let log_prob = row[symbol as usize];
                    if !(log_prob >= threshold) {
                        continue;
                    }
                    // a repeated symbol only starts a new label after a blank
                    let base = if Some(symbol) == last { hyp.p_blank } else { total };
                    if base == f32::NEG_INFINITY {
                        continue;
                    }

                    let mut labels = Vec::with_capacity(hyp.labels.len() + 1);
                    labels.extend_from_slice(&hyp.labels);
                    labels.push(symbol);

                    let extended = next.entry(labels).or_insert_with_key(|labels| {
                        let (lm_state, delta) = self.lm.advance(&hyp.lm_state, last, symbol);
                        Hypothesis {
                            labels: labels.clone(),
                            p_blank: f32::NEG_INFINITY,
                            p_label: f32::NEG_INFINITY,
                            lm_state,
                            lm_score: hyp.lm_score
                                + self.config.lm_weight * delta.log_prob
                                + self.config.word_insertion_bonus * delta.words_completed as f32,
                        }
                    });
                    extended.p_label = log_add_exp(extended.p_label, base + log_prob);
                }
            }

            beam = self.prune(next.into_values());
            if beam.is_empty() {
                return Err(EngineError::DecodingFailure(format!(
                    "every hypothesis was pruned at frame {}",
                    t
                )));
            }
        }

        self.finish(beam)
    }

    /// Keep the `beam_width` best finite hypotheses, best first.
    fn prune(&self, candidates: impl Iterator<Item = Hypothesis>) -> Vec<Hypothesis> {
        let width = self.config.beam_width.max(1);
        let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(width + 1);

        for hyp in candidates {
            if !hyp.score().is_finite() {
                continue;
            }
            heap.push(Reverse(Ranked(hyp)));
            if heap.len() > width {
                heap.pop();
            }
        }

        heap.into_sorted_vec().into_iter().map(|Reverse(Ranked(hyp))| hyp).collect()
    }

    fn finish(&self, beam: Vec<Hypothesis>) -> EngineResult<DecodeOutput> {
        let mut best: Option<DecodeOutput> = None;

        for hyp in beam {
            let delta = self.lm.finish(&hyp.lm_state);
            let lm_score = hyp.lm_score
                + self.config.lm_weight * delta.log_prob
                + self.config.word_insertion_bonus * delta.words_completed as f32;
            let acoustic_score = hyp.acoustic_score();
            let score = acoustic_score + lm_score;
            if !score.is_finite() {
                continue;
            }

            let better = match &best {
                None => true,
                Some(current) => rank(score, &hyp.labels, current.score, &current.symbols) == Ordering::Greater,
            };
            if better {
                best = Some(DecodeOutput {
                    symbols: hyp.labels,
                    score,
                    acoustic_score,
                    lm_score,
                });
            }
        }

        best.ok_or_else(|| EngineError::DecodingFailure("no finite hypothesis at end of utterance".into()))
    }
}
