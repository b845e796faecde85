//! Approximate parsing that keeps a bounded beam of partial trees per span.
//!
//! Each cell holds at most `beam_size` partial trees of any root symbol, so a
//! cell answers "the best candidates for this span" rather than "every symbol
//! that can derive it". Results are approximate once any cell overflows.

use std::cmp::Ordering;

use crate::distribution::ProductionDistribution;
use crate::error::ChartError;
use crate::grammar::Grammar;
use crate::heap::BoundedHeap;
use crate::parser::{CkyParser, RootPrior};
use crate::rules::{BinaryProduction, TerminalProduction};
use crate::semiring::Semiring;
use crate::symbols::Production;
use crate::tree::ParseTree;

/// A partial tree in a beam. Binary entries point at their subtrees by
/// position in the child cells' beams.
#[derive(Debug, Clone, PartialEq)]
pub enum BeamEntry<S> {
  Terminal {
    rule: TerminalProduction,
    rule_weight: S,
  },
  Binary {
    rule: BinaryProduction,
    rule_weight: S,
    /// Absolute index of the left subtree's last terminal
    split: usize,
    left: usize,
    right: usize,
  },
}

impl<S> BeamEntry<S> {
  pub fn root(&self) -> Production {
    match self {
      Self::Terminal { rule, .. } => rule.parent,
      Self::Binary { rule, .. } => rule.parent,
    }
  }
}

#[derive(Debug, Clone)]
pub struct BeamSearchChart<S> {
  len: usize,
  beam_size: usize,
  cells: Vec<BoundedHeap<BeamEntry<S>, S>>,
  truncated: bool,
}

impl<S: Semiring> BeamSearchChart<S> {
  pub fn new(len: usize, beam_size: usize) -> Self {
    assert!(beam_size > 0, "beam size must be positive");
    Self {
      len,
      beam_size,
      cells: (0..len * len).map(|_| BoundedHeap::new(beam_size)).collect(),
      truncated: false,
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn beam_size(&self) -> usize {
    self.beam_size
  }

  /// True only if no candidate was ever dropped for lack of room, in which
  /// case the beam holds every derivation
  pub fn is_exact(&self) -> bool {
    !self.truncated
  }

  /// Number of partial trees kept for a span
  pub fn num_entries(&self, span_start: usize, span_end: usize) -> Result<usize, ChartError> {
    self.check_span(span_start, span_end)?;
    Ok(self.cell(span_start, span_end).len())
  }

  /// Entries for a span in beam position order, with their weights
  pub fn entries(
    &self,
    span_start: usize,
    span_end: usize,
  ) -> Result<impl Iterator<Item = (&BeamEntry<S>, S)> + '_, ChartError> {
    self.check_span(span_start, span_end)?;
    Ok(self.cell(span_start, span_end).iter())
  }

  /// Rebuilds the partial tree at `idx` in a span's beam, or `None` past the
  /// end of the beam
  pub fn tree(&self, span_start: usize, span_end: usize, idx: usize) -> Result<Option<ParseTree<S>>, ChartError> {
    self.check_span(span_start, span_end)?;
    Ok(self.tree_unchecked(span_start, span_end, idx))
  }

  /// Every tree over the whole input, root weights scaled by `prior`, best
  /// first. Trees whose root the prior rules out are dropped.
  pub fn trees(&self, prior: &RootPrior) -> Vec<ParseTree<S>> {
    if self.is_empty() {
      return Vec::new();
    }
    let root = self.len - 1;
    let mut trees = (0..self.cell(0, root).len())
      .filter_map(|idx| self.tree_unchecked(0, root, idx))
      .map(|tree| {
        let w = prior.weight::<S>(tree.root());
        tree.multiply(w)
      })
      .filter(|tree| !tree.weight().is_zero())
      .collect::<Vec<_>>();
    trees.sort_by(|a, b| b.weight().partial_cmp(&a.weight()).unwrap_or(Ordering::Equal));
    trees
  }

  fn offer(&mut self, span_start: usize, span_end: usize, entry: impl FnOnce() -> BeamEntry<S>, weight: S) {
    if weight.is_zero() {
      return;
    }
    let len = self.len;
    let cell = &mut self.cells[span_start * len + span_end];
    if cell.is_full() {
      self.truncated = true;
    }
    if cell.accepts(weight) {
      cell.offer(entry(), weight);
    }
  }

  fn tree_unchecked(&self, span_start: usize, span_end: usize, idx: usize) -> Option<ParseTree<S>> {
    let (entry, _) = self.cell(span_start, span_end).get(idx)?;
    match entry {
      BeamEntry::Terminal { rule, rule_weight } => Some(ParseTree::leaf(rule, *rule_weight, span_start, span_end)),
      BeamEntry::Binary {
        rule,
        rule_weight,
        split,
        left,
        right,
      } => {
        let left = self.tree_unchecked(span_start, *split, *left)?;
        let right = self.tree_unchecked(split + 1, span_end, *right)?;
        Some(ParseTree::node(rule, *rule_weight, left, right))
      }
    }
  }

  fn check_span(&self, span_start: usize, span_end: usize) -> Result<(), ChartError> {
    if span_start <= span_end && span_end < self.len {
      Ok(())
    } else {
      Err(ChartError::SpanOutOfRange {
        start: span_start,
        end: span_end,
        len: self.len,
      })
    }
  }

  fn cell(&self, span_start: usize, span_end: usize) -> &BoundedHeap<BeamEntry<S>, S> {
    &self.cells[span_start * self.len + span_end]
  }
}

impl<G, W> CkyParser<'_, G, W>
where
  G: Grammar,
  W: ProductionDistribution,
{
  /// Approximate best trees over `terminals`, keeping `config().beam_size`
  /// partial trees per span. Sorted best first. An empty input has no trees.
  pub fn beam_search<S: Semiring>(&self, terminals: &[Production], prior: &RootPrior) -> Vec<ParseTree<S>> {
    self.fill_beam::<S>(terminals, self.config().beam_size).trees(prior)
  }

  /// Runs the beam search with an explicit beam size and returns the chart
  pub fn fill_beam<S: Semiring>(&self, terminals: &[Production], beam_size: usize) -> BeamSearchChart<S> {
    let n = terminals.len();
    let mut chart = BeamSearchChart::new(n, beam_size);
    let grammar = self.grammar();
    let weights = self.weights();

    let max_terminal_len = grammar.max_terminal_len().min(n);
    for len in 1..=max_terminal_len {
      for span_start in 0..=n - len {
        let span_end = span_start + len - 1;
        for rule in grammar.terminal_rules(terminals, span_start, span_end) {
          let w = S::from_weight(weights.terminal_weight(rule));
          chart.offer(
            span_start,
            span_end,
            || BeamEntry::Terminal {
              rule: rule.clone(),
              rule_weight: w,
            },
            w,
          );
        }
      }
    }

    for span_size in 1..n {
      for span_start in 0..n - span_size {
        let span_end = span_start + span_size;
        for split in 0..span_size {
          let left_end = span_start + split;
          let lefts = Self::beam_roots(&chart, span_start, left_end);
          let rights = Self::beam_roots(&chart, left_end + 1, span_end);
          if lefts.is_empty() || rights.is_empty() {
            continue;
          }

          for rule in grammar.binary_rules(span_start, span_end, split) {
            let rule_weight = S::from_weight(weights.binary_weight(rule));
            if rule_weight.is_zero() {
              continue;
            }
            for &(left, _, left_weight) in lefts.iter().filter(|l| l.1 == rule.left) {
              for &(right, _, right_weight) in rights.iter().filter(|r| r.1 == rule.right) {
                chart.offer(
                  span_start,
                  span_end,
                  || BeamEntry::Binary {
                    rule: rule.clone(),
                    rule_weight,
                    split: left_end,
                    left,
                    right,
                  },
                  rule_weight * left_weight * right_weight,
                );
              }
            }
          }
        }
        tracing::trace!(
          span_start,
          span_end,
          entries = chart.cell(span_start, span_end).len(),
          "beam cell"
        );
      }
    }

    tracing::debug!(len = n, beam_size, exact = chart.is_exact(), "beam search");
    chart
  }

  fn beam_roots<S: Semiring>(
    chart: &BeamSearchChart<S>,
    span_start: usize,
    span_end: usize,
  ) -> Vec<(usize, Production, S)> {
    chart
      .cell(span_start, span_end)
      .iter()
      .enumerate()
      .map(|(idx, (entry, w))| (idx, entry.root(), w))
      .collect()
  }
}
