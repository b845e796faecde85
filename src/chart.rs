use std::collections::HashMap;
use std::fmt;

use crate::distribution::RuleExpectations;
use crate::error::ChartError;
use crate::heap::BoundedHeap;
use crate::rules::{BinaryProduction, Rule, TerminalProduction};
use crate::semiring::{LogMaxProduct, LogSumProduct, MaxProduct, Semiring, SumProduct};
use crate::symbols::{Production, SymbolTable};
use crate::tree::ParseTree;

pub type SumProductChart = ParseChart<SumProduct>;
pub type MaxProductChart = ParseChart<MaxProduct>;
pub type LogSumProductChart = ParseChart<LogSumProduct>;
pub type LogMaxProductChart = ParseChart<LogMaxProduct>;

/// Weights over symbols for one chart cell. Absent symbols weigh zero, and
/// zero weights are never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution<S> {
  weights: HashMap<Production, S>,
}

impl<S> Default for Distribution<S> {
  fn default() -> Self {
    Self {
      weights: HashMap::new(),
    }
  }
}

impl<S: Semiring> Distribution<S> {
  pub fn new() -> Self {
    Default::default()
  }

  /// A distribution with all of its weight on one symbol
  pub fn point(p: Production) -> Self {
    let mut d = Self::new();
    d.combine(p, S::one());
    d
  }

  pub fn from_weights(weights: &HashMap<Production, f64>) -> Self {
    let mut d = Self::new();
    for (p, w) in weights.iter() {
      d.combine(*p, S::from_weight(*w));
    }
    d
  }

  pub fn get(&self, p: Production) -> S {
    self.weights.get(&p).copied().unwrap_or_else(S::zero)
  }

  /// Folds `weight` into the entry for `p` with the semiring's `+`
  pub fn combine(&mut self, p: Production, weight: S) {
    if weight.is_zero() {
      return;
    }
    let entry = self.weights.entry(p).or_insert_with(S::zero);
    *entry = *entry + weight;
  }

  pub fn iter(&self) -> impl Iterator<Item = (Production, S)> + '_ {
    self.weights.iter().map(|(p, w)| (*p, *w))
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  /// The semiring sum of every entry
  pub fn total(&self) -> S {
    self.weights.values().fold(S::zero(), |acc, w| acc + *w)
  }

  /// The highest-weight entry
  pub fn argmax(&self) -> Option<(Production, S)> {
    self
      .iter()
      .fold(None, |best: Option<(Production, S)>, (p, w)| match best {
        Some((_, bw)) if bw >= w => best,
        _ => Some((p, w)),
      })
  }

  pub fn to_weights(&self) -> HashMap<Production, f64> {
    self.iter().map(|(p, w)| (p, w.to_weight())).collect()
  }
}

impl<S: Semiring> FromIterator<(Production, S)> for Distribution<S> {
  fn from_iter<I: IntoIterator<Item = (Production, S)>>(iter: I) -> Self {
    let mut d = Self::new();
    for (p, w) in iter {
      d.combine(p, w);
    }
    d
  }
}

/// How a chart entry was built: the rule applied, where it split the span
/// (offset of the left child's last terminal from the span start, 0 for
/// terminal rules), and the weight of the best derivation through it.
#[derive(Debug, Clone, PartialEq)]
pub struct Backpointer<S> {
  pub split: usize,
  pub rule: Rule,
  pub derivation_weight: S,
  pub rule_weight: S,
}

#[derive(Debug, Clone)]
struct Cell<S> {
  inside: Distribution<S>,
  outside: Distribution<S>,
  marginal: Distribution<S>,
  backpointers: HashMap<Production, BoundedHeap<Backpointer<S>, S>>,
}

impl<S> Default for Cell<S> {
  fn default() -> Self {
    Self {
      inside: Default::default(),
      outside: Default::default(),
      marginal: Default::default(),
      backpointers: HashMap::new(),
    }
  }
}

/// The dynamic programming table for one input.
///
/// Cells are indexed by inclusive spans `(start, end)` with
/// `start <= end < len`. The semiring `S` fixes how entries combine for the
/// chart's whole life; selective semirings additionally keep up to
/// `beam_width` backpointers per `(span, symbol)` for tree extraction.
///
/// A chart is filled by `CkyParser`: one inside pass, then at most one
/// outside pass. Readers check that the pass they depend on has run.
#[derive(Debug, Clone)]
pub struct ParseChart<S> {
  len: usize,
  terminals: Vec<Production>,
  cells: Vec<Cell<S>>,
  beam_width: usize,
  root_distribution: Distribution<S>,
  partition_function: S,
  binary_expectations: HashMap<BinaryProduction, S>,
  terminal_expectations: HashMap<TerminalProduction, S>,
  inside_calculated: bool,
  outside_calculated: bool,
}

impl<S: Semiring> ParseChart<S> {
  /// A chart for an input of `len` terminals keeping the single best
  /// backpointer per entry
  pub fn new(len: usize) -> Self {
    Self::with_beam_width(len, 1)
  }

  /// A chart keeping up to `beam_width` backpointers per entry, enough to
  /// extract the `beam_width` best trees
  pub fn with_beam_width(len: usize, beam_width: usize) -> Self {
    assert!(beam_width > 0, "beam width must be positive");
    Self {
      len,
      terminals: Vec::new(),
      cells: (0..len * len).map(|_| Cell::default()).collect(),
      beam_width,
      root_distribution: Distribution::new(),
      partition_function: S::zero(),
      binary_expectations: HashMap::new(),
      terminal_expectations: HashMap::new(),
      inside_calculated: false,
      outside_calculated: false,
    }
  }

  /// Number of terminals this chart spans
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn beam_width(&self) -> usize {
    self.beam_width
  }

  /// The terminals the inside pass ran over
  pub fn terminals(&self) -> &[Production] {
    &self.terminals
  }

  pub fn inside_calculated(&self) -> bool {
    self.inside_calculated
  }

  pub fn outside_calculated(&self) -> bool {
    self.outside_calculated
  }

  pub fn inside(&self, span_start: usize, span_end: usize) -> Result<&Distribution<S>, ChartError> {
    self.require_inside()?;
    self.check_span(span_start, span_end)?;
    Ok(&self.cell(span_start, span_end).inside)
  }

  pub fn outside(&self, span_start: usize, span_end: usize) -> Result<&Distribution<S>, ChartError> {
    self.require_outside()?;
    self.check_span(span_start, span_end)?;
    Ok(&self.cell(span_start, span_end).outside)
  }

  /// Unnormalized posterior weight of each symbol rooting the span; divide by
  /// the partition function for probabilities
  pub fn marginal(&self, span_start: usize, span_end: usize) -> Result<&Distribution<S>, ChartError> {
    self.require_outside()?;
    self.check_span(span_start, span_end)?;
    Ok(&self.cell(span_start, span_end).marginal)
  }

  /// Total weight of every derivation of the input, each weighted by the root
  /// prior. Zero when the input has no parse.
  pub fn partition_function(&self) -> Result<S, ChartError> {
    self.require_outside()?;
    Ok(self.partition_function)
  }

  /// The prior over root symbols the outside pass was seeded with
  pub fn root_distribution(&self) -> Result<&Distribution<S>, ChartError> {
    self.require_outside()?;
    Ok(&self.root_distribution)
  }

  /// Unnormalized expected use of each binary rule: the sum over derivations
  /// of (uses of the rule) times (derivation weight)
  pub fn binary_rule_expectations(&self) -> Result<&HashMap<BinaryProduction, S>, ChartError> {
    self.require_outside()?;
    Ok(&self.binary_expectations)
  }

  pub fn terminal_rule_expectations(&self) -> Result<&HashMap<TerminalProduction, S>, ChartError> {
    self.require_outside()?;
    Ok(&self.terminal_expectations)
  }

  /// Expected rule counts divided by the partition function. Empty when the
  /// input has no parse.
  pub fn normalized_expectations(&self) -> Result<RuleExpectations, ChartError> {
    self.require_outside()?;
    let mut out = RuleExpectations::new();
    let z = self.partition_function;
    if z.is_zero() {
      return Ok(out);
    }
    for (rule, w) in self.binary_expectations.iter() {
      out.add_binary(rule, w.divide(z).to_weight());
    }
    for (rule, w) in self.terminal_expectations.iter() {
      out.add_terminal(rule, w.divide(z).to_weight());
    }
    Ok(out)
  }

  /// Backpointers recorded for `symbol` over a span, best first
  pub fn backpointers(
    &self,
    symbol: Production,
    span_start: usize,
    span_end: usize,
  ) -> Result<Vec<&Backpointer<S>>, ChartError> {
    self.require_selective()?;
    self.require_inside()?;
    self.check_span(span_start, span_end)?;
    Ok(self.sorted_backpointers(symbol, span_start, span_end))
  }

  /// The most probable tree over the whole input rooted at `root`, or `None`
  /// if `root` cannot derive the input
  pub fn best_tree(&self, root: Production) -> Result<Option<ParseTree<S>>, ChartError> {
    self.require_inside()?;
    self.best_tree_with_span(root, 0, self.len - 1)
  }

  pub fn best_tree_with_span(
    &self,
    root: Production,
    span_start: usize,
    span_end: usize,
  ) -> Result<Option<ParseTree<S>>, ChartError> {
    self.require_selective()?;
    self.require_inside()?;
    self.check_span(span_start, span_end)?;
    Ok(self.best_tree_unchecked(root, span_start, span_end))
  }

  /// Up to `n` most probable trees over the whole input rooted at `root`,
  /// best first
  pub fn best_trees(&self, root: Production, n: usize) -> Result<Vec<ParseTree<S>>, ChartError> {
    self.require_inside()?;
    self.best_trees_with_span(root, 0, self.len - 1, n)
  }

  pub fn best_trees_with_span(
    &self,
    root: Production,
    span_start: usize,
    span_end: usize,
    n: usize,
  ) -> Result<Vec<ParseTree<S>>, ChartError> {
    self.require_kbest(n)?;
    self.check_span(span_start, span_end)?;
    Ok(self.kbest(root, span_start, span_end, n, &mut HashMap::new()))
  }

  /// Up to `n` most probable trees over the whole input with any root, each
  /// root weighted by `prior`, best first
  pub fn best_trees_for_prior(&self, prior: &Distribution<S>, n: usize) -> Result<Vec<ParseTree<S>>, ChartError> {
    self.require_kbest(n)?;
    let mut memo = HashMap::new();
    let mut best = BoundedHeap::new(n);
    for (root, root_weight) in prior.iter() {
      for tree in self.kbest(root, 0, self.len - 1, n, &mut memo) {
        let tree = tree.multiply(root_weight);
        let w = tree.weight();
        if !w.is_zero() {
          best.offer(tree, w);
        }
      }
    }
    Ok(best.into_sorted_vec().into_iter().map(|(t, _)| t).collect())
  }

  pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> ChartDisplay<'a, S> {
    ChartDisplay { chart: self, symbols }
  }

  pub(crate) fn set_terminals(&mut self, terminals: &[Production]) -> Result<(), ChartError> {
    if self.inside_calculated {
      return Err(ChartError::InsideAlreadyCalculated);
    }
    if terminals.is_empty() {
      return Err(ChartError::EmptyInput);
    }
    if terminals.len() != self.len {
      return Err(ChartError::LengthMismatch {
        chart: self.len,
        input: terminals.len(),
      });
    }
    self.terminals = terminals.to_vec();
    Ok(())
  }

  pub(crate) fn inside_unchecked(&self, span_start: usize, span_end: usize) -> &Distribution<S> {
    &self.cell(span_start, span_end).inside
  }

  pub(crate) fn outside_unchecked(&self, span_start: usize, span_end: usize) -> &Distribution<S> {
    &self.cell(span_start, span_end).outside
  }

  pub(crate) fn update_inside_terminal(
    &mut self,
    span_start: usize,
    span_end: usize,
    rule: &TerminalProduction,
    rule_weight: S,
  ) {
    if rule_weight.is_zero() {
      return;
    }
    let beam_width = self.beam_width;
    let cell = self.cell_mut(span_start, span_end);
    cell.inside.combine(rule.parent, rule_weight);
    if S::SELECTIVE {
      Self::offer_backpointer(cell, beam_width, rule.parent, rule_weight, || Backpointer {
        split: 0,
        rule: Rule::Terminal(rule.clone()),
        derivation_weight: rule_weight,
        rule_weight,
      });
    }
  }

  pub(crate) fn update_inside_binary(
    &mut self,
    span_start: usize,
    span_end: usize,
    split: usize,
    rule: &BinaryProduction,
    rule_weight: S,
    derivation_weight: S,
  ) {
    if derivation_weight.is_zero() {
      return;
    }
    let beam_width = self.beam_width;
    let cell = self.cell_mut(span_start, span_end);
    cell.inside.combine(rule.parent, derivation_weight);
    if S::SELECTIVE {
      Self::offer_backpointer(cell, beam_width, rule.parent, derivation_weight, || Backpointer {
        split,
        rule: Rule::Binary(rule.clone()),
        derivation_weight,
        rule_weight,
      });
    }
  }

  pub(crate) fn mark_inside_calculated(&mut self) {
    self.inside_calculated = true;
  }

  /// Seeds the root cell's outside weights and fixes the partition function
  pub(crate) fn set_root_outside(&mut self, prior: Distribution<S>) {
    let root = self.len - 1;
    let cell = self.cell_mut(0, root);
    let z = prior
      .iter()
      .fold(S::zero(), |acc, (p, w)| acc + cell.inside.get(p) * w);
    cell.outside = prior.clone();
    self.root_distribution = prior;
    self.partition_function = z;
  }

  pub(crate) fn update_outside(&mut self, span_start: usize, span_end: usize, symbol: Production, weight: S) {
    self.cell_mut(span_start, span_end).outside.combine(symbol, weight);
  }

  pub(crate) fn add_binary_expectation(&mut self, rule: &BinaryProduction, weight: S) {
    if weight.is_zero() {
      return;
    }
    let entry = self.binary_expectations.entry(rule.clone()).or_insert_with(S::zero);
    *entry = *entry + weight;
  }

  pub(crate) fn add_terminal_expectation(&mut self, rule: &TerminalProduction, weight: S) {
    if weight.is_zero() {
      return;
    }
    let entry = self.terminal_expectations.entry(rule.clone()).or_insert_with(S::zero);
    *entry = *entry + weight;
  }

  /// Fills every marginal cell from its inside and outside weights and closes
  /// the outside pass
  pub(crate) fn finish_outside(&mut self) {
    for cell in self.cells.iter_mut() {
      cell.marginal = cell
        .inside
        .iter()
        .map(|(p, w)| (p, w * cell.outside.get(p)))
        .collect();
    }
    self.outside_calculated = true;
  }

  fn offer_backpointer(
    cell: &mut Cell<S>,
    beam_width: usize,
    symbol: Production,
    weight: S,
    backpointer: impl FnOnce() -> Backpointer<S>,
  ) {
    let heap = cell
      .backpointers
      .entry(symbol)
      .or_insert_with(|| BoundedHeap::new(beam_width));
    if heap.accepts(weight) {
      heap.offer(backpointer(), weight);
    }
  }

  fn sorted_backpointers(&self, symbol: Production, span_start: usize, span_end: usize) -> Vec<&Backpointer<S>> {
    match self.cell(span_start, span_end).backpointers.get(&symbol) {
      Some(heap) => heap
        .sorted_indexes()
        .into_iter()
        .filter_map(|idx| heap.get(idx).map(|(bp, _)| bp))
        .collect(),
      None => Vec::new(),
    }
  }

  fn best_tree_unchecked(&self, root: Production, span_start: usize, span_end: usize) -> Option<ParseTree<S>> {
    let bp = *self.sorted_backpointers(root, span_start, span_end).first()?;
    match &bp.rule {
      Rule::Terminal(r) => Some(ParseTree::leaf(r, bp.rule_weight, span_start, span_end)),
      Rule::Binary(r) => {
        let left = self.best_tree_unchecked(r.left, span_start, span_start + bp.split)?;
        let right = self.best_tree_unchecked(r.right, span_start + bp.split + 1, span_end)?;
        Some(ParseTree::node(r, bp.rule_weight, left, right))
      }
    }
  }

  /// Top `n` trees for `(root, span)`. Each of the best `n` backpointers is
  /// expanded with the top `n` subtrees on each side, and only the best `n`
  /// combinations overall are kept, since per-side top lists do not compose
  /// into a global top list.
  fn kbest(
    &self,
    root: Production,
    span_start: usize,
    span_end: usize,
    n: usize,
    memo: &mut HashMap<(Production, usize, usize), Vec<ParseTree<S>>>,
  ) -> Vec<ParseTree<S>> {
    if let Some(trees) = memo.get(&(root, span_start, span_end)) {
      return trees.clone();
    }

    let mut best = BoundedHeap::new(n);
    for bp in self.sorted_backpointers(root, span_start, span_end).into_iter().take(n) {
      match &bp.rule {
        Rule::Terminal(r) => {
          best.offer(ParseTree::leaf(r, bp.rule_weight, span_start, span_end), bp.rule_weight);
        }
        Rule::Binary(r) => {
          let split = span_start + bp.split;
          let lefts = self.kbest(r.left, span_start, split, n, memo);
          let rights = self.kbest(r.right, split + 1, span_end, n, memo);
          for left in lefts.iter() {
            for right in rights.iter() {
              let w = bp.rule_weight * left.weight() * right.weight();
              if best.accepts(w) {
                best.offer(ParseTree::node(r, bp.rule_weight, left.clone(), right.clone()), w);
              }
            }
          }
        }
      }
    }

    let trees = best
      .into_sorted_vec()
      .into_iter()
      .map(|(t, _)| t)
      .collect::<Vec<_>>();
    memo.insert((root, span_start, span_end), trees.clone());
    trees
  }

  fn require_inside(&self) -> Result<(), ChartError> {
    if self.inside_calculated {
      Ok(())
    } else {
      Err(ChartError::InsideNotCalculated)
    }
  }

  fn require_outside(&self) -> Result<(), ChartError> {
    if self.outside_calculated {
      Ok(())
    } else {
      Err(ChartError::OutsideNotCalculated)
    }
  }

  fn require_selective(&self) -> Result<(), ChartError> {
    if S::SELECTIVE {
      Ok(())
    } else {
      Err(ChartError::NotSelective)
    }
  }

  fn require_kbest(&self, n: usize) -> Result<(), ChartError> {
    self.require_selective()?;
    self.require_inside()?;
    if n == 0 || n > self.beam_width {
      return Err(ChartError::BeamTooNarrow {
        requested: n,
        width: self.beam_width,
      });
    }
    Ok(())
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

  fn cell(&self, span_start: usize, span_end: usize) -> &Cell<S> {
    &self.cells[span_start * self.len + span_end]
  }

  fn cell_mut(&mut self, span_start: usize, span_end: usize) -> &mut Cell<S> {
    &mut self.cells[span_start * self.len + span_end]
  }
}

pub struct ChartDisplay<'a, S> {
  chart: &'a ParseChart<S>,
  symbols: &'a SymbolTable,
}

impl<S: Semiring> ChartDisplay<'_, S> {
  fn write_distribution(&self, f: &mut fmt::Formatter<'_>, label: &str, d: &Distribution<S>) -> fmt::Result {
    if d.is_empty() {
      return Ok(());
    }
    let mut entries = d.iter().collect::<Vec<_>>();
    entries.sort_by_key(|(p, _)| *p);
    write!(f, "  {}:", label)?;
    for (p, w) in entries {
      write!(f, " {}={:.6}", self.symbols.display(p), w.to_weight())?;
    }
    writeln!(f)
  }
}

impl<S: Semiring> fmt::Display for ChartDisplay<'_, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let chart = self.chart;
    for span_size in 0..chart.len {
      for span_start in 0..chart.len - span_size {
        let span_end = span_start + span_size;
        let cell = chart.cell(span_start, span_end);
        if cell.inside.is_empty() && cell.outside.is_empty() {
          continue;
        }
        writeln!(f, "{}..{}:", span_start, span_end)?;
        self.write_distribution(f, "inside", &cell.inside)?;
        self.write_distribution(f, "outside", &cell.outside)?;
        self.write_distribution(f, "marginal", &cell.marginal)?;
      }
    }
    if chart.outside_calculated {
      writeln!(f, "partition function: {:.6}", chart.partition_function.to_weight())?;
    }
    Ok(())
  }
}
