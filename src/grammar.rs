use std::collections::{HashMap, HashSet};

use crate::rules::{BinaryProduction, TerminalProduction};
use crate::symbols::{Production, SymbolTable};

/// Boxed iterator over rules borrowed from a grammar
pub type Rules<'a, R> = Box<dyn Iterator<Item = &'a R> + 'a>;

/// The rules a parser may use at each chart entry.
///
/// An implementation may return any subset of its rules to prune the search.
/// The parser never synthesizes rules, so a pruned grammar only makes results
/// approximate, it cannot make them wrong. Spans are inclusive and `split` is
/// the offset of the last terminal of the left child from `span_start`.
pub trait Grammar {
  fn binary_rules(&self, span_start: usize, span_end: usize, split: usize) -> Rules<'_, BinaryProduction>;

  /// Terminal rules that produce exactly `terminals[span_start..=span_end]`
  fn terminal_rules(
    &self,
    terminals: &[Production],
    span_start: usize,
    span_end: usize,
  ) -> Rules<'_, TerminalProduction>;

  fn all_terminal_rules(&self) -> Rules<'_, TerminalProduction>;

  /// Longest terminal sequence any terminal rule produces. Spans longer than
  /// this are never seeded with terminal rules.
  fn max_terminal_len(&self) -> usize {
    self.all_terminal_rules().map(|r| r.len()).max().unwrap_or(0)
  }
}

/// A grammar that performs no pruning: every binary rule is a candidate at
/// every chart entry.
#[derive(Debug, Default, Clone)]
pub struct BasicGrammar {
  binary: Vec<BinaryProduction>,
  binary_seen: HashSet<BinaryProduction>,
  binary_by_parent: HashMap<Production, Vec<usize>>,
  binary_by_children: HashMap<(Production, Production), Vec<usize>>,

  terminal: Vec<TerminalProduction>,
  terminal_seen: HashSet<TerminalProduction>,
  terminal_by_parent: HashMap<Production, Vec<usize>>,
  terminal_by_sequence: HashMap<Vec<Production>, Vec<usize>>,
  max_terminal_len: usize,
}

impl BasicGrammar {
  pub fn new() -> Self {
    Default::default()
  }

  /// Add a (nonterminal) binary rule. Adding a rule twice has no effect.
  pub fn add_production_rule(&mut self, rule: BinaryProduction) {
    if !self.binary_seen.insert(rule.clone()) {
      return;
    }
    let idx = self.binary.len();
    self.binary_by_parent.entry(rule.parent).or_default().push(idx);
    self
      .binary_by_children
      .entry((rule.left, rule.right))
      .or_default()
      .push(idx);
    self.binary.push(rule);
  }

  /// Add a terminal rule. Adding a rule twice has no effect.
  pub fn add_terminal(&mut self, rule: TerminalProduction) {
    if !self.terminal_seen.insert(rule.clone()) {
      return;
    }
    let idx = self.terminal.len();
    self.max_terminal_len = self.max_terminal_len.max(rule.len());
    self.terminal_by_parent.entry(rule.parent).or_default().push(idx);
    self
      .terminal_by_sequence
      .entry(rule.terminals.clone())
      .or_default()
      .push(idx);
    self.terminal.push(rule);
  }

  pub fn binary_productions(&self) -> &[BinaryProduction] {
    &self.binary
  }

  pub fn terminal_productions(&self) -> &[TerminalProduction] {
    &self.terminal
  }

  pub fn binary_rules_for_parent(&self, parent: Production) -> impl Iterator<Item = &BinaryProduction> {
    Self::lookup(&self.binary, self.binary_by_parent.get(&parent))
  }

  pub fn binary_rules_for_children(
    &self,
    left: Production,
    right: Production,
  ) -> impl Iterator<Item = &BinaryProduction> {
    Self::lookup(&self.binary, self.binary_by_children.get(&(left, right)))
  }

  pub fn terminal_rules_for_parent(&self, parent: Production) -> impl Iterator<Item = &TerminalProduction> {
    Self::lookup(&self.terminal, self.terminal_by_parent.get(&parent))
  }

  /// Terminal rules producing exactly the given terminal sequence
  pub fn terminal_rules_for_sequence<'a>(
    &'a self,
    terminals: &[Production],
  ) -> impl Iterator<Item = &'a TerminalProduction> + use<'a> {
    Self::lookup(&self.terminal, self.terminal_by_sequence.get(terminals))
  }

  /// Every symbol that heads a binary or terminal rule
  pub fn nonterminals(&self) -> HashSet<Production> {
    self
      .binary_by_parent
      .keys()
      .chain(self.terminal_by_parent.keys())
      .copied()
      .collect()
  }

  pub fn len(&self) -> usize {
    self.binary.len() + self.terminal.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> impl std::fmt::Display + 'a {
    GrammarDisplay {
      grammar: self,
      symbols,
    }
  }

  fn lookup<'a, R>(rules: &'a [R], idxs: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a R> + 'a {
    idxs
      .into_iter()
      .flat_map(|idxs| idxs.iter())
      .map(move |&idx| &rules[idx])
  }
}

impl Grammar for BasicGrammar {
  fn binary_rules(&self, _span_start: usize, _span_end: usize, _split: usize) -> Rules<'_, BinaryProduction> {
    Box::new(self.binary.iter())
  }

  fn terminal_rules(
    &self,
    terminals: &[Production],
    span_start: usize,
    span_end: usize,
  ) -> Rules<'_, TerminalProduction> {
    match terminals.get(span_start..=span_end) {
      Some(seq) => Box::new(self.terminal_rules_for_sequence(seq)),
      None => Box::new(std::iter::empty()),
    }
  }

  fn all_terminal_rules(&self) -> Rules<'_, TerminalProduction> {
    Box::new(self.terminal.iter())
  }

  fn max_terminal_len(&self) -> usize {
    self.max_terminal_len
  }
}

struct GrammarDisplay<'a> {
  grammar: &'a BasicGrammar,
  symbols: &'a SymbolTable,
}

impl std::fmt::Display for GrammarDisplay<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    for rule in self.grammar.binary.iter() {
      writeln!(f, "{};", rule.display(self.symbols))?;
    }
    for rule in self.grammar.terminal.iter() {
      writeln!(f, "{};", rule.display(self.symbols))?;
    }
    Ok(())
  }
}

/// Restricts the binary rules of another grammar with a predicate over
/// `(span_start, span_end, split, rule)`. Terminal rules pass through.
pub struct FilteredGrammar<G, F> {
  inner: G,
  keep: F,
}

impl<G, F> FilteredGrammar<G, F>
where
  G: Grammar,
  F: Fn(usize, usize, usize, &BinaryProduction) -> bool,
{
  pub fn new(inner: G, keep: F) -> Self {
    Self { inner, keep }
  }

  pub fn inner(&self) -> &G {
    &self.inner
  }
}

impl<G, F> Grammar for FilteredGrammar<G, F>
where
  G: Grammar,
  F: Fn(usize, usize, usize, &BinaryProduction) -> bool,
{
  fn binary_rules(&self, span_start: usize, span_end: usize, split: usize) -> Rules<'_, BinaryProduction> {
    let keep = &self.keep;
    Box::new(
      self
        .inner
        .binary_rules(span_start, span_end, split)
        .filter(move |r| keep(span_start, span_end, split, *r)),
    )
  }

  fn terminal_rules(
    &self,
    terminals: &[Production],
    span_start: usize,
    span_end: usize,
  ) -> Rules<'_, TerminalProduction> {
    self.inner.terminal_rules(terminals, span_start, span_end)
  }

  fn all_terminal_rules(&self) -> Rules<'_, TerminalProduction> {
    self.inner.all_terminal_rules()
  }

  fn max_terminal_len(&self) -> usize {
    self.inner.max_terminal_len()
  }
}

impl<G: Grammar + ?Sized> Grammar for &G {
  fn binary_rules(&self, span_start: usize, span_end: usize, split: usize) -> Rules<'_, BinaryProduction> {
    (**self).binary_rules(span_start, span_end, split)
  }

  fn terminal_rules(
    &self,
    terminals: &[Production],
    span_start: usize,
    span_end: usize,
  ) -> Rules<'_, TerminalProduction> {
    (**self).terminal_rules(terminals, span_start, span_end)
  }

  fn all_terminal_rules(&self) -> Rules<'_, TerminalProduction> {
    (**self).all_terminal_rules()
  }

  fn max_terminal_len(&self) -> usize {
    (**self).max_terminal_len()
  }
}
