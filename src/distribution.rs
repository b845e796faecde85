use std::collections::HashMap;
use std::fmt;

use crate::grammar::BasicGrammar;
use crate::rules::{BinaryProduction, TerminalProduction};
use crate::symbols::{Production, SymbolTable};

/// Source of rule weights for a parser. Weights are nonnegative and need not
/// be normalized; the parser treats them as an opaque oracle.
pub trait ProductionDistribution {
  fn binary_weight(&self, rule: &BinaryProduction) -> f64;

  fn terminal_weight(&self, rule: &TerminalProduction) -> f64;
}

/// Expected rule-usage counts, the sufficient statistics for training.
///
/// A chart's `normalized_expectations` produces one of these per sentence;
/// trainers fold many together with `merge` before handing the total to a
/// `CptProductionDistribution`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RuleExpectations {
  pub binary: HashMap<BinaryProduction, f64>,
  pub terminal: HashMap<TerminalProduction, f64>,
}

impl RuleExpectations {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn is_empty(&self) -> bool {
    self.binary.is_empty() && self.terminal.is_empty()
  }

  pub fn binary(&self, rule: &BinaryProduction) -> f64 {
    self.binary.get(rule).copied().unwrap_or(0.0)
  }

  pub fn terminal(&self, rule: &TerminalProduction) -> f64 {
    self.terminal.get(rule).copied().unwrap_or(0.0)
  }

  pub fn add_binary(&mut self, rule: &BinaryProduction, count: f64) {
    *self.binary.entry(rule.clone()).or_insert(0.0) += count;
  }

  pub fn add_terminal(&mut self, rule: &TerminalProduction, count: f64) {
    *self.terminal.entry(rule.clone()).or_insert(0.0) += count;
  }

  pub fn merge(&mut self, other: &RuleExpectations) {
    for (rule, count) in other.binary.iter() {
      self.add_binary(rule, *count);
    }
    for (rule, count) in other.terminal.iter() {
      self.add_terminal(rule, *count);
    }
  }

  pub fn scale(&mut self, factor: f64) {
    for count in self.binary.values_mut().chain(self.terminal.values_mut()) {
      *count *= factor;
    }
  }
}

/// A fixed table of rule weights. Rules not in the table weigh 0.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RuleWeights {
  binary: HashMap<BinaryProduction, f64>,
  terminal: HashMap<TerminalProduction, f64>,
}

impl RuleWeights {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn set_binary(&mut self, rule: BinaryProduction, weight: f64) {
    assert!(weight >= 0.0, "rule weights must be nonnegative");
    self.binary.insert(rule, weight);
  }

  pub fn set_terminal(&mut self, rule: TerminalProduction, weight: f64) {
    assert!(weight >= 0.0, "rule weights must be nonnegative");
    self.terminal.insert(rule, weight);
  }

  pub fn len(&self) -> usize {
    self.binary.len() + self.terminal.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl ProductionDistribution for RuleWeights {
  fn binary_weight(&self, rule: &BinaryProduction) -> f64 {
    self.binary.get(rule).copied().unwrap_or(0.0)
  }

  fn terminal_weight(&self, rule: &TerminalProduction) -> f64 {
    self.terminal.get(rule).copied().unwrap_or(0.0)
  }
}

/// A rule distribution estimated from (possibly fractional) counts
pub trait CptProductionDistribution: ProductionDistribution {
  /// Adds `scale` times each expected count to the running statistics
  fn increment_expectations(&mut self, expectations: &RuleExpectations, scale: f64);

  /// Drops all accumulated statistics
  fn clear_cpts(&mut self);

  /// Adds `virtual_count` to the count of every rule in the grammar
  fn add_uniform_smoothing(&mut self, virtual_count: f64);
}

/// A separate conditional probability table per parent symbol, with no
/// parameters tied across rules: `P(rule) = count(rule) / count(parent)`.
#[derive(Debug, Clone)]
pub struct CptTableProductionDistribution {
  binary_by_parent: HashMap<Production, Vec<BinaryProduction>>,
  terminal_by_parent: HashMap<Production, Vec<TerminalProduction>>,
  denominators: HashMap<Production, f64>,
  binary_counts: HashMap<BinaryProduction, f64>,
  terminal_counts: HashMap<TerminalProduction, f64>,
}

impl CptTableProductionDistribution {
  /// A distribution over the rules of `grammar`, initially uniform per parent
  pub fn new(grammar: &BasicGrammar) -> Self {
    let mut binary_by_parent: HashMap<Production, Vec<BinaryProduction>> = HashMap::new();
    for rule in grammar.binary_productions() {
      binary_by_parent.entry(rule.parent).or_default().push(rule.clone());
    }
    let mut terminal_by_parent: HashMap<Production, Vec<TerminalProduction>> = HashMap::new();
    for rule in grammar.terminal_productions() {
      terminal_by_parent.entry(rule.parent).or_default().push(rule.clone());
    }

    let mut dist = Self {
      binary_by_parent,
      terminal_by_parent,
      denominators: HashMap::new(),
      binary_counts: HashMap::new(),
      terminal_counts: HashMap::new(),
    };
    dist.add_uniform_smoothing(1.0);
    dist
  }

  pub fn binary_probability(&self, rule: &BinaryProduction) -> f64 {
    Self::ratio(
      self.binary_counts.get(rule).copied(),
      self.denominators.get(&rule.parent).copied(),
    )
  }

  pub fn terminal_probability(&self, rule: &TerminalProduction) -> f64 {
    Self::ratio(
      self.terminal_counts.get(rule).copied(),
      self.denominators.get(&rule.parent).copied(),
    )
  }

  pub fn parents(&self) -> impl Iterator<Item = Production> + '_ {
    self
      .binary_by_parent
      .keys()
      .chain(self.terminal_by_parent.keys().filter(|p| !self.binary_by_parent.contains_key(*p)))
      .copied()
  }

  pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> impl fmt::Display + 'a {
    CptDisplay { dist: self, symbols }
  }

  fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> f64 {
    match (numerator, denominator) {
      (Some(n), Some(d)) if d > 0.0 => n / d,
      _ => 0.0,
    }
  }
}

impl ProductionDistribution for CptTableProductionDistribution {
  fn binary_weight(&self, rule: &BinaryProduction) -> f64 {
    self.binary_probability(rule)
  }

  fn terminal_weight(&self, rule: &TerminalProduction) -> f64 {
    self.terminal_probability(rule)
  }
}

impl CptProductionDistribution for CptTableProductionDistribution {
  fn increment_expectations(&mut self, expectations: &RuleExpectations, scale: f64) {
    for (rule, count) in expectations.binary.iter() {
      let amount = scale * count;
      *self.denominators.entry(rule.parent).or_insert(0.0) += amount;
      *self.binary_counts.entry(rule.clone()).or_insert(0.0) += amount;
    }
    for (rule, count) in expectations.terminal.iter() {
      let amount = scale * count;
      *self.denominators.entry(rule.parent).or_insert(0.0) += amount;
      *self.terminal_counts.entry(rule.clone()).or_insert(0.0) += amount;
    }
  }

  fn clear_cpts(&mut self) {
    for count in self
      .denominators
      .values_mut()
      .chain(self.binary_counts.values_mut())
      .chain(self.terminal_counts.values_mut())
    {
      *count = 0.0;
    }
  }

  fn add_uniform_smoothing(&mut self, virtual_count: f64) {
    for (parent, rules) in self.binary_by_parent.iter() {
      *self.denominators.entry(*parent).or_insert(0.0) += virtual_count * rules.len() as f64;
      for rule in rules {
        *self.binary_counts.entry(rule.clone()).or_insert(0.0) += virtual_count;
      }
    }
    for (parent, rules) in self.terminal_by_parent.iter() {
      *self.denominators.entry(*parent).or_insert(0.0) += virtual_count * rules.len() as f64;
      for rule in rules {
        *self.terminal_counts.entry(rule.clone()).or_insert(0.0) += virtual_count;
      }
    }
  }
}

struct CptDisplay<'a> {
  dist: &'a CptTableProductionDistribution,
  symbols: &'a SymbolTable,
}

impl fmt::Display for CptDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parents = self.dist.parents().collect::<Vec<_>>();
    parents.sort();
    for parent in parents {
      for rule in self.dist.binary_by_parent.get(&parent).into_iter().flatten() {
        writeln!(
          f,
          "{:.4} : {}",
          self.dist.binary_probability(rule),
          rule.display(self.symbols)
        )?;
      }
      for rule in self.dist.terminal_by_parent.get(&parent).into_iter().flatten() {
        writeln!(
          f,
          "{:.4} : {}",
          self.dist.terminal_probability(rule),
          rule.display(self.symbols)
        )?;
      }
    }
    Ok(())
  }
}
