use std::collections::HashMap;

use crate::chart::{Distribution, ParseChart};
use crate::config::ParserConfig;
use crate::distribution::{ProductionDistribution, RuleExpectations};
use crate::error::ChartError;
use crate::grammar::Grammar;
use crate::rules::Rule;
use crate::semiring::Semiring;
use crate::symbols::Production;
use crate::tree::ParseTree;

/// Prior over the symbol at the root of the whole input
#[derive(Debug, Clone, PartialEq)]
pub enum RootPrior {
  /// Every symbol may be the root, with weight 1
  Uniform,
  /// The root is known
  Point(Production),
  /// Unnormalized root weights; absent symbols weigh 0
  Weights(HashMap<Production, f64>),
}

impl RootPrior {
  pub fn weight<S: Semiring>(&self, root: Production) -> S {
    match self {
      Self::Uniform => S::one(),
      Self::Point(p) if *p == root => S::one(),
      Self::Point(_) => S::zero(),
      Self::Weights(weights) => S::from_weight(weights.get(&root).copied().unwrap_or(0.0)),
    }
  }

  /// The prior restricted to the candidate roots
  pub fn distribution<S: Semiring>(&self, candidates: impl IntoIterator<Item = Production>) -> Distribution<S> {
    candidates.into_iter().map(|p| (p, self.weight(p))).collect()
  }
}

/// Expected rule counts summed over a corpus
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CorpusExpectations {
  /// Per-sentence normalized expectations, summed
  pub expectations: RuleExpectations,
  /// Sum of log partition functions over the sentences that parsed
  pub log_likelihood: f64,
  pub parsed: usize,
  /// Sentences with a zero partition function. They contribute nothing.
  pub unparsable: usize,
}

impl CorpusExpectations {
  fn merge(&mut self, other: CorpusExpectations) {
    self.expectations.merge(&other.expectations);
    self.log_likelihood += other.log_likelihood;
    self.parsed += other.parsed;
    self.unparsable += other.unparsable;
  }
}

/// CKY inference over a grammar policy and a rule-weight source.
///
/// The parser borrows both and never mutates them, so one parser can fill
/// any number of charts, including from several threads at once.
pub struct CkyParser<'a, G, W> {
  grammar: &'a G,
  weights: &'a W,
  config: ParserConfig,
}

impl<'a, G, W> CkyParser<'a, G, W>
where
  G: Grammar,
  W: ProductionDistribution,
{
  pub fn new(grammar: &'a G, weights: &'a W) -> Self {
    Self::with_config(grammar, weights, ParserConfig::default())
  }

  pub fn with_config(grammar: &'a G, weights: &'a W, config: ParserConfig) -> Self {
    Self {
      grammar,
      weights,
      config,
    }
  }

  pub fn config(&self) -> &ParserConfig {
    &self.config
  }

  pub fn grammar(&self) -> &G {
    self.grammar
  }

  pub(crate) fn weights(&self) -> &W {
    self.weights
  }

  /// A fresh chart for `len` terminals, keeping `kbest_width` backpointers
  /// per entry
  pub fn chart<S: Semiring>(&self, len: usize) -> ParseChart<S> {
    ParseChart::with_beam_width(len, self.config.kbest_width)
  }

  /// Runs the inside pass over `terminals`, bottom-up. Afterwards the chart
  /// holds inside weights and, for selective semirings, backpointers.
  pub fn fill_inside<S: Semiring>(&self, chart: &mut ParseChart<S>, terminals: &[Production]) -> Result<(), ChartError> {
    chart.set_terminals(terminals)?;
    let n = terminals.len();
    tracing::debug!(len = n, "inside pass");

    let max_terminal_len = self.grammar.max_terminal_len().min(n);
    for len in 1..=max_terminal_len {
      for span_start in 0..=n - len {
        let span_end = span_start + len - 1;
        for rule in self.grammar.terminal_rules(terminals, span_start, span_end) {
          let w = S::from_weight(self.weights.terminal_weight(rule));
          chart.update_inside_terminal(span_start, span_end, rule, w);
        }
      }
    }

    for span_size in 1..n {
      for span_start in 0..n - span_size {
        let span_end = span_start + span_size;
        self.fill_inside_cell(chart, span_start, span_end);
        tracing::trace!(
          span_start,
          span_end,
          entries = chart.inside_unchecked(span_start, span_end).len(),
          "inside cell"
        );
      }
    }

    chart.mark_inside_calculated();
    Ok(())
  }

  fn fill_inside_cell<S: Semiring>(&self, chart: &mut ParseChart<S>, span_start: usize, span_end: usize) {
    for split in 0..span_end - span_start {
      let left_end = span_start + split;
      for rule in self.grammar.binary_rules(span_start, span_end, split) {
        let left = chart.inside_unchecked(span_start, left_end).get(rule.left);
        if left.is_zero() {
          continue;
        }
        let right = chart.inside_unchecked(left_end + 1, span_end).get(rule.right);
        if right.is_zero() {
          continue;
        }
        let rule_weight = S::from_weight(self.weights.binary_weight(rule));
        chart.update_inside_binary(span_start, span_end, split, rule, rule_weight, rule_weight * left * right);
      }
    }
  }

  /// A chart over `terminals` with the inside pass done
  pub fn parse_inside<S: Semiring>(&self, terminals: &[Production]) -> Result<ParseChart<S>, ChartError> {
    let mut chart = self.chart(terminals.len());
    self.fill_inside(&mut chart, terminals)?;
    Ok(chart)
  }

  /// Runs the outside pass, top-down from the root span seeded with `prior`,
  /// accumulating rule expectations and filling marginals
  pub fn fill_outside<S: Semiring>(&self, chart: &mut ParseChart<S>, prior: &RootPrior) -> Result<(), ChartError> {
    if !chart.inside_calculated() {
      return Err(ChartError::InsideNotCalculated);
    }
    if chart.outside_calculated() {
      return Err(ChartError::OutsideAlreadyCalculated);
    }
    let n = chart.len();
    let terminals = chart.terminals().to_vec();

    let root_candidates = chart.inside_unchecked(0, n - 1).iter().map(|(p, _)| p).collect::<Vec<_>>();
    chart.set_root_outside(prior.distribution(root_candidates));

    for span_size in (1..n).rev() {
      for span_start in 0..n - span_size {
        let span_end = span_start + span_size;
        let parent_outside = chart.outside_unchecked(span_start, span_end).clone();
        if parent_outside.is_empty() {
          continue;
        }
        self.fill_outside_cell(chart, span_start, span_end, &parent_outside);
      }
    }

    let max_terminal_len = self.grammar.max_terminal_len().min(n);
    for len in 1..=max_terminal_len {
      for span_start in 0..=n - len {
        let span_end = span_start + len - 1;
        for rule in self.grammar.terminal_rules(&terminals, span_start, span_end) {
          let outside = chart.outside_unchecked(span_start, span_end).get(rule.parent);
          if outside.is_zero() {
            continue;
          }
          let rule_weight = S::from_weight(self.weights.terminal_weight(rule));
          chart.add_terminal_expectation(rule, rule_weight * outside);
        }
      }
    }

    chart.finish_outside();
    let z = chart.partition_function()?;
    tracing::debug!(len = n, partition_function = z.to_weight(), "outside pass");
    if z.is_zero() && !S::LOG_SPACE && n >= self.config.underflow_warning_len {
      tracing::warn!(
        len = n,
        "partition function is zero; linear-space weights may have underflowed, consider a log-space semiring"
      );
    }
    Ok(())
  }

  fn fill_outside_cell<S: Semiring>(
    &self,
    chart: &mut ParseChart<S>,
    span_start: usize,
    span_end: usize,
    parent_outside: &Distribution<S>,
  ) {
    for split in 0..span_end - span_start {
      let left_end = span_start + split;
      for rule in self.grammar.binary_rules(span_start, span_end, split) {
        let parent = parent_outside.get(rule.parent);
        if parent.is_zero() {
          continue;
        }
        let left = chart.inside_unchecked(span_start, left_end).get(rule.left);
        let right = chart.inside_unchecked(left_end + 1, span_end).get(rule.right);
        if left.is_zero() || right.is_zero() {
          continue;
        }
        let rule_weight = S::from_weight(self.weights.binary_weight(rule));
        chart.add_binary_expectation(rule, rule_weight * left * right * parent);
        chart.update_outside(span_start, left_end, rule.left, rule_weight * right * parent);
        chart.update_outside(left_end + 1, span_end, rule.right, rule_weight * left * parent);
      }
    }
  }

  /// A chart over `terminals` with both passes done
  pub fn parse_marginal<S: Semiring>(
    &self,
    terminals: &[Production],
    prior: &RootPrior,
  ) -> Result<ParseChart<S>, ChartError> {
    let mut chart = self.parse_inside(terminals)?;
    self.fill_outside(&mut chart, prior)?;
    Ok(chart)
  }

  /// Unnormalized probability of a tree under the rule weights and `prior`,
  /// regardless of how the tree was built
  pub fn tree_probability<S: Semiring>(&self, tree: &ParseTree<S>, prior: &RootPrior) -> f64 {
    self.rule_product(tree) * prior.weight::<S>(tree.root()).to_weight()
  }

  fn rule_product<S: Semiring>(&self, tree: &ParseTree<S>) -> f64 {
    match (tree.rule(), tree.children()) {
      (Rule::Binary(r), Some((left, right))) => {
        self.weights.binary_weight(&r) * self.rule_product(left) * self.rule_product(right)
      }
      (Rule::Terminal(r), _) => self.weights.terminal_weight(&r),
      (Rule::Binary(_), None) => unreachable!("binary rule at a leaf"),
    }
  }
}

impl<G, W> CkyParser<'_, G, W>
where
  G: Grammar + Sync,
  W: ProductionDistribution + Sync,
{
  /// Sums normalized rule expectations over many sentences, the E step of
  /// EM training.
  ///
  /// `S` must be a summing semiring; max-product charts yield
  /// `ChartError::Selective`.
  ///
  /// Sentences are split across `threads` scoped workers, each with its own
  /// charts. Workers return their totals and the caller merges them, so no
  /// accumulator is shared during inference.
  pub fn corpus_expectations<S: Semiring>(
    &self,
    sentences: &[Vec<Production>],
    prior: &RootPrior,
    threads: usize,
  ) -> Result<CorpusExpectations, ChartError> {
    if S::SELECTIVE {
      return Err(ChartError::Selective);
    }
    let threads = threads.clamp(1, sentences.len().max(1));
    let chunk_size = sentences.len().div_ceil(threads).max(1);

    let results = std::thread::scope(|scope| {
      let workers = sentences
        .chunks(chunk_size)
        .enumerate()
        .map(|(worker, chunk)| {
          scope.spawn(move || {
            let _span = tracing::debug_span!("corpus_worker", worker, sentences = chunk.len()).entered();
            self.chunk_expectations::<S>(chunk, prior)
          })
        })
        .collect::<Vec<_>>();

      workers
        .into_iter()
        .map(|handle| match handle.join() {
          Ok(result) => result,
          Err(panic) => std::panic::resume_unwind(panic),
        })
        .collect::<Vec<_>>()
    });

    let mut total = CorpusExpectations::default();
    for result in results {
      total.merge(result?);
    }
    tracing::debug!(
      parsed = total.parsed,
      unparsable = total.unparsable,
      log_likelihood = total.log_likelihood,
      "corpus expectations"
    );
    Ok(total)
  }

  fn chunk_expectations<S: Semiring>(
    &self,
    sentences: &[Vec<Production>],
    prior: &RootPrior,
  ) -> Result<CorpusExpectations, ChartError> {
    let mut total = CorpusExpectations::default();
    for sentence in sentences {
      let chart = self.parse_marginal::<S>(sentence, prior)?;
      let z = chart.partition_function()?;
      if z.is_zero() {
        total.unparsable += 1;
        continue;
      }
      total.expectations.merge(&chart.normalized_expectations()?);
      total.log_likelihood += z.log_weight();
      total.parsed += 1;
    }
    Ok(total)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::distribution::{CptProductionDistribution, CptTableProductionDistribution, RuleWeights};
  use crate::grammar::{BasicGrammar, FilteredGrammar};
  use crate::rules::{BinaryProduction, TerminalProduction};
  use crate::semiring::{LogMaxProduct, LogSumProduct, MaxProduct, SumProduct};
  use crate::symbols::SymbolTable;

  fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
  }

  struct Fixture {
    symbols: SymbolTable,
    grammar: BasicGrammar,
    weights: RuleWeights,
  }

  impl Fixture {
    fn new() -> Self {
      Self {
        symbols: SymbolTable::new(),
        grammar: BasicGrammar::new(),
        weights: RuleWeights::new(),
      }
    }

    fn sym(&mut self, name: &str) -> Production {
      self.symbols.intern(name)
    }

    fn binary(&mut self, parent: &str, left: &str, right: &str, weight: f64) -> BinaryProduction {
      let rule = BinaryProduction::new(self.sym(parent), self.sym(left), self.sym(right));
      self.grammar.add_production_rule(rule.clone());
      self.weights.set_binary(rule.clone(), weight);
      rule
    }

    fn typed_binary(&mut self, parent: &str, left: &str, right: &str, ty: &str, weight: f64) -> BinaryProduction {
      let rule = BinaryProduction::new(self.sym(parent), self.sym(left), self.sym(right)).with_type(self.sym(ty));
      self.grammar.add_production_rule(rule.clone());
      self.weights.set_binary(rule.clone(), weight);
      rule
    }

    fn terminal(&mut self, parent: &str, words: &str, weight: f64) -> TerminalProduction {
      let parent = self.sym(parent);
      let rule = TerminalProduction::new(parent, self.symbols.intern_all(words));
      self.grammar.add_terminal(rule.clone());
      self.weights.set_terminal(rule.clone(), weight);
      rule
    }

    fn input(&mut self, sentence: &str) -> Vec<Production> {
      self.symbols.intern_all(sentence)
    }

    fn parser(&self) -> CkyParser<'_, BasicGrammar, RuleWeights> {
      CkyParser::new(&self.grammar, &self.weights)
    }
  }

  /// The hockey grammar: two nonterminals derive the whole sentence, a
  /// multi-word terminal competes with a binary NP, and `foo` is reachable
  /// only from itself.
  fn hockey() -> Fixture {
    let mut f = Fixture::new();
    f.terminal("N", "gretzky", 0.25);
    f.terminal("N", "ice", 0.25);
    f.terminal("N", "hockey", 0.25);
    f.terminal("N", "ice hockey", 0.25);
    f.terminal("V", "plays", 1.0);
    f.binary("S", "N", "VP", 1.0);
    f.binary("S2", "N", "VP", 1.0);
    f.typed_binary("VP", "V", "N", "rule2", 1.0);
    f.binary("NP", "N", "N", 1.0);
    f.binary("foo", "N", "N", 0.5);
    f.binary("foo", "R", "S", 0.5);
    f
  }

  /// S -> NP VP (0.9), S -> VP (0.1), NP -> "dog", VP -> "barks". The unary
  /// rule is written as a terminal rule over a symbol no input contains, so it
  /// never fires.
  fn dog() -> Fixture {
    let mut f = Fixture::new();
    f.binary("S", "NP", "VP", 0.9);
    f.terminal("S", "VP", 0.1);
    f.terminal("NP", "dog", 1.0);
    f.terminal("VP", "barks", 1.0);
    f
  }

  /// An ambiguous grammar with many derivations per span
  fn ambiguous() -> Fixture {
    let mut f = Fixture::new();
    f.binary("X", "X", "X", 0.3);
    f.binary("X", "X", "Y", 0.2);
    f.binary("Y", "X", "X", 0.4);
    f.binary("Y", "Y", "X", 0.1);
    f.terminal("X", "a", 0.5);
    f.terminal("Y", "a", 0.25);
    f.terminal("X", "b", 0.6);
    f.terminal("X", "a b", 0.05);
    f
  }

  /// Every derivation of `symbol` over `terminals[start..=end]` as
  /// (probability, terminal sequence) pairs
  fn derivations(f: &Fixture, symbol: Production, terminals: &[Production], start: usize, end: usize) -> Vec<f64> {
    let mut out = Vec::new();
    for rule in f.grammar.terminal_rules(terminals, start, end) {
      if rule.parent == symbol {
        out.push(f.weights.terminal_weight(rule));
      }
    }
    for split in start..end {
      for rule in f.grammar.binary_rules_for_parent(symbol) {
        let w = f.weights.binary_weight(rule);
        let lefts = derivations(f, rule.left, terminals, start, split);
        let rights = derivations(f, rule.right, terminals, split + 1, end);
        for l in lefts.iter() {
          for r in rights.iter() {
            out.push(w * l * r);
          }
        }
      }
    }
    out
  }

  /// Every derivation as (probability, rule counts), for checking expected
  /// rule counts by enumeration
  fn counted_derivations(
    f: &Fixture,
    symbol: Production,
    terminals: &[Production],
    start: usize,
    end: usize,
  ) -> Vec<(f64, RuleExpectations)> {
    let mut out = Vec::new();
    for rule in f.grammar.terminal_rules(terminals, start, end) {
      if rule.parent == symbol {
        let mut counts = RuleExpectations::new();
        counts.add_terminal(rule, 1.0);
        out.push((f.weights.terminal_weight(rule), counts));
      }
    }
    for split in start..end {
      for rule in f.grammar.binary_rules_for_parent(symbol) {
        let w = f.weights.binary_weight(rule);
        let lefts = counted_derivations(f, rule.left, terminals, start, split);
        let rights = counted_derivations(f, rule.right, terminals, split + 1, end);
        for (lw, lc) in lefts.iter() {
          for (rw, rc) in rights.iter() {
            let mut counts = lc.clone();
            counts.merge(rc);
            counts.add_binary(rule, 1.0);
            out.push((w * lw * rw, counts));
          }
        }
      }
    }
    out
  }

  #[test]
  fn test_inside_hockey() {
    let mut f = hockey();
    let input = f.input("gretzky plays ice hockey");
    let [s, s2, n, np, foo] = ["S", "S2", "N", "NP", "foo"].map(|x| f.symbols.get(x).unwrap());
    let chart = f.parser().parse_inside::<SumProduct>(&input).unwrap();

    let root = chart.inside(0, 3).unwrap();
    assert!(close(root.get(s).to_weight(), 0.0625));
    assert!(close(root.get(s2).to_weight(), 0.0625));
    let tail = chart.inside(2, 3).unwrap();
    assert!(close(tail.get(n).to_weight(), 0.25));
    assert!(close(tail.get(np).to_weight(), 0.0625));
    assert!(close(tail.get(foo).to_weight(), 0.03125));
    assert!(chart.inside(0, 1).unwrap().is_empty());
  }

  #[test]
  fn test_outside_hockey() {
    let mut f = hockey();
    let input = f.input("gretzky plays ice hockey");
    let [s, vp, n, v] = ["S", "VP", "N", "V"].map(|x| f.symbols.get(x).unwrap());
    let chart = f.parser().parse_marginal::<SumProduct>(&input, &RootPrior::Point(s)).unwrap();
    let z = chart.partition_function().unwrap().to_weight();
    assert!(close(z, 0.0625));

    assert!(close(chart.outside(1, 3).unwrap().get(vp).to_weight(), 0.25));
    assert!(close(chart.marginal(0, 3).unwrap().get(s).to_weight() / z, 1.0));
    assert!(close(chart.marginal(1, 3).unwrap().get(vp).to_weight() / z, 1.0));
    assert!(close(chart.marginal(2, 2).unwrap().get(n).to_weight(), 0.0));

    let counts = chart.normalized_expectations().unwrap();
    let s_rule = BinaryProduction::new(s, n, vp);
    let vp_rule = BinaryProduction::new(vp, v, n).with_type(f.symbols.get("rule2").unwrap());
    assert!(close(counts.binary(&s_rule), 1.0));
    assert!(close(counts.binary(&vp_rule), 1.0));
    assert!(close(counts.binary(&BinaryProduction::new(vp, v, n)), 0.0));

    let gretzky = TerminalProduction::new(n, vec![f.symbols.get("gretzky").unwrap()]);
    let hockey = TerminalProduction::new(n, vec![f.symbols.get("hockey").unwrap()]);
    let ice_hockey = TerminalProduction::new(n, f.symbols.intern_all("ice hockey"));
    assert!(close(counts.terminal(&gretzky), 1.0));
    assert!(close(counts.terminal(&hockey), 0.0));
    assert!(close(counts.terminal(&ice_hockey), 1.0));
  }

  #[test]
  fn test_inside_times_outside_is_marginal() {
    let mut f = ambiguous();
    let input = f.input("a b a a b");
    let chart = f.parser().parse_marginal::<SumProduct>(&input, &RootPrior::Uniform).unwrap();

    for start in 0..input.len() {
      for end in start..input.len() {
        let inside = chart.inside(start, end).unwrap();
        let outside = chart.outside(start, end).unwrap();
        for (p, w) in chart.marginal(start, end).unwrap().iter() {
          assert!(close(w.to_weight(), (inside.get(p) * outside.get(p)).to_weight()));
        }
      }
    }
    let root_total = chart.marginal(0, 4).unwrap().total();
    assert!(close(root_total.to_weight(), chart.partition_function().unwrap().to_weight()));
  }

  #[test]
  fn test_partition_function_matches_enumeration() {
    let mut f = ambiguous();
    let input = f.input("a b a a");
    let x = f.symbols.get("X").unwrap();
    let chart = f.parser().parse_marginal::<SumProduct>(&input, &RootPrior::Point(x)).unwrap();

    let brute: f64 = derivations(&f, x, &input, 0, 3).iter().sum();
    assert!(brute > 0.0);
    assert!(close(chart.partition_function().unwrap().to_weight(), brute));
  }

  #[test]
  fn test_expectations_match_enumeration() {
    let mut f = ambiguous();
    let input = f.input("a b a a b");
    let x = f.symbols.get("X").unwrap();
    let chart = f.parser().parse_marginal::<SumProduct>(&input, &RootPrior::Point(x)).unwrap();
    let counts = chart.normalized_expectations().unwrap();

    let all = counted_derivations(&f, x, &input, 0, 4);
    let z: f64 = all.iter().map(|(w, _)| w).sum();
    let mut expected = RuleExpectations::new();
    for (w, c) in all.iter() {
      let mut c = c.clone();
      c.scale(w / z);
      expected.merge(&c);
    }

    assert!(expected.binary.values().any(|c| *c > 0.0 && !close(*c, c.round())));
    for rule in f.grammar.binary_productions() {
      assert!(close(counts.binary(rule), expected.binary(rule)));
    }
    for rule in f.grammar.terminal_productions() {
      assert!(close(counts.terminal(rule), expected.terminal(rule)));
    }
  }

  #[test]
  fn test_root_prior_weights() {
    let mut f = ambiguous();
    let input = f.input("a a b");
    let [x, y] = ["X", "Y"].map(|s| f.symbols.get(s).unwrap());
    let prior = RootPrior::Weights([(x, 0.7), (y, 0.3)].into_iter().collect());
    let chart = f.parser().parse_marginal::<SumProduct>(&input, &prior).unwrap();

    let xs: f64 = derivations(&f, x, &input, 0, 2).iter().sum();
    let ys: f64 = derivations(&f, y, &input, 0, 2).iter().sum();
    assert!(close(chart.partition_function().unwrap().to_weight(), 0.7 * xs + 0.3 * ys));
    assert!(close(chart.root_distribution().unwrap().get(y).to_weight(), 0.3));
  }

  #[test]
  fn test_max_is_best_derivation() {
    let mut f = ambiguous();
    let input = f.input("a b a a b");
    let x = f.symbols.get("X").unwrap();
    let parser = f.parser();
    let chart = parser.parse_inside::<MaxProduct>(&input).unwrap();

    let all = derivations(&f, x, &input, 0, 4);
    let best = all.iter().copied().fold(0.0, f64::max);
    let root = chart.inside(0, 4).unwrap().get(x).to_weight();
    assert!(all.iter().all(|d| *d <= root + 1e-12));
    assert!(close(root, best));

    let tree = chart.best_tree(x).unwrap().unwrap();
    assert!(close(tree.probability(), root));
    assert!(close(parser.tree_probability(&tree, &RootPrior::Uniform), root));
    assert_eq!(tree.terminal_productions(), input);
    assert_eq!(tree.span(), (0, 4));
  }

  #[test]
  fn test_best_subtrees_cover_their_spans() {
    let mut f = hockey();
    let input = f.input("gretzky plays ice hockey");
    let [n, np] = ["N", "NP"].map(|x| f.symbols.get(x).unwrap());
    let chart = f.parser().parse_inside::<MaxProduct>(&input).unwrap();

    let leaf = chart.best_tree_with_span(n, 2, 3).unwrap().unwrap();
    assert!(leaf.is_leaf());
    assert_eq!(leaf.terminal_productions(), input[2..=3].to_vec());
    let np_tree = chart.best_tree_with_span(np, 2, 3).unwrap().unwrap();
    assert_eq!(np_tree.terminal_productions(), input[2..=3].to_vec());
    assert!(close(np_tree.probability(), 0.0625));
  }

  #[test]
  fn test_dog_barks() {
    let mut f = dog();
    let input = f.input("dog barks");
    let [s, np, vp] = ["S", "NP", "VP"].map(|x| f.symbols.get(x).unwrap());
    let parser = f.parser();

    let sum = parser.parse_marginal::<SumProduct>(&input, &RootPrior::Point(s)).unwrap();
    assert!(close(sum.partition_function().unwrap().to_weight(), 0.9));
    assert!(sum.inside(0, 0).unwrap().get(vp).is_zero());
    assert!(sum.inside(1, 1).unwrap().get(np).is_zero());
    assert!(sum.inside(0, 1).unwrap().get(np).is_zero());

    let max = parser.parse_marginal::<MaxProduct>(&input, &RootPrior::Point(s)).unwrap();
    let tree = max.best_tree(s).unwrap().unwrap();
    assert!(close(tree.probability(), 0.9));
    assert_eq!(
      format!("{}", tree.display(&f.symbols)),
      "(S\n  (NP \"dog\")\n  (VP \"barks\"))"
    );
    let trees = max.best_trees(s, 1).unwrap();
    assert_eq!(trees, vec![tree]);
  }

  #[test]
  fn test_no_parse_is_zero_not_error() {
    let mut f = dog();
    let input = f.input("cat barks");
    let s = f.symbols.get("S").unwrap();
    let parser = f.parser();

    let sum = parser.parse_marginal::<SumProduct>(&input, &RootPrior::Point(s)).unwrap();
    assert!(sum.partition_function().unwrap().is_zero());
    assert!(sum.normalized_expectations().unwrap().is_empty());

    let max = parser.parse_marginal::<MaxProduct>(&input, &RootPrior::Point(s)).unwrap();
    assert_eq!(max.best_tree(s), Ok(None));
    assert_eq!(max.best_trees(s, 1), Ok(Vec::new()));
  }

  #[test]
  fn test_kbest_ordering_and_bounds() {
    let mut f = ambiguous();
    let input = f.input("a b a a");
    let x = f.symbols.get("X").unwrap();
    let config = ParserConfig::default().with_kbest_width(10);
    let parser = CkyParser::with_config(&f.grammar, &f.weights, config);
    let chart = parser.parse_inside::<MaxProduct>(&input).unwrap();

    let mut all = derivations(&f, x, &input, 0, 3);
    all.sort_by(|a, b| b.partial_cmp(a).unwrap());

    let trees = chart.best_trees(x, 10).unwrap();
    assert_eq!(trees.len(), all.len().min(10));
    for (tree, expected) in trees.iter().zip(all.iter()) {
      assert!(close(tree.probability(), *expected));
      assert_eq!(tree.terminal_productions(), input);
    }
    assert!(trees.windows(2).all(|w| w[0].probability() >= w[1].probability()));

    let few = chart.best_trees(x, 3).unwrap();
    assert_eq!(few.len(), 3);
    assert!(close(few[0].probability(), all[0]));
  }

  #[test]
  fn test_kbest_with_prior() {
    let mut f = ambiguous();
    let input = f.input("a a");
    let [x, y] = ["X", "Y"].map(|s| f.symbols.get(s).unwrap());
    let config = ParserConfig::default().with_kbest_width(4);
    let parser = CkyParser::with_config(&f.grammar, &f.weights, config);
    let chart = parser.parse_inside::<MaxProduct>(&input).unwrap();

    let prior = RootPrior::Weights([(x, 0.5), (y, 2.0)].into_iter().collect());
    let trees = chart
      .best_trees_for_prior(&prior.distribution([x, y]), 4)
      .unwrap();
    // X -> X X, X -> X Y, Y -> X X and Y -> Y X each derive "a a" once
    assert_eq!(trees.len(), 4);
    assert_eq!(trees[0].root(), y);
    assert!(close(trees[0].probability(), 2.0 * 0.4 * 0.5 * 0.5));
    for tree in trees.iter() {
      assert!(close(tree.probability(), parser.tree_probability(tree, &prior)));
    }
  }

  #[test]
  fn test_log_semirings_agree() {
    let mut f = ambiguous();
    let input = f.input("a b a a b a");
    let x = f.symbols.get("X").unwrap();
    let parser = f.parser();
    let prior = RootPrior::Point(x);

    let linear = parser.parse_marginal::<SumProduct>(&input, &prior).unwrap();
    let log = parser.parse_marginal::<LogSumProduct>(&input, &prior).unwrap();
    assert!(close(
      linear.partition_function().unwrap().to_weight(),
      log.partition_function().unwrap().to_weight()
    ));
    let a = linear.normalized_expectations().unwrap();
    let b = log.normalized_expectations().unwrap();
    for (rule, count) in a.binary.iter() {
      assert!(close(*count, b.binary(rule)));
    }

    let max = parser.parse_inside::<MaxProduct>(&input).unwrap();
    let log_max = parser.parse_inside::<LogMaxProduct>(&input).unwrap();
    let t1 = max.best_tree(x).unwrap().unwrap();
    let t2 = log_max.best_tree(x).unwrap().unwrap();
    assert!(close(t1.probability(), t2.probability()));
    assert_eq!(t1.terminal_productions(), t2.terminal_productions());
  }

  #[test]
  fn test_log_space_avoids_underflow() {
    let mut f = Fixture::new();
    f.binary("X", "X", "X", 1e-3);
    f.terminal("X", "a", 1e-3);
    let input = f.input(&vec!["a"; 120].join(" "));
    let x = f.symbols.get("X").unwrap();
    let parser = f.parser();

    let linear = parser.parse_marginal::<SumProduct>(&input, &RootPrior::Point(x)).unwrap();
    assert!(linear.partition_function().unwrap().is_zero());
    let log = parser.parse_marginal::<LogSumProduct>(&input, &RootPrior::Point(x)).unwrap();
    let z = log.partition_function().unwrap();
    assert!(!z.is_zero());
    assert!(z.log_weight().is_finite());
  }

  #[test]
  fn test_filtered_grammar_prunes() {
    let mut f = hockey();
    let input = f.input("gretzky plays ice hockey");
    let [s, s2] = ["S", "S2"].map(|x| f.symbols.get(x).unwrap());
    let filtered = FilteredGrammar::new(&f.grammar, |_, _, _, r: &BinaryProduction| r.parent != s2);
    let parser = CkyParser::new(&filtered, &f.weights);
    let chart = parser.parse_inside::<SumProduct>(&input).unwrap();

    assert!(close(chart.inside(0, 3).unwrap().get(s).to_weight(), 0.0625));
    assert!(chart.inside(0, 3).unwrap().get(s2).is_zero());
  }

  #[test]
  fn test_preconditions() {
    let mut f = dog();
    let input = f.input("dog barks");
    let parser = f.parser();

    assert_eq!(
      parser.parse_inside::<SumProduct>(&[]).err(),
      Some(ChartError::EmptyInput)
    );

    let mut chart = ParseChart::<SumProduct>::new(3);
    assert_eq!(
      parser.fill_inside(&mut chart, &input),
      Err(ChartError::LengthMismatch { chart: 3, input: 2 })
    );

    let mut chart = ParseChart::<SumProduct>::new(2);
    assert_eq!(
      parser.fill_outside(&mut chart, &RootPrior::Uniform),
      Err(ChartError::InsideNotCalculated)
    );
    parser.fill_inside(&mut chart, &input).unwrap();
    assert_eq!(
      parser.fill_inside(&mut chart, &input),
      Err(ChartError::InsideAlreadyCalculated)
    );
    assert_eq!(chart.marginal(0, 1).err(), Some(ChartError::OutsideNotCalculated));
    parser.fill_outside(&mut chart, &RootPrior::Uniform).unwrap();
    assert_eq!(
      parser.fill_outside(&mut chart, &RootPrior::Uniform),
      Err(ChartError::OutsideAlreadyCalculated)
    );
    assert_eq!(chart.best_tree(Production(0)).err(), Some(ChartError::NotSelective));
  }

  #[test]
  fn test_corpus_expectations_train_cpt() {
    let mut f = ambiguous();
    let x = f.symbols.get("X").unwrap();
    let corpus = ["a b", "a a b", "b a", "a b a a", "b b", "a"]
      .map(|s| f.input(s))
      .to_vec();
    let mut with_gap = corpus.clone();
    with_gap.push(f.input("zzz"));
    let parser = f.parser();
    let prior = RootPrior::Point(x);

    let serial = parser.corpus_expectations::<SumProduct>(&with_gap, &prior, 1).unwrap();
    let parallel = parser.corpus_expectations::<SumProduct>(&with_gap, &prior, 3).unwrap();
    assert_eq!(serial.parsed, corpus.len());
    assert_eq!(serial.unparsable, 1);
    assert_eq!(parallel.parsed, serial.parsed);
    assert!(close(serial.log_likelihood, parallel.log_likelihood));
    for (rule, count) in serial.expectations.binary.iter() {
      assert!(close(*count, parallel.expectations.binary(rule)));
    }

    let mut expected_ll = 0.0;
    for sentence in corpus.iter() {
      let chart = parser.parse_marginal::<SumProduct>(sentence, &prior).unwrap();
      expected_ll += chart.partition_function().unwrap().to_weight().ln();
    }
    assert!(close(serial.log_likelihood, expected_ll));

    let mut cpt = CptTableProductionDistribution::new(&f.grammar);
    cpt.clear_cpts();
    cpt.increment_expectations(&serial.expectations, 1.0);
    let x_rules = f.grammar.binary_rules_for_parent(x).map(|r| cpt.binary_weight(r)).sum::<f64>();
    let x_terminals = f.grammar.terminal_rules_for_parent(x).map(|r| cpt.terminal_weight(r)).sum::<f64>();
    assert!(close(x_rules + x_terminals, 1.0));
  }

  #[test]
  fn test_corpus_expectations_reject_max_product() {
    let mut f = ambiguous();
    let x = f.symbols.get("X").unwrap();
    let corpus = vec![f.input("a b a")];
    let parser = f.parser();

    assert_eq!(
      parser.corpus_expectations::<MaxProduct>(&corpus, &RootPrior::Point(x), 1),
      Err(ChartError::Selective)
    );
    assert_eq!(
      parser
        .corpus_expectations::<LogMaxProduct>(&corpus, &RootPrior::Point(x), 2)
        .err(),
      Some(ChartError::Selective)
    );
    let summed = parser.corpus_expectations::<LogSumProduct>(&corpus, &RootPrior::Point(x), 1).unwrap();
    assert_eq!(summed.parsed, 1);
  }

  #[test]
  fn test_single_terminal_input() {
    let mut f = dog();
    let input = f.input("dog");
    let np = f.symbols.get("NP").unwrap();
    let chart = f.parser().parse_marginal::<MaxProduct>(&input, &RootPrior::Uniform).unwrap();

    assert!(close(chart.partition_function().unwrap().to_weight(), 1.0));
    assert!(close(chart.marginal(0, 0).unwrap().get(np).to_weight(), 1.0));
    let tree = chart.best_tree(np).unwrap().unwrap();
    assert!(tree.is_leaf());
  }
}
