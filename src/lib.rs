#[macro_use]
extern crate lazy_static;

pub mod beam;
pub mod chart;
pub mod config;
pub mod distribution;
pub mod error;
pub mod grammar;
pub mod heap;
pub mod parse_grammar;
pub mod parser;
pub mod rules;
pub mod semiring;
pub mod symbols;
pub mod tree;

pub use crate::beam::BeamSearchChart;
pub use crate::chart::{Distribution, ParseChart};
pub use crate::config::ParserConfig;
pub use crate::distribution::{
  CptProductionDistribution, CptTableProductionDistribution, ProductionDistribution, RuleExpectations, RuleWeights,
};
pub use crate::error::{ChartError, Err};
pub use crate::grammar::{BasicGrammar, FilteredGrammar, Grammar};
pub use crate::parse_grammar::WeightedGrammar;
pub use crate::parser::{CkyParser, CorpusExpectations, RootPrior};
pub use crate::rules::{BinaryProduction, Rule, TerminalProduction};
pub use crate::semiring::{LogMaxProduct, LogSumProduct, MaxProduct, Semiring, SumProduct};
pub use crate::symbols::{Production, SymbolTable};
pub use crate::tree::ParseTree;

#[test]
fn test_text_grammar_end_to_end() {
  let mut g: WeightedGrammar = r#"
    S -> NP VP : 1.0;
    VP -> V NP : 0.7;
    VP -> VP PP : 0.3;
    NP -> NP PP : 0.4;
    PP -> P NP : 1.0;
    NP -> "astronomers" : 0.1;
    NP -> "ears" : 0.18;
    NP -> "saw" : 0.04;
    NP -> "stars" : 0.18;
    NP -> "telescopes" : 0.1;
    V -> "saw" : 1.0;
    P -> "with" : 1.0;
  "#
  .parse()
  .unwrap();

  let input = g.tokenize("astronomers saw stars with ears");
  let s = g.symbol("S").unwrap();
  let parser = g.parser();

  // the two attachments of "with ears"
  let high = 1.0 * 0.1 * 0.3 * (0.7 * 1.0 * 0.18) * (1.0 * 1.0 * 0.18);
  let low = 1.0 * 0.1 * (0.7 * 1.0 * (0.4 * 0.18 * (1.0 * 1.0 * 0.18)));

  let chart = parser.parse_marginal::<SumProduct>(&input, &RootPrior::Point(s)).unwrap();
  assert!((chart.partition_function().unwrap().to_weight() - (high + low)).abs() < 1e-12);

  let chart = parser.parse_inside::<MaxProduct>(&input).unwrap();
  let best = chart.best_tree(s).unwrap().unwrap();
  assert!((best.probability() - high.max(low)).abs() < 1e-12);
  assert_eq!(best.terminal_productions(), input);
}
