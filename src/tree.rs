use std::fmt;

use crate::rules::{BinaryProduction, Rule, TerminalProduction};
use crate::semiring::Semiring;
use crate::symbols::{Production, SymbolTable};

/// A derivation extracted from a chart. Spans are inclusive terminal indexes.
///
/// The weight of a node is the product of its rule weight and its children's
/// weights, times any root prior folded in with `multiply`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTree<S> {
  Leaf {
    root: Production,
    rule_type: Option<Production>,
    terminals: Vec<Production>,
    weight: S,
    span: (usize, usize),
  },
  Node {
    root: Production,
    rule_type: Option<Production>,
    left: Box<ParseTree<S>>,
    right: Box<ParseTree<S>>,
    weight: S,
  },
}

impl<S: Semiring> ParseTree<S> {
  pub fn leaf(rule: &TerminalProduction, rule_weight: S, span_start: usize, span_end: usize) -> Self {
    Self::Leaf {
      root: rule.parent,
      rule_type: rule.rule_type,
      terminals: rule.terminals.clone(),
      weight: rule_weight,
      span: (span_start, span_end),
    }
  }

  pub fn node(rule: &BinaryProduction, rule_weight: S, left: Self, right: Self) -> Self {
    assert_eq!(
      left.span().1 + 1,
      right.span().0,
      "subtrees of a node must be adjacent"
    );
    let weight = rule_weight * left.weight() * right.weight();
    Self::Node {
      root: rule.parent,
      rule_type: rule.rule_type,
      left: Box::new(left),
      right: Box::new(right),
      weight,
    }
  }

  pub fn root(&self) -> Production {
    match self {
      Self::Leaf { root, .. } | Self::Node { root, .. } => *root,
    }
  }

  pub fn rule_type(&self) -> Option<Production> {
    match self {
      Self::Leaf { rule_type, .. } | Self::Node { rule_type, .. } => *rule_type,
    }
  }

  pub fn weight(&self) -> S {
    match self {
      Self::Leaf { weight, .. } | Self::Node { weight, .. } => *weight,
    }
  }

  /// Unnormalized probability of the derivation
  pub fn probability(&self) -> f64 {
    self.weight().to_weight()
  }

  pub fn span(&self) -> (usize, usize) {
    match self {
      Self::Leaf { span, .. } => *span,
      Self::Node { left, right, .. } => (left.span().0, right.span().1),
    }
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf { .. })
  }

  pub fn children(&self) -> Option<(&Self, &Self)> {
    match self {
      Self::Leaf { .. } => None,
      Self::Node { left, right, .. } => Some((&**left, &**right)),
    }
  }

  /// The rule used at the root of this tree
  pub fn rule(&self) -> Rule {
    match self {
      Self::Leaf {
        root,
        rule_type,
        terminals,
        ..
      } => Rule::Terminal(TerminalProduction {
        parent: *root,
        terminals: terminals.clone(),
        rule_type: *rule_type,
      }),
      Self::Node {
        root,
        rule_type,
        left,
        right,
        ..
      } => Rule::Binary(BinaryProduction {
        parent: *root,
        left: left.root(),
        right: right.root(),
        rule_type: *rule_type,
      }),
    }
  }

  /// The terminals covered by this tree, left to right
  pub fn terminal_productions(&self) -> Vec<Production> {
    let mut out = Vec::new();
    self.collect_terminals(&mut out);
    out
  }

  fn collect_terminals(&self, out: &mut Vec<Production>) {
    match self {
      Self::Leaf { terminals, .. } => out.extend_from_slice(terminals),
      Self::Node { left, right, .. } => {
        left.collect_terminals(out);
        right.collect_terminals(out);
      }
    }
  }

  /// Scales the root weight, e.g. by a prior over root symbols. Subtree
  /// weights are unchanged.
  pub fn multiply(mut self, factor: S) -> Self {
    match &mut self {
      Self::Leaf { weight, .. } | Self::Node { weight, .. } => *weight = *weight * factor,
    }
    self
  }

  pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> TreeDisplay<'a, S> {
    TreeDisplay { tree: self, symbols }
  }
}

pub struct TreeDisplay<'a, S> {
  tree: &'a ParseTree<S>,
  symbols: &'a SymbolTable,
}

impl<S: Semiring> fmt::Display for TreeDisplay<'_, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = self.symbols;
    match self.tree {
      ParseTree::Leaf { root, terminals, .. } => {
        write!(f, "({}", s.display(*root))?;
        for t in terminals.iter() {
          write!(f, " \"{}\"", s.display(*t))?;
        }
        write!(f, ")")
      }
      ParseTree::Node { root, left, right, .. } => {
        write!(f, "({}", s.display(*root))?;
        for child in [left, right] {
          let fmt = format!("{}", child.display(s));
          for line in fmt.lines() {
            write!(f, "\n  {}", line)?;
          }
        }
        write!(f, ")")
      }
    }
  }
}
