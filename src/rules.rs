use std::fmt;

use crate::symbols::{Production, SymbolTable};

/// A Chomsky normal form rule `parent -> left right`.
///
/// `rule_type` is an optional auxiliary label. Rules that differ only in their
/// type are distinct rules, with their own weight and expected count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryProduction {
  pub parent: Production,
  pub left: Production,
  pub right: Production,
  pub rule_type: Option<Production>,
}

impl BinaryProduction {
  pub fn new(parent: Production, left: Production, right: Production) -> Self {
    Self {
      parent,
      left,
      right,
      rule_type: None,
    }
  }

  pub fn with_type(self, rule_type: Production) -> Self {
    Self {
      rule_type: Some(rule_type),
      ..self
    }
  }

  pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> RuleDisplay<'a> {
    RuleDisplay {
      rule: RuleRef::Binary(self),
      symbols,
    }
  }
}

/// A terminal rule `parent -> t1 t2 ... tk`, k >= 1. Producing more than one
/// terminal lets a multi-word unit be a single lexical entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalProduction {
  pub parent: Production,
  pub terminals: Vec<Production>,
  pub rule_type: Option<Production>,
}

impl TerminalProduction {
  pub fn new(parent: Production, terminals: Vec<Production>) -> Self {
    assert!(
      !terminals.is_empty(),
      "terminal production must produce at least one terminal"
    );
    Self {
      parent,
      terminals,
      rule_type: None,
    }
  }

  pub fn with_type(self, rule_type: Production) -> Self {
    Self {
      rule_type: Some(rule_type),
      ..self
    }
  }

  /// Number of terminals covered by this rule
  pub fn len(&self) -> usize {
    self.terminals.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> RuleDisplay<'a> {
    RuleDisplay {
      rule: RuleRef::Terminal(self),
      symbols,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
  Binary(BinaryProduction),
  Terminal(TerminalProduction),
}

impl Rule {
  pub fn parent(&self) -> Production {
    match self {
      Self::Binary(r) => r.parent,
      Self::Terminal(r) => r.parent,
    }
  }

  pub fn rule_type(&self) -> Option<Production> {
    match self {
      Self::Binary(r) => r.rule_type,
      Self::Terminal(r) => r.rule_type,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Terminal(_))
  }

  pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> RuleDisplay<'a> {
    let rule = match self {
      Self::Binary(r) => RuleRef::Binary(r),
      Self::Terminal(r) => RuleRef::Terminal(r),
    };
    RuleDisplay { rule, symbols }
  }
}

impl From<BinaryProduction> for Rule {
  fn from(r: BinaryProduction) -> Self {
    Self::Binary(r)
  }
}

impl From<TerminalProduction> for Rule {
  fn from(r: TerminalProduction) -> Self {
    Self::Terminal(r)
  }
}

#[derive(Debug, Clone, Copy)]
enum RuleRef<'a> {
  Binary(&'a BinaryProduction),
  Terminal(&'a TerminalProduction),
}

pub struct RuleDisplay<'a> {
  rule: RuleRef<'a>,
  symbols: &'a SymbolTable,
}

impl fmt::Display for RuleDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = self.symbols;
    let rule_type = match self.rule {
      RuleRef::Binary(r) => {
        write!(
          f,
          "{} -> {} {}",
          s.display(r.parent),
          s.display(r.left),
          s.display(r.right)
        )?;
        r.rule_type
      }
      RuleRef::Terminal(r) => {
        write!(f, "{} ->", s.display(r.parent))?;
        for t in r.terminals.iter() {
          write!(f, " \"{}\"", s.display(*t))?;
        }
        r.rule_type
      }
    };
    if let Some(t) = rule_type {
      write!(f, " <{}>", s.display(t))?;
    }
    Ok(())
  }
}
