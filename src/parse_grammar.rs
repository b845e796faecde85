//! Simple recursive-descent parsing of weighted grammar files

use regex::Regex;
use std::str::FromStr;

use crate::Err;
use crate::distribution::RuleWeights;
use crate::grammar::BasicGrammar;
use crate::parser::CkyParser;
use crate::rules::{BinaryProduction, TerminalProduction};
use crate::symbols::{Production, SymbolTable};

/// A grammar read from text, with the symbol table that names its symbols and
/// the weights given to its rules.
///
/// ```text
/// // comments run to the end of the line
/// S -> NP VP : 0.9;
/// NP -> "dog";                // weight defaults to 1
/// N -> "ice" "hockey" : 0.25; // several terminals in one rule
/// VP -> V N <rule2>;          // optional rule type
/// ```
///
/// Nonterminal rules have exactly two bare symbols on the right; terminal
/// rules have one or more quoted terminals. A rule given twice keeps the
/// last weight.
#[derive(Debug, Default, Clone)]
pub struct WeightedGrammar {
  pub symbols: SymbolTable,
  pub grammar: BasicGrammar,
  pub weights: RuleWeights,
}

impl WeightedGrammar {
  /// Interns a whitespace-separated sentence into terminals
  pub fn tokenize(&mut self, sentence: &str) -> Vec<Production> {
    self.symbols.intern_all(sentence)
  }

  pub fn symbol(&self, name: &str) -> Option<Production> {
    self.symbols.get(name)
  }

  pub fn parser(&self) -> CkyParser<'_, BasicGrammar, RuleWeights> {
    CkyParser::new(&self.grammar, &self.weights)
  }

  fn add(&mut self, spec: RuleSpec<'_>) -> Result<(), Err> {
    let parent = self.symbols.intern(spec.parent);
    let rule_type = spec.rule_type.map(|t| self.symbols.intern(t));

    let all_terminals = spec.rhs.iter().all(|r| matches!(r, Rhs::Terminal(_)));
    let all_symbols = spec.rhs.iter().all(|r| matches!(r, Rhs::Symbol(_)));

    if all_terminals {
      let terminals = spec
        .rhs
        .iter()
        .map(|r| self.symbols.intern(r.name()))
        .collect::<Vec<_>>();
      let mut rule = TerminalProduction::new(parent, terminals);
      rule.rule_type = rule_type;
      self.grammar.add_terminal(rule.clone());
      self.weights.set_terminal(rule, spec.weight);
      Ok(())
    } else if all_symbols && spec.rhs.len() == 2 {
      let left = self.symbols.intern(spec.rhs[0].name());
      let right = self.symbols.intern(spec.rhs[1].name());
      let mut rule = BinaryProduction::new(parent, left, right);
      rule.rule_type = rule_type;
      self.grammar.add_production_rule(rule.clone());
      self.weights.set_binary(rule, spec.weight);
      Ok(())
    } else if all_symbols {
      Err(
        format!(
          "rule for {} needs exactly two nonterminals, got {}",
          spec.parent,
          spec.rhs.len()
        )
        .into(),
      )
    } else {
      Err(format!("rule for {} mixes terminals and nonterminals", spec.parent).into())
    }
  }
}

impl FromStr for WeightedGrammar {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (specs, s) = parse_rules(s)?;
    assert!(s.is_empty());

    if specs.is_empty() {
      return Err("empty ruleset".into());
    }

    let mut grammar = Self::default();
    for spec in specs {
      grammar.add(spec)?;
    }
    Ok(grammar)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rhs<'a> {
  Symbol(&'a str),
  Terminal(&'a str),
}

impl<'a> Rhs<'a> {
  fn name(&self) -> &'a str {
    match self {
      Self::Symbol(s) | Self::Terminal(s) => *s,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
struct RuleSpec<'a> {
  parent: &'a str,
  rhs: Vec<Rhs<'a>>,
  rule_type: Option<&'a str>,
  weight: f64,
}

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => {
      let (_, rest) = s.split_at(m.end());
      (Some(m.as_str()), rest)
    }
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", re, s).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", c, s).into())
  }
}

/// Tries to skip whitespace and // comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"(\s+|//[^\n]*)+");
  optional_re(&*WHITESPACE_OR_COMMENT, s).1
}

/// Tries to parse a name made of letters, numbers, - and _
fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"[a-zA-Z0-9\-_]+");
  needed_re(&*NAME, s).map_err(|err| format!("name: {}", err).into())
}

/// A double-quoted terminal. Terminals are single tokens, so no whitespace.
fn parse_terminal(s: &str) -> ParseResult<'_, &str> {
  regex_static!(TERMINAL, r#"^"[^"\s]+""#);
  let (quoted, s) = needed_re(&*TERMINAL, s).map_err(|e| -> Err { format!("terminal: {}", e).into() })?;
  Ok((&quoted[1..quoted.len() - 1], s))
}

fn parse_weight(s: &str) -> ParseResult<'_, f64> {
  regex_static!(NUMBER, r"[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?");
  let (text, s) = needed_re(&*NUMBER, s).map_err(|e| -> Err { format!("weight: {}", e).into() })?;
  let weight = text.parse::<f64>()?;
  if !weight.is_finite() {
    return Err(format!("weight must be finite: {}", text).into());
  }
  Ok((weight, s))
}

/// Optional <type> label
fn parse_rule_type(s: &str) -> ParseResult<'_, Option<&str>> {
  let (open, s) = optional_char('<', s);
  if open.is_none() {
    return Ok((None, s));
  }
  let s = skip_whitespace(s);
  let (name, s) = parse_name(s).map_err(|e| -> Err { format!("rule type: {}", e).into() })?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char('>', s)?;
  Ok((Some(name), s))
}

/// Symbol, arrow, right-hand side, optional type and weight, terminated by ;
fn parse_rule(s: &str) -> ParseResult<'_, RuleSpec<'_>> {
  #![allow(clippy::trivial_regex)]
  regex_static!(ARROW, "->");

  let (parent, s) = parse_name(s).map_err(|e| -> Err { format!("rule symbol: {}", e).into() })?;
  let s = skip_whitespace(s);
  let (_, s) = needed_re(&*ARROW, s).map_err(|e| -> Err { format!("rule arrow: {}", e).into() })?;

  let mut rhs = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.starts_with('"') {
      let (t, s) = parse_terminal(rem)?;
      rhs.push(Rhs::Terminal(t));
      rem = s;
    } else if let Ok((name, s)) = parse_name(rem) {
      rhs.push(Rhs::Symbol(name));
      rem = s;
    } else {
      break;
    }
  }
  if rhs.is_empty() {
    return Err(format!("rule for {} has an empty right-hand side", parent).into());
  }

  let (rule_type, s) = parse_rule_type(rem)?;
  let s = skip_whitespace(s);
  let (weight, s) = if let (Some(_), s) = optional_char(':', s) {
    parse_weight(skip_whitespace(s)).map_err(|e| -> Err { format!("rule for {}: {}", parent, e).into() })?
  } else {
    (1.0, s)
  };
  let s = skip_whitespace(s);
  let (_, s) = needed_char(';', s).map_err(|e| -> Err { format!("rule for {}: {}", parent, e).into() })?;

  Ok((
    RuleSpec {
      parent,
      rhs,
      rule_type,
      weight,
    },
    s,
  ))
}

fn parse_rules(s: &str) -> ParseResult<'_, Vec<RuleSpec<'_>>> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok((rules, rem));
    }
    let (rule, s) = parse_rule(rem)?;
    rules.push(rule);
    rem = s;
  }
}
