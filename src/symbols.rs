use std::collections::HashMap;
use std::fmt;

/// An interned grammar symbol. Two productions are equal iff their ids are,
/// and the id doubles as a dense array index into the owning `SymbolTable`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Production(pub u32);

impl Production {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Caller-owned interning table. Symbols (nonterminals and terminals share one
/// namespace) get ids in first-seen order, so a table built from the same
/// grammar source always assigns the same ids.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolTable {
  names: Vec<String>,
  ids: HashMap<String, Production>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn intern(&mut self, name: &str) -> Production {
    if let Some(p) = self.ids.get(name) {
      return *p;
    }
    let p = Production(self.names.len() as u32);
    self.names.push(name.to_string());
    self.ids.insert(name.to_string(), p);
    p
  }

  /// Interns every whitespace-separated token of `sentence`
  pub fn intern_all(&mut self, sentence: &str) -> Vec<Production> {
    sentence.split_whitespace().map(|w| self.intern(w)).collect()
  }

  pub fn get(&self, name: &str) -> Option<Production> {
    self.ids.get(name).copied()
  }

  /// Get a symbol's name. Assumes the production came from this table, panics otherwise
  pub fn name(&self, p: Production) -> &str {
    self
      .names
      .get(p.index())
      .map(String::as_str)
      .expect("production from a different symbol table")
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (Production, &str)> + '_ {
    self
      .names
      .iter()
      .enumerate()
      .map(|(idx, name)| (Production(idx as u32), name.as_str()))
  }

  pub fn display(&self, p: Production) -> SymbolDisplay<'_> {
    SymbolDisplay { table: self, p }
  }
}

pub struct SymbolDisplay<'a> {
  table: &'a SymbolTable,
  p: Production,
}

impl fmt::Display for SymbolDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.table.names.get(self.p.index()) {
      Some(name) => write!(f, "{}", name),
      None => write!(f, "#{}", self.p.0),
    }
  }
}
