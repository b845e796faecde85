/// Tuning knobs for a `CkyParser`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
  /// Backpointers kept per chart entry in selective charts, i.e. how many
  /// trees `ParseChart::best_trees` can return
  pub kbest_width: usize,
  /// Partial trees kept per span by `CkyParser::beam_search`
  pub beam_size: usize,
  /// Inputs at least this long whose partition function comes out zero in a
  /// linear-space semiring are logged as a likely underflow
  pub underflow_warning_len: usize,
}

impl Default for ParserConfig {
  fn default() -> Self {
    Self {
      kbest_width: 1,
      beam_size: 100,
      underflow_warning_len: 50,
    }
  }
}

impl ParserConfig {
  pub fn with_kbest_width(self, kbest_width: usize) -> Self {
    assert!(kbest_width > 0, "k-best width must be positive");
    Self { kbest_width, ..self }
  }

  pub fn with_beam_size(self, beam_size: usize) -> Self {
    assert!(beam_size > 0, "beam size must be positive");
    Self { beam_size, ..self }
  }

  pub fn with_underflow_warning_len(self, underflow_warning_len: usize) -> Self {
    Self {
      underflow_warning_len,
      ..self
    }
  }
}
