use std::error::Error;

use thiserror::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Misuse of a parse chart or parser. These are caller bugs, never a signal
/// that a sentence has no parse: that case is a zero partition function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
  #[error("cannot parse an empty terminal sequence")]
  EmptyInput,

  #[error("inside probabilities have not been calculated")]
  InsideNotCalculated,

  #[error("inside probabilities were already calculated for this chart")]
  InsideAlreadyCalculated,

  #[error("outside probabilities have not been calculated")]
  OutsideNotCalculated,

  #[error("outside probabilities were already calculated for this chart")]
  OutsideAlreadyCalculated,

  #[error("span {start}..={end} is outside a chart over {len} terminals")]
  SpanOutOfRange { start: usize, end: usize, len: usize },

  #[error("chart holds {chart} terminals but the input has {input}")]
  LengthMismatch { chart: usize, input: usize },

  #[error("tree extraction needs a max-product chart")]
  NotSelective,

  #[error("expected rule counts need a sum-product semiring, not a max-product one")]
  Selective,

  #[error("requested {requested} trees but the chart keeps only {width} backpointers per entry")]
  BeamTooNarrow { requested: usize, width: usize },
}
