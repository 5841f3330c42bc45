/*!
  Every failure the table compiler can report. The variants fall into four families:

    * configuration errors, raised while looking up selectors, slots and tables;
    * structural invariant violations, which indicate malformed input or a bug in one of the
      build passes;
    * unimplemented node kinds;
    * input errors from the record reader.

  Ambiguous insertions are not errors while the tree is being built. They become an
  `UnresolvedOverflow` only when the finished tree is audited before emission.
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
  // region Configuration errors

  #[error("unknown selector type '{0}'")]
  UnknownSelector(String),

  #[error("unknown slot name '{slot}' for selector type '{selector}'")]
  UnknownSlot {
    selector: String,
    slot: String
  },

  #[error("invalid number of arguments for selector type '{selector}': expected {expected}, got {actual}")]
  ArgumentCount {
    selector: String,
    expected: usize,
    actual: usize
  },

  #[error("invalid selector type expression '{0}'")]
  InvalidTypeExpression(String),

  #[error("invalid slot expression '{0}'")]
  InvalidSlotExpression(String),

  #[error("refining prefix '{prefix}' is not supported for instruction encoding '{encoding}'")]
  UnsupportedPrefix {
    encoding: String,
    prefix: String
  },

  #[error("no opcode table exists for {0}")]
  InvalidTable(String),

  // endregion

  // region Structural invariant violations

  #[error("multiple negated entries in selector node '{selector}' (slots '{existing}' and '{requested}')")]
  MultipleNegatedEntries {
    selector: String,
    existing: String,
    requested: String
  },

  #[error("selector node '{selector}' has a non-empty entry in slot '{slot}' that is already covered by the negated entry in slot '{negated}'")]
  NegatedSlotCollision {
    selector: String,
    slot: String,
    negated: String
  },

  #[error("overflow node reached emission below '{0}'")]
  OverflowReachedEmission(String),

  #[error("unsupported node kind '{0}' reached emission")]
  UnsupportedNode(String),

  #[error("internal consistency failure: {0}")]
  Unreachable(String),

  // endregion

  #[error("not implemented: {0}")]
  Unimplemented(String),

  #[error("{} unresolved overflow node(s) in the decoder tree:\n  {}", .0.len(), .0.join("\n  "))]
  UnresolvedOverflow(Vec<String>),

  #[error("malformed instruction record: {0}")]
  Record(String),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

pub type TreeResult<T> = Result<T, TreeError>;
