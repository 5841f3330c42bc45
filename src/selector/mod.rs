/*!
  Selector definitions describe the switch tables of the decoder tree: a selector has a name, an
  ordered list of parameter names and an ordered list of slot names. A selector node instance
  built from a definition has one entry per slot.

  The definitions themselves are static configuration. They live in `catalog`, and the textual
  forms found in instruction records (`modrm_mod`, `!3`, `name[arg,arg]`) are parsed in `parse`.
*/

mod catalog;
mod parse;

pub use catalog::*;
pub use parse::{parse_hex_byte, parse_slot_expression, parse_type_expression};

use std::fmt::{Display, Formatter};
use std::ops::Not;

use string_cache::DefaultAtom;

use crate::error::{TreeError, TreeResult};

/// Addresses one slot of a selector node, either its regular entry or its negated entry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SlotIndex {
  pub index   : usize,
  pub negated : bool
}

impl SlotIndex {
  pub fn new(index: usize, negated: bool) -> SlotIndex {
    SlotIndex{ index, negated }
  }

  pub fn regular(index: usize) -> SlotIndex {
    SlotIndex{ index, negated: false }
  }

  pub fn negated(index: usize) -> SlotIndex {
    SlotIndex{ index, negated: true }
  }
}

impl From<usize> for SlotIndex {
  fn from(index: usize) -> Self {
    SlotIndex::regular(index)
  }
}

impl Not for SlotIndex {
  type Output = SlotIndex;
  fn not(self) -> SlotIndex {
    SlotIndex{ index: self.index, negated: !self.negated }
  }
}

impl Display for SlotIndex {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.negated {
      true  => write!(f, "!{}", self.index),
      false => write!(f, "{}", self.index)
    }
  }
}


/// The static description of one selector (switch table) type.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SelectorDefinition {
  pub name        : DefaultAtom,
  pub parameters  : Vec<DefaultAtom>,
  pub slots       : Vec<DefaultAtom>,
  pub description : &'static str,
}

impl SelectorDefinition {
  pub fn new<S>(name: &str, parameters: &[&str], slots: S) -> SelectorDefinition
    where S: IntoIterator,
          S::Item: AsRef<str>
  {
    SelectorDefinition{
      name        : DefaultAtom::from(name),
      parameters  : parameters.iter().map(|p| DefaultAtom::from(*p)).collect(),
      slots       : slots.into_iter().map(|s| DefaultAtom::from(s.as_ref())).collect(),
      description : ""
    }
  }

  pub fn with_description(mut self, description: &'static str) -> SelectorDefinition {
    self.description = description;
    self
  }

  pub fn number_of_parameters(&self) -> usize {
    self.parameters.len()
  }

  /// The number of switch-table entries of a node built from this definition.
  pub fn number_of_entries(&self) -> usize {
    self.slots.len()
  }

  /// Returns the slot name for `index`, or `"?"` if out of range.
  pub fn slot_name(&self, index: usize) -> &str {
    self.slots.get(index).map(|s| &**s).unwrap_or("?")
  }

  /// Renders a slot index the way it appears in instruction records, e.g. `!3`.
  pub fn slot_expression(&self, index: SlotIndex) -> String {
    match index.negated {
      true  => format!("!{}", self.slot_name(index.index)),
      false => self.slot_name(index.index).to_string()
    }
  }

  /**
    Parses a slot expression into a `SlotIndex`. A leading `!` marks the index as negated. Slot
    names are compared case-insensitively. An unknown slot name is a configuration error.
  */
  pub fn parse_index(&self, slot_expression: &str) -> TreeResult<SlotIndex> {
    let (negated, name) = parse_slot_expression(slot_expression)?;

    self.slots
        .iter()
        .position(|slot| (**slot).eq_ignore_ascii_case(name))
        .map(|index| SlotIndex::new(index, negated))
        .ok_or_else(|| TreeError::UnknownSlot {
          selector: self.to_string(),
          slot: slot_expression.to_string()
        })
  }
}

impl Display for SelectorDefinition {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.parameters.is_empty() {
      write!(f, "{}", self.name)
    } else {
      write!(
        f,
        "{}[{}]",
        self.name,
        self.parameters.iter().map(|p| p.to_string()).collect::<Vec<String>>().join(",")
      )
    }
  }
}


/// A runtime action the decoder performs before continuing with the next node.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FunctionDefinition {
  pub name        : DefaultAtom,
  pub parameters  : Vec<DefaultAtom>,
  pub description : &'static str,
}

impl FunctionDefinition {
  pub fn number_of_parameters(&self) -> usize {
    self.parameters.len()
  }
}

impl Display for FunctionDefinition {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}({})",
      self.name,
      self.parameters.iter().map(|p| p.to_string()).collect::<Vec<String>>().join(",")
    )
  }
}
