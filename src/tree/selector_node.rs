/*!
  Selector nodes: the switch tables of the decoder tree.

  A selector node has one regular entry per slot, plus at most one *negated* entry. A negated
  entry at slot `k` means "every slot except `k` goes here". This is how a record filter like
  `modrm_mod: !3` is stored without copying its subtree into slots 0, 1 and 2. `SlotTable` makes
  the "at most one negated entry" rule part of the type: a table is either plain, or it excludes
  exactly one slot.

  A regular entry that is also covered by the negated entry (any non-empty regular entry at an
  index other than the excluded slot) is accepted by `set` and reported when the effective entries
  are read.
*/

use std::fmt::{Display, Formatter};

use crate::error::{TreeError, TreeResult};
use crate::selector::{SelectorDefinition, SlotIndex};
use crate::tables::TableKey;
use crate::tree::{DataNode, NodeId};

#[derive(Clone, Debug, Eq, PartialEq)]
enum SlotTable {
  Plain {
    entries: Vec<Option<NodeId>>
  },
  Excluding {
    entries   : Vec<Option<NodeId>>,
    slot      : usize,
    otherwise : NodeId
  }
}

impl SlotTable {
  fn entries(&self) -> &Vec<Option<NodeId>> {
    match self {
      SlotTable::Plain{ entries } | SlotTable::Excluding{ entries, .. } => entries
    }
  }

  fn entries_mut(&mut self) -> &mut Vec<Option<NodeId>> {
    match self {
      SlotTable::Plain{ entries } | SlotTable::Excluding{ entries, .. } => entries
    }
  }

  fn negated(&self) -> Option<(usize, NodeId)> {
    match self {
      SlotTable::Plain{ .. }                    => None,
      SlotTable::Excluding{ slot, otherwise, .. } => Some((*slot, *otherwise))
    }
  }
}


#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectorNode {
  pub definition : &'static SelectorDefinition,
  pub arguments  : Vec<DataNode>,
  /// Set only for the root selector of an opcode table.
  pub table      : Option<TableKey>,
  slots          : SlotTable,
}

impl SelectorNode {
  /// Creates an empty selector node. The number of arguments must equal the number of parameters.
  pub fn new<S>(definition: &'static SelectorDefinition, arguments: &[S]) -> TreeResult<SelectorNode>
    where S: AsRef<str>
  {
    if arguments.len() != definition.number_of_parameters() {
      return Err(TreeError::ArgumentCount {
        selector: definition.name.to_string(),
        expected: definition.number_of_parameters(),
        actual: arguments.len()
      });
    }

    Ok(SelectorNode{
      definition,
      arguments : arguments.iter().map(|a| DataNode::new(a.as_ref())).collect(),
      table     : None,
      slots     : SlotTable::Plain{ entries: vec![None; definition.number_of_entries()] }
    })
  }

  /// Creates the 256-slot root node of an opcode table.
  pub fn opcode_table(table: TableKey) -> SelectorNode {
    SelectorNode{
      definition : &*crate::selector::OPCODE_TABLE,
      arguments  : Vec::new(),
      table      : Some(table),
      slots      : SlotTable::Plain{ entries: vec![None; 256] }
    }
  }

  pub fn number_of_entries(&self) -> usize {
    self.definition.number_of_entries()
  }

  /// The size of this node's own header and switch table when flattened.
  pub fn encoded_size(&self) -> usize {
    1 + self.arguments.len().saturating_sub(1) + self.number_of_entries()
  }

  /// Whether this node was built from the given definition (by identity) and arguments.
  pub fn is_constructed_from<S>(&self, definition: &SelectorDefinition, arguments: &[S]) -> bool
    where S: AsRef<str>
  {
    std::ptr::eq(self.definition, definition)
      && self.arguments.len() == arguments.len()
      && self.arguments.iter().zip(arguments).all(|(a, b)| a.value == b.as_ref())
  }

  fn check_index(&self, index: SlotIndex) -> TreeResult<()> {
    match index.index < self.number_of_entries() {
      true  => Ok(()),
      false => Err(TreeError::UnknownSlot {
        selector: self.to_string(),
        slot: index.to_string()
      })
    }
  }

  /// Fails exactly when `set(index, Some(_))` would.
  pub fn check_settable(&self, index: SlotIndex) -> TreeResult<()> {
    self.check_index(index)?;
    match self.slots.negated() {
      Some((slot, _)) if index.negated && slot != index.index => {
        Err(TreeError::MultipleNegatedEntries {
          selector: self.to_string(),
          existing: self.definition.slot_expression(SlotIndex::negated(slot)),
          requested: self.definition.slot_expression(index)
        })
      }
      _ => Ok(())
    }
  }

  pub fn get(&self, index: SlotIndex) -> Option<NodeId> {
    if index.negated {
      match self.slots.negated() {
        Some((slot, otherwise)) if slot == index.index => Some(otherwise),
        _                                              => None
      }
    } else {
      self.slots.entries().get(index.index).copied().flatten()
    }
  }

  /**
    Sets or clears an entry. Setting a negated entry while a different slot already holds the
    negated entry is an error. Clearing the negated entry turns the table back into a plain one.
  */
  pub fn set(&mut self, index: SlotIndex, node: Option<NodeId>) -> TreeResult<()> {
    if node.is_some() {
      self.check_settable(index)?;
    } else {
      self.check_index(index)?;
    }

    if !index.negated {
      self.slots.entries_mut()[index.index] = node;
      return Ok(());
    }

    let existing = self.slots.negated();
    let entries = std::mem::take(self.slots.entries_mut());
    self.slots =
      match (existing, node) {
        (_, Some(otherwise)) => SlotTable::Excluding{ entries, slot: index.index, otherwise },

        (Some((slot, otherwise)), None) if slot != index.index => {
          SlotTable::Excluding{ entries, slot, otherwise }
        }

        (_, None) => SlotTable::Plain{ entries },
      }; // end match (existing, node)

    Ok(())
  }

  /// The excluded slot and its "every other slot" target, if any.
  pub fn negated_entry(&self) -> Option<(usize, NodeId)> {
    self.slots.negated()
  }

  pub fn has_non_empty_entries(&self) -> bool {
    self.slots.negated().is_some() || self.slots.entries().iter().any(Option::is_some)
  }

  /// Iterates the regular entries (in slot order) followed by the negated entries (in slot order).
  pub fn virtual_slots(&self) -> impl Iterator<Item = (SlotIndex, Option<NodeId>)> + '_ {
    let count = self.number_of_entries();
    let regular = (0..count).map(move |i| (SlotIndex::regular(i), self.get(SlotIndex::regular(i))));
    let negated = (0..count).map(move |i| (SlotIndex::negated(i), self.get(SlotIndex::negated(i))));
    regular.chain(negated)
  }

  /// The populated subset of `virtual_slots()`.
  pub fn populated_slots(&self) -> impl Iterator<Item = (SlotIndex, NodeId)> + '_ {
    self.virtual_slots().filter_map(|(index, node)| node.map(|node| (index, node)))
  }

  /**
    Resolves the negated entry into the plain per-slot view the decoder sees: the excluded slot
    keeps its regular entry, and every other slot gets the negated entry's target.
  */
  pub fn effective_entries(&self) -> TreeResult<Vec<Option<NodeId>>> {
    match &self.slots {

      SlotTable::Plain{ entries } => Ok(entries.clone()),

      SlotTable::Excluding{ entries, slot, otherwise } => {
        let mut effective = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
          if i == *slot {
            effective.push(*entry);
          } else if entry.is_some() {
            return Err(TreeError::NegatedSlotCollision {
              selector: self.to_string(),
              slot: self.definition.slot_name(i).to_string(),
              negated: self.definition.slot_name(*slot).to_string()
            });
          } else {
            effective.push(Some(*otherwise));
          }
        }
        Ok(effective)
      }

    } // end match self.slots
  }
}

impl Display for SelectorNode {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if let Some(table) = &self.table {
      return write!(f, "{}", table);
    }
    write!(f, "{}", self.definition.name)?;
    if !self.arguments.is_empty() {
      write!(
        f,
        "[{}]",
        self.arguments.iter().map(|a| a.value.as_str()).collect::<Vec<&str>>().join(", ")
      )?;
    }
    Ok(())
  }
}
