use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;

use bimap::BiMap;

use crate::encoding::InstructionEncoding;
use crate::error::{TreeError, TreeResult};
use crate::record::InstructionRecord;

/**
  The identity of an instruction definition: its mnemonic and its attributes. Placement in the
  opcode tables (encoding-specific filters, opcode, map) is not part of it, so the same definition
  reachable through several decoder paths gets a single id.
*/
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DefinitionKey {
  pub mnemonic   : String,
  /// The attributes as canonical JSON text (object keys sorted).
  pub attributes : String,
}

impl DefinitionKey {
  pub fn of(record: &InstructionRecord) -> DefinitionKey {
    DefinitionKey{
      mnemonic   : record.mnemonic.to_string(),
      attributes : serde_json::to_string(&record.attributes).unwrap_or_default()
    }
  }
}

/**
  A registry of instruction definitions, one namespace per encoding. Definitions are collected
  while records are read. `finalize` then assigns dense ids in key order, so ids do not depend on
  the order of the input records.

  Ids are looked up in both directions, which is just a convenience wrapper around a `BiMap`.
*/
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
  pending : BTreeMap<InstructionEncoding, BTreeSet<DefinitionKey>>,
  ids     : BTreeMap<InstructionEncoding, BiMap<DefinitionKey, u16>>,
}

impl DefinitionRegistry {
  pub fn new() -> DefinitionRegistry {
    DefinitionRegistry::default()
  }

  /// Registers the definition of `record`. Returns `false` if it was already known.
  pub fn insert(&mut self, record: &InstructionRecord) -> bool {
    self.pending.entry(record.encoding).or_default().insert(DefinitionKey::of(record))
  }

  /// Assigns ids. Fails if an encoding has more definitions than a 16-bit id can address.
  pub fn finalize(&mut self) -> TreeResult<()> {
    self.ids.clear();
    for (encoding, keys) in &self.pending {
      let mut table = BiMap::new();
      for (id, key) in keys.iter().enumerate() {
        let id = u16::try_from(id).map_err(|_| {
          TreeError::Record(format!("too many '{}' instruction definitions", encoding))
        })?;
        table.insert(key.clone(), id);
      }
      self.ids.insert(*encoding, table);
    }
    Ok(())
  }

  pub fn id_of(&self, record: &InstructionRecord) -> Option<u16> {
    self.ids.get(&record.encoding)?.get_by_left(&DefinitionKey::of(record)).copied()
  }

  pub fn definition(&self, encoding: InstructionEncoding, id: u16) -> Option<&DefinitionKey> {
    self.ids.get(&encoding)?.get_by_right(&id)
  }

  pub fn len(&self, encoding: InstructionEncoding) -> usize {
    self.pending.get(&encoding).map_or(0, BTreeSet::len)
  }

  pub fn total(&self) -> usize {
    self.pending.values().map(BTreeSet::len).sum()
  }
}
