/*!
  The opcode table space: one 256-slot root selector per valid (encoding, map, refining prefix)
  combination, addressed by a dense numeric table id.

  Table ids are assigned encoding by encoding, in the declaration order of `InstructionEncoding`.
  Within an encoding the tables are laid out prefix-major:

  ```text
  id = ENCODING_BASE[encoding] + prefix_index * map_count + map_index
  ```

  | Encoding | Base | Prefixes × Maps |
  |:---------|-----:|:----------------|
  | default  |    0 | 1 × 4           |
  | vex      |    4 | 4 × 4           |
  | evex     |   20 | 4 × 8           |
  | mvex     |   52 | 4 × 4           |
  | xop      |   68 | 1 × 3           |
  | 3dnow    |   71 | 1 × 1           |
*/

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use strum::IntoEnumIterator;

use crate::encoding::{InstructionEncoding, OpcodeMap, RefiningPrefix};
use crate::error::{TreeError, TreeResult};
use crate::tree::{DecoderTree, NodeId, SelectorNode};

lazy_static! {
  /// The id of the first table of each encoding.
  pub static ref ENCODING_BASE: HashMap<InstructionEncoding, usize> = {
    let mut base = 0;
    let mut bases = HashMap::new();
    for encoding in InstructionEncoding::iter() {
      bases.insert(encoding, base);
      base += table_count(encoding);
    }
    bases
  };

  /// The total number of opcode tables.
  pub static ref TABLE_COUNT: usize = InstructionEncoding::iter().map(table_count).sum();
}

fn table_count(encoding: InstructionEncoding) -> usize {
  encoding.supported_prefixes().len() * encoding.supported_maps().len()
}

/// The coordinates of one opcode table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TableKey {
  pub encoding : InstructionEncoding,
  pub map      : OpcodeMap,
  pub prefix   : Option<RefiningPrefix>,
}

impl TableKey {
  pub fn new(encoding: InstructionEncoding, map: OpcodeMap, prefix: Option<RefiningPrefix>) -> TableKey {
    TableKey{ encoding, map, prefix }
  }

  pub fn id(&self) -> TreeResult<usize> {
    get_table_id(self.encoding, self.map, self.prefix)
  }

  /// Every valid table key, in table-id order.
  pub fn all() -> impl Iterator<Item = TableKey> {
    InstructionEncoding::iter().flat_map(|encoding| {
      encoding.supported_prefixes().iter().flat_map(move |prefix| {
        encoding.supported_maps().iter().map(move |map| TableKey::new(encoding, *map, *prefix))
      })
    })
  }
}

impl Display for TableKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", format_table_name(self.encoding, self.map, self.prefix))
  }
}

/**
  Computes the numeric id of the table for `(encoding, map, prefix)`.

  The legacy encoding never carries a refining prefix in the table space, and every other encoding
  always does. A map or prefix the encoding does not support is rejected as well.
*/
pub fn get_table_id(encoding: InstructionEncoding, map: OpcodeMap, prefix: Option<RefiningPrefix>)
  -> TreeResult<usize>
{
  if encoding.requires_prefix() != prefix.is_some() {
    let reason =
      match encoding.requires_prefix() {
        true  => "requires a refining prefix",
        false => "does not support refining prefixes"
      };
    return Err(TreeError::InvalidTable(format!("encoding '{}' {}", encoding, reason)));
  }

  let prefix_index = encoding.supported_prefixes().iter().position(|p| *p == prefix);
  let map_index    = encoding.supported_maps().iter().position(|m| *m == map);

  match (prefix_index, map_index, ENCODING_BASE.get(&encoding)) {
    (Some(prefix_index), Some(map_index), Some(base)) => {
      Ok(base + prefix_index * encoding.supported_maps().len() + map_index)
    }
    _ => Err(TreeError::InvalidTable(format!(
      "encoding '{}' with map '{}' and prefix '{}'",
      encoding,
      map,
      prefix.map_or("-".to_string(), |p| p.to_string())
    )))
  }
}

/// The display name of a table, e.g. `PRIMARY`, `0F38`, `VEX_66_0F38` or `3DNW_NP_0F0F`.
pub fn format_table_name(encoding: InstructionEncoding, map: OpcodeMap, prefix: Option<RefiningPrefix>)
  -> String
{
  let encoding_tag =
    match encoding.table_tag() {
      Some(tag) => tag,
      None      => return map.table_tag().unwrap_or("PRIMARY").to_string()
    };

  let prefix_tag = prefix.map_or("??", |p| p.table_tag());
  match map.table_tag() {
    Some(map_tag) => format!("{}_{}_{}", encoding_tag, prefix_tag, map_tag),
    None          => format!("{}_{}", encoding_tag, prefix_tag)
  }
}


/// The root nodes of every opcode table, indexed by table id.
#[derive(Clone, Debug)]
pub struct OpcodeTables {
  tables: Vec<(TableKey, NodeId)>
}

impl OpcodeTables {
  /// Allocates all tables up front, populated or not.
  pub fn new(tree: &mut DecoderTree) -> OpcodeTables {
    let tables = TableKey::all()
        .map(|key| (key, tree.add(SelectorNode::opcode_table(key))))
        .collect();
    OpcodeTables{ tables }
  }

  pub fn len(&self) -> usize {
    self.tables.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tables.is_empty()
  }

  pub fn get_table(&self, encoding: InstructionEncoding, map: OpcodeMap, prefix: Option<RefiningPrefix>)
    -> TreeResult<NodeId>
  {
    let id = get_table_id(encoding, map, prefix)?;
    self.get_table_by_id(id)
        .ok_or_else(|| TreeError::Unreachable(format!("table id {} out of range", id)))
  }

  pub fn try_get_table(&self, encoding: InstructionEncoding, map: OpcodeMap, prefix: Option<RefiningPrefix>)
    -> Option<NodeId>
  {
    get_table_id(encoding, map, prefix).ok().and_then(|id| self.get_table_by_id(id))
  }

  pub fn get_table_by_id(&self, id: usize) -> Option<NodeId> {
    self.tables.get(id).map(|(_, root)| *root)
  }

  /// Finds a table by its display name.
  pub fn find_by_name(&self, name: &str) -> Option<(TableKey, NodeId)> {
    self.tables.iter().copied().find(|(key, _)| key.to_string().eq_ignore_ascii_case(name))
  }

  /// `(table id, key, root)` for every table, in id order.
  pub fn iter(&self) -> impl Iterator<Item = (usize, TableKey, NodeId)> + '_ {
    self.tables.iter().enumerate().map(|(id, (key, root))| (id, *key, *root))
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::convert::TryFrom;
  use proptest::prelude::*;

  use crate::encoding::InstructionEncoding as E;

  #[test]
  fn encoding_bases_follow_declaration_order(){
    assert_eq!(ENCODING_BASE[&E::Default], 0);
    assert_eq!(ENCODING_BASE[&E::Vex], 4);
    assert_eq!(ENCODING_BASE[&E::Evex], 20);
    assert_eq!(ENCODING_BASE[&E::Mvex], 52);
    assert_eq!(ENCODING_BASE[&E::Xop], 68);
    assert_eq!(ENCODING_BASE[&E::Amd3dnow], 71);
    assert_eq!(*TABLE_COUNT, 72);
  }

  #[test]
  fn table_ids_are_prefix_major(){
    assert_eq!(get_table_id(E::Default, OpcodeMap::M0F, None).unwrap(), 1);
    assert_eq!(get_table_id(E::Vex, OpcodeMap::M0F38, Some(RefiningPrefix::P66)).unwrap(), 4 + 4 + 2);
    assert_eq!(get_table_id(E::Evex, OpcodeMap::Map5, Some(RefiningPrefix::PF3)).unwrap(), 20 + 16 + 5);
    assert_eq!(get_table_id(E::Xop, OpcodeMap::XopA, Some(RefiningPrefix::NoPrefix)).unwrap(), 70);
    assert_eq!(get_table_id(E::Amd3dnow, OpcodeMap::M0F0F, Some(RefiningPrefix::NoPrefix)).unwrap(), 71);
  }

  #[test]
  fn legacy_tables_reject_prefixes(){
    for prefix in RefiningPrefix::iter() {
      assert!(matches!(
        get_table_id(E::Default, OpcodeMap::Map0, Some(prefix)),
        Err(TreeError::InvalidTable(_))
      ));
    }
    assert!(get_table_id(E::Vex, OpcodeMap::M0F, None).is_err());
  }

  #[test]
  fn unsupported_maps_are_rejected(){
    assert!(get_table_id(E::Vex, OpcodeMap::Xop8, Some(RefiningPrefix::NoPrefix)).is_err());
    assert!(get_table_id(E::Default, OpcodeMap::Map4, None).is_err());
    assert!(get_table_id(E::Xop, OpcodeMap::Xop9, Some(RefiningPrefix::P66)).is_err());
  }

  #[test]
  fn table_names(){
    assert_eq!(format_table_name(E::Default, OpcodeMap::Map0, None), "PRIMARY");
    assert_eq!(format_table_name(E::Default, OpcodeMap::M0F3A, None), "0F3A");
    assert_eq!(format_table_name(E::Vex, OpcodeMap::M0F38, Some(RefiningPrefix::P66)), "VEX_66_0F38");
    assert_eq!(format_table_name(E::Evex, OpcodeMap::Map0, Some(RefiningPrefix::NoPrefix)), "EVEX_NP");
    assert_eq!(
      format_table_name(E::Amd3dnow, OpcodeMap::M0F0F, Some(RefiningPrefix::NoPrefix)),
      "3DNW_NP_0F0F"
    );
  }

  #[test]
  fn tables_are_allocated_eagerly_in_id_order(){
    let mut tree = DecoderTree::new();
    let tables = OpcodeTables::new(&mut tree);
    assert_eq!(tables.len(), 72);
    assert_eq!(tree.len(), 72);
    for (id, key, root) in tables.iter() {
      assert_eq!(key.id().unwrap(), id);
      let node = tree.selector(root).unwrap();
      assert_eq!(node.table, Some(key));
      assert_eq!(node.number_of_entries(), 256);
      assert!(!node.has_non_empty_entries());
    }
    let (key, _) = tables.find_by_name("vex_f2_0f3a").unwrap();
    assert_eq!(key, TableKey::new(E::Vex, OpcodeMap::M0F3A, Some(RefiningPrefix::PF2)));
  }

  fn any_prefix() -> impl Strategy<Value = Option<RefiningPrefix>> {
    prop_oneof![
      Just(None),
      (0u8..4).prop_map(|p| RefiningPrefix::try_from(p).ok()),
    ]
  }

  proptest! {
    #[test]
    fn table_addressing_is_stable_and_consistent(
      encoding in (0u8..6).prop_map(|e| E::try_from(e).unwrap()),
      map      in (0u8..12).prop_map(|m| OpcodeMap::try_from(m).unwrap()),
      prefix   in any_prefix()
    ){
      let mut tree = DecoderTree::new();
      let tables = OpcodeTables::new(&mut tree);

      let valid = encoding.requires_prefix() == prefix.is_some()
        && encoding.supported_maps().contains(&map)
        && encoding.supported_prefixes().contains(&prefix);

      let first = get_table_id(encoding, map, prefix);
      let second = get_table_id(encoding, map, prefix);
      prop_assert_eq!(first.is_ok(), valid);
      prop_assert_eq!(first.as_ref().ok(), second.as_ref().ok());

      match tables.get_table(encoding, map, prefix) {
        Ok(root) => {
          prop_assert_eq!(tables.try_get_table(encoding, map, prefix), Some(root));
          prop_assert_eq!(tree.selector(root).unwrap().table, Some(TableKey::new(encoding, map, prefix)));
          prop_assert!(get_table_id(encoding, map, prefix).unwrap() < *TABLE_COUNT);
        }
        Err(_) => {
          prop_assert!(!valid);
          prop_assert_eq!(tables.try_get_table(encoding, map, prefix), None);
        }
      }

      if encoding == E::Default && prefix.is_some() {
        prop_assert!(first.is_err());
      }
    }
  }
}
