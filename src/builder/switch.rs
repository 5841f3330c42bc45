/*!
  Wiring the opcode tables together.

  Decoding always starts in the primary table. Every other table is reached through an escape:
  either a plain opcode byte (`0F`, `0F 38`, `0F 3A`, `0F 0F`) or one of the legacy opcodes that
  double as the first byte of a VEX, EVEX, MVEX, XOP or REX2 prefix. An escape opcode gets a
  selector node whose `default` slot keeps the legacy instruction that used to live there.

  A table switch is only created for a table with at least one populated slot.
*/

use tracing::debug;

use crate::builder::TreeBuilder;
use crate::encoding::{InstructionEncoding, OpcodeMap, RefiningPrefix};
use crate::error::TreeResult;
use crate::selector::{SelectorDefinition, SlotIndex, EMVEX, REX2_MAP, VEX, XOP};
use crate::tables::TableKey;
use crate::tree::{NodeId, SelectorNode, TableSwitchNode};

/// The escape slot name of a table, e.g. `66_0f38` or `evex_np_map5`.
fn slot_name(lead: &str, prefix: RefiningPrefix, map: OpcodeMap) -> String {
  let prefix =
    match prefix {
      RefiningPrefix::NoPrefix => "np".to_string(),
      other                    => other.to_string()
    };
  match map {
    OpcodeMap::Map0 => format!("{}{}", lead, prefix),
    map             => format!("{}{}_{}", lead, prefix, map)
  }
}

/// The `(slot, table)` pairs for every prefix × map combination listed.
fn escape_targets(lead: &str, encoding: InstructionEncoding, prefixes: &[RefiningPrefix], maps: &[OpcodeMap])
  -> Vec<(String, TableKey)>
{
  prefixes.iter()
          .flat_map(|prefix| {
            maps.iter().map(move |map| {
              (slot_name(lead, *prefix, *map), TableKey::new(encoding, *map, Some(*prefix)))
            })
          })
          .collect()
}

const ALL_PREFIXES: [RefiningPrefix; 4] =
  [RefiningPrefix::NoPrefix, RefiningPrefix::P66, RefiningPrefix::PF3, RefiningPrefix::PF2];

impl TreeBuilder {
  /// Creates the escape nodes. Must run after every record is inserted, and only once.
  pub fn insert_opcode_table_switch_nodes(&mut self) -> TreeResult<()> {
    use InstructionEncoding::*;
    use OpcodeMap::*;

    let primary = self.tables.get_table(Default, Map0, None)?;
    let secondary = self.tables.get_table(Default, M0F, None)?;

    let target = self.switch_to(TableKey::new(Default, M0F, None))?;
    self.tree.selector_mut(primary)?.set(SlotIndex::regular(0x0F), target)?;

    let escapes = [
      (0x38, TableKey::new(Default, M0F38, None)),
      (0x3A, TableKey::new(Default, M0F3A, None)),
      (0x0F, TableKey::new(Amd3dnow, M0F0F, Some(RefiningPrefix::NoPrefix))),
    ];
    for (opcode, key) in escapes.iter() {
      let target = self.switch_to(*key)?;
      self.tree.selector_mut(secondary)?.set(SlotIndex::regular(*opcode), target)?;
    }

    let rex2 = vec![
      ("rex2_default".to_string(), TableKey::new(Default, Map0, None)),
      ("rex2_0f".to_string(), TableKey::new(Default, M0F, None)),
    ];
    self.insert_escape(primary, 0xD5, &REX2_MAP, &rex2)?;

    let xop = escape_targets("", Xop, &[RefiningPrefix::NoPrefix], &[Xop8, Xop9, XopA]);
    self.insert_escape(primary, 0x8F, &XOP, &xop)?;

    let vex3 = escape_targets("", Vex, &ALL_PREFIXES, Vex.supported_maps());
    self.insert_escape(primary, 0xC4, &VEX, &vex3)?;

    let vex2 = escape_targets("", Vex, &ALL_PREFIXES, &[M0F]);
    self.insert_escape(primary, 0xC5, &VEX, &vex2)?;

    let mut emvex = escape_targets("evex_", Evex, &ALL_PREFIXES, Evex.supported_maps());
    emvex.extend(escape_targets("mvex_", Mvex, &ALL_PREFIXES, Mvex.supported_maps()));
    self.insert_escape(primary, 0x62, &EMVEX, &emvex)?;

    debug!(
      switches = self.statistics.switches,
      pruned = self.statistics.pruned_switches,
      "opcode table switches inserted"
    );
    Ok(())
  }

  /// A switch node to `table`, or `None` if the table has nothing to switch to.
  fn switch_to(&mut self, table: TableKey) -> TreeResult<Option<NodeId>> {
    let root = self.tables.get_table(table.encoding, table.map, table.prefix)?;
    let populated = self.tree.selector(root)?.effective_entries()?.iter().any(Option::is_some);

    if !populated {
      debug!(table = %table, "empty opcode table, switch pruned");
      self.statistics.pruned_switches += 1;
      return Ok(None);
    }

    let table_id = table.id()?;
    self.statistics.switches += 1;
    Ok(Some(self.tree.add(TableSwitchNode{ table, table_id })))
  }

  /**
    Replaces `table[opcode]` with a selector of type `definition`. The previous occupant moves to
    the selector's `default` slot and each named slot switches to its target table.
  */
  fn insert_escape(
    &mut self,
    table: NodeId,
    opcode: usize,
    definition: &'static SelectorDefinition,
    targets: &[(String, TableKey)]
  ) -> TreeResult<()>
  {
    let previous = self.tree.selector(table)?.get(SlotIndex::regular(opcode));

    let mut escape = SelectorNode::new::<&str>(definition, &[])?;
    escape.set(definition.parse_index("default")?, previous)?;
    for (slot, key) in targets {
      let index = definition.parse_index(slot)?;
      let target = self.switch_to(*key)?;
      escape.set(index, target)?;
    }

    debug!(
      opcode = %format!("{:02X}", opcode),
      escape = %definition.name,
      legacy = previous.is_some(),
      "escape selector inserted"
    );

    let escape = self.tree.add(escape);
    self.statistics.selectors += 1;
    self.tree.selector_mut(table)?.set(SlotIndex::regular(opcode), Some(escape))
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  use crate::record::InstructionRecord;
  use crate::tree::Node;

  fn insert(builder: &mut TreeBuilder, record: InstructionRecord) {
    builder.insert_definition(Rc::new(record)).unwrap();
  }

  fn slot(builder: &TreeBuilder, node: NodeId, name: &str) -> Option<NodeId> {
    let selector = builder.tree().selector(node).unwrap();
    selector.get(selector.definition.parse_index(name).unwrap())
  }

  fn switch_target(builder: &TreeBuilder, node: Option<NodeId>) -> Option<String> {
    match node.map(|id| &builder.tree()[id]) {
      Some(Node::TableSwitch(switch)) => Some(switch.table.to_string()),
      _                               => None
    }
  }

  #[test]
  fn slot_names_match_catalog(){
    assert_eq!(slot_name("", RefiningPrefix::NoPrefix, OpcodeMap::Map0), "np");
    assert_eq!(slot_name("", RefiningPrefix::P66, OpcodeMap::M0F38), "66_0f38");
    assert_eq!(slot_name("evex_", RefiningPrefix::PF2, OpcodeMap::Map5), "evex_f2_map5");
    for (slot, _) in escape_targets("mvex_", InstructionEncoding::Mvex, &ALL_PREFIXES, &[OpcodeMap::M0F3A]) {
      assert!(EMVEX.parse_index(&slot).is_ok());
    }
  }

  #[test]
  fn populated_secondary_table_is_wired(){
    let mut builder = TreeBuilder::new();
    insert(&mut builder, InstructionRecord::new("ud2").with_opcode(InstructionEncoding::Default, OpcodeMap::M0F, 0x0B));
    builder.insert_opcode_table_switch_nodes().unwrap();

    let primary = builder.tables().get_table(InstructionEncoding::Default, OpcodeMap::Map0, None).unwrap();
    let secondary = builder.tables().get_table(InstructionEncoding::Default, OpcodeMap::M0F, None).unwrap();

    let escape = builder.tree().selector(primary).unwrap().get(SlotIndex::regular(0x0F));
    match escape.map(|id| &builder.tree()[id]) {
      Some(Node::TableSwitch(switch)) => assert_eq!(switch.table_id, 1),
      _                               => panic!("0F is not a table switch")
    }
    // 0F 38, 0F 3A and 3DNow! are empty.
    for opcode in &[0x38, 0x3A, 0x0F] {
      assert_eq!(builder.tree().selector(secondary).unwrap().get(SlotIndex::regular(*opcode)), None);
    }

    // 0F plus both REX2 targets are switched to. Every other target is empty: three 0F escapes,
    // three XOP maps, 16 VEX3 and 4 VEX2 tables, 32 EVEX and 16 MVEX tables.
    assert_eq!(builder.statistics().switches, 3);
    assert_eq!(builder.statistics().pruned_switches, 3 + 3 + 16 + 4 + 32 + 16);
  }

  #[test]
  fn empty_tables_are_not_switched_to(){
    let mut builder = TreeBuilder::new();
    insert(
      &mut builder,
      InstructionRecord::new("vaddpd")
          .with_opcode(InstructionEncoding::Vex, OpcodeMap::M0F, 0x58)
          .with_filter("mandatory_prefix", "66")
    );
    builder.insert_opcode_table_switch_nodes().unwrap();

    let primary = builder.tables().get_table(InstructionEncoding::Default, OpcodeMap::Map0, None).unwrap();
    let vex3 = builder.tree().selector(primary).unwrap().get(SlotIndex::regular(0xC4)).unwrap();
    let vex2 = builder.tree().selector(primary).unwrap().get(SlotIndex::regular(0xC5)).unwrap();

    assert_eq!(switch_target(&builder, slot(&builder, vex3, "66_0f")), Some("VEX_66_0F".to_string()));
    assert_eq!(slot(&builder, vex3, "np_0f"), None);
    assert_eq!(slot(&builder, vex3, "66_0f38"), None);
    assert_eq!(slot(&builder, vex3, "default"), None);

    assert_eq!(switch_target(&builder, slot(&builder, vex2, "66_0f")), Some("VEX_66_0F".to_string()));
    // Two-byte VEX only reaches the 0F map.
    assert_eq!(slot(&builder, vex2, "66"), None);

    // Escape selectors exist even when every target is empty.
    let emvex = builder.tree().selector(primary).unwrap().get(SlotIndex::regular(0x62)).unwrap();
    assert!(!builder.tree().selector(emvex).unwrap().has_non_empty_entries());
  }

  #[test]
  fn legacy_occupant_moves_to_default_slot(){
    let mut builder = TreeBuilder::new();
    insert(&mut builder, InstructionRecord::new("les").with_opcode(InstructionEncoding::Default, OpcodeMap::Map0, 0xC4));
    insert(&mut builder, InstructionRecord::new("pop").with_opcode(InstructionEncoding::Default, OpcodeMap::Map0, 0x8F));
    builder.insert_opcode_table_switch_nodes().unwrap();

    let primary = builder.tables().get_table(InstructionEncoding::Default, OpcodeMap::Map0, None).unwrap();
    let vex3 = builder.tree().selector(primary).unwrap().get(SlotIndex::regular(0xC4)).unwrap();
    let xop = builder.tree().selector(primary).unwrap().get(SlotIndex::regular(0x8F)).unwrap();
    let rex2 = builder.tree().selector(primary).unwrap().get(SlotIndex::regular(0xD5)).unwrap();

    assert_eq!(builder.tree()[slot(&builder, vex3, "default").unwrap()].to_string(), "les");
    assert_eq!(builder.tree()[slot(&builder, xop, "default").unwrap()].to_string(), "pop");
    // The primary table is populated, so REX2 can switch back into it.
    assert_eq!(switch_target(&builder, slot(&builder, rex2, "rex2_default")), Some("PRIMARY".to_string()));
    assert_eq!(slot(&builder, rex2, "rex2_0f"), None);
  }
}
