//! Human-readable rendering of the flattened tables.

use lazy_static::lazy_static;
use prettytable::{format as TableFormat, Table};

use crate::emit::{EmitStatistics, SlotTarget, TableEmitter};
use crate::error::{TreeError, TreeResult};
use crate::registry::DefinitionRegistry;
use crate::tree::{DecoderTree, DefinitionNode, Node, SelectorNode, TableSwitchNode};

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/// Renders every node as a block of text: selectors as a slot table, leaves as a single line.
pub struct ConsoleEmitter<'r> {
  registry   : &'r DefinitionRegistry,
  skip_empty : bool,
  output     : String,
  /// Name, id and output position of the table being emitted.
  table      : Option<(String, usize, usize)>,
}

impl<'r> ConsoleEmitter<'r> {
  pub fn new(registry: &'r DefinitionRegistry, skip_empty: bool) -> ConsoleEmitter<'r> {
    ConsoleEmitter{
      registry,
      skip_empty,
      output: String::new(),
      table: None
    }
  }

  /// Starts the section of one opcode table. The section header is written by `end_table`.
  pub fn begin_table(&mut self, name: &str, id: usize) {
    self.table = Some((name.to_string(), id, self.output.len()));
  }

  /// Heads the current section with the flattened size of its table, as returned by `emit`.
  pub fn end_table(&mut self, size: usize) {
    if let Some((name, id, position)) = self.table.take() {
      let header = format!("══ {} (table {:#04X}, {} words) ══\n\n", name, id, size);
      self.output.insert_str(position, &header);
    }
  }

  pub fn finish(self) -> String {
    self.output
  }

  fn describe_target(tree: &DecoderTree, target: &SlotTarget) -> String {
    match (target.node.map(|id| &tree[id]), target.address, target.offset) {
      (Some(Node::Data(data)), _, _)             => data.value.clone(),
      (Some(node), Some(address), Some(offset)) => {
        format!("goto [{:04X}] (+{}) {}<{}>", address, offset, node.kind(), node)
      }
      _ => "-".to_string()
    }
  }
}

impl<'r> TableEmitter for ConsoleEmitter<'r> {
  fn emit_selector_node(
    &mut self,
    tree: &DecoderTree,
    address: usize,
    node: &SelectorNode,
    targets: &[SlotTarget]
  ) -> TreeResult<()>
  {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Index", ubl->"Slot", ubl->"Target"]);

    for target in targets {
      if self.skip_empty && target.node.is_none() {
        continue;
      }
      table.add_row(row![
        r->target.index,
        node.definition.slot_name(target.index),
        ConsoleEmitter::describe_target(tree, target)
      ]);
    }

    self.output.push_str(&format!("[{:04X}] selector<{}>\n{}\n", address, node, table));
    Ok(())
  }

  fn emit_definition_node(&mut self, address: usize, node: &DefinitionNode) -> TreeResult<()> {
    let id = self.registry.id_of(&node.record).ok_or_else(|| {
      TreeError::Unreachable(format!("instruction '{}' has no definition id", node.record.mnemonic))
    })?;
    self.output.push_str(&format!(
      "[{:04X}] definition<{}> id {:#06X} ({})\n\n",
      address,
      node.record.mnemonic,
      id,
      node.record.encoding
    ));
    Ok(())
  }

  fn emit_table_switch_node(&mut self, address: usize, node: &TableSwitchNode) -> TreeResult<()> {
    self.output.push_str(&format!(
      "[{:04X}] table_switch<{}> table {:#04X}\n\n",
      address,
      node.table,
      node.table_id
    ));
    Ok(())
  }
}

/// Emission statistics as a two-column table.
pub fn statistics_table(statistics: &EmitStatistics) -> Table {
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubl->"Node", ubr->"Count"]);

  for (selector, count) in &statistics.selectors {
    table.add_row(row![selector, r->count]);
  }
  table.add_row(row![i->"definition", r->statistics.definitions]);
  table.add_row(row![i->"table_switch", r->statistics.table_switches]);
  table.add_row(row![b->"highest offset", r->statistics.highest_offset]);
  table
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  use crate::emit::emit;
  use crate::record::InstructionRecord;
  use crate::selector::{SlotIndex, MODRM_MOD};
  use crate::tree::DataNode;

  fn fixture() -> (DecoderTree, crate::tree::NodeId, DefinitionRegistry) {
    let record = Rc::new(InstructionRecord::new("add"));
    let mut registry = DefinitionRegistry::new();
    registry.insert(&record);
    registry.finalize().unwrap();

    let mut tree = DecoderTree::new();
    let add = tree.add(DefinitionNode{ record });
    let data = tree.add(DataNode::new("ZYDIS_REG_NONE"));
    let mut node = SelectorNode::new::<&str>(&MODRM_MOD, &[]).unwrap();
    node.set(SlotIndex::regular(0), Some(data)).unwrap();
    node.set(SlotIndex::regular(3), Some(add)).unwrap();
    let root = tree.add(node);
    (tree, root, registry)
  }

  #[test]
  fn renders_selector_targets_and_leaves(){
    let (tree, root, registry) = fixture();
    let mut emitter = ConsoleEmitter::new(&registry, false);
    emit(&tree, root, 0, &mut emitter, &mut EmitStatistics::new()).unwrap();
    let text = emitter.finish();

    assert!(text.starts_with("[0000] selector<modrm_mod>"));
    assert!(text.contains("goto [0005] (+5) definition<add>"));
    assert!(text.contains("ZYDIS_REG_NONE"));
    assert!(text.contains("[0005] definition<add> id 0x0000 (default)"));
  }

  #[test]
  fn section_header_counts_shared_children_once(){
    let (mut tree, root, registry) = fixture();
    let add = tree.selector(root).unwrap().get(SlotIndex::regular(3));
    tree.selector_mut(root).unwrap().set(SlotIndex::regular(1), add).unwrap();

    let mut emitter = ConsoleEmitter::new(&registry, true);
    emitter.begin_table("PRIMARY", 0);
    let size = emit(&tree, root, 0, &mut emitter, &mut EmitStatistics::new()).unwrap();
    emitter.end_table(size);
    let text = emitter.finish();

    assert_eq!(size, 7);
    assert!(text.starts_with("══ PRIMARY (table 0x00, 7 words) ══\n\n[0000] selector<modrm_mod>"));
    assert_eq!(text.matches("definition<add> id").count(), 1);
  }

  #[test]
  fn skip_empty_omits_unpopulated_slots(){
    let (tree, root, registry) = fixture();

    let mut full = ConsoleEmitter::new(&registry, false);
    emit(&tree, root, 0, &mut full, &mut EmitStatistics::new()).unwrap();
    let mut sparse = ConsoleEmitter::new(&registry, true);
    emit(&tree, root, 0, &mut sparse, &mut EmitStatistics::new()).unwrap();

    let full = full.finish();
    let sparse = sparse.finish();
    assert_eq!(full.matches(" - ").count(), 2);
    assert_eq!(sparse.matches(" - ").count(), 0);
  }

  #[test]
  fn unregistered_definition_is_an_error(){
    let (tree, root, _) = fixture();
    let empty = DefinitionRegistry::new();
    let mut emitter = ConsoleEmitter::new(&empty, false);
    assert!(matches!(
      emit(&tree, root, 0, &mut emitter, &mut EmitStatistics::new()),
      Err(TreeError::Unreachable(_))
    ));
  }

  #[test]
  fn statistics_table_lists_selector_kinds(){
    let (tree, root, registry) = fixture();
    let mut statistics = EmitStatistics::new();
    emit(&tree, root, 0, &mut ConsoleEmitter::new(&registry, false), &mut statistics).unwrap();

    let text = statistics_table(&statistics).to_string();
    assert!(text.contains("modrm_mod"));
    assert!(text.contains("highest offset"));
  }
}
