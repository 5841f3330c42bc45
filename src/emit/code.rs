/*!
  C source backend. Produces one `ZydisDecoderTreeNode` initializer list per populated opcode
  table and the `OPCODE_TABLE_TREES` array that maps table ids to them:

  ```c
  static const ZydisDecoderTreeNode DECODER_TREE_PRIMARY[] =
  {
      ZYDIS_DT_HEADER(ZYDIS_NODETYPE_OPCODE, 0),
      ZYDIS_DT_INVALID,
      ZYDIS_DT_OFFSET(0x0101), /* 01: modrm_mod */
      ...
  };
  ```
*/

use crate::emit::{SlotTarget, TableEmitter};
use crate::error::{TreeError, TreeResult};
use crate::registry::DefinitionRegistry;
use crate::tree::{DecoderTree, DefinitionNode, Node, SelectorNode, TableSwitchNode};

const INDENT: &str = "    ";

/// `ZYDIS_NODETYPE_MODRM_MOD` for `modrm_mod`. Feature selectors are runtime decoder modes.
fn node_type_name(name: &str) -> String {
  let upper = name.to_uppercase();
  match upper.strip_prefix("FEATURE_") {
    Some(feature) => format!("ZYDIS_NODETYPE_MODE_{}", feature),
    None          => format!("ZYDIS_NODETYPE_{}", upper)
  }
}

pub struct CodeEmitter<'r> {
  registry : &'r DefinitionRegistry,
  output   : String,
}

impl<'r> CodeEmitter<'r> {
  pub fn new(registry: &'r DefinitionRegistry) -> CodeEmitter<'r> {
    CodeEmitter{
      registry,
      output: String::new()
    }
  }

  pub fn begin_table(&mut self, name: &str) {
    self.output.push_str(&format!("static const ZydisDecoderTreeNode DECODER_TREE_{}[] =\n{{\n", name));
  }

  pub fn end_table(&mut self) {
    self.output.push_str("};\n\n");
  }

  /// Writes the table-id indexed array of table roots. `None` marks an empty table.
  pub fn write_table_index<S: AsRef<str>>(&mut self, tables: &[Option<S>]) {
    self.output.push_str("static const ZydisDecoderTreeNode* OPCODE_TABLE_TREES[] =\n{\n");
    for table in tables {
      match table {
        Some(name) => self.output.push_str(&format!("{}DECODER_TREE_{},\n", INDENT, name.as_ref())),
        None       => self.output.push_str(&format!("{}NULL,\n", INDENT))
      }
    }
    self.output.push_str("};\n");
  }

  pub fn finish(self) -> String {
    self.output
  }

  fn line(&mut self, text: &str) {
    self.output.push_str(INDENT);
    self.output.push_str(text);
    self.output.push_str(",\n");
  }

  fn commented_line(&mut self, text: &str, comment: &str) {
    self.output.push_str(&format!("{}{}, /* {} */\n", INDENT, text, comment));
  }
}

impl<'r> TableEmitter for CodeEmitter<'r> {
  fn emit_selector_node(
    &mut self,
    tree: &DecoderTree,
    _address: usize,
    node: &SelectorNode,
    targets: &[SlotTarget]
  ) -> TreeResult<()>
  {
    let first_argument = node.arguments.first().map_or("0", |argument| argument.value.as_str());
    self.line(&format!(
      "ZYDIS_DT_HEADER({}, {})",
      node_type_name(&node.definition.name),
      first_argument
    ));
    for argument in node.arguments.iter().skip(1) {
      self.line(&argument.value);
    }

    for target in targets {
      match (target.node.map(|id| &tree[id]), target.offset) {
        (None, _) => self.line("ZYDIS_DT_INVALID"),

        (Some(Node::Data(data)), _) => self.line(&data.value),

        (Some(child), Some(offset)) => {
          let comment = format!("{}: {}", node.definition.slot_name(target.index), child);
          self.commented_line(&format!("ZYDIS_DT_OFFSET({:#06X})", offset), &comment);
        }

        (Some(child), None) => {
          return Err(TreeError::Unreachable(format!("slot target '{}' has no offset", child)));
        }
      }
    }
    Ok(())
  }

  fn emit_definition_node(&mut self, _address: usize, node: &DefinitionNode) -> TreeResult<()> {
    let id = self.registry.id_of(&node.record).ok_or_else(|| {
      TreeError::Unreachable(format!("instruction '{}' has no definition id", node.record.mnemonic))
    })?;
    let encoding: u8 = node.record.encoding.into();

    self.line(&format!("ZYDIS_DT_DEFINITION_HEADER({:#04X})", encoding));
    self.commented_line(&format!("ZYDIS_DT_DEFINITION({:#06X})", id), &node.record.mnemonic);
    Ok(())
  }

  fn emit_table_switch_node(&mut self, _address: usize, node: &TableSwitchNode) -> TreeResult<()> {
    self.commented_line(
      &format!("ZYDIS_DT_SWITCH_TABLE_HEADER({:#04X})", node.table_id),
      &node.table.to_string()
    );
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  use crate::emit::{emit, EmitStatistics};
  use crate::encoding::{InstructionEncoding, OpcodeMap, RefiningPrefix};
  use crate::record::InstructionRecord;
  use crate::selector::{selector_definition, SlotIndex, MODE_COMPACT};
  use crate::tables::TableKey;
  use crate::tree::{DataNode, NodeId};

  #[test]
  fn node_type_names(){
    assert_eq!(node_type_name("modrm_mod_compact"), "ZYDIS_NODETYPE_MODRM_MOD_COMPACT");
    assert_eq!(node_type_name("feature_amd"), "ZYDIS_NODETYPE_MODE_AMD");
    assert_eq!(node_type_name("opcode"), "ZYDIS_NODETYPE_OPCODE");
  }

  #[test]
  fn renders_initializer_entries(){
    let record = Rc::new(
      InstructionRecord::new("vaddps").with_opcode(InstructionEncoding::Vex, OpcodeMap::M0F, 0x58)
    );
    let mut registry = DefinitionRegistry::new();
    registry.insert(&InstructionRecord::new("aaa").with_opcode(InstructionEncoding::Vex, OpcodeMap::M0F, 0));
    registry.insert(&record);
    registry.finalize().unwrap();

    let mut tree = DecoderTree::new();
    let definition = tree.add(DefinitionNode{ record });
    let switch = tree.add(TableSwitchNode{
      table: TableKey::new(InstructionEncoding::Vex, OpcodeMap::M0F, Some(RefiningPrefix::P66)),
      table_id: 9
    });
    let mut node = SelectorNode::new::<&str>(&MODE_COMPACT, &[]).unwrap();
    node.set(SlotIndex::regular(0), Some(definition)).unwrap();
    node.set(SlotIndex::negated(0), Some(switch)).unwrap();
    let root: NodeId = tree.add(node);

    let mut emitter = CodeEmitter::new(&registry);
    emitter.begin_table("TEST");
    emit(&tree, root, 0, &mut emitter, &mut EmitStatistics::new()).unwrap();
    emitter.end_table();

    let expected = "\
static const ZydisDecoderTreeNode DECODER_TREE_TEST[] =
{
    ZYDIS_DT_HEADER(ZYDIS_NODETYPE_MODE_COMPACT, 0),
    ZYDIS_DT_OFFSET(0x0003), /* 64: vaddps */
    ZYDIS_DT_OFFSET(0x0005), /* !64: VEX_66_0F */
    ZYDIS_DT_DEFINITION_HEADER(0x01),
    ZYDIS_DT_DEFINITION(0x0001), /* vaddps */
    ZYDIS_DT_SWITCH_TABLE_HEADER(0x09), /* VEX_66_0F */
};

";
    assert_eq!(emitter.finish(), expected);
  }

  #[test]
  fn invalid_and_data_slots(){
    let mut tree = DecoderTree::new();
    let data = tree.add(DataNode::new("ZYDIS_REG_NONE"));
    let mut node = SelectorNode::new::<&str>(selector_definition("rex_w").unwrap(), &[]).unwrap();
    node.set(SlotIndex::regular(1), Some(data)).unwrap();
    let root = tree.add(node);

    let registry = DefinitionRegistry::new();
    let mut emitter = CodeEmitter::new(&registry);
    emit(&tree, root, 0, &mut emitter, &mut EmitStatistics::new()).unwrap();
    assert_eq!(
      emitter.finish(),
      "    ZYDIS_DT_HEADER(ZYDIS_NODETYPE_REX_W, 0),\n    ZYDIS_DT_INVALID,\n    ZYDIS_REG_NONE,\n"
    );
  }

  #[test]
  fn table_index_marks_empty_tables(){
    let registry = DefinitionRegistry::new();
    let mut emitter = CodeEmitter::new(&registry);
    emitter.write_table_index(&[Some("PRIMARY"), None]);
    assert_eq!(
      emitter.finish(),
      "static const ZydisDecoderTreeNode* OPCODE_TABLE_TREES[] =\n{\n    DECODER_TREE_PRIMARY,\n    NULL,\n};\n"
    );
  }
}
