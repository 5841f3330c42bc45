/*!
  The tree builder grows the decoder tree in three passes that each run exactly once, in order:

   1. `insert_definition`, once per instruction record, walks the record's filters in the
      per-encoding priority order and creates selector nodes along the way (`insert`);
   2. `insert_opcode_table_switch_nodes` wires the escape bytes that hand decoding over from one
      opcode table to another (`switch`);
   3. `optimize` replaces `mode` and `modrm_mod` selectors that only distinguish one value from all
      others with their two-slot compact forms (`optimize`).

  Conflicting insertions do not fail. They are collected in overflow nodes so that a single run
  reports every ambiguity in the input. `audit` lists the overflow nodes that survive the three
  passes, and `finish` hands the tree over, read-only, to the flattening engine.
*/

mod insert;
mod optimize;
mod switch;

pub use insert::FILTER_ORDER;

use std::collections::HashSet;

use tracing::info;

use crate::error::{TreeError, TreeResult};
use crate::tables::OpcodeTables;
use crate::tree::{DecoderTree, Node, NodeId};

/// Counters reported after each build pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildStatistics {
  pub records          : usize,
  pub selectors        : usize,
  pub overflows        : usize,
  pub switches         : usize,
  pub pruned_switches  : usize,
  pub compacted        : usize,
}

pub struct TreeBuilder {
  tree       : DecoderTree,
  tables     : OpcodeTables,
  statistics : BuildStatistics,
}

impl Default for TreeBuilder {
  fn default() -> Self {
    TreeBuilder::new()
  }
}

impl TreeBuilder {
  pub fn new() -> TreeBuilder {
    let mut tree = DecoderTree::new();
    let tables = OpcodeTables::new(&mut tree);
    TreeBuilder{
      tree,
      tables,
      statistics: BuildStatistics::default()
    }
  }

  pub fn tree(&self) -> &DecoderTree {
    &self.tree
  }

  pub fn tables(&self) -> &OpcodeTables {
    &self.tables
  }

  pub fn statistics(&self) -> &BuildStatistics {
    &self.statistics
  }

  /**
    Describes the location of every overflow node reachable from an opcode table, e.g.
    `PRIMARY[C4] modrm_mod[3]: overflow of les, vex`. Fails with `UnresolvedOverflow` if any exist.
  */
  pub fn audit(&self) -> TreeResult<()> {
    let mut found   : Vec<String> = Vec::new();
    let mut visited : HashSet<NodeId> = HashSet::new();
    let mut stack   : Vec<(NodeId, String)> =
      self.tables.iter().map(|(_, key, root)| (root, key.to_string())).collect();
    stack.reverse();

    while let Some((id, path)) = stack.pop() {
      if !visited.insert(id) {
        continue;
      }

      match &self.tree[id] {

        Node::Selector(node) => {
          let prefix =
            match node.table {
              Some(_) => path.clone(),
              None    => format!("{} {}", path, node)
            };
          for (index, child) in node.populated_slots().collect::<Vec<_>>().into_iter().rev() {
            stack.push((child, format!("{}[{}]", prefix, node.definition.slot_expression(index))));
          }
        }

        Node::Overflow(node) => {
          let members = node.children
                            .iter()
                            .map(|child| self.tree[*child].to_string())
                            .collect::<Vec<String>>();
          found.push(format!("{}: overflow of {}", path, members.join(", ")));
          for child in node.children.iter().rev() {
            stack.push((*child, format!("{} <{}>", path, self.tree[*child])));
          }
        }

        Node::Function(node) => {
          if let Some(next) = node.next {
            stack.push((next, format!("{} {}", path, self.tree[id])));
          }
        }

        _ => { /* Terminal */ }

      } // end match node
    }

    match found.is_empty() {
      true  => Ok(()),
      false => Err(TreeError::UnresolvedOverflow(found))
    }
  }

  /// Ends construction.
  pub fn finish(self) -> DecoderTables {
    info!(
      nodes = self.tree.len(),
      records = self.statistics.records,
      "decoder tree finished"
    );
    DecoderTables{
      tree       : self.tree,
      tables     : self.tables,
      statistics : self.statistics
    }
  }
}

/// A finished decoder tree and its opcode tables. Read-only.
pub struct DecoderTables {
  tree       : DecoderTree,
  tables     : OpcodeTables,
  statistics : BuildStatistics,
}

impl DecoderTables {
  pub fn tree(&self) -> &DecoderTree {
    &self.tree
  }

  pub fn tables(&self) -> &OpcodeTables {
    &self.tables
  }

  pub fn statistics(&self) -> &BuildStatistics {
    &self.statistics
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  use crate::encoding::{InstructionEncoding, OpcodeMap};
  use crate::record::InstructionRecord;

  #[test]
  fn audit_passes_on_unambiguous_tree(){
    let mut builder = TreeBuilder::new();
    let record = InstructionRecord::new("nop").with_opcode(InstructionEncoding::Default, OpcodeMap::Map0, 0x90);
    builder.insert_definition(Rc::new(record)).unwrap();
    assert!(builder.audit().is_ok());
  }

  #[test]
  fn audit_reports_overflow_location(){
    let mut builder = TreeBuilder::new();
    let first = InstructionRecord::new("first")
        .with_opcode(InstructionEncoding::Default, OpcodeMap::Map0, 0x01)
        .with_filter("modrm_mod", "3");
    let second = InstructionRecord::new("second")
        .with_opcode(InstructionEncoding::Default, OpcodeMap::Map0, 0x01)
        .with_filter("modrm_mod", "3");
    builder.insert_definition(Rc::new(first)).unwrap();
    builder.insert_definition(Rc::new(second)).unwrap();

    match builder.audit() {
      Err(TreeError::UnresolvedOverflow(locations)) => {
        assert_eq!(locations, vec!["PRIMARY[01] modrm_mod[3]: overflow of first, second".to_string()]);
      }
      other => panic!("unexpected audit result: {:?}", other)
    }
  }
}
