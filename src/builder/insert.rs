/*!
  Inserting instruction records into the opcode tables.

  A record is placed by starting at slot `opcode` of its opcode table and following its filters,
  one selector per filter, in the fixed priority order of `FILTER_ORDER`. The order does not
  depend on the record, so any two records that agree on a prefix of their (ordered) filters share
  the corresponding path through the tree, whichever was inserted first.
*/

use std::collections::HashMap;
use std::rc::Rc;
use std::str::FromStr;

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::builder::TreeBuilder;
use crate::encoding::{InstructionEncoding, RefiningPrefix};
use crate::error::{TreeError, TreeResult};
use crate::record::InstructionRecord;
use crate::selector::{resolve_type_expression, NodeType, SelectorDefinition, SlotIndex, MANDATORY_PREFIX};
use crate::tables::format_table_name;
use crate::tree::{DefinitionNode, Node, NodeId, OverflowNode, SelectorNode};

lazy_static! {
  /**
    The order in which the filters of a record are turned into selector nodes, per encoding.
    Filters whose names are not listed for the record's encoding are ignored.

    Changing these lists changes the shape of every generated table.
  */
  pub static ref FILTER_ORDER: HashMap<InstructionEncoding, &'static [&'static str]> = {
    let mut order: HashMap<InstructionEncoding, &'static [&'static str]> = HashMap::new();
    order.insert(
      InstructionEncoding::Default,
      &[
        "rex_2",
        "feature_mpx",
        "feature_ud0_compat",
        "modrm_mod",
        "feature_cldemote",
        "prefix_group1",
        "mandatory_prefix",
        "modrm_reg",
        "modrm_rm",
        "mode",
        "address_size",
        "operand_size",
        "rex_w",
        "rex_b",
        "feature_amd",
        "feature_knc",
        "feature_cet",
        "feature_lzcnt",
        "feature_tzcnt",
        "feature_wbnoinvd",
        "feature_centaur",
        "feature_iprefetch",
      ]
    );
    order.insert(
      InstructionEncoding::Amd3dnow,
      &[
        "rex2",
        "modrm_mod",
        "mode_cldemote",
        "prefix_group1",
        "mandatory_prefix",
        "modrm_reg",
        "modrm_rm",
        "mode",
        "address_size",
        "operand_size",
        "rex_w",
        "rex_b",
      ]
    );
    order.insert(
      InstructionEncoding::Vex,
      &[
        "modrm_reg",
        "modrm_rm",
        "vector_length",
        "mode",
        "modrm_mod",
        "rex_w",
        "operand_size",
        "address_size",
        "feature_knc",
      ]
    );
    order.insert(
      InstructionEncoding::Evex,
      &[
        "modrm_mod",
        "evex_u",
        "modrm_reg",
        "modrm_rm",
        "rex_w",
        "mode",
        "operand_size",
        "address_size",
        "evex_b",
        "vector_length",
        "evex_nd",
        "evex_nf",
        "evex_scc",
      ]
    );
    order.insert(
      InstructionEncoding::Mvex,
      &[
        "modrm_mod",
        "modrm_reg",
        "modrm_rm",
        "rex_w",
        "mode",
        "operand_size",
        "address_size",
        "mvex_e",
        "vector_length",
      ]
    );
    order.insert(
      InstructionEncoding::Xop,
      &[
        "modrm_reg",
        "modrm_rm",
        "vector_length",
        "mode",
        "modrm_mod",
        "rex_w",
        "operand_size",
        "address_size",
      ]
    );
    order
  };
}

/// The record's filters that take part in the tree, in priority order.
pub(crate) fn ordered_filters(record: &InstructionRecord) -> Vec<(&str, &str)> {
  let order: &[&str] = FILTER_ORDER.get(&record.encoding).copied().unwrap_or(&[]);

  let mut filters: Vec<(usize, &str, &str)> = record.filters
      .iter()
      .filter_map(|(name, value)| {
        order.iter()
             .position(|candidate| *candidate == name.as_str())
             .map(|priority| (priority, name.as_str(), value.as_str()))
      })
      .collect();
  filters.sort_by_key(|(priority, _, _)| *priority);

  filters.into_iter().map(|(_, name, value)| (name, value)).collect()
}

/**
  The refining prefix that selects the record's opcode table. Legacy tables have none, the 3DNow!
  table is always `NP`, and every other encoding takes it from the record's `mandatory_prefix`
  filter.
*/
fn refining_prefix(record: &InstructionRecord) -> TreeResult<Option<RefiningPrefix>> {
  match record.encoding {
    InstructionEncoding::Default  => return Ok(None),
    InstructionEncoding::Amd3dnow => return Ok(Some(RefiningPrefix::NoPrefix)),
    _                             => { /* Taken from the filter */ }
  }

  let value =
    match record.filter(&MANDATORY_PREFIX.name) {
      Some(value) => value,
      None        => return Ok(None)
    };

  let unsupported = || TreeError::UnsupportedPrefix {
    encoding: record.encoding.to_string(),
    prefix: value.to_string()
  };

  let index = MANDATORY_PREFIX.parse_index(value)?;
  if index.negated {
    return Err(unsupported());
  }

  match MANDATORY_PREFIX.slot_name(index.index) {
    "ignore" => Err(unsupported()),
    name     => RefiningPrefix::from_str(name).map(Some).map_err(|_| unsupported())
  }
}

/// What currently occupies the slot a walk is about to descend through.
enum Occupant {
  Empty,
  /// A selector of the requested type, either in the slot or inside its overflow node.
  Matching(NodeId),
  Overflow(NodeId),
  Conflicting(NodeId),
}

impl TreeBuilder {
  /// Inserts one instruction record into its opcode table.
  pub fn insert_definition(&mut self, record: Rc<InstructionRecord>) -> TreeResult<()> {
    let filters: Vec<(String, String)> = ordered_filters(&record)
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    self.insert_filters(record, &filters)
  }

  /// Inserts `record` along an explicit, already ordered, filter sequence.
  pub(crate) fn insert_filters(&mut self, record: Rc<InstructionRecord>, filters: &[(String, String)])
    -> TreeResult<()>
  {
    let prefix = refining_prefix(&record)?;
    let table = self.tables.get_table(record.encoding, record.opcode_map, prefix)?;

    debug!(
      mnemonic = %record.mnemonic,
      table = %format_table_name(record.encoding, record.opcode_map, prefix),
      opcode = %format!("{:02X}", record.opcode),
      "inserting instruction record"
    );

    let mut current = table;
    let mut index = SlotIndex::regular(record.opcode as usize);

    for (type_expression, value) in filters {
      let (node_type, arguments) = resolve_type_expression(type_expression)?;
      let definition =
        match node_type {
          NodeType::Selector(definition) => definition,
          NodeType::Function(function)   => {
            return Err(TreeError::Unimplemented(format!(
              "function node '{}' required by instruction '{}'",
              function,
              record.mnemonic
            )));
          }
        };
      let next_index = definition.parse_index(value)?;

      current = self.descend(current, index, definition, &arguments, &record)?;
      index = next_index;
    }

    self.place_definition(current, index, record)?;
    self.statistics.records += 1;
    Ok(())
  }

  fn occupant(&self, parent: NodeId, index: SlotIndex, definition: &SelectorDefinition, arguments: &[String])
    -> TreeResult<Occupant>
  {
    let id =
      match self.tree.selector(parent)?.get(index) {
        Some(id) => id,
        None     => return Ok(Occupant::Empty)
      };

    let occupant =
      match &self.tree[id] {
        Node::Selector(node) if node.is_constructed_from(definition, arguments) => Occupant::Matching(id),
        Node::Overflow(overflow) => {
          overflow.children
                  .iter()
                  .copied()
                  .find(|child| {
                    matches!(&self.tree[*child], Node::Selector(node) if node.is_constructed_from(definition, arguments))
                  })
                  .map_or(Occupant::Overflow(id), Occupant::Matching)
        }
        _ => Occupant::Conflicting(id)
      };

    Ok(occupant)
  }

  /// Finds or creates the selector of the requested type in `parent[index]` and returns it.
  fn descend(
    &mut self,
    parent: NodeId,
    index: SlotIndex,
    definition: &'static SelectorDefinition,
    arguments: &[String],
    record: &InstructionRecord
  ) -> TreeResult<NodeId>
  {
    let occupant = self.occupant(parent, index, definition, arguments)?;

    if let Occupant::Matching(existing) = occupant {
      return Ok(existing);
    }

    self.tree.selector(parent)?.check_settable(index)?;
    let next = self.tree.add(SelectorNode::new(definition, arguments)?);
    self.statistics.selectors += 1;

    match occupant {
      Occupant::Empty => {
        self.tree.selector_mut(parent)?.set(index, Some(next))?;
      }
      Occupant::Overflow(overflow) => {
        self.warn_ambiguous(parent, index, record, &*definition.name);
        self.push_overflow(overflow, next)?;
      }
      Occupant::Conflicting(existing) => {
        self.warn_ambiguous(parent, index, record, &*definition.name);
        self.wrap_in_overflow(parent, index, existing, next)?;
      }
      Occupant::Matching(_) => { /* Returned above */ }
    }

    Ok(next)
  }

  /// Puts the definition leaf into `parent[index]`. A definition never shares a slot quietly.
  fn place_definition(&mut self, parent: NodeId, index: SlotIndex, record: Rc<InstructionRecord>) -> TreeResult<()> {
    let parent_node = self.tree.selector(parent)?;
    parent_node.check_settable(index)?;
    let existing = parent_node.get(index);
    let leaf = self.tree.add(DefinitionNode{ record: record.clone() });

    match existing {
      None => {
        self.tree.selector_mut(parent)?.set(index, Some(leaf))?;
      }
      Some(existing) if matches!(self.tree[existing], Node::Overflow(_)) => {
        self.warn_ambiguous(parent, index, &record, "definition");
        self.push_overflow(existing, leaf)?;
      }
      Some(existing) => {
        self.warn_ambiguous(parent, index, &record, "definition");
        self.wrap_in_overflow(parent, index, existing, leaf)?;
      }
    }

    Ok(())
  }

  fn push_overflow(&mut self, overflow: NodeId, node: NodeId) -> TreeResult<()> {
    match self.tree.get_mut(overflow) {
      Some(Node::Overflow(overflow)) => {
        overflow.children.push(node);
        Ok(())
      }
      _ => Err(TreeError::Unreachable(format!("node {} is not an overflow node", overflow)))
    }
  }

  fn wrap_in_overflow(&mut self, parent: NodeId, index: SlotIndex, existing: NodeId, node: NodeId) -> TreeResult<()> {
    let overflow = self.tree.add(OverflowNode{ children: vec![existing, node] });
    self.statistics.overflows += 1;
    self.tree.selector_mut(parent)?.set(index, Some(overflow))
  }

  fn warn_ambiguous(&self, parent: NodeId, index: SlotIndex, record: &InstructionRecord, inserting: &str) {
    let slot =
      match self.tree.selector(parent) {
        Ok(node) => format!("{}[{}]", node, node.definition.slot_expression(index)),
        Err(_)   => format!("{}[{}]", parent, index)
      };
    warn!(
      mnemonic = %record.mnemonic,
      slot = %slot,
      inserting = inserting,
      "ambiguous insertion, slot escalated to an overflow node"
    );
  }
}
