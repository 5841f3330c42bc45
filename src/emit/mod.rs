/*!
  The flattening engine.

  `emit` lays a subtree out as one contiguous array of table words, visiting nodes breadth first
  from an explicit work queue. Every node is assigned the address at which its encoding starts.
  When a selector node is visited its distinct children are laid out back to back right after
  everything scheduled so far, in the order of their first appearance in the selector's effective
  slots. A child referenced from several slots of the same selector gets a single address.

  Backends implement `TableEmitter`. The engine calls back once per emitted node, in address
  order, and the backend turns the callbacks into text.

  Data nodes take no space of their own. They are handed to the backend as slot targets and
  rendered inline.
*/

mod code;
mod console;

pub use code::CodeEmitter;
pub use console::{statistics_table, ConsoleEmitter};

use std::collections::{BTreeMap, HashMap, VecDeque};

#[cfg(feature = "trace_flattening")]
use tracing::trace;

use crate::error::{TreeError, TreeResult};
use crate::tree::{DecoderTree, DefinitionNode, Node, NodeId, SelectorNode, TableSwitchNode};

/// Where one slot of a selector node leads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlotTarget {
  pub index   : usize,
  pub node    : Option<NodeId>,
  /// The absolute address of `node`. `None` for an empty slot.
  pub address : Option<usize>,
  /// The distance from the referring selector node to `node`. `None` for an empty slot.
  pub offset  : Option<usize>,
}

/// Receives the nodes of a subtree in address order.
pub trait TableEmitter {
  fn emit_selector_node(
    &mut self,
    tree: &DecoderTree,
    address: usize,
    node: &SelectorNode,
    targets: &[SlotTarget]
  ) -> TreeResult<()>;

  fn emit_definition_node(&mut self, address: usize, node: &DefinitionNode) -> TreeResult<()>;

  fn emit_table_switch_node(&mut self, address: usize, node: &TableSwitchNode) -> TreeResult<()>;
}

/// Counters collected over every `emit` call of a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EmitStatistics {
  /// Emitted selector nodes per selector type and arguments, e.g. `modrm_mod` or `opcode`.
  pub selectors      : BTreeMap<String, usize>,
  pub definitions    : usize,
  pub table_switches : usize,
  /// The largest `SlotTarget::offset` seen.
  pub highest_offset : usize,
}

impl EmitStatistics {
  pub fn new() -> EmitStatistics {
    EmitStatistics::default()
  }

  fn count_selector(&mut self, node: &SelectorNode) {
    let mut key = node.definition.name.to_string();
    if !node.arguments.is_empty() {
      let arguments: Vec<&str> = node.arguments.iter().map(|a| a.value.as_str()).collect();
      key = format!("{}[{}]", key, arguments.join(", "));
    }
    *self.selectors.entry(key).or_insert(0) += 1;
  }
}

/**
  Flattens the subtree rooted at `root` into `emitter`, with `root` placed at address `start`.
  Returns the number of table words emitted.

  Fails on an overflow node (the build left an ambiguity), a function node (not implemented) or a
  data node in a position where it would need an address of its own.
*/
pub fn emit<E>(
  tree: &DecoderTree,
  root: NodeId,
  start: usize,
  emitter: &mut E,
  statistics: &mut EmitStatistics
) -> TreeResult<usize>
  where E: TableEmitter + ?Sized
{
  let mut queue   : VecDeque<NodeId> = VecDeque::new();
  let mut current : usize = start;
  let mut target  : usize = start + tree.encoded_size(root);

  queue.push_back(root);

  while let Some(id) = queue.pop_front() {
    let node =
      tree.get(id)
          .ok_or_else(|| TreeError::Unreachable(format!("node {} is not in the tree", id)))?;

    #[cfg(feature = "trace_flattening")]
    trace!(address = current, kind = %node.kind(), node = %node, "flattening node");

    match node {

      Node::Selector(selector) => {
        let entries = selector.effective_entries()?;

        let mut offsets  : HashMap<NodeId, usize> = HashMap::new();
        let mut distinct : Vec<NodeId> = Vec::new();
        let mut size     : usize = 0;
        for child in entries.iter().flatten() {
          if !offsets.contains_key(child) {
            offsets.insert(*child, size);
            distinct.push(*child);
            size += tree.encoded_size(*child);
          }
        }

        let mut targets = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
          let slot_target =
            match entry.and_then(|child| offsets.get(&child).map(|offset| (child, *offset))) {
              Some((child, offset)) => {
                let address = target + offset;
                let relative = address - current;
                statistics.highest_offset = statistics.highest_offset.max(relative);
                SlotTarget{ index, node: Some(child), address: Some(address), offset: Some(relative) }
              }
              None => SlotTarget{ index, node: None, address: None, offset: None }
            };
          targets.push(slot_target);
        }

        statistics.count_selector(selector);
        emitter.emit_selector_node(tree, current, selector, &targets)?;

        current += selector.encoded_size();
        target  += size;
        queue.extend(distinct.into_iter().filter(|child| !matches!(tree[*child], Node::Data(_))));
      }

      Node::Definition(definition) => {
        statistics.definitions += 1;
        emitter.emit_definition_node(current, definition)?;
        current += node.encoded_size();
      }

      Node::TableSwitch(switch) => {
        statistics.table_switches += 1;
        emitter.emit_table_switch_node(current, switch)?;
        current += node.encoded_size();
      }

      Node::Overflow(_) => {
        return Err(TreeError::OverflowReachedEmission(format!("{} at address {}", node, current)));
      }

      Node::Function(_) => {
        return Err(TreeError::Unimplemented(format!("emission of function node '{}'", node)));
      }

      Node::Data(_) => {
        return Err(TreeError::UnsupportedNode(format!("data node '{}' cannot be addressed", node)));
      }

    } // end match node
  } // end while

  if current != target {
    return Err(TreeError::Unreachable(format!(
      "flattened {} words but scheduled {}",
      current - start,
      target - start
    )));
  }

  Ok(target - start)
}
