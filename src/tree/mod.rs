/*!
  The decoder tree node model.

  All nodes live in one arena, `DecoderTree`, and refer to each other by `NodeId`. The graph is a
  DAG: opcode tables and escape selectors share subtrees (a legacy fallback reachable from several
  escape slots, for instance), and identity (the `NodeId`) is what the flattening engine uses to
  emit a shared node only once per parent.

  | Kind          | Encoded size                                        |
  |:--------------|:----------------------------------------------------|
  | `Selector`    | header + (arguments - 1) + one word per slot        |
  | `Definition`  | 2, header + instruction id                          |
  | `Data`        | 0, inlined into the referring header                |
  | `Overflow`    | 0, never emitted                                    |
  | `TableSwitch` | 1                                                   |
  | `Function`    | header + (arguments - 1) + 1 if it has a successor  |
*/

mod display;
mod selector_node;

pub use display::TreeDisplay;
pub use selector_node::SelectorNode;

use std::fmt::{Display, Formatter};
use std::ops::Index;
use std::rc::Rc;

use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::error::{TreeError, TreeResult};
use crate::record::InstructionRecord;
use crate::selector::FunctionDefinition;
use crate::tables::TableKey;

/// A handle to a node in a `DecoderTree`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
  pub fn index(&self) -> usize {
    self.0
  }
}

impl Display for NodeId {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}


// region Leaf nodes

/// An opaque literal, emitted verbatim wherever it is referenced.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DataNode {
  pub value: String
}

impl DataNode {
  pub fn new(value: &str) -> DataNode {
    DataNode{ value: value.to_string() }
  }
}

/// A leaf naming the instruction the decoder has identified.
#[derive(Clone, Debug)]
pub struct DefinitionNode {
  pub record: Rc<InstructionRecord>
}

/// A bag of conflicting nodes that ended up in the same slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OverflowNode {
  pub children: Vec<NodeId>
}

/// Hands decoding over to another opcode table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableSwitchNode {
  pub table    : TableKey,
  pub table_id : usize,
}

/// A runtime action followed by a continuation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionNode {
  pub definition : &'static FunctionDefinition,
  pub arguments  : Vec<DataNode>,
  pub next       : Option<NodeId>,
}

impl FunctionNode {
  pub fn encoded_size(&self) -> usize {
    1 + self.arguments.len().saturating_sub(1) + self.next.map_or(0, |_| 1)
  }
}

// endregion Leaf nodes


#[derive(StrumDisplay, IntoStaticStr, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
  Selector,
  Definition,
  Data,
  Overflow,
  TableSwitch,
  Function,
}

#[derive(Clone, Debug)]
pub enum Node {
  Selector(SelectorNode),
  Definition(DefinitionNode),
  Data(DataNode),
  Overflow(OverflowNode),
  TableSwitch(TableSwitchNode),
  Function(FunctionNode),
}

impl Node {
  pub fn kind(&self) -> NodeKind {
    match self {
      Node::Selector(_)    => NodeKind::Selector,
      Node::Definition(_)  => NodeKind::Definition,
      Node::Data(_)        => NodeKind::Data,
      Node::Overflow(_)    => NodeKind::Overflow,
      Node::TableSwitch(_) => NodeKind::TableSwitch,
      Node::Function(_)    => NodeKind::Function,
    }
  }

  /// The number of table words this node occupies when flattened.
  pub fn encoded_size(&self) -> usize {
    match self {
      Node::Selector(node)    => node.encoded_size(),
      Node::Definition(_)     => 2,
      Node::Data(_)           => 0,
      Node::Overflow(_)       => 0,
      Node::TableSwitch(_)    => 1,
      Node::Function(node)    => node.encoded_size(),
    }
  }

  pub fn is_terminal(&self) -> bool {
    !matches!(self, Node::Selector(_) | Node::Function(_))
  }

  pub fn as_selector(&self) -> Option<&SelectorNode> {
    match self {
      Node::Selector(node) => Some(node),
      _                    => None
    }
  }

  pub fn as_selector_mut(&mut self) -> Option<&mut SelectorNode> {
    match self {
      Node::Selector(node) => Some(node),
      _                    => None
    }
  }

  /// Every node this node refers to, including the negated entry of a selector.
  pub fn children(&self) -> Vec<NodeId> {
    match self {
      Node::Selector(node) => node.populated_slots().map(|(_, child)| child).collect(),
      Node::Overflow(node) => node.children.clone(),
      Node::Function(node) => node.next.into_iter().collect(),
      _                    => Vec::new()
    }
  }
}

impl Display for Node {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Node::Selector(node)    => write!(f, "{}", node),
      Node::Definition(node)  => write!(f, "{}", node.record.mnemonic),
      Node::Data(node)        => write!(f, "{}", node.value),
      Node::Overflow(node)    => write!(f, "overflow({})", node.children.len()),
      Node::TableSwitch(node) => write!(f, "{}", node.table),
      Node::Function(node)    => {
        write!(
          f,
          "{}({})",
          node.definition.name,
          node.arguments.iter().map(|a| a.value.as_str()).collect::<Vec<&str>>().join(", ")
        )
      }
    }
  }
}

impl From<SelectorNode> for Node {
  fn from(node: SelectorNode) -> Self {
    Node::Selector(node)
  }
}

impl From<DefinitionNode> for Node {
  fn from(node: DefinitionNode) -> Self {
    Node::Definition(node)
  }
}

impl From<DataNode> for Node {
  fn from(node: DataNode) -> Self {
    Node::Data(node)
  }
}

impl From<OverflowNode> for Node {
  fn from(node: OverflowNode) -> Self {
    Node::Overflow(node)
  }
}

impl From<TableSwitchNode> for Node {
  fn from(node: TableSwitchNode) -> Self {
    Node::TableSwitch(node)
  }
}

impl From<FunctionNode> for Node {
  fn from(node: FunctionNode) -> Self {
    Node::Function(node)
  }
}


/// The node arena. Nodes are never removed; a replaced node simply becomes unreachable.
#[derive(Clone, Debug, Default)]
pub struct DecoderTree {
  nodes: Vec<Node>
}

impl DecoderTree {
  pub fn new() -> DecoderTree {
    DecoderTree::default()
  }

  pub fn add<N: Into<Node>>(&mut self, node: N) -> NodeId {
    self.nodes.push(node.into());
    NodeId(self.nodes.len() - 1)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn get(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(id.0)
  }

  pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
    self.nodes.get_mut(id.0)
  }

  /// Borrows the selector at `id`, failing if `id` holds some other kind of node.
  pub fn selector(&self, id: NodeId) -> TreeResult<&SelectorNode> {
    self.get(id)
        .and_then(Node::as_selector)
        .ok_or_else(|| TreeError::Unreachable(format!("node {} is not a selector node", id)))
  }

  pub fn selector_mut(&mut self, id: NodeId) -> TreeResult<&mut SelectorNode> {
    self.get_mut(id)
        .and_then(Node::as_selector_mut)
        .ok_or_else(|| TreeError::Unreachable(format!("node {} is not a selector node", id)))
  }

  pub fn encoded_size(&self, id: NodeId) -> usize {
    self.get(id).map_or(0, Node::encoded_size)
  }

  /**
    The encoded size of `id` plus, recursively, that of every node it refers to. A node referred
    to from several slots is counted once per reference. Overflow nodes contribute nothing.
  */
  pub fn encoded_size_recursive(&self, id: NodeId) -> usize {
    let mut total = 0;
    let mut stack = vec![id];

    while let Some(next) = stack.pop() {
      let node =
        match self.get(next) {
          Some(node) => node,
          None       => continue
        };
      total += node.encoded_size();
      match node {
        Node::Selector(_) | Node::Function(_) => stack.extend(node.children()),
        _                                     => { /* Terminal */ }
      }
    }

    total
  }

  /// Iterates every node in the arena, reachable or not, in creation order.
  pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
    self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
  }

  /// A `Display`able box-drawing rendering of the subtree rooted at `root`.
  pub fn display(&self, root: NodeId) -> TreeDisplay<'_> {
    TreeDisplay::new(self, root)
  }
}

impl Index<NodeId> for DecoderTree {
  type Output = Node;

  fn index(&self, id: NodeId) -> &Node {
    &self.nodes[id.0]
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::selector::{SlotIndex, MODE, MODRM_MOD};

  fn definition(tree: &mut DecoderTree, mnemonic: &str) -> NodeId {
    tree.add(DefinitionNode{ record: Rc::new(InstructionRecord::new(mnemonic)) })
  }

  #[test]
  fn fixed_encoded_sizes(){
    let mut tree = DecoderTree::new();
    let def   = definition(&mut tree, "nop");
    let data  = tree.add(DataNode::new("ZYDIS_REG_NONE"));
    let over  = tree.add(OverflowNode{ children: vec![def] });

    assert_eq!(tree.encoded_size(def), 2);
    assert_eq!(tree.encoded_size(data), 0);
    assert_eq!(tree.encoded_size(over), 0);
    assert!(tree[def].is_terminal());
    assert_eq!(tree[over].kind(), NodeKind::Overflow);
    assert_eq!(NodeKind::TableSwitch.to_string(), "table_switch");
  }

  #[test]
  fn function_size_depends_on_arguments_and_successor(){
    let function = crate::selector::function_definition("force_operand_size").unwrap();
    let node = FunctionNode{
      definition: function,
      arguments: vec![DataNode::new("16"), DataNode::new("32")],
      next: Some(NodeId(0))
    };
    assert_eq!(node.encoded_size(), 3);
    let node = FunctionNode{ next: None, ..node };
    assert_eq!(node.encoded_size(), 2);
  }

  #[test]
  fn recursive_size_includes_negated_entries(){
    let mut tree = DecoderTree::new();
    let a = definition(&mut tree, "a");
    let b = definition(&mut tree, "b");

    let mut mode = SelectorNode::new::<&str>(&MODE, &[]).unwrap();
    mode.set(SlotIndex::regular(2), Some(a)).unwrap();
    mode.set(SlotIndex::negated(2), Some(b)).unwrap();
    let mode = tree.add(mode);

    let mut modrm = SelectorNode::new::<&str>(&MODRM_MOD, &[]).unwrap();
    modrm.set(SlotIndex::regular(0), Some(mode)).unwrap();
    modrm.set(SlotIndex::regular(1), Some(a)).unwrap();
    let modrm = tree.add(modrm);

    // modrm (5) + mode (4) + a (2) + b (2) + a again (2)
    assert_eq!(tree.encoded_size_recursive(modrm), 15);
  }

  #[test]
  fn selector_accessor_rejects_other_kinds(){
    let mut tree = DecoderTree::new();
    let def = definition(&mut tree, "nop");
    assert!(matches!(tree.selector(def), Err(TreeError::Unreachable(_))));
  }
}
