//! Box-drawing dump of a subtree, used for diagnostics and for comparing tree shapes in tests.

use std::fmt::{Display, Formatter};

use crate::tree::{DecoderTree, Node, NodeId};

pub struct TreeDisplay<'t> {
  tree : &'t DecoderTree,
  root : NodeId,
}

impl<'t> TreeDisplay<'t> {
  pub fn new(tree: &'t DecoderTree, root: NodeId) -> TreeDisplay<'t> {
    TreeDisplay{ tree, root }
  }

  /// Labelled children of `id`: slot expressions for selectors, positions for the others.
  fn labelled_children(&self, id: NodeId) -> Vec<(String, NodeId)> {
    match self.tree.get(id) {
      Some(Node::Selector(node)) => {
        node.populated_slots()
            .map(|(index, child)| (node.definition.slot_expression(index), child))
            .collect()
      }
      Some(Node::Overflow(node)) => {
        node.children.iter().enumerate().map(|(i, child)| (format!("<{}>", i), *child)).collect()
      }
      Some(Node::Function(node)) => {
        node.next.iter().map(|child| ("next".to_string(), *child)).collect()
      }
      _ => Vec::new()
    }
  }

  fn fmt_aux(&self, id: NodeId, label: &str, prefix: &str, child_prefix: &str) -> String {
    let mut buffer =
      match self.tree.get(id) {
        Some(node) => format!("{}{}{}<{}>", prefix, label, node.kind(), node),
        None       => format!("{}{}<dangling {}>", prefix, label, id)
      };

    let children = self.labelled_children(id);
    for (i, (slot, child)) in children.iter().enumerate() {
      buffer.push('\n');
      let label = format!("{}: ", slot);
      if i != children.len() - 1 {
        buffer.push_str(
          self.fmt_aux(
            *child,
            &label,
            &format!("{}{}", child_prefix, "├── "),
            &format!("{}{}", child_prefix, "│   ")
          ).as_str()
        );
      } else {
        buffer.push_str(
          self.fmt_aux(
            *child,
            &label,
            &format!("{}{}", child_prefix, "└── "),
            &format!("{}{}", child_prefix, "    ")
          ).as_str()
        );
      }
    };
    buffer
  }
}

impl<'t> Display for TreeDisplay<'t> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.fmt_aux(self.root, "", "", ""))
  }
}


#[cfg(test)]
mod tests {
  use std::rc::Rc;

  use crate::record::InstructionRecord;
  use crate::selector::{SlotIndex, MODRM_MOD};
  use crate::tree::{DecoderTree, DefinitionNode, OverflowNode, SelectorNode};

  #[test]
  fn renders_slots_and_overflow(){
    let mut tree = DecoderTree::new();
    let add = tree.add(DefinitionNode{ record: Rc::new(InstructionRecord::new("add")) });
    let sub = tree.add(DefinitionNode{ record: Rc::new(InstructionRecord::new("sub")) });
    let overflow = tree.add(OverflowNode{ children: vec![add, sub] });

    let mut node = SelectorNode::new::<&str>(&MODRM_MOD, &[]).unwrap();
    node.set(SlotIndex::regular(3), Some(add)).unwrap();
    node.set(SlotIndex::negated(3), Some(overflow)).unwrap();
    let root = tree.add(node);

    let expected = "\
selector<modrm_mod>
├── 3: definition<add>
└── !3: overflow<overflow(2)>
    ├── <0>: definition<add>
    └── <1>: definition<sub>";
    assert_eq!(tree.display(root).to_string(), expected);
  }
}
