/*!
  Compaction of `mode` and `modrm_mod` selectors.

  Most instructions only care whether the CPU is in 64-bit mode or whether ModRM.mod is `3`. A
  `mode` node that uses nothing but slots `64` and `!64` (or a `modrm_mod` node using `3` and `!3`)
  is replaced by its two-slot compact form, which saves two table words per node.
*/

use std::collections::HashMap;

use lazy_static::lazy_static;
use tracing::debug;

use crate::builder::TreeBuilder;
use crate::error::TreeResult;
use crate::selector::{SelectorDefinition, SlotIndex, MODE, MODE_COMPACT, MODRM_MOD, MODRM_MOD_COMPACT};
use crate::tree::{NodeId, SelectorNode};

/// A selector type with a compact form, and the one slot the compact form distinguishes.
struct Compaction {
  from     : &'static SelectorDefinition,
  to       : &'static SelectorDefinition,
  interest : usize,
}

lazy_static! {
  static ref COMPACTIONS: Vec<Compaction> = vec![
    Compaction{ from: &*MODE, to: &*MODE_COMPACT, interest: 2 },
    Compaction{ from: &*MODRM_MOD, to: &*MODRM_MOD_COMPACT, interest: 3 },
  ];
}

impl TreeBuilder {
  /**
    Compacts every eligible selector reachable from an opcode table. Children are optimized before
    their parents. A node reachable from several slots is optimized once and all its parents end
    up pointing at the same replacement.
  */
  pub fn optimize(&mut self) -> TreeResult<()> {
    let mut replaced: HashMap<NodeId, NodeId> = HashMap::new();
    let roots: Vec<NodeId> = self.tables.iter().map(|(_, _, root)| root).collect();

    for root in roots {
      self.optimize_children(root, &mut replaced)?;
    }

    debug!(compacted = self.statistics.compacted, "selectors compacted");
    Ok(())
  }

  fn optimize_children(&mut self, id: NodeId, replaced: &mut HashMap<NodeId, NodeId>) -> TreeResult<()> {
    let slots: Vec<(SlotIndex, NodeId)> = self.tree.selector(id)?.populated_slots().collect();

    for (index, child) in slots {
      if self.tree[child].as_selector().is_none() {
        continue;
      }
      let replacement =
        match replaced.get(&child) {
          Some(replacement) => *replacement,
          None => {
            self.optimize_children(child, replaced)?;
            let replacement = self.compact(child)?.unwrap_or(child);
            replaced.insert(child, replacement);
            replacement
          }
        };
      if replacement != child {
        self.tree.selector_mut(id)?.set(index, Some(replacement))?;
      }
    }

    Ok(())
  }

  /// The compact equivalent of the selector at `id`, if there is one.
  fn compact(&mut self, id: NodeId) -> TreeResult<Option<NodeId>> {
    let node = self.tree.selector(id)?;
    let compaction =
      match COMPACTIONS.iter().find(|c| std::ptr::eq(c.from, node.definition)) {
        Some(compaction) => compaction,
        None             => return Ok(None)
      };

    let interest = compaction.interest;
    let eligible = node.populated_slots().all(|(index, _)| index.index == interest);
    if !eligible {
      return Ok(None);
    }

    let matching  = node.get(SlotIndex::regular(interest));
    let otherwise = node.get(SlotIndex::negated(interest));

    let mut compact = SelectorNode::new::<&str>(compaction.to, &[])?;
    compact.set(SlotIndex::regular(0), matching)?;
    compact.set(SlotIndex::negated(0), otherwise)?;

    debug!(node = %id, compact = %compaction.to.name, "selector compacted");
    self.statistics.compacted += 1;
    Ok(Some(self.tree.add(compact)))
  }
}
