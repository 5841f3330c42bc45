/*!
  The end-to-end pipeline: records in, decoder tables out.

  Every phase runs to completion before the next one starts:

    1. register every record's definition and insert the record into its opcode table;
    2. assign instruction ids;
    3. wire the opcode tables together;
    4. compact selectors;
    5. audit for unresolved ambiguities, refusing to continue if any remain;
    6. flatten the populated tables through a backend.
*/

use std::rc::Rc;

use tracing::{error, info};

use crate::builder::{DecoderTables, TreeBuilder};
use crate::emit::{emit, CodeEmitter, ConsoleEmitter, EmitStatistics};
use crate::error::{TreeError, TreeResult};
use crate::record::InstructionRecord;
use crate::registry::DefinitionRegistry;
use crate::tables::TableKey;
use crate::tree::NodeId;

pub struct Generator {
  registry : DefinitionRegistry,
  tables   : DecoderTables,
}

impl Generator {
  /// Runs the build phases over `records`.
  pub fn build<I>(records: I) -> TreeResult<Generator>
    where I: IntoIterator<Item = InstructionRecord>
  {
    let mut registry = DefinitionRegistry::new();
    let mut builder = TreeBuilder::new();

    for record in records {
      registry.insert(&record);
      let mnemonic = record.mnemonic.clone();
      if let Err(failure) = builder.insert_definition(Rc::new(record)) {
        error!(mnemonic = %mnemonic, "failed to insert instruction record");
        return Err(failure);
      }
    }
    registry.finalize()?;

    info!(
      records = builder.statistics().records,
      definitions = registry.total(),
      selectors = builder.statistics().selectors,
      overflows = builder.statistics().overflows,
      "instruction records inserted"
    );

    builder.insert_opcode_table_switch_nodes()?;
    info!(
      switches = builder.statistics().switches,
      pruned = builder.statistics().pruned_switches,
      "opcode tables wired"
    );

    builder.optimize()?;
    info!(compacted = builder.statistics().compacted, "decoder tree optimized");

    builder.audit()?;

    Ok(Generator{
      registry,
      tables: builder.finish()
    })
  }

  pub fn registry(&self) -> &DefinitionRegistry {
    &self.registry
  }

  pub fn tables(&self) -> &DecoderTables {
    &self.tables
  }

  /// `(table id, key, root)` of every opcode table with at least one populated slot.
  fn populated_tables(&self) -> TreeResult<Vec<(usize, TableKey, NodeId)>> {
    let mut populated = Vec::new();
    for (id, key, root) in self.tables.tables().iter() {
      if self.tables.tree().selector(root)?.has_non_empty_entries() {
        populated.push((id, key, root));
      }
    }
    Ok(populated)
  }

  /// Renders every populated table, followed by the table index, as C source.
  pub fn emit_code(&self, statistics: &mut EmitStatistics) -> TreeResult<String> {
    let tree = self.tables.tree();
    let mut emitter = CodeEmitter::new(&self.registry);
    let mut names: Vec<Option<String>> = vec![None; self.tables.tables().len()];

    for (id, key, root) in self.populated_tables()? {
      let name = key.to_string();
      emitter.begin_table(&name);
      let size = emit(tree, root, 0, &mut emitter, statistics)?;
      emitter.end_table();

      info!(table = %name, size, highest_offset = statistics.highest_offset, "table emitted");
      names[id] = Some(name);
    }

    emitter.write_table_index(&names);
    info!(highest_offset = statistics.highest_offset, "code emitted");
    Ok(emitter.finish())
  }

  /// Renders the populated tables, or just the table named `only`, for reading.
  pub fn emit_console(&self, only: Option<&str>, skip_empty: bool, statistics: &mut EmitStatistics)
    -> TreeResult<String>
  {
    let selected =
      match only {
        Some(name) => {
          let (key, root) = self.tables.tables().find_by_name(name).ok_or_else(|| {
            TreeError::InvalidTable(format!("table name '{}'", name))
          })?;
          vec![(key.id()?, key, root)]
        }
        None => self.populated_tables()?
      };

    let tree = self.tables.tree();
    let mut emitter = ConsoleEmitter::new(&self.registry, skip_empty);
    for (id, key, root) in selected {
      let name = key.to_string();
      emitter.begin_table(&name, id);
      let size = emit(tree, root, 0, &mut emitter, statistics)?;
      emitter.end_table(size);

      info!(table = %name, size, highest_offset = statistics.highest_offset, "table emitted");
    }
    Ok(emitter.finish())
  }
}
