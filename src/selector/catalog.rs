/*!
  The Selector Catalog and the function catalog: static, read-only definitions looked up by name.

  The escape selectors (`xop`, `vex`, `emvex`, `rex2_map`) and the compact selectors
  (`mode_compact`, `modrm_mod_compact`) are never named by instruction records. They are created
  by the builder's wiring and optimization passes, which refer to them through the statics below.
*/

use std::collections::HashMap;

use lazy_static::lazy_static;
use string_cache::DefaultAtom;

use super::{parse_type_expression, FunctionDefinition, SelectorDefinition};
use crate::error::{TreeError, TreeResult};

/// Selectors with exactly the two slots `0` and `1`.
static BINARY_SELECTOR_NAMES: &[&str] = &[
  "prefix_group1",
  "rex_w",
  "rex_b",
  "evex_b",
  "evex_u",
  "evex_nd",
  "evex_nf",
  "mvex_e",
  "feature_amd",
  "feature_knc",
  "feature_mpx",
  "feature_cet",
  "feature_lzcnt",
  "feature_tzcnt",
  "feature_wbnoinvd",
  "feature_cldemote",
  "feature_centaur",
  "feature_iprefetch",
  "feature_ud0_compat",
];

fn prefixed_slots(lead: &str, prefixes: &[&str], maps: &[&str]) -> Vec<String> {
  let mut slots = Vec::with_capacity(prefixes.len() * maps.len());
  for prefix in prefixes {
    for map in maps {
      if map.is_empty() {
        slots.push(format!("{}{}", lead, prefix));
      } else {
        slots.push(format!("{}{}_{}", lead, prefix, map));
      }
    }
  }
  slots
}

lazy_static! {
  pub static ref OPCODE_TABLE: SelectorDefinition =
    SelectorDefinition::new("opcode", &[], (0..256).map(|byte| format!("{:02X}", byte)))
      .with_description("opcode byte");

  pub static ref XOP: SelectorDefinition = {
    let mut slots = vec!["default".to_string()];
    slots.extend(prefixed_slots("", &["np", "66", "f3", "f2"], &["xop8", "xop9", "xopa"]));
    SelectorDefinition::new("xop", &[], slots)
      .with_description("8F escape: legacy POP or XOP")
  };

  pub static ref VEX: SelectorDefinition = {
    let mut slots = vec!["default".to_string()];
    slots.extend(prefixed_slots("", &["np", "66", "f3", "f2"], &["", "0f", "0f38", "0f3a"]));
    SelectorDefinition::new("vex", &[], slots).with_description("C4/C5 escape: legacy or VEX")
  };

  pub static ref EMVEX: SelectorDefinition = {
    let mut slots = vec!["default".to_string()];
    slots.extend(prefixed_slots(
      "evex_",
      &["np", "66", "f3", "f2"],
      &["", "0f", "0f38", "0f3a", "map4", "map5", "map6", "map7"]
    ));
    slots.extend(prefixed_slots("mvex_", &["np", "66", "f3", "f2"], &["", "0f", "0f38", "0f3a"]));
    SelectorDefinition::new("emvex", &[], slots)
      .with_description("62 escape: legacy BOUND, EVEX or MVEX")
  };

  pub static ref REX2_MAP: SelectorDefinition =
    SelectorDefinition::new("rex2_map", &[], &["default", "rex2_default", "rex2_0f"])
      .with_description("D5 escape: legacy or REX2");

  pub static ref MODE: SelectorDefinition =
    SelectorDefinition::new("mode", &[], &["16", "32", "64"]);

  pub static ref MODE_COMPACT: SelectorDefinition =
    SelectorDefinition::new("mode_compact", &[], &["64", "!64"]);

  pub static ref MODRM_MOD: SelectorDefinition =
    SelectorDefinition::new("modrm_mod", &[], &["0", "1", "2", "3"]);

  pub static ref MODRM_MOD_COMPACT: SelectorDefinition =
    SelectorDefinition::new("modrm_mod_compact", &[], &["3", "!3"]);

  pub static ref MANDATORY_PREFIX: SelectorDefinition =
    SelectorDefinition::new("mandatory_prefix", &[], &["ignore", "none", "66", "f3", "f2"]);

  static ref RECORD_SELECTORS: Vec<SelectorDefinition> = {
    let eight = ["0", "1", "2", "3", "4", "5", "6", "7"];
    let sizes = ["16", "32", "64"];

    let mut selectors = vec![
      SelectorDefinition::new("modrm_reg", &[], &eight),
      SelectorDefinition::new("modrm_rm", &[], &eight),
      SelectorDefinition::new("operand_size", &[], &sizes),
      SelectorDefinition::new("address_size", &[], &sizes),
      SelectorDefinition::new("vector_length", &[], &["128", "256", "512"]),
      SelectorDefinition::new("evex_scc", &[], (0..16).map(|scc| scc.to_string())),
      SelectorDefinition::new("rex_2", &[], &["no_rex2", "rex2"]),
    ];
    selectors.extend(
      BINARY_SELECTOR_NAMES.iter().map(|name| SelectorDefinition::new(name, &[], &["0", "1"]))
    );
    selectors
  };

  static ref SELECTORS_BY_NAME: HashMap<&'static str, &'static SelectorDefinition> = {
    let mut by_name: HashMap<&'static str, &'static SelectorDefinition> = HashMap::new();
    let fixed: [&'static SelectorDefinition; 10] = [
      &*OPCODE_TABLE, &*XOP, &*VEX, &*EMVEX, &*REX2_MAP,
      &*MODE, &*MODE_COMPACT, &*MODRM_MOD, &*MODRM_MOD_COMPACT, &*MANDATORY_PREFIX
    ];
    for definition in fixed.iter().copied().chain(RECORD_SELECTORS.iter()) {
      by_name.insert(&*definition.name, definition);
    }
    by_name
  };

  static ref FUNCTIONS: Vec<FunctionDefinition> = vec![
    FunctionDefinition{
      name        : DefaultAtom::from("force_operand_size"),
      parameters  : vec![DefaultAtom::from("size")],
      description : "overrides the effective operand size"
    },
    FunctionDefinition{
      name        : DefaultAtom::from("force_address_size"),
      parameters  : vec![DefaultAtom::from("size")],
      description : "overrides the effective address size"
    },
  ];
}

/// What a filter's type expression names.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeType {
  Selector(&'static SelectorDefinition),
  Function(&'static FunctionDefinition),
}

pub fn selector_definition(name: &str) -> Option<&'static SelectorDefinition> {
  SELECTORS_BY_NAME.get(name).copied()
}

pub fn function_definition(name: &str) -> Option<&'static FunctionDefinition> {
  FUNCTIONS.iter().find(|function| &*function.name == name)
}

/// Every selector definition in the catalog, in no particular order.
pub fn selector_definitions() -> impl Iterator<Item = &'static SelectorDefinition> {
  SELECTORS_BY_NAME.values().copied()
}

/**
  Resolves a type expression like `modrm_mod` or `force_operand_size[osz64]` to a catalog entry
  and its arguments. The argument count must match the definition's parameter count exactly.
*/
pub fn resolve_type_expression(expression: &str) -> TreeResult<(NodeType, Vec<String>)> {
  let (name, arguments) = parse_type_expression(expression)?;

  let (node_type, expected) =
    if let Some(selector) = selector_definition(name) {
      (NodeType::Selector(selector), selector.number_of_parameters())
    } else if let Some(function) = function_definition(name) {
      (NodeType::Function(function), function.number_of_parameters())
    } else {
      return Err(TreeError::UnknownSelector(name.to_string()));
    };

  if arguments.len() != expected {
    return Err(TreeError::ArgumentCount {
      selector: name.to_string(),
      expected,
      actual: arguments.len()
    });
  }

  Ok((node_type, arguments.into_iter().map(str::to_string).collect()))
}
