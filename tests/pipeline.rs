use dtc::emit::EmitStatistics;
use dtc::encoding::{InstructionEncoding, OpcodeMap, RefiningPrefix};
use dtc::record::read_records;
use dtc::selector::SlotIndex;
use dtc::tree::Node;
use dtc::{Generator, TreeError};

const RECORDS: &str = r#"[
  { "mnemonic": "add", "opcode": "00", "filters": { "modrm_mod": "3" } },
  { "mnemonic": "add", "opcode": "00", "filters": { "modrm_mod": "!3" }, "operands": ["m8", "r8"] },
  { "mnemonic": "les", "opcode": "c4", "filters": { "mode": "!64" } },
  { "mnemonic": "syscall", "opcode_map": "0f", "opcode": "05", "filters": { "mode": "64" } },
  { "mnemonic": "pshufb", "opcode_map": "0f38", "opcode": "00",
    "filters": { "mandatory_prefix": "66", "modrm_mod": "3" } },
  { "mnemonic": "vaddps", "encoding": "vex", "opcode_map": "0f", "opcode": "58",
    "filters": { "mandatory_prefix": "none", "vector_length": "128" } },
  { "mnemonic": "vaddps", "encoding": "vex", "opcode_map": "0f", "opcode": "58",
    "filters": { "mandatory_prefix": "none", "vector_length": "256" }, "width": 256 },
  { "mnemonic": "vaddpd", "encoding": "evex", "opcode_map": "0f", "opcode": 88,
    "filters": { "mandatory_prefix": "66", "evex_b": "1" } },
  { "mnemonic": "pfadd", "encoding": "3dnow", "opcode_map": "0f0f", "opcode": "9e" }
]"#;

fn generator() -> Generator {
  Generator::build(read_records(RECORDS).unwrap()).unwrap()
}

#[test]
fn legacy_escape_keeps_previous_occupant(){
  let generator = generator();
  let tree = generator.tables().tree();
  let primary = generator.tables().tables().get_table(InstructionEncoding::Default, OpcodeMap::Map0, None).unwrap();

  let vex3 = tree.selector(primary).unwrap().get(SlotIndex::regular(0xC4)).unwrap();
  let vex3 = tree.selector(vex3).unwrap();
  let default = vex3.get(vex3.definition.parse_index("default").unwrap()).unwrap();

  // `mode: !64` alone compacts to `mode_compact`.
  match &tree[default] {
    Node::Selector(node) => assert_eq!(&*node.definition.name, "mode_compact"),
    other                => panic!("unexpected default slot {}", other)
  }
  let np_0f = vex3.get(vex3.definition.parse_index("np_0f").unwrap()).unwrap();
  assert!(matches!(&tree[np_0f], Node::TableSwitch(switch) if switch.table_id == 5));
}

#[test]
fn every_populated_table_is_emitted(){
  let generator = generator();
  let mut statistics = EmitStatistics::new();
  let code = generator.emit_code(&mut statistics).unwrap();

  for table in &["PRIMARY", "0F", "0F38", "VEX_NP_0F", "EVEX_66_0F", "3DNW_NP_0F0F"] {
    assert!(code.contains(&format!("DECODER_TREE_{}[] =", table)), "missing table {}", table);
  }
  assert!(!code.contains("DECODER_TREE_0F3A[] ="));
  assert_eq!(code.matches("NULL,").count(), 72 - 6);
  assert_eq!(code.matches("ZYDIS_DT_DEFINITION_HEADER").count(), 9);
  assert!(code.contains("ZYDIS_NODETYPE_MODE_COMPACT"));
  assert!(code.contains("ZYDIS_NODETYPE_VECTOR_LENGTH"));
  assert!(statistics.highest_offset > 0);

  let index = code.find("OPCODE_TABLE_TREES").unwrap();
  let listed: Vec<&str> = code[index..]
      .lines()
      .filter(|line| line.trim_start().starts_with("DECODER_TREE_"))
      .map(|line| line.trim().trim_end_matches(','))
      .collect();
  assert_eq!(listed, vec![
    "DECODER_TREE_PRIMARY",
    "DECODER_TREE_0F",
    "DECODER_TREE_0F38",
    "DECODER_TREE_VEX_NP_0F",
    "DECODER_TREE_EVEX_66_0F",
    "DECODER_TREE_3DNW_NP_0F0F",
  ]);
}

#[test]
fn console_backend_renders_all_populated_tables(){
  let generator = generator();
  let text = generator.emit_console(None, true, &mut EmitStatistics::new()).unwrap();

  assert!(text.contains("══ PRIMARY (table 0x00"));
  assert!(text.contains("══ 3DNW_NP_0F0F (table 0x47"));
  assert!(text.contains("definition<pfadd>"));
  assert!(text.contains("table_switch<EVEX_66_0F>"));
}

#[test]
fn definition_ids_are_per_encoding(){
  let generator = generator();
  let registry = generator.registry();
  assert_eq!(registry.len(InstructionEncoding::Default), 5);
  assert_eq!(registry.len(InstructionEncoding::Vex), 2);
  assert_eq!(registry.len(InstructionEncoding::Evex), 1);
  assert_eq!(registry.len(InstructionEncoding::Amd3dnow), 1);

  let evex = generator.tables().tables()
      .get_table(InstructionEncoding::Evex, OpcodeMap::M0F, Some(RefiningPrefix::P66))
      .unwrap();
  assert!(generator.tables().tree().selector(evex).unwrap().has_non_empty_entries());
}

#[test]
fn conflicting_records_abort_before_emission(){
  let records = read_records(r#"[
    { "mnemonic": "first",  "opcode": "90", "filters": { "mode": "64" } },
    { "mnemonic": "second", "opcode": "90", "filters": { "operand_size": "32" } }
  ]"#).unwrap();

  match Generator::build(records) {
    Err(TreeError::UnresolvedOverflow(locations)) => {
      assert_eq!(locations, vec!["PRIMARY[90]: overflow of mode, operand_size".to_string()]);
    }
    Err(other) => panic!("unexpected error {}", other),
    Ok(_)      => panic!("ambiguous input was accepted")
  }
}
