/*!
  Instruction records: the input of the table compiler. One record per encodable instruction form.

  Records are read from a JSON array:

  ```json
  [
    {
      "mnemonic": "vaddps",
      "encoding": "vex",
      "opcode_map": "0f",
      "opcode": "58",
      "filters": { "mandatory_prefix": "none", "vector_length": "256" },
      "operands": [ ... ]
    }
  ]
  ```

  `encoding` and `opcode_map` default to `default`. `opcode` is a number or a hexadecimal string.
  Keys other than the ones above are kept as opaque attributes. They take part in the identity of
  an instruction definition (see `registry`) but never in the decoder tree.
*/

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::io::Read;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use string_cache::DefaultAtom;

use crate::encoding::{InstructionEncoding, OpcodeMap};
use crate::error::{TreeError, TreeResult};
use crate::selector::parse_hex_byte;

#[derive(Clone, Debug, PartialEq)]
pub struct InstructionRecord {
  pub mnemonic   : DefaultAtom,
  pub encoding   : InstructionEncoding,
  pub opcode_map : OpcodeMap,
  pub opcode     : u8,
  /// Filter name to filter value, e.g. `modrm_mod` to `!3`.
  pub filters    : BTreeMap<String, String>,
  pub attributes : BTreeMap<String, Value>,
}

impl InstructionRecord {
  /// A legacy-encoded record for opcode `00` of the primary map, with no filters.
  pub fn new(mnemonic: &str) -> InstructionRecord {
    InstructionRecord{
      mnemonic   : DefaultAtom::from(mnemonic),
      encoding   : InstructionEncoding::default(),
      opcode_map : OpcodeMap::default(),
      opcode     : 0,
      filters    : BTreeMap::new(),
      attributes : BTreeMap::new(),
    }
  }

  pub fn with_opcode(mut self, encoding: InstructionEncoding, opcode_map: OpcodeMap, opcode: u8) -> Self {
    self.encoding = encoding;
    self.opcode_map = opcode_map;
    self.opcode = opcode;
    self
  }

  pub fn with_filter(mut self, name: &str, value: &str) -> Self {
    self.filters.insert(name.to_string(), value.to_string());
    self
  }

  pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
    self.attributes.insert(name.to_string(), value);
    self
  }

  pub fn filter(&self, name: &str) -> Option<&str> {
    self.filters.get(name).map(String::as_str)
  }
}


#[derive(Deserialize)]
struct RawRecord {
  mnemonic: String,
  #[serde(default)]
  encoding: Option<String>,
  #[serde(default)]
  opcode_map: Option<String>,
  opcode: Value,
  #[serde(default)]
  filters: BTreeMap<String, String>,
  #[serde(flatten)]
  attributes: BTreeMap<String, Value>,
}

impl TryFrom<RawRecord> for InstructionRecord {
  type Error = TreeError;

  fn try_from(raw: RawRecord) -> TreeResult<InstructionRecord> {
    let encoding =
      match &raw.encoding {
        Some(text) => InstructionEncoding::from_str(text).map_err(|_| {
          TreeError::Record(format!("'{}': unknown encoding '{}'", raw.mnemonic, text))
        })?,
        None => InstructionEncoding::default()
      };

    let opcode_map =
      match &raw.opcode_map {
        Some(text) => OpcodeMap::from_str(text).map_err(|_| {
          TreeError::Record(format!("'{}': unknown opcode map '{}'", raw.mnemonic, text))
        })?,
        None => OpcodeMap::default()
      };

    let opcode =
      match &raw.opcode {
        Value::Number(number) => number.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(text)   => parse_hex_byte(text),
        _                     => None
      }.ok_or_else(|| {
        TreeError::Record(format!("'{}': invalid opcode {}", raw.mnemonic, raw.opcode))
      })?;

    Ok(InstructionRecord{
      mnemonic   : DefaultAtom::from(raw.mnemonic.as_str()),
      encoding,
      opcode_map,
      opcode,
      filters    : raw.filters,
      attributes : raw.attributes,
    })
  }
}

/// Reads a JSON array of instruction records.
pub fn read_records(text: &str) -> TreeResult<Vec<InstructionRecord>> {
  let raw: Vec<RawRecord> = serde_json::from_str(text)?;
  raw.into_iter().map(InstructionRecord::try_from).collect()
}

pub fn read_records_from<R: Read>(reader: R) -> TreeResult<Vec<InstructionRecord>> {
  let raw: Vec<RawRecord> = serde_json::from_reader(reader)?;
  raw.into_iter().map(InstructionRecord::try_from).collect()
}
