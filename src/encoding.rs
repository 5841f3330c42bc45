/*!
  The three coordinates that identify an opcode table: the instruction encoding, the opcode map and
  the refining (mandatory) prefix.

  The declaration order of `InstructionEncoding` is significant. Table ids are assigned by walking
  the encodings in this order, so reordering the variants renumbers every opcode table.
  Order-dependencies:

  ```text
  tables::ENCODING_BASE
  tables::OpcodeTables::new()
  ```
*/

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Ord,             PartialOrd,    Debug, Hash
)]
#[repr(u8)]
pub enum InstructionEncoding {
  #[strum(serialize = "default")]
  Default,
  #[strum(serialize = "vex")]
  Vex,
  #[strum(serialize = "evex")]
  Evex,
  #[strum(serialize = "mvex")]
  Mvex,
  #[strum(serialize = "xop")]
  Xop,
  #[strum(serialize = "3dnow")]
  Amd3dnow,
}

impl Default for InstructionEncoding {
  fn default() -> Self {
    InstructionEncoding::Default
  }
}

impl InstructionEncoding {
  /// The short tag used in opcode table names, e.g. `VEX_66_0F38`. The legacy encoding has none.
  pub fn table_tag(&self) -> Option<&'static str> {
    match self {
      InstructionEncoding::Default  => None,
      InstructionEncoding::Amd3dnow => Some("3DNW"),
      InstructionEncoding::Vex      => Some("VEX"),
      InstructionEncoding::Evex     => Some("EVEX"),
      InstructionEncoding::Mvex     => Some("MVEX"),
      InstructionEncoding::Xop      => Some("XOP"),
    }
  }

  /// The opcode maps this encoding can address, in table-id order.
  pub fn supported_maps(&self) -> &'static [OpcodeMap] {
    use OpcodeMap::*;
    match self {
      InstructionEncoding::Default  => &[Map0, M0F, M0F38, M0F3A],
      InstructionEncoding::Amd3dnow => &[M0F0F],
      InstructionEncoding::Vex      => &[Map0, M0F, M0F38, M0F3A],
      InstructionEncoding::Evex     => &[Map0, M0F, M0F38, M0F3A, Map4, Map5, Map6, Map7],
      InstructionEncoding::Mvex     => &[Map0, M0F, M0F38, M0F3A],
      InstructionEncoding::Xop      => &[Xop8, Xop9, XopA],
    }
  }

  /**
    The refining prefixes this encoding's tables are split by, in table-id order. `None` stands
    for "no refining prefix in the table space", which is only the case for the legacy encoding.
    Legacy instructions do use mandatory prefixes, but rarely, and they are resolved by a
    `mandatory_prefix` selector inside the table instead.
  */
  pub fn supported_prefixes(&self) -> &'static [Option<RefiningPrefix>] {
    use RefiningPrefix::*;
    match self {
      InstructionEncoding::Default  => &[None],
      InstructionEncoding::Amd3dnow => &[Some(NoPrefix)],
      InstructionEncoding::Vex      => &[Some(NoPrefix), Some(P66), Some(PF3), Some(PF2)],
      InstructionEncoding::Evex     => &[Some(NoPrefix), Some(P66), Some(PF3), Some(PF2)],
      InstructionEncoding::Mvex     => &[Some(NoPrefix), Some(P66), Some(PF3), Some(PF2)],
      InstructionEncoding::Xop      => &[Some(NoPrefix)],
    }
  }

  /// Whether tables of this encoding are keyed by a refining prefix.
  pub fn requires_prefix(&self) -> bool {
    self.supported_prefixes().iter().any(Option::is_some)
  }
}

#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Ord,             PartialOrd,    Debug, Hash
)]
#[repr(u8)]
pub enum OpcodeMap {
  #[strum(serialize = "default")]
  Map0,
  #[strum(serialize = "0f")]
  M0F,
  #[strum(serialize = "0f38")]
  M0F38,
  #[strum(serialize = "0f3a")]
  M0F3A,
  #[strum(serialize = "map4")]
  Map4,
  #[strum(serialize = "map5")]
  Map5,
  #[strum(serialize = "map6")]
  Map6,
  #[strum(serialize = "map7")]
  Map7,
  /// 3DNow!
  #[strum(serialize = "0f0f")]
  M0F0F,
  #[strum(serialize = "xop8")]
  Xop8,
  #[strum(serialize = "xop9")]
  Xop9,
  #[strum(serialize = "xopa")]
  XopA,
}

impl Default for OpcodeMap {
  fn default() -> Self {
    OpcodeMap::Map0
  }
}

impl OpcodeMap {
  /// The short tag used in opcode table names. The primary map has none.
  pub fn table_tag(&self) -> Option<&'static str> {
    match self {
      OpcodeMap::Map0  => None,
      OpcodeMap::M0F   => Some("0F"),
      OpcodeMap::M0F38 => Some("0F38"),
      OpcodeMap::M0F3A => Some("0F3A"),
      OpcodeMap::Map4  => Some("MAP4"),
      OpcodeMap::Map5  => Some("MAP5"),
      OpcodeMap::Map6  => Some("MAP6"),
      OpcodeMap::Map7  => Some("MAP7"),
      OpcodeMap::M0F0F => Some("0F0F"),
      OpcodeMap::Xop8  => Some("XOP8"),
      OpcodeMap::Xop9  => Some("XOP9"),
      OpcodeMap::XopA  => Some("XOPA"),
    }
  }
}

/// A mandatory legacy prefix used to tell apart instruction forms that share an opcode.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Ord,             PartialOrd,    Debug, Hash
)]
#[repr(u8)]
pub enum RefiningPrefix {
  #[strum(serialize = "none")]
  NoPrefix,
  #[strum(serialize = "66")]
  P66,
  #[strum(serialize = "f3")]
  PF3,
  #[strum(serialize = "f2")]
  PF2,
}

impl RefiningPrefix {
  pub fn table_tag(&self) -> &'static str {
    match self {
      RefiningPrefix::NoPrefix => "NP",
      RefiningPrefix::P66      => "66",
      RefiningPrefix::PF3      => "F3",
      RefiningPrefix::PF2      => "F2",
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::convert::TryFrom;
  use std::str::FromStr;
  use strum::IntoEnumIterator;

  #[test]
  fn encoding_text_round_trip(){
    assert_eq!(InstructionEncoding::from_str("3dnow").unwrap(), InstructionEncoding::Amd3dnow);
    assert_eq!(InstructionEncoding::Vex.to_string(), "vex");
    assert!(InstructionEncoding::from_str("avx").is_err());
  }

  #[test]
  fn declaration_order_is_numeric_order(){
    let codes: Vec<u8> = InstructionEncoding::iter().map(Into::<u8>::into).collect();
    assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(InstructionEncoding::try_from(4u8).unwrap(), InstructionEncoding::Xop);
  }

  #[test]
  fn only_legacy_tables_have_no_prefix(){
    for encoding in InstructionEncoding::iter() {
      assert_eq!(encoding.requires_prefix(), encoding != InstructionEncoding::Default);
    }
  }

  #[test]
  fn maps_parse_from_record_text(){
    assert_eq!(OpcodeMap::from_str("0f38").unwrap(), OpcodeMap::M0F38);
    assert_eq!(OpcodeMap::from_str("default").unwrap(), OpcodeMap::Map0);
    assert_eq!(RefiningPrefix::from_str("f2").unwrap(), RefiningPrefix::PF2);
  }
}
