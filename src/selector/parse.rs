/*!
  Parsers for the small textual forms found in instruction records:

    * type expressions, `name` or `name[arg,arg]`, naming a selector or function type and its
      arguments;
    * slot expressions, `slot` or `!slot`, naming one slot of a selector;
    * hexadecimal opcode bytes, `0F` or `0x0F`.
*/

use nom::{
  bytes::complete::{tag_no_case, take_while1, take_while_m_n},
  character::complete::{char as one_char, space0},
  combinator::{all_consuming, map, map_res, opt, rest, verify},
  multi::separated_list1,
  sequence::{delimited, pair, preceded},
  IResult
};

use crate::error::{TreeError, TreeResult};

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

fn name(input: &str) -> IResult<&str, &str> {
  take_while1(is_name_char)(input)
}

fn arguments(input: &str) -> IResult<&str, Vec<&str>> {
  delimited(
    one_char('['),
    separated_list1(one_char(','), delimited(space0, name, space0)),
    one_char(']')
  )(input)
}

/// Splits `name[arg,arg]` into the type name and its argument list.
pub fn parse_type_expression(expression: &str) -> TreeResult<(&str, Vec<&str>)> {
  let type_p = pair(name, map(opt(arguments), |args: Option<Vec<&str>>| args.unwrap_or_default()));

  match all_consuming(type_p)(expression.trim()) {
    Ok((_, parsed)) => Ok(parsed),
    Err(_)          => Err(TreeError::InvalidTypeExpression(expression.to_string()))
  }
}

fn slot(input: &str) -> IResult<&str, (bool, &str)> {
  pair(
    map(opt(one_char('!')), |bang: Option<char>| bang.is_some()),
    verify(rest, |s: &str| !s.is_empty() && !s.contains('!'))
  )(input)
}

fn hex_byte(input: &str) -> IResult<&str, u8> {
  preceded(
    opt(tag_no_case("0x")),
    map_res(
      take_while_m_n(1, 2, |c: char| c.is_ascii_hexdigit()),
      |digits: &str| u8::from_str_radix(digits, 16)
    )
  )(input)
}

/// Splits `!slot` into the negation flag and the slot name.
pub fn parse_slot_expression(expression: &str) -> TreeResult<(bool, &str)> {
  match all_consuming(slot)(expression.trim()) {
    Ok((_, parsed)) => Ok(parsed),
    Err(_)          => Err(TreeError::InvalidSlotExpression(expression.to_string()))
  }
}

/// Parses a one- or two-digit hexadecimal byte, with or without a `0x` prefix.
pub fn parse_hex_byte(text: &str) -> Option<u8> {
  all_consuming(hex_byte)(text.trim()).ok().map(|(_, byte)| byte)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_type_expression(){
    assert_eq!(parse_type_expression("modrm_mod").unwrap(), ("modrm_mod", vec![]));
  }

  #[test]
  fn type_expression_with_arguments(){
    assert_eq!(
      parse_type_expression("force_operand_size[osz64, 32]").unwrap(),
      ("force_operand_size", vec!["osz64", "32"])
    );
  }

  #[test]
  fn malformed_type_expressions(){
    assert!(parse_type_expression("").is_err());
    assert!(parse_type_expression("mode[").is_err());
    assert!(parse_type_expression("mode[]").is_err());
    assert!(parse_type_expression("mode[a]x").is_err());
    assert!(parse_type_expression("mode-compact").is_err());
  }

  #[test]
  fn slot_expressions(){
    assert_eq!(parse_slot_expression("3").unwrap(), (false, "3"));
    assert_eq!(parse_slot_expression("!64").unwrap(), (true, "64"));
    assert!(parse_slot_expression("!").is_err());
    assert!(parse_slot_expression("!!3").is_err());
  }

  #[test]
  fn hex_bytes(){
    assert_eq!(parse_hex_byte("0F"), Some(0x0F));
    assert_eq!(parse_hex_byte("0xc4"), Some(0xC4));
    assert_eq!(parse_hex_byte("8"), Some(0x08));
    assert_eq!(parse_hex_byte("100"), None);
    assert_eq!(parse_hex_byte("zz"), None);
  }
}
