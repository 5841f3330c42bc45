/*!
  `dtc`, the decoder table compiler.

  Reads declarative x86 instruction records and compiles them into the flattened decoder trees
  a table-driven instruction decoder walks at run time. See `generator` for the pipeline.
*/

#[macro_use] extern crate prettytable;

pub mod builder;
pub mod emit;
pub mod encoding;
pub mod error;
pub mod generator;
pub mod record;
pub mod registry;
pub mod selector;
pub mod tables;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use generator::Generator;
