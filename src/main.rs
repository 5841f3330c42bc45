use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dtc::emit::{statistics_table, EmitStatistics};
use dtc::record::read_records_from;
use dtc::Generator;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emit {
  /// Human-readable tables
  Console,
  /// C initializer lists
  Code,
  /// Build and audit only
  None,
}

#[derive(Parser, Debug)]
#[command(name = "dtc", version, about = "Compiles x86 instruction records into flattened decoder tables.")]
struct Args {
  /// JSON array of instruction records
  input: PathBuf,

  /// Output backend
  #[arg(long, value_enum, default_value = "code")]
  emit: Emit,

  /// Write the generated code here instead of stdout
  #[arg(short, long, value_name = "PATH")]
  output: Option<PathBuf>,

  /// Only print the opcode table with this name, e.g. PRIMARY or VEX_66_0F38
  #[arg(long, value_name = "NAME")]
  table: Option<String>,

  /// Leave empty slots out of console output
  #[arg(long, action = clap::ArgAction::SetTrue)]
  skip_empty: bool,

  /// Print emission statistics
  #[arg(long, action = clap::ArgAction::SetTrue)]
  stats: bool,

  /// Log at debug level (overrides RUST_LOG)
  #[arg(short, long, action = clap::ArgAction::SetTrue)]
  verbose: bool,
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();

  let filter =
    match args.verbose {
      true  => EnvFilter::new("debug"),
      false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();

  let file = File::open(&args.input)
      .with_context(|| format!("failed to open {}", args.input.display()))?;
  let records = read_records_from(BufReader::new(file))
      .with_context(|| format!("failed to read instruction records from {}", args.input.display()))?;
  info!(records = records.len(), input = %args.input.display(), "instruction records read");

  let generator = Generator::build(records).context("failed to build the decoder tree")?;

  let mut statistics = EmitStatistics::new();
  match args.emit {

    Emit::Console => {
      let text = generator.emit_console(args.table.as_deref(), args.skip_empty, &mut statistics)
          .context("failed to render the decoder tables")?;
      io::stdout().write_all(text.as_bytes())?;
    }

    Emit::Code => {
      let code = generator.emit_code(&mut statistics).context("failed to emit the decoder tables")?;
      match &args.output {
        Some(path) => {
          fs::write(path, code).with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => io::stdout().write_all(code.as_bytes())?
      }
    }

    Emit::None => { /* Build and audit only */ }

  } // end match args.emit

  if args.stats {
    eprintln!("{}", statistics_table(&statistics));
  }

  Ok(())
}
