use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use colored::Colorize;
use snafu::ResultExt;
use tracing_subscriber::EnvFilter;

use rcc::error::{ReadSourceSnafu, WriteOutputSnafu};
use rcc::{CompileError, CompileResult, Session, codegen};

#[derive(Parser, Debug)]
#[command(name = "rcc")]
#[command(about = "A small C compiler emitting x86-64 GNU assembly")]
struct Args {
  /// Input C source file, or `-` for stdin.
  input: PathBuf,
  /// Output assembly file. Writes to stdout if omitted or `-`.
  #[arg(short = 'o', long = "output")]
  output: Option<PathBuf>,
  /// Print the parsed translation unit to stderr.
  #[arg(long = "dump-ast", action = clap::ArgAction::SetTrue)]
  dump_ast: bool,
  /// Log compiler phases to stderr.
  #[arg(short = 'v', long = "verbose", action = clap::ArgAction::SetTrue)]
  verbose: bool,
}

fn main() {
  let args = Args::parse();
  init_logging(args.verbose);

  if let Err(err) = run(&args) {
    eprintln!("{}", format_diagnostic(&err, &args.input));
    process::exit(1);
  }
}

fn init_logging(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

fn is_stdio(path: &Path) -> bool {
  path.as_os_str() == "-"
}

fn read_source(path: &Path) -> CompileResult<String> {
  let mut source = if is_stdio(path) {
    let mut buf = String::new();
    io::stdin()
      .read_to_string(&mut buf)
      .context(ReadSourceSnafu { path })?;
    buf
  } else {
    fs::read_to_string(path).context(ReadSourceSnafu { path })?
  };

  if let Some(rest) = source.strip_prefix('\u{feff}') {
    source = rest.to_string();
  }
  if !source.ends_with('\n') {
    source.push('\n');
  }
  Ok(source)
}

fn run(args: &Args) -> CompileResult<()> {
  let source = read_source(&args.input)?;

  let mut session = Session::new();
  let program = rcc::parse_program(&source, &mut session)?;
  if args.dump_ast {
    eprintln!("{program:#?}");
  }
  let asm = codegen::generate(&program, &mut session)?;

  match &args.output {
    Some(path) if !is_stdio(path) => {
      fs::write(path, asm).context(WriteOutputSnafu { path })?;
    }
    _ => {
      let path = Path::new("-");
      io::stdout()
        .write_all(asm.as_bytes())
        .context(WriteOutputSnafu { path })?;
    }
  }
  Ok(())
}

fn format_diagnostic(err: &CompileError, path: &Path) -> String {
  let header = format!("{}: {}", "error".red().bold(), err.message().bold());
  let Some(location) = err.location() else {
    return header;
  };

  let width = location.line.to_string().len().max(3);
  let caret_pad = " ".repeat(location.column.saturating_sub(1));
  format!(
    "{header}\n  --> {}:{}:{}\n{:>width$} |\n{:>width$} | {}\n{:>width$} | {}{}",
    path.display(),
    location.line,
    location.column,
    "",
    location.line,
    location.line_text,
    "",
    caret_pad,
    "^".red().bold(),
  )
}
