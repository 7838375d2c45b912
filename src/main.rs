use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

/// Summer language driver: reads a source file and runs it through the
/// lex/parse/codegen/JIT pipeline, one top-level form at a time.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the source file to compile and run.
    source: PathBuf,

    /// Raise the log level from info to debug.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .expect("logger is initialized exactly once");

    // The source encoding is unicode-free 8-bit characters, not UTF-8: a
    // string/char literal containing a byte >= 0x80 is legal source text but
    // would make `read_to_string` fail before the lexer — which reads the
    // file as raw bytes via `file` below — ever got a chance to run.
    // `source_text` backs diagnostics only, so lossy decoding is fine there.
    let raw_source = std::fs::read(&cli.source)?;
    let source_text = String::from_utf8_lossy(&raw_source).into_owned();
    let file = std::fs::File::open(&cli.source)?;
    summer_core::driver::run(&source_text, file)?;
    Ok(())
}
