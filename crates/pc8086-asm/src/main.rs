use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pc8086_asm::assemble;

#[derive(Parser, Debug)]
#[command(author, version, about = "Assemble 8086 source into a COM or MZ image")]
struct Opts {
    /// Assembly source file
    input: PathBuf,
    /// Output file (default: input with .com or .exe extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Print a hex dump of the image
    #[arg(long)]
    hex: bool,
    /// Print the whole result (bytes, errors, hex dump) as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let source = std::fs::read_to_string(&opts.input)
        .with_context(|| format!("reading {}", opts.input.display()))?;
    let asm = assemble(&source);

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&asm)?);
    } else if opts.hex {
        println!("{}", asm.hex);
    }
    for e in &asm.errors {
        eprintln!("{}:{}", opts.input.display(), e);
    }

    let output = opts.output.clone().unwrap_or_else(|| {
        let ext = if asm.format == "MZ" { "exe" } else { "com" };
        opts.input.with_extension(ext)
    });
    std::fs::write(&output, &asm.bytes).with_context(|| format!("writing {}", output.display()))?;

    if !asm.is_ok() {
        bail!("{} error(s); partial output written to {}", asm.errors.len(), output.display());
    }
    Ok(())
}
