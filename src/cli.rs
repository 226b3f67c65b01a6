use std::path::PathBuf;

use clap::Parser;

use crate::outputter::Destination;

/// Compiles `.test` HTTP test descriptions into Rust integration tests
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The `.test` file to compile
    pub input: PathBuf,

    /// Where to write the generated tests, `-` for stdout. Defaults to the
    /// input path with an `.rs` extension
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// TOML settings file for the generator
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Compare response bodies of this test with whitespace removed. Can be
    /// given more than once
    #[arg(long = "normalize-body", value_name = "TEST")]
    pub normalize_body: Vec<String>,

    /// Stop after validation without writing anything
    #[arg(long, conflicts_with = "emit_ast")]
    pub check: bool,

    /// Print the parsed syntax tree as JSON instead of generating code
    #[arg(long)]
    pub emit_ast: bool,

    /// Only report errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn destination(&self) -> Destination {
        match &self.output {
            Some(path) if path.as_os_str() == "-" => Destination::Stdout,
            Some(path) => Destination::File(path.clone()),
            None => Destination::File(self.input.with_extension("rs")),
        }
    }
}
