#![allow(clippy::result_large_err)]

use clap::Parser as _;
use miette::Diagnostic;
use miette::NamedSource;
use miette::Result;
use thiserror::Error;

use crate::cli::Cli;
use crate::generator::Generator;
use crate::outputter::OutPutter;
use crate::outputter::OutputError;
use crate::outputter::write_output;
use crate::parser::ParseError;
use crate::settings::Settings;
use crate::settings::SettingsError;
use crate::validator::ValidationError;
use crate::validator::Validator;

mod asserter;
mod ast;
mod cli;
mod diagnostics;
mod generator;
mod lexer;
mod outputter;
mod parser;
mod settings;
mod validator;

#[derive(Error, Debug, Diagnostic)]
pub enum TestLangError {
    #[error("Failed to read source file `{path}`")]
    FileError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ParseError(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ValidationError(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    OutputError(#[from] OutputError),

    #[error("Failed to serialize the syntax tree")]
    AstDump(#[from] serde_json::Error),
}

/// Runs the pipeline on an already loaded source file: parse, validate,
/// generate, write.
///
/// Warnings are reported as soon as parsing finishes, also when it fails.
/// Any error stops the pipeline before the output is touched.
fn compile(
    cli: &Cli,
    outputter: &OutPutter,
    source_name: &str,
    source: &str,
) -> Result<(), TestLangError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings
        .generator
        .normalize_body
        .extend(cli.normalize_body.iter().cloned());

    outputter.compiling(source_name);

    let file = match parser::parse(source) {
        Ok(parsed) => {
            outputter.warnings(parsed.warnings, source_name, source);
            parsed.file
        }
        Err(failure) => {
            outputter.warnings(failure.warnings, source_name, source);
            return Err(failure.error.into());
        }
    };

    if cli.emit_ast {
        println!("{}", serde_json::to_string_pretty(&file)?);
        return Ok(());
    }

    Validator::new(&file).validate()?;

    if cli.check {
        outputter.checked(source_name, file.tests.len());
        return Ok(());
    }

    let code = Generator::new(&file, &settings.generator).generate(source_name);

    let destination = cli.destination();
    write_output(&destination, &code)?;
    outputter.generated(file.tests.len(), file.variables.len(), &destination);

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let outputter = OutPutter::new(cli.quiet);

    let source_name = cli.input.display().to_string();
    let source =
        std::fs::read_to_string(&cli.input).map_err(|source| TestLangError::FileError {
            path: source_name.clone(),
            source,
        })?;

    compile(&cli, &outputter, &source_name, &source).map_err(|e| {
        miette::Report::new(e).with_source_code(NamedSource::new(&source_name, source.clone()))
    })
}
