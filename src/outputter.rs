use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use console::Style;
use miette::Diagnostic;
use miette::NamedSource;
use miette::Report;
use thiserror::Error;

use crate::diagnostics::Warning;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => write!(f, "<stdout>"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("Failed to write generated tests to `{destination}`")]
#[diagnostic(code(testlang::output))]
pub struct OutputError {
    destination: String,
    #[source]
    source: std::io::Error,
}

/// Writes the generated file.
///
/// Files are written next to the destination first and renamed into place,
/// so a failed write never leaves a truncated file behind.
pub fn write_output(destination: &Destination, contents: &str) -> Result<(), OutputError> {
    let fail = |source| OutputError {
        destination: destination.to_string(),
        source,
    };

    match destination {
        Destination::Stdout => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(contents.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(fail)
        }
        Destination::File(path) => {
            let tmp = temp_path(path);
            let result = fs::write(&tmp, contents).and_then(|_| fs::rename(&tmp, path));
            if result.is_err() {
                let _ = fs::remove_file(&tmp);
            }
            result.map_err(fail)
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "generated".into());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Progress and warning lines on stderr.
pub struct OutPutter {
    quiet: bool,
}

impl OutPutter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn compiling(&self, source_name: &str) {
        if self.quiet {
            return;
        }
        let style = Style::new().bold().cyan();
        eprintln!("{} {source_name}", style.apply_to("Compiling"));
    }

    pub fn warnings(&self, warnings: Vec<Warning>, source_name: &str, source: &str) {
        if self.quiet {
            return;
        }
        for warning in warnings {
            let report = Report::new(warning)
                .with_source_code(NamedSource::new(source_name, source.to_string()));
            eprintln!("{report:?}");
        }
    }

    pub fn checked(&self, source_name: &str, n_tests: usize) {
        if self.quiet {
            return;
        }
        eprintln!(
            "{} {source_name}: {n_tests} tests ok",
            console::style("✔").green().bold()
        );
    }

    pub fn generated(&self, n_tests: usize, n_variables: usize, destination: &Destination) {
        if self.quiet {
            return;
        }
        eprintln!(
            "{} Generated {n_tests} tests ({n_variables} variables) -> {destination}",
            console::style("✔").green().bold()
        );
    }
}
