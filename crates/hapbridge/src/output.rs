//! Output formatting: plain, JSON, YAML.
//!
//! Structured formats serialize the data via serde; plain delegates to a
//! caller-supplied text renderer.

use std::io::{self, Write};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render a single serde-serializable item in the chosen format.
pub fn render<T>(
    format: &OutputFormat,
    data: &T,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Plain => Ok(plain_fn(data)),
        OutputFormat::Json => serde_json::to_string_pretty(data).map_err(render_err),
        OutputFormat::JsonCompact => serde_json::to_string(data).map_err(render_err),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(render_err),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", output.trim_end());
}

fn render_err(e: impl std::fmt::Display) -> CliError {
    CliError::Render(e.to_string())
}
