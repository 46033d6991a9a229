//! Config subcommand handlers.

use hapbridge_config::{self as config, Config};

use super::load_config;
use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(config::config_path);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = load_config(global)?;
            let out = output::render(&global.output, &cfg, |c| {
                toml::to_string_pretty(c).unwrap_or_else(|e| format!("# unrenderable: {e}"))
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!("{} already exists (use --force to overwrite)", path.display()),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Configuration written to {}", path.display());
            }
            Ok(())
        }
    }
}
