pub mod config_cmd;
pub mod derive;
pub mod inspect;
pub mod run;

use hapbridge_config::{self as config, Config};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the config from `--config` or the canonical path, merged with the
/// environment. A missing file yields the defaults.
pub(crate) fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = match &global.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };
    Ok(cfg)
}
