//! `derive-username`: print the identity an external accessory would get.

use serde::Serialize;

use hapbridge_core::{AccessoryId, Username, derive_username};

use super::load_config;
use crate::cli::{DeriveArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Derived {
    uuid: String,
    username: Username,
}

pub fn handle(args: &DeriveArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge = match &args.bridge {
        Some(raw) => Username::parse(raw)?,
        None => Username::parse(&load_config(global)?.bridge.username)?,
    };

    let rows: Vec<Derived> = args
        .uuids
        .iter()
        .map(|uuid| Derived {
            uuid: uuid.clone(),
            username: derive_username(&bridge, &AccessoryId::from(uuid.as_str())),
        })
        .collect();

    let out = output::render(&global.output, &rows, |rows| {
        rows.iter()
            .map(|row| format!("{}  {}", row.username, row.uuid))
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
