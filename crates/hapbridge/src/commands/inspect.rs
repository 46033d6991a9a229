//! `inspect`: show what the identity store holds for one endpoint.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use hapbridge_config::default_storage_path;
use hapbridge_core::{AccessoryInfo, IdentifierCache, IdentityStore, Username};

use super::load_config;
use crate::cli::{GlobalOpts, InspectArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Inspection {
    credentials: AccessoryInfo,
    setup_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier_cache: Option<IdentifierCache>,
}

fn storage_dir(args: &InspectArgs, global: &GlobalOpts) -> Result<PathBuf, CliError> {
    if let Some(dir) = &args.storage {
        return Ok(dir.clone());
    }
    let cfg = load_config(global)?;
    Ok(cfg.bridge.storage_path.unwrap_or_else(default_storage_path))
}

pub async fn handle(args: &InspectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let username = Username::parse(&args.username)?;
    let store = IdentityStore::file(storage_dir(args, global)?);

    let credentials = store
        .load_credentials(&username)
        .await?
        .ok_or_else(|| CliError::NotFound {
            entity: "Credential record".into(),
            identifier: username.to_string(),
        })?;
    let identifier_cache = store.load_identifier_cache(&username).await?;

    let inspection = Inspection {
        setup_uri: credentials.setup_uri(),
        credentials,
        identifier_cache,
    };
    let out = output::render(&global.output, &inspection, plain)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn plain(inspection: &Inspection) -> String {
    let info = &inspection.credentials;
    let mut out = String::new();
    let _ = writeln!(out, "Username:        {}", info.username);
    let _ = writeln!(out, "Name:            {}", info.display_name);
    let _ = writeln!(out, "Category:        {}", info.category);
    let _ = writeln!(out, "Setup code:      {}", info.pincode);
    let _ = writeln!(out, "Setup URI:       {}", inspection.setup_uri);
    let _ = writeln!(out, "Config version:  {}", info.config_version);
    let _ = writeln!(out, "Paired clients:  {}", info.paired_clients.len());
    for (client, paired) in &info.paired_clients {
        let role = if paired.admin { "admin" } else { "user" };
        let _ = writeln!(out, "  {client} ({role})");
    }
    match &inspection.identifier_cache {
        Some(cache) => {
            let _ = writeln!(out, "Identifiers:     {}", cache.len());
        }
        None => {
            let _ = writeln!(out, "Identifiers:     none persisted");
        }
    }
    out
}
