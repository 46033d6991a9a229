//! `run`: publish the configured accessories until interrupted.

use std::sync::Arc;

use tracing::{info, warn};

use hapbridge_config::to_bridge_config;
use hapbridge_core::{Accessory, Bridge, EndpointId};

use super::load_config;
use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::logging_server::LoggingServerFactory;
use crate::output;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let mut bridge_config = to_bridge_config(&cfg)?;
    if let Some(storage) = args.storage {
        bridge_config.storage_path = Some(storage);
    }

    let bridge = Bridge::builder(bridge_config)
        .endpoint_factory(Arc::new(LoggingServerFactory))
        .build()
        .await?;

    start(&bridge, cfg.accessories, args.restore_cached).await?;

    if let Some(info) = bridge.credentials(&EndpointId::Primary).await {
        let summary = format!(
            "Publishing {} as {}\nSetup code: {}\nSetup URI:  {}",
            info.display_name,
            info.username,
            info.pincode,
            info.setup_uri()
        );
        output::print_output(&summary, global.quiet);
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupted, unpublishing");
    bridge.unpublish().await?;
    Ok(())
}

/// Admit the configured accessories and publish. With `restore_cached`,
/// the previous run's accessories are held in the cache while the
/// configured set is admitted; whatever the configuration no longer names
/// is dropped once the bridge is published.
async fn start(
    bridge: &Bridge,
    accessories: Vec<Accessory>,
    restore_cached: bool,
) -> Result<(), CliError> {
    if restore_cached {
        bridge.restore_cached().await;
    }

    let outcome = bridge.patch_accessories(accessories, Vec::new()).await;
    for (uuid, placement) in &outcome.added {
        info!(%uuid, %placement, "accessory admitted");
    }
    if let Some(failure) = outcome.failures.into_iter().next() {
        warn!(uuid = %failure.uuid, operation = %failure.operation, "configured accessory rejected");
        return Err(failure.error.into());
    }

    bridge.publish().await?;

    if restore_cached {
        let dropped = bridge.remove_all_cached_accessories().await?;
        if dropped > 0 {
            info!(dropped, "dropped accessories no longer configured");
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use super::*;
    use hapbridge_core::{AccessoryId, BridgeConfig, Service, ServiceKind};

    async fn bridge_at(dir: &Path) -> Bridge {
        let mut config = BridgeConfig::new("Test", "AA:BB:CC:DD:EE:FF".parse().unwrap());
        config.storage_path = Some(dir.to_path_buf());
        Bridge::builder(config)
            .endpoint_factory(Arc::new(LoggingServerFactory))
            .build()
            .await
            .unwrap()
    }

    fn lamp(uuid: &str) -> Accessory {
        Accessory::new(uuid, "Lamp")
            .with_service(Service::new(ServiceKind::Lightbulb).with_characteristic("On", false))
    }

    #[tokio::test]
    async fn accessories_dropped_from_config_do_not_linger() {
        let dir = tempfile::tempdir().unwrap();

        let bridge = bridge_at(dir.path()).await;
        start(&bridge, vec![lamp("lamp"), lamp("gone")], true).await.unwrap();
        let primary = bridge.identifier_cache(&EndpointId::Primary).await.unwrap();
        assert!(primary.contains_accessory(&AccessoryId::from("gone")));
        bridge.unpublish().await.unwrap();
        drop(bridge);

        for _ in 0..2 {
            let bridge = bridge_at(dir.path()).await;
            start(&bridge, vec![lamp("lamp")], true).await.unwrap();

            assert!(bridge.cached().await.is_empty());
            let primary = bridge.identifier_cache(&EndpointId::Primary).await.unwrap();
            assert!(!primary.contains_accessory(&AccessoryId::from("gone")));
            assert!(primary.contains_accessory(&AccessoryId::from("lamp")));
            bridge.unpublish().await.unwrap();
        }

        let bridge = bridge_at(dir.path()).await;
        assert_eq!(bridge.restore_cached().await, 1);
        let cached: Vec<_> = bridge
            .cached()
            .await
            .into_iter()
            .map(|c| c.accessory.uuid)
            .collect();
        assert_eq!(cached, vec![AccessoryId::from("lamp")]);
    }
}
