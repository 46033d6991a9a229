// ── Bridge event pump ──
//
// Background task draining the bridge's channels: endpoint events,
// accessory change events and coalescer flushes. Holds only a weak
// reference, so dropping the last `Bridge` handle ends the task.

use std::sync::Weak;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Bridge, BridgeInner};
use crate::endpoint::EndpointEvent;
use crate::model::{Accessory, AccessoryId};

/// Change notifications from the plugin layer.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessoryEvent {
    /// The accessory's record changed. Placement is kept.
    Updated(Accessory),
    /// A characteristic value changed; forwarded to subscribed clients.
    CharacteristicChanged {
        uuid: AccessoryId,
        service: String,
        subtype: Option<String>,
        characteristic: String,
        value: Value,
    },
}

pub(crate) async fn event_pump(
    inner: Weak<BridgeInner>,
    mut endpoint_rx: mpsc::UnboundedReceiver<EndpointEvent>,
    mut accessory_rx: mpsc::UnboundedReceiver<AccessoryEvent>,
    mut flush_rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(()) = flush_rx.recv() => {
                let Some(bridge) = upgrade(&inner) else { break };
                bridge.flush_updates().await;
            }
            Some(event) = endpoint_rx.recv() => {
                let Some(bridge) = upgrade(&inner) else { break };
                bridge.handle_endpoint_event(event).await;
            }
            Some(event) = accessory_rx.recv() => {
                let Some(bridge) = upgrade(&inner) else { break };
                bridge.handle_accessory_event(event).await;
            }
            else => break,
        }
    }
    debug!("bridge event pump stopped");
}

fn upgrade(inner: &Weak<BridgeInner>) -> Option<Bridge> {
    inner.upgrade().map(|inner| Bridge { inner })
}
