//! BLE adapter: one GATT service with an RX (write-without-response) and a
//! TX (notify) characteristic carrying the same wire frames as WebSocket.
//!
//! The protocol half ([`BleSession`]) is transport-agnostic and always
//! compiled: BLE supports a single central, so it pins everything to client
//! id 0 and clears the subscriptions on disconnect. The BlueZ binding is
//! behind the `ble` feature.

use strider_bus::EventBus;

use crate::core::{ClientId, CommCore, FrameSender};

/// Nordic-UART-style service UUID.
pub const SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
/// Central-to-robot characteristic (write without response).
pub const RX_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
/// Robot-to-central characteristic (notify).
pub const TX_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// The single BLE client id.
const BLE_CID: ClientId = 0;

/// Protocol state for one BLE link.
pub struct BleSession {
    core: CommCore,
}

impl BleSession {
    /// Create a session sending notifications through `notifier`.
    pub fn new(bus: EventBus, notifier: Box<dyn FrameSender>, label: &'static str) -> Self {
        Self {
            core: CommCore::new(bus, notifier, label),
        }
    }

    /// Bytes written to the RX characteristic.
    pub fn on_write(&self, bytes: &[u8]) {
        self.core.handle_frame(BLE_CID, bytes);
    }

    /// Central disconnected: every subscription dies with it.
    pub fn on_disconnect(&self) {
        self.core.disconnect(BLE_CID);
    }

    /// Shared access to the adapter core (tests, diagnostics).
    pub fn core(&self) -> &CommCore {
        &self.core
    }
}

/// BlueZ-backed GATT transport.
#[cfg(feature = "ble")]
pub mod bluez {
    use super::*;
    use std::sync::Arc;

    use crate::error::CommError;

    use bluer::adv::Advertisement;
    use bluer::gatt::local::{
        Application, Characteristic, CharacteristicNotify, CharacteristicNotifyMethod,
        CharacteristicWrite, CharacteristicWriteMethod, Service,
    };
    use futures::FutureExt;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tracing::{debug, info, warn};

    /// Notification queue depth before slow-central drops.
    const NOTIFY_DEPTH: usize = 32;

    /// FrameSender that pushes frames into the active notifier task.
    struct NotifySender {
        tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    }

    impl FrameSender for Arc<NotifySender> {
        fn send(&self, _cid: ClientId, bytes: &[u8]) -> Result<(), CommError> {
            let guard = self.tx.lock();
            let Some(tx) = guard.as_ref() else {
                return Err(CommError::UnknownClient(BLE_CID));
            };
            tx.try_send(bytes.to_vec())
                .map_err(|e| CommError::Send(e.to_string()))
        }
    }

    /// Advertise the service and serve the GATT application until the task
    /// is dropped.
    pub async fn serve(bus: EventBus, device_name: String) -> Result<(), CommError> {
        let session = bluer::Session::new()
            .await
            .map_err(|e| CommError::Transport(e.to_string()))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| CommError::Transport(e.to_string()))?;
        adapter
            .set_powered(true)
            .await
            .map_err(|e| CommError::Transport(e.to_string()))?;

        let service_uuid: bluer::Uuid = SERVICE_UUID
            .parse()
            .map_err(|_| CommError::Transport("bad service uuid".into()))?;
        let rx_uuid: bluer::Uuid = RX_UUID
            .parse()
            .map_err(|_| CommError::Transport("bad rx uuid".into()))?;
        let tx_uuid: bluer::Uuid = TX_UUID
            .parse()
            .map_err(|_| CommError::Transport("bad tx uuid".into()))?;

        let notify = Arc::new(NotifySender {
            tx: Mutex::new(None),
        });
        let ble = Arc::new(BleSession::new(
            bus,
            Box::new(Arc::clone(&notify)),
            "ble",
        ));

        let advertisement = Advertisement {
            service_uuids: vec![service_uuid].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(device_name),
            ..Default::default()
        };
        let _adv_handle = adapter
            .advertise(advertisement)
            .await
            .map_err(|e| CommError::Transport(e.to_string()))?;

        let write_session = Arc::clone(&ble);
        let notify_sender = Arc::clone(&notify);
        let notify_session = Arc::clone(&ble);

        let app = Application {
            services: vec![Service {
                uuid: service_uuid,
                primary: true,
                characteristics: vec![
                    Characteristic {
                        uuid: rx_uuid,
                        write: Some(CharacteristicWrite {
                            write: true,
                            write_without_response: true,
                            method: CharacteristicWriteMethod::Fun(Box::new(
                                move |value, _req| {
                                    let session = Arc::clone(&write_session);
                                    async move {
                                        session.on_write(&value);
                                        Ok(())
                                    }
                                    .boxed()
                                },
                            )),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    Characteristic {
                        uuid: tx_uuid,
                        notify: Some(CharacteristicNotify {
                            notify: true,
                            method: CharacteristicNotifyMethod::Fun(Box::new(move |mut notifier| {
                                let sender = Arc::clone(&notify_sender);
                                let session = Arc::clone(&notify_session);
                                async move {
                                    info!("ble central subscribed to notifications");
                                    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(NOTIFY_DEPTH);
                                    *sender.tx.lock() = Some(tx);
                                    while let Some(bytes) = rx.recv().await {
                                        if notifier.notify(bytes).await.is_err() {
                                            break;
                                        }
                                    }
                                    *sender.tx.lock() = None;
                                    session.on_disconnect();
                                    debug!("ble central gone");
                                }
                                .boxed()
                            })),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let _app_handle = adapter
            .serve_gatt_application(app)
            .await
            .map_err(|e| CommError::Transport(e.to_string()))?;
        info!("ble adapter advertising");

        // The handles keep the advertisement and application alive; park
        // until the surrounding task is cancelled.
        std::future::pending::<()>().await;
        warn!("ble adapter exiting");
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
