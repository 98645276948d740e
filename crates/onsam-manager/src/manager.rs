use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use onsam_client::{ControllerClient, XConnection};
use onsam_domain::{ClientInfo, DeviceKey, GeniResource, OnsError, Operational};
use onsam_store::{ConnectionParams, RoadmStore, SliceEntry, StoreSession};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::manifest::{allocation_manifest, detailed_manifest, resource_manifest};

/// One requested cross-connect: the device plus ingress/egress endpoint-label
/// pairs, as handed over by the GENI delegate.
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: String,
    pub in_endpoint: String,
    pub in_label: String,
    pub out_endpoint: String,
    pub out_label: String,
}

/// Per-connection operation applied across a slice.
#[derive(Debug, Clone, Copy)]
enum ConnOp {
    Start,
    Stop,
    Release,
}

/// Public façade the GENI delegate calls.
///
/// Every entry point opens one store session, works inside it, and commits
/// (or rolls back, by dropping) before returning — partial reservations are
/// never observable. Device queues are executed at most once per affected
/// device, after all per-connection changes are staged.
pub struct RoadmManager {
    store: RoadmStore,
    client: Arc<ControllerClient>,
    /// Default reservation lifetime in minutes when no end time is requested.
    reservation_timeout: i64,
}

/// Both endpoints of a connection must live on the same device.
fn same_device(entry: &SliceEntry) -> Result<DeviceKey, OnsError> {
    let ingress = entry.ingress.device();
    if ingress != entry.egress.device() {
        return Err(OnsError::Ons(format!(
            "ingress/egress device mismatch ({} vs {})",
            ingress,
            entry.egress.device()
        )));
    }
    Ok(ingress)
}

impl RoadmManager {
    pub fn new(store: RoadmStore, client: Arc<ControllerClient>, reservation_timeout: i64) -> Self {
        RoadmManager { store, client, reservation_timeout }
    }

    /// Every managed endpoint, one GeniResource each.
    pub async fn get_resources(&self) -> Result<Vec<GeniResource>, OnsError> {
        let mut session = self.store.session().await?;
        let views = session.get_resources().await?;
        Ok(resource_manifest(&views))
    }

    /// Reserve a set of cross-connects for a slice.
    ///
    /// All checks and writes share one session; any failure rolls back the
    /// whole reservation.
    pub async fn reserve_resources(
        &self,
        resources: &[ReserveRequest],
        slice_urn: &str,
        end_time: Option<DateTime<Utc>>,
        client: &ClientInfo,
    ) -> Result<Vec<GeniResource>, OnsError> {
        let mut session = self.store.session().await?;

        let mut conns = Vec::with_capacity(resources.len());
        for r in resources {
            conns.push(
                session
                    .check_to_reserve(
                        &r.name,
                        &r.rtype,
                        &r.in_endpoint,
                        &r.in_label,
                        &r.out_endpoint,
                        &r.out_label,
                    )
                    .await?,
            );
        }

        let end_time = match end_time {
            None => Utc::now() + Duration::minutes(self.reservation_timeout),
            Some(t) if t <= Utc::now() => {
                return Err(OnsError::Ons("end-time is in the past".into()))
            }
            Some(t) => t,
        };

        let values = ConnectionParams {
            slice_urn: slice_urn.to_string(),
            end_time,
            client: client.clone(),
        };
        for (ingress, egress, xconn_id) in &conns {
            session.make_connection(*ingress, *egress, xconn_id, &values).await?;
        }
        session.commit().await?;

        Ok(allocation_manifest(resources, slice_urn, end_time))
    }

    /// The detailed manifest of one slice, with cross-linked peer urns.
    pub async fn get_slice_resources(&self, slice_urn: &str) -> Result<Vec<GeniResource>, OnsError> {
        let mut session = self.store.session().await?;
        let entries = session.get_slice(slice_urn).await?;
        Ok(detailed_manifest(&entries))
    }

    /// Strict renew. Not offered by this aggregate.
    pub async fn renew_resources(
        &self,
        _slices: &HashMap<String, ClientInfo>,
        _end_time: DateTime<Utc>,
    ) -> Result<Vec<GeniResource>, OnsError> {
        Err(OnsError::Ons("renew_resources: not implemented".into()))
    }

    /// Best-effort renew: per-slice failures are logged and skipped.
    pub async fn force_renew_resources(
        &self,
        slices: &HashMap<String, ClientInfo>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<GeniResource>, OnsError> {
        let mut session = self.store.session().await?;
        let mut manifest = Vec::new();
        for (slice_urn, client) in slices {
            debug!(%slice_urn, "force renew");
            match session.renew_slice(slice_urn, end_time, client).await {
                Ok(()) => match session.get_slice(slice_urn).await {
                    Ok(entries) => manifest.extend(detailed_manifest(&entries)),
                    Err(e) => error!(%slice_urn, error = %e, "renewed slice is unreadable"),
                },
                Err(e) => error!(%slice_urn, error = %e, "renew failed, skipping slice"),
            }
        }
        session.commit().await?;
        Ok(manifest)
    }

    /// Activate every cross-connect of the given slices.
    pub async fn start_slices(&self, slices: &[String]) -> Result<Vec<GeniResource>, OnsError> {
        self.operation_slices(slices, ConnOp::Start).await
    }

    pub async fn force_start_slices(&self, _slices: &[String]) -> Result<Vec<GeniResource>, OnsError> {
        Err(OnsError::Ons("force_start_slices: not implemented".into()))
    }

    /// Deactivate every cross-connect of the given slices, keeping the
    /// reservations.
    pub async fn stop_slices(&self, slices: &[String]) -> Result<Vec<GeniResource>, OnsError> {
        self.operation_slices(slices, ConnOp::Stop).await
    }

    pub async fn force_stop_slices(&self, _slices: &[String]) -> Result<Vec<GeniResource>, OnsError> {
        Err(OnsError::Ons("force_stop_slices: not implemented".into()))
    }

    /// Release every reservation of the given slices and remove the
    /// cross-connects upstream.
    pub async fn delete_slices(&self, slices: &[String]) -> Result<Vec<GeniResource>, OnsError> {
        self.operation_slices(slices, ConnOp::Release).await
    }

    pub async fn force_delete_slices(&self, _slices: &[String]) -> Result<Vec<GeniResource>, OnsError> {
        Err(OnsError::Ons("force_delete_slices: not implemented".into()))
    }

    /// Reap reservations whose end time has passed: release the endpoints,
    /// remove the upstream cross-connect, and drain each touched device queue
    /// once. Best-effort; upstream failures are recorded on the returned
    /// manifest entries.
    pub async fn check_resources_expiration(&self) -> Result<Vec<GeniResource>, OnsError> {
        let mut session = self.store.session().await?;
        let expired = session.expired_connections(Utc::now()).await?;
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let mut devices: BTreeSet<DeviceKey> = BTreeSet::new();
        let mut manifest = Vec::new();
        for entry in &expired {
            if let Err(e) = session.destroy_connection(entry.conn.ingress, entry.conn.egress).await
            {
                warn!(
                    xconn_id = %entry.conn.xconn_id,
                    error = %e,
                    "expired connection not destroyed, skipping"
                );
                continue;
            }

            let mut upstream_error = None;
            match same_device(entry) {
                Ok(dev) => {
                    match self
                        .client
                        .remove_xconnection(&dev.rtype, &dev.name, &entry.conn.xconn_id)
                        .await
                    {
                        Ok(()) => {
                            devices.insert(dev);
                        }
                        Err(e) => {
                            warn!(
                                device = %dev,
                                xconn_id = %entry.conn.xconn_id,
                                error = %e,
                                "upstream removal of expired cross-connect failed"
                            );
                            upstream_error = Some(e.to_string());
                        }
                    }
                }
                Err(e) => upstream_error = Some(e.to_string()),
            }

            let mut pair = detailed_manifest(std::slice::from_ref(entry));
            if let Some(err) = upstream_error {
                for resource in &mut pair {
                    resource.error = Some(err.clone());
                }
            }
            manifest.extend(pair);
        }
        session.commit().await?;

        for dev in &devices {
            if let Err(e) = self.client.execute_queue(&dev.rtype, &dev.name).await {
                warn!(device = %dev, error = %e, "queue execute failed during expiration sweep");
            }
        }
        Ok(manifest)
    }

    // ── Per-connection helpers ───────────────────────────────────────────────

    async fn operation_slices(
        &self,
        slices: &[String],
        op: ConnOp,
    ) -> Result<Vec<GeniResource>, OnsError> {
        let mut session = self.store.session().await?;
        let mut devices: BTreeSet<DeviceKey> = BTreeSet::new();
        let mut manifest = Vec::new();
        for slice_urn in slices {
            debug!(%slice_urn, ?op, "slice operation");
            let entries = session.get_slice(slice_urn).await?;
            for entry in &entries {
                devices.insert(self.apply_conn_op(&mut session, entry, op).await?);
            }
            // Manifest reflects the rows as fetched, before the operation.
            manifest.extend(detailed_manifest(&entries));
        }
        session.commit().await?;

        for dev in &devices {
            self.client.execute_queue(&dev.rtype, &dev.name).await?;
        }
        Ok(manifest)
    }

    async fn apply_conn_op(
        &self,
        session: &mut StoreSession,
        entry: &SliceEntry,
        op: ConnOp,
    ) -> Result<DeviceKey, OnsError> {
        let dev = same_device(entry)?;
        match op {
            ConnOp::Start => {
                session
                    .oper_connection(entry.conn.ingress, entry.conn.egress, Operational::ReadyBusy)
                    .await?;
                let xconn = XConnection {
                    instance_id: entry.conn.xconn_id.clone(),
                    src_end_point_id: entry.ingress.endpoint.clone(),
                    src_label_id: entry.ingress.label.clone(),
                    dst_end_point_id: entry.egress.endpoint.clone(),
                    dst_label_id: entry.egress.label.clone(),
                };
                self.client.make_xconnection(&dev.rtype, &dev.name, &xconn).await?;
            }
            ConnOp::Stop => {
                session
                    .oper_connection(entry.conn.ingress, entry.conn.egress, Operational::Ready)
                    .await?;
                self.client
                    .remove_xconnection(&dev.rtype, &dev.name, &entry.conn.xconn_id)
                    .await?;
            }
            ConnOp::Release => {
                session.destroy_connection(entry.conn.ingress, entry.conn.egress).await?;
                self.client
                    .remove_xconnection(&dev.rtype, &dev.name, &entry.conn.xconn_id)
                    .await?;
            }
        }
        Ok(dev)
    }
}
