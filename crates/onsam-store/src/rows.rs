use chrono::{DateTime, Utc};
use onsam_domain::{Allocation, ClientInfo, DeviceKey, Operational};

/// One endpoint row joined with its owning device, as returned by
/// [`StoreSession::get_resources`](crate::StoreSession::get_resources).
///
/// `slice_urn` and `end_time` are populated only for allocated endpoints.
#[derive(Debug, Clone)]
pub struct ResourceView {
    pub name: String,
    pub rtype: String,
    pub endpoint: String,
    pub label: String,
    pub allocation: Allocation,
    pub operational: Operational,
    pub slice_urn: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
}

/// One endpoint row joined with its owning device, as seen from a connection.
#[derive(Debug, Clone)]
pub struct EndpointView {
    pub id: i64,
    pub endpoint: String,
    pub label: String,
    pub allocation: Allocation,
    pub operational: Operational,
    pub name: String,
    pub rtype: String,
}

impl EndpointView {
    pub fn device(&self) -> DeviceKey {
        DeviceKey::new(&self.rtype, &self.name)
    }
}

/// A reserved or audited cross-connect row.
#[derive(Debug, Clone)]
pub struct ConnectionRow {
    pub ingress: i64,
    pub egress: i64,
    pub xconn_id: String,
    pub slice_urn: String,
    pub end_time: DateTime<Utc>,
    pub client: ClientInfo,
    pub operational: Operational,
}

/// A connection together with both of its endpoint views.
#[derive(Debug, Clone)]
pub struct SliceEntry {
    pub ingress: EndpointView,
    pub egress: EndpointView,
    pub conn: ConnectionRow,
}

/// Values attached to a new reservation.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub slice_urn: String,
    pub end_time: DateTime<Utc>,
    pub client: ClientInfo,
}

/// A device-reported cross-connect, as consumed by the connection audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditedXconn {
    pub instance_id: String,
    pub src_endpoint: String,
    pub src_label: String,
    pub dst_endpoint: String,
    pub dst_label: String,
}
