use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OnsError;

// ── Allocation / operational lifecycle ───────────────────────────────────────

/// Allocation state of a ROADM endpoint.
///
/// Newly audited endpoints enter as `AuditTrans`; the audit-terminated sweep
/// promotes survivors to `Free`. Reservations move `Free` → `Allocated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    Free,
    Allocated,
    Provisioned,
    AuditTrans,
}

impl Allocation {
    pub fn as_i64(self) -> i64 {
        match self {
            Allocation::Free => 0,
            Allocation::Allocated => 1,
            Allocation::Provisioned => 2,
            Allocation::AuditTrans => 3,
        }
    }
}

impl TryFrom<i64> for Allocation {
    type Error = OnsError;

    fn try_from(v: i64) -> Result<Self, OnsError> {
        match v {
            0 => Ok(Allocation::Free),
            1 => Ok(Allocation::Allocated),
            2 => Ok(Allocation::Provisioned),
            3 => Ok(Allocation::AuditTrans),
            other => Err(OnsError::Ons(format!("unknown allocation state: {other}"))),
        }
    }
}

impl std::fmt::Display for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Allocation::Free => write!(f, "free"),
            Allocation::Allocated => write!(f, "allocated"),
            Allocation::Provisioned => write!(f, "provisioned"),
            Allocation::AuditTrans => write!(f, "audit_trans"),
        }
    }
}

/// Operational state of an endpoint or cross-connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operational {
    Ready,
    ReadyBusy,
}

impl Operational {
    pub fn as_i64(self) -> i64 {
        match self {
            Operational::Ready => 0,
            Operational::ReadyBusy => 1,
        }
    }
}

impl TryFrom<i64> for Operational {
    type Error = OnsError;

    fn try_from(v: i64) -> Result<Self, OnsError> {
        match v {
            0 => Ok(Operational::Ready),
            1 => Ok(Operational::ReadyBusy),
            other => Err(OnsError::Ons(format!("unknown operational state: {other}"))),
        }
    }
}

impl std::fmt::Display for Operational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operational::Ready => write!(f, "ready"),
            Operational::ReadyBusy => write!(f, "ready_busy"),
        }
    }
}

// ── Device key ───────────────────────────────────────────────────────────────

/// Identity of one OpenNaaS-managed device: `(type, name)`.
///
/// Ordered so device sets iterate deterministically when draining queues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    pub rtype: String,
    pub name: String,
}

impl DeviceKey {
    pub fn new(rtype: impl Into<String>, name: impl Into<String>) -> Self {
        DeviceKey { rtype: rtype.into(), name: name.into() }
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.rtype, self.name)
    }
}

// ── URN and cross-connect identity codecs ────────────────────────────────────

/// Build the public urn of an endpoint: `name:endpoint:label`.
pub fn create_roadm_urn(name: &str, endpoint: &str, label: &str) -> String {
    format!("{name}:{endpoint}:{label}")
}

/// Split a `name:endpoint:label` urn on its first two colons.
///
/// The label keeps any embedded colons verbatim, so
/// `create_roadm_urn(decode_roadm_urn(u)) == u` holds for every urn this
/// aggregate hands out.
pub fn decode_roadm_urn(urn: &str) -> Result<(String, String, String), OnsError> {
    let mut parts = urn.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(endpoint), Some(label)) => {
            Ok((name.to_string(), endpoint.to_string(), label.to_string()))
        }
        _ => Err(OnsError::NotFound(format!("malformed roadm urn: {urn}"))),
    }
}

/// Deterministic cross-connect identity: `src_ep:src_label::dst_ep:dst_label`.
///
/// The double-colon separator is what the OpenNaaS controller keys the
/// cross-connect by; it must round-trip byte-for-byte.
pub fn create_xconn_id(src_ep: &str, src_label: &str, dst_ep: &str, dst_label: &str) -> String {
    format!("{src_ep}:{src_label}::{dst_ep}:{dst_label}")
}

// ── Client identity ──────────────────────────────────────────────────────────

/// Requester identity attached to a reservation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
}

impl ClientInfo {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        ClientInfo { name: name.into(), id: id.into(), email: email.into() }
    }
}

// ── GENI-facing value objects ────────────────────────────────────────────────

/// Requester identity plus the peer endpoint of the cross-connect, as shown
/// in detailed manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeniRoadmDetails {
    pub client_name: String,
    pub client_id: String,
    pub client_mail: String,
    pub connected_in_urn: Option<String>,
    pub connected_out_urn: Option<String>,
}

impl GeniRoadmDetails {
    pub fn new(client: &ClientInfo) -> Self {
        GeniRoadmDetails {
            client_name: client.name.clone(),
            client_id: client.id.clone(),
            // Manifests never show an empty mail field.
            client_mail: if client.email.is_empty() { "empty".to_string() } else { client.email.clone() },
            connected_in_urn: None,
            connected_out_urn: None,
        }
    }

    pub fn connected_in(mut self, urn: impl Into<String>) -> Self {
        self.connected_in_urn = Some(urn.into());
        self
    }

    pub fn connected_out(mut self, urn: impl Into<String>) -> Self {
        self.connected_out_urn = Some(urn.into());
        self
    }
}

/// One endpoint of the aggregate as reported to the GENI delegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeniResource {
    pub urn: String,
    pub slice_urn: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub rtype: String,
    pub allocation: Allocation,
    pub operational: Operational,
    pub details: Option<GeniRoadmDetails>,
    /// Populated by best-effort paths when an upstream removal fails.
    pub error: Option<String>,
}

impl GeniResource {
    pub fn new(
        urn: impl Into<String>,
        slice_urn: Option<String>,
        end_time: Option<DateTime<Utc>>,
        rtype: impl Into<String>,
        allocation: Allocation,
        operational: Operational,
    ) -> Self {
        GeniResource {
            urn: urn.into(),
            slice_urn,
            end_time,
            rtype: rtype.into(),
            allocation,
            operational,
            details: None,
            error: None,
        }
    }

    pub fn available(&self) -> bool {
        self.allocation == Allocation::Free
    }

    pub fn with_details(mut self, details: GeniRoadmDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
