use std::time::Duration;

use onsam_domain::OnsError;
use tracing::debug;

use crate::xml::{decode_entries, queue_error, XConnection};

/// HTTP client toward the OpenNaaS controller REST surface.
///
/// Every request carries basic auth and a bounded timeout so a stuck
/// controller cannot hang a worker.
pub struct ControllerClient {
    http: reqwest::Client,
    base: String,
    user: String,
    password: String,
}

fn ons(e: reqwest::Error) -> OnsError {
    OnsError::Ons(e.to_string())
}

impl ControllerClient {
    /// `base` is the controller root, e.g. `http://host:8888/opennaas/`.
    pub fn new(
        base: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OnsError> {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ons)?;
        Ok(ControllerClient { http, base, user: user.into(), password: password.into() })
    }

    // ── Transport ────────────────────────────────────────────────────────────

    async fn get(&self, path: &str) -> Result<String, OnsError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "GET");
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(ons)?;
        let status = resp.status();
        let body = resp.text().await.map_err(ons)?;
        if !status.is_success() {
            return Err(OnsError::Ons(format!("GET {url} failed: {status}")));
        }
        Ok(body)
    }

    async fn post(&self, path: &str, body: Option<String>) -> Result<String, OnsError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "POST");
        let mut req = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/xml");
        if let Some(data) = body {
            req = req.body(data);
        }
        let resp = req.send().await.map_err(ons)?;
        let status = resp.status();
        let body = resp.text().await.map_err(ons)?;
        if !status.is_success() {
            return Err(OnsError::Ons(format!("POST {url} failed: {status}")));
        }
        Ok(body)
    }

    async fn delete(&self, path: &str) -> Result<String, OnsError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "DELETE");
        let resp = self
            .http
            .delete(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(ons)?;
        let status = resp.status();
        let body = resp.text().await.map_err(ons)?;
        if !status.is_success() {
            return Err(OnsError::Ons(format!("DELETE {url} failed: {status}")));
        }
        Ok(body)
    }

    // ── Inventory enumeration ────────────────────────────────────────────────

    pub async fn get_resource_types(&self) -> Result<Vec<String>, OnsError> {
        let body = self.get("resources/getResourceTypes").await?;
        Ok(decode_entries(&body))
    }

    pub async fn list_resources_by_type(&self, rtype: &str) -> Result<Vec<String>, OnsError> {
        let body = self.get(&format!("resources/listResourcesByType/{rtype}")).await?;
        Ok(decode_entries(&body))
    }

    /// Every managed device, as `(type, name)` pairs.
    pub async fn get_resources(&self) -> Result<Vec<(String, String)>, OnsError> {
        let mut devices = Vec::new();
        for rtype in self.get_resource_types().await? {
            for name in self.list_resources_by_type(&rtype).await? {
                devices.push((rtype.clone(), name));
            }
        }
        Ok(devices)
    }

    pub async fn get_endpoints(&self, rtype: &str, name: &str) -> Result<Vec<String>, OnsError> {
        let body = self.get(&format!("{rtype}/{name}/xconnect/getEndPoints")).await?;
        Ok(decode_entries(&body))
    }

    pub async fn get_labels(
        &self,
        rtype: &str,
        name: &str,
        endpoint: &str,
    ) -> Result<Vec<String>, OnsError> {
        let body = self
            .get(&format!("{rtype}/{name}/xconnect/getLabels/{endpoint}"))
            .await?;
        Ok(decode_entries(&body))
    }

    // ── Cross-connects ───────────────────────────────────────────────────────

    pub async fn get_xconnections(&self, rtype: &str, name: &str) -> Result<Vec<String>, OnsError> {
        let body = self.get(&format!("{rtype}/{name}/xconnect/")).await?;
        Ok(decode_entries(&body))
    }

    pub async fn get_xconnection(
        &self,
        rtype: &str,
        name: &str,
        xconn_id: &str,
    ) -> Result<Option<XConnection>, OnsError> {
        let body = self.get(&format!("{rtype}/{name}/xconnect/{xconn_id}")).await?;
        Ok(XConnection::from_xml(&body))
    }

    /// Stage a cross-connect creation on the device queue.
    ///
    /// The controller answers with the instance id it assigned; anything other
    /// than an echo of the sent id is an error.
    pub async fn make_xconnection(
        &self,
        rtype: &str,
        name: &str,
        xconn: &XConnection,
    ) -> Result<(), OnsError> {
        let data = xconn
            .to_xml()
            .map_err(|e| OnsError::Ons(format!("encode xConnection: {e}")))?;
        let body = self.post(&format!("{rtype}/{name}/xconnect/"), Some(data)).await?;
        let assigned = body.trim();
        if assigned != xconn.instance_id {
            return Err(OnsError::Ons(format!(
                "instance id mismatch: sent {}, controller assigned {assigned}",
                xconn.instance_id
            )));
        }
        Ok(())
    }

    /// Stage a cross-connect removal on the device queue.
    pub async fn remove_xconnection(
        &self,
        rtype: &str,
        name: &str,
        xconn_id: &str,
    ) -> Result<(), OnsError> {
        self.delete(&format!("{rtype}/{name}/xconnect/{xconn_id}")).await?;
        Ok(())
    }

    /// Drain the device's pending actions. Any `<responses>` entry reporting
    /// an error status fails the call with the offending action id.
    pub async fn execute_queue(&self, rtype: &str, name: &str) -> Result<(), OnsError> {
        let body = self.post(&format!("{rtype}/{name}/queue/execute"), None).await?;
        if let Some(action_id) = queue_error(&body) {
            return Err(OnsError::Ons(format!("queue execute error (actionID={action_id})")));
        }
        Ok(())
    }
}
