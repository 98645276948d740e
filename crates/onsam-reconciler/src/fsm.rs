use std::sync::Arc;

use onsam_client::{ControllerClient, XConnection};
use onsam_store::{AuditedXconn, RoadmStore};
use tracing::{debug, info, warn};

/// States of the inventory audit loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    /// Pull the full inventory from the controller into the drain buffers.
    Get,
    /// Write one bounded batch per tick into the store.
    Update,
    /// Reap rows the sweep no longer observed, promote audit survivors.
    Clean,
}

/// Paced reconciliation of the controller inventory into the store.
///
/// Driven one step at a time by an external tick; each tick does O(step)
/// work so the worker thread is never held for a full sweep. Guards keep the
/// machine self-healing: it will not leave `Get` without fresh data and will
/// not leave `Update` while a buffer still holds work.
pub struct AuditFsm {
    state: FsmState,
    step: usize,
    resources: Vec<(String, String)>,
    roadms: Vec<(String, String, String, String)>,
    xconns: Vec<(String, String, AuditedXconn)>,
    store: RoadmStore,
    client: Arc<ControllerClient>,
}

/// Split off up to `step` items from the end of a buffer.
fn drain_tail<T>(buf: &mut Vec<T>, step: usize) -> Vec<T> {
    let at = buf.len().saturating_sub(step);
    buf.split_off(at)
}

fn audited(conn: XConnection) -> AuditedXconn {
    AuditedXconn {
        instance_id: conn.instance_id,
        src_endpoint: conn.src_end_point_id,
        src_label: conn.src_label_id,
        dst_endpoint: conn.dst_end_point_id,
        dst_label: conn.dst_label_id,
    }
}

impl AuditFsm {
    pub fn new(store: RoadmStore, client: Arc<ControllerClient>, step: usize) -> Self {
        AuditFsm {
            state: FsmState::Get,
            step: step.max(1),
            resources: Vec::new(),
            roadms: Vec::new(),
            xconns: Vec::new(),
            store,
            client,
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    fn buffers_empty(&self) -> bool {
        self.resources.is_empty() && self.roadms.is_empty() && self.xconns.is_empty()
    }

    /// Perform one tick of the audit loop.
    ///
    /// Errors never escape: they are logged and the machine retries from its
    /// current state on the next tick.
    pub async fn action(&mut self) {
        match self.state {
            FsmState::Get => {
                self.on_get().await;
                if self.buffers_empty() {
                    debug!("staying in get: no inventory available");
                } else {
                    self.state = FsmState::Update;
                }
            }
            FsmState::Update => {
                self.on_update().await;
                if self.buffers_empty() {
                    self.state = FsmState::Clean;
                } else {
                    debug!("staying in update: db-update still in progress");
                }
            }
            FsmState::Clean => {
                self.on_clean().await;
                self.state = FsmState::Get;
            }
        }
    }

    async fn on_get(&mut self) {
        let devices = match self.client.get_resources().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "inventory fetch failed");
                return;
            }
        };
        self.resources = devices;

        let mut roadms = Vec::new();
        for (rtype, name) in &self.resources {
            let endpoints = match self.client.get_endpoints(rtype, name).await {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    warn!(device = %name, error = %e, "endpoint fetch failed");
                    return;
                }
            };
            for endpoint in endpoints {
                let labels = match self.client.get_labels(rtype, name, &endpoint).await {
                    Ok(labels) => labels,
                    Err(e) => {
                        warn!(device = %name, %endpoint, error = %e, "label fetch failed");
                        return;
                    }
                };
                for label in labels {
                    roadms.push((rtype.clone(), name.clone(), endpoint.clone(), label));
                }
            }
        }
        self.roadms = roadms;

        let mut xconns = Vec::new();
        for (rtype, name) in &self.resources {
            let ids = match self.client.get_xconnections(rtype, name).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(device = %name, error = %e, "xconnect list fetch failed");
                    return;
                }
            };
            for xconn_id in ids {
                match self.client.get_xconnection(rtype, name, &xconn_id).await {
                    Ok(Some(conn)) => xconns.push((rtype.clone(), name.clone(), audited(conn))),
                    // Undecodable body: already logged by the decoder.
                    Ok(None) => {}
                    Err(e) => {
                        warn!(device = %name, %xconn_id, error = %e, "xconnect fetch failed");
                        return;
                    }
                }
            }
        }
        self.xconns = xconns;

        info!(
            resources = self.resources.len(),
            roadms = self.roadms.len(),
            xconns = self.xconns.len(),
            "inventory snapshot loaded"
        );
    }

    async fn on_update(&mut self) {
        // One buffer per tick, resources before endpoints before connections,
        // so referential lookups always find their parents.
        if !self.resources.is_empty() {
            let batch = drain_tail(&mut self.resources, self.step);
            if let Err(e) = self.audit_resources(&batch).await {
                warn!(error = %e, dropped = batch.len(), "resource audit batch failed");
            }
            debug!(missing = self.resources.len(), "resources left to audit");
        } else if !self.roadms.is_empty() {
            let batch = drain_tail(&mut self.roadms, self.step);
            if let Err(e) = self.audit_roadms(&batch).await {
                warn!(error = %e, dropped = batch.len(), "roadm audit batch failed");
            }
            debug!(missing = self.roadms.len(), "roadms left to audit");
        } else if !self.xconns.is_empty() {
            let batch = drain_tail(&mut self.xconns, self.step);
            if let Err(e) = self.audit_connections(&batch).await {
                warn!(error = %e, dropped = batch.len(), "connection audit batch failed");
            }
            debug!(missing = self.xconns.len(), "connections left to audit");
        }
    }

    async fn on_clean(&mut self) {
        self.resources.clear();
        self.roadms.clear();
        self.xconns.clear();

        let result = async {
            let mut session = self.store.session().await?;
            session.audit_terminated().await?;
            session.commit().await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "audit-terminated sweep failed");
        }
    }

    async fn audit_resources(&self, batch: &[(String, String)]) -> Result<(), onsam_domain::OnsError> {
        let mut session = self.store.session().await?;
        session.audit_resources(batch).await?;
        session.commit().await
    }

    async fn audit_roadms(
        &self,
        batch: &[(String, String, String, String)],
    ) -> Result<(), onsam_domain::OnsError> {
        let mut session = self.store.session().await?;
        session.audit_roadms(batch).await?;
        session.commit().await
    }

    async fn audit_connections(
        &self,
        batch: &[(String, String, AuditedXconn)],
    ) -> Result<(), onsam_domain::OnsError> {
        let mut session = self.store.session().await?;
        session.audit_connections(batch).await?;
        session.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use onsam_domain::Allocation;
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entries(items: &[&str]) -> String {
        let body: String = items.iter().map(|i| format!("<entry>{i}</entry>")).collect();
        format!("<list>{body}</list>")
    }

    async fn client_for(server: &MockServer) -> Arc<ControllerClient> {
        Arc::new(
            ControllerClient::new(
                format!("{}/opennaas/", server.uri()),
                "admin",
                "123456",
                StdDuration::from_secs(2),
            )
            .unwrap(),
        )
    }

    /// Mock one device with endpoints {ep1,ep2} x labels {l1,l2} and the
    /// given set of active cross-connects.
    async fn mount_device(server: &MockServer, name: &str, xconns: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/opennaas/resources/getResourceTypes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(entries(&["roadm"])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/opennaas/resources/listResourcesByType/roadm"))
            .respond_with(ResponseTemplate::new(200).set_body_string(entries(&[name])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/opennaas/roadm/{name}/xconnect/getEndPoints")))
            .respond_with(ResponseTemplate::new(200).set_body_string(entries(&["ep1", "ep2"])))
            .mount(server)
            .await;
        for ep in ["ep1", "ep2"] {
            Mock::given(method("GET"))
                .and(path(format!("/opennaas/roadm/{name}/xconnect/getLabels/{ep}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(entries(&["l1", "l2"])))
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(format!("/opennaas/roadm/{name}/xconnect/")))
            .respond_with(ResponseTemplate::new(200).set_body_string(entries(xconns)))
            .mount(server)
            .await;
        for xid in xconns {
            let (src, dst) = xid.split_once("::").unwrap();
            let (src_ep, src_label) = src.split_once(':').unwrap();
            let (dst_ep, dst_label) = dst.split_once(':').unwrap();
            let body = format!(
                "<xConnection><instanceID>{xid}</instanceID>\
                 <srcEndPointId>{src_ep}</srcEndPointId><srcLabelId>{src_label}</srcLabelId>\
                 <dstEndPointId>{dst_ep}</dstEndPointId><dstLabelId>{dst_label}</dstLabelId>\
                 </xConnection>"
            );
            Mock::given(method("GET"))
                .and(path(format!("/opennaas/roadm/{name}/xconnect/{xid}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(server)
                .await;
        }
    }

    /// Drive the FSM until it has completed a clean and returned to get.
    async fn run_full_cycle(fsm: &mut AuditFsm) {
        let mut seen_clean = false;
        for _ in 0..32 {
            if fsm.state() == FsmState::Clean {
                seen_clean = true;
            }
            fsm.action().await;
            if seen_clean && fsm.state() == FsmState::Get {
                return;
            }
        }
        panic!("FSM did not complete a cycle within 32 ticks");
    }

    #[tokio::test]
    async fn empty_upstream_keeps_fsm_in_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/opennaas/resources/getResourceTypes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(entries(&[])))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = RoadmStore::connect(dir.path()).await.unwrap();
        let mut fsm = AuditFsm::new(store, client_for(&server).await, 10);

        fsm.action().await;
        assert_eq!(fsm.state(), FsmState::Get);
        fsm.action().await;
        assert_eq!(fsm.state(), FsmState::Get);
    }

    #[tokio::test]
    async fn unreachable_upstream_keeps_fsm_in_get() {
        // Nothing mounted: every request 404s.
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = RoadmStore::connect(dir.path()).await.unwrap();
        let mut fsm = AuditFsm::new(store, client_for(&server).await, 10);

        fsm.action().await;
        assert_eq!(fsm.state(), FsmState::Get);
    }

    #[tokio::test]
    async fn full_cycle_seeds_free_inventory() {
        let server = MockServer::start().await;
        mount_device(&server, "roadmA", &[]).await;

        let dir = tempfile::tempdir().unwrap();
        let store = RoadmStore::connect(dir.path()).await.unwrap();
        let mut fsm = AuditFsm::new(store.clone(), client_for(&server).await, 2);

        run_full_cycle(&mut fsm).await;

        let mut session = store.session().await.unwrap();
        let views = session.get_resources().await.unwrap();
        assert_eq!(views.len(), 4);
        assert!(views.iter().all(|v| v.allocation == Allocation::Free));

        let (conns,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM connections")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(conns, 0);
    }

    #[tokio::test]
    async fn small_step_paces_the_update_phase() {
        let server = MockServer::start().await;
        mount_device(&server, "roadmA", &[]).await;

        let dir = tempfile::tempdir().unwrap();
        let store = RoadmStore::connect(dir.path()).await.unwrap();
        let mut fsm = AuditFsm::new(store, client_for(&server).await, 1);

        fsm.action().await; // get: 1 resource + 4 roadms buffered
        assert_eq!(fsm.state(), FsmState::Update);
        fsm.action().await; // drains the single resource
        assert_eq!(fsm.state(), FsmState::Update);
        fsm.action().await; // drains one roadm, three remain
        assert_eq!(fsm.state(), FsmState::Update);
    }

    #[tokio::test]
    async fn device_reported_xconn_allocates_endpoints() {
        let server = MockServer::start().await;
        mount_device(&server, "roadmA", &["ep1:l1::ep2:l2"]).await;

        let dir = tempfile::tempdir().unwrap();
        let store = RoadmStore::connect(dir.path()).await.unwrap();
        let mut fsm = AuditFsm::new(store.clone(), client_for(&server).await, 10);

        run_full_cycle(&mut fsm).await;

        let mut session = store.session().await.unwrap();
        let views = session.get_resources().await.unwrap();
        let allocated = views.iter().filter(|v| v.allocation == Allocation::Allocated).count();
        let free = views.iter().filter(|v| v.allocation == Allocation::Free).count();
        assert_eq!(allocated, 2);
        assert_eq!(free, 2);
    }

    #[tokio::test]
    async fn vanished_device_is_reaped_after_horizon() {
        let server = MockServer::start().await;
        mount_device(&server, "roadmA", &[]).await;

        let dir = tempfile::tempdir().unwrap();
        let store = RoadmStore::connect(dir.path()).await.unwrap();
        let mut fsm = AuditFsm::new(store.clone(), client_for(&server).await, 10);
        run_full_cycle(&mut fsm).await;

        // roadmA disappears upstream, roadmB replaces it.
        server.reset().await;
        mount_device(&server, "roadmB", &[]).await;

        // Time-travel: the roadmA audit happened past the horizon.
        let past = Utc::now() - Duration::days(2);
        for table in ["resources", "roadms"] {
            sqlx::query(&format!("UPDATE {table} SET audit_time = ?"))
                .bind(past)
                .execute(store.pool())
                .await
                .unwrap();
        }

        run_full_cycle(&mut fsm).await;

        let mut session = store.session().await.unwrap();
        let views = session.get_resources().await.unwrap();
        assert_eq!(views.len(), 4);
        assert!(views.iter().all(|v| v.name == "roadmB"));
    }
}
