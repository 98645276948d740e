use std::path::Path;

use chrono::{Duration, Utc};
use onsam_domain::{create_xconn_id, Allocation, ClientInfo, OnsError, Operational};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::rows::{
    AuditedXconn, ConnectionParams, ConnectionRow, EndpointView, ResourceView, SliceEntry,
};

// DDL — idempotent; run at every startup via migrate().
// Cascading foreign keys are only honored with PRAGMA foreign_keys=ON,
// which the pool enables on every connection.
const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS resources (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    type       TEXT NOT NULL,
    audit_time TEXT NOT NULL,
    UNIQUE (name, type)
);

CREATE TABLE IF NOT EXISTS roadms (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL,
    endpoint    TEXT NOT NULL,
    label       TEXT NOT NULL,
    allocation  INTEGER NOT NULL DEFAULT 3,
    operational INTEGER NOT NULL DEFAULT 0,
    audit_time  TEXT NOT NULL,
    UNIQUE (endpoint, label, resource_id),
    FOREIGN KEY (resource_id) REFERENCES resources (id)
        ON UPDATE CASCADE ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS connections (
    ingress      INTEGER NOT NULL UNIQUE,
    egress       INTEGER NOT NULL UNIQUE,
    xconn_id     TEXT NOT NULL,
    slice_urn    TEXT NOT NULL DEFAULT '',
    end_time     TEXT NOT NULL,
    client_name  TEXT NOT NULL DEFAULT '',
    client_id    TEXT NOT NULL DEFAULT '',
    client_email TEXT NOT NULL DEFAULT '',
    operational  INTEGER NOT NULL DEFAULT 0,
    audit_time   TEXT NOT NULL,
    PRIMARY KEY (ingress, egress),
    FOREIGN KEY (ingress) REFERENCES roadms (id)
        ON UPDATE CASCADE ON DELETE CASCADE,
    FOREIGN KEY (egress) REFERENCES roadms (id)
        ON UPDATE CASCADE ON DELETE CASCADE
);
"#;

/// Rows untouched for this long are considered gone upstream.
fn audit_horizon() -> Duration {
    Duration::days(1)
}

fn ons(e: sqlx::Error) -> OnsError {
    OnsError::Ons(e.to_string())
}

/// SQLite-backed persistence for devices, endpoints and cross-connects.
///
/// The pool is cheap to clone. All reads and writes go through a
/// [`StoreSession`], one transaction per façade entry point.
#[derive(Clone)]
pub struct RoadmStore {
    pool: SqlitePool,
}

impl RoadmStore {
    /// Open (or create) `<db_dir>/opennaas.db` and run schema migrations.
    pub async fn connect(db_dir: &Path) -> Result<Self, OnsError> {
        std::fs::create_dir_all(db_dir)
            .map_err(|e| OnsError::Ons(format!("create db dir {}: {e}", db_dir.display())))?;
        let options = SqliteConnectOptions::new()
            .filename(db_dir.join("opennaas.db"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(ons)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run all DDL migrations. Safe to call on every startup — all statements
    /// use `CREATE TABLE IF NOT EXISTS`.
    async fn migrate(&self) -> Result<(), OnsError> {
        sqlx::raw_sql(MIGRATIONS)
            .execute(&self.pool)
            .await
            .map_err(|e| OnsError::Ons(format!("migration: {e}")))?;
        Ok(())
    }

    /// Open a fresh session. Dropping the session without [`StoreSession::commit`]
    /// rolls back everything done through it.
    pub async fn session(&self) -> Result<StoreSession, OnsError> {
        let tx = self.pool.begin().await.map_err(ons)?;
        Ok(StoreSession { tx })
    }

    /// Direct pool access for health checks and ad-hoc maintenance queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// One unit of atomicity: a transaction over the ROADM tables.
pub struct StoreSession {
    tx: Transaction<'static, Sqlite>,
}

impl StoreSession {
    pub async fn commit(self) -> Result<(), OnsError> {
        self.tx.commit().await.map_err(ons)
    }

    // ── Reservation ──────────────────────────────────────────────────────────

    /// Resolve a device and an ingress/egress endpoint pair, requiring both
    /// endpoints to be free.
    ///
    /// Returns `(ingress_id, egress_id, xconn_id)` where the xconn id is the
    /// deterministic identity the controller will later use.
    pub async fn check_to_reserve(
        &mut self,
        name: &str,
        rtype: &str,
        in_endpoint: &str,
        in_label: &str,
        out_endpoint: &str,
        out_label: &str,
    ) -> Result<(i64, i64, String), OnsError> {
        let resource_id = self.resource_id(rtype, name).await?.ok_or_else(|| {
            OnsError::NotFound(format!("resource (name={name}, type={rtype})"))
        })?;

        let ingress = self
            .reservable_endpoint(resource_id, in_endpoint, in_label, "ingress")
            .await?;
        let egress = self
            .reservable_endpoint(resource_id, out_endpoint, out_label, "egress")
            .await?;

        let xconn_id = create_xconn_id(in_endpoint, in_label, out_endpoint, out_label);
        Ok((ingress, egress, xconn_id))
    }

    async fn reservable_endpoint(
        &mut self,
        resource_id: i64,
        endpoint: &str,
        label: &str,
        side: &str,
    ) -> Result<i64, OnsError> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT id, allocation FROM roadms
             WHERE resource_id = ? AND endpoint = ? AND label = ?",
        )
        .bind(resource_id)
        .bind(endpoint)
        .bind(label)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(ons)?;

        let (id, allocation) = row.ok_or_else(|| {
            OnsError::NotFound(format!(
                "{side} endpoint (resource={resource_id}, ep={endpoint}, label={label})"
            ))
        })?;
        if Allocation::try_from(allocation)? != Allocation::Free {
            return Err(OnsError::NotAvailable(format!(
                "{side} endpoint (resource={resource_id}, ep={endpoint}, label={label})"
            )));
        }
        Ok(id)
    }

    /// Insert the connection row and mark both endpoints allocated.
    pub async fn make_connection(
        &mut self,
        ingress: i64,
        egress: i64,
        xconn_id: &str,
        values: &ConnectionParams,
    ) -> Result<(), OnsError> {
        sqlx::query(
            "INSERT INTO connections
                 (ingress, egress, xconn_id, slice_urn, end_time,
                  client_name, client_id, client_email, operational, audit_time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ingress)
        .bind(egress)
        .bind(xconn_id)
        .bind(&values.slice_urn)
        .bind(values.end_time)
        .bind(&values.client.name)
        .bind(&values.client.id)
        .bind(&values.client.email)
        .bind(Operational::Ready.as_i64())
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await
        .map_err(ons)?;

        sqlx::query("UPDATE roadms SET allocation = ? WHERE id IN (?, ?)")
            .bind(Allocation::Allocated.as_i64())
            .bind(ingress)
            .bind(egress)
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Every endpoint with its device; allocated endpoints also carry their
    /// connection's slice urn and expiry.
    pub async fn get_resources(&mut self) -> Result<Vec<ResourceView>, OnsError> {
        let rows: Vec<(String, String, String, String, i64, i64, Option<String>, Option<chrono::DateTime<Utc>>)> =
            sqlx::query_as(
                "SELECT r.name, r.type, e.endpoint, e.label, e.allocation, e.operational,
                        c.slice_urn, c.end_time
                 FROM roadms e
                 JOIN resources r ON r.id = e.resource_id
                 LEFT JOIN connections c ON c.ingress = e.id OR c.egress = e.id
                 ORDER BY r.name, e.endpoint, e.label",
            )
            .fetch_all(&mut *self.tx)
            .await
            .map_err(ons)?;

        rows.into_iter()
            .map(|(name, rtype, endpoint, label, alloc, oper, slice_urn, end_time)| {
                let allocation = Allocation::try_from(alloc)?;
                Ok(ResourceView {
                    name,
                    rtype,
                    endpoint,
                    label,
                    allocation,
                    operational: Operational::try_from(oper)?,
                    slice_urn: if allocation == Allocation::Allocated { slice_urn } else { None },
                    end_time: if allocation == Allocation::Allocated { end_time } else { None },
                })
            })
            .collect()
    }

    /// All connections of a slice, each with both endpoint views.
    pub async fn get_slice(&mut self, slice_urn: &str) -> Result<Vec<SliceEntry>, OnsError> {
        let rows: Vec<(i64, i64, String, String, chrono::DateTime<Utc>, String, String, String, i64)> =
            sqlx::query_as(
                "SELECT ingress, egress, xconn_id, slice_urn, end_time,
                        client_name, client_id, client_email, operational
                 FROM connections WHERE slice_urn = ?
                 ORDER BY ingress",
            )
            .bind(slice_urn)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(ons)?;
        let conns = rows
            .into_iter()
            .map(Self::connection_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.slice_entries(conns).await
    }

    /// All connections whose reservation expired before `now`.
    pub async fn expired_connections(
        &mut self,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<SliceEntry>, OnsError> {
        let rows: Vec<(i64, i64, String, String, chrono::DateTime<Utc>, String, String, String, i64)> =
            sqlx::query_as(
                "SELECT ingress, egress, xconn_id, slice_urn, end_time,
                        client_name, client_id, client_email, operational
                 FROM connections WHERE end_time < ?
                 ORDER BY ingress",
            )
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(ons)?;
        let conns = rows
            .into_iter()
            .map(Self::connection_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.slice_entries(conns).await
    }

    fn connection_from_row(
        row: (i64, i64, String, String, chrono::DateTime<Utc>, String, String, String, i64),
    ) -> Result<ConnectionRow, OnsError> {
        let (ingress, egress, xconn_id, slice_urn, end_time, client_name, client_id, client_email, oper) =
            row;
        Ok(ConnectionRow {
            ingress,
            egress,
            xconn_id,
            slice_urn,
            end_time,
            client: ClientInfo::new(client_name, client_id, client_email),
            operational: Operational::try_from(oper)?,
        })
    }

    async fn slice_entries(
        &mut self,
        conns: Vec<ConnectionRow>,
    ) -> Result<Vec<SliceEntry>, OnsError> {
        let mut entries = Vec::with_capacity(conns.len());
        for conn in conns {
            let ingress = self.endpoint_view(conn.ingress).await?;
            let egress = self.endpoint_view(conn.egress).await?;
            entries.push(SliceEntry { ingress, egress, conn });
        }
        Ok(entries)
    }

    async fn endpoint_view(&mut self, id: i64) -> Result<EndpointView, OnsError> {
        let row: Option<(i64, String, String, i64, i64, String, String)> = sqlx::query_as(
            "SELECT e.id, e.endpoint, e.label, e.allocation, e.operational, r.name, r.type
             FROM roadms e
             JOIN resources r ON r.id = e.resource_id
             WHERE e.id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(ons)?;

        let (id, endpoint, label, alloc, oper, name, rtype) =
            row.ok_or_else(|| OnsError::NotFound(format!("endpoint (id={id})")))?;
        Ok(EndpointView {
            id,
            endpoint,
            label,
            allocation: Allocation::try_from(alloc)?,
            operational: Operational::try_from(oper)?,
            name,
            rtype,
        })
    }

    // ── Lifecycle updates ────────────────────────────────────────────────────

    /// Refresh expiry and client identity on every connection of a slice.
    pub async fn renew_slice(
        &mut self,
        slice_urn: &str,
        end_time: chrono::DateTime<Utc>,
        client: &ClientInfo,
    ) -> Result<(), OnsError> {
        sqlx::query(
            "UPDATE connections
             SET end_time = ?, client_name = ?, client_id = ?, client_email = ?
             WHERE slice_urn = ?",
        )
        .bind(end_time)
        .bind(&client.name)
        .bind(&client.id)
        .bind(&client.email)
        .bind(slice_urn)
        .execute(&mut *self.tx)
        .await
        .map_err(ons)?;
        Ok(())
    }

    /// Update operational state on a connection and both of its endpoints.
    pub async fn oper_connection(
        &mut self,
        ingress: i64,
        egress: i64,
        operational: Operational,
    ) -> Result<(), OnsError> {
        sqlx::query("UPDATE roadms SET operational = ? WHERE id IN (?, ?)")
            .bind(operational.as_i64())
            .bind(ingress)
            .bind(egress)
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        sqlx::query("UPDATE connections SET operational = ? WHERE ingress = ? AND egress = ?")
            .bind(operational.as_i64())
            .bind(ingress)
            .bind(egress)
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        Ok(())
    }

    /// Delete a connection and release both endpoint claims.
    pub async fn destroy_connection(&mut self, ingress: i64, egress: i64) -> Result<(), OnsError> {
        sqlx::query("DELETE FROM connections WHERE ingress = ? AND egress = ?")
            .bind(ingress)
            .bind(egress)
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        sqlx::query("UPDATE roadms SET allocation = ?, operational = ? WHERE id IN (?, ?)")
            .bind(Allocation::Free.as_i64())
            .bind(Operational::Ready.as_i64())
            .bind(ingress)
            .bind(egress)
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        Ok(())
    }

    // ── Audit procedures ─────────────────────────────────────────────────────

    /// Upsert a batch of `(type, name)` devices, reseeding `audit_time`.
    pub async fn audit_resources(&mut self, batch: &[(String, String)]) -> Result<(), OnsError> {
        let now = Utc::now();
        for (rtype, name) in batch {
            sqlx::query(
                "INSERT INTO resources (name, type, audit_time) VALUES (?, ?, ?)
                 ON CONFLICT (name, type) DO UPDATE SET audit_time = excluded.audit_time",
            )
            .bind(name)
            .bind(rtype)
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        }
        Ok(())
    }

    /// Upsert a batch of `(type, name, endpoint, label)` endpoints.
    ///
    /// New endpoints enter as `AuditTrans`; known ones only get their
    /// `audit_time` reseeded.
    pub async fn audit_roadms(
        &mut self,
        batch: &[(String, String, String, String)],
    ) -> Result<(), OnsError> {
        let now = Utc::now();
        let mut cached: Option<(String, String, i64)> = None;
        for (rtype, name, endpoint, label) in batch {
            let resource_id = match &cached {
                Some((t, n, id)) if t == rtype && n == name => *id,
                _ => {
                    let id = self.resource_id(rtype, name).await?.ok_or_else(|| {
                        OnsError::NotFound(format!("resource (name={name}, type={rtype})"))
                    })?;
                    cached = Some((rtype.clone(), name.clone(), id));
                    id
                }
            };
            sqlx::query(
                "INSERT INTO roadms (resource_id, endpoint, label, allocation, operational, audit_time)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (endpoint, label, resource_id)
                     DO UPDATE SET audit_time = excluded.audit_time",
            )
            .bind(resource_id)
            .bind(endpoint)
            .bind(label)
            .bind(Allocation::AuditTrans.as_i64())
            .bind(Operational::Ready.as_i64())
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        }
        Ok(())
    }

    /// Upsert a batch of device-reported cross-connects and mark their
    /// endpoints allocated.
    pub async fn audit_connections(
        &mut self,
        batch: &[(String, String, AuditedXconn)],
    ) -> Result<(), OnsError> {
        let now = Utc::now();
        let mut cached: Option<(String, String, i64)> = None;
        for (rtype, name, xconn) in batch {
            let resource_id = match &cached {
                Some((t, n, id)) if t == rtype && n == name => *id,
                _ => {
                    let id = self.resource_id(rtype, name).await?.ok_or_else(|| {
                        OnsError::NotFound(format!("resource (name={name}, type={rtype})"))
                    })?;
                    cached = Some((rtype.clone(), name.clone(), id));
                    id
                }
            };

            let ingress = self
                .endpoint_id(resource_id, &xconn.src_endpoint, &xconn.src_label)
                .await?;
            let egress = self
                .endpoint_id(resource_id, &xconn.dst_endpoint, &xconn.dst_label)
                .await?;

            // The ingress and egress uniques are separate constraints, so a
            // plain ON CONFLICT target cannot cover both: try the insert and
            // fall back to bumping audit_time on any collision.
            let inserted = sqlx::query(
                "INSERT INTO connections (ingress, egress, xconn_id, end_time, operational, audit_time)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(ingress)
            .bind(egress)
            .bind(&xconn.instance_id)
            .bind(now)
            .bind(Operational::Ready.as_i64())
            .bind(now)
            .execute(&mut *self.tx)
            .await;
            if inserted.is_err() {
                sqlx::query(
                    "UPDATE connections SET audit_time = ? WHERE ingress = ? AND egress = ?",
                )
                .bind(now)
                .bind(ingress)
                .bind(egress)
                .execute(&mut *self.tx)
                .await
                .map_err(ons)?;
            }

            sqlx::query("UPDATE roadms SET allocation = ? WHERE id IN (?, ?)")
                .bind(Allocation::Allocated.as_i64())
                .bind(ingress)
                .bind(egress)
                .execute(&mut *self.tx)
                .await
                .map_err(ons)?;
        }
        Ok(())
    }

    /// Reap every row not observed during the last full sweep, then promote
    /// endpoints still in audit transit to free.
    pub async fn audit_terminated(&mut self) -> Result<(), OnsError> {
        let horizon = Utc::now() - audit_horizon();

        for table in ["resources", "roadms", "connections"] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE audit_time < ?"))
                .bind(horizon)
                .execute(&mut *self.tx)
                .await
                .map_err(ons)?;
            if result.rows_affected() > 0 {
                debug!(table, reaped = result.rows_affected(), "audit-terminated rows");
            }
        }

        sqlx::query("UPDATE roadms SET allocation = ? WHERE allocation = ?")
            .bind(Allocation::Free.as_i64())
            .bind(Allocation::AuditTrans.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(ons)?;
        Ok(())
    }

    // ── Lookups ──────────────────────────────────────────────────────────────

    async fn resource_id(&mut self, rtype: &str, name: &str) -> Result<Option<i64>, OnsError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM resources WHERE name = ? AND type = ?")
                .bind(name)
                .bind(rtype)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(ons)?;
        Ok(row.map(|(id,)| id))
    }

    async fn endpoint_id(
        &mut self,
        resource_id: i64,
        endpoint: &str,
        label: &str,
    ) -> Result<i64, OnsError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM roadms WHERE resource_id = ? AND endpoint = ? AND label = ?",
        )
        .bind(resource_id)
        .bind(endpoint)
        .bind(label)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(ons)?;
        row.map(|(id,)| id).ok_or_else(|| {
            OnsError::NotFound(format!(
                "endpoint (resource={resource_id}, ep={endpoint}, label={label})"
            ))
        })
    }
}
