use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::rotation;
use crate::store::LeadStore;
use crate::types::{
    Assignment, AssignmentStatus, CounterKey, Deal, Department, Lead, RoutingCounter, TeamMember,
};

/// Async SQLite-backed [`LeadStore`].
///
/// All statements run on the single connection thread owned by
/// `tokio_rusqlite`, so each `call` is serialised against every other one.
/// Rotation runs inside an immediate transaction within one `call`.
pub struct SqliteStore {
    conn: Connection,
}

// ---------------------------------------------------------------------------
// helpers â€“ values <-> SQLite
// ---------------------------------------------------------------------------

fn enum_to_sql<T: Serialize>(val: &T) -> StoreResult<String> {
    match serde_json::to_value(val)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::Codec(format!("expected a string enum, got {other}"))),
    }
}

fn ts(at: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order.
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_uuid_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn ts_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn enum_at<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_value(serde_json::Value::String(raw)).map_err(|e| conversion_error(idx, e))
}

fn json_at<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

const MEMBER_COLUMNS: &str = "id, name, email, department, role, territories, specializations,
    is_active, lead_cap, current_lead_count, last_assigned_at, created_at, updated_at";

const LEAD_COLUMNS: &str = "id, name, source, lead_score, phone, email, interests, created_at";

const ASSIGNMENT_COLUMNS: &str = "id, lead_id, member_id, assigned_by, reason, priority, status,
    response_deadline, escalation_level, contact_attempts, first_contacted_at,
    last_contacted_at, escalated_at, completed_at, created_at, updated_at, version";

const DEAL_COLUMNS: &str = "id, lead_id, member_id, department, stage, value, priority,
    stage_history, next_followup_at, status, onboarding_triggered_at, closed_at,
    created_at, updated_at, version";

impl SqliteStore {
    /// Open (or create) a database at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create a purely in-memory database (useful for tests).
    pub async fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    async fn init_schema(&self) -> StoreResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA temp_store=MEMORY;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS team_members (
                        id                 TEXT PRIMARY KEY,
                        name               TEXT NOT NULL,
                        email              TEXT,
                        department         TEXT NOT NULL,
                        role               TEXT NOT NULL,
                        territories        TEXT NOT NULL,
                        specializations    TEXT NOT NULL,
                        is_active          INTEGER NOT NULL,
                        lead_cap           INTEGER NOT NULL DEFAULT 0,
                        current_lead_count INTEGER NOT NULL DEFAULT 0,
                        last_assigned_at   TEXT,
                        created_at         TEXT NOT NULL,
                        updated_at         TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_members_department ON team_members(department);

                    CREATE TABLE IF NOT EXISTS leads (
                        id         TEXT PRIMARY KEY,
                        name       TEXT NOT NULL,
                        source     TEXT NOT NULL,
                        lead_score INTEGER NOT NULL,
                        phone      TEXT,
                        email      TEXT,
                        interests  TEXT NOT NULL,
                        created_at TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS assignments (
                        id                 TEXT PRIMARY KEY,
                        lead_id            TEXT NOT NULL,
                        member_id          TEXT NOT NULL,
                        assigned_by        TEXT,
                        reason             TEXT NOT NULL,
                        priority           TEXT NOT NULL,
                        status             TEXT NOT NULL,
                        response_deadline  TEXT NOT NULL,
                        escalation_level   INTEGER NOT NULL DEFAULT 0,
                        contact_attempts   INTEGER NOT NULL DEFAULT 0,
                        first_contacted_at TEXT,
                        last_contacted_at  TEXT,
                        escalated_at       TEXT,
                        completed_at       TEXT,
                        created_at         TEXT NOT NULL,
                        updated_at         TEXT NOT NULL,
                        version            INTEGER NOT NULL DEFAULT 0
                    );

                    CREATE INDEX IF NOT EXISTS idx_assignments_lead   ON assignments(lead_id);
                    CREATE INDEX IF NOT EXISTS idx_assignments_status ON assignments(status, response_deadline);

                    CREATE TABLE IF NOT EXISTS deals (
                        id                      TEXT PRIMARY KEY,
                        lead_id                 TEXT NOT NULL,
                        member_id               TEXT NOT NULL,
                        department              TEXT NOT NULL,
                        stage                   TEXT NOT NULL,
                        value                   REAL NOT NULL,
                        priority                TEXT NOT NULL,
                        stage_history           TEXT NOT NULL,
                        next_followup_at        TEXT,
                        status                  TEXT NOT NULL,
                        onboarding_triggered_at TEXT,
                        closed_at               TEXT,
                        created_at              TEXT NOT NULL,
                        updated_at              TEXT NOT NULL,
                        version                 INTEGER NOT NULL DEFAULT 0
                    );

                    CREATE INDEX IF NOT EXISTS idx_deals_lead ON deals(lead_id);

                    CREATE TABLE IF NOT EXISTS routing_counters (
                        department              TEXT NOT NULL,
                        routing_type            TEXT NOT NULL,
                        last_assigned_member_id TEXT,
                        assignment_count        INTEGER NOT NULL DEFAULT 0,
                        reset_at                TEXT,
                        updated_at              TEXT NOT NULL,
                        PRIMARY KEY (department, routing_type)
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn query_assignments(
        &self,
        filter: &'static str,
        arg: String,
    ) -> StoreResult<Vec<Assignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE {filter}");
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![arg])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_assignment(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl LeadStore for SqliteStore {
    // -----------------------------------------------------------------------
    // Team members
    // -----------------------------------------------------------------------

    async fn put_member(&self, member: &TeamMember) -> StoreResult<()> {
        let id = member.id.to_string();
        let name = member.name.clone();
        let email = member.email.clone();
        let department = enum_to_sql(&member.department)?;
        let role = enum_to_sql(&member.role)?;
        let territories = serde_json::to_string(&member.territories)?;
        let specializations = serde_json::to_string(&member.specializations)?;
        let is_active = member.is_active;
        let lead_cap = member.lead_cap;
        let current = member.current_lead_count;
        let last_assigned_at = member.last_assigned_at.as_ref().map(ts);
        let created_at = ts(&member.created_at);
        let updated_at = ts(&member.updated_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO team_members (id, name, email, department, role, territories,
                        specializations, is_active, lead_cap, current_lead_count,
                        last_assigned_at, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
                     ON CONFLICT(id) DO UPDATE SET
                        name=excluded.name, email=excluded.email,
                        department=excluded.department, role=excluded.role,
                        territories=excluded.territories,
                        specializations=excluded.specializations,
                        is_active=excluded.is_active, lead_cap=excluded.lead_cap,
                        current_lead_count=excluded.current_lead_count,
                        last_assigned_at=excluded.last_assigned_at,
                        updated_at=excluded.updated_at",
                    rusqlite::params![
                        id, name, email, department, role, territories, specializations,
                        is_active, lead_cap, current, last_assigned_at, created_at, updated_at,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_member(&self, id: Uuid) -> StoreResult<Option<TeamMember>> {
        let id_str = id.to_string();
        let member = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {MEMBER_COLUMNS} FROM team_members WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let member = stmt
                    .query_row(rusqlite::params![id_str], row_to_member)
                    .optional()?;
                Ok(member)
            })
            .await?;
        Ok(member)
    }

    async fn list_members(&self, department: Department) -> StoreResult<Vec<TeamMember>> {
        let department = enum_to_sql(&department)?;
        let members = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {MEMBER_COLUMNS} FROM team_members
                     WHERE department = ?1 ORDER BY created_at ASC, id ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![department])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_member(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(members)
    }

    async fn adjust_member_load(
        &self,
        id: Uuid,
        delta: i32,
        assigned_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<TeamMember>> {
        let id_str = id.to_string();
        let assigned_at = assigned_at.as_ref().map(ts);
        let now = ts(&now);
        let member = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let changed = tx.execute(
                    "UPDATE team_members
                     SET current_lead_count = MAX(0, current_lead_count + ?1),
                         last_assigned_at = COALESCE(?2, last_assigned_at),
                         updated_at = ?3
                     WHERE id = ?4",
                    rusqlite::params![delta, assigned_at, now, id_str],
                )?;
                let member = if changed == 0 {
                    None
                } else {
                    let sql = format!("SELECT {MEMBER_COLUMNS} FROM team_members WHERE id = ?1");
                    let mut stmt = tx.prepare(&sql)?;
                    let member = stmt
                        .query_row(rusqlite::params![id_str], row_to_member)
                        .optional()?;
                    member
                };
                tx.commit()?;
                Ok(member)
            })
            .await?;
        Ok(member)
    }

    // -----------------------------------------------------------------------
    // Leads
    // -----------------------------------------------------------------------

    async fn put_lead(&self, lead: &Lead) -> StoreResult<()> {
        let id = lead.id.to_string();
        let name = lead.name.clone();
        let source = enum_to_sql(&lead.source)?;
        let score = lead.lead_score;
        let phone = lead.phone.clone();
        let email = lead.email.clone();
        let interests = serde_json::to_string(&lead.interests)?;
        let created_at = ts(&lead.created_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO leads (id, name, source, lead_score, phone, email, interests, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                     ON CONFLICT(id) DO UPDATE SET
                        name=excluded.name, source=excluded.source,
                        lead_score=excluded.lead_score, phone=excluded.phone,
                        email=excluded.email, interests=excluded.interests",
                    rusqlite::params![id, name, source, score, phone, email, interests, created_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> StoreResult<Option<Lead>> {
        let id_str = id.to_string();
        let lead = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let lead = stmt
                    .query_row(rusqlite::params![id_str], row_to_lead)
                    .optional()?;
                Ok(lead)
            })
            .await?;
        Ok(lead)
    }

    // -----------------------------------------------------------------------
    // Assignments
    // -----------------------------------------------------------------------

    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        let row = AssignmentRow::from_assignment(assignment)?;
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "INSERT INTO assignments ({ASSIGNMENT_COLUMNS})
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"
                );
                conn.execute(
                    &sql,
                    rusqlite::params![
                        row.id,
                        row.lead_id,
                        row.member_id,
                        row.assigned_by,
                        row.reason,
                        row.priority,
                        row.status,
                        row.response_deadline,
                        row.escalation_level,
                        row.contact_attempts,
                        row.first_contacted_at,
                        row.last_contacted_at,
                        row.escalated_at,
                        row.completed_at,
                        row.created_at,
                        row.updated_at,
                        row.version,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> StoreResult<Option<Assignment>> {
        let mut found = self.query_assignments("id = ?1", id.to_string()).await?;
        Ok(found.pop())
    }

    async fn update_assignment(&self, assignment: &Assignment) -> StoreResult<Assignment> {
        let row = AssignmentRow::from_assignment(assignment)?;
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE assignments SET
                        member_id = ?2, assigned_by = ?3, reason = ?4, priority = ?5,
                        status = ?6, response_deadline = ?7, escalation_level = ?8,
                        contact_attempts = ?9, first_contacted_at = ?10,
                        last_contacted_at = ?11, escalated_at = ?12, completed_at = ?13,
                        updated_at = ?14, version = version + 1
                     WHERE id = ?1 AND version = ?15",
                    rusqlite::params![
                        row.id,
                        row.member_id,
                        row.assigned_by,
                        row.reason,
                        row.priority,
                        row.status,
                        row.response_deadline,
                        row.escalation_level,
                        row.contact_attempts,
                        row.first_contacted_at,
                        row.last_contacted_at,
                        row.escalated_at,
                        row.completed_at,
                        row.updated_at,
                        row.version,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(StoreError::Conflict {
                entity: "assignment",
                id: assignment.id,
            });
        }
        let mut updated = assignment.clone();
        updated.version += 1;
        Ok(updated)
    }

    async fn list_assignments_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Assignment>> {
        self.query_assignments(
            "lead_id = ?1 ORDER BY created_at ASC, rowid ASC",
            lead_id.to_string(),
        )
        .await
    }

    async fn list_assignments_by_status(
        &self,
        status: AssignmentStatus,
    ) -> StoreResult<Vec<Assignment>> {
        self.query_assignments(
            "status = ?1 ORDER BY response_deadline ASC",
            enum_to_sql(&status)?,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Deals
    // -----------------------------------------------------------------------

    async fn insert_deal(&self, deal: &Deal) -> StoreResult<()> {
        let row = DealRow::from_deal(deal)?;
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "INSERT INTO deals ({DEAL_COLUMNS})
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)"
                );
                conn.execute(
                    &sql,
                    rusqlite::params![
                        row.id,
                        row.lead_id,
                        row.member_id,
                        row.department,
                        row.stage,
                        row.value,
                        row.priority,
                        row.stage_history,
                        row.next_followup_at,
                        row.status,
                        row.onboarding_triggered_at,
                        row.closed_at,
                        row.created_at,
                        row.updated_at,
                        row.version,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_deal(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        let id_str = id.to_string();
        let deal = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let deal = stmt
                    .query_row(rusqlite::params![id_str], row_to_deal)
                    .optional()?;
                Ok(deal)
            })
            .await?;
        Ok(deal)
    }

    async fn update_deal(&self, deal: &Deal) -> StoreResult<Deal> {
        let row = DealRow::from_deal(deal)?;
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE deals SET
                        member_id = ?2, stage = ?3, value = ?4, priority = ?5,
                        stage_history = ?6, next_followup_at = ?7, status = ?8,
                        onboarding_triggered_at = ?9, closed_at = ?10, updated_at = ?11,
                        version = version + 1
                     WHERE id = ?1 AND version = ?12",
                    rusqlite::params![
                        row.id,
                        row.member_id,
                        row.stage,
                        row.value,
                        row.priority,
                        row.stage_history,
                        row.next_followup_at,
                        row.status,
                        row.onboarding_triggered_at,
                        row.closed_at,
                        row.updated_at,
                        row.version,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(StoreError::Conflict {
                entity: "deal",
                id: deal.id,
            });
        }
        let mut updated = deal.clone();
        updated.version += 1;
        Ok(updated)
    }

    async fn list_deals_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Deal>> {
        let lead_id = lead_id.to_string();
        let deals = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {DEAL_COLUMNS} FROM deals WHERE lead_id = ?1 ORDER BY created_at ASC, rowid ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![lead_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_deal(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(deals)
    }

    // -----------------------------------------------------------------------
    // Routing counters
    // -----------------------------------------------------------------------

    async fn get_counter(&self, key: CounterKey) -> StoreResult<Option<RoutingCounter>> {
        let department = enum_to_sql(&key.department)?;
        let routing_type = enum_to_sql(&key.routing_type)?;
        let counter = self
            .conn
            .call(move |conn| {
                let counter = conn
                    .query_row(
                        "SELECT department, routing_type, last_assigned_member_id,
                                assignment_count, reset_at, updated_at
                         FROM routing_counters WHERE department = ?1 AND routing_type = ?2",
                        rusqlite::params![department, routing_type],
                        row_to_counter,
                    )
                    .optional()?;
                Ok(counter)
            })
            .await?;
        Ok(counter)
    }

    async fn advance_rotation(
        &self,
        key: CounterKey,
        candidates: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let department = enum_to_sql(&key.department)?;
        let routing_type = enum_to_sql(&key.routing_type)?;
        let candidates = candidates.to_vec();
        let now = ts(&now);

        let selected = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let pointer: Option<String> = tx
                    .query_row(
                        "SELECT last_assigned_member_id FROM routing_counters
                         WHERE department = ?1 AND routing_type = ?2",
                        rusqlite::params![department, routing_type],
                        |r| r.get::<_, Option<String>>(0),
                    )
                    .optional()?
                    .flatten();
                let pointer = pointer.and_then(|raw| Uuid::parse_str(&raw).ok());

                let selected = rotation::next_after(&candidates, pointer);
                if let Some(id) = selected {
                    tx.execute(
                        "INSERT INTO routing_counters (department, routing_type,
                            last_assigned_member_id, assignment_count, reset_at, updated_at)
                         VALUES (?1, ?2, ?3, 1, NULL, ?4)
                         ON CONFLICT(department, routing_type) DO UPDATE SET
                            last_assigned_member_id = excluded.last_assigned_member_id,
                            assignment_count = assignment_count + 1,
                            updated_at = excluded.updated_at",
                        rusqlite::params![department, routing_type, id.to_string(), now],
                    )?;
                }
                tx.commit()?;
                Ok(selected)
            })
            .await?;
        Ok(selected)
    }

    async fn reset_counter(&self, key: CounterKey, now: DateTime<Utc>) -> StoreResult<()> {
        let department = enum_to_sql(&key.department)?;
        let routing_type = enum_to_sql(&key.routing_type)?;
        let now = ts(&now);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO routing_counters (department, routing_type,
                        last_assigned_member_id, assignment_count, reset_at, updated_at)
                     VALUES (?1, ?2, NULL, 0, ?3, ?3)
                     ON CONFLICT(department, routing_type) DO UPDATE SET
                        last_assigned_member_id = NULL, assignment_count = 0,
                        reset_at = excluded.reset_at, updated_at = excluded.updated_at",
                    rusqlite::params![department, routing_type, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Owned column values, ready to move into a `call` closure
// ---------------------------------------------------------------------------

struct AssignmentRow {
    id: String,
    lead_id: String,
    member_id: String,
    assigned_by: Option<String>,
    reason: String,
    priority: String,
    status: String,
    response_deadline: String,
    escalation_level: u8,
    contact_attempts: u32,
    first_contacted_at: Option<String>,
    last_contacted_at: Option<String>,
    escalated_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl AssignmentRow {
    fn from_assignment(a: &Assignment) -> StoreResult<Self> {
        Ok(Self {
            id: a.id.to_string(),
            lead_id: a.lead_id.to_string(),
            member_id: a.member_id.to_string(),
            assigned_by: a.assigned_by.map(|u| u.to_string()),
            reason: enum_to_sql(&a.reason)?,
            priority: enum_to_sql(&a.priority)?,
            status: enum_to_sql(&a.status)?,
            response_deadline: ts(&a.response_deadline),
            escalation_level: a.escalation_level,
            contact_attempts: a.contact_attempts,
            first_contacted_at: a.first_contacted_at.as_ref().map(ts),
            last_contacted_at: a.last_contacted_at.as_ref().map(ts),
            escalated_at: a.escalated_at.as_ref().map(ts),
            completed_at: a.completed_at.as_ref().map(ts),
            created_at: ts(&a.created_at),
            updated_at: ts(&a.updated_at),
            version: a.version as i64,
        })
    }
}

struct DealRow {
    id: String,
    lead_id: String,
    member_id: String,
    department: String,
    stage: String,
    value: f64,
    priority: String,
    stage_history: String,
    next_followup_at: Option<String>,
    status: String,
    onboarding_triggered_at: Option<String>,
    closed_at: Option<String>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl DealRow {
    fn from_deal(d: &Deal) -> StoreResult<Self> {
        Ok(Self {
            id: d.id.to_string(),
            lead_id: d.lead_id.to_string(),
            member_id: d.member_id.to_string(),
            department: enum_to_sql(&d.department)?,
            stage: enum_to_sql(&d.stage)?,
            value: d.value,
            priority: enum_to_sql(&d.priority)?,
            stage_history: serde_json::to_string(&d.stage_history)?,
            next_followup_at: d.next_followup_at.as_ref().map(ts),
            status: enum_to_sql(&d.status)?,
            onboarding_triggered_at: d.onboarding_triggered_at.as_ref().map(ts),
            closed_at: d.closed_at.as_ref().map(ts),
            created_at: ts(&d.created_at),
            updated_at: ts(&d.updated_at),
            version: d.version as i64,
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamMember> {
    Ok(TeamMember {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        department: enum_at(row, 3)?,
        role: enum_at(row, 4)?,
        territories: json_at(row, 5)?,
        specializations: json_at(row, 6)?,
        is_active: row.get(7)?,
        lead_cap: row.get(8)?,
        current_lead_count: row.get(9)?,
        last_assigned_at: opt_ts_at(row, 10)?,
        created_at: ts_at(row, 11)?,
        updated_at: ts_at(row, 12)?,
    })
}

fn row_to_lead(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        source: enum_at(row, 2)?,
        lead_score: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        interests: json_at(row, 6)?,
        created_at: ts_at(row, 7)?,
    })
}

fn row_to_assignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Assignment> {
    let version: i64 = row.get(16)?;
    Ok(Assignment {
        id: uuid_at(row, 0)?,
        lead_id: uuid_at(row, 1)?,
        member_id: uuid_at(row, 2)?,
        assigned_by: opt_uuid_at(row, 3)?,
        reason: enum_at(row, 4)?,
        priority: enum_at(row, 5)?,
        status: enum_at(row, 6)?,
        response_deadline: ts_at(row, 7)?,
        escalation_level: row.get(8)?,
        contact_attempts: row.get(9)?,
        first_contacted_at: opt_ts_at(row, 10)?,
        last_contacted_at: opt_ts_at(row, 11)?,
        escalated_at: opt_ts_at(row, 12)?,
        completed_at: opt_ts_at(row, 13)?,
        created_at: ts_at(row, 14)?,
        updated_at: ts_at(row, 15)?,
        version: version.max(0) as u64,
    })
}

fn row_to_deal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Deal> {
    let version: i64 = row.get(14)?;
    Ok(Deal {
        id: uuid_at(row, 0)?,
        lead_id: uuid_at(row, 1)?,
        member_id: uuid_at(row, 2)?,
        department: enum_at(row, 3)?,
        stage: enum_at(row, 4)?,
        value: row.get(5)?,
        priority: enum_at(row, 6)?,
        stage_history: json_at(row, 7)?,
        next_followup_at: opt_ts_at(row, 8)?,
        status: enum_at(row, 9)?,
        onboarding_triggered_at: opt_ts_at(row, 10)?,
        closed_at: opt_ts_at(row, 11)?,
        created_at: ts_at(row, 12)?,
        updated_at: ts_at(row, 13)?,
        version: version.max(0) as u64,
    })
}

fn row_to_counter(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoutingCounter> {
    let count: i64 = row.get(3)?;
    Ok(RoutingCounter {
        department: enum_at(row, 0)?,
        routing_type: enum_at(row, 1)?,
        last_assigned_member_id: opt_uuid_at(row, 2)?,
        assignment_count: count.max(0) as u64,
        reset_at: opt_ts_at(row, 4)?,
        updated_at: ts_at(row, 5)?,
    })
}
