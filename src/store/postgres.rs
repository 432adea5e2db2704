use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{DialerStore, StoreError};
use crate::config::DatabaseConfig;
use crate::dialer::model::{
    Agent, AgentStatus, AnsweredBy, Call, CallStatus, Contact, ContactStatus, Disposition,
    QueuedCall,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contacts (
    id              UUID PRIMARY KEY,
    campaign_id     TEXT,
    name            TEXT NOT NULL,
    phone           TEXT NOT NULL,
    status          TEXT NOT NULL,
    attempts        INTEGER NOT NULL DEFAULT 0,
    last_called_at  TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS contacts_pending_idx ON contacts (created_at) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS agents (
    id                TEXT PRIMARY KEY,
    identity          TEXT NOT NULL,
    name              TEXT,
    status            TEXT NOT NULL,
    current_call_sid  TEXT,
    updated_at        TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS calls (
    sid            TEXT PRIMARY KEY,
    contact_id     UUID NOT NULL REFERENCES contacts (id),
    agent_id       TEXT,
    status         TEXT NOT NULL,
    status_rank    SMALLINT NOT NULL,
    answered_by    TEXT,
    disposition    TEXT NOT NULL,
    duration_secs  INTEGER,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
    ended_at       TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS call_queue (
    position     BIGSERIAL PRIMARY KEY,
    call_sid     TEXT NOT NULL UNIQUE,
    enqueued_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

/// Creates the connection pool and applies the schema.
pub async fn connect(config: &DatabaseConfig) -> Result<PgStore, StoreError> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    let store = PgStore::with_pool(pool).await?;
    tracing::info!("PostgreSQL connection pool established");
    Ok(store)
}

/// Store backed by PostgreSQL. Claims use `FOR UPDATE SKIP LOCKED` so
/// concurrent webhook handlers never hand out the same row twice.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn with_pool(pool: PgPool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[derive(FromRow)]
struct ContactRow {
    id: Uuid,
    campaign_id: Option<String>,
    name: String,
    phone: String,
    status: String,
    attempts: i32,
    last_called_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContactRow> for Contact {
    type Error = StoreError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        Ok(Contact {
            id: row.id,
            campaign_id: row.campaign_id,
            name: row.name,
            phone: row.phone,
            status: decode(ContactStatus::parse(&row.status), "contact status", &row.status)?,
            attempts: row.attempts,
            last_called_at: row.last_called_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AgentRow {
    id: String,
    identity: String,
    name: Option<String>,
    status: String,
    current_call_sid: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = StoreError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Agent {
            status: decode(AgentStatus::parse(&row.status), "agent status", &row.status)?,
            id: row.id,
            identity: row.identity,
            name: row.name,
            current_call_sid: row.current_call_sid,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CallRow {
    sid: String,
    contact_id: Uuid,
    agent_id: Option<String>,
    status: String,
    answered_by: Option<String>,
    disposition: String,
    duration_secs: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<CallRow> for Call {
    type Error = StoreError;

    fn try_from(row: CallRow) -> Result<Self, Self::Error> {
        let answered_by = match row.answered_by.as_deref() {
            Some(s) => Some(decode(AnsweredBy::parse(s), "answered_by", s)?),
            None => None,
        };
        Ok(Call {
            status: decode(CallStatus::parse(&row.status), "call status", &row.status)?,
            disposition: decode(
                Disposition::parse(&row.disposition),
                "disposition",
                &row.disposition,
            )?,
            answered_by,
            sid: row.sid,
            contact_id: row.contact_id,
            agent_id: row.agent_id,
            duration_secs: row.duration_secs,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ended_at: row.ended_at,
        })
    }
}

#[derive(FromRow)]
struct QueueRow {
    call_sid: String,
    enqueued_at: DateTime<Utc>,
}

impl From<QueueRow> for QueuedCall {
    fn from(row: QueueRow) -> Self {
        QueuedCall {
            call_sid: row.call_sid,
            enqueued_at: row.enqueued_at,
        }
    }
}

fn decode<T>(value: Option<T>, what: &str, raw: &str) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::Corrupt(format!("unknown {what} '{raw}'")))
}

const CALL_COLUMNS: &str = "sid, contact_id, agent_id, status, answered_by, disposition, \
                            duration_secs, created_at, updated_at, ended_at";

#[async_trait]
impl DialerStore for PgStore {
    async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contacts
                (id, campaign_id, name, phone, status, attempts, last_called_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(contact.id)
        .bind(&contact.campaign_id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(contact.status.as_str())
        .bind(contact.attempts)
        .bind(contact.last_called_at)
        .bind(contact.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>, StoreError> {
        sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Contact::try_from)
            .transpose()
    }

    async fn claim_pending_contacts(
        &self,
        campaign_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            UPDATE contacts
            SET status = 'dialing', attempts = attempts + 1, last_called_at = now()
            WHERE id IN (
                SELECT id FROM contacts
                WHERE status = 'pending' AND ($1::TEXT IS NULL OR campaign_id = $1)
                ORDER BY created_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(campaign_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut contacts = rows
            .into_iter()
            .map(Contact::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        contacts.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(contacts)
    }

    async fn set_contact_status(
        &self,
        id: Uuid,
        status: ContactStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE contacts SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_call(&self, call: &Call) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO calls
                (sid, contact_id, agent_id, status, status_rank, answered_by, disposition,
                 duration_secs, created_at, updated_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&call.sid)
        .bind(call.contact_id)
        .bind(&call.agent_id)
        .bind(call.status.as_str())
        .bind(call.status.rank())
        .bind(call.answered_by.map(|a| a.as_str()))
        .bind(call.disposition.as_str())
        .bind(call.duration_secs)
        .bind(call.created_at)
        .bind(call.updated_at)
        .bind(call.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_call(&self, sid: &str) -> Result<Option<Call>, StoreError> {
        sqlx::query_as::<_, CallRow>(&format!("SELECT {CALL_COLUMNS} FROM calls WHERE sid = $1"))
            .bind(sid)
            .fetch_optional(&self.pool)
            .await?
            .map(Call::try_from)
            .transpose()
    }

    async fn advance_call_status(
        &self,
        sid: &str,
        status: CallStatus,
        duration_secs: Option<i32>,
    ) -> Result<Option<Call>, StoreError> {
        sqlx::query_as::<_, CallRow>(&format!(
            r#"
            UPDATE calls
            SET status = $2,
                status_rank = $3,
                duration_secs = COALESCE($4, duration_secs),
                updated_at = now(),
                ended_at = CASE WHEN $5 THEN now() ELSE ended_at END
            WHERE sid = $1 AND status_rank < $3
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(sid)
        .bind(status.as_str())
        .bind(status.rank())
        .bind(duration_secs)
        .bind(status.is_terminal())
        .fetch_optional(&self.pool)
        .await?
        .map(Call::try_from)
        .transpose()
    }

    async fn settle_answer(
        &self,
        sid: &str,
        answered_by: AnsweredBy,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError> {
        sqlx::query_as::<_, CallRow>(&format!(
            r#"
            UPDATE calls
            SET answered_by = $2,
                disposition = $3,
                agent_id = $4,
                updated_at = now()
            WHERE sid = $1 AND disposition = 'pending' AND status_rank < $5
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(sid)
        .bind(answered_by.as_str())
        .bind(disposition.as_str())
        .bind(agent_id)
        .bind(CallStatus::Completed.rank())
        .fetch_optional(&self.pool)
        .await?
        .map(Call::try_from)
        .transpose()
    }

    async fn record_disposition(
        &self,
        sid: &str,
        answered_by: Option<AnsweredBy>,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError> {
        sqlx::query_as::<_, CallRow>(&format!(
            r#"
            UPDATE calls
            SET answered_by = COALESCE($2, answered_by),
                disposition = $3,
                agent_id = COALESCE($4, agent_id),
                updated_at = now()
            WHERE sid = $1
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(sid)
        .bind(answered_by.map(|a| a.as_str()))
        .bind(disposition.as_str())
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Call::try_from)
        .transpose()
    }

    async fn set_agent_presence(
        &self,
        id: &str,
        identity: &str,
        name: Option<&str>,
        status: AgentStatus,
    ) -> Result<Option<Agent>, StoreError> {
        sqlx::query_as::<_, AgentRow>(
            r#"
            INSERT INTO agents (id, identity, name, status, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (id) DO UPDATE
            SET identity = EXCLUDED.identity,
                name = COALESCE(EXCLUDED.name, agents.name),
                status = EXCLUDED.status,
                updated_at = now()
            WHERE agents.current_call_sid IS NULL OR EXCLUDED.status = 'busy'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(identity)
        .bind(name)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Agent::try_from)
        .transpose()
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Agent::try_from)
            .transpose()
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        sqlx::query_as::<_, AgentRow>("SELECT * FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Agent::try_from)
            .collect()
    }

    async fn count_available_agents(&self) -> Result<usize, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE status = 'available'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as usize)
    }

    async fn claim_available_agent(&self, call_sid: &str) -> Result<Option<Agent>, StoreError> {
        sqlx::query_as::<_, AgentRow>(
            r#"
            UPDATE agents
            SET status = 'busy', current_call_sid = $1, updated_at = now()
            WHERE id = (
                SELECT id FROM agents
                WHERE status = 'available'
                ORDER BY updated_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(call_sid)
        .fetch_optional(&self.pool)
        .await?
        .map(Agent::try_from)
        .transpose()
    }

    async fn release_agent(&self, agent_id: &str, call_sid: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE agents
            SET status = 'available', current_call_sid = NULL, updated_at = now()
            WHERE id = $1 AND current_call_sid = $2
            "#,
        )
        .bind(agent_id)
        .bind(call_sid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn enqueue_call(&self, call_sid: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO call_queue (call_sid) VALUES ($1) ON CONFLICT (call_sid) DO NOTHING")
            .bind(call_sid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn requeue_front(&self, entry: &QueuedCall) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO call_queue (position, call_sid, enqueued_at)
            VALUES ((SELECT COALESCE(MIN(position), 1) - 1 FROM call_queue), $1, $2)
            ON CONFLICT (call_sid) DO NOTHING
            "#,
        )
        .bind(&entry.call_sid)
        .bind(entry.enqueued_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dequeue_call(&self) -> Result<Option<QueuedCall>, StoreError> {
        Ok(sqlx::query_as::<_, QueueRow>(
            r#"
            DELETE FROM call_queue
            WHERE position = (
                SELECT position FROM call_queue
                ORDER BY position
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING call_sid, enqueued_at
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .map(QueuedCall::from))
    }

    async fn remove_queued(&self, call_sid: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM call_queue WHERE call_sid = $1")
            .bind(call_sid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_queue(&self) -> Result<Vec<QueuedCall>, StoreError> {
        Ok(sqlx::query_as::<_, QueueRow>(
            "SELECT call_sid, enqueued_at FROM call_queue ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(QueuedCall::from)
        .collect())
    }
}
