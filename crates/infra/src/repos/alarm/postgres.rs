use super::{AlarmMutator, IAlarmRepo};
use crate::store::StoreError;
use chime_scheduler_domain::{Alarm, AlarmStatus, RecurrenceRule, ID};
use chrono_tz::Tz;
use sqlx::{
    types::{Json, Uuid},
    FromRow, PgPool,
};
use tracing::error;

pub struct PostgresAlarmRepo {
    pool: PgPool,
}

impl PostgresAlarmRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AlarmRaw {
    alarm_uid: Uuid,
    owner_id: String,
    channel_id: Option<String>,
    message: String,
    scheduled_ts: i64,
    timezone: String,
    recurrence: Option<Json<RecurrenceRule>>,
    status: String,
    created: i64,
    updated: i64,
    claimed_at: Option<i64>,
    fire_count: i64,
    last_error: Option<String>,
}

impl TryFrom<AlarmRaw> for Alarm {
    type Error = anyhow::Error;

    fn try_from(raw: AlarmRaw) -> anyhow::Result<Self> {
        let timezone = raw
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Stored timezone {} is invalid: {}", raw.timezone, e))?;
        Ok(Self {
            id: raw.alarm_uid.into(),
            owner_id: raw.owner_id,
            channel_id: raw.channel_id,
            message: raw.message,
            scheduled_ts: raw.scheduled_ts,
            timezone,
            recurrence: raw.recurrence.map(|r| r.0),
            status: raw.status.parse::<AlarmStatus>()?,
            created: raw.created,
            updated: raw.updated,
            claimed_at: raw.claimed_at,
            fire_count: raw.fire_count,
            last_error: raw.last_error,
        })
    }
}

fn into_alarms(rows: Vec<AlarmRaw>) -> anyhow::Result<Vec<Alarm>> {
    rows.into_iter().map(Alarm::try_from).collect()
}

#[async_trait::async_trait]
impl IAlarmRepo for PostgresAlarmRepo {
    async fn insert(&self, alarm: &Alarm) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alarms
            (alarm_uid, owner_id, channel_id, message, scheduled_ts, timezone, recurrence,
             status, created, updated, claimed_at, fire_count, last_error)
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(*alarm.id.inner_ref())
        .bind(&alarm.owner_id)
        .bind(&alarm.channel_id)
        .bind(&alarm.message)
        .bind(alarm.scheduled_ts)
        .bind(alarm.timezone.name())
        .bind(alarm.recurrence.as_ref().map(Json))
        .bind(alarm.status.as_str())
        .bind(alarm.created)
        .bind(alarm.updated)
        .bind(alarm.claimed_at)
        .bind(alarm.fire_count)
        .bind(&alarm.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to insert alarm: {:?}. DB returned error: {:?}",
                alarm, e
            );
            e
        })?;
        Ok(())
    }

    async fn find(&self, alarm_id: &ID) -> anyhow::Result<Option<Alarm>> {
        let raw: Option<AlarmRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarms
            WHERE alarm_uid = $1
            "#,
        )
        .bind(*alarm_id.inner_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find alarm with id: {:?} failed. DB returned error: {:?}",
                alarm_id, e
            );
            e
        })?;
        raw.map(Alarm::try_from).transpose()
    }

    async fn find_due(&self, as_of: i64) -> anyhow::Result<Vec<Alarm>> {
        let rows: Vec<AlarmRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarms
            WHERE status = $1 AND scheduled_ts <= $2
            ORDER BY scheduled_ts ASC, alarm_uid ASC
            "#,
        )
        .bind(AlarmStatus::Pending.as_str())
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        into_alarms(rows)
    }

    async fn find_by_owner(&self, owner_id: &str, include_finished: bool) -> anyhow::Result<Vec<Alarm>> {
        let rows: Vec<AlarmRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarms
            WHERE owner_id = $1 AND ($2 OR status = ANY($3))
            ORDER BY scheduled_ts ASC, alarm_uid ASC
            "#,
        )
        .bind(owner_id)
        .bind(include_finished)
        .bind(vec![
            AlarmStatus::Pending.to_string(),
            AlarmStatus::Firing.to_string(),
        ])
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find alarms of owner: {} failed. DB returned error: {:?}",
                owner_id, e
            );
            e
        })?;
        into_alarms(rows)
    }

    async fn find_stale_claims(&self, claimed_before: i64) -> anyhow::Result<Vec<Alarm>> {
        let rows: Vec<AlarmRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarms
            WHERE status = $1 AND (claimed_at IS NULL OR claimed_at <= $2)
            "#,
        )
        .bind(AlarmStatus::Firing.as_str())
        .bind(claimed_before)
        .fetch_all(&self.pool)
        .await?;
        into_alarms(rows)
    }

    async fn update_with(&self, alarm_id: &ID, mutator: &AlarmMutator<'_>) -> Result<Alarm, StoreError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        let raw: Option<AlarmRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarms
            WHERE alarm_uid = $1
            FOR UPDATE
            "#,
        )
        .bind(*alarm_id.inner_ref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        let mut alarm = match raw {
            Some(raw) => Alarm::try_from(raw)?,
            None => return Err(StoreError::NotFound(alarm_id.clone())),
        };
        mutator(&mut alarm)?;

        sqlx::query(
            r#"
            UPDATE alarms
            SET owner_id = $2,
            channel_id = $3,
            message = $4,
            scheduled_ts = $5,
            timezone = $6,
            recurrence = $7,
            status = $8,
            updated = $9,
            claimed_at = $10,
            fire_count = $11,
            last_error = $12
            WHERE alarm_uid = $1
            "#,
        )
        .bind(*alarm.id.inner_ref())
        .bind(&alarm.owner_id)
        .bind(&alarm.channel_id)
        .bind(&alarm.message)
        .bind(alarm.scheduled_ts)
        .bind(alarm.timezone.name())
        .bind(alarm.recurrence.as_ref().map(Json))
        .bind(alarm.status.as_str())
        .bind(alarm.updated)
        .bind(alarm.claimed_at)
        .bind(alarm.fire_count)
        .bind(&alarm.last_error)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(
                "Unable to save alarm: {:?}. DB returned error: {:?}",
                alarm, e
            );
            anyhow::Error::from(e)
        })?;

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(alarm)
    }

    async fn delete(&self, alarm_id: &ID) -> anyhow::Result<Option<Alarm>> {
        let raw: Option<AlarmRaw> = sqlx::query_as(
            r#"
            DELETE FROM alarms
            WHERE alarm_uid = $1
            RETURNING *
            "#,
        )
        .bind(*alarm_id.inner_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Delete alarm with id: {:?} failed. DB returned error: {:?}",
                alarm_id, e
            );
            e
        })?;
        raw.map(Alarm::try_from).transpose()
    }
}
