use super::{AlarmMutator, IAlarmRepo};
use crate::repos::shared::inmemory_repo::*;
use crate::store::StoreError;
use chime_scheduler_domain::{Alarm, AlarmStatus, ID};

pub struct InMemoryAlarmRepo {
    alarms: std::sync::Mutex<Vec<Alarm>>,
}

impl InMemoryAlarmRepo {
    pub fn new() -> Self {
        Self {
            alarms: std::sync::Mutex::new(Vec::new()),
        }
    }
}

fn sort_by_schedule(alarms: &mut [Alarm]) {
    alarms.sort_by(|a, b| {
        a.scheduled_ts
            .cmp(&b.scheduled_ts)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait::async_trait]
impl IAlarmRepo for InMemoryAlarmRepo {
    async fn insert(&self, alarm: &Alarm) -> anyhow::Result<()> {
        insert(alarm, &self.alarms);
        Ok(())
    }

    async fn find(&self, alarm_id: &ID) -> anyhow::Result<Option<Alarm>> {
        Ok(find(alarm_id, &self.alarms))
    }

    async fn find_due(&self, as_of: i64) -> anyhow::Result<Vec<Alarm>> {
        let mut due = find_by(&self.alarms, |a| a.is_due(as_of));
        sort_by_schedule(&mut due);
        Ok(due)
    }

    async fn find_by_owner(&self, owner_id: &str, include_finished: bool) -> anyhow::Result<Vec<Alarm>> {
        let mut alarms = find_by(&self.alarms, |a| {
            a.owner_id == owner_id && (include_finished || !a.status.is_finished())
        });
        sort_by_schedule(&mut alarms);
        Ok(alarms)
    }

    async fn find_stale_claims(&self, claimed_before: i64) -> anyhow::Result<Vec<Alarm>> {
        Ok(find_by(&self.alarms, |a| {
            a.status == AlarmStatus::Firing && a.claimed_at.map_or(true, |ts| ts <= claimed_before)
        }))
    }

    async fn update_with(&self, alarm_id: &ID, mutator: &AlarmMutator<'_>) -> Result<Alarm, StoreError> {
        update_with(alarm_id, &self.alarms, mutator)
            .unwrap_or_else(|| Err(StoreError::NotFound(alarm_id.clone())))
    }

    async fn delete(&self, alarm_id: &ID) -> anyhow::Result<Option<Alarm>> {
        Ok(delete(alarm_id, &self.alarms))
    }
}
