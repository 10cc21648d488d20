use crate::repos::{AlarmMutator, IAlarmRepo};
use crate::system::ISys;
use chime_scheduler_domain::{
    Alarm, AlarmStateError, AlarmStatus, AlarmValidationError, FireOutcome, ID,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Alarm with id: {0} was not found")]
    NotFound(ID),
    #[error("Invalid alarm: {0}")]
    Validation(#[from] AlarmValidationError),
    #[error("Conflict: {0}")]
    Conflict(#[from] AlarmStateError),
    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Owns the durable state of every `Alarm`. All mutations go through
/// atomic read-modify-writes of the underlying repository, which is what
/// serializes concurrent writers of the same alarm.
#[derive(Clone)]
pub struct AlarmStore {
    repo: Arc<dyn IAlarmRepo>,
    sys: Arc<dyn ISys>,
}

impl AlarmStore {
    pub fn new(repo: Arc<dyn IAlarmRepo>, sys: Arc<dyn ISys>) -> Self {
        Self { repo, sys }
    }

    pub async fn create(&self, alarm: Alarm) -> Result<Alarm, StoreError> {
        alarm.validate_new(self.sys.get_timestamp_millis())?;
        self.repo.insert(&alarm).await?;
        Ok(alarm)
    }

    pub async fn get(&self, alarm_id: &ID) -> Result<Alarm, StoreError> {
        self.repo
            .find(alarm_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(alarm_id.clone()))
    }

    /// Applies `mutator` atomically. Reactivating a cancelled alarm is
    /// rejected whatever the mutator does.
    pub async fn update(&self, alarm_id: &ID, mutator: &AlarmMutator<'_>) -> Result<Alarm, StoreError> {
        let now = self.sys.get_timestamp_millis();
        self.repo
            .update_with(alarm_id, &|alarm: &mut Alarm| {
                let before = alarm.status;
                mutator(alarm)?;
                Alarm::check_transition(before, alarm.status)?;
                alarm.validate_fields()?;
                alarm.updated = now;
                Ok(())
            })
            .await
    }

    /// Pending alarms with `scheduled_ts <= as_of`, earliest first
    pub async fn list_due(&self, as_of: i64) -> Result<Vec<Alarm>, StoreError> {
        Ok(self.repo.find_due(as_of).await?)
    }

    pub async fn find_by_owner(&self, owner_id: &str, include_past: bool) -> Result<Vec<Alarm>, StoreError> {
        Ok(self.repo.find_by_owner(owner_id, include_past).await?)
    }

    /// Cancelling an already cancelled alarm returns it unchanged
    pub async fn cancel(&self, alarm_id: &ID) -> Result<Alarm, StoreError> {
        let now = self.sys.get_timestamp_millis();
        self.repo
            .update_with(alarm_id, &|alarm: &mut Alarm| {
                alarm.cancel(now)?;
                Ok(())
            })
            .await
    }

    /// Exactly one caller wins the claim of an occurrence, every other
    /// caller gets a `Conflict`.
    pub async fn claim(&self, alarm_id: &ID, occurrence_ts: i64) -> Result<Alarm, StoreError> {
        let now = self.sys.get_timestamp_millis();
        self.repo
            .update_with(alarm_id, &|alarm: &mut Alarm| {
                alarm.claim(occurrence_ts, now)?;
                Ok(())
            })
            .await
    }

    /// Finishes the occurrence held by `claimed`, the alarm returned from
    /// `claim`. Fails with a `Conflict` if the claim was released and taken
    /// by another worker since.
    pub async fn complete(&self, claimed: &Alarm, outcome: FireOutcome) -> Result<Alarm, StoreError> {
        let claimed_at = claimed
            .claimed_at
            .ok_or(AlarmStateError::NotFiring(claimed.status))?;
        let now = self.sys.get_timestamp_millis();
        self.repo
            .update_with(&claimed.id, &|alarm: &mut Alarm| {
                alarm.complete(claimed_at, outcome.clone(), now)?;
                Ok(())
            })
            .await
    }

    /// Owner cleanup, only alarms that will never fire again can be deleted
    pub async fn delete(&self, alarm_id: &ID) -> Result<Alarm, StoreError> {
        let alarm = self.get(alarm_id).await?;
        if !alarm.status.is_finished() {
            return Err(AlarmStateError::NotFinished(alarm.status).into());
        }
        self.repo
            .delete(alarm_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(alarm_id.clone()))
    }

    /// Makes alarms that have been `Firing` since `claimed_before` pending
    /// again so that their occurrence is delivered by a later pass.
    pub async fn release_stale_claims(&self, claimed_before: i64) -> Result<Vec<Alarm>, StoreError> {
        let now = self.sys.get_timestamp_millis();
        let stale = self.repo.find_stale_claims(claimed_before).await?;
        let mut released = Vec::with_capacity(stale.len());
        for alarm in stale {
            let res = self
                .repo
                .update_with(&alarm.id, &|alarm: &mut Alarm| {
                    let is_stale = alarm.status == AlarmStatus::Firing
                        && alarm.claimed_at.map_or(true, |ts| ts <= claimed_before);
                    if !is_stale {
                        return Err(AlarmStateError::NotFiring(alarm.status).into());
                    }
                    alarm.release_claim(now);
                    Ok(())
                })
                .await;
            match res {
                Ok(alarm) => {
                    warn!("Released stale claim of alarm: {}", alarm.id);
                    released.push(alarm);
                }
                // Completed or released by someone else in the meantime
                Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::repos::Repos;
    use crate::system::ManualSys;
    use chime_scheduler_domain::{NewAlarm, RecurrenceRule};
    use chrono_tz::UTC;

    const NOW: i64 = 1_000_000;

    fn setup() -> (AlarmStore, Arc<ManualSys>) {
        let sys = Arc::new(ManualSys::new(NOW));
        let store = AlarmStore::new(Repos::create_inmemory().alarm_repo, sys.clone());
        (store, sys)
    }

    fn new_alarm(scheduled_ts: i64, recurrence: Option<RecurrenceRule>) -> Alarm {
        Alarm::new(
            NewAlarm {
                owner_id: "alice".into(),
                channel_id: None,
                message: "Call mom".into(),
                scheduled_ts: Some(scheduled_ts),
                timezone: UTC,
                recurrence,
            },
            NOW,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_past_one_off_alarm() {
        let (store, _) = setup();
        let res = store.create(new_alarm(NOW - 1, None)).await;
        assert!(matches!(
            res,
            Err(StoreError::Validation(AlarmValidationError::InThePast { .. }))
        ));
        assert!(store.create(new_alarm(NOW + 1, None)).await.is_ok());
    }

    #[tokio::test]
    async fn get_unknown_alarm() {
        let (store, _) = setup();
        assert!(matches!(
            store.get(&ID::new()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (store, _) = setup();
        let alarm = store.create(new_alarm(NOW + 10, None)).await.unwrap();
        let first = store.cancel(&alarm.id).await.unwrap();
        assert_eq!(first.status, AlarmStatus::Cancelled);
        let second = store.cancel(&alarm.id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cancel_loses_against_claim() {
        let (store, _) = setup();
        let alarm = store.create(new_alarm(NOW, None)).await.unwrap();
        store.claim(&alarm.id, alarm.scheduled_ts).await.unwrap();
        assert!(matches!(
            store.cancel(&alarm.id).await,
            Err(StoreError::Conflict(AlarmStateError::InFlight))
        ));
    }

    #[tokio::test]
    async fn cancelled_alarm_stays_cancelled() {
        let (store, _) = setup();
        let alarm = store.create(new_alarm(NOW + 10, None)).await.unwrap();
        store.cancel(&alarm.id).await.unwrap();
        let res = store
            .update(&alarm.id, &|a: &mut Alarm| {
                a.status = AlarmStatus::Pending;
                Ok(())
            })
            .await;
        assert!(matches!(
            res,
            Err(StoreError::Conflict(AlarmStateError::Reactivation))
        ));
        assert_eq!(
            store.get(&alarm.id).await.unwrap().status,
            AlarmStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn update_validates_fields() {
        let (store, sys) = setup();
        let alarm = store.create(new_alarm(NOW + 10, None)).await.unwrap();
        sys.advance(5);
        let updated = store
            .update(&alarm.id, &|a: &mut Alarm| {
                a.message = "Call dad".into();
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.message, "Call dad");
        assert_eq!(updated.updated, NOW + 5);

        let res = store
            .update(&alarm.id, &|a: &mut Alarm| {
                a.message = String::new();
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn lists_only_due_pending_alarms() {
        let (store, sys) = setup();
        let due = store.create(new_alarm(NOW + 10, None)).await.unwrap();
        let cancelled = store.create(new_alarm(NOW + 5, None)).await.unwrap();
        store.cancel(&cancelled.id).await.unwrap();
        store.create(new_alarm(NOW + 1000, None)).await.unwrap();

        sys.set(NOW + 20);
        let res = store.list_due(NOW + 20).await.unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].id, due.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exactly_one_concurrent_claim_succeeds() {
        let (store, _) = setup();
        for _ in 0..20 {
            let alarm = store.create(new_alarm(NOW, None)).await.unwrap();
            let handles = (0..16)
                .map(|_| {
                    let store = store.clone();
                    let id = alarm.id.clone();
                    tokio::spawn(async move { store.claim(&id, NOW).await })
                })
                .collect::<Vec<_>>();

            let mut claimed = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => claimed += 1,
                    Err(e) => assert!(matches!(e, StoreError::Conflict(_))),
                }
            }
            assert_eq!(claimed, 1);
        }
    }

    #[tokio::test]
    async fn completing_recurring_alarm_rearms_it() {
        let (store, sys) = setup();
        let rule = RecurrenceRule::Interval {
            every_millis: 1000,
            anchor_ts: NOW,
        };
        let alarm = store.create(new_alarm(NOW, Some(rule))).await.unwrap();
        let claimed = store.claim(&alarm.id, NOW).await.unwrap();
        sys.set(NOW + 2500);
        let alarm = store
            .complete(&claimed, FireOutcome::Delivered)
            .await
            .unwrap();
        assert_eq!(alarm.status, AlarmStatus::Pending);
        assert_eq!(alarm.scheduled_ts, NOW + 3000);
        assert_eq!(alarm.fire_count, 1);
    }

    #[tokio::test]
    async fn releases_stale_claims() {
        let (store, sys) = setup();
        let stale = store.create(new_alarm(NOW, None)).await.unwrap();
        store.claim(&stale.id, NOW).await.unwrap();
        sys.advance(1000);
        let fresh = store.create(new_alarm(NOW + 1000, None)).await.unwrap();
        store.claim(&fresh.id, NOW + 1000).await.unwrap();

        let released = store.release_stale_claims(NOW + 500).await.unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, stale.id);
        assert_eq!(released[0].status, AlarmStatus::Pending);
        assert_eq!(
            store.get(&fresh.id).await.unwrap().status,
            AlarmStatus::Firing
        );
    }

    #[tokio::test]
    async fn slow_worker_can_not_complete_a_reclaimed_occurrence() {
        let (store, sys) = setup();
        let timeout = 300_000;
        let alarm = store.create(new_alarm(NOW, None)).await.unwrap();
        let first = store.claim(&alarm.id, NOW).await.unwrap();

        sys.advance(timeout + 1000);
        let released = store
            .release_stale_claims(sys.get_timestamp_millis() - timeout)
            .await
            .unwrap();
        assert_eq!(released.len(), 1);
        let second = store.claim(&alarm.id, NOW).await.unwrap();

        let res = store
            .complete(&first, FireOutcome::Failed("timed out".into()))
            .await;
        assert!(matches!(
            res,
            Err(StoreError::Conflict(AlarmStateError::ClaimLost(_)))
        ));

        let done = store
            .complete(&second, FireOutcome::Delivered)
            .await
            .unwrap();
        assert_eq!(done.status, AlarmStatus::Fired);
        assert!(done.last_error.is_none());
        assert_eq!(store.get(&alarm.id).await.unwrap().status, AlarmStatus::Fired);
    }

    #[tokio::test]
    async fn deletes_only_finished_alarms() {
        let (store, _) = setup();
        let alarm = store.create(new_alarm(NOW + 10, None)).await.unwrap();
        assert!(matches!(
            store.delete(&alarm.id).await,
            Err(StoreError::Conflict(AlarmStateError::NotFinished(_)))
        ));
        store.cancel(&alarm.id).await.unwrap();
        assert!(store.delete(&alarm.id).await.is_ok());
        assert!(matches!(
            store.get(&alarm.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
