mod inmemory;
mod postgres;

use crate::store::StoreError;
use chime_scheduler_domain::{Alarm, ID};
pub use inmemory::InMemoryAlarmRepo;
pub use postgres::PostgresAlarmRepo;

/// Mutation applied inside an atomic read-modify-write. The stored alarm
/// is left untouched when it returns an error.
pub type AlarmMutator<'a> = dyn Fn(&mut Alarm) -> Result<(), StoreError> + Send + Sync + 'a;

#[async_trait::async_trait]
pub trait IAlarmRepo: Send + Sync {
    async fn insert(&self, alarm: &Alarm) -> anyhow::Result<()>;
    async fn find(&self, alarm_id: &ID) -> anyhow::Result<Option<Alarm>>;
    /// Pending alarms with `scheduled_ts <= as_of`, earliest first, ties
    /// ordered by id
    async fn find_due(&self, as_of: i64) -> anyhow::Result<Vec<Alarm>>;
    async fn find_by_owner(&self, owner_id: &str, include_finished: bool) -> anyhow::Result<Vec<Alarm>>;
    /// Firing alarms claimed at or before `claimed_before`
    async fn find_stale_claims(&self, claimed_before: i64) -> anyhow::Result<Vec<Alarm>>;
    async fn update_with(&self, alarm_id: &ID, mutator: &AlarmMutator<'_>) -> Result<Alarm, StoreError>;
    async fn delete(&self, alarm_id: &ID) -> anyhow::Result<Option<Alarm>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::Repos;
    use chime_scheduler_domain::{AlarmStateError, AlarmStatus, NewAlarm};
    use chrono_tz::UTC;

    /// Creates an inmemory repo and, when DATABASE_URL is set, a postgres
    /// repo as well
    async fn create_repos() -> Vec<Repos> {
        let mut repos = vec![Repos::create_inmemory()];
        if let Ok(url) = std::env::var("DATABASE_URL") {
            repos.push(
                Repos::create_postgres(&url)
                    .await
                    .expect("DATABASE_URL to point to a running postgres"),
            );
        }
        repos
    }

    fn alarm(owner_id: &str, scheduled_ts: i64) -> Alarm {
        Alarm::new(
            NewAlarm {
                owner_id: owner_id.into(),
                channel_id: None,
                message: "Stretch".into(),
                scheduled_ts: Some(scheduled_ts),
                timezone: UTC,
                recurrence: None,
            },
            0,
        )
        .unwrap()
    }

    fn unique_owner() -> String {
        ID::new().as_string()
    }

    #[tokio::test]
    async fn create_and_delete() {
        for repos in create_repos().await {
            let alarm = alarm(&unique_owner(), 100);
            assert!(repos.alarm_repo.insert(&alarm).await.is_ok());

            let res = repos.alarm_repo.find(&alarm.id).await.unwrap().unwrap();
            assert_eq!(res, alarm);

            let res = repos.alarm_repo.delete(&alarm.id).await.unwrap();
            assert_eq!(res, Some(alarm.clone()));
            assert!(repos.alarm_repo.find(&alarm.id).await.unwrap().is_none());
            assert!(repos.alarm_repo.delete(&alarm.id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn finds_due_alarms_in_order() {
        for repos in create_repos().await {
            let owner = unique_owner();
            let late = alarm(&owner, 300);
            let early = alarm(&owner, 100);
            let mut same_time = vec![alarm(&owner, 200), alarm(&owner, 200)];
            same_time.sort_by(|a, b| a.id.cmp(&b.id));
            let mut cancelled = alarm(&owner, 50);
            cancelled.status = AlarmStatus::Cancelled;
            let future = alarm(&owner, 10_000);

            for a in [&late, &same_time[1], &early, &cancelled, &future, &same_time[0]] {
                repos.alarm_repo.insert(a).await.unwrap();
            }

            let due = repos
                .alarm_repo
                .find_due(300)
                .await
                .unwrap()
                .into_iter()
                .filter(|a| a.owner_id == owner)
                .map(|a| a.id)
                .collect::<Vec<_>>();
            assert_eq!(
                due,
                vec![
                    early.id.clone(),
                    same_time[0].id.clone(),
                    same_time[1].id.clone(),
                    late.id.clone()
                ]
            );
        }
    }

    #[tokio::test]
    async fn finds_by_owner() {
        for repos in create_repos().await {
            let owner = unique_owner();
            let pending = alarm(&owner, 200);
            let mut fired = alarm(&owner, 100);
            fired.status = AlarmStatus::Fired;
            repos.alarm_repo.insert(&pending).await.unwrap();
            repos.alarm_repo.insert(&fired).await.unwrap();
            repos
                .alarm_repo
                .insert(&alarm(&unique_owner(), 100))
                .await
                .unwrap();

            let upcoming = repos.alarm_repo.find_by_owner(&owner, false).await.unwrap();
            assert_eq!(upcoming, vec![pending.clone()]);
            let all = repos.alarm_repo.find_by_owner(&owner, true).await.unwrap();
            assert_eq!(all, vec![fired, pending]);
        }
    }

    #[tokio::test]
    async fn update_is_all_or_nothing() {
        for repos in create_repos().await {
            let alarm = alarm(&unique_owner(), 100);
            repos.alarm_repo.insert(&alarm).await.unwrap();

            let updated = repos
                .alarm_repo
                .update_with(&alarm.id, &|a: &mut Alarm| {
                    a.message = "Drink water".into();
                    Ok(())
                })
                .await
                .unwrap();
            assert_eq!(updated.message, "Drink water");

            let res = repos
                .alarm_repo
                .update_with(&alarm.id, &|a: &mut Alarm| {
                    a.message = "Never stored".into();
                    Err(StoreError::Conflict(AlarmStateError::InFlight))
                })
                .await;
            assert!(matches!(res, Err(StoreError::Conflict(_))));
            let stored = repos.alarm_repo.find(&alarm.id).await.unwrap().unwrap();
            assert_eq!(stored.message, "Drink water");

            let res = repos
                .alarm_repo
                .update_with(&ID::new(), &|_: &mut Alarm| Ok(()))
                .await;
            assert!(matches!(res, Err(StoreError::NotFound(_))));
        }
    }
}
