mod alarm;
mod shared;

pub use alarm::{AlarmMutator, IAlarmRepo};
use alarm::{InMemoryAlarmRepo, PostgresAlarmRepo};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct Repos {
    pub alarm_repo: Arc<dyn IAlarmRepo>,
}

impl Repos {
    pub async fn create_postgres(connection_string: &str) -> anyhow::Result<Self> {
        info!("DB CHECKING CONNECTION ...");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;
        info!("DB CHECKING CONNECTION ... [done]");
        sqlx::migrate!().run(&pool).await?;
        Ok(Self {
            alarm_repo: Arc::new(PostgresAlarmRepo::new(pool)),
        })
    }

    pub fn create_inmemory() -> Self {
        Self {
            alarm_repo: Arc::new(InMemoryAlarmRepo::new()),
        }
    }
}
