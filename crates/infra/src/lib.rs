mod config;
mod repos;
mod services;
mod store;
mod system;

pub use config::{ChatWebhookConfig, Config, DeliveryConfig, LlmConfig};
use repos::Repos;
pub use repos::{AlarmMutator, IAlarmRepo};
pub use services::*;
pub use store::{AlarmStore, StoreError};
use std::sync::Arc;
pub use system::{ISys, ManualSys, RealSys};
use tracing::info;

#[derive(Clone)]
pub struct ChimeContext {
    pub store: AlarmStore,
    pub config: Config,
    pub sys: Arc<dyn ISys>,
    pub oracle: Arc<dyn ILlmOracle>,
    pub channels: Vec<Arc<dyn IDeliveryChannel>>,
}

struct ContextParams {
    pub postgres_connection_string: Option<String>,
}

impl ChimeContext {
    /// Context backed by memory only, with the channels and oracle given
    /// by the environment
    pub fn create_inmemory() -> anyhow::Result<Self> {
        let config = Config::new();
        let sys: Arc<dyn ISys> = Arc::new(RealSys {});
        Self::from_parts(Repos::create_inmemory(), config, sys)
    }

    /// Context for tests with full control over time, channels and oracle
    pub fn create_for_test(
        sys: Arc<dyn ISys>,
        oracle: Arc<dyn ILlmOracle>,
        channels: Vec<Arc<dyn IDeliveryChannel>>,
    ) -> Self {
        let repos = Repos::create_inmemory();
        Self {
            store: AlarmStore::new(repos.alarm_repo, sys.clone()),
            config: Config::new(),
            sys,
            oracle,
            channels,
        }
    }

    fn from_parts(repos: Repos, config: Config, sys: Arc<dyn ISys>) -> anyhow::Result<Self> {
        let oracle: Arc<dyn ILlmOracle> = match &config.llm {
            Some(llm) => Arc::new(OpenAiOracle::new(llm.clone())?),
            None => Arc::new(DisabledOracle),
        };
        let channels = build_channels(&config)?;
        Ok(Self {
            store: AlarmStore::new(repos.alarm_repo, sys.clone()),
            config,
            sys,
            oracle,
            channels,
        })
    }

    async fn create(params: ContextParams) -> anyhow::Result<Self> {
        let repos = match &params.postgres_connection_string {
            Some(connection_string) => Repos::create_postgres(connection_string).await?,
            None => {
                info!("DATABASE_URL env var was not provided. Going to use inmemory infra.");
                Repos::create_inmemory()
            }
        };
        Self::from_parts(repos, Config::new(), Arc::new(RealSys {}))
    }
}

/// Will setup the infrastructure context given the environment
pub async fn setup_context() -> anyhow::Result<ChimeContext> {
    ChimeContext::create(ContextParams {
        postgres_connection_string: get_psql_connection_string(),
    })
    .await
}

fn get_psql_connection_string() -> Option<String> {
    const PSQL_CONNECTION_STRING: &str = "DATABASE_URL";

    std::env::var(PSQL_CONNECTION_STRING)
        .ok()
        .filter(|url| !url.is_empty())
}
