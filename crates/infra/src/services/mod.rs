mod delivery;
mod llm_oracle;

pub use delivery::{
    build_channels, DeliveryError, IDeliveryChannel, Notification, StdoutChannel, WebhookChannel,
};
pub use llm_oracle::{DisabledOracle, ILlmOracle, OpenAiOracle, OracleError, OracleQuery};
