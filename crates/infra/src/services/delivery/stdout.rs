use super::{DeliveryError, IDeliveryChannel, Notification};
use std::io::Write;

/// Prints notifications on the command line
pub struct StdoutChannel {
    name: String,
}

impl StdoutChannel {
    pub fn new() -> Self {
        Self {
            name: "stdout".into(),
        }
    }
}

impl Default for StdoutChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IDeliveryChannel for StdoutChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", notification.text)
            .and_then(|_| handle.flush())
            .map_err(|e| DeliveryError::Permanent(e.to_string()))
    }
}
