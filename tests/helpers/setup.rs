use chime_scheduler_api::Application;
use chime_scheduler_infra::{ChimeContext, Config};
use chime_scheduler_sdk::ChimeSDK;

pub struct TestApp {
    pub config: Config,
}

// Launch the application as a background task
pub async fn spawn_app() -> (TestApp, ChimeSDK, String) {
    let mut ctx = ChimeContext::create_inmemory().expect("Failed to create context");
    ctx.config.port = 0; // Random port
    ctx.config.scheduler_poll_interval_secs = 1;

    let config = ctx.config.clone();
    let application = Application::new(ctx)
        .await
        .expect("Failed to build application.");

    let address = format!("http://localhost:{}", application.port());
    let _ = actix_web::rt::spawn(async move {
        application
            .start()
            .await
            .expect("Expected application to start");
    });

    let app = TestApp { config };
    let sdk = ChimeSDK::new(address.clone());
    (app, sdk, address)
}
