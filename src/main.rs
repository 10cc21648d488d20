mod telemetry;

use chime_scheduler_api::Application;
use chime_scheduler_infra::setup_context;
use std::io::{Error, ErrorKind};
use telemetry::{get_subscriber, init_subscriber};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    openssl_probe::init_ssl_cert_env_vars();

    let subscriber = get_subscriber("chime_scheduler_server".into(), "info".into());
    init_subscriber(subscriber)?;

    let context = setup_context()
        .await
        .map_err(|e| Error::new(ErrorKind::Other, e))?;

    let app = Application::new(context).await?;
    app.start().await
}
