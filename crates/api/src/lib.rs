mod alarm;
mod error;
mod job_schedulers;
mod notification;
mod scheduler;
mod shared;
mod status;
mod suggestion;

use actix_cors::Cors;
use actix_web::{dev::Server, middleware, web, App, HttpServer};
use chime_scheduler_infra::ChimeContext;
use job_schedulers::start_alarm_scheduler_job;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

pub use error::ChimeError;
pub use notification::{NotificationDispatcher, RetryPolicy};
pub use scheduler::process_due_alarms::{ProcessDueAlarmsReport, ProcessDueAlarmsUseCase};
pub use shared::usecase::{execute, UseCase};

pub fn configure_server_api(cfg: &mut web::ServiceConfig) {
    alarm::configure_routes(cfg);
    status::configure_routes(cfg);
    suggestion::configure_routes(cfg);
}

pub struct Application {
    server: Server,
    port: u16,
}

impl Application {
    pub async fn new(context: ChimeContext) -> Result<Self, std::io::Error> {
        let (server, port) = Application::configure_server(context.clone()).await?;
        Application::start_job_schedulers(context);

        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn start_job_schedulers(context: ChimeContext) {
        start_alarm_scheduler_job(context);
    }

    async fn configure_server(context: ChimeContext) -> Result<(Server, u16), std::io::Error> {
        let port = context.config.port;
        let address = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&address)?;
        let port = listener.local_addr()?.port();

        let server = HttpServer::new(move || {
            let ctx = context.clone();

            App::new()
                .wrap(Cors::permissive())
                .wrap(middleware::Compress::default())
                .wrap(TracingLogger::default())
                .app_data(web::Data::new(ctx))
                .service(web::scope("/api/v1").configure(configure_server_api))
        })
        .listen(listener)?
        .workers(4)
        .run();

        Ok((server, port))
    }

    pub async fn start(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}
