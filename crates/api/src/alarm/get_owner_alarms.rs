use crate::error::ChimeError;
use crate::shared::usecase::{execute, UseCase};
use actix_web::{web, HttpResponse};
use chime_scheduler_api_structs::get_owner_alarms::*;
use chime_scheduler_domain::Alarm;
use chime_scheduler_infra::ChimeContext;

pub async fn get_owner_alarms_controller(
    path: web::Path<PathParams>,
    query: web::Query<QueryParams>,
    ctx: web::Data<ChimeContext>,
) -> Result<HttpResponse, ChimeError> {
    let usecase = GetOwnerAlarmsUseCase {
        owner_id: path.owner_id.clone(),
        include_past: query.include_past.unwrap_or(false),
    };

    execute(usecase, &ctx)
        .await
        .map(|alarms| HttpResponse::Ok().json(APIResponse::new(alarms)))
        .map_err(ChimeError::from)
}

/// Alarms of an owner ordered by scheduled time. Finished alarms are only
/// included when `include_past` is set.
#[derive(Debug)]
pub struct GetOwnerAlarmsUseCase {
    pub owner_id: String,
    pub include_past: bool,
}

#[derive(Debug)]
pub enum UseCaseError {
    Storage,
}

impl From<UseCaseError> for ChimeError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::Storage => Self::InternalError,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl UseCase for GetOwnerAlarmsUseCase {
    type Response = Vec<Alarm>;

    type Error = UseCaseError;

    const NAME: &'static str = "GetOwnerAlarms";

    async fn execute(&mut self, ctx: &ChimeContext) -> Result<Self::Response, Self::Error> {
        ctx.store
            .find_by_owner(&self.owner_id, self.include_past)
            .await
            .map_err(|_| UseCaseError::Storage)
    }
}
