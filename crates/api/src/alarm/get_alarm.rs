use crate::error::ChimeError;
use crate::shared::usecase::{execute, UseCase};
use actix_web::{web, HttpResponse};
use chime_scheduler_api_structs::get_alarm::*;
use chime_scheduler_domain::{Alarm, ID};
use chime_scheduler_infra::{ChimeContext, StoreError};

pub async fn get_alarm_controller(
    path: web::Path<PathParams>,
    ctx: web::Data<ChimeContext>,
) -> Result<HttpResponse, ChimeError> {
    let usecase = GetAlarmUseCase {
        alarm_id: path.alarm_id.clone(),
    };

    execute(usecase, &ctx)
        .await
        .map(|alarm| HttpResponse::Ok().json(APIResponse::new(alarm)))
        .map_err(ChimeError::from)
}

#[derive(Debug)]
pub struct GetAlarmUseCase {
    pub alarm_id: ID,
}

#[derive(Debug)]
pub enum UseCaseError {
    NotFound(ID),
    Storage,
}

impl From<UseCaseError> for ChimeError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::NotFound(id) => {
                Self::NotFound(format!("The alarm with id: {}, was not found.", id))
            }
            UseCaseError::Storage => Self::InternalError,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl UseCase for GetAlarmUseCase {
    type Response = Alarm;

    type Error = UseCaseError;

    const NAME: &'static str = "GetAlarm";

    async fn execute(&mut self, ctx: &ChimeContext) -> Result<Self::Response, Self::Error> {
        match ctx.store.get(&self.alarm_id).await {
            Ok(alarm) => Ok(alarm),
            Err(StoreError::NotFound(id)) => Err(UseCaseError::NotFound(id)),
            Err(_) => Err(UseCaseError::Storage),
        }
    }
}
