mod cancel_alarm;
mod create_alarm;
mod delete_alarm;
mod get_alarm;
mod get_owner_alarms;
mod update_alarm;

use actix_web::web;
use cancel_alarm::cancel_alarm_controller;
use create_alarm::create_alarm_controller;
use delete_alarm::delete_alarm_controller;
use get_alarm::get_alarm_controller;
use get_owner_alarms::get_owner_alarms_controller;
use update_alarm::update_alarm_controller;

pub(crate) use create_alarm::parse_timezone;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/alarms", web::post().to(create_alarm_controller));

    cfg.route("/alarms/{alarm_id}", web::get().to(get_alarm_controller));
    cfg.route("/alarms/{alarm_id}", web::put().to(update_alarm_controller));
    cfg.route(
        "/alarms/{alarm_id}",
        web::delete().to(delete_alarm_controller),
    );
    cfg.route(
        "/alarms/{alarm_id}/cancel",
        web::post().to(cancel_alarm_controller),
    );

    cfg.route(
        "/owners/{owner_id}/alarms",
        web::get().to(get_owner_alarms_controller),
    );
}
