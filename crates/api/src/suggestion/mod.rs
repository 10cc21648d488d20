mod get_suggestions;

use actix_web::web;
use get_suggestions::get_suggestions_controller;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/suggestions", web::post().to(get_suggestions_controller));
}
