pub mod health;
pub mod users;

use actix_web::web;

pub use users::UserController;

/// Something that contributes routes to the HTTP application.
///
/// `App::start()` calls `register_routes` once per controller, on every worker.
pub trait Controller: Send + Sync {
    fn name(&self) -> &str;

    fn register_routes(&self, cfg: &mut web::ServiceConfig);
}

/// Registers the health check and every controller's routes.
pub fn config(cfg: &mut web::ServiceConfig, controllers: &[std::sync::Arc<dyn Controller>]) {
    cfg.service(health::health);
    for controller in controllers {
        controller.register_routes(cfg);
    }
}
