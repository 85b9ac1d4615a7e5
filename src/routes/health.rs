use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Identity reported by the health check.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub started_at: DateTime<Utc>,
}

/// Health check endpoint
///
/// Returns the service name, when it started and the current timestamp.
#[get("/health")]
pub async fn health(info: web::Data<ServiceInfo>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "name": info.name,
        "started_at": info.started_at,
        "timestamp": Utc::now()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_rt::test]
    async fn test_health_endpoint() {
        let info = ServiceInfo {
            name: "userhub-test".into(),
            started_at: Utc::now(),
        };
        let app = test::init_service(
            actix_web::App::new()
                .app_data(web::Data::new(info))
                .service(health),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["name"], "userhub-test");
        assert!(json["timestamp"].is_string());
    }
}
