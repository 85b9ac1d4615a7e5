use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::sync::Arc;

use crate::error::AppError;

/// Requires `Authorization: Bearer <token>` on every route except `/health`.
///
/// Without a configured token the middleware lets everything through.
#[derive(Clone)]
pub struct BearerAuth {
    token: Option<Arc<str>>,
}

impl BearerAuth {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(Arc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = BearerAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BearerAuthService {
            service,
            token: self.token.clone(),
        }))
    }
}

pub struct BearerAuthService<S> {
    service: S,
    token: Option<Arc<str>>,
}

impl<S, B> Service<ServiceRequest> for BearerAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let expected = match &self.token {
            Some(token) if req.path() != "/health" => token,
            _ => return Box::pin(self.service.call(req)),
        };

        let provided = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match provided {
            Some(token) if token == &**expected => Box::pin(self.service.call(req)),
            Some(_) => {
                let app_err = AppError::Unauthorized("Invalid token".into());
                Box::pin(async move { Err(app_err.into()) })
            }
            None => {
                let app_err = AppError::Unauthorized("Missing token".into());
                Box::pin(async move { Err(app_err.into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    #[actix_rt::test]
    async fn test_token_required_when_configured() {
        let app = test::init_service(
            App::new()
                .wrap(BearerAuth::new(Some("secret")))
                .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() }))
                .route("/users", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get().uri("/users").to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.error_response().status(), 401);

        let req = test::TestRequest::get()
            .uri("/users")
            .insert_header((header::AUTHORIZATION, "Bearer wrong"))
            .to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.error_response().status(), 401);

        let req = test::TestRequest::get()
            .uri("/users")
            .insert_header((header::AUTHORIZATION, "Bearer secret"))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }

    #[actix_rt::test]
    async fn test_open_without_token() {
        let app = test::init_service(
            App::new()
                .wrap(BearerAuth::new(None))
                .route("/users", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = test::TestRequest::get().uri("/users").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }
}
