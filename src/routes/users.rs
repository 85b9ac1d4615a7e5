use crate::{
    error::AppError,
    middleware::SanitizedJson,
    models::{CreateUserDto, UpdateUserDto},
    routes::Controller,
    service::UserService,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use std::sync::Arc;

/// Exposes `UserService` under `/users`.
pub struct UserController {
    service: Arc<UserService>,
}

impl UserController {
    pub fn new(service: Arc<UserService>) -> Self {
        Self { service }
    }
}

impl Controller for UserController {
    fn name(&self) -> &str {
        "users"
    }

    fn register_routes(&self, cfg: &mut web::ServiceConfig) {
        cfg.service(
            web::scope("/users")
                .app_data(web::Data::from(Arc::clone(&self.service)))
                .service(list_users)
                .service(create_user)
                .service(upsert_user)
                .service(get_user)
                .service(update_user)
                .service(delete_user),
        );
    }
}

/// Lists every user ordered by id.
///
/// ## Responses:
/// - `200 OK`: JSON array of `User` objects.
/// - `500 Internal Server Error`: database failure.
#[get("")]
pub async fn list_users(service: web::Data<UserService>) -> Result<impl Responder, AppError> {
    let users = service.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

/// Creates a user.
///
/// ## Responses:
/// - `201 Created`: the stored `User`.
/// - `400 Bad Request`: body is not valid JSON for `CreateUserDto`.
/// - `409 Conflict`: the email is already registered.
/// - `422 Unprocessable Entity`: validation failed.
#[post("")]
pub async fn create_user(
    service: web::Data<UserService>,
    body: SanitizedJson<CreateUserDto>,
) -> Result<impl Responder, AppError> {
    let user = service.create_user(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}

/// Creates a user unless the email exists; an existing row is returned untouched.
///
/// ## Responses:
/// - `201 Created`: a new row was inserted.
/// - `200 OK`: the email was already registered; the stored `User` is returned.
/// - `422 Unprocessable Entity`: validation failed.
#[put("")]
pub async fn upsert_user(
    service: web::Data<UserService>,
    body: SanitizedJson<CreateUserDto>,
) -> Result<impl Responder, AppError> {
    let (user, inserted) = service.upsert_user(body.into_inner()).await?;
    if inserted {
        Ok(HttpResponse::Created().json(user))
    } else {
        Ok(HttpResponse::Ok().json(user))
    }
}

#[get("/{id}")]
pub async fn get_user(
    service: web::Data<UserService>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let user = service.get_user(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Applies a partial update.
///
/// ## Responses:
/// - `200 OK`: the updated `User`.
/// - `400 Bad Request`: no field to update.
/// - `404 Not Found`: no user with that id.
/// - `409 Conflict`: the new email belongs to another user.
/// - `422 Unprocessable Entity`: validation failed.
#[put("/{id}")]
pub async fn update_user(
    service: web::Data<UserService>,
    id: web::Path<i64>,
    body: SanitizedJson<UpdateUserDto>,
) -> Result<impl Responder, AppError> {
    let user = service.update_user(id.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/{id}")]
pub async fn delete_user(
    service: web::Data<UserService>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    service.delete_user(id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
