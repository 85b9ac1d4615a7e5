use actix_web::dev::Payload;
use actix_web::{web, Error as ActixError, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::Deref;

use crate::error::AppError;
use crate::security::sanitize_value;

/// JSON body extractor that strips markup from every string before deserializing.
///
/// Use it in place of `web::Json<T>` on handlers that accept user input. Body
/// size limits and content-type checks come from the app's `web::JsonConfig`.
#[derive(Debug)]
pub struct SanitizedJson<T>(pub T);

impl<T> SanitizedJson<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for SanitizedJson<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: DeserializeOwned + 'static> FromRequest for SanitizedJson<T> {
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let raw = web::Json::<Value>::from_request(req, payload);
        Box::pin(async move {
            let web::Json(raw) = raw.await?;
            let value = serde_json::from_value(sanitize_value(raw)).map_err(AppError::from)?;
            Ok(SanitizedJson(value))
        })
    }
}
