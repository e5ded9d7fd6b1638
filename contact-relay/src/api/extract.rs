//! Request extractors.

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header,
};
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;

/// Body extractor accepting either JSON or `application/x-www-form-urlencoded`.
///
/// The format is chosen by `Content-Type`; anything that is not form-encoded
/// is parsed as JSON. Rejections use the API error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOrForm<T>(pub T);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE))
}

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(&req) {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| {
                    ApiError::new(rejection.status(), "INVALID_BODY", rejection.body_text())
                })?;
            return Ok(Self(value));
        }

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                ApiError::new(rejection.status(), "INVALID_BODY", rejection.body_text())
            })?;
        Ok(Self(value))
    }
}
