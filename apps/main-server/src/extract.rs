//! Request extractors that reject with the JSON error envelope.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ServerError;

/// JSON body extractor. Malformed bodies become 400 validation errors.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct AppJson<T>(pub T);

/// Query string extractor. Malformed queries become 400 validation errors.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct AppQuery<T>(pub T);

/// Path extractor. Malformed ids become 400 validation errors.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServerError))]
pub struct AppPath<T>(pub T);

/// Multipart body extractor. Malformed bodies become 400 validation errors.
pub struct AppMultipart(pub axum::extract::Multipart);

impl<S> FromRequest<S> for AppMultipart
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Multipart::from_request(req, state)
            .await
            .map(AppMultipart)
            .map_err(ServerError::from)
    }
}
