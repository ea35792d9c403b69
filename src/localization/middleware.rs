use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{Localization, Locales};
use crate::translation::CatalogLoadError;

impl IntoResponse for CatalogLoadError {
    fn into_response(self) -> Response {
        tracing::error!("Error loading translations: {self}");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Inserts [`Locales`] and [`Translations`](crate::translation::Translations) into the request
/// extensions. The response of the inner service is returned as is.
pub async fn localize(
    State(localization): State<Arc<Localization>>,
    request: Request,
    next: Next,
) -> Result<Response, CatalogLoadError> {
    let (mut parts, body) = request.into_parts();

    let locales = localization.resolve_locales(&parts);
    tracing::debug!("Resolved locales: {locales:?}");

    let translations = localization.translations(&parts, &locales)?;
    parts.extensions.insert(Locales(locales));
    parts.extensions.insert(translations);

    Ok(next.run(Request::from_parts(parts, body)).await)
}
