//! Endpoint that stores the locale preference of a user and redirects back.
//!
//! `GET /set_locales?locales=en-US,de&redirect=/settings`
//!
//! - `locales`: comma-separated locale identifiers (default: [`PreferenceEndpoint::default_locales`])
//! - `redirect`: where to go afterwards. For security reasons only relative URLs and URLs with the
//!   same authority as the request are followed, everything else redirects to the default URL.
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{self, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use url::{Position, Url};

use crate::session::Session;

pub const PATH: &str = "/set_locales";

/// Stores the chosen locales. The default writes them into the [`Session`] of the request.
pub type WritePreferredLocales = Arc<dyn Fn(&mut Parts, &[Arc<str>]) + Send + Sync>;

/// Writes the locales into the request's [`Session`], starting a new session if there is none
pub fn write_session_locales(parts: &mut Parts, locales: &[Arc<str>]) {
    if let Some(session) = parts.extensions.get::<Session>() {
        session.set_locales(locales);
        return;
    }

    tracing::debug!("No session found, starting a new one to store the preferred locales");
    let session = Session::default();
    session.set_locales(locales);
    parts.extensions.insert(session);
}

#[derive(Default, Debug)]
struct QueryParameters {
    locales: Option<String>,
    redirect: Option<String>,
}

impl QueryParameters {
    fn parse(query: Option<&str>) -> Self {
        let pairs: Vec<(String, String)> =
            match serde_urlencoded::from_str(query.unwrap_or_default()) {
                Ok(pairs) => pairs,
                Err(error) => {
                    tracing::warn!("Ignoring undecodable query string: {error}");
                    Vec::new()
                }
            };

        let mut parameters = Self::default();
        // Last one wins for repeated parameters
        for (key, value) in pairs {
            match key.as_str() {
                "locales" => parameters.locales = Some(value),
                "redirect" => parameters.redirect = Some(value),
                _ => {}
            }
        }

        parameters
    }
}

/// The URL the request was sent to, as far as it can be reconstructed
fn request_url(parts: &Parts) -> Option<Url> {
    let authority = parts
        .uri
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| parts.headers.get(http::header::HOST)?.to_str().ok())?;
    let scheme = parts.uri.scheme_str().unwrap_or("http");

    Url::parse(&format!("{scheme}://{authority}{}", parts.uri.path()))
        .inspect_err(|error| tracing::warn!("Could not reconstruct request URL: {error}"))
        .ok()
}

/// `user:password@host:port`
fn authority(url: &Url) -> &str {
    &url[Position::BeforeUsername..Position::AfterPort]
}

#[derive(Clone)]
pub struct PreferenceEndpoint {
    write_preferred_locales: WritePreferredLocales,
    default_redirect_url: HeaderValue,
    default_locales: Vec<Arc<str>>,
    status_code: StatusCode,
    additional_headers: HeaderMap,
}

impl Default for PreferenceEndpoint {
    fn default() -> Self {
        Self {
            write_preferred_locales: Arc::new(write_session_locales),
            default_redirect_url: HeaderValue::from_static("/"),
            default_locales: Vec::new(),
            // 303 makes sure the redirect is followed with GET
            status_code: StatusCode::SEE_OTHER,
            additional_headers: HeaderMap::new(),
        }
    }
}

impl PreferenceEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_preferred_locales(
        mut self,
        write_preferred_locales: impl Fn(&mut Parts, &[Arc<str>]) + Send + Sync + 'static,
    ) -> Self {
        self.write_preferred_locales = Arc::new(write_preferred_locales);
        self
    }

    pub fn default_redirect_url(mut self, default_redirect_url: HeaderValue) -> Self {
        self.default_redirect_url = default_redirect_url;
        self
    }

    /// Stored when the request has no `locales` parameter
    pub fn default_locales(mut self, default_locales: Vec<Arc<str>>) -> Self {
        self.default_locales = default_locales;
        self
    }

    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    /// Sent with every redirect. A `Location` header in here is ignored.
    pub fn additional_headers(mut self, additional_headers: HeaderMap) -> Self {
        self.additional_headers = additional_headers;
        self
    }

    pub fn router<S>(self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route(PATH, get(set_locales))
            .with_state(Arc::new(self))
    }

    fn locales(&self, locales: Option<&str>) -> Vec<Arc<str>> {
        match locales {
            Some(locales) => locales.split(',').map(Arc::from).collect(),
            None => self.default_locales.clone(),
        }
    }

    fn redirect_url(&self, parts: &Parts, redirect: Option<&str>) -> HeaderValue {
        redirect
            .filter(|redirect| is_allowed_redirect(parts, redirect))
            .and_then(|redirect| {
                HeaderValue::from_str(redirect)
                    .inspect_err(|error| {
                        tracing::debug!("Redirect URL \"{redirect}\" is no valid header: {error}")
                    })
                    .ok()
            })
            .unwrap_or_else(|| self.default_redirect_url.clone())
    }
}

/// Whether a relative URL starts with an authority of its own like `//host/path`. Browsers also
/// read backslashes as slashes and skip leading whitespace.
fn introduces_authority(relative: &str) -> bool {
    let mut characters = relative
        .trim_start_matches(|character: char| character <= ' ')
        .chars()
        .filter(|character| !matches!(character, '\t' | '\n' | '\r'));

    matches!(
        (characters.next(), characters.next()),
        (Some('/' | '\\'), Some('/' | '\\'))
    )
}

/// URLs without an authority are always allowed, URLs with one only if it is the request's
fn is_allowed_redirect(parts: &Parts, redirect: &str) -> bool {
    let target = match Url::parse(redirect) {
        Ok(target) => target,
        Err(url::ParseError::RelativeUrlWithoutBase) if !introduces_authority(redirect) => {
            return true;
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let Some(request_url) = request_url(parts) else {
                tracing::warn!("Refusing to redirect to \"{redirect}\" without a request authority");
                return false;
            };

            match request_url.join(redirect) {
                Ok(target) => target,
                Err(error) => {
                    tracing::debug!("Ignoring unparsable redirect URL \"{redirect}\": {error}");
                    return false;
                }
            }
        }
        Err(error) => {
            tracing::debug!("Ignoring unparsable redirect URL \"{redirect}\": {error}");
            return false;
        }
    };

    if !target.has_host() {
        return true;
    }

    let same_authority = request_url(parts)
        .is_some_and(|request_url| authority(&target) == authority(&request_url));

    if !same_authority {
        tracing::warn!("Refusing to redirect to foreign URL \"{redirect}\"");
    }

    same_authority
}

async fn set_locales(
    State(endpoint): State<Arc<PreferenceEndpoint>>,
    request: Request,
) -> Response {
    let (mut parts, _body) = request.into_parts();
    let query = QueryParameters::parse(parts.uri.query());

    let locales = endpoint.locales(query.locales.as_deref());
    let location = endpoint.redirect_url(&parts, query.redirect.as_deref());

    tracing::debug!("Storing preferred locales {locales:?}");
    (endpoint.write_preferred_locales)(&mut parts, &locales);

    let mut headers = endpoint.additional_headers.clone();
    headers.insert(http::header::LOCATION, location);

    (endpoint.status_code, headers).into_response()
}
