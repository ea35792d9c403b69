//! Resolves the locales of every request and attaches them together with the matching
//! translations to the request extensions.
//!
//! This is based on:
//! - https://docs.rs/axum/latest/axum/middleware/index.html#passing-state-from-middleware-to-handlers
use std::{convert::Infallible, path::PathBuf, sync::Arc};

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{
    accept_language,
    session::Session,
    translation::{BuildCatalog, CatalogLoadError, CatalogRequest, FluentLoader, Translations},
};

pub mod middleware;

pub use middleware::localize;

/// Reads the stored locale preference of a request. Must return an empty list when there is
/// none and must not panic.
pub type ReadPreferredLocales = Arc<dyn Fn(&Parts) -> Vec<Arc<str>> + Send + Sync>;

/// Picks the translation domain for a request, e.g. depending on its path. `None` selects the
/// default domain.
pub type GetDomain = Arc<dyn Fn(&Parts) -> Option<Arc<str>> + Send + Sync>;

/// The resolved locales of the current request, most preferred first. Extracting it where the
/// middleware did not run yields an empty list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Locales(pub Vec<Arc<str>>);

#[async_trait]
impl<S> FromRequestParts<S> for Locales
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Locales>().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Translations
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Translations>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Reads the locales stored in the [`Session`] by the default write hook
pub fn read_session_locales(parts: &Parts) -> Vec<Arc<str>> {
    parts
        .extensions
        .get::<Session>()
        .and_then(Session::locales)
        .unwrap_or_default()
}

fn default_domain_for(_parts: &Parts) -> Option<Arc<str>> {
    None
}

/// Configures how translation catalogs are queried
#[derive(Clone)]
pub struct TranslationConfiguration {
    default_domain: Arc<str>,
    locale_root: Option<PathBuf>,
    get_domain: GetDomain,
    catalog: Arc<dyn BuildCatalog>,
    fallback: bool,
}

impl TranslationConfiguration {
    pub fn new(default_domain: impl Into<Arc<str>>) -> Self {
        Self {
            default_domain: default_domain.into(),
            locale_root: None,
            get_domain: Arc::new(default_domain_for),
            catalog: Arc::new(FluentLoader::new()),
            fallback: true,
        }
    }

    /// Root of the locale directory structure. Defaults to
    /// [`DEFAULT_LOCALE_ROOT`](crate::translation::DEFAULT_LOCALE_ROOT).
    pub fn locale_root(mut self, locale_root: impl Into<PathBuf>) -> Self {
        self.locale_root = Some(locale_root.into());
        self
    }

    pub fn get_domain(
        mut self,
        get_domain: impl Fn(&Parts) -> Option<Arc<str>> + Send + Sync + 'static,
    ) -> Self {
        self.get_domain = Arc::new(get_domain);
        self
    }

    pub fn catalog(mut self, catalog: impl BuildCatalog + 'static) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Whether a missing catalog yields [`Translations::Null`] instead of an error
    pub fn fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    fn domain(&self, parts: &Parts) -> Arc<str> {
        (self.get_domain)(parts).unwrap_or_else(|| self.default_domain.clone())
    }
}

/// State of the [`localize`](middleware::localize) middleware
#[derive(Clone)]
pub struct Localization {
    config: TranslationConfiguration,
    read_preferred_locales: ReadPreferredLocales,
}

impl Localization {
    pub fn new(config: TranslationConfiguration) -> Self {
        Self {
            config,
            read_preferred_locales: Arc::new(read_session_locales),
        }
    }

    pub fn read_preferred_locales(
        mut self,
        read_preferred_locales: impl Fn(&Parts) -> Vec<Arc<str>> + Send + Sync + 'static,
    ) -> Self {
        self.read_preferred_locales = Arc::new(read_preferred_locales);
        self
    }

    /// A stored preference replaces the `Accept-Language` header entirely
    pub fn resolve_locales(&self, parts: &Parts) -> Vec<Arc<str>> {
        let preferred = (self.read_preferred_locales)(parts);
        if !preferred.is_empty() {
            return preferred;
        }

        accept_language::resolve_header(&parts.headers)
    }

    pub fn translations(
        &self,
        parts: &Parts,
        locales: &[Arc<str>],
    ) -> Result<Translations, CatalogLoadError> {
        let domain = self.config.domain(parts);
        tracing::debug!("Using translation domain \"{domain}\" for locales {locales:?}");

        self.config.catalog.build(&CatalogRequest {
            domain: &domain,
            locale_root: self.config.locale_root.as_deref(),
            locales,
            fallback: self.config.fallback,
        })
    }
}
