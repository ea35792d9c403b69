//! Locale resolution for axum applications.
//!
//! - [`localize`] resolves the locales of each request from the stored preference or the
//!   `Accept-Language` header and provides [`Locales`] and [`Translations`] to handlers.
//! - [`PreferenceEndpoint`] serves `GET /set_locales` to store a preference and redirect back.
pub mod accept_language;
pub mod configuration;
pub mod localization;
pub mod preferred_locales;
pub mod session;
pub mod translation;

pub use localization::{localize, Locales, Localization, TranslationConfiguration};
pub use preferred_locales::PreferenceEndpoint;
pub use translation::{CatalogLoadError, Translations};
