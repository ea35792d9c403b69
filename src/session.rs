//! A minimal cookie backed session. The stored preference lives here by default but any other
//! storage can be plugged in through the read and write hooks.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

pub const COOKIE_NAME: &str = "session";
const LIFETIME: time::Duration = time::Duration::days(365);

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
pub struct SessionData {
    pub locales: Option<Vec<String>>,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Bad cookie encoding: {0}")]
    BadCookieEncoding(#[from] base64::DecodeError),
    #[error("Bad cookie: {0}")]
    BadCookieFormat(#[from] postcard::Error),
}

impl SessionData {
    pub fn encode(&self) -> Result<String, postcard::Error> {
        let serialized = postcard::to_allocvec(self)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(serialized))
    }

    pub fn decode(encoded: &str) -> Result<Self, Error> {
        let serialized = BASE64_URL_SAFE_NO_PAD.decode(encoded)?;
        Ok(postcard::from_bytes(&serialized)?)
    }
}

/// Shared handle to the session of the current request. Clones see the same data so changes
/// made by handlers are visible to [`manage`] when it writes the cookie.
#[derive(Clone, Default, Debug)]
pub struct Session(Arc<Mutex<SessionData>>);

impl Session {
    pub fn new(data: SessionData) -> Self {
        Self(Arc::new(Mutex::new(data)))
    }

    pub fn data(&self) -> MutexGuard<'_, SessionData> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn locales(&self) -> Option<Vec<Arc<str>>> {
        let data = self.data();
        let locales = data.locales.as_ref()?;
        Some(locales.iter().map(|locale| Arc::from(locale.as_str())).collect())
    }

    pub fn set_locales(&self, locales: &[Arc<str>]) {
        self.data().locales = Some(locales.iter().map(ToString::to_string).collect());
    }
}

/// Loads the session from its cookie into the request extensions and writes it back to the
/// response
pub async fn manage(jar: CookieJar, mut request: Request, next: Next) -> Response {
    let data = match jar
        .get(COOKIE_NAME)
        .map(|cookie| SessionData::decode(cookie.value()))
        .transpose()
    {
        Ok(data) => data.unwrap_or_default(),
        Err(error) => {
            tracing::warn!("Discarding unreadable session cookie: {error}");
            SessionData::default()
        }
    };

    let session = Session::new(data);
    request.extensions_mut().insert(session.clone());

    let response = next.run(request).await;

    let encoded = match session.data().encode() {
        Ok(encoded) => encoded,
        Err(error) => {
            tracing::error!("Error encoding session cookie: {error}");
            return response;
        }
    };

    let cookie = Cookie::build((COOKIE_NAME, encoded))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(LIFETIME);

    (jar.add(cookie), response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_survives_encoding() {
        let data = SessionData {
            locales: Some(vec!["en".to_owned(), "de-DE".to_owned()]),
        };

        let encoded = data.encode().unwrap();
        assert!(encoded
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || "-_".contains(character)));
        assert_eq!(SessionData::decode(&encoded).unwrap(), data);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            SessionData::decode("not base64!"),
            Err(Error::BadCookieEncoding(_))
        ));
    }

    #[test]
    fn clones_share_data() {
        let session = Session::default();
        assert_eq!(session.locales(), None);

        session.clone().set_locales(&[Arc::from("fr")]);
        assert_eq!(session.locales(), Some(vec![Arc::<str>::from("fr")]));
    }
}
