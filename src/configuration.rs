use std::{env, net::SocketAddr, path::PathBuf, str::ParseBoolError};

use thiserror::Error;

use crate::localization::TranslationConfiguration;

const DEFAULT_DOMAIN: &str = "messages";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Environment variable {variable} is not valid unicode")]
    NotUnicode { variable: &'static str },
    #[error("Expected LOCALIZATION_FALLBACK to be true or false: {0}")]
    BadFallback(#[source] ParseBoolError),
    #[error("Expected BIND_ADDRESS to be a socket address like 127.0.0.1:3000: {0}")]
    BadBindAddress(#[source] std::net::AddrParseError),
}

/// Settings of the demo server, read from the environment
#[derive(Debug, Clone)]
pub struct Configuration {
    pub default_domain: String,
    pub locale_root: Option<PathBuf>,
    pub fallback: bool,
    pub bind_address: SocketAddr,
}

fn var(variable: &'static str) -> Result<Option<String>, Error> {
    match env::var(variable) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(Error::NotUnicode { variable }),
    }
}

impl Configuration {
    pub fn from_env() -> Result<Self, Error> {
        let default_domain =
            var("LOCALIZATION_DEFAULT_DOMAIN")?.unwrap_or_else(|| DEFAULT_DOMAIN.to_owned());
        let locale_root = var("LOCALIZATION_LOCALE_ROOT")?.map(PathBuf::from);
        let fallback = var("LOCALIZATION_FALLBACK")?
            .map(|value| value.trim().parse())
            .transpose()
            .map_err(Error::BadFallback)?
            .unwrap_or(true);
        let bind_address = var("BIND_ADDRESS")?
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDRESS)
            .parse()
            .map_err(Error::BadBindAddress)?;

        Ok(Self {
            default_domain,
            locale_root,
            fallback,
            bind_address,
        })
    }

    pub fn translation(&self) -> TranslationConfiguration {
        let configuration =
            TranslationConfiguration::new(self.default_domain.as_str()).fallback(self.fallback);

        match &self.locale_root {
            Some(locale_root) => configuration.locale_root(locale_root.clone()),
            None => configuration,
        }
    }
}
