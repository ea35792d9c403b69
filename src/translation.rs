//! Translation catalogs loaded from Fluent resources laid out as
//! `<locale root>/<locale>/<domain>.ftl`, which mirrors the gettext
//! `<locale dir>/<language>/LC_MESSAGES/<domain>.mo` convention.
use std::{
    borrow::Cow,
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use fluent_bundle::{concurrent::FluentBundle, FluentResource};
use unic_langid::LanguageIdentifier;

/// Used when no locale root is configured
pub const DEFAULT_LOCALE_ROOT: &str = "./translations";

const EXTENSION: &str = "ftl";

/// Upper bound of catalog files looked up per request, misses hit the file system every time
const MAX_CANDIDATES: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum CatalogLoadError {
    #[error("No translation catalog found for domain \"{domain}\" in {}", locale_root.display())]
    NotFound {
        domain: Arc<str>,
        locale_root: PathBuf,
    },
    #[error("Error reading translation catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error parsing translation catalog {} ({count} syntax errors)", path.display())]
    Parse { path: PathBuf, count: usize },
}

/// Everything a catalog constructor gets to know about the current request
#[derive(Debug)]
pub struct CatalogRequest<'a> {
    pub domain: &'a str,
    pub locale_root: Option<&'a Path>,
    pub locales: &'a [Arc<str>],
    /// Return [`Translations::Null`] instead of failing when no catalog exists
    pub fallback: bool,
}

/// Strategy for turning a [`CatalogRequest`] into a catalog handle
pub trait BuildCatalog: Send + Sync {
    fn build(&self, request: &CatalogRequest<'_>) -> Result<Translations, CatalogLoadError>;
}

/// A loaded catalog, one bundle per matching locale in preference order
pub struct Catalog {
    bundles: Vec<FluentBundle<Arc<FluentResource>>>,
}

impl Catalog {
    fn translate<'a>(&'a self, key: &'a str) -> Option<Cow<'a, str>> {
        self.bundles.iter().find_map(|bundle| {
            let pattern = bundle.get_message(key)?.value()?;
            let mut errors = Vec::new();
            let value = bundle.format_pattern(pattern, None, &mut errors);
            if !errors.is_empty() {
                tracing::warn!("Errors formatting translation for \"{key}\": {errors:?}");
            }
            Some(value)
        })
    }

    pub fn locales(&self) -> impl Iterator<Item = &LanguageIdentifier> {
        self.bundles.iter().filter_map(|bundle| bundle.locales.first())
    }
}

/// Handle to the translations of a request. Lookups that find nothing return the key itself.
#[derive(Clone, Default)]
pub enum Translations {
    Fluent(Arc<Catalog>),
    #[default]
    Null,
}

impl Translations {
    pub fn translate<'a>(&'a self, key: &'a str) -> Cow<'a, str> {
        match self {
            Translations::Fluent(catalog) => catalog.translate(key).unwrap_or(Cow::Borrowed(key)),
            Translations::Null => Cow::Borrowed(key),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Translations::Null)
    }
}

impl std::fmt::Debug for Translations {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Translations::Fluent(catalog) => formatter
                .debug_tuple("Fluent")
                .field(&catalog.locales().collect::<Vec<_>>())
                .finish(),
            Translations::Null => formatter.write_str("Null"),
        }
    }
}

/// Locale identifiers are user controlled so they must never be able to leave the locale root
fn is_safe_path_segment(locale: &str) -> bool {
    !locale.is_empty()
        && locale != "."
        && !locale.contains("..")
        && !locale.contains(['/', '\\', '\0'])
}

/// Expands `de-DE` into `de-DE, de` for every locale, keeping the first occurrence of each
fn candidates(locales: &[Arc<str>]) -> Vec<&str> {
    let mut candidates: Vec<&str> = Vec::with_capacity(MAX_CANDIDATES);

    for locale in locales {
        if candidates.len() >= MAX_CANDIDATES {
            tracing::debug!("Not looking up more than {MAX_CANDIDATES} catalog candidates");
            break;
        }

        let locale: &str = locale.as_ref();
        let language = locale.split(['-', '_']).next().unwrap_or(locale);

        for candidate in [locale, language] {
            if !is_safe_path_segment(candidate) {
                tracing::warn!("Ignoring locale \"{candidate}\" that is not a valid directory name");
                continue;
            }

            if !candidates.contains(&candidate) && candidates.len() < MAX_CANDIDATES {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

/// The default catalog constructor. Parsed resources are kept for the lifetime of the loader so
/// files are only read once.
#[derive(Default)]
pub struct FluentLoader {
    resources: Mutex<HashMap<PathBuf, Arc<FluentResource>>>,
}

impl FluentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self, path: &Path) -> Result<Option<Arc<FluentResource>>, CatalogLoadError> {
        if let Some(resource) = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok(Some(resource.clone()));
        }

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CatalogLoadError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let resource = FluentResource::try_new(source).map_err(|(_, errors)| {
            CatalogLoadError::Parse {
                path: path.to_owned(),
                count: errors.len(),
            }
        })?;

        tracing::debug!("Loaded translation catalog {}", path.display());
        let resource = Arc::new(resource);
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), resource.clone());

        Ok(Some(resource))
    }
}

impl BuildCatalog for FluentLoader {
    fn build(&self, request: &CatalogRequest<'_>) -> Result<Translations, CatalogLoadError> {
        let root = request
            .locale_root
            .unwrap_or_else(|| Path::new(DEFAULT_LOCALE_ROOT));

        let file_name = format!("{}.{EXTENSION}", request.domain);
        let candidates = if is_safe_path_segment(request.domain) {
            candidates(request.locales)
        } else {
            tracing::warn!("Ignoring domain \"{}\" that is not a valid file name", request.domain);
            Vec::new()
        };

        let mut bundles = Vec::new();
        for locale in candidates {
            let path = root.join(locale).join(&file_name);

            let Some(resource) = self.load(&path)? else {
                continue;
            };

            let identifier: LanguageIdentifier = locale.parse().unwrap_or_else(|error| {
                tracing::warn!("Locale \"{locale}\" is not a valid language identifier: {error}");
                LanguageIdentifier::default()
            });

            let mut bundle = FluentBundle::new_concurrent(vec![identifier]);
            // Unicode isolation marks only make sense when the text is embedded in bidi content
            bundle.set_use_isolating(false);
            if let Err(errors) = bundle.add_resource(resource) {
                tracing::warn!("Overriding messages in {}: {errors:?}", path.display());
            }
            bundles.push(bundle);
        }

        if !bundles.is_empty() {
            return Ok(Translations::Fluent(Arc::new(Catalog { bundles })));
        }

        if request.fallback {
            return Ok(Translations::Null);
        }

        Err(CatalogLoadError::NotFound {
            domain: Arc::from(request.domain),
            locale_root: root.to_owned(),
        })
    }
}
