use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use localization::{
    localize, session,
    translation::{BuildCatalog, CatalogRequest, FluentLoader},
    CatalogLoadError, Locales, Localization, PreferenceEndpoint, TranslationConfiguration,
    Translations,
};
use tempfile::TempDir;
use tower::ServiceExt;

async fn dump(Locales(locales): Locales, translations: Translations) -> impl IntoResponse {
    let locales = locales
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(",");

    (
        [
            ("x-locales", locales),
            ("x-hello", translations.translate("hello").into_owned()),
        ],
        (),
    )
}

fn build_app(config: TranslationConfiguration, endpoint: PreferenceEndpoint) -> Router {
    Router::new()
        .route("/dump", get(dump))
        .route("/teapot", get(|| async { StatusCode::IM_A_TEAPOT }))
        .merge(endpoint.router())
        .layer(middleware::from_fn_with_state(
            Arc::new(Localization::new(config)),
            localize,
        ))
        .layer(middleware::from_fn(session::manage))
}

/// Keeps the session cookie between requests like a browser would
struct Client {
    app: Router,
    cookie: Option<String>,
    locale_root: TempDir,
}

impl Client {
    fn new() -> Self {
        Self::with(|config| config, PreferenceEndpoint::default())
    }

    fn with(
        configure: impl FnOnce(TranslationConfiguration) -> TranslationConfiguration,
        endpoint: PreferenceEndpoint,
    ) -> Self {
        let locale_root = tempfile::tempdir().unwrap();
        let config = configure(
            TranslationConfiguration::new("messages").locale_root(locale_root.path()),
        );

        Self {
            app: build_app(config, endpoint),
            cookie: None,
            locale_root,
        }
    }

    fn locale_root(&self) -> &Path {
        self.locale_root.path()
    }

    async fn get(&mut self, uri: &str, accept_language: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri).header(header::HOST, "localhost");
        if let Some(accept_language) = accept_language {
            builder = builder.header(header::ACCEPT_LANGUAGE, accept_language);
        }
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        let response = self
            .app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_owned());
        }

        response
    }
}

fn header_value<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn locale_parsing() {
    let mut client = Client::new();
    let response = client.get("/dump", Some("en;q=0.5, de-DE;q=1.0")).await;
    assert_eq!(header_value(&response, "x-locales"), "de-DE,en");
}

#[tokio::test]
async fn invalid_locales() {
    let mut client = Client::new();
    let response = client.get("/dump", Some("en;q=0.5, de-DE;q=abc")).await;
    assert_eq!(header_value(&response, "x-locales"), "en");
}

#[tokio::test]
async fn no_locales() {
    let mut client = Client::new();
    let response = client.get("/dump", None).await;
    assert_eq!(header_value(&response, "x-locales"), "");
}

#[tokio::test]
async fn preferred_locales() {
    let mut client = Client::new();
    client.get("/set_locales?locales=en,de", None).await;
    let response = client.get("/dump", Some("fr")).await;
    assert_eq!(header_value(&response, "x-locales"), "en,de");
}

#[tokio::test]
async fn translations_without_catalog() {
    let mut client = Client::new();
    let response = client.get("/dump", None).await;
    assert_eq!(header_value(&response, "x-hello"), "hello");
}

#[tokio::test]
async fn translations_from_catalog() {
    let mut client = Client::new();
    let directory = client.locale_root().join("de");
    fs::create_dir_all(&directory).unwrap();
    fs::write(directory.join("messages.ftl"), "hello = Hallo\n").unwrap();

    let response = client.get("/dump", Some("de-CH, en;q=0.8")).await;
    assert_eq!(header_value(&response, "x-hello"), "Hallo");

    let response = client.get("/dump", Some("en")).await;
    assert_eq!(header_value(&response, "x-hello"), "hello");
}

#[tokio::test]
async fn missing_catalog_without_fallback_fails_request() {
    let mut client = Client::with(|config| config.fallback(false), PreferenceEndpoint::default());
    let response = client.get("/dump", Some("en")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn domain_depends_on_request() {
    let mut client = Client::with(
        |config| {
            config.get_domain(|parts| {
                (parts.uri.path() == "/dump").then(|| Arc::from("admin"))
            })
        },
        PreferenceEndpoint::default(),
    );
    let directory = client.locale_root().join("en");
    fs::create_dir_all(&directory).unwrap();
    fs::write(directory.join("admin.ftl"), "hello = Hello admin\n").unwrap();
    fs::write(directory.join("messages.ftl"), "hello = Hello\n").unwrap();

    let response = client.get("/dump", Some("en")).await;
    assert_eq!(header_value(&response, "x-hello"), "Hello admin");
}

#[tokio::test]
async fn responses_pass_through() {
    let mut client = Client::new();
    let response = client.get("/teapot", Some("en")).await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
}

#[tokio::test]
async fn good_redirect_without_authority() {
    let mut client = Client::new();
    let response = client.get("/set_locales?locales=en&redirect=/dump", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header_value(&response, "location"), "/dump");

    let response = client.get("/dump", None).await;
    assert_eq!(header_value(&response, "x-locales"), "en");
}

#[tokio::test]
async fn good_redirect_with_authority() {
    let mut client = Client::new();
    let response = client
        .get("/set_locales?locales=en&redirect=http://localhost/dump", None)
        .await;
    assert_eq!(header_value(&response, "location"), "http://localhost/dump");

    let response = client.get("/dump", None).await;
    assert_eq!(header_value(&response, "x-locales"), "en");
}

#[tokio::test]
async fn malicious_redirect() {
    let mut client = Client::new();
    let response = client
        .get(
            "/set_locales?locales=en&redirect=http://somemaliciousurl.com",
            None,
        )
        .await;
    assert_eq!(header_value(&response, "location"), "/");
}

#[tokio::test]
async fn endpoint_without_locales() {
    let mut client = Client::new();
    client.get("/set_locales?locales=en", None).await;
    client.get("/set_locales", None).await;
    let response = client.get("/dump", None).await;
    assert_eq!(header_value(&response, "x-locales"), "");
}

#[tokio::test]
async fn configured_redirect_response() {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    let endpoint = PreferenceEndpoint::default()
        .status_code(StatusCode::FOUND)
        .default_redirect_url(HeaderValue::from_static("/home"))
        .additional_headers(headers);

    let mut client = Client::with(|config| config, endpoint);
    let response = client.get("/set_locales?locales=en", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(header_value(&response, "location"), "/home");
    assert_eq!(header_value(&response, "cache-control"), "no-store");
}

#[tokio::test]
async fn custom_preference_hooks() {
    let stored: Arc<Mutex<Vec<Arc<str>>>> = Arc::default();

    let written = stored.clone();
    let endpoint = PreferenceEndpoint::default()
        .default_locales(vec![Arc::from("pt-BR")])
        .write_preferred_locales(move |_parts, locales| {
            *written.lock().unwrap() = locales.to_vec();
        });

    let read = stored.clone();
    let locale_root = tempfile::tempdir().unwrap();
    let localization = Localization::new(
        TranslationConfiguration::new("messages").locale_root(locale_root.path()),
    )
    .read_preferred_locales(move |_parts| read.lock().unwrap().clone());

    let app = Router::new()
        .route("/dump", get(dump))
        .merge(endpoint.router())
        .layer(middleware::from_fn_with_state(Arc::new(localization), localize));

    let request = Request::builder()
        .uri("/set_locales")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(*stored.lock().unwrap(), [Arc::<str>::from("pt-BR")]);

    let request = Request::builder()
        .uri("/dump")
        .header(header::ACCEPT_LANGUAGE, "fr")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(header_value(&response, "x-locales"), "pt-BR");
}

#[derive(Debug, PartialEq)]
struct RecordedRequest {
    domain: String,
    locale_root: Option<PathBuf>,
    locales: Vec<String>,
    fallback: bool,
}

/// Records what it was asked for and serves catalogs from its own directory
struct RecordingCatalog {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    catalogs: PathBuf,
}

impl BuildCatalog for RecordingCatalog {
    fn build(&self, request: &CatalogRequest<'_>) -> Result<Translations, CatalogLoadError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            domain: request.domain.to_owned(),
            locale_root: request.locale_root.map(Path::to_path_buf),
            locales: request.locales.iter().map(ToString::to_string).collect(),
            fallback: request.fallback,
        });

        FluentLoader::new().build(&CatalogRequest {
            domain: "recorded",
            locale_root: Some(&self.catalogs),
            locales: request.locales,
            fallback: false,
        })
    }
}

#[tokio::test]
async fn custom_catalog_constructor() {
    let catalogs = tempfile::tempdir().unwrap();
    fs::create_dir_all(catalogs.path().join("fr")).unwrap();
    fs::write(
        catalogs.path().join("fr").join("recorded.ftl"),
        "hello = Bonjour\n",
    )
    .unwrap();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let config = TranslationConfiguration::new("messages")
        .locale_root("/srv/locales")
        .get_domain(|_| Some(Arc::from("admin")))
        .fallback(false)
        .catalog(RecordingCatalog {
            requests: requests.clone(),
            catalogs: catalogs.path().to_path_buf(),
        });
    let app = build_app(config, PreferenceEndpoint::default());

    let request = Request::builder()
        .uri("/dump")
        .header(header::ACCEPT_LANGUAGE, "de;q=0.4, fr")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "x-hello"), "Bonjour");
    assert_eq!(
        *requests.lock().unwrap(),
        [RecordedRequest {
            domain: "admin".to_owned(),
            locale_root: Some(PathBuf::from("/srv/locales")),
            locales: vec!["fr".to_owned(), "de".to_owned()],
            fallback: false,
        }]
    );
}
