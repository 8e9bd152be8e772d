use std::time::Duration;

use dremio_common::config::ClientConfig;
use dremio_telemetry::common::{
    ContextPropagationHeader, SpanAttribute, SpanKind, SpanStatusCode,
};
use fastrace::collector::SpanContext;
use fastrace::future::FutureExt;
use fastrace::local::LocalSpan;
use fastrace::Span;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect, Client, Method, Proxy, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::connection::{ConnectionExtra, ConnectionRecord};
use crate::credential::{AuthKind, AuthToken, CredentialResolver};
use crate::error::{DremioError, DremioResult};
use crate::status::{JobStatus, ReflectionRefreshStatus};

const DEFAULT_MAX_REDIRECTS: usize = 30;
const PROVIDER_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-v", env!("CARGO_PKG_VERSION"));

/// HTTP session settings, from the application config and the connection extra.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_version: String,
    pub login_path: String,
    pub request_timeout: Option<Duration>,
    pub verify_tls: bool,
    pub proxy: Option<Value>,
    pub max_redirects: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl ClientOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            api_version: config.api_version.clone(),
            login_path: config.login_path.clone(),
            request_timeout: config.request_timeout(),
            verify_tls: true,
            proxy: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn with_extra(mut self, extra: &ConnectionExtra) -> Self {
        if let Some(verify) = extra.verify {
            self.verify_tls = verify;
        }
        if let Some(proxy) = &extra.proxy {
            self.proxy = Some(proxy.clone());
        }
        if let Some(max_redirects) = extra.max_redirects {
            self.max_redirects = max_redirects;
        }
        if let Some(timeout) = extra.timeout.filter(|t| *t > 0) {
            self.request_timeout = Some(Duration::from_secs(timeout));
        }
        self
    }

    pub fn build_http_client(&self) -> DremioResult<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(PROVIDER_USER_AGENT));

        let mut builder = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!self.verify_tls)
            .redirect(redirect::Policy::limited(self.max_redirects));
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        for proxy in self.proxies()? {
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| DremioError::Connection(format!("failed to build HTTP client: {e}")))
    }

    fn proxies(&self) -> DremioResult<Vec<Proxy>> {
        let invalid = |e: reqwest::Error| DremioError::InvalidArgument(format!("invalid proxy: {e}"));
        match &self.proxy {
            None | Some(Value::Null) => Ok(vec![]),
            Some(Value::String(url)) if url.is_empty() => Ok(vec![]),
            Some(Value::String(url)) => Ok(vec![Proxy::all(url.as_str()).map_err(invalid)?]),
            Some(Value::Object(map)) => {
                let mut proxies = vec![];
                for (scheme, url) in map {
                    let Some(url) = url.as_str() else {
                        return Err(DremioError::InvalidArgument(format!(
                            "proxy for '{scheme}' must be a string"
                        )));
                    };
                    let proxy = match scheme.as_str() {
                        "http" => Proxy::http(url),
                        "https" => Proxy::https(url),
                        "all" => Proxy::all(url),
                        _ => {
                            warn!("ignoring proxy for unsupported scheme {scheme}");
                            continue;
                        }
                    };
                    proxies.push(proxy.map_err(invalid)?);
                }
                Ok(proxies)
            }
            Some(other) => Err(DremioError::InvalidArgument(format!(
                "proxy must be a URL or an object, got {other}"
            ))),
        }
    }
}

macro_rules! json_document {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Map<String, Value>);

        impl $name {
            pub fn new(fields: Map<String, Value>) -> Self {
                Self(fields)
            }

            pub fn from_value(value: Value) -> DremioResult<Self> {
                match value {
                    Value::Object(fields) => Ok(Self(fields)),
                    other => Err(DremioError::InvalidArgument(format!(
                        "{} must be a JSON object, got {other}",
                        $kind
                    ))),
                }
            }

            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }

            pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
                self.0.insert(key.into(), value)
            }

            pub fn id(&self) -> Option<&str> {
                self.get_str("id")
            }

            pub fn name(&self) -> Option<&str> {
                self.get_str("name")
            }

            pub fn get_str(&self, key: &str) -> Option<&str> {
                self.0.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
            }

            pub fn fields(&self) -> &Map<String, Value> {
                &self.0
            }

            pub fn into_fields(self) -> Map<String, Value> {
                self.0
            }
        }
    };
}

json_document!(
    /// A reflection definition, forwarded to Dremio as is.
    ReflectionSpec,
    "reflection spec"
);

json_document!(
    /// A source definition, forwarded to Dremio as is apart from `entityType`.
    SourceSpec,
    "source spec"
);

#[derive(Debug, Clone)]
pub struct ReflectionSummary {
    pub id: String,
    pub status: Option<ReflectionRefreshStatus>,
    pub body: Value,
}

impl ReflectionSummary {
    fn from_body(body: Value) -> DremioResult<Self> {
        let id = string_field(&body, "id", "reflection")?;
        let status = match ReflectionRefreshStatus::from_reflection(&body) {
            Ok(status) => status,
            Err(e) => {
                warn!("ignoring the status of reflection {id}: {e}");
                None
            }
        };
        Ok(Self { id, status, body })
    }
}

#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub id: String,
    pub body: Value,
}

fn string_field(body: &Value, key: &str, entity: &str) -> DremioResult<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            DremioError::InvalidResponse(format!("{entity} response does not contain '{key}'"))
        })
}

/// A client for the Dremio REST API, authenticated for a single connection.
pub struct DremioClient {
    http: Client,
    base_url: Url,
    api_url: Url,
    auth_kind: AuthKind,
    authorization: HeaderValue,
    conn_id: Option<String>,
}

impl DremioClient {
    /// Resolves the connection credentials and returns an authenticated client.
    pub async fn connect(connection: &ConnectionRecord, config: &ClientConfig) -> DremioResult<Self> {
        let options = ClientOptions::from_config(config).with_extra(&connection.extra()?);
        let http = options.build_http_client()?;
        let base_url = connection.base_url()?;
        let login_url = join_url(&base_url, &options.login_path)?;
        let token = CredentialResolver::new(&http, login_url)
            .resolve(connection)
            .await?;
        Ok(Self::try_new(http, base_url, &options.api_version, &token)?
            .with_conn_id(connection.conn_id.clone()))
    }

    pub fn try_new(
        http: Client,
        base_url: Url,
        api_version: &str,
        token: &AuthToken,
    ) -> DremioResult<Self> {
        let api_url = join_url(&base_url, &format!("{}/", api_version.trim_matches('/')))?;
        Ok(Self {
            http,
            base_url,
            api_url,
            auth_kind: token.kind(),
            authorization: token.header_value()?,
            conn_id: None,
        })
    }

    /// Tags the request spans of this client with a connection id.
    pub fn with_conn_id(mut self, conn_id: impl Into<String>) -> Self {
        self.conn_id = Some(conn_id.into()).filter(|id| !id.is_empty());
        self
    }

    pub fn conn_id(&self) -> Option<&str> {
        self.conn_id.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn auth_kind(&self) -> AuthKind {
        self.auth_kind
    }

    fn endpoint<I>(&self, segments: I) -> DremioResult<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                DremioError::InvalidArgument(format!("cannot build a path on {}", self.api_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> DremioResult<Value> {
        let conn_id = self.conn_id.clone();
        let span = Span::enter_with_local_parent(format!("{} {}", method, url.path()))
            .with_properties(|| {
                [
                    (SpanAttribute::SPAN_KIND, SpanKind::CLIENT.to_string()),
                    (SpanAttribute::HTTP_REQUEST_METHOD, method.to_string()),
                    (SpanAttribute::URL_PATH, url.path().to_string()),
                ]
            })
            .with_properties(|| {
                conn_id
                    .into_iter()
                    .map(|id| (SpanAttribute::DREMIO_CONNECTION_ID, id))
            });
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, self.authorization.clone());
        if let Some(context) = SpanContext::from_span(&span) {
            if let Ok(value) = HeaderValue::from_str(&context.encode_w3c_traceparent()) {
                request = request.header(ContextPropagationHeader::TRACEPARENT, value);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        async move {
            debug!("{method} {url}");
            let response = request.send().await.inspect_err(record_error)?;
            let status = response.status();
            LocalSpan::add_property(|| {
                (
                    SpanAttribute::HTTP_RESPONSE_STATUS_CODE,
                    status.as_u16().to_string(),
                )
            });
            let text = response.text().await.inspect_err(record_error)?;
            if !status.is_success() {
                let error = DremioError::from_status(status, text);
                record_error(&error);
                return Err(error);
            }
            LocalSpan::add_property(|| (SpanAttribute::SPAN_STATUS_CODE, SpanStatusCode::OK));
            if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
                return Ok(Value::Object(Map::new()));
            }
            Ok(serde_json::from_str(&text)?)
        }
        .in_span(span)
        .await
    }

    async fn get(&self, url: Url) -> DremioResult<Value> {
        self.execute(Method::GET, url, None).await
    }

    async fn post(&self, url: Url, body: &Value) -> DremioResult<Value> {
        self.execute(Method::POST, url, Some(body)).await
    }

    async fn put(&self, url: Url, body: &Value) -> DremioResult<Value> {
        self.execute(Method::PUT, url, Some(body)).await
    }

    /// Creates the reflection, or replaces it when the spec carries an `id`.
    pub async fn upsert_reflection(&self, spec: &ReflectionSpec) -> DremioResult<ReflectionSummary> {
        let body = match spec.id() {
            Some(id) => self.update_reflection(id, spec).await?,
            None => self.create_reflection(spec).await?,
        };
        ReflectionSummary::from_body(body)
    }

    pub async fn create_reflection(&self, spec: &ReflectionSpec) -> DremioResult<Value> {
        let url = self.endpoint(["reflection"])?;
        self.post(url, &serde_json::to_value(spec)?).await
    }

    pub async fn update_reflection(&self, id: &str, spec: &ReflectionSpec) -> DremioResult<Value> {
        let url = self.endpoint(["reflection", id])?;
        self.put(url, &serde_json::to_value(spec)?).await
    }

    pub async fn get_reflection(&self, id: &str) -> DremioResult<Value> {
        let url = self.endpoint(["reflection", id])?;
        self.get(url).await
    }

    pub async fn get_reflection_status(&self, id: &str) -> DremioResult<ReflectionRefreshStatus> {
        let body = self.get_reflection(id).await?;
        let status = ReflectionRefreshStatus::from_reflection(&body)?.ok_or_else(|| {
            DremioError::InvalidResponse(format!(
                "reflection {id} response does not contain 'status.combinedStatus'"
            ))
        })?;
        info!("current status of reflection refresh {id}: {status}");
        Ok(status)
    }

    /// Lists the reflections defined on a dataset.
    pub async fn get_dataset_reflections(&self, dataset_id: &str) -> DremioResult<Vec<Value>> {
        let url = self.endpoint(["dataset", dataset_id, "reflection"])?;
        let body = self.get(url).await?;
        match body.get("data") {
            Some(Value::Array(items)) => Ok(items.clone()),
            None | Some(Value::Null) => Ok(vec![]),
            Some(_) => Err(DremioError::InvalidResponse(format!(
                "reflections of dataset {dataset_id} are not a list"
            ))),
        }
    }

    /// Lists the reflections of the dataset at a dotted or slash-separated path.
    pub async fn get_reflections_for_source(&self, path: &str) -> DremioResult<Vec<Value>> {
        let dataset = self.get_catalog_by_path(path).await?;
        let dataset_id = string_field(&dataset, "id", "catalog")?;
        self.get_dataset_reflections(&dataset_id).await
    }

    pub async fn trigger_reflection_refresh(&self, dataset_id: &str) -> DremioResult<Value> {
        info!("triggering reflection refresh for dataset {dataset_id}");
        let url = self.endpoint(["catalog", dataset_id, "refresh"])?;
        self.execute(Method::POST, url, None).await
    }

    /// Creates a source. A source with the same name yields [`DremioError::Conflict`].
    pub async fn create_source(&self, spec: &SourceSpec) -> DremioResult<SourceSummary> {
        let mut spec = spec.clone();
        spec.insert("entityType", json!("source"));
        let url = self.endpoint(["catalog"])?;
        let body = self.post(url, &serde_json::to_value(&spec)?).await?;
        let id = string_field(&body, "id", "source")?;
        Ok(SourceSummary { id, body })
    }

    pub async fn get_catalog(&self, id: &str) -> DremioResult<Value> {
        let url = self.endpoint(["catalog", id])?;
        self.get(url).await
    }

    pub async fn get_catalog_by_path(&self, path: &str) -> DremioResult<Value> {
        let segments = path.split(['.', '/']).filter(|s| !s.is_empty());
        let url = self.endpoint(["catalog", "by-path"].into_iter().chain(segments))?;
        self.get(url).await
    }

    /// Looks up a top-level catalog entry such as a source or a space.
    /// The name is a single path segment even when it contains `.` or `/`.
    pub async fn get_catalog_by_name(&self, name: &str) -> DremioResult<Value> {
        let url = self.endpoint(["catalog", "by-path", name])?;
        self.get(url).await
    }

    pub async fn update_catalog(&self, id: &str, body: &Value) -> DremioResult<Value> {
        let url = self.endpoint(["catalog", id])?;
        self.put(url, body).await
    }

    /// Submits a SQL statement and returns the id of the job running it.
    pub async fn execute_sql(&self, sql: &str, context: Option<&[String]>) -> DremioResult<String> {
        info!("executing SQL query {sql}");
        let mut body = json!({ "sql": sql });
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            body["context"] = json!(context);
        }
        let url = self.endpoint(["sql"])?;
        let response = self.post(url, &body).await?;
        string_field(&response, "id", "SQL")
    }

    pub async fn refresh_table_metadata(
        &self,
        table: &str,
        context: Option<&[String]>,
    ) -> DremioResult<String> {
        let job_id = self
            .execute_sql(&format!("ALTER TABLE {table} REFRESH METADATA"), context)
            .await?;
        info!("job id for {table} metadata refresh is {job_id}");
        Ok(job_id)
    }

    /// Sets a support key, where `level` is typically `system` or `session`.
    pub async fn set_property(&self, name: &str, value: &str, level: &str) -> DremioResult<String> {
        let sql = format!("ALTER {} SET {name} = {value}", level.to_uppercase());
        self.execute_sql(&sql, None).await
    }

    pub async fn unset_property(&self, name: &str, level: &str) -> DremioResult<String> {
        let sql = format!("ALTER {} RESET {name}", level.to_uppercase());
        self.execute_sql(&sql, None).await
    }

    pub async fn get_job_status(&self, job_id: &str) -> DremioResult<JobStatus> {
        let url = self.endpoint(["job", job_id])?;
        let body = self.get(url).await?;
        JobStatus::from_body(body)
    }

    pub async fn get_job_results(&self, job_id: &str) -> DremioResult<Value> {
        let url = self.endpoint(["job", job_id, "results"])?;
        self.get(url).await
    }
}

fn record_error<E: std::fmt::Display>(error: &E) {
    let description = error.to_string();
    LocalSpan::add_properties(|| {
        [
            (SpanAttribute::SPAN_STATUS_CODE, SpanStatusCode::ERROR.to_string()),
            (SpanAttribute::SPAN_STATUS_DESCRIPTION, description),
        ]
    });
}

fn join_url(base: &Url, path: &str) -> DremioResult<Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| DremioError::InvalidArgument(format!("invalid path '{path}': {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::sync::{Arc, Mutex};

    use fastrace::collector::{Config, Reporter, SpanRecord};
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::status::{JobState, KnownJobState};

    fn client_for(server: &MockServer) -> DremioClient {
        let base_url = Url::parse(&format!("{}/", server.uri())).unwrap();
        let http = ClientOptions::default().build_http_client().unwrap();
        let token = AuthToken::new(AuthKind::AuthToken, "tok");
        DremioClient::try_new(http, base_url, "api/v3", &token).unwrap()
    }

    fn reflection_spec(value: Value) -> ReflectionSpec {
        ReflectionSpec::from_value(value).unwrap()
    }

    #[test]
    fn test_endpoint() {
        let base_url = Url::parse("http://dremio:9047/").unwrap();
        let token = AuthToken::new(AuthKind::Pat, "tok");
        let client = DremioClient::try_new(Client::new(), base_url, "/api/v3/", &token).unwrap();
        assert_eq!(client.api_url().as_str(), "http://dremio:9047/api/v3/");
        assert_eq!(
            client.endpoint(["job", "abc", "results"]).unwrap().as_str(),
            "http://dremio:9047/api/v3/job/abc/results"
        );
        assert_eq!(
            client.endpoint(["catalog", "by-path", "my space"]).unwrap().as_str(),
            "http://dremio:9047/api/v3/catalog/by-path/my%20space"
        );
    }

    #[test]
    fn test_options_with_extra() {
        let extra = ConnectionExtra {
            verify: Some(false),
            max_redirects: Some(5),
            timeout: Some(30),
            proxy: Some(json!({"https": "http://proxy:3128"})),
            ..Default::default()
        };
        let options = ClientOptions::default().with_extra(&extra);
        assert!(!options.verify_tls);
        assert_eq!(options.max_redirects, 5);
        assert_eq!(options.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.proxies().unwrap().len(), 1);

        let options = ClientOptions {
            proxy: Some(json!(42)),
            ..Default::default()
        };
        assert!(matches!(
            options.proxies(),
            Err(DremioError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_spec_must_be_object() {
        assert!(matches!(
            ReflectionSpec::from_value(json!(["name"])),
            Err(DremioError::InvalidArgument(_))
        ));
        let spec = reflection_spec(json!({"id": "", "name": "r"}));
        assert_eq!(spec.id(), None);
        assert_eq!(spec.name(), Some("r"));
    }

    #[tokio::test]
    async fn test_upsert_reflection_creates_without_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/reflection"))
            .and(header("authorization", "_dremiotok"))
            .and(header("content-type", "application/json"))
            .and(header("user-agent", PROVIDER_USER_AGENT))
            .and(body_json(json!({"name": "r", "type": "RAW"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r1",
                "status": {"combinedStatus": "REFRESHING"},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = client_for(&server)
            .upsert_reflection(&reflection_spec(json!({"name": "r", "type": "RAW"})))
            .await
            .unwrap();

        assert_eq!(summary.id, "r1");
        assert_eq!(summary.status, Some(ReflectionRefreshStatus::Refreshing));
    }

    #[tokio::test]
    async fn test_upsert_reflection_updates_with_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v3/reflection/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1"})))
            .expect(1)
            .mount(&server)
            .await;

        let summary = client_for(&server)
            .upsert_reflection(&reflection_spec(json!({"id": "r1", "name": "r"})))
            .await
            .unwrap();

        assert_eq!(summary.id, "r1");
        assert_eq!(summary.status, None);
    }

    #[tokio::test]
    async fn test_upsert_reflection_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/reflection"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad spec"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .upsert_reflection(&reflection_spec(json!({"name": "r"})))
            .await;

        match result {
            Err(DremioError::Api { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad spec");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_source_sets_entity_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/catalog"))
            .and(body_partial_json(json!({"entityType": "source", "name": "lake"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "s1", "name": "lake"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let spec = SourceSpec::from_value(json!({"name": "lake", "type": "S3"})).unwrap();
        let summary = client_for(&server).create_source(&spec).await.unwrap();

        assert_eq!(summary.id, "s1");
        assert_eq!(summary.body["name"], "lake");
    }

    #[tokio::test]
    async fn test_create_source_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/catalog"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "errorMessage": "There already is an existing source with name lake.",
            })))
            .mount(&server)
            .await;

        let spec = SourceSpec::from_value(json!({"name": "lake", "type": "S3"})).unwrap();
        let result = client_for(&server).create_source(&spec).await;

        assert!(matches!(result, Err(DremioError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_get_job_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/job/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobState": "RUNNING",
                "rowCount": 0,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/job/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let status = client.get_job_status("j1").await.unwrap();
        assert_eq!(status.state, JobState::known(KnownJobState::Running));
        assert_eq!(status.body["rowCount"], 0);

        assert!(matches!(
            client.get_job_status("missing").await,
            Err(DremioError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_no_content_is_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/catalog/d1/refresh"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server)
            .trigger_reflection_refresh("d1")
            .await
            .unwrap();

        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_reflections_for_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/catalog/by-path/space/folder/table"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "d1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/dataset/d1/reflection"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "r1", "name": "raw"}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reflections = client_for(&server)
            .get_reflections_for_source("space.folder.table")
            .await
            .unwrap();

        assert_eq!(reflections, vec![json!({"id": "r1", "name": "raw"})]);
    }

    #[tokio::test]
    async fn test_execute_sql() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/sql"))
            .and(body_json(json!({
                "sql": "ALTER TABLE s.t REFRESH METADATA",
                "context": ["s"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "j1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v3/sql"))
            .and(body_json(json!({"sql": "ALTER SYSTEM RESET planner.slice_target"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "j2"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let context = vec!["s".to_string()];
        assert_eq!(
            client
                .refresh_table_metadata("s.t", Some(&context))
                .await
                .unwrap(),
            "j1"
        );
        assert_eq!(
            client
                .unset_property("planner.slice_target", "system")
                .await
                .unwrap(),
            "j2"
        );
    }

    #[tokio::test]
    async fn test_reflection_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/reflection/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r1",
                "status": {"combinedStatus": "CAN_ACCELERATE"},
            })))
            .mount(&server)
            .await;

        let status = client_for(&server).get_reflection_status("r1").await.unwrap();
        assert_eq!(status, ReflectionRefreshStatus::CanAccelerate);
    }

    #[tokio::test]
    async fn test_connect_with_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apiv2/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t0k"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/catalog/c1"))
            .and(header("authorization", "_dremiot0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1"})))
            .expect(1)
            .mount(&server)
            .await;

        let connection = ConnectionRecord::new("dremio_default", server.uri())
            .with_login("user", "pass");
        let client = DremioClient::connect(&connection, &ClientConfig::default())
            .await
            .unwrap();

        assert_eq!(client.auth_kind(), AuthKind::AuthToken);
        assert_eq!(client.get_catalog("c1").await.unwrap()["id"], "c1");
    }

    #[tokio::test]
    async fn test_get_catalog_by_name_keeps_dots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/catalog/by-path/lake.v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s1"})))
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server)
            .get_catalog_by_name("lake.v2")
            .await
            .unwrap();
        assert_eq!(body["id"], "s1");
    }

    struct CollectingReporter(Arc<Mutex<Vec<SpanRecord>>>);

    impl Reporter for CollectingReporter {
        fn report(&mut self, spans: Vec<SpanRecord>) {
            self.0.lock().unwrap().extend(spans);
        }
    }

    #[tokio::test]
    async fn test_request_span_properties() {
        let collected = Arc::new(Mutex::new(vec![]));
        fastrace::set_reporter(CollectingReporter(Arc::clone(&collected)), Config::default());

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/job/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobState": "RUNNING"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/job/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server).with_conn_id("dremio_default");
        let root = Span::root("job status", SpanContext::random());
        async {
            client.get_job_status("j1").await.unwrap();
            assert!(client.get_job_status("gone").await.is_err());
        }
        .in_span(root)
        .await;
        fastrace::flush();

        let spans = collected.lock().unwrap();
        let property = |name: &str, key: &str| -> Option<String> {
            spans
                .iter()
                .find(|span| span.name == name)?
                .properties
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.to_string())
        };
        let found = "GET /api/v3/job/j1";
        assert_eq!(
            property(found, SpanAttribute::DREMIO_CONNECTION_ID).as_deref(),
            Some("dremio_default")
        );
        assert_eq!(
            property(found, SpanAttribute::HTTP_REQUEST_METHOD).as_deref(),
            Some("GET")
        );
        assert_eq!(
            property(found, SpanAttribute::HTTP_RESPONSE_STATUS_CODE).as_deref(),
            Some("200")
        );
        assert_eq!(
            property(found, SpanAttribute::SPAN_STATUS_CODE).as_deref(),
            Some(SpanStatusCode::OK)
        );
        let missing = "GET /api/v3/job/gone";
        assert_eq!(
            property(missing, SpanAttribute::HTTP_RESPONSE_STATUS_CODE).as_deref(),
            Some("404")
        );
        assert_eq!(
            property(missing, SpanAttribute::SPAN_STATUS_CODE).as_deref(),
            Some(SpanStatusCode::ERROR)
        );
    }
}
