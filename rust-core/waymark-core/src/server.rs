//! # HTTP Server
//!
//! Hyper adapter for a built route table.
//!
//! Maps native requests to [`Request`], runs the matched route's dispatch
//! function and maps the [`ControllerResult`] or error back to a response.
//! Implements graceful shutdown on ctrl-c with a bounded drain.
//!
//! ## Response mapping
//!
//! - no data and no status: `204 No Content`
//! - no data: the chosen status with an empty body
//! - `null` data counts as no data
//! - string data under any content type other than JSON: raw text
//! - anything else: JSON
//!
//! ## Error mapping
//!
//! - unknown path: `404`
//! - path routed under other methods: `405` with `Allow`
//! - validation, hydration or body parse failure: `400`
//! - body over the configured limit: `413`
//! - anything else: `500`

use crate::controller::ControllerResult;
use crate::error::{BoxError, Error, Result};
use crate::json::{parse_json_bytes, to_json_vec};
use crate::request::Request;
use crate::route::RouteDefinition;
use crate::router::Router;
use crate::validation::ValidationErrors;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
pub use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, ALLOW, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode, Version};
use hyper_util::rt::TokioIo;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_ID: &str = "x-request-id";
const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";
const FORM: &str = "application/x-www-form-urlencoded";

/// Derives request context entries from the native request
///
/// Entries are merged into [`Request::context`] before dispatch.
pub type ContextSetter = Arc<dyn Fn(&Parts) -> Map<String, Value> + Send + Sync>;

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// HTTP server over a route table
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    context: Option<ContextSetter>,
}

impl Server {
    /// Create a server for `routes`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if two routes conflict.
    pub fn new(routes: Vec<RouteDefinition>) -> Result<Self> {
        Ok(Self {
            config: ServerConfig::default(),
            router: Arc::new(Router::new(routes)?),
            context: None,
        })
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// Populate the request context from each native request
    #[must_use]
    pub fn with_context<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Parts) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.context = Some(Arc::new(setter));
        self
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The router serving requests
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    fn pipeline(&self) -> Arc<Pipeline> {
        Arc::new(Pipeline {
            router: Arc::clone(&self.router),
            context: self.context.clone(),
            max_body_size: self.config.max_body_size,
        })
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound and
    /// `Error::Io` if accepting connections fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;
        let bind_error = |source: std::io::Error| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()
        } else {
            tokio::net::TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(1024).map_err(bind_error)?;

        info!(routes = self.router.routes().len(), "Server listening on http://{}", addr);

        let pipeline = self.pipeline();
        let keep_alive = self.config.keep_alive;
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let pipeline = Arc::clone(&pipeline);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);
                        let service = service_fn(move |req| {
                            let pipeline = Arc::clone(&pipeline);
                            async move {
                                Ok::<_, Infallible>(pipeline.respond(req, Some(remote_addr)).await)
                            }
                        });

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            error!(remote = %remote_addr, "Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!(
                open = active.load(Ordering::Relaxed),
                "Shutdown timeout elapsed with connections still open"
            );
        }
        Ok(())
    }

    /// Run one request through the full pipeline without the network stack
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` if `method`, `uri` or a header is
    /// malformed. Routing and handler failures become error responses.
    pub async fn handle(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: impl Into<Bytes>,
    ) -> Result<Response<Full<Bytes>>> {
        let invalid = |reason: String| Error::InvalidRequest { reason };

        let mut builder = hyper::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Full::new(body.into()))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(self.pipeline().respond(request, None).await)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("context", &self.context.is_some())
            .finish()
    }
}

/// Everything a connection task needs to answer requests
struct Pipeline {
    router: Arc<Router>,
    context: Option<ContextSetter>,
    max_body_size: usize,
}

impl Pipeline {
    async fn respond<B>(
        &self,
        req: hyper::Request<B>,
        remote: Option<SocketAddr>,
    ) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let request_id = parts
            .headers
            .get(REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map_or_else(generate_request_id, str::to_string);
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        let mut response = match self.process(parts, body, remote, &request_id).await {
            Ok(result) => into_response(result),
            Err(err) => error_response(&*err),
        };

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID, value);
        }

        info!(
            remote = ?remote,
            request_id = %request_id,
            "\"{} {}\" {}",
            method,
            path,
            response.status().as_u16()
        );
        response
    }

    async fn process<B>(
        &self,
        parts: Parts,
        body: B,
        remote: Option<SocketAddr>,
        request_id: &str,
    ) -> std::result::Result<ControllerResult, BoxError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        if let Some(declared) = content_length(&parts.headers) {
            if declared > self.max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: self.max_body_size,
                    actual: Some(declared),
                }
                .into());
            }
        }

        let matched = self.router.match_route(parts.method.as_str(), parts.uri.path())?;

        let bytes = match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<LengthLimitError>() => {
                return Err(Error::PayloadTooLarge {
                    limit: self.max_body_size,
                    actual: None,
                }
                .into());
            }
            Err(err) => return Err(err),
        };

        let request = build_request(
            &parts,
            bytes,
            matched.params,
            remote,
            request_id,
            self.context.as_ref(),
        )?;
        debug!(route = %matched.route, "dispatching");
        matched.route.dispatch(request).await
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Map a native request onto [`Request`]
fn build_request(
    parts: &Parts,
    body: Bytes,
    params: Map<String, Value>,
    remote: Option<SocketAddr>,
    request_id: &str,
    context: Option<&ContextSetter>,
) -> Result<Request> {
    let url = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
    let content_type = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let mut builder = Request::builder(parts.method.as_str(), url)
        .path(parts.uri.path())
        .protocol(parts.uri.scheme_str().unwrap_or("http"))
        .http_version(http_version(parts.version))
        .query(parse_query(parts.uri.query())?)
        .params(params)
        .cookies(parse_cookies(&parts.headers))
        .body(parse_body(content_type, &body)?);

    if let Some(remote) = remote {
        builder = builder.ip(remote.ip().to_string());
    }
    for (name, value) in &parts.headers {
        builder = builder.header(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    if !parts.headers.contains_key(REQUEST_ID) {
        builder = builder.header(REQUEST_ID, request_id);
    }
    if let Some(setter) = context {
        builder = builder.extend_context(setter(parts));
    }

    Ok(builder.build())
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

/// Collect key/value pairs, turning repeated keys into arrays
fn collect_pairs(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}

fn parse_query(query: Option<&str>) -> Result<Map<String, Value>> {
    let Some(query) = query else {
        return Ok(Map::new());
    };
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(query).map_err(|e| Error::MalformedBody {
            content_type: "query string".to_string(),
            reason: e.to_string(),
        })?;
    Ok(collect_pairs(pairs))
}

/// Decode a body by content type
///
/// JSON and form bodies become structured values, other UTF-8 bodies become
/// a string, empty or binary bodies become `Null`.
fn parse_body(content_type: Option<&str>, body: &Bytes) -> Result<Value> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    if content_type.is_some_and(is_json) {
        let mut bytes = body.to_vec();
        return parse_json_bytes(&mut bytes);
    }
    if content_type.map(media_type).as_deref() == Some(FORM) {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(body).map_err(|e| Error::MalformedBody {
                content_type: FORM.to_string(),
                reason: e.to_string(),
            })?;
        return Ok(Value::Object(collect_pairs(pairs)));
    }
    Ok(std::str::from_utf8(body).map_or(Value::Null, |text| Value::String(text.to_string())))
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (name.trim().to_string(), value.to_string())
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn respond_with(
    status: StatusCode,
    content_type: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    respond_with(status, Some(JSON), Bytes::from(body.to_string()))
}

/// Map a controller outcome to a response
fn into_response(result: ControllerResult) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(result.effective_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let declared = result.content_type.as_deref();

    match result.data.filter(|data| !data.is_null()) {
        None => respond_with(status, declared, Bytes::new()),
        Some(Value::String(text)) if !declared.is_some_and(is_json) => {
            respond_with(status, Some(declared.unwrap_or(TEXT)), Bytes::from(text))
        }
        Some(data) => match to_json_vec(&data) {
            Ok(bytes) => respond_with(status, Some(declared.unwrap_or(JSON)), Bytes::from(bytes)),
            Err(err) => error_response(&err),
        },
    }
}

/// Lower-cased media type without parameters
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// `application/json` or any `+json` media type
fn is_json(content_type: &str) -> bool {
    let mime = media_type(content_type);
    mime == JSON || mime.ends_with("+json")
}

/// Map a pipeline failure to a response
fn error_response(err: &(dyn std::error::Error + 'static)) -> Response<Full<Bytes>> {
    if let Some(errors) = err.downcast_ref::<ValidationErrors>() {
        debug!(errors = errors.len(), "validation failed");
        return respond_with(StatusCode::BAD_REQUEST, Some(JSON), Bytes::from(errors.to_json()));
    }

    match err.downcast_ref::<Error>() {
        Some(Error::RouteNotFound { .. }) => {
            json_response(StatusCode::NOT_FOUND, &json!({"error": "Not Found"}))
        }
        Some(Error::MethodNotAllowed { allowed, .. }) => {
            let mut response = json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({"error": "Method Not Allowed"}),
            );
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers_mut().insert(ALLOW, value);
            }
            response
        }
        Some(e @ (Error::Hydration { .. } | Error::MalformedBody { .. })) => {
            json_response(StatusCode::BAD_REQUEST, &json!({"error": e.to_string()}))
        }
        Some(Error::PayloadTooLarge { .. }) => {
            json_response(StatusCode::PAYLOAD_TOO_LARGE, &json!({"error": "Payload Too Large"}))
        }
        _ => {
            error!(error = %err, "request failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"error": "Internal Server Error"}),
            )
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", err);
        std::future::pending::<()>().await;
    }
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, ControllerDeclaration};
    use crate::dispatch::Arguments;
    use crate::dto::Dto;
    use crate::metadata::{MetadataStore, ParamDeclaration};
    use crate::validation::{FieldError, ValidationResult};
    use crate::RouteTableBuilder;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct NewOrder {
        quantity: i64,
        #[serde(default)]
        sku: Option<String>,
    }

    impl Dto for NewOrder {
        fn validate(&self) -> ValidationResult<()> {
            let mut errors = ValidationErrors::new();
            if self.quantity < 1 {
                errors.add(FieldError::too_small("quantity", 1));
            }
            match self.sku.as_deref().map(str::len) {
                Some(len) if len < 3 => errors.add(FieldError::too_short("sku", 3)),
                Some(len) if len > 12 => errors.add(FieldError::too_long("sku", 12)),
                _ => {}
            }
            errors.into_result()
        }
    }

    #[derive(Debug)]
    struct Exploded;

    impl std::fmt::Display for Exploded {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("exploded")
        }
    }

    impl std::error::Error for Exploded {}

    struct Orders;

    impl Controller for Orders {
        fn create() -> Self {
            Self
        }

        fn declare(c: &mut ControllerDeclaration<'_, Self>) {
            c.base_path("/orders")
                .get("show", "/:id")
                .param("show", ParamDeclaration::params(0))
                .param("show", ParamDeclaration::context(1))
                .handler("show", |_this: Arc<Self>, mut args: Arguments| async move {
                    let params: Value = args.take(0)?;
                    let context: Value = args.take(1)?;
                    Ok::<_, Error>(ControllerResult::ok(json!({
                        "id": params["id"],
                        "context": context,
                    })))
                })
                .post("create", "")
                .param("create", ParamDeclaration::body(0).with_dto::<NewOrder>())
                .handler("create", |_this: Arc<Self>, mut args: Arguments| async move {
                    let order: NewOrder = args.take_dto(0)?;
                    let created = ControllerResult::ok(json!({"quantity": order.quantity}));
                    Ok::<_, Error>(created.with_status(201))
                })
                .get("ping", "/ping")
                .handler("ping", |_this: Arc<Self>, _args: Arguments| async {
                    ControllerResult::text("pong")
                })
                .delete("remove", "/:id")
                .handler("remove", |_this: Arc<Self>, _args: Arguments| async {
                    Ok::<(), Error>(())
                })
                .get("fail", "/fail")
                .handler("fail", |_this: Arc<Self>, _args: Arguments| async {
                    Err::<ControllerResult, _>(Exploded)
                })
                .get("search", "/search")
                .param("search", ParamDeclaration::query(0))
                .param("search", ParamDeclaration::request(1))
                .handler("search", |_this: Arc<Self>, mut args: Arguments| async move {
                    let query: Value = args.take(0)?;
                    let request: Arc<Request> = args.take(1)?;
                    Ok::<_, Error>(ControllerResult::ok(json!({
                        "query": query,
                        "session": request.cookies().get("session"),
                        "requestId": request.header("x-request-id"),
                    })))
                });
        }
    }

    fn server() -> Server {
        let mut store = MetadataStore::new();
        store.register::<Orders>();
        let routes = RouteTableBuilder::new(&store).build_all().unwrap();
        Server::new(routes).unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_params_and_context() {
        let server = server().with_context(|parts: &Parts| {
            let mut context = Map::new();
            if let Some(user) = parts.headers.get("x-user").and_then(|v| v.to_str().ok()) {
                context.insert("user".to_string(), json!(user));
            }
            context
        });

        let response = server
            .handle("GET", "/orders/42", &[("X-User", "ada")], Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID));
        assert_eq!(body_json(response).await, json!({"id": "42", "context": {"user": "ada"}}));
    }

    #[tokio::test]
    async fn test_json_body_dto_created() {
        let response = server()
            .handle("POST", "/orders", &[("content-type", JSON)], r#"{"quantity": 3}"#)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({"quantity": 3}));
    }

    #[tokio::test]
    async fn test_form_body_hydration_failure_is_bad_request() {
        let response = server()
            .handle("POST", "/orders", &[("content-type", FORM)], "quantity=3")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validation_failure_lists_errors() {
        let response = server()
            .handle("POST", "/orders", &[("content-type", JSON)], r#"{"quantity": 0}"#)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["field"], "quantity");
    }

    #[tokio::test]
    async fn test_validation_errors_are_aggregated() {
        let server = server();

        let response = server
            .handle("POST", "/orders", &[("content-type", JSON)], r#"{"quantity": 0, "sku": "ab"}"#)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["code"], "TOO_SMALL");
        assert_eq!(body["errors"][1]["code"], "TOO_SHORT");

        let long = r#"{"quantity": 2, "sku": "abcdefghijklmnop"}"#;
        let response =
            server.handle("POST", "/orders", &[("content-type", JSON)], long).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["field"], "sku");
        assert_eq!(body["errors"][0]["code"], "TOO_LONG");
    }

    #[tokio::test]
    async fn test_text_and_no_content() {
        let server = server();

        let response = server.handle("GET", "/orders/ping", &[], Bytes::new()).await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"pong");

        let response = server.handle("DELETE", "/orders/9", &[], Bytes::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let server = server();

        let response = server.handle("GET", "/missing", &[], Bytes::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = server.handle("PUT", "/orders/9", &[], Bytes::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, DELETE");
    }

    #[tokio::test]
    async fn test_controller_error_is_internal() {
        let response = server().handle("GET", "/orders/fail", &[], Bytes::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let mut server = server();
        server.set_max_body_size(4);
        let response = server
            .handle("POST", "/orders", &[("content-type", JSON)], r#"{"quantity": 3}"#)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_query_cookies_and_request_id() {
        let response = server()
            .handle(
                "GET",
                "/orders/search?tag=a&tag=b&page=2",
                &[("cookie", "session=abc; theme=\"dark\""), (REQUEST_ID, "req-1")],
                Bytes::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[REQUEST_ID], "req-1");
        assert_eq!(
            body_json(response).await,
            json!({
                "query": {"tag": ["a", "b"], "page": "2"},
                "session": "abc",
                "requestId": "req-1",
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_request_parts() {
        let err = server().handle("GET", "not a uri", &[], Bytes::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[test]
    fn test_parse_body_by_content_type() {
        assert_eq!(parse_body(Some(JSON), &Bytes::new()).unwrap(), Value::Null);
        assert_eq!(
            parse_body(
                Some("application/json; charset=utf-8"),
                &Bytes::from_static(b"[1]")
            )
            .unwrap(),
            json!([1])
        );
        assert_eq!(
            parse_body(Some(FORM), &Bytes::from_static(b"a=1&b=two+words")).unwrap(),
            json!({"a": "1", "b": "two words"})
        );
        assert_eq!(parse_body(None, &Bytes::from_static(b"hello")).unwrap(), json!("hello"));
        assert_eq!(parse_body(None, &Bytes::from_static(&[0xff, 0xfe])).unwrap(), Value::Null);
        assert!(parse_body(Some(JSON), &Bytes::from_static(b"{")).is_err());
    }

    #[test]
    fn test_into_response_content_types() {
        let response = into_response(ControllerResult::ok(json!({"a": 1})));
        assert_eq!(response.headers()[CONTENT_TYPE], JSON);

        let html = ControllerResult::ok("<p>hi</p>").with_content_type("text/html");
        let response = into_response(html);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");

        let response = into_response(ControllerResult::ok("plain"));
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT);

        let response = into_response(ControllerResult::status(202));
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(!response.headers().contains_key(CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_string_data_is_raw_unless_json_declared() {
        let xml = ControllerResult::ok("<a/>").with_content_type("application/xml");
        let response = into_response(xml);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/xml");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"<a/>");

        let problem = ControllerResult::ok("quoted").with_content_type("application/problem+json");
        let response = into_response(problem);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#""quoted""#);
    }

    #[tokio::test]
    async fn test_null_data_is_no_content() {
        let response = into_response(ControllerResult::ok(Value::Null));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());

        let response = into_response(ControllerResult::ok(Value::Null).with_status(404));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key(CONTENT_TYPE));
    }

    /// Endless body of 1 KiB frames with no length hint
    struct Chunks {
        remaining: usize,
        pulled: Arc<AtomicUsize>,
    }

    impl Body for Chunks {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<std::result::Result<hyper::body::Frame<Bytes>, Infallible>>> {
            if self.remaining == 0 {
                return std::task::Poll::Ready(None);
            }
            self.remaining -= 1;
            self.pulled.fetch_add(1, Ordering::SeqCst);
            let frame = hyper::body::Frame::data(Bytes::from(vec![b'a'; 1024]));
            std::task::Poll::Ready(Some(Ok(frame)))
        }
    }

    #[tokio::test]
    async fn test_chunked_body_rejected_at_limit() {
        let mut server = server();
        server.set_max_body_size(16);
        let pulled = Arc::new(AtomicUsize::new(0));
        let request = hyper::Request::builder()
            .method("POST")
            .uri("/orders")
            .header(CONTENT_TYPE, JSON)
            .body(Chunks {
                remaining: 100,
                pulled: Arc::clone(&pulled),
            })
            .unwrap();

        let response = server.pipeline().respond(request, None).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_generated_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }
}
