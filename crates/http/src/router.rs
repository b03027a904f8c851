//! Router builder for the bookshelf HTTP server

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use uuid::{NoContext, Timestamp, Uuid};

use bookshelf_kernel::ModuleRegistry;

/// Where the merged OpenAPI document is served as raw JSON
pub const OPENAPI_JSON_PATH: &str = "/docs/openapi.json";
/// Where Swagger UI is served
pub const SWAGGER_UI_PATH: &str = "/swagger-ui";

/// Mount point of a module: `{prefix}/{module_name}`
pub fn module_mount_path(prefix: &str, module_name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), module_name)
}

/// Join a module-relative route onto its mount point
fn join_path(mount: &str, path: &str) -> String {
    if path == "/" || path.is_empty() {
        mount.to_string()
    } else {
        format!("{}{}", mount, path)
    }
}

/// Request ID generator producing time-ordered UUIDs
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let request_id = Uuid::new_v7(Timestamp::now(NoContext))
            .to_string()
            .parse::<HeaderValue>()
            .ok()?;
        Some(RequestId::new(request_id))
    }
}

/// Builder for constructing the main HTTP router
///
/// Middlewares are recorded by the `with_*` methods and applied in `build`,
/// so they wrap every route regardless of call order.
pub struct RouterBuilder {
    router: Router,
    tracing: bool,
    cors: bool,
    request_id: bool,
    timeout: Option<Duration>,
}

impl RouterBuilder {
    /// Create a new router builder
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            tracing: false,
            cors: false,
            request_id: false,
            timeout: None,
        }
    }

    /// Add a route to the router
    pub fn route(mut self, path: &str, route: axum::routing::MethodRouter) -> Self {
        self.router = self.router.route(path, route);
        self
    }

    /// Mount a module's router under `{prefix}/{module_name}`
    pub fn mount_module(mut self, prefix: &str, module_name: &str, module_router: Router) -> Self {
        let mount = module_mount_path(prefix, module_name);
        self.router = self.router.nest(&mount, module_router);
        self
    }

    /// Add tracing middleware
    pub fn with_tracing(mut self) -> Self {
        self.tracing = true;
        self
    }

    /// Allow cross-origin requests from any origin, method and header
    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    /// Add request ID middleware
    pub fn with_request_id(mut self) -> Self {
        self.request_id = true;
        self
    }

    /// Add timeout middleware
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(Duration::from_millis(timeout_ms));
        self
    }

    /// Add OpenAPI documentation by collecting specs from all modules
    ///
    /// The merged document is served at [`OPENAPI_JSON_PATH`], which is also
    /// the URL Swagger UI loads.
    pub fn with_openapi(mut self, registry: &ModuleRegistry, prefix: &str) -> Self {
        let openapi_spec = merged_openapi(registry, prefix);

        self.router = self.router.merge(
            utoipa_swagger_ui::SwaggerUi::new(SWAGGER_UI_PATH)
                .external_url_unchecked(OPENAPI_JSON_PATH, openapi_spec),
        );

        self
    }

    /// Build the final router with the recorded middlewares
    pub fn build(self) -> Router {
        let mut router = self.router;

        if let Some(timeout) = self.timeout {
            router = router.layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                timeout,
            ));
        }

        if self.cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.request_id {
            router = router.layer(PropagateRequestIdLayer::x_request_id());
        }

        if self.tracing {
            router = router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
                    .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
            );
        }

        // Outermost, so the trace span already sees the generated id.
        if self.request_id {
            router = router.layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7));
        }

        router
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge every module's OpenAPI fragment into one document
pub fn merged_openapi(registry: &ModuleRegistry, prefix: &str) -> serde_json::Value {
    let mut openapi_spec = serde_json::json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Bookshelf API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Book catalog CRUD service"
        },
        "paths": {},
        "components": {
            "schemas": {}
        }
    });

    openapi_spec["paths"]["/healthz"] = serde_json::json!({
        "get": {
            "summary": "Health check",
            "responses": {
                "200": {
                    "description": "OK",
                    "content": {
                        "text/plain": {
                            "schema": {
                                "type": "string"
                            }
                        }
                    }
                }
            }
        }
    });

    for module in registry.modules() {
        let Some(module_spec) = module.openapi() else {
            continue;
        };
        let mount = module_mount_path(prefix, module.name());

        if let Some(paths) = module_spec.get("paths").and_then(|p| p.as_object()) {
            for (path, path_item) in paths {
                openapi_spec["paths"][join_path(&mount, path)] = path_item.clone();
            }
        }

        if let Some(schemas) = module_spec
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(|s| s.as_object())
        {
            for (schema_name, schema_def) in schemas {
                openapi_spec["components"]["schemas"][schema_name] = schema_def.clone();
            }
        }
    }

    openapi_spec
}

/// Every path a module route is reachable under, for diagnostics
pub fn mounted_paths(registry: &ModuleRegistry, prefix: &str) -> Vec<String> {
    let spec = merged_openapi(registry, prefix);
    spec["paths"]
        .as_object()
        .map(|paths| paths.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    struct DocModule;

    #[async_trait::async_trait]
    impl bookshelf_kernel::Module for DocModule {
        fn name(&self) -> &'static str {
            "widgets"
        }

        fn routes(&self) -> Router {
            Router::new().route("/", get(|| async { "widgets" }))
        }

        fn openapi(&self) -> Option<serde_json::Value> {
            Some(serde_json::json!({
                "paths": {
                    "/": { "get": { "responses": { "200": { "description": "OK" } } } },
                    "/{id}": { "get": { "responses": { "200": { "description": "OK" } } } }
                },
                "components": { "schemas": { "Widget": { "type": "object" } } }
            }))
        }
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register(std::sync::Arc::new(DocModule)).unwrap();
        registry
    }

    #[test]
    fn mount_paths_respect_prefix() {
        assert_eq!(module_mount_path("", "books"), "/books");
        assert_eq!(module_mount_path("/api/", "books"), "/api/books");
        assert_eq!(join_path("/books", "/"), "/books");
        assert_eq!(join_path("/books", "/{id}"), "/books/{id}");
    }

    #[test]
    fn module_fragments_are_merged_under_mount_point() {
        let spec = merged_openapi(&registry(), "/api");
        assert!(spec["paths"]["/api/widgets"].is_object());
        assert!(spec["paths"]["/api/widgets/{id}"].is_object());
        assert!(spec["paths"]["/healthz"].is_object());
        assert!(spec["components"]["schemas"]["Widget"].is_object());

        let mut paths = mounted_paths(&registry(), "");
        paths.sort();
        assert_eq!(paths, vec!["/healthz", "/widgets", "/widgets/{id}"]);
    }

    #[tokio::test]
    async fn test_module_mounting() {
        let module_router = Router::new().route("/", get(|| async { "module" }));

        let router = RouterBuilder::new()
            .mount_module("", "test", module_router)
            .build();

        let response = router
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"module");
    }

    #[tokio::test]
    async fn test_middleware_chain() {
        let router = RouterBuilder::new()
            .with_tracing()
            .with_cors()
            .with_request_id()
            .with_timeout(5000)
            .route("/health", get(|| async { "ok" }))
            .build();

        let response = router
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn client_request_id_is_propagated() {
        let router = RouterBuilder::new()
            .with_request_id()
            .route("/health", get(|| async { "ok" }))
            .build();

        let response = router
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let router = RouterBuilder::new()
            .with_timeout(20)
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .build();

        let response = router
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn openapi_document_is_served_where_swagger_ui_looks() {
        let router = RouterBuilder::new().with_openapi(&registry(), "").build();

        let response = router
            .clone()
            .oneshot(Request::get(OPENAPI_JSON_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let spec: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(spec, merged_openapi(&registry(), ""));

        let response = router
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let router = RouterBuilder::new()
            .with_cors()
            .route("/health", get(|| async { "ok" }))
            .build();

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/health")
                    .header(header::ORIGIN, "http://example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
