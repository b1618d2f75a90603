//! OpenAPI documentation for the visitor API.
//!
//! Paths are documented relative to `/api`, where [`crate::build_router`] nests them. The
//! document is served at `/api-docs/openapi.json` and rendered at `/docs`.

use serde::Serialize;
use utoipa::{Modify, OpenApi, ToSchema};

use crate::api;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, ToSchema)]
#[allow(dead_code)]
pub struct ErrorResponse {
    /// Human-readable message, safe to show to users
    #[schema(example = "Invalid verification code")]
    pub error: String,
    /// The offending form field, for validation errors only
    #[schema(example = "visitorEmail")]
    pub field: Option<String>,
}

struct ApiPrefix;

impl Modify for ApiPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.servers = Some(vec![utoipa::openapi::Server::new("/api")]);
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gatehouse",
        description = "Visitor registration, resident approval and gate check-in/out."
    ),
    paths(
        api::handlers::visitors::create_visitor_request,
        api::handlers::visitors::list_visitors,
        api::handlers::visitors::update_visitor_status,
        api::handlers::visitors::guard_verify,
        api::handlers::visitors::visitor_exit,
    ),
    components(schemas(
        api::models::visitors::VisitorRequestCreate,
        api::models::visitors::VisitorStatusUpdate,
        api::models::visitors::GuardVerifyRequest,
        api::models::visitors::VisitorResponse,
        api::models::visitors::ResidentResponse,
        api::models::visitors::VisitorStatus,
        api::models::visitors::VisitorListStatus,
        ErrorResponse,
    )),
    modifiers(&ApiPrefix),
    tags(
        (name = "visitors", description = "Visit request lifecycle"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_lifecycle_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/visitor-request",
            "/visitors",
            "/visitor-status/{id}",
            "/guard-verify",
            "/visitor-exit/{id}",
        ] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "missing {expected}");
        }

        let servers = doc.servers.expect("server prefix set");
        assert_eq!(servers[0].url, "/api");
    }
}
