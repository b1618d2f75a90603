//! HTTP handlers for the visitor lifecycle.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};

use crate::{
    AppState,
    api::models::visitors::{
        Decision, GuardVerifyRequest, ListVisitorsQuery, VisitorRequestCreate, VisitorResponse, VisitorStatusUpdate,
    },
    db::models::visitors::VisitorFilter,
    errors::{Error, Result},
    types::VisitorId,
};

fn bad_request(rejection: impl std::fmt::Display) -> Error {
    Error::BadRequest {
        message: rejection.to_string(),
    }
}

/// A well-formed body whose id or code cannot be read is just another wrong code
fn verify_rejection(rejection: JsonRejection) -> Error {
    match rejection {
        JsonRejection::JsonDataError(_) => Error::InvalidCode,
        other => bad_request(other),
    }
}

#[utoipa::path(
    post,
    path = "/visitor-request",
    tag = "visitors",
    summary = "Submit a visit request",
    description = "Registers a visitor for a resident. The resident is created on first use and emailed approve/reject links.",
    request_body = VisitorRequestCreate,
    responses(
        (status = 200, description = "The new pending request", body = VisitorResponse),
        (status = 400, description = "A required field is missing or malformed"),
        (status = 409, description = "The resident could not be created or found"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_visitor_request(
    State(state): State<AppState>,
    payload: std::result::Result<Json<VisitorRequestCreate>, JsonRejection>,
) -> Result<Json<VisitorResponse>> {
    let Json(form) = payload.map_err(bad_request)?;
    let lifecycle = state.lifecycle();

    let visitor = lifecycle.submit_request(&form).await?;
    Ok(Json(VisitorResponse::from_db(visitor, lifecycle.exposes_codes())))
}

#[utoipa::path(
    get,
    path = "/visitors",
    tag = "visitors",
    summary = "List visit requests",
    description = "All visit requests, newest first, each with its resident.",
    params(ListVisitorsQuery),
    responses(
        (status = 200, description = "Visit requests", body = Vec<VisitorResponse>),
        (status = 400, description = "Unknown status filter"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_visitors(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListVisitorsQuery>, QueryRejection>,
) -> Result<Json<Vec<VisitorResponse>>> {
    let Query(query) = query.map_err(bad_request)?;
    let lifecycle = state.lifecycle();

    let visitors = lifecycle.list_all(&VisitorFilter { status: query.status }).await?;
    let expose = lifecycle.exposes_codes();
    Ok(Json(visitors.into_iter().map(|v| VisitorResponse::from_db(v, expose)).collect()))
}

#[utoipa::path(
    put,
    path = "/visitor-status/{id}",
    tag = "visitors",
    summary = "Approve or reject a visit request",
    request_body = VisitorStatusUpdate,
    params(("id" = i64, Path, description = "Visit request ID")),
    responses(
        (status = 200, description = "The updated request", body = VisitorResponse),
        (status = 400, description = "Status is neither approved nor rejected"),
        (status = 404, description = "No such visit request"),
        (status = 409, description = "Already decided (only when transitions are enforced)"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_visitor_status(
    State(state): State<AppState>,
    id: std::result::Result<Path<VisitorId>, PathRejection>,
    payload: std::result::Result<Json<VisitorStatusUpdate>, JsonRejection>,
) -> Result<Json<VisitorResponse>> {
    let Path(id) = id.map_err(bad_request)?;
    let Json(update) = payload.map_err(bad_request)?;
    let decision: Decision = update.status.parse().map_err(|message| Error::Validation { field: "status", message })?;
    let lifecycle = state.lifecycle();

    let visitor = lifecycle.decide(id, decision).await?;
    Ok(Json(VisitorResponse::from_db(visitor, lifecycle.exposes_codes())))
}

#[utoipa::path(
    post,
    path = "/guard-verify",
    tag = "visitors",
    summary = "Check a visitor in",
    description = "Matches the presented code against the visit request and stamps the entry time.",
    request_body = GuardVerifyRequest,
    responses(
        (status = 200, description = "The checked-in request, with `formattedTime`", body = VisitorResponse),
        (status = 400, description = "Invalid verification code, including an unreadable id or code"),
        (status = 409, description = "Not approved or already checked in (only when transitions are enforced)"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn guard_verify(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GuardVerifyRequest>, JsonRejection>,
) -> Result<Json<VisitorResponse>> {
    let Json(request) = payload.map_err(verify_rejection)?;
    let lifecycle = state.lifecycle();

    let visitor = lifecycle.verify(request.visitor_id, &request.code).await?;
    Ok(Json(VisitorResponse::from_db(visitor, lifecycle.exposes_codes())))
}

#[utoipa::path(
    put,
    path = "/visitor-exit/{id}",
    tag = "visitors",
    summary = "Check a visitor out",
    params(("id" = i64, Path, description = "Visit request ID")),
    responses(
        (status = 200, description = "The checked-out request, with `formattedOutTime`", body = VisitorResponse),
        (status = 404, description = "No such visit request"),
        (status = 409, description = "Not checked in or already out (only when transitions are enforced)"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn visitor_exit(
    State(state): State<AppState>,
    id: std::result::Result<Path<VisitorId>, PathRejection>,
) -> Result<Json<VisitorResponse>> {
    let Path(id) = id.map_err(bad_request)?;
    let lifecycle = state.lifecycle();

    let visitor = lifecycle.check_out(id).await?;
    Ok(Json(VisitorResponse::from_db(visitor, lifecycle.exposes_codes())))
}

#[cfg(test)]
mod tests {
    use crate::api::models::visitors::VisitorStatus;
    use crate::config::Config;
    use crate::notifications::NotificationEvent;
    use crate::test_utils::{create_test_app, create_test_config, next_notification};
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    fn alice_for_bob() -> Value {
        json!({
            "visitorName": "Alice",
            "visitorEmail": "a@x.com",
            "residentName": "Bob",
            "residentEmail": "b@x.com",
            "visitReason": "delivery"
        })
    }

    fn strict_config() -> Config {
        let mut config = create_test_config();
        config.lifecycle.enforce_transitions = true;
        config
    }

    fn other_code(code: &str) -> &'static str {
        if code == "1000" { "1001" } else { "1000" }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_visit_scenario_over_http(pool: PgPool) {
        let (app, mut events) = create_test_app(pool, create_test_config()).await;

        let response = app.post("/api/visitor-request").json(&alice_for_bob()).await;
        response.assert_status_ok();
        let created: Value = response.json();
        assert_eq!(created["status"], "pending");
        assert_eq!(created["visitorName"], "Alice");
        assert!(created["carNumber"].is_null());
        let id = created["id"].as_i64().unwrap();
        let code = created["verificationCode"].as_str().unwrap().to_string();
        assert_eq!(code.len(), 4);

        let notification = next_notification(&mut events).await;
        assert_eq!(notification.event, NotificationEvent::RequestCreated);
        assert_eq!(notification.recipient, "b@x.com");

        let response = app
            .put(&format!("/api/visitor-status/{id}"))
            .json(&json!({ "status": "approved" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "approved");

        let notification = next_notification(&mut events).await;
        assert_eq!(notification.event, NotificationEvent::Approved);
        assert_eq!(notification.recipient, "a@x.com");
        assert_eq!(notification.verification_code, code);

        let response = app
            .post("/api/guard-verify")
            .json(&json!({ "visitorId": id, "code": other_code(&code) }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "Invalid verification code" }));

        // The dashboard sends the id as a string
        let response = app
            .post("/api/guard-verify")
            .json(&json!({ "visitorId": id.to_string(), "code": code }))
            .await;
        response.assert_status_ok();
        let checked_in: Value = response.json();
        assert!(checked_in["inDate"].is_string());
        assert!(checked_in["inTime"].is_string());
        let formatted = checked_in["formattedTime"].as_str().unwrap();
        assert!(formatted.ends_with(" AM") || formatted.ends_with(" PM"));

        let response = app.put(&format!("/api/visitor-exit/{id}")).await;
        response.assert_status_ok();
        let checked_out: Value = response.json();
        assert!(checked_out["outTime"].is_string());
        assert!(checked_out["formattedOutTime"].is_string());

        let response = app.get("/api/visitors").await;
        response.assert_status_ok();
        let listed: Vec<Value> = response.json();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["resident"]["email"], "b@x.com");
        assert!(listed[0]["formattedTime"].is_string());
        assert!(listed[0]["formattedOutTime"].is_string());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_field_is_named(pool: PgPool) {
        let (app, _events) = create_test_app(pool, create_test_config()).await;

        let mut body = alice_for_bob();
        body.as_object_mut().unwrap().remove("visitReason");

        let response = app.post("/api/visitor-request").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let error: Value = response.json();
        assert_eq!(error["field"], "visitReason");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_null_field_is_named(pool: PgPool) {
        let (app, _events) = create_test_app(pool, create_test_config()).await;

        let mut body = alice_for_bob();
        body["visitorName"] = Value::Null;

        let response = app.post("/api/visitor-request").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["field"], "visitorName");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unreadable_verify_body_is_invalid_code(pool: PgPool) {
        let (app, _events) = create_test_app(pool, create_test_config()).await;

        for body in [
            json!({ "visitorId": "abc", "code": "1234" }),
            json!({ "visitorId": 1, "code": true }),
            json!({ "code": "1234" }),
        ] {
            let response = app.post("/api/guard-verify").json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            response.assert_json(&json!({ "error": "Invalid verification code" }));
        }

        // Syntactically broken JSON is still a plain bad request
        let response = app
            .post("/api/guard-verify")
            .bytes(axum::body::Bytes::from_static(b"{not json"))
            .content_type("application/json")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_ne!(response.json::<Value>()["error"], "Invalid verification code");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_malformed_json_is_bad_request(pool: PgPool) {
        let (app, _events) = create_test_app(pool, create_test_config()).await;

        let response = app
            .post("/api/visitor-request")
            .bytes(axum::body::Bytes::from_static(b"{not json"))
            .content_type("application/json")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["error"].is_string());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_code_hidden_when_not_exposed(pool: PgPool) {
        let mut config = create_test_config();
        config.lifecycle.expose_verification_code = false;
        let (app, mut events) = create_test_app(pool, config).await;

        let response = app.post("/api/visitor-request").json(&alice_for_bob()).await;
        response.assert_status_ok();
        let created: Value = response.json();
        assert!(created.get("verificationCode").is_none());

        // The resident notification still happens; the code only travels by email
        let notification = next_notification(&mut events).await;
        assert_eq!(notification.verification_code.len(), 4);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_status_update_validation(pool: PgPool) {
        let (app, _events) = create_test_app(pool, create_test_config()).await;

        let response = app
            .put("/api/visitor-status/1")
            .json(&json!({ "status": "maybe" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["field"], "status");

        let response = app
            .put("/api/visitor-status/999")
            .json(&json!({ "status": "rejected" }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = app
            .put("/api/visitor-status/abc")
            .json(&json!({ "status": "approved" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_exit_unknown_visitor(pool: PgPool) {
        let (app, _events) = create_test_app(pool, create_test_config()).await;

        let response = app.put("/api/visitor-exit/999").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "Visitor request with ID 999 not found");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filter(pool: PgPool) {
        let (app, _events) = create_test_app(pool, create_test_config()).await;

        let first: Value = app.post("/api/visitor-request").json(&alice_for_bob()).await.json();
        let second: Value = app.post("/api/visitor-request").json(&alice_for_bob()).await.json();
        app.put(&format!("/api/visitor-status/{}", second["id"]))
            .json(&json!({ "status": "rejected" }))
            .await
            .assert_status_ok();

        let listed: Vec<Value> = app.get("/api/visitors").await.json();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["id"], second["id"]);
        assert_eq!(listed[1]["id"], first["id"]);

        let pending: Vec<Value> = app.get("/api/visitors?status=pending").await.json();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0]["id"], first["id"]);

        let rejected: Vec<Value> = app.get("/api/visitors?status=rejected").await.json();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0]["status"], serde_json::to_value(VisitorStatus::Rejected).unwrap());

        let response = app.get("/api/visitors?status=unknown").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_strict_mode_conflicts(pool: PgPool) {
        let (app, _events) = create_test_app(pool, strict_config()).await;

        let created: Value = app.post("/api/visitor-request").json(&alice_for_bob()).await.json();
        let id = created["id"].as_i64().unwrap();
        let code = created["verificationCode"].as_str().unwrap().to_string();

        app.post("/api/guard-verify")
            .json(&json!({ "visitorId": id, "code": code }))
            .await
            .assert_status(StatusCode::CONFLICT);

        app.put(&format!("/api/visitor-exit/{id}"))
            .await
            .assert_status(StatusCode::CONFLICT);

        app.put(&format!("/api/visitor-status/{id}"))
            .json(&json!({ "status": "approved" }))
            .await
            .assert_status_ok();
        app.put(&format!("/api/visitor-status/{id}"))
            .json(&json!({ "status": "rejected" }))
            .await
            .assert_status(StatusCode::CONFLICT);
    }
}
