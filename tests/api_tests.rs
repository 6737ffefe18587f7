mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::{PASSWORD, Session};

// ── Health ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok_with_security_headers() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "DENY");
    assert_eq!(
        resp.headers()["referrer-policy"],
        "strict-origin-when-cross-origin"
    );
    assert_eq!(resp.text().await.unwrap(), "ok");
}

// ── Registration & Sessions ─────────────────────────────────────

#[tokio::test]
async fn tenant_registration_login_and_rotation() {
    let app = common::spawn_app().await;

    let (body, status) = app.register_tenant("acme.com", "alice@acme.com").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["token_type"], "Bearer");
    let owner = Session::from_body(&body);

    let (body, status) = app.register_tenant("ACME.com", "bob@acme.com").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (body, status) = app
        .login(Some(owner.tenant_id), "alice@acme.com", PASSWORD)
        .await;
    assert_eq!(status, StatusCode::OK);
    let login = Session::from_body(&body);
    assert_eq!(login.user_id, owner.user_id);
    assert_eq!(login.role_id, owner.role_id);

    let (body, status) = app.refresh(&login.refresh_token).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = Session::from_body(&body);
    assert_ne!(rotated.refresh_token, login.refresh_token);

    // Replaying the rotated-out token burns every session of the user
    let (body, status) = app.refresh(&login.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "reuse_detected");

    let (_, status) = app.refresh(&rotated.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app.refresh(&owner.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn standalone_registration_rejects_duplicate_email() {
    let app = common::spawn_app().await;
    let req = json!({ "email": "solo@example.com", "password": PASSWORD, "full_name": "Solo" });

    let (body, status) = app.post("/api/v1/auth/register", None, &req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let first = Session::from_body(&body);

    let (body, status) = app.post("/api/v1/auth/register", None, &req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    // Standalone users share one tenant and may only see themselves
    let (body, status) = app
        .post(
            "/api/v1/auth/register",
            None,
            &json!({ "email": "other@example.com", "password": PASSWORD, "full_name": "Other" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second = Session::from_body(&body);
    assert_eq!(first.tenant_id, second.tenant_id);

    let (body, status) = app.get_auth("/api/v1/users", &second).await;
    assert_eq!(status, StatusCode::OK);
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], "other@example.com");
    assert!(users[0].get("password_hash").is_none());

    let (_, status) = app
        .get_auth(&format!("/api/v1/users/{}", first.user_id), &second)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn register_rejects_short_password() {
    let app = common::spawn_app().await;

    let (body, status) = app
        .post(
            "/api/v1/auth/register",
            None,
            &json!({ "email": "solo@example.com", "password": "short", "full_name": "Solo" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn login_invalid_credentials() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (_, status) = app
        .login(Some(owner.tenant_id), "owner@acme.com", "wrongpassword")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, status) = app
        .login(Some(owner.tenant_id), "nobody@acme.com", PASSWORD)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_is_rate_limited() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    for _ in 0..5 {
        let (_, status) = app
            .login(Some(owner.tenant_id), "owner@acme.com", "wrongpassword")
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (body, status) = app
        .login(Some(owner.tenant_id), "owner@acme.com", PASSWORD)
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["kind"], "rate_limited");
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (_, status) = app
        .post(
            "/api/v1/auth/logout",
            None,
            &json!({ "refresh_token": owner.refresh_token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (body, status) = app.refresh(&owner.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthenticated");
}

#[tokio::test]
async fn change_password_ends_other_sessions() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (body, status) = app
        .post_auth(
            "/api/v1/auth/change-password",
            &owner,
            &json!({ "current_password": PASSWORD, "new_password": "new-password-456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, status) = app.refresh(&owner.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, status) = app
        .login(Some(owner.tenant_id), "owner@acme.com", "new-password-456")
        .await;
    assert_eq!(status, StatusCode::OK);
}

// ── Gate ────────────────────────────────────────────────────────

#[tokio::test]
async fn guarded_calls_need_bearer_and_tenant() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (body, status) = app.get_as_tenant("/api/v1/tenant", &owner, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let resp = app
        .client
        .get(app.url("/api/v1/tenant"))
        .header("x-tenant-id", owner.tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .client
        .get(app.url("/api/v1/tenant"))
        .bearer_auth("not-a-jwt")
        .header("x-tenant-id", owner.tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .client
        .get(app.url("/api/v1/tenant"))
        .bearer_auth(&owner.access_token)
        .header("x-tenant-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (body, status) = app.get_auth("/api/v1/tenant", &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain"], "acme.com");
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn malformed_requests_are_authenticated_and_audited() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    // no bearer: authentication fails before the body is looked at
    let resp = app
        .client
        .post(app.url("/api/v1/roles"))
        .header("x-tenant-id", owner.tenant_id.to_string())
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .client
        .post(app.url("/api/v1/roles"))
        .bearer_auth(&owner.access_token)
        .header("x-tenant-id", owner.tenant_id.to_string())
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "validation");

    let (body, status) = app.get_auth("/api/v1/users/not-a-uuid", &owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (body, status) = app.get_auth("/api/v1/audit", &owner).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let events = body.as_array().unwrap();

    let create_role: Vec<_> = events.iter().filter(|e| e["action"] == "CreateRole").collect();
    assert_eq!(create_role.len(), 2);
    let anonymous = create_role
        .iter()
        .find(|e| e["outcome"] == "rejected:unauthenticated")
        .unwrap();
    assert!(anonymous["user_id"].is_null());
    let garbled = create_role
        .iter()
        .find(|e| e["outcome"] == "failed:validation")
        .unwrap();
    assert_eq!(garbled["user_id"], owner.user_id.to_string());

    let get_user = events.iter().find(|e| e["action"] == "GetUser").unwrap();
    assert_eq!(get_user["outcome"], "failed:validation");
}

#[tokio::test]
async fn tenants_are_isolated() {
    let app = common::spawn_app().await;
    let acme = app.owner_of("acme.com").await;
    let globex = app.owner_of("globex.com").await;

    let (body, status) = app
        .get_as_tenant("/api/v1/users", &acme, Some(globex.tenant_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (_, status) = app
        .get_auth(&format!("/api/v1/users/{}", globex.user_id), &acme)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, status) = app
        .get_auth(&format!("/api/v1/roles/{}", globex.role_id), &acme)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, status) = app
        .delete_auth(&format!("/api/v1/users/{}", globex.user_id), &acme)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (body, status) = app.get_auth("/api/v1/users", &acme).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn roles_without_grants_are_denied() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;
    let member = app.invite_member(&owner, "carol@acme.com", json!({})).await;
    assert_eq!(member.tenant_id, owner.tenant_id);

    for path in ["/api/v1/tenant", "/api/v1/roles", "/api/v1/users", "/api/v1/audit"] {
        let (body, status) = app.get_auth(path, &member).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}: {body}");
    }

    let (_, status) = app
        .post_auth(
            "/api/v1/invitations",
            &member,
            &json!({ "email": "dave@acme.com", "role_id": owner.role_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn own_scope_covers_profile_but_not_role() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;
    let member = app
        .invite_member(
            &owner,
            "carol@acme.com",
            json!({ "user:read": "own", "user:write": "own" }),
        )
        .await;
    let me = format!("/api/v1/users/{}", member.user_id);

    let (body, status) = app
        .put_auth(&me, &member, &json!({ "full_name": "Carol C" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["full_name"], "Carol C");

    let (_, status) = app
        .put_auth(&me, &member, &json!({ "role_id": owner.role_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .put_auth(
            &format!("/api/v1/users/{}", owner.user_id),
            &member,
            &json!({ "full_name": "Hijacked" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invitations_cannot_confer_more_than_the_inviter_holds() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;
    let recruiter = app
        .invite_member(
            &owner,
            "rita@acme.com",
            json!({ "invitation:create": true, "user:read": "own" }),
        )
        .await;

    let (body, status) = app
        .post_auth(
            "/api/v1/invitations",
            &recruiter,
            &json!({ "email": "mallory@acme.com", "role_id": owner.role_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert!(app.outbox.latest_token_for("mallory@acme.com").is_none());

    let (role, status) = app
        .post_auth(
            "/api/v1/roles",
            &owner,
            &json!({ "name": "reader", "permissions": { "user:read": "own" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{role}");
    let (body, status) = app
        .post_auth(
            "/api/v1/invitations",
            &recruiter,
            &json!({ "email": "ned@acme.com", "role_id": role["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn role_writers_cannot_escalate() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;
    let editor = app
        .invite_member(
            &owner,
            "eddie@acme.com",
            json!({ "role:read": true, "role:write": true }),
        )
        .await;

    let (_, status) = app
        .post_auth(
            "/api/v1/roles",
            &editor,
            &json!({ "name": "root", "permissions": { "admin": true } }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .put_auth(
            &format!("/api/v1/roles/{}", editor.role_id),
            &editor,
            &json!({ "permissions": { "role:read": true, "role:write": true, "audit:read": true } }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the owner role holds more than the editor, so it is out of reach too
    let (_, status) = app
        .put_auth(
            &format!("/api/v1/roles/{}", owner.role_id),
            &editor,
            &json!({ "name": "demoted" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (body, status) = app
        .post_auth(
            "/api/v1/roles",
            &editor,
            &json!({ "name": "viewer", "permissions": { "role:read": true } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn user_writers_cannot_assign_wider_roles() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;
    let manager = app
        .invite_member(
            &owner,
            "mona@acme.com",
            json!({ "user:read": true, "user:write": true }),
        )
        .await;
    let carol = app.invite_member(&owner, "carol@acme.com", json!({})).await;
    let carol_path = format!("/api/v1/users/{}", carol.user_id);

    let (_, status) = app
        .put_auth(&carol_path, &manager, &json!({ "role_id": owner.role_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .put_auth(
            &format!("/api/v1/users/{}", owner.user_id),
            &manager,
            &json!({ "role_id": carol.role_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (body, status) = app
        .put_auth(&carol_path, &manager, &json!({ "role_id": carol.role_id }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

// ── Single-use tokens ───────────────────────────────────────────

#[tokio::test]
async fn password_reset_is_single_use() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    // Unknown accounts get the same answer and no token
    let (_, status) = app
        .post(
            "/api/v1/auth/password-reset",
            Some(owner.tenant_id),
            &json!({ "email": "nobody@acme.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.outbox.is_empty());

    let (_, status) = app
        .post(
            "/api/v1/auth/password-reset",
            Some(owner.tenant_id),
            &json!({ "email": "owner@acme.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = app.outbox.latest_token_for("owner@acme.com").unwrap();

    let redeem = json!({ "token": token, "new_password": "reset-password-789" });
    let (body, status) = app
        .post("/api/v1/auth/password-reset/redeem", None, &redeem)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (body, status) = app
        .post("/api/v1/auth/password-reset/redeem", None, &redeem)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    // Old sessions and the old password are gone
    let (_, status) = app.refresh(&owner.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app
        .login(Some(owner.tenant_id), "owner@acme.com", PASSWORD)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app
        .login(Some(owner.tenant_id), "owner@acme.com", "reset-password-789")
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn password_reset_requires_tenant() {
    let app = common::spawn_app().await;
    app.owner_of("acme.com").await;

    let (body, status) = app
        .post(
            "/api/v1/auth/password-reset",
            None,
            &json!({ "email": "owner@acme.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn invitation_token_is_not_a_reset_token() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (_, status) = app
        .post_auth(
            "/api/v1/invitations",
            &owner,
            &json!({ "email": "erin@acme.com", "role_id": owner.role_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = app.outbox.latest_token_for("erin@acme.com").unwrap();

    let (_, status) = app
        .post(
            "/api/v1/auth/password-reset/redeem",
            None,
            &json!({ "token": token, "new_password": "whatever-123" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (body, status) = app
        .post(
            "/api/v1/invitations/redeem",
            None,
            &json!({ "token": token, "password": PASSWORD, "full_name": "Erin" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let erin = Session::from_body(&body);
    assert_eq!(erin.tenant_id, owner.tenant_id);
    assert_eq!(erin.role_id, owner.role_id);

    let (_, status) = app
        .post(
            "/api/v1/invitations/redeem",
            None,
            &json!({ "token": token, "password": PASSWORD, "full_name": "Erin" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ── Directory ───────────────────────────────────────────────────

#[tokio::test]
async fn role_crud_and_delete_conflict() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (body, status) = app
        .post_auth(
            "/api/v1/roles",
            &owner,
            &json!({ "name": "auditor", "permissions": { "audit:read": true } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let role_id = body["id"].as_str().unwrap().to_string();

    let (_, status) = app
        .post_auth("/api/v1/roles", &owner, &json!({ "name": "auditor" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, status) = app
        .post_auth(
            "/api/v1/roles",
            &owner,
            &json!({ "name": "rogue", "permissions": { "launch:missiles": true } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (body, status) = app
        .put_auth(
            &format!("/api/v1/roles/{role_id}"),
            &owner,
            &json!({ "name": "auditors" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "auditors");

    // The owner role is still assigned
    let (body, status) = app
        .delete_auth(&format!("/api/v1/roles/{}", owner.role_id), &owner)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (body, status) = app
        .delete_auth(&format!("/api/v1/roles/{role_id}"), &owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Deleted");

    let (body, status) = app.get_auth("/api/v1/roles", &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn suspending_a_user_ends_their_sessions() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;
    let member = app.invite_member(&owner, "carol@acme.com", json!({})).await;

    let (body, status) = app
        .put_auth(
            &format!("/api/v1/users/{}", member.user_id),
            &owner,
            &json!({ "status": "suspended" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "suspended");

    let (_, status) = app.refresh(&member.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app
        .login(Some(owner.tenant_id), "carol@acme.com", PASSWORD)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleted_tenant_cannot_log_in() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (_, status) = app.delete_auth("/api/v1/tenant", &owner).await;
    assert_eq!(status, StatusCode::OK);

    let (_, status) = app.refresh(&owner.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app
        .login(Some(owner.tenant_id), "owner@acme.com", PASSWORD)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ── Audit ───────────────────────────────────────────────────────

#[tokio::test]
async fn audit_records_gated_calls() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (_, status) = app
        .login(Some(owner.tenant_id), "owner@acme.com", "wrongpassword")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app.get_auth("/api/v1/tenant", &owner).await;
    assert_eq!(status, StatusCode::OK);

    let (body, status) = app.get_auth("/api/v1/audit", &owner).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let events = body.as_array().unwrap();

    let get_tenant = events.iter().find(|e| e["action"] == "GetTenant").unwrap();
    assert_eq!(get_tenant["outcome"], "success");
    assert_eq!(get_tenant["user_id"], owner.user_id.to_string());

    let failed_login = events.iter().find(|e| e["action"] == "Login").unwrap();
    assert_eq!(failed_login["outcome"], "failed:unauthenticated");
    assert!(failed_login["user_id"].is_null());

    let (body, status) = app.get_auth("/api/v1/audit?limit=1", &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reuse_detection_is_charged_to_the_token_owner() {
    let app = common::spawn_app().await;
    let owner = app.owner_of("acme.com").await;

    let (_, status) = app.refresh(&owner.refresh_token).await;
    assert_eq!(status, StatusCode::OK);
    let (body, status) = app.refresh(&owner.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "reuse_detected");

    // the access token is still valid until it expires
    let (body, status) = app.get_auth("/api/v1/audit", &owner).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let reuse = body
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["action"] == "RefreshSession" && e["outcome"] == "reuse_detected")
        .unwrap();
    assert_eq!(reuse["user_id"], owner.user_id.to_string());
    assert_eq!(reuse["tenant_id"], owner.tenant_id.to_string());
}
