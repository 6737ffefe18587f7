use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use tenantgate::auth::jwt::decode_token;
use tenantgate::config::{Config, RoleDeletePolicy, StandaloneTenantPolicy, StoreBackend};
use tenantgate::db::Repositories;
use tenantgate::notify::MemoryOutbox;
use tenantgate::state::SharedState;

pub const JWT_SECRET: &str = "test-jwt-secret-that-is-long-enough";
pub const PASSWORD: &str = "password123";

/// A running test server backed by the in-memory store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub outbox: Arc<MemoryOutbox>,
    #[allow(dead_code)]
    pub state: SharedState,
}

/// A signed-in user: the bearer token and the tenant it is scoped to.
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
}

impl Session {
    pub fn from_body(body: &Value) -> Self {
        let access_token = body["access_token"].as_str().unwrap().to_string();
        let refresh_token = body["refresh_token"].as_str().unwrap().to_string();
        let identity = decode_token(&access_token, JWT_SECRET.as_bytes())
            .unwrap()
            .identity();
        Self {
            access_token,
            refresh_token,
            tenant_id: identity.tenant_id,
            user_id: identity.user_id,
            role_id: identity.role_id,
        }
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn send(req: RequestBuilder) -> (Value, StatusCode) {
        let resp = req.send().await.expect("request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// POST without credentials, optionally naming a tenant.
    pub async fn post(&self, path: &str, tenant: Option<Uuid>, body: &Value) -> (Value, StatusCode) {
        let mut req = self.client.post(self.url(path)).json(body);
        if let Some(tenant) = tenant {
            req = req.header("x-tenant-id", tenant.to_string());
        }
        Self::send(req).await
    }

    pub async fn register_tenant(&self, domain: &str, owner_email: &str) -> (Value, StatusCode) {
        self.post(
            "/api/v1/auth/register-tenant",
            None,
            &json!({
                "company_name": format!("{domain} Inc"),
                "domain": domain,
                "owner_email": owner_email,
                "owner_password": PASSWORD,
                "owner_full_name": "Owner",
            }),
        )
        .await
    }

    /// Register a tenant and return its owner's session.
    pub async fn owner_of(&self, domain: &str) -> Session {
        let email = format!("owner@{domain}");
        let (body, status) = self.register_tenant(domain, &email).await;
        assert_eq!(status, StatusCode::OK, "register-tenant failed: {body}");
        Session::from_body(&body)
    }

    pub async fn login(&self, tenant: Option<Uuid>, email: &str, password: &str) -> (Value, StatusCode) {
        self.post(
            "/api/v1/auth/login",
            tenant,
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> (Value, StatusCode) {
        self.post(
            "/api/v1/auth/refresh",
            None,
            &json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    /// Create a role, invite `email` into it, redeem, and return the new
    /// member's session.
    pub async fn invite_member(&self, owner: &Session, email: &str, permissions: Value) -> Session {
        let (role, status) = self
            .post_auth(
                "/api/v1/roles",
                owner,
                &json!({ "name": format!("role-{}", Uuid::now_v7().simple()), "permissions": permissions }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create role failed: {role}");

        let (body, status) = self
            .post_auth(
                "/api/v1/invitations",
                owner,
                &json!({ "email": email, "role_id": role["id"] }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create invitation failed: {body}");

        let token = self.outbox.latest_token_for(email).expect("invitation not delivered");
        let (body, status) = self
            .post(
                "/api/v1/invitations/redeem",
                None,
                &json!({ "token": token, "password": PASSWORD, "full_name": "Member" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "redeem invitation failed: {body}");
        Session::from_body(&body)
    }

    fn authed(&self, req: RequestBuilder, session: &Session) -> RequestBuilder {
        req.bearer_auth(&session.access_token)
            .header("x-tenant-id", session.tenant_id.to_string())
    }

    /// Authenticated GET in the session's own tenant.
    pub async fn get_auth(&self, path: &str, session: &Session) -> (Value, StatusCode) {
        Self::send(self.authed(self.client.get(self.url(path)), session)).await
    }

    pub async fn post_auth(&self, path: &str, session: &Session, body: &Value) -> (Value, StatusCode) {
        Self::send(self.authed(self.client.post(self.url(path)).json(body), session)).await
    }

    pub async fn put_auth(&self, path: &str, session: &Session, body: &Value) -> (Value, StatusCode) {
        Self::send(self.authed(self.client.put(self.url(path)).json(body), session)).await
    }

    pub async fn delete_auth(&self, path: &str, session: &Session) -> (Value, StatusCode) {
        Self::send(self.authed(self.client.delete(self.url(path)), session)).await
    }

    /// GET with the session's bearer token but an explicit tenant header.
    pub async fn get_as_tenant(
        &self,
        path: &str,
        session: &Session,
        tenant: Option<Uuid>,
    ) -> (Value, StatusCode) {
        let mut req = self
            .client
            .get(self.url(path))
            .bearer_auth(&session.access_token);
        if let Some(tenant) = tenant {
            req = req.header("x-tenant-id", tenant.to_string());
        }
        Self::send(req).await
    }
}

pub fn test_config() -> Config {
    Config {
        store: StoreBackend::Memory,
        jwt_secret: JWT_SECRET.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        access_ttl_secs: 900,
        refresh_ttl_secs: 3600,
        single_use_ttl_secs: 3600,
        invitation_ttl_secs: 3600,
        call_timeout: Duration::from_secs(10),
        standalone_tenant: StandaloneTenantPolicy::Shared {
            domain: "users.test.local".to_string(),
        },
        role_delete: RoleDeletePolicy::Reject,
        max_body_size: 1_048_576,
        trusted_proxies: vec![],
        log_level: "warn".to_string(),
    }
}

/// Spawn a test app on a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let outbox = Arc::new(MemoryOutbox::new());
    let (app, state) = tenantgate::build_app(Repositories::in_memory(), config, outbox.clone());

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        client,
        outbox,
        state,
    }
}
