use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use ipnet::IpNet;
use uuid::Uuid;

use crate::state::SharedState;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// A metadata field as the caller sent it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Presented<T> {
    #[default]
    Absent,
    Valid(T),
    Malformed,
}

/// Per-call metadata read by the gate. Extraction never fails; malformed
/// fields are carried through so the gate can reject and audit them.
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    pub tenant: Presented<Uuid>,
    pub(crate) bearer: Presented<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

impl FromRequestParts<SharedState> for CallMetadata {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let tenant = match parts.headers.get(TENANT_HEADER) {
            None => Presented::Absent,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<Uuid>().ok())
                .map_or(Presented::Malformed, Presented::Valid),
        };

        let bearer =
            match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await {
                Ok(TypedHeader(Authorization(bearer))) => {
                    Presented::Valid(bearer.token().to_string())
                }
                Err(rejection) if rejection.is_missing() => Presented::Absent,
                Err(_) => Presented::Malformed,
            };

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let origin = Some(client_ip(&parts.headers, peer, &state.config.trusted_proxies));

        let user_agent = parts
            .headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(CallMetadata {
            tenant,
            bearer,
            origin,
            user_agent,
        })
    }
}

/// Caller address. `X-Forwarded-For` counts only when the peer is a
/// trusted proxy; the leftmost untrusted hop wins.
pub fn client_ip(headers: &HeaderMap, peer_addr: Option<IpAddr>, trusted_proxies: &[IpNet]) -> String {
    let peer = peer_addr.unwrap_or(IpAddr::from([127, 0, 0, 1]));

    if trusted_proxies.iter().any(|net| net.contains(&peer)) {
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            for ip_str in xff.split(',').map(str::trim) {
                if let Ok(ip) = ip_str.parse::<IpAddr>() {
                    if !trusted_proxies.iter().any(|net| net.contains(&ip)) {
                        return ip.to_string();
                    }
                }
            }
        }
    }

    peer.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn xff(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn ignores_forwarded_for_from_untrusted_peer() {
        let peer = Some("203.0.113.9".parse().unwrap());
        assert_eq!(client_ip(&xff("198.51.100.1"), peer, &[]), "203.0.113.9");
    }

    #[test]
    fn trusted_proxy_forwards_first_untrusted_hop() {
        let proxies: Vec<IpNet> = vec!["10.0.0.0/8".parse().unwrap()];
        let peer = Some("10.1.2.3".parse().unwrap());
        let headers = xff("198.51.100.1, 10.4.4.4");
        assert_eq!(client_ip(&headers, peer, &proxies), "198.51.100.1");
    }

    #[test]
    fn missing_peer_defaults_to_loopback() {
        assert_eq!(client_ip(&HeaderMap::new(), None, &[]), "127.0.0.1");
    }
}
