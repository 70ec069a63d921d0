//! Extractors for the identity the gate forwards and for client metadata.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use nexus_core::auth::session::{Authorization, Requirement, authorize};
use nexus_core::models::audit::ClientMeta;
use nexus_core::models::auth::SessionUser;

use crate::AppState;
use crate::error::AppError;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Address a proxy reported: first `X-Forwarded-For` hop, else `X-Real-IP`.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let candidate = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))?;
    candidate.parse().ok()
}

/// Client address and user agent.
///
/// The socket peer is the client unless it is one of `trusted_proxies`, in
/// which case the address the proxy forwarded is used. Forwarding headers
/// from any other peer are ignored.
pub fn client_meta(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> ClientMeta {
    let peer = peer.map(|ip| ip.to_canonical());
    let client = match peer {
        Some(ip) if trusted_proxies.contains(&ip) => forwarded_for(headers).or(Some(ip)),
        other => other,
    };
    ClientMeta {
        ip_address: client.map(|ip| ip.to_string()),
        user_agent: header_str(headers, "user-agent").map(str::to_string),
    }
}

/// Metadata about the calling client.
#[derive(Debug, Clone)]
pub struct ClientInfo(pub ClientMeta);

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientInfo(client_meta(
            &parts.headers,
            peer,
            &state.config.trusted_proxies,
        )))
    }
}

fn require(parts: &Parts, requirement: Requirement<'_>) -> Result<SessionUser, AppError> {
    match authorize(parts.extensions.get::<SessionUser>().cloned(), requirement) {
        Authorization::Granted(session) => Ok(session),
        Authorization::Unauthorized => Err(AppError::Unauthorized("Not authenticated".into())),
        Authorization::Forbidden => Err(AppError::Forbidden("Admin access required".into())),
    }
}

/// Session the gate attached to the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require(parts, Requirement::Authenticated).map(CurrentUser)
    }
}

/// Session with the admin flag set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub SessionUser);

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require(parts, Requirement::Admin).map(AdminUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, value.parse().unwrap());
        }
        headers
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn untrusted_peer_ignores_forwarding_headers() {
        let meta = client_meta(
            &headers(&[
                ("x-forwarded-for", "203.0.113.7"),
                ("x-real-ip", "203.0.113.8"),
                ("user-agent", "curl/8.5"),
            ]),
            Some(ip("198.51.100.4")),
            &[],
        );
        assert_eq!(meta.ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.5"));
    }

    #[test]
    fn trusted_proxy_reports_first_forwarded_hop() {
        let proxies = [ip("10.0.0.1")];
        let meta = client_meta(
            &headers(&[("x-forwarded-for", " 203.0.113.7 , 10.0.0.9")]),
            Some(ip("10.0.0.1")),
            &proxies,
        );
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));

        let meta = client_meta(
            &headers(&[("x-real-ip", "203.0.113.8")]),
            Some(ip("10.0.0.1")),
            &proxies,
        );
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.8"));
    }

    #[test]
    fn trusted_proxy_without_usable_header_is_the_client() {
        let proxies = [ip("10.0.0.1")];
        for pairs in [&[][..], &[("x-forwarded-for", "not-an-address")][..]] {
            let meta = client_meta(&headers(pairs), Some(ip("10.0.0.1")), &proxies);
            assert_eq!(meta.ip_address.as_deref(), Some("10.0.0.1"));
        }
    }

    #[test]
    fn mapped_ipv4_peer_matches_trusted_ipv4() {
        let meta = client_meta(
            &headers(&[("x-forwarded-for", "203.0.113.7")]),
            Some(ip("::ffff:10.0.0.1")),
            &[ip("10.0.0.1")],
        );
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn no_peer_means_unknown_client() {
        let meta = client_meta(&headers(&[("x-forwarded-for", "203.0.113.7")]), None, &[]);
        assert_eq!(meta, ClientMeta::default());
        assert_eq!(meta.rate_limit_key(), "unknown");
    }
}
