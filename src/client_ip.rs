//! Client address resolution behind reverse proxies.
//!
//! The candidate list is the socket peer followed by the `X-Forwarded-For`
//! entries read right to left. With `n` trusted hops the client is the entry
//! at index `n`, or the furthest one when the chain is shorter.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};

/// Resolved client address, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Number of reverse proxies in front of the service whose headers are trusted.
#[derive(Debug, Clone, Copy)]
pub struct TrustedProxyHops(pub usize);

/// Picks the client address from the peer and the forwarding chain.
///
/// Entries that do not parse as an IP end the chain.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>, hops: usize) -> Option<IpAddr> {
    let peer = peer?;

    let forwarded: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map_while(|entry| entry.parse::<IpAddr>().ok())
        .collect();

    let chain: Vec<IpAddr> = std::iter::once(peer).chain(forwarded).collect();
    let index = hops.min(chain.len() - 1);

    Some(chain[index])
}

/// Middleware that resolves the client address once per request.
pub async fn client_ip_middleware(
    State(TrustedProxyHops(hops)): State<TrustedProxyHops>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = resolve_client_ip(request.headers(), peer, hops) {
        request.extensions_mut().insert(ClientIp(ip));
    }

    next.run(request).await
}
