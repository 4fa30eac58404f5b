use crate::core::models::ProxyRule;
use crate::utils::{Logger, Result, TailpackError};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Request, Response, StatusCode};
use glob::Pattern;
use reqwest::{redirect, Client, Url};
use std::time::Duration;

/// Connection-scoped headers that must not cross the proxy
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

enum ContextPattern {
    Glob(Pattern),
    Prefix(String),
}

impl ContextPattern {
    fn parse(raw: &str) -> Result<Self> {
        if raw.contains(['*', '?', '[']) {
            Pattern::new(raw)
                .map(ContextPattern::Glob)
                .map_err(|e| TailpackError::config("devServer.proxy", format!("bad context '{}': {}", raw, e)))
        } else {
            Ok(ContextPattern::Prefix(raw.to_string()))
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            ContextPattern::Glob(pattern) => pattern.matches(path),
            ContextPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Context list of one rule. A path matches when it hits an include (or the
/// list has none) and no `!` exclude.
pub struct ContextMatcher {
    includes: Vec<ContextPattern>,
    excludes: Vec<ContextPattern>,
}

impl ContextMatcher {
    pub fn new(context: &[String]) -> Result<Self> {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        for raw in context {
            match raw.strip_prefix('!') {
                Some(negated) => excludes.push(ContextPattern::parse(negated)?),
                None => includes.push(ContextPattern::parse(raw)?),
            }
        }
        Ok(Self { includes, excludes })
    }

    pub fn matches(&self, path: &str) -> bool {
        let included = self.includes.is_empty() || self.includes.iter().any(|p| p.matches(path));
        included && !self.excludes.iter().any(|p| p.matches(path))
    }
}

pub struct ProxyRoute {
    matcher: ContextMatcher,
    target: Url,
    change_origin: bool,
    client: Client,
}

impl ProxyRoute {
    pub fn new(rule: &ProxyRule) -> Result<Self> {
        let target = Url::parse(&rule.target).map_err(|e| {
            TailpackError::config("devServer.proxy", format!("invalid target '{}': {}", rule.target, e))
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .danger_accept_invalid_certs(!rule.secure)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| TailpackError::proxy(&rule.target, e.to_string()))?;

        Ok(Self {
            matcher: ContextMatcher::new(&rule.context)?,
            target,
            change_origin: rule.change_origin,
            client,
        })
    }

    pub fn target(&self) -> &str {
        self.target.as_str()
    }

    /// Target origin with the request path appended. The request never picks
    /// the scheme, host or port.
    fn upstream_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.target.clone();
        let base = self.target.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", base, path));
        url.set_query(query);
        url
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop as well
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Forwards requests that no build asset answers to the backend
pub struct ReverseProxy {
    routes: Vec<ProxyRoute>,
}

impl ReverseProxy {
    pub fn new(rules: &[ProxyRule]) -> Result<Self> {
        let routes = rules.iter().map(ProxyRoute::new).collect::<Result<Vec<_>>>()?;
        Ok(Self { routes })
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First rule whose context matches; rules are tried in configuration order.
    pub fn route_for(&self, path: &str) -> Option<&ProxyRoute> {
        self.routes.iter().find(|route| route.matcher.matches(path))
    }

    /// Forward with method, headers and body intact. Bodies are streamed in
    /// both directions.
    pub async fn forward(&self, route: &ProxyRoute, request: Request<Body>) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let url = route.upstream_url(parts.uri.path(), parts.uri.query());

        Logger::proxying(parts.method.as_str(), url.path(), route.target());

        let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        if route.change_origin {
            // Let the client derive Host from the target URL
            headers.remove(header::HOST);
        }

        let mut upstream = route.client.request(parts.method, url).headers(headers);
        if has_body {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let upstream = upstream
            .send()
            .await
            .map_err(|e| TailpackError::proxy(route.target(), e.to_string()))?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// What the browser sees when the backend is down.
pub fn bad_gateway(err: &TailpackError) -> Response<Body> {
    Logger::warn(&err.to_string());
    let mut response = Response::new(Body::from(format!("Bad Gateway: {}\n", err)));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
