//! HTTP tracing middleware.
//!
//! Creates distributed traces for all HTTP requests following OpenTelemetry semantic
//! conventions, and stashes the extracted parent [`SpanContext`] in request extensions
//! so `llm`'s handlers can root the pipeline span under it.

use axum::{body::Body, extract::MatchedPath};
use config::{ClientIpConfig, TelemetryConfig};
use context::ClientIdentity;
use fastrace::future::FutureExt;
use fastrace::{
    Span,
    collector::{SpanId, TraceId},
    prelude::{LocalSpan, SpanContext},
};
use http::{HeaderMap, Request, Response};
use std::{
    fmt::Display,
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::Layer;

/// Layer for HTTP tracing.
#[derive(Clone)]
pub struct TracingLayer {
    telemetry_config: Arc<TelemetryConfig>,
    client_ip_config: ClientIpConfig,
}

impl TracingLayer {
    pub fn new(telemetry_config: Arc<TelemetryConfig>, client_ip_config: ClientIpConfig) -> Self {
        Self {
            telemetry_config,
            client_ip_config,
        }
    }
}

impl<Service> Layer<Service> for TracingLayer
where
    Service: Send + Clone,
{
    type Service = TracingService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        TracingService {
            next,
            telemetry_config: self.telemetry_config.clone(),
            client_ip_config: self.client_ip_config.clone(),
        }
    }
}

/// Service that creates traces for HTTP requests.
#[derive(Clone)]
pub struct TracingService<Service> {
    next: Service,
    telemetry_config: Arc<TelemetryConfig>,
    client_ip_config: ClientIpConfig,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for TracingService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched_path| matched_path.as_str().to_owned())
            .unwrap_or_else(|| req.uri().path().to_owned());

        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let scheme = req.uri().scheme_str().unwrap_or("http").to_string();

        let host = req
            .headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        let propagation = &self.telemetry_config.tracing().propagation;
        let (span_context, parent_sampled) = extract_trace_context(req.headers(), propagation);

        let span_name = format!("{method} {path}");
        let should_sample = should_sample_trace(parent_sampled, &self.telemetry_config);

        let client_ip = extract_client_ip(&self.client_ip_config, &req);
        req.extensions_mut().insert(ClientIdentity {
            client_id: client_ip.to_string(),
            group: None,
        });

        let parent = if should_sample && parent_sampled == Some(false) {
            if let Some(original_context) = span_context {
                SpanContext::new(original_context.trace_id, SpanId(rand::random::<u64>()))
            } else {
                SpanContext::random()
            }
        } else {
            span_context.unwrap_or_else(SpanContext::random)
        };

        let mut next = self.next.clone();

        if !should_sample {
            let fut = async move { next.call(req).await };
            return Box::pin(fut);
        }

        let root = Span::root(span_name.clone(), parent);

        // Stashed for handlers that need to root their own spans under this request's
        // parent (the pipeline span), since spawned tasks lose the thread-local span.
        req.extensions_mut().insert(parent);

        root.add_property(|| ("http.request.method", method.clone()));
        root.add_property(|| ("http.route", path.clone()));
        root.add_property(|| ("url.full", uri.clone()));
        root.add_property(|| ("url.scheme", scheme.clone()));

        if let Some(host) = host.clone() {
            root.add_property(|| ("server.address", host));
        }

        if let Some(client_identity) = req.extensions().get::<ClientIdentity>() {
            root.add_property(|| ("client.id", client_identity.client_id.clone()));

            if let Some(ref group) = client_identity.group {
                root.add_property(|| ("client.group", group.clone()));
            }
        }

        let fut = async move {
            let response = next.call(req).await?;

            let status = response.status();
            LocalSpan::add_property(|| ("http.response.status_code", status.as_u16().to_string()));

            if status.is_client_error() || status.is_server_error() {
                LocalSpan::add_property(|| ("error", "true"));
            }

            Ok(response)
        };

        Box::pin(fut.in_span(root))
    }
}

/// Extract the client's IP for usage-record attribution, honoring the configured
/// trust policy for proxy headers before falling back to the TCP peer address.
fn extract_client_ip<B>(config: &ClientIpConfig, req: &Request<B>) -> IpAddr {
    if config.x_real_ip
        && let Some(ip) = req
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    {
        return ip;
    }

    if let Some(hops) = config.x_forwarded_for_trusted_hops
        && let Some(ip) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').rev().nth(hops))
            .and_then(|s| s.trim().parse().ok())
    {
        return ip;
    }

    req.extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

/// Extract trace context and sampling decision from HTTP headers, honoring which
/// propagation formats are enabled. Returns `(SpanContext, parent_sampled)`.
fn extract_trace_context(
    headers: &HeaderMap,
    propagation: &config::PropagationConfig,
) -> (Option<SpanContext>, Option<bool>) {
    if propagation.trace_context
        && let Some(traceparent) = headers.get("traceparent")
        && let Ok(traceparent_str) = traceparent.to_str()
    {
        let (context, sampled) = parse_traceparent_with_sampling(traceparent_str);
        if let Some(ctx) = context {
            return (Some(ctx), sampled);
        }
    }

    if propagation.aws_xray
        && let Some(xray_header) = headers.get("x-amzn-trace-id")
        && let Ok(xray_str) = xray_header.to_str()
    {
        let (context, sampled) = parse_xray_trace_id_with_sampling(xray_str);
        if let Some(ctx) = context {
            return (Some(ctx), sampled);
        }
    }

    (None, None)
}

/// Parse a W3C `traceparent` header, e.g.
/// `00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01`.
fn parse_traceparent_with_sampling(traceparent: &str) -> (Option<SpanContext>, Option<bool>) {
    let parts: Vec<&str> = traceparent.split('-').collect();
    if parts.len() == 4
        && let Ok(flags) = u8::from_str_radix(parts[3], 16)
    {
        let sampled = (flags & 0x01) == 0x01;
        let context = SpanContext::decode_w3c_traceparent(traceparent);
        return (context, Some(sampled));
    }

    (SpanContext::decode_w3c_traceparent(traceparent), None)
}

/// Parse an AWS X-Ray `X-Amzn-Trace-Id` header, e.g.
/// `Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1`.
fn parse_xray_trace_id_with_sampling(xray_str: &str) -> (Option<SpanContext>, Option<bool>) {
    let mut trace_id = None;
    let mut parent_id = None;
    let mut sampled = None;

    for part in xray_str.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            match key {
                "Root" => {
                    let parts: Vec<&str> = value.split('-').collect();
                    if parts.len() == 3
                        && parts[0] == "1"
                    {
                        let trace_id_str = format!("{}{}", parts[1], parts[2]);
                        if trace_id_str.len() == 32
                            && let Ok(id) = u128::from_str_radix(&trace_id_str, 16)
                        {
                            trace_id = Some(id);
                        }
                    }
                }
                "Parent" => {
                    if let Ok(id) = u64::from_str_radix(value, 16) {
                        parent_id = Some(id);
                    }
                }
                "Sampled" => sampled = Some(value == "1"),
                _ => {}
            }
        }
    }

    let context = match (trace_id, parent_id) {
        (Some(tid), Some(pid)) => Some(SpanContext::new(TraceId(tid), SpanId(pid))),
        _ => None,
    };

    (context, sampled)
}

/// Determine if a trace should be sampled based on parent sampling and configuration.
fn should_sample_trace(parent_sampled: Option<bool>, telemetry_config: &TelemetryConfig) -> bool {
    if !telemetry_config.tracing_enabled() {
        return false;
    }

    let tracing_config = telemetry_config.tracing();

    if tracing_config.parent_based_sampler
        && let Some(sampled) = parent_sampled
    {
        return sampled;
    }

    use rand::Rng;
    let sample_rate = tracing_config.sampling;

    if sample_rate <= 0.0 {
        false
    } else if sample_rate >= 1.0 {
        true
    } else {
        rand::rng().random_bool(sample_rate)
    }
}
