use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use metrics::{counter, histogram};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::presentation::views::{render_not_found_response, render_server_error_response};

use super::session::Viewer;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    histogram!("blogroll_http_request_ms").record(elapsed_ms as f64);

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "blogroll::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "blogroll::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Swap bare 404 and 500 bodies for the site's HTML error pages.
///
/// Responses that already carry HTML are left alone; the original
/// [`ErrorReport`] is carried over to the replacement.
pub async fn render_error_pages(request: Request<Body>, next: Next) -> Response {
    let viewer = request
        .extensions()
        .get::<Viewer>()
        .and_then(|viewer| viewer.0.clone());
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let status = response.status();
    if !matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::INTERNAL_SERVER_ERROR
    ) || is_html(&response)
    {
        return response;
    }

    let report = response.extensions().get::<ErrorReport>().cloned();
    let mut page = if status == StatusCode::NOT_FOUND {
        render_not_found_response(viewer.as_ref(), &path)
    } else {
        render_server_error_response(viewer.as_ref())
    };
    if let Some(report) = report {
        report.attach(&mut page);
    }
    page
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}

/// Turn a panicking handler into a plain 500 so the error page layer can render it.
pub async fn catch_panic(request: Request<Body>, next: Next) -> Response {
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            counter!("blogroll_http_panics_total").increment(1);
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_message(
                "infra::http::middleware::catch_panic",
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("handler panicked: {}", panic_message(payload.as_ref())),
            )
            .attach(&mut response);
            response
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
