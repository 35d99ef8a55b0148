//! Framing of relay fragment streams into incrementally flushed HTTP
//! bodies. Once a body has started flushing, status and headers are
//! committed, so failures surface as one in-band diagnostic fragment.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use compliance_core::ComplianceError;
use futures::{Stream, StreamExt};
use serde_json::Value;

/// The single diagnostic fragment emitted for an in-stream failure.
fn diagnostic(err: &ComplianceError) -> String {
    format!("[completion API error: {err}]")
}

/// Forward fragments verbatim as a text/plain body, flushed as they arrive.
pub fn plain_response<S>(fragments: S) -> Response
where
    S: Stream<Item = compliance_core::Result<String>> + Send + 'static,
{
    let body = Body::from_stream(fragments.map(|item| {
        let text = match item {
            Ok(fragment) => fragment,
            Err(err) => diagnostic(&err),
        };
        Ok::<_, Infallible>(Bytes::from(text))
    }));

    ([(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

/// Re-frame each non-empty fragment as its own server-sent event carrying
/// the JSON-encoded fragment, so a generic event-stream client can consume
/// the relay incrementally.
pub fn event_stream_response<S>(fragments: S) -> Response
where
    S: Stream<Item = compliance_core::Result<String>> + Send + 'static,
{
    let body = Body::from_stream(fragments.filter_map(|item| async move {
        let text = match item {
            Ok(fragment) if fragment.is_empty() => return None,
            Ok(fragment) => fragment,
            Err(err) => diagnostic(&err),
        };
        let frame = format!("data: {}\n\n", Value::String(text));
        Some(Ok::<_, Infallible>(Bytes::from(frame)))
    }));

    ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
}
