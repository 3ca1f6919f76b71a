mod nginx;
mod reset;
mod start;
mod status;

pub use nginx::*;
pub use reset::*;
pub use start::*;
pub use status::*;
pub use test::*;

use crate::deploy::EventStream;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use futures::StreamExt;
use std::convert::Infallible;

/// Chunked NDJSON response; each event is written as soon as it is emitted.
pub(crate) fn event_stream_response(events: EventStream) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::HeaderName::from_static("x-accel-buffering"), "no"))
        .streaming(events.map(|event| Ok::<_, Infallible>(web::Bytes::from(event.to_line()))))
}
