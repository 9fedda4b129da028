mod common;

use std::convert::Infallible;

use axum::body::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Empty};
use server_kit::config::ServiceConfig;
use server_kit::Container;
use tower::{service_fn, ServiceBuilder, ServiceExt};
use tracing::Level;

use common::{container, sample, Frames, LogCapture};

const SEND: &str = "/chat.Chat/Send";
const WATCH: &str = "/chat.Chat/Watch";

fn chat_container() -> Container {
    let mut config = ServiceConfig::default();
    config.grpc.streaming_methods = vec![WATCH.to_owned()];
    container(config)
}

fn call(method: &str) -> Request<Empty<Bytes>> {
    Request::builder()
        .method("POST")
        .uri(method)
        .header("content-type", "application/grpc")
        .body(Empty::new())
        .unwrap()
}

#[tokio::test]
async fn test_unary_call_is_recorded_when_trailers_arrive() {
    let (capture, _guard) = LogCapture::install();
    let container = chat_container();
    let svc = ServiceBuilder::new()
        .layer(container.grpc_metrics_layer())
        .layer(container.grpc_logging_layer())
        .service(service_fn(|_req: Request<Empty<Bytes>>| async {
            Ok::<_, Infallible>(Response::new(Frames::messages_then_status(
                &[b"reply"],
                "0",
            )))
        }));

    let response = svc.oneshot(call(SEND)).await.unwrap();
    assert!(
        !container
            .metrics()
            .render()
            .contains("grpc_unary_requests_total{"),
        "call is still open until the body ends"
    );

    let collected = response.into_body().collect().await.unwrap();
    assert_eq!(collected.to_bytes().as_ref(), b"reply");

    let rendered = container.metrics().render();
    assert_eq!(
        sample(
            &rendered,
            "grpc_unary_requests_total",
            &[("status", "ok"), ("method", SEND)]
        ),
        Some(1.0)
    );
    assert_eq!(
        sample(
            &rendered,
            "grpc_unary_request_duration_seconds_count",
            &[("method", SEND)]
        ),
        Some(1.0)
    );

    let events = capture.access_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::DEBUG);
    assert_eq!(events[0].field("method"), Some(SEND));
    assert_eq!(events[0].field("kind"), Some("unary"));
    assert_eq!(events[0].field("status"), Some("ok"));
    assert_eq!(events[0].field("code"), Some("0"));
}

#[tokio::test]
async fn test_body_dropped_after_trailers_counts_as_ok() {
    let (capture, _guard) = LogCapture::install();
    let container = chat_container();
    let svc = ServiceBuilder::new()
        .layer(container.grpc_metrics_layer())
        .layer(container.grpc_logging_layer())
        .service(service_fn(|_req: Request<Empty<Bytes>>| async {
            Ok::<_, Infallible>(Response::new(Frames::messages_then_status(
                &[b"reply"],
                "0",
            )))
        }));

    let response = svc.oneshot(call(SEND)).await.unwrap();

    // The HTTP/2 server stops polling once trailers are written.
    let mut body = response.into_body();
    let message = body.frame().await.unwrap().unwrap();
    assert!(message.is_data());
    let trailers = body.frame().await.unwrap().unwrap();
    assert!(trailers.is_trailers());
    drop(body);

    let rendered = container.metrics().render();
    assert_eq!(
        sample(
            &rendered,
            "grpc_unary_requests_total",
            &[("status", "ok"), ("method", SEND)]
        ),
        Some(1.0)
    );
    assert_eq!(
        sample(
            &rendered,
            "grpc_unary_requests_total",
            &[("status", "err"), ("method", SEND)]
        ),
        None
    );

    let events = capture.access_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::DEBUG);
    assert_eq!(events[0].field("code"), Some("0"));
}

#[tokio::test]
async fn test_failed_stream_is_recorded_as_err() {
    let (capture, _guard) = LogCapture::install();
    let container = chat_container();
    let svc = ServiceBuilder::new()
        .layer(container.grpc_metrics_layer())
        .layer(container.grpc_logging_layer())
        .service(service_fn(|_req: Request<Empty<Bytes>>| async {
            Ok::<_, Infallible>(Response::new(Frames::messages_then_status(
                &[b"first", b"second"],
                "13",
            )))
        }));

    let request = Request::builder()
        .method("POST")
        .uri(WATCH)
        .header("x-request-id", "watch-7")
        .body(Empty::new())
        .unwrap();
    let response = svc.oneshot(request).await.unwrap();
    response.into_body().collect().await.unwrap();

    let rendered = container.metrics().render();
    assert_eq!(
        sample(
            &rendered,
            "grpc_stream_requests_total",
            &[("status", "err"), ("method", WATCH)]
        ),
        Some(1.0)
    );
    assert!(!rendered.contains("grpc_unary_requests_total{"));

    let events = capture.access_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::ERROR);
    assert_eq!(events[0].field("kind"), Some("stream"));
    assert_eq!(events[0].field("code"), Some("13"));
    assert_eq!(events[0].field("request_id"), Some("watch-7"));
}

#[tokio::test]
async fn test_abandoned_stream_counts_as_err() {
    let container = chat_container();
    let svc = ServiceBuilder::new()
        .layer(container.grpc_metrics_layer())
        .service(service_fn(|_req: Request<Empty<Bytes>>| async {
            Ok::<_, Infallible>(Response::new(Frames::messages_then_status(
                &[b"first", b"second"],
                "0",
            )))
        }));

    let response = svc.oneshot(call(WATCH)).await.unwrap();
    let mut body = response.into_body();
    body.frame().await.unwrap().unwrap();
    drop(body);

    let rendered = container.metrics().render();
    assert_eq!(
        sample(
            &rendered,
            "grpc_stream_requests_total",
            &[("status", "err"), ("method", WATCH)]
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_service_error_is_returned_and_counted() {
    let (capture, _guard) = LogCapture::install();
    let container = chat_container();
    let svc = ServiceBuilder::new()
        .layer(container.grpc_metrics_layer())
        .layer(container.grpc_logging_layer())
        .service(service_fn(|_req: Request<Empty<Bytes>>| async {
            Err::<Response<Frames>, _>("transport closed")
        }));

    let err = svc.oneshot(call(SEND)).await.unwrap_err();
    assert_eq!(err, "transport closed");

    let rendered = container.metrics().render();
    assert_eq!(
        sample(
            &rendered,
            "grpc_unary_requests_total",
            &[("status", "err"), ("method", SEND)]
        ),
        Some(1.0)
    );
    assert_eq!(capture.access_events()[0].level, Level::ERROR);
}

#[test]
fn test_server_builder_accepts_container_layers() {
    let container = chat_container();
    let _server = server_kit::new_grpc_server(&container);
}
