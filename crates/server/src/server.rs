//! HTTP front end speaking the Kinesis `Kinesis_20131202` JSON protocol.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use kinesim_core::StreamRegistry;
use kinesim_types::{Action, ActionOutput, Operation};
use rand::Rng;
use serde_json::{Value as JsonValue, json};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    error::{ProtocolError, ServerError},
    options::ServerOptions,
    validation,
};

/// Requests larger than this are answered with 413.
pub const MAX_REQUEST_BYTES: usize = 7 * 1024 * 1024;

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const PLAIN_JSON: &str = "application/json";
const TARGET_HEADER: &str = "x-amz-target";
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-amzn-requestid");
const ID_2_HEADER: HeaderName = HeaderName::from_static("x-amz-id-2");

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StreamRegistry>,
    pub options: ServerOptions,
}

/// Create the router. Every path and method lands on the same handler; the
/// operation comes from the `X-Amz-Target` header.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn handle_request(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method == Method::DELETE {
        warn!("Rejecting DELETE request");
        return (StatusCode::METHOD_NOT_ALLOWED, [(header::CONNECTION, "close")]).into_response();
    }

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Rejecting oversized request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut response = respond(&state.registry, &headers, &body);
    stamp_request_ids(response.headers_mut());
    response
}

fn respond(registry: &StreamRegistry, headers: &HeaderMap, body: &Bytes) -> Response {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .filter(|v| v.as_bytes() == AMZ_JSON.as_bytes() || v.as_bytes() == PLAIN_JSON.as_bytes())
        .cloned()
    else {
        let err = if headers.contains_key(header::AUTHORIZATION) {
            ProtocolError::AccessDeniedXml
        } else {
            ProtocolError::MissingTokenXml
        };
        warn!(error_type = err.error_type(), "Rejecting unsupported content type");
        let xml = err.xml_body().unwrap_or_default();
        return (err.status(), Body::from(xml)).into_response();
    };

    if content_type.as_bytes() == PLAIN_JSON.as_bytes() {
        let envelope = plain_json_envelope(headers, body);
        return json_response(StatusCode::OK, content_type, Some(&envelope));
    }

    match process(registry, headers, body) {
        Ok(output) if output.is_empty() => {
            json_response(StatusCode::OK, content_type, None::<&ActionOutput>)
        }
        Ok(output) => json_response(StatusCode::OK, content_type, Some(&output)),
        Err(err) => {
            warn!(
                error_type = err.error_type(),
                error = %err,
                "Request rejected"
            );
            json_response(err.status(), content_type, Some(&err.json_body()))
        }
    }
}

/// Decode, authenticate, validate and run one `application/x-amz-json-1.1` request.
fn process(
    registry: &StreamRegistry,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ActionOutput, ProtocolError> {
    let operation = target_operation(headers).ok_or(ProtocolError::UnknownOperation)?;
    let data: JsonValue =
        serde_json::from_slice(body).map_err(|_| ProtocolError::Serialization(None))?;

    check_authorization(headers)?;

    let data = validation::validate(operation, data)?;
    let action = Action::from_json(operation, data)
        .map_err(|e| ProtocolError::serialization(e.to_string()))?;

    debug!(operation = %operation, "Dispatching request");
    Ok(registry.dispatch(action)?)
}

/// `application/json` requests never reach an operation: the answer is always
/// a 200 envelope naming the failure.
fn plain_json_envelope(headers: &HeaderMap, body: &[u8]) -> JsonValue {
    let unknown = json!({
        "Output": {
            "__type": "com.amazon.coral.service#UnknownOperationException",
            "message": null,
        },
        "Version": "1.0",
    });

    if target_operation(headers).is_none() {
        return unknown;
    }
    if !body.is_empty() && serde_json::from_slice::<JsonValue>(body).is_err() {
        return json!({
            "Output": {
                "__type": "com.amazon.coral.service#SerializationException",
                "Message": null,
            },
            "Version": "1.0",
        });
    }
    unknown
}

fn target_operation(headers: &HeaderMap) -> Option<Operation> {
    headers
        .get(TARGET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(Operation::from_target)
}

/// Shape check of the `Authorization` header; signatures are never verified.
fn check_authorization(headers: &HeaderMap) -> Result<(), ProtocolError> {
    let Some(auth) = headers.get(header::AUTHORIZATION) else {
        return Err(ProtocolError::MissingAuthenticationToken);
    };
    let auth = String::from_utf8_lossy(auth.as_bytes());

    let joined: String = auth.split(' ').skip(1).collect();
    let params: HashMap<&str, &str> = joined
        .split(',')
        .filter_map(|pair| {
            let mut parts = pair.trim().split('=');
            Some((parts.next()?, parts.next()?))
        })
        .collect();

    let mut message = String::new();
    for name in ["Credential", "Signature", "SignedHeaders"] {
        if params.get(name).is_none_or(|value| value.is_empty()) {
            message.push_str(&format!(
                "Authorization header requires '{}' parameter. ",
                name
            ));
        }
    }

    let has_date = ["x-amz-date", "date"]
        .iter()
        .any(|name| headers.get(*name).is_some_and(|v| !v.is_empty()));
    if !has_date {
        message.push_str(
            "Authorization header requires existence of either a 'X-Amz-Date' or a 'Date' header. ",
        );
    }

    if message.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::IncompleteSignature(format!(
            "{}Authorization={}",
            message, auth
        )))
    }
}

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    content_type: HeaderValue,
    payload: Option<&T>,
) -> Response {
    let body = match payload.map(serde_json::to_vec).transpose() {
        Ok(bytes) => bytes.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Failed to encode response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn stamp_request_ids(headers: &mut HeaderMap) {
    let mut id_2 = [0u8; 72];
    rand::thread_rng().fill(&mut id_2[..]);

    let values = [
        (REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string()),
        (ID_2_HEADER, STANDARD.encode(id_2)),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::try_from(value) {
            headers.insert(name, value);
        }
    }
}

/// Start the emulator and serve until Ctrl+C.
pub async fn start_server(options: ServerOptions) -> Result<(), ServerError> {
    let registry = StreamRegistry::new(options.registry.clone())?;
    let scheduler = registry.spawn_scheduler();

    let state = AppState {
        registry: registry.clone(),
        options: options.clone(),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(options.addr()).await?;
    info!(addr = %listener.local_addr()?, "Kinesis emulator listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.close();
    if let Err(e) = scheduler.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use kinesim_core::RegistryConfig;
    use tower::ServiceExt;

    use super::*;

    const AUTH: &str = "AWS4-HMAC-SHA256 Credential=AKID/20150101/us-east-1/kinesis/aws4_request, \
                        SignedHeaders=host;x-amz-date, Signature=abcd";

    fn create_test_app() -> Router {
        let options = ServerOptions {
            registry: RegistryConfig::default().with_delays(0),
            ..Default::default()
        };
        let registry = StreamRegistry::new(options.registry.clone()).unwrap();
        create_router(AppState { registry, options })
    }

    fn kinesis_request(operation: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, AMZ_JSON)
            .header(TARGET_HEADER, format!("Kinesis_20131202.{}", operation))
            .header(header::AUTHORIZATION, AUTH)
            .header("x-amz-date", "20150101T000000Z")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body)
    }

    async fn call(app: &Router, operation: &str, body: JsonValue) -> (StatusCode, JsonValue) {
        let (status, _, bytes) = send(app, kinesis_request(operation, body)).await;
        let json = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_unsupported_content_type_is_xml() {
        let app = create_test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(headers.get(header::CONTENT_TYPE).is_none());
        assert!(headers.contains_key("x-amzn-requestid"));
        assert_eq!(
            body,
            "<MissingAuthenticationTokenException>\n  <Message>Missing Authentication Token</Message>\n</MissingAuthenticationTokenException>\n"
        );

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::AUTHORIZATION, "whatever")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            "<AccessDeniedException>\n  <Message>Unable to determine service/operation name to be authorized</Message>\n</AccessDeniedException>\n"
        );
    }

    #[tokio::test]
    async fn test_delete_method_is_refused() {
        let app = create_test_app();
        let request = Request::builder()
            .method("DELETE")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers.get(header::CONNECTION).unwrap(), "close");
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let app = create_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, AMZ_JSON)
            .body(Body::from(vec![b' '; MAX_REQUEST_BYTES + 1]))
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let app = create_test_app();
        let (status, body) = call(&app, "Frobnicate", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"__type": "UnknownOperationException"}));
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let app = create_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, AMZ_JSON)
            .header(TARGET_HEADER, "Kinesis_20131202.ListStreams")
            .body(Body::from("{"))
            .unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), AMZ_JSON);
        assert_eq!(body, r#"{"__type":"SerializationException"}"#);
    }

    #[tokio::test]
    async fn test_plain_json_envelopes() {
        let app = create_test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, PLAIN_JSON)
            .header(TARGET_HEADER, "Kinesis_20131202.ListStreams")
            .body(Body::from("{}"))
            .unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), PLAIN_JSON);
        let body: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({
                "Output": {"__type": "com.amazon.coral.service#UnknownOperationException", "message": null},
                "Version": "1.0"
            })
        );

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, PLAIN_JSON)
            .header(TARGET_HEADER, "Kinesis_20131202.ListStreams")
            .body(Body::from("not json"))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body["Output"]["__type"],
            "com.amazon.coral.service#SerializationException"
        );
    }

    #[tokio::test]
    async fn test_missing_authorization() {
        let app = create_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, AMZ_JSON)
            .header(TARGET_HEADER, "Kinesis_20131202.ListStreams")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({"__type": "MissingAuthenticationTokenException", "message": "Missing Authentication Token"})
        );
    }

    #[tokio::test]
    async fn test_incomplete_signature() {
        let app = create_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, AMZ_JSON)
            .header(TARGET_HEADER, "Kinesis_20131202.ListStreams")
            .header(header::AUTHORIZATION, "AWS4 Credential=a")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["__type"], "IncompleteSignatureException");
        assert_eq!(
            body["message"],
            "Authorization header requires 'Signature' parameter. Authorization header requires \
             'SignedHeaders' parameter. Authorization header requires existence of either a \
             'X-Amz-Date' or a 'Date' header. Authorization=AWS4 Credential=a"
        );
    }

    #[tokio::test]
    async fn test_validation_error() {
        let app = create_test_app();
        let (status, body) = call(&app, "CreateStream", json!({"StreamName": "s"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "__type": "ValidationException",
                "message": "1 validation error detected: Value null at 'shardCount' failed to \
                            satisfy constraint: Member must not be null"
            })
        );
    }

    #[tokio::test]
    async fn test_service_error() {
        let app = create_test_app();
        let (status, body) = call(&app, "DescribeStream", json!({"StreamName": "missing"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["__type"], "ResourceNotFoundException");
        assert_eq!(
            body["message"],
            "Stream missing under account 000000000000 not found."
        );
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let app = create_test_app();

        let (status, body) = call(
            &app,
            "CreateStream",
            json!({"StreamName": "events", "ShardCount": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, JsonValue::Null);

        let (_, body) = call(&app, "DescribeStream", json!({"StreamName": "events"})).await;
        assert_eq!(body["StreamDescription"]["StreamStatus"], "ACTIVE");
        assert_eq!(
            body["StreamDescription"]["Shards"][0]["ShardId"],
            "shardId-000000000000"
        );

        let (status, put) = call(
            &app,
            "PutRecord",
            json!({"StreamName": "events", "PartitionKey": "a", "Data": "aGVsbG8="}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(put["ShardId"], "shardId-000000000000");

        let (_, iterator) = call(
            &app,
            "GetShardIterator",
            json!({
                "StreamName": "events",
                "ShardId": "shardId-000000000000",
                "ShardIteratorType": "TRIM_HORIZON"
            }),
        )
        .await;
        let (status, records) = call(
            &app,
            "GetRecords",
            json!({"ShardIterator": iterator["ShardIterator"]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records["Records"][0]["Data"], "aGVsbG8=");
        assert_eq!(records["Records"][0]["PartitionKey"], "a");
        assert_eq!(records["Records"][0]["SequenceNumber"], put["SequenceNumber"]);
        assert!(records["NextShardIterator"].is_string());

        let (_, list) = call(&app, "ListStreams", json!({})).await;
        assert_eq!(list, json!({"StreamNames": ["events"], "HasMoreStreams": false}));
    }

    #[tokio::test]
    async fn test_request_ids() {
        let app = create_test_app();
        let (_, headers, _) = send(&app, kinesis_request("ListStreams", json!({}))).await;
        let id_2 = headers.get("x-amz-id-2").unwrap().to_str().unwrap();
        assert_eq!(STANDARD.decode(id_2).unwrap().len(), 72);
        let request_id = headers.get("x-amzn-requestid").unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(request_id).is_ok());
    }
}
