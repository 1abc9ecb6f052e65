use std::net::{SocketAddr, TcpListener};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlpad_adapters::http::HttpQueryBackend;
use sqlpad_core::query_runner::{QueryBackend, QueryBackendError, QueryLifecycle, QueryState};
use sqlpad_core::statements::QueryRequest;

async fn playground(Json(body): Json<Value>) -> Response {
    let stmts: Vec<String> = body["stmts"]
        .as_array()
        .map(|stmts| {
            stmts
                .iter()
                .filter_map(|stmt| stmt.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let distributed = body["distributed"].as_bool().unwrap_or_default();

    match stmts.last().map(String::as_str) {
        Some("SELECT broken") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "SQL error: ParserError(\"broken\")" })),
        )
            .into_response(),
        Some("SELECT crash") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "worker panicked").into_response()
        }
        _ => Json(json!({
            "columns": [["statements", "Int64"], ["distributed", "Boolean"]],
            "rows": [[stmts.len().to_string(), distributed.to_string()]],
            "logical_plan": "Projection: Int64(1)",
            "physical_plan": "ProjectionExec",
            "graphviz": "digraph { a -> b }",
        }))
        .into_response(),
    }
}

fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = Router::new().route("/api/main", post(playground));
    let server = axum::Server::from_tcp(listener)
        .expect("server from listener")
        .serve(app.into_make_service());
    tokio::spawn(server);
    addr
}

fn backend(addr: SocketAddr) -> HttpQueryBackend {
    HttpQueryBackend::new(&format!("http://{addr}/")).expect("client builds")
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_query_round_trips_request_and_payload() {
    let addr = spawn_server();
    let request =
        QueryRequest::from_sources(["CREATE TABLE t (a INT);", "SELECT 1;"]).with_distributed(true);

    let response = backend(addr)
        .execute(&request)
        .await
        .expect("query should succeed");

    assert_eq!(response.column_names(), vec!["statements", "distributed"]);
    assert_eq!(response.rows, vec![vec!["2".to_string(), "true".to_string()]]);
    assert_eq!(response.physical_plan(), Some("ProjectionExec"));
    assert_eq!(response.graph_text(), Some("digraph { a -> b }"));
    assert_eq!(response.graph_image, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_request_message_is_surfaced_verbatim() {
    let addr = spawn_server();
    let lifecycle = QueryLifecycle::new(backend(addr));

    let state = lifecycle
        .execute(QueryRequest::from_sources(["SELECT broken"]))
        .await;

    assert_eq!(
        state,
        QueryState::Failed {
            message: "SQL error: ParserError(\"broken\")".to_string()
        }
    );
    assert_eq!(lifecycle.state(), state);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_reports_status_and_body() {
    let addr = spawn_server();

    let error = backend(addr)
        .execute(&QueryRequest::from_sources(["SELECT crash"]))
        .await
        .expect_err("500 must fail");

    assert_eq!(
        error,
        QueryBackendError::UnexpectedStatus {
            status: 500,
            body: "worker panicked".to_string()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let error = backend(addr)
        .execute(&QueryRequest::from_sources(["SELECT 1"]))
        .await
        .expect_err("closed port must fail");

    assert!(matches!(error, QueryBackendError::Transport(_)));
}
