//! `#[derive(FromState)]` against real rule captures.

use std::sync::Arc;

use async_trait::async_trait;
use cobalt::core::{ApiCaller, ApiResponse};
use cobalt::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

#[derive(FromState, Debug, PartialEq)]
struct Echo {
    #[state(key = "command")]
    command: String,
    #[state(key = "args")]
    text: String,
    #[state(default)]
    attempts: u32,
    #[state]
    note: Option<String>,
    skipped: Vec<i64>,
}

#[derive(Deserialize, Debug, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

#[derive(FromState)]
struct Shape {
    #[state]
    origin: Point,
}

struct Silent;

#[async_trait]
impl ApiCaller for Silent {
    async fn call(&self, _action: &str, _params: Value) -> ApiResult<ApiResponse> {
        Ok(ApiResponse::ok(0, json!({"message_id": 1})))
    }
}

#[test]
fn derive_reads_keys_and_defaults() {
    let state = State::new()
        .with("command", "echo")
        .with("args", "hello world")
        .with("note", "n");

    let echo: Echo = state.parse().unwrap();
    assert_eq!(
        echo,
        Echo {
            command: "echo".into(),
            text: "hello world".into(),
            attempts: 0,
            note: Some("n".into()),
            skipped: Vec::new(),
        }
    );
}

#[test]
fn missing_and_mistyped_keys_are_reported() {
    let missing = State::new().with("command", "echo").parse::<Echo>();
    assert!(matches!(missing, Err(StateError::Missing { ref key }) if key == "args"));

    let mistyped = State::new()
        .with("command", "echo")
        .with("args", "x")
        .with("attempts", "three")
        .parse::<Echo>();
    assert!(matches!(mistyped, Err(StateError::Mismatch { ref key, .. }) if key == "attempts"));
}

#[test]
fn nested_values_deserialize() {
    let state = State::new().with("origin", json!({"x": 1, "y": -2}));
    let shape: Shape = state.parse().unwrap();
    assert_eq!(shape.origin, Point { x: 1, y: -2 });
}

#[tokio::test]
async fn handler_sees_command_captures() {
    let engine = Engine::default();
    let (tx, mut rx) = mpsc::unbounded_channel();

    engine
        .on_command("echo")
        .state(State::new().with("attempts", 2))
        .handle(move |ctx: MatcherContext| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(ctx.parse::<Echo>());
            }
        });

    let bot = Bot::new(Arc::new(Silent));
    let event = Arc::new(Event::message("private", 1, 0, "/echo  hi there"));
    let report = engine.dispatcher().dispatch(event, bot).await.unwrap();
    assert_eq!(report.matched, 1);

    let echo = rx.recv().await.unwrap().unwrap();
    assert_eq!(echo.command, "echo");
    assert_eq!(echo.text, "hi there");
    assert_eq!(echo.attempts, 2);
}
