//! Parallel fan-out of heuristic tools over one loaded document.
//!
//! Every requested tool runs on tokio's blocking pool against the same
//! `Arc<Document>`. Results are collected with `join_all`, so one tool's
//! failure, panic or timeout never affects its siblings.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use doctriage_core::{AnalysisContext, Document, HintsAggregate, ToolName, ToolRequest, ToolResult};
use futures::future::join_all;
use serde_json::Value;

/// Run the requested tools and collect one result per distinct tool.
pub async fn run(
    document: Arc<Document>,
    requests: Vec<ToolRequest>,
    ctx: Arc<AnalysisContext>,
) -> HintsAggregate {
    run_with(document, requests, ctx, |tool, document, args, ctx| {
        tool.analyze(document, args, ctx)
    })
    .await
}

/// [`run`] with a custom tool runner.
pub async fn run_with<F>(
    document: Arc<Document>,
    requests: Vec<ToolRequest>,
    ctx: Arc<AnalysisContext>,
    runner: F,
) -> HintsAggregate
where
    F: Fn(ToolName, &Document, &Value, &AnalysisContext) -> ToolResult + Send + Sync + 'static,
{
    let requests = dedup(requests);
    let timeout = ctx.config.dispatcher.timeout_ms.map(Duration::from_millis);
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    let runner = Arc::new(runner);

    log::debug!(
        "Dispatching {} tool(s) on {}",
        requests.len(),
        document.source()
    );

    let tasks = requests.into_iter().map(|request| {
        let document = Arc::clone(&document);
        let ctx = Arc::clone(&ctx);
        let runner = Arc::clone(&runner);
        let started = Instant::now();

        async move {
            let tool = request.tool;
            let handle = tokio::task::spawn_blocking(move || {
                runner(request.tool, &document, &request.args, &ctx)
            });

            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        let ms = timeout.map_or(0, |t| t.as_millis() as u64);
                        log::warn!("{tool} timed out after {ms} ms");
                        return (tool, failure(format!("timed out after {ms} ms"), started));
                    }
                },
                None => handle.await,
            };

            let result = match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    let message = panic_message(err.into_panic());
                    log::warn!("{tool} panicked: {message}");
                    failure(format!("tool panicked: {message}"), started)
                }
                Err(err) => failure(format!("tool was cancelled: {err}"), started),
            };
            (tool, result)
        }
    });

    join_all(tasks).await.into_iter().collect()
}

/// Keep the first request for each tool.
fn dedup(requests: Vec<ToolRequest>) -> Vec<ToolRequest> {
    let mut seen = BTreeSet::new();
    requests
        .into_iter()
        .filter(|request| seen.insert(request.tool))
        .collect()
}

fn failure(message: String, started: Instant) -> ToolResult {
    ToolResult::failure(message, started.elapsed().as_millis() as u64)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
