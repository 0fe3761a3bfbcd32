//! Per-kind validation and execution
//!
//! `process` drives a request through validate and execute. Errors are not
//! swallowed here; they propagate to the engine, which owns the single
//! mapping to a terminal state. Cancellation is polled at every state
//! transition and suspension point, and the pause gate is observed between
//! test steps.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::browser_pool::BrowserDriver;
use crate::engine::Engine;
use crate::error::{RequestError, RequestResult};
use crate::request::kind::RequestKind;
use crate::request::{Request, RequestState};
use crate::runtime::Outcome;

/// Step-file extensions the ingest adapters know how to parse.
const SUPPORTED_PLAN_EXTENSIONS: [&str; 2] = ["csv", "xlsx"];

/// Validate then execute, returning the result payload.
pub(crate) async fn process<D: BrowserDriver>(
    request: &Arc<Request>,
    engine: &Arc<Engine<D>>,
) -> RequestResult<serde_json::Value> {
    request.check_cancellation().await?;
    request
        .set_status(RequestState::Validating, "validating request", None)
        .await;
    validate(request).await?;
    request.check_cancellation().await?;
    execute(request, engine).await
}

/// Structural checks on the submitted model. No I/O happens here; anything
/// that touches disk or browser belongs to execution.
async fn validate(request: &Arc<Request>) -> RequestResult<()> {
    match request.kind() {
        RequestKind::ValidateFile { path } => {
            if path.as_os_str().is_empty() {
                return Err(RequestError::Validation("file path is empty".into()));
            }
            plan_extension(path)?;
            Ok(())
        }
        RequestKind::RunTests { plan, key } => {
            if plan.steps.is_empty() {
                return Err(RequestError::Validation(format!(
                    "test plan '{}' has no steps",
                    plan.name
                )));
            }
            if key.version.is_empty() {
                return Err(RequestError::Validation("browser version is empty".into()));
            }
            Ok(())
        }
        RequestKind::GetSecret { account } | RequestKind::ResetPassword { account } => {
            if account.is_empty() {
                return Err(RequestError::Validation("account name is empty".into()));
            }
            Ok(())
        }
        RequestKind::RetrieveAccounts => Ok(()),
        RequestKind::CancelRequest { target } => {
            if *target == request.id() {
                return Err(RequestError::Validation(
                    "a request cannot cancel itself".into(),
                ));
            }
            Ok(())
        }
    }
}

async fn execute<D: BrowserDriver>(
    request: &Arc<Request>,
    engine: &Arc<Engine<D>>,
) -> RequestResult<serde_json::Value> {
    match request.kind().clone() {
        RequestKind::ValidateFile { path } => {
            request
                .set_status(RequestState::Processing, "validating step file", None)
                .await;
            validate_file(request, engine, &path).await
        }
        RequestKind::RunTests { plan, key } => {
            request
                .set_status(
                    RequestState::Queued,
                    format!("waiting for browser {key}"),
                    None,
                )
                .await;
            let browser = engine.pool().acquire(request, &key).await?;
            request.check_cancellation().await?;

            request
                .set_status(
                    RequestState::Processing,
                    format!("executing test plan '{}'", plan.name),
                    None,
                )
                .await;
            let mut session = engine.pool().create_session(request, &browser).await?;

            let mut steps = Vec::with_capacity(plan.steps.len());
            for (index, step) in plan.steps.iter().enumerate() {
                request.check_cancellation().await?;
                request
                    .pause_gate()
                    .wait_if_paused(request.log(), request.cancel_token())
                    .await?;

                request
                    .log()
                    .info(format!("step {}/{}: {}", index + 1, plan.steps.len(), step.name))
                    .await;
                let outcome = engine
                    .pool()
                    .driver()
                    .run_step(session.session_mut(), step)
                    .await
                    .map_err(|e| {
                        RequestError::Execution(format!("step '{}' failed: {e:#}", step.name))
                    })?;
                steps.push(json!({ "name": step.name, "outcome": outcome }));
            }

            session.close().await;
            Ok(json!({ "plan": plan.name, "steps": steps }))
        }
        RequestKind::GetSecret { account } => {
            request
                .set_status(RequestState::Processing, "retrieving credential", None)
                .await;
            let record = engine
                .accounts()
                .get_secret(&account, request.cancel_token())
                .await?;
            Ok(json!({
                "account": record.name,
                "username": record.username,
                "secret": record.secret,
            }))
        }
        RequestKind::ResetPassword { account } => {
            request
                .set_status(RequestState::Processing, "resetting password", None)
                .await;
            let secret = engine
                .accounts()
                .reset_password(&account, request.cancel_token())
                .await?;
            Ok(json!({ "account": account, "secret": secret }))
        }
        RequestKind::RetrieveAccounts => {
            request
                .set_status(RequestState::Processing, "listing accounts", None)
                .await;
            let summaries = engine.accounts().list(request.cancel_token()).await?;
            Ok(json!({ "accounts": summaries }))
        }
        RequestKind::CancelRequest { target } => {
            request
                .set_status(RequestState::Processing, "cancelling target request", None)
                .await;
            cancel_target(request, engine, target).await
        }
    }
}

/// I/O-throttled structural checks on a step file.
async fn validate_file<D: BrowserDriver>(
    request: &Arc<Request>,
    engine: &Arc<Engine<D>>,
    path: &Path,
) -> RequestResult<serde_json::Value> {
    let _permit = engine.io().acquire(request.cancel_token()).await?;
    request.check_cancellation().await?;

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| RequestError::Validation(format!("cannot read {}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(RequestError::Validation(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(RequestError::Validation(format!(
            "{} is empty",
            path.display()
        )));
    }

    let extension = plan_extension(path)?;
    let rows = if extension == "csv" {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            RequestError::Validation(format!("cannot read {}: {e}", path.display()))
        })?;
        Some(contents.lines().filter(|line| !line.trim().is_empty()).count())
    } else {
        None
    };

    request.log().info("step file passed structural checks").await;
    Ok(json!({
        "path": path.display().to_string(),
        "size_bytes": metadata.len(),
        "rows": rows,
    }))
}

/// Cross-request cancellation: flag the target, then await its completion.
///
/// The race against the target's natural completion is inherent to
/// cooperative cancellation and is surfaced, not hidden: if the target
/// resolves with success or failure before the cancellation is observed,
/// this request fails with a distinct message.
async fn cancel_target<D: BrowserDriver>(
    request: &Arc<Request>,
    engine: &Arc<Engine<D>>,
    target: crate::request::RequestId,
) -> RequestResult<serde_json::Value> {
    let Some(target_request) = engine.registry().get(target) else {
        return Err(RequestError::Validation(format!(
            "request {target} not found"
        )));
    };
    if target_request.cancel_token().is_none() {
        return Err(RequestError::Validation(format!(
            "request {target} is not cancellable"
        )));
    }

    target_request.cancel();
    request
        .log()
        .info(format!("cancellation signalled to {target}"))
        .await;

    match target_request.completion().wait().await {
        Outcome::Cancelled(_) => Ok(json!({ "target": target, "cancelled": true })),
        Outcome::Value(_) => Err(RequestError::Execution(format!(
            "request {target} completed before cancellation was observed"
        ))),
        Outcome::Error(e) => Err(RequestError::Execution(format!(
            "request {target} failed before cancellation was observed: {e}"
        ))),
    }
}

fn plan_extension(path: &Path) -> RequestResult<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if SUPPORTED_PLAN_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(RequestError::Validation(format!(
            "unsupported step file type '{}' (expected one of {:?})",
            extension, SUPPORTED_PLAN_EXTENSIONS
        )))
    }
}
