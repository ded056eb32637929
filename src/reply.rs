use tokio_util::sync::CancellationToken;

use crate::assistant_api::{RunRequest, RunStatus, ThreadApi};
use crate::error::{AduChatError, Result};
use crate::models::Turn;
use crate::polling::{PollOptions, poll_until};

/// Returned when a run finishes without producing any message
pub const NO_RESPONSE: &str = "No response received from the assistant.";

/// Run one thread/run/extract cycle against the hosted assistant.
///
/// A fresh thread is seeded with every turn of the transcript. Remote errors,
/// failed runs, timeouts and cancellation all propagate to the caller.
pub async fn generate_reply(
    api: &dyn ThreadApi,
    run: &RunRequest,
    turns: &[Turn],
    poll: PollOptions,
    cancel: &CancellationToken,
) -> Result<String> {
    let thread_id = api.create_thread(turns).await?;
    let started = api.create_run(&thread_id, run).await?;
    tracing::info!(
        thread_id = %thread_id,
        run_id = %started.id,
        turns = turns.len(),
        "Submitted generation run"
    );

    let finished = if started.status.is_terminal() {
        started
    } else {
        let run_id = started.id.clone();
        poll_until("generation run", poll, cancel, || {
            let thread_id = thread_id.clone();
            let run_id = run_id.clone();
            async move {
                let state = api.retrieve_run(&thread_id, &run_id).await?;
                Ok(state.status.is_terminal().then_some(state))
            }
        })
        .await?
    };

    match finished.status {
        RunStatus::Completed | RunStatus::Incomplete => {}
        status => {
            tracing::warn!(run_id = %finished.id, status = status.as_str(), "Run did not complete");
            return Err(AduChatError::RunFailed {
                status: status.as_str().to_string(),
                message: finished
                    .last_error
                    .unwrap_or_else(|| "no error details provided".to_string()),
            });
        }
    }

    let messages = api.list_run_messages(&thread_id, &finished.id).await?;
    match messages.into_iter().next() {
        Some(message) => {
            let text = message.text.ok_or(AduChatError::EmptyContent)?;
            Ok(text.trim().to_string())
        }
        None => {
            tracing::warn!(run_id = %finished.id, "Run produced no messages");
            Ok(NO_RESPONSE.to_string())
        }
    }
}
