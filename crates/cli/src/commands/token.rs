use crate::commands::{token_failure, with_runtime, CommandResult, Failure};

pub fn run() -> CommandResult {
    with_runtime("token", |runtime| async move {
        let status = runtime.tokens.status().await.map_err(token_failure)?;
        let message = format!("token phase is {}", status.phase.as_str());
        Ok::<_, Failure>(CommandResult::success_with("token", message, status))
    })
}
