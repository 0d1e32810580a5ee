use secrecy::SecretString;
use serde::Serialize;

use crate::commands::{token_failure, with_runtime, CommandResult, Failure};

#[derive(Debug, Serialize)]
struct Authorized {
    expires_at: Option<i64>,
}

/// Exchanges the stored (or freshly supplied) authorization code for tokens.
pub fn run(code: Option<String>) -> CommandResult {
    let code = code.map(|code| code.trim().to_string()).filter(|code| !code.is_empty());
    with_runtime("authorize", |runtime| async move {
        let state = runtime
            .tokens
            .authorize(code.map(SecretString::from))
            .await
            .map_err(token_failure)?;

        Ok::<_, Failure>(CommandResult::success_with(
            "authorize",
            "authorization code exchanged for an access token",
            Authorized { expires_at: state.expires_at },
        ))
    })
}
