use crate::commands::{block_on, load_config, open_pool, CommandResult, Failure};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        block_on(async move {
            let pool = open_pool(&config).await?;
            pool.close().await;
            Ok::<(), Failure>(())
        })
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
