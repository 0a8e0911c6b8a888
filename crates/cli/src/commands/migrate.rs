use assetflow_db::migrations;

use crate::commands::{open_store, prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare() {
        Ok(prepared) => prepared,
        Err(failure) => return CommandResult::from_failure("migrate", failure),
    };

    let result = runtime.block_on(async {
        let pool = open_store(&config).await?;
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<i64, (&'static str, String, u8)>(applied)
    });

    match result {
        Ok(applied) => CommandResult::success(
            "migrate",
            format!("applied pending migrations ({applied} recorded)"),
        ),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
