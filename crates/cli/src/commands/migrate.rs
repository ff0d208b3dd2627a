use crate::commands::{open_database, prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("migrate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_database("migrate", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };
        pool.close().await;

        tracing::info!(
            event_name = "cli.migrate.completed",
            database_url = %config.database.url,
            "applied pending migrations"
        );
        CommandResult::success("migrate", "applied pending migrations")
    })
}
