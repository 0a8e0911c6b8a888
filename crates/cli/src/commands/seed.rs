use assetflow_db::{SeedDataset, SqlDocumentStore};

use crate::commands::{open_store, prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare() {
        Ok(prepared) => prepared,
        Err(failure) => return CommandResult::from_failure("seed", failure),
    };

    let result = runtime.block_on(async {
        let pool = open_store(&config).await?;
        let store = SqlDocumentStore::new(pool.clone());
        let seeded = SeedDataset::load(&store, &config.store.collection)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(seeded)
    });

    match result {
        Ok(seeded) => {
            let message = format!(
                "seeded {} demo requests into `{}`",
                seeded.inserted, seeded.collection
            );
            CommandResult::success_with_data("seed", message, serde_json::to_value(&seeded).ok())
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}
