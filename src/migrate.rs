use anyhow::Result;

use crate::config::Config;
use crate::error::StoreError;
use crate::retry::{RetryPolicy, RetryingExecutor};
use crate::store::{SqlBackend, Store};

/// Create the `file_metadata` table if it does not exist yet.
pub async fn ensure_metadata_table<B: SqlBackend + ?Sized>(backend: &B) -> Result<(), StoreError> {
    backend
        .execute(
            r#"
            CREATE TABLE IF NOT EXISTS file_metadata (
                file_id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                project_name TEXT,
                project_id INTEGER,
                snapshot_date TEXT,
                file_category TEXT,
                bl_version TEXT
            )
            "#,
            &[],
        )
        .await?;
    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let store = Store::connect(&config.db).await?;

    let executor = RetryingExecutor::new(&store, RetryPolicy::from(&config.retry));
    ensure_metadata_table(&executor).await?;

    store.close().await;
    Ok(())
}
