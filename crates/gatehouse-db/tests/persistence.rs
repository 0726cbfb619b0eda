//! End-to-end persistence through the file-backed providers.
//!
//! Each test builds a driver from a `StoreConfig`, writes settings, then
//! builds a second driver over the same data directory and reads them back.

use std::path::Path;

use gatehouse_core::{
    DriverConfig, EntryOptions, ExistenceStatus, GatewayDriver, ResetOptions, Schema,
    UpdateOptions,
};
use gatehouse_db::{ProviderConfig, ProviderFactory, StoreConfig, init_tracing};
use indexmap::IndexMap;
use serde_json::json;

fn store(data_dir: &Path, provider: &str) -> StoreConfig {
    let mut providers = IndexMap::new();
    providers.insert("json".to_string(), ProviderConfig::Json { base_dir: None });
    providers.insert("sqlite".to_string(), ProviderConfig::Sqlite { path: None });
    StoreConfig {
        data_dir: Some(data_dir.to_path_buf()),
        providers,
        driver: DriverConfig::default().with_default_provider(provider),
    }
}

fn schema(with_language: bool) -> Schema {
    let mut schema = Schema::new();
    schema
        .add("prefix", "string", EntryOptions::new().default_value("!"))
        .unwrap()
        .add("disabled", "string", EntryOptions::new().array())
        .unwrap()
        .add_folder("roles", |roles| {
            roles.add("admin", "string", EntryOptions::new())?;
            Ok(())
        })
        .unwrap();
    if with_language {
        schema
            .add("language", "string", EntryOptions::new().default_value("en-US"))
            .unwrap();
    }
    schema
}

async fn driver(config: &StoreConfig, with_language: bool) -> GatewayDriver {
    let mut driver = ProviderFactory::build_driver(config).await.unwrap();
    driver.register("guilds", schema(with_language)).unwrap();
    driver.init().await.unwrap();
    driver
}

async fn round_trip(provider: &str) {
    init_tracing();
    let temp = tempfile::tempdir().unwrap();
    let config = store(temp.path(), provider);

    {
        let driver = driver(&config, false).await;
        let guilds = driver.gateway("guilds").unwrap();
        let settings = guilds.sync("1", false).await.unwrap();
        assert_eq!(settings.status(), ExistenceStatus::NotExists);

        let result = settings
            .update(
                vec![
                    ("prefix", json!("?")),
                    ("roles.admin", json!("42")),
                    ("disabled", json!(["ping", "help"])),
                ],
                UpdateOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.updated.len(), 3);

        guilds
            .sync("2", false)
            .await
            .unwrap()
            .update(("prefix", "$"), UpdateOptions::new())
            .await
            .unwrap();
        driver.shutdown().await.unwrap();
    }

    let driver = driver(&config, false).await;
    let guilds = driver.gateway("guilds").unwrap();
    assert_eq!(guilds.sync_all().await.unwrap(), 2);

    let settings = guilds.get("1").unwrap();
    assert!(settings.exists());
    assert_eq!(
        settings.to_json(),
        json!({ "prefix": "?", "disabled": ["ping", "help"], "roles": { "admin": "42" } })
    );

    settings
        .reset(Some(&["prefix"][..]), ResetOptions::new())
        .await
        .unwrap();
    guilds.destroy("2").await.unwrap();

    let reloaded = driver.gateway("guilds").unwrap();
    let fresh = reloaded.sync("1", true).await.unwrap();
    assert_eq!(fresh.get("prefix"), Some(json!("!")));
    assert_eq!(reloaded.sync("2", false).await.unwrap().status(), ExistenceStatus::NotExists);
}

#[tokio::test]
async fn test_sqlite_round_trip() {
    round_trip("sqlite").await;
}

#[tokio::test]
async fn test_json_round_trip() {
    round_trip("json").await;
}

#[tokio::test]
async fn test_sqlite_schema_growth_adds_columns() {
    let temp = tempfile::tempdir().unwrap();
    let config = store(temp.path(), "sqlite");

    {
        let driver = driver(&config, false).await;
        driver
            .gateway("guilds")
            .unwrap()
            .sync("1", false)
            .await
            .unwrap()
            .update(("prefix", "?"), UpdateOptions::new())
            .await
            .unwrap();
        driver.shutdown().await.unwrap();
    }

    let driver = driver(&config, true).await;
    let guilds = driver.gateway("guilds").unwrap();
    let settings = guilds.sync("1", false).await.unwrap();
    assert_eq!(settings.get("prefix"), Some(json!("?")));
    assert_eq!(settings.get("language"), Some(json!("en-US")));

    settings
        .update(("language", "de-DE"), UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(
        guilds.sync("1", true).await.unwrap().get("language"),
        Some(json!("de-DE"))
    );
}

#[tokio::test]
async fn test_json_batch_tolerates_unstorable_id() {
    let temp = tempfile::tempdir().unwrap();
    let config = store(temp.path(), "json");
    let driver = driver(&config, false).await;
    let guilds = driver.gateway("guilds").unwrap();

    guilds
        .sync("1", false)
        .await
        .unwrap()
        .update(("prefix", "?"), UpdateOptions::new())
        .await
        .unwrap();
    let stored = guilds.get("1").unwrap();

    let (good, bad) = tokio::join!(stored.sync(true), guilds.sync("user:42", false));
    assert_eq!(good.unwrap().get("prefix"), Some(json!("?")));
    assert_eq!(bad.unwrap().status(), ExistenceStatus::NotExists);
}
