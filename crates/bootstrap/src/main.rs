//! Opens the configured access-control store, optionally seeds it, and prints
//! the user and role listings as JSON.

mod config;

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use gatehouse_auth::CallerContext;
use gatehouse_infra::{
    AccessQueries, AccessStore, InMemoryAccessStore, PostgresAccessStore, RoleListing,
    SeedReport, Seeder, UserListing,
};

use crate::config::BootstrapConfig;

#[derive(Serialize)]
struct Snapshot {
    seeded: Option<SeedReport>,
    users: Vec<UserListing>,
    roles: Vec<RoleListing>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BootstrapConfig::from_env().context("loading configuration")?;
    gatehouse_observability::init_with(&config.log_level);

    let snapshot = match &config.database_url {
        Some(url) => {
            let store = PostgresAccessStore::connect(url, config.database_max_connections)
                .await
                .context("connecting to postgres")?;
            store.install_schema().await.context("installing schema")?;
            tracing::info!("using postgres store");
            run(Arc::new(store), &config).await?
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            run(Arc::new(InMemoryAccessStore::new()), &config).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run<S>(store: S, config: &BootstrapConfig) -> anyhow::Result<Snapshot>
where
    S: AccessStore + Clone,
{
    let caller = CallerContext::system();
    tracing::info!(
        correlation_id = %caller.correlation_id(),
        role_policy = ?config.role_policy,
        "bootstrap starting"
    );

    let seeded = if config.seed {
        let mut rng = rand::thread_rng();
        let report = Seeder::new(store.clone())
            .with_demo_users(config.seed_users)
            .with_policy(config.role_policy)
            .run(&caller, &mut rng)
            .await
            .context("seeding demo data")?;
        Some(report)
    } else {
        None
    };

    let queries = AccessQueries::new(store);
    Ok(Snapshot {
        seeded,
        users: queries.list_users_with_roles().await?,
        roles: queries.list_roles_with_permissions().await?,
    })
}
