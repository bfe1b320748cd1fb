use clap::{Parser, Subcommand};
use miette::Result;
use migration::{Migrator, MigratorTrait};
use policy_store::{
    storage, Policy, PolicyManager, Request, Settings, SqlPolicyManager, StoreError,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "policy-store",
    version,
    about = "Manage stored access-control policies"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Drop all policy tables
    Drop,
    /// Drop all policy tables and recreate them
    Reset,
    /// Create or replace the policy described by a JSON file
    Put { file: String },
    /// Print one policy
    Get { id: String },
    /// Print a page of policies ordered by id
    List {
        #[arg(long, default_value_t = 100)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Delete a policy
    Delete { id: String },
    /// Print the policies that may apply to a request
    Candidates {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        resource: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let db = storage::connect(&settings).await?;
    let manager = SqlPolicyManager::new(db, &settings)?;

    match cli.command {
        Command::Migrate => manager.initialize().await?,
        Command::Drop => {
            Migrator::down(manager.connection(), None)
                .await
                .map_err(StoreError::from)?;
            tracing::info!("Policy schema dropped");
        }
        Command::Reset => {
            Migrator::reset(manager.connection())
                .await
                .map_err(StoreError::from)?;
            manager.initialize().await?;
            tracing::info!("Policy schema recreated");
        }
        Command::Put { file } => {
            let raw = std::fs::read_to_string(&file).map_err(StoreError::from)?;
            let policy: Policy = serde_json::from_str(&raw).map_err(StoreError::from)?;
            manager.update(&policy).await?;
            tracing::info!(policy_id = %policy.id, "Stored policy");
        }
        Command::Get { id } => print_json(&manager.get(&id).await?)?,
        Command::List { limit, offset } => print_json(&manager.get_all(limit, offset).await?)?,
        Command::Delete { id } => manager.delete(&id).await?,
        Command::Candidates {
            subject,
            action,
            resource,
        } => {
            let request = Request::new(subject, action, resource);
            print_json(&manager.find_request_candidates(&request).await?)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_subcommands_parse() {
        let cli = Cli::try_parse_from(["policy-store", "drop"]).unwrap();
        assert!(matches!(cli.command, Command::Drop));
        assert_eq!(cli.config, "config.toml");

        let cli = Cli::try_parse_from(["policy-store", "-c", "prod.toml", "reset"]).unwrap();
        assert!(matches!(cli.command, Command::Reset));
        assert_eq!(cli.config, "prod.toml");
    }

    #[test]
    fn test_candidates_requires_every_field() {
        assert!(Cli::try_parse_from(["policy-store", "candidates", "--subject", "alice"]).is_err());

        let cli = Cli::try_parse_from([
            "policy-store",
            "candidates",
            "--subject",
            "alice",
            "--action",
            "read",
            "--resource",
            "doc:1",
        ])
        .unwrap();
        match cli.command {
            Command::Candidates {
                subject,
                action,
                resource,
            } => {
                assert_eq!(subject, "alice");
                assert_eq!(action, "read");
                assert_eq!(resource, "doc:1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
