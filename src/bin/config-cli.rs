use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use config_store::config::loader::load_config;
use config_store::config::Environment;
use config_store::security::{ConfigFilter, PermissionCatalog, RolePermissions, Session};
use config_store::{ConfigStore, StoreOptions};

#[derive(Parser)]
#[command(name = "config-cli")]
#[command(about = "Inspect and change a configuration store", long_about = None)]
struct Cli {
    /// Store DSN: a file path, sqlite://<path> or sqlite::memory:
    #[arg(short, long, env = "CONFIG_DSN", default_value = "config.json")]
    config: String,

    /// Roles to act as, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "system_admin")]
    roles: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fields the roles may read, with secrets masked
    Show,
    /// Apply a JSON patch file, e.g. {"log_settings": {"console_level": "DEBUG"}}
    Set { patch: PathBuf },
    /// Check a config file without touching any store
    Validate { file: PathBuf },
    /// List settings currently overridden by environment variables
    Overrides,
    /// List known permissions
    Permissions,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let catalog = PermissionCatalog::new();
    let roles = RolePermissions::with_builtin_roles(&catalog);
    let filter = ConfigFilter::new(&catalog, &roles);
    let session = Session {
        user_id: "cli".to_string(),
        roles: cli.roles.clone(),
    };

    match cli.command {
        Commands::Show => {
            if !filter.can_read_any(&session) {
                return Err(format!("roles {:?} may not read the configuration", cli.roles).into());
            }
            let store = open(&cli.config, true)?;
            print_json(&filter.read_projection(&store.snapshot(), &session)?)?;
        }
        Commands::Set { patch } => {
            if !filter.can_write_any(&session) {
                return Err(format!("roles {:?} may not change the configuration", cli.roles).into());
            }
            let patch: Value = serde_json::from_slice(&std::fs::read(&patch)?)?;
            let store = open(&cli.config, false)?;
            let base = store.snapshot();
            let candidate = filter.apply_patch(&base, &patch, &session)?;
            let saved = store.set(candidate)?;
            print_json(&filter.read_projection(&saved, &session)?)?;
        }
        Commands::Validate { file } => match load_config(&file) {
            Ok(_) => println!("{} is valid", file.display()),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Overrides => {
            let store = open(&cli.config, true)?;
            for path in store.environment_overrides() {
                println!("{}", path);
            }
        }
        Commands::Permissions => {
            for permission in catalog.iter() {
                println!("{:<45} {}", permission.id, permission.scope);
            }
        }
    }

    Ok(())
}

fn open(dsn: &str, read_only: bool) -> Result<ConfigStore, Box<dyn std::error::Error>> {
    let options = StoreOptions {
        watch: false,
        read_only,
        environment: Environment::from_process(),
        ..StoreOptions::default()
    };
    Ok(ConfigStore::open(dsn, options)?)
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
