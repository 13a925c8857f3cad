use clap::{Parser, Subcommand};
use std::sync::Arc;

use plugin_host::application::PluginRuntime;
use plugin_host::domain::traits::{Bot, Store};
use plugin_host::infrastructure::adapters::ConsoleAdapter;
use plugin_host::infrastructure::config::Config;
use plugin_host::infrastructure::storage::{JsonStore, MemoryStore};
use plugin_host::plugins::builtin_loader;

#[derive(Parser)]
#[command(name = "plugin-host")]
#[command(about = "Plugin runtime with hot reload and permission-gated commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime with the console adapter
    Run,
    /// Boot the runtime, print the plugin table and exit
    List,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => with_runtime(&cli.config, |runtime| async move {
            let console = ConsoleAdapter::new(runtime.clone());
            if let Err(e) = console.start().await {
                tracing::error!("Console adapter stopped: {}", e);
            }
            runtime.shutdown().await;
        }),
        Commands::List => with_runtime(&cli.config, |runtime| async move {
            for p in runtime.list_plugins() {
                let deps = if p.dependencies.is_empty() {
                    String::new()
                } else {
                    format!(" (depends on {})", p.dependencies.join(", "))
                };
                println!("{:<12} v{:<8} {:<10}{}", p.name, p.version, p.state.to_string(), deps);
            }
            runtime.shutdown().await;
        }),
        Commands::Version => {
            println!("plugin-host v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => init_config(),
    }
}

fn load_config(path: &str) -> Config {
    let mut config = if std::path::Path::new(path).exists() {
        Config::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        Config::default()
    };
    config.apply_env();
    config
}

/// Build a current-thread runtime, start the plugins and run `body`
fn with_runtime<F, Fut>(config_path: &str, body: F)
where
    F: FnOnce(Arc<PluginRuntime>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let config = load_config(config_path);
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    rt.block_on(async move {
        let store: Arc<dyn Store> = match JsonStore::open(&config.runtime.state_path).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!("State store unavailable ({}), flags will not persist", e);
                Arc::new(MemoryStore::new())
            }
        };
        tracing::info!("Starting {}", config.runtime.name);
        let runtime = Arc::new(PluginRuntime::new(config, builtin_loader(), store));
        let report = runtime.start().await;
        for error in &report.load.errors {
            tracing::warn!("{}", error);
        }
        body(runtime).await;
    });
}

fn init_config() {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => eprintln!("Failed to render config: {}", e),
    }
}
