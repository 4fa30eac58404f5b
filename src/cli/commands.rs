use crate::core::interfaces::{BuildService, FileSystemService};
use crate::core::models::{BuildConfig, Mode};
use crate::core::services::{emit, emit_error, TailpackBuildService};
use crate::infrastructure::{
    generate_client_code, DevServer, HmrBroadcaster, LightningCssProcessor, OutputCache,
    OxcJsProcessor, TokioFileSystemService,
};
use crate::utils::config_loader::{CliOverrides, ConfigLoader, LoadOptions};
use crate::utils::ui::BuildReport;
use crate::utils::watch::{DevLoop, FileWatcher};
use crate::utils::{Logger, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "tailpack")]
#[command(about = "Front-end build pipeline: utility-class CSS, vendor prefixing, hashed bundles and a proxying dev server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build hashed assets and the manifest
    Build {
        /// Project root
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        /// Base configuration file, relative to the root
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = Mode::Production)]
        mode: Mode,
        /// Output directory
        #[arg(short, long, env = "TAILPACK_OUTPUT_DIR")]
        outdir: Option<String>,
        /// URL prefix assets are served under
        #[arg(long, env = "TAILPACK_PUBLIC_PATH")]
        public_path: Option<String>,
    },
    /// Watch, rebuild in memory and proxy to the backend
    Dev {
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
        /// Backend origin non-asset requests are proxied to
        #[arg(short, long, env = "TAILPACK_BACKEND")]
        backend: Option<String>,
    },
    /// Print the composed configuration
    Inspect {
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = Mode::Development)]
        mode: Mode,
    },
}

/// How a command that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Stopped by Ctrl+C.
    Interrupted,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Completed => 0,
            // 128 + SIGINT, as shells report it
            Outcome::Interrupted => 130,
        }
    }
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<Outcome> {
        Logger::init();
        self.execute(Cli::parse()).await
    }

    pub async fn execute(&self, cli: Cli) -> Result<Outcome> {
        match cli.command {
            Commands::Build {
                root,
                config,
                mode,
                outdir,
                public_path,
            } => {
                let overrides = CliOverrides {
                    outdir,
                    public_path,
                    ..Default::default()
                };
                self.handle_build_command(root, config, mode, overrides)
                    .await
                    .map(|_| Outcome::Completed)
            }
            Commands::Dev {
                root,
                config,
                port,
                host,
                backend,
            } => {
                let overrides = CliOverrides {
                    backend,
                    host,
                    port,
                    ..Default::default()
                };
                self.handle_dev_command(root, config, overrides)
                    .await
                    .map(|_| Outcome::Interrupted)
            }
            Commands::Inspect { root, config, mode } => {
                self.handle_inspect_command(root, config, mode)
                    .map(|_| Outcome::Completed)
            }
        }
    }

    fn load_config(
        root: PathBuf,
        config_path: Option<PathBuf>,
        mode: Mode,
        overrides: CliOverrides,
    ) -> Result<BuildConfig> {
        ConfigLoader::load(&LoadOptions {
            root,
            config_path,
            mode,
            overrides,
        })
    }

    fn build_service(config: Arc<BuildConfig>) -> Result<TailpackBuildService> {
        let css_processor = LightningCssProcessor::from_config(&config)?;
        Ok(TailpackBuildService::new(
            config,
            Arc::new(TokioFileSystemService),
            Arc::new(OxcJsProcessor::new()),
            Arc::new(css_processor),
        ))
    }

    async fn handle_build_command(
        &self,
        root: PathBuf,
        config_path: Option<PathBuf>,
        mode: Mode,
        overrides: CliOverrides,
    ) -> Result<()> {
        let report = BuildReport::new();
        let config = Arc::new(Self::load_config(root, config_path, mode, overrides)?);
        report.banner("build", config.mode.as_str());
        Logger::build_start(
            config.mode.as_str(),
            &config.root.display().to_string(),
            &config.output.path.display().to_string(),
        );

        let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);
        let mut service = Self::build_service(Arc::clone(&config))?;

        let output = match service.build().await {
            Ok(output) => output,
            Err(err) => {
                report.failure(&err.format_detailed());
                if let Err(stats_err) = emit_error(&err, &config, fs_service.as_ref()).await {
                    Logger::warn(&format!("could not write stats file: {}", stats_err));
                }
                return Err(err);
            }
        };

        emit(&output, &config, fs_service.as_ref()).await?;
        report.summary(&output, &config);
        Ok(())
    }

    async fn handle_dev_command(
        &self,
        root: PathBuf,
        config_path: Option<PathBuf>,
        overrides: CliOverrides,
    ) -> Result<()> {
        let config = Arc::new(Self::load_config(
            root,
            config_path,
            Mode::Development,
            overrides,
        )?);
        BuildReport::new().banner("dev", config.mode.as_str());

        let cache = Arc::new(OutputCache::new());
        let hmr = HmrBroadcaster::new();
        let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);

        let mut service = Self::build_service(Arc::clone(&config))?;
        if config.dev_server.live_reload {
            service = service.with_client_script(generate_client_code(config.dev_server.overlay));
        }

        // Watch before the first build so no edit falls in between
        let (_watcher, events) = FileWatcher::start(&config)?;

        let mut dev_loop = DevLoop::new(
            service,
            Arc::clone(&config),
            Arc::clone(&cache),
            hmr.clone(),
            fs_service,
        );
        if dev_loop.initial_build().await.is_err() {
            Logger::warn("Initial build failed; waiting for changes");
        }

        let server = DevServer::new(&config, cache, hmr)?;
        let listener = server.bind().await?;

        tokio::spawn(async move {
            dev_loop.run(events).await;
        });

        // Serving only ends on Ctrl+C
        server.serve(listener, shutdown_signal()).await
    }

    fn handle_inspect_command(
        &self,
        root: PathBuf,
        config_path: Option<PathBuf>,
        mode: Mode,
    ) -> Result<()> {
        let config = Self::load_config(root, config_path, mode, CliOverrides::default())?;
        let json = serde_json::to_string_pretty(&config)
            .map_err(|e| crate::utils::TailpackError::build(e.to_string()))?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        Logger::warn(&format!("cannot listen for Ctrl+C: {}", e));
        std::future::pending::<()>().await;
    }
    Logger::info("👋 Stopping dev server");
}
