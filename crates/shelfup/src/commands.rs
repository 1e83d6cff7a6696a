use std::cmp::Ordering;
use std::path::Path;
use std::process::ExitCode;

use log::info;
use shelfup_core::{
    AvailableUpdate, InstallResult, LocalVersionSource, ManifestOrigin, NotificationSink,
    Orchestrator, RunOutcome, UpdateContext, UpdateDecision, Version, install, version,
};
use shelfup_platform::AppPaths;

use crate::cli::{CacheAction, Commands, SettingsAction, VersionAction};
use crate::console::{CommandHooks, ConsoleSink};
use crate::error::AppError;
use crate::settings::AppSettings;

pub async fn dispatch(
    command: Commands,
    settings: &AppSettings,
    settings_path: &Path,
    paths: &AppPaths,
) -> Result<ExitCode, AppError> {
    match command {
        Commands::Version { action } => Ok(version_command(&action)),
        Commands::Settings { action } => settings_command(settings, settings_path, &action),
        Commands::Cache { action } => {
            let context = update_context(settings, paths)?;
            cache_command(&context, &action)
        }
        Commands::Status => {
            let context = update_context(settings, paths)?;
            status(&context)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => check(update_context(settings, paths)?).await,
        Commands::Update { yes } => {
            let mut orchestrator = Orchestrator::new(update_context(settings, paths)?);
            let sink = ConsoleSink::new(yes);
            let mut hooks = CommandHooks::new(settings.rebuild_command.clone());
            Ok(match orchestrator.run(&sink, &mut hooks).await {
                RunOutcome::Failed(_) => ExitCode::FAILURE,
                RunOutcome::UpToDate(_) | RunOutcome::Declined(_) | RunOutcome::Installed(_) => {
                    ExitCode::SUCCESS
                }
            })
        }
        Commands::Install {
            url,
            version,
            sha256,
        } => {
            let context = update_context(settings, paths)?;
            let hooks = CommandHooks::new(settings.rebuild_command.clone());
            install_archive(&context, url, &version, sha256, hooks).await
        }
    }
}

fn update_context(settings: &AppSettings, paths: &AppPaths) -> Result<UpdateContext, AppError> {
    let client = shelfup_core::build_client()?;
    Ok(settings.update_context(paths, client))
}

async fn check(context: UpdateContext) -> Result<ExitCode, AppError> {
    let mut orchestrator = Orchestrator::new(context);
    let decision = orchestrator.check_for_updates().await?;

    if let Some(fetched) = orchestrator.last_manifest()
        && let ManifestOrigin::Cache { cached_at } = &fetched.origin
    {
        println!(
            "Manifest server unreachable; using cached copy from {}",
            cached_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    match decision {
        UpdateDecision::UpToDate { current } => {
            println!("You have the latest version: {current}");
        }
        UpdateDecision::UpdateAvailable(update) => {
            println!(
                "Update available: {} -> {}",
                update.current_version, update.latest_version
            );
            if let Some(description) = &update.description {
                println!("{description}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn install_archive(
    context: &UpdateContext,
    url: String,
    version: &str,
    sha256: Option<String>,
    mut hooks: CommandHooks,
) -> Result<ExitCode, AppError> {
    let latest_version: Version = version.parse()?;
    let current_version = context
        .local_version(None)?
        .map_or_else(|| Version::new(0, 0, 0), |local| local.version);

    info!("Installing {latest_version} from {url}");
    let update = AvailableUpdate {
        current_version,
        latest_version,
        download_url: url,
        description: None,
        sha256,
    };

    let sink = ConsoleSink::new(true);
    match install(context, &update, &mut hooks).await {
        InstallResult::Installed(installed) => {
            sink.show(&format!(
                "Installed {} into {}",
                installed.version,
                installed.package_dir.display()
            ));
            if let Some(warning) = &installed.rebuild_warning {
                sink.show_error(&format!("Rebuild failed: {warning}"));
            }
            Ok(ExitCode::SUCCESS)
        }
        InstallResult::Failed(error) => {
            sink.show_error(&format!("Install failed: {error}"));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn status(context: &UpdateContext) -> Result<(), AppError> {
    let info = context.cache.info();
    let cached = if info.exists {
        Some(context.cache.load()?)
    } else {
        None
    };

    let expected_tool = cached.as_ref().map(|c| c.manifest.tool_name.as_str());
    match context.local_version(expected_tool)? {
        Some(local) => {
            let source = match &local.source {
                LocalVersionSource::Record => match context.record.load()? {
                    Some(record) => format!(
                        "installed {}",
                        record.installed_at.format("%Y-%m-%d %H:%M UTC")
                    ),
                    None => "installed-version record".to_string(),
                },
                LocalVersionSource::BundledManifest(path) => {
                    format!("from {}", path.display())
                }
            };
            println!("Installed version: {} ({source})", local.version);
        }
        None => println!("Installed version: none"),
    }
    println!("Package directory: {}", context.package_dir().display());

    match info.size_bytes {
        Some(size) if info.exists => {
            println!("Manifest cache: {} ({size} bytes)", info.path.display());
        }
        _ => println!("Manifest cache: {} (empty)", info.path.display()),
    }

    if let Some(cached) = &cached {
        let tool = cached.manifest.tool_info();
        let latest = cached
            .manifest
            .latest_release()
            .map_or(tool.version, |(version, _)| version.to_string());
        println!(
            "Latest known release: {} {latest} (cached {})",
            tool.tool_name,
            cached.cached_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(())
}

fn cache_command(context: &UpdateContext, action: &CacheAction) -> Result<ExitCode, AppError> {
    match action {
        CacheAction::Info => {
            let info = context.cache.info();
            println!("Path: {}", info.path.display());
            println!("Exists: {}", info.exists);
            if let Some(size) = info.size_bytes {
                println!("Size: {size} bytes");
            }
        }
        CacheAction::Clear => {
            if context.cache.clear()? {
                println!("Cleared {}", context.cache.path().display());
            } else {
                println!("Cache was already empty");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn settings_command(
    settings: &AppSettings,
    settings_path: &Path,
    action: &SettingsAction,
) -> Result<ExitCode, AppError> {
    let write_error = |source: std::io::Error| AppError::SettingsWrite {
        path: settings_path.to_path_buf(),
        source,
    };
    match action {
        SettingsAction::Show => {
            let json = settings
                .to_json()
                .map_err(|error| write_error(error.into()))?;
            println!("{json}");
        }
        SettingsAction::Init { force } => {
            if settings_path.exists() && !force {
                return Err(AppError::SettingsExist(settings_path.to_path_buf()));
            }
            settings.save(settings_path).map_err(write_error)?;
            println!("Wrote {}", settings_path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn version_command(action: &VersionAction) -> ExitCode {
    match action {
        VersionAction::Validate { version } => match version::parse(version) {
            Ok(parsed) => {
                println!("{parsed}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("{error}");
                ExitCode::FAILURE
            }
        },
        VersionAction::Compare { a, b } => match version::compare(a, b) {
            Ok(ordering) => {
                println!("{}", ordering_code(ordering));
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("{error}");
                ExitCode::FAILURE
            }
        },
    }
}

fn ordering_code(ordering: Ordering) -> i8 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}
