use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vm_installer::catalog::{self, Catalog, ImageDescriptor, InstallSpec};
use vm_installer::helpers::{
    choose_one, default_browser, default_download_path, default_hypervisor, default_platform,
    download_paths,
};
use vm_installer::pipeline::{BarProgress, Pipeline};
use vm_installer::settings::{self, SETTINGS_PATH_ENV, Settings, SettingsError};

fn construct_settings_file_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources").join("settings.json")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().without_time().with_target(false))
        .init();
}

fn init_settings() -> Result<()> {
    match settings::init_from_env(SETTINGS_PATH_ENV) {
        Ok(_) => Ok(()),
        Err(SettingsError::MissingEnv(_)) => {
            settings::init_from_file(construct_settings_file_path())?; // stays sync
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// A tiny wrapper to render the final selection cleanly
fn print_selection(spec: &InstallSpec, image: &ImageDescriptor, download_dir: &std::path::Path) {
    println!("\n=== Selection ===");
    println!("Platform:   {}", spec.platform());
    println!("Hypervisor: {}", spec.hypervisor());
    println!("Browser:    {}", spec.browser_os());
    println!("Image:");
    println!("  url:      {}", image.file_url());
    println!("  checksum: {}", image.checksum_source_url());
    println!("  into:     {}", download_dir.display());
}

/// platform -> hypervisor -> browser -> download directory
fn prompt_and_select(catalog: &Catalog) -> Result<(InstallSpec, PathBuf)> {
    let platforms = catalog.platforms();
    let default = default_platform(&platforms, std::env::consts::OS);
    let platform = choose_one("Select Platform", platforms, default)?;

    let hypervisors = catalog.hypervisors(&platform);
    let default = default_hypervisor(&hypervisors);
    let hypervisor = choose_one("Select Hypervisor", hypervisors, default)?;

    let browsers = catalog.browsers(&hypervisor);
    let default = default_browser(&browsers);
    let browser = choose_one("Select Browser", browsers, default)?;

    let paths = download_paths();
    let default = default_download_path(&paths);
    let shown: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    let download_dir = choose_one("Select Download Path", shown, default)?;

    Ok((InstallSpec::new(platform, hypervisor, browser), PathBuf::from(download_dir)))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    init_settings()?;
    let settings: &Settings = settings::get()?;

    let client = reqwest::Client::new();
    let page = catalog::fetch_catalog_page(&client, settings.catalog_url(), settings.user_agent()).await?;
    let catalog = Catalog::from_json(catalog::extract_catalog_json(&page)?, settings.skip_hypervisors())
        .context("parsing VM catalog")?;

    let (spec, download_dir) = prompt_and_select(&catalog)?;
    let image = catalog
        .resolve(&spec)
        .ok_or_else(|| anyhow!("no image published for {spec}"))?;

    print_selection(&spec, image, &download_dir);

    let label = image.file_name().unwrap_or_else(|| image.file_url().to_string());
    let report = match Pipeline::new(settings)
        .run(&spec, image, &download_dir, &mut BarProgress::new(label))
        .await
    {
        Ok(report) => report,
        Err(failure) => {
            eprintln!("{failure}");
            std::process::exit(1);
        }
    };

    println!("\nImported into {}: {}", report.backend, report.vm_path.display());
    for step in &report.manual_steps {
        println!("  - {step}");
    }

    Ok(())
}
