use anyhow::{Result, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::browser::{BrowserSigner, RemoteSigner, Signer};
use crate::cli::config::{HarvesterConfig, SignerMode, COOKIE_ENV};
use crate::cli::ConfigSource;
use crate::client::XhsClient;
use crate::crawler::controller::{discover_categories, plan_category};
use crate::crawler::extract::{dedupe_first_wins, report_invalid, Extraction};
use crate::crawler::CrawlerController;
use crate::storage::manifest::{list_link_lists, list_manifests, read_link_list, read_manifest, write_manifest};
use crate::storage::FsRecordStore;

/// Command line values that take precedence over the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct CrawlOverrides {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub retries: Option<u32>,
    pub min_delay: Option<f64>,
    pub max_delay: Option<f64>,
    pub headed: bool,
}

impl CrawlOverrides {
    pub fn apply(self, mut config: HarvesterConfig) -> HarvesterConfig {
        if let Some(input) = self.input {
            config.crawler.input_root = input;
        }
        if let Some(output) = self.output {
            config.crawler.output_root = output;
        }
        if let Some(retries) = self.retries {
            config.crawler.retry_count = retries;
        }
        if let Some(min) = self.min_delay {
            config.crawler.pacing.min_secs = min;
        }
        if let Some(max) = self.max_delay {
            config.crawler.pacing.max_secs = max;
        }
        if self.headed {
            config.browser.headless = false;
        }
        config
    }
}

/// Resolve the configuration: explicit file, then profile, then default
pub fn load_config(source: &ConfigSource) -> Result<HarvesterConfig> {
    if let Some(path) = &source.config {
        HarvesterConfig::load_path(path)
    } else if let Some(profile) = &source.profile {
        HarvesterConfig::load_profile(profile)
            .context(format!("Failed to load profile: {}", profile))
    } else {
        HarvesterConfig::load_default()
    }
}

async fn build_signer(config: &HarvesterConfig) -> Result<Arc<dyn Signer>> {
    let signer: Arc<dyn Signer> = match config.signer.mode {
        SignerMode::Browser => {
            info!("Signing through browser at {}", config.browser.webdriver_url);
            Arc::new(BrowserSigner::new(config.browser.clone()).await?)
        }
        SignerMode::Remote => {
            info!("Signing through service at {}", config.signer.service_url);
            Arc::new(RemoteSigner::new(&config.signer.service_url)?)
        }
    };
    Ok(signer)
}

/// Fetch every pending note under the input root
pub async fn crawl(config: HarvesterConfig) -> Result<()> {
    if config.credentials.cookie.trim().is_empty() {
        anyhow::bail!("No cookie configured; set credentials.cookie or {}", COOKIE_ENV);
    }

    let signer = build_signer(&config).await?;
    let client = XhsClient::new(&config.api, &config.credentials.cookie, signer)?;
    let controller = CrawlerController::new(config.crawler.clone(), Arc::new(client), Arc::new(FsRecordStore::new()))?;

    let report = controller.run().await?;

    for category in &report.categories {
        match &category.error {
            Some(error) => warn!("{}: aborted ({})", category.name, error),
            None => info!(
                "{}: {} pending, {} succeeded, {} failed",
                category.name, category.pending, category.succeeded, category.failed
            ),
        }
    }

    let elapsed = report.finished_at - report.started_at;
    info!(
        "Crawl finished in {}s: {} succeeded, {} failed",
        elapsed.num_seconds(),
        report.total_succeeded(),
        report.total_failed()
    );

    Ok(())
}

/// Print per-category counts without fetching anything
pub async fn status(config: HarvesterConfig) -> Result<()> {
    let store = FsRecordStore::new();
    let categories = discover_categories(&config.crawler.input_root, &config.crawler.output_root).await?;

    if categories.is_empty() {
        println!("No categories found in {}", config.crawler.input_root.display());
        return Ok(());
    }

    println!("{:<30} {:>10} {:>10} {:>10} {:>10}", "CATEGORY", "FOUND", "FETCHED", "PENDING", "INVALID");
    for category in &categories {
        match plan_category(&store, category).await {
            Ok(plan) => println!(
                "{:<30} {:>10} {:>10} {:>10} {:>10}",
                category.name,
                plan.discovered,
                plan.already_fetched,
                plan.pending.len(),
                plan.invalid_ids.len()
            ),
            Err(e) => println!("{:<30} error: {:#}", category.name, e),
        }
    }

    Ok(())
}

/// Merge raw search-result exports and share-link lists into one manifest
pub async fn extract(input_dir: &Path, output: &Path) -> Result<()> {
    let mut files = list_manifests(input_dir).await?;
    files.extend(list_link_lists(input_dir).await?);
    if files.is_empty() {
        warn!("No JSON or link files found in {}", input_dir.display());
        return Ok(());
    }

    let mut merged = Extraction::default();
    for path in &files {
        let name = path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let read = if path.extension().map_or(false, |ext| ext == "txt") {
            read_link_list(path).await
        } else {
            read_manifest(path).await
        };

        match read {
            Ok(extraction) => {
                info!("{}: {} notes", name, extraction.refs.len());
                report_invalid(&name, &extraction.invalid_ids);
                merged.merge(extraction);
            }
            Err(e) => warn!("Skipping {}: {:#}", name, e),
        }
    }

    let refs = dedupe_first_wins(merged.refs);
    if refs.is_empty() {
        warn!("No valid notes found in {}", input_dir.display());
        return Ok(());
    }

    write_manifest(output, &refs).await?;
    info!("Wrote {} unique notes to {}", refs.len(), output.display());

    Ok(())
}

/// List all available configuration profiles
pub fn list_profiles() -> Result<()> {
    let profiles = HarvesterConfig::list_profiles()?;

    println!("Available configuration profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Show a profile, creating it with defaults if it does not exist
pub fn manage_profile(profile_name: &str) -> Result<()> {
    match HarvesterConfig::load_profile(profile_name) {
        Ok(config) => {
            println!("Profile: {}", profile_name);
            println!("{:#?}", config);
        },
        Err(_) => {
            warn!("Profile '{}' does not exist. Creating a default profile.", profile_name);
            let path = HarvesterConfig::default().save_as_profile(profile_name)?;
            println!("Created default profile: {}", path.display());
        }
    }

    Ok(())
}

/// Show the current configuration
pub fn show_config() -> Result<()> {
    let config = HarvesterConfig::load_default()?;
    println!("Current configuration:");
    println!("{:#?}", config);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_overrides_apply() {
        let overrides = CrawlOverrides {
            input: Some(PathBuf::from("in")),
            retries: Some(10),
            min_delay: Some(1.0),
            max_delay: Some(2.0),
            headed: true,
            ..Default::default()
        };

        let config = overrides.apply(HarvesterConfig::default());

        assert_eq!(config.crawler.input_root, PathBuf::from("in"));
        assert_eq!(config.crawler.output_root, PathBuf::from("output"));
        assert_eq!(config.crawler.retry_count, 10);
        assert_eq!(config.crawler.pacing.min_secs, 1.0);
        assert_eq!(config.crawler.pacing.max_secs, 2.0);
        assert!(!config.browser.headless);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let config = CrawlOverrides::default().apply(HarvesterConfig::default());
        assert_eq!(config.crawler.retry_count, 3);
        assert!(config.browser.headless);
    }

    #[tokio::test]
    async fn test_crawl_requires_cookie() {
        let mut config = HarvesterConfig::default();
        config.credentials.cookie = "  ".to_string();

        assert!(crawl(config).await.is_err());
    }

    #[tokio::test]
    async fn test_extract_merges_exports() {
        let dir = tempfile::tempdir().unwrap();
        let exports = dir.path().join("import");
        std::fs::create_dir_all(&exports).unwrap();
        std::fs::write(exports.join("1.json"), json!({ "data": { "items": [
            { "id": "675bc154000000000103dbfa", "xsec_token": "t1" },
            { "id": "short", "xsec_token": "t2" },
        ] } }).to_string()).unwrap();
        std::fs::write(exports.join("2.json"), json!({ "data": { "items": [
            { "id": "675bc154000000000103dbfa", "xsec_token": "t3" },
            { "id": "67863da8000000000100985c", "xsec_token": "t4" },
        ] } }).to_string()).unwrap();
        std::fs::write(
            exports.join("shared.txt"),
            "https://www.xiaohongshu.com/explore/6791f1a5000000001703a2c4?xsec_token=t5\n",
        ).unwrap();

        let output = dir.path().join("export").join("manifest.json");
        extract(&exports, &output).await.unwrap();

        let manifest: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let items = manifest["data"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["xsec_token"], "t1");
        assert_eq!(items[1]["id"], "67863da8000000000100985c");
        assert_eq!(items[2]["xsec_token"], "t5");
    }

    #[tokio::test]
    async fn test_extract_empty_dir_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("manifest.json");

        extract(dir.path(), &output).await.unwrap();
        assert!(!output.exists());
    }
}
