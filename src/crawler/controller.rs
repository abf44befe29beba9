use anyhow::{Result, Context};
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::cli::config::CrawlerSettings;
use crate::client::NoteClient;
use crate::crawler::error::CrawlError;
use crate::crawler::extract::{dedupe_first_wins, report_invalid};
use crate::crawler::pacing::Pacing;
use crate::crawler::scheduler::Scheduler;
use crate::crawler::task::{Category, CategoryReport, ContentRef, RunReport};
use crate::storage::manifest::read_manifests;
use crate::storage::RecordStore;

/// Work found for one category before anything is fetched
#[derive(Debug, Clone)]
pub struct CategoryPlan {
    pub category: Category,
    pub discovered: usize,
    pub already_fetched: usize,
    pub pending: Vec<ContentRef>,
    pub invalid_ids: Vec<String>,
}

impl CategoryPlan {
    fn report(&self) -> CategoryReport {
        CategoryReport {
            name: self.category.name.clone(),
            discovered: self.discovered,
            already_fetched: self.already_fetched,
            pending: self.pending.len(),
            invalid_ids: self.invalid_ids.clone(),
            ..Default::default()
        }
    }
}

/// Enumerate the immediate subdirectories of `input_root` as categories, sorted by name
pub async fn discover_categories(input_root: &Path, output_root: &Path) -> Result<Vec<Category>> {
    let mut entries = fs::read_dir(input_root).await
        .context(format!("Failed to read input directory: {}", input_root.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => warn!("Skipping category with non UTF-8 name: {:?}", name),
        }
    }

    names.sort();
    Ok(names.into_iter()
        .map(|name| Category::new(name, input_root, output_root))
        .collect())
}

/// Merge a category's manifests and subtract what is already on disk
pub async fn plan_category(store: &dyn RecordStore, category: &Category) -> Result<CategoryPlan> {
    let extraction = read_manifests(&category.input_dir).await?;
    let fetched_ids = store.fetched_ids(&category.output_dir).await?;

    let mut scheduler = Scheduler::new(fetched_ids);
    let already_fetched = scheduler.fetched_count();
    let discovered = dedupe_first_wins(extraction.refs.iter().cloned()).len();

    let pending = scheduler.pending(extraction.refs);

    Ok(CategoryPlan {
        category: category.clone(),
        discovered,
        already_fetched,
        pending,
        invalid_ids: extraction.invalid_ids,
    })
}

/// Runs the crawl: one category at a time, one note at a time
pub struct CrawlerController {
    settings: CrawlerSettings,
    pacing: Pacing,
    client: Arc<dyn NoteClient>,
    store: Arc<dyn RecordStore>,
}

impl CrawlerController {
    /// Create a new crawler controller with the given settings and collaborators
    pub fn new(settings: CrawlerSettings, client: Arc<dyn NoteClient>, store: Arc<dyn RecordStore>) -> Result<Self> {
        let pacing = Pacing::try_from(&settings.pacing)?;
        Ok(Self {
            settings,
            pacing,
            client,
            store,
        })
    }

    /// Process every category under the input root
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let categories = discover_categories(&self.settings.input_root, &self.settings.output_root).await?;

        info!("Found {} categories in {}", categories.len(), self.settings.input_root.display());

        let mut reports = Vec::with_capacity(categories.len());
        for category in &categories {
            info!("##### [ {} ] start #####", category.name);

            let report = match self.process_category(category).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Category {} aborted: {:#}", category.name, e);
                    CategoryReport {
                        name: category.name.clone(),
                        error: Some(format!("{:#}", e)),
                        ..Default::default()
                    }
                }
            };

            reports.push(report);
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            categories: reports,
        })
    }

    /// Fetch and persist the pending notes of one category
    pub async fn process_category(&self, category: &Category) -> Result<CategoryReport> {
        let plan = plan_category(self.store.as_ref(), category).await?;
        let mut report = plan.report();

        report_invalid(&category.name, &plan.invalid_ids);
        info!("{}: {} already fetched, {} new", category.name, plan.already_fetched, plan.pending.len());

        if plan.pending.is_empty() {
            info!("{}: nothing new to fetch", category.name);
            return Ok(report);
        }

        self.store.prepare(&category.output_dir).await?;

        let total = plan.pending.len();
        for (index, content) in plan.pending.iter().enumerate() {
            debug!("{}: note {}/{} ({})", category.name, index + 1, total, content.id);

            if self.process_item(category, content).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }

        info!("{}: {} succeeded, {} failed", category.name, report.succeeded, report.failed);

        Ok(report)
    }

    /// Fetch and persist one note; failures never escape this item
    async fn process_item(&self, category: &Category, content: &ContentRef) -> bool {
        let record = match self.fetch_with_retry(content).await {
            Ok(record) => record,
            Err(e) if e.is_retryable() => {
                error!("Final failure for {} after {} attempts: {}", content.id, self.attempts(), e);
                return false;
            }
            Err(e) => {
                error!("Abandoning {} ({} error): {}", content.id, e.kind(), e);
                return false;
            }
        };

        match self.store.persist(&category.output_dir, &content.id, &record).await {
            Ok(path) => {
                info!("Fetched {} -> {}", content.id, path.display());
                true
            }
            Err(e) => {
                error!("Failed to store {}: {:#}", content.id, e);
                false
            }
        }
    }

    fn attempts(&self) -> u32 {
        self.settings.retry_count.max(1)
    }

    /// Pace, then fetch; retryable failures share one attempt budget
    async fn fetch_with_retry(&self, content: &ContentRef) -> Result<Value, CrawlError> {
        let attempts = self.attempts();
        let mut attempt = 1;

        loop {
            self.pacing.pause().await;

            match self.client.fetch_note(&content.id, &content.access_token).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("Error fetching {} ({}/{} attempts): {}", content.id, attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
