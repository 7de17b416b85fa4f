//! Report pipeline: validate, fetch, reconcile, export
//!
//! Sources run concurrently and are joined; the first failure aborts the request and
//! drops every fetch still in flight. Nothing is written unless all selected sources
//! succeeded and produced at least one record.

use crate::alerting::{Alerter, LogAlerter, RunSummary};
use crate::cache::{MemoryCache, ResponseCache};
use crate::calendar;
use crate::config::Settings;
use crate::error::{ErrorKind, FxError, Result};
use crate::export;
use crate::reconcile::Reconciler;
use crate::sources::{
    ApilayerSource, EcbSource, FetchWindow, InstrumentMatch, InvestingSource, RateSource,
};
use crate::types::{RateRecord, SourceSelection};
use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// A validated request window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRange {
    /// First day of the first requested month
    pub date_from: NaiveDate,
    /// Last day of the last requested month, or today if that is earlier
    pub date_to: NaiveDate,
}

impl ReportRange {
    /// Validate a `YYYY-MM` pair and expand it to calendar dates
    ///
    /// `date_from` must be strictly before `date_to`.
    pub fn from_months(date_from: &str, date_to: &str, today: NaiveDate) -> Result<Self> {
        let from_month = calendar::parse_month(date_from)?;
        let to_month = calendar::parse_month(date_to)?;

        if from_month >= to_month {
            return Err(FxError::InvalidRange(format!(
                "date_from ({}) must be before date_to ({})",
                date_from.trim(),
                date_to.trim()
            )));
        }

        let end = calendar::month_end(to_month).min(today);
        if from_month > end {
            return Err(FxError::InvalidRange(format!(
                "date_from ({}) is in the future",
                date_from.trim()
            )));
        }

        Ok(Self {
            date_from: from_month,
            date_to: end,
        })
    }

    pub fn days(&self) -> usize {
        calendar::days_inclusive(self.date_from, self.date_to)
    }

    /// Source-facing window of this range for a run on `today`
    pub fn window(&self, today: NaiveDate) -> FetchWindow {
        FetchWindow::new(self.date_from, self.date_to, today)
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    /// File name, e.g. `2022-08-01_2022-09-30-ecb.xlsx`
    pub name: String,
    pub path: PathBuf,
    pub range: ReportRange,
    pub sources: SourceSelection,
    pub daily_rows: usize,
    pub spot_rows: usize,
    pub monthly_rows: usize,
}

/// Drives one report request end to end
pub struct Pipeline {
    settings: Arc<Settings>,
    cache: Arc<dyn ResponseCache>,
    alerter: Arc<dyn Alerter>,
    ecb: EcbSource,
    apilayer: ApilayerSource,
    investing: InvestingSource,
    reconciler: Reconciler,
}

async fn fetch_if<S: RateSource>(
    enabled: bool,
    source: &S,
    window: &FetchWindow,
) -> Result<Vec<RateRecord>> {
    if !enabled {
        log::debug!("{}: not selected", source.source());
        return Ok(Vec::new());
    }

    match source.fetch(window).await {
        Ok(records) => {
            log::info!("{}: {} records", source.source(), records.len());
            Ok(records)
        }
        Err(e) => {
            log::warn!("{}: fetch failed: {}", source.source(), e);
            Err(e)
        }
    }
}

impl Pipeline {
    /// Pipeline with an in-memory cache and log-only alerting
    pub fn new(settings: Settings) -> Result<Self> {
        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryCache::from_settings(&settings.cache));
        Self::with_collaborators(Arc::new(settings), cache, Arc::new(LogAlerter))
    }

    pub fn with_collaborators(
        settings: Arc<Settings>,
        cache: Arc<dyn ResponseCache>,
        alerter: Arc<dyn Alerter>,
    ) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            ecb: EcbSource::new(settings.clone(), cache.clone())?,
            apilayer: ApilayerSource::new(settings.clone(), cache.clone())?,
            investing: InvestingSource::new(settings.clone(), cache.clone())?,
            reconciler: Reconciler::new(settings.apilayer.symbols.iter().cloned()),
            settings,
            cache,
            alerter,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    /// Search investing.com instrument ids
    pub async fn search_instruments(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<InstrumentMatch>> {
        self.investing.search(query, limit).await
    }

    /// Flag based entry point
    pub async fn run_pipeline(
        &self,
        date_from: &str,
        date_to: &str,
        use_ecb: bool,
        use_commercial: bool,
        use_quote_history: bool,
    ) -> Result<ReportArtifact> {
        let sources = SourceSelection {
            ecb: use_ecb,
            commercial: use_commercial,
            quote_history: use_quote_history,
        };
        self.run(date_from, date_to, sources).await
    }

    /// Run against today's date
    pub async fn run(
        &self,
        date_from: &str,
        date_to: &str,
        sources: SourceSelection,
    ) -> Result<ReportArtifact> {
        self.run_at(date_from, date_to, sources, Utc::now().date_naive())
            .await
    }

    /// Run as if `today` were the current date
    pub async fn run_at(
        &self,
        date_from: &str,
        date_to: &str,
        sources: SourceSelection,
        today: NaiveDate,
    ) -> Result<ReportArtifact> {
        let run = RunSummary {
            date_from: date_from.trim().to_string(),
            date_to: date_to.trim().to_string(),
            sources,
        };
        self.alerter.notify_run(&run);

        let result = self.execute(date_from, date_to, sources, today).await;
        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::Internal => {
                    log::error!("unexpected failure for {}: {:?}", run.describe(), err);
                    self.alerter.alert(&run, err);
                }
                ErrorKind::SourceUnavailable | ErrorKind::ExportFailure => {
                    log::error!("run failed for {}: {}", run.describe(), err);
                }
                ErrorKind::InvalidRange | ErrorKind::NoData => {
                    log::warn!("run rejected for {}: {}", run.describe(), err);
                }
            }
        }
        result
    }

    async fn execute(
        &self,
        date_from: &str,
        date_to: &str,
        sources: SourceSelection,
        today: NaiveDate,
    ) -> Result<ReportArtifact> {
        let range = ReportRange::from_months(date_from, date_to, today)?;
        log::info!(
            "fetching {} to {} ({} days) from {:?}",
            range.date_from,
            range.date_to,
            range.days(),
            sources.active()
        );

        let records = self.fetch(&range.window(today), sources).await?;
        if records.is_empty() {
            return Err(FxError::NoData);
        }

        let views = self.reconciler.reconcile(&records);

        let name = export::artifact_name(range.date_from, range.date_to, &sources);
        let path = export::export(&views, &self.settings.output_dir.join(&name))?;

        Ok(ReportArtifact {
            name,
            path,
            range,
            sources,
            daily_rows: views.daily.len(),
            spot_rows: views.spot.len(),
            monthly_rows: views.monthly.len(),
        })
    }

    /// Fetch every selected source concurrently, in naming order
    ///
    /// The first failure is returned at once and the other fetches are dropped.
    pub async fn fetch(
        &self,
        window: &FetchWindow,
        sources: SourceSelection,
    ) -> Result<Vec<RateRecord>> {
        let (ecb, apilayer, investing) = tokio::try_join!(
            fetch_if(sources.ecb, &self.ecb, window),
            fetch_if(sources.commercial, &self.apilayer, window),
            fetch_if(sources.quote_history, &self.investing, window),
        )?;

        let mut records = ecb;
        records.extend(apilayer);
        records.extend(investing);
        Ok(records)
    }
}
