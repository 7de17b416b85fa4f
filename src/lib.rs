//! # fx-report
//!
//! Collects exchange rates against EUR from three upstreams and exports them as one
//! xlsx report:
//!
//! - the ECB statistical data warehouse (daily and monthly reference rates)
//! - apilayer exchangerates_data (daily, commercial, quota limited)
//! - investing.com quote history (monthly closes)
//!
//! Records from every source are normalized into [`types::RateRecord`], reconciled
//! into daily, spot (month-end) and monthly views, and written to a workbook with one
//! sheet per view.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fx_report::prelude::*;
//!
//! # async fn report() -> fx_report::error::Result<()> {
//! let pipeline = Pipeline::new(Settings::load(None)?)?;
//! let artifact = pipeline
//!     .run_pipeline("2022-08", "2022-09", true, false, false)
//!     .await?;
//! println!("{}", artifact.name);
//! # Ok(())
//! # }
//! ```

pub mod alerting;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod export;
#[cfg(feature = "async")]
pub mod pipeline;
pub mod reconcile;
#[cfg(feature = "async")]
pub mod sources;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::alerting::{Alerter, LogAlerter, RunSummary};
    pub use crate::cache::{MemoryCache, NoCache, ResponseCache};
    pub use crate::config::Settings;
    pub use crate::error::{ErrorKind, FxError, Result};
    pub use crate::export::{artifact_name, export, read_sheet};
    #[cfg(feature = "async")]
    pub use crate::pipeline::{Pipeline, ReportArtifact, ReportRange};
    pub use crate::reconcile::Reconciler;
    #[cfg(feature = "async")]
    pub use crate::sources::{FetchWindow, QuotaStatus, RateSource};
    pub use crate::types::*;
}
