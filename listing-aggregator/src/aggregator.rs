use crate::aggregators::{write_csv_atomic, PivotTable};
use crate::store::{ArtifactStore, LoadedArtifact};
use crate::types::{AnnouncementRecord, MarketType, Result, RunConfig};
use crate::utils::time::{date_floor, freshness_cutoff, run_date};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marks rows whose effective date could not be determined.
pub const TO_CONFIRM: &str = "to-confirm";

pub const LONG_FORM_FILE: &str = "announcements.csv";
pub const SPOT_FILE: &str = "announcements_spot.csv";
pub const FUTURES_FILE: &str = "announcements_futures.csv";

const LONG_FORM_HEADER: &[&str] = &[
    "time",
    "exchange",
    "symbol",
    "action",
    "type",
    "title",
    "url",
    "release_time",
    "comments",
    "file",
];

/// One record in the long-form table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRow {
    pub record: AnnouncementRecord,
    /// Effective date, or the run date when the record's date is undetermined.
    pub date: NaiveDate,
    pub comments: String,
    pub file: String,
}

impl AggregationRow {
    pub fn to_confirm(&self) -> bool {
        self.comments == TO_CONFIRM
    }

    /// Text shown in a pivot cell, e.g. `listing FOO/USDT`.
    pub fn description(&self) -> String {
        if self.comments.is_empty() {
            format!("{} {}", self.record.action, self.record.symbol)
        } else {
            format!("{} {} {}", self.comments, self.record.action, self.record.symbol)
        }
    }

    fn to_csv_record(&self) -> Vec<String> {
        let record = &self.record;
        vec![
            self.date.format("%Y-%m-%d").to_string(),
            record.exchange.clone(),
            record.symbol.clone(),
            record.action.to_string(),
            record.market_type.to_string(),
            record.title.clone(),
            record.url.clone(),
            record.release_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            self.comments.clone(),
            self.file.clone(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct AggregateTables {
    pub run_date: NaiveDate,
    /// Every row, before the freshness window is applied.
    pub long_form: Vec<AggregationRow>,
    pub spot: PivotTable,
    pub futures: PivotTable,
}

/// Output files written by [`Aggregator::write_csv`].
#[derive(Debug, Clone)]
pub struct AggregateFiles {
    pub long_form: PathBuf,
    pub spot: PathBuf,
    pub futures: PathBuf,
}

/// Rolls stored artifacts into the long-form table and the Spot/Futures pivots.
pub struct Aggregator {
    freshness_days: i64,
    offset: FixedOffset,
    spot_exchanges: Vec<String>,
    futures_exchanges: Vec<String>,
}

impl Aggregator {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            freshness_days: config.freshness_days,
            offset: config.report_offset(),
            spot_exchanges: config.spot_exchanges.clone(),
            futures_exchanges: config.futures_exchanges.clone(),
        }
    }

    /// Flattens artifacts into rows. Blank symbols are dropped and undetermined
    /// dates are backfilled with `run_date` and flagged for confirmation.
    pub fn rows(&self, artifacts: &[LoadedArtifact], run_date: NaiveDate) -> Vec<AggregationRow> {
        let mut rows: Vec<AggregationRow> = artifacts
            .iter()
            .flat_map(|artifact| artifact.records())
            .filter(|record| !record.symbol.trim().is_empty())
            .map(|record| {
                let (date, comments) = match record.date.as_date() {
                    Some(date) => (date, String::new()),
                    None => (run_date, TO_CONFIRM.to_string()),
                };
                AggregationRow {
                    file: record.provenance.clone().unwrap_or_default(),
                    record,
                    date,
                    comments,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.record.exchange.cmp(&b.record.exchange))
        });
        rows
    }

    pub fn build(&self, artifacts: &[LoadedArtifact], now: DateTime<Utc>) -> AggregateTables {
        let run_date = run_date(now, self.offset);
        let long_form = self.rows(artifacts, run_date);

        let date_floor = date_floor(run_date, self.freshness_days);
        let release_floor = freshness_cutoff(now, self.freshness_days);
        let windowed: Vec<AggregationRow> = long_form
            .iter()
            .filter(|row| row.date >= date_floor)
            .filter(|row| row.record.release_time.map_or(true, |t| t >= release_floor))
            .cloned()
            .collect();
        debug!(
            "{} of {} rows fall inside the {} day window ending {}",
            windowed.len(),
            long_form.len(),
            self.freshness_days,
            run_date
        );

        AggregateTables {
            run_date,
            spot: PivotTable::build(MarketType::Spot, &self.spot_exchanges, &windowed),
            futures: PivotTable::build(MarketType::Futures, &self.futures_exchanges, &windowed),
            long_form,
        }
    }

    pub fn write_csv(&self, tables: &AggregateTables, output_root: &Path) -> Result<AggregateFiles> {
        let files = AggregateFiles {
            long_form: output_root.join(LONG_FORM_FILE),
            spot: output_root.join(SPOT_FILE),
            futures: output_root.join(FUTURES_FILE),
        };

        let header: Vec<String> = LONG_FORM_HEADER.iter().map(|h| h.to_string()).collect();
        let rows: Vec<Vec<String>> = tables.long_form.iter().map(AggregationRow::to_csv_record).collect();
        write_csv_atomic(&files.long_form, &header, &rows)?;
        tables.spot.write_csv(&files.spot)?;
        tables.futures.write_csv(&files.futures)?;

        info!(
            "Wrote {} long-form rows, {} spot dates, {} futures dates to {}",
            tables.long_form.len(),
            tables.spot.rows.len(),
            tables.futures.rows.len(),
            output_root.display()
        );
        Ok(files)
    }

    /// Load every artifact from `store`, build the tables and write them under `output_root`.
    pub async fn run(&self, store: &ArtifactStore, output_root: &Path, now: DateTime<Utc>) -> Result<AggregateTables> {
        let artifacts = store.load_all().await?;
        info!("Aggregating {} artifacts from {}", artifacts.len(), store.root().display());
        let tables = self.build(&artifacts, now);
        self.write_csv(&tables, output_root)?;
        Ok(tables)
    }
}
