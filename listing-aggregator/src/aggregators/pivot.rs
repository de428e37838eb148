use crate::aggregator::AggregationRow;
use crate::aggregators::write_csv_atomic;
use crate::types::{MarketType, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Wide table for one market type: one row per date, one column per known exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTable {
    pub market_type: MarketType,
    pub columns: Vec<String>,
    pub rows: Vec<PivotRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotRow {
    pub date: NaiveDate,
    /// One cell per column; empty when the exchange had nothing that day.
    pub cells: Vec<String>,
}

impl PivotTable {
    /// Groups `rows` of `market_type` by (date, exchange) and joins descriptions with
    /// newlines in input order. Exchanges outside `columns` are left out.
    pub fn build(market_type: MarketType, columns: &[String], rows: &[AggregationRow]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
        let index: HashMap<&str, usize> = columns.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();

        let mut grouped: BTreeMap<NaiveDate, Vec<Vec<String>>> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.record.market_type == market_type) {
            let exchange = row.record.exchange.to_lowercase();
            let Some(&col) = index.get(exchange.as_str()) else {
                continue;
            };
            grouped
                .entry(row.date)
                .or_insert_with(|| vec![Vec::new(); columns.len()])[col]
                .push(row.description());
        }

        let rows = grouped
            .into_iter()
            .map(|(date, cells)| PivotRow {
                date,
                cells: cells.into_iter().map(|parts| parts.join("\n")).collect(),
            })
            .collect();

        Self {
            market_type,
            columns,
            rows,
        }
    }

    pub fn cell(&self, date: NaiveDate, exchange: &str) -> Option<&str> {
        let col = self.columns.iter().position(|c| c.eq_ignore_ascii_case(exchange))?;
        let row = self.rows.iter().find(|r| r.date == date)?;
        row.cells.get(col).map(String::as_str)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let header: Vec<String> = std::iter::once("time".to_string()).chain(self.columns.iter().cloned()).collect();
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                std::iter::once(row.date.format("%Y-%m-%d").to_string())
                    .chain(row.cells.iter().cloned())
                    .collect()
            })
            .collect();
        write_csv_atomic(path, &header, &rows)
    }
}
