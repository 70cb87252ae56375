//! Backup documents
//!
//! A backup is a JSON object holding a full snapshot of every table, with
//! camelCase field names matching the column names.

use crate::history::{DailyAssetHistory, StockHistory};
use crate::stock::Stock;
use crate::transaction::TransactionHistory;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_version() -> u32 {
    Backup::FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Creation time, epoch milliseconds
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub stocks: Vec<Stock>,
    #[serde(default)]
    pub transactions: Vec<TransactionHistory>,
    #[serde(default)]
    pub daily_history: Vec<DailyAssetHistory>,
    #[serde(default)]
    pub stock_history: Vec<StockHistory>,
}

impl Default for Backup {
    fn default() -> Self {
        Self {
            version: Self::FORMAT_VERSION,
            timestamp: 0,
            stocks: Vec::new(),
            transactions: Vec::new(),
            daily_history: Vec::new(),
            stock_history: Vec::new(),
        }
    }
}

impl Backup {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let backup: Backup = serde_json::from_str(json)?;
        backup.check_version()?;
        Ok(backup)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Reject documents written by a newer format
    pub fn check_version(&self) -> Result<()> {
        if self.version > Self::FORMAT_VERSION {
            return Err(Error::InvalidValue(format!(
                "backup format {} is newer than supported format {}",
                self.version,
                Self::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.stocks.len() + self.transactions.len() + self.daily_history.len() + self.stock_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_camel_case() {
        let backup = Backup {
            timestamp: 1_700_000_000_000,
            stocks: vec![Stock::new("Samsung", "005930", 1000.0, 10.0, 100.0, 1)],
            daily_history: vec![DailyAssetHistory::new("2024-01-01", 1.0, 2.0)],
            ..Backup::default()
        };
        let json = backup.to_json().unwrap();

        assert!(json.contains("\"dailyHistory\""));
        assert!(json.contains("\"stockHistory\""));
        assert!(json.contains("\"vValue\""));
        assert!(json.contains("\"totalCurrentValue\""));
        assert_eq!(Backup::from_json(&json).unwrap(), backup);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let backup = Backup::from_json(r#"{"timestamp": 5}"#).unwrap();
        assert_eq!(backup.version, Backup::FORMAT_VERSION);
        assert_eq!(backup.timestamp, 5);
        assert!(backup.is_empty());
    }

    #[test]
    fn test_newer_format_rejected() {
        let err = Backup::from_json(r#"{"version": 99}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(Backup::from_json("{ not json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        let backup = Backup {
            transactions: vec![TransactionHistory::new(1, 10, "SELL", 5.0, 2, 10.0)],
            ..Backup::default()
        };

        backup.write_to(&path).unwrap();
        let read = Backup::read_from(&path).unwrap();
        assert_eq!(read.row_count(), 1);
        assert_eq!(read.transactions[0].kind, "SELL");
    }
}
