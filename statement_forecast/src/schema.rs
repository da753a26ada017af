//! Statement kinds and the metrics each one carries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// A base financial metric recognised by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalRevenue,
    TotalExpenses,
    NetIncome,
    GrossProfit,
    OperatingIncome,
    TotalAssets,
    TotalCurrentAssets,
    TotalCurrentLiabilities,
    TotalLiabilities,
    ShareholdersEquity,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::TotalRevenue,
        Metric::TotalExpenses,
        Metric::NetIncome,
        Metric::GrossProfit,
        Metric::OperatingIncome,
        Metric::TotalAssets,
        Metric::TotalCurrentAssets,
        Metric::TotalCurrentLiabilities,
        Metric::TotalLiabilities,
        Metric::ShareholdersEquity,
    ];

    /// Column name after header normalization
    pub fn column_name(&self) -> &'static str {
        match self {
            Metric::TotalRevenue => "total_revenue",
            Metric::TotalExpenses => "total_expenses",
            Metric::NetIncome => "net_income",
            Metric::GrossProfit => "gross_profit",
            Metric::OperatingIncome => "operating_income",
            Metric::TotalAssets => "total_assets",
            Metric::TotalCurrentAssets => "total_current_assets",
            Metric::TotalCurrentLiabilities => "total_current_liabilities",
            Metric::TotalLiabilities => "total_liabilities",
            Metric::ShareholdersEquity => "shareholders_equity",
        }
    }

    pub fn from_column(name: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.column_name() == name)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Which statement a snapshot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    QuarterlyIncomeStatement,
    IncomeStatement,
    QuarterlyBalanceSheet,
    BalanceSheet,
}

/// Expected and optional metrics of one statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementSchema {
    pub required: &'static [Metric],
    pub optional: &'static [Metric],
}

const INCOME_SCHEMA: StatementSchema = StatementSchema {
    required: &[Metric::TotalRevenue],
    optional: &[
        Metric::TotalExpenses,
        Metric::NetIncome,
        Metric::GrossProfit,
        Metric::OperatingIncome,
    ],
};

const BALANCE_SCHEMA: StatementSchema = StatementSchema {
    required: &[Metric::TotalAssets],
    optional: &[
        Metric::TotalCurrentAssets,
        Metric::TotalCurrentLiabilities,
        Metric::TotalLiabilities,
        Metric::ShareholdersEquity,
    ],
};

impl StatementSchema {
    /// Required metrics first, then optional ones
    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        self.required.iter().chain(self.optional.iter()).copied()
    }

    pub fn admits(&self, metric: Metric) -> bool {
        self.metrics().any(|m| m == metric)
    }
}

impl StatementKind {
    /// File-name fragment, e.g. `quarterly_income_statement`
    pub fn data_type(&self) -> &'static str {
        match self {
            StatementKind::QuarterlyIncomeStatement => "quarterly_income_statement",
            StatementKind::IncomeStatement => "income_statement",
            StatementKind::QuarterlyBalanceSheet => "quarterly_balance_sheet",
            StatementKind::BalanceSheet => "balance_sheet",
        }
    }

    pub fn is_quarterly(&self) -> bool {
        matches!(
            self,
            StatementKind::QuarterlyIncomeStatement | StatementKind::QuarterlyBalanceSheet
        )
    }

    pub fn is_income_statement(&self) -> bool {
        matches!(
            self,
            StatementKind::QuarterlyIncomeStatement | StatementKind::IncomeStatement
        )
    }

    pub fn schema(&self) -> StatementSchema {
        if self.is_income_statement() {
            INCOME_SCHEMA
        } else {
            BALANCE_SCHEMA
        }
    }

    /// Base metrics that get a trailing rolling mean
    pub fn rolling_metrics(&self) -> &'static [Metric] {
        if self.is_income_statement() {
            &[Metric::TotalRevenue, Metric::NetIncome]
        } else {
            &[Metric::TotalAssets]
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data_type())
    }
}

impl FromStr for StatementKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarterly_income_statement" => Ok(StatementKind::QuarterlyIncomeStatement),
            "income_statement" => Ok(StatementKind::IncomeStatement),
            "quarterly_balance_sheet" => Ok(StatementKind::QuarterlyBalanceSheet),
            "balance_sheet" => Ok(StatementKind::BalanceSheet),
            other => Err(PipelineError::InvalidParameter(format!(
                "Unknown statement type: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_column(metric.column_name()), Some(metric));
        }
        assert_eq!(Metric::from_column("ebitda"), None);
    }

    #[test]
    fn test_statement_kind_parsing() {
        let kind: StatementKind = "quarterly_balance_sheet".parse().unwrap();
        assert_eq!(kind, StatementKind::QuarterlyBalanceSheet);
        assert!(kind.is_quarterly());
        assert!(!kind.is_income_statement());
        assert!("cash_flow".parse::<StatementKind>().is_err());
    }

    #[test]
    fn test_schema_membership() {
        let schema = StatementKind::QuarterlyIncomeStatement.schema();
        assert_eq!(schema.required, &[Metric::TotalRevenue]);
        assert!(schema.admits(Metric::NetIncome));
        assert!(!schema.admits(Metric::TotalAssets));
    }
}
