use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::LensError;

const FRAUD_PER_MONTH_TEMPLATE: &str = r#"
SELECT
    COALESCE(FORMAT(Trans_Date_Trans_Time, 'yyyy-MM'), 'Grand Total') AS Month,
    SUM(CASE WHEN Is_fraud = 1 THEN 1 ELSE 0 END) AS Fraudulent_Transactions,
    SUM(CASE WHEN Is_fraud = 0 THEN 1 ELSE 0 END) AS Total_Transactions,
    CASE
        WHEN SUM(CASE WHEN Is_fraud = 0 THEN 1 ELSE 0 END) = 0 THEN '0.00%'
        ELSE FORMAT(
            CAST(SUM(CASE WHEN Is_fraud = 1 THEN 1 ELSE 0 END) AS FLOAT) /
            SUM(CASE WHEN Is_fraud = 0 THEN 1 ELSE 0 END) * 100, 'N2'
        ) + '%'
    END AS Fraudulent_Ratio
FROM [dbo].[CustomerTransactions]
GROUP BY GROUPING SETS (
    (FORMAT(Trans_Date_Trans_Time, 'yyyy-MM')),
    ()
)
ORDER BY
    CASE WHEN FORMAT(Trans_Date_Trans_Time, 'yyyy-MM') IS NULL THEN 1 ELSE 0 END,
    COALESCE(FORMAT(Trans_Date_Trans_Time, 'yyyy-MM'), 'Grand Total')
"#;

const ALL_DATA_TEMPLATE: &str = "SELECT * FROM [dbo].[CustomerTransactions]";

const CATEGORY_VOLUME_TEMPLATE: &str = r#"
SELECT
    Category,
    FORMAT(SUM(Amount), 'N0') AS Total_Amount,
    FORMAT(SUM(CASE WHEN Is_Fraud = 1 THEN Amount ELSE 0 END), 'N0') AS Fraudulent_Amount,
    FORMAT(ROUND((SUM(CASE WHEN Is_Fraud = 1 THEN Amount ELSE 0 END) / NULLIF(SUM(Amount), 0)) * 100, 2), 'N0') + '%' AS Fraud_Ratio
FROM
    [dbo].[CustomerTransactions]
GROUP BY
    Category
ORDER BY
    (SUM(CASE WHEN Is_Fraud = 1 THEN Amount ELSE 0 END) / NULLIF(SUM(Amount), 0)) DESC
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    /// Stored order is the tie-break order within the intent.
    pub examples: Vec<String>,
    pub template: String,
}

impl Intent {
    pub fn new<I, S>(id: impl Into<String>, examples: I, template: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            examples: examples.into_iter().map(Into::into).collect(),
            template: template.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    intents: Vec<Intent>,
}

/// Read-only registry of known intents. Insertion order is preserved and is
/// the tie-break order used by the matcher.
#[derive(Debug, Clone, Default)]
pub struct IntentCatalog {
    intents: Vec<Intent>,
    index: HashMap<String, usize>,
}

impl IntentCatalog {
    pub fn new(intents: Vec<Intent>) -> Result<Self, LensError> {
        let mut index = HashMap::with_capacity(intents.len());
        for (position, intent) in intents.iter().enumerate() {
            if index.insert(intent.id.clone(), position).is_some() {
                return Err(LensError::DuplicateIntent(intent.id.clone()));
            }
        }

        Ok(Self { intents, index })
    }

    pub fn builtin() -> Result<Self, LensError> {
        let intents = vec![
            Intent::new(
                "fraud_analysis",
                [
                    "Show monthly fraud analysis summary.",
                    "Display the number of fraudulent and total transactions per month.",
                    "Summarize fraud statistics by month and overall.",
                ],
                FRAUD_PER_MONTH_TEMPLATE,
            ),
            Intent::new(
                "all_data",
                [
                    "Show all customer transactions.",
                    "Display the entire CustomerTransactions table.",
                    "List every transaction record.",
                    "Get all transaction data.",
                ],
                ALL_DATA_TEMPLATE,
            ),
            Intent::new(
                "category_volume",
                [
                    "Show total and fraudulent transaction amounts by category.",
                    "Display the total and fraudulent transaction amounts by category.",
                    "Show fraudulent transaction amounts by category.",
                    "Show total transaction amounts by category.",
                ],
                CATEGORY_VOLUME_TEMPLATE,
            ),
        ];

        Self::new(intents)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw).context("invalid intent catalog json")?;
        Ok(Self::new(file.intents)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "failed reading intent catalog at {}",
                path.as_ref().display()
            )
        })?;
        Self::from_json_str(&raw)
    }

    pub fn list_intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn get(&self, intent_id: &str) -> Option<&Intent> {
        self.index
            .get(intent_id)
            .and_then(|position| self.intents.get(*position))
    }

    pub fn template_for(&self, intent_id: &str) -> Result<&str, LensError> {
        self.get(intent_id)
            .map(|intent| intent.template.as_str())
            .ok_or_else(|| LensError::NotFound(intent_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}
