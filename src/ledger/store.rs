//! Ledger store collaborator contract
//!
//! The ledger itself (rows in a spreadsheet-backed store) lives outside this
//! service. This module defines the append/query contract the bot consumes
//! and an HTTP-backed gateway speaking it. When no endpoint is configured
//! the gateway is disabled: appends report failure and the conversation
//! layer tells the user instead of crashing.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::core::config;

/// One expense row to append to the ledger.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpenseEntry {
    pub date: String,
    pub category: String,
    pub amount: f64,
    pub description: String,
    pub note: String,
    pub receipt_url: Option<String>,
}

/// Already-summed monthly totals returned by the ledger collaborator.
/// This service only relays them; the math happens on the other side.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthlyTotals {
    pub total_sales: f64,
    pub total_expenses: f64,
}

impl MonthlyTotals {
    pub fn net_profit(&self) -> f64 {
        self.total_sales - self.total_expenses
    }
}

/// Append/query contract consumed by the conversation layer.
///
/// Append operations return plain success/failure; the caller decides how to
/// surface a failure (keep the conversation state for a retry).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append_expense(&self, entry: &ExpenseEntry) -> bool;
    async fn append_agent(&self, name: &str, ic: &str) -> bool;
    async fn append_supplier(&self, name: &str, category: &str) -> bool;
    async fn append_person(&self, name: &str) -> bool;
    /// Totals for one month, if the collaborator can provide them
    async fn monthly_totals(&self, year: i32, month: u32) -> Option<MonthlyTotals>;
    /// Whether a backing endpoint is configured at all
    fn is_available(&self) -> bool;
}

/// HTTP gateway to the spreadsheet-backed ledger service.
pub struct LedgerGateway {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl LedgerGateway {
    /// Builds the gateway from LEDGER_API_URL; disabled when unset.
    pub fn from_env() -> Self {
        let base_url = config::LEDGER_API_URL.clone();
        match base_url.as_deref() {
            Some(url) => log::info!("Ledger gateway configured: {}", url),
            None => log::warn!("Ledger gateway disabled (LEDGER_API_URL unset)"),
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// POSTs a JSON body to `{base}/{path}`, true on 2xx.
    async fn post_json(&self, path: &str, body: serde_json::Value) -> bool {
        let Some(base) = self.base_url.as_deref() else {
            log::warn!("Ledger append to /{} skipped: gateway disabled", path);
            return false;
        };

        let url = format!("{}/{}", base, path);
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log::error!("Ledger append to {} failed: HTTP {}", url, response.status());
                false
            }
            Err(e) => {
                log::error!("Ledger append to {} failed: {}", url, e);
                false
            }
        }
    }
}

#[async_trait]
impl LedgerStore for LedgerGateway {
    async fn append_expense(&self, entry: &ExpenseEntry) -> bool {
        self.post_json(
            "expenses",
            serde_json::to_value(entry).unwrap_or_else(|_| json!({})),
        )
        .await
    }

    async fn append_agent(&self, name: &str, ic: &str) -> bool {
        self.post_json("agents", json!({ "name": name, "ic": ic })).await
    }

    async fn append_supplier(&self, name: &str, category: &str) -> bool {
        self.post_json("suppliers", json!({ "name": name, "category": category }))
            .await
    }

    async fn append_person(&self, name: &str) -> bool {
        self.post_json("persons", json!({ "name": name })).await
    }

    async fn monthly_totals(&self, year: i32, month: u32) -> Option<MonthlyTotals> {
        let base = self.base_url.as_deref()?;
        let url = format!("{}/reports/{}-{:02}", base, year, month);

        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                log::error!("Ledger report query {} failed: HTTP {}", url, r.status());
                return None;
            }
            Err(e) => {
                log::error!("Ledger report query {} failed: {}", url, e);
                return None;
            }
        };

        let body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                log::error!("Ledger report query {} returned invalid JSON: {}", url, e);
                return None;
            }
        };

        Some(MonthlyTotals {
            total_sales: body.get("total_sales").and_then(|v| v.as_f64()).unwrap_or(0.0),
            total_expenses: body.get("total_expenses").and_then(|v| v.as_f64()).unwrap_or(0.0),
        })
    }

    fn is_available(&self) -> bool {
        self.base_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_gateway_reports_failure_without_network() {
        let gateway = LedgerGateway::with_base_url(None);
        assert!(!gateway.is_available());
        assert!(!gateway.append_agent("Acme", "IC123").await);
        assert!(!gateway.append_person("Jo").await);
        assert!(gateway.monthly_totals(2026, 8).await.is_none());
    }

    #[test]
    fn net_profit_is_sales_minus_expenses() {
        let totals = MonthlyTotals {
            total_sales: 1200.0,
            total_expenses: 450.5,
        };
        assert!((totals.net_profit() - 749.5).abs() < f64::EPSILON);
    }
}
