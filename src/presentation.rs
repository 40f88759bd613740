use serde::Serialize;

use crate::aggregate::{chart_data, summarize, ChartData};
use crate::balance::{Balances, Ledger};
use crate::schemas::{Category, Expense, Participant, SplitExpense};

pub fn format_amount(amount: f64) -> String {
    format!("€{amount:.2}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    ToReceive,
    ToPay,
    Settled,
}

impl BalanceStatus {
    pub fn of(balance: f64) -> Self {
        if balance > 0.0 {
            BalanceStatus::ToReceive
        } else if balance < 0.0 {
            BalanceStatus::ToPay
        } else {
            BalanceStatus::Settled
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BalanceStatus::ToReceive => "to receive",
            BalanceStatus::ToPay => "to pay",
            BalanceStatus::Settled => "settled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BalanceView {
    pub name: Participant,
    pub balance: f64,
    pub status: BalanceStatus,
    pub display: String,
}

pub fn balance_views(balances: &Balances) -> Vec<BalanceView> {
    balances
        .iter()
        .map(|(name, balance)| {
            let status = BalanceStatus::of(balance);
            BalanceView {
                name: name.to_owned(),
                balance,
                status,
                display: format!("{name}: {} ({})", format_amount(balance), status.label()),
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// Toast shown once to the user and never read back.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRow {
    #[serde(flatten)]
    pub expense: Expense,
    pub display_amount: String,
}

pub fn expense_rows(expenses: &[Expense]) -> Vec<ExpenseRow> {
    expenses
        .iter()
        .map(|expense| ExpenseRow {
            expense: expense.clone(),
            display_amount: format_amount(expense.amount),
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitterView {
    pub participants: Vec<Participant>,
    pub expenses: Vec<SplitExpense>,
    pub balances: Vec<BalanceView>,
}

impl SplitterView {
    pub fn of(ledger: &Ledger) -> Self {
        Self {
            participants: ledger.participants().to_vec(),
            expenses: ledger.expenses().to_vec(),
            balances: balance_views(&ledger.compute_balances()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub total: f64,
    pub display_total: String,
    pub chart: ChartData,
}

impl SummaryView {
    pub fn of(expenses: &[Expense], categories: &[Category]) -> Self {
        let summary = summarize(expenses, categories);
        Self {
            total: summary.total,
            display_total: format_amount(summary.total),
            chart: chart_data(&summary),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub summary: SummaryView,
    pub categories: Vec<Category>,
    pub expenses: Vec<ExpenseRow>,
    pub splitter: SplitterView,
}

/// Response body of a successful write: the refreshed listing plus a toast.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<T>,
    pub expenses: Vec<ExpenseRow>,
    pub notice: Notice,
}

pub const LOGIN_PAGE: &str = r#"<!doctype html>
<html>
  <head><title>Monthly Expense Manager</title></head>
  <body>
    <h1>Monthly Expense Manager</h1>
    <p>Sign in with your account to continue.</p>
    <form method="post" action="/login/demo">
      <button type="submit">Try the demo</button>
    </form>
  </body>
</html>
"#;
