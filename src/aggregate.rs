use serde::Serialize;

use crate::schemas::{Category, Expense};

pub const CHART_PALETTE: [&str; 6] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40",
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: f64,
    pub by_category: Vec<CategoryTotal>,
}

/// Total spend and one subtotal per known category, in category order.
/// Expenses filed under an unknown category count toward the total only.
pub fn summarize(expenses: &[Expense], categories: &[Category]) -> Summary {
    let total = expenses.iter().map(|expense| expense.amount).sum();
    let by_category = categories
        .iter()
        .map(|category| CategoryTotal {
            category: category.name.clone(),
            amount: expenses
                .iter()
                .filter(|expense| expense.category == category.name)
                .map(|expense| expense.amount)
                .sum(),
        })
        .collect();
    Summary { total, by_category }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub data: Vec<f64>,
    pub background_color: Vec<&'static str>,
}

/// Pie chart input: one slice per category.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

pub fn chart_data(summary: &Summary) -> ChartData {
    ChartData {
        labels: summary
            .by_category
            .iter()
            .map(|item| item.category.clone())
            .collect(),
        datasets: vec![ChartDataset {
            data: summary.by_category.iter().map(|item| item.amount).collect(),
            background_color: CHART_PALETTE.to_vec(),
        }],
    }
}
