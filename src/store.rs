use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schemas::{Category, Expense, ExpenseId, ExpensePatch, NewExpense, OwnerId};

/// Backing collection of expense records.
///
/// Chosen once when a session starts: the remote document store for signed-in
/// users, an in-memory collection for demo sessions.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn query_by_owner(&self, owner_id: &str) -> Result<Vec<Expense>, StoreError>;
    async fn create(&self, expense: Expense) -> Result<ExpenseId, StoreError>;
    async fn update(&self, owner_id: &str, id: &str, patch: &ExpensePatch) -> Result<(), StoreError>;
    async fn delete(&self, owner_id: &str, id: &str) -> Result<(), StoreError>;
}

/// One owner's expenses, with the last listing kept for rendering.
pub struct ExpenseStore {
    source: Arc<dyn DataSource>,
    owner_id: OwnerId,
    categories: Vec<Category>,
    expenses: Vec<Expense>,
}

impl ExpenseStore {
    pub fn new(source: Arc<dyn DataSource>, owner_id: OwnerId, categories: Vec<Category>) -> Self {
        Self {
            source,
            owner_id,
            categories,
            expenses: Vec::new(),
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Result of the last successful listing.
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub async fn list(&mut self) -> Result<&[Expense], StoreError> {
        self.expenses = self.source.query_by_owner(&self.owner_id).await?;
        Ok(&self.expenses)
    }

    pub async fn add(&mut self, expense: NewExpense) -> Result<Expense, StoreError> {
        expense.validate(&self.categories)?;
        let record = expense.into_expense(self.owner_id.clone(), None);
        let id = self.source.create(record.clone()).await?;
        tracing::info!(owner = %self.owner_id, %id, "expense added");
        self.refresh().await;
        Ok(Expense {
            id: Some(id),
            ..record
        })
    }

    pub async fn update(&mut self, id: &str, patch: ExpensePatch) -> Result<(), StoreError> {
        patch.validate(&self.categories)?;
        self.source.update(&self.owner_id, id, &patch).await?;
        tracing::info!(owner = %self.owner_id, %id, "expense updated");
        self.refresh().await;
        Ok(())
    }

    pub async fn remove(&mut self, id: &str) -> Result<(), StoreError> {
        self.source.delete(&self.owner_id, id).await?;
        tracing::info!(owner = %self.owner_id, %id, "expense removed");
        self.refresh().await;
        Ok(())
    }

    // The write already went through; a failed refresh only leaves the
    // previous listing in place until the next read.
    async fn refresh(&mut self) {
        match self.source.query_by_owner(&self.owner_id).await {
            Ok(expenses) => self.expenses = expenses,
            Err(err) => tracing::warn!(owner = %self.owner_id, %err, "refresh after write failed"),
        }
    }
}
