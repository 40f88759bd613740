use async_trait::async_trait;
use bson::oid::ObjectId;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::schemas::{Expense, ExpenseId, ExpensePatch};

pub const DEMO_OWNER: &str = "testUser";

/// Session-local expense collection used by demo sessions. Nothing survives
/// the session.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    records: RwLock<Vec<Expense>>,
}

impl MemoryDataSource {
    pub fn with_records(records: Vec<Expense>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Collection seeded with the demo account's sample expenses.
    pub fn demo() -> Self {
        let sample = [
            ("1", "2023-05-01", "Shopping", 50.0, "Groceries"),
            ("2", "2023-05-02", "Dining/Bars", 30.0, "Lunch"),
            ("3", "2023-05-03", "Transportation", 20.0, "Bus fare"),
        ];
        Self::with_records(
            sample
                .into_iter()
                .map(|(id, date, category, amount, note)| Expense {
                    id: Some(id.to_owned()),
                    owner_id: DEMO_OWNER.to_owned(),
                    date: date.to_owned(),
                    category: category.to_owned(),
                    amount,
                    note: note.to_owned(),
                })
                .collect(),
        )
    }
}

fn is_record(expense: &Expense, owner_id: &str, id: &str) -> bool {
    expense.owner_id == owner_id && expense.id.as_deref() == Some(id)
}

#[async_trait]
impl crate::store::DataSource for MemoryDataSource {
    async fn query_by_owner(&self, owner_id: &str) -> Result<Vec<Expense>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|expense| expense.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create(&self, mut expense: Expense) -> Result<ExpenseId, StoreError> {
        let id = ObjectId::new().to_hex();
        expense.id = Some(id.clone());
        self.records.write().await.push(expense);
        Ok(id)
    }

    async fn update(&self, owner_id: &str, id: &str, patch: &ExpensePatch) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let expense = records
            .iter_mut()
            .find(|expense| is_record(expense, owner_id, id))
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        expense.apply(patch);
        Ok(())
    }

    async fn delete(&self, owner_id: &str, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|expense| !is_record(expense, owner_id, id));
        if records.len() == before {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}
