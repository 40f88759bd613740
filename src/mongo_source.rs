use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Client, Collection,
};
use serde::Deserialize;

use crate::error::StoreError;
use crate::schemas::{validate_amount, validate_date, Expense, ExpenseId, ExpensePatch};

const COLLECTION: &str = "expenses";

/// Expense documents in the remote `expenses` collection.
pub struct MongoDataSource {
    collection: Collection<Document>,
}

impl MongoDataSource {
    pub fn new(client: &Client, database: &str) -> Self {
        Self {
            collection: client.database(database).collection(COLLECTION),
        }
    }
}

// Shape every stored document must have.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseRecord {
    #[serde(rename = "_id")]
    id: ObjectId,
    owner_id: String,
    date: String,
    category: String,
    amount: f64,
    #[serde(default)]
    note: String,
}

pub(crate) fn decode_expense(document: Document) -> Result<Expense, StoreError> {
    let label = document
        .get_object_id("_id")
        .map(|id| id.to_hex())
        .unwrap_or_else(|_| "<missing id>".to_owned());
    let malformed = |reason: String| StoreError::Decode {
        id: label.clone(),
        reason,
    };

    let record: ExpenseRecord =
        bson::from_document(document).map_err(|err| malformed(err.to_string()))?;
    validate_date(&record.date).map_err(|err| malformed(err.to_string()))?;
    validate_amount(record.amount).map_err(|err| malformed(err.to_string()))?;

    Ok(Expense {
        id: Some(record.id.to_hex()),
        owner_id: record.owner_id,
        date: record.date,
        category: record.category,
        amount: record.amount,
        note: record.note,
    })
}

fn encode_expense(expense: &Expense) -> Document {
    doc! {
        "ownerId": expense.owner_id.as_str(),
        "date": expense.date.as_str(),
        "category": expense.category.as_str(),
        "amount": expense.amount,
        "note": expense.note.as_str(),
    }
}

fn encode_patch(patch: &ExpensePatch) -> Document {
    let mut fields = Document::new();
    if let Some(date) = &patch.date {
        fields.insert("date", date.as_str());
    }
    if let Some(category) = &patch.category {
        fields.insert("category", category.as_str());
    }
    if let Some(amount) = patch.amount {
        fields.insert("amount", amount);
    }
    if let Some(note) = &patch.note {
        fields.insert("note", note.as_str());
    }
    fields
}

// Ids that are not object ids cannot match any stored document.
fn record_filter(owner_id: &str, id: &str) -> Result<Document, StoreError> {
    let oid = ObjectId::parse_str(id).map_err(|_| StoreError::NotFound(id.to_owned()))?;
    Ok(doc! { "_id": oid, "ownerId": owner_id })
}

#[async_trait]
impl crate::store::DataSource for MongoDataSource {
    async fn query_by_owner(&self, owner_id: &str) -> Result<Vec<Expense>, StoreError> {
        let documents: Vec<Document> = self
            .collection
            .find(doc! { "ownerId": owner_id }, None)
            .await?
            .try_collect()
            .await?;
        documents.into_iter().map(decode_expense).collect()
    }

    async fn create(&self, expense: Expense) -> Result<ExpenseId, StoreError> {
        let inserted = self
            .collection
            .insert_one(encode_expense(&expense), None)
            .await?;
        inserted
            .inserted_id
            .as_object_id()
            .map(|id| id.to_hex())
            .ok_or_else(|| StoreError::Unavailable("insert returned no object id".to_owned()))
    }

    async fn update(&self, owner_id: &str, id: &str, patch: &ExpensePatch) -> Result<(), StoreError> {
        let filter = record_filter(owner_id, id)?;
        let fields = encode_patch(patch);
        let matched = if fields.is_empty() {
            self.collection.count_documents(filter, None).await?
        } else {
            self.collection
                .update_one(filter, doc! { "$set": fields }, None)
                .await?
                .matched_count
        };
        if matched == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    async fn delete(&self, owner_id: &str, id: &str) -> Result<(), StoreError> {
        let filter = record_filter(owner_id, id)?;
        let deleted = self.collection.delete_one(filter, None).await?.deleted_count;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}
