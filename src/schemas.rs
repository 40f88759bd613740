use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

pub type OwnerId = String;
pub type ExpenseId = String;
pub type Participant = String;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ExpenseId>,
    pub owner_id: OwnerId,
    pub date: String,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub note: String,
}

impl Expense {
    pub fn apply(&mut self, patch: &ExpensePatch) {
        if let Some(date) = &patch.date {
            self.date = date.clone();
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(note) = &patch.note {
            self.note = note.clone();
        }
    }
}

/// Expense as submitted by the form, before an owner and id are attached.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NewExpense {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub category: String,
    #[serde(deserialize_with = "amount_from_input")]
    pub amount: f64,
    #[serde(default)]
    pub note: String,
}

impl NewExpense {
    pub fn validate(&self, categories: &[Category]) -> Result<(), ValidationError> {
        if self.date.is_empty() {
            return Err(ValidationError::MissingDate);
        }
        validate_date(&self.date)?;
        if self.category.is_empty() {
            return Err(ValidationError::MissingCategory);
        }
        validate_category(&self.category, categories)?;
        validate_amount(self.amount)
    }

    pub fn into_expense(self, owner_id: OwnerId, id: Option<ExpenseId>) -> Expense {
        Expense {
            id,
            owner_id,
            date: self.date,
            category: self.category,
            amount: self.amount,
            note: self.note,
        }
    }
}

/// Partial edit of an expense; absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ExpensePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_amount_from_input",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ExpensePatch {
    pub fn validate(&self, categories: &[Category]) -> Result<(), ValidationError> {
        if let Some(date) = &self.date {
            validate_date(date)?;
        }
        if let Some(category) = &self.category {
            validate_category(category, categories)?;
        }
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        Ok(())
    }
}

pub fn validate_date(date: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidDate(date.to_owned()))
}

fn validate_category(name: &str, categories: &[Category]) -> Result<(), ValidationError> {
    if categories.iter().any(|category| category.name == name) {
        Ok(())
    } else {
        Err(ValidationError::UnknownCategory(name.to_owned()))
    }
}

pub fn validate_amount(amount: f64) -> Result<(), ValidationError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount)
    }
}

// Form fields arrive either as numbers or as the raw text of a number input.
#[derive(Deserialize)]
#[serde(untagged)]
enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    fn into_amount<E: de::Error>(self) -> Result<f64, E> {
        match self {
            AmountInput::Number(amount) => Ok(amount),
            AmountInput::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("invalid amount {text:?}"))),
        }
    }
}

fn amount_from_input<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    AmountInput::deserialize(deserializer)?.into_amount()
}

fn optional_amount_from_input<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<AmountInput>::deserialize(deserializer)?
        .map(AmountInput::into_amount)
        .transpose()
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Category {
    pub id: u8,
    pub name: String,
}

pub fn default_categories() -> Vec<Category> {
    [
        "Supplements",
        "Shopping",
        "Dining/Bars",
        "Bills and Utilities",
        "Transportation",
    ]
    .into_iter()
    .zip(1..)
    .map(|(name, id)| Category {
        id,
        name: name.to_owned(),
    })
    .collect()
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitExpense {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub paid_by: Participant,
    #[serde(default)]
    pub split_between: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_accepts_numeric_text() {
        let expense: NewExpense = serde_json::from_str(
            r#"{"date":"2023-05-01","category":"Shopping","amount":"12.50","note":"socks"}"#,
        )
        .unwrap();
        assert_eq!(expense.amount, 12.5);

        let patch: ExpensePatch = serde_json::from_str(r#"{"amount":"7"}"#).unwrap();
        assert_eq!(patch.amount, Some(7.0));
        assert!(serde_json::from_str::<NewExpense>(r#"{"amount":"seven"}"#).is_err());
    }

    #[test]
    fn validation_refuses_incomplete_forms() {
        let categories = default_categories();
        let mut expense = NewExpense {
            date: "2023-05-01".into(),
            category: "Shopping".into(),
            amount: 10.0,
            note: String::new(),
        };
        assert_eq!(expense.validate(&categories), Ok(()));

        expense.category = "Rent".into();
        assert_eq!(
            expense.validate(&categories),
            Err(ValidationError::UnknownCategory("Rent".into()))
        );

        expense.category = "Shopping".into();
        expense.date = "05/01/2023".into();
        assert!(matches!(
            expense.validate(&categories),
            Err(ValidationError::InvalidDate(_))
        ));

        expense.date = "2023-05-01".into();
        expense.amount = -1.0;
        assert_eq!(expense.validate(&categories), Err(ValidationError::InvalidAmount));
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut expense = NewExpense {
            date: "2023-05-01".into(),
            category: "Shopping".into(),
            amount: 50.0,
            note: "Groceries".into(),
        }
        .into_expense("user".into(), Some("1".into()));
        expense.apply(&ExpensePatch {
            amount: Some(55.0),
            ..Default::default()
        });
        assert_eq!(expense.amount, 55.0);
        assert_eq!(expense.note, "Groceries");
    }

    #[test]
    fn categories_are_numbered_from_one() {
        let categories = default_categories();
        assert_eq!(categories.len(), 5);
        assert_eq!(categories[0].id, 1);
        assert_eq!(categories[4].name, "Transportation");
    }
}
