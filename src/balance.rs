use serde::Serialize;

use crate::schemas::{Participant, SplitExpense};

/// Largest amount a single split expense may carry.
pub const MAX_SPLIT_AMOUNT: f64 = 100_000_000_000.0;

/// Net position of every participant, in participant order.
///
/// Names referenced by the ledger but missing from the participant list are
/// appended after the participants, in the order they are first seen.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Balances(Vec<(Participant, f64)>);

impl Balances {
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(participant, _)| participant == name)
            .map(|(_, balance)| *balance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, balance)| (name.as_str(), *balance))
    }
}

/// Participants and shared expenses of one splitter session.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    participants: Vec<Participant>,
    expenses: Vec<SplitExpense>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn expenses(&self) -> &[SplitExpense] {
        &self.expenses
    }

    /// Returns false when the name is empty or already taken.
    pub fn add_participant(&mut self, name: &str) -> bool {
        if name.is_empty() || self.is_participant(name) {
            return false;
        }
        self.participants.push(name.to_owned());
        true
    }

    /// Appends the expense if it is complete and only names known participants.
    /// The amount must be at least one cent and at most [`MAX_SPLIT_AMOUNT`].
    /// Anything else leaves the ledger untouched.
    pub fn add_split_expense(&mut self, mut expense: SplitExpense) -> bool {
        let mut members: Vec<Participant> = Vec::with_capacity(expense.split_between.len());
        for member in expense.split_between.drain(..) {
            if !members.contains(&member) {
                members.push(member);
            }
        }
        expense.split_between = members;

        let complete = !expense.description.is_empty()
            && to_cents(expense.amount).map_or(false, |cents| cents > 0)
            && !expense.paid_by.is_empty()
            && !expense.split_between.is_empty();
        let known = self.is_participant(&expense.paid_by)
            && expense
                .split_between
                .iter()
                .all(|member| self.is_participant(member));
        if !(complete && known) {
            tracing::debug!(description = %expense.description, "ignoring split expense");
            return false;
        }
        self.expenses.push(expense);
        true
    }

    /// Recomputes every balance from the full ledger.
    ///
    /// Work is done in whole cents. When an amount does not divide evenly,
    /// the leftover cents are charged one each to the first members of
    /// `split_between`, so the balances always add up to zero.
    pub fn compute_balances(&self) -> Balances {
        let mut cents: Vec<(Participant, i128)> = self
            .participants
            .iter()
            .map(|participant| (participant.clone(), 0))
            .collect();

        for expense in &self.expenses {
            let Some(amount) = to_cents(expense.amount).map(i128::from) else {
                continue;
            };
            let receivers = expense.split_between.len() as i128;
            if receivers == 0 {
                continue;
            }
            *balance_entry(&mut cents, &expense.paid_by) += amount;

            let amount_per_receiver = amount / receivers;
            let remainder = amount % receivers;
            for (index, receiver) in expense.split_between.iter().enumerate() {
                let extra = i128::from((index as i128) < remainder);
                *balance_entry(&mut cents, receiver) -= amount_per_receiver + extra;
            }
        }

        Balances(
            cents
                .into_iter()
                .map(|(participant, cents)| (participant, cents as f64 / 100.0))
                .collect(),
        )
    }

    fn is_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|participant| participant == name)
    }
}

/// Whole cents in `amount`, or `None` when it is not a finite amount within
/// [`MAX_SPLIT_AMOUNT`] in either direction.
fn to_cents(amount: f64) -> Option<i64> {
    if !amount.is_finite() || amount.abs() > MAX_SPLIT_AMOUNT {
        return None;
    }
    Some((amount * 100.0).round() as i64)
}

fn balance_entry<'a>(cents: &'a mut Vec<(Participant, i128)>, name: &str) -> &'a mut i128 {
    let index = match cents.iter().position(|(participant, _)| participant == name) {
        Some(index) => index,
        None => {
            cents.push((name.to_owned(), 0));
            cents.len() - 1
        }
    };
    &mut cents[index].1
}
