//! Aggregate state store.
//!
//! A single reducer-driven container for the in-process view of accounts,
//! transactions and categories, plus the derived figures the UI reads
//! (total balance, current-month income and expense). The action set is
//! closed; nothing outside this module writes the state directly, and the
//! reducer itself performs no I/O.

use chrono::{DateTime, Datelike, Utc};
use std::sync::RwLock;

use crate::entities::{
    Account, AccountPatch, Category, CategoryPatch, EntityId, Transaction, TransactionKind,
    TransactionPatch,
};

/// The canonical in-memory state.
///
/// `is_loading` starts true so a fresh session renders a loading view until
/// the first snapshot (or an empty one) arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct FinanceState {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub categories: Vec<Category>,
    pub total_balance: f64,
    pub monthly_income: f64,
    pub monthly_expense: f64,
    pub is_loading: bool,
}

impl Default for FinanceState {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            transactions: Vec::new(),
            categories: Vec::new(),
            total_balance: 0.0,
            monthly_income: 0.0,
            monthly_expense: 0.0,
            is_loading: true,
        }
    }
}

/// The closed set of mutations the store accepts.
///
/// Update variants on an id that is not present are a no-op, not an error:
/// an optimistic update can legitimately race ahead of the snapshot that
/// would have created its target.
#[derive(Debug, Clone)]
pub enum Action {
    SetLoading(bool),

    SetAccounts(Vec<Account>),
    AddAccount(Account),
    UpdateAccount { id: EntityId, patch: AccountPatch },
    DeleteAccount(EntityId),

    SetTransactions(Vec<Transaction>),
    AddTransaction(Transaction),
    UpdateTransaction { id: EntityId, patch: TransactionPatch },
    DeleteTransaction(EntityId),

    SetCategories(Vec<Category>),
    AddCategory(Category),
    UpdateCategory { id: EntityId, patch: CategoryPatch },
    DeleteCategory(EntityId),
}

/// Applies one action and recomputes the derived aggregates.
///
/// `now` anchors the "current month" window for the monthly totals; it is a
/// parameter so the fold stays pure and testable at a fixed instant.
pub fn reduce(state: &mut FinanceState, action: Action, now: DateTime<Utc>) {
    match action {
        Action::SetLoading(flag) => state.is_loading = flag,

        Action::SetAccounts(list) => state.accounts = list,
        Action::AddAccount(account) => state.accounts.push(account),
        Action::UpdateAccount { id, patch } => {
            let swapped_id = patch.id.clone().filter(|new_id| *new_id != id);
            if let Some(account) = state.accounts.iter_mut().find(|a| a.id == id) {
                patch.apply_to(account);
                // An id swap re-points transactions logged against the old
                // id, so every transaction keeps referencing an existing
                // account.
                if let Some(new_id) = swapped_id {
                    for trx in state.transactions.iter_mut().filter(|t| t.account_id == id) {
                        trx.account_id = new_id.clone();
                    }
                }
            }
        }
        Action::DeleteAccount(id) => state.accounts.retain(|a| a.id != id),

        Action::SetTransactions(list) => state.transactions = list,
        Action::AddTransaction(trx) => state.transactions.push(trx),
        Action::UpdateTransaction { id, patch } => {
            if let Some(trx) = state.transactions.iter_mut().find(|t| t.id == id) {
                patch.apply_to(trx);
            }
        }
        Action::DeleteTransaction(id) => state.transactions.retain(|t| t.id != id),

        Action::SetCategories(list) => state.categories = list,
        Action::AddCategory(category) => state.categories.push(category),
        Action::UpdateCategory { id, patch } => {
            if let Some(category) = state.categories.iter_mut().find(|c| c.id == id) {
                patch.apply_to(category);
            }
        }
        Action::DeleteCategory(id) => state.categories.retain(|c| c.id != id),
    }

    recompute_aggregates(state, now);
}

fn recompute_aggregates(state: &mut FinanceState, now: DateTime<Utc>) {
    state.total_balance = state.accounts.iter().map(|a| a.balance).sum();

    let this_month = |date: &DateTime<Utc>| date.year() == now.year() && date.month() == now.month();
    state.monthly_income = state
        .transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Income && this_month(&t.date))
        .map(|t| t.amount)
        .sum();
    state.monthly_expense = state
        .transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Expense && this_month(&t.date))
        .map(|t| t.amount)
        .sum();
}

/// Thread-safe handle around [`FinanceState`]. All writes go through
/// [`dispatch`](Self::dispatch); readers take cloned snapshots.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<FinanceState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a single action.
    pub fn dispatch(&self, action: Action) {
        self.dispatch_all([action]);
    }

    /// Applies several actions under one lock acquisition, so a reader can
    /// never observe a point between them. Transaction mutations rely on
    /// this to keep the transaction list and its account balance in step.
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) {
        let now = Utc::now();
        let mut state = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for action in actions {
            reduce(&mut state, action, now);
        }
    }

    /// A point-in-time copy of the whole state.
    pub fn snapshot(&self) -> FinanceState {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Drops everything back to the initial state (collections empty,
    /// loading true). Used on sign-out.
    pub fn reset(&self) {
        let mut state = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = FinanceState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::AccountKind;
    use chrono::TimeZone;

    fn account(id: &str, balance: f64) -> Account {
        Account {
            id: EntityId::Local(id.into()),
            user_id: "u1".into(),
            name: id.to_string(),
            kind: AccountKind::Checking,
            balance,
            currency: "USD".into(),
            created_at: Utc::now(),
        }
    }

    fn transaction(id: &str, kind: TransactionKind, amount: f64, date: DateTime<Utc>) -> Transaction {
        Transaction {
            id: EntityId::Local(id.into()),
            account_id: EntityId::Local("a1".into()),
            user_id: "u1".into(),
            amount,
            kind,
            category: "Comida".into(),
            description: String::new(),
            date,
        }
    }

    #[test]
    fn total_balance_is_the_sum_of_account_balances() {
        let now = Utc::now();
        let mut state = FinanceState::default();
        reduce(&mut state, Action::AddAccount(account("a1", 100.0)), now);
        reduce(&mut state, Action::AddAccount(account("a2", -25.5)), now);
        assert_eq!(state.total_balance, 74.5);

        reduce(
            &mut state,
            Action::DeleteAccount(EntityId::Local("a2".into())),
            now,
        );
        assert_eq!(state.total_balance, 100.0);
    }

    #[test]
    fn monthly_totals_only_count_the_current_calendar_month() {
        let now = Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap();
        let in_month = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2026, 7, 31, 23, 59, 0).unwrap();
        let last_year = Utc.with_ymd_and_hms(2025, 8, 15, 12, 0, 0).unwrap();

        let mut state = FinanceState::default();
        let trxs = vec![
            transaction("t1", TransactionKind::Income, 1000.0, in_month),
            transaction("t2", TransactionKind::Expense, 40.0, in_month),
            transaction("t3", TransactionKind::Income, 500.0, last_month),
            transaction("t4", TransactionKind::Expense, 90.0, last_year),
        ];
        reduce(&mut state, Action::SetTransactions(trxs), now);

        assert_eq!(state.monthly_income, 1000.0);
        assert_eq!(state.monthly_expense, 40.0);
    }

    #[test]
    fn update_on_missing_id_is_a_no_op() {
        let now = Utc::now();
        let mut state = FinanceState::default();
        reduce(&mut state, Action::AddAccount(account("a1", 10.0)), now);
        let before = state.clone();

        reduce(
            &mut state,
            Action::UpdateAccount {
                id: EntityId::Local("ghost".into()),
                patch: AccountPatch::balance(999.0),
            },
            now,
        );
        assert_eq!(state, before);
    }

    #[test]
    fn account_id_swap_repoints_its_transactions() {
        let now = Utc::now();
        let mut state = FinanceState::default();
        reduce(&mut state, Action::AddAccount(account("a1", 10.0)), now);
        reduce(
            &mut state,
            Action::AddTransaction(transaction("t1", TransactionKind::Expense, 3.0, now)),
            now,
        );

        let server_id = EntityId::from_remote("acc9");
        reduce(
            &mut state,
            Action::UpdateAccount {
                id: EntityId::Local("a1".into()),
                patch: AccountPatch::reconcile(server_id.clone()),
            },
            now,
        );

        assert_eq!(state.accounts[0].id, server_id);
        assert_eq!(state.transactions[0].account_id, server_id);
    }

    #[test]
    fn snapshot_replace_is_idempotent() {
        let now = Utc::now();
        let list = vec![account("a1", 10.0), account("a2", 20.0)];

        let mut state = FinanceState::default();
        reduce(&mut state, Action::SetAccounts(list.clone()), now);
        let once = state.clone();
        reduce(&mut state, Action::SetAccounts(list), now);
        assert_eq!(state, once);
    }

    #[test]
    fn dispatch_all_applies_atomically() {
        let store = StateStore::new();
        store.dispatch(Action::AddAccount(account("a1", 100.0)));

        let trx = transaction("t1", TransactionKind::Expense, 30.0, Utc::now());
        store.dispatch_all([
            Action::AddTransaction(trx),
            Action::UpdateAccount {
                id: EntityId::Local("a1".into()),
                patch: AccountPatch::balance(70.0),
            },
        ]);

        let state = store.snapshot();
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.accounts[0].balance, 70.0);
        assert_eq!(state.total_balance, 70.0);
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let store = StateStore::new();
        store.dispatch(Action::SetLoading(false));
        store.dispatch(Action::AddAccount(account("a1", 5.0)));

        store.reset();
        assert_eq!(store.snapshot(), FinanceState::default());
    }
}
