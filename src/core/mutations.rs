//! Optimistic mutation pipeline.
//!
//! Every user-facing mutation lands in three steps: dispatch to the state
//! store immediately, replace the affected cache entries immediately, then
//! commit remotely in a background task. A successful create swaps the
//! temporary id for the server id; a failed commit is logged and the
//! optimistic state stays in place until the next live snapshot reconciles
//! it. There is no retry and no rollback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::core::state::{Action, StateStore};
use crate::entities::{
    Account, AccountKind, AccountPatch, Category, CategoryPatch, Collection, EntityId,
    Transaction, TransactionKind, TransactionPatch,
};
use crate::sync::SyncAdapter;

/// The mutation surface handed to the UI for one signed-in user.
///
/// Methods return as soon as the in-memory state and cache reflect the
/// change; remote durability happens in spawned tasks. After
/// [`deactivate`](Self::deactivate) both the methods and any still-pending
/// reconciliation callbacks become no-ops.
pub struct FinanceService {
    user_id: String,
    store: Arc<StateStore>,
    sync: Arc<SyncAdapter>,
    cache: Arc<LocalCache>,
    active: Arc<AtomicBool>,
}

impl FinanceService {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<StateStore>,
        sync: Arc<SyncAdapter>,
        cache: Arc<LocalCache>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            sync,
            cache,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stops the service writing state: live methods become no-ops and
    /// in-flight commit callbacks skip their reconciliation dispatch.
    /// Idempotent; called on sign-out.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Creates an account with a temporary id; the id is swapped for the
    /// server-assigned one once the background create resolves.
    pub fn add_account(
        &self,
        name: impl Into<String>,
        kind: AccountKind,
        balance: f64,
        currency: impl Into<String>,
    ) -> EntityId {
        let account = Account {
            id: EntityId::mint_local(),
            user_id: self.user_id.clone(),
            name: name.into(),
            kind,
            balance,
            currency: currency.into(),
            created_at: Utc::now(),
        };
        let temp_id = account.id.clone();
        if !self.is_active() {
            warn!("add_account ignored, service deactivated");
            return temp_id;
        }

        self.store.dispatch(Action::AddAccount(account.clone()));
        self.persist(Collection::Accounts);

        let (store, sync, cache) = self.commit_handles();
        let user_id = self.user_id.clone();
        let active = Arc::clone(&self.active);
        let id = temp_id.clone();
        tokio::spawn(async move {
            match sync.save_account(&account).await {
                Ok(server_id) if active.load(Ordering::SeqCst) => {
                    store.dispatch(Action::UpdateAccount {
                        id,
                        patch: AccountPatch::reconcile(server_id.clone()),
                    });
                    persist_collection(&store, &cache, &user_id, Collection::Accounts);
                    // Balance pushes are skipped while the create is still
                    // pending; if one landed in the meantime the document
                    // written above is already stale.
                    let current = store
                        .snapshot()
                        .accounts
                        .into_iter()
                        .find(|a| a.id == server_id);
                    if let Some(current) = current {
                        if current.balance != account.balance {
                            if let Err(err) = sync.save_account(&current).await {
                                warn!(%err, "post-reconcile account push failed");
                            }
                        }
                    }
                }
                Ok(_) => debug!("account create resolved after teardown"),
                Err(err) => warn!(%err, "background account create failed"),
            }
        });
        temp_id
    }

    /// Shallow-merges a patch into an account and pushes the full document
    /// remotely in the background.
    pub fn update_account(&self, id: EntityId, patch: AccountPatch) {
        if !self.is_active() {
            warn!("update_account ignored, service deactivated");
            return;
        }
        self.store.dispatch(Action::UpdateAccount {
            id: id.clone(),
            patch,
        });
        self.persist(Collection::Accounts);
        self.push_account(id);
    }

    /// Deletes an account and every transaction that references it, both
    /// locally (one atomic dispatch) and remotely (one atomic batch).
    pub fn delete_account(&self, id: EntityId) {
        if !self.is_active() {
            warn!("delete_account ignored, service deactivated");
            return;
        }
        let orphaned: Vec<EntityId> = self
            .store
            .snapshot()
            .transactions
            .iter()
            .filter(|t| t.account_id == id)
            .map(|t| t.id.clone())
            .collect();

        let mut actions = vec![Action::DeleteAccount(id.clone())];
        actions.extend(orphaned.into_iter().map(Action::DeleteTransaction));
        self.store.dispatch_all(actions);
        self.persist(Collection::Accounts);
        self.persist(Collection::Transactions);

        let sync = Arc::clone(&self.sync);
        let user_id = self.user_id.clone();
        tokio::spawn(async move {
            if let Err(err) = sync.delete_account_cascade(&user_id, &id).await {
                warn!(%err, "background cascade delete failed");
            }
        });
    }

    /// Logs a transaction and applies its balance side effect to the owning
    /// account in the same dispatch, so no reader ever sees one without the
    /// other.
    pub fn add_transaction(
        &self,
        account_id: EntityId,
        amount: f64,
        kind: TransactionKind,
        category: impl Into<String>,
        description: impl Into<String>,
        date: DateTime<Utc>,
    ) -> EntityId {
        let trx = Transaction {
            id: EntityId::mint_local(),
            account_id: account_id.clone(),
            user_id: self.user_id.clone(),
            amount,
            kind,
            category: category.into(),
            description: description.into(),
            date,
        };
        let temp_id = trx.id.clone();
        if !self.is_active() {
            warn!("add_transaction ignored, service deactivated");
            return temp_id;
        }

        let mut actions = vec![Action::AddTransaction(trx.clone())];
        if let Some(balance) = self.account_balance(&account_id) {
            actions.push(Action::UpdateAccount {
                id: account_id.clone(),
                patch: AccountPatch::balance(balance + kind.signed(amount)),
            });
        }
        self.store.dispatch_all(actions);
        self.persist(Collection::Transactions);
        self.persist(Collection::Accounts);

        let (store, sync, cache) = self.commit_handles();
        let user_id = self.user_id.clone();
        let active = Arc::clone(&self.active);
        let id = temp_id.clone();
        tokio::spawn(async move {
            // Re-read at commit time: the account reference may have been
            // re-pointed by an account id reconciliation in the meantime.
            let current = store
                .snapshot()
                .transactions
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .unwrap_or(trx);
            match sync.save_transaction(&current).await {
                Ok(server_id) if active.load(Ordering::SeqCst) => {
                    store.dispatch(Action::UpdateTransaction {
                        id,
                        patch: TransactionPatch::reconcile(server_id),
                    });
                    persist_collection(&store, &cache, &user_id, Collection::Transactions);
                }
                Ok(_) => debug!("transaction create resolved after teardown"),
                Err(err) => warn!(%err, "background transaction create failed"),
            }
        });
        self.push_account(account_id);
        temp_id
    }

    /// Edits a transaction; when the amount or kind changes, the owning
    /// account balance is adjusted by the signed difference in the same
    /// dispatch.
    pub fn update_transaction(&self, id: EntityId, patch: TransactionPatch) {
        if !self.is_active() {
            warn!("update_transaction ignored, service deactivated");
            return;
        }
        let Some(old) = self.find_transaction(&id) else {
            return;
        };
        let mut new = old.clone();
        patch.apply_to(&mut new);

        let delta = new.kind.signed(new.amount) - old.kind.signed(old.amount);
        let mut actions = vec![Action::UpdateTransaction {
            id: id.clone(),
            patch,
        }];
        if delta != 0.0 {
            if let Some(balance) = self.account_balance(&old.account_id) {
                actions.push(Action::UpdateAccount {
                    id: old.account_id.clone(),
                    patch: AccountPatch::balance(balance + delta),
                });
            }
        }
        self.store.dispatch_all(actions);
        self.persist(Collection::Transactions);
        self.persist(Collection::Accounts);

        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            if let Err(err) = sync.save_transaction(&new).await {
                warn!(%err, "background transaction update failed");
            }
        });
        self.push_account(old.account_id);
    }

    /// Deletes a transaction and symmetrically reverses its balance effect
    /// on the owning account.
    pub fn delete_transaction(&self, id: EntityId) {
        if !self.is_active() {
            warn!("delete_transaction ignored, service deactivated");
            return;
        }
        let Some(trx) = self.find_transaction(&id) else {
            return;
        };

        let mut actions = vec![Action::DeleteTransaction(id.clone())];
        if let Some(balance) = self.account_balance(&trx.account_id) {
            actions.push(Action::UpdateAccount {
                id: trx.account_id.clone(),
                patch: AccountPatch::balance(balance - trx.kind.signed(trx.amount)),
            });
        }
        self.store.dispatch_all(actions);
        self.persist(Collection::Transactions);
        self.persist(Collection::Accounts);

        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            if let Err(err) = sync.delete_transaction(&id).await {
                warn!(%err, "background transaction delete failed");
            }
        });
        self.push_account(trx.account_id);
    }

    /// Adds a category. Category ids stay locally minted; the remote layer
    /// stores the whole list as one document, so there is no per-category
    /// server id to reconcile.
    pub fn add_category(
        &self,
        name: impl Into<String>,
        color: impl Into<String>,
        icon: impl Into<String>,
        kind: TransactionKind,
    ) -> EntityId {
        let category = Category {
            id: EntityId::mint_local(),
            name: name.into(),
            color: color.into(),
            icon: icon.into(),
            kind,
        };
        let id = category.id.clone();
        if !self.is_active() {
            warn!("add_category ignored, service deactivated");
            return id;
        }
        self.store.dispatch(Action::AddCategory(category));
        self.persist(Collection::Categories);
        self.push_categories();
        id
    }

    pub fn update_category(&self, id: EntityId, patch: CategoryPatch) {
        if !self.is_active() {
            warn!("update_category ignored, service deactivated");
            return;
        }
        self.store.dispatch(Action::UpdateCategory { id, patch });
        self.persist(Collection::Categories);
        self.push_categories();
    }

    pub fn delete_category(&self, id: EntityId) {
        if !self.is_active() {
            warn!("delete_category ignored, service deactivated");
            return;
        }
        self.store.dispatch(Action::DeleteCategory(id));
        self.persist(Collection::Categories);
        self.push_categories();
    }

    fn commit_handles(&self) -> (Arc<StateStore>, Arc<SyncAdapter>, Arc<LocalCache>) {
        (
            Arc::clone(&self.store),
            Arc::clone(&self.sync),
            Arc::clone(&self.cache),
        )
    }

    fn account_balance(&self, id: &EntityId) -> Option<f64> {
        self.store
            .snapshot()
            .accounts
            .iter()
            .find(|a| a.id == *id)
            .map(|a| a.balance)
    }

    fn find_transaction(&self, id: &EntityId) -> Option<Transaction> {
        self.store
            .snapshot()
            .transactions
            .iter()
            .find(|t| t.id == *id)
            .cloned()
    }

    fn persist(&self, collection: Collection) {
        persist_collection(&self.store, &self.cache, &self.user_id, collection);
    }

    /// Pushes an account's current document remotely. Looked up at commit
    /// time so the balance written is the latest one, and skipped while the
    /// account is still waiting for its own create to resolve.
    fn push_account(&self, id: EntityId) {
        let (store, sync, _) = self.commit_handles();
        tokio::spawn(async move {
            let Some(account) = store.snapshot().accounts.into_iter().find(|a| a.id == id) else {
                return;
            };
            if account.id.is_local() {
                debug!("account balance push deferred, create still pending");
                return;
            }
            if let Err(err) = sync.save_account(&account).await {
                warn!(%err, "background account balance push failed");
            }
        });
    }

    /// Overwrites the remote categories document with the current list.
    fn push_categories(&self) {
        let (store, sync, _) = self.commit_handles();
        let user_id = self.user_id.clone();
        tokio::spawn(async move {
            let categories = store.snapshot().categories;
            if let Err(err) = sync.save_categories(&user_id, &categories).await {
                warn!(%err, "background category save failed");
            }
        });
    }
}

fn persist_collection(
    store: &StateStore,
    cache: &LocalCache,
    user_id: &str,
    collection: Collection,
) {
    let state = store.snapshot();
    let result = match collection {
        Collection::Accounts => cache.write(user_id, collection, &state.accounts),
        Collection::Transactions => cache.write(user_id, collection, &state.transactions),
        Collection::Categories => cache.write(user_id, collection, &state.categories),
        Collection::Users => Ok(()),
    };
    if let Err(err) = result {
        warn!(
            collection = collection.as_str(),
            %err,
            "cache write failed, in-memory state stays authoritative"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryStore;
    use crate::remote::DocumentStore;
    use crate::test_utils::{wait_until, TestEnv};

    fn service(env: &TestEnv) -> FinanceService {
        FinanceService::new(
            "u1",
            Arc::clone(&env.store),
            Arc::clone(&env.sync),
            Arc::clone(&env.cache),
        )
    }

    #[tokio::test]
    async fn add_account_is_visible_immediately_and_reconciles_later() {
        let env = TestEnv::new();
        let service = service(&env);

        let temp_id = service.add_account("Main", AccountKind::Checking, 100.0, "USD");
        assert!(temp_id.is_local());

        // Optimistic state is there before any await.
        let state = env.store.snapshot();
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.total_balance, 100.0);

        // The background create swaps the id without touching other fields.
        wait_until(|| env.store.snapshot().accounts[0].id.is_remote()).await;
        let account = &env.store.snapshot().accounts[0];
        assert_eq!(account.name, "Main");
        assert_eq!(account.balance, 100.0);

        // The cache mirrors the reconciled id.
        let cached: Vec<Account> = env
            .cache
            .read("u1", Collection::Accounts)
            .unwrap()
            .unwrap();
        assert!(cached[0].id.is_remote());
    }

    #[tokio::test]
    async fn transaction_sequence_keeps_the_balance_law() {
        // Paused remote: commits stay pending, so ids stay temporary and
        // the balance math is purely the optimistic path.
        let env = TestEnv::paused();
        let service = service(&env);
        let account_id = service.add_account("A", AccountKind::Checking, 100.0, "USD");

        service.add_transaction(
            account_id.clone(),
            30.0,
            TransactionKind::Expense,
            "Comida",
            "",
            Utc::now(),
        );
        assert_eq!(env.store.snapshot().accounts[0].balance, 70.0);

        service.add_transaction(
            account_id.clone(),
            50.0,
            TransactionKind::Income,
            "Salario",
            "",
            Utc::now(),
        );
        assert_eq!(env.store.snapshot().accounts[0].balance, 120.0);

        let expense_id = env
            .store
            .snapshot()
            .transactions
            .iter()
            .find(|t| t.kind == TransactionKind::Expense)
            .map(|t| t.id.clone())
            .unwrap();
        service.delete_transaction(expense_id);
        assert_eq!(env.store.snapshot().accounts[0].balance, 150.0);
    }

    #[tokio::test]
    async fn transaction_and_balance_land_in_one_dispatch() {
        let env = TestEnv::paused();
        let service = service(&env);
        let account_id = service.add_account("A", AccountKind::Checking, 10.0, "USD");

        service.add_transaction(
            account_id,
            4.0,
            TransactionKind::Expense,
            "Comida",
            "",
            Utc::now(),
        );

        // A single read sees both effects.
        let state = env.store.snapshot();
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.accounts[0].balance, 6.0);
    }

    #[tokio::test]
    async fn update_transaction_adjusts_balance_by_the_signed_difference() {
        let env = TestEnv::paused();
        let service = service(&env);
        let account_id = service.add_account("A", AccountKind::Checking, 100.0, "USD");
        let trx_id = service.add_transaction(
            account_id,
            30.0,
            TransactionKind::Expense,
            "Comida",
            "",
            Utc::now(),
        );
        assert_eq!(env.store.snapshot().accounts[0].balance, 70.0);

        service.update_transaction(
            trx_id,
            TransactionPatch {
                amount: Some(10.0),
                ..TransactionPatch::default()
            },
        );
        assert_eq!(env.store.snapshot().accounts[0].balance, 90.0);
    }

    #[tokio::test]
    async fn balance_changes_during_a_pending_create_reach_the_remote_document() {
        // The remote is unreachable while the transaction lands, so the
        // balance push against the still-local account id is skipped. Once
        // the create resolves, the reconciled document must catch up.
        let env = TestEnv::paused();
        let service = service(&env);
        let account_id = service.add_account("A", AccountKind::Checking, 100.0, "USD");
        service.add_transaction(
            account_id,
            30.0,
            TransactionKind::Expense,
            "Comida",
            "",
            Utc::now(),
        );
        assert_eq!(env.store.snapshot().accounts[0].balance, 70.0);

        env.memory.resume();
        wait_until(|| env.store.snapshot().accounts[0].id.is_remote()).await;

        let mut caught_up = false;
        for _ in 0..100 {
            let docs = env
                .memory
                .query(Collection::Accounts, &crate::remote::Filter::user("u1"))
                .await
                .unwrap();
            if docs.len() == 1 && docs[0].data["balance"] == 70.0 {
                caught_up = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(caught_up, "remote account document kept its stale balance");
    }

    #[tokio::test]
    async fn delete_account_cascades_locally_and_remotely() {
        let env = TestEnv::new();
        let service = service(&env);
        service.add_account("A", AccountKind::Checking, 0.0, "USD");
        service.add_account("B", AccountKind::Savings, 0.0, "USD");

        // Let the account creates resolve, then log against the durable ids.
        wait_until(|| {
            env.store
                .snapshot()
                .accounts
                .iter()
                .all(|acc| acc.id.is_remote())
        })
        .await;
        let find = |name: &str| {
            env.store
                .snapshot()
                .accounts
                .iter()
                .find(|acc| acc.name == name)
                .map(|acc| acc.id.clone())
                .unwrap()
        };
        let (a, b) = (find("A"), find("B"));
        service.add_transaction(a.clone(), 1.0, TransactionKind::Expense, "c", "", Utc::now());
        service.add_transaction(b, 2.0, TransactionKind::Expense, "c", "", Utc::now());
        wait_until(|| env.memory.len(Collection::Transactions) == 2).await;

        service.delete_account(a);

        let state = env.store.snapshot();
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.transactions[0].amount, 2.0);

        wait_until(|| env.memory.len(Collection::Accounts) == 1).await;
        wait_until(|| env.memory.len(Collection::Transactions) == 1).await;
    }

    #[tokio::test]
    async fn failed_commit_keeps_the_optimistic_state() {
        let env = TestEnv::new();
        let service = service(&env);
        env.memory.set_fail_writes(true);

        let id = service.add_account("Main", AccountKind::Checking, 50.0, "USD");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // No rollback: the account is still there under its temporary id.
        let state = env.store.snapshot();
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.accounts[0].id, id);
        assert!(env.memory.is_empty(Collection::Accounts));
    }

    #[tokio::test]
    async fn deactivated_service_drops_mutations_and_pending_reconciliation() {
        let env = TestEnv::new();
        let store = Arc::new(MemoryStore::paused());
        let sync = Arc::new(crate::sync::SyncAdapter::new(
            Arc::<MemoryStore>::clone(&store),
        ));
        let service = FinanceService::new(
            "u1",
            Arc::clone(&env.store),
            sync,
            Arc::clone(&env.cache),
        );

        service.add_account("Main", AccountKind::Checking, 10.0, "USD");
        service.deactivate();
        store.resume();

        // The create resolves after teardown; its reconcile dispatch is
        // skipped, so the id never flips to remote.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(env.store.snapshot().accounts[0].id.is_local());

        // New mutations are ignored outright.
        service.add_account("Second", AccountKind::Savings, 5.0, "USD");
        assert_eq!(env.store.snapshot().accounts.len(), 1);
    }

    #[tokio::test]
    async fn category_mutations_overwrite_the_remote_document() {
        let env = TestEnv::new();
        let service = service(&env);

        let id = service.add_category("Viajes", "#0ea5e9", "✈️", TransactionKind::Expense);
        wait_until(|| env.memory.len(Collection::Categories) == 1).await;

        service.update_category(
            id.clone(),
            CategoryPatch {
                name: Some("Vacaciones".into()),
                ..CategoryPatch::default()
            },
        );
        wait_until(|| {
            env.store
                .snapshot()
                .categories
                .iter()
                .any(|c| c.name == "Vacaciones")
        })
        .await;

        service.delete_category(id);
        assert!(env.store.snapshot().categories.is_empty());
    }
}
