//! Account arena and synthetic parent materialization.
//!
//! Every account handed out by a retrieval pass has all of its ancestors in
//! the same result set. When the server reports `assets:bank:checking`
//! without `assets:bank`, the missing parents are created here and marked as
//! synthesized so the child's amounts can be propagated to them.

use crate::types::{parent_name, Account};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Outcome of [`AccountArena::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Index of the requested account
    pub index: usize,
    /// Indices created by this call, outermost ancestor first
    pub created: Vec<usize>,
}

/// Accounts of one retrieval pass, keyed by name and kept in creation order
#[derive(Debug, Clone, Default)]
pub struct AccountArena {
    accounts: Vec<Account>,
    index: HashMap<String, usize>,
}

impl AccountArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Account> {
        self.position(name).map(|idx| &self.accounts[idx])
    }

    pub fn account(&self, idx: usize) -> &Account {
        &self.accounts[idx]
    }

    pub fn account_mut(&mut self, idx: usize) -> &mut Account {
        &mut self.accounts[idx]
    }

    /// Make sure `name` and all of its ancestors exist.
    ///
    /// Ancestors are created top-down, so a parent always precedes its
    /// children in creation order.
    pub fn ensure(&mut self, name: &str) -> Materialized {
        if let Some(idx) = self.position(name) {
            return Materialized {
                index: idx,
                created: Vec::new(),
            };
        }

        let mut missing = vec![name];
        let mut cursor = name;
        while let Some(parent) = parent_name(cursor) {
            if self.contains(parent) {
                break;
            }
            missing.push(parent);
            cursor = parent;
        }

        let mut created = Vec::with_capacity(missing.len());
        for missing_name in missing.into_iter().rev() {
            created.push(self.push(Account::new(missing_name)));
        }
        Materialized {
            index: created[created.len() - 1],
            created,
        }
    }

    /// Insert an account whose parents already exist.
    ///
    /// Returns `None` when an account with the same name is already present.
    pub fn insert(&mut self, account: Account) -> Option<usize> {
        if self.contains(&account.name) {
            return None;
        }
        Some(self.push(account))
    }

    /// Add an amount to `idx` and to each of `propagate_to`
    pub fn add_amount(&mut self, idx: usize, propagate_to: &[usize], currency: &str, value: Decimal) {
        self.accounts[idx].add_amount(currency, value);
        for &ancestor in propagate_to {
            log::trace!(
                target: "ledgersync::arena",
                "propagating {} {} to {}",
                currency,
                value,
                self.accounts[ancestor].name
            );
            self.accounts[ancestor].add_amount(currency, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn into_accounts(self) -> Vec<Account> {
        self.accounts
    }

    fn push(&mut self, account: Account) -> usize {
        let idx = self.accounts.len();
        self.index.insert(account.name.clone(), idx);
        self.accounts.push(account);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ensure_creates_ancestors_top_down() {
        let mut arena = AccountArena::new();
        let result = arena.ensure("assets:bank:checking");

        assert_eq!(result.created.len(), 3);
        let names: Vec<&str> = arena.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["assets", "assets:bank", "assets:bank:checking"]);
        assert_eq!(arena.account(result.index).name, "assets:bank:checking");
    }

    #[test]
    fn test_ensure_stops_at_existing_ancestor() {
        let mut arena = AccountArena::new();
        arena.ensure("assets");
        let result = arena.ensure("assets:bank:savings");
        let created: Vec<&str> = result
            .created
            .iter()
            .map(|&i| arena.account(i).name.as_str())
            .collect();
        assert_eq!(created, vec!["assets:bank", "assets:bank:savings"]);
    }

    #[test]
    fn test_ensure_existing_is_noop() {
        let mut arena = AccountArena::new();
        let first = arena.ensure("expenses:food");
        let second = arena.ensure("expenses:food");
        assert_eq!(first.index, second.index);
        assert!(second.created.is_empty());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut arena = AccountArena::new();
        assert!(arena.insert(Account::new("income")).is_some());
        assert!(arena.insert(Account::new("income")).is_none());
    }

    #[test]
    fn test_add_amount_propagates() {
        let mut arena = AccountArena::new();
        let parents = arena.ensure("assets:bank");
        let child = arena.insert(Account::new("assets:bank:checking")).unwrap();
        let value = Decimal::from_str("10.50").unwrap();
        arena.add_amount(child, &parents.created, "USD", value);

        for account in arena.iter() {
            assert_eq!(account.amount("USD"), Some(value), "{}", account.name);
        }
    }
}
