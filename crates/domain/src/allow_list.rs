use std::collections::BTreeMap;

use allowgate_core::Principal;
use serde::{Deserialize, Serialize};

use crate::HostAddress;

/// Full allow-list rule set mapping CIDR address to principal name.
///
/// The external service is replace-whole-set, so every mutation here is applied
/// to a fetched snapshot which is then pushed back in full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowListRules(BTreeMap<String, String>);

impl AllowListRules {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the principal mapped to `address`, if any.
    #[must_use]
    pub fn principal_for(&self, address: &str) -> Option<&str> {
        self.0.get(address).map(String::as_str)
    }

    /// Returns every address currently mapped to `principal`.
    #[must_use]
    pub fn addresses_for(&self, principal: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|(address, owner)| (owner == principal).then_some(address.as_str()))
            .collect()
    }

    /// Returns whether the exact `(address, principal)` rule exists.
    #[must_use]
    pub fn contains(&self, address: &str, principal: &str) -> bool {
        self.principal_for(address) == Some(principal)
    }

    /// Gives `principal` exactly one rule, pointing at `address`.
    ///
    /// Rules previously mapped to `principal` are dropped. A rule for `address`
    /// owned by another principal is overwritten. Returns the dropped addresses.
    pub fn grant(&mut self, address: &HostAddress, principal: &Principal) -> Vec<String> {
        let removed = self.remove_principal(principal.as_str());
        self.0
            .insert(address.as_cidr(), principal.as_str().to_owned());
        removed
            .into_iter()
            .filter(|stale| stale != &address.as_cidr())
            .collect()
    }

    /// Drops the rule only when both address and principal match.
    pub fn revoke(&mut self, address: &str, principal: &str) -> bool {
        if self.contains(address, principal) {
            self.0.remove(address);
            return true;
        }

        false
    }

    /// Drops every rule mapped to `principal` and returns their addresses.
    pub fn remove_principal(&mut self, principal: &str) -> Vec<String> {
        let addresses: Vec<String> = self
            .0
            .iter()
            .filter_map(|(address, owner)| (owner == principal).then(|| address.clone()))
            .collect();

        for address in &addresses {
            self.0.remove(address);
        }

        addresses
    }

    /// Merges another page of rules into this one. Later pages win on conflicts.
    pub fn merge(&mut self, page: AllowListRules) {
        self.0.extend(page.0);
    }

    /// Iterates over `(address, principal)` rules in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(address, principal)| (address.as_str(), principal.as_str()))
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no rules exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for AllowListRules {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self(value)
    }
}

impl<A: Into<String>, P: Into<String>> FromIterator<(A, P)> for AllowListRules {
    fn from_iter<I: IntoIterator<Item = (A, P)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(address, principal)| (address.into(), principal.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use allowgate_core::Principal;

    use super::AllowListRules;
    use crate::HostAddress;

    fn host(value: &str) -> HostAddress {
        match HostAddress::parse_dotted_quad(value) {
            Ok(address) => address,
            Err(error) => panic!("invalid fixture address: {error}"),
        }
    }

    fn principal(value: &str) -> Principal {
        match Principal::new(value) {
            Ok(principal) => principal,
            Err(error) => panic!("invalid fixture principal: {error}"),
        }
    }

    #[test]
    fn grant_replaces_previous_rule_for_principal() {
        let mut rules = AllowListRules::from_iter([
            ("10.0.0.1/32", "alice"),
            ("10.0.0.9/32", "bob"),
        ]);

        let dropped = rules.grant(&host("10.0.0.2"), &principal("alice"));

        assert_eq!(dropped, vec!["10.0.0.1/32".to_owned()]);
        assert_eq!(rules.addresses_for("alice"), vec!["10.0.0.2/32"]);
        assert!(rules.contains("10.0.0.9/32", "bob"));
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn grant_same_address_twice_keeps_one_rule() {
        let mut rules = AllowListRules::new();
        rules.grant(&host("10.0.0.1"), &principal("alice"));
        let dropped = rules.grant(&host("10.0.0.1"), &principal("alice"));

        assert!(dropped.is_empty());
        assert_eq!(rules.len(), 1);
        assert!(rules.contains("10.0.0.1/32", "alice"));
    }

    #[test]
    fn grant_takes_over_address_owned_by_someone_else() {
        let mut rules = AllowListRules::from_iter([("10.0.0.1/32", "bob")]);
        rules.grant(&host("10.0.0.1"), &principal("alice"));

        assert_eq!(rules.principal_for("10.0.0.1/32"), Some("alice"));
        assert!(rules.addresses_for("bob").is_empty());
    }

    #[test]
    fn revoke_requires_exact_pair() {
        let mut rules = AllowListRules::from_iter([("10.0.0.1/32", "alice")]);

        assert!(!rules.revoke("10.0.0.1/32", "bob"));
        assert!(!rules.revoke("10.0.0.2/32", "alice"));
        assert!(rules.revoke("10.0.0.1/32", "alice"));
        assert!(rules.is_empty());
    }

    #[test]
    fn merge_lets_later_pages_win() {
        let mut rules = AllowListRules::from_iter([("10.0.0.1/32", "alice")]);
        rules.merge(AllowListRules::from_iter([
            ("10.0.0.1/32", "carol"),
            ("10.0.0.2/32", "bob"),
        ]));

        assert_eq!(rules.principal_for("10.0.0.1/32"), Some("carol"));
        assert_eq!(rules.len(), 2);
    }
}
