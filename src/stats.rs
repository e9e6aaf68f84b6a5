//! Usage counters derived from ticket lifecycle transitions.

use crate::catalog::{CategoryCatalog, Priority};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Monotonic ticket counters. Only the lifecycle records into them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
    #[serde(default)]
    total_tickets: u64,
    #[serde(default)]
    by_category: BTreeMap<String, u64>,
    #[serde(default)]
    by_priority: BTreeMap<Priority, u64>,
}

impl Default for TicketStats {
    fn default() -> Self {
        TicketStats {
            total_tickets: 0,
            by_category: CategoryCatalog::new()
                .all()
                .iter()
                .map(|c| (c.id.to_string(), 0))
                .collect(),
            by_priority: Priority::ALL.iter().map(|p| (*p, 0)).collect(),
        }
    }
}

impl TicketStats {
    pub fn total(&self) -> u64 {
        self.total_tickets
    }

    pub fn by_category(&self, category_id: &str) -> u64 {
        self.by_category.get(category_id).copied().unwrap_or(0)
    }

    pub fn by_priority(&self, priority: Priority) -> u64 {
        self.by_priority.get(&priority).copied().unwrap_or(0)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, u64)> {
        self.by_category.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub(crate) fn record_created(&mut self, category_id: &str) {
        self.total_tickets += 1;
        *self.by_category.entry(category_id.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn record_priority(&mut self, priority: Priority) {
        *self.by_priority.entry(priority).or_insert(0) += 1;
    }

    /// Fill in counters that a partially written document left out
    pub(crate) fn fill_defaults(&mut self) {
        for (key, value) in TicketStats::default().by_category {
            self.by_category.entry(key).or_insert(value);
        }
        for priority in Priority::ALL {
            self.by_priority.entry(priority).or_insert(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_zero_for_every_category_and_priority() {
        let stats = TicketStats::default();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.categories().count(), 4);
        assert!(Priority::ALL.iter().all(|p| stats.by_priority(*p) == 0));
    }

    #[test]
    fn test_record_created_bumps_total_and_category() {
        let mut stats = TicketStats::default();
        stats.record_created("bug");
        stats.record_created("bug");
        stats.record_created("support");
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.by_category("bug"), 2);
        assert_eq!(stats.by_category("order"), 0);
    }

    #[test]
    fn test_priority_counts_are_usage_counters() {
        let mut stats = TicketStats::default();
        stats.record_priority(Priority::High);
        stats.record_priority(Priority::High);
        assert_eq!(stats.by_priority(Priority::High), 2);
    }

    #[test]
    fn test_serialized_priority_keys_are_labels() {
        let mut stats = TicketStats::default();
        stats.record_priority(Priority::Urgent);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_priority"]["urgent"], 1);
    }
}
