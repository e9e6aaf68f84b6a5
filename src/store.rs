//! # Feature: Ticket Store
//!
//! Single versioned JSON document holding every piece of ticket state:
//! panel configurations, active tickets, the log destination and counters.
//! The document is loaded once at startup and written through after every
//! mutation.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Multi-panel documents; additive migration of older shapes
//! - 1.0.0: Single ticket category with one support role

use crate::catalog::{CategoryCatalog, Priority};
use crate::error::{StoreError, TicketError};
use crate::stats::TicketStats;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Schema version written by this release
pub const DOCUMENT_VERSION: u32 = 2;

/// Key of the panel synthesized from a single-category document
pub const LEGACY_PANEL_KEY: &str = "default";

const LEGACY_WELCOME: &str =
    "Welcome {user} to your ticket!\nA staff member will answer as soon as possible.";

/// Per-category settings of one panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub welcome_template: String,
    /// Grouping container (Discord category channel) new tickets are created under
    #[serde(default)]
    pub destination_group_id: Option<u64>,
}

/// Configuration of one intake panel, keyed by its channel id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub support_role_id: Option<u64>,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryConfig>,
    #[serde(default)]
    pub panel_message_id: Option<u64>,
}

/// A live ticket, keyed by the id of the user who opened it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTicket {
    pub ticket_channel_id: u64,
    pub category_id: String,
    #[serde(default)]
    pub welcome_message_id: Option<u64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Everything the ticket subsystem persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDocument {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub panel_configs: BTreeMap<String, PanelConfig>,
    #[serde(default)]
    pub active_tickets: BTreeMap<u64, ActiveTicket>,
    #[serde(default)]
    pub log_channel_id: Option<u64>,
    #[serde(default)]
    pub stats: TicketStats,
}

impl Default for TicketDocument {
    fn default() -> Self {
        TicketDocument {
            version: DOCUMENT_VERSION,
            panel_configs: BTreeMap::new(),
            active_tickets: BTreeMap::new(),
            log_channel_id: None,
            stats: TicketStats::default(),
        }
    }
}

impl TicketDocument {
    /// Find the ticket bound to a channel, with its owner
    pub fn ticket_in_channel(&self, channel_id: u64) -> Option<(u64, &ActiveTicket)> {
        self.active_tickets
            .iter()
            .find(|(_, t)| t.ticket_channel_id == channel_id)
            .map(|(user, t)| (*user, t))
    }

    pub fn ticket_in_channel_mut(&mut self, channel_id: u64) -> Option<&mut ActiveTicket> {
        self.active_tickets
            .values_mut()
            .find(|t| t.ticket_channel_id == channel_id)
    }
}

// ============================================================================
// Load / Save
// ============================================================================

/// Load a document from disk.
///
/// A missing file yields the default document. Older shapes are migrated.
/// A file that cannot be read or parsed is logged and replaced by defaults
/// in memory; it is only overwritten on the next successful save.
pub fn load(path: &Path) -> TicketDocument {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No ticket store at {}, starting empty", path.display());
            return TicketDocument::default();
        }
        Err(e) => {
            error!("Failed to read ticket store {}: {e}", path.display());
            return TicketDocument::default();
        }
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => migrate(value),
        Err(e) => {
            error!("Failed to parse ticket store {}: {e}", path.display());
            TicketDocument::default()
        }
    }
}

/// Write a document to disk through a temp file and rename
pub fn save(path: &Path, document: &TicketDocument) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_vec_pretty(document)?;
    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    fs::write(&temp_path, payload)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

// ============================================================================
// Migration
// ============================================================================

/// Bring any known document shape up to the current schema.
///
/// Migration is additive: keys are renamed or filled in, never dropped
/// unless they were folded into a new location.
pub fn migrate(raw: Value) -> TicketDocument {
    let Value::Object(mut obj) = raw else {
        warn!("Ticket store root is not an object, starting empty");
        return TicketDocument::default();
    };

    let mut document = TicketDocument::default();

    // Single-category documents predate panels
    let legacy_group = obj.remove("ticket_category_id");
    let legacy_role = if legacy_group.is_some() {
        obj.remove("support_role_id")
    } else {
        None
    };

    rename_key(&mut obj, "ticket_configs", "panel_configs");
    rename_key(&mut obj, "ticket_stats", "stats");

    if let Some(Value::Object(panels)) = obj.remove("panel_configs") {
        for (key, panel) in panels {
            match migrate_panel(panel) {
                Some(panel) => {
                    document.panel_configs.insert(key, panel);
                }
                None => warn!("Skipping unreadable panel configuration '{key}'"),
            }
        }
    }

    if let Some(group_id) = legacy_group.as_ref().and_then(Value::as_u64) {
        if !document.panel_configs.contains_key(LEGACY_PANEL_KEY) {
            info!("Migrating single-category ticket configuration into panel '{LEGACY_PANEL_KEY}'");
            document.panel_configs.insert(
                LEGACY_PANEL_KEY.to_string(),
                PanelConfig {
                    support_role_id: legacy_role.as_ref().and_then(Value::as_u64),
                    categories: uniform_categories(Some(group_id), LEGACY_WELCOME),
                    panel_message_id: None,
                },
            );
        }
    }

    if let Some(Value::Object(tickets)) = obj.remove("active_tickets") {
        for (user, ticket) in tickets {
            let Ok(user_id) = user.parse::<u64>() else {
                warn!("Skipping active ticket with non-numeric owner '{user}'");
                continue;
            };
            match migrate_ticket(ticket) {
                Some(ticket) => {
                    document.active_tickets.insert(user_id, ticket);
                }
                None => warn!("Skipping unreadable active ticket of user {user_id}"),
            }
        }
    }

    document.log_channel_id = obj.remove("log_channel_id").and_then(|v| v.as_u64());

    if let Some(stats) = obj.remove("stats") {
        document.stats = migrate_stats(stats);
    }

    document.version = DOCUMENT_VERSION;
    document
}

fn rename_key(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if obj.contains_key(to) {
        return;
    }
    if let Some(value) = obj.remove(from) {
        obj.insert(to.to_string(), value);
    }
}

fn migrate_panel(panel: Value) -> Option<PanelConfig> {
    let Value::Object(mut panel) = panel else {
        return None;
    };
    rename_key(&mut panel, "setup_message_id", "panel_message_id");

    if let Some(Value::Object(categories)) = panel.remove("categories") {
        let mut migrated = Map::new();
        for (id, category) in categories {
            let Value::Object(mut category) = category else {
                continue;
            };
            rename_key(&mut category, "welcome_message", "welcome_template");
            rename_key(&mut category, "category_id", "destination_group_id");
            let id = CategoryCatalog::canonical_id(&id).to_string();
            if !category.contains_key("welcome_template") {
                let default = CategoryCatalog::new()
                    .get(&id)
                    .map(|c| c.default_template)
                    .unwrap_or(LEGACY_WELCOME);
                category.insert("welcome_template".into(), Value::String(default.into()));
            }
            migrated.insert(id, Value::Object(category));
        }
        panel.insert("categories".into(), Value::Object(migrated));
    }

    // A flat panel carries one container and one welcome text for every category
    let flat_group = panel.remove("category_id");
    let flat_welcome = panel.remove("welcome_message");
    let is_flat = !panel.contains_key("categories") && (flat_group.is_some() || flat_welcome.is_some());

    let mut config: PanelConfig = serde_json::from_value(Value::Object(panel)).ok()?;
    if is_flat {
        let template = flat_welcome
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or(LEGACY_WELCOME);
        config.categories = uniform_categories(flat_group.as_ref().and_then(Value::as_u64), template);
    }

    let catalog = CategoryCatalog::new();
    config.categories.retain(|id, _| {
        let known = catalog.contains(id);
        if !known {
            warn!("Dropping unknown category '{id}' from panel configuration");
        }
        known
    });
    Some(config)
}

fn uniform_categories(group_id: Option<u64>, template: &str) -> BTreeMap<String, CategoryConfig> {
    CategoryCatalog::new()
        .all()
        .iter()
        .map(|c| {
            (
                c.id.to_string(),
                CategoryConfig {
                    welcome_template: template.to_string(),
                    destination_group_id: group_id,
                },
            )
        })
        .collect()
}

fn migrate_ticket(ticket: Value) -> Option<ActiveTicket> {
    let Value::Object(mut ticket) = ticket else {
        return None;
    };
    rename_key(&mut ticket, "channel_id", "ticket_channel_id");

    if let Some(Value::String(category)) = ticket.get("category_id") {
        let canonical = CategoryCatalog::canonical_id(category).to_string();
        ticket.insert("category_id".into(), Value::String(canonical));
    }

    let created_at = ticket
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(|| {
            warn!("Active ticket has no readable creation time, using now");
            Utc::now()
        });
    ticket.insert("created_at".into(), Value::String(created_at.to_rfc3339()));

    // Older releases stored priorities by their French names
    match ticket.remove("priority") {
        Some(Value::String(label)) => {
            if let Ok(priority) = label.parse::<Priority>() {
                ticket.insert("priority".into(), Value::String(priority.label().into()));
            }
        }
        Some(other) => {
            ticket.insert("priority".into(), other);
        }
        None => {}
    }

    serde_json::from_value(Value::Object(ticket)).ok()
}

fn json_counts(counts: BTreeMap<String, u64>) -> Value {
    Value::Object(
        counts
            .into_iter()
            .map(|(key, count)| (key, Value::from(count)))
            .collect(),
    )
}

/// Accept RFC 3339 as well as offset-less ISO timestamps, read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn migrate_stats(stats: Value) -> TicketStats {
    let Value::Object(mut stats) = stats else {
        return TicketStats::default();
    };
    rename_key(&mut stats, "tickets_by_category", "by_category");
    rename_key(&mut stats, "tickets_by_priority", "by_priority");

    if let Some(Value::Object(categories)) = stats.remove("by_category") {
        // Legacy and current ids of one category may both carry counts
        let mut migrated: BTreeMap<String, u64> = BTreeMap::new();
        for (id, count) in categories {
            let Some(count) = count.as_u64() else {
                warn!("Dropping unreadable counter for category '{id}'");
                continue;
            };
            *migrated
                .entry(CategoryCatalog::canonical_id(&id).to_string())
                .or_insert(0) += count;
        }
        stats.insert("by_category".into(), json_counts(migrated));
    }

    if let Some(Value::Object(priorities)) = stats.remove("by_priority") {
        let mut migrated: BTreeMap<String, u64> = BTreeMap::new();
        for (label, count) in priorities {
            let Ok(priority) = label.parse::<Priority>() else {
                warn!("Dropping counter for unknown priority '{label}'");
                continue;
            };
            let Some(count) = count.as_u64() else {
                warn!("Dropping unreadable counter for priority '{label}'");
                continue;
            };
            *migrated.entry(priority.label().to_string()).or_insert(0) += count;
        }
        stats.insert("by_priority".into(), json_counts(migrated));
    }

    let mut stats: TicketStats = serde_json::from_value(Value::Object(stats)).unwrap_or_else(|e| {
        warn!("Unreadable ticket counters, starting from zero: {e}");
        TicketStats::default()
    });
    stats.fill_defaults();
    stats
}

// ============================================================================
// Shared store handle
// ============================================================================

/// Shared, write-through handle to the ticket document
#[derive(Clone)]
pub struct TicketStore {
    document: Arc<Mutex<TicketDocument>>,
    path: Option<PathBuf>,
}

impl TicketStore {
    /// Open the store backed by `path`, migrating older documents
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = load(&path);
        info!(
            "Ticket store loaded from {} ({} panel(s), {} active ticket(s))",
            path.display(),
            document.panel_configs.len(),
            document.active_tickets.len()
        );
        TicketStore {
            document: Arc::new(Mutex::new(document)),
            path: Some(path),
        }
    }

    /// Store without a backing file
    pub fn in_memory() -> Self {
        Self::from_document(TicketDocument::default())
    }

    pub fn from_document(document: TicketDocument) -> Self {
        TicketStore {
            document: Arc::new(Mutex::new(document)),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> TicketDocument {
        self.document.lock().await.clone()
    }

    pub async fn read<T>(&self, f: impl FnOnce(&TicketDocument) -> T) -> T {
        let document = self.document.lock().await;
        f(&document)
    }

    /// Apply a mutation and write the document through.
    ///
    /// `operation` must validate before it changes anything: an `Err` is
    /// returned as-is and nothing is written. A failed write is logged and
    /// the in-memory state is kept.
    pub async fn mutate<T>(
        &self,
        operation: impl FnOnce(&mut TicketDocument) -> Result<T, TicketError>,
    ) -> Result<T, TicketError> {
        let mut document = self.document.lock().await;
        let result = operation(&mut document)?;

        if let Some(path) = &self.path {
            if let Err(e) = save(path, &document) {
                error!(
                    "Failed to persist ticket store to {}: {e}; keeping in-memory state",
                    path.display()
                );
            }
        }

        Ok(result)
    }

    /// Write the current document, reporting failure to the caller
    pub async fn flush(&self) -> Result<(), StoreError> {
        let document = self.document.lock().await;
        match &self.path {
            Some(path) => save(path, &document),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> TicketDocument {
        let mut document = TicketDocument::default();
        let mut categories = BTreeMap::new();
        categories.insert(
            "bug".to_string(),
            CategoryConfig {
                welcome_template: "Hi {user}".to_string(),
                destination_group_id: Some(77),
            },
        );
        document.panel_configs.insert(
            "1001".to_string(),
            PanelConfig {
                support_role_id: Some(5),
                categories,
                panel_message_id: Some(9),
            },
        );
        document.active_tickets.insert(
            42,
            ActiveTicket {
                ticket_channel_id: 3000,
                category_id: "bug".to_string(),
                welcome_message_id: Some(3001),
                created_at: Utc::now(),
                priority: Some(Priority::High),
            },
        );
        document.log_channel_id = Some(8);
        document.stats.record_created("bug");
        document.stats.record_priority(Priority::High);
        document
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("tickets.json");
        let document = sample_document();

        save(&path, &document).unwrap();
        assert_eq!(load(&path), document);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let document = load(&dir.path().join("absent.json"));
        assert_eq!(document, TicketDocument::default());
    }

    #[test]
    fn test_corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load(&path), TicketDocument::default());
    }

    #[test]
    fn test_migrates_single_category_shape() {
        let document = migrate(json!({
            "ticket_category_id": 555,
            "support_role_id": 66,
            "active_tickets": {}
        }));

        let panel = document.panel_configs.get(LEGACY_PANEL_KEY).unwrap();
        assert_eq!(panel.support_role_id, Some(66));
        assert_eq!(panel.categories.len(), 4);
        assert!(panel
            .categories
            .values()
            .all(|c| c.destination_group_id == Some(555) && !c.welcome_template.is_empty()));
        assert_eq!(document.log_channel_id, None);
        assert_eq!(document.stats, TicketStats::default());
        assert_eq!(document.version, DOCUMENT_VERSION);
    }

    #[test]
    fn test_migrates_french_multi_panel_shape() {
        let document = migrate(json!({
            "ticket_configs": {
                "1001": {
                    "support_role_id": 5,
                    "setup_message_id": 9,
                    "categories": {
                        "commande": {"welcome_message": "Salut {user}", "category_id": 70},
                        "bug": {"welcome_message": "Bug {user}", "category_id": 71}
                    }
                }
            },
            "active_tickets": {
                "42": {
                    "channel_id": 3000,
                    "category_id": "autre",
                    "welcome_message_id": 3001,
                    "created_at": "2024-03-01T10:00:00Z",
                    "priority": "haute"
                }
            },
            "log_channel_id": 8,
            "ticket_stats": {
                "total_tickets": 3,
                "tickets_by_category": {"support": 1, "bug": 1, "commande": 1, "autre": 0},
                "tickets_by_priority": {"basse": 0, "moyenne": 2, "haute": 1, "urgente": 0}
            }
        }));

        let panel = &document.panel_configs["1001"];
        assert_eq!(panel.panel_message_id, Some(9));
        assert_eq!(panel.categories["order"].welcome_template, "Salut {user}");
        assert_eq!(panel.categories["order"].destination_group_id, Some(70));

        let ticket = &document.active_tickets[&42];
        assert_eq!(ticket.ticket_channel_id, 3000);
        assert_eq!(ticket.category_id, "other");
        assert_eq!(ticket.priority, Some(Priority::High));

        assert_eq!(document.log_channel_id, Some(8));
        assert_eq!(document.stats.total(), 3);
        assert_eq!(document.stats.by_category("order"), 1);
        assert_eq!(document.stats.by_priority(Priority::Medium), 2);
    }

    #[test]
    fn test_migrates_flat_default_panel() {
        let document = migrate(json!({
            "ticket_category_id": 555,
            "support_role_id": 66,
            "ticket_configs": {
                "default": {
                    "category_id": 555,
                    "support_role_id": 66,
                    "welcome_message": "Bienvenue {user}"
                }
            }
        }));

        let panel = &document.panel_configs[LEGACY_PANEL_KEY];
        assert_eq!(panel.support_role_id, Some(66));
        assert_eq!(panel.categories.len(), 4);
        for category in CategoryCatalog::new().all() {
            let config = &panel.categories[category.id];
            assert_eq!(config.destination_group_id, Some(555));
            assert_eq!(config.welcome_template, "Bienvenue {user}");
        }
    }

    #[test]
    fn test_keeps_ticket_with_offsetless_timestamp() {
        let document = migrate(json!({
            "active_tickets": {
                "42": {
                    "channel_id": 3000,
                    "category_id": "bug",
                    "welcome_message_id": 3001,
                    "created_at": "2024-03-01T10:00:00.123456"
                }
            }
        }));

        let ticket = &document.active_tickets[&42];
        assert_eq!(ticket.ticket_channel_id, 3000);
        assert_eq!(ticket.welcome_message_id, Some(3001));
        assert_eq!(
            ticket.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-03-01 10:00:00"
        );
    }

    #[test]
    fn test_keeps_ticket_with_unreadable_timestamp() {
        let before = Utc::now();
        let document = migrate(json!({
            "active_tickets": {
                "7": {"channel_id": 3100, "category_id": "support", "created_at": "last tuesday"},
                "8": {"channel_id": 3200, "category_id": "support"}
            }
        }));

        assert_eq!(document.active_tickets[&7].ticket_channel_id, 3100);
        assert!(document.active_tickets[&7].created_at >= before);
        assert_eq!(document.active_tickets[&8].ticket_channel_id, 3200);
    }

    #[test]
    fn test_legacy_and_current_counters_are_summed() {
        let document = migrate(json!({
            "ticket_stats": {
                "total_tickets": 9,
                "tickets_by_category": {"commande": 2, "order": 3, "autre": 1},
                "tickets_by_priority": {"haute": 1, "high": 2}
            }
        }));

        assert_eq!(document.stats.by_category("order"), 5);
        assert_eq!(document.stats.by_category("other"), 1);
        assert_eq!(document.stats.by_priority(Priority::High), 3);
    }

    #[test]
    fn test_partial_modern_document_gets_defaults() {
        let document = migrate(json!({"log_channel_id": 12}));
        assert_eq!(document.log_channel_id, Some(12));
        assert!(document.panel_configs.is_empty());
        assert!(document.active_tickets.is_empty());
        assert_eq!(document.stats, TicketStats::default());
    }

    #[test]
    fn test_ticket_in_channel() {
        let document = sample_document();
        let (owner, ticket) = document.ticket_in_channel(3000).unwrap();
        assert_eq!(owner, 42);
        assert_eq!(ticket.category_id, "bug");
        assert!(document.ticket_in_channel(1).is_none());
    }

    #[tokio::test]
    async fn test_mutate_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.json");
        let store = TicketStore::open(&path);

        store
            .mutate(|doc| {
                doc.log_channel_id = Some(99);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(load(&path).log_channel_id, Some(99));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_in_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let store = TicketStore::open(blocker.join("tickets.json"));

        let result = store
            .mutate(|doc| {
                doc.log_channel_id = Some(7);
                Ok(())
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(store.snapshot().await.log_channel_id, Some(7));
        assert!(matches!(store.flush().await, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_rejected_mutation_is_not_applied() {
        let store = TicketStore::in_memory();
        let result: Result<(), TicketError> = store
            .mutate(|_| Err(TicketError::NotFound("panel".into())))
            .await;
        assert!(result.is_err());
        assert_eq!(store.snapshot().await, TicketDocument::default());
    }
}
