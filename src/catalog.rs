//! # Feature: Ticket Categories
//!
//! Static catalog of ticket categories and priority levels. The catalog is
//! reference data: it never changes while the process runs, and its
//! declaration order drives both the setup wizard steps and the panel layout.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Accept legacy French identifiers when reading old documents
//! - 1.0.0: Initial four categories and four priorities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One entry of the category catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketCategory {
    pub id: &'static str,
    pub label: &'static str,
    pub emblem: &'static str,
    /// Embed color as 0xRRGGBB
    pub color: u32,
    pub description: &'static str,
    /// Welcome text used when an admin keeps the default; `{user}` is replaced by a mention
    pub default_template: &'static str,
}

const CATEGORIES: [TicketCategory; 4] = [
    TicketCategory {
        id: "support",
        label: "Support",
        emblem: "❓",
        color: 0x3498db,
        description: "Need help? Open a support ticket.",
        default_template: "👋 Welcome {user} to your support ticket!\n\n📝 Describe your problem in detail so we can help you better.\n\n⏳ A staff member will answer as soon as possible.",
    },
    TicketCategory {
        id: "bug",
        label: "Bug",
        emblem: "🐛",
        color: 0xe74c3c,
        description: "Report a bug or a technical problem.",
        default_template: "🔍 Hello {user}!\n\n❗ To help us fix the bug, please provide:\n• A detailed description\n• The steps to reproduce it\n• Screenshots if possible\n\n⏳ Our technical team will review your report.",
    },
    TicketCategory {
        id: "order",
        label: "Order",
        emblem: "🛒",
        color: 0x2ecc71,
        description: "Place an order or ask for a quote.",
        default_template: "🛍️ Welcome {user} to your order ticket!\n\n📋 Please tell us:\n• The product or service you want\n• Your specific needs\n• Your budget if possible\n\n💼 An advisor will guide you through your request.",
    },
    TicketCategory {
        id: "other",
        label: "Other",
        emblem: "💭",
        color: 0x99aab5,
        description: "Any request that doesn't fit the categories above.",
        default_template: "👋 Hello {user}!\n\n💬 Tell us how we can help you.\n\n⏳ A team member will answer as soon as possible.",
    },
];

/// Read-only access to the category catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryCatalog;

impl CategoryCatalog {
    pub fn new() -> Self {
        CategoryCatalog
    }

    /// All categories in declaration order
    pub fn all(&self) -> &'static [TicketCategory] {
        &CATEGORIES
    }

    pub fn get(&self, id: &str) -> Option<&'static TicketCategory> {
        CATEGORIES.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Maps identifiers written by older releases onto current ones
    pub fn canonical_id(id: &str) -> &str {
        match id {
            "commande" => "order",
            "autre" => "other",
            other => other,
        }
    }
}

/// Substitute the `{user}` placeholder of a welcome template
pub fn render_welcome(template: &str, user_mention: &str) -> String {
    template.replace("{user}", user_mention)
}

/// Triage level a staff member can put on a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn emblem(&self) -> &'static str {
        match self {
            Priority::Low => "🟢",
            Priority::Medium => "🟡",
            Priority::High => "🟠",
            Priority::Urgent => "🔴",
        }
    }

    pub fn color(&self) -> u32 {
        match self {
            Priority::Low => 0x2ecc71,
            Priority::Medium => 0xfee75c,
            Priority::High => 0xe67e22,
            Priority::Urgent => 0xe74c3c,
        }
    }

    /// Priorities from most to least pressing
    pub fn descending() -> impl Iterator<Item = Priority> {
        Self::ALL.into_iter().rev()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "basse" => Ok(Priority::Low),
            "medium" | "moyenne" => Ok(Priority::Medium),
            "high" | "haute" => Ok(Priority::High),
            "urgent" | "urgente" => Ok(Priority::Urgent),
            other => Err(other.to_string()),
        }
    }
}
