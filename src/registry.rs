//! Store-backed map of panel configurations and the log destination.

use crate::catalog::CategoryCatalog;
use crate::error::TicketError;
use crate::store::{PanelConfig, TicketStore};
use log::info;

/// Panel configuration access. All writes go through the shared store.
#[derive(Clone)]
pub struct ConfigurationRegistry {
    store: TicketStore,
    catalog: CategoryCatalog,
}

impl ConfigurationRegistry {
    pub fn new(store: TicketStore) -> Self {
        ConfigurationRegistry {
            store,
            catalog: CategoryCatalog::new(),
        }
    }

    pub async fn panel(&self, panel_id: &str) -> Option<PanelConfig> {
        self.store
            .read(|doc| doc.panel_configs.get(panel_id).cloned())
            .await
    }

    pub async fn contains(&self, panel_id: &str) -> bool {
        self.store
            .read(|doc| doc.panel_configs.contains_key(panel_id))
            .await
    }

    pub async fn panels(&self) -> Vec<(String, PanelConfig)> {
        self.store
            .read(|doc| {
                doc.panel_configs
                    .iter()
                    .map(|(id, cfg)| (id.clone(), cfg.clone()))
                    .collect()
            })
            .await
    }

    /// Insert or replace a panel. Every category must exist in the catalog.
    pub async fn upsert_panel(&self, panel_id: &str, config: PanelConfig) -> Result<(), TicketError> {
        if let Some(unknown) = config.categories.keys().find(|id| !self.catalog.contains(id)) {
            return Err(TicketError::NotFound(format!("category '{unknown}'")));
        }
        self.store
            .mutate(|doc| {
                doc.panel_configs.insert(panel_id.to_string(), config);
                Ok(())
            })
            .await?;
        info!("Saved ticket panel configuration for {panel_id}");
        Ok(())
    }

    pub async fn remove_panel(&self, panel_id: &str) -> Result<PanelConfig, TicketError> {
        let removed = self
            .store
            .mutate(|doc| {
                doc.panel_configs
                    .remove(panel_id)
                    .ok_or_else(|| TicketError::NotFound(format!("panel configuration {panel_id}")))
            })
            .await?;
        info!("Removed ticket panel configuration for {panel_id}");
        Ok(removed)
    }

    pub async fn set_support_role(&self, panel_id: &str, role_id: u64) -> Result<(), TicketError> {
        self.store
            .mutate(|doc| {
                let panel = doc
                    .panel_configs
                    .get_mut(panel_id)
                    .ok_or_else(|| TicketError::NotFound(format!("panel configuration {panel_id}")))?;
                panel.support_role_id = Some(role_id);
                Ok(())
            })
            .await
    }

    pub async fn set_category_template(
        &self,
        panel_id: &str,
        category_id: &str,
        template: &str,
    ) -> Result<(), TicketError> {
        let fallback = self
            .catalog
            .get(category_id)
            .ok_or_else(|| TicketError::NotFound(format!("category '{category_id}'")))?
            .default_template;
        let template = if template.trim().is_empty() {
            fallback
        } else {
            template
        };

        self.store
            .mutate(|doc| {
                let category = doc
                    .panel_configs
                    .get_mut(panel_id)
                    .and_then(|p| p.categories.get_mut(category_id))
                    .ok_or_else(|| {
                        TicketError::NotFound(format!("category '{category_id}' of panel {panel_id}"))
                    })?;
                category.welcome_template = template.to_string();
                Ok(())
            })
            .await
    }

    pub async fn set_category_group(
        &self,
        panel_id: &str,
        category_id: &str,
        group_id: u64,
    ) -> Result<(), TicketError> {
        self.store
            .mutate(|doc| {
                let category = doc
                    .panel_configs
                    .get_mut(panel_id)
                    .and_then(|p| p.categories.get_mut(category_id))
                    .ok_or_else(|| {
                        TicketError::NotFound(format!("category '{category_id}' of panel {panel_id}"))
                    })?;
                category.destination_group_id = Some(group_id);
                Ok(())
            })
            .await
    }

    pub async fn log_channel(&self) -> Option<u64> {
        self.store.read(|doc| doc.log_channel_id).await
    }

    pub async fn set_log_channel(&self, channel_id: u64) -> Result<(), TicketError> {
        self.store
            .mutate(|doc| {
                doc.log_channel_id = Some(channel_id);
                Ok(())
            })
            .await?;
        info!("Ticket log channel set to {channel_id}");
        Ok(())
    }
}
