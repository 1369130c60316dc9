//! PromptGuard facade
//!
//! Assembles the pattern registry, engines, token store and session
//! context from configuration, and hands out coordinators and decode
//! watchers wired to the same shared state.

use crate::config::PromptGuardConfig;
use crate::error::Result;
use crate::privacy::{DecodeOutcome, MaskOutcome, MaskingEngine, PatternRegistry, UnmaskingEngine};
use crate::session::{
    DecodeWatcher, ProtectionSettings, ProtectionState, RenderSurface, Scheduler,
    SessionContext, SessionCoordinator,
};
use crate::store::TokenStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Partial update of the protection toggles
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub mask_on_input: Option<bool>,
    pub decode_on_output: Option<bool>,
}

/// Shared PromptGuard components
pub struct PromptGuard {
    config: PromptGuardConfig,
    registry: Arc<PatternRegistry>,
    masking: Arc<MaskingEngine>,
    unmasking: Arc<UnmaskingEngine>,
    store: Arc<TokenStore>,
    context: Arc<SessionContext>,
}

impl PromptGuard {
    /// Build every component from configuration
    pub fn from_config(config: PromptGuardConfig) -> Result<Self> {
        let store = Arc::new(TokenStore::from_config(&config.storage));
        Self::with_store(config, store)
    }

    /// Build with an explicit token store
    pub fn with_store(config: PromptGuardConfig, store: Arc<TokenStore>) -> Result<Self> {
        let registry = Arc::new(PatternRegistry::from_config(&config.patterns)?);
        let masking = Arc::new(MaskingEngine::new(registry.clone())?);
        let unmasking = Arc::new(UnmaskingEngine::new(&registry)?);
        let protection = Arc::new(ProtectionState::from_config(&config.protection));

        tracing::debug!(
            patterns = registry.len(),
            persistent = store.is_persistent(),
            "PromptGuard assembled"
        );

        Ok(Self {
            config,
            registry,
            masking,
            unmasking,
            store,
            context: Arc::new(SessionContext::new(protection)),
        })
    }

    pub fn config(&self) -> &PromptGuardConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Mask `text` and persist the new tokens.
    ///
    /// Text without PII returns unchanged and touches no storage.
    pub async fn mask_text(&self, text: &str) -> MaskOutcome {
        if !self.masking.contains_pii(text) {
            return self.masking.mask(text);
        }
        let existing = self.store.load().await;
        let outcome = self.masking.mask_against(text, &existing);
        self.store.save(&outcome.mappings).await;
        outcome
    }

    /// Resolve every known token in `text`
    pub async fn unmask_text(&self, text: &str) -> DecodeOutcome {
        if self.unmasking.find_tokens(text).is_empty() {
            return DecodeOutcome {
                text: text.to_string(),
                ..DecodeOutcome::default()
            };
        }
        let mapping = self.store.load().await;
        self.unmasking.decode_report(text, &mapping)
    }

    /// Current protection toggles
    pub fn settings(&self) -> ProtectionSettings {
        self.context.protection().snapshot()
    }

    /// Apply a partial toggle update and return the result
    pub fn update_settings(&self, update: &SettingsUpdate) -> ProtectionSettings {
        let protection = self.context.protection();
        if let Some(enabled) = update.mask_on_input {
            protection.set_mask_on_input(enabled);
        }
        if let Some(enabled) = update.decode_on_output {
            protection.set_decode_on_output(enabled);
        }
        let settings = protection.snapshot();
        tracing::info!(
            mask_on_input = settings.mask_on_input,
            decode_on_output = settings.decode_on_output,
            "Protection settings updated"
        );
        settings
    }

    /// Token count per label
    pub async fn token_counts(&self) -> BTreeMap<String, usize> {
        self.store.load().await;
        self.store.label_counts().await
    }

    /// Coordinator sharing this guard's store and session context
    pub fn coordinator(&self, scheduler: Arc<dyn Scheduler>) -> SessionCoordinator {
        SessionCoordinator::new(
            self.masking.clone(),
            self.store.clone(),
            self.context.clone(),
            scheduler,
            self.config.timing.clone(),
        )
    }

    /// Decode watcher over `surface`, sharing this guard's state
    pub fn decode_watcher(
        &self,
        surface: Arc<dyn RenderSurface>,
        scheduler: Arc<dyn Scheduler>,
    ) -> DecodeWatcher {
        DecodeWatcher::new(
            surface,
            self.unmasking.clone(),
            self.store.clone(),
            self.context.clone(),
            scheduler,
            &self.config.timing,
        )
    }
}
