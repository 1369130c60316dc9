//! Session context: protection toggles, cycle phase and the session lock

use crate::config::ProtectionConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Phase of an input-submission cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CyclePhase {
    /// No cycle running
    Idle,
    /// Scanning the input for PII
    Detecting,
    /// Nothing to mask
    NoMatch,
    /// PII found, about to mask
    Matched,
    /// Writing masked text to the input
    Masking,
    /// Triggering the send action
    Submitting,
}

/// Serializable view of the protection toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionSettings {
    /// Mask PII in the input before submission
    pub mask_on_input: bool,
    /// Restore original values in rendered responses
    pub decode_on_output: bool,
}

/// Process-wide protection toggles, changed only by explicit user action
#[derive(Debug)]
pub struct ProtectionState {
    mask_on_input: AtomicBool,
    decode_on_output: AtomicBool,
}

impl ProtectionState {
    /// Toggles with the given initial values
    pub fn new(mask_on_input: bool, decode_on_output: bool) -> Self {
        Self {
            mask_on_input: AtomicBool::new(mask_on_input),
            decode_on_output: AtomicBool::new(decode_on_output),
        }
    }

    /// Toggles from configuration
    pub fn from_config(config: &ProtectionConfig) -> Self {
        Self::new(config.mask_on_input, config.decode_on_output)
    }

    pub fn mask_on_input(&self) -> bool {
        self.mask_on_input.load(Ordering::SeqCst)
    }

    pub fn decode_on_output(&self) -> bool {
        self.decode_on_output.load(Ordering::SeqCst)
    }

    pub fn set_mask_on_input(&self, enabled: bool) {
        self.mask_on_input.store(enabled, Ordering::SeqCst);
    }

    pub fn set_decode_on_output(&self, enabled: bool) {
        self.decode_on_output.store(enabled, Ordering::SeqCst);
    }

    /// Current values
    pub fn snapshot(&self) -> ProtectionSettings {
        ProtectionSettings {
            mask_on_input: self.mask_on_input(),
            decode_on_output: self.decode_on_output(),
        }
    }
}

impl Default for ProtectionState {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// "Operation in progress" flag
#[derive(Debug, Default)]
pub struct SessionLock {
    busy: AtomicBool,
}

impl SessionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or `None` if a cycle is already running.
    ///
    /// Callers that get `None` drop their trigger; nothing is queued.
    pub fn try_acquire(&self) -> Option<SessionGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard { lock: self })
    }

    /// Whether a cycle currently holds the lock
    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the session lock on drop
#[derive(Debug)]
pub struct SessionGuard<'a> {
    lock: &'a SessionLock,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

/// Shared session context held by the coordinator and the decode watcher
#[derive(Debug)]
pub struct SessionContext {
    protection: Arc<ProtectionState>,
    lock: SessionLock,
    phase: RwLock<CyclePhase>,
}

impl SessionContext {
    pub fn new(protection: Arc<ProtectionState>) -> Self {
        Self {
            protection,
            lock: SessionLock::new(),
            phase: RwLock::new(CyclePhase::Idle),
        }
    }

    pub fn protection(&self) -> &Arc<ProtectionState> {
        &self.protection
    }

    pub fn lock(&self) -> &SessionLock {
        &self.lock
    }

    /// Current cycle phase
    pub async fn phase(&self) -> CyclePhase {
        *self.phase.read().await
    }

    /// Move to `phase`
    pub async fn set_phase(&self, phase: CyclePhase) {
        let mut current = self.phase.write().await;
        tracing::trace!(from = ?*current, to = ?phase, "Cycle phase");
        *current = phase;
    }
}
