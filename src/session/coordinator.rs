//! Session coordinator
//!
//! Runs one input-submission cycle at a time:
//!
//! ```text
//! Idle → Detecting ─┬─ NoMatch ──────────────→ Submitting → Idle
//!                   └─ Matched → Masking ────→ Submitting → Idle
//! ```
//!
//! Triggers arriving while a cycle holds the session lock are dropped.
//! A missing input element aborts the cycle before any side effect. An
//! in-place encrypt whose masked text does not land puts the original
//! text back, so no scramble frame is left in the input.

use crate::config::TimingConfig;
use crate::error::{Error, Result};
use crate::privacy::masking::MaskingEngine;
use crate::privacy::reveal::scramble_plan;
use crate::session::apply::{force_apply, restore_text, ApplyReport};
use crate::session::collaborators::{set_text, HostPage, InputElement};
use crate::session::scheduler::Scheduler;
use crate::session::state::{CyclePhase, SessionContext};
use crate::store::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was running; this trigger was ignored
    Suppressed,
    /// A collaborator was missing or failed; nothing was changed
    Aborted { reason: String },
    /// Input left as typed
    PassedThrough { submitted: bool },
    /// Input replaced with its masked form
    Masked {
        tokens: Vec<String>,
        apply: ApplyReport,
        submitted: bool,
    },
}

impl CycleOutcome {
    /// Whether the send action was triggered
    pub fn submitted(&self) -> bool {
        match self {
            CycleOutcome::PassedThrough { submitted } => *submitted,
            CycleOutcome::Masked { submitted, .. } => *submitted,
            _ => false,
        }
    }
}

/// Drives mask-then-submit cycles against a host page
pub struct SessionCoordinator {
    masking: Arc<MaskingEngine>,
    store: Arc<TokenStore>,
    context: Arc<SessionContext>,
    scheduler: Arc<dyn Scheduler>,
    timing: TimingConfig,
}

impl SessionCoordinator {
    pub fn new(
        masking: Arc<MaskingEngine>,
        store: Arc<TokenStore>,
        context: Arc<SessionContext>,
        scheduler: Arc<dyn Scheduler>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            masking,
            store,
            context,
            scheduler,
            timing,
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Whether host glue should swallow native send events right now
    pub fn should_block_send(&self) -> bool {
        self.context.lock().is_held()
    }

    /// Mask the input if needed, then trigger send
    pub async fn safe_send(&self, page: &dyn HostPage) -> CycleOutcome {
        let Some(_guard) = self.context.lock().try_acquire() else {
            tracing::debug!("Safe send suppressed: cycle already running");
            return CycleOutcome::Suppressed;
        };

        let span = tracing::info_span!("safe_send", cycle = %Uuid::new_v4());
        let outcome = self.safe_send_cycle(page).instrument(span).await;
        self.context.set_phase(CyclePhase::Idle).await;
        outcome
    }

    /// Mask the input in place with a scramble preview, without sending
    pub async fn encrypt(&self, page: &dyn HostPage) -> CycleOutcome {
        let Some(_guard) = self.context.lock().try_acquire() else {
            tracing::debug!("Encrypt suppressed: cycle already running");
            return CycleOutcome::Suppressed;
        };

        let span = tracing::info_span!("encrypt", cycle = %Uuid::new_v4());
        let outcome = self.encrypt_cycle(page).instrument(span).await;
        self.context.set_phase(CyclePhase::Idle).await;
        outcome
    }

    async fn safe_send_cycle(&self, page: &dyn HostPage) -> CycleOutcome {
        self.context.set_phase(CyclePhase::Detecting).await;

        let (input, text) = match self.read_input(page).await {
            Ok(found) => found,
            Err(e) => return abort(e),
        };

        if !self.context.protection().mask_on_input()
            || text.trim().is_empty()
            || !self.masking.contains_pii(&text)
        {
            self.context.set_phase(CyclePhase::NoMatch).await;
            return match self.submit(page).await {
                Ok(()) => CycleOutcome::PassedThrough { submitted: true },
                Err(e) => abort(e),
            };
        }

        self.context.set_phase(CyclePhase::Matched).await;
        let existing = self.store.load().await;
        let outcome = self.masking.mask_against(&text, &existing);
        self.store.save(&outcome.mappings).await;

        self.context.set_phase(CyclePhase::Masking).await;
        let apply = match force_apply(
            input.as_ref(),
            &outcome.masked_text,
            &self.timing.reapply_delays_ms,
            self.scheduler.as_ref(),
        )
        .await
        {
            Ok(report) => report,
            Err(e) => return abort(e),
        };

        if !apply.confirmed {
            // Sending now could submit the raw text the host restored
            tracing::warn!(
                tokens = outcome.tokens.len(),
                "Masked text not confirmed, leaving send to the user"
            );
            return CycleOutcome::Masked {
                tokens: outcome.tokens,
                apply,
                submitted: false,
            };
        }

        self.scheduler
            .sleep(Duration::from_millis(self.timing.submit_delay_ms))
            .await;

        self.context.set_phase(CyclePhase::Submitting).await;
        let submitted = match self.submit(page).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Send after masking failed: {}", e);
                false
            }
        };

        tracing::info!(
            tokens = outcome.tokens.len(),
            attempts = apply.attempts,
            submitted,
            "Masked input before send"
        );

        CycleOutcome::Masked {
            tokens: outcome.tokens,
            apply,
            submitted,
        }
    }

    async fn encrypt_cycle(&self, page: &dyn HostPage) -> CycleOutcome {
        self.context.set_phase(CyclePhase::Detecting).await;

        let (input, text) = match self.read_input(page).await {
            Ok(found) => found,
            Err(e) => return abort(e),
        };

        if !self.context.protection().mask_on_input() || text.trim().is_empty() {
            self.context.set_phase(CyclePhase::NoMatch).await;
            return CycleOutcome::PassedThrough { submitted: false };
        }

        let matches = self.masking.find_matches(&text);
        if matches.is_empty() {
            self.context.set_phase(CyclePhase::NoMatch).await;
            return CycleOutcome::PassedThrough { submitted: false };
        }

        self.context.set_phase(CyclePhase::Matched).await;
        let existing = self.store.load().await;
        let outcome = self.masking.mask_against(&text, &existing);
        self.store.save(&outcome.mappings).await;

        self.context.set_phase(CyclePhase::Masking).await;
        let plan = scramble_plan(
            &mut rand::thread_rng(),
            &text,
            &matches,
            self.timing.scramble_steps,
            outcome.masked_text,
        );
        let interval = Duration::from_millis(self.timing.scramble_interval_ms);
        for frame in &plan.frames {
            if let Err(e) = set_text(input.as_ref(), frame).await {
                tracing::debug!("Scramble frame skipped: {}", e);
            }
            self.scheduler.sleep(interval).await;
        }

        let applied = match force_apply(
            input.as_ref(),
            &plan.final_text,
            &self.timing.reapply_delays_ms,
            self.scheduler.as_ref(),
        )
        .await
        {
            Ok(report) if report.confirmed => Ok(report),
            Ok(report) => Err(format!(
                "masked text not confirmed after {} attempts",
                report.attempts
            )),
            Err(e) => Err(format!("applying masked text failed: {}", e)),
        };

        let apply = match applied {
            Ok(report) => report,
            Err(reason) => {
                // A scramble frame may still be on screen
                tracing::warn!("{}, restoring original input", reason);
                restore_text(
                    input.as_ref(),
                    &text,
                    &self.timing.reapply_delays_ms,
                    self.scheduler.as_ref(),
                )
                .await;
                return CycleOutcome::Aborted { reason };
            }
        };

        tracing::info!(
            tokens = outcome.tokens.len(),
            attempts = apply.attempts,
            "Encrypted input in place"
        );

        CycleOutcome::Masked {
            tokens: outcome.tokens,
            apply,
            submitted: false,
        }
    }

    async fn read_input(
        &self,
        page: &dyn HostPage,
    ) -> Result<(Arc<dyn InputElement>, String)> {
        let input = page
            .input()
            .await
            .ok_or_else(|| Error::CollaboratorNotFound("input element".to_string()))?;
        let text = input.text().await?;
        Ok((input, text))
    }

    async fn submit(&self, page: &dyn HostPage) -> Result<()> {
        let send = page
            .send_control()
            .await
            .ok_or_else(|| Error::CollaboratorNotFound("send control".to_string()))?;
        send.trigger().await
    }
}

fn abort(error: Error) -> CycleOutcome {
    tracing::debug!("Cycle aborted: {}", error);
    CycleOutcome::Aborted {
        reason: error.to_string(),
    }
}
