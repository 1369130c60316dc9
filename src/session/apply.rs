//! Forced text application
//!
//! Reactive host UIs sometimes revert a programmatic write. The write is
//! re-applied along an increasing delay schedule until a read-back shows
//! the text stuck. This is best effort: an unconfirmed apply is reported,
//! never raised.

use crate::error::Result;
use crate::session::collaborators::{set_text, InputElement};
use crate::session::scheduler::Scheduler;
use std::time::Duration;

/// Outcome of a forced apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    /// Number of writes performed
    pub attempts: u32,
    /// Whether a read-back matched the intended text
    pub confirmed: bool,
}

/// Write `text` and re-apply it at each offset of `schedule_ms` (measured
/// from the first write) while the read-back differs.
pub async fn force_apply(
    input: &dyn InputElement,
    text: &str,
    schedule_ms: &[u64],
    scheduler: &dyn Scheduler,
) -> Result<ApplyReport> {
    set_text(input, text).await?;
    let mut attempts = 1;
    let mut elapsed = 0u64;

    for &offset in schedule_ms {
        let wait = offset.saturating_sub(elapsed);
        scheduler.sleep(Duration::from_millis(wait)).await;
        elapsed = elapsed.max(offset);

        if input.text().await? == text {
            return Ok(ApplyReport {
                attempts,
                confirmed: true,
            });
        }

        tracing::debug!(attempt = attempts + 1, offset_ms = offset, "Input reverted, re-applying");
        set_text(input, text).await?;
        attempts += 1;
    }

    let confirmed = input.text().await? == text;
    if !confirmed {
        tracing::warn!(attempts, "Programmatic write was not confirmed by the host");
    }
    Ok(ApplyReport {
        attempts,
        confirmed,
    })
}

/// Put `text` back after a failed apply, tolerating write errors.
///
/// Tries once immediately and again at each offset of `schedule_ms`.
/// Returns whether a read-back showed `text`.
pub async fn restore_text(
    input: &dyn InputElement,
    text: &str,
    schedule_ms: &[u64],
    scheduler: &dyn Scheduler,
) -> bool {
    let mut elapsed = 0u64;
    let mut attempt = 0usize;
    let mut next_wait = Some(0u64);

    while let Some(wait) = next_wait {
        scheduler.sleep(Duration::from_millis(wait)).await;
        match set_text(input, text).await {
            Ok(()) => {
                if matches!(input.text().await, Ok(current) if current == text) {
                    return true;
                }
            }
            Err(e) => tracing::debug!(attempt = attempt + 1, "Restore write failed: {}", e),
        }

        next_wait = schedule_ms.get(attempt).map(|&offset| {
            let wait = offset.saturating_sub(elapsed);
            elapsed = elapsed.max(offset);
            wait
        });
        attempt += 1;
    }

    tracing::warn!(attempts = attempt, "Could not restore input text");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::collaborators::{ChangeNotification, InputKind};
    use crate::session::scheduler::InstantScheduler;
    use crate::session::testing::FakeInput;

    const SCHEDULE: [u64; 7] = [0, 50, 100, 200, 400, 700, 1000];

    #[tokio::test]
    async fn test_apply_confirmed_first_read() {
        let input = FakeInput::new(InputKind::PlainText, "raw");
        let scheduler = InstantScheduler::new();

        let report = force_apply(&input, "masked", &SCHEDULE, &scheduler)
            .await
            .unwrap();

        assert_eq!(report, ApplyReport { attempts: 1, confirmed: true });
        assert_eq!(input.current().await, "masked");
        assert_eq!(
            input.notifications().await,
            vec![ChangeNotification::Input, ChangeNotification::Change]
        );
    }

    #[tokio::test]
    async fn test_apply_retries_after_revert() {
        let input = FakeInput::new(InputKind::RichText, "raw");
        input.revert_writes(2).await;
        let scheduler = InstantScheduler::new();

        let report = force_apply(&input, "masked", &SCHEDULE, &scheduler)
            .await
            .unwrap();

        assert_eq!(report, ApplyReport { attempts: 3, confirmed: true });
        assert_eq!(input.current().await, "masked");
        // Waits follow the schedule deltas: 0, 50, 50
        assert_eq!(
            scheduler.pauses(),
            vec![
                Duration::from_millis(0),
                Duration::from_millis(50),
                Duration::from_millis(50)
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_propagates_write_error() {
        let input = FakeInput::new(InputKind::PlainText, "raw");
        input.fail_writes(0, 1);
        let scheduler = InstantScheduler::new();

        assert!(force_apply(&input, "masked", &SCHEDULE, &scheduler)
            .await
            .is_err());
        assert_eq!(input.current().await, "raw");
    }

    #[tokio::test]
    async fn test_restore_retries_through_write_errors() {
        let input = FakeInput::new(InputKind::RichText, "@#%?");
        input.fail_writes(0, 3);
        let scheduler = InstantScheduler::new();

        assert!(restore_text(&input, "original", &SCHEDULE, &scheduler).await);
        assert_eq!(input.current().await, "original");
        assert_eq!(input.writes().await, vec!["original"]);
    }

    #[tokio::test]
    async fn test_restore_gives_up_after_schedule() {
        let input = FakeInput::new(InputKind::PlainText, "@#%?");
        input.fail_writes(0, usize::MAX);
        let scheduler = InstantScheduler::new();

        assert!(!restore_text(&input, "original", &SCHEDULE, &scheduler).await);
        assert_eq!(scheduler.pauses().len(), 1 + SCHEDULE.len());
        let total: Duration = scheduler.pauses().iter().sum();
        assert_eq!(total, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_apply_unconfirmed_is_reported() {
        let input = FakeInput::new(InputKind::PlainText, "raw");
        input.revert_writes(u32::MAX).await;
        let scheduler = InstantScheduler::new();

        let report = force_apply(&input, "masked", &SCHEDULE, &scheduler)
            .await
            .unwrap();

        assert!(!report.confirmed);
        assert_eq!(report.attempts, 1 + SCHEDULE.len() as u32);
        let total: Duration = scheduler.pauses().iter().sum();
        assert_eq!(total, Duration::from_millis(1000));
    }
}
