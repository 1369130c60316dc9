//! Decode watcher
//!
//! Consumes render events from the host and rewrites text nodes whose
//! tokens the store can resolve. The host tags events caused by the
//! engine's own writes with [`Origin::Engine`]; those are dropped so the
//! watcher never feeds on itself. Host events that merely echo the
//! engine's last write to a node are dropped as well.
//!
//! A reveal re-reads its node before every write. When the host has
//! changed the node in between (streamed text), the reveal starts over
//! from the new text instead of overwriting it.

use crate::config::TimingConfig;
use crate::privacy::reveal::reveal_plan;
use crate::privacy::unmasking::UnmaskingEngine;
use crate::session::collaborators::{NodeId, RenderSurface};
use crate::session::scheduler::Scheduler;
use crate::session::state::SessionContext;
use crate::store::TokenStore;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Who caused a render change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The host application (new or streamed response text)
    Host,
    /// A write made by this engine
    Engine,
}

/// A text node was added or changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderEvent {
    pub node: NodeId,
    pub origin: Origin,
}

impl RenderEvent {
    pub fn host(node: NodeId) -> Self {
        Self {
            node,
            origin: Origin::Host,
        }
    }

    pub fn engine(node: NodeId) -> Self {
        Self {
            node,
            origin: Origin::Engine,
        }
    }
}

/// Result of processing one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Decoding is switched off
    Disabled,
    /// A reveal is already running on this node; it will look again
    Busy,
    /// Node no longer exists
    Missing,
    /// Node text is the engine's own last write
    Echo,
    /// No token the store can resolve
    NoTokens,
    /// Tokens replaced; the node now holds the decoded text
    Decoded { resolved: usize },
    /// The decoded text could not be written; the tokenized text was put
    /// back
    Failed,
}

/// Node text compared with the engine's last write
enum NodeState {
    Unchanged,
    /// The host changed the node; holds the text to plan from
    Changed(String),
    Gone,
}

/// Watches rendered output and decodes tokens in place
pub struct DecodeWatcher {
    surface: Arc<dyn RenderSurface>,
    unmasking: Arc<UnmaskingEngine>,
    store: Arc<TokenStore>,
    context: Arc<SessionContext>,
    scheduler: Arc<dyn Scheduler>,
    reveal_steps: u32,
    reveal_interval: Duration,
    retry_delays_ms: Vec<u64>,
    in_flight: Mutex<HashSet<NodeId>>,
    dirty: Mutex<HashSet<NodeId>>,
    last_written: Mutex<HashMap<NodeId, String>>,
}

impl DecodeWatcher {
    pub fn new(
        surface: Arc<dyn RenderSurface>,
        unmasking: Arc<UnmaskingEngine>,
        store: Arc<TokenStore>,
        context: Arc<SessionContext>,
        scheduler: Arc<dyn Scheduler>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            surface,
            unmasking,
            store,
            context,
            scheduler,
            reveal_steps: timing.reveal_steps,
            reveal_interval: Duration::from_millis(timing.reveal_interval_ms),
            retry_delays_ms: timing.reapply_delays_ms.clone(),
            in_flight: Mutex::new(HashSet::new()),
            dirty: Mutex::new(HashSet::new()),
            last_written: Mutex::new(HashMap::new()),
        }
    }

    /// Consume events until the channel closes or `cancel` fires.
    ///
    /// Reveals already running are allowed to finish before returning.
    pub async fn run(&self, mut events: mpsc::Receiver<RenderEvent>, cancel: CancellationToken) {
        let mut pending = FuturesUnordered::new();
        let mut open = true;
        tracing::info!("Decode watcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled(), if open => {
                    open = false;
                }
                event = events.recv(), if open => match event {
                    Some(event) => {
                        if self.accepts(&event) {
                            let node = event.node;
                            pending.push(async move { (node, self.process_node(node).await) });
                        }
                    }
                    None => open = false,
                },
                Some((node, outcome)) = pending.next(), if !pending.is_empty() => {
                    tracing::trace!(node, ?outcome, "Node processed");
                }
                else => break,
            }

            if !open && pending.is_empty() {
                break;
            }
        }

        tracing::info!("Decode watcher stopped");
    }

    /// Decode every node currently rendered
    pub async fn run_decode_scan(&self) -> Vec<(NodeId, NodeOutcome)> {
        if !self.context.protection().decode_on_output() {
            return Vec::new();
        }
        let nodes = self.surface.node_ids().await;
        let outcomes =
            futures::future::join_all(nodes.iter().map(|&node| self.process_node(node))).await;
        nodes.into_iter().zip(outcomes).collect()
    }

    /// Decode a single node, with a reveal sequence when tokens resolve.
    ///
    /// A node touched while its reveal runs is reported `Busy` to the
    /// caller and processed again by the running reveal once it ends.
    pub async fn process_node(&self, node: NodeId) -> NodeOutcome {
        if !self.context.protection().decode_on_output() {
            return NodeOutcome::Disabled;
        }
        let Some(_claim) = InFlight::claim(&self.in_flight, node) else {
            if let Ok(mut dirty) = self.dirty.lock() {
                dirty.insert(node);
            }
            return NodeOutcome::Busy;
        };

        let mut outcome = self.reveal_node(node).await;
        while self.take_dirty(node) {
            tracing::debug!(node, "Node touched during reveal, processing again");
            match self.reveal_node(node).await {
                NodeOutcome::Echo => {}
                next => outcome = next,
            }
        }
        outcome
    }

    async fn reveal_node(&self, node: NodeId) -> NodeOutcome {
        let Some(mut text) = self.surface.node_text(node).await else {
            return self.missing(node);
        };
        if self.is_echo(node, &text) {
            return NodeOutcome::Echo;
        }

        'plan: loop {
            if self.unmasking.find_tokens(&text).is_empty() {
                return NodeOutcome::NoTokens;
            }

            let mapping = self.store.load().await;
            let report = self.unmasking.decode_report(&text, &mapping);
            let Some(plan) = reveal_plan(
                &mut rand::thread_rng(),
                &self.unmasking,
                &text,
                &mapping,
                self.reveal_steps,
            ) else {
                return NodeOutcome::NoTokens;
            };

            let mut expected = text.clone();
            for frame in &plan.frames {
                match self.check(node, &text, &expected).await {
                    NodeState::Gone => return self.missing(node),
                    NodeState::Changed(current) => {
                        text = current;
                        continue 'plan;
                    }
                    NodeState::Unchanged => {}
                }
                match self.write(node, frame).await {
                    Ok(()) => expected.clone_from(frame),
                    Err(e) => tracing::debug!(node, "Reveal frame skipped: {}", e),
                }
                self.scheduler.sleep(self.reveal_interval).await;
            }

            match self.check(node, &text, &expected).await {
                NodeState::Gone => return self.missing(node),
                NodeState::Changed(current) => {
                    text = current;
                    continue 'plan;
                }
                NodeState::Unchanged => {}
            }

            if self.write_with_retry(node, &plan.final_text).await {
                tracing::debug!(
                    node,
                    resolved = report.resolved.len(),
                    unresolved = report.unresolved.len(),
                    "Decoded node"
                );
                return NodeOutcome::Decoded {
                    resolved: report.resolved.len(),
                };
            }
            return self.restore(node, &text).await;
        }
    }

    /// Compare the node with `expected`, the engine's last write. Text the
    /// host appended to a frame is carried over onto `source`.
    async fn check(&self, node: NodeId, source: &str, expected: &str) -> NodeState {
        let Some(current) = self.surface.node_text(node).await else {
            return NodeState::Gone;
        };
        if current == expected {
            return NodeState::Unchanged;
        }

        tracing::debug!(node, "Host changed node during reveal, re-planning");
        match current.strip_prefix(expected) {
            Some(appended) => NodeState::Changed(format!("{}{}", source, appended)),
            None => NodeState::Changed(current),
        }
    }

    /// Put the tokenized text back after the decoded write failed
    async fn restore(&self, node: NodeId, source: &str) -> NodeOutcome {
        if self.surface.node_text(node).await.is_none() {
            return self.missing(node);
        }

        tracing::warn!(node, "Writing decoded text failed, restoring tokens");
        if !self.write_with_retry(node, source).await {
            tracing::warn!(node, "Node left with reveal filler");
        }
        // A later scan may try again
        self.forget(node);
        NodeOutcome::Failed
    }

    /// Write `text`, retrying along the reapply schedule while the node
    /// exists
    async fn write_with_retry(&self, node: NodeId, text: &str) -> bool {
        let mut elapsed = 0u64;
        let mut delays = self.retry_delays_ms.iter();
        loop {
            match self.write(node, text).await {
                Ok(()) => return true,
                Err(e) => tracing::debug!(node, "Node write failed: {}", e),
            }

            let Some(&offset) = delays.next() else {
                return false;
            };
            self.scheduler
                .sleep(Duration::from_millis(offset.saturating_sub(elapsed)))
                .await;
            elapsed = elapsed.max(offset);

            if self.surface.node_text(node).await.is_none() {
                return false;
            }
        }
    }

    fn accepts(&self, event: &RenderEvent) -> bool {
        if event.origin == Origin::Engine {
            tracing::trace!(node = event.node, "Ignoring engine write");
            return false;
        }
        self.context.protection().decode_on_output()
    }

    fn is_echo(&self, node: NodeId, text: &str) -> bool {
        self.last_written
            .lock()
            .map(|written| written.get(&node).is_some_and(|last| last == text))
            .unwrap_or(false)
    }

    fn take_dirty(&self, node: NodeId) -> bool {
        self.dirty
            .lock()
            .map(|mut dirty| dirty.remove(&node))
            .unwrap_or(false)
    }

    /// Drop what is remembered about a node
    fn forget(&self, node: NodeId) {
        if let Ok(mut written) = self.last_written.lock() {
            written.remove(&node);
        }
    }

    fn missing(&self, node: NodeId) -> NodeOutcome {
        self.forget(node);
        NodeOutcome::Missing
    }

    async fn write(&self, node: NodeId, text: &str) -> crate::error::Result<()> {
        self.surface.set_node_text(node, text).await?;
        if let Ok(mut written) = self.last_written.lock() {
            written.insert(node, text.to_string());
        }
        Ok(())
    }
}

/// Marks a node as being revealed until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<NodeId>>,
    node: NodeId,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<NodeId>>, node: NodeId) -> Option<Self> {
        let inserted = set.lock().map(|mut s| s.insert(node)).unwrap_or(false);
        inserted.then_some(Self { set, node })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternsConfig;
    use crate::privacy::patterns::PatternRegistry;
    use crate::privacy::token::TokenMapping;
    use crate::session::scheduler::{InstantScheduler, TokioScheduler};
    use crate::session::state::ProtectionState;
    use crate::session::testing::FakeSurface;

    struct Harness {
        watcher: DecodeWatcher,
        surface: Arc<FakeSurface>,
        context: Arc<SessionContext>,
    }

    async fn harness_with(scheduler: Arc<dyn Scheduler>) -> Harness {
        let registry = PatternRegistry::from_config(&PatternsConfig::default()).unwrap();
        let store = Arc::new(TokenStore::in_memory());
        let mut mapping = TokenMapping::new();
        mapping.insert("<THAI_ID>".to_string(), "1234567890123".to_string());
        mapping.insert("<MOBILE>".to_string(), "081-234-5678".to_string());
        store.save(&mapping).await;

        let surface = Arc::new(FakeSurface::default());
        let context = Arc::new(SessionContext::new(Arc::new(ProtectionState::default())));
        let watcher = DecodeWatcher::new(
            surface.clone(),
            Arc::new(UnmaskingEngine::new(&registry).unwrap()),
            store,
            context.clone(),
            scheduler,
            &TimingConfig::default(),
        );
        Harness {
            watcher,
            surface,
            context,
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(InstantScheduler::new())).await
    }

    #[tokio::test]
    async fn test_decodes_node_with_reveal_frames() {
        let h = harness().await;
        h.surface.add_node(1, "Your ID <THAI_ID> and <MOBILE_9>").await;

        let outcome = h.watcher.process_node(1).await;

        assert_eq!(outcome, NodeOutcome::Decoded { resolved: 1 });
        assert_eq!(
            h.surface.text(1).await.unwrap(),
            "Your ID 1234567890123 and <MOBILE_9>"
        );
        let writes = h.surface.writes().await;
        let steps = TimingConfig::default().reveal_steps as usize;
        assert_eq!(writes.len(), steps + 1);
        for (_, frame) in &writes[..steps] {
            assert!(!frame.contains("<THAI_ID>"));
            assert!(frame.ends_with(" and <MOBILE_9>"));
        }
    }

    #[tokio::test]
    async fn test_unknown_tokens_untouched() {
        let h = harness().await;
        h.surface.add_node(1, "stale <THAI_ID_4>").await;

        assert_eq!(h.watcher.process_node(1).await, NodeOutcome::NoTokens);
        assert!(h.surface.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_own_write_is_echo() {
        let h = harness().await;
        h.surface.add_node(1, "call <MOBILE>").await;

        h.watcher.process_node(1).await;
        let writes = h.surface.writes().await.len();

        assert_eq!(h.watcher.process_node(1).await, NodeOutcome::Echo);
        assert_eq!(h.surface.writes().await.len(), writes);
    }

    #[tokio::test]
    async fn test_disabled_does_nothing() {
        let h = harness().await;
        h.context.protection().set_decode_on_output(false);
        h.surface.add_node(1, "<THAI_ID>").await;

        assert_eq!(h.watcher.process_node(1).await, NodeOutcome::Disabled);
        assert!(h.watcher.run_decode_scan().await.is_empty());
        assert_eq!(h.surface.text(1).await.unwrap(), "<THAI_ID>");
    }

    #[tokio::test]
    async fn test_missing_node() {
        let h = harness().await;
        assert_eq!(h.watcher.process_node(42).await, NodeOutcome::Missing);
    }

    #[tokio::test]
    async fn test_decode_scan_covers_all_nodes() {
        let h = harness().await;
        h.surface.add_node(1, "<THAI_ID>").await;
        h.surface.add_node(2, "plain text").await;
        h.surface.add_node(3, "<MOBILE>").await;

        let outcomes = h.watcher.run_decode_scan().await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1], (2, NodeOutcome::NoTokens));
        assert_eq!(h.surface.text(1).await.unwrap(), "1234567890123");
        assert_eq!(h.surface.text(3).await.unwrap(), "081-234-5678");
    }

    #[tokio::test]
    async fn test_run_ignores_engine_events() {
        let h = harness().await;
        h.surface.add_node(1, "<THAI_ID>").await;
        h.surface.add_node(2, "<MOBILE>").await;

        let (tx, rx) = mpsc::channel(8);
        tx.send(RenderEvent::engine(1)).await.unwrap();
        tx.send(RenderEvent::host(2)).await.unwrap();
        drop(tx);

        h.watcher.run(rx, CancellationToken::new()).await;

        assert_eq!(h.surface.text(1).await.unwrap(), "<THAI_ID>");
        assert_eq!(h.surface.text(2).await.unwrap(), "081-234-5678");
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Returns although the sender is still alive
        h.watcher.run(rx, cancel).await;
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_update_during_reveal_is_kept() {
        let h = harness_with(Arc::new(TokioScheduler)).await;
        h.surface.add_node(1, "Your ID <THAI_ID>").await;

        let host = async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            h.surface
                .add_node(1, "Your ID <THAI_ID> is valid, thanks")
                .await;
            h.watcher.process_node(1).await
        };
        let (reveal, event) = tokio::join!(h.watcher.process_node(1), host);

        assert_eq!(event, NodeOutcome::Busy);
        assert_eq!(reveal, NodeOutcome::Decoded { resolved: 1 });
        assert_eq!(
            h.surface.text(1).await.unwrap(),
            "Your ID 1234567890123 is valid, thanks"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_appended_to_frame_is_kept() {
        let h = harness_with(Arc::new(TokioScheduler)).await;
        h.surface.add_node(1, "call <MOBILE>").await;

        let host = async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            let frame = h.surface.text(1).await.unwrap();
            assert!(!frame.contains("<MOBILE>"));
            h.surface.add_node(1, &format!("{} today", frame)).await;
        };
        let (reveal, ()) = tokio::join!(h.watcher.process_node(1), host);

        assert_eq!(reveal, NodeOutcome::Decoded { resolved: 1 });
        assert_eq!(h.surface.text(1).await.unwrap(), "call 081-234-5678 today");
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_touched_after_final_write_is_processed_again() {
        let h = harness_with(Arc::new(TokioScheduler)).await;
        let steps = TimingConfig::default().reveal_steps as usize;
        h.surface.add_node(1, "<THAI_ID>").await;
        // The host re-renders the node right after the decoded text lands
        h.surface.edit_after_write(steps + 1, 1, "<THAI_ID> <MOBILE>");

        let host = async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            h.watcher.process_node(1).await
        };
        let (reveal, event) = tokio::join!(h.watcher.process_node(1), host);

        assert_eq!(event, NodeOutcome::Busy);
        assert_eq!(reveal, NodeOutcome::Decoded { resolved: 2 });
        assert_eq!(
            h.surface.text(1).await.unwrap(),
            "1234567890123 081-234-5678"
        );
    }

    #[tokio::test]
    async fn test_final_write_is_retried() {
        let h = harness().await;
        let steps = TimingConfig::default().reveal_steps as usize;
        h.surface.add_node(1, "<THAI_ID>").await;
        h.surface.fail_writes(steps, 2);

        assert_eq!(
            h.watcher.process_node(1).await,
            NodeOutcome::Decoded { resolved: 1 }
        );
        assert_eq!(h.surface.text(1).await.unwrap(), "1234567890123");
    }

    #[tokio::test]
    async fn test_failed_final_write_restores_tokens() {
        let h = harness().await;
        let timing = TimingConfig::default();
        let steps = timing.reveal_steps as usize;
        h.surface.add_node(1, "Your ID <THAI_ID>").await;
        // The decoded write and all of its retries fail
        h.surface
            .fail_writes(steps, 1 + timing.reapply_delays_ms.len());

        assert_eq!(h.watcher.process_node(1).await, NodeOutcome::Failed);
        assert_eq!(h.surface.text(1).await.unwrap(), "Your ID <THAI_ID>");

        // Not mistaken for an echo on the next pass
        assert_eq!(
            h.watcher.process_node(1).await,
            NodeOutcome::Decoded { resolved: 1 }
        );
    }

    #[tokio::test]
    async fn test_removed_node_is_forgotten() {
        let h = harness().await;
        h.surface.add_node(1, "<THAI_ID>").await;
        h.watcher.process_node(1).await;
        assert!(h.watcher.last_written.lock().unwrap().contains_key(&1));

        h.surface.remove_node(1).await;

        assert_eq!(h.watcher.process_node(1).await, NodeOutcome::Missing);
        assert!(h.watcher.last_written.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_reveal_per_node() {
        let h = harness_with(Arc::new(TokioScheduler)).await;
        h.surface.add_node(1, "<THAI_ID>").await;

        let (first, second) = tokio::join!(h.watcher.process_node(1), h.watcher.process_node(1));

        assert_eq!(first, NodeOutcome::Decoded { resolved: 1 });
        assert_eq!(second, NodeOutcome::Busy);
        assert_eq!(h.surface.text(1).await.unwrap(), "1234567890123");
    }
}
