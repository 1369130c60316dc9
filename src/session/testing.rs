//! In-memory host collaborators for tests

use crate::error::{Error, Result};
use crate::session::collaborators::{
    ChangeNotification, HostPage, InputElement, InputKind, NodeId, RenderSurface, SubmitControl,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Write attempts (0-based) in a range fail
#[derive(Default)]
struct WriteFailures {
    attempts: AtomicUsize,
    failing: Mutex<Option<Range<usize>>>,
}

impl WriteFailures {
    fn set(&self, after: usize, count: usize) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = Some(after..after.saturating_add(count));
        }
    }

    /// Register an attempt; error if it falls in the failing range
    fn attempt(&self) -> Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .failing
            .lock()
            .map(|f| f.as_ref().is_some_and(|r| r.contains(&n)))
            .unwrap_or(false);
        if fails {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("write #{} rejected", n + 1),
            )));
        }
        Ok(())
    }
}

pub struct FakeInput {
    kind: InputKind,
    text: RwLock<String>,
    revert_remaining: RwLock<u32>,
    failures: WriteFailures,
    writes: RwLock<Vec<String>>,
    notifications: RwLock<Vec<ChangeNotification>>,
}

impl FakeInput {
    pub fn new(kind: InputKind, text: &str) -> Self {
        Self {
            kind,
            text: RwLock::new(text.to_string()),
            revert_remaining: RwLock::new(0),
            failures: WriteFailures::default(),
            writes: RwLock::new(Vec::new()),
            notifications: RwLock::new(Vec::new()),
        }
    }

    /// The next `n` writes are silently undone by the "host"
    pub async fn revert_writes(&self, n: u32) {
        *self.revert_remaining.write().await = n;
    }

    /// After `after` write attempts, the next `count` fail
    pub fn fail_writes(&self, after: usize, count: usize) {
        self.failures.set(after, count);
    }

    pub async fn current(&self) -> String {
        self.text.read().await.clone()
    }

    pub async fn writes(&self) -> Vec<String> {
        self.writes.read().await.clone()
    }

    pub async fn notifications(&self) -> Vec<ChangeNotification> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl InputElement for FakeInput {
    fn kind(&self) -> InputKind {
        self.kind
    }

    async fn text(&self) -> Result<String> {
        Ok(self.current().await)
    }

    async fn write_text(&self, text: &str) -> Result<()> {
        self.failures.attempt()?;
        self.writes.write().await.push(text.to_string());
        let mut revert = self.revert_remaining.write().await;
        if *revert > 0 {
            *revert -= 1;
            return Ok(());
        }
        *self.text.write().await = text.to_string();
        Ok(())
    }

    async fn notify(&self, notification: ChangeNotification) -> Result<()> {
        self.notifications.write().await.push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSend {
    triggered: AtomicUsize,
}

impl FakeSend {
    pub fn count(&self) -> usize {
        self.triggered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmitControl for FakeSend {
    async fn trigger(&self) -> Result<()> {
        self.triggered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePage {
    pub input: Option<Arc<FakeInput>>,
    pub send: Option<Arc<FakeSend>>,
}

impl FakePage {
    pub fn with_text(kind: InputKind, text: &str) -> Self {
        Self {
            input: Some(Arc::new(FakeInput::new(kind, text))),
            send: Some(Arc::new(FakeSend::default())),
        }
    }

    pub fn without_input() -> Self {
        Self {
            input: None,
            send: Some(Arc::new(FakeSend::default())),
        }
    }

    pub fn input(&self) -> &FakeInput {
        self.input.as_deref().unwrap()
    }

    pub fn sends(&self) -> usize {
        self.send.as_ref().map_or(0, |s| s.count())
    }
}

#[async_trait]
impl HostPage for FakePage {
    async fn input(&self) -> Option<Arc<dyn InputElement>> {
        self.input
            .clone()
            .map(|input| input as Arc<dyn InputElement>)
    }

    async fn send_control(&self) -> Option<Arc<dyn SubmitControl>> {
        self.send.clone().map(|send| send as Arc<dyn SubmitControl>)
    }
}

#[derive(Default)]
pub struct FakeSurface {
    nodes: RwLock<BTreeMap<NodeId, String>>,
    writes: RwLock<Vec<(NodeId, String)>>,
    failures: WriteFailures,
    host_edit: Mutex<Option<(usize, NodeId, String)>>,
}

impl FakeSurface {
    pub async fn add_node(&self, node: NodeId, text: &str) {
        self.nodes.write().await.insert(node, text.to_string());
    }

    pub async fn remove_node(&self, node: NodeId) {
        self.nodes.write().await.remove(&node);
    }

    pub async fn text(&self, node: NodeId) -> Option<String> {
        self.nodes.read().await.get(&node).cloned()
    }

    pub async fn writes(&self) -> Vec<(NodeId, String)> {
        self.writes.read().await.clone()
    }

    /// After `after` write attempts, the next `count` fail
    pub fn fail_writes(&self, after: usize, count: usize) {
        self.failures.set(after, count);
    }

    /// Right after the `nth` successful write, the host re-renders `node`
    /// with `text`
    pub fn edit_after_write(&self, nth: usize, node: NodeId, text: &str) {
        if let Ok(mut edit) = self.host_edit.lock() {
            *edit = Some((nth, node, text.to_string()));
        }
    }
}

#[async_trait]
impl RenderSurface for FakeSurface {
    async fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.read().await.keys().copied().collect()
    }

    async fn node_text(&self, node: NodeId) -> Option<String> {
        self.text(node).await
    }

    async fn set_node_text(&self, node: NodeId, text: &str) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        let slot = nodes
            .get_mut(&node)
            .ok_or_else(|| Error::CollaboratorNotFound(format!("text node {}", node)))?;
        self.failures.attempt()?;
        *slot = text.to_string();

        let mut writes = self.writes.write().await;
        writes.push((node, text.to_string()));
        let edit = self.host_edit.lock().ok().and_then(|mut edit| {
            let due = edit.as_ref().is_some_and(|(nth, _, _)| *nth == writes.len());
            if due {
                edit.take()
            } else {
                None
            }
        });
        if let Some((_, target, host_text)) = edit {
            nodes.insert(target, host_text);
        }
        Ok(())
    }
}
