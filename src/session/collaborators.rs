//! Host page collaborators
//!
//! The engine never touches a real page. It sees the input box, the send
//! control and the rendered response tree through these traits; host glue
//! (or test fakes) implements them.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Identifier of a rendered text node
pub type NodeId = u64;

/// Shape of an input element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Text input control with a directly writable value
    PlainText,
    /// Content-editable region written by content replacement
    RichText,
}

/// Notification dispatched after a programmatic write so the host UI
/// picks the change up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeNotification {
    BeforeInput,
    Input,
    Change,
}

impl InputKind {
    /// Notifications this element shape needs after a write
    pub fn notifications(self) -> &'static [ChangeNotification] {
        match self {
            InputKind::PlainText => &[ChangeNotification::Input, ChangeNotification::Change],
            InputKind::RichText => &[
                ChangeNotification::BeforeInput,
                ChangeNotification::Input,
                ChangeNotification::Change,
            ],
        }
    }
}

/// The chat input box
#[async_trait]
pub trait InputElement: Send + Sync {
    /// Element shape
    fn kind(&self) -> InputKind;

    /// Current text as the user sees it
    async fn text(&self) -> Result<String>;

    /// Replace the whole content
    async fn write_text(&self, text: &str) -> Result<()>;

    /// Dispatch a change notification
    async fn notify(&self, notification: ChangeNotification) -> Result<()>;
}

/// The host's send action
#[async_trait]
pub trait SubmitControl: Send + Sync {
    /// Trigger send
    async fn trigger(&self) -> Result<()>;
}

/// Lookup of the input-side collaborators, which may come and go as the
/// host re-renders
#[async_trait]
pub trait HostPage: Send + Sync {
    /// The input box, if present
    async fn input(&self) -> Option<Arc<dyn InputElement>>;

    /// The send control, if present
    async fn send_control(&self) -> Option<Arc<dyn SubmitControl>>;
}

/// Live tree of rendered response text nodes
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Every text node currently rendered
    async fn node_ids(&self) -> Vec<NodeId>;

    /// Text of a node, `None` once it has been removed
    async fn node_text(&self, node: NodeId) -> Option<String>;

    /// Rewrite a node's text in place
    async fn set_node_text(&self, node: NodeId, text: &str) -> Result<()>;
}

/// Write `text` and dispatch the notifications the element needs
pub async fn set_text(input: &dyn InputElement, text: &str) -> Result<()> {
    input.write_text(text).await?;
    for notification in input.kind().notifications() {
        input.notify(*notification).await?;
    }
    Ok(())
}
