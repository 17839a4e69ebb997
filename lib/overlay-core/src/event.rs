//! Change events delivered by a binding feed

use futures::stream::BoxStream;
use kube::core::WatchEvent;
use overlay_api::{NetBinding, NetBindingSpec, Vnid};

/// A single change to a NetBinding, in store commit order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingEvent {
    Added(NetBindingSpec),
    Modified(NetBindingSpec),
    Deleted(NetBindingSpec),
    /// Anything the feed delivered that is not a binding change
    Unknown(String),
}

impl BindingEvent {
    /// Convert a watch event from the API server. Bookmarks carry no change
    /// and are dropped.
    pub fn from_watch(event: WatchEvent<NetBinding>) -> Option<Self> {
        match event {
            WatchEvent::Added(binding) => Some(BindingEvent::Added(binding.spec)),
            WatchEvent::Modified(binding) => Some(BindingEvent::Modified(binding.spec)),
            WatchEvent::Deleted(binding) => Some(BindingEvent::Deleted(binding.spec)),
            WatchEvent::Bookmark(_) => None,
            WatchEvent::Error(e) => Some(BindingEvent::Unknown(format!(
                "{} ({}): {}",
                e.reason, e.code, e.message
            ))),
        }
    }

    pub fn binding(&self) -> Option<&NetBindingSpec> {
        match self {
            BindingEvent::Added(b) | BindingEvent::Modified(b) | BindingEvent::Deleted(b) => Some(b),
            BindingEvent::Unknown(_) => None,
        }
    }

    pub fn vnid(&self) -> Option<Vnid> {
        self.binding().map(|b| b.vnid)
    }

    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            BindingEvent::Added(_) => "added",
            BindingEvent::Modified(_) => "modified",
            BindingEvent::Deleted(_) => "deleted",
            BindingEvent::Unknown(_) => "unknown",
        }
    }
}

/// Live change events, ending when the underlying watch closes
pub type BindingEventStream = BoxStream<'static, BindingEvent>;

/// Result of a list-then-watch: the bindings present at the listed version
/// followed by every change committed after it
pub struct BindingSubscription {
    pub initial: Vec<NetBindingSpec>,
    pub events: BindingEventStream,
}
