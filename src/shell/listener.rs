//! Session-wide listeners for output lines and command results.

use std::sync::Arc;

use super::command::CommandResult;

/// Listener invoked for every line read from a stream.
pub type LineListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Listener invoked with every finished result.
pub(crate) type ResultListener = Arc<dyn Fn(&CommandResult) + Send + Sync>;

/// Handle returned on registration, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An ordered set of listeners of one kind.
pub(crate) struct ListenerSet<T: ?Sized> {
    entries: Vec<(ListenerId, Arc<T>)>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn insert(&mut self, id: ListenerId, listener: Arc<T>) {
        self.entries.push((id, listener));
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Copy of the current listeners, taken when a command starts.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.iter().map(|(_, listener)| listener.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// All listeners registered on one shell.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    pub stdout: ListenerSet<dyn Fn(&str) + Send + Sync>,
    pub stderr: ListenerSet<dyn Fn(&str) + Send + Sync>,
    pub results: ListenerSet<dyn Fn(&CommandResult) + Send + Sync>,
}

impl Listeners {
    pub fn next_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}
