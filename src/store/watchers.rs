// src/store/watchers.rs

use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use super::{Document, Filter, Subscription};

struct Watcher {
    collection: String,
    filter: Filter,
    tx: watch::Sender<Vec<Document>>,
}

/// Tracks live subscriptions and pushes fresh collection state to them.
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: Mutex<Vec<Watcher>>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Watcher>> {
        self.watchers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a watcher seeded with the collection's current documents.
    pub fn register(&self, collection: &str, filter: Filter, docs: &[Document]) -> Subscription {
        let initial = select(&filter, docs);
        let (tx, rx) = watch::channel(initial);
        self.lock().push(Watcher {
            collection: collection.to_string(),
            filter,
            tx,
        });
        Subscription::new(rx)
    }

    /// Whether anyone still listens to `collection`. Drops dead watchers.
    pub fn is_watching(&self, collection: &str) -> bool {
        let mut watchers = self.lock();
        watchers.retain(|w| !w.tx.is_closed());
        watchers.iter().any(|w| w.collection == collection)
    }

    /// Sends the new state of `collection` to every watcher of it.
    pub fn publish(&self, collection: &str, docs: &[Document]) {
        let mut watchers = self.lock();
        watchers.retain(|w| !w.tx.is_closed());
        for watcher in watchers.iter().filter(|w| w.collection == collection) {
            let selected = select(&watcher.filter, docs);
            // Only wake subscribers whose view actually changed.
            watcher.tx.send_if_modified(|current| {
                if *current == selected {
                    return false;
                }
                *current = selected;
                true
            });
        }
    }
}

fn select(filter: &Filter, docs: &[Document]) -> Vec<Document> {
    docs.iter()
        .filter(|doc| filter.matches_document(doc))
        .cloned()
        .collect()
}
