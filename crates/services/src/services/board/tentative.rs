//! Tentative transitions over tracked entity lists.
//!
//! A mutation is committed locally first and confirmed or rolled back once
//! the remote call returns. Each list carries a revision, bumped on every
//! local change, and each touched entity remembers the revision of the last
//! transition that touched it. Rollback uses them to decide how much to undo:
//!
//! * revision unchanged since the commit: restore the whole snapshot;
//! * otherwise: revert only the entities this transition still owns, so that
//!   newer overlapping mutations survive. Entities owned by a newer
//!   transition are reverted when that one unwinds too.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

use db::models::{comment::Comment, subtask::Subtask, task::Task};

/// Revisions are unique across all lists, so a list rebuilt by a reload or
/// a logout never matches a transition taken on its predecessor.
fn next_revision() -> u64 {
    static REVISION: AtomicU64 = AtomicU64::new(1);
    REVISION.fetch_add(1, Ordering::Relaxed)
}

pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl Entity for Task {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Subtask {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Comment {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Child collections are fetched on demand.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Loadable<T> {
    #[default]
    NotLoaded,
    Loading,
    Loaded(T),
}

impl<T> Loadable<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(&self, f: impl FnOnce(&T) -> U) -> Loadable<U> {
        match self {
            Self::NotLoaded => Loadable::NotLoaded,
            Self::Loading => Loadable::Loading,
            Self::Loaded(value) => Loadable::Loaded(f(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedList<T> {
    items: Vec<T>,
    revision: u64,
    versions: HashMap<String, u64>,
    pending: HashSet<String>,
    orphaned: HashMap<String, Vec<Orphan<T>>>,
}

/// Undo of a failed transition that no longer owned the entity when it
/// failed. Applied once the owning transitions unwind back to it.
#[derive(Debug, Clone, PartialEq)]
struct Orphan<T> {
    revision: u64,
    entry: Option<(usize, T)>,
    prior: Option<u64>,
}

impl<T> Default for TrackedList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            revision: 0,
            versions: HashMap::new(),
            pending: HashSet::new(),
            orphaned: HashMap::new(),
        }
    }
}

/// What a committed transition needs to undo itself.
#[derive(Debug)]
#[must_use]
pub struct Transition<T> {
    snapshot: Vec<T>,
    revision: u64,
    touched: Vec<String>,
    prior_versions: Vec<Option<u64>>,
    created: Option<String>,
}

impl<T> Transition<T> {
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Kind of local change a transition makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Entities with these ids are updated, moved or removed.
    Touch(Vec<String>),
    /// A new entity with this local id is inserted.
    Create(String),
}

impl<T: Entity> TrackedList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    /// The entity was created locally and its insert is still in flight.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Replaces the content after a fetch. Drafts whose insert is still in
    /// flight stay at the end, owned by their create transition.
    pub fn reload(&mut self, items: Vec<T>) {
        let drafts: Vec<T> = self
            .items
            .iter()
            .filter(|item| {
                self.pending.contains(item.id())
                    && !items.iter().any(|fetched| fetched.id() == item.id())
            })
            .cloned()
            .collect();
        self.items = items;
        self.items.extend(drafts);
        self.revision = next_revision();
        let pending = &self.pending;
        self.versions.retain(|id, _| pending.contains(id));
        self.orphaned.clear();
    }

    /// Replaces the content wholesale, dropping drafts too.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
        self.revision = next_revision();
        self.versions.clear();
        self.pending.clear();
        self.orphaned.clear();
    }

    /// Installs `next` as the current content and returns the transition that
    /// can undo it.
    pub fn commit(&mut self, next: Vec<T>, change: Change) -> Transition<T> {
        let snapshot = std::mem::replace(&mut self.items, next);
        self.revision = next_revision();

        let (touched, created) = match change {
            Change::Touch(ids) => (ids, None),
            Change::Create(id) => {
                self.pending.insert(id.clone());
                (vec![id.clone()], Some(id))
            }
        };
        let prior_versions = touched
            .iter()
            .map(|id| self.versions.insert(id.clone(), self.revision))
            .collect();

        Transition {
            snapshot,
            revision: self.revision,
            touched,
            prior_versions,
            created,
        }
    }

    /// Keeps the committed state.
    pub fn confirm(&mut self, transition: Transition<T>) {
        self.release(&transition);
    }

    /// Keeps the committed state and swaps the locally created entity for
    /// the stored one, in place.
    pub fn reconcile(&mut self, transition: Transition<T>, stored: T) {
        if let Some(local_id) = &transition.created {
            let fetched = stored.id() != local_id && self.get(stored.id()).is_some();
            match self.position(local_id) {
                // A reload already brought in the stored row.
                Some(index) if fetched => {
                    self.items.remove(index);
                }
                Some(index) => self.items[index] = stored,
                None => tracing::debug!(local_id, "created entity gone before confirmation"),
            }
            self.revision = next_revision();
        }
        self.release(&transition);
    }

    pub fn rollback(&mut self, transition: Transition<T>) {
        let Transition {
            snapshot,
            revision,
            touched,
            prior_versions,
            created,
        } = transition;

        if self.revision == revision {
            self.items = snapshot;
            for (id, prior) in touched.iter().zip(prior_versions) {
                self.settle(id, prior);
            }
        } else {
            for (id, prior) in touched.iter().zip(prior_versions) {
                let entry = snapshot
                    .iter()
                    .position(|item| item.id() == id)
                    .map(|index| (index, snapshot[index].clone()));
                match self.versions.get(id) {
                    Some(&owner) if owner == revision => {}
                    Some(_) => {
                        // A newer transition owns the entity; undo once it unwinds.
                        self.orphaned.entry(id.clone()).or_default().push(Orphan {
                            revision,
                            entry,
                            prior,
                        });
                        continue;
                    }
                    // Superseded by a confirmed write or a reload.
                    None => continue,
                }
                self.put(id, entry);
                self.settle(id, prior);
            }
        }
        self.revision = next_revision();

        if let Some(local_id) = &created {
            self.pending.remove(local_id);
        }
    }

    /// Hands ownership of `id` back to `prior`, applying the undo of any
    /// failed transition it leads to.
    fn settle(&mut self, id: &str, mut prior: Option<u64>) {
        while let Some(version) = prior {
            let Some(orphan) = self.take_orphan(id, version) else {
                break;
            };
            self.put(id, orphan.entry);
            prior = orphan.prior;
        }
        match prior {
            Some(version) => self.versions.insert(id.to_string(), version),
            None => self.versions.remove(id),
        };
    }

    fn take_orphan(&mut self, id: &str, revision: u64) -> Option<Orphan<T>> {
        let orphans = self.orphaned.get_mut(id)?;
        let index = orphans.iter().position(|o| o.revision == revision)?;
        let orphan = orphans.swap_remove(index);
        if orphans.is_empty() {
            self.orphaned.remove(id);
        }
        Some(orphan)
    }

    /// Puts `entry` back at its recorded index (clamped), or removes the
    /// entity when it did not exist.
    fn put(&mut self, id: &str, entry: Option<(usize, T)>) {
        if let Some(index) = self.position(id) {
            self.items.remove(index);
        }
        if let Some((index, entity)) = entry {
            let index = index.min(self.items.len());
            self.items.insert(index, entity);
        }
    }

    fn release(&mut self, transition: &Transition<T>) {
        for id in &transition.touched {
            if self.versions.get(id) == Some(&transition.revision) {
                self.versions.remove(id);
            }
            // Older failed writes are superseded by this confirmed one.
            if let Some(orphans) = self.orphaned.get_mut(id) {
                orphans.retain(|o| o.revision > transition.revision);
                if orphans.is_empty() {
                    self.orphaned.remove(id);
                }
            }
        }
        if let Some(local_id) = &transition.created {
            self.pending.remove(local_id);
        }
    }
}
