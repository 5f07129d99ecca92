//! Change subscriptions over every record, attribute map and children sequence
//! reachable from a root record.
//!
//! [`Subscriptions::attach`] walks the tree depth-first in sequence order and
//! hooks each object once; hooking an object again replaces its previous hook,
//! so repeated attaches never produce duplicate notifications.
//!
//! With [`Coverage::Follow`] the hooks extend themselves: records inserted into
//! a hooked sequence, and handles newly written to `_children`/`_attributes`,
//! are hooked as they appear. With [`Coverage::Snapshot`] coverage is exactly
//! what the last `attach` saw and callers re-attach after structural changes.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::record::{resolve_map, ATTRIBUTES, CHILDREN};
use crate::store::{
    ChangeEvent, Listener, ListenerId, MapId, SequenceId, SequenceOp, SharedStore, Value,
};

/// Shared object a hook is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Map(MapId),
    Sequence(SequenceId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Coverage {
    /// Hook records and sequences as they are added
    #[default]
    Follow,
    /// Only what existed at the last `attach`
    Snapshot,
}

pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    store: Arc<dyn SharedStore>,
    on_changed: ChangeCallback,
    coverage: Coverage,
    hooks: Mutex<HashMap<Target, ListenerId>>,
}

/// Set of hooks that report any change in a record tree through one callback
pub struct Subscriptions {
    inner: Arc<Inner>,
}

impl Subscriptions {
    pub fn new(store: Arc<dyn SharedStore>, on_changed: impl Fn() + Send + Sync + 'static) -> Self {
        Self::with_coverage(store, Coverage::default(), on_changed)
    }

    pub fn with_coverage(
        store: Arc<dyn SharedStore>,
        coverage: Coverage,
        on_changed: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                on_changed: Arc::new(on_changed),
                coverage,
                hooks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Hook everything currently reachable from `root`; returns the number of
    /// hooks (re)attached.
    pub fn attach(&self, root: MapId) -> Result<usize> {
        let count = self.inner.attach_record(root)?;
        debug!(hooks = count, "attached change subscriptions under {root}");
        Ok(count)
    }

    /// Remove every hook; returns how many were removed
    pub fn detach(&self) -> usize {
        let hooks: Vec<ListenerId> = self.inner.hooks.lock().drain().map(|(_, id)| id).collect();
        hooks
            .into_iter()
            .filter(|id| self.inner.store.off(*id))
            .count()
    }

    pub fn is_attached(&self, target: Target) -> bool {
        self.inner.hooks.lock().contains_key(&target)
    }

    pub fn hook_count(&self) -> usize {
        self.inner.hooks.lock().len()
    }

    pub fn coverage(&self) -> Coverage {
        self.inner.coverage
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("coverage", &self.inner.coverage)
            .field("hooks", &self.hook_count())
            .finish()
    }
}

impl Inner {
    fn hook(self: &Arc<Self>, target: Target) -> Result<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let listener: Listener = Arc::new(move |event: &ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.changed(event);
            }
        });

        // replace and register under one lock so concurrent attaches of the
        // same target leave exactly one listener; the store never calls
        // listeners while registering
        let mut hooks = self.hooks.lock();
        if let Some(previous) = hooks.remove(&target) {
            self.store.off(previous);
        }
        let id = match target {
            Target::Map(map) => self.store.on_value_changed(map, listener)?,
            Target::Sequence(sequence) => self.store.on_op(sequence, listener)?,
        };
        hooks.insert(target, id);
        Ok(())
    }

    fn unhook(&self, target: Target) {
        let hooked = self.hooks.lock().remove(&target);
        if let Some(id) = hooked {
            self.store.off(id);
        }
    }

    fn attach_record(self: &Arc<Self>, map: MapId) -> Result<usize> {
        let map = resolve_map(self.store.as_ref(), map)?;
        self.hook(Target::Map(map))?;
        let mut count = 1;

        if let Some(Value::Map(attributes)) = self.store.get(map, ATTRIBUTES)? {
            if self.store.contains_map(attributes) {
                self.hook(Target::Map(attributes))?;
                count += 1;
            }
        }
        if let Some(Value::Sequence(children)) = self.store.get(map, CHILDREN)? {
            count += self.attach_sequence(children)?;
        }
        Ok(count)
    }

    fn attach_sequence(self: &Arc<Self>, sequence: SequenceId) -> Result<usize> {
        self.hook(Target::Sequence(sequence))?;
        let mut count = 1;

        let len = self.store.item_count(sequence)?;
        for child in self.store.items(sequence, 0, len)? {
            match self.attach_record(child) {
                Ok(hooked) => count += hooked,
                // not replicated yet; an insert or a later attach picks it up
                Err(err) => debug!("skipping {child} in {sequence}: {err}"),
            }
        }
        Ok(count)
    }

    fn detach_record(&self, map: MapId) {
        self.unhook(Target::Map(map));
        if let Ok(Some(Value::Map(attributes))) = self.store.get(map, ATTRIBUTES) {
            self.unhook(Target::Map(attributes));
        }
        if let Ok(Some(Value::Sequence(children))) = self.store.get(map, CHILDREN) {
            self.unhook(Target::Sequence(children));
            let len = self.store.item_count(children).unwrap_or_default();
            for child in self.store.items(children, 0, len).unwrap_or_default() {
                self.detach_record(child);
            }
        }
    }

    fn changed(self: &Arc<Self>, event: &ChangeEvent) {
        if self.coverage == Coverage::Follow {
            if let Err(err) = self.follow(event) {
                debug!("could not extend subscriptions: {err}");
            }
        }
        (self.on_changed)();
    }

    fn follow(self: &Arc<Self>, event: &ChangeEvent) -> Result<()> {
        match event {
            ChangeEvent::ValueChanged { map, key, previous } => {
                if key != CHILDREN && key != ATTRIBUTES {
                    return Ok(());
                }
                match previous {
                    Some(Value::Sequence(old)) => self.unhook(Target::Sequence(*old)),
                    Some(Value::Map(old)) => self.unhook(Target::Map(*old)),
                    _ => {}
                }
                match self.store.get(*map, key)? {
                    Some(Value::Sequence(children)) => {
                        self.attach_sequence(children)?;
                    }
                    Some(Value::Map(attributes)) => self.hook(Target::Map(attributes))?,
                    _ => {}
                }
            }
            ChangeEvent::SequenceOp { op, .. } => match op {
                SequenceOp::Insert { items, .. } => {
                    for item in items {
                        if let Err(err) = self.attach_record(*item) {
                            debug!("inserted {item} not yet available: {err}");
                        }
                    }
                }
                SequenceOp::Remove { items, .. } => {
                    for item in items {
                        self.detach_record(*item);
                    }
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::encode::encode;
    use crate::store::MemoryStore;

    fn tree(xml: &str) -> Result<(Arc<MemoryStore>, MapId)> {
        let store = Arc::new(MemoryStore::new());
        let root = store.create_map()?;
        assert!(encode(store.as_ref(), xml, root));
        Ok((store, root))
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        (count, move || {
            sink.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_attach_hooks_every_object() -> Result<()> {
        let (store, root) = tree("<a x=\"1\"><b>hello</b><c/></a>")?;
        let (_, callback) = counter();
        let subs = Subscriptions::new(store, callback);
        // a, a@, a[], b, b@, b[], text, c, c@
        assert_eq!(subs.attach(root)?, 9);
        assert_eq!(subs.hook_count(), 9);
        assert!(subs.is_attached(Target::Map(root)));
        Ok(())
    }

    #[test]
    fn test_double_attach_notifies_once() -> Result<()> {
        let (store, root) = tree("<a><b/></a>")?;
        let (count, callback) = counter();
        let subs = Subscriptions::new(Arc::clone(&store) as Arc<dyn SharedStore>, callback);
        subs.attach(root)?;
        subs.attach(root)?;
        let listeners = store.listener_count();

        store.set(root, "_name", Value::from("renamed"))?;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(listeners, subs.hook_count());
        Ok(())
    }

    #[test]
    fn test_follow_hooks_inserted_records() -> Result<()> {
        let (store, root) = tree("<a><b/></a>")?;
        let (count, callback) = counter();
        let subs = Subscriptions::new(Arc::clone(&store) as Arc<dyn SharedStore>, callback);
        subs.attach(root)?;

        let children = store
            .get(root, CHILDREN)?
            .and_then(|v| v.as_sequence())
            .ok_or_else(|| crate::error::Error::not_found("children"))?;
        let added = store.create_map()?;
        store.insert(children, 1, vec![added])?;
        assert!(subs.is_attached(Target::Map(added)));

        store.set(added, "_type", Value::from("text"))?;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_snapshot_coverage_ignores_new_records() -> Result<()> {
        let (store, root) = tree("<a><b/></a>")?;
        let (count, callback) = counter();
        let subs = Subscriptions::with_coverage(
            Arc::clone(&store) as Arc<dyn SharedStore>,
            Coverage::Snapshot,
            callback,
        );
        subs.attach(root)?;

        let children = store
            .get(root, CHILDREN)?
            .and_then(|v| v.as_sequence())
            .ok_or_else(|| crate::error::Error::not_found("children"))?;
        let added = store.create_map()?;
        store.insert(children, 1, vec![added])?;
        store.set(added, "_type", Value::from("text"))?;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        subs.attach(root)?;
        store.set(added, "_value", Value::from("now seen"))?;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_follow_children_written_later() -> Result<()> {
        let (store, root) = tree("<a/>")?;
        let (count, callback) = counter();
        let subs = Subscriptions::new(Arc::clone(&store) as Arc<dyn SharedStore>, callback);
        subs.attach(root)?;

        let children = store.create_sequence()?;
        store.set(root, CHILDREN, Value::from(children))?;
        assert!(subs.is_attached(Target::Sequence(children)));
        store.insert(children, 0, vec![store.create_map()?])?;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_removed_records_are_unhooked() -> Result<()> {
        let (store, root) = tree("<a><b><c/></b></a>")?;
        let (_, callback) = counter();
        let subs = Subscriptions::new(Arc::clone(&store) as Arc<dyn SharedStore>, callback);
        subs.attach(root)?;
        let before = subs.hook_count();

        let children = store
            .get(root, CHILDREN)?
            .and_then(|v| v.as_sequence())
            .ok_or_else(|| crate::error::Error::not_found("children"))?;
        store.remove(children, 0, 1)?;
        // b, b@, b[], c, c@
        assert_eq!(subs.hook_count(), before - 5);
        Ok(())
    }

    #[test]
    fn test_drop_detaches() -> Result<()> {
        let (store, root) = tree("<a><b/></a>")?;
        let (_, callback) = counter();
        let subs = Subscriptions::new(Arc::clone(&store) as Arc<dyn SharedStore>, callback);
        subs.attach(root)?;
        assert!(store.listener_count() > 0);
        drop(subs);
        assert_eq!(store.listener_count(), 0);
        Ok(())
    }

    #[test]
    fn test_coverage_is_reported() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let follow = Subscriptions::new(Arc::clone(&store), || {});
        assert_eq!(follow.coverage(), Coverage::Follow);
        let snapshot = Subscriptions::with_coverage(store, Coverage::Snapshot, || {});
        assert_eq!(snapshot.coverage(), Coverage::Snapshot);
    }
}
