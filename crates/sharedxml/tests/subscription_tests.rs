use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use sharedxml::store::Value;
use sharedxml::subscribe::Target;
use sharedxml::{encode, Coverage, MemoryStore, Record, SharedStore, Subscriptions};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const REFERENCE: &str = r#"<a x="1"><b>hello</b><c/></a>"#;

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&count);
    (count, move || {
        counted.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_follow_covers_tree_encoded_after_attach() -> TestResult {
    let store = Arc::new(MemoryStore::new());
    let root = store.create_map()?;
    let (count, on_changed) = counter();
    let subscriptions = Subscriptions::new(store.clone(), on_changed);
    assert_eq!(subscriptions.attach(root)?, 1);

    assert!(encode(store.as_ref(), REFERENCE, root));
    assert!(count.load(Ordering::SeqCst) > 0);

    // same coverage as attaching to the finished tree
    let fresh = Subscriptions::new(store.clone(), || {});
    assert_eq!(subscriptions.hook_count(), fresh.attach(root)?);

    // an edit deep in the tree reaches the callback
    let a = Record::read(store.as_ref(), root)?;
    let b = Record::read(store.as_ref(), a.child_ids(store.as_ref())?[0])?;
    let text = b.child_ids(store.as_ref())?[0];
    let before = count.load(Ordering::SeqCst);
    store.set(text, "_value", Value::from("bye"))?;
    assert_eq!(count.load(Ordering::SeqCst), before + 1);
    Ok(())
}

#[test]
fn test_snapshot_needs_reattach_for_encoded_tree() -> TestResult {
    let store = Arc::new(MemoryStore::new());
    let root = store.create_map()?;
    let (count, on_changed) = counter();
    let subscriptions = Subscriptions::with_coverage(store.clone(), Coverage::Snapshot, on_changed);
    subscriptions.attach(root)?;
    assert!(encode(store.as_ref(), REFERENCE, root));

    let a = Record::read(store.as_ref(), root)?;
    let children = a.children.ok_or("no children")?;
    assert!(!subscriptions.is_attached(Target::Sequence(children)));

    subscriptions.attach(root)?;
    assert!(subscriptions.is_attached(Target::Sequence(children)));
    let before = count.load(Ordering::SeqCst);
    store.remove(children, 1, 2)?;
    assert_eq!(count.load(Ordering::SeqCst), before + 1);
    Ok(())
}

#[test]
fn test_repeated_attach_keeps_one_listener_per_object() -> TestResult {
    let store = Arc::new(MemoryStore::new());
    let root = store.create_map()?;
    assert!(encode(store.as_ref(), REFERENCE, root));

    let subscriptions = Subscriptions::new(store.clone(), || {});
    let hooked = subscriptions.attach(root)?;
    for _ in 0..5 {
        assert_eq!(subscriptions.attach(root)?, hooked);
    }
    assert_eq!(store.listener_count(), hooked);

    drop(subscriptions);
    assert_eq!(store.listener_count(), 0);
    Ok(())
}

#[test]
fn test_concurrent_writers_all_notify() -> TestResult {
    let store = Arc::new(MemoryStore::new());
    let root = store.create_map()?;
    assert!(encode(store.as_ref(), "<list><i/><i/><i/><i/></list>", root));
    let items = Record::read(store.as_ref(), root)?.child_ids(store.as_ref())?;

    let (count, on_changed) = counter();
    let subscriptions = Subscriptions::new(store.clone(), on_changed);
    subscriptions.attach(root)?;

    let writers: Vec<_> = items
        .into_iter()
        .map(|item| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..25 {
                    let _ = store.set(item, "_value", Value::from(n.to_string()));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().map_err(|_| "writer panicked")?;
    }

    assert_eq!(count.load(Ordering::SeqCst), 100);
    Ok(())
}

#[test]
fn test_concurrent_attaches_leave_one_listener_per_object() -> TestResult {
    let store = Arc::new(MemoryStore::new());
    let root = store.create_map()?;
    assert!(encode(store.as_ref(), "<a><b/><c/></a>", root));

    let (count, on_changed) = counter();
    let subscriptions = Arc::new(Subscriptions::new(store.clone(), on_changed));
    let attachers: Vec<_> = (0..4)
        .map(|_| {
            let subscriptions = Arc::clone(&subscriptions);
            thread::spawn(move || {
                for _ in 0..500 {
                    let _ = subscriptions.attach(root);
                }
            })
        })
        .collect();
    for attacher in attachers {
        attacher.join().map_err(|_| "attacher panicked")?;
    }

    assert_eq!(store.listener_count(), subscriptions.hook_count());
    let before = count.load(Ordering::SeqCst);
    store.set(root, "_name", Value::from("renamed"))?;
    assert_eq!(count.load(Ordering::SeqCst), before + 1);

    drop(subscriptions);
    assert_eq!(store.listener_count(), 0);
    Ok(())
}
