use std::fs;
use std::sync::Arc;
use std::time::Duration;

use sharedxml::{
    Config, EncodeStatus, LiveView, LoadError, LoadMode, LoadState, Loader, LocalDocumentService,
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const REFERENCE: &str = r#"<a x="1"><b>hello</b><c/></a>"#;

fn loader_with(files: &[(&str, &str)]) -> Result<(TempDir, Loader), std::io::Error> {
    let dir = tempfile::tempdir()?;
    for (name, content) in files {
        fs::write(dir.path().join(name), content)?;
    }
    let config = Config {
        poll_interval: Duration::from_millis(10),
        wait_timeout: Some(Duration::from_secs(1)),
        refetch_debounce: Duration::from_millis(10),
        render_debounce: Duration::from_millis(20),
        ..Config::default()
    }
    .with_data_dir(dir.path());
    let loader = Loader::new(config, Arc::new(LocalDocumentService::default()));
    Ok((dir, loader))
}

#[tokio::test]
async fn test_sync_load_renders_reference() -> TestResult {
    let (_dir, loader) = loader_with(&[("ref.xml", REFERENCE)])?;
    let id = loader.load_document("ref", LoadMode::Sync).await?;

    let session = loader.session(id).ok_or("session missing")?;
    assert_eq!(session.state(), LoadState::Subscribed);
    assert_eq!(session.encode_status(), EncodeStatus::Done);
    assert_eq!(
        loader.render(id)?,
        vec![
            "a",
            "  Attributes:",
            "    x: 1",
            "  Children:",
            "    b",
            "      Children:",
            "        Type: text, Value: hello",
            "    c",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_same_file_and_mode_is_cached() -> TestResult {
    let (_dir, loader) = loader_with(&[("ref.xml", REFERENCE)])?;
    let first = loader.load_document("ref.xml", LoadMode::Sync).await?;
    let second = loader.load_document("REF.xml", LoadMode::Sync).await?;
    assert_eq!(first, second);
    assert_eq!(loader.load_count(), 1);

    let other_mode = loader.load_document("ref", LoadMode::Async).await?;
    assert_ne!(first, other_mode);
    assert_eq!(loader.load_count(), 2);
    assert_eq!(loader.sessions().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_async_load_finishes_in_background() -> TestResult {
    let (_dir, loader) = loader_with(&[("ref.xml", REFERENCE)])?;
    let id = loader.load_document("ref", LoadMode::Async).await?;
    let session = loader.session(id).ok_or("session missing")?;

    assert_eq!(session.wait_encoded().await, EncodeStatus::Done);
    assert_eq!(session.state(), LoadState::Subscribed);
    assert_eq!(loader.render(id)?.len(), 8);
    assert!(*session.changes().borrow() > 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_reported() -> TestResult {
    let (_dir, loader) = loader_with(&[])?;
    let err = loader.load_document("absent", LoadMode::Sync).await.err();
    assert!(matches!(err, Some(LoadError::FileUnreadable { .. })));
    assert!(loader.sessions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_blank_file_name_is_rejected() -> TestResult {
    let (_dir, loader) = loader_with(&[])?;
    let err = loader.load_document("", LoadMode::Async).await.err();
    assert_eq!(
        err.map(|e| e.to_string()).as_deref(),
        Some("File not specified")
    );
    Ok(())
}

#[tokio::test]
async fn test_malformed_sync_load_fails_and_is_not_cached() -> TestResult {
    let (dir, loader) = loader_with(&[("bad.xml", "<a><b></a>")])?;
    let err = loader.load_document("bad", LoadMode::Sync).await.err();
    assert!(matches!(err, Some(LoadError::Encoding { .. })));
    assert!(loader.sessions().is_empty());

    // fixing the file makes the next load succeed
    fs::write(dir.path().join("bad.xml"), "<a/>")?;
    let id = loader.load_document("bad", LoadMode::Sync).await?;
    assert_eq!(loader.render(id)?, vec!["a"]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_async_load_marks_session_failed() -> TestResult {
    let (_dir, loader) = loader_with(&[("bad.xml", "<a>")])?;
    let id = loader.load_document("bad", LoadMode::Async).await?;
    let session = loader.session(id).ok_or("session missing")?;
    assert_eq!(session.wait_encoded().await, EncodeStatus::Failed);
    assert_eq!(session.state(), LoadState::Failed);

    // failed sessions are skipped by the cache
    let retry = loader.load_document("bad", LoadMode::Async).await?;
    assert_ne!(retry, id);
    Ok(())
}

#[tokio::test]
async fn test_unknown_document_render() -> TestResult {
    let (_dir, loader) = loader_with(&[])?;
    let err = loader.render(sharedxml::DocumentId::new()).err();
    assert!(matches!(err, Some(LoadError::UnknownDocument(_))));
    Ok(())
}

#[tokio::test]
async fn test_live_view_of_loaded_document() -> TestResult {
    let (_dir, loader) = loader_with(&[("ref.xml", REFERENCE)])?;
    let id = loader.load_document("ref", LoadMode::Sync).await?;

    let view = LiveView::open(loader.service().as_ref(), id, loader.config()).await?;
    assert_eq!(view.snapshot().as_slice(), loader.render(id)?.as_slice());
    Ok(())
}

#[tokio::test]
async fn test_async_load_seen_by_live_view_is_complete() -> TestResult {
    let mut xml = String::from("<catalog>");
    for n in 0..300 {
        xml.push_str(&format!(r#"<book id="{n}"><title>Title {n}</title></book>"#));
    }
    xml.push_str("</catalog>");
    let (_dir, loader) = loader_with(&[("big.xml", xml.as_str())])?;

    let id = loader.load_document("big", LoadMode::Async).await?;
    let view = LiveView::open(loader.service().as_ref(), id, loader.config()).await?;
    let session = loader.session(id).ok_or("session missing")?;

    let mut updates = view.updates();
    assert_eq!(session.wait_encoded().await, EncodeStatus::Done);
    let expected = session.render();
    // catalog + Children: + 300 × (book, Attributes:, id, Children:, title, Children:, text)
    assert_eq!(expected.len(), 2 + 300 * 7);

    // every write after the view subscribed is followed by a publish
    while view.published().as_slice() != expected.as_slice() {
        updates.changed().await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_async_load_returns_before_encoding() -> TestResult {
    let (_dir, loader) = loader_with(&[("ref.xml", REFERENCE)])?;
    let id = loader.load_document("ref", LoadMode::Async).await?;
    let session = loader.session(id).ok_or("session missing")?;

    assert_eq!(session.encode_status(), EncodeStatus::Pending);
    assert_eq!(session.state(), LoadState::Encoding);
    assert!(loader.render(id)?.is_empty());

    assert_eq!(session.wait_encoded().await, EncodeStatus::Done);
    assert_eq!(session.state(), LoadState::Subscribed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_share_one_session() -> TestResult {
    let (_dir, loader) = loader_with(&[("ref.xml", REFERENCE)])?;
    let loader = Arc::new(loader);

    let loads: Vec<_> = (0..8)
        .map(|_| {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.load_document("ref", LoadMode::Sync).await })
        })
        .collect();
    let mut ids = Vec::new();
    for load in loads {
        ids.push(load.await??);
    }

    let first = *ids.first().ok_or("no loads")?;
    assert!(ids.iter().all(|id| *id == first));
    assert_eq!(loader.load_count(), 1);
    assert_eq!(loader.sessions().len(), 1);
    // sync callers only return once the shared encode finished
    assert_eq!(loader.render(first)?.len(), 8);
    Ok(())
}

#[tokio::test]
async fn test_file_outside_data_dir_is_refused() -> TestResult {
    let outside = tempfile::tempdir()?;
    fs::write(outside.path().join("secret.xml"), REFERENCE)?;
    let (dir, loader) = loader_with(&[])?;
    fs::create_dir(dir.path().join("nested"))?;

    let absolute = outside.path().join("secret.xml");
    let escapes = format!(
        "nested/../../{}/secret",
        outside.path().file_name().ok_or("no dir name")?.to_string_lossy()
    );
    for file in [absolute.to_string_lossy().into_owned(), escapes, "../secret.xml".to_string()] {
        let err = loader.load_document(&file, LoadMode::Sync).await.err();
        assert!(matches!(err, Some(LoadError::FileUnreadable { .. })), "{file} was loaded");
    }
    assert!(loader.sessions().is_empty());
    assert_eq!(loader.load_count(), 0);
    Ok(())
}
