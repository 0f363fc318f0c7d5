mod common;

use anyhow::Result;
use common::fixtures::{seed_library, seed_scenario_a};
use common::setup::TestEnv;
use rmcloud::cache::property_cache::PROPERTY_TYPE;
use rmcloud::{CloudError, FileType, ItemKind, MetadataUpdate, ROOT_ID, TRASH_ID};
use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn ids(items: &[Arc<rmcloud::Item>]) -> HashSet<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

#[tokio::test]
async fn test_scenario_a_children_from_parent_ids() -> Result<()> {
    let env = TestEnv::new()?;
    seed_scenario_a(&env.mock);
    let client = env.client().await?;

    assert_eq!(ids(&client.children(ROOT_ID).await?), HashSet::from(["A".to_string()]));
    assert_eq!(ids(&client.children("A").await?), HashSet::from(["B".to_string()]));
    Ok(())
}

#[tokio::test]
async fn test_scenario_b_version_visible_after_invalidate() -> Result<()> {
    let env = TestEnv::new()?;
    env.mock.add_document("A", "A", ROOT_ID);
    let client = env.client().await?;
    let calls = AtomicUsize::new(0);

    let v1 = client.get_by_id("A").await?;
    assert_eq!(v1.version, 1);
    let kind: String = client
        .get_or_compute(&v1.id, v1.version, PROPERTY_TYPE, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("v1".to_string())
        })
        .await?;
    assert_eq!(kind, "v1");

    env.mock.advance_version("A");
    let before = client.get_by_id("A").await?;
    assert_eq!(before.version, 1);
    assert!(Arc::ptr_eq(&before, &v1));

    client.invalidate_cache();
    let v2 = client.get_by_id("A").await?;
    assert_eq!(v2.version, 2);

    let kind: String = client
        .get_or_compute(&v2.id, v2.version, PROPERTY_TYPE, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("v2".to_string())
        })
        .await?;
    assert_eq!(kind, "v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_scenario_c_conflict_leaves_version_unchanged() -> Result<()> {
    let env = TestEnv::new()?;
    env.mock.add_document("A", "A", ROOT_ID);
    let client = env.client().await?;

    let item = client.get_by_id("A").await?;
    env.mock.advance_version("A");

    let result = client
        .update_metadata("A", &MetadataUpdate::rename("Renamed"), item.version)
        .await;
    assert!(matches!(
        result,
        Err(CloudError::Conflict { expected: 1, actual: Some(2), .. })
    ));

    let after = client.get_by_id("A").await?;
    assert_eq!(after.version, 1);
    assert_eq!(after.name, "A");
    assert_eq!(env.mock.entry("A").map(|entry| entry.name), Some("A".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_tree_is_consistent_with_parent_ids() -> Result<()> {
    let env = TestEnv::new()?;
    seed_library(&env.mock);
    let client = env.client().await?;

    let snapshot = client.snapshot().await?;
    assert_eq!(snapshot.len(), 6);
    for item in snapshot.items() {
        let Some(parent) = item.parent.as_deref() else {
            continue;
        };
        let siblings = client.children(parent).await?;
        assert!(ids(&siblings).contains(&item.id), "{} not under {:?}", item.id, parent);
    }
    assert_eq!(ids(&client.children(TRASH_ID).await?), HashSet::from(["old".to_string()]));
    assert_eq!(env.mock.call_count("list"), 1);
    Ok(())
}

#[tokio::test]
async fn test_virtual_folders_resolve_without_remote() -> Result<()> {
    let env = TestEnv::new()?;
    let client = env.client().await?;

    let root = client.get_by_id(ROOT_ID).await?;
    let trash = client.get_by_id(TRASH_ID).await?;
    assert!(root.is_folder() && trash.is_folder());
    assert_eq!(trash.parent.as_deref(), Some(ROOT_ID));
    assert_eq!(env.mock.call_count("list"), 0);

    assert!(client.children(ROOT_ID).await?.is_empty());
    assert!(client.children(TRASH_ID).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_document_properties_and_content() -> Result<()> {
    let env = TestEnv::new()?;
    seed_library(&env.mock);
    let client = env.client().await?;

    let novel = client.get_by_id("novel").await?;
    assert_eq!(client.document_type(&novel).await?, FileType::Pdf);
    assert_eq!(client.size(&novel).await?, 14);
    assert_eq!(client.raw_size(&novel).await?, 2048);
    assert_eq!(client.document_type(&novel).await?, FileType::Pdf);
    assert_eq!(env.mock.call_count("document_details"), 1);

    let mut contents = String::new();
    client.fetch_contents(&novel).await?.read_to_string(&mut contents)?;
    assert!(contents.starts_with("%PDF"));

    let manual = client.get_by_id("manual").await?;
    assert_eq!(client.size(&manual).await?, "manual package".len() as u64);
    Ok(())
}

#[tokio::test]
async fn test_properties_survive_a_new_session() -> Result<()> {
    let env = TestEnv::new()?;
    seed_library(&env.mock);

    let first = env.client().await?;
    let novel = first.get_by_id("novel").await?;
    assert_eq!(first.document_type(&novel).await?, FileType::Pdf);
    first.close().await;
    drop(first);

    let second = env.client().await?;
    let novel = second.get_by_id("novel").await?;
    assert_eq!(second.document_type(&novel).await?, FileType::Pdf);
    assert_eq!(env.mock.call_count("document_details"), 1);
    Ok(())
}

#[tokio::test]
async fn test_write_operations_round_trip_through_registry() -> Result<()> {
    let env = TestEnv::new()?;
    seed_library(&env.mock);
    let client = env.client().await?;

    let created = client.create("books", "Poems", ItemKind::Folder).await?;
    assert_eq!(created.parent.as_deref(), Some("books"));

    let sketch = client.get_by_id("sketch").await?;
    client.move_item(&sketch, &created.id).await?;
    let sketch = client.get_by_id("sketch").await?;
    assert_eq!(sketch.parent.as_deref(), Some(created.id.as_str()));
    assert_eq!(sketch.version, 2);

    client.rename(&sketch, "Sketchbook").await?;
    let sketch = client.get_by_id("sketch").await?;
    assert_eq!(sketch.name, "Sketchbook");
    assert_eq!(client.parent_of(&sketch).await?.map(|p| p.name.clone()), Some("Poems".to_string()));

    let books = client.get_by_id("books").await?;
    assert!(matches!(
        client.move_item(&books, "fiction").await,
        Err(CloudError::InvalidMove { .. })
    ));

    client.delete(&sketch).await?;
    let sketch = client.get_by_id("sketch").await?;
    assert!(sketch.trashed);
    assert!(ids(&client.children(TRASH_ID).await?).contains("sketch"));

    let restored = client.move_item(&sketch, ROOT_ID).await?;
    assert_eq!(restored, sketch.version + 1);
    assert!(!client.get_by_id("sketch").await?.trashed);
    Ok(())
}

#[tokio::test]
async fn test_removed_items_become_not_found() -> Result<()> {
    let env = TestEnv::new()?;
    seed_library(&env.mock);
    let client = env.client().await?;

    client.get_by_id("manual").await?;
    env.mock.remove_entry("manual");
    client.invalidate_cache();

    let err = client.get_by_id("manual").await.unwrap_err();
    assert!(matches!(err, CloudError::NotFound(ref message) if message.contains("removed")));
    assert!(matches!(
        client.get_by_id("never-existed").await,
        Err(CloudError::NotFound(_))
    ));
    Ok(())
}
