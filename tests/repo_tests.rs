#![cfg(feature = "inmem-store")]

use adboard::{
    models::{AdFilter, AdStatus, NewAd, NewAdFile},
    repo::{inmem::InMemRepo, Precondition, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use adboard::repo::{AdFileRepo, AdRepo};
use chrono::Utc;

fn new_ad(author: &str, title: &str, category_id: i64) -> NewAd {
    let now = Utc::now();
    NewAd {
        author_id: author.into(),
        title: title.into(),
        description: String::new(),
        location: "Paris".into(),
        category_id,
        status: AdStatus::Pending,
        is_active: false,
        created_at: now,
        updated_at: now,
    }
}

fn new_file(ad_id: i64, name: &str) -> NewAdFile {
    NewAdFile {
        ad_id,
        file_name: name.into(),
        url: format!("storage/ad_{ad_id}/{name}"),
    }
}

#[tokio::test]
async fn ad_crud_and_preconditions() {
    let r = InMemRepo::new();

    // starts empty
    assert!(r.list_ads().await.unwrap().is_empty());

    let ad = r.create_ad(new_ad("u1", "Bike", 1)).await.unwrap();
    assert_eq!(r.get_ad(ad.id).await.unwrap().title, "Bike");

    // matching precondition lands
    let mut edit = ad.clone();
    edit.title = "Red bike".into();
    edit.updated_at = ad.updated_at + chrono::Duration::seconds(1);
    r.update_ad(&edit, Precondition::UpdatedAt(ad.updated_at)).await.unwrap();

    // the original timestamp is stale now
    let mut again = ad.clone();
    again.title = "Blue bike".into();
    let err = r.update_ad(&again, Precondition::UpdatedAt(ad.updated_at)).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
    assert_eq!(r.get_ad(ad.id).await.unwrap().title, "Red bike");

    // unconditioned write always lands
    r.update_ad(&again, Precondition::Any).await.unwrap();
    assert_eq!(r.get_ad(ad.id).await.unwrap().title, "Blue bike");

    // missing rows are NotFound, not Conflict
    let mut ghost = ad.clone();
    ghost.id = 999;
    assert!(matches!(r.update_ad(&ghost, Precondition::Any).await, Err(RepoError::NotFound)));
    assert!(matches!(r.delete_ad(999, Precondition::Any).await, Err(RepoError::NotFound)));
    assert!(matches!(r.get_ad(999).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn update_never_touches_author_or_created_at() {
    let r = InMemRepo::new();
    let ad = r.create_ad(new_ad("u1", "Bike", 1)).await.unwrap();
    let mut forged = ad.clone();
    forged.author_id = "u2".into();
    forged.created_at = Utc::now() + chrono::Duration::days(1);
    r.update_ad(&forged, Precondition::Any).await.unwrap();

    let stored = r.get_ad(ad.id).await.unwrap();
    assert_eq!(stored.author_id, "u1");
    assert_eq!(stored.created_at, ad.created_at);
}

#[tokio::test]
async fn approve_and_reject_set_the_moderation_fields() {
    let r = InMemRepo::new();
    let a = r.create_ad(new_ad("u1", "A", 1)).await.unwrap();
    let b = r.create_ad(new_ad("u1", "B", 1)).await.unwrap();

    r.approve_ad(a.id, Utc::now(), Precondition::UpdatedAt(a.updated_at)).await.unwrap();
    r.reject_ad(b.id, "spam", Utc::now(), Precondition::Any).await.unwrap();

    let a = r.get_ad(a.id).await.unwrap();
    assert_eq!(a.status, AdStatus::Approved);
    assert!(a.is_active);
    let b = r.get_ad(b.id).await.unwrap();
    assert_eq!(b.status, AdStatus::Rejected);
    assert_eq!(b.rejection_reason.as_deref(), Some("spam"));
    assert!(!b.is_active);

    let stats = r.ad_statistics().await.unwrap();
    assert_eq!((stats.total, stats.published, stats.pending, stats.rejected), (2, 1, 0, 1));
}

#[tokio::test]
async fn filter_by_author_status_category_and_page() {
    let r = InMemRepo::new();
    for i in 0..4 {
        r.create_ad(new_ad("u1", &format!("cat1-{i}"), 1)).await.unwrap();
    }
    let other = r.create_ad(new_ad("u1", "cat2", 2)).await.unwrap();
    r.create_ad(new_ad("u2", "foreign", 1)).await.unwrap();
    r.approve_ad(other.id, Utc::now(), Precondition::Any).await.unwrap();

    let u1 = AdFilter { author_id: Some("u1".into()), ..Default::default() };
    assert_eq!(r.filter_ads(&u1).await.unwrap().len(), 5);

    let cat1 = AdFilter { category_id: Some(1), ..u1.clone() };
    assert_eq!(r.filter_ads(&cat1).await.unwrap().len(), 4);

    let paged = AdFilter { limit: Some(3), page: Some(2), ..cat1.clone() };
    let titles: Vec<_> = r.filter_ads(&paged).await.unwrap().into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec!["cat1-3"]);

    let live = AdFilter { status: Some(AdStatus::Approved), active_only: true, ..Default::default() };
    let live = r.filter_ads(&live).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, other.id);

    let beyond = AdFilter { limit: Some(10), page: Some(5), ..u1 };
    assert!(r.filter_ads(&beyond).await.unwrap().is_empty());
}

#[tokio::test]
async fn files_bind_to_existing_ads_with_unique_urls() {
    let r = InMemRepo::new();
    let ad = r.create_ad(new_ad("u1", "Bike", 1)).await.unwrap();

    let f = r.create_file(new_file(ad.id, "a.png")).await.unwrap();
    assert_eq!(f.ad_id, ad.id);
    assert!(matches!(r.create_file(new_file(ad.id, "a.png")).await, Err(RepoError::Conflict)));
    assert!(matches!(r.create_file(new_file(999, "a.png")).await, Err(RepoError::NotFound)));

    // wrong ad for this file
    assert!(matches!(r.delete_file(ad.id + 100, f.id).await, Err(RepoError::NotFound)));
    let removed = r.delete_file(ad.id, f.id).await.unwrap();
    assert_eq!(removed.url, f.url);
    assert!(r.list_files(ad.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_ad_cascades_file_rows() {
    let r = InMemRepo::new();
    let a = r.create_ad(new_ad("u1", "A", 1)).await.unwrap();
    let b = r.create_ad(new_ad("u1", "B", 1)).await.unwrap();
    r.create_file(new_file(a.id, "1.png")).await.unwrap();
    r.create_file(new_file(a.id, "2.png")).await.unwrap();
    r.create_file(new_file(b.id, "3.png")).await.unwrap();

    r.delete_ad(a.id, Precondition::UpdatedAt(a.updated_at)).await.unwrap();
    assert!(r.list_files(a.id).await.unwrap().is_empty());
    assert_eq!(r.list_files(b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let first = InMemRepo::with_snapshot(&path);
    let ad = first.create_ad(new_ad("u1", "Bike", 1)).await.unwrap();
    first.create_file(new_file(ad.id, "a.png")).await.unwrap();
    drop(first);

    let second = InMemRepo::with_snapshot(&path);
    assert_eq!(second.get_ad(ad.id).await.unwrap().title, "Bike");
    assert_eq!(second.list_files(ad.id).await.unwrap().len(), 1);
    // ids keep counting from where the snapshot left off
    let next = second.create_ad(new_ad("u1", "Car", 1)).await.unwrap();
    assert!(next.id > ad.id + 1);
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{not json").unwrap();
    let r = InMemRepo::with_snapshot(&path);
    assert!(r.list_ads().await.unwrap().is_empty());
}
