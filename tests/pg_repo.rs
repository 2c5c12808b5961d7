#![cfg(feature = "postgres-store")]

use adboard::models::{AdFilter, AdStatus, NewAd, NewAdFile};
use adboard::repo::pg::PgRepo;
use adboard::repo::{AdFileRepo, AdRepo, Precondition, RepoError};
use chrono::Utc;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;

async fn repo() -> Option<PgRepo> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres test");
        return None;
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.unwrap();
    let repo = PgRepo::new(pool);
    repo.migrate().await.unwrap();
    Some(repo)
}

// Author ids are unique per run so tests can share a database.
fn author(tag: &str) -> String {
    format!("{tag}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn new_ad(author_id: &str, title: &str) -> NewAd {
    let now = Utc::now();
    NewAd {
        author_id: author_id.into(),
        title: title.into(),
        description: String::new(),
        location: "Lyon".into(),
        category_id: 1,
        status: AdStatus::Pending,
        is_active: false,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[serial]
async fn conditioned_writes_distinguish_conflict_from_missing() {
    let Some(r) = repo().await else { return };
    let ad = r.create_ad(new_ad(&author("pg-cas"), "Bike")).await.unwrap();
    let loaded = r.get_ad(ad.id).await.unwrap();

    let mut edit = loaded.clone();
    edit.title = "Red bike".into();
    edit.updated_at = loaded.updated_at + chrono::Duration::seconds(1);
    r.update_ad(&edit, Precondition::UpdatedAt(loaded.updated_at)).await.unwrap();

    let err = r.approve_ad(ad.id, Utc::now(), Precondition::UpdatedAt(loaded.updated_at)).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    r.delete_ad(ad.id, Precondition::Any).await.unwrap();
    let err = r.approve_ad(ad.id, Utc::now(), Precondition::Any).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
#[serial]
async fn files_are_unique_and_cascade() {
    let Some(r) = repo().await else { return };
    let ad = r.create_ad(new_ad(&author("pg-files"), "Bike")).await.unwrap();
    let url = format!("storage/ad_{}/a.png", ad.id);
    let file = NewAdFile { ad_id: ad.id, file_name: "a.png".into(), url: url.clone() };

    r.create_file(file.clone()).await.unwrap();
    assert!(matches!(r.create_file(file).await, Err(RepoError::Conflict)));

    r.delete_ad(ad.id, Precondition::Any).await.unwrap();
    assert!(r.list_files(ad.id).await.unwrap().is_empty());

    let orphan = NewAdFile { ad_id: ad.id, file_name: "b.png".into(), url: format!("{url}.b") };
    assert!(matches!(r.create_file(orphan).await, Err(RepoError::NotFound)));
}

#[tokio::test]
#[serial]
async fn filter_scopes_by_author_and_pages() {
    let Some(r) = repo().await else { return };
    let who = author("pg-filter");
    for i in 0..3 {
        r.create_ad(new_ad(&who, &format!("ad{i}"))).await.unwrap();
    }
    let filter = AdFilter { author_id: Some(who.clone()), limit: Some(2), page: Some(2), ..Default::default() };
    let page = r.filter_ads(&filter).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].title, "ad2");
    assert_eq!(r.list_ads_by_author(&who).await.unwrap().len(), 3);
}
