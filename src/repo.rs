use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("select failed: {0}")]
    Select(String),
    #[error("insert failed: {0}")]
    Insert(String),
    #[error("update failed: {0}")]
    Update(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("scan failed: {0}")]
    Scan(String),
}

impl RepoError {
    /// Name of the store step that failed, for storage failures only.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            RepoError::Select(_) => Some("select"),
            RepoError::Insert(_) => Some("insert"),
            RepoError::Update(_) => Some("update"),
            RepoError::Delete(_) => Some("delete"),
            RepoError::Scan(_) => Some("scan"),
            RepoError::NotFound | RepoError::Conflict => None,
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Condition a write must satisfy against the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Last write wins.
    Any,
    /// Compare-and-swap on `updated_at`.
    UpdatedAt(DateTime<Utc>),
}

impl Precondition {
    pub fn holds(&self, ad: &Ad) -> bool {
        match self {
            Precondition::Any => true,
            Precondition::UpdatedAt(ts) => ad.updated_at == *ts,
        }
    }

    pub fn expected(&self) -> Option<DateTime<Utc>> {
        match self {
            Precondition::Any => None,
            Precondition::UpdatedAt(ts) => Some(*ts),
        }
    }
}

#[async_trait]
pub trait AdRepo: Send + Sync {
    async fn create_ad(&self, new: NewAd) -> RepoResult<Ad>;
    async fn get_ad(&self, id: Id) -> RepoResult<Ad>;
    async fn list_ads_by_author(&self, author_id: &str) -> RepoResult<Vec<Ad>>;
    async fn list_ads(&self) -> RepoResult<Vec<Ad>>;
    /// Writes content, status and activity of `ad` back to its row.
    /// `author_id` and `created_at` are never written.
    async fn update_ad(&self, ad: &Ad, pre: Precondition) -> RepoResult<()>;
    /// Removes the ad and, with it, every attachment row bound to it.
    async fn delete_ad(&self, id: Id, pre: Precondition) -> RepoResult<()>;
    async fn approve_ad(&self, id: Id, at: DateTime<Utc>, pre: Precondition) -> RepoResult<()>;
    async fn reject_ad(&self, id: Id, reason: &str, at: DateTime<Utc>, pre: Precondition) -> RepoResult<()>;
    async fn ad_statistics(&self) -> RepoResult<AdStatistics>;
    async fn filter_ads(&self, filter: &AdFilter) -> RepoResult<Vec<Ad>>;
}

#[async_trait]
pub trait AdFileRepo: Send + Sync {
    /// Fails with `Conflict` when the URL is already bound and `NotFound` when the ad is gone.
    async fn create_file(&self, new: NewAdFile) -> RepoResult<AdFile>;
    async fn list_files(&self, ad_id: Id) -> RepoResult<Vec<AdFile>>;
    /// Removes the row and hands it back so the caller can drop the stored bytes.
    async fn delete_file(&self, ad_id: Id, file_id: Id) -> RepoResult<AdFile>;
}

pub trait Repo: AdRepo + AdFileRepo {}

impl<T> Repo for T where T: AdRepo + AdFileRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};
    use std::sync::{RwLockReadGuard, RwLockWriteGuard};
    use tracing::{debug, info, warn};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        ads: HashMap<Id, Ad>,
        files: HashMap<Id, AdFile>,
        next_id: Id,
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Ephemeral store, nothing touches disk.
        pub fn new() -> Self {
            Self::default()
        }

        /// Store backed by a JSON snapshot that is reloaded on start and rewritten after every mutation.
        pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
            let path = path.into();
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        info!(path = %path.display(), ads = s.ads.len(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        warn!(path = %path.display(), "failed to parse snapshot: {e}. Starting empty.");
                        State::default()
                    }
                },
                Err(e) => {
                    debug!(path = %path.display(), "no snapshot: {e}. Starting empty.");
                    State::default()
                }
            }
        }

        fn persist(&self, s: &State) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            match serde_json::to_vec_pretty(s) {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        let _ = std::fs::create_dir_all(dir);
                    }
                    if let Err(e) = std::fs::write(path.as_path(), bytes) {
                        warn!(path = %path.display(), "failed to write snapshot: {e}");
                    }
                }
                Err(e) => warn!("failed to serialize snapshot: {e}"),
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state
                .read()
                .map_err(|_| RepoError::Select("state lock poisoned".into()))
        }

        fn write(&self, op: fn(String) -> RepoError) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| op("state lock poisoned".into()))
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn guarded<'a>(s: &'a mut State, id: Id, pre: Precondition) -> RepoResult<&'a mut Ad> {
            let ad = s.ads.get_mut(&id).ok_or(RepoError::NotFound)?;
            if !pre.holds(ad) {
                return Err(RepoError::Conflict);
            }
            Ok(ad)
        }

        fn sorted(mut v: Vec<Ad>) -> Vec<Ad> {
            v.sort_by_key(|a| a.id);
            v
        }
    }

    #[async_trait]
    impl AdRepo for InMemRepo {
        async fn create_ad(&self, new: NewAd) -> RepoResult<Ad> {
            let mut s = self.write(RepoError::Insert)?;
            let id = Self::next_id(&mut s);
            let ad = Ad {
                id,
                author_id: new.author_id,
                title: new.title,
                description: new.description,
                location: new.location,
                category_id: new.category_id,
                status: new.status,
                rejection_reason: None,
                is_active: new.is_active,
                created_at: new.created_at,
                updated_at: new.updated_at,
            };
            s.ads.insert(id, ad.clone());
            self.persist(&s);
            Ok(ad)
        }

        async fn get_ad(&self, id: Id) -> RepoResult<Ad> {
            let s = self.read()?;
            s.ads.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_ads_by_author(&self, author_id: &str) -> RepoResult<Vec<Ad>> {
            let s = self.read()?;
            Ok(Self::sorted(
                s.ads.values().filter(|a| a.author_id == author_id).cloned().collect(),
            ))
        }

        async fn list_ads(&self) -> RepoResult<Vec<Ad>> {
            let s = self.read()?;
            Ok(Self::sorted(s.ads.values().cloned().collect()))
        }

        async fn update_ad(&self, ad: &Ad, pre: Precondition) -> RepoResult<()> {
            let mut s = self.write(RepoError::Update)?;
            let stored = Self::guarded(&mut s, ad.id, pre)?;
            stored.title = ad.title.clone();
            stored.description = ad.description.clone();
            stored.location = ad.location.clone();
            stored.category_id = ad.category_id;
            stored.status = ad.status;
            stored.is_active = ad.is_active;
            stored.rejection_reason = ad.rejection_reason.clone();
            stored.updated_at = ad.updated_at;
            self.persist(&s);
            Ok(())
        }

        async fn delete_ad(&self, id: Id, pre: Precondition) -> RepoResult<()> {
            let mut s = self.write(RepoError::Delete)?;
            Self::guarded(&mut s, id, pre)?;
            s.ads.remove(&id);
            s.files.retain(|_, f| f.ad_id != id);
            self.persist(&s);
            Ok(())
        }

        async fn approve_ad(&self, id: Id, at: DateTime<Utc>, pre: Precondition) -> RepoResult<()> {
            let mut s = self.write(RepoError::Update)?;
            let ad = Self::guarded(&mut s, id, pre)?;
            ad.status = AdStatus::Approved;
            ad.is_active = true;
            ad.updated_at = at;
            self.persist(&s);
            Ok(())
        }

        async fn reject_ad(&self, id: Id, reason: &str, at: DateTime<Utc>, pre: Precondition) -> RepoResult<()> {
            let mut s = self.write(RepoError::Update)?;
            let ad = Self::guarded(&mut s, id, pre)?;
            ad.status = AdStatus::Rejected;
            ad.is_active = false;
            ad.rejection_reason = Some(reason.to_string());
            ad.updated_at = at;
            self.persist(&s);
            Ok(())
        }

        async fn ad_statistics(&self) -> RepoResult<AdStatistics> {
            let s = self.read()?;
            let mut stats = AdStatistics { total: s.ads.len() as i64, ..Default::default() };
            for ad in s.ads.values() {
                match ad.status {
                    AdStatus::Approved => stats.published += 1,
                    AdStatus::Pending => stats.pending += 1,
                    AdStatus::Rejected => stats.rejected += 1,
                }
            }
            Ok(stats)
        }

        async fn filter_ads(&self, filter: &AdFilter) -> RepoResult<Vec<Ad>> {
            let s = self.read()?;
            let matched = Self::sorted(s.ads.values().filter(|a| filter.matches(a)).cloned().collect());
            let skip = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
            let take = filter.limit.filter(|l| *l > 0).map_or(usize::MAX, |l| l as usize);
            Ok(matched.into_iter().skip(skip).take(take).collect())
        }
    }

    #[async_trait]
    impl AdFileRepo for InMemRepo {
        async fn create_file(&self, new: NewAdFile) -> RepoResult<AdFile> {
            let mut s = self.write(RepoError::Insert)?;
            if !s.ads.contains_key(&new.ad_id) {
                return Err(RepoError::NotFound);
            }
            if s.files.values().any(|f| f.url == new.url) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let file = AdFile {
                id,
                ad_id: new.ad_id,
                file_name: new.file_name,
                url: new.url,
                created_at: Utc::now(),
            };
            s.files.insert(id, file.clone());
            self.persist(&s);
            Ok(file)
        }

        async fn list_files(&self, ad_id: Id) -> RepoResult<Vec<AdFile>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.files.values().filter(|f| f.ad_id == ad_id).cloned().collect();
            v.sort_by_key(|f| f.id);
            Ok(v)
        }

        async fn delete_file(&self, ad_id: Id, file_id: Id) -> RepoResult<AdFile> {
            let mut s = self.write(RepoError::Delete)?;
            match s.files.get(&file_id) {
                Some(f) if f.ad_id == ad_id => {}
                _ => return Err(RepoError::NotFound),
            }
            let removed = s.files.remove(&file_id).ok_or(RepoError::NotFound)?;
            self.persist(&s);
            Ok(removed)
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres, QueryBuilder};
    use tracing::error;

    const AD_COLUMNS: &str = "id, author_id, title, description, location, category_id, \
                              status, rejection_reason, is_active, created_at, updated_at";

    #[derive(sqlx::FromRow)]
    struct AdRow {
        id: Id,
        author_id: String,
        title: String,
        description: String,
        location: String,
        category_id: Id,
        status: String,
        rejection_reason: Option<String>,
        is_active: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl TryFrom<AdRow> for Ad {
        type Error = RepoError;

        fn try_from(r: AdRow) -> Result<Self, Self::Error> {
            let status = AdStatus::parse(&r.status)
                .ok_or_else(|| RepoError::Scan(format!("unknown status '{}' on ad {}", r.status, r.id)))?;
            Ok(Ad {
                id: r.id,
                author_id: r.author_id,
                title: r.title,
                description: r.description,
                location: r.location,
                category_id: r.category_id,
                status,
                rejection_reason: r.rejection_reason,
                is_active: r.is_active,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        }
    }

    #[derive(sqlx::FromRow)]
    struct AdFileRow {
        id: Id,
        ad_id: Id,
        file_name: String,
        url: String,
        created_at: DateTime<Utc>,
    }

    impl From<AdFileRow> for AdFile {
        fn from(r: AdFileRow) -> Self {
            AdFile { id: r.id, ad_id: r.ad_id, file_name: r.file_name, url: r.url, created_at: r.created_at }
        }
    }

    fn rows_to_ads(rows: Vec<AdRow>) -> RepoResult<Vec<Ad>> {
        rows.into_iter().map(Ad::try_from).collect()
    }

    fn logged(op: fn(String) -> RepoError, what: &str) -> impl Fn(sqlx::Error) -> RepoError + '_ {
        move |e| {
            error!("{what}: {e}");
            op(e.to_string())
        }
    }

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }

        /// Resolves a write that touched no rows: the row is either gone or was modified underneath us.
        async fn explain_miss(&self, id: Id) -> RepoError {
            match sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM ads WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
            {
                Ok(true) => RepoError::Conflict,
                Ok(false) => RepoError::NotFound,
                Err(e) => logged(RepoError::Select, "checking ad existence")(e),
            }
        }
    }

    #[async_trait]
    impl AdRepo for PgRepo {
        async fn create_ad(&self, new: NewAd) -> RepoResult<Ad> {
            let sql = format!(
                "INSERT INTO ads (author_id, title, description, location, category_id, status, is_active, created_at, updated_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) RETURNING {AD_COLUMNS}"
            );
            let row = sqlx::query_as::<_, AdRow>(&sql)
                .bind(&new.author_id)
                .bind(&new.title)
                .bind(&new.description)
                .bind(&new.location)
                .bind(new.category_id)
                .bind(new.status.as_str())
                .bind(new.is_active)
                .bind(new.created_at)
                .bind(new.updated_at)
                .fetch_one(&self.pool)
                .await
                .map_err(logged(RepoError::Insert, "inserting ad"))?;
            row.try_into()
        }

        async fn get_ad(&self, id: Id) -> RepoResult<Ad> {
            let sql = format!("SELECT {AD_COLUMNS} FROM ads WHERE id = $1");
            let row = sqlx::query_as::<_, AdRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(logged(RepoError::Select, "selecting ad"))?;
            row.ok_or(RepoError::NotFound)?.try_into()
        }

        async fn list_ads_by_author(&self, author_id: &str) -> RepoResult<Vec<Ad>> {
            let sql = format!("SELECT {AD_COLUMNS} FROM ads WHERE author_id = $1 ORDER BY id");
            let rows = sqlx::query_as::<_, AdRow>(&sql)
                .bind(author_id)
                .fetch_all(&self.pool)
                .await
                .map_err(logged(RepoError::Select, "selecting ads by author"))?;
            rows_to_ads(rows)
        }

        async fn list_ads(&self) -> RepoResult<Vec<Ad>> {
            let sql = format!("SELECT {AD_COLUMNS} FROM ads ORDER BY id");
            let rows = sqlx::query_as::<_, AdRow>(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(logged(RepoError::Select, "selecting ads"))?;
            rows_to_ads(rows)
        }

        async fn update_ad(&self, ad: &Ad, pre: Precondition) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE ads SET title = $2, description = $3, location = $4, category_id = $5, \
                 status = $6, is_active = $7, rejection_reason = $8, updated_at = $9 \
                 WHERE id = $1 AND ($10::timestamptz IS NULL OR updated_at = $10)",
            )
            .bind(ad.id)
            .bind(&ad.title)
            .bind(&ad.description)
            .bind(&ad.location)
            .bind(ad.category_id)
            .bind(ad.status.as_str())
            .bind(ad.is_active)
            .bind(ad.rejection_reason.as_deref())
            .bind(ad.updated_at)
            .bind(pre.expected())
            .execute(&self.pool)
            .await
            .map_err(logged(RepoError::Update, "updating ad"))?;
            if res.rows_affected() == 0 {
                return Err(self.explain_miss(ad.id).await);
            }
            Ok(())
        }

        async fn delete_ad(&self, id: Id, pre: Precondition) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM ads WHERE id = $1 AND ($2::timestamptz IS NULL OR updated_at = $2)")
                .bind(id)
                .bind(pre.expected())
                .execute(&self.pool)
                .await
                .map_err(logged(RepoError::Delete, "deleting ad"))?;
            if res.rows_affected() == 0 {
                return Err(self.explain_miss(id).await);
            }
            Ok(())
        }

        async fn approve_ad(&self, id: Id, at: DateTime<Utc>, pre: Precondition) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE ads SET status = $2, is_active = TRUE, updated_at = $3 \
                 WHERE id = $1 AND ($4::timestamptz IS NULL OR updated_at = $4)",
            )
            .bind(id)
            .bind(AdStatus::Approved.as_str())
            .bind(at)
            .bind(pre.expected())
            .execute(&self.pool)
            .await
            .map_err(logged(RepoError::Update, "approving ad"))?;
            if res.rows_affected() == 0 {
                return Err(self.explain_miss(id).await);
            }
            Ok(())
        }

        async fn reject_ad(&self, id: Id, reason: &str, at: DateTime<Utc>, pre: Precondition) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE ads SET status = $2, rejection_reason = $3, is_active = FALSE, updated_at = $4 \
                 WHERE id = $1 AND ($5::timestamptz IS NULL OR updated_at = $5)",
            )
            .bind(id)
            .bind(AdStatus::Rejected.as_str())
            .bind(reason)
            .bind(at)
            .bind(pre.expected())
            .execute(&self.pool)
            .await
            .map_err(logged(RepoError::Update, "rejecting ad"))?;
            if res.rows_affected() == 0 {
                return Err(self.explain_miss(id).await);
            }
            Ok(())
        }

        async fn ad_statistics(&self) -> RepoResult<AdStatistics> {
            let (total, published, pending, rejected) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE status = 'approved') AS published,
                    COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                    COUNT(*) FILTER (WHERE status = 'rejected') AS rejected
                FROM ads
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(logged(RepoError::Scan, "reading ad statistics"))?;
            Ok(AdStatistics { total, published, pending, rejected })
        }

        async fn filter_ads(&self, filter: &AdFilter) -> RepoResult<Vec<Ad>> {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT {AD_COLUMNS} FROM ads WHERE TRUE"));
            if let Some(author) = &filter.author_id {
                builder.push(" AND author_id = ").push_bind(author.clone());
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status.as_str());
            }
            if let Some(category) = filter.category_id {
                builder.push(" AND category_id = ").push_bind(category);
            }
            if filter.active_only {
                builder.push(" AND is_active = TRUE");
            }
            builder.push(" ORDER BY id");
            if let Some(limit) = filter.limit.filter(|l| *l > 0) {
                builder.push(" LIMIT ").push_bind(limit);
                builder.push(" OFFSET ").push_bind(filter.offset());
            }
            let rows = builder
                .build_query_as::<AdRow>()
                .fetch_all(&self.pool)
                .await
                .map_err(logged(RepoError::Select, "filtering ads"))?;
            rows_to_ads(rows)
        }
    }

    #[async_trait]
    impl AdFileRepo for PgRepo {
        async fn create_file(&self, new: NewAdFile) -> RepoResult<AdFile> {
            let row = sqlx::query_as::<_, AdFileRow>(
                "INSERT INTO ad_files (ad_id, file_name, url) VALUES ($1,$2,$3) \
                 RETURNING id, ad_id, file_name, url, created_at",
            )
            .bind(new.ad_id)
            .bind(&new.file_name)
            .bind(&new.url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return RepoError::Conflict;
                    }
                    if db.is_foreign_key_violation() {
                        return RepoError::NotFound;
                    }
                }
                logged(RepoError::Insert, "inserting ad file")(e)
            })?;
            Ok(row.into())
        }

        async fn list_files(&self, ad_id: Id) -> RepoResult<Vec<AdFile>> {
            let rows = sqlx::query_as::<_, AdFileRow>(
                "SELECT id, ad_id, file_name, url, created_at FROM ad_files WHERE ad_id = $1 ORDER BY id",
            )
            .bind(ad_id)
            .fetch_all(&self.pool)
            .await
            .map_err(logged(RepoError::Select, "selecting ad files"))?;
            Ok(rows.into_iter().map(AdFile::from).collect())
        }

        async fn delete_file(&self, ad_id: Id, file_id: Id) -> RepoResult<AdFile> {
            let row = sqlx::query_as::<_, AdFileRow>(
                "DELETE FROM ad_files WHERE id = $1 AND ad_id = $2 \
                 RETURNING id, ad_id, file_name, url, created_at",
            )
            .bind(file_id)
            .bind(ad_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged(RepoError::Delete, "deleting ad file"))?;
            row.map(AdFile::from).ok_or(RepoError::NotFound)
        }
    }
}
