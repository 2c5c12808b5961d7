//! Advertisement lifecycle engine.
//!
//! State lives entirely in the stores; `AdService` only sequences loads, rule checks and
//! conditioned writes. Moderation moves an ad out of `pending` exactly once:
//!
//! ```text
//! (none) --create--> pending --approve--> approved
//!                    pending --reject---> rejected
//! any --submit--> pending        any --delete--> (none)
//! ```
//!
//! Content edits by the owner are allowed in every status.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::models::*;
use crate::repo::{AdFileRepo, AdRepo, Precondition, Repo, RepoError};
use crate::rules;
use crate::storage::{FileStore, FileStoreError};

/// How read-then-write sequences guard against concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    /// Writes only land if the row still carries the `updated_at` that was read.
    #[default]
    Optimistic,
    LastWriteWins,
}

#[derive(Clone)]
pub struct AdService {
    ads: Arc<dyn AdRepo>,
    files: Arc<dyn AdFileRepo>,
    blobs: Arc<dyn FileStore>,
    concurrency: Concurrency,
}

fn storage(e: RepoError) -> ServiceError {
    error!(op = e.op().unwrap_or("unknown"), "store failure: {e}");
    ServiceError::Storage(e)
}

/// Store failures while resolving a single ad by id.
fn lookup(e: RepoError) -> ServiceError {
    match e {
        RepoError::NotFound => ServiceError::AdNotFound,
        other => storage(other),
    }
}

/// Store failures of a conditioned write that followed a successful load.
fn write_failed(e: RepoError) -> ServiceError {
    match e {
        RepoError::NotFound => ServiceError::AdNotFound,
        RepoError::Conflict => ServiceError::Conflict,
        other => storage(other),
    }
}

impl AdService {
    pub fn new<R: Repo + 'static>(repo: Arc<R>, blobs: Arc<dyn FileStore>) -> Self {
        Self::from_parts(repo.clone(), repo, blobs)
    }

    pub fn from_parts(ads: Arc<dyn AdRepo>, files: Arc<dyn AdFileRepo>, blobs: Arc<dyn FileStore>) -> Self {
        Self { ads, files, blobs, concurrency: Concurrency::default() }
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn guard(&self, ad: &Ad) -> Precondition {
        match self.concurrency {
            Concurrency::Optimistic => Precondition::UpdatedAt(ad.updated_at),
            Concurrency::LastWriteWins => Precondition::Any,
        }
    }

    async fn load(&self, ad_id: Id) -> ServiceResult<Ad> {
        self.ads.get_ad(ad_id).await.map_err(lookup)
    }

    /// Loads an ad and checks that `owner_id` is its author. A missing ad stops the operation.
    async fn load_owned(&self, owner_id: &str, ad_id: Id) -> ServiceResult<Ad> {
        let ad = self.load(ad_id).await?;
        if !rules::is_owner(&ad, owner_id) {
            warn!(ad_id, owner = owner_id, "caller does not own the ad");
            return Err(ServiceError::AccessDenied);
        }
        Ok(ad)
    }

    // ---------------------------------------------------------------- owner lifecycle

    /// Creates a new ad for `owner_id`. It starts pending and inactive.
    pub async fn create_draft(&self, owner_id: &str, content: AdContent) -> ServiceResult<Ad> {
        rules::validate_content(&content)?;
        let now = Utc::now();
        let ad = self
            .ads
            .create_ad(NewAd {
                author_id: owner_id.to_string(),
                title: content.title,
                description: content.description,
                location: content.location,
                category_id: content.category_id,
                status: AdStatus::Pending,
                is_active: false,
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(storage)?;
        info!(ad_id = ad.id, owner = owner_id, "ad created");
        Ok(ad)
    }

    /// All ads of `owner_id`. Having none is reported as `NoAdsForUser`.
    pub async fn list_own(&self, owner_id: &str) -> ServiceResult<Vec<Ad>> {
        let ads = self.ads.list_ads_by_author(owner_id).await.map_err(storage)?;
        if ads.is_empty() {
            return Err(ServiceError::NoAdsForUser);
        }
        Ok(ads)
    }

    /// Owner-scoped filtered listing; an empty page is a valid answer.
    pub async fn list_own_filtered(&self, owner_id: &str, mut filter: AdFilter) -> ServiceResult<Vec<Ad>> {
        filter.author_id = Some(owner_id.to_string());
        self.ads.filter_ads(&filter).await.map_err(storage)
    }

    /// Overwrites title, description and category. Status and ownership are left alone.
    pub async fn update_own(&self, owner_id: &str, ad_id: Id, content: AdContent) -> ServiceResult<()> {
        let mut ad = self.load_owned(owner_id, ad_id).await?;
        rules::validate_content(&content)?;
        let pre = self.guard(&ad);
        ad.title = content.title;
        ad.description = content.description;
        ad.category_id = content.category_id;
        ad.updated_at = Utc::now();
        self.ads.update_ad(&ad, pre).await.map_err(write_failed)?;
        info!(ad_id, owner = owner_id, "ad updated");
        Ok(())
    }

    pub async fn delete_own(&self, owner_id: &str, ad_id: Id) -> ServiceResult<()> {
        let ad = self.load_owned(owner_id, ad_id).await?;
        self.remove_ad(&ad).await?;
        info!(ad_id, owner = owner_id, "ad deleted by owner");
        Ok(())
    }

    /// Puts the ad back into the moderation queue. Repeating it is harmless.
    pub async fn submit_for_moderation(&self, owner_id: &str, ad_id: Id) -> ServiceResult<()> {
        let mut ad = self.load_owned(owner_id, ad_id).await?;
        let pre = self.guard(&ad);
        ad.status = AdStatus::Pending;
        ad.is_active = false;
        ad.rejection_reason = None;
        ad.updated_at = Utc::now();
        self.ads.update_ad(&ad, pre).await.map_err(write_failed)?;
        info!(ad_id, owner = owner_id, "ad submitted for moderation");
        Ok(())
    }

    // ---------------------------------------------------------------- administration

    pub async fn approve(&self, ad_id: Id) -> ServiceResult<()> {
        let ad = self.load(ad_id).await?;
        if ad.status != AdStatus::Pending {
            return Err(ServiceError::InvalidTransition { from: ad.status });
        }
        self.ads
            .approve_ad(ad_id, Utc::now(), self.guard(&ad))
            .await
            .map_err(write_failed)?;
        info!(ad_id, "ad approved");
        Ok(())
    }

    pub async fn reject(&self, ad_id: Id, reason: &str) -> ServiceResult<()> {
        rules::validate_reason(reason)?;
        let ad = self.load(ad_id).await?;
        if ad.status != AdStatus::Pending {
            return Err(ServiceError::InvalidTransition { from: ad.status });
        }
        self.ads
            .reject_ad(ad_id, reason, Utc::now(), self.guard(&ad))
            .await
            .map_err(write_failed)?;
        info!(ad_id, reason, "ad rejected");
        Ok(())
    }

    /// Every ad in the store. An empty store is reported as `NoAds`.
    pub async fn list_all(&self) -> ServiceResult<Vec<Ad>> {
        let ads = self.ads.list_ads().await.map_err(storage)?;
        if ads.is_empty() {
            return Err(ServiceError::NoAds);
        }
        Ok(ads)
    }

    pub async fn delete_any(&self, ad_id: Id) -> ServiceResult<()> {
        let ad = self.load(ad_id).await?;
        self.remove_ad(&ad).await?;
        info!(ad_id, "ad deleted by admin");
        Ok(())
    }

    pub async fn statistics(&self) -> ServiceResult<AdStatistics> {
        self.ads.ad_statistics().await.map_err(storage)
    }

    // ---------------------------------------------------------------- public

    /// Approved, active ads matching `filter`.
    pub async fn list_published(&self, mut filter: AdFilter) -> ServiceResult<Vec<Ad>> {
        filter.status = Some(AdStatus::Approved);
        filter.active_only = true;
        self.ads.filter_ads(&filter).await.map_err(storage)
    }

    // ---------------------------------------------------------------- attachments

    /// Binds `file_name` to the owner's ad and returns the attachment with its derived URL.
    /// The bytes are not written here; see [`AdService::upload_image`].
    pub async fn add_image(&self, owner_id: &str, ad_id: Id, file_name: &str) -> ServiceResult<AdFile> {
        self.load_owned(owner_id, ad_id).await?;
        if !rules::is_allowed_extension(file_name) {
            warn!(ad_id, file_name, "file type not allowed");
            return Err(ServiceError::FileNotAllowed);
        }
        let file = self
            .files
            .create_file(NewAdFile {
                ad_id,
                file_name: file_name.to_string(),
                url: rules::attachment_url(ad_id, file_name),
            })
            .await
            .map_err(|e| match e {
                RepoError::Conflict => ServiceError::DuplicateAttachment,
                RepoError::NotFound => ServiceError::AdNotFound,
                other => storage(other),
            })?;
        info!(ad_id, attachment_id = file.id, url = %file.url, "attachment added");
        Ok(file)
    }

    /// `add_image` followed by writing the bytes. If the write fails the metadata row is dropped again.
    pub async fn upload_image(&self, owner_id: &str, ad_id: Id, file_name: &str, bytes: &[u8]) -> ServiceResult<AdFile> {
        let file = self.add_image(owner_id, ad_id, file_name).await?;
        if let Err(e) = self.blobs.save(&file.url, bytes).await {
            error!(ad_id, url = %file.url, "storing attachment bytes failed: {e}");
            if let Err(undo) = self.files.delete_file(ad_id, file.id).await {
                error!(ad_id, attachment_id = file.id, "rolling back attachment row failed: {undo}");
            }
            return Err(ServiceError::FileStore(e));
        }
        Ok(file)
    }

    /// Drops the attachment row, then the bytes. A failed byte removal is only logged.
    pub async fn remove_image(&self, owner_id: &str, ad_id: Id, attachment_id: Id) -> ServiceResult<()> {
        self.load_owned(owner_id, ad_id).await?;
        let removed = self
            .files
            .delete_file(ad_id, attachment_id)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => ServiceError::AttachmentNotFound,
                other => storage(other),
            })?;
        info!(ad_id, attachment_id, "attachment removed");
        self.discard_bytes(&removed.url).await;
        Ok(())
    }

    /// Attachments of the owner's ad; an ad without any yields an empty list.
    pub async fn list_images(&self, owner_id: &str, ad_id: Id) -> ServiceResult<Vec<AdFile>> {
        self.load_owned(owner_id, ad_id).await?;
        let files = self.files.list_files(ad_id).await.map_err(storage)?;
        debug!(ad_id, count = files.len(), "attachments listed");
        Ok(files)
    }

    // ---------------------------------------------------------------- helpers

    async fn remove_ad(&self, ad: &Ad) -> ServiceResult<()> {
        let files = self.files.list_files(ad.id).await.map_err(storage)?;
        self.ads.delete_ad(ad.id, self.guard(ad)).await.map_err(write_failed)?;
        for f in &files {
            self.discard_bytes(&f.url).await;
        }
        Ok(())
    }

    async fn discard_bytes(&self, url: &str) {
        match self.blobs.delete(url).await {
            Ok(()) => {}
            Err(FileStoreError::NotFound) => debug!(url, "no stored bytes to remove"),
            // metadata is already gone; the orphaned bytes are left for reconciliation
            Err(e) => warn!(url, "removing stored bytes failed: {e}"),
        }
    }
}
