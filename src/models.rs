use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Moderation state of an advertisement. There is no draft state: new ads
/// enter the moderation queue directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AdStatus {
    Pending,
    Approved,
    Rejected,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Pending => "pending",
            AdStatus::Approved => "approved",
            AdStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AdStatus::Pending),
            "approved" => Some(AdStatus::Approved),
            "rejected" => Some(AdStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Ad {
    pub id: Id,
    pub author_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category_id: Id,
    pub status: AdStatus,
    pub rejection_reason: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied ad content, used for creation and edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AdContent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub category_id: Id,
}

/// Row handed to the store on creation; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAd {
    pub author_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category_id: Id,
    pub status: AdStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdFile {
    pub id: Id,
    pub ad_id: Id,
    pub file_name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdFile {
    pub ad_id: Id,
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdStatistics {
    pub total: i64,
    pub published: i64,
    pub pending: i64,
    pub rejected: i64,
}

/// Query filter for ad listings. `page` is 1-based and only applies with a `limit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdFilter {
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub status: Option<AdStatus>,
    #[serde(default)]
    pub category_id: Option<Id>,
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub page: Option<i64>,
}

impl AdFilter {
    /// Number of rows to skip for the requested page. Saturates, so a huge page is simply past the end.
    pub fn offset(&self) -> i64 {
        match (self.limit, self.page) {
            (Some(limit), Some(page)) if page > 1 && limit > 0 => page.saturating_sub(1).saturating_mul(limit),
            _ => 0,
        }
    }

    pub fn matches(&self, ad: &Ad) -> bool {
        self.author_id.as_deref().map_or(true, |a| ad.author_id == a)
            && self.status.map_or(true, |s| ad.status == s)
            && self.category_id.map_or(true, |c| ad.category_id == c)
            && (!self.active_only || ad.is_active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RejectionRequest {
    pub reason: String,
}
