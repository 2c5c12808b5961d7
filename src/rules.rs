//! Ownership and content rules. Pure functions, no I/O.

use crate::models::{Ad, AdContent, Id};

/// Image extensions accepted for attachments. Matching is on the name only.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".svg"];

/// Root under which attachment URLs are derived.
pub const STORAGE_PREFIX: &str = "storage";

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title is required")]
    TitleRequired,
    #[error("category is required")]
    CategoryRequired,
    #[error("rejection reason is required")]
    ReasonRequired,
}

pub fn is_owner(ad: &Ad, caller_id: &str) -> bool {
    ad.author_id == caller_id
}

/// Checks ad content and reports the first violated rule.
pub fn validate_content(content: &AdContent) -> Result<(), ValidationError> {
    if content.title.trim().is_empty() {
        return Err(ValidationError::TitleRequired);
    }
    if content.category_id <= 0 {
        return Err(ValidationError::CategoryRequired);
    }
    Ok(())
}

pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    if reason.trim().is_empty() {
        return Err(ValidationError::ReasonRequired);
    }
    Ok(())
}

/// Syntactic check only; the bytes are never inspected.
pub fn is_allowed_extension(file_name: &str) -> bool {
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return false;
    }
    let lower = file_name.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .any(|ext| lower.len() > ext.len() && lower.ends_with(ext))
}

/// Storage location of an attachment, fixed by the owning ad and the file name.
pub fn attachment_url(ad_id: Id, file_name: &str) -> String {
    format!("{STORAGE_PREFIX}/ad_{ad_id}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdStatus;
    use chrono::Utc;

    fn content(title: &str, category_id: Id) -> AdContent {
        AdContent { title: title.into(), category_id, ..Default::default() }
    }

    #[test]
    fn empty_title_wins_over_missing_category() {
        assert_eq!(validate_content(&content("", 0)), Err(ValidationError::TitleRequired));
        assert_eq!(validate_content(&content("   ", 3)), Err(ValidationError::TitleRequired));
    }

    #[test]
    fn category_must_be_positive() {
        assert_eq!(validate_content(&content("Bike", 0)), Err(ValidationError::CategoryRequired));
        assert_eq!(validate_content(&content("Bike", -4)), Err(ValidationError::CategoryRequired));
        assert!(validate_content(&content("Bike", 2)).is_ok());
    }

    #[test]
    fn reason_must_not_be_blank() {
        assert_eq!(validate_reason(" "), Err(ValidationError::ReasonRequired));
        assert!(validate_reason("spam").is_ok());
    }

    #[test]
    fn extension_allow_list() {
        for ok in ["a.jpg", "a.jpeg", "photo.PNG", "logo.svg"] {
            assert!(is_allowed_extension(ok), "{ok} should pass");
        }
        for bad in ["a.gif", "a.jpg.exe", "png", ".png", "../x.png", "dir/x.png", "x.pdf"] {
            assert!(!is_allowed_extension(bad), "{bad} should be refused");
        }
    }

    #[test]
    fn url_is_deterministic() {
        assert_eq!(attachment_url(7, "a.png"), "storage/ad_7/a.png");
        assert_eq!(attachment_url(7, "a.png"), attachment_url(7, "a.png"));
    }

    #[test]
    fn ownership_is_author_equality() {
        let now = Utc::now();
        let ad = Ad {
            id: 1,
            author_id: "u1".into(),
            title: "Bike".into(),
            description: String::new(),
            location: String::new(),
            category_id: 2,
            status: AdStatus::Pending,
            rejection_reason: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        assert!(is_owner(&ad, "u1"));
        assert!(!is_owner(&ad, "u2"));
    }
}
