use crate::models::{Ad, AdContent, AdFile, AdStatistics, AdStatus, RejectionRequest};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_published,
        crate::routes::create_ad,
        crate::routes::list_my_ads,
        crate::routes::update_ad,
        crate::routes::upload_image,
        crate::routes::admin_list_ads,
        crate::routes::admin_approve_ad,
        crate::routes::admin_reject_ad,
        crate::routes::admin_statistics,
    ),
    components(schemas(Ad, AdContent, AdFile, AdStatistics, AdStatus, RejectionRequest)),
    tags(
        (name = "ads", description = "Advertisement lifecycle"),
        (name = "admin", description = "Moderation and statistics"),
    )
)]
pub struct ApiDoc;
