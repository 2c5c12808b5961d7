use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;

use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::require_role;
use crate::service::AdService;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/ads")
                    .route(web::get().to(list_published))
                    .route(web::post().to(create_ad)),
            )
            // before /ads/{id} so "mine" is never parsed as an id
            .service(web::resource("/ads/mine").route(web::get().to(list_my_ads)))
            .service(web::resource("/ads/mine/filter").route(web::get().to(filter_my_ads)))
            .service(
                web::resource("/ads/{id}")
                    .route(web::put().to(update_ad))
                    .route(web::delete().to(delete_ad)),
            )
            .service(web::resource("/ads/{id}/submit").route(web::post().to(submit_ad)))
            .service(
                web::resource("/ads/{id}/images")
                    .route(web::get().to(list_images))
                    .route(web::post().to(upload_image)),
            )
            .service(web::resource("/ads/{id}/images/{file_id}").route(web::delete().to(delete_image)))
            // Admin moderation endpoints
            .service(web::resource("/admin/ads").route(web::get().to(admin_list_ads)))
            .service(web::resource("/admin/ads/{id}").route(web::delete().to(admin_delete_ad)))
            .service(web::resource("/admin/ads/{id}/approve").route(web::post().to(admin_approve_ad)))
            .service(web::resource("/admin/ads/{id}/reject").route(web::post().to(admin_reject_ad)))
            .service(web::resource("/admin/statistics").route(web::get().to(admin_statistics))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub service: AdService,
    pub max_upload_bytes: usize,
}

fn ok_message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "message": message }))
}

#[utoipa::path(
    get,
    path = "/api/v1/ads",
    responses((status = 200, description = "Published ads", body = [Ad]))
)]
pub async fn list_published(data: web::Data<AppState>, filter: web::Query<AdFilter>) -> Result<HttpResponse, ApiError> {
    let ads = data.service.list_published(filter.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ads))
}

#[utoipa::path(
    post,
    path = "/api/v1/ads",
    request_body = AdContent,
    responses(
        (status = 201, description = "Ad created (pending moderation)", body = Ad),
        (status = 400, description = "Invalid content"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_ad(auth: Auth, data: web::Data<AppState>, payload: web::Json<AdContent>) -> Result<HttpResponse, ApiError> {
    let ad = data.service.create_draft(auth.caller_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(ad))
}

#[utoipa::path(
    get,
    path = "/api/v1/ads/mine",
    responses(
        (status = 200, description = "Caller's ads", body = [Ad]),
        (status = 404, description = "Caller has no ads")
    )
)]
pub async fn list_my_ads(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ads = data.service.list_own(auth.caller_id()).await?;
    Ok(HttpResponse::Ok().json(ads))
}

pub async fn filter_my_ads(auth: Auth, data: web::Data<AppState>, filter: web::Query<AdFilter>) -> Result<HttpResponse, ApiError> {
    let ads = data.service.list_own_filtered(auth.caller_id(), filter.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ads))
}

#[utoipa::path(
    put,
    path = "/api/v1/ads/{id}",
    request_body = AdContent,
    params(("id" = i64, Path, description = "Ad id")),
    responses(
        (status = 200, description = "Ad updated"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Ad not found")
    )
)]
pub async fn update_ad(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<AdContent>) -> Result<HttpResponse, ApiError> {
    data.service.update_own(auth.caller_id(), path.into_inner(), payload.into_inner()).await?;
    Ok(ok_message("Ad updated"))
}

pub async fn delete_ad(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.service.delete_own(auth.caller_id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn submit_ad(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.service.submit_for_moderation(auth.caller_id(), path.into_inner()).await?;
    Ok(ok_message("Ad submitted for moderation"))
}

pub async fn list_images(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let files = data.service.list_images(auth.caller_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(files))
}

#[utoipa::path(
    post,
    path = "/api/v1/ads/{id}/images",
    params(("id" = i64, Path, description = "Ad id")),
    responses(
        (status = 201, description = "Attachment stored", body = AdFile),
        (status = 400, description = "File type not allowed"),
        (status = 409, description = "Attachment already exists"),
        (status = 413, description = "Payload too large")
    )
)]
pub async fn upload_image(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    let ad_id = path.into_inner();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::warn!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart body".into())
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let file_name = field
            .content_disposition()
            .get_filename()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("file name missing".into()))?;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            tracing::warn!("stream read error: {e}");
            ApiError::BadRequest("malformed multipart body".into())
        })? {
            if bytes.len() + chunk.len() > data.max_upload_bytes {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        let file = data.service.upload_image(auth.caller_id(), ad_id, &file_name, &bytes).await?;
        return Ok(HttpResponse::Created().json(file));
    }
    Err(ApiError::BadRequest("multipart field 'file' required".into()))
}

pub async fn delete_image(auth: Auth, data: web::Data<AppState>, path: web::Path<(Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (ad_id, file_id) = path.into_inner();
    data.service.remove_image(auth.caller_id(), ad_id, file_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Admin moderation handlers -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/ads",
    responses(
        (status = 200, description = "All ads", body = [Ad]),
        (status = 403, description = "Forbidden - Admin only"),
        (status = 404, description = "No ads")
    )
)]
pub async fn admin_list_ads(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let ads = data.service.list_all().await?;
    Ok(HttpResponse::Ok().json(ads))
}

pub async fn admin_delete_ad(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    data.service.delete_any(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/ads/{id}/approve",
    params(("id" = i64, Path, description = "Ad id")),
    responses(
        (status = 200, description = "Ad approved"),
        (status = 404, description = "Ad not found"),
        (status = 409, description = "Ad is not pending")
    )
)]
pub async fn admin_approve_ad(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    data.service.approve(path.into_inner()).await?;
    Ok(ok_message("Ad approved"))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/ads/{id}/reject",
    request_body = RejectionRequest,
    params(("id" = i64, Path, description = "Ad id")),
    responses(
        (status = 200, description = "Ad rejected"),
        (status = 400, description = "Rejection reason required"),
        (status = 404, description = "Ad not found"),
        (status = 409, description = "Ad is not pending")
    )
)]
pub async fn admin_reject_ad(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<RejectionRequest>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    data.service.reject(path.into_inner(), &payload.reason).await?;
    Ok(ok_message("Ad rejected"))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/statistics",
    responses(
        (status = 200, description = "Counts per status", body = AdStatistics),
        (status = 403, description = "Forbidden - Admin only")
    )
)]
pub async fn admin_statistics(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let stats = data.service.statistics().await?;
    Ok(HttpResponse::Ok().json(stats))
}
