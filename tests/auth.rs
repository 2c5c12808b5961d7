use actix_web::{dev::Payload, test, FromRequest};
use adboard::{
    auth::{create_jwt, Auth, Claims, Role},
    error::ApiError,
    require_role,
};
use serial_test::serial;
use std::env;

// Helper that guarantees a sufficiently long secret for tests.
fn set_secret() {
    env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

async fn extract(token: &str) -> actix_web::Result<Auth> {
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_http_request();
    let mut pl = Payload::None;
    Auth::from_request(&req, &mut pl).await
}

#[actix_web::test]
#[serial]
async fn jwt_roundtrip_ok() {
    set_secret();
    let token = create_jwt("u1", vec![Role::User], chrono::Duration::hours(1)).expect("token");
    let auth = extract(&token).await.expect("extract");
    assert_eq!(auth.caller_id(), "u1");
    assert!(auth.has_role(Role::User));
    assert!(!auth.has_role(Role::Admin));
}

#[actix_web::test]
#[serial]
async fn extractor_rejects_invalid_token() {
    set_secret();
    assert!(extract("notatoken").await.is_err());
}

#[actix_web::test]
#[serial]
async fn extractor_rejects_expired_token() {
    set_secret();
    // well past the default validation leeway
    let token = create_jwt("u1", vec![Role::User], chrono::Duration::hours(-2)).expect("token");
    assert!(extract(&token).await.is_err());
}

#[actix_web::test]
#[serial]
async fn extractor_rejects_token_signed_with_other_secret() {
    env::set_var("JWT_SECRET", "another-secret-that-is-32-bytes-long");
    let token = create_jwt("u1", vec![Role::User], chrono::Duration::hours(1)).expect("token");
    set_secret();
    assert!(extract(&token).await.is_err());
}

#[actix_web::test]
async fn extractor_requires_authorization_header() {
    let req = test::TestRequest::default().to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
async fn require_role_macro_enforces_roles() {
    let admin = Auth(Claims {
        sub: "a1".into(),
        exp: usize::MAX,
        roles: vec![Role::User, Role::Admin],
    });
    let user = Auth(Claims {
        sub: "u1".into(),
        exp: usize::MAX,
        roles: vec![Role::User],
    });

    fn guarded(a: Auth) -> Result<(), ApiError> {
        require_role!(a, Role::Admin);
        Ok(())
    }
    assert!(guarded(admin).is_ok());
    assert!(matches!(guarded(user), Err(ApiError::Forbidden)));
}
