use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::users::{AdminUpdateUserRequest, UpdateProfileRequest, UserList},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER, ensure_admin},
    models::User,
    response::{ApiResponse, Empty, Meta},
    routes::params::Pagination,
    services::{
        auth_service::{hash_password, normalize_email, require_field, validate_password},
        review_service,
    },
    state::AppState,
};

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = find_user(state, user.user_id).await?;
    Ok(ApiResponse::success("Profile", User::from(model), None))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let existing = find_user(state, user.user_id).await?;
    let mut active: UserActive = existing.clone().into();

    if let Some(username) = payload.username {
        active.username = Set(require_field("username", &username)?);
    }
    if let Some(email) = payload.email {
        let email = normalize_email(&email)?;
        if email != existing.email {
            ensure_email_free(state, &email, existing.id).await?;
        }
        active.email = Set(email);
    }
    if let Some(password) = payload.password {
        validate_password(&password)?;
        active.password_hash = Set(hash_password(&password)?);
    }
    active.updated_at = Set(Utc::now().into());

    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "profile_update",
        "users",
        serde_json::json!({ "user_id": updated.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Profile updated",
        User::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find().order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn get_user(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let model = find_user(state, id).await?;
    Ok(ApiResponse::success("User", User::from(model), None))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdminUpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let existing = find_user(state, id).await?;
    let mut active: UserActive = existing.clone().into();

    if let Some(username) = payload.username {
        active.username = Set(require_field("username", &username)?);
    }
    if let Some(email) = payload.email {
        let email = normalize_email(&email)?;
        if email != existing.email {
            ensure_email_free(state, &email, existing.id).await?;
        }
        active.email = Set(email);
    }
    if let Some(role) = payload.role {
        active.role = Set(validate_role(&role)?.to_string());
    }
    active.updated_at = Set(Utc::now().into());

    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_update",
        "users",
        serde_json::json!({ "user_id": updated.id, "role": updated.role }),
    )
    .await;

    Ok(ApiResponse::success(
        "User updated",
        User::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Empty>> {
    ensure_admin(user)?;
    let existing = find_user(state, id).await?;
    if existing.role == ROLE_ADMIN {
        return Err(AppError::BadRequest("Cannot delete admin user".into()));
    }

    // Reviews go with the user, so the ratings they fed are recomputed in the same transaction.
    let txn = state.orm.begin().await?;
    let reviewed = review_service::lock_reviewed_products(&txn, existing.id).await?;
    Users::delete_by_id(existing.id).exec(&txn).await?;
    for product in reviewed {
        review_service::refresh_rating(&txn, product).await?;
    }
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::message("User removed"))
}

async fn find_user(state: &AppState, id: Uuid) -> AppResult<UserModel> {
    Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

async fn ensure_email_free(state: &AppState, email: &str, owner: Uuid) -> AppResult<()> {
    let taken = Users::find()
        .filter(UserCol::Email.eq(email))
        .filter(UserCol::Id.ne(owner))
        .one(&state.orm)
        .await?;
    if taken.is_some() {
        return Err(AppError::BadRequest("Email is already taken".into()));
    }
    Ok(())
}

fn validate_role(role: &str) -> AppResult<&'static str> {
    match role {
        ROLE_ADMIN => Ok(ROLE_ADMIN),
        ROLE_USER => Ok(ROLE_USER),
        _ => Err(AppError::BadRequest("Invalid role".into())),
    }
}
