use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;

use crate::{
    audit,
    dto::addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
    entity::{
        addresses::{ActiveModel, Column, Entity as Addresses, Model as AddressModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Empty, Meta},
    state::AppState,
};

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items: Vec<Address> = Addresses::find()
        .filter(Column::UserId.eq(user.user_id))
        .order_by_desc(Column::IsDefault)
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Address::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Addresses",
        AddressList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let payload = validate_address(payload)?;

    let txn = state.orm.begin().await?;
    lock_owner(&txn, user.user_id).await?;
    let existing = Addresses::find()
        .filter(Column::UserId.eq(user.user_id))
        .count(&txn)
        .await?;
    let make_default = payload.is_default || existing == 0;
    if make_default {
        clear_default(&txn, user.user_id).await?;
    }

    let address = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        full_name: Set(payload.full_name),
        phone: Set(payload.phone),
        street: Set(payload.street),
        city: Set(payload.city),
        state: Set(payload.state),
        postal_code: Set(payload.postal_code),
        country: Set(payload.country),
        is_default: Set(make_default),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_create",
        "addresses",
        serde_json::json!({ "address_id": address.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Address created",
        Address::from(address),
        Some(Meta::empty()),
    ))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let existing = find_owned(&state.orm, user.user_id, id).await?;
    let mut active: ActiveModel = existing.into();

    if let Some(v) = payload.full_name {
        active.full_name = Set(required("full_name", &v)?);
    }
    if let Some(v) = payload.phone {
        active.phone = Set(required("phone", &v)?);
    }
    if let Some(v) = payload.street {
        active.street = Set(required("street", &v)?);
    }
    if let Some(v) = payload.city {
        active.city = Set(required("city", &v)?);
    }
    if let Some(v) = payload.state {
        active.state = Set(optional(&v));
    }
    if let Some(v) = payload.postal_code {
        active.postal_code = Set(required("postal_code", &v)?);
    }
    if let Some(v) = payload.country {
        active.country = Set(required("country", &v)?);
    }
    active.updated_at = Set(Utc::now().into());

    let address = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_update",
        "addresses",
        serde_json::json!({ "address_id": address.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Address updated",
        Address::from(address),
        Some(Meta::empty()),
    ))
}

pub async fn set_default_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;
    lock_owner(&txn, user.user_id).await?;
    let existing = find_owned(&txn, user.user_id, id).await?;
    clear_default(&txn, user.user_id).await?;

    let mut active: ActiveModel = existing.into();
    active.is_default = Set(true);
    active.updated_at = Set(Utc::now().into());
    let address = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_default",
        "addresses",
        serde_json::json!({ "address_id": address.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Default address set",
        Address::from(address),
        Some(Meta::empty()),
    ))
}

pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Empty>> {
    let txn = state.orm.begin().await?;
    lock_owner(&txn, user.user_id).await?;
    let existing = find_owned(&txn, user.user_id, id).await?;
    let was_default = existing.is_default;
    Addresses::delete_by_id(existing.id).exec(&txn).await?;

    if was_default {
        let next = Addresses::find()
            .filter(Column::UserId.eq(user.user_id))
            .order_by_desc(Column::CreatedAt)
            .one(&txn)
            .await?;
        if let Some(next) = next {
            let mut active: ActiveModel = next.into();
            active.is_default = Set(true);
            active.update(&txn).await?;
        }
    }
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_delete",
        "addresses",
        serde_json::json!({ "address_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Address removed"))
}

async fn find_owned<C: ConnectionTrait>(db: &C, user_id: Uuid, id: Uuid) -> AppResult<AddressModel> {
    Addresses::find_by_id(id)
        .filter(Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound)
}

/// Row lock on the owner; address writes for one user run one at a time.
async fn lock_owner(txn: &DatabaseTransaction, user_id: Uuid) -> AppResult<()> {
    Users::find_by_id(user_id)
        .lock(LockType::Update)
        .one(txn)
        .await?;
    Ok(())
}

async fn clear_default<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<()> {
    Addresses::update_many()
        .col_expr(Column::IsDefault, Expr::value(false))
        .filter(Column::UserId.eq(user_id))
        .filter(Column::IsDefault.eq(true))
        .exec(db)
        .await?;
    Ok(())
}

pub fn validate_address(payload: CreateAddressRequest) -> AppResult<CreateAddressRequest> {
    Ok(CreateAddressRequest {
        full_name: required("full_name", &payload.full_name)?,
        phone: required("phone", &payload.phone)?,
        street: required("street", &payload.street)?,
        city: required("city", &payload.city)?,
        state: payload.state.as_deref().and_then(optional),
        postal_code: required("postal_code", &payload.postal_code)?,
        country: required("country", &payload.country)?,
        is_default: payload.is_default,
    })
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
