use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::ReviewRequest,
    entity::{
        products::{ActiveModel as ProductActive, Entity as Products, Model as ProductModel},
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Review,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Average and count of a product's review ratings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i32,
}

pub fn summarize_ratings(ratings: &[i32]) -> RatingSummary {
    if ratings.is_empty() {
        return RatingSummary {
            average: 0.0,
            count: 0,
        };
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    RatingSummary {
        average: sum as f64 / ratings.len() as f64,
        count: ratings.len() as i32,
    }
}

pub async fn add_review(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: ReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    let (rating, comment) = validate_review(payload)?;
    let reviewer = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;

    let txn = state.orm.begin().await?;
    let product = lock_product(&txn, product_id).await?;

    let already = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product.id))
        .filter(ReviewCol::UserId.eq(user.user_id))
        .one(&txn)
        .await?;
    if already.is_some() {
        return Err(AppError::BadRequest("Product already reviewed".into()));
    }

    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        user_id: Set(user.user_id),
        name: Set(reviewer.username),
        rating: Set(rating),
        comment: Set(comment),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    refresh_rating(&txn, product).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "review_add",
        "reviews",
        serde_json::json!({ "product_id": product_id, "review_id": review.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review added",
        Review::from(review),
        Some(Meta::empty()),
    ))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: ReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    let (rating, comment) = validate_review(payload)?;

    let txn = state.orm.begin().await?;
    let product = lock_product(&txn, product_id).await?;

    let existing = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product.id))
        .filter(ReviewCol::UserId.eq(user.user_id))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ReviewActive = existing.into();
    active.rating = Set(rating);
    active.comment = Set(comment);
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&txn).await?;

    refresh_rating(&txn, product).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "review_update",
        "reviews",
        serde_json::json!({ "product_id": product_id, "review_id": review.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review updated",
        Review::from(review),
        Some(Meta::empty()),
    ))
}

async fn lock_product(txn: &DatabaseTransaction, id: Uuid) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)
}

/// Locks every product the user has reviewed, in id order.
pub(crate) async fn lock_reviewed_products(
    txn: &DatabaseTransaction,
    user_id: Uuid,
) -> AppResult<Vec<ProductModel>> {
    let mut product_ids: Vec<Uuid> = Reviews::find()
        .filter(ReviewCol::UserId.eq(user_id))
        .all(txn)
        .await?
        .into_iter()
        .map(|r| r.product_id)
        .collect();
    product_ids.sort();
    product_ids.dedup();

    let mut products = Vec::with_capacity(product_ids.len());
    for id in product_ids {
        products.push(lock_product(txn, id).await?);
    }
    Ok(products)
}

pub(crate) async fn refresh_rating(txn: &DatabaseTransaction, product: ProductModel) -> AppResult<()> {
    let ratings: Vec<i32> = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product.id))
        .all(txn)
        .await?
        .into_iter()
        .map(|r| r.rating)
        .collect();
    let summary = summarize_ratings(&ratings);

    let mut active: ProductActive = product.into();
    active.rating = Set(summary.average);
    active.num_reviews = Set(summary.count);
    active.update(txn).await?;
    Ok(())
}

fn validate_review(payload: ReviewRequest) -> AppResult<(i32, String)> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".into()));
    }
    let comment = payload.comment.trim();
    if comment.is_empty() {
        return Err(AppError::BadRequest("Comment is required".into()));
    }
    Ok((payload.rating, comment.to_string()))
}
