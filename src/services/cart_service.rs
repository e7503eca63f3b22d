use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartView},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product},
    response::{ApiResponse, Empty, Meta},
    state::AppState,
};

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let rows = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .find_also_related(Products)
        .order_by_desc(CartCol::CreatedAt)
        .all(&state.orm)
        .await?;

    // rows whose product vanished are dropped by the FK cascade; skip any stragglers
    let items = rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|p| (item, Product::from(p))))
        .map(|(item, product)| -> AppResult<CartItemDto> {
            Ok(CartItemDto {
                id: item.id,
                line_total: line_total(product.price, item.quantity)?,
                product,
                quantity: item.quantity,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let view = summarize_cart(items)?;
    let total = view.items.len() as i64;
    Ok(ApiResponse::success("OK", view, Some(Meta::new(1, total, total))))
}

pub fn line_total(price: i64, quantity: i32) -> AppResult<i64> {
    price
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| AppError::BadRequest("Cart total is out of range".into()))
}

pub fn summarize_cart(items: Vec<CartItemDto>) -> AppResult<CartView> {
    let items_count = items.iter().map(|i| i64::from(i.quantity)).sum();
    let subtotal = items
        .iter()
        .try_fold(0i64, |acc, i| acc.checked_add(i.line_total))
        .ok_or_else(|| AppError::BadRequest("Cart total is out of range".into()))?;
    Ok(CartView {
        items,
        items_count,
        subtotal,
    })
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;
    if payload.quantity > product.count_in_stock {
        return Err(AppError::BadRequest(format!(
            "only {} left in stock",
            product.count_in_stock
        )));
    }

    // one row per (user, product); a repeat add overwrites the quantity
    let cart_item = CartItems::insert(CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        quantity: Set(payload.quantity),
        created_at: NotSet,
    })
    .on_conflict(
        OnConflict::columns([CartCol::UserId, CartCol::ProductId])
            .update_column(CartCol::Quantity)
            .to_owned(),
    )
    .exec_with_returning(&state.orm)
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success("OK", CartItem::from(cart_item), None))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<Empty>> {
    let result = CartItems::delete_many()
        .filter(CartCol::ProductId.eq(product_id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        state,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::message("Removed from cart"))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Empty>> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_clear",
        "cart_items",
        serde_json::json!({ "removed": result.rows_affected }),
    )
    .await;

    Ok(ApiResponse::message("Cart cleared"))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn line(price: i64, quantity: i32) -> CartItemDto {
        let now = Utc::now();
        CartItemDto {
            id: Uuid::new_v4(),
            product: Product {
                id: Uuid::new_v4(),
                name: "p".into(),
                description: "d".into(),
                brand: "b".into(),
                price,
                count_in_stock: 10,
                category_id: Uuid::new_v4(),
                images: vec![],
                rating: 0.0,
                num_reviews: 0,
                created_at: now,
                updated_at: now,
            },
            quantity,
            line_total: price * i64::from(quantity),
        }
    }

    #[test]
    fn totals_sum_quantities_and_line_totals() {
        let view = summarize_cart(vec![line(250, 2), line(1000, 1)]).unwrap();
        assert_eq!(view.items_count, 3);
        assert_eq!(view.subtotal, 1500);
    }

    #[test]
    fn empty_cart_is_zero() {
        let view = summarize_cart(vec![]).unwrap();
        assert_eq!(view.items_count, 0);
        assert_eq!(view.subtotal, 0);
        assert!(view.items.is_empty());
    }

    #[test]
    fn oversized_totals_are_rejected_instead_of_wrapping() {
        let huge = i64::MAX / 2 + 1;
        assert!(matches!(line_total(huge, 2), Err(AppError::BadRequest(_))));
        assert_eq!(line_total(1999, 3).unwrap(), 5997);

        let view = summarize_cart(vec![line(huge, 1), line(huge, 1)]);
        assert!(matches!(view, Err(AppError::BadRequest(_))));
    }
}
