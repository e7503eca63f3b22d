use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{
        CreateProductRequest, FilterProductsRequest, ProductCatalog, ProductDetail, ProductList,
        ProductWithCategory, UpdateProductRequest,
    },
    entity::{
        categories::{Entity as Categories, Model as CategoryModel},
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
        reviews::{Column as ReviewCol, Entity as Reviews},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, Review},
    response::{ApiResponse, Empty, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub const MAX_IMAGES: usize = 12;
/// Upper bound on a product price, in minor units.
pub const MAX_PRICE: i64 = 1_000_000_000_000;
const TOP_LIMIT: u64 = 4;
const NEW_LIMIT: u64 = 5;

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(keyword) = query.keyword.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", keyword);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Brand).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
        ProductSortBy::Rating => Column::Rating,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn list_all_products(state: &AppState) -> AppResult<ApiResponse<ProductCatalog>> {
    let items: Vec<ProductWithCategory> = Products::find()
        .find_also_related(Categories)
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(product, category)| with_category(product, category))
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Products",
        ProductCatalog { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn top_products(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    let items = Products::find()
        .order_by_desc(Column::Rating)
        .order_by_desc(Column::NumReviews)
        .limit(TOP_LIMIT)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();
    Ok(ApiResponse::success("Top products", ProductList { items }, None))
}

pub async fn new_products(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    let items = Products::find()
        .order_by_desc(Column::CreatedAt)
        .limit(NEW_LIMIT)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();
    Ok(ApiResponse::success("New products", ProductList { items }, None))
}

pub async fn filter_products(
    state: &AppState,
    payload: FilterProductsRequest,
) -> AppResult<ApiResponse<ProductList>> {
    let mut condition = Condition::all();
    if !payload.checked.is_empty() {
        condition = condition.add(Column::CategoryId.is_in(payload.checked));
    }
    if let Some((min, max)) = price_range(&payload.radio)? {
        condition = condition.add(Column::Price.between(min, max));
    }
    let brands: Vec<String> = payload
        .brands
        .iter()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();
    if !brands.is_empty() {
        condition = condition.add(Column::Brand.is_in(brands));
    }

    let items: Vec<Product> = Products::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Filtered products",
        ProductList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let (product, category) = Products::find_by_id(id)
        .find_also_related(Categories)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let reviews = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product.id))
        .order_by_desc(ReviewCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Review::from)
        .collect();

    let data = ProductDetail {
        product: Product::from(product),
        category_name: category.map(|c| c.name),
        reviews,
    };
    Ok(ApiResponse::success("Product", data, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let payload = prepare_product(state, payload).await?;

    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        description: Set(payload.description),
        brand: Set(payload.brand),
        price: Set(payload.price),
        count_in_stock: Set(payload.count_in_stock),
        category_id: Set(payload.category),
        images: Set(serde_json::json!(payload.images)),
        rating: Set(0.0),
        num_reviews: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;
    tracing::info!(product_id = %product.id, "product created");

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(required("Name", name)?);
    }
    if let Some(description) = payload.description {
        active.description = Set(required("Description", description)?);
    }
    if let Some(brand) = payload.brand {
        active.brand = Set(required("Brand", brand)?);
    }
    if let Some(price) = payload.price {
        active.price = Set(valid_price(price)?);
    }
    if let Some(count) = payload.count_in_stock {
        active.count_in_stock = Set(non_negative_stock(count)?);
    }
    if let Some(category) = payload.category {
        ensure_category_exists(state, category).await?;
        active.category_id = Set(category);
    }
    if let Some(images) = payload.images {
        active.images = Set(serde_json::json!(check_images(images)?));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Empty>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        state,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Deleted"))
}

/// Field validation plus the category lookup, with nothing written.
pub async fn prepare_product(
    state: &AppState,
    payload: CreateProductRequest,
) -> AppResult<CreateProductRequest> {
    let payload = validate_new_product(payload)?;
    ensure_category_exists(state, payload.category).await?;
    Ok(payload)
}

async fn ensure_category_exists(state: &AppState, id: Uuid) -> AppResult<()> {
    if Categories::find_by_id(id).one(&state.orm).await?.is_none() {
        return Err(AppError::BadRequest("Category not found".into()));
    }
    Ok(())
}

fn with_category(product: ProductModel, category: Option<CategoryModel>) -> ProductWithCategory {
    ProductWithCategory {
        product: Product::from(product),
        category_name: category.map(|c| c.name),
    }
}

pub fn validate_new_product(payload: CreateProductRequest) -> AppResult<CreateProductRequest> {
    Ok(CreateProductRequest {
        name: required("Name", payload.name)?,
        description: required("Description", payload.description)?,
        brand: required("Brand", payload.brand)?,
        price: valid_price(payload.price)?,
        count_in_stock: non_negative_stock(payload.count_in_stock)?,
        category: payload.category,
        images: check_images(payload.images)?,
    })
}

fn required(field: &str, value: String) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn valid_price(price: i64) -> AppResult<i64> {
    if price < 0 {
        return Err(AppError::BadRequest("Price must not be negative".into()));
    }
    if price > MAX_PRICE {
        return Err(AppError::BadRequest(format!(
            "Price must not exceed {MAX_PRICE}"
        )));
    }
    Ok(price)
}

fn non_negative_stock(count: i32) -> AppResult<i32> {
    if count < 0 {
        return Err(AppError::BadRequest("Quantity must not be negative".into()));
    }
    Ok(count)
}

fn check_images(images: Vec<String>) -> AppResult<Vec<String>> {
    if images.len() > MAX_IMAGES {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_IMAGES} images are allowed"
        )));
    }
    Ok(images
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect())
}

/// `[min, max]` in either order; an empty list means no price constraint.
pub fn price_range(radio: &[i64]) -> AppResult<Option<(i64, i64)>> {
    match radio {
        [] => Ok(None),
        [a, b] => Ok(Some(((*a).min(*b), (*a).max(*b)))),
        _ => Err(AppError::BadRequest(
            "radio must be a [min, max] price pair".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateProductRequest {
        CreateProductRequest {
            name: " Ferris Plush ".into(),
            description: "Soft crab".into(),
            brand: "Rustacean".into(),
            price: 1999,
            count_in_stock: 3,
            category: Uuid::new_v4(),
            images: vec!["/uploads/a.png".into(), " ".into()],
        }
    }

    #[test]
    fn new_product_is_trimmed_and_blank_images_dropped() {
        let valid = validate_new_product(request()).unwrap();
        assert_eq!(valid.name, "Ferris Plush");
        assert_eq!(valid.images, vec!["/uploads/a.png".to_string()]);
    }

    #[test]
    fn missing_brand_is_named_in_error() {
        let mut req = request();
        req.brand = "  ".into();
        match validate_new_product(req) {
            Err(AppError::BadRequest(msg)) => assert_eq!(msg, "Brand is required"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn negative_price_and_too_many_images_rejected() {
        let mut req = request();
        req.price = -1;
        assert!(validate_new_product(req).is_err());

        let mut req = request();
        req.images = vec!["/uploads/x.png".into(); MAX_IMAGES + 1];
        assert!(validate_new_product(req).is_err());
    }

    #[test]
    fn price_above_cap_rejected() {
        let mut req = request();
        req.price = MAX_PRICE;
        assert!(validate_new_product(req).is_ok());

        let mut req = request();
        req.price = i64::MAX / 2 + 1;
        assert!(matches!(
            validate_new_product(req),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn price_range_accepts_pairs_in_any_order() {
        assert_eq!(price_range(&[]).unwrap(), None);
        assert_eq!(price_range(&[50, 10]).unwrap(), Some((10, 50)));
        assert!(price_range(&[10]).is_err());
        assert!(price_range(&[1, 2, 3]).is_err());
    }
}
