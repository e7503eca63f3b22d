use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::products::{
        CreateProductRequest, FilterProductsRequest, ProductCatalog, ProductDetail, ProductForm,
        ProductList, ReviewRequest, UpdateProductRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, Review},
    response::{ApiResponse, Empty},
    routes::params::ProductQuery,
    services::{
        product_service::{self, MAX_IMAGES},
        review_service,
        upload_service::{IncomingFile, check_image, remove_images, store_images},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/all", get(list_all_products))
        .route("/top", get(top_products))
        .route("/new", get(new_products))
        .route("/filtered-products", post(filter_products))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/reviews", post(add_review).put(update_review))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("keyword" = Option<String>, Query, description = "Search name, brand and description"),
        ("min_price" = Option<i64>, Query, description = "Minimum price"),
        ("max_price" = Option<i64>, Query, description = "Maximum price"),
        ("sort_by" = Option<String>, Query, description = "created_at, price, name, rating"),
        ("sort_order" = Option<String>, Query, description = "asc, desc")
    ),
    responses(
        (status = 200, description = "List products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/all",
    responses(
        (status = 200, description = "Every product with its category, newest first", body = ApiResponse<ProductCatalog>)
    ),
    tag = "Products"
)]
pub async fn list_all_products(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ProductCatalog>>> {
    let resp = product_service::list_all_products(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/top",
    responses(
        (status = 200, description = "Highest rated products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn top_products(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::top_products(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/new",
    responses(
        (status = 200, description = "Newest products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn new_products(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::new_products(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/filtered-products",
    request_body = FilterProductsRequest,
    responses(
        (status = 200, description = "Products matching categories, price range and brands", body = ApiResponse<ProductList>),
        (status = 400, description = "Malformed price range")
    ),
    tag = "Products"
)]
pub async fn filter_products(
    State(state): State<AppState>,
    Json(payload): Json<FilterProductsRequest>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::filter_products(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product with reviews", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body(content = ProductForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Create product", body = ApiResponse<Product>),
        (status = 400, description = "Missing field, bad image or unknown category"),
        (status = 403, description = "Forbidden")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    // images reach the disk only once the rest of the form is known good
    ensure_admin(&user)?;
    let (fields, files) = read_product_form(multipart).await?;
    let mut payload = product_from_form(&fields, Vec::new())?;
    payload = product_service::prepare_product(&state, payload).await?;

    let upload_dir = &state.config.upload_dir;
    payload.images = store_images(upload_dir, files).await?;
    let stored = payload.images.clone();
    match product_service::create_product(&state, &user, payload).await {
        Ok(resp) => Ok((StatusCode::CREATED, Json(resp))),
        Err(err) => {
            remove_images(upload_dir, &stored).await;
            Err(err)
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated product", body = ApiResponse<Product>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::update_product(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Deleted product", body = ApiResponse<Empty>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    let resp = product_service::delete_product(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/reviews",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = ReviewRequest,
    responses(
        (status = 201, description = "Review added", body = ApiResponse<Review>),
        (status = 400, description = "Invalid review or already reviewed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Product not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn add_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Review>>)> {
    let resp = review_service::add_review(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}/reviews",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = ApiResponse<Review>),
        (status = 400, description = "Invalid review"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Product or review not found")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = review_service::update_review(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

async fn read_product_form(
    mut multipart: Multipart,
) -> AppResult<(HashMap<String, String>, Vec<IncomingFile>)> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                if images.len() >= MAX_IMAGES {
                    return Err(AppError::BadRequest(format!(
                        "At most {MAX_IMAGES} images are allowed"
                    )));
                }
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                let file = IncomingFile {
                    field: name,
                    file_name,
                    content_type,
                    bytes,
                };
                check_image(&file)?;
                images.push(file);
            }
            None => {
                let value = field.text().await?;
                fields.insert(name, value);
            }
        }
    }

    Ok((fields, images))
}

fn product_from_form(
    fields: &HashMap<String, String>,
    images: Vec<String>,
) -> AppResult<CreateProductRequest> {
    let text = |key: &str, label: &str| -> AppResult<String> {
        fields
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("{label} is required")))
    };

    let price = text("price", "Price")?
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest("Price must be a whole number".into()))?;
    let count_in_stock = text("count_in_stock", "Quantity")
        .or_else(|_| text("quantity", "Quantity"))?
        .parse::<i32>()
        .map_err(|_| AppError::BadRequest("Quantity must be a whole number".into()))?;
    let category = Uuid::parse_str(&text("category", "Category")?)
        .map_err(|_| AppError::BadRequest("Category must be a valid id".into()))?;

    Ok(CreateProductRequest {
        name: text("name", "Name")?,
        description: text("description", "Description")?,
        brand: text("brand", "Brand")?,
        price,
        count_in_stock,
        category,
        images,
    })
}
