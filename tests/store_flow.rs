use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Statement};
use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    dto::{
        addresses::CreateAddressRequest,
        auth::{LoginRequest, RegisterRequest},
        cart::AddToCartRequest,
        categories::CategoryRequest,
        products::{
            CreateProductRequest, FilterProductsRequest, ReviewRequest, UpdateProductRequest,
        },
        users::{AdminUpdateUserRequest, UpdateProfileRequest},
    },
    entity::{cart_items, reviews},
    error::AppError,
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER},
    models::Product,
    routes::params::{Pagination, ProductQuery, ProductSortBy, SortOrder},
    services::{
        address_service, auth_service, cart_service, category_service,
        product_service::{self, MAX_PRICE},
        review_service, user_service,
    },
    state::AppState,
};
use uuid::Uuid;

// Integration flow: register -> admin builds catalog -> shoppers browse, review, fill carts, manage addresses.
#[tokio::test]
async fn storefront_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let (registered, _token) = auth_service::register_user(
        &state,
        RegisterRequest {
            username: "shopper".into(),
            email: "Shopper@Example.com".into(),
            password: "secret1".into(),
        },
    )
    .await?;
    let shopper = registered.data.unwrap();
    assert_eq!(shopper.email, "shopper@example.com");

    let duplicate = auth_service::register_user(
        &state,
        RegisterRequest {
            username: "again".into(),
            email: "shopper@example.com".into(),
            password: "secret1".into(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    let bad_login = login(&state, "shopper@example.com", "wrong-password").await;
    assert!(matches!(bad_login, Err(AppError::Unauthorized(_))));
    login(&state, "shopper@example.com", "secret1").await?;

    let auth_user = AuthUser {
        user_id: shopper.id,
        role: shopper.role.clone(),
    };
    let admin = AuthUser {
        user_id: Uuid::new_v4(),
        role: ROLE_ADMIN.into(),
    };

    // Catalog
    let category = category_service::create_category(
        &state,
        &admin,
        CategoryRequest {
            name: "Gadgets".into(),
        },
    )
    .await?
    .data
    .unwrap();
    let dup_category = category_service::create_category(
        &state,
        &admin,
        CategoryRequest {
            name: "Gadgets".into(),
        },
    )
    .await;
    assert!(matches!(dup_category, Err(AppError::BadRequest(_))));

    let product = create_product(
        &state,
        &admin,
        "Widget",
        "A product for testing",
        "Acme",
        1000,
        category.id,
    )
    .await?;

    let unknown_category = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Orphan".into(),
            description: "No category".into(),
            brand: "Acme".into(),
            price: 1,
            count_in_stock: 1,
            category: Uuid::new_v4(),
            images: vec![],
        },
    )
    .await;
    assert!(matches!(unknown_category, Err(AppError::BadRequest(_))));

    let in_use = category_service::delete_category(&state, &admin, category.id).await;
    assert!(matches!(in_use, Err(AppError::BadRequest(_))));

    let gizmo = create_product(
        &state,
        &admin,
        "Gizmo",
        "A compact gadget",
        "Zed",
        250,
        category.id,
    )
    .await?;
    let doohickey = create_product(
        &state,
        &admin,
        "Doohickey",
        "Heavy duty",
        "acme tools",
        5000,
        category.id,
    )
    .await?;
    for n in 1..=4 {
        create_product(
            &state,
            &admin,
            &format!("Filler {n}"),
            "Shelf stock",
            "Generic",
            100 + n,
            category.id,
        )
        .await?;
    }

    let filtered = product_service::filter_products(
        &state,
        FilterProductsRequest {
            checked: vec![category.id],
            radio: vec![2000, 500],
            brands: vec![],
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(filtered.items.len(), 1);

    // Listing: keyword search over name, brand and description
    let (by_description, _) = list(
        &state,
        ProductQuery {
            keyword: Some("GADGET".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(names(&by_description), vec!["Gizmo"]);

    let (acme, _) = list(
        &state,
        ProductQuery {
            keyword: Some(" acme ".into()),
            ..Default::default()
        },
    )
    .await?;
    let mut by_brand = names(&acme);
    by_brand.sort();
    assert_eq!(by_brand, vec!["Doohickey", "Widget"]);

    let (in_range, _) = list(
        &state,
        ProductQuery {
            min_price: Some(500),
            max_price: Some(2000),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(names(&in_range), vec!["Widget"]);

    let (cheapest, total) = list(
        &state,
        ProductQuery {
            per_page: Some(2),
            sort_by: Some(ProductSortBy::Price),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(names(&cheapest), vec!["Filler 1", "Filler 2"]);
    assert_eq!(total, 7);

    let (last_page, _) = list(
        &state,
        ProductQuery {
            page: Some(4),
            per_page: Some(2),
            sort_by: Some(ProductSortBy::Price),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(names(&last_page), vec!["Doohickey"]);
    assert_eq!(last_page[0].id, doohickey.id);

    let (by_name, _) = list(
        &state,
        ProductQuery {
            per_page: Some(1),
            sort_by: Some(ProductSortBy::Name),
            sort_order: Some(SortOrder::Desc),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(names(&by_name), vec!["Widget"]);

    let newest = product_service::new_products(&state).await?.data.unwrap();
    assert_eq!(newest.items.len(), 5);
    assert!(newest.items.iter().all(|p| p.id != product.id));

    // Reviews keep the product rating in sync
    review_service::add_review(
        &state,
        &auth_user,
        product.id,
        ReviewRequest {
            rating: 4,
            comment: "Solid".into(),
        },
    )
    .await?;
    let again = review_service::add_review(
        &state,
        &auth_user,
        product.id,
        ReviewRequest {
            rating: 5,
            comment: "Twice".into(),
        },
    )
    .await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));

    review_service::update_review(
        &state,
        &auth_user,
        product.id,
        ReviewRequest {
            rating: 2,
            comment: "Broke".into(),
        },
    )
    .await?;
    let detail = product_service::get_product(&state, product.id)
        .await?
        .data
        .unwrap();
    assert_eq!(detail.product.num_reviews, 1);
    assert_eq!(detail.product.rating, 2.0);
    assert_eq!(detail.reviews[0].name, "shopper");
    assert_eq!(detail.category_name.as_deref(), Some("Gadgets"));

    let top = product_service::top_products(&state).await?.data.unwrap();
    assert_eq!(top.items.len(), 4);
    assert_eq!(top.items[0].id, product.id);

    // Cart
    let over_stock = cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 6,
        },
    )
    .await;
    assert!(matches!(over_stock, Err(AppError::BadRequest(_))));

    add_to_cart(&state, &auth_user, product.id, 1).await?;
    add_to_cart(&state, &auth_user, product.id, 3).await?;
    let cart = cart_service::get_cart(&state, &auth_user).await?.data.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items_count, 3);
    assert_eq!(cart.subtotal, 3000);

    cart_service::remove_from_cart(&state, &auth_user, product.id).await?;
    let missing = cart_service::remove_from_cart(&state, &auth_user, product.id).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // Concurrent adds of the same product collapse into one line
    let (a, b) = tokio::join!(
        add_to_cart(&state, &auth_user, gizmo.id, 1),
        add_to_cart(&state, &auth_user, gizmo.id, 2),
    );
    a?;
    b?;
    let cart = cart_service::get_cart(&state, &auth_user).await?.data.unwrap();
    assert_eq!(cart.items.len(), 1);
    cart_service::clear_cart(&state, &auth_user).await?;

    // A cart whose total cannot be represented is refused, not wrapped
    let pricey = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Yacht".into(),
            description: "Very large".into(),
            brand: "Harbor".into(),
            price: MAX_PRICE,
            count_in_stock: i32::MAX,
            category: category.id,
            images: vec![],
        },
    )
    .await?
    .data
    .unwrap();
    add_to_cart(&state, &auth_user, pricey.id, 10_000_000).await?;
    let overflow = cart_service::get_cart(&state, &auth_user).await;
    assert!(matches!(overflow, Err(AppError::BadRequest(_))));
    cart_service::clear_cart(&state, &auth_user).await?;
    product_service::delete_product(&state, &admin, pricey.id).await?;

    // Addresses: first is default, explicit default moves, deleting default promotes
    let first = address_service::create_address(&state, &auth_user, address("Home", false))
        .await?
        .data
        .unwrap();
    assert!(first.is_default);
    let second = address_service::create_address(&state, &auth_user, address("Office", true))
        .await?
        .data
        .unwrap();
    assert!(second.is_default);

    let list_addr = address_service::list_addresses(&state, &auth_user)
        .await?
        .data
        .unwrap();
    assert_eq!(list_addr.items.iter().filter(|a| a.is_default).count(), 1);
    assert_eq!(list_addr.items[0].id, second.id);

    address_service::set_default_address(&state, &auth_user, first.id).await?;
    let (logged,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM audit_logs WHERE action = 'address_default' AND user_id = $1",
    )
    .bind(auth_user.user_id)
    .fetch_one(&state.pool)
    .await?;
    assert_eq!(logged, 1);

    address_service::delete_address(&state, &auth_user, first.id).await?;
    let list_addr = address_service::list_addresses(&state, &auth_user)
        .await?
        .data
        .unwrap();
    assert_eq!(list_addr.items.len(), 1);
    assert!(list_addr.items[0].is_default);

    let stranger = AuthUser {
        user_id: Uuid::new_v4(),
        role: ROLE_USER.into(),
    };
    let foreign = address_service::set_default_address(&state, &stranger, second.id).await;
    assert!(matches!(foreign, Err(AppError::NotFound)));

    // Product updates
    let updated = product_service::update_product(
        &state,
        &admin,
        product.id,
        UpdateProductRequest {
            price: Some(1500),
            brand: Some(" Acme Pro ".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.price, 1500);
    assert_eq!(updated.brand, "Acme Pro");

    let bad_category = product_service::update_product(
        &state,
        &admin,
        product.id,
        UpdateProductRequest {
            category: Some(Uuid::new_v4()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(bad_category, Err(AppError::BadRequest(_))));

    let not_admin = product_service::update_product(
        &state,
        &auth_user,
        product.id,
        UpdateProductRequest {
            price: Some(1),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(not_admin, Err(AppError::Forbidden)));

    // A second shopper: first addresses created at once still leave one default
    let critic = register(&state, "critic", "critic@example.com").await?;
    let (a, b) = tokio::join!(
        address_service::create_address(&state, &critic, address("Flat", false)),
        address_service::create_address(&state, &critic, address("Studio", false)),
    );
    a?;
    b?;
    let critic_addresses = address_service::list_addresses(&state, &critic)
        .await?
        .data
        .unwrap();
    assert_eq!(critic_addresses.items.len(), 2);
    assert_eq!(
        critic_addresses.items.iter().filter(|a| a.is_default).count(),
        1
    );

    // Profile updates: email stays unique, password is rehashed
    let taken = user_service::update_profile(
        &state,
        &auth_user,
        UpdateProfileRequest {
            email: Some("CRITIC@example.com".into()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(taken, Err(AppError::BadRequest(_))));

    let profile = user_service::update_profile(
        &state,
        &auth_user,
        UpdateProfileRequest {
            username: Some("buyer".into()),
            email: Some("buyer@example.com".into()),
            password: Some("newsecret".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(profile.username, "buyer");
    assert_eq!(profile.email, "buyer@example.com");
    assert!(matches!(
        login(&state, "buyer@example.com", "secret1").await,
        Err(AppError::Unauthorized(_))
    ));
    login(&state, "buyer@example.com", "newsecret").await?;

    // Admin user listing
    let page = user_service::list_users(
        &state,
        &admin,
        Pagination {
            page: Some(1),
            per_page: Some(1),
        },
    )
    .await?;
    assert_eq!(page.data.unwrap().items.len(), 1);
    assert_eq!(page.meta.and_then(|m| m.total), Some(2));
    let refused = user_service::list_users(&state, &auth_user, Pagination::default()).await;
    assert!(matches!(refused, Err(AppError::Forbidden)));

    // Unique violations surface as bad requests, not server errors
    let raw_duplicate = sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role) VALUES ($1, 'dup', 'critic@example.com', 'x', 'user')",
    )
    .bind(Uuid::new_v4())
    .execute(&state.pool)
    .await
    .map_err(AppError::from);
    assert!(matches!(raw_duplicate, Err(AppError::BadRequest(_))));

    // Deleting a reviewer recomputes the ratings their reviews fed
    for (id, rating) in [(gizmo.id, 5), (product.id, 4)] {
        review_service::add_review(
            &state,
            &critic,
            id,
            ReviewRequest {
                rating,
                comment: "Opinionated".into(),
            },
        )
        .await?;
    }
    let widget = product_service::get_product(&state, product.id).await?.data.unwrap();
    assert_eq!(widget.product.num_reviews, 2);
    assert_eq!(widget.product.rating, 3.0);

    user_service::delete_user(&state, &admin, critic.user_id).await?;
    let gizmo_after = product_service::get_product(&state, gizmo.id).await?.data.unwrap();
    assert_eq!(gizmo_after.product.num_reviews, 0);
    assert_eq!(gizmo_after.product.rating, 0.0);
    assert!(gizmo_after.reviews.is_empty());
    let widget = product_service::get_product(&state, product.id).await?.data.unwrap();
    assert_eq!(widget.product.num_reviews, 1);
    assert_eq!(widget.product.rating, 2.0);

    // Admins cannot be deleted
    let promoted = user_service::update_user(
        &state,
        &admin,
        shopper.id,
        AdminUpdateUserRequest {
            role: Some(ROLE_ADMIN.into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert!(promoted.is_admin());
    let refused = user_service::delete_user(&state, &admin, shopper.id).await;
    assert!(matches!(refused, Err(AppError::BadRequest(_))));

    // Deleting the product cascades its reviews and cart lines
    add_to_cart(&state, &auth_user, product.id, 1).await?;
    product_service::delete_product(&state, &admin, product.id).await?;
    let gone = product_service::get_product(&state, product.id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    let orphan_reviews = reviews::Entity::find()
        .filter(reviews::Column::ProductId.eq(product.id))
        .count(&state.orm)
        .await?;
    assert_eq!(orphan_reviews, 0);
    let orphan_lines = cart_items::Entity::find()
        .filter(cart_items::Column::ProductId.eq(product.id))
        .count(&state.orm)
        .await?;
    assert_eq!(orphan_lines, 0);

    Ok(())
}

async fn register(state: &AppState, username: &str, email: &str) -> anyhow::Result<AuthUser> {
    let (resp, _token) = auth_service::register_user(
        state,
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "secret1".into(),
        },
    )
    .await?;
    let user = resp.data.unwrap();
    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

async fn login(state: &AppState, email: &str, password: &str) -> Result<String, AppError> {
    let resp = auth_service::login_user(
        state,
        LoginRequest {
            email: email.into(),
            password: password.into(),
        },
    )
    .await?;
    let token = resp.data.map(|d| d.token).unwrap_or_default();
    assert!(!token.is_empty());
    Ok(token)
}

async fn create_product(
    state: &AppState,
    admin: &AuthUser,
    name: &str,
    description: &str,
    brand: &str,
    price: i64,
    category: Uuid,
) -> anyhow::Result<Product> {
    let resp = product_service::create_product(
        state,
        admin,
        CreateProductRequest {
            name: name.into(),
            description: description.into(),
            brand: brand.into(),
            price,
            count_in_stock: 5,
            category,
            images: vec!["/uploads/sample.png".into()],
        },
    )
    .await?;
    Ok(resp.data.unwrap())
}

async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), AppError> {
    cart_service::add_to_cart(
        state,
        user,
        AddToCartRequest {
            product_id,
            quantity,
        },
    )
    .await?;
    Ok(())
}

async fn list(state: &AppState, query: ProductQuery) -> anyhow::Result<(Vec<Product>, i64)> {
    let resp = product_service::list_products(state, query).await?;
    let total = resp.meta.and_then(|m| m.total).unwrap_or_default();
    Ok((resp.data.unwrap().items, total))
}

fn names(items: &[Product]) -> Vec<&str> {
    items.iter().map(|p| p.name.as_str()).collect()
}

fn address(name: &str, is_default: bool) -> CreateAddressRequest {
    CreateAddressRequest {
        full_name: name.into(),
        phone: "555-0100".into(),
        street: "1 Main St".into(),
        city: "Springfield".into(),
        state: None,
        postal_code: "12345".into(),
        country: "US".into(),
        is_default,
    }
}

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url, 5).await?;
    run_migrations(&pool).await?;
    let state = AppState::new(pool, AppConfig::for_tests(database_url));

    // Clean tables between runs
    let backend = state.orm.get_database_backend();
    state
        .orm
        .execute(Statement::from_string(
            backend,
            "TRUNCATE TABLE reviews, cart_items, addresses, products, categories, audit_logs, users RESTART IDENTITY CASCADE",
        ))
        .await?;

    Ok(Some(state))
}
