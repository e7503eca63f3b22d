use storefront_api::{
    config::AppConfig,
    db::{DbPool, create_pool, run_migrations},
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    // Ensure migrations are applied.
    run_migrations(&pool).await?;

    let admin_id = ensure_user(&pool, "admin", "admin@example.com", "admin123", ROLE_ADMIN).await?;
    let user_id = ensure_user(&pool, "shopper", "user@example.com", "user123", ROLE_USER).await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &DbPool,
    username: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, username, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_category(pool: &DbPool, name: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn seed_catalog(pool: &DbPool) -> anyhow::Result<()> {
    let apparel = ensure_category(pool, "Apparel").await?;
    let kitchen = ensure_category(pool, "Kitchen").await?;
    let books = ensure_category(pool, "Books").await?;

    let products = vec![
        ("Axum Hoodie", "Warm hoodie for Rustaceans", "Ferris Wear", 5500, 50, apparel),
        ("Ferris Mug", "Coffee tastes better with Ferris", "Crab Co", 1200, 100, kitchen),
        ("Rust Sticker Pack", "Decorate your laptop", "Crab Co", 500, 200, apparel),
        ("E-book: Async Rust", "Learn async Rust patterns", "Tokio Press", 2500, 75, books),
    ];

    for (name, desc, brand, price, stock, category) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, brand, price, count_in_stock, category_id)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (SELECT 1 FROM products WHERE name = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(brand)
        .bind(price as i64)
        .bind(stock as i32)
        .bind(category)
        .execute(pool)
        .await?;
    }

    println!("Seeded categories and products");
    Ok(())
}
