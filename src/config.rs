use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    pub production: bool,
    pub upload_dir: String,
    pub max_body_bytes: usize,
    pub client_origin: String,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var("APP_PORT").unwrap_or(5000);
        let jwt_ttl_days = parse_var("JWT_TTL_DAYS").unwrap_or(30);
        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let max_body_bytes = parse_var("MAX_BODY_BYTES").unwrap_or(10 * 1024 * 1024);
        let client_origin =
            env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS").unwrap_or(10);

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            jwt_ttl_days,
            production,
            upload_dir,
            max_body_bytes,
            client_origin,
            db_max_connections,
        })
    }

    /// Configuration for tests and tooling that never touch the environment.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_days: 30,
            production: false,
            upload_dir: env::temp_dir()
                .join("storefront-api-uploads")
                .to_string_lossy()
                .into_owned(),
            max_body_bytes: 10 * 1024 * 1024,
            client_origin: "http://localhost:5173".to_string(),
            db_max_connections: 5,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
