use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartItemDto, CartView},
        categories::{CategoryList, CategoryRequest},
        products::{
            FilterProductsRequest, ProductCatalog, ProductDetail, ProductForm, ProductList,
            ProductWithCategory, ReviewRequest, UpdateProductRequest,
        },
        uploads::{ImageUploadForm, UploadedImage},
        users::{AdminUpdateUserRequest, UpdateProfileRequest, UserList},
    },
    middleware::auth::SESSION_COOKIE,
    models::{Address, CartItem, Category, Product, Review, User},
    response::{Empty, Meta},
    routes::{addresses, cart, categories, health, params, products, uploads, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "cookie_auth",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        users::register,
        users::login,
        users::logout,
        users::list_users,
        users::get_profile,
        users::update_profile,
        users::get_user,
        users::update_user,
        users::delete_user,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::list_all_products,
        products::top_products,
        products::new_products,
        products::filter_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::add_review,
        products::update_review,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        cart::clear_cart,
        addresses::list_addresses,
        addresses::create_address,
        addresses::update_address,
        addresses::set_default_address,
        addresses::delete_address,
        uploads::upload_image
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            Review,
            CartItem,
            Address,
            Meta,
            Empty,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            AdminUpdateUserRequest,
            UserList,
            CategoryRequest,
            CategoryList,
            ProductForm,
            UpdateProductRequest,
            FilterProductsRequest,
            ReviewRequest,
            ProductList,
            ProductWithCategory,
            ProductCatalog,
            ProductDetail,
            AddToCartRequest,
            CartItemDto,
            CartView,
            CreateAddressRequest,
            UpdateAddressRequest,
            AddressList,
            ImageUploadForm,
            UploadedImage,
            params::Pagination,
            params::ProductQuery,
            health::HealthData
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Users", description = "Registration, sessions and user administration"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Product and review endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Addresses", description = "Shipping address endpoints"),
        (name = "Uploads", description = "Image upload endpoint"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
