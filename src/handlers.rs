use actix_web::http::StatusCode;
use actix_web::{error, get, post, put, web, HttpRequest, HttpResponse, ResponseError};
use diesel::sqlite::SqliteConnection;
use failsafe::CircuitBreaker;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::db::{CircuitBreakerType, DbPool};
use crate::error::{PersistenceError, ValidationError};
use crate::models::{DishDraft, ScaledIngredient};
use crate::query;
use crate::scale::scale;
use crate::validation::{self, ValidDish};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("dish {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("recipe store is unavailable, try again later")]
    Unavailable,
    #[error("blocking task failed: {0}")]
    Blocking(#[from] error::BlockingError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Persistence(_) | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Persistence(_) | ApiError::Blocking(_) => {
                log::error!("{}", self);
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ScaleParams {
    pub servings: f64,
}

/// A dish's ingredients recomputed for `target_servings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledDish {
    pub dish_id: String,
    pub name: String,
    pub base_servings: i32,
    pub target_servings: f64,
    pub ingredients: Vec<ScaledIngredient>,
}

/// Run a store operation on the blocking pool, behind the circuit breaker.
/// Once the breaker opens, calls are rejected without touching the store.
async fn with_store<T, F>(
    pool: web::Data<DbPool>,
    circuit_breaker: web::Data<CircuitBreakerType>,
    operation: F,
) -> Result<T, ApiError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, PersistenceError> + Send + 'static,
    T: Send + 'static,
{
    let result = web::block(move || {
        circuit_breaker.call(|| {
            let mut conn = pool.get()?;
            operation(&mut conn)
        })
    })
    .await?;

    match result {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(e)) => Err(ApiError::Persistence(e)),
        Err(failsafe::Error::Rejected) => {
            log::warn!("circuit breaker open, rejecting store call");
            Err(ApiError::Unavailable)
        }
    }
}

#[get("/apis/dishes")]
async fn search_dishes(
    params: web::Query<SearchParams>,
    pool: web::Data<DbPool>,
    circuit_breaker: web::Data<CircuitBreakerType>,
) -> Result<HttpResponse, ApiError> {
    let term = params.into_inner().q;
    let dishes = with_store(pool, circuit_breaker, move |conn| {
        query::search_dishes(conn, term.trim())
    })
    .await?;
    Ok(HttpResponse::Ok().json(dishes))
}

#[post("/apis/dishes")]
async fn create_dish(
    draft: web::Json<DishDraft>,
    pool: web::Data<DbPool>,
    circuit_breaker: web::Data<CircuitBreakerType>,
) -> Result<HttpResponse, ApiError> {
    let dish = ValidDish::try_from(draft.into_inner())?;
    let created = with_store(pool, circuit_breaker, move |conn| {
        query::create_dish(conn, &dish)
    })
    .await?;
    log::info!("created dish {} ({})", created.id, created.name);
    Ok(HttpResponse::Created().json(created))
}

#[get("/apis/dishes/{id}")]
async fn get_dish(
    id: web::Path<String>,
    pool: web::Data<DbPool>,
    circuit_breaker: web::Data<CircuitBreakerType>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let lookup = id.clone();
    let dish = with_store(pool, circuit_breaker, move |conn| {
        query::find_dish(conn, &lookup)
    })
    .await?
    .ok_or(ApiError::NotFound(id))?;
    Ok(HttpResponse::Ok().json(dish))
}

#[put("/apis/dishes/{id}")]
async fn update_dish(
    id: web::Path<String>,
    draft: web::Json<DishDraft>,
    pool: web::Data<DbPool>,
    circuit_breaker: web::Data<CircuitBreakerType>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let dish = ValidDish::try_from(draft.into_inner())?;
    let lookup = id.clone();
    let updated = with_store(pool, circuit_breaker, move |conn| {
        query::update_dish(conn, &lookup, &dish)
    })
    .await?
    .ok_or(ApiError::NotFound(id))?;
    log::info!("updated dish {} ({})", updated.id, updated.name);
    Ok(HttpResponse::Ok().json(updated))
}

//servings is the target count, the dish's own base_servings is the origin
#[get("/apis/dishes/{id}/scaled")]
async fn scale_dish(
    id: web::Path<String>,
    params: web::Query<ScaleParams>,
    pool: web::Data<DbPool>,
    circuit_breaker: web::Data<CircuitBreakerType>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let target_servings = validation::target_servings(params.servings)?;
    let lookup = id.clone();
    let dish = with_store(pool, circuit_breaker, move |conn| {
        query::find_dish(conn, &lookup)
    })
    .await?
    .ok_or(ApiError::NotFound(id))?;

    let ingredients = scale(
        &dish.ingredients,
        f64::from(dish.base_servings),
        target_servings,
    );
    Ok(HttpResponse::Ok().json(ScaledDish {
        dish_id: dish.id,
        name: dish.name,
        base_servings: dish.base_servings,
        target_servings,
        ingredients,
    }))
}

/// Malformed bodies and query strings get the same `{"error": ...}` shape as
/// other failures.
fn bad_request<E>(err: E) -> actix_web::Error
where
    E: std::fmt::Debug + std::fmt::Display + 'static,
{
    let message = err.to_string();
    error::InternalError::from_response(
        err,
        HttpResponse::BadRequest().json(json!({ "error": message })),
    )
    .into()
}

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    bad_request(err)
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    bad_request(err)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .service(search_dishes)
        .service(create_dish)
        .service(get_dish)
        .service(update_dish)
        .service(scale_dish);
}
