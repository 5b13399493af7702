/// Calculation BREAD routes.
///
/// Every route requires authentication and only touches rows owned by the
/// caller. The arithmetic itself is deliberately simple; the interesting
/// parts are input validation and ownership scoping.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, DatabaseError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationType {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl std::fmt::Display for CalculationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculationType::Addition => write!(f, "addition"),
            CalculationType::Subtraction => write!(f, "subtraction"),
            CalculationType::Multiplication => write!(f, "multiplication"),
            CalculationType::Division => write!(f, "division"),
        }
    }
}

impl FromStr for CalculationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "addition" => Ok(CalculationType::Addition),
            "subtraction" => Ok(CalculationType::Subtraction),
            "multiplication" => Ok(CalculationType::Multiplication),
            "division" => Ok(CalculationType::Division),
            other => Err(AppError::Internal(format!(
                "Unknown calculation type in storage: {}",
                other
            ))),
        }
    }
}

impl CalculationType {
    /// Apply the operation left-to-right across the inputs.
    pub fn compute(&self, inputs: &[f64]) -> Result<f64, AppError> {
        let (first, rest) = match inputs.split_first() {
            Some((first, rest)) if !rest.is_empty() => (first, rest),
            _ => {
                return Err(ValidationError::InvalidFormat(
                    "at least two inputs are required".to_string(),
                )
                .into())
            }
        };
        match self {
            CalculationType::Addition => Ok(inputs.iter().sum()),
            CalculationType::Multiplication => Ok(inputs.iter().product()),
            CalculationType::Subtraction => Ok(rest.iter().fold(*first, |acc, x| acc - x)),
            CalculationType::Division => {
                let mut acc = *first;
                for x in rest {
                    if *x == 0.0 {
                        return Err(ValidationError::InvalidFormat(
                            "division by zero is not allowed".to_string(),
                        )
                        .into());
                    }
                    acc /= x;
                }
                Ok(acc)
            }
        }
    }
}

#[derive(Deserialize)]
pub struct CalculationRequest {
    #[serde(rename = "type")]
    pub calculation_type: CalculationType,
    pub inputs: Vec<f64>,
}

#[derive(Deserialize)]
pub struct CalculationUpdate {
    pub inputs: Option<Vec<f64>>,
}

#[derive(Serialize)]
pub struct CalculationResponse {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub calculation_type: CalculationType,
    pub inputs: Vec<f64>,
    pub result: f64,
    pub created_at: String,
    pub updated_at: String,
}

type CalculationRow = (
    Uuid,
    Uuid,
    String,
    serde_json::Value,
    f64,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn row_to_response(row: CalculationRow) -> Result<CalculationResponse, AppError> {
    let calculation_type = row.2.parse::<CalculationType>()?;
    let inputs: Vec<f64> = serde_json::from_value(row.3)
        .map_err(|e| AppError::Internal(format!("Corrupt inputs column: {}", e)))?;

    Ok(CalculationResponse {
        id: row.0.to_string(),
        user_id: row.1.to_string(),
        calculation_type,
        inputs,
        result: row.4,
        created_at: row.5.to_rfc3339(),
        updated_at: row.6.to_rfc3339(),
    })
}

fn parse_calc_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        ValidationError::InvalidFormat("invalid calculation id format".to_string()).into()
    })
}

fn not_found() -> AppError {
    DatabaseError::NotFound("calculation not found".to_string()).into()
}

/// POST /calculations
///
/// Compute and persist a calculation for the current user. The user id from
/// the client is ignored; ownership comes from the bearer token.
pub async fn create_calculation(
    form: web::Json<CalculationRequest>,
    current_user: web::ReqData<CurrentUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let result = form.calculation_type.compute(&form.inputs)?;

    let calc_id = Uuid::new_v4();
    let now = Utc::now();
    let inputs_json = serde_json::to_value(&form.inputs)
        .map_err(|e| AppError::Internal(format!("Failed to serialize inputs: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO calculations (id, user_id, type, inputs, result, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(calc_id)
    .bind(current_user.user.id)
    .bind(form.calculation_type.to_string())
    .bind(&inputs_json)
    .bind(result)
    .bind(now)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(
        user_id = %current_user.user.id,
        calculation_id = %calc_id,
        "Calculation created"
    );

    Ok(HttpResponse::Created().json(CalculationResponse {
        id: calc_id.to_string(),
        user_id: current_user.user.id.to_string(),
        calculation_type: form.calculation_type,
        inputs: form.inputs.clone(),
        result,
        created_at: now.to_rfc3339(),
        updated_at: now.to_rfc3339(),
    }))
}

/// GET /calculations
///
/// List the current user's calculations.
pub async fn list_calculations(
    current_user: web::ReqData<CurrentUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let rows = sqlx::query_as::<_, CalculationRow>(
        r#"
        SELECT id, user_id, type, inputs, result, created_at, updated_at
        FROM calculations WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(current_user.user.id)
    .fetch_all(pool.get_ref())
    .await?;

    let calculations: Result<Vec<_>, _> = rows.into_iter().map(row_to_response).collect();

    Ok(HttpResponse::Ok().json(calculations?))
}

/// GET /calculations/{calc_id}
pub async fn get_calculation(
    path: web::Path<String>,
    current_user: web::ReqData<CurrentUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let calc_id = parse_calc_id(&path)?;

    let row = sqlx::query_as::<_, CalculationRow>(
        r#"
        SELECT id, user_id, type, inputs, result, created_at, updated_at
        FROM calculations WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(calc_id)
    .bind(current_user.user.id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(not_found)?;

    Ok(HttpResponse::Ok().json(row_to_response(row)?))
}

/// PUT /calculations/{calc_id}
///
/// Replace the inputs and recompute the result.
pub async fn update_calculation(
    path: web::Path<String>,
    form: web::Json<CalculationUpdate>,
    current_user: web::ReqData<CurrentUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let calc_id = parse_calc_id(&path)?;

    let row = sqlx::query_as::<_, CalculationRow>(
        r#"
        SELECT id, user_id, type, inputs, result, created_at, updated_at
        FROM calculations WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(calc_id)
    .bind(current_user.user.id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(not_found)?;

    let mut response = row_to_response(row)?;

    if let Some(inputs) = &form.inputs {
        let result = response.calculation_type.compute(inputs)?;
        let now = Utc::now();
        let inputs_json = serde_json::to_value(inputs)
            .map_err(|e| AppError::Internal(format!("Failed to serialize inputs: {}", e)))?;

        // Conditional write: the row may have been deleted since the read
        // above, in which case nothing must be reported as updated.
        let outcome = sqlx::query(
            r#"
            UPDATE calculations SET inputs = $1, result = $2, updated_at = $3
            WHERE id = $4 AND user_id = $5
            "#,
        )
        .bind(&inputs_json)
        .bind(result)
        .bind(now)
        .bind(calc_id)
        .bind(current_user.user.id)
        .execute(pool.get_ref())
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(not_found());
        }

        response.inputs = inputs.clone();
        response.result = result;
        response.updated_at = now.to_rfc3339();
    }

    Ok(HttpResponse::Ok().json(response))
}

/// DELETE /calculations/{calc_id}
pub async fn delete_calculation(
    path: web::Path<String>,
    current_user: web::ReqData<CurrentUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let calc_id = parse_calc_id(&path)?;

    let result = sqlx::query("DELETE FROM calculations WHERE id = $1 AND user_id = $2")
        .bind(calc_id)
        .bind(current_user.user.id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found());
    }

    tracing::info!(
        user_id = %current_user.user.id,
        calculation_id = %calc_id,
        "Calculation deleted"
    );

    Ok(HttpResponse::NoContent().finish())
}
