use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use temtudo_db::{migrations, DbPool};
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub catalog: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let catalog = catalog_check(&state.db_pool).await;
    let ready = database.status == "ready" && catalog.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "temtudo-server runtime initialized".to_string(),
        },
        database,
        catalog,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            warn!(
                event_name = "system.health.database_unreachable",
                correlation_id = "health",
                error = %error,
                "health check could not reach the database"
            );
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

/// Schema version against the build's migrations, plus catalog row counts.
async fn catalog_check(pool: &DbPool) -> HealthCheck {
    let expected = migrations::latest_version();
    let applied = match migrations::applied_version(pool).await {
        Ok(applied) => applied,
        Err(error) => {
            return HealthCheck {
                status: "degraded",
                detail: format!("migration state unreadable: {error}"),
            };
        }
    };
    if applied != expected {
        warn!(
            event_name = "system.health.schema_behind",
            correlation_id = "health",
            applied = ?applied,
            expected = ?expected,
            "catalog schema does not match this build"
        );
        return HealthCheck {
            status: "degraded",
            detail: format!(
                "schema version {} but this build expects {}",
                version_label(applied),
                version_label(expected)
            ),
        };
    }

    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT (SELECT COUNT(*) FROM markets), (SELECT COUNT(*) FROM price_observations)",
    )
    .fetch_one(pool)
    .await;
    match counts {
        Ok((markets, observations)) => HealthCheck {
            status: "ready",
            detail: format!(
                "schema version {}; {markets} markets, {observations} price observations",
                version_label(applied)
            ),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("catalog tables unreadable: {error}"),
        },
    }
}

fn version_label(version: Option<i64>) -> String {
    version.map_or_else(|| "none".to_string(), |version| version.to_string())
}
