use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::person::Person;
use crate::product::Product;

#[async_trait]
pub trait PersonRepository: Send + Sync {
    /// Persist the person and replace its product collection.
    async fn save(&self, person: &Person) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Person>>;
    async fn find_by_orcid(&self, orcid_id: &str) -> Result<Option<Person>>;
}

const CREATE_PERSON_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS person (
        id                   TEXT PRIMARY KEY,
        orcid_id             TEXT UNIQUE,
        email                TEXT,
        given_name           TEXT,
        family_name          TEXT,
        picture              TEXT,
        oauth_source         TEXT,
        oauth_api_raw        JSONB,
        given_names_orcid    TEXT,
        family_name_orcid    TEXT,
        api_raw              JSONB,
        campaign             TEXT,
        campaign_email       TEXT,
        num_works            BIGINT NOT NULL DEFAULT 0,
        t_index              BIGINT NOT NULL DEFAULT 0,
        num_products         BIGINT NOT NULL DEFAULT 0,
        metric_sums          JSONB NOT NULL DEFAULT '{}',
        num_with_metrics     JSONB NOT NULL DEFAULT '{}',
        num_sources          BIGINT NOT NULL DEFAULT 0,
        altmetric_score      DOUBLE PRECISION NOT NULL DEFAULT 0,
        monthly_event_count  BIGINT NOT NULL DEFAULT 0,
        error                TEXT,
        last_update          TIMESTAMPTZ
    )
"#;

const CREATE_PRODUCT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS product (
        person_id          TEXT NOT NULL REFERENCES person(id) ON DELETE CASCADE,
        doi                TEXT NOT NULL,
        position           INTEGER NOT NULL,
        title              TEXT,
        year               INTEGER,
        event_dates        JSONB NOT NULL DEFAULT '[]',
        altmetric_counts   JSONB NOT NULL DEFAULT '{}',
        altmetric_score    DOUBLE PRECISION,
        altmetric_api_raw  JSONB,
        PRIMARY KEY (person_id, doi)
    )
"#;

const PERSON_COLUMNS: &str = "id, orcid_id, email, given_name, family_name, picture, \
    oauth_source, oauth_api_raw, given_names_orcid, family_name_orcid, api_raw, \
    campaign, campaign_email, num_works, t_index, num_products, metric_sums, \
    num_with_metrics, num_sources, altmetric_score, monthly_event_count, error, last_update";

#[derive(sqlx::FromRow)]
struct PersonRow {
    id: String,
    orcid_id: Option<String>,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    oauth_source: Option<String>,
    oauth_api_raw: Option<Value>,
    given_names_orcid: Option<String>,
    family_name_orcid: Option<String>,
    api_raw: Option<Value>,
    campaign: Option<String>,
    campaign_email: Option<String>,
    num_works: i64,
    t_index: i64,
    num_products: i64,
    metric_sums: Json<BTreeMap<String, i64>>,
    num_with_metrics: Json<BTreeMap<String, i64>>,
    num_sources: i64,
    altmetric_score: f64,
    monthly_event_count: i64,
    error: Option<String>,
    last_update: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    doi: String,
    title: Option<String>,
    year: Option<i32>,
    event_dates: Json<Vec<String>>,
    altmetric_counts: Json<BTreeMap<String, Value>>,
    altmetric_score: Option<f64>,
    altmetric_api_raw: Option<Value>,
}

impl PersonRow {
    fn into_person(self, products: Vec<Product>) -> Person {
        Person {
            id: self.id,
            orcid_id: self.orcid_id,
            email: self.email,
            given_name: self.given_name,
            family_name: self.family_name,
            picture: self.picture,
            oauth_source: self.oauth_source,
            oauth_api_raw: self.oauth_api_raw,
            given_names_orcid: self.given_names_orcid,
            family_name_orcid: self.family_name_orcid,
            api_raw: self.api_raw,
            campaign: self.campaign,
            campaign_email: self.campaign_email,
            num_works: self.num_works,
            t_index: self.t_index,
            num_products: self.num_products,
            metric_sums: self.metric_sums.0,
            num_with_metrics: self.num_with_metrics.0,
            num_sources: self.num_sources,
            altmetric_score: self.altmetric_score,
            monthly_event_count: self.monthly_event_count,
            error: self.error,
            last_update: self.last_update,
            products,
        }
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            doi: row.doi,
            title: row.title,
            year: row.year,
            event_dates: row.event_dates.0,
            altmetric_counts: row.altmetric_counts.0,
            altmetric_score: row.altmetric_score,
            altmetric_api_raw: row.altmetric_api_raw,
        }
    }
}

/// Postgres-backed person storage. Products are owned by their person and
/// deleted with it.
#[derive(Clone)]
pub struct PersonStore {
    pool: PgPool,
}

impl PersonStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_PERSON_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_PRODUCT_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM person WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load(&self, row: Option<PersonRow>) -> Result<Option<Person>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let products = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT doi, title, year, event_dates, altmetric_counts, altmetric_score, altmetric_api_raw
            FROM product
            WHERE person_id = $1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(
            row.into_person(products.into_iter().map(Product::from).collect()),
        ))
    }
}

#[async_trait]
impl PersonRepository for PersonStore {
    async fn save(&self, person: &Person) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO person ({PERSON_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            ON CONFLICT (id) DO UPDATE SET
                orcid_id = EXCLUDED.orcid_id,
                email = EXCLUDED.email,
                given_name = EXCLUDED.given_name,
                family_name = EXCLUDED.family_name,
                picture = EXCLUDED.picture,
                oauth_source = EXCLUDED.oauth_source,
                oauth_api_raw = EXCLUDED.oauth_api_raw,
                given_names_orcid = EXCLUDED.given_names_orcid,
                family_name_orcid = EXCLUDED.family_name_orcid,
                api_raw = EXCLUDED.api_raw,
                campaign = EXCLUDED.campaign,
                campaign_email = EXCLUDED.campaign_email,
                num_works = EXCLUDED.num_works,
                t_index = EXCLUDED.t_index,
                num_products = EXCLUDED.num_products,
                metric_sums = EXCLUDED.metric_sums,
                num_with_metrics = EXCLUDED.num_with_metrics,
                num_sources = EXCLUDED.num_sources,
                altmetric_score = EXCLUDED.altmetric_score,
                monthly_event_count = EXCLUDED.monthly_event_count,
                error = EXCLUDED.error,
                last_update = EXCLUDED.last_update
            "#
        ))
        .bind(&person.id)
        .bind(&person.orcid_id)
        .bind(&person.email)
        .bind(&person.given_name)
        .bind(&person.family_name)
        .bind(&person.picture)
        .bind(&person.oauth_source)
        .bind(&person.oauth_api_raw)
        .bind(&person.given_names_orcid)
        .bind(&person.family_name_orcid)
        .bind(&person.api_raw)
        .bind(&person.campaign)
        .bind(&person.campaign_email)
        .bind(person.num_works)
        .bind(person.t_index)
        .bind(person.num_products)
        .bind(Json(&person.metric_sums))
        .bind(Json(&person.num_with_metrics))
        .bind(person.num_sources)
        .bind(person.altmetric_score)
        .bind(person.monthly_event_count)
        .bind(&person.error)
        .bind(person.last_update)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM product WHERE person_id = $1")
            .bind(&person.id)
            .execute(&mut *tx)
            .await?;

        for (position, product) in person.products.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO product (person_id, doi, position, title, year, event_dates,
                                     altmetric_counts, altmetric_score, altmetric_api_raw)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&person.id)
            .bind(&product.doi)
            .bind(position as i32)
            .bind(&product.title)
            .bind(product.year)
            .bind(Json(&product.event_dates))
            .bind(Json(&product.altmetric_counts))
            .bind(product.altmetric_score)
            .bind(&product.altmetric_api_raw)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(id = %person.id, products = person.products.len(), "Person saved");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Person>> {
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {PERSON_COLUMNS} FROM person WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.load(row).await
    }

    async fn find_by_orcid(&self, orcid_id: &str) -> Result<Option<Person>> {
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {PERSON_COLUMNS} FROM person WHERE orcid_id = $1"
        ))
        .bind(orcid_id)
        .fetch_optional(&self.pool)
        .await?;
        self.load(row).await
    }
}
