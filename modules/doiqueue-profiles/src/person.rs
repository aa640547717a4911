use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use doiqueue_common::TokenService;

use crate::aggregate::ProfileMetrics;
use crate::error::{ProfileError, Result};
use crate::product::Product;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";
const ID_LENGTH: usize = 10;

fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Login payload from the OAuth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    /// The full provider response, kept verbatim.
    #[serde(skip)]
    pub raw: Value,
}

impl OAuthProfile {
    pub fn from_value(raw: Value) -> serde_json::Result<Self> {
        let mut profile: Self = serde_json::from_value(raw.clone())?;
        profile.raw = raw;
        Ok(profile)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: String,
    pub orcid_id: Option<String>,

    // OAuth login identity
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub oauth_source: Option<String>,
    pub oauth_api_raw: Option<Value>,

    // Registry identity, overwritten on every successful refresh
    pub given_names_orcid: Option<String>,
    pub family_name_orcid: Option<String>,
    pub api_raw: Option<Value>,

    pub campaign: Option<String>,
    pub campaign_email: Option<String>,

    /// Deduplicated works with a DOI in the registry, before keeping the newest.
    pub num_works: i64,
    pub t_index: i64,
    pub num_products: i64,
    pub metric_sums: BTreeMap<String, i64>,
    pub num_with_metrics: BTreeMap<String, i64>,
    pub num_sources: i64,
    pub altmetric_score: f64,
    pub monthly_event_count: i64,

    pub error: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub products: Vec<Product>,
}

impl Default for Person {
    fn default() -> Self {
        Self::new()
    }
}

impl Person {
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            orcid_id: None,
            email: None,
            given_name: None,
            family_name: None,
            picture: None,
            oauth_source: None,
            oauth_api_raw: None,
            given_names_orcid: None,
            family_name_orcid: None,
            api_raw: None,
            campaign: None,
            campaign_email: None,
            num_works: 0,
            t_index: 0,
            num_products: 0,
            metric_sums: BTreeMap::new(),
            num_with_metrics: BTreeMap::new(),
            num_sources: 0,
            altmetric_score: 0.0,
            monthly_event_count: 0,
            error: None,
            last_update: None,
            products: Vec::new(),
        }
    }

    pub fn with_orcid(orcid_id: &str) -> Self {
        Self {
            orcid_id: Some(orcid_id.to_string()),
            ..Self::new()
        }
    }

    /// Append unless a product with the same DOI is already attached.
    pub fn add_product(&mut self, product: Product) -> bool {
        if self.products.iter().any(|p| p.doi == product.doi) {
            return false;
        }
        self.products.push(product);
        true
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.given_names_orcid.as_deref().unwrap_or_default(),
            self.family_name_orcid.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    pub fn apply_metrics(&mut self, metrics: ProfileMetrics) {
        self.t_index = metrics.t_index;
        self.num_products = metrics.num_products;
        self.metric_sums = metrics.metric_sums;
        self.num_with_metrics = metrics.num_with_metrics;
        self.num_sources = metrics.num_sources;
        self.altmetric_score = metrics.altmetric_score;
        self.monthly_event_count = metrics.monthly_event_count;
    }

    /// Login token for the web layer, keyed on the person's email.
    pub fn token(&self, tokens: &TokenService) -> Result<String> {
        let email = self.email.as_deref().ok_or(ProfileError::NoEmail)?;
        Ok(tokens.create_token(email, self.picture.as_deref())?)
    }

    pub fn public_view(&self) -> PublicProfile<'_> {
        PublicProfile {
            email: self.email.as_deref(),
            given_names: self.given_name.as_deref(),
            family_name: self.family_name.as_deref(),
            picture: self.picture.as_deref(),
            orcid_id: self.orcid_id.as_deref(),
        }
    }

    pub fn orcid_view(&self) -> OrcidView<'_> {
        OrcidView {
            id: &self.id,
            orcid_id: self.orcid_id.as_deref(),
            given_names: self.given_names_orcid.as_deref(),
            family_name: self.family_name_orcid.as_deref(),
            metric_sums: &self.metric_sums,
            monthly_event_count: self.monthly_event_count,
            products: &self.products,
        }
    }
}

/// What a logged-in user sees about themselves.
#[derive(Debug, Serialize)]
pub struct PublicProfile<'a> {
    pub email: Option<&'a str>,
    pub given_names: Option<&'a str>,
    pub family_name: Option<&'a str>,
    pub picture: Option<&'a str>,
    pub orcid_id: Option<&'a str>,
}

/// Registry-derived profile with its products.
#[derive(Debug, Serialize)]
pub struct OrcidView<'a> {
    pub id: &'a str,
    pub orcid_id: Option<&'a str>,
    pub given_names: Option<&'a str>,
    pub family_name: Option<&'a str>,
    pub metric_sums: &'a BTreeMap<String, i64>,
    pub monthly_event_count: i64,
    pub products: &'a [Product],
}

pub fn make_person_from_oauth(profile: OAuthProfile) -> Person {
    Person {
        email: Some(profile.email),
        given_name: profile.given_name,
        family_name: profile.family_name,
        picture: profile.picture,
        oauth_source: Some("google".to_string()),
        oauth_api_raw: Some(profile.raw),
        ..Person::new()
    }
}
