use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::aggregate::{select_recent_products, summarize, DEFAULT_EVENT_MONTHS};
use crate::error::Result;
use crate::person::Person;
use crate::sources::{AttentionMetrics, IdentityRegistry};
use crate::store::PersonRepository;

pub const IDENTITY_ERROR: &str = "identity data error";
pub const METRICS_ERROR: &str = "altmetric data error";

/// Runs the per-person refresh: identity, works, concurrent enrichment,
/// aggregation. Failures are recorded on `Person::error`, never returned.
pub struct ProfileRefresher {
    identity: Arc<dyn IdentityRegistry>,
    metrics: Arc<dyn AttentionMetrics>,
    event_months: Vec<String>,
}

impl ProfileRefresher {
    pub fn new(identity: Arc<dyn IdentityRegistry>, metrics: Arc<dyn AttentionMetrics>) -> Self {
        Self {
            identity,
            metrics,
            event_months: DEFAULT_EVENT_MONTHS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Override the `YYYY-MM` months used for `monthly_event_count`.
    pub fn with_event_months(mut self, months: Vec<String>) -> Self {
        self.event_months = months;
        self
    }

    pub async fn refresh(&self, person: &mut Person) {
        let start = Instant::now();
        person.error = None;

        self.refresh_identity(person).await;
        self.enrich(person).await;

        let months: Vec<&str> = self.event_months.iter().map(String::as_str).collect();
        let metrics = summarize(&person.products, &months);
        person.apply_metrics(metrics);
        person.last_update = Some(Utc::now());

        if let Some(message) = &person.error {
            error!(id = %person.id, error = %message, "Profile refresh finished with errors");
        }
        info!(
            id = %person.id,
            name = %person.full_name(),
            products = person.num_products,
            t_index = person.t_index,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Profile refreshed"
        );
    }

    async fn refresh_identity(&self, person: &mut Person) {
        let Some(orcid_id) = person.orcid_id.clone() else {
            person.error = Some(IDENTITY_ERROR.to_string());
            error!(id = %person.id, "Person has no ORCID id");
            return;
        };

        let record = match self.identity.fetch(&orcid_id).await {
            Ok(record) => record,
            Err(e) => {
                error!(%orcid_id, error = %e, "{}", IDENTITY_ERROR);
                person.error = Some(IDENTITY_ERROR.to_string());
                return;
            }
        };

        if record.given_names.is_some() {
            person.given_name = record.given_names.clone();
        }
        if record.family_name.is_some() {
            person.family_name = record.family_name.clone();
        }
        person.given_names_orcid = record.given_names;
        person.family_name_orcid = record.family_name;
        person.api_raw = Some(record.api_raw);

        let (num_works, recent) = select_recent_products(&record.works);
        person.num_works = num_works as i64;
        for product in recent {
            person.add_product(product);
        }
    }

    /// One lookup per product, all in flight at once. Results are applied
    /// here after every lookup has returned.
    async fn enrich(&self, person: &mut Person) {
        let lookups = person.products.iter().map(|product| {
            let metrics = self.metrics.clone();
            let doi = product.doi.clone();
            async move { metrics.lookup(&doi).await }
        });
        let results = join_all(lookups).await;

        for (product, result) in person.products.iter_mut().zip(results) {
            match result {
                Ok(metrics) => product.apply_metrics(metrics),
                Err(e) => {
                    warn!(doi = %product.doi, error = %e, "{}", METRICS_ERROR);
                    person.error = Some(METRICS_ERROR.to_string());
                }
            }
        }
    }
}

/// Load the person for `orcid_id` (or start a new one), refresh and save.
pub async fn add_or_overwrite_profile<R: PersonRepository>(
    repo: &R,
    refresher: &ProfileRefresher,
    orcid_id: &str,
) -> Result<Person> {
    let mut person = load_or_new(repo, orcid_id).await?;
    refresher.refresh(&mut person).await;
    repo.save(&person).await?;
    Ok(person)
}

/// Like [`add_or_overwrite_profile`], stamping the campaign it came in with.
pub async fn add_profile_for_campaign<R: PersonRepository>(
    repo: &R,
    refresher: &ProfileRefresher,
    orcid_id: &str,
    campaign_email: Option<&str>,
    campaign: Option<&str>,
) -> Result<Person> {
    let mut person = load_or_new(repo, orcid_id).await?;
    person.campaign = campaign.map(String::from);
    person.campaign_email = campaign_email.map(String::from);
    refresher.refresh(&mut person).await;
    repo.save(&person).await?;
    Ok(person)
}

async fn load_or_new<R: PersonRepository>(repo: &R, orcid_id: &str) -> Result<Person> {
    Ok(repo
        .find_by_orcid(orcid_id)
        .await?
        .unwrap_or_else(|| Person::with_orcid(orcid_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductMetrics;
    use crate::sources::{IdentityRecord, IdentityWork};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    struct FakeRegistry {
        record: Mutex<Option<IdentityRecord>>,
    }

    impl FakeRegistry {
        fn with_works(works: Vec<IdentityWork>) -> Self {
            Self {
                record: Mutex::new(Some(IdentityRecord {
                    given_names: Some("Ada".to_string()),
                    family_name: Some("Lovelace".to_string()),
                    works,
                    api_raw: json!({"orcid-identifier": {}}),
                })),
            }
        }

        fn failing() -> Self {
            Self {
                record: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl IdentityRegistry for FakeRegistry {
        async fn fetch(&self, _external_id: &str) -> anyhow::Result<IdentityRecord> {
            self.record
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow::anyhow!("registry unavailable"))
        }
    }

    /// Tweeter count per DOI; DOIs in `failing` error out, unknown DOIs have no data.
    #[derive(Default)]
    struct FakeMetrics {
        tweeters: HashMap<String, i64>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl AttentionMetrics for FakeMetrics {
        async fn lookup(&self, doi: &str) -> anyhow::Result<Option<ProductMetrics>> {
            if self.failing.iter().any(|d| d == doi) {
                anyhow::bail!("rate limited forever");
            }
            Ok(self.tweeters.get(doi).map(|count| ProductMetrics {
                counts: BTreeMap::from([("tweeters".to_string(), json!(count))]),
                score: Some(*count as f64),
                event_dates: vec!["2015-11-01T00:00:00Z".to_string()],
                raw: Some(json!({"doi": doi})),
            }))
        }
    }

    #[derive(Default)]
    struct MemoryRepo {
        people: Mutex<Vec<Person>>,
    }

    #[async_trait]
    impl PersonRepository for MemoryRepo {
        async fn save(&self, person: &Person) -> Result<()> {
            let mut people = self.people.lock().unwrap();
            people.retain(|p| p.id != person.id);
            people.push(person.clone());
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<Person>> {
            Ok(self.people.lock().unwrap().iter().find(|p| p.id == id).cloned())
        }

        async fn find_by_orcid(&self, orcid_id: &str) -> Result<Option<Person>> {
            Ok(self
                .people
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.orcid_id.as_deref() == Some(orcid_id))
                .cloned())
        }
    }

    fn work(doi: &str, year: i32) -> IdentityWork {
        IdentityWork {
            title: Some(format!("Work {doi}")),
            year: Some(year),
            doi: Some(doi.to_string()),
        }
    }

    fn refresher(registry: FakeRegistry, metrics: FakeMetrics) -> ProfileRefresher {
        ProfileRefresher::new(Arc::new(registry), Arc::new(metrics))
    }

    #[tokio::test]
    async fn refresh_builds_products_and_metrics() {
        let registry = FakeRegistry::with_works(vec![
            work("10.1/a", 2014),
            work("10.1/b", 2016),
            work("10.1/a", 2020),
            work("10.1/c", 2015),
        ]);
        let metrics = FakeMetrics {
            tweeters: HashMap::from([
                ("10.1/a".to_string(), 5),
                ("10.1/b".to_string(), 3),
                ("10.1/c".to_string(), 2),
            ]),
            ..Default::default()
        };
        let mut person = Person::with_orcid("0000-0001");
        refresher(registry, metrics).refresh(&mut person).await;

        assert_eq!(person.error, None);
        assert_eq!(person.given_names_orcid.as_deref(), Some("Ada"));
        assert_eq!(person.num_works, 3);
        let dois: Vec<&str> = person.products.iter().map(|p| p.doi.as_str()).collect();
        assert_eq!(dois, ["10.1/b", "10.1/c", "10.1/a"]);
        assert_eq!(person.num_products, 3);
        assert_eq!(person.t_index, 2);
        assert_eq!(person.metric_sums.get("tweeters"), Some(&10));
        assert_eq!(person.altmetric_score, 10.0);
        assert!(person.last_update.is_some());
    }

    #[tokio::test]
    async fn identity_failure_is_recorded_and_existing_products_still_enriched() {
        let mut person = Person::with_orcid("0000-0002");
        person.add_product(crate::product::Product::new("10.2/kept"));
        let metrics = FakeMetrics {
            tweeters: HashMap::from([("10.2/kept".to_string(), 4)]),
            ..Default::default()
        };

        refresher(FakeRegistry::failing(), metrics)
            .refresh(&mut person)
            .await;

        assert_eq!(person.error.as_deref(), Some(IDENTITY_ERROR));
        assert_eq!(person.products.len(), 1);
        assert_eq!(person.metric_sums.get("tweeters"), Some(&4));
        assert!(person.last_update.is_some());
    }

    #[tokio::test]
    async fn metrics_failure_keeps_other_products_results() {
        let registry =
            FakeRegistry::with_works(vec![work("10.3/ok", 2015), work("10.3/bad", 2014)]);
        let metrics = FakeMetrics {
            tweeters: HashMap::from([("10.3/ok".to_string(), 7)]),
            failing: vec!["10.3/bad".to_string()],
        };
        let mut person = Person::with_orcid("0000-0003");
        refresher(registry, metrics).refresh(&mut person).await;

        assert_eq!(person.error.as_deref(), Some(METRICS_ERROR));
        assert_eq!(person.products.len(), 2);
        assert_eq!(person.metric_sums.get("tweeters"), Some(&7));
        assert!(person.products[1].altmetric_counts.is_empty());
    }

    #[tokio::test]
    async fn refresh_with_no_works_completes() {
        let mut person = Person::with_orcid("0000-0004");
        refresher(FakeRegistry::with_works(vec![]), FakeMetrics::default())
            .refresh(&mut person)
            .await;

        assert_eq!(person.error, None);
        assert!(person.products.is_empty());
        assert_eq!(person.t_index, 0);
        assert_eq!(person.monthly_event_count, 0);
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let works: Vec<IdentityWork> = (0..130)
            .map(|i| work(&format!("10.5/{i}"), 1950 + i))
            .collect();
        let tweeters = (0..130).map(|i| (format!("10.5/{i}"), (i % 9) as i64)).collect();
        let refresher = refresher(
            FakeRegistry::with_works(works),
            FakeMetrics {
                tweeters,
                ..Default::default()
            },
        );

        let mut person = Person::with_orcid("0000-0005");
        refresher.refresh(&mut person).await;
        let first = (person.products.clone(), person.t_index, person.metric_sums.clone());
        refresher.refresh(&mut person).await;

        assert_eq!(person.products.len(), 100);
        assert_eq!(first, (person.products.clone(), person.t_index, person.metric_sums.clone()));
        assert_eq!(person.num_works, 130);
    }

    #[tokio::test]
    async fn add_or_overwrite_reuses_existing_person() {
        let repo = MemoryRepo::default();
        let refresher = refresher(
            FakeRegistry::with_works(vec![work("10.6/a", 2015)]),
            FakeMetrics::default(),
        );

        let first = add_or_overwrite_profile(&repo, &refresher, "0000-0006").await.unwrap();
        let second = add_or_overwrite_profile(&repo, &refresher, "0000-0006").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.people.lock().unwrap().len(), 1);
        assert_eq!(repo.get(&first.id).await.unwrap().unwrap().products.len(), 1);
    }

    #[tokio::test]
    async fn campaign_fields_are_stamped() {
        let repo = MemoryRepo::default();
        let refresher = refresher(FakeRegistry::with_works(vec![]), FakeMetrics::default());

        let person = add_profile_for_campaign(
            &repo,
            &refresher,
            "0000-0007",
            Some("ada@example.org"),
            Some("impactstory-launch"),
        )
        .await
        .unwrap();

        assert_eq!(person.campaign.as_deref(), Some("impactstory-launch"));
        assert_eq!(person.campaign_email.as_deref(), Some("ada@example.org"));
        let stored = repo.find_by_orcid("0000-0007").await.unwrap().unwrap();
        assert_eq!(stored.campaign, person.campaign);
    }
}
