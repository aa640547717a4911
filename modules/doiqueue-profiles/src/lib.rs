//! Researcher profiles aggregated from ORCID works and Altmetric attention data.
//!
//! A refresh never fails: identity and enrichment failures are recorded on the
//! person's `error` field and the workflow completes with whatever it has.

pub mod aggregate;
pub mod error;
pub mod person;
pub mod product;
pub mod refresh;
pub mod sources;
pub mod store;

pub use aggregate::{h_index, parse_count, select_recent_products, summarize, ProfileMetrics};
pub use error::{ProfileError, Result};
pub use person::{make_person_from_oauth, OAuthProfile, OrcidView, Person, PublicProfile};
pub use product::{Product, ProductMetrics};
pub use refresh::{add_or_overwrite_profile, add_profile_for_campaign, ProfileRefresher};
pub use sources::{AttentionMetrics, IdentityRecord, IdentityRegistry, IdentityWork};
pub use store::{PersonRepository, PersonStore};
