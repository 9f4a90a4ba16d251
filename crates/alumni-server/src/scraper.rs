//! LinkedIn profile enrichment through the Apify actor API.

use std::time::Duration;

use async_trait::async_trait;
use entity::alumni;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const APIFY_ENDPOINT: &str =
    "https://api.apify.com/v2/acts/anchor~linkedin-profile-enrichment/run-sync-get-dataset-items";
pub const SCRAPE_TIMEOUT: Duration = Duration::from_secs(120);

/// Fields extracted from a public profile. Absent values stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ScrapedProfile {
    /// Overwrite profile fields with every non-empty scraped value.
    pub fn merge_into(&self, active: &mut alumni::ActiveModel) {
        if let Some(v) = present(&self.first_name) {
            active.first_name = Set(v);
        }
        if let Some(v) = present(&self.last_name) {
            active.last_name = Set(v);
        }
        if let Some(v) = present(&self.job_title) {
            active.job_title = Set(Some(v));
        }
        if let Some(v) = present(&self.company) {
            active.company = Set(Some(v));
        }
        if let Some(v) = present(&self.city) {
            active.city = Set(Some(v));
        }
        if let Some(v) = present(&self.avatar_url) {
            active.avatar_url = Set(Some(v));
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApifyItem {
    first_name: Option<String>,
    last_name: Option<String>,
    full_name: Option<String>,
    headline: Option<String>,
    city: Option<String>,
    profile_pic_url: Option<String>,
    company_name: Option<String>,
}

impl From<ApifyItem> for ScrapedProfile {
    fn from(item: ApifyItem) -> Self {
        let mut first_name = present(&item.first_name);
        let mut last_name = present(&item.last_name);

        if first_name.is_none() {
            if let Some(full) = present(&item.full_name) {
                let (first, rest) = full.split_once(' ').unwrap_or((full.as_str(), ""));
                first_name = Some(first.to_string());
                last_name = Some(rest.trim().to_string()).filter(|v| !v.is_empty());
            }
        }

        Self {
            first_name,
            last_name,
            job_title: item.headline,
            company: item.company_name,
            city: item.city,
            avatar_url: item.profile_pic_url,
        }
    }
}

#[async_trait]
pub trait ProfileScraper: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ScrapedProfile>;
}

pub struct ApifyScraper {
    client: reqwest::Client,
    token: Option<String>,
}

impl ApifyScraper {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, token })
    }
}

#[async_trait]
impl ProfileScraper for ApifyScraper {
    async fn extract(&self, url: &str) -> Result<ScrapedProfile> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::Upstream("APIFY_TOKEN manquant".to_string()))?;

        tracing::info!(url, "scraping profile via Apify");

        let resp = self
            .client
            .post(APIFY_ENDPOINT)
            .query(&[("token", token)])
            .json(&serde_json::json!({ "startUrls": [{ "url": url }] }))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Requête Apify échouée : {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("Apify HTTP {} : {body}", status.as_u16())));
        }

        let items: Vec<ApifyItem> = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Réponse Apify illisible : {e}")))?;

        let item = items.into_iter().next().ok_or_else(|| {
            Error::Upstream("Aucun résultat renvoyé par Apify pour cette URL".to_string())
        })?;

        let profile = ScrapedProfile::from(item);
        tracing::debug!(?profile, "profile extracted");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_full_name_when_first_name_missing() {
        let item = ApifyItem {
            full_name: Some("Marie Salomea Curie".into()),
            headline: Some("Physicienne".into()),
            company_name: Some("Institut du Radium".into()),
            ..Default::default()
        };
        let profile = ScrapedProfile::from(item);

        assert_eq!(profile.first_name.as_deref(), Some("Marie"));
        assert_eq!(profile.last_name.as_deref(), Some("Salomea Curie"));
        assert_eq!(profile.job_title.as_deref(), Some("Physicienne"));
        assert_eq!(profile.company.as_deref(), Some("Institut du Radium"));
    }

    #[test]
    fn single_word_full_name_has_no_last_name() {
        let profile = ScrapedProfile::from(ApifyItem {
            full_name: Some("Madonna".into()),
            ..Default::default()
        });
        assert_eq!(profile.first_name.as_deref(), Some("Madonna"));
        assert_eq!(profile.last_name, None);
    }

    #[test]
    fn explicit_names_win() {
        let profile = ScrapedProfile::from(ApifyItem {
            first_name: Some("Pierre".into()),
            last_name: Some("Curie".into()),
            full_name: Some("Someone Else".into()),
            ..Default::default()
        });
        assert_eq!(profile.first_name.as_deref(), Some("Pierre"));
        assert_eq!(profile.last_name.as_deref(), Some("Curie"));
    }

    #[tokio::test]
    async fn missing_token_is_upstream_failure() {
        let scraper = ApifyScraper::new(None).unwrap();
        let err = scraper.extract("https://www.linkedin.com/in/x").await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
