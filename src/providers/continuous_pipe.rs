use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::cluster::Cluster;

use super::ClusterListProvider;

pub const DEFAULT_URL: &str = "https://authenticator.continuouspipe.io";

#[derive(Debug, Deserialize)]
struct Team {
    slug: String,
    bucket_uuid: String,
}

#[derive(Debug, Deserialize)]
struct TeamCluster {
    identifier: String,
    address: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Clusters registered with the ContinuousPipe directory, one bucket per team.
/// Identifiers are `<team>+<cluster>`.
pub struct ContinuousPipeProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ContinuousPipeProvider {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "CONTINUOUS_PIPE_API_KEY is required for the continuous-pipe provider".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let unreachable = |reason: String| Error::Connection {
            cluster: "continuous-pipe directory".to_string(),
            reason,
        };

        let resp = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(Error::NotFound(url)),
            status => return Err(unreachable(format!("GET {} returned {}", url, status))),
        }
        resp.json()
            .await
            .map_err(|e| unreachable(format!("decoding {}: {}", url, e)))
    }

    async fn team_clusters(&self, team: &Team) -> Result<Vec<Cluster>> {
        let clusters: Vec<TeamCluster> = self
            .get_json(&format!("/api/bucket/{}/clusters", team.bucket_uuid))
            .await?;
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Ok(clusters
            .into_iter()
            .map(|c| Cluster {
                identifier: format!("{}+{}", team.slug, c.identifier),
                address: c.address,
                username: non_empty(c.username),
                password: non_empty(c.password),
                token: None,
            })
            .collect())
    }
}

#[async_trait]
impl ClusterListProvider for ContinuousPipeProvider {
    async fn clusters(&self) -> Result<Vec<Cluster>> {
        let teams: Vec<Team> = self.get_json("/api/teams").await?;
        let mut clusters = Vec::new();
        for team in &teams {
            clusters.extend(self.team_clusters(team).await?);
        }
        Ok(clusters)
    }

    async fn by_identifier(&self, identifier: &str) -> Result<Cluster> {
        let Some((team, _)) = identifier.split_once('+') else {
            return Err(Error::InvalidInput(format!(
                "cluster identifier {:?} is not of the form <team>+<cluster>",
                identifier
            )));
        };

        let team: Team = self.get_json(&format!("/api/teams/{}", team)).await?;
        self.team_clusters(&team)
            .await?
            .into_iter()
            .find(|c| c.identifier == identifier)
            .ok_or_else(|| Error::NotFound(format!("cluster {}", identifier)))
    }
}
