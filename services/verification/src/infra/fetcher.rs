use std::time::Duration;

use serde::Deserialize;

use parley_domain::site::Site;

use crate::domain::repository::ProfileFetcher;
use crate::error::FetchError;

/// Profile reader backed by the public GitHub and V2EX APIs.
///
/// One HTTP read per call with a hard client timeout; no internal retries.
/// Everything above the adapter treats the returned profile text as an
/// opaque string.
#[derive(Clone)]
pub struct HttpProfileFetcher {
    client: reqwest::Client,
    github_api_url: String,
    v2ex_api_url: String,
}

/// Fields of a GitHub user the code can plausibly be pasted into.
#[derive(Deserialize)]
struct GithubProfile {
    #[serde(default)]
    bio: Option<String>,
}

#[derive(Deserialize)]
struct V2exMember {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tagline: Option<String>,
    #[serde(default)]
    bio: Option<String>,
}

impl HttpProfileFetcher {
    pub fn new(
        timeout: Duration,
        github_api_url: String,
        v2ex_api_url: String,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parley-verification/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            github_api_url,
            v2ex_api_url,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_send_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        // GitHub signals an exhausted rate budget with 403 as well as 429.
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchError::RateLimited {
                retry_after: retry_after_hint(&response),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!("unexpected status {status}")));
        }
        Ok(response)
    }
}

impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch(&self, site: Site, handle: &str) -> Result<String, FetchError> {
        match site {
            Site::Github => {
                let url = format!("{}/users/{handle}", self.github_api_url);
                let profile: GithubProfile = self.get(&url).await?.json().await.map_err(|e| {
                    FetchError::Unreachable(format!("undecodable profile body: {e}"))
                })?;
                Ok(profile.bio.unwrap_or_default())
            }
            Site::V2ex => {
                let url = format!(
                    "{}/api/members/show.json?username={handle}",
                    self.v2ex_api_url
                );
                let member: V2exMember = self.get(&url).await?.json().await.map_err(|e| {
                    FetchError::Unreachable(format!("undecodable member body: {e}"))
                })?;
                // The legacy members API reports unknown users in-band.
                if member.status.as_deref() == Some("notfound") {
                    return Err(FetchError::NotFound);
                }
                let text = [member.tagline, member.bio]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(text)
            }
        }
    }
}

fn classify_send_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Unreachable("timeout".to_owned())
    } else {
        FetchError::Unreachable(error.to_string())
    }
}

fn retry_after_hint(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
