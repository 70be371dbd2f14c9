// src/probes/http.rs
use crate::config::HttpCheckConfig;
use crate::health::{CheckContext, CheckDefinition, FailurePolicy, Probe};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Reports available when a GET on `url` answers with a 2xx status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(url: Url) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Share one connection pool between several probes.
    pub fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, ctx: CheckContext) -> Result<()> {
        let mut request = self.client.get(self.url.clone());
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining);
        }

        let response = tokio::select! {
            response = request.send() => {
                response.with_context(|| format!("GET {} failed", self.url))?
            }
            _ = ctx.done() => bail!("GET {} cancelled", self.url),
        };

        let status = response.status();
        if !status.is_success() {
            bail!("GET {} returned {}", self.url, status);
        }
        Ok(())
    }
}

/// Check definition for one configured HTTP dependency.
pub fn http_check(config: &HttpCheckConfig, client: Client) -> CheckDefinition {
    let probe = HttpProbe::with_client(client, config.url.clone());
    let mut check = CheckDefinition::new(config.name.clone(), probe).with_policy(FailurePolicy::new(
        config.max_contiguous_fails,
        config.max_time_in_error(),
    ));
    if let Some(timeout) = config.timeout() {
        check = check.with_timeout(timeout);
    }
    if let Some(schedule) = &config.schedule {
        check = check.scheduled(schedule.interval(), schedule.initial_delay());
    }
    if config.disable_panic_recovery {
        check = check.disable_panic_recovery();
    }
    check
}
