use clap::Args;

use common::credential::CredentialStatus;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        let base = ctx.client.base_url();
        let client = ctx.client.http_client();
        let status_url = |route: &str| {
            format!("{}/_status/{}", base.as_str().trim_end_matches('/'), route)
        };

        lines.push(format!("Driver ({}):", ctx.remote));

        // 1. Check liveness
        match client.get(status_url("livez")).send().await {
            Ok(resp) if resp.status().is_success() => {
                lines.push("  livez:      OK".to_string());
            }
            Ok(resp) => {
                lines.push(format!("  livez:      UNHEALTHY ({})", resp.status()));
            }
            Err(_) => {
                lines.push("  livez:      NOT REACHABLE".to_string());
                return Ok(lines.join("\n"));
            }
        }

        // 2. Check readiness (a valid ticket)
        match client.get(status_url("readyz")).send().await {
            Ok(resp) if resp.status().is_success() => {
                lines.push("  readyz:     OK".to_string());
            }
            Ok(resp) => {
                lines.push(format!("  readyz:     UNHEALTHY ({})", resp.status()));
            }
            Err(_) => {
                lines.push("  readyz:     NOT REACHABLE".to_string());
            }
        }

        // 3. Credential details
        lines.push(String::new());
        lines.push("Credential:".to_string());
        let status = client
            .get(status_url("credential"))
            .send()
            .await
            .map_err(|e| HealthError::Failed(e.to_string()))?
            .json::<CredentialStatus>()
            .await
            .map_err(|e| HealthError::Failed(e.to_string()))?;
        lines.push(format!(
            "  principal:  {}",
            status.principal.as_deref().unwrap_or("-")
        ));
        lines.push(format!("  valid:      {}", status.valid));
        lines.push(format!(
            "  expires:    {}",
            status.valid_until.as_deref().unwrap_or("-")
        ));
        lines.push(format!("  renewal failures: {}", status.renewal_failures));
        if let Some(error) = &status.last_renewal_error {
            lines.push(format!("  last renewal error: {}", error));
        }

        Ok(lines.join("\n"))
    }
}
