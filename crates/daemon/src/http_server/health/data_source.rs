use std::convert::Infallible;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::ServiceState;

/// What a ready service reports about its ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub valid_until: Option<String>,
    pub renewal_failures: u64,
}

/// What readiness depends on.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn is_ready(&self) -> Result<Readiness, DataSourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataSourceError {
    #[error("no valid kerberos credential")]
    CredentialUnavailable {
        renewal_failures: u64,
        /// failure kind only, never the underlying message
        last_renewal_error: Option<String>,
    },
}

#[async_trait]
impl DataSource for ServiceState {
    async fn is_ready(&self) -> Result<Readiness, DataSourceError> {
        let status = self.credentials().status();
        if status.valid {
            Ok(Readiness {
                valid_until: status.valid_until,
                renewal_failures: status.renewal_failures,
            })
        } else {
            Err(DataSourceError::CredentialUnavailable {
                renewal_failures: status.renewal_failures,
                last_renewal_error: status.last_renewal_error,
            })
        }
    }
}

#[derive(Clone)]
pub struct StateDataSource(Arc<dyn DataSource>);

impl StateDataSource {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self(source)
    }

    pub async fn is_ready(&self) -> Result<Readiness, DataSourceError> {
        self.0.is_ready().await
    }
}

impl std::fmt::Debug for StateDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StateDataSource")
    }
}

#[async_trait]
impl FromRequestParts<ServiceState> for StateDataSource {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        Ok(StateDataSource::new(Arc::new(state.clone())))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub enum MockReadiness {
        Ready,
        CredentialUnavailable,
    }

    #[async_trait]
    impl DataSource for MockReadiness {
        async fn is_ready(&self) -> Result<Readiness, DataSourceError> {
            match self {
                MockReadiness::Ready => Ok(Readiness {
                    valid_until: Some("2026-01-01T10:00:00Z".to_string()),
                    renewal_failures: 0,
                }),
                MockReadiness::CredentialUnavailable => {
                    Err(DataSourceError::CredentialUnavailable {
                        renewal_failures: 3,
                        last_renewal_error: Some("rejected".to_string()),
                    })
                }
            }
        }
    }
}
