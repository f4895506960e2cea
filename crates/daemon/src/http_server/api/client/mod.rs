mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

/// A typed call against the volume API.
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder;
}

/// `base_url` with `segments` appended as escaped path segments.
pub fn endpoint(base_url: &Url, segments: &[&str]) -> Url {
    let mut url = base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let base = Url::parse("http://localhost:9750").unwrap();
        assert_eq!(
            endpoint(&base, &["api", "v0", "volumes", "v1", "mount"]).as_str(),
            "http://localhost:9750/api/v0/volumes/v1/mount"
        );

        let base = Url::parse("http://localhost:9750/driver/").unwrap();
        assert_eq!(
            endpoint(&base, &["api", "v0", "volumes"]).as_str(),
            "http://localhost:9750/driver/api/v0/volumes"
        );
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let base = Url::parse("http://localhost:9750").unwrap();
        assert_eq!(
            endpoint(&base, &["api", "v0", "volumes", "a?b#c"]).as_str(),
            "http://localhost:9750/api/v0/volumes/a%3Fb%23c"
        );
    }
}
