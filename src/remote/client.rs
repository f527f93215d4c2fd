use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{error_message, parse_page_body};
use super::ProfileApi;
use crate::config::Config;
use crate::error::{timeout_millis, FeedError, FetchError, MutationError};
use crate::feed::{EntityId, Page, PageRequest};

/// HTTP client for the profile service.
#[derive(Clone)]
pub struct HttpProfileClient {
  http: reqwest::Client,
  base_url: Url,
  browse_path: String,
  favorite_path: String,
  timeout: Duration,
  /// Query parameters per list context
  contexts: BTreeMap<String, BTreeMap<String, String>>,
}

impl HttpProfileClient {
  pub fn new(config: &Config) -> Result<Self, FeedError> {
    let mut base_url = Url::parse(&config.api.url)
      .map_err(|e| FeedError::Config(format!("invalid api.url '{}': {}", config.api.url, e)))?;

    // Url::join replaces the last segment unless the path ends with '/'
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let timeout = config.timeout();
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| FeedError::Config(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      base_url,
      browse_path: config.api.browse_path.trim_start_matches('/').to_string(),
      favorite_path: config.api.favorite_path.trim_start_matches('/').to_string(),
      timeout,
      contexts: config.contexts.clone(),
    })
  }

  /// URL for one page of a context.
  pub fn page_url(&self, request: &PageRequest) -> Result<Url, FetchError> {
    let mut url = self.join(&self.browse_path)?;
    {
      let mut query = url.query_pairs_mut();
      if let Some(params) = self.contexts.get(request.context.as_str()) {
        for (name, value) in params {
          query.append_pair(name, value);
        }
      }
      query
        .append_pair("page", &request.page_index.to_string())
        .append_pair("size", &request.page_size.to_string());
    }
    Ok(url)
  }

  /// URL for favoriting `id`. The id always lands in a single escaped path
  /// segment.
  pub fn favorite_url(&self, id: &EntityId) -> Result<Url, FetchError> {
    let id = id.to_string();
    if id.is_empty() || id == "." || id == ".." {
      return Err(FetchError::Transport {
        message: format!("'{}' is not a usable profile id", id),
      });
    }

    let mut url = self.base_url.clone();
    {
      let mut segments = url.path_segments_mut().map_err(|_| FetchError::Transport {
        message: format!("base url '{}' cannot carry a path", self.base_url),
      })?;
      segments.pop_if_empty();
      for segment in self.favorite_path.split('/').filter(|s| !s.is_empty()) {
        segments.push(&segment.replace("{id}", &id));
      }
    }
    Ok(url)
  }

  fn join(&self, path: &str) -> Result<Url, FetchError> {
    self.base_url.join(path).map_err(|e| FetchError::Transport {
      message: format!("invalid request path '{}': {}", path, e),
    })
  }

  fn transport_error(&self, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
      FetchError::Timeout {
        millis: timeout_millis(self.timeout),
      }
    } else {
      FetchError::Transport {
        message: e.to_string(),
      }
    }
  }
}

#[async_trait]
impl ProfileApi for HttpProfileClient {
  async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
    let url = self.page_url(request)?;
    debug!(%url, "fetching page");

    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| self.transport_error(e))?;

    let status = response.status();
    let body = response
      .bytes()
      .await
      .map_err(|e| self.transport_error(e))?;

    if !status.is_success() {
      return Err(FetchError::Status {
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| status.to_string()),
      });
    }

    parse_page_body(&body, request.page_index)
  }

  async fn submit_favorite(&self, id: &EntityId) -> Result<(), MutationError> {
    let to_mutation_error = |e: FetchError| match e {
      FetchError::Timeout { millis } => MutationError::Timeout {
        id: id.clone(),
        millis,
      },
      FetchError::Status { status, message } => MutationError::Status {
        id: id.clone(),
        status,
        message,
      },
      other => MutationError::Transport {
        id: id.clone(),
        message: other.to_string(),
      },
    };

    let url = self.favorite_url(id).map_err(to_mutation_error)?;
    debug!(%url, "submitting favorite");

    let response = self
      .http
      .post(url)
      .send()
      .await
      .map_err(|e| to_mutation_error(self.transport_error(e)))?;

    let status = response.status();
    if status.is_success() {
      return Ok(());
    }

    let body = response.bytes().await.unwrap_or_default();
    Err(MutationError::Status {
      id: id.clone(),
      status: status.as_u16(),
      message: error_message(&body).unwrap_or_else(|| "Failed to add to favorites".to_string()),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feed::ContextName;

  fn client(url: &str) -> HttpProfileClient {
    let yaml = format!(
      "api:\n  url: {}\ncontexts:\n  brides:\n    gender: FEMALE\n",
      url
    );
    HttpProfileClient::new(&Config::from_yaml(&yaml).unwrap()).unwrap()
  }

  fn request(page_index: u32) -> PageRequest {
    PageRequest {
      context: ContextName::new("brides").unwrap(),
      page_index,
      page_size: 10,
    }
  }

  #[test]
  fn test_page_url_carries_context_params() {
    let url = client("https://profiles.example.com/api").page_url(&request(2)).unwrap();
    assert_eq!(
      url.as_str(),
      "https://profiles.example.com/api/profiles/browse?gender=FEMALE&page=2&size=10"
    );
  }

  #[test]
  fn test_favorite_url() {
    let url = client("https://profiles.example.com/api/")
      .favorite_url(&EntityId::Int(5))
      .unwrap();
    assert_eq!(url.as_str(), "https://profiles.example.com/api/favorites/5");
  }

  #[test]
  fn test_favorite_url_escapes_text_ids() {
    let client = client("https://profiles.example.com/api");
    let url_for = |id: &str| client.favorite_url(&EntityId::from(id)).unwrap();

    assert_eq!(
      url_for("../admin/delete").as_str(),
      "https://profiles.example.com/api/favorites/..%2Fadmin%2Fdelete"
    );

    let url = url_for("5?force=1");
    assert_eq!(url.as_str(), "https://profiles.example.com/api/favorites/5%3Fforce=1");
    assert_eq!(url.query(), None);

    let url = url_for("a#b");
    assert_eq!(url.as_str(), "https://profiles.example.com/api/favorites/a%23b");
    assert_eq!(url.fragment(), None);
  }

  #[test]
  fn test_favorite_url_rejects_dot_segments() {
    let client = client("https://profiles.example.com/api");
    for id in ["", ".", ".."] {
      assert!(client.favorite_url(&EntityId::from(id)).is_err());
    }
  }

  #[test]
  fn test_invalid_base_url() {
    let config = Config::from_yaml("api:\n  url: not a url\n").unwrap();
    assert!(matches!(
      HttpProfileClient::new(&config),
      Err(FeedError::Config(_))
    ));
  }

  #[tokio::test]
  async fn test_unreachable_server_is_fetch_error() {
    // Port 9 (discard) on localhost is closed in test environments
    let client = client("http://127.0.0.1:9");
    let err = client.fetch_page(&request(0)).await.unwrap_err();
    assert!(matches!(
      err,
      FetchError::Transport { .. } | FetchError::Timeout { .. }
    ));

    let err = client.submit_favorite(&EntityId::Int(1)).await.unwrap_err();
    assert_eq!(err.entity_id(), &EntityId::Int(1));
  }
}
