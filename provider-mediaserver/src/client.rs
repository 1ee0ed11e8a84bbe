//! MediaServer API client
//!
//! Every call goes through [`MediaServerClient::send_authorized`], which
//! attaches the session token and recovers from a single `401` by logging in
//! again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_auth::session::AUTHORIZATION_HEADER;
use core_auth::MediaServerSession;
use core_library::normalize_text;
use core_runtime::config::DEFAULT_REQUEST_TIMEOUT;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{MediaServerError, Result};
use crate::types::{
    ItemsResponse, LyricsResponse, MediaItem, MediaServerLyrics, ProxyRequest, ProxyResponse,
};

/// Items fetched per search when resolving a track
const SEARCH_LIMIT: u32 = 50;

/// MediaServer API client sharing one session across all requests.
pub struct MediaServerClient {
    session: Arc<MediaServerSession>,
    http_client: Arc<dyn HttpClient>,
    request_timeout: Duration,
}

impl MediaServerClient {
    pub fn new(session: Arc<MediaServerSession>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            session,
            http_client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn session(&self) -> &Arc<MediaServerSession> {
        &self.session
    }

    /// True when base URL and credentials are both present.
    pub fn is_configured(&self) -> bool {
        self.session.is_configured()
    }

    /// Forwards `request` and mirrors the upstream status and body.
    ///
    /// The returned headers always mark the body as JSON and allow any origin.
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn proxy(&self, request: ProxyRequest) -> Result<ProxyResponse> {
        let response = self
            .send_authorized(request.method, &request.path_and_query())
            .await?;

        debug!(status = response.status, "Proxied MediaServer request");

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Access-Control-Allow-Origin".to_string(), "*".to_string());

        Ok(ProxyResponse {
            status: response.status,
            body: response.body,
            headers,
        })
    }

    /// Finds the first audio item whose title and one of whose artists match.
    #[instrument(skip(self))]
    pub async fn find_track(&self, artist: &str, title: &str) -> Result<Option<MediaItem>> {
        let wanted_artist = normalize_text(artist);
        let wanted_title = normalize_text(title);
        if wanted_artist.is_empty() || wanted_title.is_empty() {
            return Ok(None);
        }

        let request = ProxyRequest::get("/Items").with_query(vec![
            ("searchTerm".to_string(), title.trim().to_string()),
            ("IncludeItemTypes".to_string(), "Audio".to_string()),
            ("Recursive".to_string(), "true".to_string()),
            ("Fields".to_string(), "Artists,AlbumArtist".to_string()),
            ("Limit".to_string(), SEARCH_LIMIT.to_string()),
        ]);

        let response = self
            .send_authorized(HttpMethod::Get, &request.path_and_query())
            .await?;
        let items: ItemsResponse = Self::parse_success(&response)?;

        let found = items.items.into_iter().find(|item| {
            normalize_text(&item.name) == wanted_title
                && item
                    .all_artists()
                    .any(|candidate| normalize_text(candidate) == wanted_artist)
        });

        debug!(found = found.is_some(), "MediaServer track search finished");
        Ok(found)
    }

    /// Embedded lyrics for an item; `None` when the item has none.
    #[instrument(skip(self))]
    pub async fn fetch_lyrics(&self, item_id: &str) -> Result<Option<MediaServerLyrics>> {
        let path = format!("/Audio/{}/Lyrics", urlencoding::encode(item_id));
        let response = self.send_authorized(HttpMethod::Get, &path).await?;

        if response.status == 404 {
            debug!("No embedded lyrics");
            return Ok(None);
        }

        let parsed: LyricsResponse = Self::parse_success(&response)?;
        let lyrics = MediaServerLyrics::from_response(parsed);

        Ok(if lyrics.is_empty() { None } else { Some(lyrics) })
    }

    /// Sends a request with the session token, retrying once after a `401`.
    ///
    /// A second consecutive `401` invalidates the fresh token as well and
    /// fails with [`MediaServerError::AuthExpired`].
    pub async fn send_authorized(
        &self,
        method: HttpMethod,
        path_and_query: &str,
    ) -> Result<HttpResponse> {
        let base_url = self.session.base_url().ok_or_else(|| {
            MediaServerError::NotConfigured("MEDIASERVER_URL is not set".to_string())
        })?;
        let url = format!("{}{}", base_url, path_and_query);

        let token = self.session.get_token().await?;
        let response = self.send_once(method, &url, &token).await?;
        if response.status != 401 {
            return Ok(response);
        }

        warn!("MediaServer rejected token, logging in again");
        self.session.invalidate(&token).await;

        let token = self.session.get_token().await?;
        let response = self.send_once(method, &url, &token).await?;
        if response.status == 401 {
            error!("MediaServer rejected a freshly issued token");
            self.session.invalidate(&token).await;
            return Err(MediaServerError::AuthExpired);
        }

        info!("MediaServer request succeeded after re-authentication");
        Ok(response)
    }

    async fn send_once(&self, method: HttpMethod, url: &str, token: &str) -> Result<HttpResponse> {
        let request = HttpRequest::new(method, url)
            .header(
                AUTHORIZATION_HEADER,
                self.session.authorization_header(Some(token)),
            )
            .header("Accept", "application/json")
            .timeout(self.request_timeout);

        self.http_client.execute(request).await.map_err(|e| {
            warn!(error = %e, "MediaServer request failed");
            MediaServerError::from(e)
        })
    }

    fn parse_success<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        if !response.is_success() {
            return Err(MediaServerError::ApiError {
                status_code: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            });
        }
        response
            .json()
            .map_err(|e| MediaServerError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bytes::Bytes;
    use core_runtime::config::MediaServerConfig;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn is_login(request: &HttpRequest) -> bool {
        request.url.ends_with("/Users/AuthenticateByName")
    }

    fn login_body(token: &str) -> String {
        format!(r#"{{"AccessToken":"{}","User":{{"Id":"user-1"}}}}"#, token)
    }

    fn token_of(request: &HttpRequest) -> String {
        let header = request.headers.get(AUTHORIZATION_HEADER).cloned().unwrap_or_default();
        header
            .split("Token=\"")
            .nth(1)
            .map(|rest| rest.trim_end_matches('"').to_string())
            .unwrap_or_default()
    }

    fn client(mock_http: MockHttpClient) -> MediaServerClient {
        let http: Arc<dyn HttpClient> = Arc::new(mock_http);
        let config =
            MediaServerConfig::new("http://media.local").with_credentials("dj", "secret");
        let session = Arc::new(MediaServerSession::new(config, Arc::clone(&http)));
        MediaServerClient::new(session, http)
    }

    #[tokio::test]
    async fn test_proxy_not_configured_makes_no_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().never();

        let http: Arc<dyn HttpClient> = Arc::new(mock_http);
        let session = Arc::new(MediaServerSession::new(
            MediaServerConfig::default(),
            Arc::clone(&http),
        ));
        let client = MediaServerClient::new(session, http);

        let result = client.proxy(ProxyRequest::album("abc", vec![])).await;

        assert!(matches!(result, Err(MediaServerError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_proxy_mirrors_status_and_sets_headers() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|request| {
            if is_login(&request) {
                return response(200, &login_body("abc"));
            }
            assert_eq!(request.url, "http://media.local/Items/album-1?Fields=Genres");
            assert_eq!(token_of(&request), "abc");
            response(404, r#"{"message":"missing"}"#)
        });

        let client = client(mock_http);
        let proxied = client
            .proxy(ProxyRequest::album(
                "album-1",
                vec![("Fields".to_string(), "Genres".to_string())],
            ))
            .await
            .unwrap();

        assert_eq!(proxied.status, 404);
        assert_eq!(proxied.body, Bytes::from(r#"{"message":"missing"}"#));
        assert_eq!(proxied.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(proxied.headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn test_unauthorized_triggers_single_relogin() {
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logins);

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(4).returning(move |request| {
            if is_login(&request) {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                return response(200, &login_body(&format!("token-{}", n)));
            }
            match token_of(&request).as_str() {
                "token-1" => response(401, ""),
                _ => response(200, r#"{"Id":"album-1"}"#),
            }
        });

        let client = client(mock_http);
        let proxied = client
            .proxy(ProxyRequest::album("album-1", vec![]))
            .await
            .unwrap();

        assert_eq!(proxied.status, 200);
        assert_eq!(logins.load(Ordering::SeqCst), 2);
        assert_eq!(
            client.session().current_token().await.as_deref(),
            Some("token-2")
        );
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_fatal() {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(4).returning(move |request| {
            if is_login(&request) {
                return response(200, &login_body("abc"));
            }
            counter.fetch_add(1, Ordering::SeqCst);
            response(401, "")
        });

        let client = client(mock_http);
        let result = client.proxy(ProxyRequest::album("album-1", vec![])).await;

        assert_eq!(result.unwrap_err(), MediaServerError::AuthExpired);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(client.session().current_token().await, None);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|request| {
            if is_login(&request) {
                return response(200, &login_body("abc"));
            }
            Err(BridgeError::OperationFailed("connection reset".to_string()))
        });

        let client = client(mock_http);
        let result = client.proxy(ProxyRequest::album("album-1", vec![])).await;

        assert!(matches!(result, Err(MediaServerError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_find_track_matches_normalized_names() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|request| {
            if is_login(&request) {
                return response(200, &login_body("abc"));
            }
            assert!(request.url.contains("IncludeItemTypes=Audio"));
            response(
                200,
                r#"{"Items":[
                    {"Id":"1","Name":"Creep (Live)","Artists":["Radiohead"]},
                    {"Id":"2","Name":"creep","Artists":["Someone Else"],"AlbumArtist":"  RADIOHEAD "},
                    {"Id":"3","Name":"Creep","Artists":["Radiohead"]}
                ],"TotalRecordCount":3}"#,
            )
        });

        let client = client(mock_http);
        let item = client.find_track("radiohead", " Creep ").await.unwrap().unwrap();

        assert_eq!(item.id, "2");
    }

    #[tokio::test]
    async fn test_fetch_lyrics_converts_ticks() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|request| {
            if is_login(&request) {
                return response(200, &login_body("abc"));
            }
            assert_eq!(request.url, "http://media.local/Audio/item-1/Lyrics");
            response(
                200,
                r#"{"Lyrics":[{"Text":"First","Start":0},{"Text":"Second","Start":52500000}]}"#,
            )
        });

        let client = client(mock_http);
        let lyrics = client.fetch_lyrics("item-1").await.unwrap().unwrap();

        assert!(lyrics.is_synced());
        assert_eq!(lyrics.lines[1].start_ms, Some(5250));
    }

    #[tokio::test]
    async fn test_fetch_lyrics_not_found() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|request| {
            if is_login(&request) {
                return response(200, &login_body("abc"));
            }
            response(404, "")
        });

        let client = client(mock_http);

        assert_eq!(client.fetch_lyrics("item-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_lyrics_server_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|request| {
            if is_login(&request) {
                return response(200, &login_body("abc"));
            }
            response(500, "boom")
        });

        let client = client(mock_http);
        let result = client.fetch_lyrics("item-1").await;

        assert!(matches!(
            result,
            Err(MediaServerError::ApiError { status_code: 500, .. })
        ));
    }
}
