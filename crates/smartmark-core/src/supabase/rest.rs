//! PostgREST access to the `bookmarks` table

use async_trait::async_trait;
use reqwest::RequestBuilder;
use tracing::debug;
use url::Url;

use super::{check, decode, SupabaseClient};
use crate::error::ServiceError;
use crate::models::{Bookmark, BookmarkPatch, NewBookmarkRow};
use crate::service::BookmarkService;

const BOOKMARKS_PATH: &str = "/rest/v1/bookmarks";

/// Ask PostgREST to return the written row
const RETURN_REPRESENTATION: &str = "return=representation";

/// Ask PostgREST for a single object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

impl SupabaseClient {
    fn bookmarks_url(&self, query: &[(&str, &str)]) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.endpoint(BOOKMARKS_PATH))
            .map_err(|e| ServiceError::Other(format!("Invalid backend URL: {}", e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Attach the api key and the user's token
    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        let token = self
            .current_session()
            .await?
            .map(|s| s.access_token)
            .ok_or(ServiceError::NoSession)?;
        Ok(builder
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(token))
    }
}

fn id_filter(id: &str) -> String {
    format!("eq.{}", id)
}

#[async_trait]
impl BookmarkService for SupabaseClient {
    async fn list(&self, user_id: &str) -> Result<Vec<Bookmark>, ServiceError> {
        let owner = id_filter(user_id);
        let url = self.bookmarks_url(&[
            ("select", "*"),
            ("user_id", owner.as_str()),
            ("order", "created_at.desc"),
        ])?;
        debug!("GET {}", url);

        let request = self.authorized(self.http.get(url)).await?;
        let response = check(request.send().await?).await?;
        let bookmarks: Vec<Bookmark> = decode(response).await?;
        debug!("Listed {} bookmarks", bookmarks.len());
        Ok(bookmarks)
    }

    async fn insert(&self, row: &NewBookmarkRow) -> Result<Bookmark, ServiceError> {
        let url = self.bookmarks_url(&[])?;
        debug!("POST {} ({})", url, row.bookmark.url);

        let request = self
            .authorized(self.http.post(url))
            .await?
            .header("Prefer", RETURN_REPRESENTATION)
            .header("Accept", SINGLE_OBJECT)
            .json(row);
        let response = check(request.send().await?).await?;
        let bookmark: Bookmark = decode(response).await?;
        debug!("Inserted bookmark {}", bookmark.id);
        Ok(bookmark)
    }

    async fn update(&self, id: &str, patch: &BookmarkPatch) -> Result<(), ServiceError> {
        let filter = id_filter(id);
        let url = self.bookmarks_url(&[("id", filter.as_str())])?;
        debug!("PATCH {}", url);

        let request = self.authorized(self.http.patch(url)).await?.json(patch);
        check(request.send().await?).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let filter = id_filter(id);
        let url = self.bookmarks_url(&[("id", filter.as_str())])?;
        debug!("DELETE {}", url);

        let request = self.authorized(self.http.delete(url)).await?;
        check(request.send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_server::TestServer;
    use super::*;
    use crate::config::BackendConfig;
    use crate::models::{NewBookmark, Session, User};
    use crate::supabase::SessionFile;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    const ROW: &str = r#"{"id":7,"user_id":"u1","url":"https://example.com","title":"Example","created_at":"2024-05-01T10:00:00+00:00","updated_at":"2024-05-01T10:00:00+00:00"}"#;

    fn signed_in_client(server: &TestServer, temp: &TempDir) -> SupabaseClient {
        let file = SessionFile::new(temp.path().join("session.json"));
        file.save(&Session {
            access_token: "jwt-u1".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "bearer".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            user: User::new("u1"),
        })
        .unwrap();
        SupabaseClient::new(
            BackendConfig {
                url: server.url.clone(),
                anon_key: "anon".to_string(),
            },
            file,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_query_and_headers() {
        let server = TestServer::start(vec![(200, "[]")]).await;
        let temp = TempDir::new().unwrap();
        let client = signed_in_client(&server, &temp);

        let bookmarks = client.list("u1").await.unwrap();
        assert!(bookmarks.is_empty());

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(
            requests[0].target,
            "/rest/v1/bookmarks?select=*&user_id=eq.u1&order=created_at.desc"
        );
        assert_eq!(requests[0].header("apikey"), Some("anon"));
        assert_eq!(requests[0].header("authorization"), Some("Bearer jwt-u1"));
    }

    #[tokio::test]
    async fn test_insert_returns_canonical_row() {
        let server = TestServer::start(vec![(201, ROW)]).await;
        let temp = TempDir::new().unwrap();
        let client = signed_in_client(&server, &temp);

        let row = NewBookmark::new("https://example.com", "Example").to_row("u1");
        let bookmark = client.insert(&row).await.unwrap();
        assert_eq!(bookmark.id, "7");

        let requests = server.requests();
        let request = &requests[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.header("prefer"), Some("return=representation"));
        assert_eq!(request.header("accept"), Some("application/vnd.pgrst.object+json"));
        let body = request.json();
        assert_eq!(body["url"], "https://example.com");
        assert_eq!(body["user_id"], "u1");
    }

    #[tokio::test]
    async fn test_insert_unique_violation() {
        let server = TestServer::start(vec![(
            409,
            r#"{"code":"23505","details":null,"hint":null,"message":"duplicate key value violates unique constraint"}"#,
        )])
        .await;
        let temp = TempDir::new().unwrap();
        let client = signed_in_client(&server, &temp);

        let row = NewBookmark::new("https://example.com", "Example").to_row("u1");
        let err = client.insert(&row).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_update_and_delete_filter_by_id() {
        let server = TestServer::start(vec![(204, ""), (204, "")]).await;
        let temp = TempDir::new().unwrap();
        let client = signed_in_client(&server, &temp);

        client.update("7", &BookmarkPatch::title("New")).await.unwrap();
        client.delete("7").await.unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].method, "PATCH");
        assert_eq!(requests[0].target, "/rest/v1/bookmarks?id=eq.7");
        assert_eq!(requests[0].json(), serde_json::json!({"title": "New"}));
        assert_eq!(requests[1].method, "DELETE");
        assert_eq!(requests[1].target, "/rest/v1/bookmarks?id=eq.7");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = TestServer::start(vec![(200, r#"{"not":"a list"}"#)]).await;
        let temp = TempDir::new().unwrap();
        let client = signed_in_client(&server, &temp);

        assert!(matches!(
            client.list("u1").await,
            Err(ServiceError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_requires_session() {
        let server = TestServer::start(vec![]).await;
        let temp = TempDir::new().unwrap();
        let client = SupabaseClient::new(
            BackendConfig {
                url: server.url.clone(),
                anon_key: "anon".to_string(),
            },
            SessionFile::new(temp.path().join("session.json")),
        )
        .unwrap();

        assert!(matches!(
            client.delete("7").await,
            Err(ServiceError::NoSession)
        ));
        assert!(server.requests().is_empty());
    }
}
