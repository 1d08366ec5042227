//! Playlist reads and writes on top of [`SpotifyClient`].
//!
//! Reads are paginated in pages of [`PAGE_SIZE`] and stop at the first short
//! page. Writes are split into chunks of [`WRITE_CHUNK_SIZE`] uris and issued
//! in input order; a failing chunk aborts the operation without rolling back
//! the chunks already applied.

use crate::client::SpotifyClient;
use crate::config::{LOG_TARGET, PAGE_SIZE, WRITE_CHUNK_SIZE};
use crate::error::{Result, SpotifyError};
use muzee_core::TrackUri;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Which track collection to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistRef<'a> {
    /// The user's Liked Songs (`me/tracks`)
    Liked,
    Playlist(&'a str),
}

impl PlaylistRef<'_> {
    fn tracks_path(&self) -> String {
        match self {
            Self::Liked => "me/tracks".to_string(),
            Self::Playlist(id) => format!("playlists/{id}/tracks"),
        }
    }
}

/// One playable track read from a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTrack {
    pub uri: TrackUri,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    is_local: Option<bool>,
    track: Option<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    uri: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    is_local: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    playlists: Page<PlaylistSummary>,
}

/// Keep an item only if it is a non-local track with a uri.
fn playable_track(item: RawItem) -> Option<PlaylistTrack> {
    let track = item.track?;
    let is_track = track.kind.as_deref().unwrap_or("track") == "track";
    let is_local = item.is_local.unwrap_or(false) || track.is_local.unwrap_or(false);

    match track.uri {
        Some(uri) if is_track && !is_local => Some(PlaylistTrack {
            uri: TrackUri::new(uri),
            name: track.name,
        }),
        _ => None,
    }
}

/// Playlist operations for one client.
pub struct PlaylistAccessor<'a> {
    client: &'a SpotifyClient,
}

impl<'a> PlaylistAccessor<'a> {
    #[must_use]
    pub const fn new(client: &'a SpotifyClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub const fn client(&self) -> &'a SpotifyClient {
        self.client
    }

    /// Read every playable track of a playlist or of Liked Songs.
    ///
    /// `fields` is a Spotify field projection; it is ignored for Liked Songs,
    /// which does not support one.
    ///
    /// # Errors
    ///
    /// Returns the first error of any page request.
    pub async fn fetch_all_tracks(
        &self,
        playlist: PlaylistRef<'_>,
        fields: Option<&str>,
    ) -> Result<Vec<PlaylistTrack>> {
        let path = playlist.tracks_path();
        let fields = match playlist {
            PlaylistRef::Liked => None,
            PlaylistRef::Playlist(_) => fields,
        };

        let mut tracks = Vec::new();
        let mut offset = 0;

        loop {
            let mut query = vec![
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            if let Some(fields) = fields {
                query.push(("fields", fields.to_string()));
            }

            let page: Page<RawItem> = serde_json::from_value(self.client.get(&path, &query).await?)?;
            let page_len = page.items.len();
            tracks.extend(page.items.into_iter().flatten().filter_map(playable_track));

            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        debug!(target: LOG_TARGET, "Read {} tracks from {}", tracks.len(), path);
        Ok(tracks)
    }

    /// Read one window of a playlist, filtered to playable tracks.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn fetch_track_page(
        &self,
        playlist_id: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<PlaylistTrack>> {
        let query = [
            ("limit", limit.clamp(1, PAGE_SIZE).to_string()),
            ("offset", offset.to_string()),
            ("fields", crate::config::TRACK_FIELDS.to_string()),
        ];
        let page: Page<RawItem> = serde_json::from_value(
            self.client
                .get(&format!("playlists/{playlist_id}/tracks"), &query)
                .await?,
        )?;

        Ok(page
            .items
            .into_iter()
            .flatten()
            .filter_map(playable_track)
            .collect())
    }

    /// Append tracks in chunks, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns the first chunk error; earlier chunks stay applied.
    pub async fn add_tracks(&self, playlist_id: &str, uris: &[TrackUri]) -> Result<()> {
        let path = format!("playlists/{playlist_id}/tracks");
        for chunk in uris.chunks(WRITE_CHUNK_SIZE) {
            self.client.post(&path, &json!({ "uris": chunk })).await?;
        }
        if !uris.is_empty() {
            info!(target: LOG_TARGET, "Added {} tracks to {}", uris.len(), playlist_id);
        }
        Ok(())
    }

    /// Remove every occurrence of the given tracks, in chunks.
    ///
    /// # Errors
    ///
    /// Returns the first chunk error; earlier chunks stay applied.
    pub async fn remove_tracks(&self, playlist_id: &str, uris: &[TrackUri]) -> Result<()> {
        let path = format!("playlists/{playlist_id}/tracks");
        for chunk in uris.chunks(WRITE_CHUNK_SIZE) {
            let tracks: Vec<Value> = chunk.iter().map(|uri| json!({ "uri": uri })).collect();
            self.client.delete(&path, &json!({ "tracks": tracks })).await?;
        }
        if !uris.is_empty() {
            info!(target: LOG_TARGET, "Removed {} tracks from {}", uris.len(), playlist_id);
        }
        Ok(())
    }

    /// Replace the playlist's contents. An empty slice clears it.
    ///
    /// # Errors
    ///
    /// Returns the first request error.
    pub async fn replace_tracks(&self, playlist_id: &str, uris: &[TrackUri]) -> Result<()> {
        let split = uris.len().min(WRITE_CHUNK_SIZE);
        let (first, rest) = uris.split_at(split);

        self.client
            .put(
                &format!("playlists/{playlist_id}/tracks"),
                &json!({ "uris": first }),
            )
            .await?;
        self.add_tracks(playlist_id, rest).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the reply has no id.
    pub async fn create_playlist(
        &self,
        owner_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<PlaylistSummary> {
        let created = self
            .client
            .post(
                &format!("users/{owner_id}/playlists"),
                &json!({ "name": name, "description": description, "public": public }),
            )
            .await?;
        let summary: PlaylistSummary = serde_json::from_value(created)?;

        info!(target: LOG_TARGET, "Created playlist {} ({})", summary.name, summary.id);
        Ok(summary)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn edit_playlist(&self, playlist_id: &str, description: &str) -> Result<()> {
        self.client
            .put(
                &format!("playlists/{playlist_id}"),
                &json!({ "description": description }),
            )
            .await?;
        Ok(())
    }

    /// URL of the playlist's first cover image. Missing playlists and playlists
    /// without images both yield `None`.
    ///
    /// # Errors
    ///
    /// Returns any error other than not-found.
    pub async fn fetch_cover_image(&self, playlist_id: &str) -> Result<Option<String>> {
        match self
            .client
            .get(&format!("playlists/{playlist_id}/images"), &[])
            .await
        {
            Ok(Value::Null) => Ok(None),
            Ok(value) => {
                let images: Vec<RawImage> = serde_json::from_value(value)?;
                Ok(images.into_iter().next().map(|image| image.url))
            }
            Err(SpotifyError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    ///
    /// Returns any error other than not-found.
    pub async fn playlist_exists(&self, playlist_id: &str) -> Result<bool> {
        match self
            .client
            .get(
                &format!("playlists/{playlist_id}"),
                &[("fields", "id".to_string())],
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(SpotifyError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn playlist_name(&self, playlist_id: &str) -> Result<String> {
        let value = self
            .client
            .get(
                &format!("playlists/{playlist_id}"),
                &[("fields", "name".to_string())],
            )
            .await?;
        Ok(value["name"].as_str().unwrap_or_default().to_string())
    }

    /// Number of items in a playlist, as reported by Spotify.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn track_count(&self, playlist_id: &str) -> Result<u64> {
        let value = self
            .client
            .get(
                &format!("playlists/{playlist_id}"),
                &[("fields", "tracks.total".to_string())],
            )
            .await?;
        Ok(value["tracks"]["total"].as_u64().unwrap_or(0))
    }

    /// All playlists in a user's library.
    ///
    /// # Errors
    ///
    /// Returns the first error of any page request.
    pub async fn user_playlists(&self, owner_id: &str) -> Result<Vec<PlaylistSummary>> {
        let path = format!("users/{owner_id}/playlists");
        let mut playlists = Vec::new();
        let mut offset = 0;

        loop {
            let query = [
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: Page<PlaylistSummary> =
                serde_json::from_value(self.client.get(&path, &query).await?)?;
            let page_len = page.items.len();
            playlists.extend(page.items.into_iter().flatten());

            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(playlists)
    }

    /// Top playlist search results for a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn search_playlists(&self, query: &str, limit: usize) -> Result<Vec<PlaylistSummary>> {
        let params = [
            ("q", query.to_string()),
            ("type", "playlist".to_string()),
            ("limit", limit.to_string()),
        ];
        let response: SearchResponse =
            serde_json::from_value(self.client.get("search", &params).await?)?;

        Ok(response.playlists.items.into_iter().flatten().collect())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn current_user(&self) -> Result<CurrentUser> {
        Ok(serde_json::from_value(self.client.get("me", &[]).await?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client_for;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(uri: &str) -> Value {
        json!({ "is_local": false, "track": { "uri": uri, "name": uri, "type": "track", "is_local": false } })
    }

    fn page_of(start: usize, count: usize) -> Value {
        let items: Vec<Value> = (start..start + count)
            .map(|n| item(&format!("spotify:track:{n}")))
            .collect();
        json!({ "items": items })
    }

    fn uris(count: usize) -> Vec<TrackUri> {
        (0..count)
            .map(|n| TrackUri::new(format!("spotify:track:{n}")))
            .collect()
    }

    fn raw(value: Value) -> RawItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_inclusion_predicate() {
        assert!(playable_track(raw(item("spotify:track:1"))).is_some());
        assert!(playable_track(raw(json!({ "track": { "uri": "spotify:track:2" } }))).is_some());

        assert!(playable_track(raw(json!({ "is_local": false, "track": null }))).is_none());
        assert!(playable_track(raw(json!({ "track": { "uri": null, "type": "track" } }))).is_none());
        assert!(playable_track(raw(
            json!({ "track": { "uri": "spotify:episode:1", "type": "episode" } })
        ))
        .is_none());
        assert!(playable_track(raw(
            json!({ "is_local": true, "track": { "uri": "spotify:local:1" } })
        ))
        .is_none());
        assert!(playable_track(raw(
            json!({ "track": { "uri": "spotify:local:2", "is_local": true } })
        ))
        .is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_tracks_pages_until_short_page() {
        let server = MockServer::start().await;
        for (offset, count) in [(0, 50), (50, 50), (100, 20)] {
            Mock::given(method("GET"))
                .and(path("/playlists/p1/tracks"))
                .and(query_param("offset", offset.to_string()))
                .and(query_param("limit", "50"))
                .respond_with(ResponseTemplate::new(200).set_body_json(page_of(offset, count)))
                .expect(1)
                .mount(&server)
                .await;
        }

        let (client, _, _) = client_for(&server).await;
        let tracks = PlaylistAccessor::new(&client)
            .fetch_all_tracks(PlaylistRef::Playlist("p1"), Some(crate::config::TRACK_FIELDS))
            .await
            .unwrap();

        assert_eq!(tracks.len(), 120);
        assert_eq!(tracks[0].uri.as_str(), "spotify:track:0");
        assert_eq!(tracks[119].uri.as_str(), "spotify:track:119");
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_trailing_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/tracks"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_of(0, 50)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/tracks"))
            .and(query_param("offset", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let tracks = PlaylistAccessor::new(&client)
            .fetch_all_tracks(PlaylistRef::Liked, Some("items(track(uri))"))
            .await
            .unwrap();

        assert_eq!(tracks.len(), 50);
        let requests = server.received_requests().await.unwrap();
        assert!(requests
            .iter()
            .all(|request| !request.url.query().unwrap_or_default().contains("fields")));
    }

    #[tokio::test]
    async fn test_filtered_items_still_count_towards_page_length() {
        let server = MockServer::start().await;
        let mut items: Vec<Value> = (0..49).map(|n| item(&format!("spotify:track:{n}"))).collect();
        items.push(json!({ "is_local": true, "track": { "uri": "spotify:local:x" } }));
        Mock::given(method("GET"))
            .and(path("/playlists/p1/tracks"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/p1/tracks"))
            .and(query_param("offset", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_of(100, 3)))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let tracks = PlaylistAccessor::new(&client)
            .fetch_all_tracks(PlaylistRef::Playlist("p1"), None)
            .await
            .unwrap();
        assert_eq!(tracks.len(), 52);
    }

    #[tokio::test]
    async fn test_add_tracks_chunks_in_order() {
        let server = MockServer::start().await;
        let all = uris(120);
        for chunk in all.chunks(50) {
            Mock::given(method("POST"))
                .and(path("/playlists/p1/tracks"))
                .and(body_json(json!({ "uris": chunk })))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "snapshot_id": "s" })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let (client, _, _) = client_for(&server).await;
        PlaylistAccessor::new(&client)
            .add_tracks("p1", &all)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_no_tracks_issues_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        PlaylistAccessor::new(&client)
            .add_tracks("p1", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_tracks_uses_track_objects() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/playlists/p1/tracks"))
            .and(body_json(json!({ "tracks": [{ "uri": "spotify:track:0" }, { "uri": "spotify:track:1" }] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "snapshot_id": "s" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        PlaylistAccessor::new(&client)
            .remove_tracks("p1", &uris(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_replace_with_empty_list_clears() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/playlists/p1/tracks"))
            .and(body_json(json!({ "uris": [] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "snapshot_id": "s" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        PlaylistAccessor::new(&client)
            .replace_tracks("p1", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_chunk_stops_remaining_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/playlists/p1/tracks"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "status": 403, "message": "Not your playlist" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let result = PlaylistAccessor::new(&client)
            .add_tracks("p1", &uris(120))
            .await;
        assert!(matches!(
            result,
            Err(SpotifyError::UpstreamRejected { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_cover_image_absent_cases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlists/gone/images"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/bare/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/art/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "url": "https://i.scdn.co/image/1", "height": 640, "width": 640 }
            ])))
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let accessor = PlaylistAccessor::new(&client);
        assert_eq!(accessor.fetch_cover_image("gone").await.unwrap(), None);
        assert_eq!(accessor.fetch_cover_image("bare").await.unwrap(), None);
        assert_eq!(
            accessor.fetch_cover_image("art").await.unwrap().as_deref(),
            Some("https://i.scdn.co/image/1")
        );
    }

    #[tokio::test]
    async fn test_playlist_metadata_reads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlists/p1"))
            .and(query_param("fields", "tracks.total"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tracks": { "total": 42 } })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/p1"))
            .and(query_param("fields", "name"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Road trip" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/p1"))
            .and(query_param("fields", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let accessor = PlaylistAccessor::new(&client);
        assert_eq!(accessor.track_count("p1").await.unwrap(), 42);
        assert_eq!(accessor.playlist_name("p1").await.unwrap(), "Road trip");
        assert!(accessor.playlist_exists("p1").await.unwrap());
        assert!(!accessor.playlist_exists("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_skips_null_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "lofi"))
            .and(query_param("type", "playlist"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "playlists": { "items": [
                    { "id": "s1", "name": "Lofi beats" },
                    null,
                    { "id": "s2", "name": "Lofi study" }
                ] }
            })))
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let results = PlaylistAccessor::new(&client)
            .search_playlists("lofi", 5)
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_create_playlist_posts_to_owner() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/ada/playlists"))
            .and(body_json(json!({ "name": "Daily Smash", "description": "🕺🕺🕺", "public": false })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "new1", "name": "Daily Smash", "public": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let created = PlaylistAccessor::new(&client)
            .create_playlist("ada", "Daily Smash", "🕺🕺🕺", false)
            .await
            .unwrap();
        assert_eq!(
            created,
            PlaylistSummary {
                id: "new1".into(),
                name: "Daily Smash".into()
            }
        );
    }
}
