//! High-level API facade.
//!
//! [`Client`] maps catalog, playlist, search and player operations onto
//! transport routes and hands the raw decoded JSON back to the caller (or to
//! whatever data-mapping layer sits on top). It never reclassifies transport
//! errors; whatever [`Http::request`] raises propagates verbatim.

use serde_json::{Value, json};

use crate::{
    error::Error,
    http::{Body, Http, Route},
    oauth::{flows::GrantFlow, session::AuthSession},
    pager::Pager,
};

/// Client interface for the API.
///
/// This is the type to interface with when fetching catalog objects. It owns
/// the authentication session and the transport; dropping it without calling
/// [`close`](Self::close) leaves the background refresh task running until
/// the runtime shuts down.
///
/// # Example
///
/// ```
/// use spotikit::{Client, ClientCredentialsFlow};
///
/// let client = Client::new(ClientCredentialsFlow::new("id", "secret"));
/// ```
pub struct Client {
    auth: AuthSession,
    http: Http,
}

impl Client {
    /// Creates a client for the given grant flow against the configured API
    /// base URL.
    pub fn new(flow: impl Into<GrantFlow>) -> Self {
        let auth = AuthSession::new(flow);
        let http = Http::new(auth.clone());
        Client { auth, http }
    }

    /// Creates a client against a non-default API base URL.
    pub fn with_base_url(flow: impl Into<GrantFlow>, base: impl Into<String>) -> Self {
        let auth = AuthSession::new(flow);
        let http = Http::with_base(auth.clone(), base);
        Client { auth, http }
    }

    /// The authentication session backing this client.
    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// Tells the session to authorize this client.
    pub async fn authorize(&self) -> crate::Result<()> {
        self.auth.authorize().await
    }

    /// The consent URL for user-delegated flows.
    pub fn authorize_url(&self) -> crate::Result<String> {
        self.auth.authorize_url()
    }

    /// Completes a user-delegated authorization with the redirect code.
    pub async fn complete_authorization(&self, code: &str) -> crate::Result<()> {
        self.auth.complete_authorization(code).await
    }

    /// Forces an immediate credential refresh.
    pub async fn refresh(&self) -> crate::Result<()> {
        self.auth.refresh().await
    }

    /// Closes this client, cancelling the background refresh task.
    /// In-flight requests are not cancelled; callers should let them
    /// complete.
    pub async fn close(&self) {
        self.auth.close().await;
    }

    /// Issues an authorized GET and insists on a JSON payload coming back.
    async fn fetch(&self, route: Route) -> crate::Result<Value> {
        let what = route.url.clone();
        self.http
            .request(&route, None, true)
            .await?
            .ok_or(Error::EmptyResponse(what))
    }

    /// Issues an authorized call whose response body is irrelevant.
    async fn send(&self, route: Route, body: Option<Body>) -> crate::Result<()> {
        self.http.request(&route, body.as_ref(), true).await?;
        Ok(())
    }

    // --- catalog ---

    pub async fn get_track(&self, id: &str) -> crate::Result<Value> {
        self.fetch(Route::get(format!("tracks/{id}"))).await
    }

    pub async fn get_tracks(&self, ids: &[&str]) -> crate::Result<Value> {
        self.fetch(Route::get("tracks").param("ids", ids.join(",")))
            .await
    }

    pub async fn get_album(&self, id: &str) -> crate::Result<Value> {
        self.fetch(Route::get(format!("albums/{id}"))).await
    }

    pub async fn get_albums(&self, ids: &[&str]) -> crate::Result<Value> {
        self.fetch(Route::get("albums").param("ids", ids.join(",")))
            .await
    }

    /// The tracks of an album as a lazy pager, bounded by `cap` when given.
    pub async fn get_album_tracks(&self, id: &str, cap: Option<u64>) -> crate::Result<Pager<'_>> {
        let page = self
            .fetch(Route::get(format!("albums/{id}/tracks")).param("limit", 50))
            .await?;
        Pager::new(&self.http, &page, cap)
    }

    pub async fn get_artist(&self, id: &str) -> crate::Result<Value> {
        self.fetch(Route::get(format!("artists/{id}"))).await
    }

    pub async fn get_artists(&self, ids: &[&str]) -> crate::Result<Value> {
        self.fetch(Route::get("artists").param("ids", ids.join(",")))
            .await
    }

    pub async fn get_artist_albums(&self, id: &str, cap: Option<u64>) -> crate::Result<Pager<'_>> {
        let page = self
            .fetch(Route::get(format!("artists/{id}/albums")))
            .await?;
        Pager::new(&self.http, &page, cap)
    }

    pub async fn get_artist_top_tracks(&self, id: &str, market: &str) -> crate::Result<Value> {
        self.fetch(Route::get(format!("artists/{id}/top-tracks")).param("market", market))
            .await
    }

    // --- search ---

    /// Searches the catalog for one object type (`track`, `album`, `artist`
    /// or `playlist`) and pages through the matching section of the
    /// response.
    pub async fn search(
        &self,
        query: &str,
        kind: &str,
        cap: Option<u64>,
    ) -> crate::Result<Pager<'_>> {
        let page = self
            .fetch(Route::get("search").param("q", query).param("type", kind))
            .await?;
        Pager::search(&self.http, &page, format!("{kind}s"), cap)
    }

    // --- playlists ---

    pub async fn get_playlist(&self, id: &str) -> crate::Result<Value> {
        self.fetch(Route::get(format!("playlists/{id}"))).await
    }

    pub async fn get_playlist_tracks(
        &self,
        id: &str,
        cap: Option<u64>,
    ) -> crate::Result<Pager<'_>> {
        let page = self
            .fetch(Route::get(format!("playlists/{id}/tracks")))
            .await?;
        Pager::new(&self.http, &page, cap)
    }

    pub async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        public: bool,
        description: Option<&str>,
    ) -> crate::Result<Value> {
        let mut body = json!({ "name": name, "public": public });
        if let Some(description) = description {
            body["description"] = json!(description);
        }

        let route = Route::post(format!("users/{user_id}/playlists"));
        let what = route.url.clone();
        self.http
            .request(&route, Some(&Body::Json(body)), true)
            .await?
            .ok_or(Error::EmptyResponse(what))
    }

    /// Changes a playlist's details; only the given fields are touched.
    pub async fn edit_playlist(&self, id: &str, details: Value) -> crate::Result<()> {
        self.send(
            Route::put(format!("playlists/{id}")),
            Some(Body::Json(details)),
        )
        .await
    }

    pub async fn playlist_add_tracks(
        &self,
        id: &str,
        uris: &[&str],
        position: Option<u64>,
    ) -> crate::Result<()> {
        let mut body = json!({ "uris": uris });
        if let Some(position) = position {
            body["position"] = json!(position);
        }

        self.send(
            Route::post(format!("playlists/{id}/tracks")),
            Some(Body::Json(body)),
        )
        .await
    }

    // --- users ---

    pub async fn get_user(&self, id: &str) -> crate::Result<Value> {
        self.fetch(Route::get(format!("users/{id}"))).await
    }

    pub async fn get_me(&self) -> crate::Result<Value> {
        self.fetch(Route::get("me")).await
    }

    pub async fn get_me_top_tracks(&self, cap: Option<u64>) -> crate::Result<Pager<'_>> {
        let page = self.fetch(Route::get("me/top/tracks")).await?;
        Pager::new(&self.http, &page, cap)
    }

    pub async fn get_me_top_artists(&self, cap: Option<u64>) -> crate::Result<Pager<'_>> {
        let page = self.fetch(Route::get("me/top/artists")).await?;
        Pager::new(&self.http, &page, cap)
    }

    /// The artists the current user follows, paged on an opaque cursor.
    pub async fn get_followed_artists(&self, cap: Option<u64>) -> crate::Result<Pager<'_>> {
        let page = self
            .fetch(Route::get("me/following").param("type", "artist"))
            .await?;
        Pager::cursor(&self.http, &page, "artists", cap)
    }

    // --- player ---

    /// The user's current playback context, or `Null` when nothing plays.
    pub async fn get_player(&self) -> crate::Result<Value> {
        let data = self.http.request(&Route::get("me/player"), None, true).await?;
        Ok(data.unwrap_or(Value::Null))
    }

    pub async fn currently_playing(&self) -> crate::Result<Value> {
        let data = self
            .http
            .request(&Route::get("me/player/currently-playing"), None, true)
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    pub async fn get_devices(&self) -> crate::Result<Value> {
        self.fetch(Route::get("me/player/devices")).await
    }

    pub async fn player_play(&self, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::put("me/player/play").param_opt("device_id", device_id),
            None,
        )
        .await
    }

    pub async fn player_pause(&self, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::put("me/player/pause").param_opt("device_id", device_id),
            None,
        )
        .await
    }

    pub async fn player_next(&self, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::post("me/player/next").param_opt("device_id", device_id),
            None,
        )
        .await
    }

    pub async fn player_previous(&self, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::post("me/player/previous").param_opt("device_id", device_id),
            None,
        )
        .await
    }

    pub async fn player_seek(&self, position_ms: u64, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::put("me/player/seek")
                .param("position_ms", position_ms)
                .param_opt("device_id", device_id),
            None,
        )
        .await
    }

    /// Sets the repeat mode: `track`, `context` or `off`.
    pub async fn player_repeat(&self, state: &str, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::put("me/player/repeat")
                .param("state", state)
                .param_opt("device_id", device_id),
            None,
        )
        .await
    }

    pub async fn player_volume(&self, percent: u8, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::put("me/player/volume")
                .param("volume_percent", percent)
                .param_opt("device_id", device_id),
            None,
        )
        .await
    }

    pub async fn player_shuffle(&self, state: bool, device_id: Option<&str>) -> crate::Result<()> {
        self.send(
            Route::put("me/player/shuffle")
                .param("state", state)
                .param_opt("device_id", device_id),
            None,
        )
        .await
    }
}
