use url::Url;

use crate::app::Result;
use crate::config::UpstreamConfig;

/// URL builders for both upstream protocols.
#[derive(Debug, Clone)]
pub struct Endpoints {
    web_base: Url,
    api_base: Url,
    asset_url: String,
    user_query_id: String,
}

impl Endpoints {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        Ok(Self {
            web_base: Url::parse(&config.web_base_url)?,
            api_base: Url::parse(&config.api_base_url)?,
            asset_url: config.asset_url.clone(),
            user_query_id: config.user_by_screen_name_query_id.clone(),
        })
    }

    /// Full HTML profile page (legacy)
    pub fn profile_page(&self, handle: &str) -> String {
        self.web(&[handle]).to_string()
    }

    /// Older posts, before `max_position` (legacy)
    pub fn timeline_page(&self, handle: &str, max_position: &str) -> String {
        let mut url = self.legacy_timeline(handle);
        url.query_pairs_mut()
            .append_pair("include_available_features", "1")
            .append_pair("include_entities", "1")
            .append_pair("max_position", max_position)
            .append_pair("reset_error_state", "false");
        url.to_string()
    }

    /// Newer posts, after `min_position` (legacy)
    pub fn timeline_updates(&self, handle: &str, min_position: &str) -> String {
        let mut url = self.legacy_timeline(handle);
        url.query_pairs_mut()
            .append_pair("composed_count", "0")
            .append_pair("include_available_features", "1")
            .append_pair("include_entities", "1")
            .append_pair("include_new_items_bar", "true")
            .append_pair("interval", "30000")
            .append_pair("latent_count", "0")
            .append_pair("min_position", min_position);
        url.to_string()
    }

    /// Script bundle carrying the public bearer token
    pub fn script_asset(&self) -> &str {
        &self.asset_url
    }

    pub fn guest_activate(&self) -> String {
        self.api(&["1.1", "guest", "activate.json"]).to_string()
    }

    pub fn user_by_screen_name(&self, handle: &str) -> String {
        let variables = serde_json::json!({
            "screen_name": handle,
            "withHighlightedLabel": true,
        });
        let mut url = self.api(&["graphql", &self.user_query_id, "UserByScreenName"]);
        url.query_pairs_mut()
            .append_pair("variables", &variables.to_string());
        url.to_string()
    }

    /// Structured timeline page; `cursor` selects older or newer posts
    pub fn user_timeline(&self, rest_id: &str, count: usize, cursor: Option<&str>) -> String {
        let file = format!("{}.json", rest_id);
        let mut url = self.api(&["2", "timeline", "profile", &file]);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("include_tweet_replies", "false")
                .append_pair("tweet_mode", "extended")
                .append_pair("count", &count.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        url.to_string()
    }

    fn legacy_timeline(&self, handle: &str) -> Url {
        self.web(&["i", "profiles", "show", handle, "timeline", "tweets"])
    }

    fn web(&self, segments: &[&str]) -> Url {
        Self::join(&self.web_base, segments)
    }

    fn api(&self, segments: &[&str]) -> Url {
        Self::join(&self.api_base, segments)
    }

    fn join(base: &Url, segments: &[&str]) -> Url {
        let mut url = base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
