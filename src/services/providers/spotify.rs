use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{get_json, ProviderAdapter, ProviderError, ProviderProfile, ProviderStats};
use crate::models::integration_token::Provider;
use crate::models::report::ReportPeriod;

const SPOTIFY_API: &str = "https://api.spotify.com";

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SpotifyStats {
    pub tracks_played: i64,
    pub minutes_listened: i64,
    pub top_artist: Option<String>,
}

#[derive(Deserialize)]
struct Me {
    id: String,
    display_name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct RecentlyPlayed {
    #[serde(default)]
    items: Vec<PlayHistory>,
}

#[derive(Deserialize)]
struct PlayHistory {
    played_at: DateTime<Utc>,
    track: Track,
}

#[derive(Deserialize)]
struct Track {
    duration_ms: i64,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Deserialize)]
struct Artist {
    name: String,
}

pub struct SpotifyAdapter {
    http: Client,
    base_url: String,
}

impl SpotifyAdapter {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, SPOTIFY_API)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

fn summarize(history: &[PlayHistory], period: ReportPeriod) -> SpotifyStats {
    let start = period.start_utc();
    let end = period.end_utc_exclusive();
    let plays: Vec<&PlayHistory> = history
        .iter()
        .filter(|p| p.played_at >= start && p.played_at < end)
        .collect();

    let mut per_artist: HashMap<&str, usize> = HashMap::new();
    for play in &plays {
        if let Some(artist) = play.track.artists.first() {
            *per_artist.entry(artist.name.as_str()).or_default() += 1;
        }
    }
    // Ties resolve alphabetically so the result is stable.
    let top_artist = per_artist
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name.to_string());

    let total_ms: i64 = plays.iter().map(|p| p.track.duration_ms).sum();
    SpotifyStats {
        tracks_played: plays.len() as i64,
        minutes_listened: total_ms / 60_000,
        top_artist,
    }
}

#[async_trait]
impl ProviderAdapter for SpotifyAdapter {
    fn provider(&self) -> Provider {
        Provider::Spotify
    }

    async fn get_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let url = format!("{}/v1/me", self.base_url);
        let me: Me = get_json(&self.http, Provider::Spotify, &url, access_token, &[]).await?;
        Ok(ProviderProfile {
            account: me.email.unwrap_or(me.id),
            display_name: me.display_name,
        })
    }

    /// Spotify only exposes the last 50 plays, so long periods are undercounted.
    async fn get_stats(
        &self,
        access_token: &str,
        period: ReportPeriod,
    ) -> Result<ProviderStats, ProviderError> {
        let url = format!("{}/v1/me/player/recently-played", self.base_url);
        let recent: RecentlyPlayed = get_json(
            &self.http,
            Provider::Spotify,
            &url,
            access_token,
            &[
                ("limit", "50".into()),
                ("after", period.start_utc().timestamp_millis().to_string()),
            ],
        )
        .await?;

        Ok(ProviderStats::Spotify(summarize(&recent.items, period)))
    }
}
