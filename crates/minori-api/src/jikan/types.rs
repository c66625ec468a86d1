use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<JikanAnime>,
}

#[derive(Debug, Deserialize)]
pub struct FullResponse {
    pub data: JikanAnime,
}

/// The subset of a Jikan anime object this pipeline reads.
#[derive(Debug, Default, Deserialize)]
pub struct JikanAnime {
    pub mal_id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(default)]
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub members: Option<u64>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Present on the `/full` endpoint only; search results omit it.
    #[serde(default)]
    pub external: Vec<ExternalLink>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalLink {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

impl JikanAnime {
    /// All title variants, for match scoring.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.title
            .as_deref()
            .into_iter()
            .chain(self.title_english.as_deref())
            .chain(self.title_japanese.as_deref())
    }

    /// Best available display title.
    pub fn display_title(&self) -> &str {
        self.titles().next().unwrap_or("")
    }

    /// The IMDb id from the external links, when listed.
    /// URL shape: `https://www.imdb.com/title/tt1234567/`.
    pub fn imdb_id(&self) -> Option<String> {
        self.external
            .iter()
            .filter(|link| link.name == "IMDb")
            .flat_map(|link| link.url.split('/'))
            .find(|segment| {
                segment.len() > 2
                    && segment.starts_with("tt")
                    && segment[2..].chars().all(|c| c.is_ascii_digit())
            })
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imdb_id_extracted_from_link() {
        let anime: JikanAnime = serde_json::from_value(serde_json::json!({
            "mal_id": 1,
            "title": "Cowboy Bebop",
            "external": [
                { "name": "Official Site", "url": "https://example.com" },
                { "name": "IMDb", "url": "https://www.imdb.com/title/tt0213338/" },
            ]
        }))
        .unwrap();
        assert_eq!(anime.imdb_id().as_deref(), Some("tt0213338"));
    }

    #[test]
    fn no_imdb_link_is_none() {
        let anime = JikanAnime::default();
        assert_eq!(anime.imdb_id(), None);
    }

    #[test]
    fn non_id_tt_segment_ignored() {
        let anime: JikanAnime = serde_json::from_value(serde_json::json!({
            "mal_id": 1,
            "external": [{ "name": "IMDb", "url": "https://www.imdb.com/ttnews/" }]
        }))
        .unwrap();
        assert_eq!(anime.imdb_id(), None);
    }
}
