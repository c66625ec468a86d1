use serde::Deserialize;

/// Suggestion payload. `d` mixes titles (`tt…`) and people (`nm…`);
/// only these fields are read.
#[derive(Debug, Default, Deserialize)]
pub struct SuggestResponse {
    #[serde(rename = "d", default)]
    pub results: Vec<SuggestItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestItem {
    #[serde(default)]
    pub id: String,
    /// Display title.
    #[serde(rename = "l", default)]
    pub title: String,
}
