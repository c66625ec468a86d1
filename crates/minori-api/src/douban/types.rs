use serde::Deserialize;

/// One candidate from the suggest endpoint. The payload carries more
/// fields (sub_title, img, url); only these are read.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Year as a string (`"2024"`), sometimes empty.
    #[serde(default)]
    pub year: Option<String>,
}

impl SuggestItem {
    pub fn year_i32(&self) -> Option<i32> {
        self.year.as_deref().and_then(|y| y.trim().parse().ok())
    }
}
