use serde::{Deserialize, Serialize};

/// Hypermedia link attached to a paginated Câmara response.
#[derive(Serialize, Deserialize, Clone)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// Paginated envelope used by the Câmara dos Deputados API: a `dados`
/// array plus `self`/`next`/`last` links for cursor advancement.
#[derive(Serialize, Deserialize)]
pub struct ApiPage<T> {
    pub dados: Vec<T>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl<T> ApiPage<T> {
    /// Returns the `next` link, if the source signalled a further page.
    pub fn next_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "next")
            .map(|l| l.href.as_str())
    }
}

/// Single-resource envelope used by the Câmara API.
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub dados: T,
}
