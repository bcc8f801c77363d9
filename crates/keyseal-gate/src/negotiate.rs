use http::header::{ACCEPT, USER_AGENT};
use http::HeaderMap;

/// What kind of body a rejected caller should get back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Media {
    Html,
    Json,
    Unknown,
}

/// First `html` or `json` subtype in `Accept`, else `Html` for browser user agents.
pub fn accepts(headers: &HeaderMap) -> Media {
    let accept = headers.get(ACCEPT).and_then(|v| v.to_str().ok());
    for media_type in accept.into_iter().flat_map(|v| v.split(',')) {
        let subtype = media_type
            .trim()
            .split_once('/')
            .map(|(_, subtype)| subtype.split(';').next().unwrap_or(subtype));
        match subtype {
            Some("html") => return Media::Html,
            Some("json") => return Media::Json,
            _ => {}
        }
    }

    let browser = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| ua.to_ascii_lowercase().contains("mozilla"));
    if browser {
        Media::Html
    } else {
        Media::Unknown
    }
}

/// `X-Requested-With: XMLHttpRequest`, compared case-insensitively.
pub fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
}
