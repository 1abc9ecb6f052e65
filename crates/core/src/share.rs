use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const SHARE_QUERY_PARAM: &str = "q";

/// The state needed to reopen a shared playground session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareSnapshot {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub distributed: bool,
}

impl ShareSnapshot {
    #[must_use]
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            ddl: None,
            distributed: false,
        }
    }

    #[must_use]
    pub fn with_ddl(mut self, ddl: impl Into<String>) -> Self {
        self.ddl = Some(ddl.into());
        self
    }
}

/// Snapshot layouts accepted on decode. Older links carry `{ ddl, select }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotPayload {
    Current(ShareSnapshot),
    Legacy { ddl: String, select: String },
}

impl From<SnapshotPayload> for ShareSnapshot {
    fn from(payload: SnapshotPayload) -> Self {
        match payload {
            SnapshotPayload::Current(snapshot) => snapshot,
            SnapshotPayload::Legacy { ddl, select } => ShareSnapshot::new(select).with_ddl(ddl),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("failed to serialize share snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn encode_share_snapshot(snapshot: &ShareSnapshot) -> Result<String, ShareError> {
    let json = serde_json::to_vec(snapshot)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Inverse of [`encode_share_snapshot`]. Also accepts standard-alphabet and
/// padded tokens. Anything malformed yields `None`.
#[must_use]
pub fn decode_share_snapshot(token: &str) -> Option<ShareSnapshot> {
    // Unescaped `+` in a query string arrives form-decoded as a space.
    let token = token.trim().trim_end_matches('=').replace(' ', "+");
    if token.is_empty() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(&token)
        .or_else(|_| STANDARD_NO_PAD.decode(&token))
        .ok()?;
    serde_json::from_slice::<SnapshotPayload>(&bytes)
        .ok()
        .map(ShareSnapshot::from)
}

pub fn share_url(base: &Url, snapshot: &ShareSnapshot) -> Result<Url, ShareError> {
    let token = encode_share_snapshot(snapshot)?;
    let mut url = base.clone();
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(name, _)| name != SHARE_QUERY_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(SHARE_QUERY_PARAM, &token);
    Ok(url)
}

#[must_use]
pub fn snapshot_from_url(url: &Url) -> Option<ShareSnapshot> {
    url.query_pairs()
        .find(|(name, _)| name == SHARE_QUERY_PARAM)
        .and_then(|(_, token)| decode_share_snapshot(&token))
}

/// Accepts either a full share URL or a bare token.
#[must_use]
pub fn snapshot_from_input(input: &str) -> Option<ShareSnapshot> {
    match Url::parse(input.trim()) {
        Ok(url) => snapshot_from_url(&url),
        Err(_) => decode_share_snapshot(input),
    }
}
