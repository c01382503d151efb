//! Avatar URL materialization seam.
//!
//! The crawler only needs one thing from the media layer: turning an
//! `mxc://server/mediaId` reference into an externally fetchable HTTP URL.
//! Proxying and disk caching live behind this trait, outside this crate.

/// Maps media references to fetchable HTTP URLs.
pub trait MediaResolver: Send + Sync {
    fn get_url(&self, server: &str, media_id: &str) -> String;
}

/// Points avatars at this instance's public avatar endpoint.
pub struct AvatarProxy {
    base_url: String,
}

impl AvatarProxy {
    pub fn new(public_api_url: &str) -> Self {
        Self { base_url: public_api_url.trim_end_matches('/').to_owned() }
    }
}

impl MediaResolver for AvatarProxy {
    fn get_url(&self, server: &str, media_id: &str) -> String {
        format!("{}/avatar/{}/{}", self.base_url, server, media_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{AvatarProxy, MediaResolver};

    #[test]
    fn builds_public_avatar_urls() {
        let proxy = AvatarProxy::new("https://roomdex.example.com/");
        assert_eq!(
            proxy.get_url("matrix.org", "abcDEF123"),
            "https://roomdex.example.com/avatar/matrix.org/abcDEF123"
        );
    }
}
