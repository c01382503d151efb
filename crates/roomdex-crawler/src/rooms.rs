//! Room directory entry normalization.
//!
//! Room operators annotate their topics with machine-readable tags of the
//! form `(MRS-language:EN-MRS)` to declare a language, a contact address, or
//! to opt out of indexing. Parsing strips the tags out of the stored topic;
//! a `noindex` tag drops the room entirely.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use roomdex_common::models::{Room, server_from_id};
use roomdex_federation::types::PublicRoomEntry;

use crate::media::MediaResolver;

/// Topic tag grammar: `MRS-<key>[:<value>]-MRS`, optionally parenthesized.
/// The `ROOMDEX` prefix is accepted as an alias.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?\s*(?:MRS|ROOMDEX)-(language|contact|noindex)(?::([^\s()]*?))?-(?:MRS|ROOMDEX)\s*\)?")
        .expect("topic tag regex is valid")
});

static SPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space run regex is valid"));

/// Tags extracted from a room topic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopicTags {
    /// Topic text with all tags removed.
    pub topic: String,
    /// Uppercased language code, empty when untagged.
    pub language: String,
    /// Contact email, empty when untagged.
    pub email: String,
    /// Whether the room opted out of indexing.
    pub noindex: bool,
}

/// Parse and strip directory tags from a raw topic.
pub fn parse_topic(raw: &str) -> TopicTags {
    let mut tags = TopicTags::default();
    for caps in TAG_RE.captures_iter(raw) {
        let value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        match &caps[1] {
            "language" => tags.language = value.to_uppercase(),
            "contact" => tags.email = value.to_owned(),
            "noindex" => tags.noindex = true,
            _ => {}
        }
    }
    let cleaned = TAG_RE.replace_all(raw, " ");
    tags.topic = SPACE_RUN_RE.replace_all(&cleaned, " ").trim().to_owned();
    tags
}

/// Split an `mxc://server/mediaId` reference into its parts.
pub fn mxc_parts(mxc: &str) -> Option<(&str, &str)> {
    let rest = mxc.strip_prefix("mxc://")?;
    let (server, media_id) = rest.split_once('/')?;
    if server.is_empty() || media_id.is_empty() { None } else { Some((server, media_id)) }
}

/// Every server referenced by a room's identifiers, deduplicated.
pub fn servers_of_room(room: &Room) -> Vec<String> {
    let mut servers = BTreeSet::new();
    for id in [room.id.as_str(), room.alias.as_str()] {
        if let Some(server) = server_from_id(id) {
            servers.insert(server.to_owned());
        }
    }
    if !room.server.is_empty() {
        servers.insert(room.server.clone());
    }
    servers.into_iter().collect()
}

/// Normalize a directory entry into a [`Room`], applying topic tags and
/// materializing the avatar URL.
///
/// Returns the room plus whether its topic carried a `noindex` directive.
pub fn from_directory_entry(
    entry: &PublicRoomEntry,
    server: &str,
    fallback_email: &str,
    media: &dyn MediaResolver,
) -> (Room, bool) {
    let tags = parse_topic(entry.topic.as_deref().unwrap_or(""));
    let avatar = entry.avatar_url.clone().unwrap_or_default();
    let avatar_url = match mxc_parts(&avatar) {
        Some((media_server, media_id)) => media.get_url(media_server, media_id),
        None => String::new(),
    };

    let email =
        if tags.email.is_empty() { fallback_email.to_owned() } else { tags.email.clone() };

    let room = Room {
        id: entry.room_id.clone(),
        alias: entry.canonical_alias.clone().unwrap_or_default(),
        name: entry.name.clone().unwrap_or_default(),
        topic: tags.topic.clone(),
        avatar,
        avatar_url,
        members: entry.num_joined_members,
        room_type: entry.room_type.clone().unwrap_or_default(),
        join_rule: entry.join_rule.clone().unwrap_or_default(),
        guest_joinable: entry.guest_can_join,
        world_readable: entry.world_readable,
        server: server.to_owned(),
        email,
        language: tags.language.clone(),
        parsed_at: Utc::now(),
    };
    (room, tags.noindex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::AvatarProxy;

    #[test]
    fn language_tag_round_trip() {
        let tags = parse_topic("Hello (MRS-language:EN-MRS)");
        assert_eq!(tags.topic, "Hello");
        assert_eq!(tags.language, "EN");
        assert!(!tags.noindex);
    }

    #[test]
    fn contact_and_noindex_tags() {
        let tags = parse_topic("Support room MRS-contact:admin@example.com-MRS MRS-noindex-MRS");
        assert_eq!(tags.topic, "Support room");
        assert_eq!(tags.email, "admin@example.com");
        assert!(tags.noindex);
    }

    #[test]
    fn tags_in_the_middle_leave_clean_text() {
        let tags = parse_topic("Rust talk (ROOMDEX-language:pt-br-ROOMDEX) and help");
        assert_eq!(tags.topic, "Rust talk and help");
        assert_eq!(tags.language, "PT-BR");
    }

    #[test]
    fn untagged_topics_pass_through() {
        let tags = parse_topic("Just a plain topic");
        assert_eq!(tags.topic, "Just a plain topic");
        assert!(tags.language.is_empty());
        assert!(tags.email.is_empty());
    }

    #[test]
    fn mxc_reference_splitting() {
        assert_eq!(mxc_parts("mxc://matrix.org/abc123"), Some(("matrix.org", "abc123")));
        assert_eq!(mxc_parts("https://example.com/a.png"), None);
        assert_eq!(mxc_parts("mxc://matrix.org/"), None);
        assert_eq!(mxc_parts("mxc://"), None);
    }

    #[test]
    fn normalization_applies_tags_and_avatar() {
        let entry = PublicRoomEntry {
            room_id: "!abc:one.example.com".into(),
            canonical_alias: Some("#rust:two.example.com".into()),
            name: Some("Rust".into()),
            topic: Some("Systems chat (MRS-language:EN-MRS)".into()),
            avatar_url: Some("mxc://one.example.com/avatarId".into()),
            num_joined_members: 42,
            ..Default::default()
        };
        let media = AvatarProxy::new("https://roomdex.example.com");
        let (room, noindex) =
            from_directory_entry(&entry, "three.example.com", "ops@example.com", &media);

        assert!(!noindex);
        assert_eq!(room.topic, "Systems chat");
        assert_eq!(room.language, "EN");
        assert_eq!(room.email, "ops@example.com");
        assert_eq!(
            room.avatar_url,
            "https://roomdex.example.com/avatar/one.example.com/avatarId"
        );
        assert_eq!(
            servers_of_room(&room),
            vec![
                "one.example.com".to_owned(),
                "three.example.com".to_owned(),
                "two.example.com".to_owned()
            ]
        );
    }
}
