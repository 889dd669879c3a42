//! Queue items

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// How the client should render an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum MediaItemType {
    #[default]
    Video,
    Stream,
}

impl From<MediaItemType> for u8 {
    fn from(kind: MediaItemType) -> Self {
        match kind {
            MediaItemType::Video => 0,
            MediaItemType::Stream => 1,
        }
    }
}

impl From<u8> for MediaItemType {
    fn from(value: u8) -> Self {
        match value {
            1 => MediaItemType::Stream,
            _ => MediaItemType::Video,
        }
    }
}

/// Metadata resolved for a URL before it is queued
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItemInfo {
    pub url: String,
    pub title: String,
    pub icon: String,
}

/// A queued or playing item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MediaItemType,
    pub author: UserId,
    pub url: String,
    pub title: String,
    pub icon: String,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, author: UserId, info: MediaItemInfo) -> Self {
        Self {
            id: id.into(),
            kind: MediaItemType::Video,
            author,
            url: info.url,
            title: info.title,
            icon: info.icon,
        }
    }
}
