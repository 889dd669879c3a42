//! Metadata lookup for queue items

use async_trait::async_trait;

use crate::entities::MediaItemInfo;
use crate::error::DomainError;

/// Resolves a URL into displayable metadata before it is queued
#[async_trait]
pub trait MediaInfoProvider: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<MediaItemInfo, DomainError>;
}

/// Provider that performs no lookup and uses the URL as the title
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMediaInfo;

#[async_trait]
impl MediaInfoProvider for BasicMediaInfo {
    async fn fetch(&self, url: &str) -> Result<MediaItemInfo, DomainError> {
        if url.trim().is_empty() {
            return Err(DomainError::MediaUnavailable("empty url".to_string()));
        }

        Ok(MediaItemInfo {
            url: url.to_string(),
            title: url.to_string(),
            icon: String::new(),
        })
    }
}
