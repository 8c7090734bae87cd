//! On-demand download of a photo's image content.

use log::debug;
use url::Url;

use crate::error::{Result, TouristError};
use crate::flickr::HttpTransport;
use crate::store::Photo;

/// Downloads image bytes for photo records.
///
/// Caching the bytes back into the store is left to the caller.
#[derive(Debug, Clone)]
pub struct ImageFetcher<T> {
    transport: T,
}

impl<T: HttpTransport> ImageFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// GETs the photo's remote path and returns the raw body
    pub async fn fetch_image(&self, photo: &Photo) -> Result<Vec<u8>> {
        let path = photo
            .remote_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| TouristError::MissingPath(photo.id.to_string()))?;

        let url = Url::parse(path)
            .map_err(|e| TouristError::Transport(format!("invalid image URL {path}: {e}")))?;

        debug!("Fetching image for photo {} from {}", photo.id, url);
        let bytes = self.transport.get(&url).await?;
        debug!("Fetched {} bytes for photo {}", bytes.len(), photo.id);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flickr::PhotoDescriptor;
    use crate::geo::Coordinate;
    use crate::store::PinPhotoStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts requests and answers every one with the same body
    #[derive(Clone, Default)]
    struct CountingTransport {
        calls: Arc<AtomicUsize>,
    }

    impl HttpTransport for CountingTransport {
        async fn get(&self, _url: &Url) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(b"IMAGE".to_vec())
        }
    }

    fn photo_with_path(remote_path: Option<&str>) -> Photo {
        let store = PinPhotoStore::in_memory();
        let pin = store.create_pin(Coordinate::new(0.0, 0.0));
        let ids = store
            .replace_all(
                pin,
                vec![PhotoDescriptor {
                    title: None,
                    remote_path: remote_path.map(str::to_string),
                }],
            )
            .unwrap();
        store.photo(ids[0]).unwrap()
    }

    #[tokio::test]
    async fn test_missing_path_does_no_io() {
        let transport = CountingTransport::default();
        let fetcher = ImageFetcher::new(transport.clone());

        for path in [None, Some(""), Some("   ")] {
            let photo = photo_with_path(path);
            let err = fetcher.fetch_image(&photo).await.unwrap_err();
            assert!(matches!(err, TouristError::MissingPath(_)), "got {err:?}");
        }

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let transport = CountingTransport::default();
        let fetcher = ImageFetcher::new(transport.clone());
        let photo = photo_with_path(Some("https://live.staticflickr.com/65535/1_abc_m.jpg"));

        let bytes = fetcher.fetch_image(&photo).await.unwrap();

        assert_eq!(bytes, b"IMAGE");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparseable_path_is_transport_error() {
        let transport = CountingTransport::default();
        let fetcher = ImageFetcher::new(transport.clone());
        let photo = photo_with_path(Some("not a url"));

        let err = fetcher.fetch_image(&photo).await.unwrap_err();

        assert!(matches!(err, TouristError::Transport(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
