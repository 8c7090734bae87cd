//! Album workflows for a pin: search, sample, store, and image caching.
//!
//! `AlbumController` composes the search client, the sampler, the photo store
//! and the image fetcher. Every workflow that mutates a pin's photo set runs
//! under that pin's lock, so a refresh and a delete of the same pin never
//! interleave. Image downloads are independent per photo and run concurrently
//! without the lock; a download that finishes after its photo was deleted is
//! dropped.

use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Result, TouristError};
use crate::flickr::{FlickrClient, HttpTransport, SearchSettings};
use crate::geo::Coordinate;
use crate::image::ImageFetcher;
use crate::sampler::{ALBUM_CAPACITY, sample_album};
use crate::store::{Photo, PhotoId, PinId, PinPhotoStore};

/// Default number of concurrent image downloads
pub const DEFAULT_IMAGE_CONCURRENCY: usize = 8;

/// Result of filling a pin's album
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumOutcome {
    /// The album holds these photos
    Populated(Vec<PhotoId>),
    /// The search succeeded but found nothing
    NoImagesFound,
    /// The pin was deleted while the search was in flight; results discarded
    PinRemoved,
}

impl AlbumOutcome {
    pub fn photo_ids(&self) -> &[PhotoId] {
        match self {
            AlbumOutcome::Populated(ids) => ids,
            _ => &[],
        }
    }
}

/// What the album view should currently show for a pin
#[derive(Debug, Clone)]
pub enum AlbumState {
    Loading,
    Empty,
    Ready(Vec<Photo>),
}

/// Counts from one [`AlbumController::fetch_missing_images`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageFetchSummary {
    pub fetched: usize,
    pub failed: usize,
    /// Downloads whose photo was deleted before they finished
    pub skipped: usize,
}

/// Marks a pin as loading until dropped
struct LoadingMarker<'a> {
    loading: &'a Mutex<HashSet<PinId>>,
    pin_id: PinId,
}

impl<'a> LoadingMarker<'a> {
    fn new(loading: &'a Mutex<HashSet<PinId>>, pin_id: PinId) -> Self {
        loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pin_id);
        Self { loading, pin_id }
    }
}

impl Drop for LoadingMarker<'_> {
    fn drop(&mut self) {
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.pin_id);
    }
}

/// Orchestrates album workflows over a shared store
pub struct AlbumController<T> {
    store: Arc<PinPhotoStore>,
    search: FlickrClient<T>,
    images: ImageFetcher<T>,
    capacity: usize,
    image_concurrency: usize,
    loading: Mutex<HashSet<PinId>>,
}

impl<T: HttpTransport + Clone> AlbumController<T> {
    pub fn new(store: Arc<PinPhotoStore>, transport: T, settings: SearchSettings) -> Self {
        Self {
            store,
            search: FlickrClient::new(transport.clone(), settings),
            images: ImageFetcher::new(transport),
            capacity: ALBUM_CAPACITY,
            image_concurrency: DEFAULT_IMAGE_CONCURRENCY,
            loading: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_image_concurrency(mut self, concurrency: usize) -> Self {
        self.image_concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Arc<PinPhotoStore> {
        &self.store
    }

    /// Drops a new pin and commits it.
    ///
    /// Coordinates outside the valid latitude/longitude ranges are rejected.
    pub fn add_pin(&self, coordinate: Coordinate) -> Result<PinId> {
        if !coordinate.is_valid() {
            return Err(TouristError::InvalidCoordinate(format!(
                "latitude {}, longitude {}",
                coordinate.latitude, coordinate.longitude
            )));
        }
        let pin_id = self.store.create_pin(coordinate);
        self.store.commit()?;
        Ok(pin_id)
    }

    /// Deletes a pin and all of its photos
    pub async fn remove_pin(&self, pin_id: PinId) -> Result<usize> {
        let _guard = self.store.lock_pin(pin_id).await?;
        let removed = self.store.delete_pin(pin_id)?;
        self.store.commit()?;
        Ok(removed)
    }

    /// Current view state of a pin's album
    pub fn album_state(&self, pin_id: PinId) -> Result<AlbumState> {
        let loading = self
            .loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&pin_id);
        if loading {
            return Ok(AlbumState::Loading);
        }

        let photos = self.store.photos_for_pin(pin_id)?;
        if photos.is_empty() {
            Ok(AlbumState::Empty)
        } else {
            Ok(AlbumState::Ready(photos))
        }
    }

    /// Returns the pin's stored album, searching for one if it is empty.
    ///
    /// Overlapping calls on an empty pin run a single search; the later
    /// callers get the album the first one stored.
    pub async fn open_album(&self, pin_id: PinId) -> Result<AlbumOutcome> {
        if let Some(outcome) = self.stored_album(pin_id)? {
            return Ok(outcome);
        }
        let _guard = self.store.lock_pin(pin_id).await?;
        self.fill_album(pin_id, false).await
    }

    /// Replaces the pin's album with a freshly sampled search result.
    ///
    /// If the search fails the previous album is left as it was.
    pub async fn new_collection(&self, pin_id: PinId) -> Result<AlbumOutcome> {
        let _guard = self.store.lock_pin(pin_id).await?;
        self.fill_album(pin_id, true).await
    }

    fn stored_album(&self, pin_id: PinId) -> Result<Option<AlbumOutcome>> {
        let existing = self.store.photos_for_pin(pin_id)?;
        if existing.is_empty() {
            return Ok(None);
        }
        Ok(Some(AlbumOutcome::Populated(
            existing.into_iter().map(|photo| photo.id).collect(),
        )))
    }

    /// Searches and stores a new album. Caller holds the pin's lock.
    async fn fill_album(&self, pin_id: PinId, replace: bool) -> Result<AlbumOutcome> {
        let pin = self.store.pin(pin_id)?;
        if !replace {
            if let Some(outcome) = self.stored_album(pin_id)? {
                info!("Pin {pin_id} was filled while waiting, keeping its album");
                return Ok(outcome);
            }
        }
        let _loading = LoadingMarker::new(&self.loading, pin_id);

        let results = self.search.search_at_location(pin.coordinate()).await?;
        let found = results.len();
        let sampled = sample_album(results, self.capacity, &mut rand::thread_rng());

        let ids = match self.store.replace_all(pin_id, sampled) {
            Ok(ids) => ids,
            Err(err) if err.is_not_found() => {
                info!("Pin {pin_id} was removed during the search, discarding results");
                return Ok(AlbumOutcome::PinRemoved);
            }
            Err(err) => return Err(err),
        };
        self.store.commit()?;

        info!("Pin {pin_id}: kept {} of {} photos found", ids.len(), found);
        if ids.is_empty() {
            Ok(AlbumOutcome::NoImagesFound)
        } else {
            Ok(AlbumOutcome::Populated(ids))
        }
    }

    /// Deletes the selected photos of a pin.
    ///
    /// Ids that are already gone or belong to another pin are skipped.
    pub async fn remove_photos(&self, pin_id: PinId, photo_ids: &[PhotoId]) -> Result<usize> {
        let _guard = self.store.lock_pin(pin_id).await?;
        self.store.pin(pin_id)?;

        let mut removed = 0;
        for &photo_id in photo_ids {
            match self.store.photo(photo_id) {
                Ok(photo) if photo.pin == Some(pin_id) => {
                    self.store.delete_one(photo_id)?;
                    removed += 1;
                }
                Ok(_) => warn!("Photo {photo_id} does not belong to pin {pin_id}, skipping"),
                Err(err) if err.is_not_found() => {
                    warn!("Photo {photo_id} is already gone, skipping")
                }
                Err(err) => return Err(err),
            }
        }

        self.store.commit()?;
        Ok(removed)
    }

    /// Downloads and caches every photo of the pin that has no image yet
    pub async fn fetch_missing_images(&self, pin_id: PinId) -> Result<ImageFetchSummary> {
        let pending: Vec<Photo> = self
            .store
            .photos_for_pin(pin_id)?
            .into_iter()
            .filter(|photo| !photo.has_image())
            .collect();

        if pending.is_empty() {
            return Ok(ImageFetchSummary::default());
        }
        info!("Fetching {} images for pin {pin_id}", pending.len());

        let results: Vec<(PhotoId, Result<Vec<u8>>)> = stream::iter(pending)
            .map(|photo| async move {
                let result = self.images.fetch_image(&photo).await;
                (photo.id, result)
            })
            .buffer_unordered(self.image_concurrency)
            .collect()
            .await;

        let mut summary = ImageFetchSummary::default();
        for (photo_id, result) in results {
            match result {
                Ok(bytes) => {
                    if self.store.cache_image(photo_id, bytes) {
                        summary.fetched += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                Err(err) => {
                    warn!("Failed to fetch image for photo {photo_id}: {err}");
                    summary.failed += 1;
                }
            }
        }

        self.store.commit()?;
        Ok(summary)
    }

    /// Fetches the image for one photo unless it is already cached
    pub async fn image_for(&self, photo_id: PhotoId) -> Result<Vec<u8>> {
        let photo = self.store.photo(photo_id)?;
        if let Some(bytes) = photo.image_data {
            return Ok(bytes);
        }

        let bytes = self.images.fetch_image(&photo).await?;
        if !self.store.cache_image(photo_id, bytes.clone()) {
            return Err(TouristError::photo_not_found(photo_id));
        }
        Ok(bytes)
    }
}
