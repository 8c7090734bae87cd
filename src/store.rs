//! Pin and photo records and the store that owns them.
//!
//! The store keeps the whole object graph in memory and writes a YAML
//! snapshot on [`PinPhotoStore::commit`]. Mutations made since the last
//! commit are pending; only a successful commit makes them durable.
//!
//! Ownership: every photo belongs to at most one pin, recorded on the photo
//! itself. Deleting a pin deletes its photos first, so no photo ever refers
//! to a pin that no longer exists.
//!
//! Every operation takes the state lock once, so readers see either the
//! state before or after a mutation, never a half-applied `replace_all`.
//! Workflows that suspend on network I/O between reads and writes serialise
//! per pin through [`PinPhotoStore::lock_pin`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{Result, TouristError};
use crate::flickr::PhotoDescriptor;
use crate::geo::Coordinate;

macro_rules! record_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

record_id!(PinId);
record_id!(PhotoId);

/// A location marker dropped on the map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

impl Pin {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A photo found near a pin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub title: Option<String>,
    /// Source URL of the image; never changes after creation
    pub remote_path: Option<String>,
    /// Downloaded image content, absent until fetched
    #[serde(
        default,
        serialize_with = "serialize_image",
        deserialize_with = "deserialize_image"
    )]
    pub image_data: Option<Vec<u8>>,
    /// Owning pin; `None` until attached
    pub pin: Option<PinId>,
    /// Creation order, used to list a pin's photos stably
    sequence: u64,
}

impl Photo {
    pub fn has_image(&self) -> bool {
        self.image_data.is_some()
    }
}

fn serialize_image<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match data {
        Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_image<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Vec<u8>>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
        .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Serialized form of the object graph
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    last_updated: DateTime<Utc>,
    next_sequence: u64,
    pins: HashMap<PinId, Pin>,
    photos: HashMap<PhotoId, Photo>,
    #[serde(skip)]
    dirty: bool,
}

impl StoreState {
    fn new() -> Self {
        Self {
            last_updated: Utc::now(),
            next_sequence: 0,
            pins: HashMap::new(),
            photos: HashMap::new(),
            dirty: false,
        }
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
        self.dirty = true;
    }

    fn require_pin(&self, pin_id: PinId) -> Result<()> {
        if self.pins.contains_key(&pin_id) {
            Ok(())
        } else {
            Err(TouristError::pin_not_found(pin_id))
        }
    }

    fn insert_photo(&mut self, descriptor: PhotoDescriptor, pin: Option<PinId>) -> PhotoId {
        let id = PhotoId::new();
        let photo = Photo {
            id,
            title: descriptor.title,
            remote_path: descriptor.remote_path,
            image_data: None,
            pin,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.photos.insert(id, photo);
        id
    }

    fn remove_photos_of(&mut self, pin_id: PinId) -> usize {
        let before = self.photos.len();
        self.photos.retain(|_, photo| photo.pin != Some(pin_id));
        before - self.photos.len()
    }
}

/// Counts reported by [`PinPhotoStore::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub pins: usize,
    pub photos: usize,
    pub cached_images: usize,
    pub orphans: usize,
}

/// Owns pins and their photo sets
pub struct PinPhotoStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
    pin_locks: Mutex<HashMap<PinId, Arc<AsyncMutex<()>>>>,
}

impl PinPhotoStore {
    /// A store with no backing file; `commit` only clears the pending flag
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::new()),
            pin_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Opens the store snapshot at `path`, starting empty if it doesn't exist
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let yaml = fs::read_to_string(path).map_err(|e| {
                TouristError::Persistence(format!("failed to read {}: {e}", path.display()))
            })?;
            serde_yaml::from_str(&yaml).map_err(|e| {
                TouristError::Persistence(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            StoreState::new()
        };

        info!(
            "Opened store {} with {} pins and {} photos",
            path.display(),
            state.pins.len(),
            state.photos.len()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
            pin_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the mutation guard for one pin.
    ///
    /// Hold it across a whole refresh or delete workflow so that two
    /// workflows never interleave on the same pin. Fails with `NotFound` for
    /// an unknown pin without registering a lock for it. The pin may still be
    /// deleted while waiting, so re-check it once the guard is held.
    pub async fn lock_pin(&self, pin_id: PinId) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            // The entry is only created while the pin is known to exist;
            // delete_pin removes it after the pin is gone.
            let state = self.state();
            state.require_pin(pin_id)?;
            let mut locks = self
                .pin_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(pin_id).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    // Pins

    pub fn create_pin(&self, coordinate: Coordinate) -> PinId {
        let pin = Pin {
            id: PinId::new(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            created_at: Utc::now(),
        };
        let id = pin.id;

        let mut state = self.state();
        state.pins.insert(id, pin);
        state.touch();
        debug!("Created pin {id} at {coordinate}");
        id
    }

    pub fn pin(&self, pin_id: PinId) -> Result<Pin> {
        self.state()
            .pins
            .get(&pin_id)
            .cloned()
            .ok_or_else(|| TouristError::pin_not_found(pin_id))
    }

    /// All pins, oldest first
    pub fn pins(&self) -> Vec<Pin> {
        let mut pins: Vec<Pin> = self.state().pins.values().cloned().collect();
        pins.sort_by_key(|pin| pin.created_at);
        pins
    }

    /// Finds a pin by exact coordinate
    pub fn find_pin(&self, latitude: f64, longitude: f64) -> Option<PinId> {
        self.state()
            .pins
            .values()
            .find(|pin| pin.latitude == latitude && pin.longitude == longitude)
            .map(|pin| pin.id)
    }

    /// Deletes a pin after cascade-deleting its photos
    pub fn delete_pin(&self, pin_id: PinId) -> Result<usize> {
        let mut state = self.state();
        state.require_pin(pin_id)?;

        let removed = state.remove_photos_of(pin_id);
        state.pins.remove(&pin_id);
        state.touch();
        drop(state);

        self.pin_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pin_id);

        info!("Deleted pin {pin_id} and {removed} photos");
        Ok(removed)
    }

    // Photos

    /// Creates one unattached photo record per descriptor.
    ///
    /// The photos do not belong to `pin_id` until [`attach`](Self::attach)
    /// is called for each of them.
    pub fn create_photos(&self, pin_id: PinId, descriptors: Vec<PhotoDescriptor>) -> Result<Vec<PhotoId>> {
        let mut state = self.state();
        state.require_pin(pin_id)?;

        let ids: Vec<PhotoId> = descriptors
            .into_iter()
            .map(|descriptor| state.insert_photo(descriptor, None))
            .collect();
        state.touch();
        debug!("Created {} photos for pin {pin_id}", ids.len());
        Ok(ids)
    }

    /// Makes `pin_id` the owner of an existing photo
    pub fn attach(&self, photo_id: PhotoId, pin_id: PinId) -> Result<()> {
        let mut state = self.state();
        state.require_pin(pin_id)?;

        let photo = state
            .photos
            .get_mut(&photo_id)
            .ok_or_else(|| TouristError::photo_not_found(photo_id))?;
        photo.pin = Some(pin_id);
        state.touch();
        Ok(())
    }

    /// Swaps the pin's whole photo set for a fresh one built from `descriptors`
    pub fn replace_all(&self, pin_id: PinId, descriptors: Vec<PhotoDescriptor>) -> Result<Vec<PhotoId>> {
        let mut state = self.state();
        state.require_pin(pin_id)?;

        let removed = state.remove_photos_of(pin_id);
        let ids: Vec<PhotoId> = descriptors
            .into_iter()
            .map(|descriptor| state.insert_photo(descriptor, Some(pin_id)))
            .collect();
        state.touch();

        info!(
            "Replaced {} photos of pin {pin_id} with {} new ones",
            removed,
            ids.len()
        );
        Ok(ids)
    }

    /// Deletes one photo; siblings are untouched
    pub fn delete_one(&self, photo_id: PhotoId) -> Result<()> {
        let mut state = self.state();
        if state.photos.remove(&photo_id).is_none() {
            return Err(TouristError::photo_not_found(photo_id));
        }
        state.touch();
        debug!("Deleted photo {photo_id}");
        Ok(())
    }

    /// Deletes every photo owned by `pin_id`, returning how many were removed
    pub fn delete_all(&self, pin_id: PinId) -> Result<usize> {
        let mut state = self.state();
        state.require_pin(pin_id)?;

        let removed = state.remove_photos_of(pin_id);
        if removed > 0 {
            state.touch();
        }
        debug!("Deleted {removed} photos of pin {pin_id}");
        Ok(removed)
    }

    pub fn photo(&self, photo_id: PhotoId) -> Result<Photo> {
        self.state()
            .photos
            .get(&photo_id)
            .cloned()
            .ok_or_else(|| TouristError::photo_not_found(photo_id))
    }

    /// The pin's photos in creation order
    pub fn photos_for_pin(&self, pin_id: PinId) -> Result<Vec<Photo>> {
        let state = self.state();
        state.require_pin(pin_id)?;

        let mut photos: Vec<Photo> = state
            .photos
            .values()
            .filter(|photo| photo.pin == Some(pin_id))
            .cloned()
            .collect();
        photos.sort_by_key(|photo| photo.sequence);
        Ok(photos)
    }

    /// Stores downloaded image bytes on a photo.
    ///
    /// Returns `false` without error when the photo was deleted meanwhile.
    pub fn cache_image(&self, photo_id: PhotoId, bytes: Vec<u8>) -> bool {
        let mut state = self.state();
        match state.photos.get_mut(&photo_id) {
            Some(photo) => {
                photo.image_data = Some(bytes);
                state.touch();
                true
            }
            None => {
                debug!("Photo {photo_id} is gone, dropping fetched image");
                false
            }
        }
    }

    /// Removes photos that were created but never attached to a pin
    pub fn purge_orphans(&self) -> usize {
        let mut state = self.state();
        let before = state.photos.len();
        state.photos.retain(|_, photo| photo.pin.is_some());
        let removed = before - state.photos.len();
        if removed > 0 {
            state.touch();
            info!("Purged {removed} unattached photos");
        }
        removed
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state();
        StoreStats {
            pins: state.pins.len(),
            photos: state.photos.len(),
            cached_images: state.photos.values().filter(|p| p.has_image()).count(),
            orphans: state.photos.values().filter(|p| p.pin.is_none()).count(),
        }
    }

    /// Whether there are mutations not yet committed
    pub fn has_pending_changes(&self) -> bool {
        self.state().dirty
    }

    /// Flushes pending mutations to the snapshot file.
    ///
    /// A failure leaves the mutations pending; nothing is retried.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state();
        if !state.dirty {
            return Ok(());
        }

        if let Some(path) = &self.path {
            let yaml = serde_yaml::to_string(&*state)
                .map_err(|e| TouristError::Persistence(format!("failed to serialize store: {e}")))?;
            write_atomically(path, &yaml)?;
            debug!("Committed store to {}", path.display());
        }

        state.dirty = false;
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let persist_err = |e: std::io::Error| {
        TouristError::Persistence(format!("failed to write {}: {e}", path.display()))
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(persist_err)?;
    fs::rename(&tmp, path).map_err(persist_err)?;
    Ok(())
}
