//! =============================================================================
//! PREFERENCES.RS - Préférences utilisateur persistantes
//! PREFERENCES.RS - Persistent user preferences
//! =============================================================================
//!
//! Les valeurs sont stockées dans un objet JSON, lues par clé typée, et
//! chaque écriture est sauvegardée puis notifiée aux abonnés.
//! Values live in one JSON object, are read through typed keys, and every
//! write is saved then announced to subscribers.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::color_profile::ColorProfiles;
use crate::config::{CONFIG_DIR_NAME, DEFAULT_MAGNIFICATION, PREFERENCES_FILE_NAME};
use crate::error::PreferencesError;
use crate::readout::ColorModel;

// =============================================================================
// CLÉS TYPÉES
// TYPED KEYS
// =============================================================================

/// Clé de préférence avec sa valeur par défaut
/// Preference key with its default value
#[derive(Clone, Copy, Debug)]
pub struct Preference<T> {
    pub key: &'static str,
    pub default: T,
}

impl<T> Preference<T> {
    pub const fn new(key: &'static str, default: T) -> Self {
        Self { key, default }
    }
}

pub const MAGNIFICATION_FACTOR: Preference<f64> = Preference::new("magnificationFactor", DEFAULT_MAGNIFICATION);
pub const SHOW_GRID: Preference<bool> = Preference::new("showGrid", false);
pub const SHOW_HOT_SPOT: Preference<bool> = Preference::new("showHotSpot", true);
pub const SHOW_MOUSE_COORDINATE: Preference<bool> = Preference::new("showMouseCoordinate", false);
pub const MOUSE_COORDINATE_IN_PIXEL: Preference<bool> = Preference::new("mouseCoordinateInPixel", false);
pub const SCREENS_HAS_SEPARATE_COORDINATE: Preference<bool> =
    Preference::new("screensHasSeparateCoordinate", false);
pub const IS_MOUSE_COORDINATE_FLIPPED: Preference<bool> = Preference::new("isMouseCoordinateFlipped", true);
pub const SHOW_COLOR_VALUE: Preference<bool> = Preference::new("showColorValue", false);
pub const COLOR_MODEL: Preference<ColorModel> = Preference::new("colorModel", ColorModel::Rgb);
/// Profil choisi par modèle de couleur
/// Selected profile per color model; missing models use their "Device" profile
pub const COLOR_PROFILES: Preference<ColorProfiles> = Preference::new("colorProfiles", ColorProfiles::new());
pub const FLOATING_MAGNIFIER_WINDOW: Preference<bool> = Preference::new("floatingMagnifierWindow", false);

/// Notifié après chaque changement de valeur
/// Notified after every value change
pub trait PreferencesSubscriber {
    fn preference_changed(&mut self, store: &PreferencesStore, key: &str);
}

// =============================================================================
// STORE
// =============================================================================

pub struct PreferencesStore {
    path: Option<PathBuf>,
    values: RefCell<Map<String, Value>>,
    subscribers: RefCell<Vec<Weak<RefCell<dyn PreferencesSubscriber>>>>,
}

impl PreferencesStore {
    /// Store sans fichier
    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: RefCell::new(Map::new()),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// `<config dir>/pixie/preferences.json`
    pub fn default_path() -> Result<PathBuf, PreferencesError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(PREFERENCES_FILE_NAME))
            .ok_or(PreferencesError::NoConfigDir)
    }

    /// Charge le fichier par défaut
    /// Loads the default file, falling back to an in-memory store
    pub fn open_default() -> Self {
        match Self::default_path() {
            Ok(path) => Self::load(path),
            Err(e) => {
                warn!("Preferences will not be saved: {}", e);
                Self::in_memory()
            }
        }
    }

    /// Charge le fichier; absent ou invalide, on repart des valeurs par défaut
    /// Loads the file; when missing or invalid, defaults are used
    pub fn load(path: PathBuf) -> Self {
        let values = match read_values(&path) {
            Ok(values) => values,
            Err(PreferencesError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!("Ignoring preferences at {}: {}", path.display(), e);
                Map::new()
            }
        };
        debug!("Loaded {} preference(s) from {}", values.len(), path.display());

        Self {
            path: Some(path),
            values: RefCell::new(values),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Valeur courante, ou la valeur par défaut si absente ou mal typée
    /// Current value, or the default when missing or mistyped
    pub fn get<T>(&self, preference: &Preference<T>) -> T
    where
        T: DeserializeOwned + Clone,
    {
        self.values
            .borrow()
            .get(preference.key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_else(|| preference.default.clone())
    }

    /// Enregistre, sauvegarde et notifie
    /// Stores, saves and notifies; a failed save keeps the value in memory
    pub fn set<T>(&self, preference: &Preference<T>, value: T)
    where
        T: Serialize,
    {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot serialize preference {}: {}", preference.key, e);
                return;
            }
        };

        {
            let mut values = self.values.borrow_mut();
            if values.get(preference.key) == Some(&value) {
                return;
            }
            values.insert(preference.key.to_string(), value);
        }
        debug!("Preference {} changed", preference.key);

        if let Err(e) = self.save() {
            warn!("Failed to save preferences: {}", e);
        }
        self.notify(preference.key);
    }

    /// Écrit toutes les valeurs sur le disque
    /// Writes every value to disk (no-op for in-memory stores)
    pub fn save(&self) -> Result<(), PreferencesError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*self.values.borrow())?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn add_subscriber(&self, subscriber: &Rc<RefCell<dyn PreferencesSubscriber>>) {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|weak| weak.strong_count() > 0);
        if !subscribers
            .iter()
            .any(|weak| std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(subscriber)))
        {
            subscribers.push(Rc::downgrade(subscriber));
        }
    }

    fn notify(&self, key: &str) {
        let live: Vec<_> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in live {
            match subscriber.try_borrow_mut() {
                Ok(mut subscriber) => subscriber.preference_changed(self, key),
                Err(_) => warn!("Preference subscriber busy, change of {} not delivered", key),
            }
        }
    }
}

fn read_values(path: &Path) -> Result<Map<String, Value>, PreferencesError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

// =============================================================================
// TESTS
// =============================================================================
