//! Point Store Configuration
//!
//! Limits default to the historical HDF-EOS caps and can be adjusted per
//! [`PointFile`](crate::PointFile) through [`Config`], or read from the
//! environment with [`Config::from_env`].
//!
//! ```
//! use eos_point::config::Config;
//!
//! let config = Config::default().max_open_points(4).max_regions(16);
//! assert_eq!(config.max_open_points, 4);
//! assert_eq!(config.max_levels, 8);
//! ```
//!
//! A global error handler can be installed to observe every failure that is
//! pushed onto the error stack:
//!
//! ```
//! use eos_point::config;
//!
//! config::set_error_handler(|routine, err| eprintln!("{routine}: {err}"));
//! config::remove_error_handler();
//! ```

use std::sync::{Mutex, MutexGuard};

use bitflags::bitflags;
use once_cell::sync::Lazy;

use crate::errors::{PointError, Result};

/// Environment variable overriding [`Config::max_open_points`].
pub const ENV_MAX_OPEN_POINTS: &str = "EOS_POINT_MAX_OPEN_POINTS";
/// Environment variable overriding [`Config::max_regions`].
pub const ENV_MAX_REGIONS: &str = "EOS_POINT_MAX_REGIONS";
/// Environment variable overriding [`Config::max_levels`].
pub const ENV_MAX_LEVELS: &str = "EOS_POINT_MAX_LEVELS";

/// Capacity and naming limits enforced by a [`PointFile`](crate::PointFile).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Point structures that may be open at once.
    pub max_open_points: usize,
    /// Regions that may be alive at once.
    pub max_regions: usize,
    /// Levels per point; also the number of per-level slots in a region.
    pub max_levels: usize,
    /// Longest point or level name.
    pub max_name_len: usize,
    /// Longest field name.
    pub max_field_name_len: usize,
    /// Fields per level.
    pub max_fields: usize,
    /// Largest field order (array length).
    pub max_order: usize,
    /// Largest record size in bytes.
    pub max_record_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_open_points: 64,
            max_regions: 256,
            max_levels: 8,
            max_name_len: 64,
            max_field_name_len: 128,
            max_fields: 256,
            max_order: 65535,
            max_record_size: 65535,
        }
    }
}

impl Config {
    /// Default limits, with the point, region and level caps taken from the
    /// environment when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        if let Some(v) = env_usize(ENV_MAX_OPEN_POINTS)? {
            config.max_open_points = v;
        }
        if let Some(v) = env_usize(ENV_MAX_REGIONS)? {
            config.max_regions = v;
        }
        if let Some(v) = env_usize(ENV_MAX_LEVELS)? {
            config.max_levels = v;
        }
        Ok(config)
    }

    pub fn max_open_points(mut self, n: usize) -> Self {
        self.max_open_points = n;
        self
    }

    pub fn max_regions(mut self, n: usize) -> Self {
        self.max_regions = n;
        self
    }

    pub fn max_levels(mut self, n: usize) -> Self {
        self.max_levels = n;
        self
    }

    pub fn max_name_len(mut self, n: usize) -> Self {
        self.max_name_len = n;
        self
    }

    pub fn max_field_name_len(mut self, n: usize) -> Self {
        self.max_field_name_len = n;
        self
    }

    pub fn max_fields(mut self, n: usize) -> Self {
        self.max_fields = n;
        self
    }

    pub fn max_record_size(mut self, n: usize) -> Self {
        self.max_record_size = n;
        self
    }
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
            PointError::BadArgument(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}

bitflags! {
    /// Access granted to a [`PointFile`](crate::PointFile).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AccessFlags: u8 {
        /// Read levels, regions and attributes.
        const READ = 0x01;
        /// Write levels, linkages and attributes.
        const WRITE = 0x02;
        /// Create new point structures.
        const CREATE = 0x04;
        /// Everything.
        const RDWR = Self::READ.bits() | Self::WRITE.bits() | Self::CREATE.bits();
    }
}

impl Default for AccessFlags {
    fn default() -> AccessFlags {
        AccessFlags::READ
    }
}

type ErrorCallbackType = dyn FnMut(&'static str, &PointError) + 'static + Send;

#[derive(Default)]
struct ErrorCallback {
    callback: Option<Box<ErrorCallbackType>>,
    /// Bumped by every set or remove, so a running handler is not put back
    /// over a newer one.
    epoch: u64,
}

/// Static variable that holds the current error callback function
static ERROR_CALLBACK: Lazy<Mutex<ErrorCallback>> = Lazy::new(Default::default);

fn error_callback() -> MutexGuard<'static, ErrorCallback> {
    match ERROR_CALLBACK.lock() {
        Ok(guard) => guard,
        // the slot is only touched while locked and never left half-written
        Err(poison_error) => poison_error.into_inner(),
    }
}

/// Set a global handler called for every error pushed onto the error stack.
///
/// The function must be `Send` since it may be called from any thread. It
/// runs without the handler slot locked, so it may itself set or remove the
/// handler. Errors raised while it runs, by the handler or by other
/// threads, are not passed to it.
pub fn set_error_handler<F>(callback: F)
where
    F: FnMut(&'static str, &PointError) + 'static + Send,
{
    let mut slot = error_callback();
    slot.callback = Some(Box::new(callback));
    slot.epoch += 1;
}

/// Remove the global error handler.
pub fn remove_error_handler() {
    let mut slot = error_callback();
    slot.callback = None;
    slot.epoch += 1;
}

pub(crate) fn notify_error_handler(routine: &'static str, error: &PointError) {
    let (callback, epoch) = {
        let mut slot = error_callback();
        (slot.callback.take(), slot.epoch)
    };
    let Some(mut callback) = callback else {
        return;
    };
    callback(routine, error);
    let mut slot = error_callback();
    if slot.epoch == epoch {
        slot.callback = Some(callback);
    }
}
