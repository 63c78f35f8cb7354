//! Coordinate transforms
//!
//! Epoch conversion and equatorial to horizontal conversion are supplied by
//! an implementation of `CoordinateTransform`. `SiteTransform` covers the
//! horizontal conversion with plain spherical trigonometry and treats both
//! epochs as equal, which is adequate for simulation and point generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coordinate conversions used by point generation and modeling
pub trait CoordinateTransform: Send + Sync {
    /// J2000 (RA hours, Dec degrees) to coordinates of date
    fn j2000_to_jnow(&self, ra_hours: f64, dec_degrees: f64) -> (f64, f64);

    /// Coordinates of date to J2000
    fn jnow_to_j2000(&self, ra_hours: f64, dec_degrees: f64) -> (f64, f64);

    /// Hour angle (hours) and declination to (azimuth, altitude) in degrees
    fn hour_angle_to_az_alt(&self, hour_angle_hours: f64, dec_degrees: f64) -> (f64, f64);

    /// Right ascension of date and declination to (azimuth, altitude) at the
    /// current sidereal time
    fn ra_dec_to_az_alt(&self, ra_hours: f64, dec_degrees: f64) -> (f64, f64);

    /// Site update from the mount
    fn update_site(&self, _latitude: f64, _longitude: f64) {}

    /// Sidereal time update from the mount
    fn update_sidereal_time(&self, _lst_hours: f64) {}
}

/// Shared transform
pub type SharedTransform = Arc<dyn CoordinateTransform>;

/// Spherical trigonometry transform for one observing site
#[derive(Debug)]
pub struct SiteTransform {
    latitude_bits: AtomicU64,
    longitude_bits: AtomicU64,
    sidereal_time_bits: AtomicU64,
}

impl SiteTransform {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude_bits: AtomicU64::new(latitude.to_bits()),
            longitude_bits: AtomicU64::new(longitude.to_bits()),
            sidereal_time_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn with_sidereal_time(self, lst_hours: f64) -> Self {
        self.sidereal_time_bits
            .store(lst_hours.to_bits(), Ordering::SeqCst);
        self
    }

    pub fn latitude(&self) -> f64 {
        f64::from_bits(self.latitude_bits.load(Ordering::SeqCst))
    }

    pub fn longitude(&self) -> f64 {
        f64::from_bits(self.longitude_bits.load(Ordering::SeqCst))
    }

    pub fn sidereal_time(&self) -> f64 {
        f64::from_bits(self.sidereal_time_bits.load(Ordering::SeqCst))
    }
}

impl Default for SiteTransform {
    fn default() -> Self {
        Self::new(49.0, 11.0)
    }
}

impl CoordinateTransform for SiteTransform {
    fn j2000_to_jnow(&self, ra_hours: f64, dec_degrees: f64) -> (f64, f64) {
        (ra_hours, dec_degrees)
    }

    fn jnow_to_j2000(&self, ra_hours: f64, dec_degrees: f64) -> (f64, f64) {
        (ra_hours, dec_degrees)
    }

    fn hour_angle_to_az_alt(&self, hour_angle_hours: f64, dec_degrees: f64) -> (f64, f64) {
        let ha = (hour_angle_hours * 15.0).to_radians();
        let dec = dec_degrees.to_radians();
        let lat = self.latitude().to_radians();

        let sin_alt = dec.sin() * lat.sin() + dec.cos() * lat.cos() * ha.cos();
        let altitude = sin_alt.clamp(-1.0, 1.0).asin();

        // Azimuth from north through east
        let y = -ha.sin() * dec.cos();
        let x = dec.sin() * lat.cos() - dec.cos() * lat.sin() * ha.cos();
        let azimuth = y.atan2(x).to_degrees().rem_euclid(360.0);

        (azimuth, altitude.to_degrees())
    }

    fn ra_dec_to_az_alt(&self, ra_hours: f64, dec_degrees: f64) -> (f64, f64) {
        let hour_angle = (self.sidereal_time() - ra_hours).rem_euclid(24.0);
        self.hour_angle_to_az_alt(hour_angle, dec_degrees)
    }

    fn update_site(&self, latitude: f64, longitude: f64) {
        self.latitude_bits.store(latitude.to_bits(), Ordering::SeqCst);
        self.longitude_bits
            .store(longitude.to_bits(), Ordering::SeqCst);
    }

    fn update_sidereal_time(&self, lst_hours: f64) {
        self.sidereal_time_bits
            .store(lst_hours.to_bits(), Ordering::SeqCst);
    }
}
