//! Great-circle distances on a spherical Earth.

use trackview_env::LatLng;

/// Mean Earth radius used by every distance in the dashboard.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two points given in degrees.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let sin_dphi = (d_phi / 2.0).sin();
    let sin_dlambda = (d_lambda / 2.0).sin();

    let a = sin_dphi * sin_dphi + phi1.cos() * phi2.cos() * sin_dlambda * sin_dlambda;
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Distance between two coordinates.
pub fn distance_between(a: &LatLng, b: &LatLng) -> f64 {
    distance_meters(a.lat, a.lng, b.lat, b.lng)
}

/// Sum of leg lengths along an ordered path.
pub fn path_length_meters(path: &[LatLng]) -> f64 {
    path.windows(2).map(|w| distance_between(&w[0], &w[1])).sum()
}
