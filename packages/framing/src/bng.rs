//! WGS84 to and from British National Grid (EPSG:27700).
//!
//! Follows the Ordnance Survey method: a seven-parameter Helmert shift
//! between WGS84 and OSGB36, then the National Grid transverse Mercator
//! projection on the Airy 1830 ellipsoid. Accurate to a few metres, which
//! is well below marker size at any print scale used here.

use uprn_maps_models::{Coord, ProjectedCoord};

struct Ellipsoid {
    a: f64,
    b: f64,
}

impl Ellipsoid {
    fn e2(&self) -> f64 {
        1.0 - (self.b * self.b) / (self.a * self.a)
    }
}

const GRS80: Ellipsoid = Ellipsoid {
    a: 6_378_137.000,
    b: 6_356_752.314_140,
};

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

// WGS84 -> OSGB36 Helmert parameters (metres, ppm, arc seconds).
const TX: f64 = -446.448;
const TY: f64 = 125.157;
const TZ: f64 = -542.060;
const S_PPM: f64 = 20.4894;
const RX_SEC: f64 = -0.1502;
const RY_SEC: f64 = -0.2470;
const RZ_SEC: f64 = -0.8421;

// National Grid projection.
const F0: f64 = 0.999_601_271_7;
const LAT0_DEG: f64 = 49.0;
const LON0_DEG: f64 = -2.0;
const N0: f64 = -100_000.0;
const E0: f64 = 400_000.0;

/// Converts a WGS84 latitude/longitude (degrees) to BNG easting/northing.
#[must_use]
pub fn from_wgs84(lat: f64, lng: f64) -> ProjectedCoord {
    let (lat36, lng36) = wgs84_to_osgb36(lat, lng);
    project_osgb36(lat36, lng36)
}

/// Converts a BNG easting/northing back to WGS84 latitude/longitude.
#[must_use]
pub fn to_wgs84(easting: f64, northing: f64) -> Coord {
    let (lat36, lng36) = unproject_osgb36(easting, northing);
    let (lat, lng) = helmert(&AIRY_1830, &GRS80, lat36, lng36, -1.0);
    Coord::new(lat, lng)
}

/// Meridional arc from the true origin to latitude `phi` (radians).
fn meridional_arc(phi: f64) -> f64 {
    let Ellipsoid { a, b } = AIRY_1830;
    let phi0 = LAT0_DEG.to_radians();
    let n = (a - b) / (a + b);
    let n2 = n * n;
    let n3 = n2 * n;

    let d_phi = phi - phi0;
    let s_phi = phi + phi0;
    b * F0
        * ((1.0 + n + 1.25 * n2 + 1.25 * n3) * d_phi
            - (3.0 * n + 3.0 * n2 + 2.625 * n3) * d_phi.sin() * s_phi.cos()
            + (1.875 * n2 + 1.875 * n3) * (2.0 * d_phi).sin() * (2.0 * s_phi).cos()
            - (35.0 / 24.0) * n3 * (3.0 * d_phi).sin() * (3.0 * s_phi).cos())
}

/// Projects an OSGB36 latitude/longitude (degrees) onto the National Grid.
#[must_use]
#[allow(clippy::many_single_char_names, clippy::similar_names)]
pub fn project_osgb36(lat: f64, lng: f64) -> ProjectedCoord {
    let a = AIRY_1830.a;
    let e2 = AIRY_1830.e2();

    let phi = lat.to_radians();
    let lambda = lng.to_radians();
    let lambda0 = LON0_DEG.to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();
    let tan2 = tan_phi * tan_phi;
    let tan4 = tan2 * tan2;

    let denom = 1.0 - e2 * sin_phi * sin_phi;
    let nu = a * F0 / denom.sqrt();
    let rho = a * F0 * (1.0 - e2) / denom.powf(1.5);
    let eta2 = nu / rho - 1.0;

    let m = meridional_arc(phi);

    let cos3 = cos_phi.powi(3);
    let cos5 = cos_phi.powi(5);

    let i = m + N0;
    let ii = nu / 2.0 * sin_phi * cos_phi;
    let iii = nu / 24.0 * sin_phi * cos3 * (5.0 - tan2 + 9.0 * eta2);
    let iii_a = nu / 720.0 * sin_phi * cos5 * (61.0 - 58.0 * tan2 + tan4);
    let iv = nu * cos_phi;
    let v = nu / 6.0 * cos3 * (nu / rho - tan2);
    let vi = nu / 120.0 * cos5 * (5.0 - 18.0 * tan2 + tan4 + 14.0 * eta2 - 58.0 * tan2 * eta2);

    let dl = lambda - lambda0;
    let dl2 = dl * dl;

    let northing = i + ii * dl2 + iii * dl2 * dl2 + iii_a * dl2 * dl2 * dl2;
    let easting = E0 + iv * dl + v * dl2 * dl + vi * dl2 * dl2 * dl;

    ProjectedCoord::new(easting, northing)
}

/// Inverse of [`project_osgb36`]: OSGB36 latitude/longitude in degrees.
#[allow(clippy::many_single_char_names, clippy::similar_names)]
fn unproject_osgb36(easting: f64, northing: f64) -> (f64, f64) {
    let a = AIRY_1830.a;
    let e2 = AIRY_1830.e2();
    let lambda0 = LON0_DEG.to_radians();

    let mut phi = LAT0_DEG.to_radians();
    let mut m = 0.0;
    for _ in 0..20 {
        phi += (northing - N0 - m) / (a * F0);
        m = meridional_arc(phi);
        if (northing - N0 - m).abs() < 1e-5 {
            break;
        }
    }

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();
    let tan2 = tan_phi * tan_phi;
    let tan4 = tan2 * tan2;
    let tan6 = tan4 * tan2;

    let denom = 1.0 - e2 * sin_phi * sin_phi;
    let nu = a * F0 / denom.sqrt();
    let rho = a * F0 * (1.0 - e2) / denom.powf(1.5);
    let eta2 = nu / rho - 1.0;
    let sec_phi = 1.0 / cos_phi;

    let vii = tan_phi / (2.0 * rho * nu);
    let viii = tan_phi / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * tan2 + eta2 - 9.0 * tan2 * eta2);
    let ix = tan_phi / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * tan2 + 45.0 * tan4);
    let x = sec_phi / nu;
    let xi = sec_phi / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * tan2);
    let xii = sec_phi / (120.0 * nu.powi(5)) * (5.0 + 28.0 * tan2 + 24.0 * tan4);
    let xii_a =
        sec_phi / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * tan2 + 1320.0 * tan4 + 720.0 * tan6);

    let de = easting - E0;
    let de2 = de * de;
    let de3 = de2 * de;
    let de5 = de3 * de2;

    let lat = phi - vii * de2 + viii * de2 * de2 - ix * de3 * de3;
    let lng = lambda0 + x * de - xi * de3 + xii * de5 - xii_a * de5 * de2;
    (lat.to_degrees(), lng.to_degrees())
}

fn wgs84_to_osgb36(lat: f64, lng: f64) -> (f64, f64) {
    helmert(&GRS80, &AIRY_1830, lat, lng, 1.0)
}

/// Shifts a latitude/longitude between datums. `sign` is `1.0` for
/// WGS84 to OSGB36 and `-1.0` for the reverse.
fn helmert(from: &Ellipsoid, to: &Ellipsoid, lat: f64, lng: f64, sign: f64) -> (f64, f64) {
    let (x, y, z) = to_cartesian(from, lat.to_radians(), lng.to_radians());

    let s = sign * S_PPM * 1e-6;
    let rx = sign * (RX_SEC / 3600.0).to_radians();
    let ry = sign * (RY_SEC / 3600.0).to_radians();
    let rz = sign * (RZ_SEC / 3600.0).to_radians();

    let x2 = sign * TX + (1.0 + s) * x - rz * y + ry * z;
    let y2 = sign * TY + rz * x + (1.0 + s) * y - rx * z;
    let z2 = sign * TZ - ry * x + rx * y + (1.0 + s) * z;

    let (phi, lambda) = from_cartesian(to, x2, y2, z2);
    (phi.to_degrees(), lambda.to_degrees())
}

fn to_cartesian(ellipsoid: &Ellipsoid, phi: f64, lambda: f64) -> (f64, f64, f64) {
    let e2 = ellipsoid.e2();
    let nu = ellipsoid.a / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    (
        nu * phi.cos() * lambda.cos(),
        nu * phi.cos() * lambda.sin(),
        (1.0 - e2) * nu * phi.sin(),
    )
}

fn from_cartesian(ellipsoid: &Ellipsoid, x: f64, y: f64, z: f64) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let p = x.hypot(y);
    let mut phi = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let nu = ellipsoid.a / (1.0 - e2 * phi.sin().powi(2)).sqrt();
        let next = (e2 * nu).mul_add(phi.sin(), z).atan2(p);
        if (next - phi).abs() < 1e-12 {
            phi = next;
            break;
        }
        phi = next;
    }
    (phi, y.atan2(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dms(deg: f64, min: f64, sec: f64) -> f64 {
        deg + min / 60.0 + sec / 3600.0
    }

    #[test]
    fn projects_ordnance_survey_worked_example() {
        // 52°39'27.2531"N 1°43'4.5177"E (OSGB36)
        let projected = project_osgb36(dms(52.0, 39.0, 27.2531), dms(1.0, 43.0, 4.5177));
        assert!((projected.x - 651_409.903).abs() < 0.01, "{}", projected.x);
        assert!((projected.y - 313_177.270).abs() < 0.01, "{}", projected.y);
    }

    #[test]
    fn unprojects_ordnance_survey_worked_example() {
        let (lat, lng) = unproject_osgb36(651_409.903, 313_177.270);
        assert!((lat - dms(52.0, 39.0, 27.2531)).abs() < 1e-6, "{lat}");
        assert!((lng - dms(1.0, 43.0, 4.5177)).abs() < 1e-6, "{lng}");
    }

    #[test]
    fn grid_reference_converts_back_to_the_same_place() {
        for (lat, lng) in [(52.33, -0.18), (51.5, -0.12), (55.95, -3.19), (50.1, -5.5)] {
            let grid = from_wgs84(lat, lng);
            let back = to_wgs84(grid.x, grid.y);
            // Reversing the shift by sign is good to well under a metre.
            assert!((back.lat - lat).abs() < 1e-5, "{lat} came back as {}", back.lat);
            assert!((back.lng - lng).abs() < 1e-5, "{lng} came back as {}", back.lng);
        }
    }

    #[test]
    fn true_origin_maps_to_false_origin() {
        let projected = project_osgb36(LAT0_DEG, LON0_DEG);
        assert!((projected.x - E0).abs() < 1e-6);
        assert!((projected.y - N0).abs() < 1e-6);
    }

    #[test]
    fn datum_shift_stays_within_expected_range() {
        for (lat, lng) in [(52.33, -0.18), (51.5, -0.12), (55.95, -3.19)] {
            let shifted = from_wgs84(lat, lng);
            let unshifted = project_osgb36(lat, lng);
            let distance = (shifted.x - unshifted.x).hypot(shifted.y - unshifted.y);
            assert!(
                (50.0..200.0).contains(&distance),
                "datum shift at ({lat}, {lng}) was {distance}m"
            );
        }
    }
}
