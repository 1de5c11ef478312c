/// Helpers for moving sonar polar fixes into a local east/north frame.
pub struct GeometryHelper;

impl GeometryHelper {
    /// Converts a fix measured inside the sensor sector into platform-local
    /// east/north metres.
    ///
    /// `sector_angle_deg` runs from 0 to `fov_deg` across the sonar face; the
    /// centre of the sector looks along `heading_deg` (degrees clockwise from
    /// north).
    pub fn sector_to_cartesian(
        range_m: f64,
        sector_angle_deg: f64,
        heading_deg: f64,
        fov_deg: f64,
    ) -> (f64, f64) {
        let bearing = (heading_deg + sector_angle_deg - fov_deg / 2.0).to_radians();
        (range_m * bearing.sin(), range_m * bearing.cos())
    }

    /// East/north components of a vector given as magnitude and heading in
    /// radians clockwise from north.
    pub fn heading_vector(magnitude: f64, heading_rad: f64) -> (f64, f64) {
        (magnitude * heading_rad.sin(), magnitude * heading_rad.cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sector_centre_points_along_heading() {
        let (east, north) = GeometryHelper::sector_to_cartesian(10.0, 60.0, 0.0, 120.0);
        assert!(close(east, 0.0));
        assert!(close(north, 10.0));

        let (east, north) = GeometryHelper::sector_to_cartesian(10.0, 60.0, 90.0, 120.0);
        assert!(close(east, 10.0));
        assert!(close(north, 0.0));
    }

    #[test]
    fn heading_vector_is_clockwise_from_north() {
        let (east, north) = GeometryHelper::heading_vector(2.0, std::f64::consts::FRAC_PI_2);
        assert!(close(east, 2.0));
        assert!(close(north, 0.0));
    }
}
