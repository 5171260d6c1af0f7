// src/dedup.rs
//! Duplicate detection over the active working set.
//!
//! Distance is a planar approximation (`sqrt(dlat^2 + dlng^2) * 111 km`), only meaningful
//! at city scale near the deployment. Setting `reference_latitude` scales the longitude
//! delta by `cos(reference_latitude)`; leaving it unset keeps the uncorrected formula.
//!
//! The scan takes no lock: two concurrent submissions for the same new place can both
//! pass and both be stored.

use crate::incident::{GeoPoint, Incident, IncidentType};

pub const METERS_PER_DEGREE: f64 = 111_000.0;
pub const DEFAULT_RADIUS_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateDetector {
    radius_m: f64,
    lng_scale: f64,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_M, None)
    }
}

/// Nearest same-type active incident inside the radius.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub existing: Incident,
    pub distance_m: f64,
}

impl DuplicateDetector {
    /// `radius_m` <= 0 falls back to the default radius.
    pub fn new(radius_m: f64, reference_latitude: Option<f64>) -> Self {
        let radius_m = if radius_m.is_finite() && radius_m > 0.0 {
            radius_m
        } else {
            DEFAULT_RADIUS_M
        };
        let lng_scale = reference_latitude
            .filter(|lat| lat.is_finite() && (-90.0..=90.0).contains(lat))
            .map(|lat| lat.to_radians().cos())
            .unwrap_or(1.0);
        Self { radius_m, lng_scale }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn distance_m(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        let dlat = (a.latitude - b.latitude).abs();
        let dlng = (a.longitude - b.longitude).abs() * self.lng_scale;
        (dlat * dlat + dlng * dlng).sqrt() * METERS_PER_DEGREE
    }

    /// Returns the nearest match strictly inside the radius. A candidate without a
    /// location is never deduplicated; active incidents without a location are skipped.
    pub fn find_duplicate(
        &self,
        candidate_type: IncidentType,
        candidate_location: Option<GeoPoint>,
        active: &[Incident],
    ) -> Option<DuplicateMatch> {
        let here = candidate_location?;

        active
            .iter()
            .filter(|inc| inc.incident_type == candidate_type && !inc.archived)
            .filter_map(|inc| inc.location.map(|loc| (inc, self.distance_m(here, loc))))
            .filter(|(_, d)| *d < self.radius_m)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(inc, d)| DuplicateMatch {
                existing: inc.clone(),
                distance_m: d,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{NewIncident, Source, Urgency};
    use chrono::Utc;
    use uuid::Uuid;

    fn active(t: IncidentType, loc: Option<(f64, f64)>) -> Incident {
        NewIncident {
            incident_type: t,
            confidence: 0.9,
            urgency: Urgency::High,
            description: "x".into(),
            location: loc.map(|(a, b)| GeoPoint::new(a, b)),
            location_text: None,
            people_affected: 0,
            evidence_ref: None,
            source: Source::Image,
            source_detail: None,
            analysis_degraded: false,
        }
        .into_incident(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn nearby_same_type_is_duplicate() {
        let det = DuplicateDetector::default();
        let existing = active(IncidentType::Fire, Some((25.2048, 55.2708)));
        let m = det
            .find_duplicate(
                IncidentType::Fire,
                Some(GeoPoint::new(25.2049, 55.2709)),
                std::slice::from_ref(&existing),
            )
            .expect("duplicate");
        assert_eq!(m.existing.id, existing.id);
        assert!(m.distance_m < 100.0);
        assert!((m.distance_m - 15.7).abs() < 0.1, "got {}", m.distance_m);
    }

    #[test]
    fn far_away_or_other_type_is_not_duplicate() {
        let det = DuplicateDetector::default();
        let set = vec![
            active(IncidentType::Fire, Some((25.2048, 55.2708))),
            active(IncidentType::Flood, Some((25.30, 55.40))),
        ];
        assert!(det
            .find_duplicate(IncidentType::Fire, Some(GeoPoint::new(25.30, 55.40)), &set)
            .is_none());
    }

    #[test]
    fn missing_locations_skip_the_check() {
        let det = DuplicateDetector::default();
        let set = vec![
            active(IncidentType::Fire, None),
            active(IncidentType::Fire, Some((25.2048, 55.2708))),
        ];
        assert!(det.find_duplicate(IncidentType::Fire, None, &set).is_none());
        let m = det
            .find_duplicate(IncidentType::Fire, Some(GeoPoint::new(25.2048, 55.2708)), &set)
            .unwrap();
        assert_eq!(m.existing.id, set[1].id);
    }

    #[test]
    fn nearest_match_wins() {
        let det = DuplicateDetector::default();
        let far = active(IncidentType::Smoke, Some((25.2050, 55.2710)));
        let near = active(IncidentType::Smoke, Some((25.20481, 55.27081)));
        let set = vec![far, near.clone()];
        let m = det
            .find_duplicate(IncidentType::Smoke, Some(GeoPoint::new(25.2048, 55.2708)), &set)
            .unwrap();
        assert_eq!(m.existing.id, near.id);
    }

    #[test]
    fn radius_boundary() {
        let det = DuplicateDetector::new(100.0, None);
        let existing = active(IncidentType::Flood, Some((0.0, 0.0)));
        let inside = GeoPoint::new(99.5 / METERS_PER_DEGREE, 0.0);
        let outside = GeoPoint::new(100.5 / METERS_PER_DEGREE, 0.0);
        let set = [existing];
        assert!(det.find_duplicate(IncidentType::Flood, Some(inside), &set).is_some());
        assert!(det.find_duplicate(IncidentType::Flood, Some(outside), &set).is_none());
    }

    #[test]
    fn reference_latitude_shrinks_longitude_distance() {
        let plain = DuplicateDetector::new(100.0, None);
        let corrected = DuplicateDetector::new(100.0, Some(60.0));
        let a = GeoPoint::new(60.0, 10.0);
        let b = GeoPoint::new(60.0, 10.001);
        let d_plain = plain.distance_m(a, b);
        let d_corr = corrected.distance_m(a, b);
        assert!((d_corr - d_plain * 0.5).abs() < 0.01);
    }
}
