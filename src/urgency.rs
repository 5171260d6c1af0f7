//! # Urgency Classifier
//! Pure mapping `(confidence, type, people_affected)` → [`Urgency`].
//! No I/O. Computed once at creation and stored with the incident.

use crate::incident::{IncidentType, Urgency};

/// Minimum confidence for `high` (only for the types in [`HIGH_URGENCY_TYPES`]).
pub const HIGH_CONFIDENCE: f64 = 0.85;
/// Minimum confidence for `medium`.
pub const MEDIUM_CONFIDENCE: f64 = 0.70;
/// More than this many affected people is at least `medium`.
pub const MEDIUM_PEOPLE_AFFECTED: u32 = 10;

pub const HIGH_URGENCY_TYPES: [IncidentType; 3] = [
    IncidentType::Fire,
    IncidentType::Flood,
    IncidentType::CollapsedBuilding,
];

pub fn classify(confidence: f64, incident_type: IncidentType, people_affected: u32) -> Urgency {
    if confidence >= HIGH_CONFIDENCE && HIGH_URGENCY_TYPES.contains(&incident_type) {
        Urgency::High
    } else if confidence >= MEDIUM_CONFIDENCE || people_affected > MEDIUM_PEOPLE_AFFECTED {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_cases() {
        assert_eq!(classify(0.9, IncidentType::Fire, 0), Urgency::High);
        assert_eq!(classify(0.75, IncidentType::Flood, 0), Urgency::Medium);
        assert_eq!(classify(0.5, IncidentType::MedicalEmergency, 2), Urgency::Low);
        assert_eq!(classify(0.6, IncidentType::Fire, 12), Urgency::Medium);
    }

    #[test]
    fn boundaries_are_inclusive_for_confidence_exclusive_for_people() {
        assert_eq!(classify(0.85, IncidentType::CollapsedBuilding, 0), Urgency::High);
        assert_eq!(classify(0.70, IncidentType::Smoke, 0), Urgency::Medium);
        assert_eq!(classify(0.69, IncidentType::Smoke, 10), Urgency::Low);
        assert_eq!(classify(0.69, IncidentType::Smoke, 11), Urgency::Medium);
    }

    #[test]
    fn high_confidence_outside_type_set_caps_at_medium() {
        assert_eq!(classify(0.99, IncidentType::PeopleInDanger, 50), Urgency::Medium);
        assert_eq!(classify(0.99, IncidentType::Unknown, 0), Urgency::Medium);
    }

    #[test]
    fn deterministic_across_calls() {
        let first = classify(0.8123, IncidentType::Flood, 7);
        for _ in 0..100 {
            assert_eq!(classify(0.8123, IncidentType::Flood, 7), first);
        }
    }
}
