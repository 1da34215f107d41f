use crate::boundary::MunicipalityBoundary;
use crate::models::ListingRecord;
use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::Coord;
use tracing::debug;

#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub retained: Vec<ListingRecord>,
    /// Valid coordinates, but outside the boundary.
    pub outside: usize,
    /// Missing or out-of-range coordinates.
    pub invalid: usize,
}

impl FilterOutcome {
    pub fn rejected(&self) -> usize {
        self.outside + self.invalid
    }
}

/// Keep records whose location lies inside the boundary or on its edge.
pub fn filter_within(records: Vec<ListingRecord>, boundary: &MunicipalityBoundary) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for record in records {
        match record.coordinates.filter(|c| c.is_valid()) {
            None => outcome.invalid += 1,
            Some(c) => {
                let position = boundary.geometry.coordinate_position(&Coord { x: c.lon, y: c.lat });
                if position != CoordPos::Outside {
                    outcome.retained.push(record);
                } else {
                    outcome.outside += 1;
                }
            }
        }
    }

    if outcome.rejected() > 0 {
        debug!(
            "Filtered out {} listings outside {} and {} without valid coordinates",
            outcome.outside, boundary.name, outcome.invalid
        );
    }
    outcome
}
