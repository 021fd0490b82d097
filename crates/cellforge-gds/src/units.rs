//! GDSII physical units: a DB unit is dimensionless inside
//! `cellforge-core`; this codec is where it is given a scale.

/// Database and user unit sizes in meters, as carried in a GDSII
/// stream's `UNITS` record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GdsUnits {
    pub db_unit_meters: f64,
    pub user_unit_meters: f64,
}

impl Default for GdsUnits {
    /// 1 DB unit = 1 nm, 1 user unit = 1 µm.
    fn default() -> Self {
        Self {
            db_unit_meters: 1e-9,
            user_unit_meters: 1e-6,
        }
    }
}

impl GdsUnits {
    /// `gds21`'s own unit representation is `(user units per DB unit,
    /// DB unit size in meters)`.
    pub(crate) fn to_gds21(self) -> gds21::GdsUnits {
        gds21::GdsUnits::new(self.user_unit_meters / self.db_unit_meters, self.db_unit_meters)
    }

    pub(crate) fn from_gds21(units: gds21::GdsUnits) -> Self {
        let db_unit_meters = units.db_unit();
        Self {
            db_unit_meters,
            user_unit_meters: units.user_unit() * db_unit_meters,
        }
    }
}
