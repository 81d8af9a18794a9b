quantity!(KilowattHourRate, "€/kWh");

impl KilowattHourRate {
    /// Normalize a reported price to euros per kilowatt-hour.
    ///
    /// The unit is matched by case-insensitive substrings; the combined cents-per-megawatt-hour
    /// forms have to be recognized before the plain cents forms. A missing or unrecognized unit
    /// is taken as already being in euros per kilowatt-hour.
    #[must_use]
    pub fn from_unit(value: f64, unit: Option<&str>) -> Self {
        let Some(unit) = unit else {
            return Self(value);
        };
        let unit = unit.to_lowercase();
        let cents = unit.contains("c€") || unit.contains("cent") || unit.contains('¢');
        let megawatt_hours = unit.contains("mwh");
        if cents && megawatt_hours {
            Self(value / 100_000.0)
        } else if cents {
            Self(value / 100.0)
        } else if unit.contains("eur/mwh") || unit.contains("€/mwh") {
            Self(value / 1000.0)
        } else {
            Self(value)
        }
    }
}
