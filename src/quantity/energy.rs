use std::ops::Mul;

use crate::quantity::{cost::Euros, rate::KilowattHourRate};

quantity!(WattHours, "Wh");
quantity!(KilowattHours, "kWh");

impl From<KilowattHours> for WattHours {
    fn from(energy: KilowattHours) -> Self {
        Self(energy.0 * 1000.0)
    }
}

impl Mul<KilowattHourRate> for WattHours {
    type Output = Euros;

    /// The thousand folds the watt-hour basis back onto the per-kilowatt-hour rate.
    fn mul(self, rate: KilowattHourRate) -> Self::Output {
        Euros(self.0 * rate.0 / 1000.0)
    }
}
