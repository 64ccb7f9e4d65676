use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter};

/// Canonical telemetry fields known to the ground station.
///
/// The string form of each variant is the canonical name used as the key
/// everywhere downstream of the parser (labels, CSV headers, plots).
#[derive(AsRefStr, Display, EnumIter, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    #[strum(serialize = "Vref")]
    Vref,
    #[strum(serialize = "Vout")]
    Vout,
    #[strum(serialize = "Avg Altitude")]
    AvgAltitude,
    #[strum(serialize = "Avg Velocity")]
    AvgVelocity,
    #[strum(serialize = "AirBreakSTS")]
    AirBrakeStatus,
    #[strum(serialize = "RecSTS")]
    RecoveryStatus,
    #[strum(serialize = "BatSTS")]
    BatteryStatus,
}

impl Field {
    pub fn all() -> Vec<Field> {
        Field::iter().collect()
    }

    /// Fields shown on the main flight tab, in display order.
    pub fn dashboard_fields() -> [Field; 5] {
        [
            Field::AvgAltitude,
            Field::AvgVelocity,
            Field::AirBrakeStatus,
            Field::RecoveryStatus,
            Field::BatteryStatus,
        ]
    }

    /// Translate a wire label into its canonical field.
    ///
    /// Matching ignores case and collapses runs of whitespace, so
    /// `"Average  altitude"` and `"Average Altitude"` are the same label.
    pub fn from_label(label: &str) -> Option<Field> {
        let normalized = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();

        match normalized.as_str() {
            "vref" => Some(Field::Vref),
            "vout" => Some(Field::Vout),
            "average altitude" | "avg altitude" | "altitude" => Some(Field::AvgAltitude),
            "average velocity" | "avg velocity" | "velocity" => Some(Field::AvgVelocity),
            "air brake status" | "airbrake status" | "airbreaksts" | "airbrakests" => {
                Some(Field::AirBrakeStatus)
            }
            "recovery status" | "recsts" => Some(Field::RecoveryStatus),
            "battery status" | "batsts" => Some(Field::BatteryStatus),
            _ => None,
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Field::Vref | Field::Vout => Some("V"),
            Field::AvgAltitude => Some("m"),
            Field::AvgVelocity => Some("m/s"),
            Field::AirBrakeStatus | Field::RecoveryStatus | Field::BatteryStatus => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        assert_eq!(Field::AvgAltitude.as_ref(), "Avg Altitude");
        assert_eq!(Field::AirBrakeStatus.to_string(), "AirBreakSTS");
        assert_eq!(Field::all().len(), 7);
    }

    #[test]
    fn label_translation() {
        assert_eq!(Field::from_label("Average Altitude"), Some(Field::AvgAltitude));
        assert_eq!(Field::from_label("  average   ALTITUDE "), Some(Field::AvgAltitude));
        assert_eq!(Field::from_label("Vref"), Some(Field::Vref));
        assert_eq!(Field::from_label("RecSTS"), Some(Field::RecoveryStatus));
        assert_eq!(Field::from_label("Battery Status"), Some(Field::BatteryStatus));
        assert_eq!(Field::from_label("Temperature"), None);
    }

    #[test]
    fn every_canonical_name_round_trips_through_labels() {
        for field in Field::iter() {
            assert_eq!(Field::from_label(field.as_ref()), Some(field));
        }
    }
}
