//! Serving input schema
//!
//! The model server accepts exactly one feature vector layout. Artifacts
//! declare the features they were trained on and are rejected on reload
//! unless that list matches this schema name-for-name and in order.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Feature columns in serving order
pub const FEATURE_NAMES: [&str; 5] = [
    "trip_distance",
    "PULocationID",
    "DOLocationID",
    "hour",
    "day_of_week",
];

/// Regression target column
pub const TARGET_COLUMN: &str = "fare_amount";

/// Pickup timestamp column used to derive `hour` and `day_of_week`
pub const PICKUP_COLUMN: &str = "tpep_pickup_datetime";

/// Ordered list of feature names a model must consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema from an ordered list of feature names.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The fare-prediction serving schema.
    #[must_use]
    pub fn fare() -> Self {
        Self::new(FEATURE_NAMES)
    }

    /// Feature names in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if the schema has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Exact, order-sensitive comparison against an artifact's feature list.
    #[must_use]
    pub fn matches(&self, features: &[String]) -> bool {
        self.names.as_slice() == features
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::fare()
    }
}

/// One prediction request in the fixed serving layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareFeatures {
    /// Trip distance in miles
    pub trip_distance: f64,
    /// Pickup taxi zone
    #[serde(rename = "PULocationID")]
    pub pickup_zone: i64,
    /// Dropoff taxi zone
    #[serde(rename = "DOLocationID")]
    pub dropoff_zone: i64,
    /// Hour of day, 0-23
    pub hour: i64,
    /// Day of week, 0 = Monday .. 6 = Sunday
    pub day_of_week: i64,
}

impl FareFeatures {
    /// Check value ranges before inference.
    ///
    /// # Errors
    ///
    /// Returns `Error::InferenceError` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.trip_distance.is_finite() || self.trip_distance < 0.0 {
            return Err(Error::InferenceError(format!(
                "trip_distance must be a non-negative finite number, got {}",
                self.trip_distance
            )));
        }
        if !(0..=23).contains(&self.hour) {
            return Err(Error::InferenceError(format!(
                "hour must be in 0..=23, got {}",
                self.hour
            )));
        }
        if !(0..=6).contains(&self.day_of_week) {
            return Err(Error::InferenceError(format!(
                "day_of_week must be in 0..=6, got {}",
                self.day_of_week
            )));
        }
        Ok(())
    }

    /// Feature values in [`FEATURE_NAMES`] order.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_vector(&self) -> [f64; 5] {
        [
            self.trip_distance,
            self.pickup_zone as f64,
            self.dropoff_zone as f64,
            self.hour as f64,
            self.day_of_week as f64,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ride() -> FareFeatures {
        FareFeatures {
            trip_distance: 3.2,
            pickup_zone: 132,
            dropoff_zone: 230,
            hour: 17,
            day_of_week: 4,
        }
    }

    #[test]
    fn test_fare_schema_order() {
        let schema = FeatureSchema::fare();
        assert_eq!(schema.len(), 5);
        assert_eq!(schema.names()[0], "trip_distance");
        assert_eq!(schema.names()[4], "day_of_week");
    }

    #[test]
    fn test_schema_matches_is_order_sensitive() {
        let schema = FeatureSchema::fare();
        let mut names: Vec<String> = FEATURE_NAMES.iter().map(ToString::to_string).collect();
        assert!(schema.matches(&names));

        names.swap(0, 1);
        assert!(!schema.matches(&names));

        names.swap(0, 1);
        names.pop();
        assert!(!schema.matches(&names));
    }

    #[test]
    fn test_features_deserialize_wire_names() {
        let json = r#"{"trip_distance": 3.2, "PULocationID": 132, "DOLocationID": 230, "hour": 17, "day_of_week": 4}"#;
        let parsed: FareFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, ride());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(ride().validate().is_ok());

        let bad_hour = FareFeatures { hour: 24, ..ride() };
        let err = bad_hour.validate().unwrap_err();
        assert!(matches!(err, Error::InferenceError(_)));
        assert!(err.to_string().contains("hour"));

        let bad_day = FareFeatures { day_of_week: -1, ..ride() };
        assert!(bad_day.validate().is_err());

        let bad_distance = FareFeatures { trip_distance: f64::NAN, ..ride() };
        assert!(bad_distance.validate().is_err());
    }

    #[test]
    fn test_to_vector_order() {
        assert_eq!(ride().to_vector(), [3.2, 132.0, 230.0, 17.0, 4.0]);
    }
}
