use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Ordinal outbreak risk category
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString,
    Display, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    /// Number of categories
    pub const COUNT: usize = 3;

    /// All categories in ascending order
    pub const ALL: [RiskCategory; 3] = [RiskCategory::Low, RiskCategory::Medium, RiskCategory::High];

    /// Class index used by the classifier (0 = Low)
    pub fn index(&self) -> usize {
        match self {
            RiskCategory::Low => 0,
            RiskCategory::Medium => 1,
            RiskCategory::High => 2,
        }
    }

    /// Inverse of [`RiskCategory::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(RiskCategory::Low),
            1 => Some(RiskCategory::Medium),
            2 => Some(RiskCategory::High),
            _ => None,
        }
    }
}

/// Likelihood cut points separating the risk categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskThresholds {
    /// Lowest likelihood that counts as Medium
    pub medium: f64,

    /// Lowest likelihood that counts as High
    pub high: f64,
}

impl RiskThresholds {
    pub fn new(medium: f64, high: f64) -> Result<Self> {
        let thresholds = Self { medium, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Validate ordering and finiteness
    pub fn validate(&self) -> Result<()> {
        if !self.medium.is_finite() || !self.high.is_finite() {
            return Err(AppError::Configuration(
                "risk thresholds must be finite".to_string(),
            ));
        }

        if self.medium < 0.0 {
            return Err(AppError::Configuration(
                "medium risk threshold must be non-negative".to_string(),
            ));
        }

        if self.medium >= self.high {
            return Err(AppError::Configuration(format!(
                "medium threshold ({}) must be below high threshold ({})",
                self.medium, self.high
            )));
        }

        Ok(())
    }

    /// Map a likelihood onto a category. Non-finite input counts as Low.
    pub fn categorize(&self, likelihood: f64) -> RiskCategory {
        if !likelihood.is_finite() || likelihood < self.medium {
            RiskCategory::Low
        } else if likelihood < self.high {
            RiskCategory::Medium
        } else {
            RiskCategory::High
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 1.0,
            high: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_category_ordering() {
        assert!(RiskCategory::Low < RiskCategory::Medium);
        assert!(RiskCategory::Medium < RiskCategory::High);
        assert_eq!(RiskCategory::iter().count(), RiskCategory::COUNT);
    }

    #[test]
    fn test_index_round_trip() {
        for category in RiskCategory::ALL {
            assert_eq!(RiskCategory::from_index(category.index()), Some(category));
        }
        assert_eq!(RiskCategory::from_index(3), None);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(RiskCategory::from_str("high").unwrap(), RiskCategory::High);
        assert_eq!(RiskCategory::from_str("Medium").unwrap(), RiskCategory::Medium);
        assert!(RiskCategory::from_str("severe").is_err());
        assert_eq!(RiskCategory::Low.to_string(), "Low");
    }

    #[test]
    fn test_categorize_boundaries() {
        let thresholds = RiskThresholds::new(1.0, 5.0).unwrap();
        assert_eq!(thresholds.categorize(0.0), RiskCategory::Low);
        assert_eq!(thresholds.categorize(0.99), RiskCategory::Low);
        assert_eq!(thresholds.categorize(1.0), RiskCategory::Medium);
        assert_eq!(thresholds.categorize(4.99), RiskCategory::Medium);
        assert_eq!(thresholds.categorize(5.0), RiskCategory::High);
        assert_eq!(thresholds.categorize(f64::NAN), RiskCategory::Low);
    }

    #[test]
    fn test_categorize_is_monotonic() {
        let thresholds = RiskThresholds::default();
        let mut previous = RiskCategory::Low;
        for step in 0..200 {
            let category = thresholds.categorize(step as f64 * 0.05);
            assert!(category >= previous);
            previous = category;
        }
        assert_eq!(previous, RiskCategory::High);
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(RiskThresholds::new(5.0, 5.0).is_err());
        assert!(RiskThresholds::new(6.0, 5.0).is_err());
        assert!(RiskThresholds::new(-1.0, 5.0).is_err());
        assert!(RiskThresholds::new(1.0, f64::INFINITY).is_err());
    }
}
