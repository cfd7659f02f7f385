/// Feature engineering for the risk classifier
///
/// - Calendar features with cyclic encodings and a dry/rainy season flag
/// - Gap-filled weather with trailing means and standard deviations
/// - Mosquito temperature and breeding-condition indicators with lags
/// - Mutual-information feature selection

pub mod builder;
pub mod rolling;
pub mod selection;
pub mod temporal;

pub use builder::{FeatureBuilder, FeatureMatrix, FeatureRow};
pub use selection::{mutual_information, FeatureScore, MutualInfoSelector};
pub use temporal::Season;
