//! Probabilistic context tags for synthetic metrics.

use rand::Rng;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Draws strictly below this value are tagged as training.
const TRAINING_BELOW: f64 = 0.3;
/// Draws strictly above this value are tagged as testing.
const TESTING_ABOVE: f64 = 0.6;

/// The context a metric sample was recorded in.
///
/// On the wire this is an object with a `type` key, or an empty object for [`MetricContext::None`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricContext {
    /// `{"type": "training"}`
    Training,
    /// `{"type": "testing"}`
    Testing,
    /// `{}`
    None,
}

impl MetricContext {
    /// Samples a context with an expected distribution of 30% training, 40% testing and 30% none.
    ///
    /// Only `[0.3, 0.6]` maps to none, so testing gets the wider upper band.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_draw(rng.random::<f64>())
    }

    /// Maps a uniform draw in `[0, 1)` to a context.
    ///
    /// Both thresholds are exclusive, so `0.3` and `0.6` themselves map to [`MetricContext::None`].
    pub fn from_draw(draw: f64) -> Self {
        if draw < TRAINING_BELOW {
            MetricContext::Training
        } else if draw > TESTING_ABOVE {
            MetricContext::Testing
        } else {
            MetricContext::None
        }
    }

    /// The value of the `type` key, if any.
    pub fn as_type(self) -> Option<&'static str> {
        match self {
            MetricContext::Training => Some("training"),
            MetricContext::Testing => Some("testing"),
            MetricContext::None => None,
        }
    }
}

impl Serialize for MetricContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_type() {
            Some(ty) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", ty)?;
                map.end()
            }
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}
