use crate::float_trait::Float;

use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Score of a single box model
///
/// `depth` is the difference of mean out-of-transit and in-transit fluxes, `depth_ivar` is its
/// inverse variance
#[enum_dispatch]
pub trait BlsObjectiveTrait: Send + Sync + Clone + Debug {
    fn score<T: Float>(&self, depth: T, depth_ivar: T) -> T;
}

/// Quantity maximized by the box periodogram
#[enum_dispatch(BlsObjectiveTrait)]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum BlsObjective {
    Likelihood(LikelihoodObjective),
    Snr(SnrObjective),
}

impl Default for BlsObjective {
    fn default() -> Self {
        Self::Likelihood(LikelihoodObjective)
    }
}

impl BlsObjective {
    pub fn likelihood() -> Self {
        Self::Likelihood(LikelihoodObjective)
    }

    pub fn snr() -> Self {
        Self::Snr(SnrObjective)
    }
}

/// Log-likelihood gain of the box model over a constant, $\frac12 \delta^2 / \sigma_\delta^2$
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename = "Likelihood")]
pub struct LikelihoodObjective;

impl BlsObjectiveTrait for LikelihoodObjective {
    #[inline]
    fn score<T: Float>(&self, depth: T, depth_ivar: T) -> T {
        T::half() * depth.powi(2) * depth_ivar
    }
}

/// Signal-to-noise ratio of the depth, $\delta / \sigma_\delta$
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename = "Snr")]
pub struct SnrObjective;

impl BlsObjectiveTrait for SnrObjective {
    #[inline]
    fn score<T: Float>(&self, depth: T, depth_ivar: T) -> T {
        depth * depth_ivar.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn scores() {
        assert_relative_eq!(BlsObjective::likelihood().score(0.01_f64, 4e4), 2.0);
        assert_relative_eq!(BlsObjective::snr().score(0.01_f64, 4e4), 2.0);
        assert_relative_eq!(BlsObjective::snr().score(0.02_f64, 1e4), 2.0);
        assert_relative_eq!(BlsObjective::likelihood().score(0.02_f64, 1e4), 2.0);
        assert_relative_eq!(BlsObjective::likelihood().score(0.03_f64, 1e4), 4.5);
    }

    #[test]
    fn serialization() {
        let json = serde_json::to_string(&BlsObjective::snr()).unwrap();
        assert_eq!(json, r#"{"Snr":null}"#);
        let objective: BlsObjective = serde_json::from_str(&json).unwrap();
        assert_eq!(objective, BlsObjective::snr());
    }
}
