//! Market analytics over stored gyms / 健身房市场分析

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::Gym;

/// Gyms within this distance of a location's center count towards its analytics
pub const ANALYTICS_RADIUS_MILES: f64 = 10.0;

const CONFIDENCE_BUCKETS: [&str; 5] = ["0.0-0.2", "0.2-0.4", "0.4-0.6", "0.6-0.8", "0.8-1.0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSaturation {
    Low,
    Medium,
    High,
}

impl MarketSaturation {
    /// More than 20 gyms is high, more than 10 is medium
    pub fn from_total(total_gyms: usize) -> Self {
        if total_gyms > 20 {
            MarketSaturation::High
        } else if total_gyms > 10 {
            MarketSaturation::Medium
        } else {
            MarketSaturation::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingAnalysis {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GymAnalytics {
    pub location: String,
    pub total_gyms: usize,
    /// Gym count per 0.2-wide confidence bucket; every bucket is always present
    pub confidence_distribution: BTreeMap<&'static str, usize>,
    /// Gym count per reporting source
    pub source_breakdown: BTreeMap<String, usize>,
    pub rating_analysis: RatingAnalysis,
    pub density_score: f64,
    pub market_saturation: MarketSaturation,
}

fn confidence_bucket(confidence: f64) -> &'static str {
    if confidence < 0.2 {
        CONFIDENCE_BUCKETS[0]
    } else if confidence < 0.4 {
        CONFIDENCE_BUCKETS[1]
    } else if confidence < 0.6 {
        CONFIDENCE_BUCKETS[2]
    } else if confidence < 0.8 {
        CONFIDENCE_BUCKETS[3]
    } else {
        CONFIDENCE_BUCKETS[4]
    }
}

impl GymAnalytics {
    pub fn from_gyms(location: &str, gyms: &[Gym]) -> Self {
        let mut confidence_distribution: BTreeMap<&'static str, usize> =
            CONFIDENCE_BUCKETS.iter().map(|bucket| (*bucket, 0)).collect();
        let mut source_breakdown: BTreeMap<String, usize> = BTreeMap::new();

        for gym in gyms {
            *confidence_distribution.entry(confidence_bucket(gym.confidence)).or_default() += 1;
            for source in &gym.sources {
                *source_breakdown.entry(source.clone()).or_default() += 1;
            }
        }

        // Unrated gyms (missing or zero) are left out of the rating stats
        let ratings: Vec<f64> = gyms
            .iter()
            .filter_map(|gym| gym.rating)
            .filter(|rating| *rating != 0.0)
            .collect();
        let rating_analysis = if ratings.is_empty() {
            RatingAnalysis {
                count: 0,
                average: 0.0,
                min: 0.0,
                max: 0.0,
            }
        } else {
            RatingAnalysis {
                count: ratings.len(),
                average: ratings.iter().sum::<f64>() / ratings.len() as f64,
                min: ratings.iter().copied().fold(f64::INFINITY, f64::min),
                max: ratings.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        };

        let total_gyms = gyms.len();
        GymAnalytics {
            location: location.to_string(),
            total_gyms,
            confidence_distribution,
            source_breakdown,
            rating_analysis,
            density_score: total_gyms as f64 / 100.0,
            market_saturation: MarketSaturation::from_total(total_gyms),
        }
    }
}
