//! Entity roster generation.
//!
//! The first `floor(count * fraction)` ordinals are labelled anomalous,
//! cycling through the configured anomaly types, then the whole roster is shuffled
//! so position carries no label information.

use crate::{
    config::LabConfig,
    rng::LabRng,
    types::{AnomalyType, EntityId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub entity_id: EntityId,
    /// Creation order. Stable seed material for per-entity streams.
    pub ordinal: usize,
    pub category: String,
    pub is_anomalous: bool,
    pub anomaly_type: Option<AnomalyType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Roster {
    pub entities: Vec<Entity>,
}

impl Roster {
    pub fn generate(config: &LabConfig, rng: &mut LabRng) -> Self {
        let n = config.entity_count;
        let num_anomalous = anomalous_count(n, config.anomaly_fraction);
        let category_names: Vec<&str> = config.categories.iter().map(|c| c.name.as_str()).collect();
        let types = &config.patterns.types;

        let mut entities = Vec::with_capacity(n);
        for i in 0..n {
            let category = rng.choose(&category_names).to_string();
            let anomaly_type = if i < num_anomalous {
                types.get(i % types.len().max(1)).copied()
            } else {
                None
            };

            entities.push(Entity {
                entity_id: format!("{}-{:03}", config.id_prefix, i + 1),
                ordinal: i,
                category,
                is_anomalous: anomaly_type.is_some(),
                anomaly_type,
            });
        }

        rng.shuffle(&mut entities);

        log::info!(
            "Roster generated: {n} entities, {num_anomalous} anomalous across {} categories",
            category_names.len()
        );
        Self { entities }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn anomalous_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_anomalous).count()
    }

    pub fn count_of(&self, anomaly_type: AnomalyType) -> usize {
        self.entities
            .iter()
            .filter(|e| e.anomaly_type == Some(anomaly_type))
            .count()
    }

    pub fn get(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }
}

/// Relative slack, in units of `f64::EPSILON`, applied before flooring.
pub const FLOOR_ULPS: f64 = 4.0;

/// `floor(count * fraction)`.
///
/// A product within `FLOOR_ULPS` relative epsilons below an integer counts
/// as that integer, so a decimal fraction like 0.3 that has no exact binary
/// form still gives `floor(10 * 0.3) = 3`. Anything further below floors down.
pub fn anomalous_count(count: usize, fraction: f64) -> usize {
    let product = count as f64 * fraction;
    (product * (1.0 + FLOOR_ULPS * f64::EPSILON)).floor() as usize
}
