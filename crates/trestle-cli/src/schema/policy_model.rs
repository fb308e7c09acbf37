use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trestle_policy::PolicyNetwork;
use trestle_training::{CheckpointRecord, PbtParams};

/// A trained policy exported from a finished generation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyModel {
    pub name: String,
    pub trained_at: DateTime<Utc>,
    pub generation: u64,
    pub final_fitness: f32,
    pub learning_rate: f32,
    pub exploration_noise: f32,
    /// Configuration the model was trained with. Determines the network shape
    /// and how actions decode into genes.
    pub params: PbtParams,
    /// Base64 weight payload.
    pub weights: String,
}

impl PolicyModel {
    pub fn from_record(
        name: String,
        trained_at: DateTime<Utc>,
        params: PbtParams,
        record: &CheckpointRecord,
    ) -> Self {
        Self {
            name,
            trained_at,
            generation: record.global_generation,
            final_fitness: record.fitness,
            learning_rate: record.learning_rate,
            exploration_noise: record.noise,
            params,
            weights: record.weights.clone(),
        }
    }

    pub fn to_network(&self) -> anyhow::Result<PolicyNetwork> {
        let flat = trestle_policy::decode_weights(&self.weights)
            .with_context(|| format!("Failed to decode weights of model {}", self.name))?;
        let mut network = PolicyNetwork::zeros(self.params.network_shape());
        network
            .set_flat_weights(&flat)
            .with_context(|| format!("Weights of model {} do not fit its network", self.name))?;
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;
    use trestle_policy::encode_weights;

    use super::*;

    fn params() -> PbtParams {
        PbtParams {
            genes_per_episode: 2,
            hidden_size: 3,
            ..PbtParams::default()
        }
    }

    #[test]
    fn test_network_roundtrip_through_json() {
        let params = params();
        let network = PolicyNetwork::random(params.network_shape(), &mut Pcg64::seed_from_u64(1));
        let record = CheckpointRecord {
            global_generation: 3,
            model_index: 1,
            fitness: 42.0,
            learning_rate: 0.001,
            noise: 0.2,
            weights: encode_weights(&network.flat_weights()),
        };
        let model = PolicyModel::from_record("bridge".to_owned(), Utc::now(), params, &record);
        let json = serde_json::to_string(&model).unwrap();
        let model: PolicyModel = serde_json::from_str(&json).unwrap();

        assert_eq!(model.generation, 3);
        assert_eq!(model.final_fitness, 42.0);
        assert_eq!(model.to_network().unwrap().flat_weights(), network.flat_weights());
    }

    #[test]
    fn test_mismatched_weights_are_rejected() {
        let record = CheckpointRecord {
            global_generation: 0,
            model_index: 0,
            fitness: 0.0,
            learning_rate: 0.001,
            noise: 0.2,
            weights: encode_weights(&[1.0, 2.0, 3.0]),
        };
        let model = PolicyModel::from_record("bad".to_owned(), Utc::now(), params(), &record);
        let err = model.to_network().unwrap_err();
        assert!(err.to_string().contains("do not fit"));
    }
}
