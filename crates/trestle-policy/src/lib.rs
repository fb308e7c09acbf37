//! Policy network and gene representation for bridge-building agents.
//!
//! A policy maps an observation of the build site to a batch of [`Gene`]s,
//! each describing one bar to place. This crate contains everything that is
//! needed to act and to learn from a single episode:
//!
//! - [`gene`] - genes, points and bar kinds
//! - [`geometry`] - decoding of action vectors into gene endpoints
//! - [`observation`] - the two observation layouts
//! - [`network`] - the feed-forward policy with REINFORCE training
//! - [`codec`] - base64 transport encoding of flat weight vectors
//!
//! # Architecture
//!
//! ```text
//! Observation ──▶ PolicyNetwork::act ──▶ RolloutStep (mean, sampled action)
//!                                            │
//!                                            ├──▶ GeneGeometry::decode ──▶ Vec<Gene> ──▶ builder / simulator
//!                                            │
//!                                            └──▶ RolloutTrace ──▶ PolicyNetwork::train(fitness)
//! ```
//!
//! Population management and hyperparameter evolution live in
//! `trestle-training`.
//!
//! # Randomness
//!
//! Nothing in this crate owns a random number generator. Every operation that
//! needs randomness takes `&mut R where R: Rng`, so tests and reproducible
//! runs can pass a seeded generator.

pub use self::{
    codec::{DecodeWeightsError, decode_weights, encode_weights},
    gene::{BarKind, Gene, Point2},
    geometry::{GeneGeometry, VALUES_PER_GENE, WorldBounds},
    network::{
        Activations, NetworkShape, PolicyNetwork, RolloutStep, RolloutTrace, ShapeMismatchError,
        TrainOutcome, UpdateRule, effective_sigma,
    },
    observation::{
        ANCHOR_OBSERVATION_LEN, STEP_OBSERVATION_LEN, StepObservation, anchor_observation,
    },
};

pub mod codec;
pub mod gene;
pub mod geometry;
pub mod network;
pub mod observation;
