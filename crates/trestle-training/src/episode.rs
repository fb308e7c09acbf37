//! Seams between the trainer and the world it builds in.
//!
//! An episode turns genes into a bridge, drives a vehicle across it and
//! scores the result. The trainer only needs the score, so the whole thing is
//! behind [`EpisodeExecutor`]. [`ScoredSimulator`] composes the usual two
//! halves of an executor: a [`Simulator`] that builds and runs the bridge, and
//! a [`FitnessOracle`] that turns the simulated outcome into a number.
//!
//! Observations come from an [`ObservationSource`], queried once per forward
//! pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use trestle_policy::{BarKind, Gene, Point2};

/// Index into [`SimulatedEpisode::nodes`].
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub position: Point2,
    /// Fixed to the terrain.
    pub anchored: bool,
}

/// Identity of a bar, independent of the order its endpoints were given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BarKey {
    low: NodeId,
    high: NodeId,
}

impl BarKey {
    #[must_use]
    pub fn new(a: NodeId, b: NodeId) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    #[must_use]
    pub fn nodes(self) -> (NodeId, NodeId) {
        (self.low, self.high)
    }
}

/// Fields shared by every bar kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarBody {
    pub node_a: NodeId,
    pub node_b: NodeId,
    /// Whether the `node_a` end is joined to another bar or an anchor.
    pub joint_a: bool,
    pub joint_b: bool,
    /// Gene the bar was built from, if any.
    pub gene: Option<usize>,
    pub broken: bool,
}

/// A built bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Bar {
    /// Drivable deck.
    Road(BarBody),
    /// Structural support.
    Beam(BarBody),
}

impl Bar {
    #[must_use]
    pub fn new(kind: BarKind, body: BarBody) -> Self {
        match kind {
            BarKind::Road => Self::Road(body),
            BarKind::Beam => Self::Beam(body),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BarKind {
        match self {
            Self::Road(_) => BarKind::Road,
            Self::Beam(_) => BarKind::Beam,
        }
    }

    #[must_use]
    pub fn body(&self) -> &BarBody {
        match self {
            Self::Road(body) | Self::Beam(body) => body,
        }
    }

    pub fn body_mut(&mut self) -> &mut BarBody {
        match self {
            Self::Road(body) | Self::Beam(body) => body,
        }
    }

    #[must_use]
    pub fn key(&self) -> BarKey {
        let body = self.body();
        BarKey::new(body.node_a, body.node_b)
    }

    /// Both ends are joined.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        let body = self.body();
        body.joint_a && body.joint_b
    }
}

/// Outcome of building a bridge and driving across it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatedEpisode {
    pub genes: Vec<Gene>,
    pub nodes: Vec<Node>,
    pub bars: Vec<Bar>,
    /// Horizontal position of the vehicle at its furthest point.
    pub vehicle_max_x: f32,
    /// The vehicle left the structure before reaching the checkpoint.
    pub vehicle_fell: bool,
    pub checkpoint_reached: bool,
    pub goal_reached: bool,
}

impl SimulatedEpisode {
    /// Bars indexed by their structural identity. Later duplicates win.
    #[must_use]
    pub fn bars_by_key(&self) -> BTreeMap<BarKey, &Bar> {
        self.bars.iter().map(|bar| (bar.key(), bar)).collect()
    }

    #[must_use]
    pub fn broken_bar_count(&self) -> usize {
        self.bars.iter().filter(|bar| bar.body().broken).count()
    }

    /// Fraction of bars that are broken, `0` when nothing was built.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn broken_ratio(&self) -> f32 {
        if self.bars.is_empty() {
            0.0
        } else {
            self.broken_bar_count() as f32 / self.bars.len() as f32
        }
    }

    /// Copies each broken bar's state onto the gene it came from.
    pub fn annotate_broken(&mut self) {
        for bar in &self.bars {
            let body = bar.body();
            if !body.broken {
                continue;
            }
            match body.gene.and_then(|i| self.genes.get_mut(i)) {
                Some(gene) => gene.broken = true,
                None => {
                    if let Some(i) = body.gene {
                        log::warn!("broken bar refers to unknown gene {i}");
                    }
                }
            }
        }
    }
}

/// Builds and runs a bridge.
pub trait Simulator {
    type Error;

    fn simulate(&mut self, genes: Vec<Gene>) -> Result<SimulatedEpisode, Self::Error>;
}

/// Scores a simulated episode. Higher is better.
pub trait FitnessOracle {
    fn evaluate(&self, episode: &SimulatedEpisode) -> f32;
}

impl<F> FitnessOracle for F
where
    F: Fn(&SimulatedEpisode) -> f32,
{
    fn evaluate(&self, episode: &SimulatedEpisode) -> f32 {
        self(episode)
    }
}

/// An executed episode: the genes as finally annotated, and their score.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedEpisode {
    pub genes: Vec<Gene>,
    pub fitness: f32,
}

/// Runs one episode for a batch of genes.
pub trait EpisodeExecutor {
    type Error;

    fn execute(&mut self, genes: Vec<Gene>) -> Result<ExecutedEpisode, Self::Error>;
}

/// Executor that simulates, marks broken genes and asks an oracle for the
/// score.
#[derive(Debug, Clone)]
pub struct ScoredSimulator<S, O> {
    pub simulator: S,
    pub oracle: O,
}

impl<S, O> ScoredSimulator<S, O> {
    pub fn new(simulator: S, oracle: O) -> Self {
        Self { simulator, oracle }
    }
}

impl<S, O> EpisodeExecutor for ScoredSimulator<S, O>
where
    S: Simulator,
    O: FitnessOracle,
{
    type Error = S::Error;

    fn execute(&mut self, genes: Vec<Gene>) -> Result<ExecutedEpisode, Self::Error> {
        let mut episode = self.simulator.simulate(genes)?;
        episode.annotate_broken();
        let fitness = self.oracle.evaluate(&episode);
        Ok(ExecutedEpisode {
            genes: episode.genes,
            fitness,
        })
    }
}

/// What an observation source knows about the episode in progress.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Forward pass about to run, starting at 0.
    pub step: usize,
    pub total_steps: usize,
    /// Genes produced so far in this episode.
    pub placed: &'a [Gene],
}

/// Supplies network inputs.
pub trait ObservationSource {
    /// Returns the observation for the next forward pass, or `None` when the
    /// scene is not ready (for example, anchors are missing).
    fn observe(&mut self, context: &StepContext<'_>) -> Option<Vec<f32>>;
}
