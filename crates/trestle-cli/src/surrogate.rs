//! Static stand-in for the physics world.
//!
//! [`SurrogateSimulator`] builds a bridge from genes without running any
//! physics: endpoints snap to nearby nodes (unless the snap would stretch a
//! bar past the length limit), overlong or deeply sagging bars break, and the vehicle "drives" along every intact road reachable from the
//! near bank. [`StaticFitness`] scores the result with the same terms the
//! physics-backed trainer uses (progress, checkpoint and goal bonuses,
//! connectivity, anchor use, sag and out-of-bounds penalties).
//!
//! The surrogate is deterministic, which makes it useful for smoke-testing
//! training runs and for comparing exported models.

use std::{
    cell::Cell,
    collections::{BTreeSet, VecDeque},
    convert::Infallible,
    rc::Rc,
};

use serde::{Deserialize, Serialize};
use trestle_policy::{
    BarKind, Gene, Point2, StepObservation, anchor_observation, geometry::DEFAULT_MAX_LENGTH,
    observation::ANCHOR_COUNT,
};
use trestle_training::{
    Bar, BarBody, BarKey, GenerationMode, ObservationSource, ScoredSimulator, SimulatedEpisode,
    Simulator, StepContext, episode::Node,
};

/// Endpoints closer than this to an existing node join it.
pub const SNAP_RADIUS: f32 = 0.8;
/// Bars whose midpoint hangs below this height collapse.
const BREAK_HEIGHT: f32 = -5.0;
/// Midpoints below this height accrue sag penalty.
const SAG_HEIGHT: f32 = -3.0;
const SAG_LIMIT: f32 = 0.6;
const OUT_OF_BOUNDS_MARGIN: f32 = 1.5;
const FALL_FRACTION: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub anchors: [Point2; ANCHOR_COUNT],
    pub left_x: f32,
    pub right_x: f32,
    pub goal: Point2,
    pub max_bar_length: f32,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            anchors: [
                Point2::new(-8.0, 0.0),
                Point2::new(0.0, -2.0),
                Point2::new(8.0, 0.0),
            ],
            left_x: -6.0,
            right_x: 6.0,
            goal: Point2::new(10.0, 0.0),
            max_bar_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl Scene {
    pub fn span_width(&self) -> f32 {
        (self.right_x - self.left_x).abs()
    }
}

/// Outcome of the previous run, fed back into step observations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunFeedback {
    pub vehicle_progress: f32,
    pub broken_ratio: f32,
}

/// Observation source for a [`Scene`].
#[derive(Debug, Clone)]
pub struct SceneObservations {
    scene: Scene,
    mode: GenerationMode,
    feedback: Rc<Cell<RunFeedback>>,
}

impl SceneObservations {
    pub fn new(scene: Scene, mode: GenerationMode) -> Self {
        Self {
            scene,
            mode,
            feedback: Rc::default(),
        }
    }
}

impl ObservationSource for SceneObservations {
    fn observe(&mut self, context: &StepContext<'_>) -> Option<Vec<f32>> {
        match self.mode {
            GenerationMode::SingleShot => anchor_observation(&self.scene.anchors),
            GenerationMode::Sequential => {
                let feedback = self.feedback.get();
                let last = context.placed.last();
                Some(
                    StepObservation {
                        anchors: self.scene.anchors,
                        left_x: self.scene.left_x,
                        right_x: self.scene.right_x,
                        goal: self.scene.goal,
                        last_end: last.map_or(self.scene.anchors[0], |gene| gene.end),
                        bar_index: context.step,
                        total_bars: context.total_steps,
                        vehicle_progress: feedback.vehicle_progress,
                        broken_ratio: feedback.broken_ratio,
                        prev_bar_success: last.is_some(),
                    }
                    .to_vec(),
                )
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SurrogateSimulator {
    scene: Scene,
    feedback: Rc<Cell<RunFeedback>>,
}

impl SurrogateSimulator {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            feedback: Rc::default(),
        }
    }

    fn nearest_node(nodes: &[Node], position: Point2) -> Option<usize> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i, node.position.distance(position)))
            .filter(|&(_, d)| d <= SNAP_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    fn insert_node(nodes: &mut Vec<Node>, position: Point2) -> usize {
        nodes.push(Node {
            position,
            anchored: false,
        });
        nodes.len() - 1
    }

    /// Nodes the vehicle can reach over intact roads, starting from the near
    /// bank.
    fn drive(&self, nodes: &[Node], bars: &[Bar]) -> Vec<bool> {
        let roads = bars
            .iter()
            .filter(|bar| bar.kind() == BarKind::Road && !bar.body().broken)
            .map(Bar::key)
            .collect::<Vec<_>>();
        let mut reached = vec![false; nodes.len()];
        let mut queue = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.anchored && node.position.x <= self.scene.left_x)
            .map(|(i, _)| i)
            .collect::<VecDeque<_>>();
        for &i in &queue {
            reached[i] = true;
        }
        while let Some(current) = queue.pop_front() {
            for key in &roads {
                let (a, b) = key.nodes();
                let next = if a == current {
                    b
                } else if b == current {
                    a
                } else {
                    continue;
                };
                if !reached[next] {
                    reached[next] = true;
                    queue.push_back(next);
                }
            }
        }
        reached
    }
}

impl Simulator for SurrogateSimulator {
    type Error = Infallible;

    fn simulate(&mut self, genes: Vec<Gene>) -> Result<SimulatedEpisode, Self::Error> {
        let scene = self.scene;
        let mut nodes = scene
            .anchors
            .iter()
            .map(|&position| Node {
                position,
                anchored: true,
            })
            .collect::<Vec<_>>();
        let mut built = BTreeSet::<BarKey>::new();
        let mut bars = Vec::<Bar>::new();

        for (i, gene) in genes.iter().enumerate() {
            if !(gene.start.is_finite() && gene.end.is_finite()) {
                log::debug!("gene {i} has non-finite endpoints; not built");
                continue;
            }
            // a gene that fits the limit keeps fitting after snapping
            let limit = scene.max_bar_length + 1e-3;
            let fits = gene.start.distance(gene.end) <= limit;
            let a = match Self::nearest_node(&nodes, gene.start) {
                Some(i) if !fits || nodes[i].position.distance(gene.end) <= limit => i,
                _ => Self::insert_node(&mut nodes, gene.start),
            };
            let b = match Self::nearest_node(&nodes, gene.end) {
                Some(i) if !fits || nodes[a].position.distance(nodes[i].position) <= limit => i,
                _ => Self::insert_node(&mut nodes, gene.end),
            };
            if a == b {
                continue;
            }
            if !built.insert(BarKey::new(a, b)) {
                log::debug!("gene {i} duplicates an existing bar; not built");
                continue;
            }

            let (pa, pb) = (nodes[a].position, nodes[b].position);
            let broken = pa.distance(pb) > limit || pa.midpoint(pb).y < BREAK_HEIGHT;
            bars.push(Bar::new(
                gene.kind,
                BarBody {
                    node_a: a,
                    node_b: b,
                    joint_a: false,
                    joint_b: false,
                    gene: Some(i),
                    broken,
                },
            ));
        }

        let mut degree = vec![0_usize; nodes.len()];
        for bar in &bars {
            let (a, b) = bar.key().nodes();
            degree[a] += 1;
            degree[b] += 1;
        }
        for bar in &mut bars {
            let body = bar.body_mut();
            body.joint_a = nodes[body.node_a].anchored || degree[body.node_a] > 1;
            body.joint_b = nodes[body.node_b].anchored || degree[body.node_b] > 1;
        }

        let reached = self.drive(&nodes, &bars);
        let mut vehicle_max_x = f32::NEG_INFINITY;
        let mut far_bank = false;
        for (node, _) in nodes.iter().zip(&reached).filter(|(_, r)| **r) {
            vehicle_max_x = vehicle_max_x.max(node.position.x);
            far_bank |= node.anchored && node.position.x >= scene.right_x;
        }
        if far_bank {
            vehicle_max_x = vehicle_max_x.max(scene.goal.x);
        }
        if !vehicle_max_x.is_finite() {
            vehicle_max_x = scene.left_x;
        }
        let distance = vehicle_max_x - scene.left_x;

        let episode = SimulatedEpisode {
            genes,
            nodes,
            bars,
            vehicle_max_x,
            vehicle_fell: distance < scene.span_width() * FALL_FRACTION,
            checkpoint_reached: vehicle_max_x >= (scene.left_x + scene.right_x) * 0.5,
            goal_reached: far_bank,
        };
        let span = scene.span_width();
        self.feedback.set(RunFeedback {
            vehicle_progress: if span > 0.0 {
                (distance / span).clamp(0.0, 1.0)
            } else {
                0.0
            },
            broken_ratio: episode.broken_ratio(),
        });
        Ok(episode)
    }
}

/// Fitness of a statically evaluated bridge, in `[-100, 100]`.
#[derive(Debug, Clone, Copy)]
pub struct StaticFitness {
    left_x: f32,
    right_x: f32,
}

impl StaticFitness {
    pub fn new(scene: &Scene) -> Self {
        Self {
            left_x: scene.left_x,
            right_x: scene.right_x,
        }
    }

    /// Nodes connected to an anchor through intact bars.
    fn supported_nodes(episode: &SimulatedEpisode) -> Vec<bool> {
        let mut supported = episode
            .nodes
            .iter()
            .map(|node| node.anchored)
            .collect::<Vec<_>>();
        let intact = episode
            .bars
            .iter()
            .filter(|bar| !bar.body().broken)
            .map(Bar::key)
            .collect::<Vec<_>>();
        let mut changed = true;
        while changed {
            changed = false;
            for key in &intact {
                let (a, b) = key.nodes();
                let (Some(&sa), Some(&sb)) = (supported.get(a), supported.get(b)) else {
                    continue;
                };
                if sa != sb {
                    supported[a] = true;
                    supported[b] = true;
                    changed = true;
                }
            }
        }
        supported
    }
}

impl trestle_training::FitnessOracle for StaticFitness {
    #[expect(clippy::cast_precision_loss)]
    fn evaluate(&self, episode: &SimulatedEpisode) -> f32 {
        let span = (self.right_x - self.left_x).abs();
        let forward = (episode.vehicle_max_x - self.left_x).max(0.0);
        let progress = if span > 0.5 {
            (forward / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let supported = Self::supported_nodes(episode);
        let mut total = 0_usize;
        let mut connected = 0_usize;
        let mut anchored = 0_usize;
        let mut proper = 0_usize;
        let mut sag_total = 0.0;
        let mut out_of_bounds = 0_usize;
        for bar in &episode.bars {
            let body = bar.body();
            let (Some(a), Some(b)) = (
                episode.nodes.get(body.node_a),
                episode.nodes.get(body.node_b),
            ) else {
                continue;
            };
            total += 1;
            if bar.is_connected() {
                connected += 1;
                if supported[body.node_a] && supported[body.node_b] {
                    proper += 1;
                }
            }
            if a.anchored || b.anchored {
                anchored += 1;
            }
            let mid = a.position.midpoint(b.position);
            if mid.y < SAG_HEIGHT {
                sag_total += (mid.y - SAG_HEIGHT).abs();
            }
            if mid.x < self.left_x - OUT_OF_BOUNDS_MARGIN
                || mid.x > self.right_x + OUT_OF_BOUNDS_MARGIN
            {
                out_of_bounds += 1;
            }
        }

        let ratio = |n: usize| {
            if total == 0 {
                0.0
            } else {
                (n as f32 / total as f32).clamp(0.0, 1.0)
            }
        };
        let stability = ratio(connected);
        let sag_penalty = if total == 0 {
            0.0
        } else {
            (sag_total / (total as f32 * SAG_LIMIT)).clamp(0.0, 1.0)
        };

        let mut fitness = 0.0;
        if episode.goal_reached {
            fitness += 40.0;
        }
        if episode.checkpoint_reached {
            fitness += 20.0;
        }
        fitness += progress * 20.0;
        fitness += stability * 12.0;
        fitness += ratio(proper) * 20.0;
        fitness += ratio(anchored) * 12.0;
        if episode.vehicle_fell {
            fitness -= 10.0;
        }
        if total > 0 && stability < 0.35 {
            fitness -= 8.0;
        }
        fitness -= sag_penalty * 15.0;
        fitness -= out_of_bounds as f32 / total.max(1) as f32 * 6.0;
        if total == 0 {
            fitness -= 50.0;
        }
        fitness.clamp(-100.0, 100.0)
    }
}

pub type SurrogateExecutor = ScoredSimulator<SurrogateSimulator, StaticFitness>;

/// Observation source and executor for `scene` that share run feedback.
pub fn surrogate_world(
    scene: Scene,
    mode: GenerationMode,
) -> (SceneObservations, SurrogateExecutor) {
    let observations = SceneObservations::new(scene, mode);
    let mut simulator = SurrogateSimulator::new(scene);
    simulator.feedback = Rc::clone(&observations.feedback);
    (
        observations,
        ScoredSimulator::new(simulator, StaticFitness::new(&scene)),
    )
}
