// First-order Markov rhythm model.
//
// States are composite onset names: the instruments that sound together on
// one sixteenth ("low", "low+high", or "" for a rest). Nodes live in a flat
// vector and edges refer to them by index, so the graph never owns itself.
// Sampling walks a node's outgoing edges in insertion order (inverse CDF by
// linear scan), which makes insertion order part of the observable
// behaviour.

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg32;

use super::rhythm::Rhythm;
use crate::error::{Result, SequencerError};

/// Slack allowed on the sum of a node's outgoing probabilities, so that
/// normalised counts like 1/3 + 1/3 + 1/3 are accepted.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Source of uniform samples in `[0, 1)`.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

impl<R: RngCore> RandomSource for R {
    fn next_unit(&mut self) -> f64 {
        self.r#gen::<f64>()
    }
}

/// Generator used by the sequencer: reproducible when seeded.
pub fn seeded_source(seed: Option<u64>) -> Pcg32 {
    match seed {
        Some(seed) => Pcg32::seed_from_u64(seed),
        None => Pcg32::from_entropy(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub probability: f64,
}

/// Forces the walk back onto a strong-beat node every `period` positions
/// while generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub node: String,
    pub period: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MarkovChain {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    state: Option<usize>,
}

impl MarkovChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_node(&mut self, name: &str) -> Result<usize> {
        if self.node_index(name).is_some() {
            return Err(SequencerError::DuplicateNode(name.to_string()));
        }
        self.nodes.push(Node {
            name: name.to_string(),
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn node_name(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(|n| n.name.as_str())
    }

    /// Node names in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of a node, in insertion order.
    pub fn outgoing(&self, from: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from == from)
    }

    pub fn outgoing_total(&self, from: usize) -> f64 {
        self.outgoing(from).map(|e| e.probability).sum()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.nodes.len() {
            return Err(SequencerError::NodeIndexOutOfRange {
                index,
                len: self.nodes.len(),
            });
        }
        Ok(())
    }

    /// Adds a transition. Fails, leaving the chain unchanged, if the
    /// source node's outgoing probabilities would sum to more than 1.
    pub fn add_edge_by_index(&mut self, from: usize, to: usize, probability: f64) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if !probability.is_finite() || probability < 0.0 {
            return Err(SequencerError::InvalidProbability(probability));
        }

        let total = self.outgoing_total(from);
        if total + probability > 1.0 + PROBABILITY_EPSILON {
            return Err(SequencerError::ProbabilityOverflow {
                node: self.nodes[from].name.clone(),
                total,
                attempted: probability,
            });
        }

        self.edges.push(Edge {
            from,
            to,
            probability,
        });
        Ok(())
    }

    pub fn add_edge(&mut self, from: &str, to: &str, probability: f64) -> Result<()> {
        let from_idx = self
            .node_index(from)
            .ok_or_else(|| SequencerError::UnknownNode(from.to_string()))?;
        let to_idx = self
            .node_index(to)
            .ok_or_else(|| SequencerError::UnknownNode(to.to_string()))?;
        self.add_edge_by_index(from_idx, to_idx, probability)
    }

    pub fn state(&self) -> Option<&str> {
        self.state.and_then(|idx| self.node_name(idx))
    }

    pub fn set_state(&mut self, name: &str) -> Result<()> {
        let idx = self
            .node_index(name)
            .ok_or_else(|| SequencerError::UnknownNode(name.to_string()))?;
        self.state = Some(idx);
        Ok(())
    }

    pub fn clear_state(&mut self) {
        self.state = None;
    }

    /// Advances the walk by one position and returns the new state.
    ///
    /// Without a current state the first inserted node is adopted and no
    /// sample is drawn. Otherwise a uniform sample selects the first edge
    /// whose accumulated probability exceeds it; if none does, the walk
    /// stays where it is.
    pub fn step<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> Option<&str> {
        let Some(current) = self.state else {
            if self.nodes.is_empty() {
                return None;
            }
            self.state = Some(0);
            return self.state();
        };

        let sample = rng.next_unit();
        let mut accumulated = 0.0;
        let mut next = current;
        for edge in self.outgoing(current) {
            accumulated += edge.probability;
            if sample < accumulated {
                next = edge.to;
                break;
            }
        }

        self.state = Some(next);
        self.state()
    }

    /// Learns transition probabilities from one cycle of a reference
    /// rhythm. Nodes are inserted in order of first appearance; each
    /// node's edges in order of first observed successor. The last
    /// position is followed by the first.
    pub fn from_rhythm(rhythm: &Rhythm) -> Result<Self> {
        let states = rhythm.composite_states();
        let mut chain = Self::new();

        let mut sequence = Vec::with_capacity(states.len());
        for name in &states {
            let idx = match chain.node_index(name) {
                Some(idx) => idx,
                None => chain.add_node(name)?,
            };
            sequence.push(idx);
        }

        let mut counts: Vec<Vec<(usize, u32)>> = vec![Vec::new(); chain.len()];
        for (pos, &from) in sequence.iter().enumerate() {
            let to = sequence[(pos + 1) % sequence.len()];
            match counts[from].iter_mut().find(|(target, _)| *target == to) {
                Some((_, count)) => *count += 1,
                None => counts[from].push((to, 1)),
            }
        }

        for (from, successors) in counts.iter().enumerate() {
            let total: u32 = successors.iter().map(|(_, count)| count).sum();
            for &(to, count) in successors {
                chain.add_edge_by_index(from, to, count as f64 / total as f64)?;
            }
        }

        Ok(chain)
    }

    /// Convenience for `from_rhythm` on the contents of a reference file.
    pub fn from_rhythm_file(path: &std::path::Path) -> Result<Self> {
        Self::from_rhythm(&Rhythm::load(path)?)
    }

    /// Generates `length` positions from a cold start and returns the
    /// positions at which the walk sat on `track`'s own node.
    ///
    /// Only the solo node counts: a composite state such as "low+high"
    /// never produces an onset for "low".
    pub fn generate_rhythm<R: RandomSource + ?Sized>(
        &mut self,
        track: &str,
        length: u32,
        anchor: Option<&Anchor>,
        rng: &mut R,
    ) -> Result<Vec<u32>> {
        self.clear_state();
        self.continue_rhythm(track, 0..length, anchor, rng)
    }

    /// Like `generate_rhythm` but continues from the current state over an
    /// arbitrary range of positions.
    pub fn continue_rhythm<R: RandomSource + ?Sized>(
        &mut self,
        track: &str,
        positions: std::ops::Range<u32>,
        anchor: Option<&Anchor>,
        rng: &mut R,
    ) -> Result<Vec<u32>> {
        let mut onsets = Vec::new();

        for pos in positions {
            match anchor {
                Some(anchor) if anchor.period > 0 && pos % anchor.period == 0 => {
                    self.set_state(&anchor.node)?;
                }
                _ => {
                    self.step(rng);
                }
            }

            if self.state() == Some(track) {
                onsets.push(pos);
            }
        }

        Ok(onsets)
    }
}
