//! Reference-point collection from plot clicks.
//!
//! Bands take three clicks and the fit baseline two. Either way the gesture
//! is one-shot: points accumulate until the last one arrives, the derived
//! values are handed back and the collector returns to [`CollectorState::Idle`].
//! A [`Gesture`] names how many points it needs, which points it refuses and
//! what it derives from a complete buffer.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A clicked point in data coordinates (frequency, intensity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
}

impl PlotPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for PlotPoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Where a collector stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectorState {
    /// Clicks are ignored.
    Idle,
    /// This many points are still needed.
    AwaitingPoint(usize),
}

/// Derivation rule for one kind of multi-click gesture.
pub trait Gesture {
    /// Points needed before [`Gesture::derive`] runs.
    const POINTS: usize;

    /// Values derived from a complete buffer.
    type Output;

    /// Refuse `point` given the points already collected. A refused point is
    /// not added to the buffer.
    fn check(collected: &[PlotPoint], point: PlotPoint) -> Result<()> {
        let _ = (collected, point);
        Ok(())
    }

    /// Derive the output from exactly [`Gesture::POINTS`] points.
    fn derive(points: &[PlotPoint]) -> Self::Output;
}

/// Buffer plus state for one gesture kind.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ReferencePointCollector<G: Gesture> {
    state: CollectorState,
    points: Vec<PlotPoint>,
    #[serde(skip)]
    gesture: PhantomData<G>,
}

impl<G: Gesture> Clone for ReferencePointCollector<G> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            points: self.points.clone(),
            gesture: PhantomData,
        }
    }
}

impl<G: Gesture> PartialEq for ReferencePointCollector<G> {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.points == other.points
    }
}

impl<G: Gesture> Default for ReferencePointCollector<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Gesture> ReferencePointCollector<G> {
    pub fn new() -> Self {
        Self {
            state: CollectorState::Idle,
            points: Vec::new(),
            gesture: PhantomData,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.state, CollectorState::AwaitingPoint(_))
    }

    /// Points gathered so far.
    pub fn points(&self) -> &[PlotPoint] {
        &self.points
    }

    /// Begin a fresh gesture, dropping any stale partial buffer.
    pub fn start(&mut self) {
        self.points.clear();
        self.state = CollectorState::AwaitingPoint(G::POINTS);
    }

    /// Abandon the gesture and clear the buffer.
    pub fn cancel(&mut self) {
        self.points.clear();
        self.state = CollectorState::Idle;
    }

    /// The transition for one click, without touching `self`.
    ///
    /// Returns the next collector and, when this click completes the
    /// gesture, the derived values. An idle collector ignores the click.
    pub fn accept(&self, point: PlotPoint) -> Result<(Self, Option<G::Output>)> {
        let remaining = match self.state {
            CollectorState::Idle => return Ok((self.clone(), None)),
            CollectorState::AwaitingPoint(n) => n,
        };

        G::check(&self.points, point)?;

        let mut points = self.points.clone();
        points.push(point);

        if remaining <= 1 {
            let output = G::derive(&points);
            return Ok((Self::new(), Some(output)));
        }

        let next = Self {
            state: CollectorState::AwaitingPoint(remaining - 1),
            points,
            gesture: PhantomData,
        };
        Ok((next, None))
    }

    /// Apply [`accept`](Self::accept) in place. On error the collector is
    /// unchanged.
    pub fn push(&mut self, point: PlotPoint) -> Result<Option<G::Output>> {
        let (next, output) = self.accept(point)?;
        *self = next;
        Ok(output)
    }
}
