//! Audio graph - owns units and the connections between them

use core::fmt;
use core::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::error::{log_rejection, ConnectError};
use crate::node::{unit_addr, Sink, Source, Unit};

/// Stable identifier of a unit in a [`Graph`].
///
/// Ids stay valid when other units are removed. The id of a removed unit may
/// be handed out again to a unit added later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(NodeIndex);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0.index())
    }
}

/// Typed handle to a unit owned by a [`Graph`].
///
/// Dereferences to the unit, so parameters can be changed from any thread
/// holding a handle.
pub struct Handle<T> {
    id: UnitId,
    unit: Arc<T>,
}

impl<T> Handle<T> {
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// The shared unit behind this handle.
    pub fn unit(&self) -> &Arc<T> {
        &self.unit
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            unit: Arc::clone(&self.unit),
        }
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.unit
    }
}

impl<T> From<&Handle<T>> for UnitId {
    fn from(handle: &Handle<T>) -> Self {
        handle.id
    }
}

struct UnitEntry {
    unit: Arc<dyn Unit>,
    source: Option<Arc<dyn Source>>,
    sink: Option<Arc<dyn Sink>>,
}

type Topology = StableDiGraph<UnitEntry, ()>;

/// Rebuild the arena's edges from what the units report as their inputs.
///
/// Units can be rewired through their own [`Sink`] methods, so the units are
/// the source of truth. Inputs from outside the arena are not edges.
fn sync_edges(units: &mut Topology) {
    let index: HashMap<usize, NodeIndex> = units
        .node_indices()
        .map(|i| (unit_addr(Arc::as_ptr(&units[i].unit)), i))
        .collect();

    let mut wiring = Vec::new();
    for to in units.node_indices() {
        for input in units[to].unit.inputs() {
            if let Some(&from) = index.get(&unit_addr(Arc::as_ptr(&input))) {
                wiring.push((from, to));
            }
        }
    }

    units.clear_edges();
    for (from, to) in wiring {
        units.add_edge(from, to, ());
    }
}

fn entry(units: &Topology, id: UnitId) -> Result<&UnitEntry, ConnectError> {
    units.node_weight(id.0).ok_or(ConnectError::UnknownUnit)
}

fn name_of(units: &Topology, id: UnitId) -> &str {
    units.node_weight(id.0).map_or("?", |entry| entry.unit.name())
}

/// An arena of audio units at a fixed sample rate.
///
/// Edges run from source to sink. Every connection is checked against the
/// arena's adjacency before the sink is touched, so a rejected connection
/// leaves both the arena and the units unchanged.
///
/// All methods take `&self`: share the graph in an `Arc` and rewire it from a
/// control thread while another thread calls [`render`](Self::render). Units
/// wired directly through their [`Sink`] methods are picked up too, since the
/// arena re-reads every unit's inputs before it answers a topology query.
pub struct Graph {
    units: RwLock<Topology>,
    sample_rate: AtomicU32,
    // Held apart from `units` so rendering never waits on a rewire.
    output: Mutex<Option<(UnitId, Arc<dyn Source>)>>,
}

impl Graph {
    /// Create an empty graph with the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            units: RwLock::new(StableDiGraph::with_capacity(64, 64)),
            sample_rate: AtomicU32::new(sample_rate),
            output: Mutex::new(None),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Number of units in the graph.
    pub fn len(&self) -> usize {
        self.units.read().node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.read().contains_node(id.0)
    }

    /// Add a generator. It receives the graph's sample rate.
    pub fn add_source<T: Source + 'static>(&self, unit: T) -> Handle<T> {
        let unit = Arc::new(unit);
        unit.set_sample_rate(self.sample_rate());
        let entry = UnitEntry {
            unit: unit.clone(),
            source: Some(unit.clone()),
            sink: None,
        };
        self.insert(entry, unit)
    }

    /// Add a unit that both consumes and produces audio.
    pub fn add_effect<T: Source + Sink + 'static>(&self, unit: T) -> Handle<T> {
        let unit = Arc::new(unit);
        unit.set_sample_rate(self.sample_rate());
        let entry = UnitEntry {
            unit: unit.clone(),
            source: Some(unit.clone()),
            sink: Some(unit.clone()),
        };
        self.insert(entry, unit)
    }

    /// Add a terminal unit.
    pub fn add_sink<T: Sink + 'static>(&self, unit: T) -> Handle<T> {
        let unit = Arc::new(unit);
        let entry = UnitEntry {
            unit: unit.clone(),
            source: None,
            sink: Some(unit.clone()),
        };
        self.insert(entry, unit)
    }

    fn insert<T>(&self, entry: UnitEntry, unit: Arc<T>) -> Handle<T> {
        let name = entry.unit.name().to_owned();
        let id = UnitId(self.units.write().add_node(entry));
        tracing::debug!(%id, unit = %name, "unit added");
        Handle { id, unit }
    }

    /// Name of the unit, if it is in the graph.
    pub fn name(&self, id: UnitId) -> Option<String> {
        self.units.read().node_weight(id.0).map(|entry| entry.unit.name().to_owned())
    }

    /// The unit as a source, if it is one.
    pub fn source(&self, id: UnitId) -> Option<Arc<dyn Source>> {
        self.units.read().node_weight(id.0).and_then(|entry| entry.source.clone())
    }

    /// The unit as a sink, if it is one.
    pub fn sink(&self, id: UnitId) -> Option<Arc<dyn Sink>> {
        self.units.read().node_weight(id.0).and_then(|entry| entry.sink.clone())
    }

    /// Connect the output of `from` to an input of `to`.
    pub fn connect(&self, from: impl Into<UnitId>, to: impl Into<UnitId>) -> Result<(), ConnectError> {
        let (from, to) = (from.into(), to.into());
        let mut units = self.units.write();
        let result = Self::try_connect(&mut units, from, to);
        match result {
            Ok(()) => tracing::debug!(%from, %to, "graph edge added"),
            Err(err) => log_rejection(name_of(&units, to), name_of(&units, from), err),
        }
        result
    }

    fn try_connect(units: &mut Topology, from: UnitId, to: UnitId) -> Result<(), ConnectError> {
        let source = entry(units, from)?.source.clone().ok_or(ConnectError::NotASource)?;
        let sink = entry(units, to)?.sink.clone().ok_or(ConnectError::NotASink)?;

        if from == to {
            return Err(ConnectError::SelfConnection);
        }
        sync_edges(units);
        // A path from the sink back to the source means the new edge closes a loop.
        if has_path_connecting(&*units, to.0, from.0, None) {
            return Err(ConnectError::Cycle);
        }

        sink.add_input_from(&source)?;
        units.add_edge(from.0, to.0, ());
        Ok(())
    }

    /// Remove the connection from `from` into `to`.
    pub fn disconnect(&self, from: impl Into<UnitId>, to: impl Into<UnitId>) -> Result<(), ConnectError> {
        let (from, to) = (from.into(), to.into());
        let mut units = self.units.write();
        let source = entry(&units, from)?.source.clone().ok_or(ConnectError::NotASource)?;
        let sink = entry(&units, to)?.sink.clone().ok_or(ConnectError::NotASink)?;

        sync_edges(&mut units);
        let edge = units.find_edge(from.0, to.0).ok_or(ConnectError::NotConnected)?;
        sink.remove_input_from(&source)?;
        units.remove_edge(edge);
        tracing::debug!(%from, %to, "graph edge removed");
        Ok(())
    }

    /// Disconnect every input of `id`.
    pub fn clear_inputs(&self, id: impl Into<UnitId>) -> Result<(), ConnectError> {
        let id = id.into();
        let mut units = self.units.write();
        let sink = entry(&units, id)?.sink.clone().ok_or(ConnectError::NotASink)?;
        sink.clear_inputs();
        sync_edges(&mut units);
        tracing::debug!(%id, "inputs cleared");
        Ok(())
    }

    /// Remove a unit and every connection touching it.
    ///
    /// Handles to the unit stay usable but it is no longer part of the graph.
    pub fn remove(&self, id: impl Into<UnitId>) -> Result<(), ConnectError> {
        let id = id.into();
        let mut units = self.units.write();
        entry(&units, id)?;
        sync_edges(&mut units);

        if let Some(source) = units[id.0].source.clone() {
            for node in units.neighbors_directed(id.0, Direction::Outgoing) {
                if let Some(sink) = units[node].sink.as_ref() {
                    let _ = sink.remove_input_from(&source);
                }
            }
        }
        if let Some(sink) = units[id.0].sink.as_ref() {
            sink.clear_inputs();
        }

        {
            let mut output = self.output.lock();
            if matches!(*output, Some((current, _)) if current == id) {
                *output = None;
            }
        }
        if let Some(entry) = units.remove_node(id.0) {
            tracing::debug!(%id, unit = entry.unit.name(), "unit removed");
        }
        Ok(())
    }

    fn neighbors(&self, id: UnitId, direction: Direction) -> Vec<UnitId> {
        let mut units = self.units.write();
        if !units.contains_node(id.0) {
            return Vec::new();
        }
        sync_edges(&mut units);
        let mut ids: Vec<_> = units.neighbors_directed(id.0, direction).map(UnitId).collect();
        ids.sort();
        ids
    }

    /// Ids of the units feeding `id`, sorted.
    pub fn inputs_of(&self, id: impl Into<UnitId>) -> Vec<UnitId> {
        self.neighbors(id.into(), Direction::Incoming)
    }

    /// Ids of the units `id` feeds, sorted.
    pub fn outputs_of(&self, id: impl Into<UnitId>) -> Vec<UnitId> {
        self.neighbors(id.into(), Direction::Outgoing)
    }

    /// Set which unit [`render`](Self::render) pulls from.
    pub fn set_output(&self, id: impl Into<UnitId>) -> Result<(), ConnectError> {
        let id = id.into();
        let source = {
            let units = self.units.read();
            entry(&units, id)?.source.clone().ok_or(ConnectError::NotASource)?
        };
        *self.output.lock() = Some((id, source));
        tracing::debug!(%id, "output set");
        Ok(())
    }

    pub fn output(&self) -> Option<UnitId> {
        self.output.lock().as_ref().map(|(id, _)| *id)
    }

    /// Pull one block from the output unit into `buffer`.
    ///
    /// Renders silence when no output is set.
    pub fn render(&self, buffer: &mut [f32], num_frames: usize, num_channels: usize) {
        let out = &mut buffer[..num_frames * num_channels];
        let source = self.output.lock().as_ref().map(|(_, source)| Arc::clone(source));
        match source {
            Some(source) => source.audio_requested(out, num_frames, num_channels),
            None => out.fill(0.0),
        }
    }

    /// Change the sample rate and propagate it to every unit in the graph.
    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
        for entry in self.units.read().node_weights() {
            match (&entry.source, &entry.sink) {
                (Some(source), _) => source.set_sample_rate(rate),
                (None, Some(sink)) => sink.propagate_sample_rate(rate),
                (None, None) => {}
            }
        }
        tracing::debug!(rate, "sample rate set");
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.units.read();
        f.debug_struct("Graph")
            .field("units", &units.node_count())
            .field("sample_rate", &self.sample_rate())
            .field("output", &self.output())
            .finish()
    }
}
