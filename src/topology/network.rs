use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::topology::link::{Link, LinkProps};
use crate::topology::neuron::{LayerKind, Neuron, NeuronId, NeuronProps};

/// On-disk format revision written into every saved net file.
pub const NET_FORMAT_VERSION: u32 = 1;

fn default_format() -> u32 {
    NET_FORMAT_VERSION
}

/// A directed graph of neurons and weighted links.
///
/// Neurons live in tombstoned slots: deleting one leaves a hole and never
/// renumbers the survivors, so `NeuronId`s stay valid across deletions.
/// Deleting a neuron cascades to every incident link.
///
/// The per-group index used by the public selection and query operations
/// (input 0, input 1, ...) is the position among live neurons of that group
/// in slot order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    #[serde(default = "default_format")]
    format: u32,
    pub(crate) neurons: Vec<Option<Neuron>>,
    pub(crate) links: Vec<Link>,
    #[serde(skip)]
    selection: BTreeSet<NeuronId>,
    #[serde(skip)]
    extra: BTreeSet<NeuronId>,
    /// Indices into `links`; cleared by any structural edit because link
    /// storage compacts on deletion.
    #[serde(skip)]
    selected_links: BTreeSet<usize>,
    /// Topological evaluation order computed by `analyze`.
    #[serde(skip)]
    order: Vec<NeuronId>,
    #[serde(skip)]
    fully_resolved: bool,
}

impl Default for Network {
    fn default() -> Self {
        Network::new()
    }
}

impl Network {
    pub fn new() -> Network {
        Network {
            format: NET_FORMAT_VERSION,
            neurons: Vec::new(),
            links: Vec::new(),
            selection: BTreeSet::new(),
            extra: BTreeSet::new(),
            selected_links: BTreeSet::new(),
            order: Vec::new(),
            fully_resolved: true,
        }
    }

    // ── Neuron access ───────────────────────────────────────────────────────

    pub fn neuron(&self, id: NeuronId) -> Result<&Neuron> {
        self.neurons
            .get(id)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| EngineError::validation(format!("no neuron at slot {id}")))
    }

    pub fn neuron_mut(&mut self, id: NeuronId) -> Result<&mut Neuron> {
        self.neurons
            .get_mut(id)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| EngineError::validation(format!("no neuron at slot {id}")))
    }

    /// Live neurons in slot order.
    pub fn iter_live(&self) -> impl Iterator<Item = (NeuronId, &Neuron)> {
        self.neurons
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|n| (id, n)))
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Evaluation order from the last analysis.
    pub(crate) fn order(&self) -> &[NeuronId] {
        &self.order
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.fully_resolved
    }

    // ── Structural edits ────────────────────────────────────────────────────

    pub fn add_input(&mut self, name: impl Into<String>) -> NeuronId {
        self.add_neuron(LayerKind::Input, name)
    }

    /// Hidden neurons enter the net unresolved; `analyze` places them once
    /// they sit on a forward path.
    pub fn add_hidden(&mut self, name: impl Into<String>) -> NeuronId {
        self.add_neuron(LayerKind::Unresolved, name)
    }

    pub fn add_output(&mut self, name: impl Into<String>) -> NeuronId {
        self.add_neuron(LayerKind::Output, name)
    }

    pub fn add_context(&mut self, name: impl Into<String>) -> NeuronId {
        self.add_neuron(LayerKind::Context, name)
    }

    fn add_neuron(&mut self, kind: LayerKind, name: impl Into<String>) -> NeuronId {
        let neuron = Neuron::new(kind, name);
        // Reuse the lowest free slot before growing.
        let id = match self.neurons.iter().position(Option::is_none) {
            Some(free) => {
                self.neurons[free] = Some(neuron);
                free
            }
            None => {
                self.neurons.push(Some(neuron));
                self.neurons.len() - 1
            }
        };
        self.analyze();
        id
    }

    /// Deletes a neuron and every link touching it.
    pub fn delete_neuron(&mut self, id: NeuronId) -> Result<()> {
        self.neuron(id)?;
        self.neurons[id] = None;
        self.links.retain(|l| !l.touches(id));
        self.selection.remove(&id);
        self.extra.remove(&id);
        self.selected_links.clear();
        self.analyze();
        Ok(())
    }

    /// Adds a link with default properties. Duplicate links and links into
    /// input neurons are rejected.
    pub fn add_link(&mut self, source: NeuronId, target: NeuronId) -> Result<()> {
        self.neuron(source)?;
        let dst = self.neuron(target)?;
        if dst.kind == LayerKind::Input {
            return Err(EngineError::validation(format!(
                "links into input neuron {target} are not allowed"
            )));
        }
        if self.link_index(source, target).is_some() {
            return Err(EngineError::validation(format!(
                "link {source} -> {target} already exists"
            )));
        }
        self.links.push(Link::new(source, target));
        self.selected_links.clear();
        self.analyze();
        Ok(())
    }

    pub fn delete_link(&mut self, source: NeuronId, target: NeuronId) -> Result<()> {
        let idx = self.link_index(source, target).ok_or_else(|| {
            EngineError::validation(format!("no link {source} -> {target}"))
        })?;
        self.links.remove(idx);
        self.selected_links.clear();
        self.analyze();
        Ok(())
    }

    pub fn link_index(&self, source: NeuronId, target: NeuronId) -> Option<usize> {
        self.links
            .iter()
            .position(|l| l.source == source && l.target == target)
    }

    /// Removes every neuron and link, leaving an empty net.
    pub fn clear(&mut self) {
        self.neurons.clear();
        self.links.clear();
        self.selection.clear();
        self.extra.clear();
        self.selected_links.clear();
        self.analyze();
    }

    // ── Group queries ───────────────────────────────────────────────────────

    fn ids_of_kind(&self, kind: LayerKind) -> Vec<NeuronId> {
        self.iter_live()
            .filter(|(_, n)| n.kind == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn input_count(&self) -> usize {
        self.ids_of_kind(LayerKind::Input).len()
    }

    pub fn output_count(&self) -> usize {
        self.ids_of_kind(LayerKind::Output).len()
    }

    pub fn context_count(&self) -> usize {
        self.ids_of_kind(LayerKind::Context).len()
    }

    pub fn unresolved_count(&self) -> usize {
        self.ids_of_kind(LayerKind::Unresolved).len()
    }

    pub fn hidden_count_all(&self) -> usize {
        self.ids_of_kind(LayerKind::Hidden).len()
    }

    /// Hidden neurons grouped by layer depth, shallowest first.
    pub fn hidden_layers(&self) -> Vec<Vec<NeuronId>> {
        let mut depths: Vec<usize> = self
            .iter_live()
            .filter(|(_, n)| n.kind == LayerKind::Hidden)
            .map(|(_, n)| n.layer)
            .collect();
        depths.sort_unstable();
        depths.dedup();
        depths
            .into_iter()
            .map(|d| {
                self.iter_live()
                    .filter(|(_, n)| n.kind == LayerKind::Hidden && n.layer == d)
                    .map(|(id, _)| id)
                    .collect()
            })
            .collect()
    }

    pub fn hidden_layer_count(&self) -> usize {
        self.hidden_layers().len()
    }

    pub fn hidden_count(&self, layer_idx: usize) -> Result<usize> {
        let layers = self.hidden_layers();
        layers
            .get(layer_idx)
            .map(Vec::len)
            .ok_or_else(|| EngineError::validation(format!("no hidden layer {layer_idx}")))
    }

    fn id_in_group(&self, kind: LayerKind, idx: usize) -> Result<NeuronId> {
        self.ids_of_kind(kind).get(idx).copied().ok_or_else(|| {
            EngineError::validation(format!("no {kind:?} neuron at index {idx}"))
        })
    }

    pub fn input_id(&self, idx: usize) -> Result<NeuronId> {
        self.id_in_group(LayerKind::Input, idx)
    }

    pub fn output_id(&self, idx: usize) -> Result<NeuronId> {
        self.id_in_group(LayerKind::Output, idx)
    }

    pub fn input_name(&self, idx: usize) -> Result<&str> {
        let id = self.input_id(idx)?;
        Ok(&self.neuron(id)?.name)
    }

    pub fn output_name(&self, idx: usize) -> Result<&str> {
        let id = self.output_id(idx)?;
        Ok(&self.neuron(id)?.name)
    }

    // ── Selection ───────────────────────────────────────────────────────────

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.selected_links.clear();
    }

    pub fn selection(&self) -> &BTreeSet<NeuronId> {
        &self.selection
    }

    fn select_id(&mut self, id: NeuronId, add: bool) {
        if !add {
            self.selection.clear();
            self.selected_links.clear();
        }
        self.selection.insert(id);
    }

    fn select_group(&mut self, kind: LayerKind, add: bool) {
        let ids = self.ids_of_kind(kind);
        if !add {
            self.selection.clear();
            self.selected_links.clear();
        }
        self.selection.extend(ids);
    }

    pub fn select_input(&mut self, idx: usize, add: bool) -> Result<()> {
        let id = self.input_id(idx)?;
        self.select_id(id, add);
        Ok(())
    }

    pub fn select_output(&mut self, idx: usize, add: bool) -> Result<()> {
        let id = self.output_id(idx)?;
        self.select_id(id, add);
        Ok(())
    }

    pub fn select_hidden(&mut self, layer_idx: usize, idx: usize, add: bool) -> Result<()> {
        let layers = self.hidden_layers();
        let id = layers
            .get(layer_idx)
            .and_then(|l| l.get(idx))
            .copied()
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "no hidden neuron at layer {layer_idx}, index {idx}"
                ))
            })?;
        self.select_id(id, add);
        Ok(())
    }

    pub fn select_hidden_layer(&mut self, layer_idx: usize, add: bool) -> Result<()> {
        let layers = self.hidden_layers();
        let ids = layers.get(layer_idx).cloned().ok_or_else(|| {
            EngineError::validation(format!("no hidden layer {layer_idx}"))
        })?;
        if !add {
            self.clear_selection();
        }
        self.selection.extend(ids);
        Ok(())
    }

    pub fn select_context(&mut self, idx: usize, add: bool) -> Result<()> {
        let id = self.id_in_group(LayerKind::Context, idx)?;
        self.select_id(id, add);
        Ok(())
    }

    pub fn select_unresolved(&mut self, idx: usize, add: bool) -> Result<()> {
        let id = self.id_in_group(LayerKind::Unresolved, idx)?;
        self.select_id(id, add);
        Ok(())
    }

    pub fn select_all_inputs(&mut self, add: bool) {
        self.select_group(LayerKind::Input, add);
    }

    pub fn select_all_outputs(&mut self, add: bool) {
        self.select_group(LayerKind::Output, add);
    }

    pub fn select_all_hidden(&mut self, add: bool) {
        self.select_group(LayerKind::Hidden, add);
    }

    pub fn select_all_contexts(&mut self, add: bool) {
        self.select_group(LayerKind::Context, add);
    }

    pub fn select_all_unresolved(&mut self, add: bool) {
        self.select_group(LayerKind::Unresolved, add);
    }

    /// Selects neurons by exact name. Returns the number of neurons found
    /// (0 is not an error). With `find_multiple` false, only the first match
    /// in slot order is taken.
    pub fn select_neurons_by_name(&mut self, name: &str, add: bool, find_multiple: bool) -> usize {
        let mut ids: Vec<NeuronId> = self
            .iter_live()
            .filter(|(_, n)| n.name == name)
            .map(|(id, _)| id)
            .collect();
        if !find_multiple {
            ids.truncate(1);
        }
        if !add {
            self.clear_selection();
        }
        let found = ids.len();
        self.selection.extend(ids);
        found
    }

    // ── Extra selection and bulk connect ────────────────────────────────────

    pub fn clear_extra_selection(&mut self) {
        self.extra.clear();
    }

    /// Copies the current selection into the extra-selection set.
    pub fn extra_selection(&mut self) {
        self.extra = self.selection.clone();
    }

    /// Connects every extra-selected neuron to every selected neuron.
    /// Existing links and links into inputs are skipped silently.
    pub fn connect_from_extra(&mut self) {
        let pairs = self.cross_pairs(true);
        for (src, dst) in pairs {
            let _ = self.add_link(src, dst);
        }
    }

    /// Connects every selected neuron to every extra-selected neuron.
    pub fn connect_to_extra(&mut self) {
        let pairs = self.cross_pairs(false);
        for (src, dst) in pairs {
            let _ = self.add_link(src, dst);
        }
    }

    fn cross_pairs(&self, from_extra: bool) -> Vec<(NeuronId, NeuronId)> {
        let (sources, targets) = if from_extra {
            (&self.extra, &self.selection)
        } else {
            (&self.selection, &self.extra)
        };
        sources
            .iter()
            .flat_map(|&s| targets.iter().map(move |&t| (s, t)))
            .filter(|(s, t)| s != t)
            .collect()
    }

    /// Selects all links running from the extra selection to the selection.
    pub fn select_links_from_extra(&mut self) {
        self.selected_links = self.link_indices_between(&self.extra, &self.selection);
    }

    /// Selects all links running from the selection to the extra selection.
    pub fn select_links_to_extra(&mut self) {
        self.selected_links = self.link_indices_between(&self.selection, &self.extra);
    }

    fn link_indices_between(
        &self,
        sources: &BTreeSet<NeuronId>,
        targets: &BTreeSet<NeuronId>,
    ) -> BTreeSet<usize> {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, l)| sources.contains(&l.source) && targets.contains(&l.target))
            .map(|(i, _)| i)
            .collect()
    }

    // ── Property bundles ────────────────────────────────────────────────────

    /// Properties of the first selected neuron (slot order).
    pub fn selected_neuron_props(&self) -> Result<NeuronProps> {
        let id = *self
            .selection
            .iter()
            .next()
            .ok_or_else(|| EngineError::state("no neuron selected"))?;
        Ok(self.neuron(id)?.props.clone())
    }

    /// Applies a property bundle to every selected neuron. The bundle is
    /// validated first, so an invalid bundle touches nothing.
    pub fn set_selected_neuron_props(&mut self, props: &NeuronProps) -> Result<()> {
        if self.selection.is_empty() {
            return Err(EngineError::state("no neuron selected"));
        }
        props.validate()?;
        let ids: Vec<NeuronId> = self.selection.iter().copied().collect();
        for id in ids {
            self.neuron_mut(id)?.props = props.clone();
        }
        Ok(())
    }

    pub fn set_selected_neuron_name(&mut self, name: &str) -> Result<()> {
        if self.selection.is_empty() {
            return Err(EngineError::state("no neuron selected"));
        }
        let ids: Vec<NeuronId> = self.selection.iter().copied().collect();
        for id in ids {
            self.neuron_mut(id)?.name = name.to_string();
        }
        Ok(())
    }

    /// Properties of the first selected link.
    pub fn selected_link_props(&self) -> Result<LinkProps> {
        let idx = *self
            .selected_links
            .iter()
            .next()
            .ok_or_else(|| EngineError::state("no link selected"))?;
        Ok(self.links[idx].props)
    }

    /// Applies a property bundle to every selected link, validating first.
    pub fn set_selected_link_props(&mut self, props: &LinkProps) -> Result<()> {
        if self.selected_links.is_empty() {
            return Err(EngineError::state("no link selected"));
        }
        props.validate()?;
        for &idx in &self.selected_links {
            let link = &mut self.links[idx];
            link.props = *props;
            // A shortened delay drops stale in-flight values.
            link.spikes.clear();
        }
        Ok(())
    }

    /// Deletes every selected link and neuron (with link cascade).
    pub fn delete_selected_objects(&mut self) -> Result<()> {
        let mut link_idxs: Vec<usize> = self.selected_links.iter().copied().collect();
        link_idxs.sort_unstable_by(|a, b| b.cmp(a));
        for idx in link_idxs {
            self.links.remove(idx);
        }
        self.selected_links.clear();
        let ids: Vec<NeuronId> = self.selection.iter().copied().collect();
        for id in ids {
            self.delete_neuron(id)?;
        }
        self.selection.clear();
        self.analyze();
        Ok(())
    }

    // ── Signal state ────────────────────────────────────────────────────────

    /// Sets every activation, output, and in-flight link spike to zero.
    pub fn reset(&mut self) {
        for slot in self.neurons.iter_mut().flatten() {
            slot.reset();
        }
        for link in &mut self.links {
            link.spikes.clear();
        }
    }

    /// Reinitializes every unlocked link weight and activation threshold to a
    /// small pseudo-random value, then resets the signal state.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        for link in &mut self.links {
            if !link.props.lock_weight {
                link.props.weight = rng.gen_range(-0.5..0.5);
            }
        }
        for slot in self.neurons.iter_mut().flatten() {
            if !slot.props.lock_act_thres {
                slot.props.act_thres = rng.gen_range(-0.5..0.5);
            }
        }
        self.reset();
    }

    // ── Analysis ────────────────────────────────────────────────────────────

    /// Recomputes the topological evaluation order and hidden-layer depths.
    ///
    /// Dependency edges are links of length 1 whose source is not a context
    /// neuron; all other links deliver a previous step's value and impose no
    /// same-step ordering. Hidden neurons are promoted from `Unresolved` when
    /// they are orderable and sit between at least one incoming and one
    /// outgoing link; otherwise they are (re-)demoted to `Unresolved`.
    pub fn analyze(&mut self) {
        let slot_count = self.neurons.len();
        let mut indegree = vec![0usize; slot_count];
        let live = self.iter_live().count();

        let dep_edges: Vec<(NeuronId, NeuronId)> = self
            .links
            .iter()
            .filter(|l| {
                l.props.length == 1
                    && self
                        .neuron(l.source)
                        .map(|n| n.kind != LayerKind::Context)
                        .unwrap_or(false)
            })
            .map(|l| (l.source, l.target))
            .collect();

        for &(_, dst) in &dep_edges {
            indegree[dst] += 1;
        }

        let mut queue: Vec<NeuronId> = self
            .iter_live()
            .filter(|(id, _)| indegree[*id] == 0)
            .map(|(id, _)| id)
            .collect();
        let mut depth = vec![0usize; slot_count];
        let mut order = Vec::with_capacity(live);

        while let Some(id) = queue.pop() {
            order.push(id);
            for &(src, dst) in &dep_edges {
                if src == id {
                    depth[dst] = depth[dst].max(depth[src] + 1);
                    indegree[dst] -= 1;
                    if indegree[dst] == 0 {
                        queue.push(dst);
                    }
                }
            }
        }
        // Slot order keeps think steps deterministic.
        order.sort_unstable_by_key(|&id| (depth[id], id));

        let ordered: BTreeSet<NeuronId> = order.iter().copied().collect();
        let mut unresolved = 0usize;

        for id in 0..slot_count {
            let has_in = self.links.iter().any(|l| l.target == id);
            let has_out = self.links.iter().any(|l| l.source == id);
            if let Some(n) = self.neurons[id].as_mut() {
                match n.kind {
                    LayerKind::Hidden | LayerKind::Unresolved => {
                        if ordered.contains(&id) && has_in && has_out {
                            n.kind = LayerKind::Hidden;
                            n.layer = depth[id];
                        } else {
                            n.kind = LayerKind::Unresolved;
                            n.layer = 0;
                            unresolved += 1;
                        }
                    }
                    _ => n.layer = depth[id],
                }
            }
        }

        self.order = order;
        self.fully_resolved = ordered.len() == live && unresolved == 0;
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Serializes the net to a pretty-printed JSON file. Transient state
    /// (selections, spikes, evaluation order) is not persisted.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(())
    }

    /// Deserializes a net from a JSON file previously written by `save_json`
    /// and re-runs the analysis.
    pub fn load_json(path: &str) -> Result<Network> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut net: Network = serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if net.format > NET_FORMAT_VERSION {
            return Err(EngineError::validation(format!(
                "unsupported net format {} (this build reads up to {})",
                net.format, NET_FORMAT_VERSION
            )));
        }
        for link in &net.links {
            if net.neuron(link.source).is_err() || net.neuron(link.target).is_err() {
                return Err(EngineError::validation(format!(
                    "link {} -> {} references a missing neuron",
                    link.source, link.target
                )));
            }
            link.props.validate()?;
        }
        net.analyze();
        Ok(net)
    }
}
