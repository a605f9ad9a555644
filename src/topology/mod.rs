pub mod link;
pub mod network;
pub mod neuron;

pub use link::{Link, LinkProps, MAX_LINK_LENGTH};
pub use network::Network;
pub use neuron::{FireLevel, LayerKind, Neuron, NeuronId, NeuronProps};
