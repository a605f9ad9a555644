pub mod activation;

pub use activation::{ActParams, ActivationFunction, InputFunction};
