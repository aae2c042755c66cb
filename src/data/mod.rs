//! Trial datasets and their conversion into decoder inputs

pub mod adapter;
pub mod loader;
pub mod synthetic;
pub mod types;

pub use adapter::{ChannelSelector, DataAdapter};
pub use loader::DataLoader;
pub use synthetic::SyntheticEpochs;
pub use types::{ChannelInfo, ChannelKind, Epochs, TimeAxis, TrialDataset};
