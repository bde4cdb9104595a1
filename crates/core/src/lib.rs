pub mod cancel;
pub mod config;
pub mod differential;
pub mod flamegraph;
pub mod grouping;
pub mod metrics;
pub mod model;
pub mod palette;
pub mod parsers;
pub mod provider;

pub use cancel::CancellationToken;
pub use config::FlameGraphConfig;
pub use flamegraph::{FlameGraphEngine, QueryError};
pub use model::{GroupElement, Symbol, TreeObject, WeightedTree, WeightedTreeSet};
pub use provider::{AnalysisState, SimpleTreeProvider, WeightedTreeProvider};
