//! Query surface shared by flame-tree engines and their clients.
//!
//! Everything here is plain serializable data: fetch parameter helpers,
//! the status envelope returned by every query, and the models carried
//! inside it (entries, rows of states, tooltips, styles).

pub mod entry;
pub mod params;
pub mod response;
pub mod state;
pub mod style;
pub mod tooltip;

pub use entry::{EntryType, FlameEntry, TreeModel};
pub use params::{FetchParameters, ParamError, QueryBuilder};
pub use response::{Response, Status};
pub use state::{Row, RowModel, TimeGraphState};
pub use style::{OutputStyle, Rgba, StyleModel, StyleValue};
pub use tooltip::{TooltipField, TooltipModel};
