pub mod accessor;
pub mod selection;

pub use accessor::{CatalogAccessor, CatalogError, CatalogSettings};
pub use selection::{max_selectable, validate_selection, SelectionError, MAX_TICKETS_PER_LINE};
