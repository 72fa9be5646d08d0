mod dry_run;
mod monitor;
mod pointer_heuristic;
mod pointer_probe;
mod selection_reader;
mod r#trait;
mod uri_list;

pub use self::monitor::DragStateMonitor;
pub use self::pointer_probe::PointerDragProbe;
pub use self::r#trait::{create_drag_probe, DragProbe, PayloadReader};
pub use self::uri_list::parse_uri_list;
