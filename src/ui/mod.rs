pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    document_failed, header, info, location, muted, section, success, summary_row, warn,
};
pub use progress::{IngestProgress, Spinner};
pub use table::{stats_table, TableBuilder};
pub use theme::{theme, Theme};
