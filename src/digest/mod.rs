pub mod aggregate;
pub mod archive;
pub mod audit;
pub mod config;
pub mod dates;
pub mod history;
pub mod merge;
pub mod paths;
pub mod pipeline;
pub mod schema;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod style;
pub mod table;
pub mod util;
pub mod warn;
pub mod workbook;
pub mod writer;
