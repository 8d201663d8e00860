// Public modules so saptune-core can use them
pub mod catalog;
pub mod ini;
pub mod solution;
pub mod sysconfig;
pub mod types;

pub use catalog::{NoteCatalog, NoteDefinition};
pub use ini::{parse_ini, parse_ini_file, ParsedIni};
pub use solution::{arch_section, current_arch_section, parse_solution};
pub use sysconfig::Sysconfig;
pub use types::{IniEntry, IniFile, Operator, Section};
