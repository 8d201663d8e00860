pub mod fsio;
pub mod logbook;

pub use logbook::Logbook;
