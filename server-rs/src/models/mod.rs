pub mod game;
pub mod league;
pub mod ledger;

pub use game::*;
pub use league::*;
pub use ledger::*;
