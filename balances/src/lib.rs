//! Balance folding (C6) and round/PPS derivation (C7): the two components
//! that sit between the raw event stream and everything downstream that
//! needs a USD value.

pub mod folder;
pub mod rounds;
