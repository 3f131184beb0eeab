pub use signing::*;

mod signing;
