mod pledge;

pub use pledge::*;
