pub mod journal;
pub mod matchers;
pub mod near_miss;
pub mod scenario;
pub mod state;
