mod animation;
mod animation_state;
mod event_queue;
mod skeleton;

pub use animation::*;
pub use animation_state::*;
pub use event_queue::*;
pub use skeleton::*;

#[cfg(test)]
pub(crate) mod test_fixtures;

#[cfg(test)]
mod animation_tests;
